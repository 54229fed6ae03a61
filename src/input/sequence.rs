// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 图片序列来源/输出
// 目录中的图片按文件名排序作为帧序列

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use image::RgbImage;

use super::{check_dimensions, FrameSink, FrameSource, VideoInfo};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// 输出帧所在的子目录
pub const OUTPUT_FRAMES_DIR: &str = "output_frames";

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 图片序列来源
pub struct ImageSequenceSource {
    info: VideoInfo,
    paths: Vec<PathBuf>,
    next: usize,
    first: Option<RgbImage>,
}

impl ImageSequenceSource {
    /// 打开目录; 宽高取自第一帧
    pub fn open(dir: &Path, fps: f64) -> Result<Self> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("cannot open frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        paths.sort();

        let first = match paths.first() {
            Some(p) => Some(
                image::open(p)
                    .with_context(|| format!("cannot decode {}", p.display()))?
                    .into_rgb8(),
            ),
            None => None,
        };
        let (width, height) = first.as_ref().map(|f| f.dimensions()).unwrap_or((0, 0));

        log::info!(
            "📹 帧目录: {} | {} 帧 | {}x{} @ {} fps",
            dir.display(),
            paths.len(),
            width,
            height,
            fps
        );

        Ok(Self {
            info: VideoInfo { width, height, fps },
            paths,
            next: 0,
            first,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };
        let frame = match self.first.take() {
            Some(frame) => frame,
            None => image::open(path)
                .with_context(|| format!("cannot decode {}", path.display()))?
                .into_rgb8(),
        };
        check_dimensions(&self.info, &frame)
            .with_context(|| format!("frame {} has unexpected size", path.display()))?;
        self.next += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.next = self.paths.len();
        self.first = None;
    }
}

/// 图片序列输出: `<dir>/000001.png`, `<dir>/000002.png`, ...
pub struct ImageSequenceSink {
    dir: PathBuf,
    info: VideoInfo,
    written: u64,
    closed: bool,
}

impl ImageSequenceSink {
    pub fn create(dir: &Path, info: VideoInfo) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create output directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            info,
            written: 0,
            closed: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if self.closed {
            bail!("sink already closed");
        }
        check_dimensions(&self.info, frame)?;
        let path = self.dir.join(format!("{:06}.png", self.written + 1));
        frame
            .save(&path)
            .with_context(|| format!("cannot write {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            log::info!("💾 已写出 {} 帧到 {}", self.written, self.dir.display());
        }
        Ok(())
    }
}
