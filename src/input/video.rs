// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频文件输入输出 (ez-ffmpeg)
///
/// - VideoFileSource: 解码线程把 rgb24 帧经有界通道交给流水线
/// - VideoFileSink: 标注帧以 rawvideo 流喂给编码线程, 写出 mp4
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame, Input, Output};
use image::RgbImage;

use super::{check_dimensions, FrameSink, FrameSource, VideoInfo};

/// 输出视频文件名
pub const OUTPUT_VIDEO_FILE: &str = "output_video.mp4";

/// FFERRTAG('E','O','F',' ')
const AVERROR_EOF: i32 = -0x2046_4F45;

/// 解码/编码线程与流水线之间的缓冲帧数
const FRAME_QUEUE: usize = 4;

type Worker = JoinHandle<Result<()>>;

/// 按行拷贝 rgb24 数据 (行宽 `stride` 可能带填充)
pub(crate) fn rgb24_to_image(data: &[u8], stride: usize, width: u32, height: u32) -> Result<RgbImage> {
    let row = width as usize * 3;
    if stride < row {
        bail!("stride {} shorter than row of {} bytes", stride, row);
    }
    let needed = match height as usize {
        0 => 0,
        h => stride * (h - 1) + row,
    };
    if data.len() < needed {
        bail!("frame data is {} bytes, need {}", data.len(), needed);
    }

    let mut pixels = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        pixels.extend_from_slice(&data[y * stride..y * stride + row]);
    }
    RgbImage::from_raw(width, height, pixels).ok_or_else(|| anyhow!("frame buffer size mismatch"))
}

fn join_worker(worker: Worker, role: &str) -> Result<()> {
    worker
        .join()
        .map_err(|_| anyhow!("video {} thread panicked", role))?
}

/// 解码过滤器: 每帧转成 RgbImage 发送给读取端
struct RgbFrameFilter {
    tx: Sender<RgbImage>,
    count: u64,
}

impl FrameFilter for RgbFrameFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        log::debug!("✅ 视频解码线程启动");
        Ok(())
    }

    fn filter_frame(&mut self, frame: Frame, _ctx: &FrameFilterContext) -> Result<Option<Frame>, String> {
        let image = unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                log::warn!("⚠️  丢弃帧 #{}: 空帧/损坏帧", self.count + 1);
                return Ok(None);
            }
            let raw = &*frame.as_ptr();
            if raw.width <= 0 || raw.height <= 0 || raw.linesize[0] <= 0 || raw.data[0].is_null() {
                return Err(format!("unexpected frame layout {}x{}", raw.width, raw.height));
            }
            let (width, height) = (raw.width as u32, raw.height as u32);
            let stride = raw.linesize[0] as usize;
            let len = stride * (height as usize - 1) + width as usize * 3;
            let data = std::slice::from_raw_parts(raw.data[0] as *const u8, len);
            rgb24_to_image(data, stride, width, height).map_err(|e| e.to_string())?
        };

        self.count += 1;
        // 读取端已关闭时停止解码
        self.tx
            .send(image)
            .map_err(|_| "frame receiver closed".to_string())?;
        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        log::debug!("✅ 视频解码线程退出, 共 {} 帧", self.count);
    }
}

/// 视频文件帧来源
pub struct VideoFileSource {
    info: VideoInfo,
    pending: Option<RgbImage>,
    rx: Option<Receiver<RgbImage>>,
    worker: Option<Worker>,
}

impl VideoFileSource {
    /// 打开视频文件并解码第一帧
    ///
    /// 帧尺寸取自第一帧; 帧率使用 `fps` (解码端不提供)
    pub fn open(path: &Path, fps: f64) -> Result<Self> {
        if !path.is_file() {
            bail!("video file not found: {}", path.display());
        }
        let url = path.to_string_lossy().into_owned();
        let (tx, rx) = bounded(FRAME_QUEUE);

        let worker = thread::Builder::new()
            .name("video-decode".into())
            .spawn(move || -> Result<()> {
                let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
                let pipe = pipe.filter("rgb", Box::new(RgbFrameFilter { tx, count: 0 }));
                let out = create_null_output().add_frame_pipeline(pipe);

                let ctx = FfmpegContext::builder()
                    .input(Input::new(url))
                    .filter_descs(["format=rgb24"].into())
                    .output(out)
                    .build()
                    .map_err(|e| anyhow!("构建解码器失败: {}", e))?;
                let sch = ctx.start().map_err(|e| anyhow!("启动解码器失败: {}", e))?;
                sch.wait().map_err(|e| anyhow!("解码失败: {}", e))
            })
            .context("cannot spawn decoder thread")?;

        let first = match rx.recv() {
            Ok(frame) => frame,
            Err(_) => {
                join_worker(worker, "decoder")
                    .with_context(|| format!("cannot decode {}", path.display()))?;
                bail!("video has no frames: {}", path.display());
            }
        };

        let info = VideoInfo {
            width: first.width(),
            height: first.height(),
            fps,
        };
        log::info!("🎬 视频输入 {} ({}x{})", path.display(), info.width, info.height);
        Ok(Self {
            info,
            pending: Some(first),
            rx: Some(rx),
            worker: Some(worker),
        })
    }
}

impl FrameSource for VideoFileSource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        let Some(rx) = &self.rx else {
            return Ok(None);
        };
        match rx.recv() {
            Ok(frame) => Ok(Some(frame)),
            // 通道断开: 解码线程已结束, 以它的结果区分正常结束与失败
            Err(_) => {
                self.rx = None;
                match self.worker.take() {
                    Some(worker) => join_worker(worker, "decoder").map(|_| None),
                    None => Ok(None),
                }
            }
        }
    }

    fn close(&mut self) {
        self.pending = None;
        self.rx = None;
        if let Some(worker) = self.worker.take() {
            // 提前关闭时解码线程以错误退出
            if let Err(e) = join_worker(worker, "decoder") {
                log::debug!("解码线程退出: {:#}", e);
            }
        }
    }
}

/// 编码线程的读回调: 按需切分通道中的整帧数据
pub(crate) struct RawFrameReader {
    rx: Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
}

impl RawFrameReader {
    pub(crate) fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            current: Vec::new(),
            pos: 0,
        }
    }

    /// 返回写入 `buf` 的字节数, 发送端关闭且数据读完后返回 AVERROR_EOF
    pub(crate) fn read(&mut self, buf: &mut [u8]) -> i32 {
        while self.pos >= self.current.len() {
            match self.rx.recv() {
                Ok(next) => {
                    self.current = next;
                    self.pos = 0;
                }
                Err(_) => return AVERROR_EOF,
            }
        }
        let n = buf
            .len()
            .min(self.current.len() - self.pos)
            .min(i32::MAX as usize);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        n as i32
    }
}

/// mp4 视频输出
///
/// 编码线程在第一帧写入时启动; 没有写入任何帧时不生成文件。
pub struct VideoFileSink {
    info: VideoInfo,
    path: PathBuf,
    tx: Option<Sender<Vec<u8>>>,
    worker: Option<Worker>,
    written: u64,
    closed: bool,
}

impl VideoFileSink {
    /// 在 `dir` 下写出 [`OUTPUT_VIDEO_FILE`]
    pub fn create(dir: &Path, info: VideoInfo) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create output directory {}", dir.display()))?;
        Ok(Self {
            info,
            path: dir.join(OUTPUT_VIDEO_FILE),
            tx: None,
            worker: None,
            written: 0,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn start(&mut self) -> Result<Sender<Vec<u8>>> {
        let (tx, rx) = bounded(FRAME_QUEUE);
        let size = format!("{}x{}", self.info.width, self.info.height);
        let rate = format!("{}", self.info.fps);
        let target = self.path.to_string_lossy().into_owned();

        let worker = thread::Builder::new()
            .name("video-encode".into())
            .spawn(move || -> Result<()> {
                let mut reader = RawFrameReader::new(rx);
                let input = Input::new_by_read_callback(move |buf: &mut [u8]| reader.read(buf))
                    .set_format("rawvideo")
                    .set_input_opts(
                        [
                            ("video_size", size.as_str()),
                            ("pixel_format", "rgb24"),
                            ("framerate", rate.as_str()),
                        ]
                        .into(),
                    );

                let ctx = FfmpegContext::builder()
                    .input(input)
                    .filter_descs(["format=yuv420p"].into())
                    .output(Output::from(target))
                    .build()
                    .map_err(|e| anyhow!("构建编码器失败: {}", e))?;
                let sch = ctx.start().map_err(|e| anyhow!("启动编码器失败: {}", e))?;
                sch.wait().map_err(|e| anyhow!("编码失败: {}", e))
            })
            .context("cannot spawn encoder thread")?;

        self.worker = Some(worker);
        self.tx = Some(tx.clone());
        log::info!("🎞️  视频输出 {}", self.path.display());
        Ok(tx)
    }

    fn finish(&mut self) -> Result<()> {
        self.closed = true;
        self.tx = None;
        match self.worker.take() {
            Some(worker) => join_worker(worker, "encoder")
                .with_context(|| format!("cannot write {}", self.path.display())),
            None => Ok(()),
        }
    }
}

impl FrameSink for VideoFileSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        check_dimensions(&self.info, frame)?;
        if self.closed {
            bail!("video sink already closed");
        }
        let tx = match &self.tx {
            Some(tx) => tx.clone(),
            None => self.start()?,
        };
        if tx.send(frame.as_raw().clone()).is_err() {
            // 编码线程提前退出, 取回它的错误
            self.finish()?;
            bail!("video encoder stopped after {} frames", self.written);
        }
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.written == 0 && !self.closed {
            log::warn!("⚠️  没有帧写入, 未生成 {}", self.path.display());
        }
        self.finish()
    }
}
