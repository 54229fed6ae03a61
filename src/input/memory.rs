// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 内存帧来源/输出

use std::collections::VecDeque;

use anyhow::{bail, Result};
use image::RgbImage;

use super::{check_dimensions, FrameSink, FrameSource, VideoInfo};

/// 内存帧来源
pub struct MemorySource {
    info: VideoInfo,
    frames: VecDeque<RgbImage>,
    closed: bool,
}

impl MemorySource {
    /// 所有帧必须与第一帧尺寸相同
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Result<Self> {
        let (width, height) = frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));
        let info = VideoInfo { width, height, fps };
        for frame in &frames {
            check_dimensions(&info, frame)?;
        }
        Ok(Self {
            info,
            frames: frames.into(),
            closed: false,
        })
    }

    /// `count` 帧纯色画面
    pub fn solid(count: usize, width: u32, height: u32, fps: f64) -> Self {
        Self {
            info: VideoInfo { width, height, fps },
            frames: (0..count)
                .map(|i| RgbImage::from_pixel(width, height, image::Rgb([(i % 256) as u8, 64, 128])))
                .collect(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.closed {
            bail!("source already closed");
        }
        Ok(self.frames.pop_front())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// 内存帧输出
#[derive(Default)]
pub struct MemorySink {
    info: Option<VideoInfo>,
    frames: Vec<RgbImage>,
    closed: bool,
}

impl MemorySink {
    pub fn new(info: VideoInfo) -> Self {
        Self {
            info: Some(info),
            ..Default::default()
        }
    }

    pub fn frames(&self) -> &[RgbImage] {
        &self.frames
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if self.closed {
            bail!("sink already closed");
        }
        if let Some(info) = &self.info {
            check_dimensions(info, frame)?;
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
