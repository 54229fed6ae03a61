/// 视频输入输出 (Frame Source / Sink)
///
/// 按显示顺序逐帧读取, 按相同顺序写出标注帧
/// - FrameSource / FrameSink: 流水线依赖的读写接口
/// - ImageSequenceSource / ImageSequenceSink: 图片序列目录
/// - VideoFileSource / VideoFileSink: 视频文件 (feature `video`)
/// - MemorySource / MemorySink: 内存实现 (测试与合成数据)
pub mod memory;
pub mod sequence;
#[cfg(feature = "video")]
pub mod video;

use anyhow::Result;
use image::RgbImage;

pub use memory::{MemorySink, MemorySource};
pub use sequence::{ImageSequenceSink, ImageSequenceSource};
#[cfg(feature = "video")]
pub use video::{VideoFileSink, VideoFileSource};

/// 视频元数据
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// 帧来源
pub trait FrameSource {
    fn info(&self) -> VideoInfo;

    /// 读取下一帧; `Ok(None)` 表示正常结束
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// 释放资源, 可重复调用
    fn close(&mut self) {}
}

/// 标注帧输出
pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// 刷新并释放资源, 可重复调用
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 帧尺寸必须与视频元数据一致
pub(crate) fn check_dimensions(info: &VideoInfo, frame: &RgbImage) -> Result<()> {
    let (w, h) = frame.dimensions();
    if (w, h) != (info.width, info.height) {
        anyhow::bail!(
            "frame is {}x{}, stream is {}x{}",
            w,
            h,
            info.width,
            info.height
        );
    }
    Ok(())
}
