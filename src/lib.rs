// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 运行参数
pub mod detection; // 检测结果与后处理
pub mod error; // 错误类型
pub mod input; // 帧来源与输出
pub mod models; // 检测器接口与实现
pub mod pipeline; // 处理流水线
pub mod preprocess; // 输入张量预处理
pub mod render; // 检测框与排队人数叠加
pub mod zones; // 排队区域

pub use crate::config::{Args, Device, PipelineConfig};
pub use crate::detection::{Detection, Postprocessor};
pub use crate::error::{InferError, PipelineError};
pub use crate::input::{FrameSink, FrameSource, VideoInfo};
pub use crate::models::{Detector, StubDetector};
pub use crate::pipeline::{FrameReport, Pipeline, PipelineState, PipelineStats, RunReport};
pub use crate::preprocess::{ChannelOrder, Preprocessor};
pub use crate::render::OverlayRenderer;
pub use crate::zones::{FrameOccupancy, Zone, ZoneRegistry};
