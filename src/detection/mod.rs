/// 检测结果处理 (Detection)
///
/// - types:       单帧检测框
/// - postprocess: 置信度过滤 + 坐标反归一化
pub mod postprocess;
pub mod types;

pub use postprocess::{denormalize, Postprocessor, DEFAULT_THRESHOLD};
pub use types::Detection;
