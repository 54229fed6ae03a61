// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 运行参数
// 命令行 Args → 流水线使用的 PipelineConfig

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

use crate::detection::DEFAULT_THRESHOLD;
use crate::error::ConfigError;
use crate::preprocess::{ChannelOrder, Preprocessor};

/// 默认每个队列的人数上限
pub const DEFAULT_MAX_PEOPLE: u32 = 2;

/// person-detection-retail-0013 输入尺寸
pub const DEFAULT_INPUT_WIDTH: u32 = 544;
pub const DEFAULT_INPUT_HEIGHT: u32 = 320;

/// 推理设备
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(i32),
    TensorRt(i32),
}

impl FromStr for Device {
    type Err = ConfigError;

    /// `CPU`, `CUDA`, `CUDA:1`, `TRT`, `TRT:0` (不区分大小写)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let (kind, id) = match lower.split_once(':') {
            Some((kind, id)) => {
                let id = id
                    .parse::<i32>()
                    .map_err(|_| ConfigError::Device(s.to_string()))?;
                (kind, id)
            }
            None => (lower.as_str(), 0),
        };
        match kind {
            "cpu" if !lower.contains(':') => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(id)),
            "trt" | "tensorrt" => Ok(Device::TensorRt(id)),
            _ => Err(ConfigError::Device(s.to_string())),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
            Device::Cuda(id) => write!(f, "CUDA:{}", id),
            Device::TensorRt(id) => write!(f, "TRT:{}", id),
        }
    }
}

/// 排队人数监控
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "排队区域人数监控", long_about = None)]
pub struct Args {
    /// ONNX模型路径 (`stub` 使用无检测结果的测试检测器)
    #[arg(long)]
    pub model: String,

    /// 推理设备: CPU, CUDA[:id], TRT[:id]
    #[arg(long, default_value = "CPU")]
    pub device: Device,

    /// 输入: 图片目录 (按文件名排序) 或视频文件 (feature `video`)
    #[arg(long)]
    pub source: PathBuf,

    /// 区域文件 (.npy 形状 (N, 4) 或 .json)
    #[arg(long)]
    pub queue_param: Option<PathBuf>,

    /// 输出目录 (标注帧或 output_video.mp4, 以及 stats.txt)
    #[arg(long, default_value = "results")]
    pub output_path: PathBuf,

    /// 队列人数上限, 达到后提示排队已满
    #[arg(long, default_value_t = DEFAULT_MAX_PEOPLE)]
    pub max_people: u32,

    /// 置信度阈值
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f32,

    /// 模型输入宽度 (仅在模型输入为动态尺寸时使用)
    #[arg(long, default_value_t = DEFAULT_INPUT_WIDTH)]
    pub input_width: u32,

    /// 模型输入高度 (仅在模型输入为动态尺寸时使用)
    #[arg(long, default_value_t = DEFAULT_INPUT_HEIGHT)]
    pub input_height: u32,

    /// 输入张量通道顺序
    #[arg(long, value_enum, default_value_t = ChannelOrder::Bgr)]
    pub channel_order: ChannelOrder,

    /// 输入帧率 (仅用于记录)
    #[arg(long, default_value_t = 25.0)]
    pub fps: f64,

    /// 叠加文字使用的 TrueType 字体
    #[arg(long)]
    pub font: Option<PathBuf>,
}

/// 流水线参数
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub threshold: f32,
    pub max_people: u32,
    pub channel_order: ChannelOrder,
    /// 为 `None` 时不写 stats.txt
    pub output_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_people: DEFAULT_MAX_PEOPLE,
            channel_order: ChannelOrder::default(),
            output_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::Threshold(self.threshold));
        }
        if self.max_people == 0 {
            return Err(ConfigError::MaxPeople);
        }
        Ok(())
    }

    /// 根据检测器输入尺寸构建预处理器
    pub fn preprocessor(&self, input_size: (u32, u32)) -> Preprocessor {
        Preprocessor::new(input_size.0, input_size.1).with_channel_order(self.channel_order)
    }
}

impl TryFrom<&Args> for PipelineConfig {
    type Error = ConfigError;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        if args.input_width == 0 || args.input_height == 0 {
            return Err(ConfigError::InputSize(args.input_width, args.input_height));
        }
        let config = Self {
            threshold: args.threshold,
            max_people: args.max_people,
            channel_order: args.channel_order,
            output_dir: Some(args.output_path.clone()),
        };
        config.validate()?;
        Ok(config)
    }
}
