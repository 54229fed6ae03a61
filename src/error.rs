// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 错误类型定义
// Error types shared by the zone registry, postprocessor, detectors and pipeline

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::PipelineState;

/// 区域矩形非法 (x_max <= x_min 或 y_max <= y_min)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid zone ({x_min}, {y_min}, {x_max}, {y_max}): max must be greater than min on both axes")]
pub struct InvalidZoneError {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

/// 区域文件加载错误 (始终可恢复: 调用方记录日志后使用空区域表)
#[derive(Debug, Error)]
pub enum ZoneFileError {
    #[error("failed to read zone file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported zone file extension: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("malformed npy file: {0}")]
    Npy(String),

    #[error("malformed zone json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zone {index} rejected: {source}")]
    InvalidZone {
        index: usize,
        #[source]
        source: InvalidZoneError,
    },
}

/// 检测器输出形状不符合 [N, 6+]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostprocessError {
    #[error("detector output has {0} columns, expected at least 6")]
    TooFewColumns(usize),
}

/// 检测器推理错误
///
/// `Transient` 表示可以重试一次的临时失败 (例如设备忙),
/// `Fatal` 表示本次运行必须终止。
#[derive(Debug, Error)]
pub enum InferError {
    #[error("transient inference failure: {0}")]
    Transient(String),

    #[error("inference failed: {0}")]
    Fatal(#[from] anyhow::Error),
}

/// 流水线错误: 每个变体对应一个可区分的失败终止原因
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to load detector: {0}")]
    DetectorLoad(#[source] anyhow::Error),

    #[error("failed to open frame source: {0}")]
    SourceOpen(#[source] anyhow::Error),

    #[error("failed to open frame sink: {0}")]
    SinkOpen(#[source] anyhow::Error),

    #[error("failed to read frame {frame}: {source}")]
    FrameRead {
        frame: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("inference failed on frame {frame}: {source}")]
    Inference {
        frame: u64,
        #[source]
        source: InferError,
    },

    #[error("unusable detector output on frame {frame}: {source}")]
    Postprocess {
        frame: u64,
        #[source]
        source: PostprocessError,
    },

    #[error("failed to write frame {frame}: {source}")]
    SinkWrite {
        frame: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to persist stats to {path}: {source}")]
    StatsPersist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pipeline transition: {action} requires {expected:?}, current state is {actual:?}")]
    InvalidState {
        action: &'static str,
        expected: PipelineState,
        actual: PipelineState,
    },
}

/// 配置错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("confidence threshold must be within [0, 1], got {0}")]
    Threshold(f32),

    #[error("max people per queue must be at least 1")]
    MaxPeople,

    #[error("detector input size must be non-zero, got {0}x{1}")]
    InputSize(u32, u32),

    #[error("unknown device '{0}', expected CPU, CUDA[:id] or TRT[:id]")]
    Device(String),
}
