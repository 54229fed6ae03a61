/// 检测器统一接口与实现
///
/// # 架构说明
///
/// 流水线只通过 [`Detector`] trait 调用检测器, 不关心模型格式和硬件加速:
/// - **StubDetector**: 按脚本返回固定输出, 用于测试与演示
/// - **OrtDetector**:  ONNX Runtime 推理 (需要 `onnx` feature)
///
/// ## 核心流程
/// ```text
/// 原始帧 → Preprocessor → [1, 3, H, W] 张量
///          ↓
///     Detector::infer (阻塞直到结果可用)
///          ↓
///     [N, 6] 归一化输出 → Postprocessor → 像素坐标检测框
/// ```
use ndarray::{Array2, Array4};

use crate::error::InferError;

/// 统一的检测器接口
///
/// 每次调用处理一帧, 调用方同一时间只有一个请求在执行。
pub trait Detector {
    /// 检测器名称
    fn name(&self) -> &str;

    /// 输入尺寸 (width, height), 对应输入形状 [1, 3, height, width]
    fn input_size(&self) -> (u32, u32);

    /// 推理: 预处理后的张量 → 候选检测 [N, 6]
    ///
    /// 每行 [class, score, x1, y1, x2, y2], 坐标归一化到 [0, 1]。
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array2<f32>, InferError>;

    /// 打印模型信息
    fn summary(&self) {
        let (w, h) = self.input_size();
        log::info!("📦 检测器: {} | 输入 [1, 3, {}, {}]", self.name(), h, w);
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn input_size(&self) -> (u32, u32) {
        (**self).input_size()
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array2<f32>, InferError> {
        (**self).infer(input)
    }

    fn summary(&self) {
        (**self).summary()
    }
}

/// 从模型声明的输入形状 [1, 3, H, W] 取 (width, height)
///
/// 动态维度 (<= 0) 使用 `fallback` 中对应的值; 静态维度优先于 `fallback`。
pub fn declared_input_size(dims: &[i64], fallback: (u32, u32)) -> anyhow::Result<(u32, u32)> {
    let [_, channels, height, width] = dims else {
        anyhow::bail!("expected a [1, 3, H, W] input, model declares {:?}", dims);
    };
    if *channels > 0 && *channels != 3 {
        anyhow::bail!("expected 3 input channels, model declares {:?}", dims);
    }

    let pick = |declared: i64, fallback: u32| -> anyhow::Result<u32> {
        if declared <= 0 {
            return Ok(fallback);
        }
        u32::try_from(declared)
            .map_err(|_| anyhow::anyhow!("input dimension {} out of range", declared))
    };
    let size = (pick(*width, fallback.0)?, pick(*height, fallback.1)?);
    if size != fallback {
        log::info!(
            "📐 使用模型声明的输入尺寸 {}x{} (命令行 {}x{})",
            size.0,
            size.1,
            fallback.0,
            fallback.1
        );
    }
    Ok(size)
}

pub mod ssd;
pub mod stub;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use ssd::decode_ssd_output;
pub use stub::{ScriptedFailure, StubDetector};
#[cfg(feature = "onnx")]
pub use onnx::OrtDetector;
