// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 检测器
// 包含: 模型加载 (CPU/CUDA/TensorRT)、同步推理、SSD 输出解码

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array2, Array4};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
    TensorRTExecutionProvider,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, ValueType};

use super::ssd::decode_ssd_output;
use super::{declared_input_size, Detector};
use crate::config::Device;
use crate::error::InferError;

fn ort_err<E: std::fmt::Display>(e: E) -> anyhow::Error {
    anyhow!("{}", e)
}

/// ONNX Runtime 行人检测模型
pub struct OrtDetector {
    session: Session,
    input_name: String,
    width: u32,
    height: u32,
    device: Device,
}

impl OrtDetector {
    /// 加载模型
    ///
    /// 输入尺寸取自模型声明的 [1, 3, H, W]; `width`, `height` 只在维度为动态时使用
    /// (person-detection-retail-0013 为 544x320)。
    pub fn new(model: &Path, device: Device, width: u32, height: u32) -> Result<Self> {
        // execution provider
        let ep: ExecutionProviderDispatch = match device {
            Device::Cpu => CPUExecutionProvider::default().build(),
            Device::Cuda(id) => CUDAExecutionProvider::default().with_device_id(id).build(),
            Device::TensorRt(id) => TensorRTExecutionProvider::default()
                .with_device_id(id)
                .build(),
        };

        let session = Session::builder()
            .map_err(ort_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_err)?
            .with_execution_providers([ep])
            .map_err(ort_err)?
            .commit_from_file(model)
            .map_err(ort_err)
            .with_context(|| format!("could not load model {}", model.display()))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| anyhow!("model {} declares no inputs", model.display()))?;
        let input_name = input.name.clone();
        // 输入尺寸以模型声明为准, 命令行参数只用于动态维度
        let (width, height) = match &input.input_type {
            ValueType::Tensor { shape, .. } => {
                let dims: Vec<i64> = shape.iter().copied().collect();
                declared_input_size(&dims, (width, height))?
            }
            other => bail!("model input {} is not a tensor: {:?}", input_name, other),
        };

        Ok(Self {
            session,
            input_name,
            width,
            height,
            device,
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

impl Detector for OrtDetector {
    fn name(&self) -> &str {
        "onnxruntime"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array2<f32>, InferError> {
        let tensor = Tensor::from_array(input.clone()).map_err(ort_err)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(ort_err)?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>().map_err(ort_err)?;
        Ok(decode_ssd_output(data)?)
    }

    fn summary(&self) {
        log::info!(
            "📦 检测器: onnxruntime | EP: {} | 输入 {} [1, 3, {}, {}]",
            self.device,
            self.input_name,
            self.height,
            self.width
        );
    }
}
