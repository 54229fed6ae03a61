// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 脚本化检测器
// 不加载任何模型, 按帧序号返回预先设定的输出

use anyhow::anyhow;
use ndarray::{Array2, Array4};

use super::Detector;
use crate::detection::types::RAW_COLUMNS;
use crate::error::InferError;

/// 在指定的调用次序上注入一次失败
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// 第 n 次调用 (从0开始) 返回可重试错误
    Transient(u64),
    /// 第 n 次调用 (从0开始) 返回致命错误
    Fatal(u64),
}

/// 测试用检测器
///
/// 输出按调用次序循环取自 `script`; 脚本为空时每帧都没有检测结果。
pub struct StubDetector {
    width: u32,
    height: u32,
    script: Vec<Array2<f32>>,
    failures: Vec<ScriptedFailure>,
    calls: u64,
}

impl StubDetector {
    /// 每帧都没有检测结果
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            script: Vec::new(),
            failures: Vec::new(),
            calls: 0,
        }
    }

    /// 每帧返回同一组输出
    pub fn constant(width: u32, height: u32, output: Array2<f32>) -> Self {
        Self::scripted(width, height, vec![output])
    }

    /// 第 i 帧返回 `script[i % len]`
    pub fn scripted(width: u32, height: u32, script: Vec<Array2<f32>>) -> Self {
        Self {
            script,
            ..Self::empty(width, height)
        }
    }

    pub fn with_failure(mut self, failure: ScriptedFailure) -> Self {
        self.failures.push(failure);
        self
    }

    /// 已调用次数
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Detector for StubDetector {
    fn name(&self) -> &str {
        "stub"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array2<f32>, InferError> {
        let call = self.calls;
        self.calls += 1;

        let expected = [1, 3, self.height as usize, self.width as usize];
        if input.shape() != expected {
            return Err(InferError::Fatal(anyhow!(
                "input shape {:?} does not match [1, 3, {}, {}]",
                input.shape(),
                self.height,
                self.width
            )));
        }

        for failure in &self.failures {
            match *failure {
                ScriptedFailure::Transient(n) if n == call => {
                    return Err(InferError::Transient(format!("scripted failure at call {}", n)))
                }
                ScriptedFailure::Fatal(n) if n == call => {
                    return Err(InferError::Fatal(anyhow!("scripted failure at call {}", n)))
                }
                _ => {}
            }
        }

        if self.script.is_empty() {
            return Ok(Array2::zeros((0, RAW_COLUMNS)));
        }
        let idx = (call % self.script.len() as u64) as usize;
        Ok(self.script[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_empty_returns_no_rows() {
        let mut det = StubDetector::empty(8, 4);
        let out = det.infer(&Array4::zeros((1, 3, 4, 8))).unwrap();
        assert_eq!(out.shape(), &[0, RAW_COLUMNS]);
        assert_eq!(det.calls(), 1);
    }

    #[test]
    fn test_script_cycles() {
        let a = array![[1.0f32, 0.9, 0.1, 0.1, 0.2, 0.2]];
        let b = Array2::zeros((0, RAW_COLUMNS));
        let mut det = StubDetector::scripted(8, 4, vec![a.clone(), b.clone()]);
        let input = Array4::zeros((1, 3, 4, 8));
        assert_eq!(det.infer(&input).unwrap(), a);
        assert_eq!(det.infer(&input).unwrap(), b);
        assert_eq!(det.infer(&input).unwrap(), a);
    }

    #[test]
    fn test_rejects_wrong_input_shape() {
        let mut det = StubDetector::empty(8, 4);
        let res = det.infer(&Array4::zeros((1, 3, 8, 4)));
        assert!(matches!(res, Err(InferError::Fatal(_))));
    }

    #[test]
    fn test_scripted_failures() {
        let mut det = StubDetector::empty(8, 4)
            .with_failure(ScriptedFailure::Transient(1))
            .with_failure(ScriptedFailure::Fatal(3));
        let input = Array4::zeros((1, 3, 4, 8));
        assert!(det.infer(&input).is_ok());
        assert!(matches!(det.infer(&input), Err(InferError::Transient(_))));
        assert!(det.infer(&input).is_ok());
        assert!(matches!(det.infer(&input), Err(InferError::Fatal(_))));
    }
}
