// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 运行统计
// 模型加载耗时、推理总耗时、帧数、平均FPS

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 统计文件名
pub const STATS_FILE: &str = "stats.txt";

/// 流水线统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    model_load_seconds: f64,
    total_inference_seconds: f64,
    frame_count: u64,
    average_fps: Option<f64>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只在模型加载完成时记录一次
    pub fn record_model_load(&mut self, elapsed: Duration) {
        self.model_load_seconds = elapsed.as_secs_f64();
    }

    /// 累计一帧的耗时
    pub fn record_frame(&mut self, elapsed: Duration) {
        self.total_inference_seconds += elapsed.as_secs_f64();
        self.frame_count += 1;
    }

    /// 计算平均FPS; 总耗时为 0 时记为 0
    pub fn finalize(&mut self) -> f64 {
        let fps = if self.total_inference_seconds > 0.0 {
            self.frame_count as f64 / self.total_inference_seconds
        } else {
            0.0
        };
        self.average_fps = Some(fps);
        fps
    }

    pub fn model_load_seconds(&self) -> f64 {
        self.model_load_seconds
    }

    pub fn total_inference_seconds(&self) -> f64 {
        self.total_inference_seconds
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// `finalize` 之前为 `None`
    pub fn average_fps(&self) -> Option<f64> {
        self.average_fps
    }

    /// 统计文件内容: 推理总耗时 (1位小数)、平均FPS、模型加载耗时, 每行一个
    pub fn to_record(&self) -> String {
        format!(
            "{:.1}\n{}\n{}\n",
            self.total_inference_seconds,
            self.average_fps.unwrap_or(0.0),
            self.model_load_seconds
        )
    }

    /// 写入 `<dir>/stats.txt`, 返回文件路径
    pub fn persist(&self, dir: &Path) -> std::io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(STATS_FILE);
        fs::write(&path, self.to_record())?;
        Ok(path)
    }
}
