// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 视频处理流水线 (Pipeline Runner)
//
// 状态机:
//   Uninitialized → ModelLoaded → Running → Finalized
//          └──────────────┴───────────┴──→ Failed
//
// 单线程顺序执行, 每帧: 预处理 → 推理 (阻塞) → 后处理 → 区域统计 → 叠加绘制 → 写出

pub mod stats;

use std::path::PathBuf;
use std::time::Instant;

use image::RgbImage;
use ndarray::{Array2, Array4};

use crate::config::PipelineConfig;
use crate::detection::{Detection, Postprocessor};
use crate::error::{InferError, PipelineError};
use crate::input::{FrameSink, FrameSource, VideoInfo};
use crate::models::Detector;
use crate::preprocess::Preprocessor;
use crate::render::OverlayRenderer;
use crate::zones::{FrameOccupancy, ZoneRegistry, ZONE_CROPS_DIR};

pub use stats::{PipelineStats, STATS_FILE};

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    ModelLoaded,
    Running,
    Finalized,
    Failed,
}

/// 单帧处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    /// 帧序号, 从1开始
    pub index: u64,
    /// 画面中超过阈值的检测数
    pub people: usize,
    pub occupancy: FrameOccupancy,
}

/// 一次完整运行的结果
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: PipelineStats,
    pub frames: Vec<FrameReport>,
    /// 写出的 stats.txt 路径
    pub stats_path: Option<PathBuf>,
}

impl RunReport {
    pub fn frame_count(&self) -> u64 {
        self.stats.frame_count()
    }
}

/// 流水线
///
/// 区域表与统计只属于流水线自己, 区域表在运行期间只读。
pub struct Pipeline<D: Detector> {
    config: PipelineConfig,
    zones: ZoneRegistry,
    renderer: OverlayRenderer,
    postprocessor: Postprocessor,
    detector: Option<D>,
    preprocessor: Option<Preprocessor>,
    stats: PipelineStats,
    state: PipelineState,
}

impl<D: Detector> Pipeline<D> {
    pub fn new(config: PipelineConfig, zones: ZoneRegistry, renderer: OverlayRenderer) -> Self {
        let postprocessor = Postprocessor::new(config.threshold);
        Self {
            config,
            zones,
            renderer,
            postprocessor,
            detector: None,
            preprocessor: None,
            stats: PipelineStats::new(),
            state: PipelineState::Uninitialized,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn zones(&self) -> &ZoneRegistry {
        &self.zones
    }

    pub fn detector(&self) -> Option<&D> {
        self.detector.as_ref()
    }

    fn expect_state(&self, action: &'static str, expected: PipelineState) -> Result<(), PipelineError> {
        if self.state != expected {
            return Err(PipelineError::InvalidState {
                action,
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        self.state = PipelineState::Failed;
        log::error!("❌ {}", err);
        err
    }

    /// Uninitialized → ModelLoaded: 加载检测器并记录加载耗时
    pub fn load_detector<F>(&mut self, load: F) -> Result<(), PipelineError>
    where
        F: FnOnce() -> anyhow::Result<D>,
    {
        self.expect_state("load_detector", PipelineState::Uninitialized)?;

        let start = Instant::now();
        let detector = match load() {
            Ok(d) => d,
            Err(e) => return Err(self.fail(PipelineError::DetectorLoad(e))),
        };
        self.stats.record_model_load(start.elapsed());

        detector.summary();
        self.preprocessor = Some(self.config.preprocessor(detector.input_size()));
        self.detector = Some(detector);
        self.state = PipelineState::ModelLoaded;
        log::info!(
            "✅ 检测模型加载成功, 耗时 {:.3}s",
            self.stats.model_load_seconds()
        );
        Ok(())
    }

    /// ModelLoaded → Running → Finalized
    ///
    /// 读到帧来源结束即正常完成; 打开失败、读帧失败、推理失败或写出失败都会进入 Failed。
    /// 无论成功失败, 已打开的来源和输出都会被关闭。
    pub fn run<S, K, OS, OK>(&mut self, open_source: OS, open_sink: OK) -> Result<RunReport, PipelineError>
    where
        S: FrameSource,
        K: FrameSink,
        OS: FnOnce() -> anyhow::Result<S>,
        OK: FnOnce(&VideoInfo) -> anyhow::Result<K>,
    {
        self.expect_state("run", PipelineState::ModelLoaded)?;
        self.state = PipelineState::Running;

        let mut source = match open_source() {
            Ok(s) => s,
            Err(e) => return Err(self.fail(PipelineError::SourceOpen(e))),
        };
        let info = source.info();
        let mut sink = match open_sink(&info) {
            Ok(k) => k,
            Err(e) => {
                source.close();
                return Err(self.fail(PipelineError::SinkOpen(e)));
            }
        };
        log::info!(
            "🎬 开始处理: {}x{} @ {} fps, {} 个区域",
            info.width,
            info.height,
            info.fps,
            self.zones.len()
        );

        let result = self.process_frames(&mut source, &mut sink);

        source.close();
        let closed = sink.close();

        let frames = match result {
            Ok(frames) => frames,
            Err(e) => {
                if let Err(close_err) = closed {
                    log::warn!("⚠️  关闭输出失败: {}", close_err);
                }
                return Err(self.fail(e));
            }
        };
        if let Err(e) = closed {
            let frame = self.stats.frame_count();
            return Err(self.fail(PipelineError::SinkWrite { frame, source: e }));
        }

        self.finalize(frames)
    }

    /// Running → Finalized: 计算平均FPS并写出统计文件
    fn finalize(&mut self, frames: Vec<FrameReport>) -> Result<RunReport, PipelineError> {
        let fps = self.stats.finalize();
        let output_dir = self.config.output_dir.clone();
        let stats_path = match &output_dir {
            Some(dir) => match self.stats.persist(dir) {
                Ok(path) => Some(path),
                Err(source) => {
                    let path = dir.join(STATS_FILE);
                    return Err(self.fail(PipelineError::StatsPersist { path, source }));
                }
            },
            None => None,
        };

        self.state = PipelineState::Finalized;
        log::info!(
            "✅ 处理完成: {} 帧, 推理总耗时 {:.1}s, 平均 {:.2} fps, 模型加载 {:.3}s",
            self.stats.frame_count(),
            self.stats.total_inference_seconds(),
            fps,
            self.stats.model_load_seconds()
        );

        Ok(RunReport {
            stats: self.stats.clone(),
            frames,
            stats_path,
        })
    }

    fn process_frames<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<Vec<FrameReport>, PipelineError>
    where
        S: FrameSource,
        K: FrameSink,
    {
        let mut reports = Vec::new();
        loop {
            let index = self.stats.frame_count() + 1;
            let start = Instant::now();

            let mut frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    return Err(PipelineError::FrameRead {
                        frame: index,
                        source: e,
                    })
                }
            };

            let report = self.process_frame(index, &mut frame)?;

            sink.write_frame(&frame)
                .map_err(|e| PipelineError::SinkWrite {
                    frame: index,
                    source: e,
                })?;
            self.stats.record_frame(start.elapsed());
            reports.push(report);
        }
        Ok(reports)
    }

    /// 单帧: 预处理 → 推理 → 后处理 → 区域统计 → 绘制
    fn process_frame(&mut self, index: u64, frame: &mut RgbImage) -> Result<FrameReport, PipelineError> {
        let Self {
            config,
            zones,
            renderer,
            postprocessor,
            detector,
            preprocessor,
            state,
            ..
        } = self;
        let (Some(detector), Some(preprocessor)) = (detector.as_mut(), preprocessor.as_ref()) else {
            return Err(PipelineError::InvalidState {
                action: "process_frame",
                expected: PipelineState::Running,
                actual: *state,
            });
        };

        let tensor = preprocessor.preprocess(frame);
        let raw = infer_with_retry(detector, index, &tensor)?;

        let (w, h) = frame.dimensions();
        let detections: Vec<Detection> = postprocessor
            .postprocess(raw.view(), w, h)
            .map_err(|source| PipelineError::Postprocess { frame: index, source })?;
        let occupancy = zones.evaluate(&detections);

        // 调试级别时保存未绘制的区域子图
        if log::log_enabled!(log::Level::Debug) {
            if let Some(dir) = &config.output_dir {
                let dir = dir.join(ZONE_CROPS_DIR);
                if let Err(e) = zones.save_crops(frame, &dir, &format!("{:06}", index)) {
                    log::warn!("⚠️  区域子图保存失败: {:#}", e);
                }
            }
        }

        renderer.draw(frame, &detections);
        renderer.draw_occupancy_text(frame, &occupancy, config.max_people);

        log::debug!("👥 第{}帧 画面总人数 = {}", index, detections.len());
        log::debug!("📊 排队人数 = {}", occupancy);

        Ok(FrameReport {
            index,
            people: detections.len(),
            occupancy,
        })
    }
}

/// 推理; 可重试错误只重试一次
fn infer_with_retry<D: Detector>(
    detector: &mut D,
    frame: u64,
    tensor: &Array4<f32>,
) -> Result<Array2<f32>, PipelineError> {
    match detector.infer(tensor) {
        Ok(raw) => Ok(raw),
        Err(InferError::Transient(msg)) => {
            log::warn!("⚠️  第{}帧推理失败 ({}), 重试一次", frame, msg);
            detector
                .infer(tensor)
                .map_err(|source| PipelineError::Inference { frame, source })
        }
        Err(source) => Err(PipelineError::Inference { frame, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{MemorySink, MemorySource};
    use crate::models::{ScriptedFailure, StubDetector};
    use anyhow::anyhow;
    use ndarray::array;

    fn registry() -> ZoneRegistry {
        let mut zones = ZoneRegistry::new();
        zones.add_zone(0, 0, 50, 40).unwrap();
        zones.add_zone(50, 0, 100, 40).unwrap();
        zones
    }

    fn pipeline(detector: StubDetector) -> Pipeline<StubDetector> {
        let mut p = Pipeline::new(PipelineConfig::default(), registry(), OverlayRenderer::new(None));
        p.load_detector(move || Ok(detector)).unwrap();
        p
    }

    #[test]
    fn test_state_transitions() {
        let mut p: Pipeline<StubDetector> =
            Pipeline::new(PipelineConfig::default(), registry(), OverlayRenderer::new(None));
        assert_eq!(p.state(), PipelineState::Uninitialized);

        // 未加载模型不能运行
        let res = p.run(
            || Ok(MemorySource::solid(1, 100, 40, 25.0)),
            |info| Ok(MemorySink::new(*info)),
        );
        assert!(matches!(res, Err(PipelineError::InvalidState { .. })));
        assert_eq!(p.state(), PipelineState::Uninitialized);

        p.load_detector(|| Ok(StubDetector::empty(32, 16))).unwrap();
        assert_eq!(p.state(), PipelineState::ModelLoaded);

        let report = p
            .run(
                || Ok(MemorySource::solid(3, 100, 40, 25.0)),
                |info| Ok(MemorySink::new(*info)),
            )
            .unwrap();
        assert_eq!(p.state(), PipelineState::Finalized);
        assert_eq!(report.frame_count(), 3);
        assert!(report.stats.average_fps().is_some());
        assert!(report.stats_path.is_none());
    }

    #[test]
    fn test_detector_load_failure() {
        let mut p: Pipeline<StubDetector> =
            Pipeline::new(PipelineConfig::default(), registry(), OverlayRenderer::new(None));
        let res = p.load_detector(|| Err(anyhow!("model.xml not found")));
        assert!(matches!(res, Err(PipelineError::DetectorLoad(_))));
        assert_eq!(p.state(), PipelineState::Failed);
    }

    #[test]
    fn test_counts_people_per_zone() {
        // 帧宽100: 第一个框在区域1, 第二个在区域2, 第三个低于阈值
        let raw = array![
            [1.0f32, 0.9, 0.1, 0.1, 0.4, 0.9],
            [1.0, 0.7, 0.6, 0.0, 0.9, 1.0],
            [1.0, 0.2, 0.1, 0.1, 0.2, 0.2],
        ];
        let mut p = pipeline(StubDetector::constant(32, 16, raw));
        let report = p
            .run(
                || Ok(MemorySource::solid(2, 100, 40, 25.0)),
                |info| Ok(MemorySink::new(*info)),
            )
            .unwrap();

        assert_eq!(report.frames.len(), 2);
        for (i, frame) in report.frames.iter().enumerate() {
            assert_eq!(frame.index, i as u64 + 1);
            assert_eq!(frame.people, 2);
            assert_eq!(frame.occupancy.iter().collect::<Vec<_>>(), vec![(1, 1), (2, 1)]);
        }
    }

    #[test]
    fn test_source_open_failure() {
        let mut p = pipeline(StubDetector::empty(32, 16));
        let res = p.run(
            || -> anyhow::Result<MemorySource> { Err(anyhow!("cannot open video")) },
            |info| Ok(MemorySink::new(*info)),
        );
        assert!(matches!(res, Err(PipelineError::SourceOpen(_))));
        assert_eq!(p.state(), PipelineState::Failed);
        assert_eq!(p.detector().map(StubDetector::calls), Some(0));
    }

    #[test]
    fn test_transient_failure_retried_once() {
        let detector = StubDetector::empty(32, 16).with_failure(ScriptedFailure::Transient(1));
        let mut p = pipeline(detector);
        let report = p
            .run(
                || Ok(MemorySource::solid(3, 100, 40, 25.0)),
                |info| Ok(MemorySink::new(*info)),
            )
            .unwrap();
        assert_eq!(report.frame_count(), 3);
        assert_eq!(p.detector().map(StubDetector::calls), Some(4));
    }

    #[test]
    fn test_fatal_failure_aborts_run() {
        let detector = StubDetector::empty(32, 16).with_failure(ScriptedFailure::Fatal(2));
        let mut p = pipeline(detector);
        let res = p.run(
            || Ok(MemorySource::solid(5, 100, 40, 25.0)),
            |info| Ok(MemorySink::new(*info)),
        );
        match res {
            Err(PipelineError::Inference { frame, .. }) => assert_eq!(frame, 3),
            other => panic!("unexpected result: {:?}", other.map(|r| r.frame_count())),
        }
        assert_eq!(p.state(), PipelineState::Failed);
        assert_eq!(p.stats().frame_count(), 2);
    }

    #[test]
    fn test_bad_detector_output_fails_run() {
        let mut p = pipeline(StubDetector::constant(32, 16, Array2::zeros((2, 4))));
        let res = p.run(
            || Ok(MemorySource::solid(1, 100, 40, 25.0)),
            |info| Ok(MemorySink::new(*info)),
        );
        assert!(matches!(res, Err(PipelineError::Postprocess { frame: 1, .. })));
    }
}
