// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
use anyhow::Result;
use clap::Parser;
/// 排队人数监控
///
/// 主程序入口 - 直接运行: cargo run --bin queue_monitor --release -- --model stub --source frames/
///
/// 默认构建只能使用 `--model stub` 与图片目录输入。
/// - `--features onnx`: 加载 .onnx 检测模型
/// - `--features video`: `--source` 为视频文件时解码输入并写出 output_video.mp4
///
/// cargo run --bin queue_monitor --release --features onnx,video -- --model person.onnx --source queue.mp4 --queue-param zones.npy
use queue_monitor_rs::config::{Args, PipelineConfig};
use queue_monitor_rs::input::sequence::OUTPUT_FRAMES_DIR;
use queue_monitor_rs::input::{ImageSequenceSink, ImageSequenceSource};
use queue_monitor_rs::models::{Detector, StubDetector};
use queue_monitor_rs::pipeline::{Pipeline, RunReport};
use queue_monitor_rs::render::OverlayRenderer;
use queue_monitor_rs::zones::load_registry;

/// 不加载模型, 检测结果始终为空
const STUB_MODEL: &str = "stub";

fn load_detector(args: &Args) -> Result<Box<dyn Detector>> {
    if args.model == STUB_MODEL {
        return Ok(Box::new(StubDetector::empty(args.input_width, args.input_height)));
    }
    load_onnx(args)
}

#[cfg(feature = "onnx")]
fn load_onnx(args: &Args) -> Result<Box<dyn Detector>> {
    let detector = queue_monitor_rs::models::OrtDetector::new(
        std::path::Path::new(&args.model),
        args.device,
        args.input_width,
        args.input_height,
    )?;
    Ok(Box::new(detector))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(args: &Args) -> Result<Box<dyn Detector>> {
    anyhow::bail!(
        "cannot load {} on {}: built without the `onnx` feature",
        args.model,
        args.device
    )
}

type Monitor = Pipeline<Box<dyn Detector>>;

fn run_frames(pipeline: &mut Monitor, args: &Args) -> Result<RunReport> {
    let frames_dir = args.output_path.join(OUTPUT_FRAMES_DIR);
    let report = pipeline.run(
        || ImageSequenceSource::open(&args.source, args.fps),
        |info| ImageSequenceSink::create(&frames_dir, *info),
    )?;
    Ok(report)
}

#[cfg(feature = "video")]
fn run_video(pipeline: &mut Monitor, args: &Args) -> Result<RunReport> {
    use queue_monitor_rs::input::{VideoFileSink, VideoFileSource};

    let report = pipeline.run(
        || VideoFileSource::open(&args.source, args.fps),
        |info| VideoFileSink::create(&args.output_path, *info),
    )?;
    Ok(report)
}

#[cfg(not(feature = "video"))]
fn run_video(_pipeline: &mut Monitor, args: &Args) -> Result<RunReport> {
    anyhow::bail!(
        "cannot read video {}: built without the `video` feature",
        args.source.display()
    )
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = PipelineConfig::try_from(&args)?;

    log::info!("🚀 排队人数监控启动");
    log::info!("📦 检测模型: {} ({})", args.model, args.device);
    log::info!("📹 输入: {}", args.source.display());
    log::info!("💾 输出: {}", args.output_path.display());

    // 区域文件缺失或损坏时继续运行, 区域表为空
    let zones = load_registry(args.queue_param.as_deref());
    let renderer = OverlayRenderer::with_font_path(args.font.as_deref())?;

    let mut pipeline: Monitor = Pipeline::new(config, zones, renderer);
    pipeline.load_detector(|| load_detector(&args))?;

    // 文件按视频解码, 目录按图片序列读取
    let report = if args.source.is_file() {
        run_video(&mut pipeline, &args)?
    } else {
        run_frames(&mut pipeline, &args)?
    };

    if let Some(path) = &report.stats_path {
        log::info!("📊 统计已写入 {}", path.display());
    }
    Ok(())
}
