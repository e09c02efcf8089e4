//! # Video Keyframe Extractor
//!
//! Picks the frames of a video that change most from the frame before them.
//!
//! ## Usage
//! ```bash
//! # Single video processing
//! video-keyframes --input video.mp4 --output ./keyframes --max-keyframes 20
//!
//! # Benchmark mode
//! video-keyframes --benchmark --input video.mp4 --output ./results
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::prelude::*;
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use video_keyframes::decoder::FfmpegDecoder;
use video_keyframes::{
    cpu, system_info, KeyframeExtractor, PerformanceResult, PixelFormat, RunOptions, Settings,
};

/// Frame cap for benchmark runs when none is configured.
const BENCHMARK_FRAMES: usize = 1000;

#[derive(Parser)]
#[command(name = "video-keyframes")]
#[command(version)]
#[command(about = "Keyframe extraction with SIMD frame differencing")]
#[command(long_about = None)]
struct Args {
    /// Input video file path
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output directory for keyframes and reports
    #[arg(short, long, default_value = "./output")]
    output: PathBuf,

    /// Number of keyframes to select, frame 0 included
    #[arg(short = 'k', long)]
    max_keyframes: Option<usize>,

    /// Number of worker threads (0 = auto-detect)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Maximum number of keyframes to write (default: all selected)
    #[arg(short = 'm', long)]
    max_save: Option<usize>,

    /// Maximum frames to decode (default: whole video)
    #[arg(long)]
    max_frames: Option<usize>,

    /// FFmpeg executable path
    #[arg(long)]
    ffmpeg_path: Option<PathBuf>,

    /// Use the widest SIMD path the CPU supports
    #[arg(long)]
    use_simd: Option<bool>,

    /// Bytes per parallel work unit when differencing a frame pair
    #[arg(long)]
    block_size: Option<usize>,

    /// Pixel format requested from the decoder
    #[arg(long)]
    pixel_format: Option<PixelFormat>,

    /// TOML settings file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run the benchmark suite instead of a single extraction
    #[arg(long)]
    benchmark: bool,

    /// Print detected CPU features and exit
    #[arg(long)]
    cpu_info: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => Settings::default(),
        };

        let extractor = &mut settings.extractor;
        if let Some(path) = &self.ffmpeg_path {
            extractor.decoder_path = path.clone();
        }
        if let Some(threads) = self.threads {
            extractor.thread_count = threads;
        }
        if let Some(format) = self.pixel_format {
            extractor.pixel_format = format;
        }
        extractor.verbose |= self.verbose;

        let run = &mut settings.run;
        if let Some(k) = self.max_keyframes {
            run.max_keyframes = k;
        }
        if self.max_frames.is_some() {
            run.max_frames = self.max_frames;
        }
        if self.max_save.is_some() {
            run.max_save = self.max_save;
        }
        if self.use_simd.is_some() {
            run.use_simd = self.use_simd;
        }
        if self.block_size.is_some() {
            run.block_size = self.block_size;
        }
        Ok(settings)
    }

    fn require_input(&self) -> Result<&Path> {
        let video_path = self
            .input
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Please specify input video file --input <path>"))?;
        if !video_path.exists() {
            anyhow::bail!("Video file not found: {}", video_path.display());
        }
        Ok(video_path)
    }
}

fn init_tracing(settings: &Settings) {
    let fallback = if settings.extractor.verbose {
        "debug"
    } else {
        settings.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn print_cpu_info() {
    println!("🔧 CPU Features:");
    let features = cpu::cpu_features();
    let mut entries: Vec<_> = features.to_map().into_iter().collect();
    entries.sort();
    for (name, supported) in entries {
        let mark = if supported { "✅" } else { "❌" };
        println!("  {mark} {name}");
    }
    println!("  ⚙️  Difference engine tier: {}", features.best_tier());
    for (key, value) in system_info() {
        println!("  {key}: {value}");
    }
}

fn print_result(result: &PerformanceResult) {
    let share = |part: f64| {
        if result.total_time_ms() > 0.0 {
            part / result.total_time_ms() * 100.0
        } else {
            0.0
        }
    };
    println!("\n⚡ Test Results: {}", result.test_name());
    println!(
        "  🕐 Total time: {:.2}ms ({:.2}s)",
        result.total_time_ms(),
        result.total_time_ms() / 1000.0
    );
    println!(
        "  📥 Extraction: {:.2}ms ({:.1}%)",
        result.frame_extraction_time_ms(),
        share(result.frame_extraction_time_ms())
    );
    println!(
        "  🧮 Analysis: {:.2}ms ({:.1}%)",
        result.keyframe_analysis_time_ms(),
        share(result.keyframe_analysis_time_ms())
    );
    println!("  📊 Frames: {}", result.total_frames());
    println!(
        "  🎯 Keyframes: {} of {} requested",
        result.keyframes_extracted(),
        result.max_keyframes_requested()
    );
    println!("  🚀 Speed: {:.1} FPS", result.processing_fps());
}

fn write_json_report<T: serde::Serialize>(
    output_dir: &Path,
    prefix: &str,
    value: &T,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir).context("Failed to create output directory")?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let report_file = output_dir.join(format!("{prefix}_{timestamp}.json"));
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&report_file, json)
        .with_context(|| format!("Failed to write {}", report_file.display()))?;
    Ok(report_file)
}

fn run_benchmark_suite(video_path: &Path, output_dir: &Path, settings: &Settings) -> Result<()> {
    let extractor = KeyframeExtractor::new(settings.extractor.clone())
        .context("Failed to create extractor")?;

    println!("🚀 Video Keyframe Extractor - Benchmark Suite");
    println!("🕐 Time: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("🎬 Video: {}", video_path.display());
    println!("🧵 Threads: {}", extractor.thread_count());
    println!("⚙️  Best SIMD tier: {}", cpu::cpu_features().best_tier());

    let test_configs = [
        ("Standard Parallel", false, 8192),
        ("SIMD 8K blocks", true, 8192),
        ("SIMD 16K blocks", true, 16384),
        ("SIMD 32K blocks", true, 32768),
    ];

    let mut results = Vec::new();
    for (test_name, use_simd, block_size) in test_configs {
        let options = RunOptions {
            max_frames: settings.run.max_frames.or(Some(BENCHMARK_FRAMES)),
            use_simd: Some(use_simd),
            block_size: Some(block_size),
            ..settings.run.clone()
        };
        match extractor.benchmark(video_path, test_name, &options) {
            Ok(result) => {
                if settings.extractor.verbose {
                    print_result(&result);
                }
                results.push(result);
            }
            Err(e) => error!(test = test_name, error = %e, "benchmark run failed"),
        }
    }

    println!("\n{}", "=".repeat(120));
    println!("🏆 Benchmark Results");
    println!("{}", "=".repeat(120));
    println!(
        "{:<20} {:<15} {:<12} {:<12} {:<12} {:<8} {:<10} {:<8} {:<12}",
        "Test",
        "Total(ms)",
        "Extract(ms)",
        "Analyze(ms)",
        "Speed(FPS)",
        "Frames",
        "Keyframes",
        "Threads",
        "Optimization"
    );
    println!("{}", "-".repeat(120));
    for result in &results {
        println!(
            "{:<20} {:<15.1} {:<12.1} {:<12.1} {:<12.1} {:<8} {:<10} {:<8} {:<12}",
            result.test_name(),
            result.total_time_ms(),
            result.frame_extraction_time_ms(),
            result.keyframe_analysis_time_ms(),
            result.processing_fps(),
            result.total_frames(),
            result.keyframes_extracted(),
            result.threads_used(),
            format!("{:?}", result.optimization_type())
        );
    }

    let fastest = results
        .iter()
        .max_by(|a, b| a.processing_fps().total_cmp(&b.processing_fps()));
    if let Some(best) = fastest {
        println!("\n🏆 Best Performance: {}", best.test_name());
        println!("  ⚡ Speed: {:.1} FPS", best.processing_fps());
        println!("  🕐 Time: {:.2}s", best.total_time_ms() / 1000.0);
        println!("  🧮 Analysis: {:.2}s", best.keyframe_analysis_time_ms() / 1000.0);
    }

    let results_file = write_json_report(output_dir, "benchmark_results", &results)?;
    println!("\n📄 Detailed results saved to: {}", results_file.display());
    println!("{}", "=".repeat(120));
    Ok(())
}

fn run_single(video_path: &Path, output_dir: &Path, settings: &Settings) -> Result<()> {
    let extractor = KeyframeExtractor::new(settings.extractor.clone())
        .context("Failed to create extractor")?;
    println!("🧵 Threads: {}", extractor.thread_count());

    let result = extractor
        .process_video(video_path, output_dir, &settings.run)
        .with_context(|| format!("Failed to process {}", video_path.display()))?;
    let saved = settings.run.save_limit(result.keyframes_extracted());

    if settings.extractor.verbose {
        print_result(&result);
    }
    println!("\n✅ Processing Complete!");
    println!("🎯 Keyframes extracted: {}", result.keyframes_extracted());
    println!("💾 Keyframes saved: {saved}");
    println!("⚡ Processing speed: {:.1} FPS", result.processing_fps());
    println!("📁 Output directory: {}", output_dir.display());

    let report_file = write_json_report(output_dir, "processing_report", &result)?;
    println!("📄 Processing report saved to: {}", report_file.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = args.settings()?;
    init_tracing(&settings);

    if args.cpu_info {
        print_cpu_info();
        return Ok(());
    }

    println!("🚀 Video Keyframe Extractor v{}", env!("CARGO_PKG_VERSION"));

    let decoder_path = &settings.extractor.decoder_path;
    let probe = FfmpegDecoder::new(decoder_path.clone(), settings.extractor.pixel_format);
    if !probe.is_available() {
        anyhow::bail!(
            "FFmpeg not found at: {}. Install FFmpeg or pass --ffmpeg-path",
            decoder_path.display()
        );
    }
    if settings.run.max_keyframes == 0 {
        warn!("max_keyframes is 0; nothing can be selected");
    }

    let video_path = args.require_input()?;
    if args.benchmark {
        run_benchmark_suite(video_path, &args.output, &settings)
    } else {
        run_single(video_path, &args.output, &settings)
    }
}
