//! Keyframe extraction for video.
//!
//! Frames are decoded by an external FFmpeg process, adjacent frames are
//! compared by mean absolute pixel difference (vectorized where the CPU
//! allows), and the frames that differ most from their predecessor are kept.

/// Stage summaries go to `info` when the run is verbose and to `debug` otherwise.
macro_rules! vlog {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

pub mod config;
pub mod cpu;
pub mod decoder;
pub mod diff;
pub mod error;
pub mod extractor;
pub mod frame;
pub mod performance;
pub mod persist;
pub mod pool;
pub mod selector;

use std::path::Path;

use serde_json::{Map, Value};

pub use config::{ExtractorConfig, PixelFormat, RunOptions, Settings};
pub use cpu::{CpuFeatures, SimdTier};
pub use diff::{DifferenceEngine, DEFAULT_BLOCK_SIZE};
pub use error::{ConfigError, ExtractError, Result};
pub use extractor::{KeyframeExtractor, StreamOutcome};
pub use frame::VideoFrame;
pub use performance::{OptimizationType, PerformanceResult};
pub use selector::{DifferenceScore, KeyframeSelector};

/// One-shot helper: build an extractor and run the full pipeline.
pub fn extract_keyframes_from_video(
    video_path: &Path,
    output_dir: &Path,
    config: ExtractorConfig,
    options: &RunOptions,
) -> Result<PerformanceResult> {
    KeyframeExtractor::new(config)?.process_video(video_path, output_dir, options)
}

/// Host summary: worker default, SIMD support and crate version.
pub fn system_info() -> Map<String, Value> {
    let features = cpu::cpu_features();
    let mut info = Map::new();
    info.insert("threads".into(), pool::resolve_thread_count(0).into());
    info.insert("avx2_supported".into(), features.avx2.into());
    info.insert("sse2_supported".into(), features.sse2.into());
    info.insert("neon_supported".into(), features.neon.into());
    info.insert("simd_supported".into(), features.simd_supported().into());
    info.insert("version".into(), env!("CARGO_PKG_VERSION").into());
    info
}
