use std::path::Path;

use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cpu::SimdTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationType {
    Scalar,
    Simd,
}

impl From<SimdTier> for OptimizationType {
    fn from(tier: SimdTier) -> Self {
        if tier.is_vectorized() {
            OptimizationType::Simd
        } else {
            OptimizationType::Scalar
        }
    }
}

/// Wall-clock milliseconds per pipeline phase.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseTimings {
    pub total_ms: f64,
    pub extraction_ms: f64,
    pub analysis_ms: f64,
}

/// Metrics for one orchestrated run. Read-only once assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceResult {
    test_name: String,
    video_file: String,
    total_time_ms: f64,
    frame_extraction_time_ms: f64,
    keyframe_analysis_time_ms: f64,
    total_frames: usize,
    keyframes_extracted: usize,
    keyframe_ratio: f64,
    processing_fps: f64,
    max_keyframes_requested: usize,
    optimization_type: OptimizationType,
    simd_enabled: bool,
    threads_used: usize,
    timestamp: String,
}

impl PerformanceResult {
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        test_name: &str,
        video_path: &Path,
        timings: PhaseTimings,
        total_frames: usize,
        keyframes_extracted: usize,
        max_keyframes_requested: usize,
        tier: SimdTier,
        threads_used: usize,
    ) -> Self {
        let keyframe_ratio = if total_frames > 0 {
            keyframes_extracted as f64 / total_frames as f64
        } else {
            0.0
        };
        let processing_fps = if timings.total_ms > 0.0 {
            total_frames as f64 / (timings.total_ms / 1000.0)
        } else {
            0.0
        };
        let video_file = video_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| video_path.display().to_string());

        Self {
            test_name: test_name.to_string(),
            video_file,
            total_time_ms: timings.total_ms,
            frame_extraction_time_ms: timings.extraction_ms,
            keyframe_analysis_time_ms: timings.analysis_ms,
            total_frames,
            keyframes_extracted,
            keyframe_ratio,
            processing_fps,
            max_keyframes_requested,
            optimization_type: tier.into(),
            simd_enabled: tier.is_vectorized(),
            threads_used,
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn video_file(&self) -> &str {
        &self.video_file
    }

    pub fn total_time_ms(&self) -> f64 {
        self.total_time_ms
    }

    pub fn frame_extraction_time_ms(&self) -> f64 {
        self.frame_extraction_time_ms
    }

    pub fn keyframe_analysis_time_ms(&self) -> f64 {
        self.keyframe_analysis_time_ms
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn keyframes_extracted(&self) -> usize {
        self.keyframes_extracted
    }

    pub fn keyframe_ratio(&self) -> f64 {
        self.keyframe_ratio
    }

    pub fn processing_fps(&self) -> f64 {
        self.processing_fps
    }

    pub fn max_keyframes_requested(&self) -> usize {
        self.max_keyframes_requested
    }

    pub fn optimization_type(&self) -> OptimizationType {
        self.optimization_type
    }

    pub fn simd_enabled(&self) -> bool {
        self.simd_enabled
    }

    pub fn threads_used(&self) -> usize {
        self.threads_used
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Flat field-name to value mapping for logs and telemetry.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(total_ms: f64, frames: usize, keyframes: usize, tier: SimdTier) -> PerformanceResult {
        PerformanceResult::assemble(
            "unit",
            Path::new("/videos/clip.mp4"),
            PhaseTimings {
                total_ms,
                extraction_ms: total_ms * 0.75,
                analysis_ms: total_ms * 0.25,
            },
            frames,
            keyframes,
            10,
            tier,
            4,
        )
    }

    #[test]
    fn test_derived_metrics() {
        let r = sample(2000.0, 300, 15, SimdTier::Scalar);
        assert_eq!(r.video_file(), "clip.mp4");
        assert_eq!(r.keyframe_ratio(), 0.05);
        assert_eq!(r.processing_fps(), 150.0);
        assert_eq!(r.optimization_type(), OptimizationType::Scalar);
        assert!(!r.simd_enabled());
        assert_eq!(r.max_keyframes_requested(), 10);
        assert_eq!(r.threads_used(), 4);
        assert_eq!(r.timestamp().len(), "2024-01-01 00:00:00".len());
    }

    #[test]
    fn test_zero_denominators() {
        let r = sample(0.0, 0, 0, SimdTier::Scalar);
        assert_eq!(r.keyframe_ratio(), 0.0);
        assert_eq!(r.processing_fps(), 0.0);
    }

    #[test]
    fn test_map_field_names() {
        let r = sample(10.0, 5, 3, SimdTier::Scalar);
        let map = r.to_map();
        let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
        keys.sort_unstable();

        let mut expected = vec![
            "test_name",
            "video_file",
            "total_time_ms",
            "frame_extraction_time_ms",
            "keyframe_analysis_time_ms",
            "total_frames",
            "keyframes_extracted",
            "keyframe_ratio",
            "processing_fps",
            "max_keyframes_requested",
            "optimization_type",
            "simd_enabled",
            "threads_used",
            "timestamp",
        ];
        expected.sort_unstable();
        assert_eq!(keys, expected);
        assert_eq!(map["optimization_type"], Value::from("scalar"));
        assert_eq!(map["total_frames"], Value::from(5));
    }

    #[test]
    fn test_json_roundtrip() {
        let r = sample(10.0, 5, 3, SimdTier::Scalar);
        let json = serde_json::to_string_pretty(&r).unwrap();
        let back: PerformanceResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
