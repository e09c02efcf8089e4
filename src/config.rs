use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Raw pixel layout requested from the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Gray,
    Rgb24,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray => 1,
            PixelFormat::Rgb24 => 3,
        }
    }

    /// Name understood by `-pix_fmt`.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Gray => "gray",
            PixelFormat::Rgb24 => "rgb24",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gray" | "grey" => Ok(PixelFormat::Gray),
            "rgb24" | "rgb" => Ok(PixelFormat::Rgb24),
            other => Err(format!("unsupported pixel format: {other}")),
        }
    }
}

/// Orchestrator configuration, fixed for the extractor's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_decoder_path")]
    pub decoder_path: PathBuf,
    /// 0 = one worker per logical CPU.
    #[serde(default)]
    pub thread_count: usize,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub pixel_format: PixelFormat,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            decoder_path: default_decoder_path(),
            thread_count: 0,
            verbose: false,
            pixel_format: PixelFormat::default(),
        }
    }
}

impl ExtractorConfig {
    pub fn new(decoder_path: impl Into<PathBuf>, thread_count: usize, verbose: bool) -> Self {
        Self {
            decoder_path: decoder_path.into(),
            thread_count,
            verbose,
            pixel_format: PixelFormat::default(),
        }
    }

    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }
}

/// Per-run knobs for `benchmark` and `process_video`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default = "default_max_keyframes")]
    pub max_keyframes: usize,
    /// Decode at most this many frames; `None` decodes the whole video.
    #[serde(default)]
    pub max_frames: Option<usize>,
    /// Persist at most this many keyframes; `None` saves all of them.
    #[serde(default)]
    pub max_save: Option<usize>,
    #[serde(default)]
    pub use_simd: Option<bool>,
    #[serde(default)]
    pub block_size: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_keyframes: default_max_keyframes(),
            max_frames: None,
            max_save: None,
            use_simd: None,
            block_size: None,
        }
    }
}

impl RunOptions {
    pub fn new(max_keyframes: usize) -> Self {
        Self {
            max_keyframes,
            ..Self::default()
        }
    }

    /// How many of `selected` keyframes a run writes to disk.
    pub fn save_limit(&self, selected: usize) -> usize {
        self.max_save.map_or(selected, |limit| limit.min(selected))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Settings file for the command line tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub run: RunOptions,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

fn default_decoder_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}
fn default_max_keyframes() -> usize {
    50
}
fn default_log_level() -> String {
    "info".into()
}
