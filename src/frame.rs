use crate::cpu::SimdTier;
use crate::diff::DifferenceEngine;
use crate::error::{ExtractError, Geometry, Result};

/// One decoded frame. `data` holds exactly `width * height * channels` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    frame_number: usize,
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<u8>,
}

impl VideoFrame {
    /// Create a single-channel (grayscale) frame.
    pub fn new(frame_number: usize, width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        Self::with_channels(frame_number, width, height, 1, data)
    }

    pub fn with_channels(
        frame_number: usize,
        width: usize,
        height: usize,
        channels: usize,
        data: Vec<u8>,
    ) -> Result<Self> {
        if width == 0 || height == 0 || channels == 0 {
            return Err(ExtractError::invalid(format!(
                "frame {frame_number}: dimensions must be positive, got {width}x{height}x{channels}"
            )));
        }
        let expected = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(channels))
            .ok_or_else(|| {
                let dims = format!("{width}x{height}x{channels}");
                ExtractError::invalid(format!("frame {frame_number}: {dims} overflows"))
            })?;
        if data.len() != expected {
            return Err(ExtractError::invalid(format!(
                "frame {frame_number}: expected {expected} bytes for {}x{}x{}, got {}",
                width,
                height,
                channels,
                data.len()
            )));
        }

        Ok(Self {
            frame_number,
            width,
            height,
            channels,
            data,
        })
    }

    /// Copy pixels out of any contiguous byte source.
    pub fn from_slice(
        frame_number: usize,
        width: usize,
        height: usize,
        channels: usize,
        pixels: &[u8],
    ) -> Result<Self> {
        Self::with_channels(frame_number, width, height, channels, pixels.to_vec())
    }

    pub fn frame_number(&self) -> usize {
        self.frame_number
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn geometry(&self) -> Geometry {
        (self.width, self.height, self.channels)
    }

    pub(crate) fn ensure_same_geometry(&self, other: &VideoFrame) -> Result<()> {
        if self.geometry() != other.geometry() {
            return Err(ExtractError::DimensionMismatch {
                expected: self.geometry(),
                found: other.geometry(),
            });
        }
        Ok(())
    }

    /// Scalar reference difference against `other`, in `[0, 1]`.
    pub fn calculate_difference(&self, other: &VideoFrame) -> Result<f64> {
        DifferenceEngine::with_tier(SimdTier::Scalar, None)?.difference(self, other)
    }

    /// Block-based difference using the widest vector path this CPU offers.
    pub fn calculate_difference_simd(
        &self,
        other: &VideoFrame,
        block_size: Option<usize>,
    ) -> Result<f64> {
        DifferenceEngine::new(Some(true), block_size)?.difference(self, other)
    }
}
