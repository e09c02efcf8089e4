//! Frame differencing.
//!
//! The score is the mean absolute per-byte difference divided by 255, so it
//! lands in `[0, 1]`. Every code path accumulates exact `u64` sums of
//! absolute differences and normalizes once at the end, which makes scalar
//! and vector results bit-identical.

use rayon::prelude::*;

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use crate::cpu::{cpu_features, SimdTier};
use crate::error::{ExtractError, Result};
use crate::frame::VideoFrame;

/// Default block size in bytes. A multiple of every supported lane width.
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

const MAX_CHANNEL_VALUE: f64 = 255.0;

/// Resolved differencing strategy: one tier and one block size per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifferenceEngine {
    tier: SimdTier,
    block_size: usize,
}

impl DifferenceEngine {
    /// `use_simd == Some(false)` forces the scalar path; otherwise the widest
    /// tier the CPU supports is used.
    pub fn new(use_simd: Option<bool>, block_size: Option<usize>) -> Result<Self> {
        let tier = match use_simd {
            Some(false) => SimdTier::Scalar,
            _ => cpu_features().best_tier(),
        };
        Self::with_tier(tier, block_size)
    }

    pub fn with_tier(tier: SimdTier, block_size: Option<usize>) -> Result<Self> {
        let block_size = block_size.unwrap_or(DEFAULT_BLOCK_SIZE);
        if block_size == 0 {
            return Err(ExtractError::invalid("block_size must be positive"));
        }
        if !tier.is_supported() {
            return Err(ExtractError::invalid(format!("{tier} is not supported on this CPU")));
        }
        Ok(Self { tier, block_size })
    }

    pub fn tier(&self) -> SimdTier {
        self.tier
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Normalized difference between two frames of identical geometry.
    pub fn difference(&self, a: &VideoFrame, b: &VideoFrame) -> Result<f64> {
        a.ensure_same_geometry(b)?;

        let total = match self.tier {
            SimdTier::Scalar => sum_abs_diff_scalar(a.data(), b.data()),
            tier => blocked_sum_abs_diff(a.data(), b.data(), self.block_size, tier),
        };
        Ok(normalize(total, a.data().len()))
    }
}

fn normalize(total: u64, len: usize) -> f64 {
    if len == 0 {
        return 0.0;
    }
    total as f64 / (len as f64 * MAX_CHANNEL_VALUE)
}

/// Full blocks are reduced in parallel with the vector kernel, then the
/// trailing partial block gets one scalar pass.
fn blocked_sum_abs_diff(a: &[u8], b: &[u8], block_size: usize, tier: SimdTier) -> u64 {
    let full = a.len() - a.len() % block_size;
    let (head_a, tail_a) = a.split_at(full);
    let (head_b, tail_b) = b.split_at(full);

    let blocks: u64 = head_a
        .par_chunks_exact(block_size)
        .zip(head_b.par_chunks_exact(block_size))
        .map(|(x, y)| sum_abs_diff(tier, x, y))
        .sum();

    blocks + sum_abs_diff_scalar(tail_a, tail_b)
}

fn sum_abs_diff(tier: SimdTier, a: &[u8], b: &[u8]) -> u64 {
    match tier {
        // SAFETY: `DifferenceEngine::with_tier` only accepts tiers the CPU supports.
        #[cfg(target_arch = "x86_64")]
        SimdTier::Avx2 => unsafe { sum_abs_diff_avx2(a, b) },
        #[cfg(target_arch = "x86_64")]
        SimdTier::Sse2 => unsafe { sum_abs_diff_sse2(a, b) },
        #[cfg(target_arch = "aarch64")]
        SimdTier::Neon => unsafe { sum_abs_diff_neon(a, b) },
        _ => sum_abs_diff_scalar(a, b),
    }
}

fn sum_abs_diff_scalar(a: &[u8], b: &[u8]) -> u64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.abs_diff(*y) as u64)
        .sum()
}

/// AVX2: `vpsadbw` over 32 bytes per iteration into four u64 lanes.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn sum_abs_diff_avx2(a: &[u8], b: &[u8]) -> u64 {
    let len = a.len().min(b.len());
    let chunks = len / 32;
    let mut acc = _mm256_setzero_si256();

    for i in 0..chunks {
        let offset = i * 32;
        let va = _mm256_loadu_si256(a.as_ptr().add(offset) as *const __m256i);
        let vb = _mm256_loadu_si256(b.as_ptr().add(offset) as *const __m256i);
        acc = _mm256_add_epi64(acc, _mm256_sad_epu8(va, vb));
    }

    let mut lanes = [0u64; 4];
    _mm256_storeu_si256(lanes.as_mut_ptr() as *mut __m256i, acc);

    let done = chunks * 32;
    lanes.iter().sum::<u64>() + sum_abs_diff_scalar(&a[done..len], &b[done..len])
}

/// SSE2: `psadbw` over 16 bytes per iteration into two u64 lanes.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
unsafe fn sum_abs_diff_sse2(a: &[u8], b: &[u8]) -> u64 {
    let len = a.len().min(b.len());
    let chunks = len / 16;
    let mut acc = _mm_setzero_si128();

    for i in 0..chunks {
        let offset = i * 16;
        let va = _mm_loadu_si128(a.as_ptr().add(offset) as *const __m128i);
        let vb = _mm_loadu_si128(b.as_ptr().add(offset) as *const __m128i);
        acc = _mm_add_epi64(acc, _mm_sad_epu8(va, vb));
    }

    let mut lanes = [0u64; 2];
    _mm_storeu_si128(lanes.as_mut_ptr() as *mut __m128i, acc);

    let done = chunks * 16;
    lanes[0] + lanes[1] + sum_abs_diff_scalar(&a[done..len], &b[done..len])
}

#[cfg(target_arch = "aarch64")]
#[target_feature(enable = "neon")]
unsafe fn sum_abs_diff_neon(a: &[u8], b: &[u8]) -> u64 {
    use std::arch::aarch64::*;

    let len = a.len().min(b.len());
    let chunks = len / 16;
    let mut acc = vdupq_n_u64(0);

    for i in 0..chunks {
        let offset = i * 16;
        let va = vld1q_u8(a.as_ptr().add(offset));
        let vb = vld1q_u8(b.as_ptr().add(offset));
        let diff = vabdq_u8(va, vb);
        acc = vaddq_u64(acc, vpaddlq_u32(vpaddlq_u16(vpaddlq_u8(diff))));
    }

    let done = chunks * 16;
    vaddvq_u64(acc) + sum_abs_diff_scalar(&a[done..len], &b[done..len])
}
