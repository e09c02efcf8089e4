//! Runtime CPU feature detection.
//!
//! Detection runs once per process; every later query reads the cached
//! snapshot.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Vector code path used by the difference engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimdTier {
    Scalar,
    /// 128-bit SSE2 (x86_64).
    Sse2,
    /// 256-bit AVX2 (x86_64).
    Avx2,
    /// 128-bit NEON (aarch64).
    Neon,
}

impl SimdTier {
    pub fn is_vectorized(self) -> bool {
        self != SimdTier::Scalar
    }

    /// Bytes consumed per vector iteration.
    pub fn lane_width(self) -> usize {
        match self {
            SimdTier::Scalar => 1,
            SimdTier::Sse2 | SimdTier::Neon => 16,
            SimdTier::Avx2 => 32,
        }
    }

    /// Whether the running CPU can execute this tier.
    pub fn is_supported(self) -> bool {
        let features = cpu_features();
        match self {
            SimdTier::Scalar => true,
            SimdTier::Sse2 => features.sse2,
            SimdTier::Avx2 => features.avx2,
            SimdTier::Neon => features.neon,
        }
    }

    /// Every tier this CPU can run, scalar first.
    pub fn available() -> Vec<SimdTier> {
        [SimdTier::Scalar, SimdTier::Sse2, SimdTier::Avx2, SimdTier::Neon]
            .into_iter()
            .filter(|tier| tier.is_supported())
            .collect()
    }
}

impl fmt::Display for SimdTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimdTier::Scalar => "scalar",
            SimdTier::Sse2 => "sse2",
            SimdTier::Avx2 => "avx2",
            SimdTier::Neon => "neon",
        };
        f.write_str(name)
    }
}

/// Snapshot of the vector extensions available on this CPU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuFeatures {
    pub avx2: bool,
    pub sse2: bool,
    pub sse4_1: bool,
    pub sse4_2: bool,
    pub fma: bool,
    pub neon: bool,
}

impl CpuFeatures {
    #[cfg(target_arch = "x86_64")]
    fn probe() -> Self {
        Self {
            avx2: std::arch::is_x86_feature_detected!("avx2"),
            sse2: std::arch::is_x86_feature_detected!("sse2"),
            sse4_1: std::arch::is_x86_feature_detected!("sse4.1"),
            sse4_2: std::arch::is_x86_feature_detected!("sse4.2"),
            fma: std::arch::is_x86_feature_detected!("fma"),
            neon: false,
        }
    }

    #[cfg(target_arch = "aarch64")]
    fn probe() -> Self {
        Self {
            neon: std::arch::is_aarch64_feature_detected!("neon"),
            ..Self::default()
        }
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    fn probe() -> Self {
        Self::default()
    }

    /// Widest tier the difference engine can dispatch to.
    pub fn best_tier(&self) -> SimdTier {
        if self.avx2 {
            SimdTier::Avx2
        } else if self.sse2 {
            SimdTier::Sse2
        } else if self.neon {
            SimdTier::Neon
        } else {
            SimdTier::Scalar
        }
    }

    pub fn simd_supported(&self) -> bool {
        self.best_tier().is_vectorized()
    }

    /// Feature map with a fixed key set on every platform.
    pub fn to_map(&self) -> HashMap<String, bool> {
        HashMap::from([
            ("avx2".to_string(), self.avx2),
            ("sse2".to_string(), self.sse2),
            ("sse4_1".to_string(), self.sse4_1),
            ("sse4_2".to_string(), self.sse4_2),
            ("fma".to_string(), self.fma),
            ("neon".to_string(), self.neon),
            ("simd_supported".to_string(), self.simd_supported()),
        ])
    }
}

static FEATURES: OnceLock<CpuFeatures> = OnceLock::new();

/// Process-wide feature snapshot, probed on first use.
pub fn cpu_features() -> &'static CpuFeatures {
    FEATURES.get_or_init(CpuFeatures::probe)
}

/// Capability name to availability, for diagnostics.
pub fn detect() -> HashMap<String, bool> {
    cpu_features().to_map()
}
