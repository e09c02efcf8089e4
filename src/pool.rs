use rayon::prelude::*;
use tracing::debug;

use crate::diff::DifferenceEngine;
use crate::error::{ExtractError, Result};
use crate::frame::VideoFrame;
use crate::selector::DifferenceScore;

/// Resolve a requested worker count; 0 means one per logical CPU.
pub fn resolve_thread_count(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get()
    } else {
        requested
    }
}

/// Fixed-size worker pool dedicated to pairwise frame scoring.
pub struct FramePool {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl FramePool {
    pub fn new(thread_count: usize) -> Result<Self> {
        let threads = resolve_thread_count(thread_count);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("keyframe-worker-{i}"))
            .build()
            .map_err(|e| ExtractError::invalid(format!("failed to build thread pool: {e}")))?;

        debug!(threads, requested = thread_count, "frame pool ready");
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Worker count as seen from inside the pool.
    pub fn current_num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Score every adjacent pair. Output slot `i` holds the score of frame `i + 1`.
    pub fn score_pairs(
        &self,
        frames: &[VideoFrame],
        engine: &DifferenceEngine,
    ) -> Result<Vec<DifferenceScore>> {
        if frames.len() < 2 {
            return Ok(Vec::new());
        }
        self.pool.install(|| {
            frames
                .par_windows(2)
                .enumerate()
                .map(|(i, pair)| {
                    engine
                        .difference(&pair[0], &pair[1])
                        .map(|value| DifferenceScore::new(i + 1, value))
                })
                .collect()
        })
    }

    /// Score a streamed batch. Each frame is compared against the one before
    /// it, the first against `predecessor`. Without a predecessor the first
    /// frame of the batch is the start of the video and gets no score.
    pub fn score_batch(
        &self,
        predecessor: Option<&VideoFrame>,
        batch: &[VideoFrame],
        engine: &DifferenceEngine,
    ) -> Result<Vec<f64>> {
        let skip = usize::from(predecessor.is_none());
        if batch.len() <= skip {
            return Ok(Vec::new());
        }
        self.pool.install(|| {
            (skip..batch.len())
                .into_par_iter()
                .map(|i| {
                    let before = match (i, predecessor) {
                        (0, Some(prev)) => prev,
                        _ => &batch[i - 1],
                    };
                    engine.difference(before, &batch[i])
                })
                .collect()
        })
    }
}
