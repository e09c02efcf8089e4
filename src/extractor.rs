use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::{ExtractorConfig, RunOptions};
use crate::cpu;
use crate::decoder::FfmpegDecoder;
use crate::diff::DifferenceEngine;
use crate::error::Result;
use crate::frame::VideoFrame;
use crate::performance::{PerformanceResult, PhaseTimings};
use crate::persist::{ensure_output_dir, write_keyframe_image};
use crate::pool::FramePool;
use crate::selector::{KeyframeSelector, RunningSelection};

/// Frames scored per streamed batch, per worker.
const BATCH_FRAMES_PER_WORKER: usize = 4;

/// Result of the streaming pipeline: only the selected frames survive.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub total_frames: usize,
    /// Selected frame positions, ascending.
    pub keyframe_indices: Vec<usize>,
    /// Buffers of the selected frames, in the same order.
    pub keyframes: Vec<VideoFrame>,
    /// Time spent waiting on the decoder.
    pub extraction_ms: f64,
    /// Time spent scoring and ranking.
    pub analysis_ms: f64,
}

/// Last frame of the previous batch with its score, held back because the
/// next batch still needs it as a predecessor.
type Pending = Option<(usize, VideoFrame, f64)>;

/// Drives decode, score, select and persist for one configuration.
pub struct KeyframeExtractor {
    config: ExtractorConfig,
    decoder: FfmpegDecoder,
    pool: FramePool,
}

impl KeyframeExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let pool = FramePool::new(config.thread_count)?;
        let decoder = FfmpegDecoder::new(config.decoder_path.clone(), config.pixel_format);
        vlog!(
            config.verbose,
            threads = pool.threads(),
            decoder = %config.decoder_path.display(),
            pixel_format = %config.pixel_format,
            "keyframe extractor ready"
        );
        Ok(Self { config, decoder, pool })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn decoder(&self) -> &FfmpegDecoder {
        &self.decoder
    }

    /// Decode up to `max_frames` frames (all when `None`).
    pub fn extract_frames(
        &self,
        video_path: &Path,
        max_frames: Option<usize>,
    ) -> Result<(Vec<VideoFrame>, usize, usize)> {
        vlog!(self.config.verbose, video = %video_path.display(), "extracting frames");
        let start = Instant::now();

        let stream = self.decoder.open(video_path, max_frames)?;
        let (width, height) = (stream.width(), stream.height());
        let frames = stream.collect::<Result<Vec<_>>>()?;

        vlog!(
            self.config.verbose,
            frames = frames.len(),
            width,
            height,
            elapsed_ms = millis(start.elapsed()),
            "frame extraction complete"
        );
        Ok((frames, width, height))
    }

    /// Select keyframe positions from an in-memory frame sequence.
    pub fn extract_keyframes(
        &self,
        frames: &[VideoFrame],
        max_keyframes: usize,
        use_simd: Option<bool>,
        block_size: Option<usize>,
    ) -> Result<Vec<usize>> {
        let selector = KeyframeSelector::new(max_keyframes)?;
        let engine = DifferenceEngine::new(use_simd, block_size)?;
        self.select_from_frames(frames, &selector, &engine)
    }

    fn select_from_frames(
        &self,
        frames: &[VideoFrame],
        selector: &KeyframeSelector,
        engine: &DifferenceEngine,
    ) -> Result<Vec<usize>> {
        if let Some((first, rest)) = frames.split_first() {
            for frame in rest {
                first.ensure_same_geometry(frame)?;
            }
        }

        let start = Instant::now();
        let scores = self.pool.score_pairs(frames, engine)?;
        let selected = selector.select(frames.len(), &scores);

        vlog!(
            self.config.verbose,
            frames = frames.len(),
            requested = selector.max_keyframes(),
            selected = selected.len(),
            tier = %engine.tier(),
            block_size = engine.block_size(),
            elapsed_ms = millis(start.elapsed()),
            "keyframe analysis complete"
        );
        Ok(selected)
    }

    /// Decode the video once more and write the selected frames as images.
    ///
    /// Frames are written in ascending index order, at most `max_save` of
    /// them. Files already written stay in place if a later write fails.
    pub fn save_keyframes(
        &self,
        video_path: &Path,
        keyframe_indices: &[usize],
        output_dir: &Path,
        max_save: Option<usize>,
    ) -> Result<usize> {
        let mut wanted = keyframe_indices.to_vec();
        wanted.sort_unstable();
        wanted.dedup();
        if let Some(limit) = max_save {
            wanted.truncate(limit);
        }
        let Some(&last) = wanted.last() else {
            vlog!(self.config.verbose, "no keyframes to save");
            return Ok(0);
        };

        ensure_output_dir(output_dir)?;
        let mut targets = wanted.iter().copied().peekable();
        let mut saved = 0;

        // An index of usize::MAX cannot be bounded; decode to the end instead.
        for frame in self.decoder.open(video_path, last.checked_add(1))? {
            let frame = frame?;
            if targets.next_if_eq(&frame.frame_number()).is_some() {
                write_keyframe_image(&frame, output_dir)?;
                saved += 1;
            }
        }

        if let Some(missing) = targets.peek() {
            warn!(
                video = %video_path.display(),
                first_missing = missing,
                "video ended before every keyframe was found"
            );
        }
        vlog!(
            self.config.verbose,
            saved,
            requested = wanted.len(),
            dir = %output_dir.display(),
            "keyframes saved"
        );
        Ok(saved)
    }

    /// Time extraction and analysis over the whole video without writing anything.
    pub fn benchmark(
        &self,
        video_path: &Path,
        test_name: &str,
        options: &RunOptions,
    ) -> Result<PerformanceResult> {
        let selector = KeyframeSelector::new(options.max_keyframes)?;
        let engine = DifferenceEngine::new(options.use_simd, options.block_size)?;
        vlog!(
            self.config.verbose,
            test_name,
            max_keyframes = options.max_keyframes,
            "running benchmark"
        );

        let total_start = Instant::now();

        let extraction_start = Instant::now();
        let (frames, _, _) = self.extract_frames(video_path, options.max_frames)?;
        let extraction_ms = millis(extraction_start.elapsed());

        let analysis_start = Instant::now();
        let keyframes = self.select_from_frames(&frames, &selector, &engine)?;
        let analysis_ms = millis(analysis_start.elapsed());

        let timings = PhaseTimings {
            total_ms: millis(total_start.elapsed()),
            extraction_ms,
            analysis_ms,
        };
        let result = PerformanceResult::assemble(
            test_name,
            video_path,
            timings,
            frames.len(),
            keyframes.len(),
            options.max_keyframes,
            engine.tier(),
            self.pool.threads(),
        );
        self.log_result(&result);
        Ok(result)
    }

    /// Full pipeline with bounded memory: stream frames from the decoder,
    /// keep only keyframe candidates, then write the winners to `output_dir`.
    pub fn process_video(
        &self,
        video_path: &Path,
        output_dir: &Path,
        options: &RunOptions,
    ) -> Result<PerformanceResult> {
        let selector = KeyframeSelector::new(options.max_keyframes)?;
        let engine = DifferenceEngine::new(options.use_simd, options.block_size)?;

        let total_start = Instant::now();
        let stream = self.decoder.open(video_path, options.max_frames)?;
        let outcome = self.stream_keyframes(stream, &selector, &engine)?;
        let timings = PhaseTimings {
            total_ms: millis(total_start.elapsed()),
            extraction_ms: outcome.extraction_ms,
            analysis_ms: outcome.analysis_ms,
        };

        let saved = options.save_limit(outcome.keyframes.len());
        self.persist_frames(&outcome.keyframes[..saved], output_dir)?;

        let result = PerformanceResult::assemble(
            "Single Processing",
            video_path,
            timings,
            outcome.total_frames,
            outcome.keyframe_indices.len(),
            options.max_keyframes,
            engine.tier(),
            self.pool.threads(),
        );
        self.log_result(&result);
        Ok(result)
    }

    /// Streaming selection over any frame source.
    pub fn select_streaming<I>(
        &self,
        frames: I,
        max_keyframes: usize,
        use_simd: Option<bool>,
        block_size: Option<usize>,
    ) -> Result<StreamOutcome>
    where
        I: Iterator<Item = Result<VideoFrame>> + Send,
    {
        let selector = KeyframeSelector::new(max_keyframes)?;
        let engine = DifferenceEngine::new(use_simd, block_size)?;
        self.stream_keyframes(frames, &selector, &engine)
    }

    /// Decoding runs on its own thread and feeds a channel holding at most
    /// one frame per worker; the pool only ever sees CPU work.
    fn stream_keyframes<I>(
        &self,
        frames: I,
        selector: &KeyframeSelector,
        engine: &DifferenceEngine,
    ) -> Result<StreamOutcome>
    where
        I: Iterator<Item = Result<VideoFrame>> + Send,
    {
        let workers = self.pool.threads();
        let (tx, rx) = mpsc::sync_channel::<Result<VideoFrame>>(workers);

        thread::scope(|scope| {
            scope.spawn(move || {
                for frame in frames {
                    let failed = frame.is_err();
                    if tx.send(frame).is_err() || failed {
                        break;
                    }
                }
            });
            // `rx` is dropped when `consume` returns, which unblocks the decode thread.
            self.consume(rx, selector, engine, workers * BATCH_FRAMES_PER_WORKER)
        })
    }

    fn consume(
        &self,
        rx: Receiver<Result<VideoFrame>>,
        selector: &KeyframeSelector,
        engine: &DifferenceEngine,
        batch_size: usize,
    ) -> Result<StreamOutcome> {
        let mut running = selector.running::<VideoFrame>();
        let mut pending: Pending = None;
        let mut batch: Vec<VideoFrame> = Vec::with_capacity(batch_size);
        let mut total_frames = 0;
        let mut waiting = Duration::ZERO;
        let mut analysis = Duration::ZERO;

        loop {
            let wait_start = Instant::now();
            let received = rx.recv();
            waiting += wait_start.elapsed();

            let end_of_stream = match received {
                Ok(frame) => {
                    batch.push(frame?);
                    false
                }
                Err(_) => true,
            };

            if batch.len() >= batch_size || (end_of_stream && !batch.is_empty()) {
                let started = Instant::now();
                let first_index = total_frames;
                total_frames += batch.len();
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                self.absorb_batch(full, first_index, &mut running, &mut pending, engine)?;
                analysis += started.elapsed();
            }
            if end_of_stream {
                break;
            }
        }

        if let Some((index, frame, score)) = pending.take() {
            running.offer(index, score, frame);
        }
        let (keyframe_indices, keyframes): (Vec<usize>, Vec<VideoFrame>) =
            running.finish().into_iter().unzip();

        vlog!(
            self.config.verbose,
            frames = total_frames,
            selected = keyframe_indices.len(),
            tier = %engine.tier(),
            wait_ms = millis(waiting),
            analysis_ms = millis(analysis),
            "streaming analysis complete"
        );
        Ok(StreamOutcome {
            total_frames,
            keyframe_indices,
            keyframes,
            extraction_ms: millis(waiting),
            analysis_ms: millis(analysis),
        })
    }

    /// Score one batch and hand its frames to the running selection.
    fn absorb_batch(
        &self,
        batch: Vec<VideoFrame>,
        first_index: usize,
        running: &mut RunningSelection<VideoFrame>,
        pending: &mut Pending,
        engine: &DifferenceEngine,
    ) -> Result<()> {
        let (scores, at_start) = {
            let predecessor = pending
                .as_ref()
                .map(|(_, frame, _)| frame)
                .or_else(|| running.first());
            (self.pool.score_batch(predecessor, &batch, engine)?, predecessor.is_none())
        };

        let mut frames = batch.into_iter().enumerate();
        if at_start {
            if let Some((_, first)) = frames.next() {
                running.set_first(first);
            }
        }
        if let Some((index, frame, score)) = pending.take() {
            running.offer(index, score, frame);
        }
        for ((offset, frame), score) in frames.zip(scores) {
            let replaced = pending.replace((first_index + offset, frame, score));
            if let Some((index, prev, prev_score)) = replaced {
                running.offer(index, prev_score, prev);
            }
        }
        Ok(())
    }

    fn persist_frames(&self, frames: &[VideoFrame], output_dir: &Path) -> Result<()> {
        if frames.is_empty() {
            vlog!(self.config.verbose, "no keyframes to save");
            return Ok(());
        }

        ensure_output_dir(output_dir)?;
        for frame in frames {
            write_keyframe_image(frame, output_dir)?;
        }
        vlog!(
            self.config.verbose,
            saved = frames.len(),
            dir = %output_dir.display(),
            "keyframes saved"
        );
        Ok(())
    }

    fn log_result(&self, result: &PerformanceResult) {
        vlog!(
            self.config.verbose,
            test = result.test_name(),
            total_ms = result.total_time_ms(),
            extraction_ms = result.frame_extraction_time_ms(),
            analysis_ms = result.keyframe_analysis_time_ms(),
            frames = result.total_frames(),
            keyframes = result.keyframes_extracted(),
            fps = result.processing_fps(),
            "run complete"
        );
    }

    pub fn cpu_features(&self) -> HashMap<String, bool> {
        cpu::detect()
    }

    /// Resolved worker count.
    pub fn thread_count(&self) -> usize {
        self.pool.threads()
    }

    /// Worker count as configured; 0 means auto-detect.
    pub fn configured_threads(&self) -> usize {
        self.config.thread_count
    }

    pub fn actual_thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
