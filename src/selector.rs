//! Keyframe selection.
//!
//! Frame 0 is always a keyframe and never ranked. Every other frame is ranked
//! by its difference score, highest first, ties going to the lower index.
//! The best `max_keyframes - 1` of them join frame 0, and the result is
//! returned in ascending frame order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};

/// Difference between frame `frame_index` and its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifferenceScore {
    pub frame_index: usize,
    pub value: f64,
}

impl DifferenceScore {
    pub fn new(frame_index: usize, value: f64) -> Self {
        Self { frame_index, value }
    }

    fn rank(&self) -> Rank {
        Rank {
            value: self.value,
            frame_index: self.frame_index,
        }
    }
}

/// Total order where "greater" means "more deserving of a keyframe slot".
#[derive(Debug, Clone, Copy)]
struct Rank {
    value: f64,
    frame_index: usize,
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| other.frame_index.cmp(&self.frame_index))
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Rank {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyframeSelector {
    max_keyframes: usize,
}

impl KeyframeSelector {
    pub fn new(max_keyframes: usize) -> Result<Self> {
        if max_keyframes == 0 {
            return Err(ExtractError::invalid("max_keyframes must be positive"));
        }
        Ok(Self { max_keyframes })
    }

    pub fn max_keyframes(&self) -> usize {
        self.max_keyframes
    }

    /// Slots left after frame 0.
    fn ranked_slots(&self) -> usize {
        self.max_keyframes - 1
    }

    /// Pick keyframes for a sequence of `total_frames` frames.
    ///
    /// `scores` holds one entry per frame after the first; entries for frame 0
    /// or past the end of the sequence are ignored.
    pub fn select(&self, total_frames: usize, scores: &[DifferenceScore]) -> Vec<usize> {
        if total_frames == 0 {
            return Vec::new();
        }
        if self.max_keyframes >= total_frames {
            return (0..total_frames).collect();
        }

        let mut ranked: Vec<Rank> = scores
            .iter()
            .filter(|s| s.frame_index > 0 && s.frame_index < total_frames)
            .map(DifferenceScore::rank)
            .collect();

        let slots = self.ranked_slots().min(ranked.len());
        if slots > 0 && slots < ranked.len() {
            ranked.select_nth_unstable_by(slots - 1, |a, b| b.cmp(a));
        }
        ranked.truncate(slots);

        let mut selected: Vec<usize> = std::iter::once(0)
            .chain(ranked.into_iter().map(|r| r.frame_index))
            .collect();
        selected.sort_unstable();
        selected.dedup();
        selected
    }

    /// Incremental selection that keeps only the current best candidates.
    pub fn running<T>(&self) -> RunningSelection<T> {
        RunningSelection {
            slots: self.ranked_slots(),
            first: None,
            heap: BinaryHeap::new(),
        }
    }
}

struct Candidate<T> {
    rank: Rank,
    payload: T,
}

impl<T> PartialEq for Candidate<T> {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank
    }
}

impl<T> Eq for Candidate<T> {}

impl<T> PartialOrd for Candidate<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Candidate<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank.cmp(&other.rank)
    }
}

/// Streaming counterpart of [`KeyframeSelector::select`].
///
/// Payloads (typically frame buffers) that fall out of the top
/// `max_keyframes - 1` are dropped as soon as they are outranked, so memory
/// stays bounded by the keyframe budget rather than the video length.
pub struct RunningSelection<T> {
    slots: usize,
    first: Option<T>,
    heap: BinaryHeap<Reverse<Candidate<T>>>,
}

impl<T> RunningSelection<T> {
    /// Register frame 0. It has no score and is always kept.
    pub fn set_first(&mut self, payload: T) {
        self.first = Some(payload);
    }

    pub fn first(&self) -> Option<&T> {
        self.first.as_ref()
    }

    /// Offer a scored frame. Returns `true` if it is currently retained.
    pub fn offer(&mut self, frame_index: usize, value: f64, payload: T) -> bool {
        if self.slots == 0 {
            return false;
        }
        let candidate = Candidate {
            rank: Rank { value, frame_index },
            payload,
        };

        if self.heap.len() < self.slots {
            self.heap.push(Reverse(candidate));
            return true;
        }
        match self.heap.peek() {
            Some(Reverse(worst)) if candidate.rank > worst.rank => {
                self.heap.pop();
                self.heap.push(Reverse(candidate));
                true
            }
            _ => false,
        }
    }

    /// Number of payloads currently held, frame 0 included.
    pub fn retained(&self) -> usize {
        self.heap.len() + usize::from(self.first.is_some())
    }

    /// Selected `(frame_index, payload)` pairs in ascending frame order.
    pub fn finish(self) -> Vec<(usize, T)> {
        let mut selected: Vec<(usize, T)> = self
            .heap
            .into_iter()
            .map(|Reverse(c)| (c.rank.frame_index, c.payload))
            .collect();
        if let Some(first) = self.first {
            selected.push((0, first));
        }
        selected.sort_unstable_by_key(|(idx, _)| *idx);
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(values: &[f64]) -> Vec<DifferenceScore> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| DifferenceScore::new(i + 1, v))
            .collect()
    }

    #[test]
    fn test_picks_highest_scores() {
        let selector = KeyframeSelector::new(3).unwrap();
        let picked = selector.select(5, &scores(&[0.1, 0.9, 0.05, 0.8]));
        assert_eq!(picked, vec![0, 2, 4]);
    }

    #[test]
    fn test_ties_prefer_lower_index() {
        let selector = KeyframeSelector::new(3).unwrap();
        let picked = selector.select(10, &scores(&[0.0; 9]));
        assert_eq!(picked, vec![0, 1, 2]);

        let picked = selector.select(6, &scores(&[0.2, 0.5, 0.2, 0.5, 0.2]));
        assert_eq!(picked, vec![0, 2, 4]);
    }

    #[test]
    fn test_budget_covers_everything() {
        let selector = KeyframeSelector::new(5).unwrap();
        assert_eq!(selector.select(5, &scores(&[0.3, 0.1, 0.2, 0.4])), vec![0, 1, 2, 3, 4]);

        let selector = KeyframeSelector::new(50).unwrap();
        assert_eq!(selector.select(3, &scores(&[0.0, 0.0])), vec![0, 1, 2]);
    }

    #[test]
    fn test_single_slot_is_first_frame() {
        let selector = KeyframeSelector::new(1).unwrap();
        assert_eq!(selector.select(4, &scores(&[0.9, 0.9, 0.9])), vec![0]);
        assert_eq!(selector.select(1, &[]), vec![0]);
    }

    #[test]
    fn test_empty_sequence() {
        let selector = KeyframeSelector::new(3).unwrap();
        assert!(selector.select(0, &[]).is_empty());
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(matches!(
            KeyframeSelector::new(0),
            Err(ExtractError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_result_is_ascending_and_bounded() {
        let values: Vec<f64> = (0..99).map(|i| ((i * 37) % 101) as f64 / 101.0).collect();
        for k in 1..=110 {
            let selector = KeyframeSelector::new(k).unwrap();
            let picked = selector.select(100, &scores(&values));
            assert_eq!(picked[0], 0);
            assert!(picked.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(picked.len(), k.min(100));
        }
    }

    #[test]
    fn test_running_matches_batch() {
        let values: Vec<f64> = (0..63).map(|i| ((i * 13) % 7) as f64 / 7.0).collect();
        for k in 1..=70 {
            let selector = KeyframeSelector::new(k).unwrap();
            let batch = selector.select(64, &scores(&values));

            let mut running = selector.running::<usize>();
            running.set_first(0);
            for (i, v) in values.iter().enumerate() {
                running.offer(i + 1, *v, i + 1);
            }
            assert!(running.retained() <= k);
            let streamed: Vec<usize> = running
                .finish()
                .into_iter()
                .map(|(idx, payload)| {
                    assert_eq!(idx, payload);
                    idx
                })
                .collect();

            assert_eq!(streamed, batch, "k = {k}");
        }
    }

    #[test]
    fn test_running_with_unbounded_budget() {
        let selector = KeyframeSelector::new(usize::MAX).unwrap();
        let mut running = selector.running::<usize>();
        running.set_first(0);
        for i in 1..6 {
            assert!(running.offer(i, 0.5, i));
        }
        assert_eq!(running.retained(), 6);

        let kept: Vec<usize> = running.finish().into_iter().map(|(idx, _)| idx).collect();
        assert_eq!(kept, selector.select(6, &scores(&[0.5; 5])));
        assert_eq!(kept, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_running_releases_outranked_payloads() {
        let selector = KeyframeSelector::new(2).unwrap();
        let mut running = selector.running::<&str>();
        running.set_first("first");

        assert!(running.offer(1, 0.2, "a"));
        assert!(running.offer(2, 0.5, "b"));
        assert!(!running.offer(3, 0.5, "c"));
        assert!(!running.offer(4, 0.1, "d"));
        assert_eq!(running.retained(), 2);

        assert_eq!(running.finish(), vec![(0, "first"), (2, "b")]);
    }
}
