//! Temporal smoothing of per-tick frequency stages
//!
//! Each physical core gets a [`SmoothingWindow`]: a bounded ring of raw
//! observations plus a 4-slot tally. Every `K` observations the tally is
//! collapsed into its dominant stage (ties go to the hotter stage), the
//! result is appended to the core's display history and the tally resets.
//! The cadence counts observations only; wall-clock time plays no part.

use crate::frequency::FrequencyStage;
use std::collections::VecDeque;

/// Capacity of the raw-sample ring and of the collapsed history.
pub const RING_CAPACITY: usize = 128;

/// Default number of raw observations collapsed into one displayed value.
pub const DEFAULT_SUPERSAMPLES: usize = 4;

/// Smoothing state of one physical core
#[derive(Debug, Clone)]
pub struct SmoothingWindow {
    samples: VecDeque<FrequencyStage>,
    history: VecDeque<FrequencyStage>,
    tally: [u32; 4],
    pending: usize,
}

impl SmoothingWindow {
    fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(RING_CAPACITY),
            history: VecDeque::with_capacity(RING_CAPACITY),
            tally: [0; 4],
            pending: 0,
        }
    }

    /// Raw observations, oldest first.
    pub fn samples(&self) -> impl DoubleEndedIterator<Item = FrequencyStage> + '_ {
        self.samples.iter().copied()
    }

    /// Collapsed values, oldest first.
    pub fn history(&self) -> impl DoubleEndedIterator<Item = FrequencyStage> + ExactSizeIterator + '_ {
        self.history.iter().copied()
    }

    /// Occurrences of each stage since the last collapse.
    pub fn tally(&self) -> [u32; 4] {
        self.tally
    }

    fn record(&mut self, stage: FrequencyStage) {
        self.tally[stage.index()] += 1;
        self.pending += 1;
        push_bounded(&mut self.samples, stage);
    }

    fn collapse(&mut self) -> FrequencyStage {
        let dominant = dominant_stage(&self.tally);
        push_bounded(&mut self.history, dominant);
        self.tally = [0; 4];
        self.pending = 0;
        dominant
    }
}

fn push_bounded(ring: &mut VecDeque<FrequencyStage>, stage: FrequencyStage) {
    if ring.len() == RING_CAPACITY {
        ring.pop_front();
    }
    ring.push_back(stage);
}

/// Most frequent stage in `tally`; on a tie the hotter stage wins.
pub fn dominant_stage(tally: &[u32; 4]) -> FrequencyStage {
    let mut best = 0;
    let mut best_count = 0;
    for (index, &count) in tally.iter().enumerate() {
        if count >= best_count {
            best = index;
            best_count = count;
        }
    }
    FrequencyStage::ALL[best]
}

/// Majority-vote smoother over all physical cores
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    windows: Vec<SmoothingWindow>,
    supersamples: usize,
}

impl TemporalSmoother {
    /// One window per physical core; `supersamples` is clamped to at least 1.
    pub fn new(num_cores: usize, supersamples: usize) -> Self {
        Self {
            windows: (0..num_cores).map(|_| SmoothingWindow::new()).collect(),
            supersamples: supersamples.max(1),
        }
    }

    pub fn num_cores(&self) -> usize {
        self.windows.len()
    }

    pub fn supersamples(&self) -> usize {
        self.supersamples
    }

    pub fn window(&self, core: usize) -> Option<&SmoothingWindow> {
        self.windows.get(core)
    }

    /// Record one observation for `core`.
    ///
    /// Returns the dominant stage when this observation completes the
    /// core's current window. Unknown cores are ignored.
    pub fn observe(&mut self, core: usize, stage: FrequencyStage) -> Option<FrequencyStage> {
        let supersamples = self.supersamples;
        let window = self.windows.get_mut(core)?;
        window.record(stage);
        (window.pending >= supersamples).then(|| window.collapse())
    }

    /// Record one observation per core (index = physical core).
    ///
    /// Returns the dominant stage of every core when the batch completed
    /// their windows.
    pub fn observe_all(&mut self, stages: &[FrequencyStage]) -> Option<Vec<FrequencyStage>> {
        let collapsed: Vec<Option<FrequencyStage>> = stages
            .iter()
            .enumerate()
            .map(|(core, stage)| self.observe(core, *stage))
            .collect();
        collapsed.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FrequencyStage::*;

    #[test]
    fn test_collapse_every_k_observations() {
        let mut smoother = TemporalSmoother::new(1, 4);
        let mut fired = Vec::new();
        for n in 1..=12 {
            if smoother.observe(0, Low).is_some() {
                fired.push(n);
            }
        }
        assert_eq!(fired, vec![4, 8, 12]);
        assert_eq!(smoother.window(0).unwrap().history().len(), 3);
    }

    #[test]
    fn test_majority_wins() {
        let mut smoother = TemporalSmoother::new(1, 4);
        assert_eq!(smoother.observe(0, Max), None);
        assert_eq!(smoother.observe(0, Low), None);
        assert_eq!(smoother.observe(0, Low), None);
        assert_eq!(smoother.observe(0, Min), Some(Low));
        assert_eq!(smoother.window(0).unwrap().tally(), [0; 4]);
    }

    #[test]
    fn test_tie_prefers_hotter_stage() {
        assert_eq!(dominant_stage(&[2, 0, 2, 0]), Mid);
        assert_eq!(dominant_stage(&[0, 2, 0, 2]), Max);
        assert_eq!(dominant_stage(&[1, 1, 1, 1]), Max);
        assert_eq!(dominant_stage(&[3, 1, 0, 0]), Min);

        let mut smoother = TemporalSmoother::new(1, 4);
        for stage in [Low, Mid, Mid, Low] {
            smoother.observe(0, stage);
        }
        assert_eq!(smoother.window(0).unwrap().history().last(), Some(Mid));
    }

    #[test]
    fn test_ring_overwrites_oldest() {
        let mut smoother = TemporalSmoother::new(1, 1);
        smoother.observe(0, Max);
        for _ in 0..RING_CAPACITY {
            smoother.observe(0, Low);
        }
        let window = smoother.window(0).unwrap();
        assert_eq!(window.samples().count(), RING_CAPACITY);
        assert!(window.samples().all(|s| s == Low));
        assert_eq!(window.history().len(), RING_CAPACITY);
    }

    #[test]
    fn test_observe_all_collapses_in_lockstep() {
        let mut smoother = TemporalSmoother::new(2, 2);
        assert_eq!(smoother.observe_all(&[Max, Min]), None);
        assert_eq!(smoother.observe_all(&[Max, Low]), Some(vec![Max, Low]));
        assert_eq!(smoother.observe_all(&[Min, Min]), None);
    }

    #[test]
    fn test_unknown_core_ignored() {
        let mut smoother = TemporalSmoother::new(1, 1);
        assert_eq!(smoother.observe(5, Max), None);
        assert_eq!(TemporalSmoother::new(1, 0).supersamples(), 1);
    }
}
