use std::collections::VecDeque;

use smallvec::smallvec;

use crate::kernel::{single, Kernel, Sample, StepOutput};

// ================================================================================================
// Shared swing detection
// ================================================================================================

/// Fractal pivot detector. A candidate at `i − right` is confirmed at `i`
/// once `right` subsequent bars exist; highs must strictly exceed `left`
/// preceding and `right` following highs (lows symmetric).
#[derive(Debug, Clone)]
pub(crate) struct SwingTracker {
    left: usize,
    right: usize,
    highs: VecDeque<f64>,
    lows: VecDeque<f64>,
    seen: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SwingEvent {
    pub high: Option<f64>,
    pub low: Option<f64>,
}

impl SwingTracker {
    pub(crate) fn new(left: usize, right: usize) -> Self {
        let cap = left + right + 2;
        Self {
            left,
            right,
            highs: VecDeque::with_capacity(cap),
            lows: VecDeque::with_capacity(cap),
            seen: 0,
        }
    }

    pub(crate) fn window_len(&self) -> usize {
        self.left + self.right + 1
    }

    /// True once enough bars exist to evaluate a candidate.
    pub(crate) fn warm(&self) -> bool {
        self.seen >= self.window_len()
    }

    pub(crate) fn push(&mut self, high: f64, low: f64) -> SwingEvent {
        self.seen += 1;
        self.highs.push_back(high);
        self.lows.push_back(low);
        if self.highs.len() > self.window_len() {
            self.highs.pop_front();
            self.lows.pop_front();
        }
        if self.highs.len() < self.window_len() {
            return SwingEvent::default();
        }

        let pivot = self.left;
        let high_candidate = self.highs[pivot];
        let low_candidate = self.lows[pivot];

        let is_high = !high_candidate.is_nan()
            && self
                .highs
                .iter()
                .enumerate()
                .all(|(i, &v)| i == pivot || (!v.is_nan() && high_candidate > v));
        let is_low = !low_candidate.is_nan()
            && self
                .lows
                .iter()
                .enumerate()
                .all(|(i, &v)| i == pivot || (!v.is_nan() && low_candidate < v));

        SwingEvent {
            high: is_high.then_some(high_candidate),
            low: is_low.then_some(low_candidate),
        }
    }
}

// ================================================================================================
// Swing flags
// ================================================================================================

/// Confirmed swing flags. Outputs `[swing_high, swing_low]` as 1/0; flags
/// for the pivot at `i − right` are reported at the confirmation index `i`.
#[derive(Debug, Clone)]
pub struct SwingPointsKernel {
    tracker: SwingTracker,
}

impl SwingPointsKernel {
    pub fn new(left: usize, right: usize) -> Self {
        Self {
            tracker: SwingTracker::new(left, right),
        }
    }
}

impl Kernel for SwingPointsKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, high, low, _, _) = x.bar();
        let event = self.tracker.push(high, low);
        if !self.tracker.warm() {
            return smallvec![f64::NAN, f64::NAN];
        }
        smallvec![
            if event.high.is_some() { 1.0 } else { 0.0 },
            if event.low.is_some() { 1.0 } else { 0.0 },
        ]
    }

    fn min_periods(&self) -> usize {
        self.tracker.window_len()
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// Indexed swing levels
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingSide {
    High,
    Low,
}

/// Price of the nth-latest confirmed swing (1 = most recent). NaN until
/// enough pivots have confirmed.
#[derive(Debug, Clone)]
pub struct SwingLevelKernel {
    tracker: SwingTracker,
    side: SwingSide,
    index: usize,
    levels: VecDeque<f64>,
}

impl SwingLevelKernel {
    pub fn new(side: SwingSide, index: usize, left: usize, right: usize) -> Self {
        Self {
            tracker: SwingTracker::new(left, right),
            side,
            index,
            levels: VecDeque::with_capacity(index + 1),
        }
    }
}

impl Kernel for SwingLevelKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, high, low, _, _) = x.bar();
        let event = self.tracker.push(high, low);
        let confirmed = match self.side {
            SwingSide::High => event.high,
            SwingSide::Low => event.low,
        };
        if let Some(price) = confirmed {
            self.levels.push_back(price);
            if self.levels.len() > self.index {
                self.levels.pop_front();
            }
        }
        if self.levels.len() < self.index {
            return single(f64::NAN);
        }
        single(self.levels[self.levels.len() - self.index])
    }

    fn min_periods(&self) -> usize {
        self.tracker.window_len()
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// Fibonacci retracement levels
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FibDirection {
    /// Projected down from the latest swing high.
    Down,
    /// Projected up from the latest swing low.
    Up,
}

/// One Fibonacci retracement level between the latest confirmed swing pair.
///
/// `Down` yields `high − ratio · (high − low)`, `Up` yields
/// `low + ratio · (high − low)`. NaN until both anchors exist or when the
/// anchor range collapses.
#[derive(Debug, Clone)]
pub struct FibLevelKernel {
    tracker: SwingTracker,
    ratio: f64,
    direction: FibDirection,
    anchor_high: Option<f64>,
    anchor_low: Option<f64>,
}

impl FibLevelKernel {
    pub fn new(direction: FibDirection, ratio: f64, left: usize, right: usize) -> Self {
        Self {
            tracker: SwingTracker::new(left, right),
            ratio,
            direction,
            anchor_high: None,
            anchor_low: None,
        }
    }
}

impl Kernel for FibLevelKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, high, low, _, _) = x.bar();
        let event = self.tracker.push(high, low);
        if let Some(price) = event.high {
            self.anchor_high = Some(price);
        }
        if let Some(price) = event.low {
            self.anchor_low = Some(price);
        }

        let (Some(anchor_high), Some(anchor_low)) = (self.anchor_high, self.anchor_low) else {
            return single(f64::NAN);
        };
        let range = anchor_high - anchor_low;
        if range <= 0.0 {
            return single(f64::NAN);
        }
        let level = match self.direction {
            FibDirection::Down => anchor_high - self.ratio * range,
            FibDirection::Up => anchor_low + self.ratio * range,
        };
        single(level)
    }

    fn min_periods(&self) -> usize {
        self.tracker.window_len()
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}
