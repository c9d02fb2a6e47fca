use std::fmt;

use smallvec::SmallVec;

use crate::data::context::SeriesContext;

pub mod elementwise;
pub mod event;
pub mod ewm;
pub mod momentum;
pub mod pattern;
pub mod rolling;
pub mod trend;
pub mod volatility;
pub mod volume;

// ================================================================================================
// Samples and outputs
// ================================================================================================

/// One input observation for a kernel step.
///
/// The registry's input layout tells the engine which shape to assemble;
/// kernels read the shape they declared and treat anything else as NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// A single value (price, or the output of an upstream expression).
    Value(f64),
    /// Two expression inputs, e.g. the `(a, b)` of a crossing test.
    Pair(f64, f64),
    /// Three expression inputs, e.g. `(price, upper, lower)` of a channel test.
    Triple(f64, f64, f64),
    /// A full bar from the partition context.
    Bar {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    },
}

impl Sample {
    pub fn value(&self) -> f64 {
        match *self {
            Sample::Value(v) => v,
            Sample::Pair(a, _) => a,
            Sample::Triple(a, _, _) => a,
            Sample::Bar { close, .. } => close,
        }
    }

    pub fn pair(&self) -> (f64, f64) {
        match *self {
            Sample::Pair(a, b) => (a, b),
            _ => (f64::NAN, f64::NAN),
        }
    }

    pub fn triple(&self) -> (f64, f64, f64) {
        match *self {
            Sample::Triple(a, b, c) => (a, b, c),
            _ => (f64::NAN, f64::NAN, f64::NAN),
        }
    }

    pub fn bar(&self) -> (f64, f64, f64, f64, f64) {
        match *self {
            Sample::Bar {
                open,
                high,
                low,
                close,
                volume,
            } => (open, high, low, close, volume),
            _ => (f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN),
        }
    }

    /// True if every component carried by this sample is defined.
    pub fn is_defined(&self) -> bool {
        match *self {
            Sample::Value(v) => !v.is_nan(),
            Sample::Pair(a, b) => !a.is_nan() && !b.is_nan(),
            Sample::Triple(a, b, c) => !a.is_nan() && !b.is_nan() && !c.is_nan(),
            Sample::Bar {
                high, low, close, ..
            } => !high.is_nan() && !low.is_nan() && !close.is_nan(),
        }
    }
}

/// Values produced by one kernel step, ordered per the indicator's output
/// specs. Warmup indices are NaN.
pub type StepOutput = SmallVec<[f64; 5]>;

#[inline]
pub fn single(value: f64) -> StepOutput {
    smallvec::smallvec![value]
}

// ================================================================================================
// Kernel protocol
// ================================================================================================

/// The single abstraction unifying batch and streaming execution.
///
/// A kernel owns its state; snapshotting the streaming engine clones the
/// boxed kernel. `initialize` consumes prior inputs to establish warm-up
/// state; `step` consumes one input and yields one output row. Before
/// `min_periods` inputs have been consumed the output is NaN, which the
/// engine translates into a false availability mask.
pub trait Kernel: fmt::Debug + Send {
    fn step(&mut self, x: &Sample) -> StepOutput;

    fn min_periods(&self) -> usize;

    fn boxed_clone(&self) -> Box<dyn Kernel>;

    /// Consumes history through `step`, discarding outputs.
    fn initialize(&mut self, history: &[Sample]) {
        for x in history {
            self.step(x);
        }
    }

    /// Batch-only output columns that cannot be produced causally.
    ///
    /// Returns `(output_index, values)` pairs the batch runner substitutes
    /// after stepping. The only built-in user is the ichimoku chikou span.
    fn batch_backfill(&self, _ctx: &SeriesContext, _n: usize) -> Vec<(usize, Vec<f64>)> {
        Vec::new()
    }
}

impl Clone for Box<dyn Kernel> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Runs a kernel over a batch of samples, collecting one output row per
/// input. The mask is derived downstream from NaN positions.
pub fn run_kernel(kernel: &mut dyn Kernel, samples: &[Sample]) -> Vec<StepOutput> {
    kernel.initialize(&[]);
    samples.iter().map(|x| kernel.step(x)).collect()
}
