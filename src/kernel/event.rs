use crate::kernel::{single, Kernel, Sample, StepOutput};

// ================================================================================================
// Crossings
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossMode {
    /// `a[i] > b[i] ∧ a[i−1] ≤ b[i−1]`
    Up,
    /// `a[i] < b[i] ∧ a[i−1] ≥ b[i−1]`
    Down,
    /// Either direction.
    Any,
}

/// Two-tick crossing test over a pair input. The first index is always
/// false; undefined operands at either tick yield NaN.
#[derive(Debug, Clone)]
pub struct CrossKernel {
    mode: CrossMode,
    prev: Option<(f64, f64)>,
}

impl CrossKernel {
    pub fn new(mode: CrossMode) -> Self {
        Self { mode, prev: None }
    }
}

impl Kernel for CrossKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (a, b) = x.pair();
        let prev = self.prev.replace((a, b));
        let Some((pa, pb)) = prev else {
            return single(if a.is_nan() || b.is_nan() {
                f64::NAN
            } else {
                0.0
            });
        };
        if a.is_nan() || b.is_nan() || pa.is_nan() || pb.is_nan() {
            return single(f64::NAN);
        }
        let crossed_up = a > b && pa <= pb;
        let crossed_down = a < b && pa >= pb;
        let hit = match self.mode {
            CrossMode::Up => crossed_up,
            CrossMode::Down => crossed_down,
            CrossMode::Any => crossed_up || crossed_down,
        };
        single(if hit { 1.0 } else { 0.0 })
    }

    fn min_periods(&self) -> usize {
        1
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// Rising / falling
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendMode {
    Rising,
    Falling,
}

/// `a[i] > a[i−1]` (or `<` for falling). First index false.
#[derive(Debug, Clone)]
pub struct TrendKernel {
    mode: TrendMode,
    prev: Option<f64>,
}

impl TrendKernel {
    pub fn new(mode: TrendMode) -> Self {
        Self { mode, prev: None }
    }
}

impl Kernel for TrendKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let v = x.value();
        let prev = self.prev.replace(v);
        let Some(p) = prev else {
            return single(if v.is_nan() { f64::NAN } else { 0.0 });
        };
        if v.is_nan() || p.is_nan() {
            return single(f64::NAN);
        }
        let hit = match self.mode {
            TrendMode::Rising => v > p,
            TrendMode::Falling => v < p,
        };
        single(if hit { 1.0 } else { 0.0 })
    }

    fn min_periods(&self) -> usize {
        1
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

/// Rising/falling by at least `pct` percent over one tick.
#[derive(Debug, Clone)]
pub struct TrendPctKernel {
    mode: TrendMode,
    pct: f64,
    prev: Option<f64>,
}

impl TrendPctKernel {
    pub fn new(mode: TrendMode, pct: f64) -> Self {
        Self {
            mode,
            pct,
            prev: None,
        }
    }
}

impl Kernel for TrendPctKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let v = x.value();
        let prev = self.prev.replace(v);
        let Some(p) = prev else {
            return single(if v.is_nan() { f64::NAN } else { 0.0 });
        };
        if v.is_nan() || p.is_nan() || p == 0.0 {
            return single(f64::NAN);
        }
        let change_pct = 100.0 * (v - p) / p;
        let hit = match self.mode {
            TrendMode::Rising => change_pct >= self.pct,
            TrendMode::Falling => change_pct <= -self.pct,
        };
        single(if hit { 1.0 } else { 0.0 })
    }

    fn min_periods(&self) -> usize {
        1
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// Channel membership
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// `lower ≤ price ≤ upper`
    In,
    /// Outside the band.
    Out,
    /// Transition from outside to inside; first index false.
    Enter,
    /// Transition from inside to outside; first index false.
    Exit,
}

/// Channel membership and entry/exit tests over `(price, upper, lower)`.
#[derive(Debug, Clone)]
pub struct ChannelKernel {
    mode: ChannelMode,
    prev_inside: Option<bool>,
}

impl ChannelKernel {
    pub fn new(mode: ChannelMode) -> Self {
        Self {
            mode,
            prev_inside: None,
        }
    }
}

impl Kernel for ChannelKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (price, upper, lower) = x.triple();
        if price.is_nan() || upper.is_nan() || lower.is_nan() {
            self.prev_inside = None;
            return single(f64::NAN);
        }
        let inside = price >= lower && price <= upper;
        let prev = self.prev_inside.replace(inside);
        let hit = match self.mode {
            ChannelMode::In => inside,
            ChannelMode::Out => !inside,
            ChannelMode::Enter => prev.is_some_and(|p| !p) && inside,
            ChannelMode::Exit => prev.is_some_and(|p| p) && !inside,
        };
        single(if hit { 1.0 } else { 0.0 })
    }

    fn min_periods(&self) -> usize {
        1
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_pairs(kernel: &mut dyn Kernel, pairs: &[(f64, f64)]) -> Vec<f64> {
        pairs
            .iter()
            .map(|&(a, b)| kernel.step(&Sample::Pair(a, b))[0])
            .collect()
    }

    #[test]
    fn crossup_fires_on_the_crossing_tick_only() {
        let a = [10.0, 15.0, 25.0, 30.0];
        let b = [20.0, 20.0, 20.0, 20.0];
        let pairs: Vec<_> = a.iter().copied().zip(b.iter().copied()).collect();
        let mut k = CrossKernel::new(CrossMode::Up);
        let out = run_pairs(&mut k, &pairs);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn cross_is_union_of_up_and_down() {
        let pairs = [(1.0, 2.0), (3.0, 2.0), (1.0, 2.0), (1.5, 2.0)];
        let mut up = CrossKernel::new(CrossMode::Up);
        let mut down = CrossKernel::new(CrossMode::Down);
        let mut any = CrossKernel::new(CrossMode::Any);
        let u = run_pairs(&mut up, &pairs);
        let d = run_pairs(&mut down, &pairs);
        let a = run_pairs(&mut any, &pairs);
        for i in 0..pairs.len() {
            assert_eq!(a[i], f64::max(u[i], d[i]), "index {}", i);
        }
    }

    #[test]
    fn touch_then_break_counts_as_cross() {
        // equality on the previous tick satisfies the <= side
        let pairs = [(2.0, 2.0), (3.0, 2.0)];
        let mut k = CrossKernel::new(CrossMode::Up);
        let out = run_pairs(&mut k, &pairs);
        assert_eq!(out, vec![0.0, 1.0]);
    }

    #[test]
    fn rising_and_falling_are_strict() {
        let input = [1.0, 2.0, 2.0, 1.0];
        let mut r = TrendKernel::new(TrendMode::Rising);
        let mut f = TrendKernel::new(TrendMode::Falling);
        let rising: Vec<f64> = input
            .iter()
            .map(|&v| r.step(&Sample::Value(v))[0])
            .collect();
        let falling: Vec<f64> = input
            .iter()
            .map(|&v| f.step(&Sample::Value(v))[0])
            .collect();
        assert_eq!(rising, vec![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(falling, vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn pct_threshold_gates_the_event() {
        let mut k = TrendPctKernel::new(TrendMode::Rising, 10.0);
        assert_eq!(k.step(&Sample::Value(100.0))[0], 0.0);
        assert_eq!(k.step(&Sample::Value(105.0))[0], 0.0);
        assert_eq!(k.step(&Sample::Value(120.0))[0], 1.0);
    }

    #[test]
    fn channel_enter_and_exit_are_transitions() {
        let samples = [
            (25.0, 20.0, 10.0), // above
            (15.0, 20.0, 10.0), // inside -> enter
            (14.0, 20.0, 10.0), // still inside
            (5.0, 20.0, 10.0),  // below -> exit
        ];
        let mut enter = ChannelKernel::new(ChannelMode::Enter);
        let mut exit = ChannelKernel::new(ChannelMode::Exit);
        let e: Vec<f64> = samples
            .iter()
            .map(|&(p, u, l)| enter.step(&Sample::Triple(p, u, l))[0])
            .collect();
        let x: Vec<f64> = samples
            .iter()
            .map(|&(p, u, l)| exit.step(&Sample::Triple(p, u, l))[0])
            .collect();
        assert_eq!(e, vec![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(x, vec![0.0, 0.0, 0.0, 1.0]);
    }
}
