use std::collections::VecDeque;

use smallvec::smallvec;

use crate::kernel::{
    elementwise::true_range,
    ewm::EwmAcc,
    rolling::{MonotonicWindow, WindowAcc},
    single, Kernel, Sample, StepOutput,
};

// ================================================================================================
// RSI
// ================================================================================================

/// Relative Strength Index with Wilder smoothing of gains and losses.
///
/// The `avg_loss == 0` branches follow the reference: pure gain → 100,
/// flat (0/0) → `zero_zero_value` (50 by default, configurable because
/// source implementations disagree).
#[derive(Debug, Clone)]
pub struct RsiKernel {
    period: usize,
    prev: Option<f64>,
    avg_gain: EwmAcc,
    avg_loss: EwmAcc,
    zero_zero_value: f64,
}

impl RsiKernel {
    pub fn new(period: usize) -> Self {
        let alpha = 1.0 / period as f64;
        Self {
            period,
            prev: None,
            avg_gain: EwmAcc::new(alpha),
            avg_loss: EwmAcc::new(alpha),
            zero_zero_value: 50.0,
        }
    }

    pub fn with_zero_zero_value(mut self, value: f64) -> Self {
        self.zero_zero_value = value;
        self
    }
}

impl Kernel for RsiKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let v = x.value();
        if v.is_nan() {
            return single(f64::NAN);
        }
        let Some(prev) = self.prev else {
            self.prev = Some(v);
            return single(f64::NAN);
        };

        let delta = v - prev;
        self.prev = Some(v);
        let (gain, loss) = if delta > 0.0 {
            (delta, 0.0)
        } else {
            (0.0, -delta)
        };

        let avg_gain = self.avg_gain.update(gain);
        let avg_loss = self.avg_loss.update(loss);

        if self.avg_gain.count() < self.period {
            return single(f64::NAN);
        }

        let rsi = if avg_loss == 0.0 {
            if avg_gain == 0.0 {
                self.zero_zero_value
            } else {
                100.0
            }
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        };
        single(rsi.clamp(0.0, 100.0))
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// Stochastic oscillator
// ================================================================================================

/// %K from rolling extremes plus %D = SMA(%K, d). Outputs `[k, d]`.
#[derive(Debug, Clone)]
pub struct StochasticKernel {
    k_period: usize,
    d_period: usize,
    highs: MonotonicWindow,
    lows: MonotonicWindow,
    k_window: WindowAcc,
}

impl StochasticKernel {
    pub fn new(k_period: usize, d_period: usize) -> Self {
        Self {
            k_period,
            d_period,
            highs: MonotonicWindow::new(k_period, true),
            lows: MonotonicWindow::new(k_period, false),
            k_window: WindowAcc::new(d_period),
        }
    }
}

impl Kernel for StochasticKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, high, low, close, _) = x.bar();
        self.highs.push(high);
        self.lows.push(low);

        let hh = self.highs.extremum();
        let ll = self.lows.extremum();
        let k = if hh.is_nan() || ll.is_nan() || close.is_nan() {
            f64::NAN
        } else {
            let denom = hh - ll;
            if denom == 0.0 {
                50.0
            } else {
                100.0 * (close - ll) / denom
            }
        };

        self.k_window.push(k);
        let d = self.k_window.mean();
        smallvec![k, d]
    }

    fn min_periods(&self) -> usize {
        self.k_period
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// ADX
// ================================================================================================

/// Average Directional Index with +DI/−DI. Outputs `[adx, plus_di, minus_di]`.
///
/// Directional movements and true range use Wilder smoothing; DX is smoothed
/// again into ADX, so the three outputs warm up at staggered indices.
#[derive(Debug, Clone)]
pub struct AdxKernel {
    period: usize,
    prev: Option<(f64, f64, f64)>,
    rma_plus_dm: EwmAcc,
    rma_minus_dm: EwmAcc,
    rma_tr: EwmAcc,
    rma_dx: EwmAcc,
}

impl AdxKernel {
    pub fn new(period: usize) -> Self {
        let alpha = 1.0 / period as f64;
        Self {
            period,
            prev: None,
            rma_plus_dm: EwmAcc::new(alpha),
            rma_minus_dm: EwmAcc::new(alpha),
            rma_tr: EwmAcc::new(alpha),
            rma_dx: EwmAcc::new(alpha),
        }
    }
}

impl Kernel for AdxKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, high, low, close, _) = x.bar();
        if high.is_nan() || low.is_nan() || close.is_nan() {
            return smallvec![f64::NAN, f64::NAN, f64::NAN];
        }
        let Some((prev_high, prev_low, prev_close)) = self.prev else {
            self.prev = Some((high, low, close));
            return smallvec![f64::NAN, f64::NAN, f64::NAN];
        };
        self.prev = Some((high, low, close));

        let up_move = high - prev_high;
        let down_move = prev_low - low;
        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };
        let tr = true_range(high, low, Some(prev_close));

        let sm_plus = self.rma_plus_dm.update(plus_dm);
        let sm_minus = self.rma_minus_dm.update(minus_dm);
        let sm_tr = self.rma_tr.update(tr);

        if self.rma_tr.count() < self.period {
            return smallvec![f64::NAN, f64::NAN, f64::NAN];
        }

        let (plus_di, minus_di) = if sm_tr == 0.0 {
            (0.0, 0.0)
        } else {
            (100.0 * sm_plus / sm_tr, 100.0 * sm_minus / sm_tr)
        };

        let di_sum = plus_di + minus_di;
        let dx = if di_sum == 0.0 {
            0.0
        } else {
            100.0 * (plus_di - minus_di).abs() / di_sum
        };

        let adx = self.rma_dx.update(dx);
        let adx = if self.rma_dx.count() >= self.period {
            adx
        } else {
            f64::NAN
        };

        smallvec![adx, plus_di, minus_di]
    }

    fn min_periods(&self) -> usize {
        2 * self.period
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// CMO
// ================================================================================================

/// Chande Momentum Oscillator over rolling gain/loss sums.
#[derive(Debug, Clone)]
pub struct CmoKernel {
    period: usize,
    prev: Option<f64>,
    gains: WindowAcc,
    losses: WindowAcc,
}

impl CmoKernel {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev: None,
            gains: WindowAcc::new(period),
            losses: WindowAcc::new(period),
        }
    }
}

impl Kernel for CmoKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let v = x.value();
        if v.is_nan() {
            return single(f64::NAN);
        }
        let Some(prev) = self.prev else {
            self.prev = Some(v);
            return single(f64::NAN);
        };
        let delta = v - prev;
        self.prev = Some(v);
        self.gains.push(delta.max(0.0));
        self.losses.push((-delta).max(0.0));

        let su = self.gains.sum();
        let sd = self.losses.sum();
        if su.is_nan() || sd.is_nan() {
            return single(f64::NAN);
        }
        let denom = su + sd;
        if denom == 0.0 {
            single(0.0)
        } else {
            single(100.0 * (su - sd) / denom)
        }
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// ROC
// ================================================================================================

/// Rate of change over `period` bars, in percent.
#[derive(Debug, Clone)]
pub struct RocKernel {
    period: usize,
    buf: VecDeque<f64>,
}

impl RocKernel {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            buf: VecDeque::with_capacity(period + 1),
        }
    }
}

impl Kernel for RocKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let v = x.value();
        self.buf.push_back(v);
        if self.buf.len() > self.period + 1 {
            self.buf.pop_front();
        }
        if self.buf.len() < self.period + 1 {
            return single(f64::NAN);
        }
        let base = self.buf[0];
        if base == 0.0 {
            return single(f64::NAN);
        }
        single(100.0 * (v - base) / base)
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// Williams %R
// ================================================================================================

/// Williams %R: `−100 · (hh − close) / (hh − ll)`. Zero range → −50.
#[derive(Debug, Clone)]
pub struct WilliamsRKernel {
    period: usize,
    highs: MonotonicWindow,
    lows: MonotonicWindow,
}

impl WilliamsRKernel {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            highs: MonotonicWindow::new(period, true),
            lows: MonotonicWindow::new(period, false),
        }
    }
}

impl Kernel for WilliamsRKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, high, low, close, _) = x.bar();
        self.highs.push(high);
        self.lows.push(low);
        let hh = self.highs.extremum();
        let ll = self.lows.extremum();
        if hh.is_nan() || ll.is_nan() || close.is_nan() {
            return single(f64::NAN);
        }
        let denom = hh - ll;
        if denom == 0.0 {
            single(-50.0)
        } else {
            single(-100.0 * (hh - close) / denom)
        }
    }

    fn min_periods(&self) -> usize {
        self.period
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// MFI
// ================================================================================================

/// Money Flow Index over a window of signed typical-price money flows.
#[derive(Debug, Clone)]
pub struct MfiKernel {
    period: usize,
    prev_tp: Option<f64>,
    pos_flow: WindowAcc,
    neg_flow: WindowAcc,
}

impl MfiKernel {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_tp: None,
            pos_flow: WindowAcc::new(period),
            neg_flow: WindowAcc::new(period),
        }
    }
}

impl Kernel for MfiKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, high, low, close, volume) = x.bar();
        if high.is_nan() || low.is_nan() || close.is_nan() || volume.is_nan() {
            return single(f64::NAN);
        }
        let tp = (high + low + close) / 3.0;
        let Some(prev_tp) = self.prev_tp else {
            self.prev_tp = Some(tp);
            return single(f64::NAN);
        };
        self.prev_tp = Some(tp);

        let flow = tp * volume;
        if tp > prev_tp {
            self.pos_flow.push(flow);
            self.neg_flow.push(0.0);
        } else if tp < prev_tp {
            self.pos_flow.push(0.0);
            self.neg_flow.push(flow);
        } else {
            self.pos_flow.push(0.0);
            self.neg_flow.push(0.0);
        }

        let pos = self.pos_flow.sum();
        let neg = self.neg_flow.sum();
        if pos.is_nan() || neg.is_nan() {
            return single(f64::NAN);
        }
        if neg == 0.0 {
            return single(100.0);
        }
        let ratio = pos / neg;
        single(100.0 - 100.0 / (1.0 + ratio))
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// Vortex
// ================================================================================================

/// Vortex Indicator: rolling |H−prevL| and |L−prevH| sums over the rolling
/// true-range sum. Outputs `[plus, minus]`; a zero TR sum yields 0.
#[derive(Debug, Clone)]
pub struct VortexKernel {
    period: usize,
    prev: Option<(f64, f64, f64)>,
    vm_plus: WindowAcc,
    vm_minus: WindowAcc,
    tr_sum: WindowAcc,
}

impl VortexKernel {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev: None,
            vm_plus: WindowAcc::new(period),
            vm_minus: WindowAcc::new(period),
            tr_sum: WindowAcc::new(period),
        }
    }
}

impl Kernel for VortexKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, high, low, close, _) = x.bar();
        if high.is_nan() || low.is_nan() || close.is_nan() {
            return smallvec![f64::NAN, f64::NAN];
        }
        let Some((prev_high, prev_low, prev_close)) = self.prev else {
            self.prev = Some((high, low, close));
            return smallvec![f64::NAN, f64::NAN];
        };
        self.prev = Some((high, low, close));

        self.vm_plus.push((high - prev_low).abs());
        self.vm_minus.push((low - prev_high).abs());
        self.tr_sum.push(true_range(high, low, Some(prev_close)));

        let ts = self.tr_sum.sum();
        let vp = self.vm_plus.sum();
        let vm = self.vm_minus.sum();
        if ts.is_nan() || vp.is_nan() || vm.is_nan() {
            return smallvec![f64::NAN, f64::NAN];
        }
        if ts == 0.0 {
            smallvec![0.0, 0.0]
        } else {
            smallvec![vp / ts, vm / ts]
        }
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(kernel: &mut dyn Kernel, input: &[f64]) -> Vec<f64> {
        input
            .iter()
            .map(|&v| kernel.step(&Sample::Value(v))[0])
            .collect()
    }

    fn bar(h: f64, l: f64, c: f64) -> Sample {
        Sample::Bar {
            open: f64::NAN,
            high: h,
            low: l,
            close: c,
            volume: f64::NAN,
        }
    }

    #[test]
    fn rsi_on_constant_series_is_fifty() {
        let input = vec![100.0; 30];
        let mut k = RsiKernel::new(14);
        let out = run(&mut k, &input);
        for (i, v) in out.iter().enumerate() {
            if i < 14 {
                assert!(v.is_nan(), "index {} should be warmup", i);
            } else {
                assert_eq!(*v, 50.0, "index {}", i);
            }
        }
    }

    #[test]
    fn rsi_pure_uptrend_is_one_hundred() {
        let input: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let mut k = RsiKernel::new(5);
        let out = run(&mut k, &input);
        assert_eq!(out[19], 100.0);
    }

    #[test]
    fn rsi_zero_zero_toggle_is_respected() {
        let input = vec![100.0; 10];
        let mut k = RsiKernel::new(4).with_zero_zero_value(100.0);
        let out = run(&mut k, &input);
        assert_eq!(out[9], 100.0);
    }

    #[test]
    fn stochastic_k_is_position_in_range() {
        let bars = [
            bar(10.0, 8.0, 9.0),
            bar(11.0, 9.0, 10.0),
            bar(12.0, 10.0, 12.0),
        ];
        let mut k = StochasticKernel::new(3, 1);
        let mut last: StepOutput = smallvec![f64::NAN, f64::NAN];
        for b in &bars {
            last = k.step(b);
        }
        // hh = 12, ll = 8, close = 12 -> %K = 100
        assert_eq!(last[0], 100.0);
        assert_eq!(last[1], 100.0);
    }

    #[test]
    fn stochastic_flat_range_pins_k_at_fifty() {
        let mut k = StochasticKernel::new(2, 1);
        k.step(&bar(5.0, 5.0, 5.0));
        let out = k.step(&bar(5.0, 5.0, 5.0));
        assert_eq!(out[0], 50.0);
    }

    #[test]
    fn adx_staggers_di_and_adx_warmup() {
        let mut k = AdxKernel::new(3);
        let mut outs = Vec::new();
        for i in 0..10 {
            let base = i as f64;
            outs.push(k.step(&bar(base + 2.0, base, base + 1.0)));
        }
        // +DI defined after period deltas, ADX after 2*period-ish
        assert!(outs[2][1].is_nan());
        assert!(!outs[3][1].is_nan());
        assert!(outs[4][0].is_nan());
        assert!(!outs[6][0].is_nan());
        // monotone rally: -DI is zero, +DI positive
        assert!(outs[6][1] > 0.0);
        assert_eq!(outs[6][2], 0.0);
    }

    #[test]
    fn cmo_flat_series_is_zero() {
        let mut k = CmoKernel::new(3);
        let out = run(&mut k, &[5.0; 6]);
        assert_eq!(out[5], 0.0);
    }

    #[test]
    fn roc_matches_manual_percentage() {
        let mut k = RocKernel::new(2);
        let out = run(&mut k, &[10.0, 20.0, 15.0]);
        assert!(out[1].is_nan());
        assert_eq!(out[2], 50.0);
    }

    #[test]
    fn williams_r_bounds() {
        let bars = [bar(10.0, 8.0, 9.0), bar(11.0, 9.0, 11.0)];
        let mut k = WilliamsRKernel::new(2);
        let mut last = single(f64::NAN);
        for b in &bars {
            last = k.step(b);
        }
        // close at the top of the range -> 0
        assert_eq!(last[0], 0.0);
    }

    #[test]
    fn mfi_pure_inflow_saturates() {
        let mut k = MfiKernel::new(2);
        let mut last = single(f64::NAN);
        for i in 0..4 {
            let base = 10.0 + i as f64;
            last = k.step(&Sample::Bar {
                open: base,
                high: base + 1.0,
                low: base - 1.0,
                close: base,
                volume: 100.0,
            });
        }
        assert_eq!(last[0], 100.0);
    }

    #[test]
    fn vortex_outputs_follow_trend_direction() {
        let mut k = VortexKernel::new(3);
        let mut last: StepOutput = smallvec![f64::NAN, f64::NAN];
        for i in 0..6 {
            let base = 10.0 + i as f64;
            last = k.step(&bar(base + 1.0, base - 1.0, base));
        }
        assert!(last[0] > last[1], "uptrend should favour VI+");
    }
}
