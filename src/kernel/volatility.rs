use smallvec::smallvec;

use crate::kernel::{
    elementwise::true_range,
    ewm::EwmAcc,
    rolling::{MonotonicWindow, WindowAcc},
    single, Kernel, Sample, StepOutput,
};

// ================================================================================================
// ATR
// ================================================================================================

/// Average True Range: Wilder smoothing of the true range.
#[derive(Debug, Clone)]
pub struct AtrKernel {
    period: usize,
    prev_close: Option<f64>,
    rma: EwmAcc,
}

impl AtrKernel {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            rma: EwmAcc::new(1.0 / period as f64),
        }
    }
}

impl Kernel for AtrKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, high, low, close, _) = x.bar();
        if high.is_nan() || low.is_nan() || close.is_nan() {
            return single(f64::NAN);
        }
        let tr = true_range(high, low, self.prev_close);
        self.prev_close = Some(close);
        let atr = self.rma.update(tr);
        if self.rma.count() < self.period {
            single(f64::NAN)
        } else {
            single(atr)
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
// Bollinger bands
// ================================================================================================

/// Bollinger bands: rolling mean ± k · population std.
/// Outputs `[upper, mean, lower]`.
#[derive(Debug, Clone)]
pub struct BollingerKernel {
    acc: WindowAcc,
    period: usize,
    std_dev: f64,
}

impl BollingerKernel {
    pub fn new(period: usize, std_dev: f64) -> Self {
        Self {
            acc: WindowAcc::new(period),
            period,
            std_dev,
        }
    }
}

impl Kernel for BollingerKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        self.acc.push(x.value());
        let mean = self.acc.mean();
        let std = self.acc.std();
        if mean.is_nan() || std.is_nan() {
            return smallvec![f64::NAN, f64::NAN, f64::NAN];
        }
        let width = self.std_dev * std;
        smallvec![mean + width, mean, mean - width]
    }

    fn min_periods(&self) -> usize {
        self.period
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// Keltner channel
// ================================================================================================

/// Keltner channel: EMA midline ± multiplier · ATR.
/// Outputs `[upper, mid, lower]`.
#[derive(Debug, Clone)]
pub struct KeltnerKernel {
    period: usize,
    atr_period: usize,
    multiplier: f64,
    ema: EwmAcc,
    prev_close: Option<f64>,
    atr: EwmAcc,
}

impl KeltnerKernel {
    pub fn new(period: usize, atr_period: usize, multiplier: f64) -> Self {
        Self {
            period,
            atr_period,
            multiplier,
            ema: EwmAcc::new(2.0 / (period as f64 + 1.0)),
            prev_close: None,
            atr: EwmAcc::new(1.0 / atr_period as f64),
        }
    }
}

impl Kernel for KeltnerKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, high, low, close, _) = x.bar();
        if high.is_nan() || low.is_nan() || close.is_nan() {
            return smallvec![f64::NAN, f64::NAN, f64::NAN];
        }
        let tr = true_range(high, low, self.prev_close);
        self.prev_close = Some(close);

        let mid = self.ema.update(close);
        let atr = self.atr.update(tr);
        if self.ema.count() < self.period || self.atr.count() < self.atr_period {
            return smallvec![f64::NAN, f64::NAN, f64::NAN];
        }
        let width = self.multiplier * atr;
        smallvec![mid + width, mid, mid - width]
    }

    fn min_periods(&self) -> usize {
        self.period.max(self.atr_period)
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// Donchian channel
// ================================================================================================

/// Donchian channel: rolling extreme highs/lows and their midline.
/// Outputs `[upper, mid, lower]`.
#[derive(Debug, Clone)]
pub struct DonchianKernel {
    period: usize,
    highs: MonotonicWindow,
    lows: MonotonicWindow,
}

impl DonchianKernel {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            highs: MonotonicWindow::new(period, true),
            lows: MonotonicWindow::new(period, false),
        }
    }
}

impl Kernel for DonchianKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, high, low, _, _) = x.bar();
        self.highs.push(high);
        self.lows.push(low);
        let upper = self.highs.extremum();
        let lower = self.lows.extremum();
        smallvec![upper, (upper + lower) / 2.0, lower]
    }

    fn min_periods(&self) -> usize {
        self.period
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}
