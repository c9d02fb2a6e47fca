use smallvec::smallvec;

use crate::kernel::{ewm::EwmAcc, rolling::WindowAcc, single, Kernel, Sample, StepOutput};

// ================================================================================================
// Klinger oscillator
// ================================================================================================

/// Klinger oscillator: fast/slow EMA difference of the volume force, plus a
/// signal EMA of the oscillator. Outputs `[klinger, signal]`.
#[derive(Debug, Clone)]
pub struct KlingerKernel {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
    fast: EwmAcc,
    slow: EwmAcc,
    signal: EwmAcc,
    prev_hlc: Option<f64>,
    prev_dm: f64,
    prev_trend: f64,
    cm: f64,
}

impl KlingerKernel {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        Self {
            fast_period,
            slow_period,
            signal_period,
            fast: EwmAcc::new(2.0 / (fast_period as f64 + 1.0)),
            slow: EwmAcc::new(2.0 / (slow_period as f64 + 1.0)),
            signal: EwmAcc::new(2.0 / (signal_period as f64 + 1.0)),
            prev_hlc: None,
            prev_dm: 0.0,
            prev_trend: 0.0,
            cm: 0.0,
        }
    }
}

impl Kernel for KlingerKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, high, low, close, volume) = x.bar();
        if high.is_nan() || low.is_nan() || close.is_nan() || volume.is_nan() {
            return smallvec![f64::NAN, f64::NAN];
        }
        let hlc = high + low + close;
        let dm = high - low;
        let Some(prev_hlc) = self.prev_hlc else {
            self.prev_hlc = Some(hlc);
            self.prev_dm = dm;
            return smallvec![f64::NAN, f64::NAN];
        };
        self.prev_hlc = Some(hlc);

        let trend = if hlc > prev_hlc { 1.0 } else { -1.0 };
        self.cm = if trend == self.prev_trend {
            self.cm + dm
        } else {
            self.prev_dm + dm
        };
        self.prev_trend = trend;
        self.prev_dm = dm;

        let vf = if self.cm == 0.0 {
            0.0
        } else {
            volume * (2.0 * (dm / self.cm) - 1.0).abs() * trend * 100.0
        };

        let fast = self.fast.update(vf);
        let slow = self.slow.update(vf);
        if self.slow.count() < self.slow_period {
            return smallvec![f64::NAN, f64::NAN];
        }
        let klinger = fast - slow;
        let signal = self.signal.update(klinger);
        if self.signal.count() < self.signal_period {
            return smallvec![klinger, f64::NAN];
        }
        smallvec![klinger, signal]
    }

    fn min_periods(&self) -> usize {
        self.slow_period.max(self.fast_period)
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// OBV
// ================================================================================================

/// On-balance volume: signed cumulative volume, seeded at zero.
#[derive(Debug, Clone, Default)]
pub struct ObvKernel {
    prev_close: Option<f64>,
    acc: f64,
}

impl ObvKernel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Kernel for ObvKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, _, _, close, volume) = x.bar();
        if close.is_nan() || volume.is_nan() {
            return single(f64::NAN);
        }
        if let Some(prev) = self.prev_close {
            if close > prev {
                self.acc += volume;
            } else if close < prev {
                self.acc -= volume;
            }
        }
        self.prev_close = Some(close);
        single(self.acc)
    }

    fn min_periods(&self) -> usize {
        1
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// VWAP
// ================================================================================================

/// Cumulative volume-weighted average of the typical price.
#[derive(Debug, Clone, Default)]
pub struct VwapKernel {
    cum_pv: f64,
    cum_volume: f64,
}

impl VwapKernel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Kernel for VwapKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, high, low, close, volume) = x.bar();
        if high.is_nan() || low.is_nan() || close.is_nan() || volume.is_nan() {
            return single(f64::NAN);
        }
        let tp = (high + low + close) / 3.0;
        self.cum_pv += tp * volume;
        self.cum_volume += volume;
        if self.cum_volume == 0.0 {
            single(f64::NAN)
        } else {
            single(self.cum_pv / self.cum_volume)
        }
    }

    fn min_periods(&self) -> usize {
        1
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

// ================================================================================================
// CMF
// ================================================================================================

/// Chaikin Money Flow: rolling money-flow volume over rolling volume.
#[derive(Debug, Clone)]
pub struct CmfKernel {
    period: usize,
    mfv: WindowAcc,
    vol: WindowAcc,
}

impl CmfKernel {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            mfv: WindowAcc::new(period),
            vol: WindowAcc::new(period),
        }
    }
}

impl Kernel for CmfKernel {
    fn step(&mut self, x: &Sample) -> StepOutput {
        let (_, high, low, close, volume) = x.bar();
        if high.is_nan() || low.is_nan() || close.is_nan() || volume.is_nan() {
            self.mfv.push(f64::NAN);
            self.vol.push(f64::NAN);
            return single(f64::NAN);
        }
        let range = high - low;
        let multiplier = if range == 0.0 {
            0.0
        } else {
            ((close - low) - (high - close)) / range
        };
        self.mfv.push(multiplier * volume);
        self.vol.push(volume);

        let mfv = self.mfv.sum();
        let vol = self.vol.sum();
        if mfv.is_nan() || vol.is_nan() || vol == 0.0 {
            single(f64::NAN)
        } else {
            single(mfv / vol)
        }
    }

    fn min_periods(&self) -> usize {
        self.period
    }

    fn boxed_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(h: f64, l: f64, c: f64, v: f64) -> Sample {
        Sample::Bar {
            open: f64::NAN,
            high: h,
            low: l,
            close: c,
            volume: v,
        }
    }

    #[test]
    fn obv_accumulates_signed_volume() {
        let mut k = ObvKernel::new();
        assert_eq!(k.step(&bar(1.0, 1.0, 10.0, 100.0))[0], 0.0);
        assert_eq!(k.step(&bar(1.0, 1.0, 11.0, 50.0))[0], 50.0);
        assert_eq!(k.step(&bar(1.0, 1.0, 9.0, 30.0))[0], 20.0);
        assert_eq!(k.step(&bar(1.0, 1.0, 9.0, 99.0))[0], 20.0);
    }

    #[test]
    fn vwap_weights_by_volume() {
        let mut k = VwapKernel::new();
        k.step(&bar(10.0, 10.0, 10.0, 100.0));
        let out = k.step(&bar(20.0, 20.0, 20.0, 300.0));
        // (10*100 + 20*300) / 400
        assert_eq!(out[0], 17.5);
    }

    #[test]
    fn cmf_close_at_high_is_positive() {
        let mut k = CmfKernel::new(2);
        k.step(&bar(12.0, 10.0, 12.0, 100.0));
        let out = k.step(&bar(12.0, 10.0, 12.0, 100.0));
        assert_eq!(out[0], 1.0);
    }

    #[test]
    fn klinger_warms_up_with_slow_period() {
        let mut k = KlingerKernel::new(2, 4, 2);
        let mut outs = Vec::new();
        for i in 0..8 {
            let base = 10.0 + (i % 3) as f64;
            outs.push(k.step(&bar(base + 1.0, base - 1.0, base, 100.0)));
        }
        assert!(outs[3][0].is_nan());
        assert!(!outs[4][0].is_nan());
        assert!(!outs[6][1].is_nan());
    }
}
