//! Registration of the built-in indicator set.

use crate::{
    error::TaResult,
    kernel::{
        elementwise::{
            AbsKernel, CumSumKernel, DiffKernel, NegKernel, PosKernel, ShiftKernel, SignKernel,
            TrueRangeKernel, TypicalPriceKernel,
        },
        event::{ChannelKernel, ChannelMode, CrossKernel, CrossMode, TrendKernel, TrendMode,
            TrendPctKernel},
        ewm::{EmaKernel, RmaKernel, WmaKernel},
        momentum::{
            AdxKernel, CmoKernel, MfiKernel, RocKernel, RsiKernel, StochasticKernel, VortexKernel,
            WilliamsRKernel,
        },
        pattern::{FibDirection, FibLevelKernel, SwingLevelKernel, SwingPointsKernel, SwingSide},
        rolling::{
            RollingArgmaxKernel, RollingArgminKernel, RollingMaxKernel, RollingMeanKernel,
            RollingMedianKernel, RollingMinKernel, RollingStdKernel, RollingSumKernel,
        },
        trend::{FisherKernel, IchimokuKernel, MacdKernel, PsarKernel, SupertrendKernel},
        volatility::{AtrKernel, BollingerKernel, DonchianKernel, KeltnerKernel},
        volume::{CmfKernel, KlingerKernel, ObvKernel, VwapKernel},
    },
    registry::{
        IndicatorDef, IndicatorSpec, KernelFactory, OutputSpec, ParamSpec, Polarity, Registry,
        Semantics,
    },
};

fn def(
    name: &str,
    description: &str,
    aliases: &[&str],
    params: Vec<ParamSpec>,
    outputs: Vec<OutputSpec>,
    semantics: Semantics,
    factory: KernelFactory,
) -> IndicatorDef {
    IndicatorDef {
        spec: IndicatorSpec {
            name: name.to_string(),
            description: description.to_string(),
            params,
            outputs,
            semantics,
            kernel_id: name.to_string(),
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
            param_aliases: vec![("lookback".to_string(), "period".to_string())],
        },
        factory,
    }
}

fn def_no_period(
    name: &str,
    description: &str,
    aliases: &[&str],
    params: Vec<ParamSpec>,
    outputs: Vec<OutputSpec>,
    semantics: Semantics,
    factory: KernelFactory,
) -> IndicatorDef {
    let mut d = def(name, description, aliases, params, outputs, semantics, factory);
    d.spec.param_aliases.clear();
    d
}

fn line(name: &str) -> Vec<OutputSpec> {
    vec![OutputSpec::line(name)]
}

fn period_param(default: i64) -> Vec<ParamSpec> {
    vec![
        ParamSpec::int("period", default),
        ParamSpec::optional_str("field"),
    ]
}

pub fn register_all(registry: &mut Registry) -> TaResult<()> {
    register_select(registry)?;
    register_rolling(registry)?;
    register_ewm(registry)?;
    register_elementwise(registry)?;
    register_momentum(registry)?;
    register_trend(registry)?;
    register_volatility(registry)?;
    register_volume(registry)?;
    register_pattern(registry)?;
    register_events(registry)?;
    Ok(())
}

fn register_select(registry: &mut Registry) -> TaResult<()> {
    let mut semantics = Semantics::value(&[]);
    semantics.input_slots = 0;
    registry.register(def_no_period(
        "select",
        "Select a named field from the active partition",
        &[],
        vec![ParamSpec::optional_str("field")],
        line("result"),
        semantics,
        |_| Ok(Box::new(PosKernel::new())),
    ))
}

fn register_rolling(registry: &mut Registry) -> TaResult<()> {
    registry.register(def(
        "rolling_sum",
        "Rolling sum over a window",
        &["sum"],
        period_param(20),
        line("result"),
        Semantics::value(&["period"]),
        |p| Ok(Box::new(RollingSumKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "rolling_mean",
        "Rolling mean over a window",
        &["mean", "sma", "average", "avg"],
        period_param(20),
        line("result"),
        Semantics::value(&["period"]),
        |p| Ok(Box::new(RollingMeanKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "rolling_std",
        "Rolling population standard deviation over a window",
        &["std", "stddev"],
        period_param(20),
        line("result"),
        Semantics::value(&["period"]),
        |p| Ok(Box::new(RollingStdKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "rolling_max",
        "Maximum value in a rolling window",
        &["max", "highest"],
        period_param(20),
        line("result"),
        Semantics::value(&["period"]),
        |p| Ok(Box::new(RollingMaxKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "rolling_min",
        "Minimum value in a rolling window",
        &["min", "lowest"],
        period_param(20),
        line("result"),
        Semantics::value(&["period"]),
        |p| Ok(Box::new(RollingMinKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "rolling_median",
        "Median value in a rolling window",
        &["median"],
        period_param(20),
        line("result"),
        Semantics::value(&["period"]),
        |p| Ok(Box::new(RollingMedianKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "rolling_argmax",
        "Bars since the window maximum",
        &["argmax"],
        period_param(20),
        line("result"),
        Semantics::value(&["period"]),
        |p| Ok(Box::new(RollingArgmaxKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "rolling_argmin",
        "Bars since the window minimum",
        &["argmin"],
        period_param(20),
        line("result"),
        Semantics::value(&["period"]),
        |p| Ok(Box::new(RollingArgminKernel::new(p.get_usize("period")?))),
    ))
}

fn register_ewm(registry: &mut Registry) -> TaResult<()> {
    registry.register(def(
        "ema",
        "Exponential moving average (alpha = 2 / (period + 1))",
        &["rolling_ema"],
        period_param(20),
        line("result"),
        Semantics::value(&["period"]),
        |p| Ok(Box::new(EmaKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "rma",
        "Wilder smoothed moving average (alpha = 1 / period)",
        &["smoothed_ma"],
        period_param(14),
        line("result"),
        Semantics::value(&["period"]),
        |p| Ok(Box::new(RmaKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "wma",
        "Linearly weighted moving average",
        &["rolling_wma"],
        period_param(20),
        line("result"),
        Semantics::value(&["period"]),
        |p| Ok(Box::new(WmaKernel::new(p.get_usize("period")?))),
    ))
}

fn register_elementwise(registry: &mut Registry) -> TaResult<()> {
    let value_no_lookback = || {
        let mut s = Semantics::value(&[]);
        s.default_lookback = 1;
        s
    };

    registry.register(def_no_period(
        "diff",
        "Difference between consecutive values",
        &[],
        vec![ParamSpec::optional_str("field")],
        line("result"),
        {
            let mut s = value_no_lookback();
            s.default_lookback = 2;
            s
        },
        |_| Ok(Box::new(DiffKernel::new())),
    ))?;
    registry.register(def_no_period(
        "shift",
        "Lag a series by a number of bars",
        &[],
        vec![
            ParamSpec::int("periods", 1).with_min(0.0),
            ParamSpec::optional_str("field"),
        ],
        line("result"),
        {
            let mut s = Semantics::value(&["periods"]);
            s.lookback_params = vec!["periods".to_string()];
            s
        },
        |p| Ok(Box::new(ShiftKernel::new(p.get_usize("periods")?))),
    ))?;
    registry.register(def_no_period(
        "cumulative_sum",
        "Cumulative sum of a series",
        &["cumsum"],
        vec![ParamSpec::optional_str("field")],
        line("result"),
        value_no_lookback(),
        |_| Ok(Box::new(CumSumKernel::new())),
    ))?;
    registry.register(def_no_period(
        "abs",
        "Absolute value",
        &["abs_value"],
        vec![ParamSpec::optional_str("field")],
        line("result"),
        value_no_lookback(),
        |_| Ok(Box::new(AbsKernel::new())),
    ))?;
    registry.register(def_no_period(
        "sign",
        "Sign of a series (-1, 0, 1)",
        &[],
        vec![ParamSpec::optional_str("field")],
        line("result"),
        value_no_lookback(),
        |_| Ok(Box::new(SignKernel::new())),
    ))?;
    registry.register(def_no_period(
        "neg",
        "Unary negation",
        &["negative"],
        vec![ParamSpec::optional_str("field")],
        line("result"),
        value_no_lookback(),
        |_| Ok(Box::new(NegKernel::new())),
    ))?;
    registry.register(def_no_period(
        "pos",
        "Unary plus (identity)",
        &["positive"],
        vec![ParamSpec::optional_str("field")],
        line("result"),
        value_no_lookback(),
        |_| Ok(Box::new(PosKernel::new())),
    ))?;
    registry.register(def_no_period(
        "true_range",
        "Bar true range",
        &["tr"],
        Vec::new(),
        line("result"),
        Semantics::bar(&["high", "low", "close"], &[]),
        |_| Ok(Box::new(TrueRangeKernel::new())),
    ))?;
    registry.register(def_no_period(
        "typical_price",
        "Typical price (h + l + c) / 3",
        &[],
        Vec::new(),
        line("result"),
        Semantics::bar(&["high", "low", "close"], &[]),
        |_| Ok(Box::new(TypicalPriceKernel::new())),
    ))
}

fn register_momentum(registry: &mut Registry) -> TaResult<()> {
    registry.register(def(
        "rsi",
        "Relative Strength Index (Wilder smoothing)",
        &[],
        period_param(14),
        line("result"),
        Semantics::value(&["period"]),
        |p| Ok(Box::new(RsiKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def_no_period(
        "stochastic",
        "Stochastic oscillator (%K and %D)",
        &["stoch"],
        vec![ParamSpec::int("k_period", 14), ParamSpec::int("d_period", 3)],
        vec![OutputSpec::line("k"), OutputSpec::line("d")],
        Semantics::bar(&["high", "low", "close"], &["k_period", "d_period"]),
        |p| {
            Ok(Box::new(StochasticKernel::new(
                p.get_usize("k_period")?,
                p.get_usize("d_period")?,
            )))
        },
    ))?;
    registry.register(def(
        "adx",
        "Average Directional Index with +DI and -DI",
        &[],
        vec![ParamSpec::int("period", 14)],
        vec![
            OutputSpec::line("adx"),
            OutputSpec::line("plus_di"),
            OutputSpec::line("minus_di"),
        ],
        Semantics::bar(&["high", "low", "close"], &["period"]),
        |p| Ok(Box::new(AdxKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "cmo",
        "Chande Momentum Oscillator",
        &[],
        period_param(14),
        line("result"),
        Semantics::value(&["period"]),
        |p| Ok(Box::new(CmoKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "roc",
        "Rate of change in percent",
        &[],
        period_param(12),
        line("result"),
        Semantics::value(&["period"]),
        |p| Ok(Box::new(RocKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "williams_r",
        "Williams %R",
        &["willr"],
        vec![ParamSpec::int("period", 14)],
        line("result"),
        Semantics::bar(&["high", "low", "close"], &["period"]),
        |p| Ok(Box::new(WilliamsRKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "mfi",
        "Money Flow Index",
        &[],
        vec![ParamSpec::int("period", 14)],
        line("result"),
        Semantics::bar(&["high", "low", "close", "volume"], &["period"]),
        |p| Ok(Box::new(MfiKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "vortex",
        "Vortex Indicator (VI+ and VI-)",
        &[],
        vec![ParamSpec::int("period", 14)],
        vec![OutputSpec::line("plus"), OutputSpec::line("minus")],
        Semantics::bar(&["high", "low", "close"], &["period"]),
        |p| Ok(Box::new(VortexKernel::new(p.get_usize("period")?))),
    ))
}

fn register_trend(registry: &mut Registry) -> TaResult<()> {
    registry.register(def_no_period(
        "macd",
        "Moving Average Convergence Divergence",
        &[],
        vec![
            ParamSpec::int("fast_period", 12),
            ParamSpec::int("slow_period", 26),
            ParamSpec::int("signal_period", 9),
        ],
        vec![
            OutputSpec::line("macd"),
            OutputSpec::line("signal"),
            OutputSpec::line("histogram"),
        ],
        Semantics::value(&["fast_period", "slow_period", "signal_period"]),
        |p| {
            Ok(Box::new(MacdKernel::new(
                p.get_usize("fast_period")?,
                p.get_usize("slow_period")?,
                p.get_usize("signal_period")?,
            )))
        },
    ))?;
    registry.register(def_no_period(
        "psar",
        "Parabolic SAR (Stop and Reverse)",
        &["sar"],
        vec![
            ParamSpec::float("af_start", 0.02).with_min(0.0),
            ParamSpec::float("af_increment", 0.02).with_min(0.0),
            ParamSpec::float("af_max", 0.2).with_min(0.0),
        ],
        vec![OutputSpec::line("sar"), OutputSpec::line("direction")],
        Semantics::bar(&["high", "low", "close"], &[]),
        |p| {
            Ok(Box::new(PsarKernel::new(
                p.get_f64("af_start")?,
                p.get_f64("af_increment")?,
                p.get_f64("af_max")?,
            )))
        },
    ))?;
    registry.register(def(
        "supertrend",
        "Supertrend band with latched direction",
        &[],
        vec![
            ParamSpec::int("period", 10),
            ParamSpec::float("multiplier", 3.0).with_min(0.0),
        ],
        vec![OutputSpec::line("supertrend"), OutputSpec::line("direction")],
        Semantics::bar(&["high", "low", "close"], &["period"]),
        |p| {
            Ok(Box::new(SupertrendKernel::new(
                p.get_usize("period")?,
                p.get_f64("multiplier")?,
            )))
        },
    ))?;
    registry.register(def_no_period(
        "ichimoku",
        "Ichimoku Cloud (Ichimoku Kinko Hyo)",
        &[],
        vec![
            ParamSpec::int("tenkan_period", 9),
            ParamSpec::int("kijun_period", 26),
            ParamSpec::int("span_b_period", 52),
            ParamSpec::int("displacement", 26),
        ],
        vec![
            OutputSpec::line("tenkan_sen"),
            OutputSpec::line("kijun_sen"),
            OutputSpec::line("senkou_span_a"),
            OutputSpec::line("senkou_span_b"),
            OutputSpec::line("chikou_span"),
        ],
        Semantics::bar(
            &["high", "low", "close"],
            &["tenkan_period", "kijun_period", "span_b_period", "displacement"],
        ),
        |p| {
            Ok(Box::new(IchimokuKernel::new(
                p.get_usize("tenkan_period")?,
                p.get_usize("kijun_period")?,
                p.get_usize("span_b_period")?,
                p.get_usize("displacement")?,
            )))
        },
    ))?;
    registry.register(def(
        "fisher",
        "Fisher Transform",
        &[],
        vec![ParamSpec::int("period", 9)],
        vec![OutputSpec::line("fisher"), OutputSpec::line("signal")],
        Semantics::bar(&["high", "low"], &["period"]),
        |p| Ok(Box::new(FisherKernel::new(p.get_usize("period")?))),
    ))
}

fn register_volatility(registry: &mut Registry) -> TaResult<()> {
    registry.register(def(
        "atr",
        "Average True Range (Wilder smoothing of true range)",
        &[],
        vec![ParamSpec::int("period", 14)],
        line("result"),
        Semantics::bar(&["high", "low", "close"], &["period"]),
        |p| Ok(Box::new(AtrKernel::new(p.get_usize("period")?))),
    ))?;
    registry.register(def(
        "bbands",
        "Bollinger bands (mean ± k · population std)",
        &["bollinger", "bb"],
        vec![
            ParamSpec::int("period", 20),
            ParamSpec::float("std_dev", 2.0).with_min(0.0),
        ],
        vec![
            OutputSpec::line("upper"),
            OutputSpec::line("mean"),
            OutputSpec::line("lower"),
        ],
        Semantics::value(&["period"]),
        |p| {
            Ok(Box::new(BollingerKernel::new(
                p.get_usize("period")?,
                p.get_f64("std_dev")?,
            )))
        },
    ))?;
    registry.register(def(
        "keltner",
        "Keltner channel (EMA midline ± multiplier · ATR)",
        &["kc"],
        vec![
            ParamSpec::int("period", 20),
            ParamSpec::int("atr_period", 10),
            ParamSpec::float("multiplier", 2.0).with_min(0.0),
        ],
        vec![
            OutputSpec::line("upper"),
            OutputSpec::line("mid"),
            OutputSpec::line("lower"),
        ],
        Semantics::bar(&["high", "low", "close"], &["period", "atr_period"]),
        |p| {
            Ok(Box::new(KeltnerKernel::new(
                p.get_usize("period")?,
                p.get_usize("atr_period")?,
                p.get_f64("multiplier")?,
            )))
        },
    ))?;
    registry.register(def(
        "donchian",
        "Donchian channel",
        &["dc"],
        vec![ParamSpec::int("period", 20)],
        vec![
            OutputSpec::line("upper"),
            OutputSpec::line("mid"),
            OutputSpec::line("lower"),
        ],
        Semantics::bar(&["high", "low"], &["period"]),
        |p| Ok(Box::new(DonchianKernel::new(p.get_usize("period")?))),
    ))
}

fn register_volume(registry: &mut Registry) -> TaResult<()> {
    registry.register(def_no_period(
        "klinger",
        "Klinger oscillator (volume-force EMA difference + signal)",
        &[],
        vec![
            ParamSpec::int("fast_period", 34),
            ParamSpec::int("slow_period", 55),
            ParamSpec::int("signal_period", 13),
        ],
        vec![OutputSpec::line("klinger"), OutputSpec::line("signal")],
        Semantics::bar(
            &["high", "low", "close", "volume"],
            &["fast_period", "slow_period", "signal_period"],
        ),
        |p| {
            Ok(Box::new(KlingerKernel::new(
                p.get_usize("fast_period")?,
                p.get_usize("slow_period")?,
                p.get_usize("signal_period")?,
            )))
        },
    ))?;
    registry.register(def_no_period(
        "obv",
        "On-balance volume",
        &[],
        Vec::new(),
        line("result"),
        Semantics::bar(&["close", "volume"], &[]),
        |_| Ok(Box::new(ObvKernel::new())),
    ))?;
    registry.register(def_no_period(
        "vwap",
        "Cumulative volume-weighted average price",
        &[],
        Vec::new(),
        line("result"),
        Semantics::bar(&["high", "low", "close", "volume"], &[]),
        |_| Ok(Box::new(VwapKernel::new())),
    ))?;
    registry.register(def(
        "cmf",
        "Chaikin Money Flow",
        &[],
        vec![ParamSpec::int("period", 20)],
        line("result"),
        Semantics::bar(&["high", "low", "close", "volume"], &["period"]),
        |p| Ok(Box::new(CmfKernel::new(p.get_usize("period")?))),
    ))
}

fn register_pattern(registry: &mut Registry) -> TaResult<()> {
    let swing_params = || vec![ParamSpec::int("left", 2), ParamSpec::int("right", 2)];

    registry.register(def_no_period(
        "swing_points",
        "Confirmed fractal swing highs and lows",
        &[],
        swing_params(),
        vec![
            OutputSpec::flag("swing_high", Polarity::High),
            OutputSpec::flag("swing_low", Polarity::Low),
        ],
        Semantics::bar(&["high", "low"], &["left", "right"]),
        |p| {
            Ok(Box::new(SwingPointsKernel::new(
                p.get_usize("left")?,
                p.get_usize("right")?,
            )))
        },
    ))?;
    registry.register(def_no_period(
        "swing_high_at",
        "Price of the nth latest confirmed swing high",
        &[],
        {
            let mut p = swing_params();
            p.insert(0, ParamSpec::int("index", 1));
            p
        },
        vec![OutputSpec::level("result", Polarity::High)],
        Semantics::bar(&["high", "low"], &["left", "right", "index"]),
        |p| {
            Ok(Box::new(SwingLevelKernel::new(
                SwingSide::High,
                p.get_usize("index")?,
                p.get_usize("left")?,
                p.get_usize("right")?,
            )))
        },
    ))?;
    registry.register(def_no_period(
        "swing_low_at",
        "Price of the nth latest confirmed swing low",
        &[],
        {
            let mut p = swing_params();
            p.insert(0, ParamSpec::int("index", 1));
            p
        },
        vec![OutputSpec::level("result", Polarity::Low)],
        Semantics::bar(&["high", "low"], &["left", "right", "index"]),
        |p| {
            Ok(Box::new(SwingLevelKernel::new(
                SwingSide::Low,
                p.get_usize("index")?,
                p.get_usize("left")?,
                p.get_usize("right")?,
            )))
        },
    ))?;
    registry.register(def_no_period(
        "fib_level_down",
        "Fibonacci retracement projected down from the latest swing high",
        &["fib_down"],
        {
            let mut p = swing_params();
            p.insert(0, ParamSpec::float("level", 0.618).with_min(0.0));
            p
        },
        vec![OutputSpec::level("result", Polarity::High)],
        Semantics::bar(&["high", "low"], &["left", "right"]),
        |p| {
            Ok(Box::new(FibLevelKernel::new(
                FibDirection::Down,
                p.get_f64("level")?,
                p.get_usize("left")?,
                p.get_usize("right")?,
            )))
        },
    ))?;
    registry.register(def_no_period(
        "fib_level_up",
        "Fibonacci retracement projected up from the latest swing low",
        &["fib_up"],
        {
            let mut p = swing_params();
            p.insert(0, ParamSpec::float("level", 0.618).with_min(0.0));
            p
        },
        vec![OutputSpec::level("result", Polarity::Low)],
        Semantics::bar(&["high", "low"], &["left", "right"]),
        |p| {
            Ok(Box::new(FibLevelKernel::new(
                FibDirection::Up,
                p.get_f64("level")?,
                p.get_usize("left")?,
                p.get_usize("right")?,
            )))
        },
    ))
}

fn register_events(registry: &mut Registry) -> TaResult<()> {
    registry.register(def_no_period(
        "crossup",
        "a crosses above b",
        &[],
        Vec::new(),
        line("result"),
        Semantics::pair(),
        |_| Ok(Box::new(CrossKernel::new(CrossMode::Up))),
    ))?;
    registry.register(def_no_period(
        "crossdown",
        "a crosses below b",
        &[],
        Vec::new(),
        line("result"),
        Semantics::pair(),
        |_| Ok(Box::new(CrossKernel::new(CrossMode::Down))),
    ))?;
    registry.register(def_no_period(
        "cross",
        "a crosses b in either direction",
        &[],
        Vec::new(),
        line("result"),
        Semantics::pair(),
        |_| Ok(Box::new(CrossKernel::new(CrossMode::Any))),
    ))?;
    registry.register(def_no_period(
        "rising",
        "Series is rising (current > previous)",
        &[],
        Vec::new(),
        line("result"),
        {
            let mut s = Semantics::value(&[]);
            s.default_lookback = 2;
            s
        },
        |_| Ok(Box::new(TrendKernel::new(TrendMode::Rising))),
    ))?;
    registry.register(def_no_period(
        "falling",
        "Series is falling (current < previous)",
        &[],
        Vec::new(),
        line("result"),
        {
            let mut s = Semantics::value(&[]);
            s.default_lookback = 2;
            s
        },
        |_| Ok(Box::new(TrendKernel::new(TrendMode::Falling))),
    ))?;
    registry.register(def_no_period(
        "rising_pct",
        "Series rose by at least pct percent over one bar",
        &[],
        vec![ParamSpec::required_float("pct")],
        line("result"),
        {
            let mut s = Semantics::value(&[]);
            s.default_lookback = 2;
            s
        },
        |p| {
            Ok(Box::new(TrendPctKernel::new(
                TrendMode::Rising,
                p.get_f64("pct")?,
            )))
        },
    ))?;
    registry.register(def_no_period(
        "falling_pct",
        "Series fell by at least pct percent over one bar",
        &[],
        vec![ParamSpec::required_float("pct")],
        line("result"),
        {
            let mut s = Semantics::value(&[]);
            s.default_lookback = 2;
            s
        },
        |p| {
            Ok(Box::new(TrendPctKernel::new(
                TrendMode::Falling,
                p.get_f64("pct")?,
            )))
        },
    ))?;
    registry.register(def_no_period(
        "in_channel",
        "Price is inside [lower, upper]",
        &[],
        Vec::new(),
        line("result"),
        Semantics::triple(),
        |_| Ok(Box::new(ChannelKernel::new(ChannelMode::In))),
    ))?;
    registry.register(def_no_period(
        "out",
        "Price is outside [lower, upper]",
        &["out_channel"],
        Vec::new(),
        line("result"),
        Semantics::triple(),
        |_| Ok(Box::new(ChannelKernel::new(ChannelMode::Out))),
    ))?;
    registry.register(def_no_period(
        "enter",
        "Price entered the channel this bar",
        &[],
        Vec::new(),
        line("result"),
        Semantics::triple(),
        |_| Ok(Box::new(ChannelKernel::new(ChannelMode::Enter))),
    ))?;
    registry.register(def_no_period(
        "exit",
        "Price exited the channel this bar",
        &[],
        Vec::new(),
        line("result"),
        Semantics::triple(),
        |_| Ok(Box::new(ChannelKernel::new(ChannelMode::Exit))),
    ))
}
