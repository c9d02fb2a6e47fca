mod common;

use std::sync::Arc;

use quantra::{
    Engine, EvalOptions, NodeOutput, Registry, Source, StreamBackend,
};

use common::*;

fn engine() -> Engine {
    Engine::new(Arc::new(Registry::builtin()))
}

/// Batch over `[0..n]` and a fresh stream fed `tick[0..n]` must produce the
/// same output sequence, masks included.
fn assert_parity(text: &str, closes: &[f64]) {
    let engine = engine();
    let plan = engine.compile(text).unwrap();

    let batch = engine
        .evaluate(&plan, &ohlcv_dataset(closes), &EvalOptions::default())
        .unwrap();
    let batch_series = batch.root.primary();

    let mut backend = StreamBackend::new(
        Arc::clone(engine.registry()),
        plan,
        timeframe(),
        Source::Ohlcv,
    )
    .unwrap();

    for (i, tick) in ohlcv_ticks(closes).iter().enumerate() {
        let streamed = backend.step(tick).unwrap();
        let expected = batch_series.values()[i];
        if expected.is_nan() {
            assert!(
                streamed.is_nan(),
                "{text}: index {i} batch NaN but stream {streamed}"
            );
        } else {
            assert_eq!(
                streamed.to_bits(),
                expected.to_bits(),
                "{text}: index {i} batch {expected} stream {streamed}"
            );
        }
    }
}

#[test]
fn rolling_and_smoothing_kernels_agree() {
    let closes = wavy_closes(120);
    for text in [
        "sma(close, 5)",
        "rolling_sum(close, 7)",
        "std(close, 6)",
        "max(close, 9)",
        "min(close, 9)",
        "median(close, 5)",
        "argmax(close, 6)",
        "ema(close, 8)",
        "rma(close, 8)",
        "wma(close, 4)",
    ] {
        assert_parity(text, &closes);
    }
}

#[test]
fn elementwise_kernels_agree() {
    let closes = wavy_closes(80);
    for text in [
        "diff(close)",
        "shift(close, 3)",
        "cumsum(close)",
        "sign(diff(close))",
        "abs(close - 100)",
        "true_range()",
        "typical_price()",
    ] {
        assert_parity(text, &closes);
    }
}

#[test]
fn momentum_kernels_agree() {
    let closes = wavy_closes(150);
    for text in [
        "rsi(7)",
        "stochastic(5, 3).d",
        "adx(4)[1]",
        "adx(4)",
        "cmo(6)",
        "roc(5)",
        "williams_r(6)",
        "mfi(5)",
        "vortex(5).minus",
    ] {
        assert_parity(text, &closes);
    }
}

#[test]
fn trend_and_volatility_kernels_agree() {
    let closes = wavy_closes(150);
    for text in [
        "macd(5, 13, 4).histogram",
        "psar()",
        "psar()[1]",
        "supertrend(4, 2.0)",
        "atr(5)",
        "bbands(8, 2).lower",
        "keltner(6, 4, 1.5).upper",
        "donchian(7).mid",
        "fisher(5)",
        "ichimoku(3, 5, 8, 4).senkou_span_a",
    ] {
        assert_parity(text, &closes);
    }
}

#[test]
fn volume_kernels_agree() {
    let closes = wavy_closes(100);
    for text in ["obv()", "vwap()", "cmf(6)", "klinger(4, 8, 3)"] {
        assert_parity(text, &closes);
    }
}

#[test]
fn pattern_kernels_agree() {
    let closes = wavy_closes(100);
    for text in [
        "swing_points(2, 2).swing_high",
        "swing_high_at(1, 2, 2)",
        "swing_low_at(2, 2, 2)",
        "fib_level_down(0.618, 2, 2)",
        "fib_level_up(0.382, 2, 2)",
    ] {
        assert_parity(text, &closes);
    }
}

#[test]
fn event_kernels_agree() {
    let closes = wavy_closes(100);
    for text in [
        "crossup(close, 100)",
        "crossdown(sma(close, 3), sma(close, 5))",
        "cross(close, 100)",
        "rising(close)",
        "falling(volume)",
        "rising_pct(close, 2.0)",
        "in_channel(close, 110, 95)",
        "enter(close, 110, 95)",
        "exit(close, 110, 95)",
        "out(close, 110, 95)",
    ] {
        assert_parity(text, &closes);
    }
}

#[test]
fn composed_expressions_agree() {
    let closes = wavy_closes(150);
    for text in [
        "sma(close, 5) > sma(close, 9)",
        "crossup(rsi(7), 60) and close > sma(close, 10)",
        "ema(rsi(5), 3) - 50",
        "close.roc_4 > 0 or falling(close)",
        "close.2h_ago",
        "close.change_pct_3h",
        "not (close > 100)",
        "(close - sma(close, 5)) / std(close, 5)",
    ] {
        assert_parity(text, &closes);
    }
}

// ================================================================================================
// Spec scenario 5: MACD stream parity, bit for bit
// ================================================================================================

#[test]
fn macd_stream_matches_batch_bit_for_bit() {
    let closes: Vec<f64> = (1..=60).map(|i| i as f64).collect();
    let engine = engine();
    let plan = engine.compile("macd(12, 26, 9)").unwrap();

    let batch = engine
        .evaluate(&plan, &ohlcv_dataset(&closes), &EvalOptions::default())
        .unwrap();
    let NodeOutput::Multi(outputs) = &batch.root else {
        panic!("macd should be multi-output");
    };

    let mut backend = StreamBackend::new(
        Arc::clone(engine.registry()),
        plan,
        timeframe(),
        Source::Ohlcv,
    )
    .unwrap();

    for (i, tick) in ohlcv_ticks(&closes).iter().enumerate() {
        let row = backend.step_outputs(tick).unwrap();
        for (j, (name, series)) in outputs.iter().enumerate() {
            let expected = series.values()[i];
            let streamed = row[j];
            if expected.is_nan() {
                assert!(streamed.is_nan(), "{name}[{i}]");
            } else {
                assert_eq!(streamed.to_bits(), expected.to_bits(), "{name}[{i}]");
            }
        }
    }
}

// ================================================================================================
// Snapshot / replay
// ================================================================================================

#[test]
fn warmed_backend_continues_the_batch_sequence() {
    let closes = wavy_closes(90);
    let split = 60;
    let engine = engine();
    let plan = engine.compile("rsi(7)").unwrap();

    let batch = engine
        .evaluate(&plan, &ohlcv_dataset(&closes), &EvalOptions::default())
        .unwrap();
    let batch_series = batch.root.primary();

    // pre-warm from history, then stream the live tail
    let history = ohlcv_dataset(&closes[..split]);
    let mut backend = StreamBackend::initialize(
        Arc::clone(engine.registry()),
        plan,
        &history,
        None,
        None,
    )
    .unwrap();
    assert_eq!(backend.ticks_seen(), split as u64);

    for (offset, tick) in ohlcv_ticks(&closes)[split..].iter().enumerate() {
        let streamed = backend.step(tick).unwrap();
        let expected = batch_series.values()[split + offset];
        assert_eq!(streamed.to_bits(), expected.to_bits());
    }
}

#[test]
fn branch_and_replay_from_a_snapshot_is_deterministic() {
    let closes = wavy_closes(80);
    let engine = engine();
    let plan = engine.compile("supertrend(4, 2.0)").unwrap();

    let mut backend = StreamBackend::new(
        Arc::clone(engine.registry()),
        plan,
        timeframe(),
        Source::Ohlcv,
    )
    .unwrap();

    let ticks = ohlcv_ticks(&closes);
    for tick in &ticks[..50] {
        backend.step(tick).unwrap();
    }
    let snapshot = backend.snapshot();

    // the live backend walks on
    let mut live = Vec::new();
    for tick in &ticks[50..] {
        live.push(backend.step(tick).unwrap());
    }

    // a detached replay of the same events reproduces the branch
    let replayed = backend.replay(snapshot, &ticks[50..]).unwrap();
    assert_eq!(live.len(), replayed.len());
    for (a, b) in live.iter().zip(replayed.iter()) {
        if a.is_nan() {
            assert!(b.is_nan());
        } else {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}

// ================================================================================================
// Missing fields propagate
// ================================================================================================

#[test]
fn sparse_ticks_mask_downstream_outputs() {
    let engine = engine();
    let plan = engine.compile("sma(close, 2)").unwrap();
    let mut backend = StreamBackend::new(
        Arc::clone(engine.registry()),
        plan,
        timeframe(),
        Source::Ohlcv,
    )
    .unwrap();

    backend
        .step(&quantra::Tick::bar(0, 1.0, 2.0, 0.0, 1.0, 10.0))
        .unwrap();
    // close missing at this tick
    let gap = backend.step(&quantra::Tick::new(HOUR_MS)).unwrap();
    assert!(gap.is_nan());
    // the gap poisons the window until it is evicted
    let after = backend
        .step(&quantra::Tick::bar(2 * HOUR_MS, 3.0, 4.0, 2.0, 3.0, 10.0))
        .unwrap();
    assert!(after.is_nan());
    let recovered = backend
        .step(&quantra::Tick::bar(3 * HOUR_MS, 5.0, 6.0, 4.0, 5.0, 10.0))
        .unwrap();
    assert_eq!(recovered, 4.0);
}
