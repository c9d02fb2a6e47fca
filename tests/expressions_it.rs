mod common;

use std::sync::Arc;

use quantra::{
    Engine, EvalOptions, NodeOutput, Registry, Source, TaError,
};

use common::*;

fn engine() -> Engine {
    Engine::new(Arc::new(Registry::builtin()))
}

fn evaluate(text: &str, closes: &[f64]) -> NodeOutput {
    let engine = engine();
    let plan = engine.compile(text).unwrap();
    engine
        .evaluate(&plan, &ohlcv_dataset(closes), &EvalOptions::default())
        .unwrap()
        .root
}

// ================================================================================================
// Spec scenarios
// ================================================================================================

#[test]
fn sma_three_on_one_through_five() {
    let out = evaluate("sma(close, 3)", &[1.0, 2.0, 3.0, 4.0, 5.0]);
    let series = out.primary();
    assert_series_eq(series.values(), &[f64::NAN, f64::NAN, 2.0, 3.0, 4.0]);
    assert_eq!(series.mask(), &[false, false, true, true, true]);
}

#[test]
fn rsi_on_constant_series_settles_at_fifty() {
    let out = evaluate("rsi(14)", &vec![100.0; 30]);
    let series = out.primary();
    for (i, (&v, &m)) in series.values().iter().zip(series.mask()).enumerate() {
        if m {
            assert_eq!(v, 50.0, "index {i}");
        } else {
            assert!(v.is_nan(), "index {i}");
        }
    }
    // warmup is exactly period deltas
    assert!(!series.is_available(13));
    assert!(series.is_available(14));
}

#[test]
fn macd_on_linear_ramp() {
    let closes: Vec<f64> = (1..=60).map(|i| i as f64).collect();
    let out = evaluate("macd(12, 26, 9)", &closes);
    let NodeOutput::Multi(outputs) = &out else {
        panic!("macd should be multi-output");
    };
    let macd = &outputs[0].1;
    let signal = &outputs[1].1;
    let histogram = &outputs[2].1;

    // each EMA of a linear ramp lags by (period - 1) / 2 bars, so the line
    // converges to a constant of magnitude (slow - fast) / 2 = 7
    assert!((macd.values()[55].abs() - 7.0).abs() < 0.5);
    assert!((signal.values()[48] - macd.values()[48]).abs() < 0.2);
    assert!(histogram.values()[55].abs() < 0.1);
}

#[test]
fn bollinger_after_a_flat_stretch() {
    let mut closes = vec![10.0; 20];
    closes.push(20.0);
    let out = evaluate("bbands(20, 2)", &closes);
    let NodeOutput::Multi(outputs) = &out else {
        panic!("bbands should be multi-output");
    };
    let upper = &outputs[0].1;
    let mean = &outputs[1].1;

    let last = closes.len() - 1;
    assert_eq!(mean.values()[last], 10.5);
    let expected_std = ((19.0 * 0.25 + 90.25) / 20.0f64).sqrt();
    assert!((upper.values()[last] - (10.5 + 2.0 * expected_std)).abs() < 1e-9);
    assert!((upper.values()[last] - 14.858).abs() < 1e-3);
}

#[test]
fn crossup_fires_exactly_on_the_crossing_bar() {
    let out = evaluate("crossup(close, 20)", &[10.0, 15.0, 25.0, 30.0]);
    assert_series_eq(out.primary().values(), &[0.0, 0.0, 1.0, 0.0]);
}

// ================================================================================================
// Expression composition
// ================================================================================================

#[test]
fn comparisons_yield_boolean_series() {
    let out = evaluate("close > 3", &[1.0, 2.0, 3.0, 4.0, 5.0]);
    assert_series_eq(out.primary().values(), &[0.0, 0.0, 0.0, 1.0, 1.0]);
}

#[test]
fn arithmetic_on_series_and_scalars() {
    let out = evaluate("(close * 2 + 1) % 3", &[1.0, 2.0, 3.0]);
    assert_series_eq(out.primary().values(), &[0.0, 2.0, 1.0]);
}

#[test]
fn division_by_zero_masks_instead_of_failing() {
    let out = evaluate("close / (close - 2)", &[1.0, 2.0, 3.0]);
    let series = out.primary();
    assert_eq!(series.values()[0], -1.0);
    assert!(series.values()[1].is_nan());
    assert!(!series.is_available(1));
    assert_eq!(series.values()[2], 3.0);
}

#[test]
fn member_access_selects_named_outputs() {
    let mut closes = vec![10.0; 20];
    closes.push(20.0);
    let upper = evaluate("bbands(20, 2).upper", &closes);
    let indexed = evaluate("bbands(20, 2)[0]", &closes);
    assert_series_eq(indexed.primary().values(), upper.primary().values());
}

#[test]
fn nested_indicators_compose() {
    // EMA of RSI: rsi warms up after 6 bars, ema needs 3 defined inputs
    let closes: Vec<f64> = (1..=20).map(|i| (i * i % 17) as f64).collect();
    let out = evaluate("ema(rsi(5), 3)", &closes);
    let series = out.primary();
    assert!(!series.is_available(6));
    assert!(series.is_available(8));
}

#[test]
fn derived_fields_are_available_in_expressions() {
    let out = evaluate("hl2", &[10.0, 20.0]);
    // high = close + 1, low = close - 1
    assert_series_eq(out.primary().values(), &[10.0, 20.0]);

    let range = evaluate("range", &[10.0, 20.0]);
    assert_series_eq(range.primary().values(), &[2.0, 2.0]);
}

#[test]
fn time_shift_suffix_against_timestamps() {
    let out = evaluate("close.1h_ago", &[10.0, 20.0, 30.0]);
    assert_series_eq(out.primary().values(), &[f64::NAN, 10.0, 20.0]);

    let change = evaluate("close.change_1h", &[10.0, 20.0, 30.0]);
    assert_series_eq(change.primary().values(), &[f64::NAN, 10.0, 10.0]);

    let pct = evaluate("close.change_pct_1h", &[10.0, 20.0, 30.0]);
    assert_series_eq(pct.primary().values(), &[f64::NAN, 100.0, 50.0]);
}

#[test]
fn shift_round_trip_agrees_where_defined() {
    let closes = wavy_closes(20);
    let shifted = evaluate("shift(shift(close, 2), 1)", &closes);
    let series = shifted.primary();
    for i in 3..closes.len() {
        assert_eq!(series.values()[i], closes[i - 3], "index {i}");
    }
}

#[test]
fn cross_is_the_union_of_up_and_down() {
    let closes = wavy_closes(40);
    let up = evaluate("crossup(close, 100)", &closes);
    let down = evaluate("crossdown(close, 100)", &closes);
    let any = evaluate("cross(close, 100)", &closes);
    for i in 0..closes.len() {
        let expected = f64::max(up.primary().values()[i], down.primary().values()[i]);
        assert_eq!(any.primary().values()[i], expected, "index {i}");
    }
}

// ================================================================================================
// Filters, aggregates and partitions
// ================================================================================================

#[test]
fn trades_filter_count_runs_on_the_trades_partition() {
    let closes = vec![1.0, 2.0, 3.0, 4.0, 5.0];
    let amounts = vec![50.0, 150.0, 250.0, 20.0, 500.0];
    let dataset = with_trades(ohlcv_dataset(&closes), &amounts);

    let engine = engine();
    let plan = engine.compile("trades.filter(amount > 100).count").unwrap();
    let eval = engine
        .evaluate(&plan, &dataset, &EvalOptions::default())
        .unwrap();
    assert_eq!(eval.partition.source, Source::Trades);
    assert_series_eq(eval.root.primary().values(), &[0.0, 1.0, 2.0, 2.0, 3.0]);
}

#[test]
fn trades_sum_aggregates_the_named_field() {
    let closes = vec![1.0, 2.0, 3.0];
    let amounts = vec![100.0, 200.0, 300.0];
    let dataset = with_trades(ohlcv_dataset(&closes), &amounts);

    let engine = engine();
    let plan = engine.compile("trades.sum(amount)").unwrap();
    let eval = engine
        .evaluate(&plan, &dataset, &EvalOptions::default())
        .unwrap();
    assert_series_eq(eval.root.primary().values(), &[100.0, 300.0, 600.0]);
}

#[test]
fn filtered_sum_only_counts_passing_rows() {
    let closes = vec![1.0, 2.0, 3.0];
    let amounts = vec![100.0, 200.0, 300.0];
    let dataset = with_trades(ohlcv_dataset(&closes), &amounts);

    let engine = engine();
    let plan = engine
        .compile("trades.filter(amount > 150).sum(amount)")
        .unwrap();
    let eval = engine
        .evaluate(&plan, &dataset, &EvalOptions::default())
        .unwrap();
    assert_series_eq(eval.root.primary().values(), &[0.0, 200.0, 500.0]);
}

#[test]
fn missing_trades_partition_is_a_structured_error() {
    let engine = engine();
    let plan = engine.compile("trades.volume > 10").unwrap();
    let err = engine
        .evaluate(&plan, &ohlcv_dataset(&[1.0, 2.0]), &EvalOptions::default())
        .unwrap_err();
    assert!(matches!(err, TaError::Data(_)));
}

// ================================================================================================
// Eager failures
// ================================================================================================

#[test]
fn parse_type_and_plan_errors_precede_execution() {
    let engine = engine();
    assert!(matches!(
        engine.compile("close >").unwrap_err(),
        TaError::Parse(_)
    ));
    assert!(matches!(
        engine.compile("unknown_thing(14)").unwrap_err(),
        TaError::TypeCheck(_)
    ));
    assert!(matches!(
        engine.compile("sma(close, -5)").unwrap_err(),
        TaError::TypeCheck(_)
    ));
}

#[test]
fn plans_survive_the_wire_format() {
    let engine = engine();
    let plan = engine.compile("crossup(rsi(14), 70) and close > sma(50)").unwrap();
    let restored = quantra::Plan::from_bytes(&plan.to_bytes().unwrap()).unwrap();

    let closes = wavy_closes(60);
    let a = engine
        .evaluate(&plan, &ohlcv_dataset(&closes), &EvalOptions::default())
        .unwrap();
    let b = engine
        .evaluate(&restored, &ohlcv_dataset(&closes), &EvalOptions::default())
        .unwrap();
    assert_series_eq(b.root.primary().values(), a.root.primary().values());
}
