#![allow(dead_code)]

use quantra::{Dataset, OhlcvBundle, Series, Source, Symbol, Tick, Timeframe};

pub const HOUR_MS: i64 = 3_600_000;

pub fn symbol() -> Symbol {
    Symbol::new("X")
}

pub fn timeframe() -> Timeframe {
    Timeframe::hours(1)
}

pub fn hourly_timestamps(n: usize) -> Vec<i64> {
    (0..n as i64).map(|i| i * HOUR_MS).collect()
}

/// An hourly ohlcv dataset derived from closes: `high = close + 1`,
/// `low = close − 1`, `open = close`, constant volume.
pub fn ohlcv_dataset(closes: &[f64]) -> Dataset {
    let n = closes.len();
    let bundle = OhlcvBundle::new(
        hourly_timestamps(n),
        closes.to_vec(),
        closes.iter().map(|c| c + 1.0).collect(),
        closes.iter().map(|c| c - 1.0).collect(),
        closes.to_vec(),
        vec![100.0; n],
        symbol(),
        timeframe(),
    )
    .expect("well-formed fixture bundle");

    let mut dataset = Dataset::new();
    dataset.insert_ohlcv(bundle);
    dataset
}

/// Adds a trades partition with `amount` and `volume` fields on the same axis.
pub fn with_trades(mut dataset: Dataset, amounts: &[f64]) -> Dataset {
    let timestamps = hourly_timestamps(amounts.len());
    let amount = Series::new(timestamps.clone(), amounts.to_vec(), symbol(), timeframe())
        .expect("well-formed fixture series");
    let volume = Series::new(
        timestamps,
        amounts.iter().map(|a| a / 10.0).collect(),
        symbol(),
        timeframe(),
    )
    .expect("well-formed fixture series");
    dataset.insert_field(Source::Trades, "amount", amount);
    dataset.insert_field(Source::Trades, "volume", volume);
    dataset
}

/// The tick stream equivalent of [`ohlcv_dataset`].
pub fn ohlcv_ticks(closes: &[f64]) -> Vec<Tick> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Tick::bar(i as i64 * HOUR_MS, c, c + 1.0, c - 1.0, c, 100.0))
        .collect()
}

/// Deterministic wavy closes with integer values, so incremental and manual
/// summation agree bitwise.
pub fn wavy_closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let i = i as i64;
            (100 + (i * 7) % 23 - (i * 3) % 11 + ((i / 5) % 4) * 6) as f64
        })
        .collect()
}

pub fn assert_series_eq(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        if e.is_nan() {
            assert!(a.is_nan(), "index {i}: expected NaN, got {a}");
        } else {
            assert_eq!(a, e, "index {i}");
        }
    }
}
