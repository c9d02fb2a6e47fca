use std::{fmt, str::FromStr};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use strum_macros::EnumString;

use crate::error::{DataError, TaError};

// ================================================================================================
// Timestamps
// ================================================================================================

/// Epoch milliseconds (UTC). The sole time representation on the hot path.
pub type TimestampMs = i64;

/// Converts a `chrono` instant to the internal epoch-millisecond representation.
pub fn timestamp_from_datetime(dt: DateTime<Utc>) -> TimestampMs {
    dt.timestamp_millis()
}

/// Converts an internal timestamp back to a `chrono` instant.
///
/// Returns `None` for values outside the range `chrono` can represent.
pub fn datetime_from_timestamp(ts: TimestampMs) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ts).single()
}

// ================================================================================================
// Symbol
// ================================================================================================

/// A trading symbol (e.g. "BTC-USDT"). Identity metadata only; the engine never
/// interprets its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ================================================================================================
// Timeframe
// ================================================================================================

/// The bar-interval unit of a timeframe.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
pub enum TimeUnit {
    #[strum(serialize = "s")]
    Second,
    #[strum(serialize = "m")]
    Minute,
    #[strum(serialize = "h")]
    Hour,
    #[strum(serialize = "d")]
    Day,
    #[strum(serialize = "w")]
    Week,
}

impl TimeUnit {
    pub fn millis(&self) -> i64 {
        match self {
            TimeUnit::Second => 1_000,
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
            TimeUnit::Day => 86_400_000,
            TimeUnit::Week => 604_800_000,
        }
    }
}

/// A bar interval such as `1h` or `15m`.
///
/// Parsed from and displayed in the canonical `<amount><unit>` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timeframe {
    pub amount: u32,
    pub unit: TimeUnit,
}

impl Timeframe {
    pub const fn new(amount: u32, unit: TimeUnit) -> Self {
        Self { amount, unit }
    }

    pub const fn minutes(amount: u32) -> Self {
        Self::new(amount, TimeUnit::Minute)
    }

    pub const fn hours(amount: u32) -> Self {
        Self::new(amount, TimeUnit::Hour)
    }

    pub const fn days(amount: u32) -> Self {
        Self::new(amount, TimeUnit::Day)
    }

    pub fn duration_ms(&self) -> i64 {
        self.amount as i64 * self.unit.millis()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit)
    }
}

impl FromStr for Timeframe {
    type Err = TaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit());
        let (digits, suffix) = match split {
            Some(idx) if idx > 0 => s.split_at(idx),
            _ => return Err(DataError::InvalidTimeframe(s.to_string()).into()),
        };

        let amount: u32 = digits
            .parse()
            .map_err(|_| DataError::InvalidTimeframe(s.to_string()))?;
        if amount == 0 {
            return Err(DataError::InvalidTimeframe(s.to_string()).into());
        }
        let unit =
            TimeUnit::from_str(suffix).map_err(|_| DataError::InvalidTimeframe(s.to_string()))?;

        Ok(Timeframe { amount, unit })
    }
}

// ================================================================================================
// Sources and fields
// ================================================================================================

/// The data sources a partition can carry. `Ohlcv` partitions bundle five
/// parallel fields on one timestamp axis; the others are named single-field
/// series collections.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum Source {
    Ohlcv,
    Trades,
    Orderbook,
    Liquidation,
}

pub const OHLCV_BASE_FIELDS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Derived ohlcv fields, materialized lazily by the [`SeriesContext`].
///
/// [`SeriesContext`]: crate::data::context::SeriesContext
pub const OHLCV_DERIVED_FIELDS: [&str; 6] =
    ["hlc3", "ohlc4", "hl2", "range", "upper_wick", "lower_wick"];

const TRADES_FIELDS: [&str; 8] = [
    "price",
    "volume",
    "count",
    "buy_volume",
    "sell_volume",
    "amount",
    "avg_price",
    "vwap",
];

const ORDERBOOK_FIELDS: [&str; 8] = [
    "best_bid",
    "best_ask",
    "spread",
    "spread_bps",
    "mid_price",
    "bid_depth",
    "ask_depth",
    "imbalance",
];

const LIQUIDATION_FIELDS: [&str; 8] = [
    "count",
    "volume",
    "value",
    "long_count",
    "short_count",
    "long_value",
    "short_value",
    "price",
];

impl Source {
    /// Declared field names for this source, excluding derived ohlcv fields.
    pub fn base_fields(&self) -> &'static [&'static str] {
        match self {
            Source::Ohlcv => &OHLCV_BASE_FIELDS,
            Source::Trades => &TRADES_FIELDS,
            Source::Orderbook => &ORDERBOOK_FIELDS,
            Source::Liquidation => &LIQUIDATION_FIELDS,
        }
    }

    pub fn is_valid_field(&self, field: &str) -> bool {
        let field = canonical_field(field);
        if self.base_fields().contains(&field) {
            return true;
        }
        matches!(self, Source::Ohlcv) && OHLCV_DERIVED_FIELDS.contains(&field)
    }

    /// The field an unqualified reference to this source resolves to.
    pub fn primary_field(&self) -> &'static str {
        match self {
            Source::Ohlcv => "close",
            Source::Trades | Source::Liquidation => "volume",
            Source::Orderbook => "mid_price",
        }
    }
}

/// Shorthands and aliases accepted wherever a field name appears.
pub fn canonical_field(field: &str) -> &str {
    match field {
        "o" => "open",
        "h" => "high",
        "l" => "low",
        "c" => "close",
        "v" => "volume",
        "price" => "close",
        "typical_price" => "hlc3",
        other => other,
    }
}

/// Non-ohlcv identifiers that still resolve as bare fields in expressions
/// (their partition supplies them at evaluation time).
const EXTRA_BARE_FIELDS: [&str; 4] = ["amount", "count", "bid", "ask"];

/// Bare identifiers that desugar to `select(field)` in expression text.
pub fn is_bare_field(name: &str) -> bool {
    let name = canonical_field(name);
    OHLCV_BASE_FIELDS.contains(&name)
        || OHLCV_DERIVED_FIELDS.contains(&name)
        || EXTRA_BARE_FIELDS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframes_round_trip_through_strings() {
        let cases = [
            ("1h", Timeframe::hours(1)),
            ("15m", Timeframe::minutes(15)),
            ("1d", Timeframe::days(1)),
            ("30s", Timeframe::new(30, TimeUnit::Second)),
            ("2w", Timeframe::new(2, TimeUnit::Week)),
        ];

        for (text, expected) in cases {
            let parsed: Timeframe = text.parse().unwrap();
            assert_eq!(parsed, expected, "parse mismatch for '{}'", text);
            assert_eq!(parsed.to_string(), text, "display mismatch for '{}'", text);
        }
    }

    #[test]
    fn rejects_invalid_timeframes() {
        for text in ["", "h", "0h", "1x", "h1", "-1h", "1hh"] {
            assert!(
                text.parse::<Timeframe>().is_err(),
                "expected '{}' to fail parsing",
                text
            );
        }
    }

    #[test]
    fn timeframe_durations() {
        assert_eq!(Timeframe::hours(1).duration_ms(), 3_600_000);
        assert_eq!(Timeframe::minutes(15).duration_ms(), 900_000);
        assert_eq!(Timeframe::days(1).duration_ms(), 86_400_000);
    }

    #[test]
    fn source_field_validation() {
        assert!(Source::Ohlcv.is_valid_field("close"));
        assert!(Source::Ohlcv.is_valid_field("hlc3"));
        assert!(Source::Ohlcv.is_valid_field("upper_wick"));
        assert!(Source::Trades.is_valid_field("buy_volume"));
        assert!(!Source::Trades.is_valid_field("hlc3"));
        assert!(!Source::Orderbook.is_valid_field("volume"));
        assert!(Source::Liquidation.is_valid_field("long_count"));
    }

    #[test]
    fn shorthand_fields_canonicalize() {
        assert_eq!(canonical_field("c"), "close");
        assert_eq!(canonical_field("price"), "close");
        assert_eq!(canonical_field("typical_price"), "hlc3");
        assert!(is_bare_field("hl2"));
        assert!(!is_bare_field("imbalance"));
    }

    #[test]
    fn chrono_conversions_are_inverse() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let ts = timestamp_from_datetime(dt);
        assert_eq!(datetime_from_timestamp(ts), Some(dt));
    }
}
