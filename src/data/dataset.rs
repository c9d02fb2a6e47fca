use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    data::{
        context::SeriesContext,
        domain::{timestamp_from_datetime, Source, Symbol, Timeframe, TimestampMs},
        series::Series,
    },
    error::{DataError, TaResult},
};

// ================================================================================================
// Partition key
// ================================================================================================

/// Identifies one coherent time axis of values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub source: Source,
}

impl PartitionKey {
    pub fn new(symbol: Symbol, timeframe: Timeframe, source: Source) -> Self {
        Self {
            symbol,
            timeframe,
            source,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.symbol, self.timeframe, self.source)
    }
}

// ================================================================================================
// OHLCV bundle
// ================================================================================================

/// Five parallel fields sharing one timestamp axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBundle {
    timestamps: Vec<TimestampMs>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
    symbol: Symbol,
    timeframe: Timeframe,
}

impl OhlcvBundle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamps: Vec<TimestampMs>,
        open: Vec<f64>,
        high: Vec<f64>,
        low: Vec<f64>,
        close: Vec<f64>,
        volume: Vec<f64>,
        symbol: Symbol,
        timeframe: Timeframe,
    ) -> TaResult<Self> {
        let n = timestamps.len();
        for column in [&open, &high, &low, &close, &volume] {
            if column.len() != n {
                return Err(DataError::LengthMismatch {
                    timestamps: n,
                    values: column.len(),
                }
                .into());
            }
        }
        if timestamps.windows(2).any(|w| w[1] <= w[0]) {
            return Err(DataError::UnsortedTimestamps.into());
        }
        Ok(Self {
            timestamps,
            open,
            high,
            low,
            close,
            volume,
            symbol,
            timeframe,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[TimestampMs] {
        &self.timestamps
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Materializes one base field as a series on the bundle axis.
    pub fn field(&self, name: &str) -> TaResult<Series> {
        let values = match name {
            "open" => &self.open,
            "high" => &self.high,
            "low" => &self.low,
            "close" => &self.close,
            "volume" => &self.volume,
            other => {
                return Err(DataError::MissingRequiredField {
                    field: other.to_string(),
                }
                .into())
            }
        };
        Series::new(
            self.timestamps.clone(),
            values.clone(),
            self.symbol.clone(),
            self.timeframe,
        )
    }

    fn slice(&self, start: TimestampMs, end: TimestampMs) -> TaResult<Self> {
        if start > end {
            return Err(DataError::InvalidTimeRange { start, end }.into());
        }
        let lo = self.timestamps.partition_point(|&t| t < start);
        let hi = self.timestamps.partition_point(|&t| t <= end);
        Self::new(
            self.timestamps[lo..hi].to_vec(),
            self.open[lo..hi].to_vec(),
            self.high[lo..hi].to_vec(),
            self.low[lo..hi].to_vec(),
            self.close[lo..hi].to_vec(),
            self.volume[lo..hi].to_vec(),
            self.symbol.clone(),
            self.timeframe,
        )
    }
}

// ================================================================================================
// Partition
// ================================================================================================

/// The payload stored under one partition key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Partition {
    Ohlcv(OhlcvBundle),
    Fields(BTreeMap<String, Series>),
}

impl Partition {
    pub fn field(&self, name: &str) -> TaResult<Series> {
        match self {
            Partition::Ohlcv(bundle) => bundle.field(name),
            Partition::Fields(fields) => fields.get(name).cloned().ok_or_else(|| {
                DataError::MissingRequiredField {
                    field: name.to_string(),
                }
                .into()
            }),
        }
    }

    pub fn available_fields(&self) -> Vec<String> {
        match self {
            Partition::Ohlcv(_) => crate::data::domain::OHLCV_BASE_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            Partition::Fields(fields) => fields.keys().cloned().collect(),
        }
    }

    pub fn timestamps(&self) -> &[TimestampMs] {
        match self {
            Partition::Ohlcv(bundle) => bundle.timestamps(),
            Partition::Fields(fields) => fields
                .values()
                .next()
                .map(|s| s.timestamps())
                .unwrap_or(&[]),
        }
    }

    fn slice(&self, start: TimestampMs, end: TimestampMs) -> TaResult<Self> {
        match self {
            Partition::Ohlcv(bundle) => Ok(Partition::Ohlcv(bundle.slice(start, end)?)),
            Partition::Fields(fields) => {
                let mut out = BTreeMap::new();
                for (name, series) in fields {
                    out.insert(name.clone(), series.slice_by_time(start, end)?);
                }
                Ok(Partition::Fields(out))
            }
        }
    }
}

// ================================================================================================
// Dataset
// ================================================================================================

/// A keyed collection of partitions, provided by external ingest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    partitions: BTreeMap<PartitionKey, Partition>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_ohlcv(&mut self, bundle: OhlcvBundle) {
        let key = PartitionKey::new(bundle.symbol().clone(), bundle.timeframe(), Source::Ohlcv);
        self.partitions.insert(key, Partition::Ohlcv(bundle));
    }

    /// Inserts a named field series under a non-ohlcv source partition.
    pub fn insert_field(&mut self, source: Source, field: impl Into<String>, series: Series) {
        let key = PartitionKey::new(series.symbol().clone(), series.timeframe(), source);
        match self
            .partitions
            .entry(key)
            .or_insert_with(|| Partition::Fields(BTreeMap::new()))
        {
            Partition::Fields(fields) => {
                fields.insert(field.into(), series);
            }
            Partition::Ohlcv(_) => unreachable!("ohlcv partitions are inserted via insert_ohlcv"),
        }
    }

    pub fn keys(&self) -> Vec<PartitionKey> {
        self.partitions.keys().cloned().collect()
    }

    pub fn partition(&self, key: &PartitionKey) -> Option<&Partition> {
        self.partitions.get(key)
    }

    pub fn series(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        source: Source,
    ) -> TaResult<&Partition> {
        let key = PartitionKey::new(symbol.clone(), timeframe, source);
        self.partitions
            .get(&key)
            .ok_or_else(|| partition_missing(&key))
    }

    /// Projects a [`SeriesContext`] for one partition.
    pub fn context(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        source: Source,
    ) -> TaResult<SeriesContext> {
        let partition = self.series(symbol, timeframe, source)?;
        Ok(SeriesContext::from_partition(source, partition))
    }

    /// Slices every partition of one symbol/timeframe to `[start, end]`.
    pub fn range(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> TaResult<Dataset> {
        let start = timestamp_from_datetime(start);
        let end = timestamp_from_datetime(end);
        let mut out = Dataset::new();
        let mut matched = false;
        for (key, partition) in &self.partitions {
            if &key.symbol == symbol && key.timeframe == timeframe {
                matched = true;
                out.partitions
                    .insert(key.clone(), partition.slice(start, end)?);
            }
        }
        if !matched {
            return Err(partition_missing(&PartitionKey::new(
                symbol.clone(),
                timeframe,
                Source::Ohlcv,
            )));
        }
        Ok(out)
    }
}

pub(crate) fn partition_missing(key: &PartitionKey) -> crate::error::TaError {
    DataError::PartitionMissing {
        symbol: key.symbol.to_string(),
        timeframe: key.timeframe.to_string(),
        source_name: key.source.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bundle() -> OhlcvBundle {
        OhlcvBundle::new(
            vec![0, 3_600_000, 7_200_000],
            vec![1.0, 2.0, 3.0],
            vec![2.0, 3.0, 4.0],
            vec![0.5, 1.5, 2.5],
            vec![1.5, 2.5, 3.5],
            vec![100.0, 200.0, 300.0],
            Symbol::new("X"),
            Timeframe::hours(1),
        )
        .unwrap()
    }

    #[test]
    fn bundle_rejects_ragged_columns() {
        let err = OhlcvBundle::new(
            vec![0, 1],
            vec![1.0],
            vec![1.0, 2.0],
            vec![1.0, 2.0],
            vec![1.0, 2.0],
            vec![1.0, 2.0],
            Symbol::new("X"),
            Timeframe::hours(1),
        );
        assert!(err.is_err());
    }

    #[test]
    fn dataset_projects_fields_from_bundle() {
        let mut ds = Dataset::new();
        ds.insert_ohlcv(bundle());
        let part = ds
            .series(&Symbol::new("X"), Timeframe::hours(1), Source::Ohlcv)
            .unwrap();
        let close = part.field("close").unwrap();
        assert_eq!(close.values(), &[1.5, 2.5, 3.5]);
        assert!(part.field("imbalance").is_err());
    }

    #[test]
    fn missing_partitions_are_reported() {
        let ds = Dataset::new();
        let err = ds.series(&Symbol::new("X"), Timeframe::hours(1), Source::Trades);
        assert!(err.is_err());
    }

    #[test]
    fn keys_enumerate_all_partitions() {
        let mut ds = Dataset::new();
        ds.insert_ohlcv(bundle());
        let trades = Series::new(
            vec![0, 3_600_000],
            vec![10.0, 20.0],
            Symbol::new("X"),
            Timeframe::hours(1),
        )
        .unwrap();
        ds.insert_field(Source::Trades, "volume", trades);

        let keys = ds.keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().any(|k| k.source == Source::Ohlcv));
        assert!(keys.iter().any(|k| k.source == Source::Trades));
    }

    #[test]
    fn range_slices_every_matching_partition() {
        let mut ds = Dataset::new();
        ds.insert_ohlcv(bundle());
        let start = chrono::Utc.timestamp_millis_opt(3_600_000).unwrap();
        let end = chrono::Utc.timestamp_millis_opt(7_200_000).unwrap();
        let sliced = ds
            .range(&Symbol::new("X"), Timeframe::hours(1), start, end)
            .unwrap();
        let part = sliced
            .series(&Symbol::new("X"), Timeframe::hours(1), Source::Ohlcv)
            .unwrap();
        assert_eq!(part.timestamps(), &[3_600_000, 7_200_000]);
    }
}
