use serde::{Deserialize, Serialize};
use strum::Display;
use strum_macros::EnumString;

use crate::{
    data::domain::{Symbol, Timeframe, TimestampMs},
    error::{DataError, MetadataAxis, TaResult},
};

// ================================================================================================
// Series
// ================================================================================================

/// An immutable time series: strictly increasing timestamps, one value per
/// timestamp, identity metadata and an availability mask.
///
/// NaN values and `mask = false` are locked together: constructors
/// canonicalise in both directions, so `mask[i] == false ⇔ values[i].is_nan()`
/// holds for every series in the system. Booleans are represented as
/// `1.0`/`0.0` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    timestamps: Vec<TimestampMs>,
    values: Vec<f64>,
    symbol: Symbol,
    timeframe: Timeframe,
    mask: Vec<bool>,
    scalar: bool,
}

impl Series {
    /// Builds a series whose mask is derived from NaN positions.
    pub fn new(
        timestamps: Vec<TimestampMs>,
        values: Vec<f64>,
        symbol: Symbol,
        timeframe: Timeframe,
    ) -> TaResult<Self> {
        let mask = values.iter().map(|v| !v.is_nan()).collect();
        Self::with_mask(timestamps, values, symbol, timeframe, mask)
    }

    /// Builds a series with an explicit availability mask.
    ///
    /// Masked-out values are forced to NaN and NaN values force their mask
    /// entry to `false`, keeping the lockstep invariant.
    pub fn with_mask(
        timestamps: Vec<TimestampMs>,
        mut values: Vec<f64>,
        symbol: Symbol,
        timeframe: Timeframe,
        mut mask: Vec<bool>,
    ) -> TaResult<Self> {
        if timestamps.len() != values.len() {
            return Err(DataError::LengthMismatch {
                timestamps: timestamps.len(),
                values: values.len(),
            }
            .into());
        }
        if mask.len() != values.len() {
            return Err(DataError::MaskLengthMismatch {
                mask: mask.len(),
                len: values.len(),
            }
            .into());
        }
        if timestamps.windows(2).any(|w| w[1] <= w[0]) {
            return Err(DataError::UnsortedTimestamps.into());
        }

        for (v, m) in values.iter_mut().zip(mask.iter_mut()) {
            if v.is_nan() {
                *m = false;
            } else if !*m {
                *v = f64::NAN;
            }
        }

        Ok(Self {
            timestamps,
            values,
            symbol,
            timeframe,
            mask,
            scalar: false,
        })
    }

    pub fn empty(symbol: Symbol, timeframe: Timeframe) -> Self {
        Self {
            timestamps: Vec::new(),
            values: Vec::new(),
            symbol,
            timeframe,
            mask: Vec::new(),
            scalar: false,
        }
    }

    /// A synthetic one-point series that broadcasts to the timestamps of any
    /// operand it combines with.
    pub fn scalar(value: f64) -> Self {
        Self {
            timestamps: vec![0],
            values: vec![value],
            symbol: Symbol::new("SCALAR"),
            timeframe: Timeframe::new(1, crate::data::domain::TimeUnit::Second),
            mask: vec![!value.is_nan()],
            scalar: true,
        }
    }

    // === Accessors ===

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        self.scalar
    }

    pub fn timestamps(&self) -> &[TimestampMs] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn get(&self, index: usize) -> Option<(TimestampMs, f64)> {
        Some((*self.timestamps.get(index)?, *self.values.get(index)?))
    }

    pub fn is_available(&self, index: usize) -> bool {
        self.mask.get(index).copied().unwrap_or(false)
    }

    /// Value at an exact timestamp, or NaN if the timestamp is absent.
    pub fn value_at(&self, ts: TimestampMs) -> f64 {
        match self.timestamps.binary_search(&ts) {
            Ok(idx) => self.values[idx],
            Err(_) => f64::NAN,
        }
    }

    /// Slices the series to `[start, end]` (inclusive) by binary search.
    pub fn slice_by_time(&self, start: TimestampMs, end: TimestampMs) -> TaResult<Self> {
        if start > end {
            return Err(DataError::InvalidTimeRange { start, end }.into());
        }
        let lo = self.timestamps.partition_point(|&t| t < start);
        let hi = self.timestamps.partition_point(|&t| t <= end);
        Ok(Self {
            timestamps: self.timestamps[lo..hi].to_vec(),
            values: self.values[lo..hi].to_vec(),
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            mask: self.mask[lo..hi].to_vec(),
            scalar: false,
        })
    }

    /// Rebuilds this series with new values on the same axis, re-deriving the
    /// mask from NaN positions.
    pub fn with_values(&self, values: Vec<f64>) -> TaResult<Self> {
        Series::new(
            self.timestamps.clone(),
            values,
            self.symbol.clone(),
            self.timeframe,
        )
    }

    /// Broadcasts a scalar series onto the axis and metadata of `other`.
    pub fn broadcast_to(&self, other: &Series) -> Series {
        debug_assert!(self.scalar);
        let v = self.values[0];
        Series {
            timestamps: other.timestamps.clone(),
            values: vec![v; other.len()],
            symbol: other.symbol.clone(),
            timeframe: other.timeframe,
            mask: vec![!v.is_nan(); other.len()],
            scalar: false,
        }
    }

    /// Element-wise map on the same axis; mask re-derived from NaN output.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Series {
        let values: Vec<f64> = self.values.iter().map(|&v| f(v)).collect();
        let mask = values.iter().map(|v| !v.is_nan()).collect();
        Series {
            timestamps: self.timestamps.clone(),
            values,
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            mask,
            scalar: self.scalar,
        }
    }

    /// Element-wise combination of two series sharing one axis.
    ///
    /// The caller is responsible for aligning first; mismatched axes error
    /// with `AlignmentMismatch`.
    pub fn zip_with(&self, other: &Series, f: impl Fn(f64, f64) -> f64) -> TaResult<Series> {
        check_metadata(self, other)?;
        if self.timestamps != other.timestamps {
            return Err(DataError::AlignmentMismatch.into());
        }
        let values: Vec<f64> = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        let mask = values.iter().map(|v| !v.is_nan()).collect();
        Ok(Series {
            timestamps: self.timestamps.clone(),
            values,
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            mask,
            scalar: false,
        })
    }
}

// ================================================================================================
// Alignment
// ================================================================================================

/// Which timestamp set a pair alignment produces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[strum(serialize_all = "lowercase")]
pub enum AlignHow {
    #[default]
    Inner,
    Outer,
}

/// How absent positions are filled after alignment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum FillPolicy {
    /// NaN and mask-false.
    #[default]
    Null,
    /// Carry forward the last defined value.
    Forward,
    /// A fixed fill value.
    Value(f64),
}

fn check_metadata(a: &Series, b: &Series) -> TaResult<()> {
    if a.scalar || b.scalar {
        return Ok(());
    }
    if a.symbol != b.symbol {
        return Err(DataError::MetadataMismatch {
            axis: MetadataAxis::Symbol,
        }
        .into());
    }
    if a.timeframe != b.timeframe {
        return Err(DataError::MetadataMismatch {
            axis: MetadataAxis::Timeframe,
        }
        .into());
    }
    Ok(())
}

fn merged_timestamps(a: &[TimestampMs], b: &[TimestampMs], how: AlignHow) -> Vec<TimestampMs> {
    match how {
        AlignHow::Outer => {
            let mut out = itertools::merge(a.iter().copied(), b.iter().copied()).collect::<Vec<_>>();
            out.dedup();
            out
        }
        AlignHow::Inner => {
            let mut out = Vec::with_capacity(a.len().min(b.len()));
            let (mut i, mut j) = (0, 0);
            while i < a.len() && j < b.len() {
                match a[i].cmp(&b[j]) {
                    std::cmp::Ordering::Less => i += 1,
                    std::cmp::Ordering::Greater => j += 1,
                    std::cmp::Ordering::Equal => {
                        out.push(a[i]);
                        i += 1;
                        j += 1;
                    }
                }
            }
            out
        }
    }
}

fn reindex(series: &Series, axis: &[TimestampMs], fill: FillPolicy) -> (Vec<f64>, Vec<bool>) {
    let mut values = Vec::with_capacity(axis.len());
    let mut mask = Vec::with_capacity(axis.len());
    let mut cursor = 0usize;
    let mut last_defined = f64::NAN;

    for &ts in axis {
        while cursor < series.len() && series.timestamps[cursor] < ts {
            if series.mask[cursor] {
                last_defined = series.values[cursor];
            }
            cursor += 1;
        }
        if cursor < series.len() && series.timestamps[cursor] == ts {
            values.push(series.values[cursor]);
            mask.push(series.mask[cursor]);
            if series.mask[cursor] {
                last_defined = series.values[cursor];
            }
            cursor += 1;
        } else {
            match fill {
                FillPolicy::Null => {
                    values.push(f64::NAN);
                    mask.push(false);
                }
                FillPolicy::Forward => {
                    values.push(last_defined);
                    mask.push(!last_defined.is_nan());
                }
                FillPolicy::Value(v) => {
                    values.push(v);
                    mask.push(!v.is_nan());
                }
            }
        }
    }

    (values, mask)
}

/// Aligns two series onto a shared timestamp axis.
///
/// Scalar operands adopt the other side's axis and metadata. Two non-scalar
/// series must agree on symbol and timeframe.
pub fn align(a: &Series, b: &Series, how: AlignHow, fill: FillPolicy) -> TaResult<(Series, Series)> {
    if a.scalar && b.scalar {
        return Ok((a.clone(), b.broadcast_to(a)));
    }
    if a.scalar {
        return Ok((a.broadcast_to(b), b.clone()));
    }
    if b.scalar {
        return Ok((a.clone(), b.broadcast_to(a)));
    }
    check_metadata(a, b)?;

    if a.timestamps == b.timestamps {
        return Ok((a.clone(), b.clone()));
    }

    let axis = merged_timestamps(&a.timestamps, &b.timestamps, how);
    let (av, am) = reindex(a, &axis, fill);
    let (bv, bm) = reindex(b, &axis, fill);

    let left = Series::with_mask(axis.clone(), av, a.symbol.clone(), a.timeframe, am)?;
    let right = Series::with_mask(axis, bv, b.symbol.clone(), b.timeframe, bm)?;
    Ok((left, right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::TimeUnit;

    fn tf() -> Timeframe {
        Timeframe::hours(1)
    }

    fn hour(i: i64) -> TimestampMs {
        i * 3_600_000
    }

    fn series(ts: &[i64], vals: &[f64]) -> Series {
        Series::new(
            ts.iter().map(|&i| hour(i)).collect(),
            vals.to_vec(),
            Symbol::new("X"),
            tf(),
        )
        .unwrap()
    }

    #[test]
    fn construction_rejects_length_mismatch() {
        let err = Series::new(vec![0, 1], vec![1.0], Symbol::new("X"), tf());
        assert!(err.is_err());
    }

    #[test]
    fn construction_rejects_unsorted_timestamps() {
        let err = Series::new(vec![1, 0], vec![1.0, 2.0], Symbol::new("X"), tf());
        assert!(err.is_err());
        let dup = Series::new(vec![1, 1], vec![1.0, 2.0], Symbol::new("X"), tf());
        assert!(dup.is_err());
    }

    #[test]
    fn nan_and_mask_stay_in_lockstep() {
        let s = Series::with_mask(
            vec![0, 1, 2],
            vec![1.0, f64::NAN, 3.0],
            Symbol::new("X"),
            tf(),
            vec![true, true, false],
        )
        .unwrap();

        assert_eq!(s.mask(), &[true, false, false]);
        assert!(s.values()[1].is_nan());
        assert!(s.values()[2].is_nan());
    }

    #[test]
    fn slice_by_time_uses_inclusive_bounds() {
        let s = series(&[0, 1, 2, 3, 4], &[0.0, 1.0, 2.0, 3.0, 4.0]);
        let sliced = s.slice_by_time(hour(1), hour(3)).unwrap();
        assert_eq!(sliced.values(), &[1.0, 2.0, 3.0]);
        assert!(s.slice_by_time(hour(3), hour(1)).is_err());
    }

    #[test]
    fn value_at_misses_yield_nan() {
        let s = series(&[0, 1, 2], &[5.0, 6.0, 7.0]);
        assert_eq!(s.value_at(hour(1)), 6.0);
        assert!(s.value_at(hour(1) + 1).is_nan());
    }

    #[test]
    fn inner_alignment_intersects_axes() {
        let a = series(&[0, 1, 2, 3], &[1.0, 2.0, 3.0, 4.0]);
        let b = series(&[1, 2, 4], &[10.0, 20.0, 40.0]);
        let (a2, b2) = align(&a, &b, AlignHow::Inner, FillPolicy::Null).unwrap();
        assert_eq!(a2.timestamps(), &[hour(1), hour(2)]);
        assert_eq!(a2.values(), &[2.0, 3.0]);
        assert_eq!(b2.values(), &[10.0, 20.0]);
    }

    #[test]
    fn outer_alignment_fills_forward() {
        let a = series(&[0, 2], &[1.0, 3.0]);
        let b = series(&[0, 1, 2], &[10.0, 11.0, 12.0]);
        let (a2, b2) = align(&a, &b, AlignHow::Outer, FillPolicy::Forward).unwrap();
        assert_eq!(a2.values(), &[1.0, 1.0, 3.0]);
        assert_eq!(a2.mask(), &[true, true, true]);
        assert_eq!(b2.values(), &[10.0, 11.0, 12.0]);
    }

    #[test]
    fn outer_alignment_null_fill_masks_holes() {
        let a = series(&[0, 2], &[1.0, 3.0]);
        let b = series(&[1], &[11.0]);
        let (a2, b2) = align(&a, &b, AlignHow::Outer, FillPolicy::Null).unwrap();
        assert_eq!(a2.mask(), &[true, false, true]);
        assert_eq!(b2.mask(), &[false, true, false]);
    }

    #[test]
    fn scalar_broadcast_adopts_other_axis() {
        let a = series(&[0, 1, 2], &[1.0, 2.0, 3.0]);
        let s = Series::scalar(7.0);
        let (s2, a2) = align(&s, &a, AlignHow::Inner, FillPolicy::Null).unwrap();
        assert_eq!(s2.timestamps(), a2.timestamps());
        assert_eq!(s2.values(), &[7.0, 7.0, 7.0]);
        assert_eq!(s2.symbol(), a.symbol());
    }

    #[test]
    fn metadata_mismatch_is_rejected() {
        let a = series(&[0], &[1.0]);
        let b = Series::new(vec![0], vec![1.0], Symbol::new("Y"), tf()).unwrap();
        assert!(align(&a, &b, AlignHow::Inner, FillPolicy::Null).is_err());

        let c = Series::new(
            vec![0],
            vec![1.0],
            Symbol::new("X"),
            Timeframe::new(4, TimeUnit::Hour),
        )
        .unwrap();
        assert!(align(&a, &c, AlignHow::Inner, FillPolicy::Null).is_err());
    }

    #[test]
    fn zip_with_requires_identical_axes() {
        let a = series(&[0, 1], &[1.0, 2.0]);
        let b = series(&[0, 2], &[1.0, 2.0]);
        assert!(a.zip_with(&b, |x, y| x + y).is_err());

        let c = series(&[0, 1], &[10.0, 20.0]);
        let sum = a.zip_with(&c, |x, y| x + y).unwrap();
        assert_eq!(sum.values(), &[11.0, 22.0]);
    }
}
