use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::{
    data::{
        dataset::Partition,
        domain::{canonical_field, Source, OHLCV_DERIVED_FIELDS},
        series::Series,
    },
    error::{DataError, TaResult},
};

/// A view over the named fields of one partition, passed to kernel assembly.
///
/// All fields share identical timestamps and metadata. Derived ohlcv fields
/// (`hlc3`, `ohlc4`, `hl2`, `range`, `upper_wick`, `lower_wick`) are computed
/// on first request and cached.
#[derive(Debug)]
pub struct SeriesContext {
    source: Source,
    fields: BTreeMap<String, Series>,
    derived: RefCell<BTreeMap<String, Series>>,
}

impl SeriesContext {
    pub fn from_partition(source: Source, partition: &Partition) -> Self {
        let mut fields = BTreeMap::new();
        for name in partition.available_fields() {
            if let Ok(series) = partition.field(&name) {
                fields.insert(name, series);
            }
        }
        Self {
            source,
            fields,
            derived: RefCell::new(BTreeMap::new()),
        }
    }

    /// Builds a context from pre-materialized fields (used by tests and the
    /// streaming warm-up path).
    pub fn from_fields(source: Source, fields: BTreeMap<String, Series>) -> Self {
        Self {
            source,
            fields,
            derived: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn len(&self) -> usize {
        self.fields.values().next().map(Series::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn available_fields(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        if self.source == Source::Ohlcv {
            names.extend(OHLCV_DERIVED_FIELDS.iter().map(|f| f.to_string()));
        }
        names
    }

    pub fn has_field(&self, name: &str) -> bool {
        let name = canonical_field(name);
        self.fields.contains_key(name)
            || (self.source == Source::Ohlcv && OHLCV_DERIVED_FIELDS.contains(&name))
    }

    /// The partition's default field for unqualified references.
    pub fn primary(&self) -> TaResult<Series> {
        self.field(self.source.primary_field())
    }

    /// Any field series, as an axis/metadata template for synthesized series.
    pub fn template(&self) -> TaResult<Series> {
        self.fields
            .values()
            .next()
            .cloned()
            .ok_or_else(|| {
                DataError::MissingRequiredField {
                    field: self.source.primary_field().to_string(),
                }
                .into()
            })
    }

    pub fn field(&self, name: &str) -> TaResult<Series> {
        let name = canonical_field(name);
        if let Some(series) = self.fields.get(name) {
            return Ok(series.clone());
        }
        if self.source == Source::Ohlcv && OHLCV_DERIVED_FIELDS.contains(&name) {
            if let Some(series) = self.derived.borrow().get(name) {
                return Ok(series.clone());
            }
            let series = self.compute_derived(name)?;
            self.derived
                .borrow_mut()
                .insert(name.to_string(), series.clone());
            return Ok(series);
        }
        Err(DataError::MissingRequiredField {
            field: name.to_string(),
        }
        .into())
    }

    fn compute_derived(&self, name: &str) -> TaResult<Series> {
        let h = self.field("high")?;
        let l = self.field("low")?;
        match name {
            "hl2" => h.zip_with(&l, |h, l| (h + l) / 2.0),
            "range" => h.zip_with(&l, |h, l| h - l),
            "hlc3" => {
                let c = self.field("close")?;
                let hl = h.zip_with(&l, |h, l| h + l)?;
                hl.zip_with(&c, |hl, c| (hl + c) / 3.0)
            }
            "ohlc4" => {
                let o = self.field("open")?;
                let c = self.field("close")?;
                let ho = h.zip_with(&o, |h, o| h + o)?;
                let lc = l.zip_with(&c, |l, c| l + c)?;
                ho.zip_with(&lc, |a, b| (a + b) / 4.0)
            }
            "upper_wick" => {
                let o = self.field("open")?;
                let c = self.field("close")?;
                let body_top = o.zip_with(&c, f64::max)?;
                h.zip_with(&body_top, |h, t| h - t)
            }
            "lower_wick" => {
                let o = self.field("open")?;
                let c = self.field("close")?;
                let body_bottom = o.zip_with(&c, f64::min)?;
                body_bottom.zip_with(&l, |b, l| b - l)
            }
            other => Err(DataError::MissingRequiredField {
                field: other.to_string(),
            }
            .into()),
        }
    }
}
