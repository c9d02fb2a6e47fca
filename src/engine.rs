use std::collections::{BTreeMap, BTreeSet};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rayon::prelude::*;
use tracing::debug;

use crate::{
    data::{
        dataset::{partition_missing, Dataset, PartitionKey},
        domain::{Source, Symbol, Timeframe},
        series::Series,
    },
    error::{EngineError, TaResult},
    expr::planner::{NodeId, Plan, PlanNode},
    registry::Registry,
};

pub mod batch;
pub mod stream;

// ================================================================================================
// Cancellation
// ================================================================================================

/// Caller-supplied cancellation flag, checked between topo-order nodes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ================================================================================================
// Evaluation surface
// ================================================================================================

#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
    pub symbol: Option<Symbol>,
    pub timeframe: Option<Timeframe>,
    pub cancel: Option<CancelToken>,
    /// Keep every intermediate node output for debugging.
    pub collect_all: bool,
}

/// The value a plan node produced: one series, or named series for
/// multi-output indicators (in declared output order).
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    Series(Series),
    Multi(Vec<(String, Series)>),
}

impl NodeOutput {
    /// The primary series: itself, or the first declared output.
    pub fn primary(&self) -> &Series {
        match self {
            NodeOutput::Series(series) => series,
            NodeOutput::Multi(outputs) => {
                &outputs.first().expect("multi outputs are non-empty").1
            }
        }
    }

    pub fn into_primary(self) -> Series {
        match self {
            NodeOutput::Series(series) => series,
            NodeOutput::Multi(outputs) => {
                outputs.into_iter().next().expect("multi outputs are non-empty").1
            }
        }
    }

    pub fn named(&self, name: &str) -> Option<&Series> {
        match self {
            NodeOutput::Series(_) => None,
            NodeOutput::Multi(outputs) => outputs
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, s)| s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub partition: PartitionKey,
    pub root: NodeOutput,
    pub outputs: Option<BTreeMap<NodeId, NodeOutput>>,
}

// ================================================================================================
// Engine
// ================================================================================================

/// Compiles expressions and executes plans over dataset partitions.
#[derive(Debug, Clone)]
pub struct Engine {
    registry: Arc<Registry>,
}

impl Engine {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Parse, typecheck and plan in one step.
    pub fn compile(&self, text: &str) -> TaResult<Plan> {
        let expr = crate::expr::parser::parse(text, &self.registry)?;
        crate::expr::planner::plan(&expr, &self.registry)
    }

    /// Batch evaluation of one plan against one resolved partition.
    pub fn evaluate(
        &self,
        plan: &Plan,
        dataset: &Dataset,
        opts: &EvalOptions,
    ) -> TaResult<Evaluation> {
        let key = resolve_partition(plan, dataset, opts.symbol.as_ref(), opts.timeframe)?;
        debug!(partition = %key, "evaluating plan in batch mode");
        let partition = dataset
            .partition(&key)
            .ok_or_else(|| partition_missing(&key))?;
        let ctx = crate::data::context::SeriesContext::from_partition(key.source, partition);

        let (root, outputs) = batch::execute(
            plan,
            &self.registry,
            &ctx,
            opts.cancel.as_ref(),
            opts.collect_all,
        )?;
        Ok(Evaluation {
            partition: key,
            root,
            outputs,
        })
    }

    /// Evaluates independent plans in parallel. Plans share no mutable
    /// state, so this is a straight data-parallel map.
    pub fn evaluate_many(
        &self,
        plans: &[Plan],
        dataset: &Dataset,
        opts: &EvalOptions,
    ) -> Vec<TaResult<Evaluation>> {
        plans
            .par_iter()
            .map(|plan| self.evaluate(plan, dataset, opts))
            .collect()
    }
}

// ================================================================================================
// Partition resolution
// ================================================================================================

/// Sources named explicitly by `SourceRef` nodes.
fn explicit_sources(plan: &Plan) -> BTreeSet<Source> {
    plan.graph
        .nodes
        .values()
        .filter_map(|node| match node {
            PlanNode::SourceRef { source, .. } => Some(*source),
            _ => None,
        })
        .collect()
}

/// Chooses the partition a plan runs against.
///
/// A single non-ohlcv referenced source selects that source's partition;
/// base-field-only expressions run on ohlcv. Mixing ohlcv references with
/// another source, or referencing several non-ohlcv sources, is ambiguous.
pub(crate) fn resolve_partition(
    plan: &Plan,
    dataset: &Dataset,
    symbol: Option<&Symbol>,
    timeframe: Option<Timeframe>,
) -> TaResult<PartitionKey> {
    let sources = explicit_sources(plan);
    let non_ohlcv: Vec<Source> = sources
        .iter()
        .copied()
        .filter(|s| *s != Source::Ohlcv)
        .collect();

    let source = match non_ohlcv.as_slice() {
        [] => Source::Ohlcv,
        [single] => {
            if sources.contains(&Source::Ohlcv) {
                return Err(EngineError::AmbiguousPartition {
                    sources: sources
                        .iter()
                        .map(Source::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                }
                .into());
            }
            *single
        }
        many => {
            return Err(EngineError::AmbiguousPartition {
                sources: many
                    .iter()
                    .map(Source::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            }
            .into());
        }
    };

    if let (Some(symbol), Some(timeframe)) = (symbol, timeframe) {
        let key = PartitionKey::new(symbol.clone(), timeframe, source);
        return if dataset.partition(&key).is_some() {
            Ok(key)
        } else {
            Err(partition_missing(&key))
        };
    }

    dataset
        .keys()
        .into_iter()
        .find(|key| {
            key.source == source
                && symbol.is_none_or(|s| &key.symbol == s)
                && timeframe.is_none_or(|tf| key.timeframe == tf)
        })
        .ok_or_else(|| {
            partition_missing(&PartitionKey::new(
                symbol.cloned().unwrap_or_else(|| Symbol::new("*")),
                timeframe.unwrap_or(Timeframe::hours(1)),
                source,
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaError;

    fn engine() -> Engine {
        Engine::new(Arc::new(Registry::builtin()))
    }

    fn dataset() -> Dataset {
        let mut ds = Dataset::new();
        let n = 10;
        let timestamps: Vec<i64> = (0..n).map(|i| i * 3_600_000).collect();
        let closes: Vec<f64> = (1..=n).map(|i| i as f64).collect();
        let bundle = crate::data::dataset::OhlcvBundle::new(
            timestamps.clone(),
            closes.clone(),
            closes.iter().map(|c| c + 1.0).collect(),
            closes.iter().map(|c| c - 1.0).collect(),
            closes.clone(),
            vec![100.0; n as usize],
            Symbol::new("X"),
            Timeframe::hours(1),
        )
        .unwrap();
        ds.insert_ohlcv(bundle);

        let volume = Series::new(
            timestamps,
            (0..n).map(|i| (i * 10) as f64).collect(),
            Symbol::new("X"),
            Timeframe::hours(1),
        )
        .unwrap();
        ds.insert_field(Source::Trades, "volume", volume);
        ds
    }

    #[test]
    fn ohlcv_expressions_resolve_to_the_ohlcv_partition() {
        let engine = engine();
        let plan = engine.compile("sma(close, 3)").unwrap();
        let key = resolve_partition(&plan, &dataset(), None, None).unwrap();
        assert_eq!(key.source, Source::Ohlcv);
    }

    #[test]
    fn trades_references_select_the_trades_partition() {
        let engine = engine();
        let plan = engine.compile("trades.volume > 50").unwrap();
        let key = resolve_partition(&plan, &dataset(), None, None).unwrap();
        assert_eq!(key.source, Source::Trades);
    }

    #[test]
    fn mixed_source_references_are_ambiguous() {
        let engine = engine();
        let plan = engine
            .compile("trades.volume > 50 and ohlcv.close > 5")
            .unwrap();
        let err = resolve_partition(&plan, &dataset(), None, None).unwrap_err();
        assert!(matches!(
            err,
            TaError::Engine(EngineError::AmbiguousPartition { .. })
        ));
    }

    #[test]
    fn missing_partitions_error() {
        let engine = engine();
        let plan = engine.compile("orderbook.imbalance > 0.5").unwrap();
        let err = resolve_partition(&plan, &dataset(), None, None).unwrap_err();
        assert!(matches!(err, TaError::Data(_)));
    }

    #[test]
    fn cancellation_aborts_evaluation() {
        let engine = engine();
        let plan = engine.compile("sma(close, 3)").unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let opts = EvalOptions {
            cancel: Some(cancel),
            ..Default::default()
        };
        let err = engine.evaluate(&plan, &dataset(), &opts).unwrap_err();
        assert!(matches!(err, TaError::Engine(EngineError::Cancelled)));
    }

    #[test]
    fn evaluate_many_runs_plans_independently() {
        let engine = engine();
        let plans = vec![
            engine.compile("sma(close, 3)").unwrap(),
            engine.compile("rsi(5)").unwrap(),
            engine.compile("close > 5").unwrap(),
        ];
        let results = engine.evaluate_many(&plans, &dataset(), &EvalOptions::default());
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(Result::is_ok));
    }
}
