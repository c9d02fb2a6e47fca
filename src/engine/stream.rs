use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use smallvec::{smallvec, SmallVec};
use tracing::debug;

use crate::{
    data::{
        dataset::Dataset,
        domain::{canonical_field, Source, Symbol, Timeframe, TimestampMs},
        series::AlignHow,
    },
    engine::resolve_partition,
    error::{EngineError, TaResult, TypeCheckError},
    expr::{
        ir::{eval_binary, eval_unary, AggregateOp, LiteralValue, ShiftOp},
        planner::{NodeId, Plan, PlanNode},
    },
    kernel::{Kernel, Sample},
    registry::{InputLayout, Registry},
};

// ================================================================================================
// Ticks
// ================================================================================================

/// One streamed observation: a timestamp plus any subset of base fields
/// (`close`, `volume`, …) and source-prefixed fields (`trades.volume`).
/// Missing fields read as NaN and propagate via the availability mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub timestamp: TimestampMs,
    pub fields: BTreeMap<String, f64>,
}

impl Tick {
    pub fn new(timestamp: TimestampMs) -> Self {
        Self {
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Convenience constructor for a full ohlcv bar.
    pub fn bar(timestamp: TimestampMs, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self::new(timestamp)
            .with_field("open", open)
            .with_field("high", high)
            .with_field("low", low)
            .with_field("close", close)
            .with_field("volume", volume)
    }
}

// ================================================================================================
// Per-node streaming state
// ================================================================================================

type Row = SmallVec<[f64; 5]>;

#[derive(Debug, Clone)]
struct AggState {
    op: AggregateOp,
    source: Source,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl AggState {
    fn update(&mut self, v: f64) -> f64 {
        if !v.is_nan() {
            self.count += 1;
            self.sum += v;
            if self.min.is_nan() || v < self.min {
                self.min = v;
            }
            if self.max.is_nan() || v > self.max {
                self.max = v;
            }
        }
        match self.op {
            AggregateOp::Count => self.count as f64,
            AggregateOp::Sum => self.sum,
            AggregateOp::Avg => {
                if self.count == 0 {
                    f64::NAN
                } else {
                    self.sum / self.count as f64
                }
            }
            AggregateOp::Min => self.min,
            AggregateOp::Max => self.max,
        }
    }
}

#[derive(Debug, Clone)]
enum NodeState {
    Kernel(Box<dyn Kernel>),
    Shift {
        buf: VecDeque<f64>,
        periods: usize,
        op: Option<ShiftOp>,
    },
    Agg(AggState),
    Stateless,
}

/// A cloneable capture of every node state at one instant.
#[derive(Debug, Clone)]
pub struct Snapshot {
    states: BTreeMap<NodeId, NodeState>,
    ticks_seen: u64,
}

// ================================================================================================
// Streaming backend
// ================================================================================================

/// Long-lived incremental executor: one kernel state per call node, fed one
/// tick at a time in topological order. A fresh backend fed the batch inputs
/// tick-by-tick reproduces the batch output sequence exactly; the lone
/// exception is the ichimoku chikou span, which only the batch runner can
/// backfill.
#[derive(Debug)]
pub struct StreamBackend {
    registry: Arc<Registry>,
    plan: Arc<Plan>,
    timeframe: Timeframe,
    partition_source: Source,
    member_index: BTreeMap<NodeId, usize>,
    states: BTreeMap<NodeId, NodeState>,
    ticks_seen: u64,
}

impl StreamBackend {
    pub fn new(
        registry: Arc<Registry>,
        plan: Plan,
        timeframe: Timeframe,
        partition_source: Source,
    ) -> TaResult<Self> {
        if plan.alignment.how == AlignHow::Outer {
            return Err(EngineError::UnsupportedStreamingNode {
                node: plan.graph.root,
                reason: "cross-timeframe plans require batch alignment".to_string(),
            }
            .into());
        }

        let mut states = BTreeMap::new();
        let mut member_index = BTreeMap::new();

        for &id in &plan.graph.topo {
            let node = plan
                .node(id)
                .ok_or_else(|| EngineError::InvariantViolation(format!("plan node {id} missing")))?;
            let state = match node {
                PlanNode::Call { name, params } if name != "select" => {
                    let def = registry.lookup(name).ok_or_else(|| {
                        TypeCheckError::UnknownIndicator { name: name.clone() }
                    })?;
                    NodeState::Kernel((def.factory)(params)?)
                }
                PlanNode::TimeShift { shift, op } => {
                    let periods = shift.to_periods(timeframe).ok_or_else(|| {
                        TypeCheckError::InvalidParameter {
                            name: "shift".to_string(),
                            reason: format!(
                                "duration is not a whole number of {timeframe} bars"
                            ),
                        }
                    })?;
                    NodeState::Shift {
                        buf: VecDeque::with_capacity(periods + 2),
                        periods,
                        op: *op,
                    }
                }
                PlanNode::Aggregate { op, .. } => {
                    let source = aggregate_source(&plan, id).unwrap_or(partition_source);
                    NodeState::Agg(AggState {
                        op: *op,
                        source,
                        count: 0,
                        sum: 0.0,
                        min: f64::NAN,
                        max: f64::NAN,
                    })
                }
                PlanNode::Member(member) => {
                    let idx = member_output_index(&plan, &registry, id, member)?;
                    member_index.insert(id, idx);
                    NodeState::Stateless
                }
                _ => NodeState::Stateless,
            };
            states.insert(id, state);
        }

        debug!(nodes = states.len(), "streaming backend initialized");
        Ok(Self {
            registry,
            plan: Arc::new(plan),
            timeframe,
            partition_source,
            member_index,
            states,
            ticks_seen: 0,
        })
    }

    /// Builds a backend for a plan and pre-warms it by replaying a history
    /// dataset through `step` in topological order.
    pub fn initialize(
        registry: Arc<Registry>,
        plan: Plan,
        history: &Dataset,
        symbol: Option<&Symbol>,
        timeframe: Option<Timeframe>,
    ) -> TaResult<Self> {
        let key = resolve_partition(&plan, history, symbol, timeframe)?;
        let mut backend = Self::new(registry, plan, key.timeframe, key.source)?;
        for tick in ticks_of_partition(history, &key)? {
            backend.step_all(&tick)?;
        }
        Ok(backend)
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn ticks_seen(&self) -> u64 {
        self.ticks_seen
    }

    /// Consumes one tick and returns the root's new value.
    pub fn step(&mut self, tick: &Tick) -> TaResult<f64> {
        let row = self.step_outputs(tick)?;
        Ok(row.first().copied().unwrap_or(f64::NAN))
    }

    /// Consumes one tick and returns the root's full output row.
    pub fn step_outputs(&mut self, tick: &Tick) -> TaResult<Row> {
        let mut values = self.step_all(tick)?;
        values
            .remove(&self.plan.graph.root)
            .ok_or_else(|| EngineError::InvariantViolation("root value missing".to_string()).into())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            states: self.states.clone(),
            ticks_seen: self.ticks_seen,
        }
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.states = snapshot.states;
        self.ticks_seen = snapshot.ticks_seen;
    }

    /// Deterministically reproduces per-tick root outputs from a snapshot
    /// without touching this backend's own state.
    pub fn replay(&self, snapshot: Snapshot, events: &[Tick]) -> TaResult<Vec<f64>> {
        let mut branch = StreamBackend {
            registry: Arc::clone(&self.registry),
            plan: Arc::clone(&self.plan),
            timeframe: self.timeframe,
            partition_source: self.partition_source,
            member_index: self.member_index.clone(),
            states: snapshot.states,
            ticks_seen: snapshot.ticks_seen,
        };
        events.iter().map(|tick| branch.step(tick)).collect()
    }

    // === Per-tick evaluation ===

    fn step_all(&mut self, tick: &Tick) -> TaResult<BTreeMap<NodeId, Row>> {
        self.ticks_seen += 1;
        let plan = Arc::clone(&self.plan);
        let mut values: BTreeMap<NodeId, Row> = BTreeMap::new();

        for &id in &plan.graph.topo {
            let node = plan.node(id).ok_or_else(|| {
                EngineError::InvariantViolation(format!("plan node {id} missing"))
            })?;
            let children = plan.children(id);
            let row = self.eval_tick_node(node, id, children, tick, &values)?;
            values.insert(id, row);
        }
        Ok(values)
    }

    fn child_value(values: &BTreeMap<NodeId, Row>, id: NodeId) -> f64 {
        values
            .get(&id)
            .and_then(|row| row.first())
            .copied()
            .unwrap_or(f64::NAN)
    }

    fn eval_tick_node(
        &mut self,
        node: &PlanNode,
        id: NodeId,
        children: &[NodeId],
        tick: &Tick,
        values: &BTreeMap<NodeId, Row>,
    ) -> TaResult<Row> {
        let row: Row = match node {
            PlanNode::Literal(value) => match value {
                LiteralValue::Number(v) => smallvec![*v],
                LiteralValue::Bool(b) => smallvec![if *b { 1.0 } else { 0.0 }],
                LiteralValue::Str(_) => smallvec![f64::NAN],
            },

            PlanNode::SourceRef { source, field, .. } => {
                let field = field
                    .clone()
                    .unwrap_or_else(|| source.primary_field().to_string());
                smallvec![self.tick_field(tick, *source, &field)]
            }

            PlanNode::Call { name, params } => {
                if name == "select" {
                    let field = params.get_str("field").unwrap_or("close");
                    smallvec![self.tick_field(tick, self.partition_source, field)]
                } else {
                    let def = self.registry.lookup(name).ok_or_else(|| {
                        TypeCheckError::UnknownIndicator { name: name.clone() }
                    })?;
                    let layout = def.spec.semantics.input_layout;
                    let sample = self.assemble_sample(layout, params, children, tick, values);
                    let NodeState::Kernel(kernel) = self
                        .states
                        .get_mut(&id)
                        .ok_or_else(|| state_missing(id))?
                    else {
                        return Err(state_missing(id));
                    };
                    kernel.step(&sample)
                }
            }

            PlanNode::Binary(op) => {
                let a = Self::child_value(values, children[0]);
                let b = Self::child_value(values, children[1]);
                smallvec![eval_binary(*op, a, b)]
            }

            PlanNode::Unary(op) => {
                let v = Self::child_value(values, children[0]);
                smallvec![eval_unary(*op, v)]
            }

            PlanNode::Filter => {
                let v = Self::child_value(values, children[0]);
                let c = Self::child_value(values, children[1]);
                smallvec![if c.is_nan() || c == 0.0 { f64::NAN } else { v }]
            }

            PlanNode::Aggregate { field, .. } => {
                let gate = Self::child_value(values, children[0]);
                let input = match field {
                    Some(field) => {
                        if gate.is_nan() {
                            f64::NAN
                        } else {
                            let source = match self.states.get(&id) {
                                Some(NodeState::Agg(state)) => state.source,
                                _ => self.partition_source,
                            };
                            self.tick_field(tick, source, field)
                        }
                    }
                    None => gate,
                };
                let NodeState::Agg(state) = self
                    .states
                    .get_mut(&id)
                    .ok_or_else(|| state_missing(id))?
                else {
                    return Err(state_missing(id));
                };
                smallvec![state.update(input)]
            }

            PlanNode::TimeShift { .. } => {
                let v = Self::child_value(values, children[0]);
                let NodeState::Shift { buf, periods, op } = self
                    .states
                    .get_mut(&id)
                    .ok_or_else(|| state_missing(id))?
                else {
                    return Err(state_missing(id));
                };
                buf.push_back(v);
                let lag = if buf.len() == *periods + 1 {
                    buf.pop_front().unwrap_or(f64::NAN)
                } else {
                    f64::NAN
                };
                smallvec![crate::engine::batch::apply_shift_op(*op, v, lag)]
            }

            PlanNode::Member(_) => {
                let idx = self.member_index.get(&id).copied().unwrap_or(0);
                let row = values.get(&children[0]).cloned().unwrap_or_default();
                smallvec![row.get(idx).copied().unwrap_or(f64::NAN)]
            }

            PlanNode::Index(index) => {
                let row = values.get(&children[0]).cloned().unwrap_or_default();
                smallvec![row.get(*index).copied().unwrap_or(f64::NAN)]
            }
        };
        Ok(row)
    }

    fn assemble_sample(
        &self,
        layout: InputLayout,
        params: &crate::registry::ResolvedParams,
        children: &[NodeId],
        tick: &Tick,
        values: &BTreeMap<NodeId, Row>,
    ) -> Sample {
        let slot = |i: usize| -> f64 {
            match children.get(i) {
                Some(&id) => Self::child_value(values, id),
                None => self.default_input(tick, params),
            }
        };
        match layout {
            InputLayout::Value => Sample::Value(slot(0)),
            InputLayout::Pair => Sample::Pair(slot(0), slot(1)),
            InputLayout::Triple => Sample::Triple(slot(0), slot(1), slot(2)),
            InputLayout::Bar => Sample::Bar {
                open: self.tick_field(tick, Source::Ohlcv, "open"),
                high: self.tick_field(tick, Source::Ohlcv, "high"),
                low: self.tick_field(tick, Source::Ohlcv, "low"),
                close: self.tick_field(tick, Source::Ohlcv, "close"),
                volume: self.tick_field(tick, Source::Ohlcv, "volume"),
            },
        }
    }

    fn default_input(&self, tick: &Tick, params: &crate::registry::ResolvedParams) -> f64 {
        if let Some(field) = params.get_str("field") {
            return self.tick_field(tick, self.partition_source, field);
        }
        let close = self.tick_field(tick, self.partition_source, "close");
        if !close.is_nan() || tick.fields.contains_key("close") {
            close
        } else {
            self.tick_field(
                tick,
                self.partition_source,
                self.partition_source.primary_field(),
            )
        }
    }

    /// Field resolution mirroring the batch context, including derived
    /// ohlcv fields computed with identical association order.
    fn tick_field(&self, tick: &Tick, source: Source, field: &str) -> f64 {
        let field = canonical_field(field);
        if let Some(v) = tick.fields.get(&format!("{source}.{field}")) {
            return *v;
        }
        if source == self.partition_source || source == Source::Ohlcv {
            if let Some(v) = tick.fields.get(field) {
                return *v;
            }
        }
        if source == Source::Ohlcv {
            let get = |name: &str| tick.fields.get(name).copied().unwrap_or(f64::NAN);
            let (o, h, l, c) = (get("open"), get("high"), get("low"), get("close"));
            return match field {
                "hl2" => (h + l) / 2.0,
                "range" => h - l,
                "hlc3" => ((h + l) + c) / 3.0,
                "ohlc4" => ((h + o) + (l + c)) / 4.0,
                "upper_wick" => h - o.max(c),
                "lower_wick" => o.min(c) - l,
                _ => f64::NAN,
            };
        }
        f64::NAN
    }
}

fn state_missing(id: NodeId) -> crate::error::TaError {
    EngineError::InvariantViolation(format!("streaming state for node {id} missing")).into()
}

fn aggregate_source(plan: &Plan, id: NodeId) -> Option<Source> {
    let mut current = *plan.children(id).first()?;
    loop {
        match plan.node(current)? {
            PlanNode::Filter => {
                current = *plan.children(current).first()?;
            }
            PlanNode::SourceRef { source, .. } => return Some(*source),
            _ => return None,
        }
    }
}

fn member_output_index(
    plan: &Plan,
    registry: &Registry,
    id: NodeId,
    member: &str,
) -> TaResult<usize> {
    let child = *plan
        .children(id)
        .first()
        .ok_or_else(|| EngineError::InvariantViolation("member without child".to_string()))?;
    let Some(PlanNode::Call { name, .. }) = plan.node(child) else {
        return Ok(0);
    };
    let def = registry
        .lookup(name)
        .ok_or_else(|| TypeCheckError::UnknownIndicator {
            name: name.clone(),
        })?;
    def.spec.output_index(member).ok_or_else(|| {
        EngineError::UnknownMember {
            indicator: def.spec.name.clone(),
            member: member.to_string(),
        }
        .into()
    })
}

/// Materializes a partition's rows as ticks, for history pre-warming.
fn ticks_of_partition(
    dataset: &Dataset,
    key: &crate::data::dataset::PartitionKey,
) -> TaResult<Vec<Tick>> {
    let partition = dataset
        .partition(key)
        .ok_or_else(|| crate::data::dataset::partition_missing(key))?;
    let timestamps = partition.timestamps().to_vec();
    let mut ticks: Vec<Tick> = timestamps.iter().map(|&ts| Tick::new(ts)).collect();
    for field in partition.available_fields() {
        let series = partition.field(&field)?;
        for (i, &v) in series.values().iter().enumerate() {
            ticks[i].fields.insert(field.clone(), v);
        }
    }
    Ok(ticks)
}
