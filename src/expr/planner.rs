use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    data::{
        domain::{Source, Symbol, Timeframe},
        series::{AlignHow, FillPolicy},
    },
    error::{EngineError, TaResult},
    expr::{
        ir::{AggregateOp, BinaryOperator, Expr, LiteralValue, ShiftOp, ShiftSpec, UnaryOperator},
        typecheck::{resolve_call_params, typecheck},
    },
    registry::{Registry, ResolvedParams},
};

pub type NodeId = u32;

// ================================================================================================
// Plan representation
// ================================================================================================

/// One node of the compiled graph. Children are carried by the edge list;
/// call parameters are already resolved to typed literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanNode {
    Literal(LiteralValue),
    SourceRef {
        source: Source,
        field: Option<String>,
        symbol: Option<Symbol>,
        timeframe: Option<Timeframe>,
    },
    Call {
        name: String,
        params: ResolvedParams,
    },
    Binary(BinaryOperator),
    Unary(UnaryOperator),
    Filter,
    Aggregate {
        op: AggregateOp,
        field: Option<String>,
    },
    TimeShift {
        shift: ShiftSpec,
        op: Option<ShiftOp>,
    },
    Member(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanGraph {
    pub nodes: BTreeMap<NodeId, PlanNode>,
    pub edges: BTreeMap<NodeId, Vec<NodeId>>,
    pub root: NodeId,
    /// Children strictly precede parents.
    pub topo: Vec<NodeId>,
}

/// History one partition field must provide before the plan can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRequirement {
    pub source: Source,
    pub field: String,
    pub min_lookback: usize,
    pub timeframe: Option<Timeframe>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentPolicy {
    pub how: AlignHow,
    pub fill: FillPolicy,
}

/// A compiled, serialisable execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub graph: PlanGraph,
    pub requirements: Vec<DataRequirement>,
    pub alignment: AlignmentPolicy,
}

impl Plan {
    pub fn node(&self, id: NodeId) -> Option<&PlanNode> {
        self.graph.nodes.get(&id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.graph
            .edges
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Largest lookback any requirement demands.
    pub fn max_lookback(&self) -> usize {
        self.requirements
            .iter()
            .map(|r| r.min_lookback)
            .max()
            .unwrap_or(0)
    }

    /// Compact wire form, so a host can ship the plan to a worker.
    pub fn to_bytes(&self) -> TaResult<Vec<u8>> {
        postcard::to_stdvec(self).map_err(|e| EngineError::PlanEncoding(e).into())
    }

    pub fn from_bytes(bytes: &[u8]) -> TaResult<Self> {
        postcard::from_bytes(bytes).map_err(|e| EngineError::PlanEncoding(e).into())
    }
}

// ================================================================================================
// Planning
// ================================================================================================

/// Typechecks and lowers an expression into a plan.
pub fn plan(expr: &Expr, registry: &Registry) -> TaResult<Plan> {
    typecheck(expr, registry)?;

    let mut builder = Builder {
        registry,
        nodes: BTreeMap::new(),
        edges: BTreeMap::new(),
        requirements: BTreeMap::new(),
        next_id: 0,
    };
    let root = builder.lower(expr, 1)?;

    let topo: Vec<NodeId> = builder.nodes.keys().copied().collect();
    let requirements: Vec<DataRequirement> = builder
        .requirements
        .into_iter()
        .map(|((source, field), (min_lookback, timeframe))| DataRequirement {
            source,
            field,
            min_lookback,
            timeframe,
        })
        .collect();

    let distinct_timeframes: std::collections::BTreeSet<Option<Timeframe>> =
        requirements.iter().map(|r| r.timeframe).collect();
    let alignment = if distinct_timeframes.len() > 1 {
        // lower-frequency series fill forward into higher-frequency axes
        AlignmentPolicy {
            how: AlignHow::Outer,
            fill: FillPolicy::Forward,
        }
    } else {
        AlignmentPolicy {
            how: AlignHow::Inner,
            fill: FillPolicy::Null,
        }
    };

    debug!(
        nodes = builder.nodes.len(),
        requirements = requirements.len(),
        "compiled expression plan"
    );

    Ok(Plan {
        graph: PlanGraph {
            nodes: builder.nodes,
            edges: builder.edges,
            root,
            topo,
        },
        requirements,
        alignment,
    })
}

struct Builder<'a> {
    registry: &'a Registry,
    nodes: BTreeMap<NodeId, PlanNode>,
    edges: BTreeMap<NodeId, Vec<NodeId>>,
    requirements: BTreeMap<(Source, String), (usize, Option<Timeframe>)>,
    next_id: NodeId,
}

impl<'a> Builder<'a> {
    fn push(&mut self, node: PlanNode, children: Vec<NodeId>) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, node);
        self.edges.insert(id, children);
        id
    }

    fn require(
        &mut self,
        source: Source,
        field: &str,
        lookback: usize,
        timeframe: Option<Timeframe>,
    ) {
        let entry = self
            .requirements
            .entry((source, field.to_string()))
            .or_insert((0, timeframe));
        entry.0 = entry.0.max(lookback.max(1));
        if entry.1.is_none() {
            entry.1 = timeframe;
        }
    }

    /// Lowers one node; `lookback` is the largest period-like requirement
    /// accumulated along the chain of ancestors.
    fn lower(&mut self, expr: &Expr, lookback: usize) -> TaResult<NodeId> {
        match expr {
            Expr::Literal(value) => Ok(self.push(PlanNode::Literal(value.clone()), Vec::new())),

            Expr::SourceRef {
                source,
                field,
                symbol,
                timeframe,
            } => {
                let effective = field.clone().unwrap_or_else(|| {
                    source.primary_field().to_string()
                });
                self.require(*source, &effective, lookback, *timeframe);
                Ok(self.push(
                    PlanNode::SourceRef {
                        source: *source,
                        field: field.clone(),
                        symbol: symbol.clone(),
                        timeframe: *timeframe,
                    },
                    Vec::new(),
                ))
            }

            Expr::Call { name, args, kwargs } => {
                let def = self.registry.lookup(name).ok_or_else(|| {
                    crate::error::TypeCheckError::UnknownIndicator { name: name.clone() }
                })?;
                let spec = def.spec.clone();
                let params = resolve_call_params(&spec, kwargs)?;

                let mut own_lookback = spec.semantics.default_lookback;
                for lp in &spec.semantics.lookback_params {
                    if let Ok(v) = params.get_usize(lp) {
                        own_lookback = own_lookback.max(v);
                    }
                }
                let chain = lookback.max(own_lookback);

                // context fields the kernel reads directly
                if spec.semantics.input_layout == crate::registry::InputLayout::Bar {
                    for field in &spec.semantics.required_fields {
                        self.require(Source::Ohlcv, field, chain, None);
                    }
                }
                if name == "select" {
                    let field = params.get_str("field").unwrap_or("close").to_string();
                    self.require(Source::Ohlcv, &field, chain, None);
                }

                let mut children = Vec::with_capacity(args.len());
                for arg in args {
                    children.push(self.lower(arg, chain)?);
                }
                // value-layout calls with no explicit input read the close field
                if args.is_empty()
                    && spec.semantics.input_layout == crate::registry::InputLayout::Value
                    && spec.semantics.input_slots > 0
                {
                    self.require(Source::Ohlcv, "close", chain, None);
                }

                Ok(self.push(
                    PlanNode::Call {
                        name: spec.name.clone(),
                        params,
                    },
                    children,
                ))
            }

            Expr::Binary { op, left, right } => {
                let l = self.lower(left, lookback)?;
                let r = self.lower(right, lookback)?;
                Ok(self.push(PlanNode::Binary(*op), vec![l, r]))
            }

            Expr::Unary { op, operand } => {
                let child = self.lower(operand, lookback)?;
                Ok(self.push(PlanNode::Unary(*op), vec![child]))
            }

            Expr::Filter { series, condition } => {
                let s = self.lower(series, lookback)?;
                let c = self.lower(condition, lookback)?;
                Ok(self.push(PlanNode::Filter, vec![s, c]))
            }

            Expr::Aggregate { series, op, field } => {
                if let Some(field) = field {
                    if let Expr::SourceRef { source, .. } = strip_filters(series) {
                        self.require(*source, field, lookback, None);
                    }
                }
                let child = self.lower(series, lookback)?;
                Ok(self.push(
                    PlanNode::Aggregate {
                        op: *op,
                        field: field.clone(),
                    },
                    vec![child],
                ))
            }

            Expr::TimeShift { series, shift, op } => {
                let extra = match shift {
                    ShiftSpec::Periods(p) => *p as usize,
                    ShiftSpec::Duration { .. } => 0,
                };
                let child = self.lower(series, lookback.max(extra + 1))?;
                Ok(self.push(
                    PlanNode::TimeShift {
                        shift: *shift,
                        op: *op,
                    },
                    vec![child],
                ))
            }

            Expr::Member { expr, member } => {
                let child = self.lower(expr, lookback)?;
                Ok(self.push(PlanNode::Member(member.clone()), vec![child]))
            }

            Expr::Index { expr, index } => {
                let child = self.lower(expr, lookback)?;
                Ok(self.push(PlanNode::Index(*index), vec![child]))
            }
        }
    }
}

fn strip_filters(expr: &Expr) -> &Expr {
    let mut base = expr;
    while let Expr::Filter { series, .. } = base {
        base = series;
    }
    base
}
