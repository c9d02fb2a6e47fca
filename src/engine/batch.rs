use std::collections::BTreeMap;

use crate::{
    data::{context::SeriesContext, series::Series},
    engine::{CancelToken, NodeOutput},
    error::{EngineError, TaResult},
    expr::{
        ir::{eval_binary, eval_unary, AggregateOp, ShiftOp, ShiftSpec},
        planner::{NodeId, Plan, PlanNode},
    },
    kernel::Sample,
    registry::{InputLayout, Registry, ResolvedParams},
};

/// Walks the plan in topological order over one partition context.
///
/// Intermediate outputs are freed as soon as their single consumer has run,
/// unless `collect_all` keeps them for debugging.
pub(crate) fn execute(
    plan: &Plan,
    registry: &Registry,
    ctx: &SeriesContext,
    cancel: Option<&CancelToken>,
    collect_all: bool,
) -> TaResult<(NodeOutput, Option<BTreeMap<NodeId, NodeOutput>>)> {
    let template = ctx.template()?;

    let mut live: BTreeMap<NodeId, NodeOutput> = BTreeMap::new();
    let mut all: Option<BTreeMap<NodeId, NodeOutput>> = collect_all.then(BTreeMap::new);

    for &id in &plan.graph.topo {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(EngineError::Cancelled.into());
        }
        let node = plan
            .node(id)
            .ok_or_else(|| EngineError::InvariantViolation(format!("plan node {id} missing")))?;
        let children = plan.children(id);
        let out = eval_node(plan, registry, ctx, &template, node, children, &live)?;
        if let Some(all) = all.as_mut() {
            all.insert(id, out.clone());
        }
        live.insert(id, out);

        if !collect_all {
            // a tree: each child has exactly one consumer
            for child in children {
                if *child != plan.graph.root {
                    live.remove(child);
                }
            }
        }
    }

    let root = live
        .remove(&plan.graph.root)
        .ok_or_else(|| EngineError::InvariantViolation("root output missing".to_string()))?;
    Ok((root, all))
}

fn child_output<'a>(
    live: &'a BTreeMap<NodeId, NodeOutput>,
    id: NodeId,
) -> TaResult<&'a NodeOutput> {
    live.get(&id)
        .ok_or_else(|| EngineError::InvariantViolation(format!("output for node {id} missing")).into())
}

fn eval_node(
    plan: &Plan,
    registry: &Registry,
    ctx: &SeriesContext,
    template: &Series,
    node: &PlanNode,
    children: &[NodeId],
    live: &BTreeMap<NodeId, NodeOutput>,
) -> TaResult<NodeOutput> {
    match node {
        PlanNode::Literal(value) => {
            let v = value.as_f64().ok_or_else(|| {
                EngineError::InvariantViolation(
                    "string literal cannot be evaluated as a series".to_string(),
                )
            })?;
            Ok(NodeOutput::Series(Series::scalar(v)))
        }

        PlanNode::SourceRef { source, field, .. } => {
            let field = field
                .clone()
                .unwrap_or_else(|| source.primary_field().to_string());
            Ok(NodeOutput::Series(ctx.field(&field)?))
        }

        PlanNode::Call { name, params } => eval_call(registry, ctx, template, name, params, children, live),

        PlanNode::Binary(op) => {
            let left = child_output(live, children[0])?.primary();
            let right = child_output(live, children[1])?.primary();
            let out = combine(left, right, plan, *op)?;
            Ok(NodeOutput::Series(out))
        }

        PlanNode::Unary(op) => {
            let operand = child_output(live, children[0])?.primary();
            Ok(NodeOutput::Series(operand.map(|v| eval_unary(*op, v))))
        }

        PlanNode::Filter => {
            let series = child_output(live, children[0])?.primary();
            let condition = child_output(live, children[1])?.primary();
            let (series, condition) = crate::data::series::align(
                series,
                condition,
                plan.alignment.how,
                plan.alignment.fill,
            )?;
            let out = series.zip_with(&condition, |v, c| {
                if c.is_nan() || c == 0.0 {
                    f64::NAN
                } else {
                    v
                }
            })?;
            Ok(NodeOutput::Series(out))
        }

        PlanNode::Aggregate { op, field } => {
            let child = child_output(live, children[0])?.primary();
            let base = match field {
                Some(field) => {
                    // the child's mask is the row filter; the aggregated
                    // values come from the named field
                    let base = ctx.field(field)?;
                    base.zip_with(child, |v, c| if c.is_nan() { f64::NAN } else { v })?
                }
                None => child.clone(),
            };
            Ok(NodeOutput::Series(running_aggregate(&base, *op)?))
        }

        PlanNode::TimeShift { shift, op } => {
            let child = child_output(live, children[0])?.primary();
            Ok(NodeOutput::Series(time_shift(child, *shift, *op)?))
        }

        PlanNode::Member(member) => {
            let child = child_output(live, children[0])?;
            match child {
                NodeOutput::Series(series) => Ok(NodeOutput::Series(series.clone())),
                NodeOutput::Multi(_) => {
                    let series = child.named(member).ok_or_else(|| {
                        EngineError::UnknownMember {
                            indicator: call_name(plan, children[0]),
                            member: member.clone(),
                        }
                    })?;
                    Ok(NodeOutput::Series(series.clone()))
                }
            }
        }

        PlanNode::Index(index) => {
            let child = child_output(live, children[0])?;
            match child {
                NodeOutput::Series(series) if *index == 0 => {
                    Ok(NodeOutput::Series(series.clone()))
                }
                NodeOutput::Multi(outputs) => {
                    let (_, series) = outputs.get(*index).ok_or_else(|| {
                        EngineError::OutputIndexOutOfBounds {
                            indicator: call_name(plan, children[0]),
                            index: *index,
                        }
                    })?;
                    Ok(NodeOutput::Series(series.clone()))
                }
                _ => Err(EngineError::OutputIndexOutOfBounds {
                    indicator: call_name(plan, children[0]),
                    index: *index,
                }
                .into()),
            }
        }
    }
}

fn call_name(plan: &Plan, id: NodeId) -> String {
    match plan.node(id) {
        Some(PlanNode::Call { name, .. }) => name.clone(),
        _ => "<expression>".to_string(),
    }
}

// ================================================================================================
// Element-wise combination
// ================================================================================================

fn combine(
    left: &Series,
    right: &Series,
    plan: &Plan,
    op: crate::expr::ir::BinaryOperator,
) -> TaResult<Series> {
    if left.is_scalar() && right.is_scalar() {
        return Ok(Series::scalar(eval_binary(
            op,
            left.values()[0],
            right.values()[0],
        )));
    }
    let (left, right) =
        crate::data::series::align(left, right, plan.alignment.how, plan.alignment.fill)?;
    left.zip_with(&right, |a, b| eval_binary(op, a, b))
}

// ================================================================================================
// Kernel calls
// ================================================================================================

/// Resolves the input a value-layout call reads when a slot is unfilled.
fn default_input(ctx: &SeriesContext, params: &ResolvedParams) -> TaResult<Series> {
    match params.get_str("field") {
        Some(field) => ctx.field(field),
        None => ctx.field("close").or_else(|_| ctx.primary()),
    }
}

fn slot_series(
    live: &BTreeMap<NodeId, NodeOutput>,
    children: &[NodeId],
    slot: usize,
    ctx: &SeriesContext,
    params: &ResolvedParams,
    template: &Series,
) -> TaResult<Series> {
    match children.get(slot) {
        Some(&id) => {
            let series = child_output(live, id)?.primary();
            if series.is_scalar() {
                Ok(series.broadcast_to(template))
            } else {
                Ok(series.clone())
            }
        }
        None => default_input(ctx, params),
    }
}

fn eval_call(
    registry: &Registry,
    ctx: &SeriesContext,
    template: &Series,
    name: &str,
    params: &ResolvedParams,
    children: &[NodeId],
    live: &BTreeMap<NodeId, NodeOutput>,
) -> TaResult<NodeOutput> {
    if name == "select" {
        let field = params.get_str("field").unwrap_or("close");
        return Ok(NodeOutput::Series(ctx.field(field)?));
    }

    let def = registry
        .lookup(name)
        .ok_or_else(|| crate::error::TypeCheckError::UnknownIndicator {
            name: name.to_string(),
        })?;
    let spec = &def.spec;
    let n = template.len();

    let samples: Vec<Sample> = match spec.semantics.input_layout {
        InputLayout::Value => {
            let input = slot_series(live, children, 0, ctx, params, template)?;
            input.values().iter().map(|&v| Sample::Value(v)).collect()
        }
        InputLayout::Pair => {
            let a = slot_series(live, children, 0, ctx, params, template)?;
            let b = slot_series(live, children, 1, ctx, params, template)?;
            a.values()
                .iter()
                .zip(b.values().iter())
                .map(|(&a, &b)| Sample::Pair(a, b))
                .collect()
        }
        InputLayout::Triple => {
            let a = slot_series(live, children, 0, ctx, params, template)?;
            let b = slot_series(live, children, 1, ctx, params, template)?;
            let c = slot_series(live, children, 2, ctx, params, template)?;
            a.values()
                .iter()
                .zip(b.values().iter())
                .zip(c.values().iter())
                .map(|((&a, &b), &c)| Sample::Triple(a, b, c))
                .collect()
        }
        InputLayout::Bar => {
            let column = |field: &str| -> TaResult<Vec<f64>> {
                match ctx.field(field) {
                    Ok(series) => Ok(series.values().to_vec()),
                    Err(err) => {
                        if spec.semantics.required_fields.iter().any(|f| f == field) {
                            Err(err)
                        } else {
                            Ok(vec![f64::NAN; n])
                        }
                    }
                }
            };
            let open = column("open")?;
            let high = column("high")?;
            let low = column("low")?;
            let close = column("close")?;
            let volume = column("volume")?;
            (0..n)
                .map(|i| Sample::Bar {
                    open: open[i],
                    high: high[i],
                    low: low[i],
                    close: close[i],
                    volume: volume[i],
                })
                .collect()
        }
    };

    let mut kernel = (def.factory)(params)?;
    kernel.initialize(&[]);
    let n_outputs = spec.outputs.len();
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(n); n_outputs];
    for sample in &samples {
        let row = kernel.step(sample);
        for (j, column) in columns.iter_mut().enumerate() {
            column.push(row.get(j).copied().unwrap_or(f64::NAN));
        }
    }
    for (idx, values) in kernel.batch_backfill(ctx, n) {
        if idx < columns.len() && values.len() == n {
            columns[idx] = values;
        }
    }

    let mut outputs = Vec::with_capacity(n_outputs);
    for (output, column) in spec.outputs.iter().zip(columns.into_iter()) {
        outputs.push((output.name.clone(), template.with_values(column)?));
    }

    if outputs.len() == 1 {
        Ok(NodeOutput::Series(outputs.pop().expect("one output").1))
    } else {
        Ok(NodeOutput::Multi(outputs))
    }
}

// ================================================================================================
// Aggregates and time shifts
// ================================================================================================

/// Running aggregate over defined values, on the child's axis. The same
/// accumulation drives the streaming backend, keeping the two modes exact.
fn running_aggregate(series: &Series, op: AggregateOp) -> TaResult<Series> {
    let mut count: u64 = 0;
    let mut sum = 0.0f64;
    let mut min = f64::NAN;
    let mut max = f64::NAN;

    let values = series
        .values()
        .iter()
        .map(|&v| {
            if !v.is_nan() {
                count += 1;
                sum += v;
                if min.is_nan() || v < min {
                    min = v;
                }
                if max.is_nan() || v > max {
                    max = v;
                }
            }
            match op {
                AggregateOp::Count => count as f64,
                AggregateOp::Sum => sum,
                AggregateOp::Avg => {
                    if count == 0 {
                        f64::NAN
                    } else {
                        sum / count as f64
                    }
                }
                AggregateOp::Min => min,
                AggregateOp::Max => max,
            }
        })
        .collect();

    series.with_values(values)
}

fn time_shift(series: &Series, shift: ShiftSpec, op: Option<ShiftOp>) -> TaResult<Series> {
    let lagged: Vec<f64> = match shift {
        ShiftSpec::Duration { .. } => {
            let delta = shift
                .duration_ms()
                .ok_or_else(|| EngineError::InvariantViolation("duration shift".to_string()))?;
            series
                .timestamps()
                .iter()
                .map(|&ts| series.value_at(ts - delta))
                .collect()
        }
        ShiftSpec::Periods(p) => {
            let p = p as usize;
            (0..series.len())
                .map(|i| {
                    if i >= p {
                        series.values()[i - p]
                    } else {
                        f64::NAN
                    }
                })
                .collect()
        }
    };

    let values: Vec<f64> = series
        .values()
        .iter()
        .zip(lagged.iter())
        .map(|(&now, &then)| apply_shift_op(op, now, then))
        .collect();
    series.with_values(values)
}

pub(crate) fn apply_shift_op(op: Option<ShiftOp>, now: f64, then: f64) -> f64 {
    match op {
        None => then,
        Some(ShiftOp::Change) => {
            if now.is_nan() || then.is_nan() {
                f64::NAN
            } else {
                now - then
            }
        }
        Some(ShiftOp::ChangePct) => {
            if now.is_nan() || then.is_nan() || then == 0.0 {
                f64::NAN
            } else {
                (now - then) / then * 100.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::{Symbol, Timeframe};

    fn series(values: &[f64]) -> Series {
        Series::new(
            (0..values.len() as i64).map(|i| i * 3_600_000).collect(),
            values.to_vec(),
            Symbol::new("X"),
            Timeframe::hours(1),
        )
        .unwrap()
    }

    #[test]
    fn running_aggregates_skip_undefined_rows() {
        let s = series(&[1.0, f64::NAN, 3.0]);
        let count = running_aggregate(&s, AggregateOp::Count).unwrap();
        assert_eq!(count.values(), &[1.0, 1.0, 2.0]);
        let sum = running_aggregate(&s, AggregateOp::Sum).unwrap();
        assert_eq!(sum.values(), &[1.0, 1.0, 4.0]);
        let avg = running_aggregate(&s, AggregateOp::Avg).unwrap();
        assert_eq!(avg.values(), &[1.0, 1.0, 2.0]);
    }

    #[test]
    fn duration_shift_looks_up_exact_timestamps() {
        let s = series(&[10.0, 20.0, 30.0]);
        let shifted = time_shift(
            &s,
            ShiftSpec::Duration {
                amount: 1,
                unit: crate::data::domain::TimeUnit::Hour,
            },
            None,
        )
        .unwrap();
        assert!(shifted.values()[0].is_nan());
        assert_eq!(&shifted.values()[1..], &[10.0, 20.0]);
    }

    #[test]
    fn change_pct_guards_zero_base() {
        assert!(apply_shift_op(Some(ShiftOp::ChangePct), 5.0, 0.0).is_nan());
        assert_eq!(apply_shift_op(Some(ShiftOp::ChangePct), 15.0, 10.0), 50.0);
        assert_eq!(apply_shift_op(Some(ShiftOp::Change), 15.0, 10.0), 5.0);
    }
}
