use crate::{
    error::{EngineError, TaResult, TypeCheckError},
    expr::ir::{AggregateOp, Expr, LiteralValue},
    registry::{IndicatorSpec, ParamKind, ParamValue, Registry, ResolvedParams},
};

/// Validates an expression against the registry. All errors surface before
/// any execution; the planner re-uses [`resolve_call_params`] afterwards.
pub fn typecheck(expr: &Expr, registry: &Registry) -> TaResult<()> {
    match expr {
        Expr::Literal(_) => Ok(()),

        Expr::SourceRef { source, field, .. } => {
            if let Some(field) = field {
                if !source.is_valid_field(field) {
                    return Err(TypeCheckError::UnknownField {
                        source_name: source.to_string(),
                        field: field.clone(),
                    }
                    .into());
                }
            }
            Ok(())
        }

        Expr::Call { name, args, kwargs } => {
            let def =
                registry
                    .lookup(name)
                    .ok_or_else(|| TypeCheckError::UnknownIndicator {
                        name: name.clone(),
                    })?;
            check_call(&def.spec, args, kwargs)?;
            for arg in args {
                typecheck(arg, registry)?;
            }
            Ok(())
        }

        Expr::Binary { left, right, .. } => {
            typecheck(left, registry)?;
            typecheck(right, registry)
        }

        Expr::Unary { operand, .. } => typecheck(operand, registry),

        Expr::Filter { series, condition } => {
            check_filter_condition(condition)?;
            typecheck(series, registry)?;
            typecheck(condition, registry)
        }

        Expr::Aggregate { series, op, field } => {
            check_aggregate(series, *op, field.as_deref())?;
            typecheck(series, registry)
        }

        Expr::TimeShift { series, .. } => typecheck(series, registry),

        Expr::Member { expr, member } => {
            check_output_selector(expr, registry, Some(member), None)?;
            typecheck(expr, registry)
        }

        Expr::Index { expr, index } => {
            check_output_selector(expr, registry, None, Some(*index))?;
            typecheck(expr, registry)
        }
    }
}

// ================================================================================================
// Call validation
// ================================================================================================

fn check_call(spec: &IndicatorSpec, args: &[Expr], kwargs: &[(String, Expr)]) -> TaResult<()> {
    if args.len() > spec.semantics.input_slots {
        return Err(TypeCheckError::TooManyArguments {
            indicator: spec.name.clone(),
            expected: spec.semantics.input_slots,
            actual: args.len(),
        }
        .into());
    }

    for (name, value) in kwargs {
        let Some(param) = spec.param(name) else {
            return Err(TypeCheckError::UnknownParameter {
                indicator: spec.name.clone(),
                name: name.clone(),
            }
            .into());
        };
        let literal = match value {
            Expr::Literal(lit) => lit,
            other => {
                // nested expressions are allowed only in input slots
                return Err(TypeCheckError::Mismatch {
                    node_kind: "call",
                    parameter: Some(name.clone()),
                    expected: format!("{} literal", param.kind),
                    actual: other.kind().to_string(),
                }
                .into());
            }
        };
        let coerced = coerce_literal(spec, param.kind, name, literal)?;
        check_bounds(spec, name, &coerced, param.min, param.max)?;
        if let (Some(choices), Some(v)) = (&param.choices, coerced.as_str()) {
            if !choices.iter().any(|c| c == v) {
                return Err(TypeCheckError::InvalidParameter {
                    name: name.clone(),
                    reason: format!("'{v}' is not one of {choices:?}"),
                }
                .into());
            }
        }
    }

    let resolved = resolve_call_params(spec, kwargs)?;
    for param in &spec.params {
        if param.required && !resolved.contains(&param.name) {
            return Err(TypeCheckError::MissingRequiredParameter {
                indicator: spec.name.clone(),
                name: param.name.clone(),
            }
            .into());
        }
    }

    // cross-parameter constraint shared by macd/klinger-shaped indicators
    if let (Ok(fast), Ok(slow)) = (
        resolved.get_f64("fast_period"),
        resolved.get_f64("slow_period"),
    ) {
        if fast >= slow {
            return Err(TypeCheckError::InvalidParameter {
                name: "fast_period".to_string(),
                reason: format!("must be less than slow_period ({fast} >= {slow})"),
            }
            .into());
        }
    }

    Ok(())
}

fn coerce_literal(
    spec: &IndicatorSpec,
    kind: ParamKind,
    name: &str,
    literal: &LiteralValue,
) -> TaResult<ParamValue> {
    let mismatch = |actual: &str| -> crate::error::TaError {
        TypeCheckError::Mismatch {
            node_kind: "call",
            parameter: Some(format!("{}.{}", spec.name, name)),
            expected: kind.to_string(),
            actual: actual.to_string(),
        }
        .into()
    };

    match (kind, literal) {
        (ParamKind::Int, LiteralValue::Number(v)) => {
            // one safe coercion: a whole float passes as int
            if v.fract() == 0.0 {
                Ok(ParamValue::Int(*v as i64))
            } else {
                Err(mismatch("float"))
            }
        }
        (ParamKind::Float, LiteralValue::Number(v)) => Ok(ParamValue::Float(*v)),
        (ParamKind::Str, LiteralValue::Str(v)) => Ok(ParamValue::Str(v.clone())),
        (ParamKind::Bool, LiteralValue::Bool(v)) => Ok(ParamValue::Bool(*v)),
        (_, LiteralValue::Number(_)) => Err(mismatch("number")),
        (_, LiteralValue::Str(_)) => Err(mismatch("string")),
        (_, LiteralValue::Bool(_)) => Err(mismatch("bool")),
    }
}

fn check_bounds(
    _spec: &IndicatorSpec,
    name: &str,
    value: &ParamValue,
    min: Option<f64>,
    max: Option<f64>,
) -> TaResult<()> {
    let Some(v) = value.as_f64() else {
        return Ok(());
    };
    if let Some(min) = min {
        if v < min {
            return Err(TypeCheckError::InvalidParameter {
                name: name.to_string(),
                reason: format!("must be >= {min}, got {v}"),
            }
            .into());
        }
    }
    if let Some(max) = max {
        if v > max {
            return Err(TypeCheckError::InvalidParameter {
                name: name.to_string(),
                reason: format!("must be <= {max}, got {v}"),
            }
            .into());
        }
    }
    Ok(())
}

/// Resolves the literal kwargs of a validated call into typed parameters
/// with defaults applied. The planner embeds the result into the plan.
pub fn resolve_call_params(
    spec: &IndicatorSpec,
    kwargs: &[(String, Expr)],
) -> TaResult<ResolvedParams> {
    let mut resolved = ResolvedParams::new();
    for param in &spec.params {
        if let Some(default) = &param.default {
            resolved.insert(param.name.clone(), default.clone());
        }
    }
    for (name, value) in kwargs {
        let Some(param) = spec.param(name) else {
            continue;
        };
        if let Expr::Literal(literal) = value {
            resolved.insert(name.clone(), coerce_literal(spec, param.kind, name, literal)?);
        }
    }
    Ok(resolved)
}

// ================================================================================================
// Structural checks
// ================================================================================================

fn check_filter_condition(condition: &Expr) -> TaResult<()> {
    match condition {
        Expr::Binary { op, .. } if !op.is_comparison() && !op.is_logical() => {
            Err(TypeCheckError::Mismatch {
                node_kind: "filter",
                parameter: None,
                expected: "comparison or logical operator".to_string(),
                actual: op.to_string(),
            }
            .into())
        }
        Expr::Literal(lit) if !matches!(lit, LiteralValue::Bool(_)) => {
            Err(TypeCheckError::Mismatch {
                node_kind: "filter",
                parameter: None,
                expected: "boolean condition".to_string(),
                actual: "literal".to_string(),
            }
            .into())
        }
        _ => Ok(()),
    }
}

fn check_aggregate(series: &Expr, op: AggregateOp, field: Option<&str>) -> TaResult<()> {
    // unwrap filters: trades.filter(..).sum(amount) aggregates the source
    let mut base = series;
    while let Expr::Filter { series, .. } = base {
        base = series;
    }

    if let Expr::SourceRef {
        source,
        field: ref_field,
        ..
    } = base
    {
        if let Some(field) = field {
            if !source.is_valid_field(field) {
                return Err(TypeCheckError::UnknownField {
                    source_name: source.to_string(),
                    field: field.to_string(),
                }
                .into());
            }
        } else if ref_field.is_none() && op != AggregateOp::Count {
            return Err(TypeCheckError::InvalidParameter {
                name: "field".to_string(),
                reason: format!("{op}() over a bare source requires a field name"),
            }
            .into());
        }
    }
    Ok(())
}

fn check_output_selector(
    expr: &Expr,
    registry: &Registry,
    member: Option<&str>,
    index: Option<usize>,
) -> TaResult<()> {
    let Expr::Call { name, .. } = expr else {
        return Err(TypeCheckError::Mismatch {
            node_kind: if member.is_some() {
                "member_access"
            } else {
                "index"
            },
            parameter: None,
            expected: "multi-output indicator call".to_string(),
            actual: expr.kind().to_string(),
        }
        .into());
    };
    let Some(def) = registry.lookup(name) else {
        return Err(TypeCheckError::UnknownIndicator { name: name.clone() }.into());
    };

    if let Some(member) = member {
        if def.spec.output_index(member).is_none() {
            return Err(EngineError::UnknownMember {
                indicator: def.spec.name.clone(),
                member: member.to_string(),
            }
            .into());
        }
    }
    if let Some(index) = index {
        if index >= def.spec.outputs.len() {
            return Err(EngineError::OutputIndexOutOfBounds {
                indicator: def.spec.name.clone(),
                index,
            }
            .into());
        }
    }
    Ok(())
}
