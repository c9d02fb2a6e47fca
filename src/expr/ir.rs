use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use strum_macros::EnumString;

use crate::data::domain::{Source, Symbol, TimeUnit, Timeframe};

// ================================================================================================
// Operators
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryOperator {
    Neg,
    Pos,
    Not,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum AggregateOp {
    Sum,
    Avg,
    Max,
    Min,
    Count,
}

// ================================================================================================
// Time shifts
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ShiftSpec {
    /// Wall-clock shift, resolved against timestamps.
    Duration { amount: i64, unit: TimeUnit },
    /// Bar-count shift.
    Periods(u32),
}

impl ShiftSpec {
    pub fn duration_ms(&self) -> Option<i64> {
        match self {
            ShiftSpec::Duration { amount, unit } => Some(amount * unit.millis()),
            ShiftSpec::Periods(_) => None,
        }
    }

    /// Converts this shift to a bar count on the given timeframe, if exact.
    pub fn to_periods(&self, timeframe: Timeframe) -> Option<usize> {
        match self {
            ShiftSpec::Periods(p) => Some(*p as usize),
            ShiftSpec::Duration { .. } => {
                let delta = self.duration_ms()?;
                let bar = timeframe.duration_ms();
                (bar > 0 && delta % bar == 0).then(|| (delta / bar) as usize)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ShiftOp {
    /// `x[t] − x[t−Δ]`
    Change,
    /// `(x[t] − x[t−Δ]) / x[t−Δ] · 100`
    ChangePct,
}

// ================================================================================================
// Literals and expressions
// ================================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Number(f64),
    Bool(bool),
    Str(String),
}

impl LiteralValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LiteralValue::Number(v) => Some(*v),
            LiteralValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            LiteralValue::Str(_) => None,
        }
    }
}

/// The expression IR: a tagged union walked by the typechecker, planner and
/// both execution modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(LiteralValue),
    SourceRef {
        source: Source,
        field: Option<String>,
        symbol: Option<Symbol>,
        timeframe: Option<Timeframe>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Filter {
        series: Box<Expr>,
        condition: Box<Expr>,
    },
    Aggregate {
        series: Box<Expr>,
        op: AggregateOp,
        field: Option<String>,
    },
    TimeShift {
        series: Box<Expr>,
        shift: ShiftSpec,
        op: Option<ShiftOp>,
    },
    Member {
        expr: Box<Expr>,
        member: String,
    },
    Index {
        expr: Box<Expr>,
        index: usize,
    },
}

impl Expr {
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Literal(_) => "literal",
            Expr::SourceRef { .. } => "source_ref",
            Expr::Call { .. } => "call",
            Expr::Binary { .. } => "binary_op",
            Expr::Unary { .. } => "unary_op",
            Expr::Filter { .. } => "filter",
            Expr::Aggregate { .. } => "aggregate",
            Expr::TimeShift { .. } => "time_shift",
            Expr::Member { .. } => "member_access",
            Expr::Index { .. } => "index",
        }
    }

    /// True for node kinds that read as expressions (not bare literals) in
    /// indicator argument position.
    pub fn is_expressionish(&self) -> bool {
        !matches!(self, Expr::Literal(_))
    }
}

// ================================================================================================
// Operator semantics
// ================================================================================================

fn truthy(v: f64) -> f64 {
    if v != 0.0 { 1.0 } else { 0.0 }
}

/// Scalar semantics shared bit-for-bit by batch and streaming evaluation.
///
/// NaN operands propagate. Division and modulo by zero yield NaN rather than
/// erroring, so single-tick pathologies cannot destroy a long streaming run.
pub fn eval_binary(op: BinaryOperator, a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Sub => a - b,
        BinaryOperator::Mul => a * b,
        BinaryOperator::Div => {
            if b == 0.0 {
                f64::NAN
            } else {
                a / b
            }
        }
        BinaryOperator::Mod => {
            if b == 0.0 {
                f64::NAN
            } else {
                a % b
            }
        }
        BinaryOperator::Pow => a.powf(b),
        BinaryOperator::Eq => (a == b) as u8 as f64,
        BinaryOperator::Ne => (a != b) as u8 as f64,
        BinaryOperator::Lt => (a < b) as u8 as f64,
        BinaryOperator::Le => (a <= b) as u8 as f64,
        BinaryOperator::Gt => (a > b) as u8 as f64,
        BinaryOperator::Ge => (a >= b) as u8 as f64,
        BinaryOperator::And => truthy(a).min(truthy(b)),
        BinaryOperator::Or => truthy(a).max(truthy(b)),
    }
}

pub fn eval_unary(op: UnaryOperator, v: f64) -> f64 {
    if v.is_nan() {
        return f64::NAN;
    }
    match op {
        UnaryOperator::Neg => -v,
        UnaryOperator::Pos => v,
        UnaryOperator::Not => {
            if v == 0.0 {
                1.0
            } else {
                0.0
            }
        }
    }
}
