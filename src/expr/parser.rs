use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::{
    data::domain::{canonical_field, is_bare_field, Source, TimeUnit},
    error::{ParseError, TaResult, TypeCheckError},
    expr::{
        ir::{
            AggregateOp, BinaryOperator, Expr, LiteralValue, ShiftOp, ShiftSpec, UnaryOperator,
        },
        lexer::{tokenize, Token, TokenKind},
    },
    registry::Registry,
};

// ================================================================================================
// Time-shift suffix recognition
// ================================================================================================

static AGO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([smhdw])_ago$").expect("static regex"));
static CHANGE_PCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^change_pct_(\d+)([smhdw])$").expect("static regex"));
static CHANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^change_(\d+)([smhdw])$").expect("static regex"));
static ROC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^roc_(\d+)$").expect("static regex"));
static BARE_DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([smhdw])$").expect("static regex"));

fn duration_of(caps: &regex::Captures<'_>) -> Option<ShiftSpec> {
    let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = TimeUnit::from_str(caps.get(2)?.as_str()).ok()?;
    (amount > 0).then_some(ShiftSpec::Duration { amount, unit })
}

/// Recognizes time-shift attribute suffixes: `24h_ago`, `change_24h`,
/// `change_pct_24h`, `roc_14`, and the bare `24h` form.
pub(crate) fn time_shift_suffix(attr: &str) -> Option<(ShiftSpec, Option<ShiftOp>)> {
    if let Some(caps) = AGO_RE.captures(attr) {
        return Some((duration_of(&caps)?, None));
    }
    if let Some(caps) = CHANGE_PCT_RE.captures(attr) {
        return Some((duration_of(&caps)?, Some(ShiftOp::ChangePct)));
    }
    if let Some(caps) = CHANGE_RE.captures(attr) {
        return Some((duration_of(&caps)?, Some(ShiftOp::Change)));
    }
    if let Some(caps) = ROC_RE.captures(attr) {
        let periods: u32 = caps.get(1)?.as_str().parse().ok()?;
        return (periods > 0).then_some((ShiftSpec::Periods(periods), Some(ShiftOp::ChangePct)));
    }
    if let Some(caps) = BARE_DURATION_RE.captures(attr) {
        return Some((duration_of(&caps)?, None));
    }
    None
}

// ================================================================================================
// Parser
// ================================================================================================

/// Parses expression text into the IR.
///
/// Indicator names, aliases and call-argument binding resolve against the
/// registry at parse time, so downstream passes only ever see canonical
/// names.
pub fn parse(text: &str, registry: &Registry) -> TaResult<Expr> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::new(1, "expression text cannot be empty").into());
    }
    let tokens = tokenize(trimmed)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        registry,
    };
    let expr = parser.parse_or()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    registry: &'a Registry,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> TaResult<Token> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn expect_eof(&mut self) -> TaResult<()> {
        if self.peek().kind == TokenKind::Eof {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input".to_string()))
        }
    }

    fn error(&self, message: String) -> crate::error::TaError {
        ParseError::new(self.peek().col, message).into()
    }

    // === Precedence climbing ===

    fn parse_or(&mut self) -> TaResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOperator::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> TaResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_not()?;
            left = Expr::Binary {
                op: BinaryOperator::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> TaResult<Expr> {
        if self.eat(&TokenKind::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> TaResult<Expr> {
        let first = self.parse_additive()?;
        let mut result: Option<Expr> = None;
        let mut left = first;

        while let Some(op) = self.comparison_op() {
            self.advance();
            let right = self.parse_additive()?;
            let comparison = Expr::Binary {
                op,
                left: Box::new(left.clone()),
                right: Box::new(right.clone()),
            };
            // chained comparisons (a < b < c) conjoin pairwise
            result = Some(match result {
                None => comparison,
                Some(acc) => Expr::Binary {
                    op: BinaryOperator::And,
                    left: Box::new(acc),
                    right: Box::new(comparison),
                },
            });
            left = right;
        }

        Ok(result.unwrap_or(left))
    }

    fn comparison_op(&self) -> Option<BinaryOperator> {
        match self.peek().kind {
            TokenKind::EqEq => Some(BinaryOperator::Eq),
            TokenKind::NotEq => Some(BinaryOperator::Ne),
            TokenKind::Lt => Some(BinaryOperator::Lt),
            TokenKind::Le => Some(BinaryOperator::Le),
            TokenKind::Gt => Some(BinaryOperator::Gt),
            TokenKind::Ge => Some(BinaryOperator::Ge),
            _ => None,
        }
    }

    fn parse_additive(&mut self) -> TaResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> TaResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Slash => BinaryOperator::Div,
                TokenKind::Percent => BinaryOperator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> TaResult<Expr> {
        match self.peek().kind {
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_unary()?;
                // fold negation into numeric literals
                if let Expr::Literal(LiteralValue::Number(v)) = operand {
                    return Ok(Expr::Literal(LiteralValue::Number(-v)));
                }
                Ok(Expr::Unary {
                    op: UnaryOperator::Neg,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Plus => {
                self.advance();
                let operand = self.parse_unary()?;
                if matches!(operand, Expr::Literal(LiteralValue::Number(_))) {
                    return Ok(operand);
                }
                Ok(Expr::Unary {
                    op: UnaryOperator::Pos,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> TaResult<Expr> {
        let base = self.parse_postfix()?;
        if self.eat(&TokenKind::DoubleStar) {
            // right-associative
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinaryOperator::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    // === Postfix: attributes, method calls, indexing ===

    fn parse_postfix(&mut self) -> TaResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let attr = self.attribute_name()?;
                expr = self.apply_attribute(expr, attr)?;
            } else if self.eat(&TokenKind::LBracket) {
                let token = self.advance();
                let TokenKind::Number(n) = token.kind else {
                    return Err(ParseError::new(token.col, "expected output index").into());
                };
                if n.fract() != 0.0 || n < 0.0 {
                    return Err(
                        ParseError::new(token.col, "output index must be a non-negative integer")
                            .into(),
                    );
                }
                self.expect(TokenKind::RBracket, "']'")?;
                expr = Expr::Index {
                    expr: Box::new(expr),
                    index: n as usize,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Attributes may start with digits (`24h_ago`), which the lexer splits
    /// into a number and an identifier; reassemble them here.
    fn attribute_name(&mut self) -> TaResult<String> {
        let token = self.advance();
        match token.kind {
            TokenKind::Ident(name) => Ok(name),
            TokenKind::Number(n) if n.fract() == 0.0 && n >= 0.0 => {
                if let TokenKind::Ident(rest) = &self.peek().kind {
                    let rest = rest.clone();
                    self.advance();
                    Ok(format!("{}{}", n as i64, rest))
                } else {
                    Err(ParseError::new(token.col, "invalid attribute name").into())
                }
            }
            _ => Err(ParseError::new(token.col, "expected attribute name").into()),
        }
    }

    fn apply_attribute(&mut self, base: Expr, attr: String) -> TaResult<Expr> {
        // time-shift suffixes take priority over everything else
        if let Some((shift, op)) = time_shift_suffix(&attr) {
            return Ok(Expr::TimeShift {
                series: Box::new(base),
                shift,
                op,
            });
        }

        // aggregation methods and properties
        if let Ok(agg) = AggregateOp::from_str(&attr) {
            if self.eat(&TokenKind::LParen) {
                let field = if self.peek().kind == TokenKind::RParen {
                    None
                } else {
                    Some(self.field_name_argument()?)
                };
                self.expect(TokenKind::RParen, "')'")?;
                return Ok(Expr::Aggregate {
                    series: Box::new(base),
                    op: agg,
                    field,
                });
            }
            if agg == AggregateOp::Count {
                // bare property form: trades.count
                return Ok(Expr::Aggregate {
                    series: Box::new(base),
                    op: agg,
                    field: None,
                });
            }
            return Err(self.error(format!("aggregation '{attr}' requires parentheses")));
        }

        if attr == "filter" {
            self.expect(TokenKind::LParen, "'('")?;
            let condition = self.parse_or()?;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(Expr::Filter {
                series: Box::new(base),
                condition: Box::new(condition),
            });
        }

        // source field access: ohlcv.close, trades.volume
        if let Expr::SourceRef {
            source,
            field: None,
            symbol,
            timeframe,
        } = &base
        {
            let field = canonical_field(&attr).to_string();
            if !source.is_valid_field(&field) {
                return Err(TypeCheckError::UnknownField {
                    source_name: source.to_string(),
                    field,
                }
                .into());
            }
            return Ok(Expr::SourceRef {
                source: *source,
                field: Some(field),
                symbol: symbol.clone(),
                timeframe: *timeframe,
            });
        }

        // member access on multi-output indicators; member calls are not a thing
        if self.peek().kind == TokenKind::LParen {
            return Err(self.error(format!("unknown method '{attr}'")));
        }
        Ok(Expr::Member {
            expr: Box::new(base),
            member: attr,
        })
    }

    fn field_name_argument(&mut self) -> TaResult<String> {
        let token = self.advance();
        match token.kind {
            TokenKind::Ident(name) => Ok(canonical_field(&name).to_string()),
            TokenKind::Str(name) => Ok(canonical_field(&name.to_ascii_lowercase()).to_string()),
            _ => Err(ParseError::new(token.col, "expected a field name").into()),
        }
    }

    // === Primaries ===

    fn parse_primary(&mut self) -> TaResult<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(v) => Ok(Expr::Literal(LiteralValue::Number(v))),
            TokenKind::Str(s) => Ok(Expr::Literal(LiteralValue::Str(s))),
            TokenKind::True => Ok(Expr::Literal(LiteralValue::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(LiteralValue::Bool(false))),
            TokenKind::LParen => {
                let expr = self.parse_or()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::Ident(name) => {
                if self.peek().kind == TokenKind::LParen {
                    self.advance();
                    return self.parse_call(&name, token.col);
                }
                if let Ok(source) = Source::from_str(&name) {
                    return Ok(Expr::SourceRef {
                        source,
                        field: None,
                        symbol: None,
                        timeframe: None,
                    });
                }
                if is_bare_field(&name) {
                    return Ok(select_call(canonical_field(&name)));
                }
                Err(ParseError::new(token.col, format!("unknown identifier '{name}'")).into())
            }
            _ => Err(ParseError::new(token.col, "expected an expression").into()),
        }
    }

    // === Indicator calls ===

    fn parse_call(&mut self, name: &str, col: usize) -> TaResult<Expr> {
        let mut positional: Vec<Expr> = Vec::new();
        let mut raw_kwargs: Vec<(String, Expr)> = Vec::new();

        if !self.eat(&TokenKind::RParen) {
            loop {
                // kwarg: ident '=' value
                if let TokenKind::Ident(kw_name) = &self.peek().kind {
                    let kw_name = kw_name.clone();
                    if self.tokens[self.pos + 1].kind == TokenKind::Assign {
                        self.advance();
                        self.advance();
                        let value = self.parse_or()?;
                        raw_kwargs.push((kw_name, value));
                        if self.eat(&TokenKind::Comma) {
                            continue;
                        }
                        self.expect(TokenKind::RParen, "')'")?;
                        break;
                    }
                }
                if !raw_kwargs.is_empty() {
                    return Err(self
                        .error("positional arguments cannot follow keyword arguments".to_string()));
                }
                positional.push(self.parse_or()?);
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                self.expect(TokenKind::RParen, "')'")?;
                break;
            }
        }

        if name == "select" {
            return bind_select(positional, raw_kwargs, col);
        }

        let def = self
            .registry
            .lookup(name)
            .ok_or_else(|| TypeCheckError::UnknownIndicator {
                name: name.to_string(),
            })?;
        let spec = &def.spec;
        let slots = spec.semantics.input_slots;

        // Split positional arguments into input slots and scalar parameters.
        // A literal first argument opts out of slot filling entirely (sma(20));
        // an expression first argument is the implicit input series.
        let mut slot_args: Vec<Expr> = Vec::new();
        let mut param_args: Vec<Expr> = Vec::new();
        let mut filling_slots = slots > 0;
        for (i, arg) in positional.into_iter().enumerate() {
            if filling_slots && slot_args.len() < slots {
                if arg.is_expressionish() || i > 0 {
                    slot_args.push(arg);
                    continue;
                }
                filling_slots = false;
            }
            param_args.push(arg);
        }

        if param_args.len() > spec.params.len() {
            return Err(TypeCheckError::TooManyArguments {
                indicator: spec.name.clone(),
                expected: spec.params.len(),
                actual: param_args.len(),
            }
            .into());
        }

        // Positional scalars become named kwargs in declaration order.
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        for (param, arg) in spec.params.iter().zip(param_args.into_iter()) {
            kwargs.push((param.name.clone(), arg));
        }

        for (raw_name, value) in raw_kwargs {
            let canonical = spec.canonical_param(&raw_name).to_string();
            if kwargs.iter().any(|(n, _)| n == &canonical) {
                return Err(TypeCheckError::DuplicateParameter {
                    indicator: spec.name.clone(),
                    name: canonical,
                }
                .into());
            }
            kwargs.push((canonical, value));
        }

        Ok(Expr::Call {
            name: spec.name.clone(),
            args: slot_args,
            kwargs,
        })
    }
}

fn select_call(field: &str) -> Expr {
    Expr::Call {
        name: "select".to_string(),
        args: Vec::new(),
        kwargs: vec![(
            "field".to_string(),
            Expr::Literal(LiteralValue::Str(field.to_string())),
        )],
    }
}

fn bind_select(
    positional: Vec<Expr>,
    kwargs: Vec<(String, Expr)>,
    col: usize,
) -> TaResult<Expr> {
    if positional.len() > 1 {
        return Err(ParseError::new(col, "select() expects at most one argument").into());
    }
    let mut field: Option<String> = None;
    if let Some(arg) = positional.into_iter().next() {
        match arg {
            Expr::Literal(LiteralValue::Str(s)) => {
                field = Some(canonical_field(&s.to_ascii_lowercase()).to_string());
            }
            Expr::Call { ref name, ref kwargs, .. } if name == "select" => {
                // bare field identifiers already desugared to select(field)
                if let Some((_, Expr::Literal(LiteralValue::Str(s)))) = kwargs.first() {
                    field = Some(s.clone());
                }
            }
            _ => {
                return Err(
                    ParseError::new(col, "select() field must be a string literal").into(),
                );
            }
        }
    }
    for (name, value) in kwargs {
        if name != "field" {
            return Err(TypeCheckError::UnknownParameter {
                indicator: "select".to_string(),
                name,
            }
            .into());
        }
        if let Expr::Literal(LiteralValue::Str(s)) = value {
            field = Some(canonical_field(&s.to_ascii_lowercase()).to_string());
        } else {
            return Err(ParseError::new(col, "select() field must be a string literal").into());
        }
    }
    Ok(select_call(field.as_deref().unwrap_or("close")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaError;

    fn registry() -> Registry {
        Registry::builtin()
    }

    fn parse_ok(text: &str) -> Expr {
        parse(text, &registry()).unwrap_or_else(|e| panic!("parse failed for '{text}': {e}"))
    }

    #[test]
    fn bare_fields_desugar_to_select() {
        let expr = parse_ok("close");
        assert_eq!(expr, select_call("close"));
        // shorthand and price alias collapse to close
        assert_eq!(parse_ok("c"), select_call("close"));
        assert_eq!(parse_ok("price"), select_call("close"));
    }

    #[test]
    fn qualified_source_fields_build_source_refs() {
        let expr = parse_ok("trades.volume");
        assert_eq!(
            expr,
            Expr::SourceRef {
                source: Source::Trades,
                field: Some("volume".to_string()),
                symbol: None,
                timeframe: None,
            }
        );
    }

    #[test]
    fn unknown_source_field_is_rejected() {
        let err = parse("orderbook.volume", &registry()).unwrap_err();
        assert!(matches!(
            err,
            TaError::TypeCheck(TypeCheckError::UnknownField { .. })
        ));
    }

    #[test]
    fn precedence_binds_mul_tighter_than_add() {
        let expr = parse_ok("1 + 2 * 3");
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected binary root");
        };
        assert_eq!(op, BinaryOperator::Add);
        assert!(matches!(
            *right,
            Expr::Binary {
                op: BinaryOperator::Mul,
                ..
            }
        ));
    }

    #[test]
    fn chained_comparisons_conjoin() {
        let expr = parse_ok("1 < close < 10");
        let Expr::Binary { op, .. } = &expr else {
            panic!("expected binary root");
        };
        assert_eq!(*op, BinaryOperator::And);
    }

    #[test]
    fn implicit_series_argument_binds_to_input_slot() {
        let Expr::Call { name, args, kwargs } = parse_ok("sma(close, 20)") else {
            panic!("expected call");
        };
        assert_eq!(name, "rolling_mean");
        assert_eq!(args.len(), 1);
        assert_eq!(
            kwargs,
            vec![(
                "period".to_string(),
                Expr::Literal(LiteralValue::Number(20.0))
            )]
        );
    }

    #[test]
    fn literal_first_argument_is_a_parameter() {
        let Expr::Call { args, kwargs, .. } = parse_ok("sma(20)") else {
            panic!("expected call");
        };
        assert!(args.is_empty());
        assert_eq!(kwargs[0].0, "period");
    }

    #[test]
    fn nested_calls_fill_pair_slots() {
        let Expr::Call { name, args, .. } = parse_ok("crossup(rsi(14), 70)") else {
            panic!("expected call");
        };
        assert_eq!(name, "crossup");
        assert_eq!(args.len(), 2);
        assert!(matches!(args[0], Expr::Call { .. }));
        assert_eq!(args[1], Expr::Literal(LiteralValue::Number(70.0)));
    }

    #[test]
    fn parameter_aliases_resolve_in_kwargs() {
        let Expr::Call { kwargs, .. } = parse_ok("rsi(lookback=14)") else {
            panic!("expected call");
        };
        assert_eq!(kwargs[0].0, "period");
    }

    #[test]
    fn duplicate_parameter_specification_fails() {
        let err = parse("rsi(14, period=10)", &registry()).unwrap_err();
        assert!(matches!(
            err,
            TaError::TypeCheck(TypeCheckError::DuplicateParameter { .. })
        ));
    }

    #[test]
    fn unknown_indicators_fail_eagerly() {
        let err = parse("frobnicate(14)", &registry()).unwrap_err();
        assert!(matches!(
            err,
            TaError::TypeCheck(TypeCheckError::UnknownIndicator { .. })
        ));
    }

    #[test]
    fn filter_and_aggregate_methods() {
        let Expr::Aggregate { series, op, field } = parse_ok("trades.filter(amount > 1000000).count")
        else {
            panic!("expected aggregate");
        };
        assert_eq!(op, AggregateOp::Count);
        assert_eq!(field, None);
        assert!(matches!(*series, Expr::Filter { .. }));
    }

    #[test]
    fn aggregate_with_field_argument() {
        let Expr::Aggregate { op, field, .. } = parse_ok("trades.sum(amount)") else {
            panic!("expected aggregate");
        };
        assert_eq!(op, AggregateOp::Sum);
        assert_eq!(field, Some("amount".to_string()));
    }

    #[test]
    fn time_shift_suffixes_parse() {
        let Expr::TimeShift { shift, op, .. } = parse_ok("close.24h_ago") else {
            panic!("expected time shift");
        };
        assert_eq!(
            shift,
            ShiftSpec::Duration {
                amount: 24,
                unit: TimeUnit::Hour
            }
        );
        assert_eq!(op, None);

        let Expr::TimeShift { op, .. } = parse_ok("volume.change_pct_24h") else {
            panic!("expected time shift");
        };
        assert_eq!(op, Some(ShiftOp::ChangePct));

        let Expr::TimeShift { shift, op, .. } = parse_ok("close.roc_14") else {
            panic!("expected time shift");
        };
        assert_eq!(shift, ShiftSpec::Periods(14));
        assert_eq!(op, Some(ShiftOp::ChangePct));
    }

    #[test]
    fn member_access_reaches_named_outputs() {
        let Expr::Member { member, expr } = parse_ok("macd(12, 26, 9).histogram") else {
            panic!("expected member access");
        };
        assert_eq!(member, "histogram");
        assert!(matches!(*expr, Expr::Call { .. }));
    }

    #[test]
    fn indexing_reaches_positional_outputs() {
        let Expr::Index { index, .. } = parse_ok("bbands(20, 2)[0]") else {
            panic!("expected index");
        };
        assert_eq!(index, 0);
    }

    #[test]
    fn syntax_errors_carry_columns() {
        let TaError::Parse(err) = parse("close >", &registry()).unwrap_err() else {
            panic!("expected parse error");
        };
        assert_eq!(err.position, 8);

        let TaError::Parse(err) = parse("", &registry()).unwrap_err() else {
            panic!("expected parse error");
        };
        assert_eq!(err.position, 1);
    }

    #[test]
    fn boolean_composition() {
        let expr = parse_ok("rsi(14) < 30 and close > sma(50) or not falling(volume)");
        assert!(matches!(
            expr,
            Expr::Binary {
                op: BinaryOperator::Or,
                ..
            }
        ));
    }
}
