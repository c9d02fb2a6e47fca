use crate::error::{ParseError, TaResult};

/// Hard cap on expression text length (spec: bounded single-line input).
pub const MAX_EXPRESSION_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Ident(String),
    Str(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    DoubleStar,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Assign,
    And,
    Or,
    Not,
    True,
    False,
    Eof,
}

/// One token plus its 1-based column.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub col: usize,
}

pub fn tokenize(text: &str) -> TaResult<Vec<Token>> {
    if text.len() > MAX_EXPRESSION_LEN {
        return Err(ParseError::new(
            MAX_EXPRESSION_LEN + 1,
            format!("expression exceeds {MAX_EXPRESSION_LEN} bytes"),
        )
        .into());
    }

    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let col = i + 1;
        let c = chars[i];
        match c {
            ' ' | '\t' => {
                i += 1;
            }
            '\n' | '\r' => {
                return Err(ParseError::new(col, "expressions must be single-line").into());
            }
            '(' => {
                tokens.push(Token { kind: TokenKind::LParen, col });
                i += 1;
            }
            ')' => {
                tokens.push(Token { kind: TokenKind::RParen, col });
                i += 1;
            }
            ',' => {
                tokens.push(Token { kind: TokenKind::Comma, col });
                i += 1;
            }
            '.' => {
                // a leading dot may start a number like .5
                if chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) {
                    let (value, next) = lex_number(&chars, i, col)?;
                    tokens.push(Token { kind: TokenKind::Number(value), col });
                    i = next;
                } else {
                    tokens.push(Token { kind: TokenKind::Dot, col });
                    i += 1;
                }
            }
            '+' => {
                tokens.push(Token { kind: TokenKind::Plus, col });
                i += 1;
            }
            '-' => {
                tokens.push(Token { kind: TokenKind::Minus, col });
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token { kind: TokenKind::DoubleStar, col });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Star, col });
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token { kind: TokenKind::Slash, col });
                i += 1;
            }
            '%' => {
                tokens.push(Token { kind: TokenKind::Percent, col });
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token { kind: TokenKind::EqEq, col });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Assign, col });
                    i += 1;
                }
            }
            '[' => {
                tokens.push(Token { kind: TokenKind::LBracket, col });
                i += 1;
            }
            ']' => {
                tokens.push(Token { kind: TokenKind::RBracket, col });
                i += 1;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token { kind: TokenKind::NotEq, col });
                    i += 2;
                } else {
                    return Err(ParseError::new(col, "expected '!=', found '!'").into());
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token { kind: TokenKind::Le, col });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Lt, col });
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token { kind: TokenKind::Ge, col });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Gt, col });
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut j = i + 1;
                let mut value = String::new();
                while j < chars.len() && chars[j] != quote {
                    value.push(chars[j]);
                    j += 1;
                }
                if j == chars.len() {
                    return Err(ParseError::new(col, "unterminated string literal").into());
                }
                tokens.push(Token { kind: TokenKind::Str(value), col });
                i = j + 1;
            }
            c if c.is_ascii_digit() => {
                let (value, next) = lex_number(&chars, i, col)?;
                tokens.push(Token { kind: TokenKind::Number(value), col });
                i = next;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut j = i;
                while j < chars.len()
                    && (chars[j].is_ascii_alphanumeric() || chars[j] == '_')
                {
                    j += 1;
                }
                let word: String = chars[i..j].iter().collect();
                let kind = match word.to_ascii_lowercase().as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    _ => TokenKind::Ident(word.to_ascii_lowercase()),
                };
                tokens.push(Token { kind, col });
                i = j;
            }
            other => {
                return Err(
                    ParseError::new(col, format!("unexpected character '{other}'")).into(),
                );
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        col: chars.len() + 1,
    });
    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize, col: usize) -> TaResult<(f64, usize)> {
    let mut j = start;
    let mut seen_dot = false;
    let mut seen_exp = false;
    while j < chars.len() {
        let c = chars[j];
        if c.is_ascii_digit() {
            j += 1;
        } else if c == '.' && !seen_dot && !seen_exp {
            // digits after the dot keep this a number; `24h_ago`-style
            // suffixes are attributes, not numeric fractions
            if chars.get(j + 1).is_some_and(|d| d.is_ascii_digit()) {
                seen_dot = true;
                j += 1;
            } else {
                break;
            }
        } else if (c == 'e' || c == 'E') && !seen_exp && chars.get(j + 1).is_some_and(|d| {
            d.is_ascii_digit() || *d == '+' || *d == '-'
        }) {
            seen_exp = true;
            j += 1;
            if chars[j] == '+' || chars[j] == '-' {
                j += 1;
            }
        } else {
            break;
        }
    }
    let text: String = chars[start..j].iter().collect();
    let value: f64 = text
        .parse()
        .map_err(|_| ParseError::new(col, format!("invalid number '{text}'")))?;
    Ok((value, j))
}
