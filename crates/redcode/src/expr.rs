//! Operand expression trees.
//!
//! Expressions are parsed bottom-up with precedence climbing and evaluated
//! post-order against the label table. Labels resolve PC-relative: the
//! evaluator subtracts the address of the instruction being assembled.

use std::collections::HashMap;
use std::fmt;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Negate,
    /// Boolean not: 1 when the operand is zero, else 0.
    Not,
}

/// Binary operators, with the fixed precedence table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/` (fails on zero divisor)
    Div,
    /// `%` (fails on zero divisor)
    Rem,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl BinOp {
    /// Binding strength; higher binds tighter.
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Mul | Self::Div | Self::Rem => 4,
            Self::Add | Self::Sub => 3,
            Self::Eq | Self::Ne | Self::Lt | Self::Gt | Self::Le | Self::Ge => 2,
            Self::And => 1,
            Self::Or => 0,
        }
    }
}

/// An operand expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Integer literal.
    Number(i32),
    /// Label reference, resolved PC-relative at assembly.
    Symbol(String),
    /// Unary operation.
    Unary(UnaryOp, Box<Expr>),
    /// Binary operation; booleans yield 1/0.
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

/// Expression parse failure with a byte offset into the operand text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprParseError {
    /// 0-indexed byte offset of the failure.
    pub offset: usize,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for ExprParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Expression evaluation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// A symbol was not in the label table.
    UnknownSymbol(String),
    /// `/` or `%` with a zero divisor.
    DivByZero,
}

impl Expr {
    /// Parses an expression, requiring the whole input to be consumed.
    ///
    /// # Errors
    ///
    /// Returns an [`ExprParseError`] on malformed input, pointing at the
    /// offending byte offset.
    pub fn parse(input: &str) -> Result<Self, ExprParseError> {
        let mut cursor = Cursor { input, pos: 0 };
        let expr = parse_binary(&mut cursor, 0, 0)?;
        cursor.skip_whitespace();
        if cursor.pos < cursor.input.len() {
            return Err(ExprParseError {
                offset: cursor.pos,
                message: format!("unexpected '{}' in expression", cursor.rest()),
            });
        }
        Ok(expr)
    }

    /// Evaluates the expression at `address` against the label table.
    ///
    /// Symbols resolve to their absolute offset minus `address`, making
    /// label references PC-relative. Boolean operators treat any nonzero
    /// value as true and yield 1/0.
    ///
    /// # Errors
    ///
    /// Returns an [`EvalError`] for unknown symbols and zero divisors.
    pub fn eval(&self, symbols: &HashMap<String, i32>, address: i32) -> Result<i64, EvalError> {
        match self {
            Self::Number(value) => Ok(i64::from(*value)),
            Self::Symbol(name) => symbols
                .get(name)
                .map(|offset| i64::from(*offset) - i64::from(address))
                .ok_or_else(|| EvalError::UnknownSymbol(name.clone())),
            Self::Unary(op, operand) => {
                let value = operand.eval(symbols, address)?;
                Ok(match op {
                    UnaryOp::Negate => value.wrapping_neg(),
                    UnaryOp::Not => i64::from(value == 0),
                })
            }
            Self::Binary(op, lhs, rhs) => {
                let lhs = lhs.eval(symbols, address)?;
                let rhs = rhs.eval(symbols, address)?;
                Ok(match op {
                    BinOp::Add => lhs.wrapping_add(rhs),
                    BinOp::Sub => lhs.wrapping_sub(rhs),
                    BinOp::Mul => lhs.wrapping_mul(rhs),
                    BinOp::Div => {
                        if rhs == 0 {
                            return Err(EvalError::DivByZero);
                        }
                        lhs.wrapping_div(rhs)
                    }
                    BinOp::Rem => {
                        if rhs == 0 {
                            return Err(EvalError::DivByZero);
                        }
                        lhs.wrapping_rem(rhs)
                    }
                    BinOp::Eq => i64::from(lhs == rhs),
                    BinOp::Ne => i64::from(lhs != rhs),
                    BinOp::Lt => i64::from(lhs < rhs),
                    BinOp::Gt => i64::from(lhs > rhs),
                    BinOp::Le => i64::from(lhs <= rhs),
                    BinOp::Ge => i64::from(lhs >= rhs),
                    BinOp::And => i64::from(lhs != 0 && rhs != 0),
                    BinOp::Or => i64::from(lhs != 0 || rhs != 0),
                })
            }
        }
    }
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl Cursor<'_> {
    fn skip_whitespace(&mut self) {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn error(&self, message: impl Into<String>) -> ExprParseError {
        ExprParseError {
            offset: self.pos,
            message: message.into(),
        }
    }
}

/// Two-character operators first, so `<=` is never read as `<`.
const BINARY_OPERATORS: &[(&str, BinOp)] = &[
    ("==", BinOp::Eq),
    ("!=", BinOp::Ne),
    ("<=", BinOp::Le),
    (">=", BinOp::Ge),
    ("&&", BinOp::And),
    ("||", BinOp::Or),
    ("+", BinOp::Add),
    ("-", BinOp::Sub),
    ("*", BinOp::Mul),
    ("/", BinOp::Div),
    ("%", BinOp::Rem),
    ("<", BinOp::Lt),
    (">", BinOp::Gt),
];

fn peek_operator(cursor: &Cursor<'_>) -> Option<(BinOp, usize)> {
    let rest = cursor.rest();
    BINARY_OPERATORS
        .iter()
        .find(|(text, _)| rest.starts_with(text))
        .map(|(text, op)| (*op, text.len()))
}

/// Nesting cap; anything deeper is hostile input, not a warrior.
const MAX_EXPR_DEPTH: u32 = 64;

fn parse_binary(
    cursor: &mut Cursor<'_>,
    min_precedence: u8,
    depth: u32,
) -> Result<Expr, ExprParseError> {
    if depth > MAX_EXPR_DEPTH {
        return Err(cursor.error("expression is nested too deeply"));
    }
    let mut lhs = parse_prefix(cursor, depth)?;
    loop {
        cursor.skip_whitespace();
        let Some((op, width)) = peek_operator(cursor) else {
            break;
        };
        if op.precedence() < min_precedence {
            break;
        }
        cursor.pos += width;
        let rhs = parse_binary(cursor, op.precedence() + 1, depth + 1)?;
        lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_prefix(cursor: &mut Cursor<'_>, depth: u32) -> Result<Expr, ExprParseError> {
    if depth > MAX_EXPR_DEPTH {
        return Err(cursor.error("expression is nested too deeply"));
    }
    cursor.skip_whitespace();
    match cursor.peek() {
        Some('(') => {
            cursor.pos += 1;
            let inner = parse_binary(cursor, 0, depth + 1)?;
            cursor.skip_whitespace();
            if cursor.peek() != Some(')') {
                return Err(cursor.error("expected ')'"));
            }
            cursor.pos += 1;
            Ok(inner)
        }
        Some('-') => {
            cursor.pos += 1;
            let operand = parse_prefix(cursor, depth + 1)?;
            Ok(Expr::Unary(UnaryOp::Negate, Box::new(operand)))
        }
        Some('+') => {
            cursor.pos += 1;
            parse_prefix(cursor, depth + 1)
        }
        Some('!') => {
            cursor.pos += 1;
            let operand = parse_prefix(cursor, depth + 1)?;
            Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)))
        }
        Some(c) if c.is_ascii_digit() => parse_number(cursor),
        Some(c) if c.is_ascii_alphabetic() || c == '_' => Ok(parse_symbol(cursor)),
        Some(c) => Err(cursor.error(format!("unexpected '{c}' in expression"))),
        None => Err(cursor.error("unexpected end of expression")),
    }
}

fn parse_number(cursor: &mut Cursor<'_>) -> Result<Expr, ExprParseError> {
    let start = cursor.pos;
    while cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
        cursor.pos += 1;
    }
    let digits = &cursor.input[start..cursor.pos];
    digits.parse::<i32>().map(Expr::Number).map_err(|_| {
        ExprParseError {
            offset: start,
            message: format!("number '{digits}' is out of range"),
        }
    })
}

fn parse_symbol(cursor: &mut Cursor<'_>) -> Expr {
    let start = cursor.pos;
    while cursor
        .peek()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        cursor.pos += 1;
    }
    Expr::Symbol(cursor.input[start..cursor.pos].to_string())
}
