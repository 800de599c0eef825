//! Safe formula evaluation over the source record.
//!
//! Formulas are small arithmetic/string expressions: numeric and string
//! literals, dotted-path identifiers (with `[int]` element access), the
//! arithmetic operators `+ - * / %`, comparisons, logical `&& || !`, and
//! parentheses. There are no function calls and no dynamic property access,
//! so no formula input can execute arbitrary code.
//!
//! Failures are ordinary [`FormulaError`] values; the computed resolver
//! downgrades them to `formula_error` warnings.

mod format;

pub use format::{FormatKind, apply_format};

use serde_json::Value;

use crate::error::FormulaError;
use crate::path::{SlotPath, get_by_path};

/// A parsed formula expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal.
    Number(f64),
    /// String literal.
    Str(String),
    /// Boolean literal.
    Bool(bool),
    /// Dotted-path identifier resolved against the source record.
    Path(SlotPath),
    /// Unary operation.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// Binary operation.
    Binary {
        /// The operator.
        op: BinOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical not.
    Not,
}

/// Binary operators, in ascending precedence tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// Logical or.
    Or,
    /// Logical and.
    And,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Addition (numbers) or concatenation (strings).
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Modulo.
    Mod,
}

impl BinOp {
    const fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        }
    }
}

/// Parses a formula into an expression tree.
///
/// # Errors
///
/// Returns [`FormulaError::Empty`] for blank input and
/// [`FormulaError::Parse`] with a byte offset for grammar violations.
pub fn parse(input: &str) -> Result<Expr, FormulaError> {
    if input.trim().is_empty() {
        return Err(FormulaError::Empty);
    }
    let tokens = scan(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        let (_, offset) = parser.tokens[parser.pos].clone();
        return Err(FormulaError::Parse {
            offset,
            message: "unexpected trailing tokens".to_string(),
        });
    }
    Ok(expr)
}

/// Parses and evaluates a formula against the source record.
///
/// # Errors
///
/// Propagates parse errors plus [`FormulaError::UnknownIdentifier`],
/// [`FormulaError::DivisionByZero`], and [`FormulaError::TypeError`] from
/// evaluation.
pub fn eval_str(input: &str, source: &Value) -> Result<Value, FormulaError> {
    let expr = parse(input)?;
    evaluate(&expr, source)
}

/// Evaluates a parsed expression against the source record.
///
/// # Errors
///
/// See [`eval_str`].
pub fn evaluate(expr: &Expr, source: &Value) -> Result<Value, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(number_value(*n)?),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Path(path) => get_by_path(source, path).cloned().ok_or_else(|| {
            FormulaError::UnknownIdentifier {
                path: path.canonical(),
            }
        }),
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, source)?;
            match op {
                UnaryOp::Neg => {
                    let n = as_number(&value, "-")?;
                    number_value(-n)
                }
                UnaryOp::Not => match value {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(type_error("!", &other, &Value::Null)),
                },
            }
        }
        Expr::Binary { op, left, right } => {
            let lhs = evaluate(left, source)?;
            let rhs = evaluate(right, source)?;
            apply_binary(*op, &lhs, &rhs)
        }
    }
}

fn apply_binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, FormulaError> {
    match op {
        BinOp::Add => match (lhs, rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::Number(_), Value::Number(_)) => {
                number_value(as_number(lhs, "+")? + as_number(rhs, "+")?)
            }
            _ => Err(type_error("+", lhs, rhs)),
        },
        BinOp::Sub | BinOp::Mul => {
            let a = as_number(lhs, op.symbol())?;
            let b = as_number(rhs, op.symbol())?;
            number_value(if op == BinOp::Sub { a - b } else { a * b })
        }
        BinOp::Div | BinOp::Mod => {
            let a = as_number(lhs, op.symbol())?;
            let b = as_number(rhs, op.symbol())?;
            if b == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            number_value(if op == BinOp::Div { a / b } else { a % b })
        }
        BinOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinOp::Ne => Ok(Value::Bool(lhs != rhs)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => compare(op, lhs, rhs),
        BinOp::And | BinOp::Or => match (lhs, rhs) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == BinOp::And {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(type_error(op.symbol(), lhs, rhs)),
        },
    }
}

fn compare(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, FormulaError> {
    let ordering = match (lhs, rhs) {
        (Value::Number(_), Value::Number(_)) => as_number(lhs, op.symbol())?
            .partial_cmp(&as_number(rhs, op.symbol())?)
            .ok_or_else(|| type_error(op.symbol(), lhs, rhs))?,
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => return Err(type_error(op.symbol(), lhs, rhs)),
    };
    let result = match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Ok(Value::Bool(result))
}

fn as_number(value: &Value, op: &str) -> Result<f64, FormulaError> {
    value
        .as_f64()
        .ok_or_else(|| type_error(op, value, &Value::Null))
}

fn number_value(n: f64) -> Result<Value, FormulaError> {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| FormulaError::TypeError {
            op: "number".to_string(),
            left: "non-finite".to_string(),
            right: "number".to_string(),
        })
}

fn type_error(op: &str, left: &Value, right: &Value) -> FormulaError {
    FormulaError::TypeError {
        op: op.to_string(),
        left: crate::merge::json_type_name(left).to_string(),
        right: crate::merge::json_type_name(right).to_string(),
    }
}

// ---- scanner and parser ----

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

fn scan(input: &str) -> Result<Vec<(Token, usize)>, FormulaError> {
    let bytes: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '(' => {
                tokens.push((Token::LParen, start));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, start));
                i += 1;
            }
            '+' => {
                tokens.push((Token::Op("+"), start));
                i += 1;
            }
            '-' => {
                tokens.push((Token::Op("-"), start));
                i += 1;
            }
            '*' => {
                tokens.push((Token::Op("*"), start));
                i += 1;
            }
            '/' => {
                tokens.push((Token::Op("/"), start));
                i += 1;
            }
            '%' => {
                tokens.push((Token::Op("%"), start));
                i += 1;
            }
            '=' | '!' | '<' | '>' | '&' | '|' => {
                let two: String = bytes[i..(i + 2).min(bytes.len())].iter().collect();
                let op = match two.as_str() {
                    "==" => Some("=="),
                    "!=" => Some("!="),
                    "<=" => Some("<="),
                    ">=" => Some(">="),
                    "&&" => Some("&&"),
                    "||" => Some("||"),
                    _ => None,
                };
                if let Some(op) = op {
                    tokens.push((Token::Op(op), start));
                    i += 2;
                } else {
                    match c {
                        '<' => tokens.push((Token::Op("<"), start)),
                        '>' => tokens.push((Token::Op(">"), start)),
                        '!' => tokens.push((Token::Op("!"), start)),
                        _ => {
                            return Err(FormulaError::Parse {
                                offset: start,
                                message: format!("unexpected character: {c}"),
                            });
                        }
                    }
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = c;
                i += 1;
                let mut text = String::new();
                loop {
                    match bytes.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(FormulaError::Parse {
                                offset: start,
                                message: "unterminated string literal".to_string(),
                            });
                        }
                    }
                }
                tokens.push((Token::Str(text), start));
            }
            '0'..='9' => {
                let mut text = String::new();
                while let Some(&ch) = bytes.get(i) {
                    if ch.is_ascii_digit() || ch == '.' {
                        text.push(ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                let n: f64 = text.parse().map_err(|_| FormulaError::Parse {
                    offset: start,
                    message: format!("invalid number: {text}"),
                })?;
                tokens.push((Token::Number(n), start));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&ch) = bytes.get(i) {
                    if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '[' | ']') {
                        text.push(ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Ident(text), start));
            }
            other => {
                return Err(FormulaError::Parse {
                    offset: start,
                    message: format!("unexpected character: {other}"),
                });
            }
        }
    }
    Ok(tokens)
}

impl Parser {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some((Token::Op(op), _)) => Some(op),
            _ => None,
        }
    }

    fn bump(&mut self) -> Option<(Token, usize)> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_or(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_and()?;
        while self.peek_op() == Some("||") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = binary(BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_equality()?;
        while self.peek_op() == Some("&&") {
            self.pos += 1;
            let right = self.parse_equality()?;
            left = binary(BinOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_comparison()?;
        while let Some(op) = self.peek_op() {
            let op = match op {
                "==" => BinOp::Eq,
                "!=" => BinOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_additive()?;
        while let Some(op) = self.peek_op() {
            let op = match op {
                "<" => BinOp::Lt,
                "<=" => BinOp::Le,
                ">" => BinOp::Gt,
                ">=" => BinOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_multiplicative()?;
        while let Some(op) = self.peek_op() {
            let op = match op {
                "+" => BinOp::Add,
                "-" => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek_op() {
            let op = match op {
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                "%" => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek_op() {
            Some("-") => {
                self.pos += 1;
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            Some("!") => {
                self.pos += 1;
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        match self.bump() {
            Some((Token::Number(n), _)) => Ok(Expr::Number(n)),
            Some((Token::Str(s), _)) => Ok(Expr::Str(s)),
            Some((Token::Ident(name), offset)) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                _ => {
                    let path = SlotPath::parse(&name).map_err(|e| FormulaError::Parse {
                        offset,
                        message: e.to_string(),
                    })?;
                    if path.has_wildcard() {
                        return Err(FormulaError::Parse {
                            offset,
                            message: format!("wildcards are not allowed in formulas: {name}"),
                        });
                    }
                    Ok(Expr::Path(path))
                }
            },
            Some((Token::LParen, offset)) => {
                let inner = self.parse_or()?;
                match self.bump() {
                    Some((Token::RParen, _)) => Ok(inner),
                    _ => Err(FormulaError::Parse {
                        offset,
                        message: "unclosed parenthesis".to_string(),
                    }),
                }
            }
            Some((token, offset)) => Err(FormulaError::Parse {
                offset,
                message: format!("unexpected token: {token:?}"),
            }),
            None => Err(FormulaError::Parse {
                offset: 0,
                message: "unexpected end of formula".to_string(),
            }),
        }
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
