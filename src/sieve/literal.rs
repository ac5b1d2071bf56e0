//! Literal coercion and conditions
//!
//!     Directive operands are plain text. Coercion turns that text into a typed [Value] with a
//!     fixed order: quoted text, boolean keyword, integer, float, and finally the raw string.
//!     Nothing is ever evaluated as an expression.
//!
//!     Conditions compare one flag against one literal. Comparisons are total: anything that
//!     cannot be compared evaluates to `false` instead of failing.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A typed flag or literal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Coerce directive text into a value
    pub fn coerce(raw: &str) -> Value {
        let text = raw.trim();

        if let Some(inner) = unquote(text) {
            return Value::Str(inner.to_string());
        }

        match text {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }

        if let Ok(int) = text.parse::<i64>() {
            return Value::Int(int);
        }

        if looks_numeric(text) {
            if let Ok(float) = text.parse::<f64>() {
                return Value::Float(float);
            }
        }

        Value::Str(text.to_string())
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
        }
    }

    /// Numeric view used by ordering comparisons
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => {
                let trimmed = s.trim();
                if looks_numeric(trimmed) {
                    trimmed.parse::<f64>().ok()
                } else {
                    None
                }
            }
        }
    }

    /// Same-type equality; integers and floats compare numerically
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_number() == other.as_number()
            }
            _ => false,
        }
    }

    /// Type-tagged rendering, stable enough to be part of a cache key
    pub fn fingerprint(&self) -> String {
        match self {
            Value::Bool(b) => format!("b:{}", b),
            Value::Int(i) => format!("n:{}", i),
            Value::Float(f) => format!("n:{}", f),
            Value::Str(s) => format!("s:{}", s),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

fn unquote(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return Some(&text[1..text.len() - 1]);
        }
    }
    None
}

/// Only digits, signs, dots and exponents, with at least one digit. Keeps `nan`, `inf` and
/// friends out of float parsing.
fn looks_numeric(text: &str) -> bool {
    text.bytes().any(|b| b.is_ascii_digit())
        && text
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
}

/// Comparison operators accepted after a flag name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "!=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        }
    }

    fn apply(&self, flag: Option<&Value>, literal: &Value) -> bool {
        match self {
            Comparison::Eq => flag.is_some_and(|value| value.strict_eq(literal)),
            Comparison::Ne => !flag.is_some_and(|value| value.strict_eq(literal)),
            ordering => {
                let lhs = flag.and_then(Value::as_number);
                let rhs = literal.as_number();
                match (lhs, rhs) {
                    (Some(lhs), Some(rhs)) => match lhs.partial_cmp(&rhs) {
                        Some(Ordering::Greater) => {
                            matches!(ordering, Comparison::Gt | Comparison::Gte)
                        }
                        Some(Ordering::Less) => matches!(ordering, Comparison::Lt | Comparison::Lte),
                        Some(Ordering::Equal) => {
                            matches!(ordering, Comparison::Gte | Comparison::Lte)
                        }
                        None => false,
                    },
                    _ => false,
                }
            }
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// What a condition checks about its flag
#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    Truthy,
    Compare(Comparison, Value),
}

/// `#if` / `#unless` condition
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub flag: String,
    pub test: Test,
    pub negate: bool,
}

impl Condition {
    pub fn new(flag: impl Into<String>, test: Test) -> Self {
        Self {
            flag: flag.into(),
            test,
            negate: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Evaluate against the flag's current value (`None` when the flag is undefined)
    pub fn evaluate(&self, flag: Option<&Value>) -> bool {
        let outcome = match &self.test {
            Test::Truthy => flag.is_some_and(Value::is_truthy),
            Test::Compare(op, literal) => op.apply(flag, literal),
        };
        outcome != self.negate
    }
}
