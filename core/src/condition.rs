//! Condition compiler: turns `where` call shapes into `$match` bodies.

use core::fmt;
use core::str::FromStr;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value, json};

use crate::error::{MongogateError, Result};
use crate::stage::Document;

// =============================================================================
// Operator
// =============================================================================

/// Comparison operators accepted by `where_op`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Regex,
}

impl Operator {
    /// The store's canonical comparison key.
    pub const fn key(self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Regex => "$regex",
        }
    }
}

impl FromStr for Operator {
    type Err = MongogateError;

    fn from_str(token: &str) -> Result<Self> {
        Ok(match token {
            "=" | "==" => Operator::Eq,
            "!=" => Operator::Ne,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            "in" => Operator::In,
            "nin" => Operator::Nin,
            "regex" => Operator::Regex,
            other => return Err(MongogateError::UnsupportedOperator(other.to_string())),
        })
    }
}

// =============================================================================
// Pattern
// =============================================================================

/// A regular expression, serialized as the canonical extended-JSON
/// `{"$regularExpression": {"pattern": .., "options": ..}}` value.
///
/// The source is carried uncompiled; the store that evaluates it decides
/// which syntax it accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    options: String,
}

impl Pattern {
    /// Pattern over `source` with option letters drawn from `imsx`.
    pub fn new(source: impl Into<String>, options: &str) -> Result<Self> {
        let source = source.into();
        let mut letters: Vec<char> = Vec::with_capacity(options.len());
        for c in options.chars() {
            if !matches!(c, 'i' | 'm' | 's' | 'x') {
                return Err(MongogateError::InvalidPatternOption(c));
            }
            if !letters.contains(&c) {
                letters.push(c);
            }
        }
        letters.sort_unstable();

        Ok(Self {
            source,
            options: letters.into_iter().collect(),
        })
    }

    /// Case-insensitive pattern from a plain string.
    pub fn case_insensitive(source: impl Into<String>) -> Result<Self> {
        Self::new(source, "i")
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn options(&self) -> &str {
        &self.options
    }

    pub fn to_value(&self) -> Value {
        json!({ "$regularExpression": { "pattern": self.source, "options": self.options } })
    }

    /// Reads a pattern back from its extended-JSON form.
    pub fn from_value(value: &Value) -> Option<Result<Self>> {
        let inner = value.as_object()?.get("$regularExpression")?.as_object()?;
        let source = inner.get("pattern")?.as_str()?;
        let options = inner.get("options").and_then(Value::as_str).unwrap_or("");
        Some(Self::new(source, options))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.options)
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        let mut outer = serializer.serialize_map(Some(1))?;
        let mut inner = Map::new();
        inner.insert("pattern".into(), Value::String(self.source.clone()));
        inner.insert("options".into(), Value::String(self.options.clone()));
        outer.serialize_entry("$regularExpression", &inner)?;
        outer.end()
    }
}

// =============================================================================
// Operand
// =============================================================================

/// Right-hand side of a `where_op` comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Pattern(Pattern),
}

impl Operand {
    /// String form used when a plain value is promoted to a pattern.
    fn pattern_source(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl From<Pattern> for Operand {
    fn from(pattern: Pattern) -> Self {
        Operand::Pattern(pattern)
    }
}

macro_rules! impl_operand_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Value(Value::from(value))
                }
            }
        )*
    };
}

impl_operand_from!(Value, &str, String, bool, i32, i64, u32, u64, f64, Vec<Value>);

impl From<Vec<&str>> for Operand {
    fn from(values: Vec<&str>) -> Self {
        Operand::Value(Value::Array(values.into_iter().map(Value::from).collect()))
    }
}

// =============================================================================
// Compilation
// =============================================================================

/// `where(filter)`: the object is the `$match` body, verbatim.
pub fn compile_filter(filter: Value) -> Result<Document> {
    match filter {
        Value::Object(map) => Ok(map),
        other => Err(MongogateError::InvalidCondition(other)),
    }
}

/// `where_eq(field, value)`: implicit equality.
pub fn compile_equals(field: impl Into<String>, value: Value) -> Document {
    let mut body = Map::new();
    body.insert(field.into(), value);
    body
}

/// `where_op(field, op, operand)`: `{field: {canonicalOp: operand}}`.
///
/// For `regex`, plain values become case-insensitive patterns from their
/// string form while an existing [`Pattern`] is kept as is. Other operators
/// take a pattern operand as its extended-JSON value.
pub fn compile_comparison(field: impl Into<String>, op: &str, operand: Operand) -> Result<Document> {
    let op: Operator = op.parse()?;
    let rhs = match (op, operand) {
        (Operator::Regex, Operand::Pattern(pattern)) => pattern.to_value(),
        (Operator::Regex, Operand::Value(value)) => {
            Pattern::case_insensitive(Operand::pattern_source(&value))?.to_value()
        }
        (_, Operand::Pattern(pattern)) => pattern.to_value(),
        (_, Operand::Value(value)) => value,
    };

    let mut cmp = Map::new();
    cmp.insert(op.key().to_string(), rhs);
    Ok(compile_equals(field, Value::Object(cmp)))
}
