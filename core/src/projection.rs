//! Projection compiler for `select`.

use serde_json::Value;

use crate::error::{MongogateError, Result};
use crate::stage::{FieldMap, Inclusion};

/// Field tokens passed to `select`. A leading `-` marks exclusion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection(Vec<String>);

impl Selection {
    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    fn split(fields: &str) -> Self {
        Self(fields.split_whitespace().map(str::to_owned).collect())
    }

    /// Compiles the tokens into a `$project` body. Repeated fields keep their
    /// first position and take the last flag. Tokens naming no field are dropped.
    pub fn compile(&self) -> FieldMap<Inclusion> {
        self.0
            .iter()
            .map(|token| match token.strip_prefix('-') {
                Some(field) => (field, Inclusion::Exclude),
                None => (token.as_str(), Inclusion::Include),
            })
            .filter(|(field, _)| !field.is_empty())
            .collect()
    }
}

impl From<&str> for Selection {
    fn from(fields: &str) -> Self {
        Self::split(fields)
    }
}

impl From<String> for Selection {
    fn from(fields: String) -> Self {
        Self::split(&fields)
    }
}

impl From<Vec<String>> for Selection {
    fn from(fields: Vec<String>) -> Self {
        Self(fields)
    }
}

impl From<Vec<&str>> for Selection {
    fn from(fields: Vec<&str>) -> Self {
        Self(fields.into_iter().map(str::to_owned).collect())
    }
}

impl From<&[&str]> for Selection {
    fn from(fields: &[&str]) -> Self {
        Self(fields.iter().map(|f| (*f).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Selection {
    fn from(fields: [&str; N]) -> Self {
        Self(fields.iter().map(|f| (*f).to_owned()).collect())
    }
}

/// Dynamic input, e.g. a field list decoded from a request.
impl TryFrom<Value> for Selection {
    type Error = MongogateError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(fields) => Ok(Self::split(&fields)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(field) => Ok(field),
                    other => Err(MongogateError::InvalidSelectField(other)),
                })
                .collect::<Result<Vec<_>>>()
                .map(Self),
            other => Err(MongogateError::InvalidSelection(other)),
        }
    }
}
