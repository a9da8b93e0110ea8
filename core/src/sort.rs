//! Sort compiler for `order_by`.

use core::str::FromStr;

use serde_json::Value;

use crate::error::{MongogateError, Result};
use crate::stage::{Direction, FieldMap, Stage};

impl FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> core::result::Result<Self, ()> {
        match s {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err(()),
        }
    }
}

impl Direction {
    /// Accepts `1`, `-1`, `"asc"` and `"desc"`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(Direction::Asc),
                Some(-1) => Some(Direction::Desc),
                _ => None,
            },
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Input accepted by `order_by`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortSpec {
    /// Field tokens, `-` prefix for descending.
    Tokens(Vec<String>),
    /// Explicit field/direction pairs.
    Fields(Vec<(String, Direction)>),
}

impl SortSpec {
    /// Produces the canonical `{field: 1|-1}` map.
    pub fn compile(&self) -> Result<FieldMap<Direction>> {
        let map: FieldMap<Direction> = match self {
            SortSpec::Tokens(tokens) => tokens
                .iter()
                .map(|token| match token.strip_prefix('-') {
                    Some(field) => (field, Direction::Desc),
                    None => (token.as_str(), Direction::Asc),
                })
                .filter(|(field, _)| !field.is_empty())
                .collect(),
            SortSpec::Fields(fields) => fields
                .iter()
                .filter(|(f, _)| !f.is_empty())
                .map(|(f, d)| (f.as_str(), *d))
                .collect(),
        };
        if map.is_empty() {
            return Err(MongogateError::EmptyOrderBy);
        }
        Ok(map)
    }
}

/// Appends a sort to `stages`, folding it into a directly preceding `$sort`.
pub(crate) fn push_sort(stages: &mut Vec<Stage>, fields: FieldMap<Direction>) {
    match stages.last_mut() {
        Some(Stage::Sort(existing)) => existing.merge(fields),
        _ => stages.push(Stage::Sort(fields)),
    }
}

impl From<&str> for SortSpec {
    fn from(fields: &str) -> Self {
        SortSpec::Tokens(fields.split_whitespace().map(str::to_owned).collect())
    }
}

impl From<String> for SortSpec {
    fn from(fields: String) -> Self {
        SortSpec::from(fields.as_str())
    }
}

impl From<Vec<String>> for SortSpec {
    fn from(fields: Vec<String>) -> Self {
        SortSpec::Tokens(fields)
    }
}

impl From<Vec<&str>> for SortSpec {
    fn from(fields: Vec<&str>) -> Self {
        SortSpec::Tokens(fields.into_iter().map(str::to_owned).collect())
    }
}

impl<const N: usize> From<[&str; N]> for SortSpec {
    fn from(fields: [&str; N]) -> Self {
        SortSpec::Tokens(fields.iter().map(|f| (*f).to_owned()).collect())
    }
}

impl From<(&str, Direction)> for SortSpec {
    fn from((field, direction): (&str, Direction)) -> Self {
        SortSpec::Fields(vec![(field.to_owned(), direction)])
    }
}

impl<const N: usize> From<[(&str, Direction); N]> for SortSpec {
    fn from(fields: [(&str, Direction); N]) -> Self {
        SortSpec::Fields(fields.iter().map(|(f, d)| ((*f).to_owned(), *d)).collect())
    }
}

impl From<Vec<(String, Direction)>> for SortSpec {
    fn from(fields: Vec<(String, Direction)>) -> Self {
        SortSpec::Fields(fields)
    }
}

/// Dynamic input: a token string, a token list, or a `{field: direction}` object.
impl TryFrom<Value> for SortSpec {
    type Error = MongogateError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(SortSpec::from(s)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(MongogateError::InvalidOrderByField(other)),
                })
                .collect::<Result<Vec<_>>>()
                .map(SortSpec::Tokens),
            Value::Object(map) => map
                .into_iter()
                .map(|(field, dir)| match Direction::from_value(&dir) {
                    Some(d) => Ok((field, d)),
                    None => Err(MongogateError::InvalidDirection { field, value: dir }),
                })
                .collect::<Result<Vec<_>>>()
                .map(SortSpec::Fields),
            Value::Null => Err(MongogateError::EmptyOrderBy),
            other => Err(MongogateError::InvalidOrderBy(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sort(spec: impl Into<SortSpec>) -> Value {
        serde_json::to_value(spec.into().compile().unwrap()).unwrap()
    }

    #[test]
    fn test_bare_prefix_is_not_a_field() {
        assert_eq!(sort("- age"), json!({ "age": 1 }));
        assert!(matches!(SortSpec::from("-").compile(), Err(MongogateError::EmptyOrderBy)));
        assert!(matches!(
            SortSpec::from([("", Direction::Desc)]).compile(),
            Err(MongogateError::EmptyOrderBy)
        ));
    }

    #[test]
    fn test_token_string() {
        assert_eq!(sort("name"), json!({ "name": 1 }));
        assert_eq!(sort("-age"), json!({ "age": -1 }));
        assert_eq!(sort("name -age email"), json!({ "name": 1, "age": -1, "email": 1 }));
    }

    #[test]
    fn test_token_list_and_pairs() {
        assert_eq!(sort(["name", "-age", "email"]), json!({ "name": 1, "age": -1, "email": 1 }));
        assert_eq!(sort(("createdAt", Direction::Desc)), json!({ "createdAt": -1 }));
        assert_eq!(
            sort([("score", Direction::Desc), ("rank", Direction::Asc)]),
            json!({ "score": -1, "rank": 1 })
        );
    }

    #[test]
    fn test_object_input() {
        let spec = SortSpec::try_from(json!({ "createdAt": "desc", "name": "asc" })).unwrap();
        assert_eq!(
            serde_json::to_value(spec.compile().unwrap()).unwrap(),
            json!({ "createdAt": -1, "name": 1 })
        );
        let spec = SortSpec::try_from(json!({ "score": -1, "rank": 1 })).unwrap();
        assert_eq!(
            serde_json::to_value(spec.compile().unwrap()).unwrap(),
            json!({ "score": -1, "rank": 1 })
        );
    }

    #[test]
    fn test_validation_errors_are_distinct() {
        assert!(matches!(SortSpec::from("").compile(), Err(MongogateError::EmptyOrderBy)));
        assert!(matches!(
            SortSpec::try_from(json!(42)),
            Err(MongogateError::InvalidOrderBy(_))
        ));
        assert!(matches!(
            SortSpec::try_from(json!(["name", 123])),
            Err(MongogateError::InvalidOrderByField(_))
        ));
        let err = SortSpec::try_from(json!({ "age": 2 })).unwrap_err();
        assert!(
            err.to_string()
                .starts_with("orderBy() object values must be 1, -1, 'asc', or 'desc'")
        );
    }

    #[test]
    fn test_adjacent_sorts_merge() {
        let mut stages = Vec::new();
        push_sort(&mut stages, SortSpec::from("name").compile().unwrap());
        push_sort(&mut stages, SortSpec::from("-age").compile().unwrap());
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].to_value(), json!({ "$sort": { "name": 1, "age": -1 } }));

        stages.push(Stage::Match(Default::default()));
        push_sort(&mut stages, SortSpec::from("-age").compile().unwrap());
        assert_eq!(stages.len(), 3);
    }
}
