//! `$match` query evaluation.

use core::cmp::Ordering;

use fancy_regex::Regex;
use mongogate_core::{Document, Pattern};
use serde_json::{Map, Value};

use super::MemoryError;
use super::{expr, path};

type Result<T> = core::result::Result<T, MemoryError>;

/// Whether `doc` satisfies every clause of `filter`.
pub(super) fn matches(doc: &Value, filter: &Document) -> Result<bool> {
    for (key, cond) in filter {
        if !matches_clause(doc, key, cond)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_clause(doc: &Value, key: &str, cond: &Value) -> Result<bool> {
    match key {
        "$and" | "$or" | "$nor" => {
            let Value::Array(branches) = cond else {
                return Err(MemoryError::InvalidArgument {
                    op: key.to_owned(),
                    detail: "expects an array of conditions".into(),
                });
            };
            let mut hits = 0;
            for branch in branches {
                let Value::Object(branch) = branch else {
                    return Err(MemoryError::InvalidArgument {
                        op: key.to_owned(),
                        detail: format!("expects objects, got {branch}"),
                    });
                };
                if matches(doc, branch)? {
                    hits += 1;
                }
            }
            Ok(match key {
                "$and" => hits == branches.len(),
                "$or" => hits > 0,
                _ => hits == 0,
            })
        }
        "$expr" => {
            let mut scope = expr::Scope::new(doc);
            Ok(expr::truthy(expr::eval(cond, &mut scope)?.as_ref()))
        }
        op if op.starts_with('$') => Err(MemoryError::UnsupportedQueryOperator(op.to_owned())),
        field => {
            let mut candidates = Vec::new();
            collect(doc, field, &mut candidates);
            match operator_object(cond) {
                Some(ops) => matches_operators(&candidates, ops),
                None => matches_value(&candidates, cond),
            }
        }
    }
}

/// An object whose keys are all query operators, e.g. `{"$gte": 1, "$lt": 5}`.
fn operator_object(cond: &Value) -> Option<&Map<String, Value>> {
    let map = cond.as_object()?;
    let is_ops = !map.is_empty()
        && map.keys().all(|k| k.starts_with('$'))
        && !map.contains_key("$regularExpression");
    is_ops.then_some(map)
}

/// Values a query sees at `path`: arrays contribute themselves and each of
/// their elements, and paths descend into arrays of objects.
fn collect(doc: &Value, path: &str, out: &mut Vec<Value>) {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let Some(value) = doc.as_object().and_then(|map| map.get(head)) else {
        return;
    };
    match (value, rest) {
        (Value::Array(items), None) => {
            out.push(value.clone());
            out.extend(items.iter().cloned());
        }
        (_, None) => out.push(value.clone()),
        (Value::Array(items), Some(rest)) => {
            for item in items {
                collect(item, rest, out);
            }
        }
        (_, Some(rest)) => collect(value, rest, out),
    }
}

fn matches_value(candidates: &[Value], cond: &Value) -> Result<bool> {
    if let Some(pattern) = Pattern::from_value(cond) {
        return any_match(candidates, &compile(&pattern?)?);
    }
    if cond.is_null() && (candidates.is_empty() || candidates.iter().any(Value::is_null)) {
        return Ok(true);
    }
    Ok(candidates.iter().any(|c| path::equals(c, cond)))
}

fn matches_operators(candidates: &[Value], ops: &Map<String, Value>) -> Result<bool> {
    for (op, arg) in ops {
        let hit = match op.as_str() {
            "$eq" => matches_value(candidates, arg)?,
            "$ne" => !matches_value(candidates, arg)?,
            "$gt" | "$gte" | "$lt" | "$lte" => candidates.iter().any(|c| ordered(op, c, arg)),
            "$in" | "$nin" => {
                let Value::Array(options) = arg else {
                    return Err(MemoryError::InvalidArgument {
                        op: op.clone(),
                        detail: "expects an array".into(),
                    });
                };
                let mut any = false;
                for option in options {
                    if matches_value(candidates, option)? {
                        any = true;
                        break;
                    }
                }
                if op == "$in" { any } else { !any }
            }
            "$regex" => {
                let options = ops.get("$options").and_then(Value::as_str).unwrap_or("");
                let pattern = match arg {
                    Value::String(source) => Pattern::new(source.as_str(), options)?,
                    other => match Pattern::from_value(other) {
                        Some(pattern) => pattern?,
                        None => {
                            return Err(MemoryError::InvalidArgument {
                                op: op.clone(),
                                detail: format!("expects a string or pattern, got {other}"),
                            });
                        }
                    },
                };
                any_match(candidates, &compile(&pattern)?)?
            }
            "$options" => continue,
            "$exists" => expr::truthy(Some(arg)) != candidates.is_empty(),
            "$not" => match operator_object(arg) {
                Some(inner) => !matches_operators(candidates, inner)?,
                None => !matches_value(candidates, arg)?,
            },
            other => return Err(MemoryError::UnsupportedQueryOperator(other.to_owned())),
        };
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Compiles a pattern, option letters becoming inline flags.
fn compile(pattern: &Pattern) -> Result<Regex> {
    let regex = match pattern.options() {
        "" => Regex::new(pattern.source())?,
        flags => Regex::new(&format!("(?{flags}){}", pattern.source()))?,
    };
    Ok(regex)
}

/// Whether any string candidate matches. Non-strings never match.
fn any_match(candidates: &[Value], regex: &Regex) -> Result<bool> {
    for candidate in candidates {
        if let Some(s) = candidate.as_str()
            && regex.is_match(s)?
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Range comparisons only hold between values of the same type bracket.
fn ordered(op: &str, candidate: &Value, bound: &Value) -> bool {
    let same_bracket = matches!(
        (candidate, bound),
        (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Null, Value::Null)
    );
    if !same_bracket {
        return false;
    }
    let ord = path::compare(Some(candidate), Some(bound));
    match op {
        "$gt" => ord == Ordering::Greater,
        "$gte" => ord != Ordering::Less,
        "$lt" => ord == Ordering::Less,
        _ => ord != Ordering::Greater,
    }
}
