//! Aggregation expression evaluation for `$set` / `$addFields`.
//!
//! `None` stands for a missing value. Missing values are dropped from literal
//! objects and become `null` inside arrays.

use serde_json::{Map, Number, Value};

use super::MemoryError;
use super::path;

type Result<T> = core::result::Result<T, MemoryError>;

/// Variable bindings for one evaluation. `$$ROOT` and `$$CURRENT` always name
/// the document being reshaped.
pub(super) struct Scope<'a> {
    root: &'a Value,
    bindings: Vec<(String, Value)>,
}

impl<'a> Scope<'a> {
    pub(super) fn new(root: &'a Value) -> Self {
        Self {
            root,
            bindings: Vec::new(),
        }
    }

    fn variable(&self, name: &str) -> Option<&Value> {
        match name {
            "ROOT" | "CURRENT" => Some(self.root),
            _ => self
                .bindings
                .iter()
                .rev()
                .find(|(bound, _)| bound == name)
                .map(|(_, value)| value),
        }
    }

    fn with_binding<T>(&mut self, name: &str, value: Value, f: impl FnOnce(&mut Self) -> T) -> T {
        self.bindings.push((name.to_owned(), value));
        let out = f(self);
        self.bindings.pop();
        out
    }
}

pub(super) fn eval(expr: &Value, scope: &mut Scope<'_>) -> Result<Option<Value>> {
    match expr {
        Value::String(s) => Ok(eval_path(s, scope)),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, scope)?.unwrap_or(Value::Null));
            }
            Ok(Some(Value::Array(out)))
        }
        Value::Object(map) => {
            if map.len() == 1
                && let Some((op, arg)) = map.iter().next()
                && op.starts_with('$')
            {
                return eval_operator(op, arg, scope);
            }
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                if let Some(value) = eval(value, scope)? {
                    out.insert(key.clone(), value);
                }
            }
            Ok(Some(Value::Object(out)))
        }
        other => Ok(Some(other.clone())),
    }
}

fn eval_path(s: &str, scope: &Scope<'_>) -> Option<Value> {
    if let Some(var) = s.strip_prefix("$$") {
        let (name, rest) = match var.split_once('.') {
            Some((name, rest)) => (name, Some(rest)),
            None => (var, None),
        };
        let bound = scope.variable(name)?;
        return match rest {
            Some(rest) => path::resolve(bound, rest),
            None => Some(bound.clone()),
        };
    }
    match s.strip_prefix('$') {
        Some(field) => path::resolve(scope.root, field),
        None => Some(Value::String(s.to_owned())),
    }
}

/// `null`, `false`, `0` and missing are false; everything else is true.
pub(super) fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

fn invalid(op: &str, detail: impl Into<String>) -> MemoryError {
    MemoryError::InvalidArgument {
        op: op.to_owned(),
        detail: detail.into(),
    }
}

fn args<'v, const N: usize>(op: &str, arg: &'v Value) -> Result<&'v [Value; N]> {
    arg.as_array()
        .and_then(|items| <&[Value; N]>::try_from(items.as_slice()).ok())
        .ok_or_else(|| invalid(op, format!("expects an array of {N} arguments")))
}

fn field<'v>(op: &str, spec: &'v Map<String, Value>, name: &str) -> Result<&'v Value> {
    spec.get(name)
        .ok_or_else(|| invalid(op, format!("missing '{name}'")))
}

fn spec<'v>(op: &str, arg: &'v Value) -> Result<&'v Map<String, Value>> {
    arg.as_object()
        .ok_or_else(|| invalid(op, "expects an object argument"))
}

fn eval_operator(op: &str, arg: &Value, scope: &mut Scope<'_>) -> Result<Option<Value>> {
    match op {
        "$literal" => Ok(Some(arg.clone())),
        "$map" | "$filter" => eval_array_op(op, arg, scope),
        "$arrayElemAt" => {
            let [array, index] = args::<2>(op, arg)?;
            let array = eval(array, scope)?;
            let index = eval(index, scope)?;
            let items = match array {
                None | Some(Value::Null) => return Ok(None),
                Some(Value::Array(items)) => items,
                Some(other) => return Err(invalid(op, format!("expects an array, got {other}"))),
            };
            let Some(index) = index.as_ref().and_then(Value::as_i64) else {
                return Err(invalid(op, "expects an integer index"));
            };
            let len = items.len() as i64;
            let at = if index < 0 { len + index } else { index };
            Ok(usize::try_from(at).ok().and_then(|i| items.into_iter().nth(i)))
        }
        "$mergeObjects" => {
            let parts: Vec<Option<Value>> = match arg {
                Value::Array(items) => items
                    .iter()
                    .map(|item| eval(item, scope))
                    .collect::<Result<_>>()?,
                single => vec![eval(single, scope)?],
            };
            let mut out = Map::new();
            for part in parts {
                match part {
                    None | Some(Value::Null) => {}
                    Some(Value::Object(map)) => out.extend(map),
                    Some(other) => {
                        return Err(invalid(op, format!("expects objects, got {other}")));
                    }
                }
            }
            Ok(Some(Value::Object(out)))
        }
        "$cond" => {
            let (cond, then, otherwise) = match arg {
                Value::Array(items) if items.len() == 3 => (&items[0], &items[1], &items[2]),
                Value::Object(spec) => (
                    field(op, spec, "if")?,
                    field(op, spec, "then")?,
                    field(op, spec, "else")?,
                ),
                _ => return Err(invalid(op, "expects {if, then, else} or a 3-element array")),
            };
            if truthy(eval(cond, scope)?.as_ref()) {
                eval(then, scope)
            } else {
                eval(otherwise, scope)
            }
        }
        "$ifNull" => {
            let Value::Array(items) = arg else {
                return Err(invalid(op, "expects an array"));
            };
            let Some((fallback, candidates)) = items.split_last() else {
                return Err(invalid(op, "expects at least one argument"));
            };
            for candidate in candidates {
                match eval(candidate, scope)? {
                    None | Some(Value::Null) => {}
                    found => return Ok(found),
                }
            }
            eval(fallback, scope)
        }
        "$type" => {
            let value = match arg {
                Value::Array(items) if items.len() == 1 => eval(&items[0], scope)?,
                other => eval(other, scope)?,
            };
            Ok(Some(Value::String(type_name(value.as_ref()).to_owned())))
        }
        "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
            let [l, r] = args::<2>(op, arg)?;
            let (l, r) = (eval(l, scope)?, eval(r, scope)?);
            let ord = path::compare(l.as_ref(), r.as_ref());
            let result = match op {
                "$eq" => ord.is_eq(),
                "$ne" => ord.is_ne(),
                "$gt" => ord.is_gt(),
                "$gte" => ord.is_ge(),
                "$lt" => ord.is_lt(),
                _ => ord.is_le(),
            };
            Ok(Some(Value::Bool(result)))
        }
        "$in" => {
            let [needle, haystack] = args::<2>(op, arg)?;
            let needle = eval(needle, scope)?.unwrap_or(Value::Null);
            match eval(haystack, scope)? {
                Some(Value::Array(items)) => Ok(Some(Value::Bool(
                    items.iter().any(|item| path::equals(item, &needle)),
                ))),
                _ => Err(invalid(op, "expects an array as its second argument")),
            }
        }
        "$add" | "$subtract" | "$multiply" | "$divide" => eval_arithmetic(op, arg, scope),
        "$concat" => {
            let Value::Array(items) = arg else {
                return Err(invalid(op, "expects an array"));
            };
            let mut out = String::new();
            for item in items {
                match eval(item, scope)? {
                    None | Some(Value::Null) => return Ok(Some(Value::Null)),
                    Some(Value::String(s)) => out.push_str(&s),
                    Some(other) => return Err(invalid(op, format!("expects strings, got {other}"))),
                }
            }
            Ok(Some(Value::String(out)))
        }
        "$and" | "$or" => {
            let Value::Array(items) = arg else {
                return Err(invalid(op, "expects an array"));
            };
            let want_all = op == "$and";
            for item in items {
                let hit = truthy(eval(item, scope)?.as_ref());
                if hit != want_all {
                    return Ok(Some(Value::Bool(hit)));
                }
            }
            Ok(Some(Value::Bool(want_all)))
        }
        "$not" => {
            let value = match arg {
                Value::Array(items) if items.len() == 1 => eval(&items[0], scope)?,
                other => eval(other, scope)?,
            };
            Ok(Some(Value::Bool(!truthy(value.as_ref()))))
        }
        "$size" => {
            let value = match arg {
                Value::Array(items) if items.len() == 1 => eval(&items[0], scope)?,
                other => eval(other, scope)?,
            };
            match value {
                Some(Value::Array(items)) => Ok(Some(Value::from(items.len() as u64))),
                _ => Err(invalid(op, "expects an array")),
            }
        }
        other => Err(MemoryError::UnsupportedOperator(other.to_owned())),
    }
}

fn eval_array_op(op: &str, arg: &Value, scope: &mut Scope<'_>) -> Result<Option<Value>> {
    let spec = spec(op, arg)?;
    let input = eval(field(op, spec, "input")?, scope)?;
    let name = match spec.get("as") {
        Some(Value::String(name)) => name.as_str(),
        Some(_) => return Err(invalid(op, "'as' must be a string")),
        None => "this",
    };
    let items = match input {
        None | Some(Value::Null) => return Ok(Some(Value::Null)),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(invalid(op, format!("input must be an array, got {other}"))),
    };

    let mut out = Vec::with_capacity(items.len());
    if op == "$map" {
        let body = field(op, spec, "in")?;
        for item in items {
            let mapped = scope.with_binding(name, item, |scope| eval(body, scope))?;
            out.push(mapped.unwrap_or(Value::Null));
        }
    } else {
        let cond = field(op, spec, "cond")?;
        for item in items {
            let keep = scope.with_binding(name, item.clone(), |scope| eval(cond, scope))?;
            if truthy(keep.as_ref()) {
                out.push(item);
            }
        }
    }
    Ok(Some(Value::Array(out)))
}

fn eval_arithmetic(op: &str, arg: &Value, scope: &mut Scope<'_>) -> Result<Option<Value>> {
    let Value::Array(items) = arg else {
        return Err(invalid(op, "expects an array"));
    };
    if matches!(op, "$subtract" | "$divide") && items.len() != 2 {
        return Err(invalid(op, "expects exactly 2 arguments"));
    }

    let mut operands = Vec::with_capacity(items.len());
    for item in items {
        match eval(item, scope)? {
            None | Some(Value::Null) => return Ok(Some(Value::Null)),
            Some(Value::Number(n)) => operands.push(n),
            Some(other) => return Err(invalid(op, format!("expects numbers, got {other}"))),
        }
    }

    let integral = op != "$divide" && operands.iter().all(|n| n.as_i64().is_some());
    if integral {
        let ints = operands.iter().filter_map(Number::as_i64);
        let result = match op {
            "$add" => ints.fold(Some(0i64), |acc, n| acc?.checked_add(n)),
            "$multiply" => ints.fold(Some(1i64), |acc, n| acc?.checked_mul(n)),
            _ => {
                let v: Vec<i64> = ints.collect();
                v[0].checked_sub(v[1])
            }
        };
        if let Some(result) = result {
            return Ok(Some(Value::from(result)));
        }
    }

    let floats: Vec<f64> = operands.iter().filter_map(Number::as_f64).collect();
    let result = match op {
        "$add" => floats.iter().sum(),
        "$multiply" => floats.iter().product(),
        "$subtract" => floats[0] - floats[1],
        _ => {
            if floats[1] == 0.0 {
                return Err(invalid(op, "can't divide by zero"));
            }
            floats[0] / floats[1]
        }
    };
    Ok(Some(
        Number::from_f64(result).map_or(Value::Null, Value::Number),
    ))
}

fn type_name(value: Option<&Value>) -> &'static str {
    match value {
        None => "missing",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "bool",
        Some(Value::String(_)) => "string",
        Some(Value::Object(_)) => "object",
        Some(Value::Array(_)) => "array",
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => "int",
            Some(_) => "long",
            None => "double",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(doc: Value, expr: Value) -> Option<Value> {
        let mut scope = Scope::new(&doc);
        eval(&expr, &mut scope).unwrap()
    }

    #[test]
    fn test_field_paths_and_literals() {
        let doc = json!({ "price": 1200, "role": { "name": "Admin" } });
        assert_eq!(run(doc.clone(), json!("$role.name")), Some(json!("Admin")));
        assert_eq!(run(doc.clone(), json!("$missing")), None);
        assert_eq!(run(doc.clone(), json!("plain")), Some(json!("plain")));
        assert_eq!(
            run(doc, json!({ "a": "$price", "b": "$missing" })),
            Some(json!({ "a": 1200 }))
        );
    }

    #[test]
    fn test_arithmetic_keeps_integers() {
        let doc = json!({ "price": 1200, "stock": 10, "half": 0.5 });
        assert_eq!(
            run(doc.clone(), json!({ "$multiply": ["$price", "$stock"] })),
            Some(json!(12000))
        );
        assert_eq!(
            run(doc.clone(), json!({ "$multiply": ["$price", "$half"] })),
            Some(json!(600.0))
        );
        assert_eq!(
            run(doc, json!({ "$add": ["$price", "$missing"] })),
            Some(Value::Null)
        );
    }

    #[test]
    fn test_map_filter_merge() {
        let doc = json!({
            "posts": [{ "title": "a", "category": "c1" }, { "title": "b", "category": "c9" }],
            "tmp": [{ "_id": "c1", "name": "News" }]
        });
        let expr = json!({ "$map": {
            "input": "$posts",
            "as": "item",
            "in": { "$mergeObjects": ["$$item", { "category": { "$arrayElemAt": [
                { "$filter": {
                    "input": "$tmp",
                    "as": "candidate",
                    "cond": { "$eq": ["$$candidate._id", "$$item.category"] }
                } },
                0
            ] } }] }
        } });
        assert_eq!(
            run(doc, expr),
            Some(json!([
                { "title": "a", "category": { "_id": "c1", "name": "News" } },
                { "title": "b", "category": "c9" }
            ]))
        );
    }

    #[test]
    fn test_cond_type_if_null() {
        let doc = json!({ "role": { "name": "Admin" }, "none": null });
        let is_object = json!({ "$eq": [{ "$type": "$role" }, "object"] });
        assert_eq!(run(doc.clone(), is_object), Some(json!(true)));
        assert_eq!(
            run(doc.clone(), json!({ "$cond": { "if": { "$eq": [{ "$type": "$none" }, "object"] }, "then": 1, "else": "$none" } })),
            Some(Value::Null)
        );
        assert_eq!(
            run(doc.clone(), json!({ "$ifNull": ["$missing", []] })),
            Some(json!([]))
        );
        assert_eq!(
            run(doc, json!({ "$in": ["x", { "$ifNull": ["$none", ["x"]] }] })),
            Some(json!(true))
        );
    }

    #[test]
    fn test_unknown_operator() {
        let doc = json!({});
        let mut scope = Scope::new(&doc);
        let err = eval(&json!({ "$bogus": 1 }), &mut scope).unwrap_err();
        assert!(matches!(err, MemoryError::UnsupportedOperator(op) if op == "$bogus"));
    }
}
