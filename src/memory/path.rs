//! Dotted field-path access on JSON documents.

use core::cmp::Ordering;

use serde_json::{Map, Value};

/// Value at `path`, following the store's rules for arrays: a path that
/// crosses an array yields the array of the sub-path's values per element.
pub(super) fn resolve(doc: &Value, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => match doc {
            Value::Object(map) => map.get(path).cloned(),
            Value::Array(items) => Some(Value::Array(
                items.iter().filter_map(|item| resolve(item, path)).collect(),
            )),
            _ => None,
        },
        Some((head, rest)) => match doc {
            Value::Object(map) => map.get(head).and_then(|v| resolve(v, rest)),
            Value::Array(items) => Some(Value::Array(
                items.iter().filter_map(|item| resolve(item, path)).collect(),
            )),
            _ => None,
        },
    }
}

/// Every scalar reachable at `path`, with arrays flattened along the way.
/// Used for key-equality joins.
pub(super) fn flatten(doc: &Value, path: &str, out: &mut Vec<Value>) {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    match doc {
        Value::Array(items) => {
            for item in items {
                flatten(item, path, out);
            }
        }
        Value::Object(map) => match (map.get(head), rest) {
            (Some(Value::Array(items)), None) => out.extend(items.iter().cloned()),
            (Some(value), None) => out.push(value.clone()),
            (Some(value), Some(rest)) => flatten(value, rest, out),
            (None, _) => {}
        },
        _ => {}
    }
}

/// Writes `value` at `path`, creating (or replacing non-object) parents.
pub(super) fn set(doc: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_owned(), value);
        }
        Some((head, rest)) => {
            let slot = doc
                .entry(head.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(inner) = slot {
                set(inner, rest, value);
            }
        }
    }
}

/// Removes `path`, descending into arrays of objects.
pub(super) fn remove(doc: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            doc.shift_remove(path);
        }
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Value::Object(inner)) => remove(inner, rest),
            Some(Value::Array(items)) => {
                for item in items {
                    if let Value::Object(inner) = item {
                        remove(inner, rest);
                    }
                }
            }
            _ => {}
        },
    }
}

/// Copies `path` from `src` into `dst`, keeping the nesting. Arrays of
/// objects are projected element by element.
pub(super) fn copy(src: &Map<String, Value>, dst: &mut Map<String, Value>, path: &str) {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let Some(value) = src.get(head) else {
        return;
    };
    match (value, rest) {
        (_, None) => {
            dst.insert(head.to_owned(), value.clone());
        }
        (Value::Object(inner), Some(rest)) => {
            let slot = dst
                .entry(head.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(out) = slot {
                copy(inner, out, rest);
            }
        }
        (Value::Array(items), Some(rest)) => {
            let objects: Vec<&Map<String, Value>> =
                items.iter().filter_map(Value::as_object).collect();
            let slot = dst
                .entry(head.to_owned())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(out) = slot {
                if out.len() != objects.len() {
                    *out = objects.iter().map(|_| Value::Object(Map::new())).collect();
                }
                for (item, projected) in objects.into_iter().zip(out.iter_mut()) {
                    if let Value::Object(projected) = projected {
                        copy(item, projected, rest);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Canonical type order used by sorts and comparisons: missing, null,
/// numbers, strings, objects, arrays, booleans.
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Object(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Bool(_)) => 6,
    }
}

/// Total order over (possibly missing) values.
pub(super) fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare(Some(l), Some(r));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Some(Value::Object(x)), Some(Value::Object(y))) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y) {
                let ord = lk.cmp(rk).then_with(|| compare(Some(lv), Some(rv)));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Equality that treats `1` and `1.0` as the same number.
pub(super) fn equals(a: &Value, b: &Value) -> bool {
    compare(Some(a), Some(b)) == Ordering::Equal
}
