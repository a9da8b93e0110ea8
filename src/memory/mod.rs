//! In-process executor.
//!
//! [`MemoryStore`] keeps collections of JSON documents and evaluates the stage
//! kinds the builder emits, together with the query and expression operators
//! those stages use. It backs the test suite and works as a drop-in store for
//! prototyping.

mod expr;
mod filter;
mod path;

use hashbrown::HashMap;
use mongogate_core::{Direction, Document, FieldMap, Inclusion, Lookup, MongogateError, Stage, Unwind};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::executor::Executor;

/// Failure evaluating a pipeline in memory.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Collection '{collection}' only stores objects, got {value}")]
    NotADocument { collection: String, value: Value },

    #[error("Unsupported expression operator: {0}")]
    UnsupportedOperator(String),

    #[error("Unsupported query operator: {0}")]
    UnsupportedQueryOperator(String),

    #[error("Invalid argument to {op}: {detail}")]
    InvalidArgument { op: String, detail: String },

    #[error("Cannot mix inclusion and exclusion in a projection (field '{0}')")]
    MixedProjection(String),

    #[error(transparent)]
    Pattern(#[from] MongogateError),

    #[error("Invalid regex pattern: {0}")]
    Regex(#[from] fancy_regex::Error),
}

type Result<T> = core::result::Result<T, MemoryError>;

/// Named collections of documents held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: HashMap<String, Vec<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one document to `collection`, creating it if needed.
    pub fn insert(&mut self, collection: &str, doc: impl Into<Value>) -> Result<()> {
        let doc = doc.into();
        if !doc.is_object() {
            return Err(MemoryError::NotADocument {
                collection: collection.to_owned(),
                value: doc,
            });
        }
        self.collections
            .entry_ref(collection)
            .or_default()
            .push(doc);
        Ok(())
    }

    /// Appends every document of `docs` to `collection`.
    pub fn insert_many<I>(&mut self, collection: &str, docs: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        for doc in docs {
            self.insert(collection, doc)?;
        }
        Ok(())
    }

    /// Builder-style [`insert_many`](Self::insert_many).
    pub fn with_collection<I>(mut self, collection: &str, docs: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.insert_many(collection, docs)?;
        Ok(self)
    }

    /// The stored documents of `collection`, empty if it does not exist.
    pub fn documents(&self, collection: &str) -> &[Value] {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Evaluates `pipeline` against `collection` synchronously.
    pub fn run(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Document>> {
        let docs = self.documents(collection).to_vec();
        let out = self.apply(docs, pipeline)?;
        Ok(out
            .into_iter()
            .filter_map(|doc| match doc {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    fn apply(&self, mut docs: Vec<Value>, stages: &[Stage]) -> Result<Vec<Value>> {
        for stage in stages {
            #[cfg(feature = "tracing")]
            tracing::trace!(stage = stage.kind(), rows = docs.len(), "memory stage");

            docs = match stage {
                Stage::Match(query) => {
                    let mut kept = Vec::with_capacity(docs.len());
                    for doc in docs {
                        if filter::matches(&doc, query)? {
                            kept.push(doc);
                        }
                    }
                    kept
                }
                Stage::Sort(keys) => {
                    sort(&mut docs, keys);
                    docs
                }
                Stage::Skip(n) => docs.into_iter().skip(clamp(*n)).collect(),
                Stage::Limit(n) => {
                    docs.truncate(clamp(*n));
                    docs
                }
                Stage::Project(fields) => project(docs, fields)?,
                Stage::Lookup(lookup) => self.lookup(docs, lookup),
                Stage::Unwind(unwind) => unwind_docs(docs, unwind),
                Stage::Set(fields) | Stage::AddFields(fields) => set_fields(docs, fields)?,
                Stage::Unset(field) => {
                    for doc in &mut docs {
                        if let Value::Object(map) = doc {
                            path::remove(map, field);
                        }
                    }
                    docs
                }
                Stage::Facet(branches) => {
                    let mut out = Map::new();
                    for (name, pipeline) in branches.iter() {
                        let rows = self.apply(docs.clone(), pipeline)?;
                        out.insert(name.to_owned(), Value::Array(rows));
                    }
                    vec![Value::Object(out)]
                }
                Stage::Count(field) => {
                    if docs.is_empty() {
                        Vec::new()
                    } else {
                        let mut out = Map::new();
                        out.insert(field.clone(), Value::from(docs.len() as u64));
                        vec![Value::Object(out)]
                    }
                }
            };
        }
        Ok(docs)
    }

    fn lookup(&self, mut docs: Vec<Value>, lookup: &Lookup) -> Vec<Value> {
        let foreign = self.documents(&lookup.from);
        for doc in &mut docs {
            let local = join_keys(doc, &lookup.local_field);
            let joined: Vec<Value> = foreign
                .iter()
                .filter(|candidate| {
                    join_keys(candidate, &lookup.foreign_field)
                        .iter()
                        .any(|key| local.iter().any(|l| path::equals(l, key)))
                })
                .cloned()
                .collect();
            if let Value::Object(map) = doc {
                path::set(map, &lookup.alias, Value::Array(joined));
            }
        }
        docs
    }
}

impl Executor for MemoryStore {
    type Error = MemoryError;

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Stage],
    ) -> impl Future<Output = Result<Vec<Document>>> + Send {
        core::future::ready(self.run(collection, pipeline))
    }
}

fn clamp(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// Join keys at `path`; a document without any matches on `null`.
fn join_keys(doc: &Value, field: &str) -> Vec<Value> {
    let mut keys = Vec::new();
    path::flatten(doc, field, &mut keys);
    if keys.is_empty() {
        keys.push(Value::Null);
    }
    keys
}

fn sort(docs: &mut [Value], keys: &FieldMap<Direction>) {
    docs.sort_by(|a, b| {
        for (field, direction) in keys.iter() {
            let ord = path::compare(
                path::resolve(a, field).as_ref(),
                path::resolve(b, field).as_ref(),
            );
            let ord = match direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord.is_ne() {
                return ord;
            }
        }
        core::cmp::Ordering::Equal
    });
}

fn project(docs: Vec<Value>, fields: &FieldMap<Inclusion>) -> Result<Vec<Value>> {
    let including = fields
        .iter()
        .any(|(field, flag)| field != "_id" && *flag == Inclusion::Include);
    let keep_id = fields.get("_id") != Some(&Inclusion::Exclude);

    if including
        && let Some((field, _)) = fields
            .iter()
            .find(|(field, flag)| *field != "_id" && **flag == Inclusion::Exclude)
    {
        return Err(MemoryError::MixedProjection(field.to_owned()));
    }

    Ok(docs
        .into_iter()
        .map(|doc| {
            let mut src = match doc {
                Value::Object(src) => src,
                other => return other,
            };
            if !including {
                for (field, _) in fields.iter() {
                    path::remove(&mut src, field);
                }
                return Value::Object(src);
            }
            let mut dst = Map::new();
            for key in src.keys() {
                if key == "_id" {
                    if keep_id {
                        path::copy(&src, &mut dst, key);
                    }
                    continue;
                }
                for (field, _) in fields.iter() {
                    let head = field.split_once('.').map_or(field, |(head, _)| head);
                    if head == key.as_str() && field != "_id" {
                        path::copy(&src, &mut dst, field);
                    }
                }
            }
            Value::Object(dst)
        })
        .collect())
}

fn unwind_docs(docs: Vec<Value>, unwind: &Unwind) -> Vec<Value> {
    let field = unwind.field();
    let preserve = unwind.preserve_null_and_empty_arrays;
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match path::resolve(&doc, field) {
            Some(Value::Array(items)) if items.is_empty() => {
                if preserve && let Value::Object(mut map) = doc {
                    path::remove(&mut map, field);
                    out.push(Value::Object(map));
                }
            }
            Some(Value::Array(items)) => {
                for item in items {
                    let mut copy = doc.clone();
                    if let Value::Object(map) = &mut copy {
                        path::set(map, field, item);
                    }
                    out.push(copy);
                }
            }
            None | Some(Value::Null) => {
                if preserve {
                    out.push(doc);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    out
}

/// Every expression sees the document as it was before the stage.
fn set_fields(docs: Vec<Value>, fields: &Document) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        let mut computed = Vec::with_capacity(fields.len());
        {
            let mut scope = expr::Scope::new(&doc);
            for (field, expression) in fields {
                computed.push((field, expr::eval(expression, &mut scope)?));
            }
        }
        let mut doc = doc;
        if let Value::Object(map) = &mut doc {
            for (field, value) in computed {
                match value {
                    Some(value) => path::set(map, field, value),
                    None => path::remove(map, field),
                }
            }
        }
        out.push(doc);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_collection(
                "users",
                [
                    json!({ "_id": "u1", "name": "Alice", "role": "r1", "age": 30 }),
                    json!({ "_id": "u2", "name": "Bob", "role": "r2", "age": 25 }),
                    json!({ "_id": "u3", "name": "Charlie", "age": 35 }),
                ],
            )
            .unwrap()
            .with_collection(
                "roles",
                [json!({ "_id": "r1", "name": "Admin" }), json!({ "_id": "r2", "name": "User" })],
            )
            .unwrap()
    }

    fn names(rows: &[Document]) -> Vec<&str> {
        rows.iter()
            .map(|row| row.get("name").and_then(Value::as_str).unwrap_or(""))
            .collect()
    }

    #[test]
    fn test_insert_rejects_non_objects() {
        let mut store = MemoryStore::new();
        let err = store.insert("users", json!([1, 2])).unwrap_err();
        assert!(matches!(err, MemoryError::NotADocument { ref collection, .. } if collection == "users"));
        assert!(store.documents("users").is_empty());
    }

    #[test]
    fn test_sort_skip_limit() {
        let store = store();
        let pipeline = vec![
            Stage::Sort([("age", Direction::Desc)].into_iter().collect()),
            Stage::Skip(1),
            Stage::Limit(1),
        ];
        let rows = store.run("users", &pipeline).unwrap();
        assert_eq!(names(&rows), ["Alice"]);
    }

    #[test]
    fn test_lookup_and_preserving_unwind() {
        let store = store();
        let pipeline = vec![
            Stage::Lookup(Lookup {
                from: "roles".into(),
                local_field: "role".into(),
                foreign_field: "_id".into(),
                alias: "role".into(),
            }),
            Stage::Unwind(Unwind::preserving("role")),
        ];
        let rows = store.run("users", &pipeline).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["role"], json!({ "_id": "r1", "name": "Admin" }));
        assert_eq!(rows[1]["role"], json!({ "_id": "r2", "name": "User" }));
        assert!(rows[2].get("role").is_none());
    }

    #[test]
    fn test_projection_modes() {
        let store = store();
        let include: FieldMap<Inclusion> = [("name", Inclusion::Include)].into_iter().collect();
        let rows = store.run("users", &[Stage::Project(include)]).unwrap();
        assert_eq!(Value::Object(rows[0].clone()), json!({ "_id": "u1", "name": "Alice" }));

        let exclude: FieldMap<Inclusion> = [("age", Inclusion::Exclude), ("_id", Inclusion::Exclude)]
            .into_iter()
            .collect();
        let rows = store.run("users", &[Stage::Project(exclude)]).unwrap();
        assert_eq!(Value::Object(rows[0].clone()), json!({ "name": "Alice", "role": "r1" }));

        let mixed: FieldMap<Inclusion> = [("name", Inclusion::Include), ("age", Inclusion::Exclude)]
            .into_iter()
            .collect();
        let err = store.run("users", &[Stage::Project(mixed)]).unwrap_err();
        assert!(matches!(err, MemoryError::MixedProjection(field) if field == "age"));
    }

    #[test]
    fn test_count_and_facet() {
        let store = store();
        let rows = store.run("users", &[Stage::Count("total".into())]).unwrap();
        assert_eq!(rows[0]["total"], json!(3));

        let none = vec![
            Stage::Match(json!({ "name": "Nobody" }).as_object().cloned().unwrap()),
            Stage::Count("total".into()),
        ];
        assert!(store.run("users", &none).unwrap().is_empty());

        let mut facet = FieldMap::new();
        facet.insert("data", vec![Stage::Limit(2)]);
        facet.insert("total", vec![Stage::Count("count".into())]);
        let rows = store.run("users", &[Stage::Facet(facet)]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["data"].as_array().map(Vec::len), Some(2));
        assert_eq!(rows[0]["total"], json!([{ "count": 3 }]));
    }

    #[test]
    fn test_set_sees_original_document() {
        let store = store();
        let fields = json!({ "age": { "$add": ["$age", 1] }, "next": { "$add": ["$age", 1] } });
        let rows = store
            .run("users", &[Stage::Set(fields.as_object().cloned().unwrap())])
            .unwrap();
        assert_eq!(rows[0]["age"], json!(31));
        assert_eq!(rows[0]["next"], json!(31));
    }

    #[test]
    fn test_unknown_collection_is_empty() {
        let rows = store().run("ghosts", &[Stage::Limit(5)]).unwrap();
        assert!(rows.is_empty());
    }
}
