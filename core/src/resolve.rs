//! Relationship resolver: expands `with()` paths into join stages.
//!
//! A one-segment path becomes a `$lookup` (plus a preserving `$unwind` for
//! single references). A two-segment path joins the parent the same way,
//! pulls the children into a temporary alias, folds them back into the parent
//! with a `$set`, then drops the alias.

use hashbrown::HashSet;
use serde_json::{Map, Value, json};
use smallvec::SmallVec;

use crate::error::{MongogateError, Result};
use crate::relation::{Cardinality, RelationshipMetadata, Resolution, SchemaLookup};
use crate::stage::{Lookup, Stage, Unwind};

/// Deepest path the reshaping stages know how to express.
const MAX_NESTING: usize = 2;

const ITEM_VAR: &str = "item";
const CANDIDATE_VAR: &str = "candidate";

/// Stages for one `with()` call, computed before anything is appended.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPlan {
    pub stages: Vec<Stage>,
    /// Paths that count as joined once the plan is applied.
    pub joined: SmallVec<[String; 2]>,
}

/// Alias holding the child documents of `parent.child` until they are merged.
pub fn temp_alias(parent: &str, child: &str) -> String {
    format!("{parent}_{child}__join")
}

/// Resolves every piece of metadata `path` needs and returns the stages to
/// append, or `None` when the path was joined already.
pub fn plan_join(
    schema: &dyn SchemaLookup,
    entity: &str,
    path: &str,
    max_depth: usize,
    joined: &HashSet<String>,
) -> Result<Option<JoinPlan>> {
    let segments: SmallVec<[&str; 2]> = path.split('.').collect();
    if path.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(MongogateError::EmptyPath);
    }
    if segments.len() > max_depth {
        return Err(MongogateError::DepthExceeded {
            path: path.to_owned(),
            max: max_depth,
        });
    }
    if segments.len() > MAX_NESTING {
        return Err(MongogateError::NestingUnsupported(path.to_owned()));
    }
    if joined.contains(path) {
        return Ok(None);
    }

    let parent = segments[0];
    let parent_meta = require(schema, entity, parent)?;
    let child = match segments.get(1) {
        Some(child) => Some((*child, require(schema, &parent_meta.foreign_entity, child)?)),
        None => None,
    };

    let mut stages = Vec::with_capacity(5);
    if !joined.contains(parent) {
        push_direct(schema, parent, &parent_meta, &mut stages);
    }
    if let Some((child, child_meta)) = &child {
        push_nested(schema, parent, &parent_meta, child, child_meta, &mut stages);
    }

    let mut marks = SmallVec::new();
    marks.push(parent.to_owned());
    if child.is_some() {
        marks.push(path.to_owned());
    }
    Ok(Some(JoinPlan {
        stages,
        joined: marks,
    }))
}

fn require(schema: &dyn SchemaLookup, entity: &str, field: &str) -> Result<RelationshipMetadata> {
    match schema.resolve(entity, field) {
        Resolution::Relationship(meta) => Ok(meta),
        Resolution::NotFound => Err(MongogateError::PathNotFound {
            path: field.to_owned(),
            entity: entity.to_owned(),
        }),
        Resolution::NotARelationship => Err(MongogateError::NotARelationship {
            path: field.to_owned(),
            entity: entity.to_owned(),
        }),
    }
}

fn push_direct(
    schema: &dyn SchemaLookup,
    field: &str,
    meta: &RelationshipMetadata,
    stages: &mut Vec<Stage>,
) {
    stages.push(Stage::Lookup(Lookup {
        from: schema.collection_name(&meta.foreign_entity),
        local_field: field.to_owned(),
        foreign_field: schema.identity_field(&meta.foreign_entity).to_owned(),
        alias: field.to_owned(),
    }));
    if meta.cardinality == Cardinality::Single {
        stages.push(Stage::Unwind(Unwind::preserving(field)));
    }
}

fn push_nested(
    schema: &dyn SchemaLookup,
    parent: &str,
    parent_meta: &RelationshipMetadata,
    child: &str,
    child_meta: &RelationshipMetadata,
    stages: &mut Vec<Stage>,
) {
    let alias = temp_alias(parent, child);
    let identity = schema.identity_field(&child_meta.foreign_entity);

    stages.push(Stage::Lookup(Lookup {
        from: schema.collection_name(&child_meta.foreign_entity),
        local_field: format!("{parent}.{child}"),
        foreign_field: identity.to_owned(),
        alias: alias.clone(),
    }));

    let reshaped = match parent_meta.cardinality {
        Cardinality::Array => merge_into_elements(parent, child, child_meta.cardinality, &alias, identity),
        Cardinality::Single => merge_into_object(parent, child, child_meta.cardinality, &alias),
    };
    let mut set = Map::new();
    set.insert(parent.to_owned(), reshaped);
    stages.push(Stage::Set(set));
    stages.push(Stage::Unset(alias));
}

/// Per element of the parent array, merge the matching child document(s) in
/// under `child`. Array length and order are preserved; unmatched elements
/// keep their reference untouched.
fn merge_into_elements(
    parent: &str,
    child: &str,
    child_card: Cardinality,
    alias: &str,
    identity: &str,
) -> Value {
    let candidate_id = format!("$${CANDIDATE_VAR}.{identity}");
    let element_ref = format!("$${ITEM_VAR}.{child}");
    let matches = match child_card {
        Cardinality::Single => json!({
            "$arrayElemAt": [
                { "$filter": {
                    "input": format!("${alias}"),
                    "as": CANDIDATE_VAR,
                    "cond": { "$eq": [candidate_id, element_ref] }
                } },
                0
            ]
        }),
        Cardinality::Array => json!({
            "$filter": {
                "input": format!("${alias}"),
                "as": CANDIDATE_VAR,
                "cond": { "$in": [candidate_id, { "$ifNull": [element_ref, []] }] }
            }
        }),
    };

    let mut patch = Map::new();
    patch.insert(child.to_owned(), matches);
    json!({
        "$map": {
            "input": format!("${parent}"),
            "as": ITEM_VAR,
            "in": { "$mergeObjects": [format!("$${ITEM_VAR}"), Value::Object(patch)] }
        }
    })
}

/// Merge the child document(s) into the parent object. A null or absent
/// parent is left alone.
fn merge_into_object(parent: &str, child: &str, child_card: Cardinality, alias: &str) -> Value {
    let matches = match child_card {
        Cardinality::Single => json!({ "$arrayElemAt": [format!("${alias}"), 0] }),
        Cardinality::Array => Value::String(format!("${alias}")),
    };

    let mut patch = Map::new();
    patch.insert(child.to_owned(), matches);
    let parent_ref = format!("${parent}");
    json!({
        "$cond": {
            "if": { "$eq": [{ "$type": parent_ref }, "object"] },
            "then": { "$mergeObjects": [parent_ref, Value::Object(patch)] },
            "else": parent_ref
        }
    })
}
