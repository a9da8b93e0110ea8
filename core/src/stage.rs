//! Pipeline stage model.
//!
//! A [`Stage`] serializes into the single-key record the store's aggregation
//! grammar expects (`{"$match": {...}}`, `{"$lookup": {...}}`, ...), so a
//! [`Pipeline`] can be handed to any executor through serde.

use compact_str::CompactString;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_json::{Map, Value};
use smallvec::SmallVec;

/// An insertion-ordered JSON object.
pub type Document = Map<String, Value>;

/// Ordered sequence of stages. The store runs them strictly in sequence.
pub type Pipeline = Vec<Stage>;

// =============================================================================
// Stage
// =============================================================================

/// One step of an aggregation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stage {
    #[serde(rename = "$match")]
    Match(Document),
    #[serde(rename = "$sort")]
    Sort(FieldMap<Direction>),
    #[serde(rename = "$skip")]
    Skip(u64),
    #[serde(rename = "$limit")]
    Limit(u64),
    #[serde(rename = "$project")]
    Project(FieldMap<Inclusion>),
    #[serde(rename = "$lookup")]
    Lookup(Lookup),
    #[serde(rename = "$unwind")]
    Unwind(Unwind),
    #[serde(rename = "$set")]
    Set(Document),
    #[serde(rename = "$unset")]
    Unset(String),
    #[serde(rename = "$addFields")]
    AddFields(Document),
    #[serde(rename = "$facet")]
    Facet(FieldMap<Pipeline>),
    #[serde(rename = "$count")]
    Count(String),
}

impl Stage {
    /// The stage operator as it appears on the wire.
    pub const fn kind(&self) -> &'static str {
        match self {
            Stage::Match(_) => "$match",
            Stage::Sort(_) => "$sort",
            Stage::Skip(_) => "$skip",
            Stage::Limit(_) => "$limit",
            Stage::Project(_) => "$project",
            Stage::Lookup(_) => "$lookup",
            Stage::Unwind(_) => "$unwind",
            Stage::Set(_) => "$set",
            Stage::Unset(_) => "$unset",
            Stage::AddFields(_) => "$addFields",
            Stage::Facet(_) => "$facet",
            Stage::Count(_) => "$count",
        }
    }

    /// Renders the stage as a JSON value.
    pub fn to_value(&self) -> Value {
        // Keys are always strings and numbers are integral, so this cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Renders a whole pipeline as a JSON array.
pub fn pipeline_to_value(pipeline: &[Stage]) -> Value {
    Value::Array(pipeline.iter().map(Stage::to_value).collect())
}

/// Join against another collection by key equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lookup {
    pub from: String,
    pub local_field: String,
    pub foreign_field: String,
    #[serde(rename = "as")]
    pub alias: String,
}

/// Flattens an array field. `path` carries the `$` field-path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Unwind {
    pub path: String,
    pub preserve_null_and_empty_arrays: bool,
}

impl Unwind {
    /// Unwinds `field`, keeping documents whose array is empty or absent.
    pub fn preserving(field: &str) -> Self {
        let mut path = String::with_capacity(field.len() + 1);
        path.push('$');
        path.push_str(field);
        Self {
            path,
            preserve_null_and_empty_arrays: true,
        }
    }

    /// The unwound field without the `$` prefix.
    pub fn field(&self) -> &str {
        self.path.strip_prefix('$').unwrap_or(&self.path)
    }
}

// =============================================================================
// Directions and inclusion flags
// =============================================================================

/// Sort direction, serialized as `1` / `-1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub const fn as_i32(self) -> i32 {
        match self {
            Direction::Asc => 1,
            Direction::Desc => -1,
        }
    }
}

impl Serialize for Direction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

/// Projection flag, serialized as `1` (include) / `0` (exclude).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Inclusion {
    Include,
    Exclude,
}

impl Serialize for Inclusion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Inclusion::Include => serializer.serialize_u8(1),
            Inclusion::Exclude => serializer.serialize_u8(0),
        }
    }
}

// =============================================================================
// FieldMap
// =============================================================================

/// Small ordered map from field path to value.
///
/// Inserting an existing key replaces the value but keeps the key's original
/// position, which is what sort merging relies on.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMap<V> {
    entries: SmallVec<[(CompactString, V); 4]>,
}

impl<V> FieldMap<V> {
    pub fn new() -> Self {
        Self {
            entries: SmallVec::new(),
        }
    }

    pub fn insert(&mut self, field: impl Into<CompactString>, value: V) {
        let field = field.into();
        match self.entries.iter_mut().find(|(k, _)| *k == field) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((field, value)),
        }
    }

    /// Folds `other` into `self` with `insert` semantics.
    pub fn merge(&mut self, other: FieldMap<V>) {
        for (field, value) in other.entries {
            self.insert(field, value);
        }
    }

    pub fn get(&self, field: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == field)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl<V> Default for FieldMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<CompactString>, V> FromIterator<(K, V)> for FieldMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V: Serialize> Serialize for FieldMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k.as_str(), v)?;
        }
        map.end()
    }
}
