//! Relationship metadata lookup.
//!
//! The resolver never inspects a schema object directly; it asks a
//! [`SchemaLookup`] what a field on an entity points at.

use compact_str::CompactString;
use hashbrown::HashMap;
use heck::ToSnakeCase;

/// Whether a relationship field holds one reference or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Array,
}

/// What a relationship field points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipMetadata {
    pub foreign_entity: String,
    pub cardinality: Cardinality,
}

impl RelationshipMetadata {
    pub fn single(foreign_entity: impl Into<String>) -> Self {
        Self {
            foreign_entity: foreign_entity.into(),
            cardinality: Cardinality::Single,
        }
    }

    pub fn array(foreign_entity: impl Into<String>) -> Self {
        Self {
            foreign_entity: foreign_entity.into(),
            cardinality: Cardinality::Array,
        }
    }
}

/// Outcome of resolving a field on an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Relationship(RelationshipMetadata),
    NotFound,
    NotARelationship,
}

/// Metadata capability injected into the builder.
pub trait SchemaLookup: Send + Sync {
    /// Resolves `field` on `entity`.
    fn resolve(&self, entity: &str, field: &str) -> Resolution;

    /// Collection backing `entity`. Defaults to the pluralized snake_case name.
    fn collection_name(&self, entity: &str) -> String {
        default_collection_name(entity)
    }

    /// Identity field of `entity`'s documents.
    fn identity_field(&self, _entity: &str) -> &str {
        "_id"
    }
}

impl<T: SchemaLookup + ?Sized> SchemaLookup for &T {
    fn resolve(&self, entity: &str, field: &str) -> Resolution {
        (**self).resolve(entity, field)
    }

    fn collection_name(&self, entity: &str) -> String {
        (**self).collection_name(entity)
    }

    fn identity_field(&self, entity: &str) -> &str {
        (**self).identity_field(entity)
    }
}

/// `Role` -> `roles`, `Category` -> `categories`, `BlogPost` -> `blog_posts`.
pub fn default_collection_name(entity: &str) -> String {
    let mut name = entity.to_snake_case();
    if let Some(stem) = name.strip_suffix('y')
        && !stem.ends_with(['a', 'e', 'i', 'o', 'u'])
        && !stem.is_empty()
    {
        name.truncate(stem.len());
        name.push_str("ies");
    } else if name.ends_with('s') || name.ends_with('x') || name.ends_with("ch") || name.ends_with("sh") {
        name.push_str("es");
    } else {
        name.push('s');
    }
    name
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldDef {
    Plain,
    Reference(RelationshipMetadata),
}

/// Declarative description of one entity's fields.
#[derive(Debug, Clone)]
pub struct Entity {
    name: CompactString,
    collection: Option<String>,
    identity: String,
    fields: HashMap<CompactString, FieldDef>,
}

impl Entity {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            collection: None,
            identity: "_id".to_owned(),
            fields: HashMap::new(),
        }
    }

    /// Overrides the derived collection name.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Overrides the identity field (`_id` by default).
    pub fn identity(mut self, field: impl Into<String>) -> Self {
        self.identity = field.into();
        self
    }

    /// Declares a plain, non-relationship field.
    pub fn field(mut self, name: &str) -> Self {
        self.fields.insert(name.into(), FieldDef::Plain);
        self
    }

    /// Declares a single reference to `target`.
    pub fn one(mut self, name: &str, target: &str) -> Self {
        self.fields.insert(
            name.into(),
            FieldDef::Reference(RelationshipMetadata::single(target)),
        );
        self
    }

    /// Declares an array of references to `target`.
    pub fn many(mut self, name: &str, target: &str) -> Self {
        self.fields.insert(
            name.into(),
            FieldDef::Reference(RelationshipMetadata::array(target)),
        );
        self
    }
}

/// Map-backed [`SchemaLookup`].
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entities: HashMap<CompactString, Entity>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, entity: Entity) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }
}

impl SchemaLookup for Registry {
    fn resolve(&self, entity: &str, field: &str) -> Resolution {
        match self.entities.get(entity).and_then(|e| e.fields.get(field)) {
            None => Resolution::NotFound,
            Some(FieldDef::Plain) => Resolution::NotARelationship,
            Some(FieldDef::Reference(meta)) => Resolution::Relationship(meta.clone()),
        }
    }

    fn collection_name(&self, entity: &str) -> String {
        self.entities
            .get(entity)
            .and_then(|e| e.collection.clone())
            .unwrap_or_else(|| default_collection_name(entity))
    }

    fn identity_field(&self, entity: &str) -> &str {
        self.entities
            .get(entity)
            .map(|e| e.identity.as_str())
            .unwrap_or("_id")
    }
}
