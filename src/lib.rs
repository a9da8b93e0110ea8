//! Fluent aggregation-pipeline query builder.
//!
//! ```no_run
//! use mongogate::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Registry::new()
//!     .entity(Entity::new("User").field("name").one("role", "Role").many("posts", "Post"))
//!     .entity(Entity::new("Role").field("name"))
//!     .entity(Entity::new("Post").field("title").one("category", "Category"))
//!     .entity(Entity::new("Category").field("name"));
//!
//! let store = MemoryStore::new();
//! let db = Mongogate::new(schema, store);
//!
//! let page = db
//!     .query("User")
//!     .where_eq("isActive", true)
//!     .with("role")?
//!     .with("posts.category")?
//!     .select(["email", "role.name", "posts.category.name"])
//!     .order_by(("createdAt", Direction::Desc))?
//!     .paginate(1, 10)
//!     .await?;
//! # let _ = page;
//! # Ok(())
//! # }
//! ```

pub mod executor;
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongodb;
pub mod page;
pub mod query;

pub use mongogate_core::{
    Cardinality, Direction, Document, Entity, MongogateError, Operand, Operator, Options, Pattern,
    Pipeline, Registry, RelationshipMetadata, Resolution, Result, SchemaLookup, Selection,
    SortSpec, Stage, pipeline_to_value,
};

pub use executor::Executor;
pub use memory::{MemoryError, MemoryStore};
pub use page::Page;
pub use query::Query;

use mongogate_core::QueryBuilder;

/// Binds a schema lookup and an executor; hands out [`Query`]s.
#[derive(Debug)]
pub struct Mongogate<S, E> {
    schema: S,
    executor: E,
    options: Options,
}

impl<S: SchemaLookup, E: Executor> Mongogate<S, E> {
    /// Creates a factory with default [`Options`].
    pub fn new(schema: S, executor: E) -> Self {
        Self {
            schema,
            executor,
            options: Options::default(),
        }
    }

    /// Replaces the options used by subsequent queries.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> Options {
        self.options
    }

    pub fn schema(&self) -> &S {
        &self.schema
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Starts a query on `entity` with the factory's options.
    pub fn query(&self, entity: &str) -> Query<'_, E> {
        self.query_with(entity, self.options)
    }

    /// Starts a query on `entity` with `options` for this query only.
    pub fn query_with(&self, entity: &str, options: Options) -> Query<'_, E> {
        let builder = QueryBuilder::new(entity, &self.schema, options);
        Query::new(builder, &self.executor)
    }
}

pub mod prelude {
    pub use crate::{
        Direction, Document, Entity, Executor, MemoryStore, Mongogate, MongogateError, Options,
        Page, Pattern, Query, Registry, SchemaLookup,
    };
}
