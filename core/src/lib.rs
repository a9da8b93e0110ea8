//! Pipeline generation core for mongogate.
//!
//! Compiles fluent builder calls into an ordered list of aggregation
//! [`Stage`]s. Nothing in this crate talks to a store; see the `mongogate`
//! crate for execution.

pub mod builder;
pub mod condition;
pub mod error;
pub mod options;
pub mod projection;
pub mod relation;
pub mod resolve;
pub mod sort;
pub mod stage;
pub mod tracing;

// Re-export key types
pub use builder::{PageWindow, QueryBuilder, Window};
pub use condition::{Operand, Operator, Pattern};
pub use error::{MongogateError, Result};
pub use options::Options;
pub use projection::Selection;
pub use relation::{
    Cardinality, Entity, Registry, RelationshipMetadata, Resolution, SchemaLookup,
    default_collection_name,
};
pub use sort::SortSpec;
pub use stage::{Direction, Document, FieldMap, Inclusion, Lookup, Pipeline, Stage, Unwind, pipeline_to_value};
