use serde_json::Value;
use thiserror::Error;

/// Validation failures raised by the fluent builder.
///
/// Every variant is produced before the offending call appends a stage, so a
/// failed call never leaves a half-built pipeline behind.
#[derive(Debug, Error)]
pub enum MongogateError {
    /// Operator token outside the supported comparison table
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// `where()` called with something other than a condition object
    #[error("where() expects a condition object, got {0}")]
    InvalidCondition(Value),

    /// Unknown regex option letter
    #[error("where(): unsupported regex option '{0}'")]
    InvalidPatternOption(char),

    /// `select()` input is neither a string nor a list
    #[error("select() expects a string or an array of field paths, got {0}")]
    InvalidSelection(Value),

    /// `select()` list contains a non-string entry
    #[error("select() expects fields as strings, got {0}")]
    InvalidSelectField(Value),

    /// `orderBy()` called without any field
    #[error("orderBy() requires at least one field")]
    EmptyOrderBy,

    /// `orderBy()` input is not a string, list or object
    #[error("orderBy() expects string, array, or object, got {0}")]
    InvalidOrderBy(Value),

    /// `orderBy()` list contains a non-string entry
    #[error("orderBy() array values must be strings, got {0}")]
    InvalidOrderByField(Value),

    /// `orderBy()` object value is not a recognised direction
    #[error("orderBy() object values must be 1, -1, 'asc', or 'desc' (field '{field}' got {value})")]
    InvalidDirection { field: String, value: Value },

    /// `with()` called with an empty path
    #[error("with() expects a non-empty string path")]
    EmptyPath,

    /// Relationship path deeper than the configured join depth
    #[error("with(): supports up to {max} levels, got '{path}'")]
    DepthExceeded { path: String, max: usize },

    /// Relationship path within the configured depth but deeper than two segments
    #[error("with(): nested joins stop at two levels, got '{0}'")]
    NestingUnsupported(String),

    /// Field unknown to the entity's metadata
    #[error("Path '{path}' not found on {entity} schema")]
    PathNotFound { path: String, entity: String },

    /// Field exists but does not reference another entity
    #[error("Path '{path}' is not a ref on {entity}")]
    NotARelationship { path: String, entity: String },

    /// `addFields()` input is not an object
    #[error("addFields() expects a non-null object, got {0}")]
    InvalidAddFields(Value),
}

/// Result type for builder operations
pub type Result<T> = std::result::Result<T, MongogateError>;
