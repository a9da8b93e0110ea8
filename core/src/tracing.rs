//! Tracing utilities for pipeline construction and execution.
//!
//! Enable the `tracing` feature to emit events via the `tracing` crate.
//! These macros no-op when the feature is disabled, avoiding `#[cfg]` boilerplate
//! at every call site.

/// Emit a trace-level event when a stage lands in the accumulator.
///
/// ```ignore
/// mongogate_trace_stage!("User", "$match");
/// ```
#[macro_export]
macro_rules! mongogate_trace_stage {
    ($entity:expr, $kind:expr) => {
        #[cfg(feature = "tracing")]
        tracing::trace!(entity = %$entity, stage = $kind, "mongogate.stage");
    };
}

/// Emit a debug-level event for a resolved relationship path and the number
/// of stages it expanded into.
///
/// ```ignore
/// mongogate_trace_join!("User", "posts.category", 4);
/// ```
#[macro_export]
macro_rules! mongogate_trace_join {
    ($entity:expr, $path:expr, $stage_count:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(entity = %$entity, path = %$path, stages = $stage_count, "mongogate.join");
    };
}

/// Emit a debug-level event right before a pipeline is handed to an executor.
///
/// ```ignore
/// mongogate_trace_exec!("users", "paginate", pipeline.len());
/// ```
#[macro_export]
macro_rules! mongogate_trace_exec {
    ($collection:expr, $op:literal, $stage_count:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(collection = %$collection, op = $op, stages = $stage_count, "mongogate.aggregate");
    };
}
