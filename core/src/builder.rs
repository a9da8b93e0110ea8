//! Core `QueryBuilder`: pure pipeline generation, no connection.
//!
//! Fluent calls append to an ordered accumulator (match, sort, lookup,
//! unwind, set, unset, addFields). Projection, skip and limit are held aside
//! and only appended when the pipeline is finalized, in that order.

use hashbrown::HashSet;
use serde_json::Value;

use crate::condition::{self, Operand};
use crate::error::{MongogateError, Result};
use crate::options::Options;
use crate::projection::Selection;
use crate::relation::SchemaLookup;
use crate::resolve::plan_join;
use crate::sort::{SortSpec, push_sort};
use crate::stage::{Direction, FieldMap, Inclusion, Pipeline, Stage};
use crate::{mongogate_trace_join, mongogate_trace_stage};

/// Output field of the `$count` stage used by `count()`.
pub const COUNT_FIELD: &str = "total";
/// Facet branch holding the page rows.
pub const DATA_FACET: &str = "data";
/// Facet branch holding the total count.
pub const TOTAL_FACET: &str = "total";
/// Output field of the `$count` stage inside the total branch.
pub const TOTAL_COUNT_FIELD: &str = "count";

/// Skip/limit applied by a finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

/// Normalized pagination request: both values are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub per_page: u64,
}

impl PageWindow {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1).unsigned_abs(),
            per_page: per_page.max(1).unsigned_abs(),
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

/// Builder bound to one entity.
#[derive(Clone)]
pub struct QueryBuilder<'s> {
    entity: String,
    schema: &'s dyn SchemaLookup,
    options: Options,
    stages: Vec<Stage>,
    projection: Option<FieldMap<Inclusion>>,
    skip: Option<u64>,
    limit: Option<u64>,
    joined: HashSet<String>,
}

impl<'s> QueryBuilder<'s> {
    /// Creates an empty builder for `entity`.
    pub fn new(entity: impl Into<String>, schema: &'s dyn SchemaLookup, options: Options) -> Self {
        Self {
            entity: entity.into(),
            schema,
            options,
            stages: Vec::new(),
            projection: None,
            skip: None,
            limit: None,
            joined: HashSet::new(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn options(&self) -> Options {
        self.options
    }

    pub fn schema(&self) -> &'s dyn SchemaLookup {
        self.schema
    }

    /// Collection backing the bound entity.
    pub fn collection(&self) -> String {
        self.schema.collection_name(&self.entity)
    }

    fn push(&mut self, stage: Stage) {
        mongogate_trace_stage!(self.entity, stage.kind());
        self.stages.push(stage);
    }

    // ---------- WHERE ----------

    /// Adds a `$match` stage whose body is `filter`, verbatim.
    pub fn r#where(mut self, filter: impl Into<Value>) -> Result<Self> {
        let body = condition::compile_filter(filter.into())?;
        self.push(Stage::Match(body));
        Ok(self)
    }

    /// Adds `{field: value}` as a `$match` stage.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let body = condition::compile_equals(field, value.into());
        self.push(Stage::Match(body));
        self
    }

    /// Adds `{field: {op: operand}}` as a `$match` stage.
    ///
    /// `op` is one of `= == != > >= < <= in nin regex`.
    pub fn where_op(
        mut self,
        field: impl Into<String>,
        op: &str,
        operand: impl Into<Operand>,
    ) -> Result<Self> {
        let body = condition::compile_comparison(field, op, operand.into())?;
        self.push(Stage::Match(body));
        Ok(self)
    }

    // ---------- SELECT ----------

    /// Replaces the projection. `-field` excludes, anything else includes.
    ///
    /// An empty selection clears the projection.
    pub fn select(mut self, fields: impl Into<Selection>) -> Self {
        let map = fields.into().compile();
        self.projection = if map.is_empty() { None } else { Some(map) };
        self
    }

    // ---------- SORT / SKIP / LIMIT ----------

    /// Adds a `$sort`, merging into a directly preceding one.
    pub fn order_by(mut self, spec: impl Into<SortSpec>) -> Result<Self> {
        let fields = spec.into().compile()?;
        mongogate_trace_stage!(self.entity, "$sort");
        push_sort(&mut self.stages, fields);
        Ok(self)
    }

    /// Shorthand for `order_by((field, direction))`.
    pub fn order_by_field(mut self, field: &str, direction: Direction) -> Self {
        let mut fields = FieldMap::new();
        fields.insert(field, direction);
        mongogate_trace_stage!(self.entity, "$sort");
        push_sort(&mut self.stages, fields);
        self
    }

    /// Sets the stored skip; the last call wins.
    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Sets the stored limit; the last call wins.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    // ---------- WITH ----------

    /// Joins the relationship at `path` (`field` or `parent.child`).
    ///
    /// Repeating a joined path is a no-op. All metadata is resolved before
    /// any stage is appended, so a failure leaves the builder unchanged.
    pub fn with(mut self, path: &str) -> Result<Self> {
        let plan = plan_join(
            self.schema,
            &self.entity,
            path,
            self.options.max_join_depth.get(),
            &self.joined,
        )?;
        if let Some(plan) = plan {
            mongogate_trace_join!(self.entity, path, plan.stages.len());
            self.stages.extend(plan.stages);
            self.joined.extend(plan.joined);
        }
        Ok(self)
    }

    // ---------- ADD FIELDS ----------

    /// Appends an `$addFields` stage. Expressions pass through uninterpreted.
    pub fn add_fields(mut self, fields: impl Into<Value>) -> Result<Self> {
        match fields.into() {
            Value::Object(body) => {
                self.push(Stage::AddFields(body));
                Ok(self)
            }
            other => Err(MongogateError::InvalidAddFields(other)),
        }
    }

    // ---------- FINALIZE ----------

    /// Accumulated non-deferred stages, in call order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stored skip/limit.
    pub fn window(&self) -> Window {
        Window {
            skip: self.skip,
            limit: self.limit,
        }
    }

    /// Accumulator, then projection, then skip, then limit.
    pub fn finalize(&self, window: Window) -> Pipeline {
        let mut pipeline = self.stages.clone();
        if let Some(projection) = &self.projection {
            pipeline.push(Stage::Project(projection.clone()));
        }
        if let Some(skip) = window.skip {
            pipeline.push(Stage::Skip(skip));
        }
        if let Some(limit) = window.limit {
            pipeline.push(Stage::Limit(limit));
        }
        pipeline
    }

    /// The pipeline `get()` sends.
    pub fn pipeline(&self) -> Pipeline {
        self.finalize(self.window())
    }

    /// The pipeline `first()` sends: stored skip, limit forced to 1.
    pub fn first_pipeline(&self) -> Pipeline {
        self.finalize(Window {
            skip: self.skip,
            limit: Some(1),
        })
    }

    /// The pipeline `count()` sends: accumulator plus `$count`.
    pub fn count_pipeline(&self) -> Pipeline {
        let mut pipeline = self.stages.clone();
        pipeline.push(Stage::Count(COUNT_FIELD.to_owned()));
        pipeline
    }

    /// The single-stage `$facet` pipeline `paginate()` sends.
    pub fn paginate_pipeline(&self, page: PageWindow) -> Pipeline {
        let data = self.finalize(Window {
            skip: Some(page.skip()),
            limit: Some(page.per_page),
        });
        let mut total = self.stages.clone();
        total.push(Stage::Count(TOTAL_COUNT_FIELD.to_owned()));

        let mut facet = FieldMap::new();
        facet.insert(DATA_FACET, data);
        facet.insert(TOTAL_FACET, total);
        vec![Stage::Facet(facet)]
    }
}

impl core::fmt::Debug for QueryBuilder<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("entity", &self.entity)
            .field("options", &self.options)
            .field("stages", &self.stages)
            .field("projection", &self.projection)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}
