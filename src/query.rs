//! Executable query: a [`QueryBuilder`] bound to an [`Executor`].

use mongogate_core::builder::{
    COUNT_FIELD, DATA_FACET, PageWindow, TOTAL_COUNT_FIELD, TOTAL_FACET,
};
use mongogate_core::{
    Direction, Document, Operand, Pipeline, QueryBuilder, Result, Selection, SortSpec,
    mongogate_trace_exec,
};
use serde_json::Value;

use crate::executor::Executor;
use crate::page::{Page, as_count};

/// Fluent query over one entity.
///
/// Mutating calls consume and return the query. Terminal calls borrow it,
/// so the same accumulated stages can be executed more than once.
#[derive(Debug)]
pub struct Query<'a, E> {
    builder: QueryBuilder<'a>,
    executor: &'a E,
    collection: String,
}

impl<'a, E: Executor> Query<'a, E> {
    pub(crate) fn new(builder: QueryBuilder<'a>, executor: &'a E) -> Self {
        let collection = builder.collection();
        Self {
            builder,
            executor,
            collection,
        }
    }

    /// The underlying pure builder.
    pub fn builder(&self) -> &QueryBuilder<'a> {
        &self.builder
    }

    /// Collection the pipeline runs against.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn map<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder<'a>) -> QueryBuilder<'a>,
    {
        Self {
            builder: f(self.builder),
            ..self
        }
    }

    fn try_map<F>(self, f: F) -> Result<Self>
    where
        F: FnOnce(QueryBuilder<'a>) -> Result<QueryBuilder<'a>>,
    {
        Ok(Self {
            builder: f(self.builder)?,
            ..self
        })
    }

    // ---------- FLUENT ----------

    /// `$match` on a condition object.
    pub fn r#where(self, filter: impl Into<Value>) -> Result<Self> {
        self.try_map(|b| b.r#where(filter))
    }

    /// `$match` on `{field: value}`.
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.map(|b| b.where_eq(field, value))
    }

    /// `$match` on `{field: {op: operand}}`.
    pub fn where_op(
        self,
        field: impl Into<String>,
        op: &str,
        operand: impl Into<Operand>,
    ) -> Result<Self> {
        self.try_map(|b| b.where_op(field, op, operand))
    }

    /// Replaces the projection.
    pub fn select(self, fields: impl Into<Selection>) -> Self {
        self.map(|b| b.select(fields))
    }

    /// Adds or extends a `$sort`.
    pub fn order_by(self, spec: impl Into<SortSpec>) -> Result<Self> {
        self.try_map(|b| b.order_by(spec))
    }

    /// Adds or extends a `$sort` on a single field.
    pub fn order_by_field(self, field: &str, direction: Direction) -> Self {
        self.map(|b| b.order_by_field(field, direction))
    }

    pub fn skip(self, n: u64) -> Self {
        self.map(|b| b.skip(n))
    }

    pub fn limit(self, n: u64) -> Self {
        self.map(|b| b.limit(n))
    }

    /// Joins a relationship path.
    pub fn with(self, path: &str) -> Result<Self> {
        self.try_map(|b| b.with(path))
    }

    /// Appends an `$addFields` stage.
    pub fn add_fields(self, fields: impl Into<Value>) -> Result<Self> {
        self.try_map(|b| b.add_fields(fields))
    }

    /// The pipeline `get()` would send.
    pub fn pipeline(&self) -> Pipeline {
        self.builder.pipeline()
    }

    pub fn first_pipeline(&self) -> Pipeline {
        self.builder.first_pipeline()
    }

    pub fn count_pipeline(&self) -> Pipeline {
        self.builder.count_pipeline()
    }

    /// The `$facet` pipeline `paginate(page, per_page)` would send.
    pub fn paginate_pipeline(&self, page: i64, per_page: i64) -> Pipeline {
        self.builder.paginate_pipeline(PageWindow::new(page, per_page))
    }

    // ---------- EXECUTION ----------

    /// Runs the finalized pipeline and returns every row.
    pub async fn get(&self) -> core::result::Result<Vec<Document>, E::Error> {
        let pipeline = self.builder.pipeline();
        mongogate_trace_exec!(self.collection, "get", pipeline.len());
        self.executor.aggregate(&self.collection, &pipeline).await
    }

    /// Runs with the limit forced to 1 for this call only.
    pub async fn first(&self) -> core::result::Result<Option<Document>, E::Error> {
        let pipeline = self.builder.first_pipeline();
        mongogate_trace_exec!(self.collection, "first", pipeline.len());
        let rows = self.executor.aggregate(&self.collection, &pipeline).await?;
        Ok(rows.into_iter().next())
    }

    /// Counts the documents that survive the accumulated stages.
    pub async fn count(&self) -> core::result::Result<u64, E::Error> {
        let pipeline = self.builder.count_pipeline();
        mongogate_trace_exec!(self.collection, "count", pipeline.len());
        let rows = self.executor.aggregate(&self.collection, &pipeline).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get(COUNT_FIELD))
            .and_then(as_count)
            .unwrap_or(0))
    }

    /// Fetches one page and the total in a single round trip.
    ///
    /// `page` and `per_page` below 1 are raised to 1.
    pub async fn paginate(&self, page: i64, per_page: i64) -> core::result::Result<Page, E::Error> {
        let window = PageWindow::new(page, per_page);
        let pipeline = self.builder.paginate_pipeline(window);
        mongogate_trace_exec!(self.collection, "paginate", pipeline.len());
        let rows = self.executor.aggregate(&self.collection, &pipeline).await?;

        let facet = rows.into_iter().next().unwrap_or_default();
        let data = match facet.get(DATA_FACET) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect(),
            _ => Vec::new(),
        };
        let total = facet.get(TOTAL_FACET).and_then(read_total).unwrap_or(0);

        Ok(Page::new(data, window.page, window.per_page, total))
    }
}

/// The total branch yields `[{count: n}]`, or nothing when no document matched.
fn read_total(value: &Value) -> Option<u64> {
    match value {
        Value::Array(rows) => rows
            .first()
            .and_then(|row| row.get(TOTAL_COUNT_FIELD))
            .and_then(as_count),
        other => as_count(other),
    }
}
