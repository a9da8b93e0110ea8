use mongogate_core::{Document, Stage};

/// The store-side aggregation facility.
///
/// Receives the collection backing the bound entity and a finalized stage
/// sequence, and resolves to the result rows. Errors are handed back to the
/// caller untouched.
pub trait Executor: Sync {
    /// Driver-specific failure (connectivity, stage evaluation, ...).
    type Error;

    /// Runs `pipeline` against `collection`. Called exactly once per terminal
    /// operation.
    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Stage],
    ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send;
}

impl<E: Executor> Executor for &E {
    type Error = E::Error;

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Stage],
    ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send {
        (**self).aggregate(collection, pipeline)
    }
}
