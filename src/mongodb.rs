//! Executor for a live MongoDB database.
//!
//! Stages are rendered as relaxed extended JSON and converted to BSON, so
//! patterns (`$regularExpression`) arrive as native regexes. Result
//! documents come back the same way in reverse.

use ::bson::{Bson, Document as BsonDocument};
use ::mongodb::Database;
use futures_util::TryStreamExt;
use mongogate_core::{Document, Stage, mongogate_trace_exec};
use serde_json::Value;
use thiserror::Error;

use crate::executor::Executor;

#[derive(Debug, Error)]
pub enum MongoError {
    #[error(transparent)]
    Driver(#[from] ::mongodb::error::Error),

    #[error("Stage {kind} could not be converted to BSON: {source}")]
    Conversion {
        kind: &'static str,
        #[source]
        source: ::bson::extjson::de::Error,
    },

    #[error("Stage {0} did not render as a document")]
    NotADocument(&'static str),
}

/// Converts one stage into the driver's document type.
pub fn stage_to_bson(stage: &Stage) -> Result<BsonDocument, MongoError> {
    let kind = stage.kind();
    match Bson::try_from(stage.to_value()) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(_) => Err(MongoError::NotADocument(kind)),
        Err(source) => Err(MongoError::Conversion { kind, source }),
    }
}

fn to_document(doc: BsonDocument) -> Document {
    match Bson::Document(doc).into_relaxed_extjson() {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

impl Executor for Database {
    type Error = MongoError;

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Stage],
    ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send {
        let stages: Result<Vec<BsonDocument>, MongoError> =
            pipeline.iter().map(stage_to_bson).collect();
        let collection = self.collection::<BsonDocument>(collection);

        async move {
            let stages = stages?;
            mongogate_trace_exec!(collection.name(), "aggregate", stages.len());
            let cursor = collection.aggregate(stages).await?;
            let rows: Vec<BsonDocument> = cursor.try_collect().await?;
            Ok(rows.into_iter().map(to_document).collect())
        }
    }
}
