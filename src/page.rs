use mongogate_core::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One page of results plus the totals needed to render a pager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub data: Vec<Document>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    /// Never below 1, even for an empty result.
    pub total_pages: u64,
}

impl Page {
    pub fn new(data: Vec<Document>, page: u64, per_page: u64, total: u64) -> Self {
        let per_page = per_page.max(1);
        Self {
            data,
            page,
            per_page,
            total,
            total_pages: total.div_ceil(per_page).max(1),
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

/// Reads a count out of a result value. Fractions are truncated, negatives and
/// non-numbers count as zero.
pub(crate) fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        _ => None,
    }
}
