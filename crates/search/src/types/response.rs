//! Search response types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single result: the returned fields of one document.
pub type Document = Map<String, Value>;

/// One aggregation bucket, in engine bucket order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationResponse {
    /// Bucket key.
    pub key: String,
    /// Document count.
    pub count: u64,
}

impl AggregationResponse {
    /// Creates a bucket.
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }
}

/// The response to a plain or cursor query.
///
/// `cursor` is set only by cursor queries that have more pages to offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// Cursor for the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,

    /// Results in ranking order.
    #[serde(default)]
    pub results: Vec<Document>,

    /// Total matching documents.
    #[serde(default)]
    pub total_count: u64,

    /// Aggregation buckets, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Vec<AggregationResponse>>,

    /// Autocomplete suggestions, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase_suggestions: Option<Vec<String>>,
}

/// Response type of cursor queries.
pub type CursorQueryResponse = QueryResponse;

impl QueryResponse {
    /// An empty response with a zero total.
    pub fn empty() -> Self {
        Self::default()
    }

    /// An empty page that still reports `total_count`.
    pub fn empty_with_total(total_count: u64) -> Self {
        Self {
            total_count,
            ..Self::default()
        }
    }

    /// Sets the results.
    pub fn with_results(mut self, results: Vec<Document>) -> Self {
        self.results = results;
        self
    }

    /// Sets the total count.
    pub fn with_total(mut self, total_count: u64) -> Self {
        self.total_count = total_count;
        self
    }

    /// Sets the cursor.
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Returns the number of results on this page.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if this page has no results.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
