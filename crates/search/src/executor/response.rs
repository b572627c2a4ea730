//! Engine response extraction.

use serde_json::{Map, Value};

use crate::parser::{NESTED_AGGREGATION, TERMS_AGGREGATION};
use crate::query::ACL_FIELD;
use crate::query::request::SUGGESTION_NAME;
use crate::types::{AggregationResponse, Document, QueryResponse};

/// Name of the per-result field holding highlight fragments.
pub const HIGHLIGHT_FIELD: &str = "highlight";

/// Converts a search response into a [`QueryResponse`] without cursor.
pub fn parse_response(body: &Value) -> QueryResponse {
    QueryResponse {
        cursor: None,
        results: hits(body).iter().map(to_document).collect(),
        total_count: total_hits(body),
        aggregations: body.get("aggregations").and_then(aggregation_buckets),
        phrase_suggestions: phrase_suggestions(body),
    }
}

/// Returns the raw hits of a search response.
pub fn hits(body: &Value) -> &[Value] {
    body["hits"]["hits"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Returns the total hit count, accepting both the object and the legacy
/// numeric form.
pub fn total_hits(body: &Value) -> u64 {
    let total = &body["hits"]["total"];
    total["value"].as_u64().or_else(|| total.as_u64()).unwrap_or(0)
}

fn to_document(hit: &Value) -> Document {
    let mut document = match &hit["_source"] {
        Value::Object(source) => source.clone(),
        _ => Map::new(),
    };

    if let Some(highlight) = hit["highlight"].as_object() {
        let fragments: Map<String, Value> = highlight
            .iter()
            .filter(|(field, _)| field.as_str() != ACL_FIELD)
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        if !fragments.is_empty() {
            document.insert(HIGHLIGHT_FIELD.to_string(), Value::Object(fragments));
        }
    }

    document
}

/// Reads terms buckets through any depth of nested wrappers.
fn aggregation_buckets(aggregations: &Value) -> Option<Vec<AggregationResponse>> {
    let mut level = aggregations;
    loop {
        if let Some(buckets) = level[TERMS_AGGREGATION]["buckets"].as_array() {
            return Some(buckets.iter().filter_map(bucket).collect());
        }
        level = level.get(NESTED_AGGREGATION)?;
    }
}

fn bucket(bucket: &Value) -> Option<AggregationResponse> {
    let key = match bucket.get("key_as_string").or_else(|| bucket.get("key"))? {
        Value::String(key) => key.clone(),
        other => other.to_string(),
    };
    let count = bucket["doc_count"].as_u64().unwrap_or(0);
    Some(AggregationResponse::new(key, count))
}

fn phrase_suggestions(body: &Value) -> Option<Vec<String>> {
    let entries = body["suggest"][SUGGESTION_NAME].as_array()?;
    Some(
        entries
            .iter()
            .filter_map(|entry| entry["options"].as_array())
            .flatten()
            .filter_map(|option| option["text"].as_str().map(str::to_string))
            .collect(),
    )
}
