//! Engine request body assembly.

use serde_json::{Map, Value, json};

use crate::config::GatewayConfig;
use crate::error::{ParseResult, QueryError};
use crate::parser::{build_aggregation, build_sort};
use crate::types::Query;

use super::builder::ACL_FIELD;

/// Index status attribute; hidden unless explicitly requested.
pub const INDEX_STATUS_FIELD: &str = "index.status";

/// Name of the completion suggester.
pub const SUGGESTION_NAME: &str = "autocomplete";

/// Field backing the completion suggester.
pub const SUGGESTION_FIELD: &str = "bagOfWords.autocomplete";

/// Highlight fragment size in characters.
const HIGHLIGHT_FRAGMENT_SIZE: u32 = 200;

/// Highlight fragments per field.
const HIGHLIGHT_FRAGMENTS: u32 = 5;

/// Resolves the page size for a request.
///
/// A missing or zero limit uses the configured default.
pub fn page_size(limit: Option<usize>, config: &GatewayConfig) -> ParseResult<usize> {
    match limit {
        None | Some(0) => Ok(config.default_limit),
        Some(limit) if limit > config.max_limit => Err(QueryError::InvalidLimit {
            message: format!(
                "'limit' must be less than or equal to {}, but was {}",
                config.max_limit, limit
            ),
        }),
        Some(limit) => Ok(limit),
    }
}

/// Checks that an offset page stays inside the result window.
pub fn check_result_window(offset: usize, size: usize, config: &GatewayConfig) -> ParseResult<()> {
    let window = offset.saturating_add(size);
    if window > config.max_offset_window {
        return Err(QueryError::InvalidLimit {
            message: format!(
                "Result window is too large, 'offset' + 'limit' must be less than or equal to: [{}] but was [{}]",
                config.max_offset_window, window
            ),
        });
    }
    Ok(())
}

/// Assembles engine request bodies from a query and its bool clause.
#[derive(Debug, Clone)]
pub struct RequestBodyBuilder<'a> {
    config: &'a GatewayConfig,
}

impl<'a> RequestBodyBuilder<'a> {
    /// Creates a builder using `config` for limits and feature switches.
    pub fn new(config: &'a GatewayConfig) -> Self {
        Self { config }
    }

    /// Builds the request body.
    ///
    /// Sets `query`, `size`, `timeout`, `_source`, and, when requested,
    /// `track_total_hits`, `highlight`, `suggest`, `aggs` and `sort`.
    /// Paging fields (`from`, `pit`, `search_after`) are left to the caller.
    pub fn build(&self, query: &Query, bool_query: Value) -> ParseResult<Map<String, Value>> {
        let mut body = Map::new();
        body.insert("query".to_string(), bool_query);
        body.insert("size".to_string(), json!(page_size(query.limit, self.config)?));
        body.insert(
            "timeout".to_string(),
            json!(format!("{}ms", self.config.timeout().as_millis())),
        );

        if query.track_total_count {
            body.insert("track_total_hits".to_string(), json!(true));
        }

        if let Some(fields) = query.highlighted_fields.as_ref().filter(|f| !f.is_empty()) {
            let per_field: Map<String, Value> = fields
                .iter()
                .map(|field| {
                    (
                        field.clone(),
                        json!({
                            "fragment_size": HIGHLIGHT_FRAGMENT_SIZE,
                            "number_of_fragments": HIGHLIGHT_FRAGMENTS,
                        }),
                    )
                })
                .collect();
            body.insert("highlight".to_string(), json!({ "fields": per_field }));
        }

        body.insert("_source".to_string(), source_filter(query.returned_fields.as_deref()));

        if self.config.autocomplete_enabled
            && let Some(phrase) = query.suggest_phrase.as_deref().filter(|p| !p.is_empty())
        {
            body.insert(
                "suggest".to_string(),
                json!({
                    SUGGESTION_NAME: {
                        "text": phrase,
                        "completion": { "field": SUGGESTION_FIELD, "skip_duplicates": true },
                    }
                }),
            );
        }

        if let Some(aggregate_by) = query.aggregate_by.as_deref().filter(|a| !a.trim().is_empty()) {
            let aggs = build_aggregation(aggregate_by, self.config.aggregation_size)?;
            body.insert("aggs".to_string(), Value::Object(aggs));
        }

        if let Some(sort) = &query.sort {
            body.insert("sort".to_string(), Value::Array(build_sort(sort)?));
        }

        Ok(body)
    }
}

/// Builds the `_source` filter.
///
/// `x-acl` is always excluded; `index.status` only when not requested.
fn source_filter(returned_fields: Option<&[String]>) -> Value {
    let includes = returned_fields.unwrap_or_default();
    let mut excludes = vec![ACL_FIELD];
    if !includes.iter().any(|f| f == INDEX_STATUS_FIELD) {
        excludes.push(INDEX_STATUS_FIELD);
    }
    json!({ "includes": includes, "excludes": excludes })
}
