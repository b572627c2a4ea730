//! Engine failure classification.
//!
//! The engine does not distinguish several failure causes structurally, so
//! classification matches known substrings of its error detail. Checks run
//! in a fixed order; the internal-error branch is last.
//!
//! | Order | Signal | Error |
//! |-------|--------|-------|
//! | 1 | 400 with field-type cause | `BadRequest` (sort / aggregation not supported) |
//! | 2 | search context missing | `CursorError::InvalidOrExpired` |
//! | 3 | 404 | `NotFound` |
//! | 4 | too many scroll / PIT contexts | `CursorError::TooManyCursors` |
//! | 5 | 429 | `TooManyRequests` |
//! | 6 | response too large | `ResponseTooLarge` |
//! | 7 | socket or listener timeout | `Timeout` |
//! | 8 | other 400 | `BadRequest` |
//! | 9 | 503 | `Unavailable` |
//! | 10 | anything else | `Internal` |

use std::time::Duration;

use super::{EngineFailure, FailureKind};
use crate::error::{CursorError, EngineError, GatewayError};

/// Message for a sort on a field whose mapping does not support sorting.
pub const SORT_NOT_SUPPORTED: &str = "Sort is not supported for one or more of the requested fields";

/// Message for an aggregation on a field whose mapping does not support it.
pub const AGGREGATION_NOT_SUPPORTED: &str =
    "Aggregations are not supported for one or more of the specified fields";

/// Message for other rejected requests.
pub const DEFAULT_BAD_REQUEST: &str = "Invalid parameters were given on search request";

const FIELD_TYPE_CAUSES: [&str; 2] = [
    "Text fields are not optimised for operations that require per-document field data like aggregations and sorting",
    "can't sort on geo_shape field without using specific sorting feature, like geo_distance",
];

const CONTEXT_MISSING: [&str; 2] = ["No search context found for id", "search_context_missing_exception"];

const TOO_MANY_CONTEXTS: [&str; 2] = [
    "Trying to create too many scroll contexts. Must be less than or equal to:",
    "Trying to create too many Point In Time contexts. Must be less than or equal to:",
];

const RESPONSE_TOO_LARGE: &str = "entity content is too long";

const TIMEOUTS: [&str; 2] = ["listener timeout", "timeout on connection"];

/// What the failed request asked for.
#[derive(Debug, Clone, Copy)]
pub struct FailureContext {
    /// The request sorted.
    pub has_sort: bool,
    /// The request aggregated.
    pub has_aggregation: bool,
    /// The request-scoped timeout.
    pub timeout: Duration,
    /// The response size ceiling in megabytes.
    pub max_response_size_mb: u64,
}

impl FailureContext {
    /// Creates a context for a request without sort or aggregation.
    pub fn new(timeout: Duration, max_response_size_mb: u64) -> Self {
        Self {
            has_sort: false,
            has_aggregation: false,
            timeout,
            max_response_size_mb,
        }
    }

    /// Records whether the request sorted and aggregated.
    pub fn with_request(mut self, has_sort: bool, has_aggregation: bool) -> Self {
        self.has_sort = has_sort;
        self.has_aggregation = has_aggregation;
        self
    }
}

/// Maps an engine failure to a gateway error.
pub fn classify(failure: EngineFailure, ctx: &FailureContext) -> GatewayError {
    let mentions_any = |needles: &[&str]| needles.iter().any(|n| failure.mentions(n));

    if failure.status == Some(400) && mentions_any(&FIELD_TYPE_CAUSES) {
        let message = if ctx.has_sort {
            SORT_NOT_SUPPORTED
        } else if ctx.has_aggregation {
            AGGREGATION_NOT_SUPPORTED
        } else {
            DEFAULT_BAD_REQUEST
        };
        return EngineError::BadRequest {
            message: message.to_string(),
        }
        .into();
    }

    if mentions_any(&CONTEXT_MISSING) {
        return CursorError::InvalidOrExpired.into();
    }

    if failure.status == Some(404) {
        return EngineError::NotFound.into();
    }

    if mentions_any(&TOO_MANY_CONTEXTS) {
        return CursorError::TooManyCursors.into();
    }

    if failure.status == Some(429) {
        return EngineError::TooManyRequests.into();
    }

    if failure.kind == FailureKind::ResponseTooLarge || failure.mentions(RESPONSE_TOO_LARGE) {
        return EngineError::ResponseTooLarge {
            max_mb: ctx.max_response_size_mb,
        }
        .into();
    }

    if failure.kind == FailureKind::Timeout || mentions_any(&TIMEOUTS) {
        return EngineError::Timeout {
            waited: humantime::format_duration(ctx.timeout).to_string(),
        }
        .into();
    }

    match failure.status {
        Some(400) => EngineError::BadRequest {
            message: DEFAULT_BAD_REQUEST.to_string(),
        }
        .into(),
        Some(503) => EngineError::Unavailable.into(),
        _ => EngineError::Internal {
            message: failure.message.clone(),
            source: Some(Box::new(failure)),
        }
        .into(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ctx() -> FailureContext {
        FailureContext::new(Duration::from_secs(60), 100)
    }

    fn status_failure(status: u16, root_cause: &str) -> EngineFailure {
        EngineFailure::from_response(
            status,
            &json!({
                "error": {
                    "root_cause": [{ "reason": root_cause }],
                    "reason": "all shards failed"
                }
            }),
        )
    }

    #[test]
    fn test_field_type_sort() {
        let failure = status_failure(400, FIELD_TYPE_CAUSES[0]);
        let err = classify(failure, &ctx().with_request(true, true));
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), SORT_NOT_SUPPORTED);
    }

    #[test]
    fn test_field_type_aggregation() {
        let failure = status_failure(400, FIELD_TYPE_CAUSES[1]);
        let err = classify(failure, &ctx().with_request(false, true));
        assert_eq!(err.to_string(), AGGREGATION_NOT_SUPPORTED);
    }

    #[test]
    fn test_plain_bad_request() {
        let err = classify(status_failure(400, "failed to parse"), &ctx());
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), DEFAULT_BAD_REQUEST);
    }

    #[test]
    fn test_missing_context_before_not_found() {
        let failure = status_failure(404, "No search context found for id [42]");
        let err = classify(failure, &ctx());
        assert!(matches!(err, GatewayError::Cursor(CursorError::InvalidOrExpired)));
    }

    #[test]
    fn test_not_found() {
        let err = classify(status_failure(404, "no such index [x]"), &ctx());
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_too_many_scroll_contexts() {
        let failure = status_failure(
            500,
            "Trying to create too many scroll contexts. Must be less than or equal to: [500]",
        );
        let err = classify(failure, &ctx());
        assert!(matches!(err, GatewayError::Cursor(CursorError::TooManyCursors)));
        assert_eq!(err.status_code(), 429);
    }

    #[test]
    fn test_rate_limited() {
        assert_eq!(classify(status_failure(429, "rejected"), &ctx()).status_code(), 429);
    }

    #[test]
    fn test_response_too_large() {
        let err = classify(EngineFailure::response_too_large("body over limit"), &ctx());
        assert_eq!(err.status_code(), 413);
        assert_eq!(err.to_string(), "Elasticsearch response is too long, max is 100Mb");
    }

    #[test]
    fn test_timeouts() {
        let err = classify(EngineFailure::timeout("elapsed"), &ctx());
        assert_eq!(err.status_code(), 504);
        assert_eq!(err.to_string(), "Request timed out after waiting for 1m");

        let err = classify(
            EngineFailure::transport("listener timeout after waiting for [60000] ms"),
            &ctx(),
        );
        assert_eq!(err.status_code(), 504);
    }

    #[test]
    fn test_unavailable_and_internal() {
        assert_eq!(classify(status_failure(503, "x"), &ctx()).status_code(), 503);
        let err = classify(EngineFailure::transport("connection refused"), &ctx());
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), "Error processing search request");
    }
}
