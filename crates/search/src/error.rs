//! Error types for the search gateway.
//!
//! Every failure surfaces to the caller as a [`GatewayError`]. The categories
//! below mirror the order in which failures are resolved: expression syntax
//! first, then cursor state, then whatever the engine reports.
//!
//! | Category | Typical status |
//! |----------|----------------|
//! | [`QueryError`] | 400 |
//! | [`CursorError`] | 400 / 403 / 429 |
//! | [`EngineError`] | 400 / 404 / 413 / 429 / 500 / 503 / 504 |
//! | [`TenantError`] | 400 / 403 |
//! | [`AuthorizationError`] | 500 |
//!
//! Nothing in this crate retries; a mapped error is returned as-is.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::tenant::TenantId;

/// Expected shape reported for malformed nested sort expressions.
pub const BAD_SORT_MESSAGE: &str = "Must be in format: nested(<path>, <field>, <mode>) OR nested(<parent_path>, .....nested(<child_path>, <field>, <mode>))";

/// Expected shape reported for malformed nested aggregation expressions.
pub const BAD_AGGREGATION_MESSAGE: &str = "Must be in format: nested(<path>, <field>) OR nested(<parent_path>, .....nested(<child_path>, <field>))";

/// The primary error type for all gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Request expression and parameter errors
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Cursor lifecycle errors
    #[error(transparent)]
    Cursor(#[from] CursorError),

    /// Errors reported by the search engine
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Tenant resolution errors
    #[error(transparent)]
    Tenant(#[from] TenantError),

    /// Authorization filter errors
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
}

/// Errors in the request itself: expression syntax, sort, spatial filter, paging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Unbalanced parentheses or unrecognized nested grammar in a query expression.
    #[error("{message}")]
    MalformedQuery { message: String },

    /// Nested sort expression does not match the expected grammar.
    #[error("Malformed nested sort : {fragment}. {BAD_SORT_MESSAGE}")]
    MalformedSort { fragment: String },

    /// Sort filter does not resolve to a single nested clause.
    #[error("Top level sort filter must be in nested context : {filter}. {BAD_SORT_MESSAGE}")]
    SortFilterNotNested { filter: String },

    /// Sort request is structurally invalid (for example field/order count mismatch).
    #[error("{message}")]
    InvalidSort { message: String },

    /// Nested aggregation expression does not match the expected grammar.
    #[error("Malformed nested aggregation : {fragment}. {BAD_AGGREGATION_MESSAGE}")]
    MalformedAggregation { fragment: String },

    /// Spatial filter geometry is invalid.
    #[error("{message}")]
    InvalidSpatialFilter { message: String },

    /// Spatial filter cannot be evaluated against the field's mapped geometry type.
    #[error("{message}")]
    UnsupportedSpatialQuery { message: String },

    /// Page size or offset outside the configured bounds.
    #[error("{message}")]
    InvalidLimit { message: String },
}

/// Errors in cursor lookup and ownership.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    /// The token is unknown to the cursor cache, or the engine no longer holds its context.
    #[error("The given cursor is invalid or expired")]
    InvalidOrExpired,

    /// The token belongs to a different user.
    #[error("cursor sharing is forbidden")]
    SharingForbidden,

    /// The engine refused to open another scroll or point-in-time context.
    #[error("Too many cursor requests, please re-try after some time.")]
    TooManyCursors,
}

/// Errors reported by the search engine, already classified.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine rejected the request parameters.
    #[error("{message}")]
    BadRequest { message: String },

    /// The target index or resource does not exist.
    #[error("Resource you are trying to find does not exists")]
    NotFound,

    /// Admission control or rate limiting.
    #[error("Too many requests, please re-try after some time")]
    TooManyRequests,

    /// The engine response exceeded the configured size ceiling.
    #[error("Elasticsearch response is too long, max is {max_mb}Mb")]
    ResponseTooLarge { max_mb: u64 },

    /// The engine is temporarily unavailable.
    #[error("Please re-try search after some time.")]
    Unavailable,

    /// Socket or listener timeout.
    #[error("Request timed out after waiting for {waited}")]
    Timeout { waited: String },

    /// Any other engine or client failure.
    #[error("Error processing search request")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Errors resolving the tenants a request targets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TenantError {
    /// No cluster settings are known for the tenant.
    #[error("unable to resolve cluster settings for tenant {tenant_id}")]
    Unresolvable { tenant_id: TenantId },

    /// The partition header was empty.
    #[error("no data partition was specified")]
    EmptyPartitionList,

    /// More than one tenant was requested while cross-tenant search is disabled.
    #[error("cross-tenant search is disabled, {count} data partitions were requested")]
    CrossTenantDisabled { count: usize },
}

/// Errors producing the authorization clause.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The policy collaborator could not provide a compiled policy.
    #[error("unable to obtain compiled search policy: {message}")]
    PolicyUnavailable { message: String },
}

impl GatewayError {
    /// Returns the HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Query(_) => 400,
            GatewayError::Cursor(e) => match e {
                CursorError::InvalidOrExpired => 400,
                CursorError::SharingForbidden => 403,
                CursorError::TooManyCursors => 429,
            },
            GatewayError::Engine(e) => match e {
                EngineError::BadRequest { .. } => 400,
                EngineError::NotFound => 404,
                EngineError::TooManyRequests => 429,
                EngineError::ResponseTooLarge { .. } => 413,
                EngineError::Unavailable => 503,
                EngineError::Timeout { .. } => 504,
                EngineError::Internal { .. } => 500,
            },
            GatewayError::Tenant(e) => match e {
                TenantError::CrossTenantDisabled { .. } => 403,
                _ => 400,
            },
            GatewayError::Authorization(_) => 500,
        }
    }

    /// Returns a short title for the error, suitable for an error response `reason`.
    pub fn reason(&self) -> &'static str {
        match self {
            GatewayError::Query(e) => match e {
                QueryError::MalformedQuery { .. } => "Malformed query",
                QueryError::MalformedSort { .. }
                | QueryError::SortFilterNotNested { .. }
                | QueryError::InvalidSort { .. } => "Bad sort",
                QueryError::MalformedAggregation { .. } => "Bad aggregation format",
                QueryError::InvalidSpatialFilter { .. }
                | QueryError::UnsupportedSpatialQuery { .. }
                | QueryError::InvalidLimit { .. } => "Bad Request",
            },
            GatewayError::Cursor(e) => match e {
                CursorError::InvalidOrExpired => "Can't find the given cursor",
                CursorError::SharingForbidden => "cursor issuer doesn't match the cursor consumer",
                CursorError::TooManyCursors => "Too many requests",
            },
            GatewayError::Engine(e) => match e {
                EngineError::BadRequest { .. } => "Bad Request",
                EngineError::NotFound => "Not Found",
                EngineError::TooManyRequests => "Too many requests",
                EngineError::ResponseTooLarge { .. } => "Response is too long",
                EngineError::Unavailable | EngineError::Timeout { .. } | EngineError::Internal { .. } => {
                    "Search error"
                }
            },
            GatewayError::Tenant(_) => "Invalid data partition",
            GatewayError::Authorization(_) => "Search error",
        }
    }

    /// Returns `true` when the error is attributable to the caller.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

/// Builds an internal engine error with a message and no source.
pub(crate) fn internal_error(message: impl Into<String>) -> GatewayError {
    GatewayError::Engine(EngineError::Internal {
        message: message.into(),
        source: None,
    })
}

/// Builds a malformed-query error.
pub(crate) fn malformed_query(message: impl Into<String>) -> QueryError {
    QueryError::MalformedQuery {
        message: message.into(),
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type for expression parsing.
pub type ParseResult<T> = Result<T, QueryError>;

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Engine(EngineError::Internal {
            message: format!("serialization error: {}", err),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_errors_have_distinct_status() {
        let missing = GatewayError::from(CursorError::InvalidOrExpired);
        let forbidden = GatewayError::from(CursorError::SharingForbidden);
        assert_eq!(missing.status_code(), 400);
        assert_eq!(forbidden.status_code(), 403);
        assert_eq!(missing.to_string(), "The given cursor is invalid or expired");
        assert_eq!(forbidden.to_string(), "cursor sharing is forbidden");
    }

    #[test]
    fn test_engine_error_status_mapping() {
        let cases: Vec<(EngineError, u16)> = vec![
            (EngineError::BadRequest { message: "x".into() }, 400),
            (EngineError::NotFound, 404),
            (EngineError::TooManyRequests, 429),
            (EngineError::ResponseTooLarge { max_mb: 100 }, 413),
            (EngineError::Unavailable, 503),
            (EngineError::Timeout { waited: "1m".into() }, 504),
            (
                EngineError::Internal {
                    message: "boom".into(),
                    source: None,
                },
                500,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(GatewayError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_timeout_message_carries_duration() {
        let err = EngineError::Timeout {
            waited: "1m".to_string(),
        };
        assert_eq!(err.to_string(), "Request timed out after waiting for 1m");
    }

    #[test]
    fn test_malformed_sort_display() {
        let err = QueryError::MalformedSort {
            fragment: "nested(a)".to_string(),
        };
        let text = err.to_string();
        assert!(text.starts_with("Malformed nested sort : nested(a)"));
        assert!(text.contains(BAD_SORT_MESSAGE));
    }

    #[test]
    fn test_tenant_error_display() {
        let err = TenantError::Unresolvable {
            tenant_id: TenantId::new("opendes"),
        };
        assert!(err.to_string().contains("opendes"));
        assert_eq!(GatewayError::from(err).status_code(), 400);
    }

    #[test]
    fn test_serde_error_is_internal() {
        let err: GatewayError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.status_code(), 500);
        assert!(!err.is_client_error());
    }
}
