//! Search engine boundary.
//!
//! [`SearchEngine`] is the only network seam of the gateway. Request and
//! response bodies use the engine's JSON DSL as [`serde_json::Value`];
//! failures come back as an [`EngineFailure`] carrying enough of the engine's
//! error detail for [`classify`] to map it to a [`GatewayError`].
//!
//! # Implementations
//!
//! | Type | Feature | Description |
//! |------|---------|-------------|
//! | [`ElasticsearchEngine`] | `elasticsearch` | HTTP client per tenant cluster |
//!
//! [`GatewayError`]: crate::error::GatewayError

mod classify;
#[cfg(feature = "elasticsearch")]
mod elastic;

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::tenant::ClusterSettings;

pub use classify::{
    AGGREGATION_NOT_SUPPORTED, DEFAULT_BAD_REQUEST, FailureContext, SORT_NOT_SUPPORTED, classify,
};
#[cfg(feature = "elasticsearch")]
pub use elastic::ElasticsearchEngine;

/// A search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Target index expression; `None` for point-in-time searches.
    pub index: Option<String>,
    /// The request body.
    pub body: Value,
    /// Opens a scroll context with this keep-alive.
    pub scroll: Option<Duration>,
}

impl SearchRequest {
    /// Creates a search against an index expression.
    pub fn new(index: impl Into<String>, body: Value) -> Self {
        Self {
            index: Some(index.into()),
            body,
            scroll: None,
        }
    }

    /// Creates a search whose body names a point-in-time.
    pub fn point_in_time(body: Value) -> Self {
        Self {
            index: None,
            body,
            scroll: None,
        }
    }

    /// Opens a scroll context with the request.
    pub fn with_scroll(mut self, keep_alive: Duration) -> Self {
        self.scroll = Some(keep_alive);
        self
    }
}

/// How an engine call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The engine answered with an error status.
    Status,
    /// The call timed out.
    Timeout,
    /// The response exceeded the size ceiling.
    ResponseTooLarge,
    /// Connection or client failure.
    Transport,
}

/// An engine failure with its raw error detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
    /// HTTP status, when the engine answered.
    pub status: Option<u16>,
    /// Failure category.
    pub kind: FailureKind,
    /// Top-level reason, with any `caused_by` chain appended.
    pub message: String,
    /// `root_cause[].reason` values.
    pub root_causes: Vec<String>,
}

impl EngineFailure {
    /// Builds a failure from an engine error response.
    ///
    /// Reads `error.reason`, the `error.caused_by` chain and
    /// `error.root_cause[].reason`; falls back to the raw body text.
    pub fn from_response(status: u16, body: &Value) -> Self {
        let error = &body["error"];

        let root_causes = error["root_cause"]
            .as_array()
            .map(|causes| {
                causes
                    .iter()
                    .filter_map(|c| c["reason"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let mut reasons = Vec::new();
        let mut cause = error;
        while let Some(reason) = cause["reason"].as_str() {
            reasons.push(reason.to_string());
            cause = &cause["caused_by"];
        }

        let message = if reasons.is_empty() {
            match error {
                Value::String(text) => text.clone(),
                Value::Null => body.to_string(),
                other => other.to_string(),
            }
        } else {
            reasons.join("; caused by: ")
        };

        Self {
            status: Some(status),
            kind: FailureKind::Status,
            message,
            root_causes,
        }
    }

    /// Builds a failure from a status and a raw body that may not be JSON.
    pub fn from_text(status: u16, text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(body) => Self::from_response(status, &body),
            Err(_) => Self {
                status: Some(status),
                kind: FailureKind::Status,
                message: text.to_string(),
                root_causes: Vec::new(),
            },
        }
    }

    /// Builds a timeout failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::without_status(FailureKind::Timeout, message)
    }

    /// Builds a response-size failure.
    pub fn response_too_large(message: impl Into<String>) -> Self {
        Self::without_status(FailureKind::ResponseTooLarge, message)
    }

    /// Builds a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::without_status(FailureKind::Transport, message)
    }

    fn without_status(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            status: None,
            kind,
            message: message.into(),
            root_causes: Vec::new(),
        }
    }

    /// Returns `true` if the message or any root cause contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.message.contains(needle) || self.root_causes.iter().any(|c| c.contains(needle))
    }
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "engine returned {}: {}", status, self.message),
            None => write!(f, "engine call failed ({:?}): {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for EngineFailure {}

/// Calls against a tenant's search cluster.
///
/// Every method is given the tenant's [`ClusterSettings`]; implementations
/// may cache clients per cluster.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Executes a search and returns the raw response.
    async fn search(
        &self,
        cluster: &ClusterSettings,
        request: SearchRequest,
    ) -> Result<Value, EngineFailure>;

    /// Continues a scroll context.
    async fn scroll(
        &self,
        cluster: &ClusterSettings,
        scroll_id: &str,
        keep_alive: Duration,
    ) -> Result<Value, EngineFailure>;

    /// Opens a point-in-time over `index` and returns its id.
    async fn open_point_in_time(
        &self,
        cluster: &ClusterSettings,
        index: &str,
        keep_alive: Duration,
    ) -> Result<String, EngineFailure>;

    /// Releases a point-in-time.
    async fn close_point_in_time(
        &self,
        cluster: &ClusterSettings,
        pit_id: &str,
    ) -> Result<(), EngineFailure>;

    /// Returns the mapped types of `field` across the indices of `index`.
    async fn field_types(
        &self,
        cluster: &ClusterSettings,
        index: &str,
        field: &str,
    ) -> Result<HashSet<String>, EngineFailure>;
}

/// Formats a keep-alive in the engine's time-unit syntax.
pub fn keep_alive_param(keep_alive: Duration) -> String {
    let millis = keep_alive.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{}ms", millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_from_response() {
        let body = json!({
            "error": {
                "root_cause": [
                    { "type": "illegal_argument_exception", "reason": "first" },
                    { "type": "illegal_argument_exception", "reason": "second" }
                ],
                "type": "search_phase_execution_exception",
                "reason": "all shards failed",
                "caused_by": { "type": "x", "reason": "deeper" }
            },
            "status": 400
        });
        let failure = EngineFailure::from_response(400, &body);
        assert_eq!(failure.status, Some(400));
        assert_eq!(failure.root_causes, vec!["first", "second"]);
        assert_eq!(failure.message, "all shards failed; caused by: deeper");
        assert!(failure.mentions("deeper"));
        assert!(failure.mentions("second"));
    }

    #[test]
    fn test_failure_from_text() {
        let failure = EngineFailure::from_text(502, "<html>bad gateway</html>");
        assert_eq!(failure.message, "<html>bad gateway</html>");
        assert!(failure.root_causes.is_empty());
    }

    #[test]
    fn test_keep_alive_param() {
        assert_eq!(keep_alive_param(Duration::from_secs(90)), "90s");
        assert_eq!(keep_alive_param(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn test_search_request_constructors() {
        let request = SearchRequest::new("idx", json!({})).with_scroll(Duration::from_secs(5));
        assert_eq!(request.index.as_deref(), Some("idx"));
        assert_eq!(request.scroll, Some(Duration::from_secs(5)));
        assert!(SearchRequest::point_in_time(json!({})).index.is_none());
    }
}
