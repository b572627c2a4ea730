//! Query audit hooks.
//!
//! The executor and the pagination strategies report every engine-backed
//! operation to an [`AuditSink`], on success and on failure. The default
//! [`TracingAuditSink`] writes one `tracing` event per operation under the
//! `audit` target, so audit records can be routed with an `EnvFilter`
//! directive such as `audit=info`.

use std::fmt;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::types::Query;

/// The operation being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    /// A plain query.
    Query,
    /// First page of a cursor query.
    CursorOpen,
    /// A resumed cursor page.
    CursorResume,
    /// An explicit cursor close.
    CursorClose,
}

impl AuditAction {
    /// Returns the action name used in audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Query => "query",
            AuditAction::CursorOpen => "cursor_open",
            AuditAction::CursorResume => "cursor_resume",
            AuditAction::CursorClose => "cursor_close",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives query outcome events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records a successful operation.
    async fn query_succeeded(&self, action: AuditAction, user_id: &str, query: &Query);

    /// Records a failed operation.
    async fn query_failed(&self, action: AuditAction, user_id: &str, query: &Query);
}

/// Writes audit events through `tracing` with target `audit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn query_succeeded(&self, action: AuditAction, user_id: &str, query: &Query) {
        info!(
            target: "audit",
            action = %action,
            user = user_id,
            kind = ?query.kind,
            outcome = "success",
            "search audit"
        );
    }

    async fn query_failed(&self, action: AuditAction, user_id: &str, query: &Query) {
        warn!(
            target: "audit",
            action = %action,
            user = user_id,
            kind = ?query.kind,
            outcome = "failure",
            "search audit"
        );
    }
}
