//! Caller identity for a gateway request.
//!
//! [`RequestContext`] carries what the HTTP layer extracted from trusted
//! headers: who the caller is, which data partitions the request targets,
//! the caller's data groups and whether the caller bypasses ACL filtering.
//! Every query and cursor operation takes one.

use std::sync::Arc;

use uuid::Uuid;

use super::id::TenantId;
use crate::error::TenantError;

/// A validated caller context required for all gateway operations.
///
/// # Examples
///
/// ```
/// use helios_search::tenant::{RequestContext, TenantId};
///
/// let ctx = RequestContext::new("alice@example.com", "opendes, common")
///     .unwrap()
///     .with_data_groups(vec!["data.default.viewers@opendes.example.com".to_string()]);
///
/// assert_eq!(ctx.partitions().len(), 2);
/// assert_eq!(ctx.primary_partition(), &TenantId::new("opendes"));
/// assert!(!ctx.has_full_data_access());
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The caller identity; owns any cursor the request creates.
    user_id: String,
    /// The targeted partitions, in header order. Never empty.
    partitions: Vec<TenantId>,
    /// The caller's data groups, matched against document ACLs.
    data_groups: Arc<Vec<String>>,
    /// Root-user flag from a trusted header.
    full_data_access: bool,
    /// Collaboration id, when the request is scoped to a collaboration.
    collaboration: Option<String>,
    /// Correlation ID for request tracing.
    correlation_id: String,
}

impl RequestContext {
    /// Creates a context for `user_id` targeting the comma-delimited `partitions`.
    ///
    /// A fresh correlation ID is generated; override it with
    /// [`with_correlation_id`](Self::with_correlation_id).
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::EmptyPartitionList`] if `partitions` names no tenant.
    pub fn new(user_id: impl Into<String>, partitions: &str) -> Result<Self, TenantError> {
        Ok(Self {
            user_id: user_id.into(),
            partitions: TenantId::parse_list(partitions)?,
            data_groups: Arc::new(Vec::new()),
            full_data_access: false,
            collaboration: None,
            correlation_id: Uuid::new_v4().to_string(),
        })
    }

    /// Sets the caller's data groups.
    pub fn with_data_groups(mut self, groups: Vec<String>) -> Self {
        self.data_groups = Arc::new(groups);
        self
    }

    /// Marks the caller as having full data access (no ACL filter).
    pub fn with_full_data_access(mut self, full_access: bool) -> Self {
        self.full_data_access = full_access;
        self
    }

    /// Scopes the request to a collaboration.
    pub fn with_collaboration(mut self, collaboration_id: impl Into<String>) -> Self {
        self.collaboration = Some(collaboration_id.into());
        self
    }

    /// Sets the correlation ID for tracing.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Returns a copy of this context narrowed to a single partition.
    ///
    /// Used when a multi-tenant request is dispatched per tenant.
    pub fn for_partition(&self, tenant: &TenantId) -> Self {
        Self {
            partitions: vec![tenant.clone()],
            ..self.clone()
        }
    }

    /// Returns the caller identity.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns all targeted partitions.
    pub fn partitions(&self) -> &[TenantId] {
        &self.partitions
    }

    /// Returns the first targeted partition.
    pub fn primary_partition(&self) -> &TenantId {
        // partitions is non-empty by construction
        &self.partitions[0]
    }

    /// Returns `true` if more than one partition is targeted.
    pub fn is_multi_partition(&self) -> bool {
        self.partitions.len() > 1
    }

    /// Returns the caller's data groups.
    pub fn data_groups(&self) -> &[String] {
        &self.data_groups
    }

    /// Returns `true` if the caller bypasses ACL filtering.
    pub fn has_full_data_access(&self) -> bool {
        self.full_data_access
    }

    /// Returns the collaboration id, if any.
    pub fn collaboration(&self) -> Option<&str> {
        self.collaboration.as_deref()
    }

    /// Returns the correlation ID.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}
