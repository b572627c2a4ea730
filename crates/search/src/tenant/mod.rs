//! Tenant identity and cluster resolution.
//!
//! # Core Types
//!
//! - [`TenantId`] - Opaque data-partition identifier
//! - [`RequestContext`] - Caller identity, partitions and ACL groups for one request
//! - [`ClusterSettings`] - Connection descriptor for a tenant's search cluster
//! - [`TenantResolver`] - Maps a tenant to its cluster settings
//!
//! A request names one or more partitions in a comma-delimited header value.
//! One partition executes inline; several are handed to the
//! [`FanoutCoordinator`](crate::fanout::FanoutCoordinator).

mod cluster;
mod context;
mod id;
mod resolver;

pub use cluster::{ClusterAuth, ClusterSettings};
pub use context::RequestContext;
pub use id::TenantId;
pub use resolver::{StaticTenantResolver, TenantResolver};
