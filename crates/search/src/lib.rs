//! Helios Search Gateway
//!
//! A multi-tenant, authorization-aware search gateway over Elasticsearch
//! clusters. It translates an abstract query model into engine requests,
//! pages through results with cursors, and federates queries across tenant
//! clusters with a deterministic client-side merge.
//!
//! # Architecture
//!
//! - [`parser`] - Query, sort and aggregation expressions with `nested(...)` scoping
//! - [`query`] - Bool query, authorization filter, spatial clauses, request bodies
//! - [`engine`] - The [`SearchEngine`] boundary and engine error classification
//! - [`executor`] - Runs one query against one tenant cluster
//! - [`pagination`] - Scroll and search-after cursors backed by a cursor cache
//! - [`fanout`] - Per-tenant dispatch and round-robin merge
//! - [`tenant`] - Tenant ids, caller context and cluster resolution
//! - [`audit`] - Query outcome hooks
//! - [`config`] - Gateway configuration and logging setup
//! - [`error`] - Error types and status mapping
//!
//! # Features
//!
//! - `elasticsearch` - [`engine::ElasticsearchEngine`], an HTTP client per tenant cluster
//!
//! # Quick Start
//!
//! ```
//! use helios_search::parser::parse_query_nodes;
//! use helios_search::tenant::RequestContext;
//!
//! let nodes = parse_query_nodes("data.Name:WELL AND nested(data.Markers, (Depth:>100))").unwrap();
//! assert_eq!(nodes.len(), 2);
//!
//! let ctx = RequestContext::new("alice@example.com", "opendes, tenant2")
//!     .unwrap()
//!     .with_data_groups(vec!["data.default.viewers@opendes.example.com".to_string()]);
//! assert!(ctx.is_multi_partition());
//! ```
//!
//! # Wiring
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use helios_search::config::GatewayConfig;
//! use helios_search::engine::SearchEngine;
//! use helios_search::executor::SearchExecutor;
//! use helios_search::fanout::FanoutCoordinator;
//! use helios_search::pagination::CursorService;
//! use helios_search::tenant::StaticTenantResolver;
//!
//! fn gateway(engine: Arc<dyn SearchEngine>, resolver: StaticTenantResolver) -> FanoutCoordinator {
//!     let executor = SearchExecutor::new(Arc::new(GatewayConfig::default()), engine);
//!     let cursors = CursorService::new(executor.clone());
//!     FanoutCoordinator::new(Arc::new(resolver), executor, cursors)
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fanout;
pub mod pagination;
pub mod parser;
pub mod query;
pub mod tenant;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{GatewayConfig, PaginationStrategy};
pub use engine::SearchEngine;
pub use error::{GatewayError, GatewayResult};
pub use executor::SearchExecutor;
pub use fanout::FanoutCoordinator;
pub use pagination::CursorService;
pub use tenant::{ClusterSettings, RequestContext, TenantId};
pub use types::{CursorQueryResponse, Query, QueryResponse};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
