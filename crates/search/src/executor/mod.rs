//! Search execution.
//!
//! [`SearchExecutor`] turns a [`Query`] into an engine request, runs it
//! against one tenant cluster under the request-scoped timeout, classifies
//! failures and extracts the response. The pagination strategies reuse its
//! building blocks ([`prepare`](SearchExecutor::prepare),
//! [`search`](SearchExecutor::search), [`scroll`](SearchExecutor::scroll) and
//! the point-in-time calls) so every engine call shares one timeout and one
//! error mapping.

mod response;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use crate::audit::{AuditAction, AuditSink, TracingAuditSink};
use crate::config::GatewayConfig;
use crate::engine::{EngineFailure, FailureContext, SearchEngine, SearchRequest, classify};
use crate::error::GatewayResult;
use crate::query::{
    GeometryMode, PolicyService, QueryBuilder, RequestBodyBuilder, build_spatial_query,
    check_result_window, page_size, resolve_index,
};
use crate::tenant::{ClusterSettings, RequestContext};
use crate::types::{Query, QueryResponse, SpatialFilter, SpatialShape};

pub use response::{HIGHLIGHT_FIELD, hits, parse_response, total_hits};

/// Mapped field types memoized for the lifetime of one request.
///
/// Keyed by index expression and field.
#[derive(Debug, Default)]
pub struct RequestTypeCache {
    entries: Mutex<HashMap<(String, String), HashSet<String>>>,
}

impl RequestTypeCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached types of `field` in `index`.
    pub fn get(&self, index: &str, field: &str) -> Option<HashSet<String>> {
        self.entries
            .lock()
            .get(&(index.to_string(), field.to_string()))
            .cloned()
    }

    /// Caches the types of `field` in `index`.
    pub fn insert(&self, index: &str, field: &str, types: HashSet<String>) {
        self.entries
            .lock()
            .insert((index.to_string(), field.to_string()), types);
    }
}

/// A request body ready to run, with what is needed to page and classify it.
#[derive(Debug, Clone)]
pub struct PreparedSearch {
    /// Resolved index expression.
    pub index: String,
    /// The request body without paging fields.
    pub body: Map<String, Value>,
    /// Effective page size.
    pub size: usize,
    /// Error classification context.
    pub failure: FailureContext,
}

/// Runs queries against tenant clusters.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use helios_search::config::GatewayConfig;
/// use helios_search::engine::SearchEngine;
/// use helios_search::executor::SearchExecutor;
///
/// fn build(engine: Arc<dyn SearchEngine>) -> SearchExecutor {
///     SearchExecutor::new(Arc::new(GatewayConfig::default()), engine)
/// }
/// ```
#[derive(Clone)]
pub struct SearchExecutor {
    config: Arc<GatewayConfig>,
    engine: Arc<dyn SearchEngine>,
    builder: QueryBuilder,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for SearchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchExecutor")
            .field("builder", &self.builder)
            .finish_non_exhaustive()
    }
}

impl SearchExecutor {
    /// Creates an executor with the tracing audit sink and no policy service.
    pub fn new(config: Arc<GatewayConfig>, engine: Arc<dyn SearchEngine>) -> Self {
        let builder = QueryBuilder::new().with_collaboration(config.collaboration_enabled);
        Self {
            config,
            engine,
            builder,
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Replaces ACL filtering with the given policy service.
    pub fn with_policy(mut self, policy: Arc<dyn PolicyService>) -> Self {
        self.builder = self.builder.with_policy(policy);
        self
    }

    /// Sets the audit sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Runs a plain query (offset paging) against one tenant cluster.
    #[instrument(skip_all, fields(kind = ?query.kind, correlation_id = %ctx.correlation_id()))]
    pub async fn query(
        &self,
        query: &Query,
        ctx: &RequestContext,
        cluster: &ClusterSettings,
    ) -> GatewayResult<QueryResponse> {
        let result = self.run_query(query, ctx, cluster).await;
        self.record(AuditAction::Query, ctx, query, result.is_ok()).await;
        result
    }

    async fn run_query(
        &self,
        query: &Query,
        ctx: &RequestContext,
        cluster: &ClusterSettings,
    ) -> GatewayResult<QueryResponse> {
        let started = Instant::now();
        let mut prepared = self.prepare(query, ctx, cluster).await?;

        let offset = query.offset.unwrap_or(0);
        check_result_window(offset, prepared.size, &self.config)?;
        prepared.body.insert("from".to_string(), json!(offset));

        let request = SearchRequest::new(prepared.index, Value::Object(prepared.body));
        let body = self.search(cluster, request, &prepared.failure).await?;
        let response = parse_response(&body);

        debug!(
            results = response.len(),
            total = response.total_count,
            latency_ms = started.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(response)
    }

    /// Builds the request body for `query` without paging fields.
    pub async fn prepare(
        &self,
        query: &Query,
        ctx: &RequestContext,
        cluster: &ClusterSettings,
    ) -> GatewayResult<PreparedSearch> {
        let index = resolve_index(&query.kind, ctx.partitions());
        let failure = self.failure_context(query);
        let types = RequestTypeCache::new();

        let spatial = match &query.spatial_filter {
            Some(filter) => Some(
                self.spatial_clause(filter, &index, cluster, &types, &failure)
                    .await?,
            ),
            None => None,
        };

        let bool_query = self
            .builder
            .build(query.text(), spatial, ctx, query.query_as_owner)
            .await?;
        let body = RequestBodyBuilder::new(&self.config).build(query, bool_query)?;
        let size = page_size(query.limit, &self.config)?;

        let payload = Value::Object(body.clone());
        debug!(index = %index, payload = %payload, "Prepared search");
        Ok(PreparedSearch {
            index,
            body,
            size,
            failure,
        })
    }

    async fn spatial_clause(
        &self,
        filter: &SpatialFilter,
        index: &str,
        cluster: &ClusterSettings,
        types: &RequestTypeCache,
        failure: &FailureContext,
    ) -> GatewayResult<Value> {
        // Intersections are always shape queries.
        if matches!(filter.shape, SpatialShape::ByIntersection(_)) {
            return Ok(build_spatial_query(filter, GeometryMode::Shape)?);
        }

        let field_types = match types.get(index, &filter.field) {
            Some(cached) => cached,
            None => {
                let fetched = self
                    .call(failure, self.engine.field_types(cluster, index, &filter.field))
                    .await?;
                types.insert(index, &filter.field, fetched.clone());
                fetched
            }
        };

        let mode = GeometryMode::from_field_types(&field_types);
        debug!(field = %filter.field, mode = ?mode, "Resolved geometry mode");
        Ok(build_spatial_query(filter, mode)?)
    }

    /// Returns the failure classification context for `query`.
    pub fn failure_context(&self, query: &Query) -> FailureContext {
        FailureContext::new(self.config.timeout(), self.config.max_response_size_mb).with_request(
            query.sort.is_some(),
            query
                .aggregate_by
                .as_deref()
                .is_some_and(|a| !a.trim().is_empty()),
        )
    }

    /// Executes a search.
    pub async fn search(
        &self,
        cluster: &ClusterSettings,
        request: SearchRequest,
        failure: &FailureContext,
    ) -> GatewayResult<Value> {
        self.call(failure, self.engine.search(cluster, request)).await
    }

    /// Continues a scroll context.
    pub async fn scroll(
        &self,
        cluster: &ClusterSettings,
        scroll_id: &str,
        failure: &FailureContext,
    ) -> GatewayResult<Value> {
        let keep_alive = self.config.keep_alive();
        self.call(failure, self.engine.scroll(cluster, scroll_id, keep_alive))
            .await
    }

    /// Opens a point-in-time over `index`.
    pub async fn open_point_in_time(
        &self,
        cluster: &ClusterSettings,
        index: &str,
        failure: &FailureContext,
    ) -> GatewayResult<String> {
        let keep_alive = self.config.keep_alive();
        self.call(
            failure,
            self.engine.open_point_in_time(cluster, index, keep_alive),
        )
        .await
    }

    /// Releases a point-in-time.
    pub async fn close_point_in_time(
        &self,
        cluster: &ClusterSettings,
        pit_id: &str,
    ) -> GatewayResult<()> {
        let failure = FailureContext::new(self.config.timeout(), self.config.max_response_size_mb);
        self.call(&failure, self.engine.close_point_in_time(cluster, pit_id))
            .await
    }

    /// Reports an operation outcome to the audit sink.
    pub async fn record(
        &self,
        action: AuditAction,
        ctx: &RequestContext,
        query: &Query,
        succeeded: bool,
    ) {
        if succeeded {
            self.audit.query_succeeded(action, ctx.user_id(), query).await;
        } else {
            self.audit.query_failed(action, ctx.user_id(), query).await;
        }
    }

    /// Runs an engine call under the request timeout and classifies failures.
    async fn call<T>(
        &self,
        failure: &FailureContext,
        fut: impl Future<Output = Result<T, EngineFailure>>,
    ) -> GatewayResult<T> {
        let timeout: Duration = self.config.timeout();
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(engine_failure)) => {
                debug!(error = %engine_failure, "Engine call failed");
                Err(classify(engine_failure, failure))
            }
            Err(_) => Err(classify(
                EngineFailure::timeout(format!("no response within {}ms", timeout.as_millis())),
                failure,
            )),
        }
    }
}
