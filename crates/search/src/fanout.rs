//! Cross-tenant fan-out.
//!
//! A request naming one partition runs inline. A request naming several is
//! dispatched as one task per tenant onto a [`JoinSet`], bounded by a
//! semaphore sized to [`GatewayConfig::fanout_workers`]. Each task resolves
//! its own tenant's cluster and runs the identical query there. The first
//! tenant failure aborts the whole request. For plain queries the remaining
//! tasks are cancelled when the set is dropped. Cursor queries stop handing
//! out permits and wait for tasks already running, so every cursor those
//! tasks opened is closed before the error is returned.
//!
//! # Merge
//!
//! Per-tenant responses are merged client-side:
//!
//! 1. The merged total is the sum of the tenant totals.
//! 2. Tenant result lists are ordered by tenant total, descending. Ties keep
//!    the order the partitions were requested in.
//! 3. Results are interleaved round-robin: the first result of each list,
//!    then the second of each, and so on, skipping exhausted lists.
//!
//! The merged order depends only on tenant totals and per-tenant order,
//! never on which task finished first.
//!
//! [`GatewayConfig::fanout_workers`]: crate::config::GatewayConfig::fanout_workers

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::error::{CursorError, GatewayError, GatewayResult, TenantError, internal_error};
use crate::executor::SearchExecutor;
use crate::pagination::CursorService;
use crate::tenant::{ClusterSettings, RequestContext, TenantResolver};
use crate::types::{AggregationResponse, CursorQueryResponse, Query, QueryResponse};

/// What happens to running tenant tasks once one tenant fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    /// Drop them.
    Cancel,
    /// Let them run to completion; tasks still waiting for a permit give up.
    Finish,
}

/// Dispatches queries to the tenants a request names.
#[derive(Clone)]
pub struct FanoutCoordinator {
    resolver: Arc<dyn TenantResolver>,
    executor: SearchExecutor,
    cursors: CursorService,
}

impl std::fmt::Debug for FanoutCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutCoordinator")
            .field("executor", &self.executor)
            .field("cursors", &self.cursors)
            .finish_non_exhaustive()
    }
}

impl FanoutCoordinator {
    /// Creates a coordinator.
    pub fn new(
        resolver: Arc<dyn TenantResolver>,
        executor: SearchExecutor,
        cursors: CursorService,
    ) -> Self {
        Self {
            resolver,
            executor,
            cursors,
        }
    }

    /// Runs a plain query against every partition of the request.
    #[instrument(skip_all, fields(partitions = ctx.partitions().len()))]
    pub async fn query(&self, query: &Query, ctx: &RequestContext) -> GatewayResult<QueryResponse> {
        let executor = self.executor.clone();
        let query = Arc::new(query.clone());

        self.dispatch(ctx, InFlight::Cancel, move |tenant_ctx, cluster| {
            let executor = executor.clone();
            let query = Arc::clone(&query);
            async move { executor.query(&query, &tenant_ctx, &cluster).await }
        })
        .await
    }

    /// Runs a cursor query.
    ///
    /// A single partition pages normally. Several partitions are supported
    /// for the first page only: per-tenant cursors are closed once their page
    /// is read and the merged response carries no cursor.
    #[instrument(skip_all, fields(partitions = ctx.partitions().len()))]
    pub async fn cursor_query(
        &self,
        query: &Query,
        ctx: &RequestContext,
    ) -> GatewayResult<CursorQueryResponse> {
        if ctx.is_multi_partition() && query.cursor_token().is_some() {
            return Err(CursorError::InvalidOrExpired.into());
        }

        let cursors = self.cursors.clone();
        let query = Arc::new(query.clone());
        let multi = ctx.is_multi_partition();

        self.dispatch(ctx, InFlight::Finish, move |tenant_ctx, cluster| {
            let cursors = cursors.clone();
            let query = Arc::clone(&query);
            async move {
                let response = cursors.query(&query, &tenant_ctx, &cluster).await?;
                if multi && let Some(token) = &response.cursor {
                    cursors.close(token, &tenant_ctx, &cluster).await?;
                }
                Ok::<_, GatewayError>(response)
            }
        })
        .await
    }

    /// Closes a cursor opened on the request's primary partition.
    pub async fn close_cursor(&self, token: &str, ctx: &RequestContext) -> GatewayResult<()> {
        let cluster = self.resolver.resolve(ctx.primary_partition()).await?;
        self.cursors.close(token, ctx, &cluster).await
    }

    async fn dispatch<F, Fut>(
        &self,
        ctx: &RequestContext,
        in_flight: InFlight,
        run: F,
    ) -> GatewayResult<QueryResponse>
    where
        F: Fn(RequestContext, ClusterSettings) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = GatewayResult<QueryResponse>> + Send + 'static,
    {
        let tenants = ctx.partitions();
        if tenants.len() > 1 && !self.executor.config().cross_tenant_enabled {
            return Err(TenantError::CrossTenantDisabled {
                count: tenants.len(),
            }
            .into());
        }

        if let [tenant] = tenants {
            let cluster = self.resolver.resolve(tenant).await?;
            return run(ctx.clone(), cluster).await;
        }

        let workers = self.executor.config().fanout_workers();
        debug!(tenants = tenants.len(), workers, "Dispatching cross-tenant query");

        let run = Arc::new(run);
        let permits = Arc::new(Semaphore::new(workers));
        let mut tasks: JoinSet<GatewayResult<(usize, QueryResponse)>> = JoinSet::new();

        for (position, tenant) in tenants.iter().enumerate() {
            let run = Arc::clone(&run);
            let resolver = Arc::clone(&self.resolver);
            let permits = Arc::clone(&permits);
            let tenant = tenant.clone();
            let tenant_ctx = ctx.for_partition(&tenant);

            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| internal_error(format!("fan-out pool closed: {}", e)))?;
                let cluster = resolver.resolve(&tenant).await?;
                let response = run(tenant_ctx, cluster).await?;
                debug!(
                    tenant = %tenant,
                    results = response.len(),
                    total = response.total_count,
                    "Tenant query completed"
                );
                Ok::<_, GatewayError>((position, response))
            });
        }

        let mut responses = Vec::with_capacity(tenants.len());
        while let Some(joined) = tasks.join_next().await {
            let err = match joined {
                Ok(Ok(response)) => {
                    responses.push(response);
                    continue;
                }
                Ok(Err(err)) => err,
                Err(err) => internal_error(format!("tenant task failed: {}", err)),
            };

            warn!(error = %err, "Tenant query failed, aborting fan-out");
            if in_flight == InFlight::Finish {
                permits.close();
                while let Some(joined) = tasks.join_next().await {
                    if let Ok(Err(late)) = joined {
                        debug!(error = %late, "Tenant task ended after abort");
                    }
                }
            }
            return Err(err);
        }

        responses.sort_by_key(|(position, _)| *position);
        Ok(merge_responses(
            responses.into_iter().map(|(_, response)| response).collect(),
        ))
    }
}

/// Merges per-tenant responses.
///
/// Results are interleaved round-robin in descending order of tenant total;
/// totals are summed; aggregation buckets are summed by key and ordered by
/// count, then key; suggestions are concatenated without duplicates. The
/// merged response has no cursor.
///
/// # Example
///
/// ```
/// use helios_search::fanout::merge_responses;
/// use helios_search::types::{Document, QueryResponse};
///
/// fn docs(ids: &[&str]) -> Vec<Document> {
///     ids.iter()
///         .map(|id| {
///             let mut doc = Document::new();
///             doc.insert("id".to_string(), (*id).into());
///             doc
///         })
///         .collect()
/// }
///
/// let a = QueryResponse::empty().with_results(docs(&["A1", "A2", "A3"])).with_total(42);
/// let b = QueryResponse::empty().with_results(docs(&["B1", "B2"])).with_total(2);
///
/// let merged = merge_responses(vec![b, a]);
/// let ids: Vec<_> = merged.results.iter().map(|d| d["id"].as_str().unwrap()).collect();
/// assert_eq!(ids, ["A1", "B1", "A2", "B2", "A3"]);
/// assert_eq!(merged.total_count, 44);
/// ```
pub fn merge_responses(mut responses: Vec<QueryResponse>) -> QueryResponse {
    responses.sort_by(|a, b| b.total_count.cmp(&a.total_count));

    let total_count = responses.iter().map(|r| r.total_count).sum();
    let aggregations = merge_aggregations(&responses);
    let phrase_suggestions = merge_suggestions(&responses);

    let capacity = responses.iter().map(QueryResponse::len).sum();
    let mut lists: Vec<_> = responses
        .into_iter()
        .map(|r| r.results.into_iter())
        .collect();

    let mut results = Vec::with_capacity(capacity);
    while results.len() < capacity {
        for list in lists.iter_mut() {
            if let Some(document) = list.next() {
                results.push(document);
            }
        }
    }

    QueryResponse {
        cursor: None,
        results,
        total_count,
        aggregations,
        phrase_suggestions,
    }
}

fn merge_aggregations(responses: &[QueryResponse]) -> Option<Vec<AggregationResponse>> {
    if responses.iter().all(|r| r.aggregations.is_none()) {
        return None;
    }

    let mut counts: HashMap<&str, u64> = HashMap::new();
    for bucket in responses.iter().flat_map(|r| r.aggregations.iter().flatten()) {
        *counts.entry(bucket.key.as_str()).or_default() += bucket.count;
    }

    let mut merged: Vec<_> = counts
        .into_iter()
        .map(|(key, count)| AggregationResponse::new(key, count))
        .collect();
    merged.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    Some(merged)
}

fn merge_suggestions(responses: &[QueryResponse]) -> Option<Vec<String>> {
    if responses.iter().all(|r| r.phrase_suggestions.is_none()) {
        return None;
    }

    let mut seen = HashSet::new();
    Some(
        responses
            .iter()
            .flat_map(|r| r.phrase_suggestions.iter().flatten())
            .filter(|s| seen.insert(s.as_str()))
            .cloned()
            .collect(),
    )
}
