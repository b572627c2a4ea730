//! Search-after pagination over a point-in-time.
//!
//! Lifecycle of one cursor:
//!
//! | State | Request | Outcome |
//! |-------|---------|---------|
//! | initial | no cursor | PIT opened, first page, total captured, entry stored |
//! | open | cursor | next page after the stored sort values |
//! | short page | - | PIT released, entry stored with `closed = true` |
//! | closed | cursor | empty page with the stored total, entry deleted |
//! | any | close | entry deleted, PIT released unless already closed |
//!
//! The total count is computed once on the first page and carried forward.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument, warn};

use super::{CursorCache, Paginator, cursor_token};
use crate::audit::AuditAction;
use crate::engine::{SearchRequest, keep_alive_param};
use crate::error::{CursorError, GatewayResult};
use crate::executor::{PreparedSearch, SearchExecutor, hits, parse_response};
use crate::tenant::{ClusterSettings, RequestContext};
use crate::types::{CursorQueryResponse, Query, QueryResponse};

/// Cache entry of a search-after cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchAfterSettings {
    /// Current point-in-time id.
    pub pit_id: String,
    /// The user who opened the cursor.
    pub user_id: String,
    /// Total captured on the first page.
    pub total_count: u64,
    /// The sort the cursor pages in.
    pub sort: Vec<Value>,
    /// Sort values of the last hit served.
    pub search_after: Vec<Value>,
    /// The PIT has been released; the next page is the final drain.
    pub closed: bool,
    /// The query the cursor was opened for, without its cursor token.
    pub query: Query,
}

/// Sort used when the request gives none. The engine appends `_shard_doc`.
pub fn default_search_after_sort() -> Vec<Value> {
    vec![json!({ "_score": { "order": "desc" } })]
}

/// Pages through results with point-in-time contexts and `search_after`.
pub struct SearchAfterPaginator {
    executor: SearchExecutor,
    cache: Arc<dyn CursorCache<SearchAfterSettings>>,
}

impl SearchAfterPaginator {
    /// Creates a paginator storing cursors in `cache`.
    pub fn new(
        executor: SearchExecutor,
        cache: Arc<dyn CursorCache<SearchAfterSettings>>,
    ) -> Self {
        Self { executor, cache }
    }

    async fn open(
        &self,
        query: &Query,
        ctx: &RequestContext,
        cluster: &ClusterSettings,
    ) -> GatewayResult<CursorQueryResponse> {
        let mut stored = query.clone();
        stored.cursor = None;
        let first_page = stored.clone().with_track_total_count(true);

        let mut prepared = self.executor.prepare(&first_page, ctx, cluster).await?;
        let sort = match prepared.body.remove("sort") {
            Some(Value::Array(sort)) => sort,
            _ => default_search_after_sort(),
        };

        let pit_id = self
            .executor
            .open_point_in_time(cluster, &prepared.index, &prepared.failure)
            .await?;

        let body = self.page_body(&mut prepared, &pit_id, &sort, None);
        let raw = match self.run(cluster, body, &prepared).await {
            Ok(raw) => raw,
            Err(err) => {
                self.release(cluster, &pit_id).await;
                return Err(err);
            }
        };

        let response = parse_response(&raw);
        let pit_id = raw["pit_id"].as_str().unwrap_or(&pit_id).to_string();
        let closed = response.len() < prepared.size;
        if closed {
            self.release(cluster, &pit_id).await;
        }

        let settings = SearchAfterSettings {
            pit_id,
            user_id: ctx.user_id().to_string(),
            total_count: response.total_count,
            sort,
            search_after: last_sort_values(&raw).unwrap_or_default(),
            closed,
            query: stored,
        };
        let token = cursor_token(&settings.pit_id);
        self.cache.put(&token, settings).await;

        info!(cursor = %token, total = response.total_count, closed, "Opened search-after cursor");
        Ok(response.with_cursor(token))
    }

    async fn resume(
        &self,
        token: &str,
        query: &Query,
        ctx: &RequestContext,
        cluster: &ClusterSettings,
    ) -> GatewayResult<CursorQueryResponse> {
        let settings = self
            .cache
            .get(token)
            .await
            .ok_or(CursorError::InvalidOrExpired)?;
        if settings.user_id != ctx.user_id() {
            return Err(CursorError::SharingForbidden.into());
        }

        if settings.closed {
            debug!(cursor = %token, total = settings.total_count, "Draining closed cursor");
            self.cache.delete(token).await;
            return Ok(QueryResponse::empty_with_total(settings.total_count));
        }

        let page = page_query(&settings.query, query);
        let mut prepared = self.executor.prepare(&page, ctx, cluster).await?;
        prepared.body.remove("sort");
        let body = self.page_body(
            &mut prepared,
            &settings.pit_id,
            &settings.sort,
            Some(&settings.search_after),
        );
        let raw = self.run(cluster, body, &prepared).await?;

        let response = parse_response(&raw).with_total(settings.total_count);
        let pit_id = raw["pit_id"]
            .as_str()
            .unwrap_or(&settings.pit_id)
            .to_string();

        if response.is_empty() {
            debug!(cursor = %token, "Search-after cursor exhausted");
            self.release(cluster, &pit_id).await;
            self.cache.delete(token).await;
            return Ok(response);
        }

        let closed = response.len() < prepared.size;
        if closed {
            self.release(cluster, &pit_id).await;
        }

        let next = SearchAfterSettings {
            search_after: last_sort_values(&raw).unwrap_or(settings.search_after),
            closed,
            pit_id,
            ..settings
        };
        let next_token = cursor_token(&next.pit_id);
        if next_token != token {
            self.cache.delete(token).await;
        }
        self.cache.put(&next_token, next).await;

        Ok(response.with_cursor(next_token))
    }

    /// Adds the paging fields to a prepared body.
    fn page_body(
        &self,
        prepared: &mut PreparedSearch,
        pit_id: &str,
        sort: &[Value],
        search_after: Option<&[Value]>,
    ) -> Value {
        let keep_alive = keep_alive_param(self.executor.config().keep_alive());
        let mut body: Map<String, Value> = std::mem::take(&mut prepared.body);
        body.insert("sort".to_string(), Value::Array(sort.to_vec()));
        body.insert(
            "pit".to_string(),
            json!({ "id": pit_id, "keep_alive": keep_alive }),
        );
        if let Some(values) = search_after.filter(|v| !v.is_empty()) {
            body.insert("search_after".to_string(), Value::Array(values.to_vec()));
        }
        Value::Object(body)
    }

    async fn run(
        &self,
        cluster: &ClusterSettings,
        body: Value,
        prepared: &PreparedSearch,
    ) -> GatewayResult<Value> {
        self.executor
            .search(cluster, SearchRequest::point_in_time(body), &prepared.failure)
            .await
    }

    /// Releases a PIT, logging instead of failing.
    async fn release(&self, cluster: &ClusterSettings, pit_id: &str) {
        if let Err(err) = self.executor.close_point_in_time(cluster, pit_id).await {
            warn!(error = %err, "Failed to close point-in-time");
        }
    }
}

/// Builds the query for a resumed page.
///
/// Page size and field selection come from the resuming request when it
/// gives them; everything that shapes the result set stays as opened.
fn page_query(stored: &Query, resuming: &Query) -> Query {
    let mut page = stored.clone();
    if resuming.limit.is_some() {
        page.limit = resuming.limit;
    }
    if resuming.returned_fields.is_some() {
        page.returned_fields = resuming.returned_fields.clone();
    }
    if resuming.highlighted_fields.is_some() {
        page.highlighted_fields = resuming.highlighted_fields.clone();
    }
    page
}

/// Returns the sort values of the last hit.
fn last_sort_values(body: &Value) -> Option<Vec<Value>> {
    hits(body).last()?.get("sort")?.as_array().cloned()
}

#[async_trait]
impl Paginator for SearchAfterPaginator {
    #[instrument(skip_all, fields(strategy = "search-after", cursor = query.cursor_token().unwrap_or("")))]
    async fn query(
        &self,
        query: &Query,
        ctx: &RequestContext,
        cluster: &ClusterSettings,
    ) -> GatewayResult<CursorQueryResponse> {
        let (action, result) = match query.cursor_token() {
            None => (AuditAction::CursorOpen, self.open(query, ctx, cluster).await),
            Some(token) => (
                AuditAction::CursorResume,
                self.resume(token, query, ctx, cluster).await,
            ),
        };
        self.executor.record(action, ctx, query, result.is_ok()).await;
        result
    }

    #[instrument(skip_all, fields(strategy = "search-after", cursor = %token))]
    async fn close(
        &self,
        token: &str,
        ctx: &RequestContext,
        cluster: &ClusterSettings,
    ) -> GatewayResult<()> {
        let Some(settings) = self.cache.get(token).await else {
            debug!("Cursor already closed or unknown");
            return Ok(());
        };
        if settings.user_id != ctx.user_id() {
            return Err(CursorError::SharingForbidden.into());
        }

        self.cache.delete(token).await;
        if !settings.closed {
            self.release(cluster, &settings.pit_id).await;
        }
        self.executor
            .record(AuditAction::CursorClose, ctx, &settings.query, true)
            .await;
        Ok(())
    }
}
