//! Scroll-context pagination.
//!
//! The first page opens an engine scroll context; every later page resumes
//! it with a refreshed keep-alive. The engine expires contexts on its own,
//! so there is nothing to release on close.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use super::{CursorCache, Paginator, cursor_token};
use crate::audit::AuditAction;
use crate::engine::SearchRequest;
use crate::error::{CursorError, GatewayResult};
use crate::executor::{SearchExecutor, parse_response};
use crate::tenant::{ClusterSettings, RequestContext};
use crate::types::{CursorQueryResponse, Query};

/// Cache entry of a scroll cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorSettings {
    /// Engine scroll context id.
    pub scroll_id: String,
    /// The user who opened the cursor.
    pub user_id: String,
}

/// Order-stable sort used when the request gives none.
pub fn default_scroll_sort() -> Value {
    json!([
        { "_score": { "order": "desc" } },
        { "_doc": { "order": "asc" } }
    ])
}

/// Pages through results with engine scroll contexts.
pub struct ScrollPaginator {
    executor: SearchExecutor,
    cache: Arc<dyn CursorCache<CursorSettings>>,
}

impl ScrollPaginator {
    /// Creates a paginator storing cursors in `cache`.
    pub fn new(executor: SearchExecutor, cache: Arc<dyn CursorCache<CursorSettings>>) -> Self {
        Self { executor, cache }
    }

    async fn open(
        &self,
        query: &Query,
        ctx: &RequestContext,
        cluster: &ClusterSettings,
    ) -> GatewayResult<CursorQueryResponse> {
        let mut prepared = self.executor.prepare(query, ctx, cluster).await?;
        if query.sort.is_none() {
            prepared
                .body
                .insert("sort".to_string(), default_scroll_sort());
        }

        let request = SearchRequest::new(prepared.index, Value::Object(prepared.body))
            .with_scroll(self.executor.config().keep_alive());
        let body = self
            .executor
            .search(cluster, request, &prepared.failure)
            .await?;
        let response = parse_response(&body);

        match body["_scroll_id"].as_str() {
            Some(scroll_id) if !response.is_empty() => {
                let token = self.store(scroll_id, ctx).await;
                info!(cursor = %token, total = response.total_count, "Opened scroll cursor");
                Ok(response.with_cursor(token))
            }
            _ => Ok(response),
        }
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

        let failure = self.executor.failure_context(query);
        let body = self
            .executor
            .scroll(cluster, &settings.scroll_id, &failure)
            .await?;
        let response = parse_response(&body);

        if response.is_empty() {
            debug!(cursor = %token, "Scroll exhausted");
            self.cache.delete(token).await;
            return Ok(response);
        }

        let scroll_id = body["_scroll_id"].as_str().unwrap_or(&settings.scroll_id);
        let next = self.store(scroll_id, ctx).await;
        if next != token {
            self.cache.delete(token).await;
        }
        Ok(response.with_cursor(next))
    }

    async fn store(&self, scroll_id: &str, ctx: &RequestContext) -> String {
        let token = cursor_token(scroll_id);
        let settings = CursorSettings {
            scroll_id: scroll_id.to_string(),
            user_id: ctx.user_id().to_string(),
        };
        self.cache.put(&token, settings).await;
        token
    }
}

#[async_trait]
impl Paginator for ScrollPaginator {
    #[instrument(skip_all, fields(strategy = "scroll", cursor = query.cursor_token().unwrap_or("")))]
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

    async fn close(
        &self,
        token: &str,
        _ctx: &RequestContext,
        _cluster: &ClusterSettings,
    ) -> GatewayResult<()> {
        debug!(cursor = %token, "Scroll cursors expire with their keep-alive");
        Ok(())
    }
}
