//! Cursor pagination.
//!
//! Two strategies are available and one is chosen per deployment:
//!
//! | Strategy | Engine resource | Close |
//! |----------|-----------------|-------|
//! | [`ScrollPaginator`] | scroll context | expires with keep-alive |
//! | [`SearchAfterPaginator`] | point-in-time + `search_after` | explicit, idempotent |
//!
//! Cursor tokens handed to clients are digests of the engine context id, so a
//! token cannot be turned back into an engine id and the same id always maps
//! to the same token. Cursors belong to the user who opened them; presenting
//! someone else's token fails with [`CursorError::SharingForbidden`], which
//! is distinct from an unknown token ([`CursorError::InvalidOrExpired`]).
//!
//! [`CursorError::SharingForbidden`]: crate::error::CursorError::SharingForbidden
//! [`CursorError::InvalidOrExpired`]: crate::error::CursorError::InvalidOrExpired

mod cache;
mod file;
mod scroll;
mod search_after;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::PaginationStrategy;
use crate::error::GatewayResult;
use crate::executor::SearchExecutor;
use crate::tenant::{ClusterSettings, RequestContext};
use crate::types::{CursorQueryResponse, Query};

pub use cache::{CursorCache, InMemoryCursorCache};
pub use file::FileCursorCache;
pub use scroll::{CursorSettings, ScrollPaginator, default_scroll_sort};
pub use search_after::{SearchAfterPaginator, SearchAfterSettings, default_search_after_sort};

/// Returns the client-facing token for an engine context id.
///
/// The token is the uppercase hex MD5 digest of the id.
pub fn cursor_token(context_id: &str) -> String {
    hex::encode_upper(md5::compute(context_id.as_bytes()).0)
}

/// One pagination strategy.
#[async_trait]
pub trait Paginator: Send + Sync {
    /// Serves the first page (no cursor on `query`) or the next page.
    async fn query(
        &self,
        query: &Query,
        ctx: &RequestContext,
        cluster: &ClusterSettings,
    ) -> GatewayResult<CursorQueryResponse>;

    /// Releases a cursor. Unknown tokens are ignored.
    async fn close(
        &self,
        token: &str,
        ctx: &RequestContext,
        cluster: &ClusterSettings,
    ) -> GatewayResult<()>;
}

/// Cursor queries through the configured strategy.
#[derive(Clone)]
pub struct CursorService {
    strategy: PaginationStrategy,
    paginator: Arc<dyn Paginator>,
}

impl std::fmt::Debug for CursorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorService")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl CursorService {
    /// Creates a service for the executor's configured strategy, backed by an
    /// in-memory cursor cache.
    pub fn new(executor: SearchExecutor) -> Self {
        let ttl = executor.config().cache_expiration();
        match executor.config().pagination {
            PaginationStrategy::Scroll => {
                Self::scroll(executor, Arc::new(InMemoryCursorCache::new(ttl)))
            }
            PaginationStrategy::SearchAfter => {
                Self::search_after(executor, Arc::new(InMemoryCursorCache::new(ttl)))
            }
        }
    }

    /// Creates a service for the executor's configured strategy whose cursors
    /// are persisted to `path`, so a later process can resume them.
    pub fn with_cache_file(executor: SearchExecutor, path: &Path) -> Self {
        let ttl = executor.config().cache_expiration();
        match executor.config().pagination {
            PaginationStrategy::Scroll => {
                Self::scroll(executor, Arc::new(FileCursorCache::new(path, ttl)))
            }
            PaginationStrategy::SearchAfter => {
                Self::search_after(executor, Arc::new(FileCursorCache::new(path, ttl)))
            }
        }
    }

    /// Creates a scroll-backed service.
    pub fn scroll(executor: SearchExecutor, cache: Arc<dyn CursorCache<CursorSettings>>) -> Self {
        Self {
            strategy: PaginationStrategy::Scroll,
            paginator: Arc::new(ScrollPaginator::new(executor, cache)),
        }
    }

    /// Creates a search-after-backed service.
    pub fn search_after(
        executor: SearchExecutor,
        cache: Arc<dyn CursorCache<SearchAfterSettings>>,
    ) -> Self {
        Self {
            strategy: PaginationStrategy::SearchAfter,
            paginator: Arc::new(SearchAfterPaginator::new(executor, cache)),
        }
    }

    /// Returns the active strategy.
    pub fn strategy(&self) -> PaginationStrategy {
        self.strategy
    }

    /// Serves a cursor page.
    pub async fn query(
        &self,
        query: &Query,
        ctx: &RequestContext,
        cluster: &ClusterSettings,
    ) -> GatewayResult<CursorQueryResponse> {
        self.paginator.query(query, ctx, cluster).await
    }

    /// Closes a cursor.
    pub async fn close(
        &self,
        token: &str,
        ctx: &RequestContext,
        cluster: &ClusterSettings,
    ) -> GatewayResult<()> {
        self.paginator.close(token, ctx, cluster).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_token_is_stable_digest() {
        let token = cursor_token("FGluY2x1ZGVfY29udGV4dF91dWlkDXF1ZXJ5QW5kRmV0Y2gBFkQ");
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_eq!(
            token,
            cursor_token("FGluY2x1ZGVfY29udGV4dF91dWlkDXF1ZXJ5QW5kRmV0Y2gBFkQ")
        );
        assert_ne!(token, cursor_token("another"));
    }

    #[test]
    fn test_cursor_token_known_value() {
        assert_eq!(cursor_token(""), "D41D8CD98F00B204E9800998ECF8427E");
    }
}
