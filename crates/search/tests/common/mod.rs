//! Shared test infrastructure: an in-memory engine, a recording audit sink,
//! and fixture builders.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use helios_search::audit::{AuditAction, AuditSink};
use helios_search::config::GatewayConfig;
use helios_search::engine::{EngineFailure, SearchEngine, SearchRequest};
use helios_search::executor::SearchExecutor;
use helios_search::tenant::{ClusterSettings, RequestContext, StaticTenantResolver};
use helios_search::types::Query;
use parking_lot::Mutex;
use serde_json::{Value, json};

type Scripted = VecDeque<Result<Value, EngineFailure>>;

/// An engine that serves scripted responses per cluster host and records
/// every call.
#[derive(Default)]
pub struct MockEngine {
    searches: Mutex<HashMap<String, Scripted>>,
    scrolls: Mutex<HashMap<String, Scripted>>,
    field_types: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    host_delays: Mutex<HashMap<String, Duration>>,
    pit_counter: AtomicUsize,
    field_type_calls: AtomicUsize,

    /// `(host, request)` of every search.
    pub search_log: Mutex<Vec<(String, SearchRequest)>>,
    /// Scroll ids passed to `scroll`.
    pub scroll_log: Mutex<Vec<String>>,
    /// Indices a point-in-time was opened on.
    pub opened_pits: Mutex<Vec<String>>,
    /// Point-in-time ids released.
    pub closed_pits: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a search result for `host`.
    pub fn push_search(&self, host: &str, result: Result<Value, EngineFailure>) {
        self.searches
            .lock()
            .entry(host.to_string())
            .or_default()
            .push_back(result);
    }

    /// Queues a scroll result for `host`.
    pub fn push_scroll(&self, host: &str, result: Result<Value, EngineFailure>) {
        self.scrolls
            .lock()
            .entry(host.to_string())
            .or_default()
            .push_back(result);
    }

    /// Sets the mapped types returned for every field.
    pub fn set_field_types(&self, types: &[&str]) {
        *self.field_types.lock() = types.iter().map(|t| t.to_string()).collect();
    }

    /// Delays every search by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Delays searches against `host` by `delay`, overriding [`set_delay`](Self::set_delay).
    pub fn set_host_delay(&self, host: &str, delay: Duration) {
        self.host_delays.lock().insert(host.to_string(), delay);
    }

    pub fn field_type_calls(&self) -> usize {
        self.field_type_calls.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> Vec<(String, SearchRequest)> {
        self.search_log.lock().clone()
    }

    pub fn last_search(&self) -> SearchRequest {
        self.search_log
            .lock()
            .last()
            .map(|(_, request)| request.clone())
            .expect("no search was issued")
    }

    fn next(queues: &Mutex<HashMap<String, Scripted>>, host: &str) -> Result<Value, EngineFailure> {
        queues
            .lock()
            .get_mut(host)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(hits_response(&[], 0)))
    }
}

#[async_trait]
impl SearchEngine for MockEngine {
    async fn search(
        &self,
        cluster: &ClusterSettings,
        request: SearchRequest,
    ) -> Result<Value, EngineFailure> {
        let host_delay = self.host_delays.lock().get(&cluster.host).copied();
        let delay = host_delay.or(*self.delay.lock());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.search_log
            .lock()
            .push((cluster.host.clone(), request));
        Self::next(&self.searches, &cluster.host)
    }

    async fn scroll(
        &self,
        cluster: &ClusterSettings,
        scroll_id: &str,
        _keep_alive: Duration,
    ) -> Result<Value, EngineFailure> {
        self.scroll_log.lock().push(scroll_id.to_string());
        Self::next(&self.scrolls, &cluster.host)
    }

    async fn open_point_in_time(
        &self,
        _cluster: &ClusterSettings,
        index: &str,
        _keep_alive: Duration,
    ) -> Result<String, EngineFailure> {
        self.opened_pits.lock().push(index.to_string());
        let n = self.pit_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("pit-{}", n))
    }

    async fn close_point_in_time(
        &self,
        _cluster: &ClusterSettings,
        pit_id: &str,
    ) -> Result<(), EngineFailure> {
        self.closed_pits.lock().push(pit_id.to_string());
        Ok(())
    }

    async fn field_types(
        &self,
        _cluster: &ClusterSettings,
        _index: &str,
        _field: &str,
    ) -> Result<HashSet<String>, EngineFailure> {
        self.field_type_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.field_types.lock().clone())
    }
}

/// Records audit events.
#[derive(Default)]
pub struct RecordingAuditSink {
    pub events: Mutex<Vec<(AuditAction, String, bool)>>,
}

impl RecordingAuditSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(AuditAction, String, bool)> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn query_succeeded(&self, action: AuditAction, user_id: &str, _query: &Query) {
        self.events.lock().push((action, user_id.to_string(), true));
    }

    async fn query_failed(&self, action: AuditAction, user_id: &str, _query: &Query) {
        self.events.lock().push((action, user_id.to_string(), false));
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Cluster host used for `tenant`.
pub fn host_for(tenant: &str) -> String {
    format!("es-{}", tenant)
}

/// Cluster settings for `tenant`.
pub fn cluster_for(tenant: &str) -> ClusterSettings {
    ClusterSettings::new(host_for(tenant)).with_https(false)
}

/// A resolver knowing every tenant in `tenants`.
pub fn resolver(tenants: &[&str]) -> StaticTenantResolver {
    tenants.iter().fold(StaticTenantResolver::new(), |r, t| {
        r.with_tenant(*t, cluster_for(t))
    })
}

/// A context for `user` over `partitions` with one data group.
pub fn context(user: &str, partitions: &str) -> RequestContext {
    RequestContext::new(user, partitions)
        .expect("valid partitions")
        .with_data_groups(vec!["data.default.viewers@opendes.example.com".to_string()])
}

/// An executor over `engine` with the test configuration.
pub fn executor(engine: Arc<MockEngine>, audit: Arc<RecordingAuditSink>) -> SearchExecutor {
    executor_with(GatewayConfig::for_testing(), engine, audit)
}

/// An executor over `engine` with `config`.
pub fn executor_with(
    config: GatewayConfig,
    engine: Arc<MockEngine>,
    audit: Arc<RecordingAuditSink>,
) -> SearchExecutor {
    SearchExecutor::new(Arc::new(config), engine).with_audit(audit)
}

/// A search response with one hit per id; each hit sorts by its position.
pub fn hits_response(ids: &[&str], total: u64) -> Value {
    let hits: Vec<Value> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            json!({
                "_id": id,
                "_source": { "id": id },
                "sort": [1.0, i]
            })
        })
        .collect();
    json!({
        "took": 1,
        "timed_out": false,
        "hits": { "total": { "value": total, "relation": "eq" }, "hits": hits }
    })
}

/// Adds a `pit_id` to a search response.
pub fn with_pit(mut response: Value, pit_id: &str) -> Value {
    response["pit_id"] = json!(pit_id);
    response
}

/// Adds a `_scroll_id` to a search response.
pub fn with_scroll_id(mut response: Value, scroll_id: &str) -> Value {
    response["_scroll_id"] = json!(scroll_id);
    response
}

/// Returns the `id` field of each result.
pub fn result_ids(response: &helios_search::QueryResponse) -> Vec<String> {
    response
        .results
        .iter()
        .map(|doc| doc["id"].as_str().unwrap_or_default().to_string())
        .collect()
}

/// An engine error response.
pub fn engine_error(status: u16, root_cause: &str) -> EngineFailure {
    EngineFailure::from_response(
        status,
        &json!({
            "error": {
                "root_cause": [{ "type": "exception", "reason": root_cause }],
                "type": "search_phase_execution_exception",
                "reason": "all shards failed"
            },
            "status": status
        }),
    )
}
