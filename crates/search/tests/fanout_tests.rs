//! Cross-tenant dispatch and merge tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use helios_search::config::GatewayConfig;
use helios_search::error::{CursorError, GatewayError, TenantError};
use helios_search::fanout::FanoutCoordinator;
use helios_search::pagination::CursorService;
use helios_search::types::Query;
use tokio::time::Instant;

const KIND: &str = "opendes:wks:master-data--Well:1.0.0";

fn coordinator(
    config: GatewayConfig,
    engine: Arc<MockEngine>,
    tenants: &[&str],
) -> FanoutCoordinator {
    let executor = executor_with(config, engine, RecordingAuditSink::new());
    let cursors = CursorService::new(executor.clone());
    FanoutCoordinator::new(Arc::new(resolver(tenants)), executor, cursors)
}

#[tokio::test]
async fn test_single_partition_runs_inline() {
    let engine = MockEngine::new();
    engine.push_search("es-opendes", Ok(hits_response(&["a1", "a2"], 2)));
    let gateway = coordinator(GatewayConfig::for_testing(), engine.clone(), &["opendes"]);

    let response = gateway
        .query(&Query::new(KIND), &context("alice", "opendes"))
        .await
        .unwrap();

    assert_eq!(result_ids(&response), ["a1", "a2"]);
    let hosts: Vec<_> = engine.searches().into_iter().map(|(host, _)| host).collect();
    assert_eq!(hosts, ["es-opendes"]);
}

#[tokio::test]
async fn test_two_partitions_merge_by_total() {
    let engine = MockEngine::new();
    engine.push_search("es-opendes", Ok(hits_response(&["a1", "a2"], 2)));
    engine.push_search("es-tenant2", Ok(hits_response(&["b1", "b2", "b3"], 30)));
    let gateway = coordinator(
        GatewayConfig::for_testing(),
        engine.clone(),
        &["opendes", "tenant2"],
    );

    let response = gateway
        .query(&Query::new(KIND), &context("alice", "opendes,tenant2"))
        .await
        .unwrap();

    assert_eq!(result_ids(&response), ["b1", "a1", "b2", "a2", "b3"]);
    assert_eq!(response.total_count, 32);
    assert!(response.cursor.is_none());

    let mut hosts: Vec<_> = engine.searches().into_iter().map(|(host, _)| host).collect();
    hosts.sort();
    assert_eq!(hosts, ["es-opendes", "es-tenant2"]);
}

#[tokio::test]
async fn test_equal_totals_keep_partition_order() {
    let engine = MockEngine::new();
    engine.push_search("es-opendes", Ok(hits_response(&["a1"], 5)));
    engine.push_search("es-tenant2", Ok(hits_response(&["b1"], 5)));
    let gateway = coordinator(
        GatewayConfig::for_testing(),
        engine,
        &["opendes", "tenant2"],
    );

    let response = gateway
        .query(&Query::new(KIND), &context("alice", "tenant2,opendes"))
        .await
        .unwrap();

    assert_eq!(result_ids(&response), ["b1", "a1"]);
}

#[tokio::test]
async fn test_cross_tenant_disabled() {
    let engine = MockEngine::new();
    let mut config = GatewayConfig::for_testing();
    config.cross_tenant_enabled = false;
    let gateway = coordinator(config, engine.clone(), &["opendes", "tenant2"]);

    let err = gateway
        .query(&Query::new(KIND), &context("alice", "opendes,tenant2"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GatewayError::Tenant(TenantError::CrossTenantDisabled { count: 2 })
    ));
    assert_eq!(err.status_code(), 403);
    assert!(engine.searches().is_empty());
}

#[tokio::test]
async fn test_unresolvable_tenant_aborts() {
    let engine = MockEngine::new();
    let gateway = coordinator(GatewayConfig::for_testing(), engine, &["opendes"]);

    let err = gateway
        .query(&Query::new(KIND), &context("alice", "opendes,unknown"))
        .await
        .unwrap_err();

    match err {
        GatewayError::Tenant(TenantError::Unresolvable { tenant_id }) => {
            assert_eq!(tenant_id.as_str(), "unknown");
        }
        other => panic!("expected unresolvable tenant, got {:?}", other),
    }
}

#[tokio::test]
async fn test_tenant_failure_aborts() {
    let engine = MockEngine::new();
    engine.push_search("es-opendes", Ok(hits_response(&["a1"], 1)));
    engine.push_search("es-tenant2", Err(engine_error(404, "no such index [x]")));
    let gateway = coordinator(
        GatewayConfig::for_testing(),
        engine,
        &["opendes", "tenant2"],
    );

    let err = gateway
        .query(&Query::new(KIND), &context("alice", "opendes,tenant2"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test(start_paused = true)]
async fn test_tenant_failure_releases_cursors_still_in_flight() {
    let engine = MockEngine::new();
    engine.set_host_delay("es-opendes", Duration::from_secs(1));
    engine.push_search("es-opendes", Ok(hits_response(&["a1", "a2"], 9)));
    engine.push_search("es-tenant2", Err(engine_error(404, "no such index [x]")));
    let gateway = coordinator(
        GatewayConfig::for_testing(),
        engine.clone(),
        &["opendes", "tenant2"],
    );

    let err = gateway
        .cursor_query(&Query::new(KIND).with_limit(2), &context("alice", "opendes,tenant2"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);

    // Both tenants opened a point-in-time; neither is left open.
    assert_eq!(engine.opened_pits.lock().len(), 2);
    let mut closed = engine.closed_pits.lock().clone();
    closed.sort();
    assert_eq!(closed, ["pit-1", "pit-2"]);
    assert_eq!(engine.searches().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_fanout_is_bounded_by_worker_count() {
    let engine = MockEngine::new();
    engine.set_delay(Duration::from_secs(1));
    let tenants = ["t1", "t2", "t3", "t4"];
    let gateway = coordinator(GatewayConfig::for_testing(), engine.clone(), &tenants);

    let started = Instant::now();
    gateway
        .query(&Query::new(KIND), &context("alice", "t1,t2,t3,t4"))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // Two workers, four one-second searches.
    assert!(elapsed >= Duration::from_secs(2), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(3), "elapsed {:?}", elapsed);
    assert_eq!(engine.searches().len(), 4);
}

#[tokio::test]
async fn test_cross_tenant_cursor_first_page_only() {
    let engine = MockEngine::new();
    engine.push_search("es-opendes", Ok(hits_response(&["a1", "a2"], 9)));
    engine.push_search("es-tenant2", Ok(hits_response(&["b1", "b2"], 4)));
    let gateway = coordinator(
        GatewayConfig::for_testing(),
        engine.clone(),
        &["opendes", "tenant2"],
    );
    let ctx = context("alice", "opendes,tenant2");

    let query = Query::new(KIND).with_limit(2);
    let response = gateway.cursor_query(&query, &ctx).await.unwrap();

    assert_eq!(result_ids(&response), ["a1", "b1", "a2", "b2"]);
    assert_eq!(response.total_count, 13);
    assert!(response.cursor.is_none());

    let mut closed = engine.closed_pits.lock().clone();
    closed.sort();
    assert_eq!(closed, ["pit-1", "pit-2"]);

    let err = gateway
        .cursor_query(&Query::new(KIND).with_cursor("ABC"), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Cursor(CursorError::InvalidOrExpired)));
}

#[tokio::test]
async fn test_single_partition_cursor_round_trip() {
    let engine = MockEngine::new();
    engine.push_search("es-opendes", Ok(hits_response(&["a1", "a2"], 3)));
    engine.push_search("es-opendes", Ok(hits_response(&["a3"], 3)));
    let gateway = coordinator(GatewayConfig::for_testing(), engine.clone(), &["opendes"]);
    let ctx = context("alice", "opendes");

    let first = gateway
        .cursor_query(&Query::new(KIND).with_limit(2), &ctx)
        .await
        .unwrap();
    let token = first.cursor.unwrap();

    let second = gateway
        .cursor_query(&Query::new(KIND).with_cursor(token.clone()), &ctx)
        .await
        .unwrap();
    assert_eq!(result_ids(&second), ["a3"]);
    assert_eq!(second.total_count, 3);

    gateway.close_cursor(&token, &ctx).await.unwrap();
    let err = gateway
        .cursor_query(&Query::new(KIND).with_cursor(token), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Cursor(CursorError::InvalidOrExpired)));
}
