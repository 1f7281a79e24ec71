//! API endpoint tests
//!
//! Start the real server on an ephemeral port and talk to it over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use game_health::api::{
    ApiConfig, ApiState, HealthResponse, MuteResponse, TargetStatusResponse, spawn_api_server,
};
use game_health::actors::supervisor::SupervisorHandle;
use game_health::models::{HealthyStatus, SerialNumber};
use game_health::ratelimit::{CounterStore, MemoryCounterStore, RateLimitPolicy, RateLimiter};
use game_health::storage::memory::MemoryStore;
use game_health::storage::{StatusStore, StoreError, StoreResult};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;

use crate::helpers::*;

struct TestApi {
    base: String,
    store: Arc<MemoryStore>,
    supervisor: SupervisorHandle,
    client: reqwest::Client,
}

impl TestApi {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

async fn create_test_api(counters: Arc<dyn CounterStore>, limit: u64) -> TestApi {
    let store = Arc::new(MemoryStore::new());
    store.put_target(create_test_target("lobby", 5050)).await;

    let supervisor = spawn_supervisor(create_test_stores(&store, false));
    let policy = RateLimitPolicy {
        window: Duration::from_secs(60),
        limit,
    };
    let state = ApiState::new(
        supervisor.clone(),
        store.clone(),
        RateLimiter::new(counters),
        policy,
    );
    let config = ApiConfig {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        rate_limit: policy,
    };
    let addr = spawn_api_server(config, state).await.unwrap();

    TestApi {
        base: format!("http://{addr}"),
        store,
        supervisor,
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn test_health_counts_running_targets() {
    let api = create_test_api(Arc::new(MemoryCounterStore::new()), 100).await;

    let health: HealthResponse = api
        .client
        .get(api.url("/api/v1/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.targets, 0);

    let response = api
        .client
        .post(api.url("/api/v1/reconcile"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary: serde_json::Value = response.json().await.unwrap();
    assert_eq!(summary["started"], serde_json::json!(["lobby"]));

    let health: HealthResponse = api
        .client
        .get(api.url("/api/v1/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.targets, 1);

    api.supervisor.shutdown().await;
}

#[tokio::test]
async fn test_target_status() {
    let api = create_test_api(Arc::new(MemoryCounterStore::new()), 100).await;
    api.store
        .set_status(&SerialNumber::from("lobby"), HealthyStatus::Yellow)
        .await
        .unwrap();

    let status: TargetStatusResponse = api
        .client
        .get(api.url("/api/v1/targets/lobby/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        status,
        TargetStatusResponse {
            id: SerialNumber::from("lobby"),
            status: HealthyStatus::Yellow,
            running: false,
            muted: false,
        }
    );

    let status: TargetStatusResponse = api
        .client
        .get(api.url("/api/v1/targets/nobody/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status.status, HealthyStatus::Unknown);

    api.supervisor.shutdown().await;
}

#[tokio::test]
async fn test_mute_requires_running_target() {
    let api = create_test_api(Arc::new(MemoryCounterStore::new()), 100).await;

    let response = api
        .client
        .put(api.url("/api/v1/targets/lobby/mute"))
        .json(&serde_json::json!({"muted": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    api.supervisor.reconcile().await.unwrap();

    let response = api
        .client
        .put(api.url("/api/v1/targets/lobby/mute"))
        .json(&serde_json::json!({"muted": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: MuteResponse = response.json().await.unwrap();
    assert_eq!(
        body,
        MuteResponse {
            id: SerialNumber::from("lobby"),
            muted: true,
        }
    );

    let status: TargetStatusResponse = api
        .client
        .get(api.url("/api/v1/targets/lobby/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(status.running);
    assert!(status.muted);

    api.supervisor.shutdown().await;
}

#[tokio::test]
async fn test_requests_over_limit_are_refused() {
    let api = create_test_api(Arc::new(MemoryCounterStore::new()), 3).await;

    for _ in 0..3 {
        let response = api
            .client
            .get(api.url("/api/v1/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = api
        .client
        .get(api.url("/api/v1/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // a different path has its own window
    let response = api
        .client
        .get(api.url("/api/v1/targets/lobby/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    api.supervisor.shutdown().await;
}

struct OfflineCounters;

#[async_trait]
impl CounterStore for OfflineCounters {
    async fn incr_with_expiry(&self, _key: &str, _window: Duration) -> StoreResult<u64> {
        Err(StoreError::ConnectionFailed("counter store offline".to_string()))
    }
}

#[tokio::test]
async fn test_unavailable_limiter_admits_requests() {
    let api = create_test_api(Arc::new(OfflineCounters), 1).await;

    for _ in 0..3 {
        let response = api
            .client
            .get(api.url("/api/v1/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    api.supervisor.shutdown().await;
}
