//! End-to-end alerting tests
//!
//! Prober, report store, alert loop and webhook sink wired together by the
//! supervisor, running on the real clock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use game_health::models::{HealthyStatus, Report, SerialNumber};
use game_health::storage::memory::MemoryStore;
use game_health::storage::{ReportRecorder, StatusStore};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn webhook_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

async fn seed(store: &MemoryStore, port: u16, server: &MockServer, mute: bool) -> SerialNumber {
    store.put_group(create_test_group("local", &["127.0.0.1"])).await;
    store
        .put_notifier(create_webhook_notifier(
            "ops",
            &format!("{}/alerts", server.uri()),
        ))
        .await;

    let mut target = create_test_target("lobby", port);
    target.groups = vec![SerialNumber::from("local")];
    target.notifiers = vec![SerialNumber::from("ops")];
    target.mute = mute;
    let id = target.id.clone();
    store.put_target(target).await;
    id
}

#[tokio::test]
async fn test_unreachable_fleet_turns_red_and_alerts() {
    let server = webhook_server().await;
    let store = Arc::new(MemoryStore::new());
    let id = seed(&store, closed_port().await, &server, false).await;

    let supervisor = spawn_supervisor(create_test_stores(&store, true));
    let summary = supervisor.reconcile().await.unwrap();
    assert_eq!(summary.started, vec![id.clone()]);

    let alerted = wait_until(Duration::from_secs(5), || async {
        !server.received_requests().await.unwrap_or_default().is_empty()
    })
    .await;
    assert!(alerted, "no alert delivered");
    assert_eq!(store.get_status(&id).await, HealthyStatus::Red);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["target"], "lobby");
    assert_eq!(body["status"], "red");
    assert!(body["failed"].as_u64().unwrap() >= 1);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_muted_target_is_red_but_silent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({"status": "red"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let id = seed(&store, closed_port().await, &server, true).await;

    let supervisor = spawn_supervisor(create_test_stores(&store, true));
    supervisor.reconcile().await.unwrap();

    let red = wait_until(Duration::from_secs(5), || async {
        store.get_status(&id).await == HealthyStatus::Red
    })
    .await;
    assert!(red);

    // another full sampling period without a delivery
    tokio::time::sleep(Duration::from_millis(400)).await;
    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_unmute_resumes_alerts() {
    let server = webhook_server().await;
    let store = Arc::new(MemoryStore::new());
    let id = seed(&store, closed_port().await, &server, true).await;

    let supervisor = spawn_supervisor(create_test_stores(&store, true));
    supervisor.reconcile().await.unwrap();

    wait_until(Duration::from_secs(5), || async {
        store.get_status(&id).await == HealthyStatus::Red
    })
    .await;
    assert!(server.received_requests().await.unwrap().is_empty());

    supervisor.mute(id.clone(), false).await.unwrap();
    let alerted = wait_until(Duration::from_secs(5), || async {
        !server.received_requests().await.unwrap_or_default().is_empty()
    })
    .await;
    assert!(alerted);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_listening_fleet_is_green() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });

    let server = webhook_server().await;
    let store = Arc::new(MemoryStore::new());
    let id = seed(&store, port, &server, false).await;

    let supervisor = spawn_supervisor(create_test_stores(&store, true));
    supervisor.reconcile().await.unwrap();

    let green = wait_until(Duration::from_secs(5), || async {
        store.get_status(&id).await == HealthyStatus::Green
    })
    .await;
    assert!(green);
    assert!(server.received_requests().await.unwrap().is_empty());

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_externally_recorded_reports() {
    let server = webhook_server().await;
    let store = Arc::new(MemoryStore::new());
    let id = seed(&store, 5050, &server, false).await;

    let supervisor = spawn_supervisor(create_test_stores(&store, false));
    supervisor.reconcile().await.unwrap();

    let feeder = {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move {
            loop {
                let _ = store.record_report(Report::new(id.clone(), Utc::now(), 5, 0)).await;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
    };

    let green = wait_until(Duration::from_secs(5), || async {
        store.get_status(&id).await == HealthyStatus::Green
    })
    .await;
    assert!(green);

    feeder.abort();
    let unknown = wait_until(Duration::from_secs(5), || async {
        store.get_status(&id).await == HealthyStatus::Unknown
    })
    .await;
    assert!(unknown, "a tick without reports reads unknown");

    supervisor.shutdown().await;
}
