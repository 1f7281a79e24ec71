//! Detector tests against real sockets
//!
//! Builds detectors from stored groups and probes local listeners.

use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use game_health::detectors::{Detector, DetectorRegistry};
use game_health::models::{CheckKind, SerialNumber};
use game_health::storage::StoreError;
use game_health::storage::memory::MemoryStore;
use game_health::Error;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_open_and_closed_endpoints() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().port();
    let closed = closed_port().await;

    let store = MemoryStore::new();
    store.put_group(create_test_group("up", &["127.0.0.1"])).await;

    let registry = DetectorRegistry::with_defaults();

    let mut target = create_test_target("lobby", open);
    target.groups = vec![SerialNumber::from("up")];
    let detector = Detector::build(&registry, &store, &target).await.unwrap();
    let batch = detector.probe(&CancellationToken::new()).await;
    assert_eq!(batch.len(), 1);
    assert!(batch[0].is_success());

    let mut target = create_test_target("lobby", closed);
    target.groups = vec![SerialNumber::from("up")];
    let detector = Detector::build(&registry, &store, &target).await.unwrap();

    let started = Instant::now();
    let batch = detector.probe(&CancellationToken::new()).await;
    assert!(started.elapsed() < target.timeout + Duration::from_millis(500));
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].failed, 1);
    assert!(!batch[0].response.is_empty());
}

#[tokio::test]
async fn test_large_fleet_is_truncated() {
    let port = closed_port().await;
    let store = MemoryStore::new();
    store
        .put_group(create_test_group("fleet", &["127.0.[0-1].[1-150]"]))
        .await;

    let mut target = create_test_target("fleet", port);
    target.groups = vec![SerialNumber::from("fleet")];

    let detector = Detector::build(&DetectorRegistry::with_defaults(), &store, &target)
        .await
        .unwrap();
    assert_eq!(detector.addresses().len(), 255);

    let batch = detector.probe(&CancellationToken::new()).await;
    assert_eq!(batch.len(), 255);
    assert!(batch.iter().all(|outcome| outcome.failed == 1));
    assert_eq!(batch[0].address, format!("127.0.0.1:{port}"));
}

#[tokio::test]
async fn test_endpoints_of_every_group_are_probed() {
    let port = closed_port().await;
    let store = MemoryStore::new();
    store.put_group(create_test_group("a", &["127.0.0.[1-3]"])).await;
    let mut b = create_test_group("b", &["127.0.1.[1-4]"]);
    b.excluded = vec!["127.0.1.4".to_string()];
    store.put_group(b).await;

    let mut target = create_test_target("multi", port);
    target.groups = vec![SerialNumber::from("a"), SerialNumber::from("b")];

    let detector = Detector::build(&DetectorRegistry::with_defaults(), &store, &target)
        .await
        .unwrap();
    let batch = detector.probe(&CancellationToken::new()).await;

    assert_eq!(batch.len(), 6);
    assert!(!batch.iter().any(|o| o.address.starts_with("127.0.1.4:")));
}

#[tokio::test]
async fn test_http_detector_against_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    store.put_group(create_test_group("web", &["127.0.0.1"])).await;

    let mut target = create_test_target("web", server.address().port());
    target.kind = CheckKind::http();
    target.location = Some("healthz".to_string());
    target.groups = vec![SerialNumber::from("web")];

    let detector = Detector::build(&DetectorRegistry::with_defaults(), &store, &target)
        .await
        .unwrap();
    let batch = detector.probe(&CancellationToken::new()).await;
    assert!(batch[0].is_success(), "{:?}", batch[0]);

    target.accept_codes = vec![200];
    let detector = Detector::build(&DetectorRegistry::with_defaults(), &store, &target)
        .await
        .unwrap();
    let batch = detector.probe(&CancellationToken::new()).await;
    assert_eq!(batch[0].failed, 1);
    assert!(batch[0].response.contains("204"));
}

#[tokio::test]
async fn test_build_failures() {
    let store = Arc::new(MemoryStore::new());
    let registry = DetectorRegistry::with_defaults();

    let mut target = create_test_target("ghost", 5050);
    target.groups = vec![SerialNumber::from("missing")];
    let err = Detector::build(&registry, store.as_ref(), &target)
        .await
        .err()
        .unwrap();
    assert_matches!(err, Error::Store(StoreError::NotFound(_)));

    let mut target = create_test_target("udp", 5050);
    target.kind = CheckKind::new("udp");
    let err = Detector::build(&registry, store.as_ref(), &target)
        .await
        .err()
        .unwrap();
    assert_matches!(err, Error::UnknownCheckKind(kind) if kind == "udp");

    let target = create_test_target("zero", 0);
    let err = Detector::build(&registry, store.as_ref(), &target)
        .await
        .err()
        .unwrap();
    assert_matches!(err, Error::InvalidTarget(_));
}
