//! Reconcile tests
//!
//! Drive the supervisor through configuration changes made the way the
//! control plane makes them: saving records bumps their versions.

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use game_health::Error;
use game_health::actors::supervisor::Stores;
use game_health::models::{CheckKind, ConfigSet, Group, NotifierRef, SerialNumber, Target};
use game_health::storage::memory::MemoryStore;
use game_health::storage::{ConfigStore, StoreError, StoreResult};
use tokio::sync::Mutex;

use crate::helpers::*;

fn ids(names: &[&str]) -> Vec<SerialNumber> {
    names.iter().map(|n| SerialNumber::from(*n)).collect()
}

#[tokio::test]
async fn test_group_change_restarts_only_its_targets() {
    let store = Arc::new(MemoryStore::new());
    store.put_group(create_test_group("eu", &["127.0.0.1"])).await;
    store.put_group(create_test_group("us", &["127.0.0.2"])).await;

    let mut lobby = create_test_target("lobby", 5050);
    lobby.groups = ids(&["eu"]);
    let mut arena = create_test_target("arena", 5051);
    arena.groups = ids(&["us"]);
    store.put_target(lobby).await;
    store.put_target(arena).await;

    let supervisor = spawn_supervisor(create_test_stores(&store, false));

    let summary = supervisor.reconcile().await.unwrap();
    assert_eq!(summary.started, ids(&["arena", "lobby"]));
    assert!(summary.stopped.is_empty());

    assert!(supervisor.reconcile().await.unwrap().is_noop());

    store
        .put_group(create_test_group("eu", &["127.0.0.[1-2]"]))
        .await;
    let summary = supervisor.reconcile().await.unwrap();
    assert_eq!(summary.stopped, ids(&["lobby"]));
    assert_eq!(summary.started, ids(&["lobby"]));
    assert_eq!(supervisor.running().await.unwrap(), ids(&["arena", "lobby"]));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_deleted_target_is_stopped() {
    let store = Arc::new(MemoryStore::new());
    store.put_target(create_test_target("lobby", 5050)).await;
    store.put_target(create_test_target("arena", 5051)).await;

    let supervisor = spawn_supervisor(create_test_stores(&store, false));
    supervisor.reconcile().await.unwrap();

    assert!(store.delete_target(&SerialNumber::from("arena")).await);
    let summary = supervisor.reconcile().await.unwrap();
    assert_eq!(summary.stopped, ids(&["arena"]));
    assert!(summary.started.is_empty());
    assert_eq!(supervisor.running().await.unwrap(), ids(&["lobby"]));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_invalid_target_is_reported_and_retried() {
    let store = Arc::new(MemoryStore::new());
    let mut broken = create_test_target("broken", 5050);
    broken.kind = CheckKind::new("udp");
    store.put_target(broken.clone()).await;

    let supervisor = spawn_supervisor(create_test_stores(&store, false));

    let summary = supervisor.reconcile().await.unwrap();
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, SerialNumber::from("broken"));
    assert!(supervisor.running().await.unwrap().is_empty());

    // still failing, still reported
    let summary = supervisor.reconcile().await.unwrap();
    assert_eq!(summary.failed.len(), 1);

    broken.kind = CheckKind::tcp();
    store.put_target(broken).await;
    let summary = supervisor.reconcile().await.unwrap();
    assert_eq!(summary.started, ids(&["broken"]));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_notifier_change_restarts_target() {
    let store = Arc::new(MemoryStore::new());
    store
        .put_notifier(create_webhook_notifier("ops", "http://127.0.0.1:9/hook"))
        .await;
    let mut lobby = create_test_target("lobby", 5050);
    lobby.notifiers = ids(&["ops"]);
    store.put_target(lobby).await;

    let supervisor = spawn_supervisor(create_test_stores(&store, false));
    supervisor.reconcile().await.unwrap();

    store
        .put_notifier(create_webhook_notifier("ops", "http://127.0.0.1:9/other"))
        .await;
    let summary = supervisor.reconcile().await.unwrap();
    assert_eq!(summary.started, ids(&["lobby"]));
    assert_eq!(summary.stopped, ids(&["lobby"]));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_mute_survives_group_edit() {
    let store = Arc::new(MemoryStore::new());
    store.put_group(create_test_group("eu", &["127.0.0.1"])).await;
    let mut lobby = create_test_target("lobby", 5050);
    lobby.groups = ids(&["eu"]);
    store.put_target(lobby).await;

    let supervisor = spawn_supervisor(create_test_stores(&store, false));
    supervisor.reconcile().await.unwrap();
    let id = SerialNumber::from("lobby");
    supervisor.mute(id.clone(), true).await.unwrap();

    let mut eu = create_test_group("eu", &["127.0.0.1"]);
    eu.name = "europe".to_string();
    store.put_group(eu).await;
    let summary = supervisor.reconcile().await.unwrap();
    assert_eq!(summary.started, ids(&["lobby"]));
    assert!(supervisor.is_muted(id).await.unwrap());

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_mute_unknown_target() {
    let store = Arc::new(MemoryStore::new());
    let supervisor = spawn_supervisor(create_test_stores(&store, false));
    supervisor.reconcile().await.unwrap();

    let err = supervisor
        .mute(SerialNumber::from("nobody"), true)
        .await
        .unwrap_err();
    assert_matches!(
        err.downcast_ref::<Error>(),
        Some(Error::NotRunning(id)) if id.as_str() == "nobody"
    );

    supervisor.shutdown().await;
}

/// Config store that can be switched into failing mode
struct FlakyConfig {
    inner: MemoryStore,
    failing: Mutex<bool>,
}

#[async_trait]
impl ConfigStore for FlakyConfig {
    async fn fetch_target(&self, id: &SerialNumber) -> StoreResult<Target> {
        self.inner.fetch_target(id).await
    }

    async fn fetch_all_targets(&self) -> StoreResult<ConfigSet> {
        if *self.failing.lock().await {
            return Err(StoreError::ConnectionFailed("store offline".to_string()));
        }
        self.inner.fetch_all_targets().await
    }

    async fn fetch_group(&self, id: &SerialNumber) -> StoreResult<Group> {
        self.inner.fetch_group(id).await
    }

    async fn fetch_notifier(&self, id: &SerialNumber) -> StoreResult<NotifierRef> {
        self.inner.fetch_notifier(id).await
    }
}

#[tokio::test]
async fn test_failed_load_keeps_loops_running() {
    let inner = MemoryStore::new();
    inner.put_target(create_test_target("lobby", 5050)).await;
    let config = Arc::new(FlakyConfig {
        inner,
        failing: Mutex::new(false),
    });
    let memory = Arc::new(MemoryStore::new());

    let stores = Stores {
        config: config.clone(),
        reports: memory.clone(),
        status: memory.clone(),
        recorder: None,
    };
    let supervisor = spawn_supervisor(stores);
    supervisor.reconcile().await.unwrap();

    *config.failing.lock().await = true;
    assert!(supervisor.reconcile().await.is_err());
    assert_eq!(supervisor.running().await.unwrap(), ids(&["lobby"]));

    *config.failing.lock().await = false;
    assert!(supervisor.reconcile().await.unwrap().is_noop());

    supervisor.shutdown().await;
}
