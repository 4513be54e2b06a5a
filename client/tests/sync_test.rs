//! Integration tests for the sync coordinator.
//!
//! All tests run against the in-process backend; two coordinators holding
//! the same backend stand in for two devices sharing a database.

use std::path::Path;

use serde_json::json;
use tempfile::TempDir;

use crema_client::{
    ConnectionState, LocalStore, RemoteBackend, RemoteConfig, SyncError, SyncStatus,
    SyncedCatalog, STATUS_RESET,
};
use crema_engine::{CategoryFilter, Dataset, PriceDirection};

fn open_app(dir: &Path) -> SyncedCatalog {
    SyncedCatalog::open(LocalStore::open(dir).unwrap())
}

fn test_config() -> RemoteConfig {
    RemoteConfig::new("https://crema.example.io", "secret-key", "crema-test")
}

async fn connected_app(backend: &RemoteBackend, dir: &TempDir) -> SyncedCatalog {
    let mut app = open_app(dir.path());
    app.configure_remote(backend, test_config()).await.unwrap();
    app
}

#[tokio::test]
async fn catalog_survives_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let mut app = open_app(dir.path());
        let id = app
            .add_product("Guatemala Antigua", "11.25", "Arabica")
            .await
            .unwrap();
        assert_eq!(id, 6);
    }

    let app = open_app(dir.path());
    assert_eq!(app.catalog().products().len(), 6);
    assert_eq!(app.catalog().product(6).unwrap().name, "Guatemala Antigua");
}

#[tokio::test]
async fn configure_seeds_an_empty_namespace() {
    let backend = RemoteBackend::new();
    let dir = TempDir::new().unwrap();

    let app = connected_app(&backend, &dir).await;

    assert_eq!(app.connection_state(), ConnectionState::ConnectedIdle);
    assert_eq!(backend.dataset_count(), 2); // products + categories
    assert!(app.watermark().last_update() > 0);
}

#[tokio::test]
async fn configure_is_idempotent() {
    let backend = RemoteBackend::new();
    let dir = TempDir::new().unwrap();

    let mut app = connected_app(&backend, &dir).await;
    assert_eq!(backend.subscriber_count(), 2);

    app.configure_remote(&backend, test_config()).await.unwrap();
    assert_eq!(backend.subscriber_count(), 2); // no duplicate subscriptions
}

#[tokio::test]
async fn reconfigure_with_new_credentials_resubscribes() {
    let backend = RemoteBackend::new();
    let dir = TempDir::new().unwrap();

    let mut app = connected_app(&backend, &dir).await;

    let other = RemoteConfig::new("https://crema.example.io", "secret-key", "second-shop");
    app.configure_remote(&backend, other.clone()).await.unwrap();

    assert_eq!(backend.subscriber_count(), 2); // old pair was torn down
    assert_eq!(app.remote_config(), Some(&other));
}

#[tokio::test]
async fn refused_connection_leaves_local_state_alone() {
    let backend = RemoteBackend::new();
    let dir = TempDir::new().unwrap();

    backend.refuse_connections(true);

    let mut app = open_app(dir.path());
    let result = app.configure_remote(&backend, test_config()).await;

    assert!(matches!(result, Err(SyncError::Connection(_))));
    assert_eq!(app.status(), SyncStatus::Error);
    assert_eq!(app.connection_state(), ConnectionState::Error);
    assert_eq!(app.catalog().products().len(), 5);
}

#[tokio::test]
async fn mutation_propagates_between_clients() {
    let backend = RemoteBackend::new();
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let mut a = connected_app(&backend, &dir_a).await;
    let id = a
        .add_product("Guatemala Antigua", "11.25", "Arabica")
        .await
        .unwrap();

    // B joins afterwards; the initial subscription delivery carries A's state
    let mut b = connected_app(&backend, &dir_b).await;
    let applied = b.pump_remote().unwrap();

    assert!(applied >= 1);
    assert_eq!(b.catalog().products().len(), 6);
    assert_eq!(b.catalog().product(id).unwrap().name, "Guatemala Antigua");
}

#[tokio::test]
async fn category_delete_reaches_the_other_client() {
    let backend = RemoteBackend::new();
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let mut a = connected_app(&backend, &dir_a).await;
    let mut b = connected_app(&backend, &dir_b).await;
    b.pump_remote().unwrap();

    assert!(a.delete_category("Robusta").await.unwrap());
    b.pump_remote().unwrap();

    assert_eq!(b.catalog().categories(), &["Arabica".to_string()]);
    for product in b.catalog().products() {
        assert_eq!(product.category, "Arabica");
    }
    assert_eq!(b.catalog().products(), a.catalog().products());
}

#[tokio::test]
async fn own_echo_is_ignored() {
    let backend = RemoteBackend::new();
    let dir = TempDir::new().unwrap();

    let mut app = connected_app(&backend, &dir).await;
    app.pump_remote().unwrap(); // drain the seeding echoes

    app.add_product("Guatemala Antigua", "11.25", "Arabica")
        .await
        .unwrap();

    // The write came straight back as a notification, but the watermark
    // already covers it
    assert_eq!(app.pump_remote().unwrap(), 0);
    assert_eq!(app.catalog().products().len(), 6);
}

#[tokio::test]
async fn stale_notification_leaves_state_unchanged() {
    let backend = RemoteBackend::new();
    let dir = TempDir::new().unwrap();

    let mut app = connected_app(&backend, &dir).await;

    // A second device writes with a timestamp far in the past
    let peer = backend.connect(&test_config()).unwrap();
    peer.write(
        Dataset::Products,
        json!([{"id": 1, "name": "Ancient", "price": 1.00, "category": "Arabica"}]),
        1,
    )
    .await
    .unwrap();

    assert_eq!(app.pump_remote().unwrap(), 0);
    assert_eq!(app.catalog().products().len(), 5);
}

#[tokio::test]
async fn newer_notification_replaces_state() {
    let backend = RemoteBackend::new();
    let dir = TempDir::new().unwrap();

    let mut app = connected_app(&backend, &dir).await;
    let future = app.watermark().last_update() + 60_000;

    let peer = backend.connect(&test_config()).unwrap();
    peer.write(
        Dataset::Products,
        json!([{"id": 9, "name": "Imported", "price": 3.00, "category": "Arabica"}]),
        future,
    )
    .await
    .unwrap();

    assert_eq!(app.pump_remote().unwrap(), 1);
    assert_eq!(app.catalog().products().len(), 1);
    assert_eq!(app.catalog().product(9).unwrap().name, "Imported");
    assert_eq!(app.watermark().last_update(), future);

    // The replacement was persisted, not just applied in memory
    let reopened = open_app(dir.path());
    assert_eq!(reopened.catalog().products().len(), 1);
}

#[tokio::test]
async fn malformed_notification_is_skipped() {
    let backend = RemoteBackend::new();
    let dir = TempDir::new().unwrap();

    let mut app = connected_app(&backend, &dir).await;
    let future = app.watermark().last_update() + 60_000;

    let peer = backend.connect(&test_config()).unwrap();
    peer.write(Dataset::Products, json!("garbage"), future)
        .await
        .unwrap();

    assert_eq!(app.pump_remote().unwrap(), 0);
    assert_eq!(app.catalog().products().len(), 5);

    // The bad envelope did not consume the timestamp
    peer.write(
        Dataset::Products,
        json!([{"id": 9, "name": "Imported", "price": 3.00, "category": "Arabica"}]),
        future,
    )
    .await
    .unwrap();
    assert_eq!(app.pump_remote().unwrap(), 1);
}

#[tokio::test]
async fn delete_rollback_restores_predelete_snapshot() {
    let backend = RemoteBackend::new();
    let dir = TempDir::new().unwrap();

    let mut app = connected_app(&backend, &dir).await;
    let before = app.catalog().products().to_vec();

    backend.fail_writes(true);
    let deleted = app.delete_product(1).await.unwrap();

    assert!(!deleted);
    assert_eq!(app.catalog().products(), before.as_slice());
    assert_eq!(app.status(), SyncStatus::Error);

    // The persisted copy was restored as well
    let reopened = open_app(dir.path());
    assert_eq!(reopened.catalog().products(), before.as_slice());
}

#[tokio::test]
async fn failed_write_keeps_other_mutations() {
    let backend = RemoteBackend::new();
    let dir = TempDir::new().unwrap();

    let mut app = connected_app(&backend, &dir).await;
    backend.fail_writes(true);

    // Non-delete mutations are kept locally even when the mirror fails
    let id = app
        .add_product("Guatemala Antigua", "11.25", "Arabica")
        .await
        .unwrap();

    assert_eq!(app.catalog().product(id).unwrap().price, 11.25);
    assert_eq!(app.status(), SyncStatus::Error);

    let reopened = open_app(dir.path());
    assert_eq!(reopened.catalog().products().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn error_status_auto_reverts() {
    let backend = RemoteBackend::new();
    let dir = TempDir::new().unwrap();

    let mut app = connected_app(&backend, &dir).await;
    backend.fail_writes(true);

    app.set_price(1, "9.00").await.unwrap();
    assert_eq!(app.status(), SyncStatus::Error);
    assert_eq!(app.connection_state(), ConnectionState::Error);

    tokio::time::sleep(STATUS_RESET + std::time::Duration::from_millis(100)).await;

    // The error was transient; the write failure did not cost the connection
    assert_eq!(app.status(), SyncStatus::Idle);
    assert_eq!(app.connection_state(), ConnectionState::ConnectedIdle);
}

#[tokio::test(start_paused = true)]
async fn success_status_auto_reverts() {
    let backend = RemoteBackend::new();
    let dir = TempDir::new().unwrap();

    let mut app = connected_app(&backend, &dir).await;

    app.set_price(1, "9.00").await.unwrap();
    assert_eq!(app.status(), SyncStatus::Success);

    tokio::time::sleep(STATUS_RESET + std::time::Duration::from_millis(100)).await;
    assert_eq!(app.status(), SyncStatus::Idle);
}

#[tokio::test]
async fn disconnect_stops_delivery() {
    let backend = RemoteBackend::new();
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let mut a = connected_app(&backend, &dir_a).await;
    let mut b = connected_app(&backend, &dir_b).await;
    assert_eq!(backend.subscriber_count(), 4);

    a.disconnect();
    assert_eq!(backend.subscriber_count(), 2);
    assert_eq!(a.connection_state(), ConnectionState::Disconnected);

    b.set_price(1, "9.00").await.unwrap();
    assert_eq!(a.pump_remote().unwrap(), 0);
}

#[tokio::test]
async fn sync_now_requires_a_connection() {
    let dir = TempDir::new().unwrap();
    let mut app = open_app(dir.path());

    let result = app.sync_now().await;

    assert!(matches!(result, Err(SyncError::NotConnected)));
    assert_eq!(app.status(), SyncStatus::Error);
}

#[tokio::test]
async fn bulk_update_and_clear_reach_the_peer() {
    let backend = RemoteBackend::new();
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let mut a = connected_app(&backend, &dir_a).await;
    let mut b = connected_app(&backend, &dir_b).await;
    b.pump_remote().unwrap();

    let touched = a
        .bulk_update(&CategoryFilter::All, 10.0, PriceDirection::Increase)
        .await
        .unwrap();
    assert_eq!(touched, 5);
    assert_eq!(a.catalog().product(1).unwrap().price, 16.49); // 14.99 + 10%

    b.pump_remote().unwrap();
    assert_eq!(b.catalog().product(1).unwrap().price, 16.49);

    a.clear_products().await.unwrap();
    b.pump_remote().unwrap();
    assert!(b.catalog().products().is_empty());
    assert_eq!(b.catalog().categories().len(), 2); // categories are kept
}

#[tokio::test]
async fn export_is_a_snapshot_of_current_products() {
    let dir = TempDir::new().unwrap();
    let mut app = open_app(dir.path());

    app.delete_product(5).await.unwrap();
    let json = app.export_json().unwrap();

    let parsed: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.len(), 4);
}

#[tokio::test]
async fn remote_config_is_persisted_for_the_next_start() {
    let backend = RemoteBackend::new();
    let dir = TempDir::new().unwrap();

    {
        let _app = connected_app(&backend, &dir).await;
    }

    let app = open_app(dir.path());
    assert_eq!(app.remote_config(), Some(&test_config()));
}
