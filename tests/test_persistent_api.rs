//! Endpoint behaviour of the store-backed tracker, driven through the router.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::json;

use update_tracker::{
    model::{
        activity::{Action, ActivityLogEntry},
        user::User,
    },
    store::{DataStore, MemoryStore, StoreError, StoreResult},
};

mod common;

use common::*;

#[tokio::test]
async fn test_register_then_install_then_check() {
    let (app, _store) = persistent_app();

    let (status, body) = post(&app, "/register", json!({"device_id": "dev-1", "version": "0.9.0"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["needs_update"], true);
    assert_eq!(body["current_version"], "1.0.0");
    assert_eq!(body["user_version"], "0.9.0");
    assert_eq!(body["device_id"], "dev-1");
    assert!(body.get("log_warning").is_none());

    let (status, body) = post(&app, "/update-installed", json!({"device_id": "dev-1", "version": "1.0.0"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Update installation logged successfully");

    let (status, body) = get(&app, "/check-update?device_id=dev-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["update_available"], false);
    assert_eq!(body["user_version"], "1.0.0");
    assert!(body.get("download_url").is_none());
    assert!(body.get("force_update").is_none());
}

#[tokio::test]
async fn test_register_counts_launches() {
    let (app, store) = persistent_app();

    post(&app, "/register", json!({"device_id": "dev-1", "version": "0.9.0"})).await;
    let first = store.find_user("dev-1").await.unwrap().unwrap();
    assert_eq!(first.total_launches, 1);

    post(
        &app,
        "/register",
        json!({"device_id": "dev-1", "version": "1.0.0", "user_info": {"os": "windows"}}),
    )
    .await;
    let second = store.find_user("dev-1").await.unwrap().unwrap();
    assert_eq!(second.total_launches, 2);
    assert_eq!(second.first_seen, first.first_seen);
    assert_eq!(second.current_version, "1.0.0");
    assert_eq!(second.user_info.get("os"), Some(&json!("windows")));
}

#[tokio::test]
async fn test_register_validation() {
    let (app, store) = persistent_app();

    let (status, body) = post(&app, "/register", json!({"version": "1.0.0"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "device_id is required");

    let (status, _) = post(&app, "/register", json!({"device_id": "", "version": "1.0.0"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(&app, "/register", json!({"device_id": "d", "user_info": "nope"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = call(&app, Method::POST, "/register", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(store.count_users().await.unwrap(), 0);
}

#[tokio::test]
async fn test_register_default_version() {
    let (app, store) = persistent_app();
    let (status, body) = post(&app, "/register", json!({"device_id": "dev-2"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_version"], "0.0.0");
    assert_eq!(body["needs_update"], true);
    let logs = store.list_logs_desc(10).await.unwrap();
    assert_eq!(logs[0].details.get("needs_update"), Some(&json!(true)));
}

#[tokio::test]
async fn test_check_update_unknown_device() {
    let (app, _store) = persistent_app();

    let (status, body) = get(&app, "/check-update?device_id=ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");

    let (status, _) = get(&app, "/check-update").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_check_update_ignores_caller_version() {
    let (app, _store) = persistent_app();
    post(&app, "/register", json!({"device_id": "dev-1", "version": "0.9.0"})).await;

    let (status, body) = get(&app, "/check-update?device_id=dev-1&version=1.0.0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["update_available"], true);
    assert_eq!(body["user_version"], "0.9.0");
    assert_eq!(body["download_url"], URL);
    assert_eq!(body["force_update"], false);
}

#[tokio::test]
async fn test_set_version_flow() {
    let (app, store) = persistent_app();
    post(&app, "/register", json!({"device_id": "dev-1", "version": "1.0.0"})).await;

    let (status, _) = post(&app, "/admin/set-version", json!({"version": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, body) = get(&app, "/check-update?device_id=dev-1").await;
    assert_eq!(body["update_available"], false);

    let (status, body) = post(&app, "/admin/set-version", json!({"version": "2.0.0"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_version"], "2.0.0");
    assert_eq!(body["download_url"], URL);

    let (_, body) = get(&app, "/check-update?device_id=dev-1").await;
    assert_eq!(body["update_available"], true);
    assert_eq!(body["current_version"], "2.0.0");
    assert_eq!(body["download_url"], URL);

    let logs = store.list_logs_desc(1).await.unwrap();
    assert_eq!(logs[0].device_id, "dev-1");
    assert_eq!(logs[0].action, Action::CheckUpdate);
    let audit = store
        .list_logs_desc(10)
        .await
        .unwrap()
        .into_iter()
        .find(|e| e.device_id == "admin")
        .unwrap();
    assert_eq!(audit.version, "2.0.0");
    assert_eq!(audit.details.get("new_url"), Some(&json!(null)));
}

#[tokio::test]
async fn test_set_version_replaces_url() {
    let (app, _store) = persistent_app();
    let (_, body) = post(
        &app,
        "/admin/set-version",
        json!({"version": "2.0.0", "download_url": "https://cdn.example.com/v2.exe"}),
    )
    .await;
    assert_eq!(body["download_url"], "https://cdn.example.com/v2.exe");

    let (_, health) = get(&app, "/health").await;
    assert_eq!(health["version"], "2.0.0");
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_update_downloaded_logs_only() {
    let (app, store) = persistent_app();

    let (status, _) = post(&app, "/update-downloaded", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(&app, "/update-downloaded", json!({"device_id": "dev-9"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Download logged successfully");

    assert_eq!(store.count_users().await.unwrap(), 0);
    let logs = store.list_logs_desc(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].version, CURRENT);
    assert_eq!(logs[0].details.get("download_url"), Some(&json!(URL)));
}

#[tokio::test]
async fn test_update_installed_unknown_device_is_noop() {
    let (app, store) = persistent_app();

    let (status, _) = post(&app, "/update-installed", json!({"device_id": "ghost"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.count_users().await.unwrap(), 0);

    let logs = store.list_logs_desc(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    // version defaults to the advertised one
    assert_eq!(logs[0].version, CURRENT);
}

#[tokio::test]
async fn test_admin_listings() {
    let (app, _store) = persistent_app();
    for i in 0..3 {
        post(&app, "/register", json!({"device_id": format!("dev-{i}"), "version": "0.9.0"})).await;
    }

    let (status, body) = get(&app, "/admin/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_users"], 3);
    assert_eq!(body["users"].as_array().unwrap().len(), 3);
    assert_eq!(body["truncated"], false);

    let (status, body) = get(&app, "/admin/logs?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_logs"], 2);
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs[0]["device_id"], "dev-2");
    assert_eq!(logs[0]["action"], "register");

    let (status, _) = get(&app, "/admin/logs?limit=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_users_cap() {
    let store = Arc::new(MemoryStore::new());
    let app = persistent_app_with(store, 2);
    for i in 0..3 {
        post(&app, "/register", json!({"device_id": format!("dev-{i}")})).await;
    }

    let (_, body) = get(&app, "/admin/users").await;
    assert_eq!(body["total_users"], 3);
    assert_eq!(body["users"].as_array().unwrap().len(), 2);
    assert_eq!(body["truncated"], true);
}

#[tokio::test]
async fn test_stats_histograms() {
    let (app, _store) = persistent_app();
    post(&app, "/register", json!({"device_id": "a", "version": "0.9.0"})).await;
    post(&app, "/register", json!({"device_id": "b", "version": "1.0.0"})).await;
    post(&app, "/register", json!({"device_id": "c", "version": "1.0.0"})).await;
    get(&app, "/check-update?device_id=a").await;

    let (status, body) = get(&app, "/admin/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_users"], 3);
    assert_eq!(body["current_version"], CURRENT);
    assert_eq!(body["download_url"], URL);

    let dist = body["version_distribution"].as_object().unwrap();
    assert_eq!(dist["1.0.0"], 2);
    assert_eq!(dist["0.9.0"], 1);
    let sum: u64 = dist.values().map(|v| v.as_u64().unwrap()).sum();
    assert_eq!(sum, 3);

    assert_eq!(body["today_activity"]["register"], 3);
    assert_eq!(body["today_activity"]["check_update"], 1);
}

#[tokio::test]
async fn test_banner_and_fallback() {
    let (app, _store) = persistent_app();
    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], CURRENT);
    assert_eq!(body["mode"], "persistent");
    assert!(body["endpoints"].as_array().unwrap().len() >= 9);

    let (status, body) = get(&app, "/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

/// Memory store whose activity log is unavailable.
struct BrokenLogStore {
    inner: MemoryStore,
}

#[async_trait]
impl DataStore for BrokenLogStore {
    async fn find_user(&self, device_id: &str) -> StoreResult<Option<User>> {
        self.inner.find_user(device_id).await
    }

    async fn upsert_user(&self, user: &User) -> StoreResult<User> {
        self.inner.upsert_user(user).await
    }

    async fn set_user_version(&self, device_id: &str, version: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        self.inner.set_user_version(device_id, version, at).await
    }

    async fn append_log(&self, _entry: &ActivityLogEntry) -> StoreResult<()> {
        Err(StoreError::Status {
            status: 503,
            body: "user_logs unavailable".into(),
        })
    }

    async fn list_users(&self, limit: usize) -> StoreResult<Vec<User>> {
        self.inner.list_users(limit).await
    }

    async fn count_users(&self) -> StoreResult<u64> {
        self.inner.count_users().await
    }

    async fn list_logs_desc(&self, limit: usize) -> StoreResult<Vec<ActivityLogEntry>> {
        self.inner.list_logs_desc(limit).await
    }

    async fn list_user_versions(&self) -> StoreResult<Vec<String>> {
        self.inner.list_user_versions().await
    }

    async fn list_actions_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<String>> {
        self.inner.list_actions_since(since).await
    }
}

#[tokio::test]
async fn test_log_failure_keeps_primary_success() {
    let store = Arc::new(BrokenLogStore {
        inner: MemoryStore::new(),
    });
    let app = persistent_app_with(store.clone(), 1000);

    let (status, body) = post(&app, "/register", json!({"device_id": "dev-1", "version": "0.9.0"})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["log_warning"].as_str().unwrap().contains("503"));
    assert_eq!(store.count_users().await.unwrap(), 1);

    // downloads have nothing but the log entry, so the failure is reported
    let (status, body) = post(&app, "/update-downloaded", json!({"device_id": "dev-1"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());

    let (status, body) = post(&app, "/admin/set-version", json!({"version": "2.0.0"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_version"], "2.0.0");
    assert!(body["log_warning"].is_string());
}

#[tokio::test]
async fn test_bad_query_and_wrong_method_are_json() {
    let (app, _store) = persistent_app();

    let (status, body) = get(&app, "/check-update?device_id=a&device_id=b").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = get(&app, "/admin/logs?limit=1&limit=2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = get(&app, "/register").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "method not allowed");

    let (status, body) = post(&app, "/admin/stats", json!({})).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(body["error"].is_string());
}
