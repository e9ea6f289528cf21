#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use update_tracker::{
    api::AppState,
    app,
    policy::VersionPolicy,
    store::{DataStore, MemoryStore},
    tracker::{StatelessTracker, StoreTracker},
};

pub const CURRENT: &str = "1.0.0";
pub const URL: &str = "https://cdn.example.com/setup.exe";

pub fn persistent_app_with(store: Arc<dyn DataStore>, users_cap: usize) -> Router {
    app(AppState {
        policy: Arc::new(VersionPolicy::new(CURRENT, URL)),
        tracker: Arc::new(StoreTracker::new(store, users_cap)),
    })
}

pub fn persistent_app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (persistent_app_with(store.clone(), 1000), store)
}

pub fn stateless_app() -> Router {
    app(AppState {
        policy: Arc::new(VersionPolicy::new(CURRENT, URL)),
        tracker: Arc::new(StatelessTracker),
    })
}

pub async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    call(app, Method::GET, uri, None).await
}

pub async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    call(app, Method::POST, uri, Some(body)).await
}
