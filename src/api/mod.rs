use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{policy::VersionPolicy, tracker::Tracker};

pub mod handlers;
pub mod types;

use handlers::{
    check_update, health, home, list_logs, list_users, method_not_allowed, not_found, register,
    set_version, stats, update_downloaded, update_installed,
};

pub const ENDPOINTS: &[&str] = &[
    "GET /health - Health check",
    "POST /register - Register user",
    "GET /check-update - Check for updates",
    "POST /update-downloaded - Log an update download",
    "POST /update-installed - Log an update installation",
    "GET /admin/users - List users",
    "GET /admin/logs - Recent activity",
    "POST /admin/set-version - Change the advertised version",
    "GET /admin/stats - Get statistics",
];

#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<VersionPolicy>,
    pub tracker: Arc<dyn Tracker>,
}

/// Every endpoint of the service. Admin routes carry no authentication.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/register", post(register))
        .route("/check-update", get(check_update))
        .route("/update-downloaded", post(update_downloaded))
        .route("/update-installed", post(update_installed))
        .route("/admin/users", get(list_users))
        .route("/admin/logs", get(list_logs))
        .route("/admin/set-version", post(set_version))
        .route("/admin/stats", get(stats))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
}
