pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod policy;
pub mod store;
pub mod tracker;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use api::AppState;
use config::{Config, StoreBackend, TrackerMode};
use policy::VersionPolicy;
use store::{DataStore, MemoryStore, RestStore};
use tracker::{StatelessTracker, StoreTracker, Tracker};

impl AppState {
    /// Wires the tracker selected by `config`. The store handle lives for the process.
    pub fn from_config(config: &Config) -> Result<Self> {
        let policy = Arc::new(VersionPolicy::new(
            &config.current_version,
            &config.update_url,
        ));

        let tracker: Arc<dyn Tracker> = match config.mode {
            TrackerMode::Stateless => Arc::new(StatelessTracker),
            TrackerMode::Persistent => {
                let store: Arc<dyn DataStore> = match config.backend {
                    StoreBackend::Memory => Arc::new(MemoryStore::new()),
                    StoreBackend::Rest => {
                        let creds = config
                            .store
                            .as_ref()
                            .context("rest store selected without credentials")?;
                        Arc::new(RestStore::new(&creds.url, &creds.key))
                    }
                };
                Arc::new(StoreTracker::new(store, config.admin_users_cap))
            }
        };

        Ok(Self { policy, tracker })
    }
}

/// Router with request tracing and permissive CORS, ready to serve.
pub fn app(state: AppState) -> Router {
    api::router()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}
