//! Gateway to the `users` / `user_logs` record collections.
//!
//! Every call is one round trip with no client-side retry. [`RestStore`] talks to a
//! PostgREST-compatible service; [`MemoryStore`] keeps the same semantics in process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{activity::ActivityLogEntry, user::User};

pub mod memory;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

pub const USERS_TABLE: &str = "users";
pub const LOGS_TABLE: &str = "user_logs";

/// Default bound for [`DataStore::list_logs_desc`].
pub const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected store response: {0}")]
    Decode(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn find_user(&self, device_id: &str) -> StoreResult<Option<User>>;

    /// Insert when `device_id` is unknown, otherwise overwrite the stored record.
    async fn upsert_user(&self, user: &User) -> StoreResult<User>;

    /// Sets `current_version` / `last_updated`. Returns whether a record matched.
    async fn set_user_version(
        &self,
        device_id: &str,
        version: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn append_log(&self, entry: &ActivityLogEntry) -> StoreResult<()>;

    async fn list_users(&self, limit: usize) -> StoreResult<Vec<User>>;

    async fn count_users(&self) -> StoreResult<u64>;

    /// Newest first, at most `limit` entries.
    async fn list_logs_desc(&self, limit: usize) -> StoreResult<Vec<ActivityLogEntry>>;

    /// `current_version` of every user.
    async fn list_user_versions(&self) -> StoreResult<Vec<String>>;

    /// `action` of every log entry with `timestamp >= since`.
    async fn list_actions_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<String>>;
}
