use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::{
    histogram, require, start_of_local_day, Ack, CheckOutcome, LogListing, RegisterOutcome,
    Registration, Stats, Tracker, UpdateCheck, UserListing, DEFAULT_CLIENT_VERSION,
};
use crate::{
    config::TrackerMode,
    error::ApiError,
    model::{
        activity::{Action, ActivityLogEntry, ADMIN_DEVICE_ID},
        blob,
        user::User,
    },
    policy::PolicySnapshot,
    store::DataStore,
};

/// Store-backed tracker: every call reads or writes the `users` / `user_logs` collections.
pub struct StoreTracker {
    store: Arc<dyn DataStore>,
    users_cap: usize,
}

impl StoreTracker {
    pub fn new(store: Arc<dyn DataStore>, users_cap: usize) -> Self {
        Self { store, users_cap }
    }

    /// Appends a log entry after the primary write already succeeded.
    /// A failure here does not undo that write; it comes back as a warning.
    async fn record(&self, entry: ActivityLogEntry) -> Option<String> {
        match self.store.append_log(&entry).await {
            Ok(()) => None,
            Err(err) => {
                warn!(
                    device_id = %entry.device_id,
                    action = entry.action.as_str(),
                    error = %err,
                    "activity log append failed"
                );
                Some(format!("activity log not recorded: {err}"))
            }
        }
    }
}

#[async_trait]
impl Tracker for StoreTracker {
    fn mode(&self) -> TrackerMode {
        TrackerMode::Persistent
    }

    async fn register(
        &self,
        policy: &PolicySnapshot,
        req: Registration,
    ) -> Result<RegisterOutcome, ApiError> {
        let device_id = require("device_id", req.device_id)?;
        let version = req
            .version
            .unwrap_or_else(|| DEFAULT_CLIENT_VERSION.to_string());
        let now = Utc::now();

        let user = match self.store.find_user(&device_id).await? {
            Some(mut known) => {
                known.relaunch(&version, req.user_info, now);
                known
            }
            None => User::first_launch(&device_id, &version, req.user_info, now),
        };
        let user = self.store.upsert_user(&user).await?;

        let needs_update = policy.needs_update(&version);
        info!(
            device_id = %device_id,
            version = %version,
            launches = user.total_launches,
            needs_update,
            "device registered"
        );

        let log_warning = self
            .record(ActivityLogEntry::new(
                &device_id,
                Action::Register,
                &version,
                blob(json!({ "needs_update": needs_update })),
            ))
            .await;

        Ok(RegisterOutcome {
            message: "User registered successfully",
            needs_update,
            current_version: policy.current_version.clone(),
            user_version: version,
            device_id,
            log_warning,
        })
    }

    async fn check_update(
        &self,
        policy: &PolicySnapshot,
        req: UpdateCheck,
    ) -> Result<CheckOutcome, ApiError> {
        let device_id = require("device_id", req.device_id)?;
        let user = self
            .store
            .find_user(&device_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

        let user_version = user.current_version;
        let update = policy.describe_update(&user_version);
        info!(
            device_id = %device_id,
            version = %user_version,
            update_available = update.update_available,
            "update check"
        );

        let log_warning = self
            .record(ActivityLogEntry::new(
                &device_id,
                Action::CheckUpdate,
                &user_version,
                blob(json!({
                    "update_available": update.update_available,
                    "current_version": policy.current_version,
                })),
            ))
            .await;

        Ok(CheckOutcome {
            update,
            user_version,
            device_id,
            log_warning,
        })
    }

    async fn update_downloaded(
        &self,
        policy: &PolicySnapshot,
        device_id: Option<String>,
    ) -> Result<Ack, ApiError> {
        let device_id = require("device_id", device_id)?;
        // the log entry is the whole operation, so its failure is the caller's failure
        self.store
            .append_log(&ActivityLogEntry::new(
                &device_id,
                Action::UpdateDownloaded,
                &policy.current_version,
                blob(json!({ "download_url": policy.update_url })),
            ))
            .await?;
        info!(device_id = %device_id, version = %policy.current_version, "update downloaded");

        Ok(Ack {
            message: "Download logged successfully",
            log_warning: None,
        })
    }

    async fn update_installed(
        &self,
        policy: &PolicySnapshot,
        device_id: Option<String>,
        version: Option<String>,
    ) -> Result<Ack, ApiError> {
        let device_id = require("device_id", device_id)?;
        let version = version.unwrap_or_else(|| policy.current_version.clone());

        let matched = self
            .store
            .set_user_version(&device_id, &version, Utc::now())
            .await?;
        if matched {
            info!(device_id = %device_id, version = %version, "update installed");
        } else {
            warn!(device_id = %device_id, version = %version, "update installed by unregistered device");
        }

        let log_warning = self
            .record(ActivityLogEntry::new(
                &device_id,
                Action::UpdateInstalled,
                &version,
                blob(json!({ "success": true })),
            ))
            .await;

        Ok(Ack {
            message: "Update installation logged successfully",
            log_warning,
        })
    }

    async fn list_users(&self) -> Result<UserListing, ApiError> {
        let total_users = self.store.count_users().await?;
        let users = self.store.list_users(self.users_cap).await?;
        let truncated = (users.len() as u64) < total_users;
        if truncated {
            warn!(
                returned = users.len(),
                total_users, "user listing cut at ADMIN_USERS_CAP"
            );
        }
        Ok(UserListing {
            users,
            total_users,
            truncated,
        })
    }

    async fn list_logs(&self, limit: usize) -> Result<LogListing, ApiError> {
        let logs = self.store.list_logs_desc(limit).await?;
        Ok(LogListing {
            total_logs: logs.len(),
            logs,
        })
    }

    async fn version_changed(
        &self,
        policy: &PolicySnapshot,
        requested_url: Option<&str>,
    ) -> Option<String> {
        self.record(ActivityLogEntry::new(
            ADMIN_DEVICE_ID,
            Action::VersionUpdated,
            &policy.current_version,
            blob(json!({
                "new_version": policy.current_version,
                "new_url": requested_url,
            })),
        ))
        .await
    }

    async fn stats(&self, policy: &PolicySnapshot) -> Result<Stats, ApiError> {
        let total_users = self.store.count_users().await?;
        let versions = self.store.list_user_versions().await?;
        let since = start_of_local_day(Local::now());
        let actions = self.store.list_actions_since(since).await?;

        Ok(Stats {
            total_users,
            current_version: policy.current_version.clone(),
            version_distribution: Some(histogram(versions)),
            today_activity: Some(histogram(actions)),
            download_url: policy.update_url.clone(),
            status: None,
        })
    }
}
