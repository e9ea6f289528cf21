use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{deserialize_blob, deserialize_timestamp, Blob};

/// Device id recorded on entries written by admin endpoints.
pub const ADMIN_DEVICE_ID: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Register,
    CheckUpdate,
    UpdateDownloaded,
    UpdateInstalled,
    VersionUpdated,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Register => "register",
            Action::CheckUpdate => "check_update",
            Action::UpdateDownloaded => "update_downloaded",
            Action::UpdateInstalled => "update_installed",
            Action::VersionUpdated => "version_updated",
        }
    }
}

/// Append-only row of the `user_logs` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityLogEntry {
    pub device_id: String,
    pub action: Action,
    pub version: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_blob")]
    pub details: Blob,
}

impl ActivityLogEntry {
    pub fn new(device_id: &str, action: Action, version: &str, details: Blob) -> Self {
        Self {
            device_id: device_id.to_string(),
            action,
            version: version.to_string(),
            timestamp: Utc::now(),
            details,
        }
    }
}
