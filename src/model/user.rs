use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{deserialize_blob, deserialize_opt_timestamp, Blob};

/// One installation of the client, keyed by `device_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub device_id: String,
    pub current_version: String,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_blob")]
    pub user_info: Blob,
    #[serde(default)]
    pub total_launches: i64,
}

impl User {
    pub fn first_launch(device_id: &str, version: &str, user_info: Blob, now: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.to_string(),
            current_version: version.to_string(),
            first_seen: Some(now),
            last_seen: Some(now),
            last_updated: None,
            user_info,
            total_launches: 1,
        }
    }

    /// Registration of an already known device. `first_seen` is left alone.
    pub fn relaunch(&mut self, version: &str, user_info: Blob, now: DateTime<Utc>) {
        self.current_version = version.to_string();
        self.last_seen = Some(now);
        self.user_info = user_info;
        self.total_launches = self.total_launches.saturating_add(1);
    }

    pub fn install(&mut self, version: &str, now: DateTime<Utc>) {
        self.current_version = version.to_string();
        self.last_updated = Some(now);
    }
}
