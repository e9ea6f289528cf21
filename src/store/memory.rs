use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{DataStore, StoreResult};
use crate::model::{activity::ActivityLogEntry, user::User};

/// In-process store. Records live as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
    logs: RwLock<Vec<ActivityLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn find_user(&self, device_id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.read().get(device_id).cloned())
    }

    async fn upsert_user(&self, user: &User) -> StoreResult<User> {
        self.users
            .write()
            .insert(user.device_id.clone(), user.clone());
        Ok(user.clone())
    }

    async fn set_user_version(
        &self,
        device_id: &str,
        version: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match self.users.write().get_mut(device_id) {
            Some(user) => {
                user.install(version, at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_log(&self, entry: &ActivityLogEntry) -> StoreResult<()> {
        self.logs.write().push(entry.clone());
        Ok(())
    }

    async fn list_users(&self, limit: usize) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.users.read().values().cloned().collect();
        users.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then(a.device_id.cmp(&b.device_id)));
        users.truncate(limit);
        Ok(users)
    }

    async fn count_users(&self) -> StoreResult<u64> {
        Ok(self.users.read().len() as u64)
    }

    async fn list_logs_desc(&self, limit: usize) -> StoreResult<Vec<ActivityLogEntry>> {
        let logs = self.logs.read();
        // ties: most recently appended first
        let mut entries: Vec<ActivityLogEntry> = logs.iter().cloned().collect();
        entries.sort_by_key(|e| e.timestamp);
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }

    async fn list_user_versions(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .users
            .read()
            .values()
            .map(|u| u.current_version.clone())
            .collect())
    }

    async fn list_actions_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<String>> {
        Ok(self
            .logs
            .read()
            .iter()
            .filter(|e| e.timestamp >= since)
            .map(|e| e.action.as_str().to_string())
            .collect())
    }
}
