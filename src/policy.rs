//! The advertised version and where to download it.
//!
//! Shared by every handler through an `Arc`. Readers take a [`PolicySnapshot`] so the
//! version and URL they report always belong together. Concurrent `set_version` calls are
//! last-write-wins; the value lives for the process lifetime only and is not replicated
//! to other instances.

use parking_lot::RwLock;
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicySnapshot {
    pub current_version: String,
    pub update_url: String,
}

/// Outcome of comparing a device's version with the advertised one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateDescription {
    pub update_available: bool,
    pub current_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_update: Option<bool>,
}

impl PolicySnapshot {
    /// Exact string inequality. `"1.0"` and `"1.0.0"` are different versions.
    pub fn needs_update(&self, caller_version: &str) -> bool {
        caller_version != self.current_version
    }

    pub fn describe_update(&self, caller_version: &str) -> UpdateDescription {
        let update_available = self.needs_update(caller_version);
        UpdateDescription {
            update_available,
            current_version: self.current_version.clone(),
            download_url: update_available.then(|| self.update_url.clone()),
            // forced updates are not issued yet
            force_update: update_available.then_some(false),
        }
    }
}

pub struct VersionPolicy {
    inner: RwLock<PolicySnapshot>,
}

impl VersionPolicy {
    pub fn new(current_version: &str, update_url: &str) -> Self {
        Self {
            inner: RwLock::new(PolicySnapshot {
                current_version: current_version.to_string(),
                update_url: update_url.to_string(),
            }),
        }
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        self.inner.read().clone()
    }

    /// Replaces the version unconditionally; the URL only when a non-empty one is given.
    pub fn set_version(
        &self,
        new_version: Option<&str>,
        new_url: Option<&str>,
    ) -> Result<PolicySnapshot, ApiError> {
        let new_version = new_version
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Validation("version is required".into()))?;

        let mut policy = self.inner.write();
        policy.current_version = new_version.to_string();
        if let Some(url) = new_url.filter(|u| !u.is_empty()) {
            policy.update_url = url.to_string();
        }
        Ok(policy.clone())
    }
}
