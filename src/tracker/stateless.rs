use async_trait::async_trait;
use tracing::info;

use super::{
    require, Ack, CheckOutcome, LogListing, RegisterOutcome, Registration, Stats, Tracker,
    UpdateCheck, UserListing, DEFAULT_CLIENT_VERSION, DEFAULT_DEVICE_ID,
};
use crate::{config::TrackerMode, error::ApiError, policy::PolicySnapshot};

/// Answers from the version policy alone; nothing is stored.
///
/// Absent device ids become `"unknown"` and update checks trust the caller's version.
/// Fields that are present are taken as sent, empty strings included.
#[derive(Debug, Default)]
pub struct StatelessTracker;

fn or_default(value: Option<String>, default: &str) -> String {
    value.unwrap_or_else(|| default.to_string())
}

#[async_trait]
impl Tracker for StatelessTracker {
    fn mode(&self) -> TrackerMode {
        TrackerMode::Stateless
    }

    async fn register(
        &self,
        policy: &PolicySnapshot,
        req: Registration,
    ) -> Result<RegisterOutcome, ApiError> {
        let device_id = or_default(req.device_id, DEFAULT_DEVICE_ID);
        let version = or_default(req.version, DEFAULT_CLIENT_VERSION);
        let needs_update = policy.needs_update(&version);
        info!(device_id = %device_id, version = %version, needs_update, "device registered");

        Ok(RegisterOutcome {
            message: "User registered successfully",
            needs_update,
            current_version: policy.current_version.clone(),
            user_version: version,
            device_id,
            log_warning: None,
        })
    }

    async fn check_update(
        &self,
        policy: &PolicySnapshot,
        req: UpdateCheck,
    ) -> Result<CheckOutcome, ApiError> {
        let device_id = or_default(req.device_id, DEFAULT_DEVICE_ID);
        let user_version = or_default(req.version, DEFAULT_CLIENT_VERSION);
        let update = policy.describe_update(&user_version);

        Ok(CheckOutcome {
            update,
            user_version,
            device_id,
            log_warning: None,
        })
    }

    async fn update_downloaded(
        &self,
        _policy: &PolicySnapshot,
        device_id: Option<String>,
    ) -> Result<Ack, ApiError> {
        require("device_id", device_id)?;
        Ok(Ack {
            message: "Download logged successfully",
            log_warning: None,
        })
    }

    async fn update_installed(
        &self,
        _policy: &PolicySnapshot,
        device_id: Option<String>,
        _version: Option<String>,
    ) -> Result<Ack, ApiError> {
        require("device_id", device_id)?;
        Ok(Ack {
            message: "Update installation logged successfully",
            log_warning: None,
        })
    }

    async fn list_users(&self) -> Result<UserListing, ApiError> {
        Ok(UserListing {
            users: Vec::new(),
            total_users: 0,
            truncated: false,
        })
    }

    async fn list_logs(&self, _limit: usize) -> Result<LogListing, ApiError> {
        Ok(LogListing {
            logs: Vec::new(),
            total_logs: 0,
        })
    }

    async fn version_changed(
        &self,
        _policy: &PolicySnapshot,
        _requested_url: Option<&str>,
    ) -> Option<String> {
        None
    }

    async fn stats(&self, policy: &PolicySnapshot) -> Result<Stats, ApiError> {
        Ok(Stats {
            total_users: 0,
            current_version: policy.current_version.clone(),
            version_distribution: None,
            today_activity: None,
            download_url: policy.update_url.clone(),
            status: Some("API is working!"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PolicySnapshot {
        PolicySnapshot {
            current_version: "1.0.0".into(),
            update_url: "https://cdn.example.com/setup.exe".into(),
        }
    }

    #[tokio::test]
    async fn test_register_defaults() {
        let out = StatelessTracker
            .register(&policy(), Registration::default())
            .await
            .unwrap();
        assert_eq!(out.device_id, "unknown");
        assert_eq!(out.user_version, "0.0.0");
        assert!(out.needs_update);
    }

    #[tokio::test]
    async fn test_present_empty_fields_are_kept() {
        let out = StatelessTracker
            .register(
                &policy(),
                Registration {
                    device_id: Some(String::new()),
                    version: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(out.device_id, "");
        assert_eq!(out.user_version, "");

        let out = StatelessTracker
            .check_update(
                &policy(),
                UpdateCheck {
                    device_id: Some(String::new()),
                    version: Some(String::new()),
                },
            )
            .await
            .unwrap();
        assert_eq!(out.device_id, "");
        assert_eq!(out.user_version, "");
        assert!(out.update.update_available);
    }

    #[tokio::test]
    async fn test_check_update_trusts_caller_version() {
        let out = StatelessTracker
            .check_update(
                &policy(),
                UpdateCheck {
                    device_id: None,
                    version: Some("1.0.0".into()),
                },
            )
            .await
            .unwrap();
        assert!(!out.update.update_available);
        assert_eq!(out.device_id, "unknown");
    }

    #[tokio::test]
    async fn test_telemetry_still_requires_device_id() {
        let err = StatelessTracker
            .update_downloaded(&policy(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_stats_stub() {
        let stats = serde_json::to_value(StatelessTracker.stats(&policy()).await.unwrap()).unwrap();
        assert_eq!(stats["total_users"], 0);
        assert!(stats.get("version_distribution").is_none());
        assert_eq!(stats["status"], "API is working!");
    }
}
