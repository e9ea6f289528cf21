//! Per-variant behaviour behind the shared HTTP handlers.
//!
//! [`StatelessTracker`] answers from the version policy alone. [`StoreTracker`] keeps
//! users and the activity log in a [`DataStore`](crate::store::DataStore). The two
//! deliberately differ on update checks: the stateless one trusts the version the
//! caller sends, the persistent one looks up the stored version and 404s unknown devices.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::{
    config::TrackerMode,
    error::ApiError,
    model::{activity::ActivityLogEntry, user::User, Blob},
    policy::{PolicySnapshot, UpdateDescription},
};

pub mod persistent;
pub mod stateless;

pub use persistent::StoreTracker;
pub use stateless::StatelessTracker;

pub const DEFAULT_DEVICE_ID: &str = "unknown";
pub const DEFAULT_CLIENT_VERSION: &str = "0.0.0";

#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub device_id: Option<String>,
    pub version: Option<String>,
    pub user_info: Blob,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCheck {
    pub device_id: Option<String>,
    /// Only consulted by the stateless tracker.
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterOutcome {
    pub message: &'static str,
    pub needs_update: bool,
    pub current_version: String,
    pub user_version: String,
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    #[serde(flatten)]
    pub update: UpdateDescription,
    pub user_version: String,
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_warning: Option<String>,
}

/// Acknowledgement for telemetry calls.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserListing {
    pub users: Vec<User>,
    pub total_users: u64,
    /// True when `users` was cut at the configured cap.
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogListing {
    pub logs: Vec<ActivityLogEntry>,
    pub total_logs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_users: u64,
    pub current_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_distribution: Option<BTreeMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub today_activity: Option<BTreeMap<String, u64>>,
    pub download_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
}

#[async_trait]
pub trait Tracker: Send + Sync {
    fn mode(&self) -> TrackerMode;

    async fn register(
        &self,
        policy: &PolicySnapshot,
        req: Registration,
    ) -> Result<RegisterOutcome, ApiError>;

    async fn check_update(
        &self,
        policy: &PolicySnapshot,
        req: UpdateCheck,
    ) -> Result<CheckOutcome, ApiError>;

    async fn update_downloaded(
        &self,
        policy: &PolicySnapshot,
        device_id: Option<String>,
    ) -> Result<Ack, ApiError>;

    async fn update_installed(
        &self,
        policy: &PolicySnapshot,
        device_id: Option<String>,
        version: Option<String>,
    ) -> Result<Ack, ApiError>;

    async fn list_users(&self) -> Result<UserListing, ApiError>;

    async fn list_logs(&self, limit: usize) -> Result<LogListing, ApiError>;

    /// Audit trail for an admin version change that has already been applied.
    /// Returns a warning when the audit entry could not be written.
    async fn version_changed(
        &self,
        policy: &PolicySnapshot,
        requested_url: Option<&str>,
    ) -> Option<String>;

    async fn stats(&self, policy: &PolicySnapshot) -> Result<Stats, ApiError>;
}

/// Non-empty value or a validation error naming `field`.
pub(crate) fn require(field: &str, value: Option<String>) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::missing(field))
}

pub(crate) fn histogram<I>(values: I) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = String>,
{
    let mut counts = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    counts
}

/// Local midnight of the day `now` falls on, as UTC.
pub(crate) fn start_of_local_day(now: DateTime<Local>) -> DateTime<Utc> {
    first_instant_of_day(now.date_naive(), |wall| {
        Local
            .from_local_datetime(wall)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    })
    .unwrap_or_else(|| now.with_timezone(&Utc))
}

/// Earliest wall-clock time on `date` that `resolve` maps to a real instant.
///
/// Midnight itself does not exist where a DST jump skips it; the first valid
/// quarter hour after the gap is used instead.
fn first_instant_of_day<F>(date: NaiveDate, resolve: F) -> Option<DateTime<Utc>>
where
    F: Fn(&NaiveDateTime) -> Option<DateTime<Utc>>,
{
    (0..24 * 4).find_map(|quarter| {
        let time = NaiveTime::from_hms_opt(quarter / 4, (quarter % 4) * 15, 0)?;
        resolve(&date.and_time(time))
    })
}
