use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::debug;

use super::{DataStore, StoreError, StoreResult, LOGS_TABLE, USERS_TABLE};
use crate::model::{activity::ActivityLogEntry, user::User};

/// PostgREST (Supabase) client for the two record collections.
///
/// The handle is created once at start-up and reused; `reqwest::Client` pools connections.
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
}

/// Rows requested per page on full scans. PostgREST silently caps every response at
/// its `max-rows` setting, so scans keep paging until a page comes back empty.
const SCAN_PAGE: usize = 1000;

#[derive(Deserialize)]
struct VersionRow {
    current_version: String,
}

#[derive(Deserialize)]
struct ActionRow {
    action: String,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
    }

    fn get(&self, table: &str) -> RequestBuilder {
        self.authorized(self.client.get(self.table_url(table)))
    }

    async fn send(req: RequestBuilder) -> StoreResult<Response> {
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn fetch_all<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> StoreResult<Vec<T>> {
        let mut rows = Vec::new();
        loop {
            let req = self.get(table).query(filters).query(&[
                ("limit", SCAN_PAGE.to_string()),
                ("offset", rows.len().to_string()),
            ]);
            let page: Vec<T> = Self::fetch(req).await?;
            if page.is_empty() {
                debug!(table, rows = rows.len(), "scan complete");
                return Ok(rows);
            }
            rows.extend(page);
        }
    }

    async fn fetch<T: DeserializeOwned>(req: RequestBuilder) -> StoreResult<Vec<T>> {
        let response = Self::send(req).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// Reads the total from a `Content-Range` header such as `0-24/3573` or `*/0`.
pub(crate) fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl DataStore for RestStore {
    async fn find_user(&self, device_id: &str) -> StoreResult<Option<User>> {
        let req = self
            .get(USERS_TABLE)
            .query(&[("select", "*"), ("device_id", eq(device_id).as_str())]);
        let rows: Vec<User> = Self::fetch(req).await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_user(&self, user: &User) -> StoreResult<User> {
        let req = self
            .authorized(self.client.post(self.table_url(USERS_TABLE)))
            .query(&[("on_conflict", "device_id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[user]);
        let rows: Vec<User> = Self::fetch(req).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("upsert returned no rows".into()))
    }

    async fn set_user_version(
        &self,
        device_id: &str,
        version: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let req = self
            .authorized(self.client.patch(self.table_url(USERS_TABLE)))
            .query(&[("device_id", eq(device_id))])
            .header("Prefer", "return=representation")
            .json(&json!({
                "current_version": version,
                "last_updated": at,
            }));
        let rows: Vec<serde_json::Value> = Self::fetch(req).await?;
        debug!(device_id, matched = rows.len(), "set_user_version");
        Ok(!rows.is_empty())
    }

    async fn append_log(&self, entry: &ActivityLogEntry) -> StoreResult<()> {
        let req = self
            .authorized(self.client.post(self.table_url(LOGS_TABLE)))
            .header("Prefer", "return=minimal")
            .json(entry);
        Self::send(req).await?;
        Ok(())
    }

    async fn list_users(&self, limit: usize) -> StoreResult<Vec<User>> {
        let req = self
            .get(USERS_TABLE)
            .query(&[("select", "*".to_string()), ("limit", limit.to_string())]);
        Self::fetch(req).await
    }

    async fn count_users(&self) -> StoreResult<u64> {
        let req = self
            .get(USERS_TABLE)
            .query(&[("select", "device_id"), ("limit", "1")])
            .header("Prefer", "count=exact");
        let response = Self::send(req).await?;
        let range = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::Decode("missing Content-Range on count".into()))?;
        parse_content_range_total(range)
            .ok_or_else(|| StoreError::Decode(format!("bad Content-Range: {range}")))
    }

    async fn list_logs_desc(&self, limit: usize) -> StoreResult<Vec<ActivityLogEntry>> {
        let req = self.get(LOGS_TABLE).query(&[
            ("select", "*".to_string()),
            ("order", "timestamp.desc".to_string()),
            ("limit", limit.to_string()),
        ]);
        Self::fetch(req).await
    }

    async fn list_user_versions(&self) -> StoreResult<Vec<String>> {
        let rows: Vec<VersionRow> = self
            .fetch_all(
                USERS_TABLE,
                &[
                    ("select", "current_version".to_string()),
                    ("order", "device_id.asc".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.current_version).collect())
    }

    async fn list_actions_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let rows: Vec<ActionRow> = self
            .fetch_all(
                LOGS_TABLE,
                &[
                    ("select", "action".to_string()),
                    ("timestamp", format!("gte.{since}")),
                    ("order", "timestamp.asc".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.action).collect())
    }
}
