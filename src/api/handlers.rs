use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::Local;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use super::{
    types::{
        BannerResponse, CheckUpdateQuery, DeviceRequest, HealthResponse, LogsQuery,
        RegisterRequest, SetVersionRequest, SetVersionResponse,
    },
    AppState, ENDPOINTS,
};
use crate::{
    error::ApiError,
    model::{Blob, MAX_BLOB_BYTES},
    store::DEFAULT_LOG_LIMIT,
    tracker::{
        Ack, CheckOutcome, LogListing, RegisterOutcome, Registration, Stats, UpdateCheck,
        UserListing,
    },
};

/// Upper bound for `/admin/logs?limit=`.
pub const MAX_LOG_LIMIT: usize = 1000;

/// Decodes a JSON body. An empty or `null` body reads as all fields absent.
pub(crate) fn parse_body<T>(body: &Bytes) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("invalid JSON body: {e}")))?;
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value).map_err(|e| ApiError::Validation(format!("invalid request: {e}")))
}

pub(crate) fn user_info_blob(value: Option<Value>) -> Result<Blob, ApiError> {
    match value {
        None | Some(Value::Null) => Ok(Blob::new()),
        Some(Value::Object(map)) => {
            let size = serde_json::to_vec(&map)
                .map_err(|e| ApiError::Validation(format!("invalid user_info: {e}")))?
                .len();
            if size > MAX_BLOB_BYTES {
                return Err(ApiError::Validation(format!(
                    "user_info exceeds {MAX_BLOB_BYTES} bytes"
                )));
            }
            Ok(map)
        }
        Some(_) => Err(ApiError::Validation("user_info must be a JSON object".into())),
    }
}

pub(crate) fn parse_limit(raw: Option<&str>) -> Result<usize, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(DEFAULT_LOG_LIMIT);
    };
    match raw.parse::<usize>() {
        Ok(0) | Err(_) => Err(ApiError::Validation(
            "limit must be a positive integer".into(),
        )),
        Ok(n) => Ok(n.min(MAX_LOG_LIMIT)),
    }
}

pub async fn home(State(state): State<AppState>) -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "User Tracking API is running!",
        version: state.policy.snapshot().current_version,
        mode: state.tracker.mode().as_str(),
        endpoints: ENDPOINTS,
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Local::now().to_rfc3339(),
        version: state.policy.snapshot().current_version,
    })
}

pub async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RegisterOutcome>, ApiError> {
    let req: RegisterRequest = parse_body(&body)?;
    let registration = Registration {
        device_id: req.device_id,
        version: req.version,
        user_info: user_info_blob(req.user_info)?,
    };
    let policy = state.policy.snapshot();
    let outcome = state.tracker.register(&policy, registration).await?;
    Ok(Json(outcome))
}

pub async fn check_update(
    State(state): State<AppState>,
    query: Result<Query<CheckUpdateQuery>, QueryRejection>,
) -> Result<Json<CheckOutcome>, ApiError> {
    let Query(query) = query?;
    let policy = state.policy.snapshot();
    let outcome = state
        .tracker
        .check_update(
            &policy,
            UpdateCheck {
                device_id: query.device_id,
                version: query.version,
            },
        )
        .await?;
    Ok(Json(outcome))
}

pub async fn update_downloaded(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Ack>, ApiError> {
    let req: DeviceRequest = parse_body(&body)?;
    let policy = state.policy.snapshot();
    let ack = state.tracker.update_downloaded(&policy, req.device_id).await?;
    Ok(Json(ack))
}

pub async fn update_installed(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Ack>, ApiError> {
    let req: DeviceRequest = parse_body(&body)?;
    let policy = state.policy.snapshot();
    let ack = state
        .tracker
        .update_installed(&policy, req.device_id, req.version)
        .await?;
    Ok(Json(ack))
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<UserListing>, ApiError> {
    Ok(Json(state.tracker.list_users().await?))
}

pub async fn list_logs(
    State(state): State<AppState>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Json<LogListing>, ApiError> {
    let Query(query) = query?;
    let limit = parse_limit(query.limit.as_deref())?;
    Ok(Json(state.tracker.list_logs(limit).await?))
}

pub async fn set_version(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SetVersionResponse>, ApiError> {
    let req: SetVersionRequest = parse_body(&body)?;
    let policy = state
        .policy
        .set_version(req.version.as_deref(), req.download_url.as_deref())?;
    info!(
        version = %policy.current_version,
        download_url = %policy.update_url,
        "advertised version changed"
    );

    let log_warning = state
        .tracker
        .version_changed(&policy, req.download_url.as_deref())
        .await;

    Ok(Json(SetVersionResponse {
        message: "Version updated successfully",
        current_version: policy.current_version,
        download_url: policy.update_url,
        log_warning,
    }))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<Stats>, ApiError> {
    let policy = state.policy.snapshot();
    Ok(Json(state.tracker.stats(&policy).await?))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".into())
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
