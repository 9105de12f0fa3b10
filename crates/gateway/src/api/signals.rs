//! Signal ingestion.
//!
//! - `POST /api/isn/:isn_slug/signal_types/:slug/:sem_ver/signals`          — multi-signal submit
//! - `PUT  /api/isn/:isn_slug/signal_types/:slug/:sem_ver/signals/withdraw` — withdraw by local_ref
//!
//! Atomicity is per-signal: each item validates, correlates, and versions
//! independently inside its own transaction, and the response reports every
//! item. Whole-request failures (auth, unknown ISN/type, no batch, empty
//! array) are the only 4xx paths.

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use isx_auth::Claims;
use isx_domain::model::{AccountKind, Isn, Permission, SignalType};
use isx_store::NewSignalVersion;

use crate::api::parse_version_segment;
use crate::cache::{SchemaCache, ValidateError};
use crate::api::AppJson;
use crate::error::{ApiError, Result};
use crate::middleware::{ensure_isn_permission, Authenticated};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub signals: Vec<SubmitItem>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitItem {
    pub local_ref: String,
    pub content: serde_json::Value,
    #[serde(default)]
    pub correlated_to_signal_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub total_submitted: usize,
    pub stored_count: usize,
    pub failed_count: usize,
    pub results: Vec<ItemResult>,
}

#[derive(Debug, Serialize)]
pub struct ItemResult {
    pub local_ref: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ItemResult {
    fn stored(local_ref: String, signal_id: Uuid, version_number: i64) -> Self {
        ItemResult {
            local_ref,
            status: "stored",
            signal_id: Some(signal_id),
            version_number: Some(version_number),
            error_code: None,
            message: None,
        }
    }

    fn failed(local_ref: String, error_code: &'static str, message: String) -> Self {
        ItemResult {
            local_ref,
            status: "failed",
            signal_id: None,
            version_number: None,
            error_code: Some(error_code),
            message: Some(message),
        }
    }
}

/// Resolve the `(isn, signal type)` addressed by the path, or 404.
async fn resolve_target(
    state: &AppState,
    isn_slug: &str,
    type_slug: &str,
    version_segment: &str,
) -> Result<(Isn, SignalType)> {
    let sem_ver = parse_version_segment(version_segment)?;
    let isn = state
        .store
        .get_isn_by_slug(isn_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("isn {isn_slug} not found")))?;
    let signal_type = state
        .store
        .get_signal_type(isn.id, type_slug, &sem_ver)
        .await?
        .filter(|st| st.is_in_use)
        .ok_or_else(|| {
            ApiError::NotFound(format!("signal type {type_slug}/v{sem_ver} not found"))
        })?;
    Ok((isn, signal_type))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST .../signals
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn submit_signals(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path((isn_slug, type_slug, version_segment)): Path<(String, String, String)>,
    AppJson(req): AppJson<SubmitRequest>,
) -> Result<Response> {
    ensure_isn_permission(&state, &claims, &isn_slug, Permission::Write).await?;
    let (isn, signal_type) = resolve_target(&state, &isn_slug, &type_slug, &version_segment).await?;

    if req.signals.is_empty() {
        return Err(ApiError::InvalidField("signals must not be empty".into()));
    }

    let batch_id = select_batch(&state, &claims, &isn).await?;
    let schema_key = SchemaCache::key(&isn_slug, &signal_type.slug, &signal_type.sem_ver);

    let total_submitted = req.signals.len();
    let mut results = Vec::with_capacity(total_submitted);
    for item in req.signals {
        results.push(process_item(&state, &claims, &isn, &signal_type, batch_id, &schema_key, item).await);
    }

    let stored_count = results.iter().filter(|r| r.status == "stored").count();
    let failed_count = total_submitted - stored_count;
    let status = if failed_count > 0 && stored_count == 0 {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };

    tracing::info!(
        isn = %isn_slug,
        signal_type = %signal_type.path(),
        total_submitted,
        stored_count,
        failed_count,
        "signals submitted"
    );

    Ok((
        status,
        Json(SubmitResponse {
            total_submitted,
            stored_count,
            failed_count,
            results,
        }),
    )
        .into_response())
}

/// Users get a batch implicitly; service accounts must have opened one.
async fn select_batch(state: &AppState, claims: &Claims, isn: &Isn) -> Result<Uuid> {
    match claims.account_type {
        AccountKind::User => Ok(state
            .store
            .get_or_create_latest_batch(isn.id, claims.sub)
            .await?
            .id),
        AccountKind::ServiceAccount => state
            .store
            .latest_batch(isn.id, claims.sub)
            .await?
            .map(|b| b.id)
            .ok_or_else(|| {
                ApiError::BatchRequired(format!(
                    "open a batch on {} before submitting signals",
                    isn.slug
                ))
            }),
    }
}

/// One signal, processed independently. Failures become `failed` items,
/// never transport errors.
async fn process_item(
    state: &AppState,
    claims: &Claims,
    isn: &Isn,
    signal_type: &SignalType,
    batch_id: Uuid,
    schema_key: &str,
    item: SubmitItem,
) -> ItemResult {
    if item.local_ref.is_empty() {
        return ItemResult::failed(
            item.local_ref,
            "invalid_field",
            "local_ref must not be empty".into(),
        );
    }

    if let Err(e) = state.schema_cache.validate(schema_key, &item.content).await {
        let code = match &e {
            ValidateError::UnknownSignalType => "unknown_signal_type",
            ValidateError::SchemaValidationFailed(_) => "schema_validation_failed",
            ValidateError::Compile(_) | ValidateError::Store(_) => "internal_error",
        };
        return ItemResult::failed(item.local_ref, code, e.to_string());
    }

    // Correlation targets must exist and live in the same ISN.
    if let Some(target) = item.correlated_to_signal_id {
        match state.store.get_signal_isn(target).await {
            Ok(None) => {
                return ItemResult::failed(
                    item.local_ref,
                    "correlation_target_not_found",
                    format!("correlated signal {target} does not exist"),
                )
            }
            Ok(Some(target_isn)) if target_isn != isn.id => {
                return ItemResult::failed(
                    item.local_ref,
                    "correlation_cross_isn",
                    "correlated signal belongs to a different isn".into(),
                )
            }
            Ok(Some(_)) => {}
            Err(e) => return ItemResult::failed(item.local_ref, "internal_error", e.to_string()),
        }
    }

    let new = NewSignalVersion {
        account_id: claims.sub,
        isn_id: isn.id,
        signal_type_id: signal_type.id,
        local_ref: item.local_ref.clone(),
        content: item.content.to_string(),
        batch_id: Some(batch_id),
        correlated_to_signal_id: item.correlated_to_signal_id,
    };
    match state.store.upsert_signal_version(&new).await {
        Ok(stored) => ItemResult::stored(item.local_ref, stored.signal_id, stored.version_number),
        Err(e) => {
            tracing::error!(local_ref = %item.local_ref, error = %e, "signal storage failed");
            ItemResult::failed(item.local_ref, "internal_error", "storage failed".into())
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PUT .../signals/withdraw
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub local_ref: String,
}

/// Withdraw one of the caller's own signals. Versions stay; search hides
/// the signal until it is resubmitted.
pub async fn withdraw_signal(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path((isn_slug, type_slug, version_segment)): Path<(String, String, String)>,
    AppJson(req): AppJson<WithdrawRequest>,
) -> Result<StatusCode> {
    ensure_isn_permission(&state, &claims, &isn_slug, Permission::Write).await?;
    let (isn, signal_type) = resolve_target(&state, &isn_slug, &type_slug, &version_segment).await?;

    state
        .store
        .withdraw_signal(claims.sub, isn.id, signal_type.id, &req.local_ref)
        .await
        .map_err(|e| match e {
            isx_store::StoreError::NotFound => {
                ApiError::NotFound(format!("no signal with local_ref {:?}", req.local_ref))
            }
            other => other.into(),
        })?;
    Ok(StatusCode::NO_CONTENT)
}
