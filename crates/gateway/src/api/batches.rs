//! Explicit batch management for service accounts.
//!
//! - `POST /api/isn/:isn_slug/batches`        — open a new batch (closes the previous latest)
//! - `GET  /api/isn/:isn_slug/batches/latest` — current open batch

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use isx_domain::model::{Batch, Permission};

use crate::error::{ApiError, Result};
use crate::middleware::{ensure_isn_permission, Authenticated};
use crate::state::AppState;

fn batch_view(batch: &Batch) -> serde_json::Value {
    serde_json::json!({
        "batch_id": batch.id,
        "isn_id": batch.isn_id,
        "account_id": batch.account_id,
        "is_latest": batch.is_latest,
        "created_at": batch.created_at,
    })
}

pub async fn create_batch(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(isn_slug): Path<String>,
) -> Result<Response> {
    ensure_isn_permission(&state, &claims, &isn_slug, Permission::Write).await?;
    let isn = state
        .store
        .get_isn_by_slug(&isn_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("isn {isn_slug} not found")))?;

    let batch = state.store.create_batch(isn.id, claims.sub).await?;
    tracing::info!(isn = %isn_slug, batch_id = %batch.id, "batch opened");
    Ok((StatusCode::CREATED, Json(batch_view(&batch))).into_response())
}

pub async fn latest_batch(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(isn_slug): Path<String>,
) -> Result<Json<serde_json::Value>> {
    ensure_isn_permission(&state, &claims, &isn_slug, Permission::Write).await?;
    let isn = state
        .store
        .get_isn_by_slug(&isn_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("isn {isn_slug} not found")))?;

    let batch = state
        .store
        .latest_batch(isn.id, claims.sub)
        .await?
        .ok_or_else(|| ApiError::NotFound("no open batch".into()))?;
    Ok(Json(batch_view(&batch)))
}
