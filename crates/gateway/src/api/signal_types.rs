//! Signal-type management.
//!
//! - `POST /api/isn/:isn_slug/signal_types`                 — create (bump-derived version)
//! - `GET  /api/isn/:isn_slug/signal_types`                 — list
//! - `PUT  /api/isn/:isn_slug/signal_types/:slug/:sem_ver`  — enable/disable

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use isx_auth::Claims;
use isx_domain::model::{is_skip_validation_url, is_valid_slug, Isn, SignalType};
use isx_domain::sem_ver::{bump_sem_ver, BumpType};

use crate::api::parse_version_segment;
use crate::cache::SchemaCache;
use crate::api::AppJson;
use crate::error::{ApiError, Result};
use crate::middleware::Authenticated;
use crate::schema_fetch::fetch_schema;
use crate::state::AppState;

fn signal_type_view(st: &SignalType) -> serde_json::Value {
    serde_json::json!({
        "id": st.id,
        "slug": st.slug,
        "sem_ver": st.sem_ver,
        "path": st.path(),
        "title": st.title,
        "schema_url": st.schema_url,
        "readme_url": st.readme_url,
        "is_in_use": st.is_in_use,
        "created_at": st.created_at,
    })
}

/// Signal types are managed by global owner/admin or the ISN's admin.
async fn ensure_type_admin(state: &AppState, claims: &Claims, isn_slug: &str) -> Result<Isn> {
    let isn = state
        .store
        .get_isn_by_slug(isn_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("isn {isn_slug} not found")))?;

    let is_isn_admin = claims
        .isn_perm(isn_slug)
        .map(|p| p.isn_admin)
        .unwrap_or(false);
    if !claims.role.is_admin() && !is_isn_admin {
        return Err(ApiError::Forbidden(format!(
            "isn admin rights required on {isn_slug}"
        )));
    }
    Ok(isn)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/isn/:isn_slug/signal_types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateSignalTypeRequest {
    pub slug: String,
    pub title: String,
    pub bump_type: BumpType,
    pub schema_url: String,
    #[serde(default)]
    pub readme_url: Option<String>,
}

pub async fn create_signal_type(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(isn_slug): Path<String>,
    AppJson(req): AppJson<CreateSignalTypeRequest>,
) -> Result<Response> {
    let isn = ensure_type_admin(&state, &claims, &isn_slug).await?;
    if !is_valid_slug(&req.slug) {
        return Err(ApiError::InvalidField(format!(
            "slug {:?} is not a valid URL-safe slug",
            req.slug
        )));
    }

    // The sentinel skips both the fetch and, later, payload validation.
    let schema_content = if is_skip_validation_url(&req.schema_url) {
        "{}".to_string()
    } else {
        fetch_schema(&state.http, &req.schema_url, &state.config.schema_allowed_hosts).await?
    };

    let previous = state.store.latest_sem_ver(isn.id, &req.slug).await?;
    let sem_ver = bump_sem_ver(previous.as_deref(), req.bump_type)
        .map_err(ApiError::Internal)?;

    let signal_type = state
        .store
        .create_signal_type(
            isn.id,
            &req.slug,
            &sem_ver,
            &req.title,
            &req.schema_url,
            &schema_content,
            req.readme_url.as_deref(),
        )
        .await?;

    // Make the new type visible to in-flight submitters without a reload.
    state
        .schema_cache
        .insert(
            SchemaCache::key(&isn_slug, &signal_type.slug, &signal_type.sem_ver),
            &signal_type.schema_url,
            &signal_type.schema_content,
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(isn = %isn_slug, path = %signal_type.path(), "signal type created");
    Ok((StatusCode::CREATED, Json(signal_type_view(&signal_type))).into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/isn/:isn_slug/signal_types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_signal_types(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(isn_slug): Path<String>,
) -> Result<Json<serde_json::Value>> {
    crate::middleware::ensure_isn_permission(
        &state,
        &claims,
        &isn_slug,
        isx_domain::model::Permission::Read,
    )
    .await?;
    let isn = state
        .store
        .get_isn_by_slug(&isn_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("isn {isn_slug} not found")))?;
    let types = state.store.list_signal_types(isn.id).await?;
    let views: Vec<_> = types.iter().map(signal_type_view).collect();
    Ok(Json(serde_json::json!({ "signal_types": views, "count": views.len() })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PUT /api/isn/:isn_slug/signal_types/:slug/:sem_ver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct UpdateSignalTypeRequest {
    pub is_in_use: bool,
}

pub async fn update_signal_type(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path((isn_slug, slug, version_segment)): Path<(String, String, String)>,
    AppJson(req): AppJson<UpdateSignalTypeRequest>,
) -> Result<StatusCode> {
    let isn = ensure_type_admin(&state, &claims, &isn_slug).await?;
    let sem_ver = parse_version_segment(&version_segment)?;
    state
        .store
        .set_signal_type_in_use(isn.id, &slug, &sem_ver, req.is_in_use)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
