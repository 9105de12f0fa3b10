//! ISN management.
//!
//! - `POST   /api/isn`                         — create (owner/admin)
//! - `GET    /api/isn`                         — list
//! - `GET    /api/isn/:isn_slug`               — detail (read permission)
//! - `PUT    /api/isn/:isn_slug`               — update / enable / disable
//! - `PUT    /api/isn/:isn_slug/transfer`      — transfer ownership (ISN admin)
//! - `POST   /api/isn/:isn_slug/permissions`   — grant read/write (ISN admin)
//! - `DELETE /api/isn/:isn_slug/permissions`   — revoke a grant (ISN admin)

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use isx_auth::Claims;
use isx_domain::model::{is_valid_slug, Account, Isn, IsnVisibility, Permission};

use crate::api::AppJson;
use crate::error::{ApiError, Result};
use crate::middleware::{ensure_isn_permission, AdminGuard, Authenticated};
use crate::state::AppState;

fn isn_view(isn: &Isn) -> serde_json::Value {
    serde_json::json!({
        "id": isn.id,
        "slug": isn.slug,
        "title": isn.title,
        "detail": isn.detail,
        "visibility": isn.visibility,
        "is_in_use": isn.is_in_use,
        "owner_account_id": isn.owner_account_id,
        "created_at": isn.created_at,
    })
}

/// ISN-admin gate: the ISN's owning user or a global owner (both carry
/// `isn_admin` in their claims).
fn ensure_isn_admin(claims: &Claims, isn_slug: &str) -> Result<()> {
    match claims.isn_perm(isn_slug) {
        Some(perm) if perm.isn_admin => Ok(()),
        Some(_) => Err(ApiError::Forbidden(format!(
            "isn admin rights required on {isn_slug}"
        ))),
        None => Err(ApiError::NotFound(format!("isn {isn_slug} not found"))),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/isn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateIsnRequest {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
    pub visibility: IsnVisibility,
}

pub async fn create_isn(
    State(state): State<AppState>,
    AdminGuard(claims): AdminGuard,
    AppJson(req): AppJson<CreateIsnRequest>,
) -> Result<Response> {
    if !is_valid_slug(&req.slug) {
        return Err(ApiError::InvalidField(format!(
            "slug {:?} is not a valid URL-safe slug",
            req.slug
        )));
    }
    let isn = state
        .store
        .create_isn(
            &req.slug,
            &req.title,
            req.detail.as_deref(),
            req.visibility,
            claims.sub,
        )
        .await?;
    tracing::info!(slug = %isn.slug, visibility = isn.visibility.as_str(), "isn created");
    Ok((StatusCode::CREATED, Json(isn_view(&isn))).into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/isn, GET /api/isn/:isn_slug
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_isns(
    State(state): State<AppState>,
    Authenticated(_claims): Authenticated,
) -> Result<Json<serde_json::Value>> {
    let isns = state.store.list_isns().await?;
    let views: Vec<_> = isns.iter().map(isn_view).collect();
    Ok(Json(serde_json::json!({ "isns": views, "count": views.len() })))
}

pub async fn get_isn(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(isn_slug): Path<String>,
) -> Result<Json<serde_json::Value>> {
    ensure_isn_permission(&state, &claims, &isn_slug, Permission::Read).await?;
    let isn = state
        .store
        .get_isn_by_slug(&isn_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("isn {isn_slug} not found")))?;
    Ok(Json(isn_view(&isn)))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PUT /api/isn/:isn_slug
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct UpdateIsnRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub visibility: Option<IsnVisibility>,
    #[serde(default)]
    pub is_in_use: Option<bool>,
}

/// Title/detail/visibility updates need the admin role or ISN-admin rights;
/// toggling `is_in_use` is reserved for the owning user or a global owner.
pub async fn update_isn(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(isn_slug): Path<String>,
    AppJson(req): AppJson<UpdateIsnRequest>,
) -> Result<Json<serde_json::Value>> {
    if req.is_in_use.is_some() {
        ensure_isn_admin(&claims, &isn_slug)?;
    } else if !claims.role.is_admin() {
        ensure_isn_admin(&claims, &isn_slug)?;
    }
    let isn = state
        .store
        .update_isn(
            &isn_slug,
            req.title.as_deref(),
            req.detail.as_deref(),
            req.visibility,
            req.is_in_use,
        )
        .await?;
    Ok(Json(isn_view(&isn)))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PUT /api/isn/:isn_slug/transfer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub new_owner_email: String,
}

pub async fn transfer_isn(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(isn_slug): Path<String>,
    AppJson(req): AppJson<TransferRequest>,
) -> Result<StatusCode> {
    ensure_isn_admin(&claims, &isn_slug)?;
    let new_owner = lookup_user_account(&state, &req.new_owner_email).await?;
    state
        .store
        .transfer_isn_ownership(&isn_slug, new_owner.id)
        .await?;
    tracing::info!(slug = %isn_slug, new_owner = %new_owner.id, "isn ownership transferred");
    Ok(StatusCode::NO_CONTENT)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST / DELETE /api/isn/:isn_slug/permissions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Grant target: a user by email, or a service account by client id.
#[derive(Debug, Deserialize)]
pub struct GrantTarget {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub permission: Option<Permission>,
}

async fn lookup_user_account(state: &AppState, email: &str) -> Result<Account> {
    state
        .store
        .find_account_by_email(&email.trim().to_lowercase())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no account for {email}")))
}

async fn resolve_target(state: &AppState, target: &GrantTarget) -> Result<Account> {
    match (&target.email, &target.client_id) {
        (Some(email), None) => lookup_user_account(state, email).await,
        (None, Some(client_id)) => state
            .store
            .find_service_account_by_client_id(client_id)
            .await?
            .map(|(account, _)| account)
            .ok_or_else(|| ApiError::NotFound(format!("no service account {client_id}"))),
        _ => Err(ApiError::InvalidField(
            "exactly one of email or client_id is required".into(),
        )),
    }
}

pub async fn grant_permission(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(isn_slug): Path<String>,
    AppJson(req): AppJson<GrantTarget>,
) -> Result<StatusCode> {
    ensure_isn_admin(&claims, &isn_slug)?;
    let permission = req
        .permission
        .ok_or_else(|| ApiError::InvalidField("permission is required".into()))?;
    let isn = state
        .store
        .get_isn_by_slug(&isn_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("isn {isn_slug} not found")))?;
    let account = resolve_target(&state, &req).await?;

    state
        .store
        .grant_isn_permission(isn.id, account.id, permission)
        .await?;
    tracing::info!(
        slug = %isn_slug,
        account_id = %account.id,
        permission = permission.as_str(),
        "isn permission granted"
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn revoke_permission(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(isn_slug): Path<String>,
    AppJson(req): AppJson<GrantTarget>,
) -> Result<StatusCode> {
    ensure_isn_admin(&claims, &isn_slug)?;
    let isn = state
        .store
        .get_isn_by_slug(&isn_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("isn {isn_slug} not found")))?;
    let account = resolve_target(&state, &req).await?;
    state.store.revoke_isn_permission(isn.id, account.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
