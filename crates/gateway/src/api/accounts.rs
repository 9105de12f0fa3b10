//! Account administration.
//!
//! - `GET  /api/accounts`                                   — list (owner/admin)
//! - `PUT  /api/accounts/:account_id/status`                — deactivate/reactivate (owner/admin)
//! - `PUT  /api/accounts/:account_id/role`                  — promote/demote (owner only)
//! - `POST /api/service-accounts`                           — onboard a service account (owner/admin)
//! - `POST /api/service-accounts/:client_id/rotate-secret`  — rotate its secret (owner/admin)

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use isx_domain::model::AccountRole;

use crate::api::AppJson;
use crate::error::{ApiError, Result};
use crate::middleware::{AdminGuard, OwnerGuard};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/accounts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_accounts(
    State(state): State<AppState>,
    AdminGuard(_claims): AdminGuard,
) -> Result<Json<serde_json::Value>> {
    let accounts = state.store.list_accounts().await?;
    let views: Vec<_> = accounts
        .iter()
        .map(|(account, handle)| {
            serde_json::json!({
                "account_id": account.id,
                "kind": account.kind,
                "role": account.role,
                "is_active": account.is_active,
                "handle": handle,
                "created_at": account.created_at,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "accounts": views, "count": views.len() })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PUT /api/accounts/:account_id/status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub is_active: bool,
}

pub async fn set_account_status(
    State(state): State<AppState>,
    AdminGuard(claims): AdminGuard,
    Path(account_id): Path<Uuid>,
    AppJson(req): AppJson<StatusRequest>,
) -> Result<StatusCode> {
    if account_id == claims.sub {
        return Err(ApiError::InvalidField(
            "cannot change the status of your own account".into(),
        ));
    }
    state.store.set_account_active(account_id, req.is_active).await?;
    if !req.is_active {
        // Deactivation also kills every live refresh token; access tokens
        // age out within their 30-minute lifetime.
        state.store.revoke_account_refresh_tokens(account_id).await?;
    }
    tracing::info!(%account_id, is_active = req.is_active, "account status changed");
    Ok(StatusCode::NO_CONTENT)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PUT /api/accounts/:account_id/role
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: AccountRole,
}

/// Owner-only promotion/demotion between admin and member. The owner role
/// itself is never granted.
pub async fn set_account_role(
    State(state): State<AppState>,
    OwnerGuard(_claims): OwnerGuard,
    Path(account_id): Path<Uuid>,
    AppJson(req): AppJson<RoleRequest>,
) -> Result<StatusCode> {
    if req.role == AccountRole::Owner {
        return Err(ApiError::InvalidField("the owner role cannot be granted".into()));
    }
    state.store.set_account_role(account_id, req.role).await?;
    tracing::info!(%account_id, role = req.role.as_str(), "account role changed");
    Ok(StatusCode::NO_CONTENT)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/service-accounts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateServiceAccountRequest {
    pub organization: String,
}

/// Returns the one-time client secret — it is never shown again.
pub async fn create_service_account(
    State(state): State<AppState>,
    AdminGuard(_claims): AdminGuard,
    AppJson(req): AppJson<CreateServiceAccountRequest>,
) -> Result<Response> {
    let (account, sa, secret) = state.auth.create_service_account(&req.organization).await?;
    tracing::info!(account_id = %account.id, client_id = %sa.client_id, "service account created");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "account_id": account.id,
            "organization": sa.organization,
            "client_id": secret.client_id,
            "client_secret": secret.client_secret,
            "client_secret_expires_at": secret.expires_at,
        })),
    )
        .into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/service-accounts/:client_id/rotate-secret
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn rotate_client_secret(
    State(state): State<AppState>,
    AdminGuard(_claims): AdminGuard,
    Path(client_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let secret = state.auth.rotate_client_secret(&client_id).await?;
    tracing::info!(%client_id, "client secret rotated");
    Ok(Json(serde_json::json!({
        "client_id": secret.client_id,
        "client_secret": secret.client_secret,
        "client_secret_expires_at": secret.expires_at,
    })))
}
