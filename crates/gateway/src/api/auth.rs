//! User registration, login, and the password-reset flow.
//!
//! - `POST /api/auth/register`                — create a user account
//! - `POST /api/auth/login`                   — password login, sets the refresh cookie
//! - `POST /api/auth/password-reset/request`  — issue a single-use reset token
//! - `POST /api/auth/password-reset/confirm`  — consume the token, set the new password

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::api::oauth::{access_token_body, refresh_cookie};
use crate::api::AppJson;
use crate::error::{ApiError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/auth/register
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<Response> {
    let (account, user) = state.auth.register_user(&req.email, &req.password).await?;
    tracing::info!(account_id = %account.id, role = account.role.as_str(), "user registered");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "account_id": account.id,
            "email": user.email,
            "role": account.role,
        })),
    )
        .into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/auth/login
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<(CookieJar, Json<serde_json::Value>)> {
    let session = state.auth.login(&req.email, &req.password).await?;
    let refresh = session
        .refresh_token
        .clone()
        .ok_or_else(|| ApiError::Internal("login issued no refresh token".into()))?;
    Ok((
        jar.add(refresh_cookie(&state, refresh)),
        Json(access_token_body(&session)),
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/auth/password-reset/request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

/// Always answers `accepted` so the endpoint cannot probe for accounts.
/// The token rides in the response for the external mail collaborator;
/// rendering and delivery are not this service's concern.
pub async fn password_reset_request(
    State(state): State<AppState>,
    AppJson(req): AppJson<ResetRequest>,
) -> Result<Json<serde_json::Value>> {
    let token = state.auth.request_password_reset(&req.email).await?;
    let mut body = serde_json::json!({ "status": "accepted" });
    if let Some(token) = token {
        body["reset_token"] = serde_json::Value::String(token);
    }
    Ok(Json(body))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/auth/password-reset/confirm
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ResetConfirm {
    pub token: String,
    pub new_password: String,
}

pub async fn password_reset_confirm(
    State(state): State<AppState>,
    AppJson(req): AppJson<ResetConfirm>,
) -> Result<StatusCode> {
    state
        .auth
        .confirm_password_reset(&req.token, &req.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
