//! The OAuth-shaped token endpoints.
//!
//! - `POST /oauth/token?grant_type=refresh_token`      — rotate the refresh cookie
//! - `POST /oauth/token?grant_type=client_credentials` — service-account login
//! - `POST /oauth/revoke`                              — revoke refresh cookie or client secrets

use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;

use isx_auth::{Session, REFRESH_TOKEN_TTL};

use crate::error::{ApiError, Result};
use crate::state::AppState;

pub const REFRESH_COOKIE: &str = "refresh_token";

/// Refresh cookie, scoped to the OAuth path so it never rides on API calls.
pub fn refresh_cookie(state: &AppState, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(REFRESH_COOKIE, value);
    cookie.set_http_only(true);
    cookie.set_path("/oauth");
    cookie.set_same_site(SameSite::Strict);
    cookie.set_secure(state.config.environment.is_hardened());
    cookie.set_max_age(time::Duration::seconds(REFRESH_TOKEN_TTL.as_secs() as i64));
    cookie
}

/// The access-token JSON returned by login and both grant types.
pub fn access_token_body(session: &Session) -> serde_json::Value {
    serde_json::json!({
        "access_token": session.access_token,
        "token_type": "Bearer",
        "expires_in": session.expires_in,
        "account_id": session.account.id,
        "role": session.account.role,
    })
}

#[derive(Debug, Deserialize)]
pub struct GrantQuery {
    pub grant_type: String,
}

#[derive(Debug, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /oauth/token
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn token(
    State(state): State<AppState>,
    Query(query): Query<GrantQuery>,
    jar: CookieJar,
    body: Option<Json<ClientCredentials>>,
) -> Result<Response> {
    match query.grant_type.as_str() {
        "refresh_token" => {
            let presented = jar
                .get(REFRESH_COOKIE)
                .map(|c| c.value().to_string())
                .ok_or_else(|| ApiError::InvalidToken("missing refresh token cookie".into()))?;

            let session = state.auth.rotate_refresh_token(&presented).await?;
            let next = session
                .refresh_token
                .clone()
                .ok_or_else(|| ApiError::Internal("rotation issued no refresh token".into()))?;
            Ok((
                jar.add(refresh_cookie(&state, next)),
                Json(access_token_body(&session)),
            )
                .into_response())
        }
        "client_credentials" => {
            let Json(creds) =
                body.ok_or_else(|| ApiError::MalformedBody("client credentials required".into()))?;
            let session = state
                .auth
                .client_credentials(&creds.client_id, &creds.client_secret)
                .await?;
            Ok(Json(access_token_body(&session)).into_response())
        }
        other => Err(ApiError::InvalidField(format!(
            "unsupported grant_type {other:?}"
        ))),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /oauth/revoke
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Revokes whichever credential is presented: the refresh cookie, or a
/// client id + secret pair (which revokes every live secret for that
/// client).
pub async fn revoke(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<ClientCredentials>>,
) -> Result<Response> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        let presented = cookie.value().to_string();
        state.auth.revoke_presented_refresh_token(&presented).await?;
        let mut removal = Cookie::from(REFRESH_COOKIE);
        removal.set_path("/oauth");
        return Ok((jar.remove(removal), StatusCode::NO_CONTENT).into_response());
    }

    if let Some(Json(creds)) = body {
        // Prove possession before revoking.
        state
            .auth
            .client_credentials(&creds.client_id, &creds.client_secret)
            .await?;
        let (account, _) = state
            .store
            .find_service_account_by_client_id(&creds.client_id)
            .await?
            .ok_or_else(|| ApiError::InvalidCredentials("unknown client".into()))?;
        state.store.revoke_client_secrets(account.id).await?;
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    Err(ApiError::InvalidField(
        "no refresh cookie or client credentials presented".into(),
    ))
}
