//! Auth guards: token-validity middleware, role extractors, and the
//! ISN-permission check.
//!
//! The hot path inspects access-token claims only. The database is touched
//! solely on the failure path, to tell "no permission" (403) apart from
//! "no such ISN" (404).

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use isx_auth::Claims;
use isx_domain::model::Permission;

use crate::error::ApiError;
use crate::state::AppState;

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::InvalidToken("missing bearer token".into()))
}

/// Axum middleware that rejects requests without a valid access token and
/// stashes the verified claims in request extensions. Attach via
/// `axum::middleware::from_fn_with_state`.
pub async fn require_valid_token(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = match req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
    {
        Some(t) => t,
        None => return ApiError::InvalidToken("missing bearer token".into()).into_response(),
    };

    match state.auth.verifier().verify(token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Verified claims for the caller. Reads what `require_valid_token` stashed,
/// or verifies the bearer header itself on routes without that layer.
pub struct Authenticated(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<Claims>() {
            return Ok(Authenticated(claims.clone()));
        }
        let token = bearer_token(parts)?;
        state
            .auth
            .verifier()
            .verify(token)
            .map(Authenticated)
            .map_err(Into::into)
    }
}

/// Caller must hold the owner or admin role.
pub struct AdminGuard(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for AdminGuard {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Authenticated(claims) = Authenticated::from_request_parts(parts, state).await?;
        if !claims.role.is_admin() {
            return Err(ApiError::Forbidden("owner or admin role required".into()));
        }
        Ok(AdminGuard(claims))
    }
}

/// Caller must hold the owner role.
pub struct OwnerGuard(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for OwnerGuard {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Authenticated(claims) = Authenticated::from_request_parts(parts, state).await?;
        if claims.role != isx_domain::model::AccountRole::Owner {
            return Err(ApiError::Forbidden("owner role required".into()));
        }
        Ok(OwnerGuard(claims))
    }
}

/// Check the caller's claims for `required` on `isn_slug`.
///
/// 403 when the ISN exists but the caller lacks the permission, 404 when
/// the ISN does not exist at all.
pub async fn ensure_isn_permission(
    state: &AppState,
    claims: &Claims,
    isn_slug: &str,
    required: Permission,
) -> Result<(), ApiError> {
    if claims.has_isn_permission(isn_slug, required) {
        return Ok(());
    }
    if claims.isn_perm(isn_slug).is_some() {
        return Err(ApiError::Forbidden(format!(
            "{} permission required on {isn_slug}",
            required.as_str()
        )));
    }
    match state.store.get_isn_by_slug(isn_slug).await? {
        Some(_) => Err(ApiError::Forbidden(format!(
            "no permission on {isn_slug}"
        ))),
        None => Err(ApiError::NotFound(format!("isn {isn_slug} not found"))),
    }
}

/// Gate for destructive test endpoints: dev and test environments only.
pub async fn require_dev_env(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.environment.is_dev_like() {
        return ApiError::Forbidden("not available in this environment".into()).into_response();
    }
    next.run(req).await
}
