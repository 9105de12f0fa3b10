//! Wire-facing error type. Every response body a client can receive on a
//! failure path has the shape `{ "error_code": "...", "message": "..." }`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use isx_auth::AuthError;
use isx_store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    MalformedBody(String),

    #[error("{0}")]
    InvalidField(String),

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("access token expired")]
    TokenExpired,

    #[error("{0}")]
    InvalidToken(String),

    #[error("account is disabled")]
    AccountDisabled,

    #[error("refresh token reuse detected, session revoked")]
    TokenReuseDetected,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    BatchRequired(String),

    #[error("request body exceeds {0} bytes")]
    RequestTooLarge(usize),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedBody(_) | ApiError::InvalidField(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials(_)
            | ApiError::TokenExpired
            | ApiError::InvalidToken(_)
            | ApiError::AccountDisabled
            | ApiError::TokenReuseDetected => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyExists(_) => StatusCode::CONFLICT,
            ApiError::BatchRequired(_) => StatusCode::PRECONDITION_FAILED,
            ApiError::RequestTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::MalformedBody(_) => "malformed_body",
            ApiError::InvalidField(_) => "invalid_field",
            ApiError::InvalidCredentials(_) => "invalid_credentials",
            ApiError::TokenExpired => "token_expired",
            ApiError::InvalidToken(_) => "invalid_token",
            ApiError::AccountDisabled => "account_disabled",
            ApiError::TokenReuseDetected => "token_reuse_detected",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "resource_not_found",
            ApiError::AlreadyExists(_) => "resource_already_exists",
            ApiError::BatchRequired(_) => "batch_required",
            ApiError::RequestTooLarge(_) => "request_too_large",
            ApiError::RateLimited => "rate_limit_exceeded",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// The standard error body.
    pub fn body(&self) -> serde_json::Value {
        let message = match self {
            // Internal details stay in the logs.
            ApiError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        serde_json::json!({ "error_code": self.error_code(), "message": message })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(error = %detail, "internal error");
        }
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedBody(rejection.body_text())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound("resource not found".into()),
            StoreError::Conflict(what) => ApiError::AlreadyExists(format!("{what} already exists")),
            StoreError::Db(e) => ApiError::Internal(e.to_string()),
            StoreError::Corrupt(e) => ApiError::Internal(e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => {
                ApiError::InvalidCredentials("invalid credentials".into())
            }
            AuthError::AccountDisabled => ApiError::AccountDisabled,
            AuthError::TokenExpired => ApiError::TokenExpired,
            AuthError::InvalidToken(m) => ApiError::InvalidToken(m),
            AuthError::TokenReuseDetected => ApiError::TokenReuseDetected,
            AuthError::WeakPassword(n) => {
                ApiError::InvalidField(format!("password must be at least {n} characters"))
            }
            AuthError::InvalidInput(m) => ApiError::InvalidField(m),
            AuthError::Hash(m) => ApiError::Internal(m),
            AuthError::Store(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
