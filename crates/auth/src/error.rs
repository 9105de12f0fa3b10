use isx_store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account is disabled")]
    AccountDisabled,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// A rotated refresh token was replayed; the whole chain has been
    /// revoked.
    #[error("refresh token reuse detected")]
    TokenReuseDetected,

    #[error("password must be at least {0} characters")]
    WeakPassword(usize),

    #[error("{0}")]
    InvalidInput(String),

    #[error("password hashing: {0}")]
    Hash(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, AuthError>;
