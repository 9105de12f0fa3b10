/// Errors surfaced by the persistence gateway.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("{0} already exists")]
    Conflict(String),

    #[error("database: {0}")]
    Db(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Map a unique-constraint violation to [`StoreError::Conflict`], leaving
/// every other database error untouched.
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: &str) -> StoreError {
    let unique = err
        .as_database_error()
        .map(|d| d.kind() == sqlx::error::ErrorKind::UniqueViolation)
        .unwrap_or(false);
    if unique {
        StoreError::Conflict(what.to_string())
    } else {
        StoreError::Db(err)
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|d| d.kind() == sqlx::error::ErrorKind::UniqueViolation)
        .unwrap_or(false)
}
