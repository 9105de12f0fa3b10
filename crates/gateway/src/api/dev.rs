//! Destructive test endpoint, mounted only in dev/test and additionally
//! guarded by the dev-env middleware.

use axum::extract::State;
use axum::http::StatusCode;

use crate::error::Result;
use crate::middleware::AdminGuard;
use crate::state::AppState;

/// `DELETE /api/dev/reset` — truncate every table.
pub async fn reset(
    State(state): State<AppState>,
    AdminGuard(_claims): AdminGuard,
) -> Result<StatusCode> {
    state.store.reset_all().await?;
    tracing::warn!("database reset");
    Ok(StatusCode::NO_CONTENT)
}
