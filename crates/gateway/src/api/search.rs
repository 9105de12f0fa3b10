//! Signal search.
//!
//! - `GET /api/isn/:isn_slug/signal_types/:slug/:sem_ver/signals/search`        — private (read/write)
//! - `GET /api/public/isn/:isn_slug/signal_types/:slug/:sem_ver/signals/search` — public ISNs, no auth
//!
//! Returns the latest version per signal, optionally expanded with prior
//! versions and one-hop correlated signals.

use axum::extract::{Json, Path, Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use isx_domain::model::{signal_type_path, AccountKind, Permission};
use isx_store::{SearchParams, SearchRow};

use crate::api::parse_version_segment;
use crate::error::{ApiError, Result};
use crate::middleware::{ensure_isn_permission, Authenticated};
use crate::state::AppState;

/// Hard cap on rows per response.
const MAX_RESULTS: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub account_id: Option<Uuid>,
    #[serde(default)]
    pub signal_id: Option<Uuid>,
    #[serde(default)]
    pub local_ref: Option<String>,
    #[serde(default)]
    pub include_withdrawn: bool,
    #[serde(default)]
    pub include_correlated: bool,
    #[serde(default)]
    pub include_previous_versions: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub account_id: Uuid,
    pub account_type: AccountKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub signal_id: Uuid,
    pub local_ref: String,
    pub signal_created_at: DateTime<Utc>,
    pub signal_version_id: Uuid,
    pub version_number: i64,
    pub version_created_at: DateTime<Utc>,
    pub correlated_to_signal_id: Option<Uuid>,
    pub is_withdrawn: bool,
    pub content: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlated_signals: Option<Vec<SearchResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_signal_versions: Option<Vec<VersionView>>,
}

#[derive(Debug, Serialize)]
pub struct VersionView {
    pub signal_version_id: Uuid,
    pub version_number: i64,
    pub created_at: DateTime<Utc>,
    pub content: serde_json::Value,
}

fn result_from_row(row: SearchRow, with_email: bool) -> SearchResult {
    SearchResult {
        account_id: row.account_id,
        account_type: row.account_kind,
        email: if with_email { row.email } else { None },
        signal_id: row.signal_id,
        local_ref: row.local_ref,
        signal_created_at: row.signal_created_at,
        signal_version_id: row.signal_version_id,
        version_number: row.version_number,
        version_created_at: row.version_created_at,
        correlated_to_signal_id: row.correlated_to_signal_id,
        is_withdrawn: row.is_withdrawn,
        content: row.content,
        correlated_signals: None,
        previous_signal_versions: None,
    }
}

async fn run_search(
    state: &AppState,
    isn_slug: &str,
    type_slug: &str,
    version_segment: &str,
    query: SearchQuery,
    with_email: bool,
) -> Result<serde_json::Value> {
    let sem_ver = parse_version_segment(version_segment)?;
    let isn = state
        .store
        .get_isn_by_slug(isn_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("isn {isn_slug} not found")))?;
    let signal_type = state
        .store
        .get_signal_type(isn.id, type_slug, &sem_ver)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("signal type {type_slug}/v{sem_ver} not found"))
        })?;

    let rows = state
        .store
        .search_signals(&SearchParams {
            isn_id: isn.id,
            signal_type_id: signal_type.id,
            start_date: query.start_date,
            end_date: query.end_date,
            account_id: query.account_id,
            signal_id: query.signal_id,
            local_ref: query.local_ref.clone(),
            include_withdrawn: query.include_withdrawn,
            limit: MAX_RESULTS,
        })
        .await?;

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        let mut result = result_from_row(row, with_email);

        if query.include_previous_versions {
            let versions = state
                .store
                .previous_versions(result.signal_id, result.version_number)
                .await?
                .into_iter()
                .map(|(id, number, created_at, content)| VersionView {
                    signal_version_id: id,
                    version_number: number,
                    created_at,
                    content,
                })
                .collect();
            result.previous_signal_versions = Some(versions);
        }

        if query.include_correlated {
            let correlated = state
                .store
                .correlated_signals(result.signal_id, query.include_withdrawn)
                .await?
                .into_iter()
                .map(|r| result_from_row(r, with_email))
                .collect();
            result.correlated_signals = Some(correlated);
        }

        results.push(result);
    }

    Ok(serde_json::json!({ "signals": results, "count": results.len() }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Private search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn search_private(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path((isn_slug, type_slug, version_segment)): Path<(String, String, String)>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>> {
    ensure_isn_permission(&state, &claims, &isn_slug, Permission::Read).await?;
    let body = run_search(&state, &isn_slug, &type_slug, &version_segment, query, true).await?;
    Ok(Json(body))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Unauthenticated. Reachability is gated by the startup snapshot, so a
/// request for anything not cached is a plain 404 with zero database work.
pub async fn search_public(
    State(state): State<AppState>,
    Path((isn_slug, type_slug, version_segment)): Path<(String, String, String)>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>> {
    let sem_ver = parse_version_segment(&version_segment)?;
    let path = signal_type_path(&type_slug, &sem_ver);
    if !state.public_isns.contains(&isn_slug) || !state.public_isns.has_signal_type(&isn_slug, &path)
    {
        return Err(ApiError::NotFound(format!(
            "no public signal type {path} on {isn_slug}"
        )));
    }

    // Producer emails are never exposed on the public surface.
    let body = run_search(&state, &isn_slug, &type_slug, &version_segment, query, false).await?;
    Ok(Json(body))
}
