//! Signal persistence: per-signal versioned upsert, withdrawal, and the
//! filtered search read path.
//!
//! `upsert_signal_version` is the serialization point for concurrent
//! submissions of the same `(account, isn, signal_type, local_ref)`: the
//! unique index on that tuple decides the insert race, and the losing
//! writer re-reads the winner's row inside the same transaction scope.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use isx_domain::model::AccountKind;

use crate::db::{col_time, col_uuid, col_uuid_opt, millis, now_millis, Store};
use crate::error::{is_unique_violation, Result, StoreError};

/// Input for one signal submission, already validated against its schema.
#[derive(Debug, Clone)]
pub struct NewSignalVersion {
    pub account_id: Uuid,
    pub isn_id: Uuid,
    pub signal_type_id: Uuid,
    pub local_ref: String,
    /// Raw JSON payload, stored verbatim.
    pub content: String,
    pub batch_id: Option<Uuid>,
    pub correlated_to_signal_id: Option<Uuid>,
}

/// Outcome of a stored submission.
#[derive(Debug, Clone)]
pub struct StoredVersion {
    pub signal_id: Uuid,
    pub signal_version_id: Uuid,
    pub version_number: i64,
}

/// Search filters, with slugs already resolved to ids.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub isn_id: Uuid,
    pub signal_type_id: Uuid,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub account_id: Option<Uuid>,
    pub signal_id: Option<Uuid>,
    pub local_ref: Option<String>,
    pub include_withdrawn: bool,
    pub limit: i64,
}

/// One search result: a signal joined with its latest version and the
/// producing account.
#[derive(Debug, Clone)]
pub struct SearchRow {
    pub account_id: Uuid,
    pub account_kind: AccountKind,
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
}

const SEARCH_COLS: &str = "s.id AS signal_id, s.local_ref, s.created_at AS signal_created_at, \
     s.is_withdrawn, s.account_id, a.kind AS account_kind, u.email, \
     sv.id AS version_id, sv.version_number, sv.created_at AS version_created_at, \
     sv.content, sv.correlated_to_signal_id";

const SEARCH_JOINS: &str = "FROM signals s \
     JOIN signal_versions sv ON sv.signal_id = s.id \
          AND sv.version_number = (SELECT MAX(version_number) FROM signal_versions WHERE signal_id = s.id) \
     JOIN accounts a ON a.id = s.account_id \
     LEFT JOIN users u ON u.account_id = s.account_id";

fn search_row(row: &SqliteRow) -> Result<SearchRow> {
    let kind_raw: String = row.try_get("account_kind")?;
    let content_raw: String = row.try_get("content")?;
    Ok(SearchRow {
        account_id: col_uuid(row, "account_id")?,
        account_kind: AccountKind::parse(&kind_raw)
            .ok_or_else(|| StoreError::Corrupt(format!("account_kind: {kind_raw}")))?,
        email: row.try_get("email")?,
        signal_id: col_uuid(row, "signal_id")?,
        local_ref: row.try_get("local_ref")?,
        signal_created_at: col_time(row, "signal_created_at")?,
        signal_version_id: col_uuid(row, "version_id")?,
        version_number: row.try_get("version_number")?,
        version_created_at: col_time(row, "version_created_at")?,
        correlated_to_signal_id: col_uuid_opt(row, "correlated_to_signal_id")?,
        is_withdrawn: row.try_get::<i64, _>("is_withdrawn")? != 0,
        content: serde_json::from_str(&content_raw)
            .map_err(|e| StoreError::Corrupt(format!("content: {e}")))?,
    })
}

impl Store {
    /// Store one signal submission: first version for a new `local_ref`,
    /// `max + 1` for an existing one. Re-submitting a withdrawn signal
    /// reactivates it. Runs in a single transaction.
    pub async fn upsert_signal_version(&self, new: &NewSignalVersion) -> Result<StoredVersion> {
        let mut tx = self.pool.begin().await?;
        let now = now_millis();

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM signals \
             WHERE account_id = ? AND isn_id = ? AND signal_type_id = ? AND local_ref = ?",
        )
        .bind(new.account_id.to_string())
        .bind(new.isn_id.to_string())
        .bind(new.signal_type_id.to_string())
        .bind(&new.local_ref)
        .fetch_optional(&mut *tx)
        .await?;

        let signal_id = match existing {
            Some(raw) => {
                Uuid::parse_str(&raw).map_err(|e| StoreError::Corrupt(format!("signal id: {e}")))?
            }
            None => {
                let id = Uuid::new_v4();
                let inserted = sqlx::query(
                    "INSERT INTO signals \
                     (id, account_id, isn_id, signal_type_id, local_ref, is_withdrawn, created_at) \
                     VALUES (?, ?, ?, ?, ?, 0, ?)",
                )
                .bind(id.to_string())
                .bind(new.account_id.to_string())
                .bind(new.isn_id.to_string())
                .bind(new.signal_type_id.to_string())
                .bind(&new.local_ref)
                .bind(now)
                .execute(&mut *tx)
                .await;

                match inserted {
                    Ok(_) => id,
                    // Lost the insert race: the row now exists, read it back.
                    Err(e) if is_unique_violation(&e) => {
                        let raw: String = sqlx::query_scalar(
                            "SELECT id FROM signals \
                             WHERE account_id = ? AND isn_id = ? AND signal_type_id = ? AND local_ref = ?",
                        )
                        .bind(new.account_id.to_string())
                        .bind(new.isn_id.to_string())
                        .bind(new.signal_type_id.to_string())
                        .bind(&new.local_ref)
                        .fetch_one(&mut *tx)
                        .await?;
                        Uuid::parse_str(&raw)
                            .map_err(|e| StoreError::Corrupt(format!("signal id: {e}")))?
                    }
                    Err(e) => return Err(StoreError::Db(e)),
                }
            }
        };

        let version_number: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version_number), 0) + 1 FROM signal_versions WHERE signal_id = ?",
        )
        .bind(signal_id.to_string())
        .fetch_one(&mut *tx)
        .await?;

        let version_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO signal_versions \
             (id, signal_id, batch_id, version_number, content, correlated_to_signal_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(version_id.to_string())
        .bind(signal_id.to_string())
        .bind(new.batch_id.map(|b| b.to_string()))
        .bind(version_number)
        .bind(&new.content)
        .bind(new.correlated_to_signal_id.map(|c| c.to_string()))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // A new version of a withdrawn signal reactivates it.
        if version_number > 1 {
            sqlx::query("UPDATE signals SET is_withdrawn = 0 WHERE id = ?")
                .bind(signal_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(StoredVersion {
            signal_id,
            signal_version_id: version_id,
            version_number,
        })
    }

    /// Flag a signal withdrawn. Versions are untouched.
    pub async fn withdraw_signal(
        &self,
        account_id: Uuid,
        isn_id: Uuid,
        signal_type_id: Uuid,
        local_ref: &str,
    ) -> Result<()> {
        let res = sqlx::query(
            "UPDATE signals SET is_withdrawn = 1 \
             WHERE account_id = ? AND isn_id = ? AND signal_type_id = ? AND local_ref = ?",
        )
        .bind(account_id.to_string())
        .bind(isn_id.to_string())
        .bind(signal_type_id.to_string())
        .bind(local_ref)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// ISN a signal belongs to — correlation targets must share the
    /// submitter's ISN. Signals are never deleted, so this lookup cannot
    /// go stale.
    pub async fn get_signal_isn(&self, signal_id: Uuid) -> Result<Option<Uuid>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT isn_id FROM signals WHERE id = ?")
            .bind(signal_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        raw.map(|s| Uuid::parse_str(&s).map_err(|e| StoreError::Corrupt(format!("isn_id: {e}"))))
            .transpose()
    }

    // ── search ──────────────────────────────────────────────────────

    /// Latest-version rows matching the filters, newest first.
    pub async fn search_signals(&self, params: &SearchParams) -> Result<Vec<SearchRow>> {
        let mut sql = format!("SELECT {SEARCH_COLS} {SEARCH_JOINS} WHERE s.isn_id = ? AND s.signal_type_id = ?");

        if !params.include_withdrawn {
            sql.push_str(" AND s.is_withdrawn = 0");
        }
        if params.start_date.is_some() {
            sql.push_str(" AND sv.created_at >= ?");
        }
        if params.end_date.is_some() {
            sql.push_str(" AND sv.created_at <= ?");
        }
        if params.account_id.is_some() {
            sql.push_str(" AND s.account_id = ?");
        }
        if params.signal_id.is_some() {
            sql.push_str(" AND s.id = ?");
        }
        if params.local_ref.is_some() {
            sql.push_str(" AND s.local_ref = ?");
        }
        sql.push_str(" ORDER BY sv.created_at DESC LIMIT ?");

        let mut query = sqlx::query(&sql)
            .bind(params.isn_id.to_string())
            .bind(params.signal_type_id.to_string());
        if let Some(start) = params.start_date {
            query = query.bind(millis(start));
        }
        if let Some(end) = params.end_date {
            query = query.bind(millis(end));
        }
        if let Some(account_id) = params.account_id {
            query = query.bind(account_id.to_string());
        }
        if let Some(signal_id) = params.signal_id {
            query = query.bind(signal_id.to_string());
        }
        if let Some(local_ref) = &params.local_ref {
            query = query.bind(local_ref);
        }
        query = query.bind(params.limit);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(search_row).collect()
    }

    /// All versions before `before_version`, oldest first.
    pub async fn previous_versions(
        &self,
        signal_id: Uuid,
        before_version: i64,
    ) -> Result<Vec<(Uuid, i64, DateTime<Utc>, serde_json::Value)>> {
        let rows = sqlx::query(
            "SELECT id, version_number, created_at, content FROM signal_versions \
             WHERE signal_id = ? AND version_number < ? ORDER BY version_number ASC",
        )
        .bind(signal_id.to_string())
        .bind(before_version)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let content_raw: String = row.try_get("content")?;
                Ok((
                    col_uuid(row, "id")?,
                    row.try_get::<i64, _>("version_number")?,
                    col_time(row, "created_at")?,
                    serde_json::from_str(&content_raw)
                        .map_err(|e| StoreError::Corrupt(format!("content: {e}")))?,
                ))
            })
            .collect()
    }

    /// Latest-version rows of every signal correlated to `target` (one hop).
    pub async fn correlated_signals(
        &self,
        target: Uuid,
        include_withdrawn: bool,
    ) -> Result<Vec<SearchRow>> {
        let mut sql = format!(
            "SELECT {SEARCH_COLS} {SEARCH_JOINS} \
             WHERE s.id IN (SELECT DISTINCT signal_id FROM signal_versions WHERE correlated_to_signal_id = ?)"
        );
        if !include_withdrawn {
            sql.push_str(" AND s.is_withdrawn = 0");
        }
        sql.push_str(" ORDER BY sv.created_at DESC");

        let rows = sqlx::query(&sql)
            .bind(target.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(search_row).collect()
    }
}
