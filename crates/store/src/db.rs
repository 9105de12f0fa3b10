//! Pool construction, embedded schema, and row-decoding helpers.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Uniqueness constraints here underpin the system invariants: slugs,
/// emails, client ids, `(account, isn, signal_type, local_ref)`,
/// `(signal, version_number)`, and the partial index keeping at most one
/// `is_latest` batch per `(isn, account)`.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL CHECK (kind IN ('user', 'service_account')),
    role        TEXT NOT NULL CHECK (role IN ('owner', 'admin', 'member')),
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    account_id     TEXT PRIMARY KEY REFERENCES accounts(id),
    email          TEXT NOT NULL UNIQUE,
    password_hash  TEXT NOT NULL,
    created_at     INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS service_accounts (
    account_id    TEXT PRIMARY KEY REFERENCES accounts(id),
    organization  TEXT NOT NULL,
    client_id     TEXT NOT NULL UNIQUE,
    created_at    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS client_secrets (
    id           TEXT PRIMARY KEY,
    account_id   TEXT NOT NULL REFERENCES service_accounts(account_id),
    secret_hash  TEXT NOT NULL,
    created_at   INTEGER NOT NULL,
    expires_at   INTEGER NOT NULL,
    revoked_at   INTEGER
);

CREATE TABLE IF NOT EXISTS refresh_tokens (
    id                   TEXT PRIMARY KEY,
    account_id           TEXT NOT NULL REFERENCES accounts(id),
    token_hash           TEXT NOT NULL UNIQUE,
    previous_token_hash  TEXT,
    created_at           INTEGER NOT NULL,
    expires_at           INTEGER NOT NULL,
    revoked_at           INTEGER
);

CREATE TABLE IF NOT EXISTS password_reset_tokens (
    id          TEXT PRIMARY KEY,
    account_id  TEXT NOT NULL REFERENCES accounts(id),
    token_hash  TEXT NOT NULL UNIQUE,
    created_at  INTEGER NOT NULL,
    expires_at  INTEGER NOT NULL,
    used_at     INTEGER
);

CREATE TABLE IF NOT EXISTS isns (
    id                TEXT PRIMARY KEY,
    slug              TEXT NOT NULL UNIQUE,
    title             TEXT NOT NULL,
    detail            TEXT,
    visibility        TEXT NOT NULL CHECK (visibility IN ('public', 'private')),
    is_in_use         INTEGER NOT NULL DEFAULT 1,
    owner_account_id  TEXT NOT NULL REFERENCES accounts(id),
    created_at        INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS signal_types (
    id              TEXT PRIMARY KEY,
    isn_id          TEXT NOT NULL REFERENCES isns(id),
    slug            TEXT NOT NULL,
    sem_ver         TEXT NOT NULL,
    title           TEXT NOT NULL,
    schema_url      TEXT NOT NULL,
    schema_content  TEXT NOT NULL,
    readme_url      TEXT,
    is_in_use       INTEGER NOT NULL DEFAULT 1,
    created_at      INTEGER NOT NULL,
    UNIQUE (isn_id, slug, sem_ver)
);

CREATE TABLE IF NOT EXISTS isn_accounts (
    isn_id      TEXT NOT NULL REFERENCES isns(id),
    account_id  TEXT NOT NULL REFERENCES accounts(id),
    permission  TEXT NOT NULL CHECK (permission IN ('read', 'write')),
    created_at  INTEGER NOT NULL,
    PRIMARY KEY (isn_id, account_id)
);

CREATE TABLE IF NOT EXISTS batches (
    id          TEXT PRIMARY KEY,
    isn_id      TEXT NOT NULL REFERENCES isns(id),
    account_id  TEXT NOT NULL REFERENCES accounts(id),
    is_latest   INTEGER NOT NULL DEFAULT 1,
    created_at  INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS batches_one_latest
    ON batches (isn_id, account_id) WHERE is_latest = 1;

CREATE TABLE IF NOT EXISTS signals (
    id              TEXT PRIMARY KEY,
    account_id      TEXT NOT NULL REFERENCES accounts(id),
    isn_id          TEXT NOT NULL REFERENCES isns(id),
    signal_type_id  TEXT NOT NULL REFERENCES signal_types(id),
    local_ref       TEXT NOT NULL,
    is_withdrawn    INTEGER NOT NULL DEFAULT 0,
    created_at      INTEGER NOT NULL,
    UNIQUE (account_id, isn_id, signal_type_id, local_ref)
);

CREATE TABLE IF NOT EXISTS signal_versions (
    id                       TEXT PRIMARY KEY,
    signal_id                TEXT NOT NULL REFERENCES signals(id),
    batch_id                 TEXT REFERENCES batches(id),
    version_number           INTEGER NOT NULL,
    content                  TEXT NOT NULL,
    correlated_to_signal_id  TEXT REFERENCES signals(id),
    created_at               INTEGER NOT NULL,
    UNIQUE (signal_id, version_number)
);

CREATE INDEX IF NOT EXISTS signal_versions_by_time
    ON signal_versions (signal_id, created_at);

CREATE INDEX IF NOT EXISTS signal_versions_by_correlation
    ON signal_versions (correlated_to_signal_id)
    WHERE correlated_to_signal_id IS NOT NULL;
"#;

/// The persistence gateway. Cheap to clone; all methods run on the shared
/// bounded pool.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: SqlitePool,
}

impl Store {
    /// Open the database and apply the embedded schema.
    ///
    /// In-memory databases are pinned to a single connection — each SQLite
    /// `:memory:` connection is otherwise a distinct database.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        min_connections: u32,
        connection_lifetime: Duration,
    ) -> Result<Self> {
        let in_memory = url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(url)
            .map_err(StoreError::Db)?
            .create_if_missing(true)
            .journal_mode(if in_memory {
                SqliteJournalMode::Memory
            } else {
                SqliteJournalMode::Wal
            })
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { max_connections })
            .min_connections(if in_memory { 1 } else { min_connections })
            .max_lifetime(Some(connection_lifetime))
            .connect_with(options)
            .await?;

        let store = Store { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&mut *conn).await?;
        }
        Ok(())
    }

    /// Readiness-probe ping.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Truncate every table. Only reachable behind the dev-env guard.
    pub async fn reset_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "signal_versions",
            "signals",
            "batches",
            "isn_accounts",
            "signal_types",
            "isns",
            "password_reset_tokens",
            "refresh_tokens",
            "client_secrets",
            "service_accounts",
            "users",
            "accounts",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// ── row-decoding helpers ────────────────────────────────────────────

pub(crate) fn col_uuid(row: &SqliteRow, name: &str) -> Result<Uuid> {
    let raw: String = row.try_get(name)?;
    Uuid::parse_str(&raw).map_err(|e| StoreError::Corrupt(format!("{name}: {e}")))
}

pub(crate) fn col_uuid_opt(row: &SqliteRow, name: &str) -> Result<Option<Uuid>> {
    let raw: Option<String> = row.try_get(name)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| StoreError::Corrupt(format!("{name}: {e}"))))
        .transpose()
}

pub(crate) fn col_time(row: &SqliteRow, name: &str) -> Result<DateTime<Utc>> {
    let millis: i64 = row.try_get(name)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Corrupt(format!("{name}: bad timestamp {millis}")))
}

pub(crate) fn col_time_opt(row: &SqliteRow, name: &str) -> Result<Option<DateTime<Utc>>> {
    let millis: Option<i64> = row.try_get(name)?;
    millis
        .map(|m| {
            DateTime::from_timestamp_millis(m)
                .ok_or_else(|| StoreError::Corrupt(format!("{name}: bad timestamp {m}")))
        })
        .transpose()
}

pub(crate) fn millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
