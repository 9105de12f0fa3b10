//! Credential storage: refresh tokens (rotation chain), password-reset
//! tokens, and service-account client secrets. Only hashes are persisted.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{col_time, col_time_opt, col_uuid, millis, now_millis, Store};
use crate::error::Result;
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct RefreshTokenRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub previous_token_hash: Option<String>,
}

impl Store {
    // ── refresh tokens ──────────────────────────────────────────────

    /// Insert a new refresh token. `previous_token_hash` records the token
    /// this one was rotated from, so a replay of the old token can be told
    /// apart from a random guess.
    pub async fn insert_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
        previous_token_hash: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO refresh_tokens \
             (id, account_id, token_hash, previous_token_hash, created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(account_id.to_string())
        .bind(token_hash)
        .bind(previous_token_hash)
        .bind(now_millis())
        .bind(millis(expires_at))
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshTokenRow>> {
        let row = sqlx::query(
            "SELECT id, account_id, expires_at, revoked_at, previous_token_hash \
             FROM refresh_tokens WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(RefreshTokenRow {
                id: col_uuid(&row, "id")?,
                account_id: col_uuid(&row, "account_id")?,
                expires_at: col_time(&row, "expires_at")?,
                revoked_at: col_time_opt(&row, "revoked_at")?,
                previous_token_hash: row.try_get("previous_token_hash")?,
            })
        })
        .transpose()
    }

    /// True when some token was rotated from `token_hash` — i.e. the hash
    /// belongs to an earlier link of a rotation chain.
    pub async fn refresh_token_was_rotated(&self, token_hash: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM refresh_tokens WHERE previous_token_hash = ?",
        )
        .bind(token_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn revoke_refresh_token(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE refresh_tokens SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL")
            .bind(now_millis())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Revoke every live refresh token for an account (chain revocation on
    /// reuse detection, password reset, logout).
    pub async fn revoke_account_refresh_tokens(&self, account_id: Uuid) -> Result<u64> {
        let res = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ? WHERE account_id = ? AND revoked_at IS NULL",
        )
        .bind(now_millis())
        .bind(account_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    /// Delete expired and long-revoked rows. Returns the number pruned.
    pub async fn prune_tokens(&self) -> Result<u64> {
        let now = now_millis();
        let refresh = sqlx::query(
            "DELETE FROM refresh_tokens WHERE expires_at < ? OR revoked_at IS NOT NULL",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        let reset = sqlx::query(
            "DELETE FROM password_reset_tokens WHERE expires_at < ? OR used_at IS NOT NULL",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(refresh.rows_affected() + reset.rows_affected())
    }

    // ── password-reset tokens ───────────────────────────────────────

    pub async fn insert_password_reset_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO password_reset_tokens (id, account_id, token_hash, created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_id.to_string())
        .bind(token_hash)
        .bind(now_millis())
        .bind(millis(expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Single-use consumption: marks the token used and returns its account
    /// in one statement, so two concurrent confirmations cannot both win.
    pub async fn consume_password_reset_token(&self, token_hash: &str) -> Result<Option<Uuid>> {
        let now = now_millis();
        let row = sqlx::query(
            "UPDATE password_reset_tokens SET used_at = ? \
             WHERE token_hash = ? AND used_at IS NULL AND expires_at >= ? \
             RETURNING account_id",
        )
        .bind(now)
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| col_uuid(&r, "account_id")).transpose()
    }

    // ── client secrets ──────────────────────────────────────────────

    pub async fn insert_client_secret(
        &self,
        account_id: Uuid,
        secret_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO client_secrets (id, account_id, secret_hash, created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_id.to_string())
        .bind(secret_hash)
        .bind(now_millis())
        .bind(millis(expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recent live secret hash for a service account, if any.
    pub async fn latest_active_client_secret(&self, account_id: Uuid) -> Result<Option<String>> {
        let hash: Option<String> = sqlx::query_scalar(
            "SELECT secret_hash FROM client_secrets \
             WHERE account_id = ? AND revoked_at IS NULL AND expires_at >= ? \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(account_id.to_string())
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await?;
        Ok(hash)
    }

    pub async fn revoke_client_secrets(&self, account_id: Uuid) -> Result<u64> {
        let res = sqlx::query(
            "UPDATE client_secrets SET revoked_at = ? WHERE account_id = ? AND revoked_at IS NULL",
        )
        .bind(now_millis())
        .bind(account_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }
}
