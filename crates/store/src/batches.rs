//! Batch lifecycle. The partial unique index `batches_one_latest` is what
//! holds the "at most one latest per (isn, account)" invariant under
//! concurrent creation — the close-then-insert below runs in one
//! transaction, so a losing writer fails on the index and retries.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use isx_domain::model::Batch;

use crate::db::{col_time, col_uuid, now_millis, Store};
use crate::error::{is_unique_violation, Result};

fn batch_from_row(row: &SqliteRow) -> Result<Batch> {
    Ok(Batch {
        id: col_uuid(row, "id")?,
        isn_id: col_uuid(row, "isn_id")?,
        account_id: col_uuid(row, "account_id")?,
        is_latest: row.try_get::<i64, _>("is_latest")? != 0,
        created_at: col_time(row, "created_at")?,
    })
}

impl Store {
    /// Open a new batch, closing the previous latest one atomically.
    pub async fn create_batch(&self, isn_id: Uuid, account_id: Uuid) -> Result<Batch> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE batches SET is_latest = 0 WHERE isn_id = ? AND account_id = ? AND is_latest = 1",
        )
        .bind(isn_id.to_string())
        .bind(account_id.to_string())
        .execute(&mut *tx)
        .await?;

        let id = Uuid::new_v4();
        let now = now_millis();
        sqlx::query(
            "INSERT INTO batches (id, isn_id, account_id, is_latest, created_at) VALUES (?, ?, ?, 1, ?)",
        )
        .bind(id.to_string())
        .bind(isn_id.to_string())
        .bind(account_id.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Batch {
            id,
            isn_id,
            account_id,
            is_latest: true,
            created_at: chrono::DateTime::from_timestamp_millis(now)
                .unwrap_or_else(chrono::Utc::now),
        })
    }

    pub async fn latest_batch(&self, isn_id: Uuid, account_id: Uuid) -> Result<Option<Batch>> {
        let row = sqlx::query(
            "SELECT id, isn_id, account_id, is_latest, created_at \
             FROM batches WHERE isn_id = ? AND account_id = ? AND is_latest = 1",
        )
        .bind(isn_id.to_string())
        .bind(account_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| batch_from_row(&r)).transpose()
    }

    /// User accounts get a batch implicitly on first write. A concurrent
    /// first write loses the insert race on the partial index and picks up
    /// the winner's batch instead.
    pub async fn get_or_create_latest_batch(
        &self,
        isn_id: Uuid,
        account_id: Uuid,
    ) -> Result<Batch> {
        if let Some(batch) = self.latest_batch(isn_id, account_id).await? {
            return Ok(batch);
        }
        match self.create_batch(isn_id, account_id).await {
            Ok(batch) => Ok(batch),
            Err(crate::StoreError::Db(e)) if is_unique_violation(&e) => self
                .latest_batch(isn_id, account_id)
                .await?
                .ok_or(crate::StoreError::NotFound),
            Err(e) => Err(e),
        }
    }
}
