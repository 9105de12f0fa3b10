//! ISN queries: CRUD, permission grants, ownership, and the startup feed
//! for the public-ISN cache.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use isx_domain::model::{Isn, IsnVisibility, Permission};

use crate::db::{col_time, col_uuid, now_millis, Store};
use crate::error::{conflict_on_unique, Result, StoreError};

/// One row of `get_in_use_public_isn_signal_types`.
#[derive(Debug, Clone)]
pub struct PublicSignalTypeRow {
    pub isn_slug: String,
    pub signal_type_slug: String,
    pub sem_ver: String,
}

pub(crate) fn isn_from_row(row: &SqliteRow) -> Result<Isn> {
    let visibility_raw: String = row.try_get("visibility")?;
    Ok(Isn {
        id: col_uuid(row, "id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        detail: row.try_get("detail")?,
        visibility: IsnVisibility::parse(&visibility_raw)
            .ok_or_else(|| StoreError::Corrupt(format!("visibility: {visibility_raw}")))?,
        is_in_use: row.try_get::<i64, _>("is_in_use")? != 0,
        owner_account_id: col_uuid(row, "owner_account_id")?,
        created_at: col_time(row, "created_at")?,
    })
}

const ISN_COLS: &str = "id, slug, title, detail, visibility, is_in_use, owner_account_id, created_at";

impl Store {
    pub async fn create_isn(
        &self,
        slug: &str,
        title: &str,
        detail: Option<&str>,
        visibility: IsnVisibility,
        owner_account_id: Uuid,
    ) -> Result<Isn> {
        let id = Uuid::new_v4();
        let now = now_millis();
        sqlx::query(
            "INSERT INTO isns (id, slug, title, detail, visibility, is_in_use, owner_account_id, created_at) \
             VALUES (?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(id.to_string())
        .bind(slug)
        .bind(title)
        .bind(detail)
        .bind(visibility.as_str())
        .bind(owner_account_id.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "isn slug"))?;

        self.get_isn_by_slug(slug).await?.ok_or(StoreError::NotFound)
    }

    pub async fn get_isn_by_slug(&self, slug: &str) -> Result<Option<Isn>> {
        let row = sqlx::query(&format!("SELECT {ISN_COLS} FROM isns WHERE slug = ?"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| isn_from_row(&r)).transpose()
    }

    pub async fn list_isns(&self) -> Result<Vec<Isn>> {
        let rows = sqlx::query(&format!("SELECT {ISN_COLS} FROM isns ORDER BY slug"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(isn_from_row).collect()
    }

    pub async fn update_isn(
        &self,
        slug: &str,
        title: Option<&str>,
        detail: Option<&str>,
        visibility: Option<IsnVisibility>,
        is_in_use: Option<bool>,
    ) -> Result<Isn> {
        let mut tx = self.pool.begin().await?;

        if let Some(title) = title {
            sqlx::query("UPDATE isns SET title = ? WHERE slug = ?")
                .bind(title)
                .bind(slug)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(detail) = detail {
            sqlx::query("UPDATE isns SET detail = ? WHERE slug = ?")
                .bind(detail)
                .bind(slug)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(visibility) = visibility {
            sqlx::query("UPDATE isns SET visibility = ? WHERE slug = ?")
                .bind(visibility.as_str())
                .bind(slug)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(in_use) = is_in_use {
            sqlx::query("UPDATE isns SET is_in_use = ? WHERE slug = ?")
                .bind(in_use as i64)
                .bind(slug)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.get_isn_by_slug(slug).await?.ok_or(StoreError::NotFound)
    }

    pub async fn transfer_isn_ownership(&self, slug: &str, new_owner: Uuid) -> Result<()> {
        let res = sqlx::query("UPDATE isns SET owner_account_id = ? WHERE slug = ?")
            .bind(new_owner.to_string())
            .bind(slug)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ── permission grants ───────────────────────────────────────────

    /// Upsert an explicit grant. Widening (read → write) and narrowing both
    /// rewrite the row; implicit grants are computed at token issuance and
    /// are never stored.
    pub async fn grant_isn_permission(
        &self,
        isn_id: Uuid,
        account_id: Uuid,
        permission: Permission,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO isn_accounts (isn_id, account_id, permission, created_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (isn_id, account_id) DO UPDATE SET permission = excluded.permission",
        )
        .bind(isn_id.to_string())
        .bind(account_id.to_string())
        .bind(permission.as_str())
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn revoke_isn_permission(&self, isn_id: Uuid, account_id: Uuid) -> Result<()> {
        let res = sqlx::query("DELETE FROM isn_accounts WHERE isn_id = ? AND account_id = ?")
            .bind(isn_id.to_string())
            .bind(account_id.to_string())
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Explicit grants for one account, joined with the granting ISN.
    pub async fn explicit_grants_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<(Isn, Permission)>> {
        let rows = sqlx::query(
            "SELECT i.id, i.slug, i.title, i.detail, i.visibility, i.is_in_use, \
                    i.owner_account_id, i.created_at, ia.permission AS grant_permission \
             FROM isn_accounts ia JOIN isns i ON i.id = ia.isn_id \
             WHERE ia.account_id = ?",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let isn = isn_from_row(row)?;
                let raw: String = row.try_get("grant_permission")?;
                let permission = Permission::parse(&raw)
                    .ok_or_else(|| StoreError::Corrupt(format!("permission: {raw}")))?;
                Ok((isn, permission))
            })
            .collect()
    }

    pub async fn isns_owned_by(&self, account_id: Uuid) -> Result<Vec<Isn>> {
        let rows = sqlx::query(&format!(
            "SELECT {ISN_COLS} FROM isns WHERE owner_account_id = ?"
        ))
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(isn_from_row).collect()
    }

    // ── public-ISN cache feed ───────────────────────────────────────

    /// Signal-type paths of every public, in-use ISN whose signal type is
    /// itself in use. Loaded once at startup by the public-ISN cache.
    pub async fn get_in_use_public_isn_signal_types(&self) -> Result<Vec<PublicSignalTypeRow>> {
        let rows = sqlx::query(
            "SELECT i.slug AS isn_slug, st.slug AS signal_type_slug, st.sem_ver \
             FROM isns i JOIN signal_types st ON st.isn_id = i.id \
             WHERE i.visibility = 'public' AND i.is_in_use = 1 AND st.is_in_use = 1",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PublicSignalTypeRow {
                    isn_slug: row.try_get("isn_slug")?,
                    signal_type_slug: row.try_get("signal_type_slug")?,
                    sem_ver: row.try_get("sem_ver")?,
                })
            })
            .collect()
    }
}
