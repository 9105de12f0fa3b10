//! Signal-type queries, including the schema-cache reload feed.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use isx_domain::model::SignalType;
use isx_domain::sem_ver::compare_sem_ver;

use crate::db::{col_time, col_uuid, now_millis, Store};
use crate::error::{conflict_on_unique, Result, StoreError};

/// One schema-cache entry as read from the database. The cache key is
/// `"{isn_slug}/{signal_type_slug}/v{sem_ver}"` — paths are only unique
/// within an ISN, so the ISN slug is part of the key.
#[derive(Debug, Clone)]
pub struct SchemaEntry {
    pub isn_slug: String,
    pub signal_type_slug: String,
    pub sem_ver: String,
    pub schema_url: String,
    pub schema_content: String,
}

fn signal_type_from_row(row: &SqliteRow) -> Result<SignalType> {
    Ok(SignalType {
        id: col_uuid(row, "id")?,
        isn_id: col_uuid(row, "isn_id")?,
        slug: row.try_get("slug")?,
        sem_ver: row.try_get("sem_ver")?,
        title: row.try_get("title")?,
        schema_url: row.try_get("schema_url")?,
        schema_content: row.try_get("schema_content")?,
        readme_url: row.try_get("readme_url")?,
        is_in_use: row.try_get::<i64, _>("is_in_use")? != 0,
        created_at: col_time(row, "created_at")?,
    })
}

const SIGNAL_TYPE_COLS: &str = "id, isn_id, slug, sem_ver, title, schema_url, schema_content, readme_url, is_in_use, created_at";

impl Store {
    #[allow(clippy::too_many_arguments)]
    pub async fn create_signal_type(
        &self,
        isn_id: Uuid,
        slug: &str,
        sem_ver: &str,
        title: &str,
        schema_url: &str,
        schema_content: &str,
        readme_url: Option<&str>,
    ) -> Result<SignalType> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO signal_types \
             (id, isn_id, slug, sem_ver, title, schema_url, schema_content, readme_url, is_in_use, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(id.to_string())
        .bind(isn_id.to_string())
        .bind(slug)
        .bind(sem_ver)
        .bind(title)
        .bind(schema_url)
        .bind(schema_content)
        .bind(readme_url)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "signal type version"))?;

        self.get_signal_type(isn_id, slug, sem_ver)
            .await?
            .ok_or(StoreError::NotFound)
    }

    pub async fn get_signal_type(
        &self,
        isn_id: Uuid,
        slug: &str,
        sem_ver: &str,
    ) -> Result<Option<SignalType>> {
        let row = sqlx::query(&format!(
            "SELECT {SIGNAL_TYPE_COLS} FROM signal_types WHERE isn_id = ? AND slug = ? AND sem_ver = ?"
        ))
        .bind(isn_id.to_string())
        .bind(slug)
        .bind(sem_ver)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| signal_type_from_row(&r)).transpose()
    }

    pub async fn list_signal_types(&self, isn_id: Uuid) -> Result<Vec<SignalType>> {
        let rows = sqlx::query(&format!(
            "SELECT {SIGNAL_TYPE_COLS} FROM signal_types WHERE isn_id = ? ORDER BY slug, created_at"
        ))
        .bind(isn_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(signal_type_from_row).collect()
    }

    /// Highest existing version of a signal-type line, by semantic-version
    /// order (numeric, not lexical — `10.0.0 > 9.0.0`).
    pub async fn latest_sem_ver(&self, isn_id: Uuid, slug: &str) -> Result<Option<String>> {
        let versions: Vec<String> = sqlx::query_scalar(
            "SELECT sem_ver FROM signal_types WHERE isn_id = ? AND slug = ?",
        )
        .bind(isn_id.to_string())
        .bind(slug)
        .fetch_all(&self.pool)
        .await?;
        Ok(versions
            .into_iter()
            .max_by(|a, b| compare_sem_ver(a, b)))
    }

    pub async fn set_signal_type_in_use(
        &self,
        isn_id: Uuid,
        slug: &str,
        sem_ver: &str,
        in_use: bool,
    ) -> Result<()> {
        let res = sqlx::query(
            "UPDATE signal_types SET is_in_use = ? WHERE isn_id = ? AND slug = ? AND sem_ver = ?",
        )
        .bind(in_use as i64)
        .bind(isn_id.to_string())
        .bind(slug)
        .bind(sem_ver)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// In-use signal-type paths for one ISN — baked into access-token
    /// claims at issuance.
    pub async fn in_use_signal_type_paths(&self, isn_id: Uuid) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT slug, sem_ver FROM signal_types WHERE isn_id = ? AND is_in_use = 1",
        )
        .bind(isn_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let slug: String = row.try_get("slug")?;
                let sem_ver: String = row.try_get("sem_ver")?;
                Ok(isx_domain::model::signal_type_path(&slug, &sem_ver))
            })
            .collect()
    }

    /// Everything the schema cache needs for a full reload.
    pub async fn all_schema_entries(&self) -> Result<Vec<SchemaEntry>> {
        let rows = sqlx::query(
            "SELECT i.slug AS isn_slug, st.slug AS signal_type_slug, st.sem_ver, \
                    st.schema_url, st.schema_content \
             FROM signal_types st JOIN isns i ON i.id = st.isn_id \
             WHERE st.is_in_use = 1",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SchemaEntry {
                    isn_slug: row.try_get("isn_slug")?,
                    signal_type_slug: row.try_get("signal_type_slug")?,
                    sem_ver: row.try_get("sem_ver")?,
                    schema_url: row.try_get("schema_url")?,
                    schema_content: row.try_get("schema_content")?,
                })
            })
            .collect()
    }
}
