//! Compiled-JSON-Schema registry keyed by
//! `"{isn_slug}/{signal_type_slug}/v{sem_ver}"`.
//!
//! Read-mostly: every signal submission validates under the read lock. A
//! miss (new signal type created since the last load) takes the write lock,
//! reloads the whole cache from the store, and retries exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use isx_domain::model::is_skip_validation_url;
use isx_store::{SchemaEntry, Store, StoreError};

/// `None` compiled schema means the skip-validation sentinel: any JSON
/// payload is accepted.
#[derive(Clone)]
struct CachedSchema {
    schema_url: String,
    compiled: Option<Arc<jsonschema::Validator>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error("unknown signal type")]
    UnknownSignalType,

    #[error("{0}")]
    SchemaValidationFailed(String),

    #[error("schema compilation failed: {0}")]
    Compile(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct SchemaCache {
    inner: RwLock<HashMap<String, CachedSchema>>,
    store: Store,
}

impl SchemaCache {
    /// Compile every in-use schema once at startup.
    pub async fn load(store: Store) -> Result<Self, ValidateError> {
        let entries = store.all_schema_entries().await?;
        let map = compile_all(entries)?;
        tracing::info!(schemas = map.len(), "schema cache loaded");
        Ok(SchemaCache {
            inner: RwLock::new(map),
            store,
        })
    }

    /// Cache key for a signal type. Paths are only unique within an ISN, so
    /// the ISN slug is part of the key.
    pub fn key(isn_slug: &str, signal_type_slug: &str, sem_ver: &str) -> String {
        format!("{isn_slug}/{signal_type_slug}/v{sem_ver}")
    }

    /// Validate a payload against the cached schema for `key`. On a miss the
    /// whole cache is rebuilt from the store and the lookup retried once.
    pub async fn validate(
        &self,
        key: &str,
        content: &serde_json::Value,
    ) -> Result<(), ValidateError> {
        {
            let cache = self.inner.read().await;
            if let Some(entry) = cache.get(key) {
                return validate_against(entry, content);
            }
        }

        // Miss: reload everything under the write lock, then retry. The
        // store round-trip deliberately happens under the lock so
        // concurrent misses trigger one reload, not many.
        let mut cache = self.inner.write().await;
        let entries = self.store.all_schema_entries().await?;
        *cache = compile_all(entries)?;
        tracing::debug!(schemas = cache.len(), key, "schema cache reloaded after miss");

        match cache.get(key) {
            Some(entry) => validate_against(entry, content),
            None => Err(ValidateError::UnknownSignalType),
        }
    }

    /// Register a newly created signal type so writers observe it without a
    /// full reload.
    pub async fn insert(
        &self,
        key: String,
        schema_url: &str,
        schema_content: &str,
    ) -> Result<(), ValidateError> {
        let entry = compile_entry(schema_url, schema_content)?;
        self.inner.write().await.insert(key, entry);
        Ok(())
    }
}

fn validate_against(entry: &CachedSchema, content: &serde_json::Value) -> Result<(), ValidateError> {
    if is_skip_validation_url(&entry.schema_url) {
        return Ok(());
    }
    match &entry.compiled {
        None => Ok(()),
        Some(validator) => validator
            .validate(content)
            .map_err(|e| ValidateError::SchemaValidationFailed(e.to_string())),
    }
}

fn compile_entry(schema_url: &str, schema_content: &str) -> Result<CachedSchema, ValidateError> {
    let compiled = if is_skip_validation_url(schema_url) {
        None
    } else {
        let schema: serde_json::Value = serde_json::from_str(schema_content)
            .map_err(|e| ValidateError::Compile(e.to_string()))?;
        let validator =
            jsonschema::validator_for(&schema).map_err(|e| ValidateError::Compile(e.to_string()))?;
        Some(Arc::new(validator))
    };
    Ok(CachedSchema {
        schema_url: schema_url.to_string(),
        compiled,
    })
}

fn compile_all(entries: Vec<SchemaEntry>) -> Result<HashMap<String, CachedSchema>, ValidateError> {
    let mut map = HashMap::with_capacity(entries.len());
    for entry in entries {
        let key = SchemaCache::key(&entry.isn_slug, &entry.signal_type_slug, &entry.sem_ver);
        match compile_entry(&entry.schema_url, &entry.schema_content) {
            Ok(cached) => {
                map.insert(key, cached);
            }
            // One bad stored schema must not take every signal type down.
            Err(e) => {
                tracing::error!(key, error = %e, "skipping uncompilable stored schema");
            }
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    async fn store_with_type(schema_url: &str, schema_content: &str) -> Store {
        let store = Store::connect("sqlite::memory:", 1, 1, Duration::from_secs(3600))
            .await
            .unwrap();
        let (account, _) = store.create_user("o@x.org", "h").await.unwrap();
        let isn = store
            .create_isn(
                "isn-a",
                "A",
                None,
                isx_domain::model::IsnVisibility::Private,
                account.id,
            )
            .await
            .unwrap();
        store
            .create_signal_type(isn.id, "t", "1.0.0", "T", schema_url, schema_content, None)
            .await
            .unwrap();
        store
    }

    const TEST_SCHEMA: &str = r#"{
        "type": "object",
        "properties": { "test": { "type": "string" } },
        "required": ["test"]
    }"#;

    #[tokio::test]
    async fn validates_against_compiled_schema() {
        let store = store_with_type("https://example.org/schema.json", TEST_SCHEMA).await;
        let cache = SchemaCache::load(store).await.unwrap();

        assert!(cache
            .validate("isn-a/t/v1.0.0", &json!({"test": "ok"}))
            .await
            .is_ok());
        let err = cache
            .validate("isn-a/t/v1.0.0", &json!({"wrong": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidateError::SchemaValidationFailed(_)));
    }

    #[tokio::test]
    async fn sentinel_url_skips_validation() {
        let store = store_with_type(
            "https://github.com/skip/validation/main/schema.json",
            "{}",
        )
        .await;
        let cache = SchemaCache::load(store).await.unwrap();
        assert!(cache
            .validate("isn-a/t/v1.0.0", &json!({"anything": ["goes", 1]}))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn miss_reloads_from_store() {
        let store = store_with_type("https://example.org/schema.json", TEST_SCHEMA).await;
        let cache = SchemaCache::load(store.clone()).await.unwrap();

        // Created after the initial load — first lookup misses, reload
        // finds it.
        let isn = store.get_isn_by_slug("isn-a").await.unwrap().unwrap();
        store
            .create_signal_type(
                isn.id,
                "late",
                "1.0.0",
                "Late",
                "https://example.org/late.json",
                TEST_SCHEMA,
                None,
            )
            .await
            .unwrap();

        assert!(cache
            .validate("isn-a/late/v1.0.0", &json!({"test": "ok"}))
            .await
            .is_ok());
        let err = cache
            .validate("isn-a/nope/v1.0.0", &json!({"test": "ok"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidateError::UnknownSignalType));
    }

    #[tokio::test]
    async fn insert_makes_type_visible_without_reload() {
        let store = store_with_type("https://example.org/schema.json", TEST_SCHEMA).await;
        let cache = SchemaCache::load(store).await.unwrap();

        cache
            .insert(
                "isn-a/fresh/v1.0.0".to_string(),
                "https://example.org/fresh.json",
                TEST_SCHEMA,
            )
            .await
            .unwrap();
        assert!(cache
            .validate("isn-a/fresh/v1.0.0", &json!({"test": "ok"}))
            .await
            .is_ok());
    }
}
