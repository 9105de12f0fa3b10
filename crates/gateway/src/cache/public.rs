//! Snapshot of public, in-use ISNs and their in-use signal-type paths.
//!
//! Loaded once at startup and never refreshed: unauthenticated reads are
//! answered without touching the database, at the cost of a restart to
//! publish a new public signal type.

use std::collections::{HashMap, HashSet};

use isx_domain::model::signal_type_path;
use isx_store::{PublicSignalTypeRow, Store, StoreError};

pub struct PublicIsnCache {
    isns: HashSet<String>,
    types: HashMap<String, HashSet<String>>,
}

impl PublicIsnCache {
    pub async fn load(store: &Store) -> Result<Self, StoreError> {
        let rows = store.get_in_use_public_isn_signal_types().await?;
        let cache = Self::from_rows(rows);
        tracing::info!(
            public_isns = cache.isns.len(),
            "public-ISN cache loaded"
        );
        Ok(cache)
    }

    fn from_rows(rows: Vec<PublicSignalTypeRow>) -> Self {
        let mut isns = HashSet::new();
        let mut types: HashMap<String, HashSet<String>> = HashMap::new();
        for row in rows {
            isns.insert(row.isn_slug.clone());
            types
                .entry(row.isn_slug)
                .or_default()
                .insert(signal_type_path(&row.signal_type_slug, &row.sem_ver));
        }
        PublicIsnCache { isns, types }
    }

    pub fn contains(&self, isn_slug: &str) -> bool {
        self.isns.contains(isn_slug)
    }

    pub fn has_signal_type(&self, isn_slug: &str, path: &str) -> bool {
        self.types
            .get(isn_slug)
            .map(|set| set.contains(path))
            .unwrap_or(false)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(isn: &str, slug: &str, ver: &str) -> PublicSignalTypeRow {
        PublicSignalTypeRow {
            isn_slug: isn.to_string(),
            signal_type_slug: slug.to_string(),
            sem_ver: ver.to_string(),
        }
    }

    #[test]
    fn lookups_hit_only_cached_entries() {
        let cache = PublicIsnCache::from_rows(vec![
            row("isn-p", "alert", "1.0.0"),
            row("isn-p", "alert", "2.0.0"),
            row("isn-q", "notice", "0.1.0"),
        ]);

        assert!(cache.contains("isn-p"));
        assert!(cache.contains("isn-q"));
        assert!(!cache.contains("isn-a"));

        assert!(cache.has_signal_type("isn-p", "alert/v1.0.0"));
        assert!(cache.has_signal_type("isn-p", "alert/v2.0.0"));
        assert!(!cache.has_signal_type("isn-p", "notice/v0.1.0"));
        assert!(!cache.has_signal_type("isn-a", "alert/v1.0.0"));
    }
}
