// 🧹 Data-Wipe Executor - full local reset for "Start Fresh"
//
// Deletes every row of every entity type, join rows first, then leaves, then
// households. No household filter. Derived caches are cleared afterwards,
// outside the transaction, on a best-effort basis.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::MergeConfig;
use crate::db::Store;
use crate::error::WipeError;

// ============================================================================
// DERIVED CACHE
// ============================================================================

/// Locally derived data that can always be rebuilt (rendered photos, thumbnails)
pub trait DerivedCache: Send + Sync {
    /// Fire-and-forget; failures are logged, never surfaced
    fn clear_derived_cache(&self);
}

/// No derived cache on this device
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl DerivedCache for NoopCache {
    fn clear_derived_cache(&self) {}
}

/// Cache of rendered photos kept as files in one directory
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileCache { dir: dir.into() }
    }
}

/// The configured photo cache, or none when `photo_cache_dir` is unset
pub fn derived_cache(config: &MergeConfig) -> Arc<dyn DerivedCache> {
    match &config.photo_cache_dir {
        Some(dir) => Arc::new(FileCache::new(dir)),
        None => Arc::new(NoopCache),
    }
}

impl DerivedCache for FileCache {
    fn clear_derived_cache(&self) {
        if !self.dir.exists() {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => tracing::info!(dir = %self.dir.display(), "cleared derived photo cache"),
            Err(e) => tracing::warn!(dir = %self.dir.display(), error = %e, "failed to clear photo cache"),
        }
    }
}

// ============================================================================
// WIPE
// ============================================================================

/// Rows deleted per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WipeSummary {
    pub item_labels: usize,
    pub household_policies: usize,
    pub items: usize,
    pub labels: usize,
    pub policies: usize,
    pub locations: usize,
    pub households: usize,
}

impl WipeSummary {
    pub fn total(&self) -> usize {
        self.item_labels
            + self.household_policies
            + self.items
            + self.labels
            + self.policies
            + self.locations
            + self.households
    }
}

/// Delete all local entities in dependency order, then clear the cache
pub fn wipe_all_local_data(store: &Store, cache: &dyn DerivedCache) -> Result<WipeSummary, WipeError> {
    let summary = store.write(|tx| {
        Ok::<_, WipeError>(WipeSummary {
            item_labels: tx.execute("DELETE FROM item_labels", [])?,
            household_policies: tx.execute("DELETE FROM household_policies", [])?,
            items: tx.execute("DELETE FROM items", [])?,
            labels: tx.execute("DELETE FROM labels", [])?,
            policies: tx.execute("DELETE FROM insurance_policies", [])?,
            locations: tx.execute("DELETE FROM locations", [])?,
            households: tx.execute("DELETE FROM households", [])?,
        })
    })?;

    tracing::info!(deleted = summary.total(), "wiped all local data");

    cache.clear_derived_cache();
    Ok(summary)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        attach_label, attach_policy, count_rows, insert_household, insert_item, insert_label,
        insert_location, insert_policy, EntityTable, Household, InsurancePolicy, Item, Label,
        Location,
    };
    use crate::error::StoreError;

    fn seed(store: &Store) {
        store
            .write(|tx| {
                for name in ["Home", "Cabin"] {
                    let home = Household::new(name);
                    insert_household(tx, &home)?;
                    let room = Location::new("Living Room", &home.id);
                    insert_location(tx, &room)?;
                    let item = Item::new("Sofa", &home.id, Some(&room.id));
                    insert_item(tx, &item)?;
                    let label = Label::new("Furniture");
                    insert_label(tx, &label)?;
                    attach_label(tx, &item.id, &label.id)?;
                    let policy = InsurancePolicy::new("Acme");
                    insert_policy(tx, &policy)?;
                    attach_policy(tx, &home.id, &policy.id)?;
                }
                Ok::<_, StoreError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_wipe_empties_every_table() {
        let store = Store::open_in_memory().unwrap();
        seed(&store);

        let summary = wipe_all_local_data(&store, &NoopCache).unwrap();

        assert_eq!(summary.households, 2);
        assert_eq!(summary.item_labels, 2);
        assert_eq!(summary.total(), 14);
        for table in EntityTable::ALL {
            assert_eq!(store.read(|conn| count_rows(conn, table)).unwrap(), 0, "{:?}", table);
        }
    }

    #[test]
    fn test_wipe_twice_is_harmless() {
        let store = Store::open_in_memory().unwrap();
        seed(&store);

        wipe_all_local_data(&store, &NoopCache).unwrap();
        let second = wipe_all_local_data(&store, &NoopCache).unwrap();

        assert_eq!(second.total(), 0);
    }

    #[test]
    fn test_wipe_clears_photo_cache_dir() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("rendered");
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::write(cache_dir.join("sofa.jpg"), b"jpeg").unwrap();

        wipe_all_local_data(&store, &FileCache::new(&cache_dir)).unwrap();

        assert!(!cache_dir.exists());
    }

    #[test]
    fn test_configured_cache_dir_is_cleared() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("photos");
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::write(cache_dir.join("kettle.jpg"), b"jpeg").unwrap();

        let config = MergeConfig {
            photo_cache_dir: Some(cache_dir.clone()),
            ..MergeConfig::default()
        };
        let cache = derived_cache(&config);
        wipe_all_local_data(&store, cache.as_ref()).unwrap();

        assert!(!cache_dir.exists());

        // No directory configured: nothing to clear, wipe still succeeds
        let cache = derived_cache(&MergeConfig::default());
        assert!(wipe_all_local_data(&store, cache.as_ref()).is_ok());
    }

    #[test]
    fn test_failed_wipe_deletes_nothing() {
        let store = Store::open_in_memory().unwrap();
        seed(&store);
        store
            .read(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER inject BEFORE DELETE ON households
                     BEGIN SELECT RAISE(ABORT, 'injected'); END;",
                )
                .map_err(StoreError::from)
            })
            .unwrap();

        assert!(wipe_all_local_data(&store, &NoopCache).is_err());
        assert_eq!(store.read(|conn| count_rows(conn, EntityTable::Items)).unwrap(), 2);
    }
}
