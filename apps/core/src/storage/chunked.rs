//! Chunked collection storage for the synchronized area.
//!
//! A logical collection (an ordered list of short strings) is stored under
//! `<prefix>_chunk_0`, `<prefix>_chunk_1`, ... with every chunk's JSON encoding
//! kept within the chunk budget. Collections written before chunking live
//! under the bare `<prefix>` key and are migrated on first load.
//!
//! Layout:
//! ```text
//! tbc_hidden_offers            legacy, JSON array (removed by migration)
//! tbc_hidden_offers_chunk_0    JSON array, <= budget bytes
//! tbc_hidden_offers_chunk_1    ...
//! ```

use crate::error::{Result, StoreError};
use crate::storage::area::StorageArea;
use crate::storage::migration::{MigrationCoordinator, RetryPolicy};
use crate::storage::partition::{partition, MAX_CHUNK_BYTES};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CHUNK_INFIX: &str = "_chunk_";

/// Key of chunk `index` for `prefix`.
pub fn chunk_key(prefix: &str, index: usize) -> String {
    format!("{}{}{}", prefix, CHUNK_INFIX, index)
}

/// Whether `key` lies in the chunk key space of `prefix`.
pub fn is_chunk_key(prefix: &str, key: &str) -> bool {
    key.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with(CHUNK_INFIX))
}

/// Index of a well-formed chunk key (`<prefix>_chunk_<decimal>`).
pub fn chunk_index(prefix: &str, key: &str) -> Option<usize> {
    let digits = key.strip_prefix(prefix)?.strip_prefix(CHUNK_INFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Decode a stored JSON array of strings.
pub(crate) fn string_list(key: &str, value: &Value) -> Result<Vec<String>> {
    let array = value
        .as_array()
        .ok_or_else(|| StoreError::corrupt(key, "expected a JSON array"))?;
    array
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| StoreError::corrupt(key, format!("non-string item {}", item)))
        })
        .collect()
}

/// Items of a legacy record, or `None` when the bare key holds no array.
///
/// Non-string entries are dropped so a damaged record still migrates.
fn legacy_items(prefix: &str, value: &Value) -> Option<Vec<String>> {
    let array = value.as_array()?;
    let items: Vec<String> = array
        .iter()
        .filter_map(|item| item.as_str().map(str::to_string))
        .collect();
    if items.len() < array.len() {
        warn!(
            "[Storage] Dropping {} non-string items from legacy {}",
            array.len() - items.len(),
            prefix
        );
    }
    Some(items)
}

/// Load/save/clear for chunked logical collections in one storage area.
#[derive(Clone)]
pub struct ChunkedCollectionStore {
    area: Arc<dyn StorageArea>,
    coordinator: Arc<MigrationCoordinator>,
    budget: usize,
    retry: RetryPolicy,
}

impl ChunkedCollectionStore {
    pub fn new(area: Arc<dyn StorageArea>, coordinator: Arc<MigrationCoordinator>) -> Self {
        Self {
            area,
            coordinator,
            budget: MAX_CHUNK_BYTES,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load the collection stored under `prefix`.
    ///
    /// A legacy record is migrated to chunks before returning; the items
    /// returned are the legacy items as read. While another caller migrates
    /// the same prefix this waits with bounded backoff and fails with
    /// `StoreError::Timeout` once the retry budget is spent.
    pub async fn load(&self, prefix: &str) -> Result<Vec<String>> {
        let mut waits = 0u32;

        loop {
            if self.coordinator.is_active(prefix) {
                if waits >= self.retry.max_attempts {
                    return Err(StoreError::Timeout {
                        prefix: prefix.to_string(),
                        attempts: waits,
                    });
                }
                let delay = self.retry.delay_for(waits);
                warn!(
                    "[Storage] Migration in progress for {}, retrying in {:?}",
                    prefix, delay
                );
                tokio::time::sleep(delay).await;
                waits += 1;
                continue;
            }

            let all = self.area.get_all().await?;

            // Only an array under the bare key is a legacy record
            if all.get(prefix).is_some_and(Value::is_array) {
                if let Some(items) = self.migrate_legacy(prefix).await? {
                    return Ok(items);
                }
                // Someone else migrated or is migrating; read again
                continue;
            }

            return assemble_chunks(prefix, &all);
        }
    }

    /// Take the migration lock and move the legacy record into chunks.
    ///
    /// Returns `None` when the lock is held elsewhere or the legacy record
    /// disappeared before the lock was taken.
    async fn migrate_legacy(&self, prefix: &str) -> Result<Option<Vec<String>>> {
        let Some(_guard) = self.coordinator.enter(prefix) else {
            return Ok(None);
        };

        // The snapshot that showed the legacy key may predate a finished migration
        let keys = BTreeSet::from([prefix.to_string()]);
        let Some(items) = self
            .area
            .get_by_keys(&keys)
            .await?
            .get(prefix)
            .and_then(|legacy| legacy_items(prefix, legacy))
        else {
            return Ok(None);
        };

        info!(
            "[Storage] Found legacy format for {}, migrating {} items",
            prefix,
            items.len()
        );

        // Chunks first: if removal fails the legacy key is still authoritative
        self.save(prefix, &items).await?;
        self.area.remove(&keys).await?;

        info!("[Storage] Migration complete, legacy key {} removed", prefix);
        Ok(Some(items))
    }

    /// Replace the collection under `prefix` with `items`.
    ///
    /// Re-partitions from scratch, removes chunk keys the new layout no
    /// longer uses, then writes the new chunks.
    pub async fn save<S: AsRef<str>>(&self, prefix: &str, items: &[S]) -> Result<()> {
        let chunks: BTreeMap<String, Value> = partition(items, self.budget)
            .into_iter()
            .enumerate()
            .map(|(index, group)| (chunk_key(prefix, index), Value::from(group)))
            .collect();

        let existing = self.area.get_all().await?;
        let stale: BTreeSet<String> = existing
            .into_keys()
            .filter(|key| is_chunk_key(prefix, key) && !chunks.contains_key(key))
            .collect();

        if !stale.is_empty() {
            debug!("[Storage] Removing {} stale chunks of {}", stale.len(), prefix);
            self.area.remove(&stale).await?;
        }

        if !chunks.is_empty() {
            debug!(
                "[Storage] Writing {} items to {} chunks of {}",
                items.len(),
                chunks.len(),
                prefix
            );
            self.area.set(chunks).await?;
        }

        Ok(())
    }

    /// Remove every chunk of `prefix`. The legacy key is left alone.
    pub async fn clear(&self, prefix: &str) -> Result<()> {
        let keys: BTreeSet<String> = self
            .area
            .get_all()
            .await?
            .into_keys()
            .filter(|key| is_chunk_key(prefix, key))
            .collect();

        if !keys.is_empty() {
            debug!("[Storage] Clearing {} chunks of {}", keys.len(), prefix);
            self.area.remove(&keys).await?;
        }
        Ok(())
    }
}

/// Concatenate the chunks of `prefix` in ascending index order.
///
/// Gaps are tolerated: a save interrupted between removing stale chunks and
/// writing new ones leaves a partial, still ordered, set.
fn assemble_chunks(prefix: &str, all: &BTreeMap<String, Value>) -> Result<Vec<String>> {
    let mut indexed: Vec<(usize, &String, &Value)> = Vec::new();
    for (key, value) in all {
        if !is_chunk_key(prefix, key) {
            continue;
        }
        match chunk_index(prefix, key) {
            Some(index) => indexed.push((index, key, value)),
            None => warn!("[Storage] Ignoring malformed chunk key {}", key),
        }
    }
    indexed.sort_by_key(|(index, _, _)| *index);

    let mut items = Vec::new();
    for (_, key, value) in indexed {
        items.extend(string_list(key, value)?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::area::Namespace;
    use crate::storage::memory::MemoryArea;
    use serde_json::json;

    const PREFIX: &str = "tbc_hidden_offers";

    fn store_with(area: &Arc<MemoryArea>) -> ChunkedCollectionStore {
        ChunkedCollectionStore::new(area.clone(), Arc::new(MigrationCoordinator::new()))
    }

    #[test]
    fn test_chunk_key_layout() {
        assert_eq!(chunk_key(PREFIX, 0), "tbc_hidden_offers_chunk_0");
        assert_eq!(chunk_index(PREFIX, "tbc_hidden_offers_chunk_12"), Some(12));
        assert_eq!(chunk_index(PREFIX, "tbc_hidden_offers_chunk_"), None);
        assert_eq!(chunk_index(PREFIX, "tbc_hidden_offers_chunk_1a"), None);
        assert_eq!(chunk_index(PREFIX, "tbc_hidden_offers"), None);
        assert!(is_chunk_key(PREFIX, "tbc_hidden_offers_chunk_x"));
        assert!(!is_chunk_key(PREFIX, "tbc_hidden_categories"));
    }

    #[tokio::test]
    async fn test_chunks_concatenate_by_numeric_index() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        // BTreeMap orders "_chunk_10" before "_chunk_2"
        for i in 0..12 {
            area.insert_raw(chunk_key(PREFIX, i), json!([format!("item-{}", i)]));
        }

        let items = store_with(&area).load(PREFIX).await.unwrap();
        let expected: Vec<String> = (0..12).map(|i| format!("item-{}", i)).collect();
        assert_eq!(items, expected);
    }

    #[tokio::test]
    async fn test_load_tolerates_missing_chunk() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        area.insert_raw(chunk_key(PREFIX, 0), json!(["a"]));
        area.insert_raw(chunk_key(PREFIX, 2), json!(["c"]));

        let items = store_with(&area).load(PREFIX).await.unwrap();
        assert_eq!(items, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_corrupt_chunk_is_an_error() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        area.insert_raw(chunk_key(PREFIX, 0), json!({"not": "a list"}));

        let result = store_with(&area).load(PREFIX).await;
        assert!(matches!(result, Err(StoreError::CorruptValue { .. })));
    }

    #[tokio::test]
    async fn test_null_legacy_key_falls_through_to_chunks() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        area.insert_raw(chunk_key(PREFIX, 0), json!(["/a", "/b"]));
        area.insert_raw(PREFIX, json!(null));
        let store = store_with(&area);

        assert_eq!(store.load(PREFIX).await.unwrap(), vec!["/a", "/b"]);
        assert_eq!(area.set_calls(), 0);

        store.save(PREFIX, &["/a", "/b", "/c"]).await.unwrap();
        assert_eq!(store.load(PREFIX).await.unwrap(), vec!["/a", "/b", "/c"]);
    }

    #[tokio::test]
    async fn test_non_array_legacy_value_is_ignored() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        area.insert_raw(chunk_key(PREFIX, 0), json!(["/a"]));
        area.insert_raw(PREFIX, json!({"not": "a list"}));

        let items = store_with(&area).load(PREFIX).await.unwrap();
        assert_eq!(items, vec!["/a"]);
        assert!(area.get_all().await.unwrap().contains_key(PREFIX));
    }

    #[tokio::test]
    async fn test_legacy_array_with_non_strings_still_migrates() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        area.insert_raw(PREFIX, json!(["/a", 3, null, "/b"]));
        let store = store_with(&area);

        assert_eq!(store.load(PREFIX).await.unwrap(), vec!["/a", "/b"]);

        let all = area.get_all().await.unwrap();
        assert!(!all.contains_key(PREFIX));
        assert_eq!(all[&chunk_key(PREFIX, 0)], json!(["/a", "/b"]));
    }

    #[tokio::test]
    async fn test_save_empty_writes_nothing() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        let store = store_with(&area);
        let empty: Vec<String> = Vec::new();

        store.save(PREFIX, &empty).await.unwrap();

        assert_eq!(area.set_calls(), 0);
        assert!(store.load(PREFIX).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_keeps_legacy_and_other_keys() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        area.insert_raw(PREFIX, json!(["legacy"]));
        area.insert_raw(chunk_key(PREFIX, 0), json!(["a"]));
        area.insert_raw(chunk_key(PREFIX, 1), json!(["b"]));
        area.insert_raw("tbc_hidden_categories", json!(["Food"]));

        store_with(&area).clear(PREFIX).await.unwrap();

        let keys: Vec<String> = area.get_all().await.unwrap().into_keys().collect();
        assert_eq!(keys, vec!["tbc_hidden_categories", "tbc_hidden_offers"]);
    }

    #[tokio::test]
    async fn test_wait_times_out_when_migration_never_finishes() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        let coordinator = Arc::new(MigrationCoordinator::new());
        coordinator.try_enter(PREFIX);

        let store = ChunkedCollectionStore::new(area, coordinator).with_retry_policy(RetryPolicy {
            max_attempts: 3,
            initial_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(2),
        });

        match store.load(PREFIX).await {
            Err(StoreError::Timeout { prefix, attempts }) => {
                assert_eq!(prefix, PREFIX);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_migration_keeps_legacy_and_releases_lock() {
        let area = Arc::new(MemoryArea::sync_with_quota(30));
        let coordinator = Arc::new(MigrationCoordinator::new());
        // One item too large for the area's per-item ceiling
        area.insert_raw(PREFIX, json!(["x".repeat(64)]));

        let store = ChunkedCollectionStore::new(area.clone(), coordinator.clone());
        let result = store.load(PREFIX).await;

        assert!(matches!(result, Err(StoreError::QuotaExceeded { .. })));
        assert!(!coordinator.is_active(PREFIX));
        assert!(area.get_all().await.unwrap().contains_key(PREFIX));
    }
}
