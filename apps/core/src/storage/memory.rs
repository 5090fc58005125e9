//! In-memory storage area with quota checks and call counters.

use crate::error::{Result, StoreError};
use crate::storage::area::{
    apply_remove, apply_set, item_size, Namespace, StorageArea, StorageChanges,
    CHANGE_FEED_CAPACITY,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::broadcast;

/// In-process storage area.
///
/// Used by tests and by embedders that bring their own persistence. Counts
/// `set`/`remove` calls and can be switched into a failing mode so callers
/// can observe how the storage layer reacts to an unavailable capability.
pub struct MemoryArea {
    namespace: Namespace,
    quota_per_item: Option<usize>,
    items: RwLock<BTreeMap<String, Value>>,
    tx: broadcast::Sender<StorageChanges>,
    set_calls: AtomicUsize,
    remove_calls: AtomicUsize,
    failing: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryArea {
    pub fn new(namespace: Namespace) -> Self {
        let (tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            namespace,
            quota_per_item: None,
            items: RwLock::new(BTreeMap::new()),
            tx,
            set_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            latency: None,
        }
    }

    /// Synchronized area enforcing a per-item byte ceiling.
    pub fn sync_with_quota(quota_per_item: usize) -> Self {
        Self {
            quota_per_item: Some(quota_per_item),
            ..Self::new(Namespace::Sync)
        }
    }

    /// Delay every operation, so each call is a real suspension point.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seed a value without counting a call or notifying.
    pub fn insert_raw(&self, key: impl Into<String>, value: Value) {
        if let Ok(mut items) = self.items.write() {
            items.insert(key.into(), value);
        }
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent operation fail with a storage error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Storage(format!(
                "{} area unavailable",
                self.namespace.as_str()
            )));
        }
        Ok(())
    }

    fn notify(&self, changes: crate::storage::area::ChangeSet) {
        if changes.is_empty() {
            return;
        }
        // No receivers is not an error
        let _ = self.tx.send(StorageChanges {
            namespace: self.namespace,
            changes,
        });
    }

    fn lock_poisoned() -> StoreError {
        StoreError::Storage("memory area lock poisoned".to_string())
    }
}

#[async_trait]
impl StorageArea for MemoryArea {
    fn namespace(&self) -> Namespace {
        self.namespace
    }

    async fn get_all(&self) -> Result<BTreeMap<String, Value>> {
        self.pause().await;
        self.check_available()?;
        let items = self.items.read().map_err(|_| Self::lock_poisoned())?;
        Ok(items.clone())
    }

    async fn get_by_keys(&self, keys: &BTreeSet<String>) -> Result<BTreeMap<String, Value>> {
        self.pause().await;
        self.check_available()?;
        let items = self.items.read().map_err(|_| Self::lock_poisoned())?;
        Ok(keys
            .iter()
            .filter_map(|k| items.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn set(&self, entries: BTreeMap<String, Value>) -> Result<()> {
        self.pause().await;
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        if let Some(limit) = self.quota_per_item {
            for (key, value) in &entries {
                let size = item_size(key, value)?;
                if size > limit {
                    return Err(StoreError::QuotaExceeded {
                        key: key.clone(),
                        size,
                        limit,
                    });
                }
            }
        }

        let changes = {
            let mut items = self.items.write().map_err(|_| Self::lock_poisoned())?;
            apply_set(&mut items, entries)
        };
        self.notify(changes);
        Ok(())
    }

    async fn remove(&self, keys: &BTreeSet<String>) -> Result<()> {
        self.pause().await;
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let changes = {
            let mut items = self.items.write().map_err(|_| Self::lock_poisoned())?;
            apply_remove(&mut items, keys)
        };
        self.notify(changes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges> {
        self.tx.subscribe()
    }
}
