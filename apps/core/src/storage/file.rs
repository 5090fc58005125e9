//! File-backed storage area: one JSON object file per namespace.

use crate::error::{Result, StoreError};
use crate::storage::area::{
    apply_remove, apply_set, item_size, ChangeSet, Namespace, StorageArea, StorageChanges,
    CHANGE_FEED_CAPACITY,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

/// File-backed storage area for the CLI.
///
/// The whole area is one JSON object. Every read goes to disk so writes by
/// other processes are picked up; every write rewrites the file through a
/// temp file and a rename.
pub struct FileArea {
    namespace: Namespace,
    path: PathBuf,
    quota_per_item: Option<usize>,
    write_lock: Mutex<()>,
    tx: broadcast::Sender<StorageChanges>,
}

impl FileArea {
    pub fn new(namespace: Namespace, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let (tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self {
            namespace,
            path,
            quota_per_item: None,
            write_lock: Mutex::new(()),
            tx,
        })
    }

    pub fn with_quota(mut self, quota_per_item: usize) -> Self {
        self.quota_per_item = Some(quota_per_item);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_items(&self) -> Result<BTreeMap<String, Value>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| StoreError::Storage(format!("{}: {}", self.path.display(), e)))?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents)
            .map_err(|e| StoreError::corrupt(&self.path.display().to_string(), e.to_string()))
    }

    fn write_items(&self, items: &BTreeMap<String, Value>) -> Result<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(items)?;
        let storage_err = |e: std::io::Error| StoreError::Storage(e.to_string());

        let mut file = std::fs::File::create(&tmp_path).map_err(storage_err)?;
        file.write_all(contents.as_bytes()).map_err(storage_err)?;
        file.sync_all().map_err(storage_err)?;
        std::fs::rename(&tmp_path, &self.path).map_err(storage_err)?;

        debug!(
            "[{}] Wrote {} keys to {}",
            self.namespace.as_str(),
            items.len(),
            self.path.display()
        );
        Ok(())
    }

    fn notify(&self, changes: ChangeSet) {
        if changes.is_empty() {
            return;
        }
        let _ = self.tx.send(StorageChanges {
            namespace: self.namespace,
            changes,
        });
    }
}

#[async_trait]
impl StorageArea for FileArea {
    fn namespace(&self) -> Namespace {
        self.namespace
    }

    async fn get_all(&self) -> Result<BTreeMap<String, Value>> {
        self.read_items()
    }

    async fn get_by_keys(&self, keys: &BTreeSet<String>) -> Result<BTreeMap<String, Value>> {
        let mut items = self.read_items()?;
        items.retain(|k, _| keys.contains(k));
        Ok(items)
    }

    async fn set(&self, entries: BTreeMap<String, Value>) -> Result<()> {
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
            let _guard = self.write_lock.lock().await;
            let mut items = self.read_items()?;
            let changes = apply_set(&mut items, entries);
            if !changes.is_empty() {
                self.write_items(&items)?;
            }
            changes
        };
        self.notify(changes);
        Ok(())
    }

    async fn remove(&self, keys: &BTreeSet<String>) -> Result<()> {
        let changes = {
            let _guard = self.write_lock.lock().await;
            let mut items = self.read_items()?;
            let changes = apply_remove(&mut items, keys);
            if !changes.is_empty() {
                self.write_items(&items)?;
            }
            changes
        };
        self.notify(changes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges> {
        self.tx.subscribe()
    }
}
