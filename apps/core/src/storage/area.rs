//! StorageArea trait - Abstraction over the raw key/value storage capability.
//!
//! An area is one namespace of a browser-style storage engine: enumerate,
//! read by keys, write, remove, and a change feed that reports which keys
//! changed after every successful write (own writes included).

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::broadcast;

/// Capacity of each area's change feed before slow receivers start lagging.
pub const CHANGE_FEED_CAPACITY: usize = 64;

/// Which storage namespace an area represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Synchronized across devices, subject to a per-item byte ceiling
    Sync,
    /// Device-local, no ceiling
    Local,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Local => "local",
        }
    }
}

/// Old and new value of one key. `None` means absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Changed keys reported by one `set` or `remove`.
pub type ChangeSet = BTreeMap<String, StorageChange>;

/// One notification from an area's change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChanges {
    pub namespace: Namespace,
    pub changes: ChangeSet,
}

/// Raw storage capability.
///
/// Implementations must surface failures as errors rather than hanging, and
/// must only notify after the write is visible to later reads.
#[async_trait]
pub trait StorageArea: Send + Sync {
    fn namespace(&self) -> Namespace;

    /// Every key/value pair currently stored.
    async fn get_all(&self) -> Result<BTreeMap<String, Value>>;

    /// Values for the requested keys; absent keys are omitted.
    async fn get_by_keys(&self, keys: &BTreeSet<String>) -> Result<BTreeMap<String, Value>>;

    async fn set(&self, entries: BTreeMap<String, Value>) -> Result<()>;

    /// Remove keys. Absent keys are ignored.
    async fn remove(&self, keys: &BTreeSet<String>) -> Result<()>;

    /// Subscribe to changes committed after this call.
    fn subscribe(&self) -> broadcast::Receiver<StorageChanges>;
}

/// Byte size a synchronized area charges for one item: key plus JSON value.
pub fn item_size(key: &str, value: &Value) -> Result<usize> {
    Ok(key.len() + serde_json::to_vec(value)?.len())
}

/// Diff `entries` against `current`, apply them, and report what changed.
///
/// Shared by the in-memory and file-backed areas so both notify identically.
pub(crate) fn apply_set(
    current: &mut BTreeMap<String, Value>,
    entries: BTreeMap<String, Value>,
) -> ChangeSet {
    let mut changes = ChangeSet::new();
    for (key, value) in entries {
        let old_value = current.insert(key.clone(), value.clone());
        if old_value.as_ref() != Some(&value) {
            changes.insert(
                key,
                StorageChange {
                    old_value,
                    new_value: Some(value),
                },
            );
        }
    }
    changes
}

/// Remove `keys` from `current` and report the keys that existed.
pub(crate) fn apply_remove(
    current: &mut BTreeMap<String, Value>,
    keys: &BTreeSet<String>,
) -> ChangeSet {
    let mut changes = ChangeSet::new();
    for key in keys {
        if let Some(old_value) = current.remove(key) {
            changes.insert(
                key.clone(),
                StorageChange {
                    old_value: Some(old_value),
                    new_value: None,
                },
            );
        }
    }
    changes
}
