//! Unchunked values: small lists and settings stored under one key.

use crate::error::{Result, StoreError};
use crate::storage::area::StorageArea;
use crate::storage::chunked::string_list;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Load/save a single value under one key, no partitioning, no migration.
#[derive(Clone)]
pub struct SimpleValueStore {
    area: Arc<dyn StorageArea>,
}

impl SimpleValueStore {
    pub fn new(area: Arc<dyn StorageArea>) -> Self {
        Self { area }
    }

    async fn raw(&self, key: &str) -> Result<Option<Value>> {
        let keys = BTreeSet::from([key.to_string()]);
        Ok(self
            .area
            .get_by_keys(&keys)
            .await?
            .remove(key)
            .filter(|v| !v.is_null()))
    }

    /// Typed value under `key`, `None` when absent.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.raw(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::corrupt(key, e.to_string())),
            None => Ok(None),
        }
    }

    /// String list under `key`; empty when absent.
    pub async fn load_list(&self, key: &str) -> Result<Vec<String>> {
        match self.raw(key).await? {
            Some(value) => string_list(key, &value),
            None => Ok(Vec::new()),
        }
    }

    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.area
            .set(BTreeMap::from([(key.to_string(), value)]))
            .await
    }
}

/// Boolean settings in the device-local area.
#[derive(Clone)]
pub struct LocalSettings {
    values: SimpleValueStore,
}

impl LocalSettings {
    pub fn new(area: Arc<dyn StorageArea>) -> Self {
        Self {
            values: SimpleValueStore::new(area),
        }
    }

    pub async fn load_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self.values.load::<bool>(key).await?.unwrap_or(default))
    }

    pub async fn save_bool(&self, key: &str, value: bool) -> Result<()> {
        self.values.save(key, &value).await
    }
}
