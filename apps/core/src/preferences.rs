//! Preferences - The hidden offers, hidden categories and UI settings of one
//! browser profile, as seen by every consumer (content page, options, popup).
//!
//! Consumers go through this facade instead of raw storage; it owns the key
//! names, the migration coordinator and the choice of chunked vs simple layout.

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::offers::VisibilityRules;
use crate::storage::changes::{is_relevant, touches_key};
use crate::storage::{
    ChunkedCollectionStore, FileArea, LocalSettings, MigrationCoordinator, Namespace,
    RetryPolicy, SimpleValueStore, StorageArea, StorageChanges,
};
use crate::transfer::{merge_unique, parse_import, ExportDocument, ImportSummary};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

/// Chunked list of hidden offer identifiers (sync area).
pub const HIDDEN_OFFERS_KEY: &str = "tbc_hidden_offers";
/// Simple list of hidden category names (sync area).
pub const HIDDEN_CATEGORIES_KEY: &str = "tbc_hidden_categories";
/// Boolean, local area.
pub const SHOW_AUTOLOAD_BUTTON_KEY: &str = "tbc_show_autoload_button";

pub struct Preferences {
    sync: Arc<dyn StorageArea>,
    local: Arc<dyn StorageArea>,
    offers: ChunkedCollectionStore,
    categories: SimpleValueStore,
    settings: LocalSettings,
}

impl Preferences {
    pub fn new(sync: Arc<dyn StorageArea>, local: Arc<dyn StorageArea>) -> Self {
        let coordinator = Arc::new(MigrationCoordinator::new());
        Self {
            offers: ChunkedCollectionStore::new(sync.clone(), coordinator),
            categories: SimpleValueStore::new(sync.clone()),
            settings: LocalSettings::new(local.clone()),
            sync,
            local,
        }
    }

    /// File-backed preferences in `config.data_dir`.
    pub fn from_config(config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        let sync = FileArea::new(Namespace::Sync, config.sync_area_path())?
            .with_quota(config.storage.sync_quota_bytes_per_item);
        let local = FileArea::new(Namespace::Local, config.local_area_path())?;

        Ok(Self::new(Arc::new(sync), Arc::new(local))
            .with_chunk_budget(config.storage.max_chunk_bytes)
            .with_retry_policy(config.migration.retry_policy()))
    }

    pub fn with_chunk_budget(mut self, budget: usize) -> Self {
        self.offers = self.offers.with_budget(budget);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.offers = self.offers.with_retry_policy(retry);
        self
    }

    // ============ HIDDEN OFFERS ============

    pub async fn hidden_offers(&self) -> Result<Vec<String>> {
        self.offers.load(HIDDEN_OFFERS_KEY).await
    }

    pub async fn hidden_offer_count(&self) -> Result<usize> {
        Ok(self.hidden_offers().await?.len())
    }

    /// Flip the hidden state of `id`; returns the new state.
    pub async fn toggle_offer(&self, id: &str) -> Result<bool> {
        let mut offers = self.hidden_offers().await?;
        let hidden = if let Some(pos) = offers.iter().position(|o| o == id) {
            offers.remove(pos);
            false
        } else {
            offers.push(id.to_string());
            true
        };
        self.offers.save(HIDDEN_OFFERS_KEY, &offers).await?;
        Ok(hidden)
    }

    /// Hide `id`; returns false if it already was hidden.
    pub async fn hide_offer(&self, id: &str) -> Result<bool> {
        let mut offers = self.hidden_offers().await?;
        if offers.iter().any(|o| o == id) {
            return Ok(false);
        }
        offers.push(id.to_string());
        self.offers.save(HIDDEN_OFFERS_KEY, &offers).await?;
        Ok(true)
    }

    /// Unhide `id`; returns false if it was not hidden.
    pub async fn remove_offer(&self, id: &str) -> Result<bool> {
        let offers = self.hidden_offers().await?;
        let before = offers.len();
        let filtered: Vec<String> = offers.into_iter().filter(|o| o != id).collect();
        if filtered.len() == before {
            return Ok(false);
        }
        self.offers.save(HIDDEN_OFFERS_KEY, &filtered).await?;
        Ok(true)
    }

    pub async fn clear_offers(&self) -> Result<()> {
        // Load first so a legacy record is migrated rather than left behind
        self.hidden_offers().await?;
        self.offers.clear(HIDDEN_OFFERS_KEY).await?;
        info!("Cleared all hidden offers");
        Ok(())
    }

    // ============ HIDDEN CATEGORIES ============

    pub async fn hidden_categories(&self) -> Result<Vec<String>> {
        self.categories.load_list(HIDDEN_CATEGORIES_KEY).await
    }

    /// Hide a category; returns false if it already was hidden.
    pub async fn hide_category(&self, name: &str) -> Result<bool> {
        let mut categories = self.hidden_categories().await?;
        if categories.iter().any(|c| c == name) {
            return Ok(false);
        }
        categories.push(name.to_string());
        self.categories
            .save(HIDDEN_CATEGORIES_KEY, &categories)
            .await?;
        Ok(true)
    }

    /// Unhide a category; returns false if it was not hidden.
    pub async fn remove_category(&self, name: &str) -> Result<bool> {
        let categories = self.hidden_categories().await?;
        let before = categories.len();
        let filtered: Vec<String> = categories.into_iter().filter(|c| c != name).collect();
        if filtered.len() == before {
            return Ok(false);
        }
        self.categories.save(HIDDEN_CATEGORIES_KEY, &filtered).await?;
        Ok(true)
    }

    pub async fn clear_categories(&self) -> Result<()> {
        let empty: Vec<String> = Vec::new();
        self.categories.save(HIDDEN_CATEGORIES_KEY, &empty).await?;
        info!("Cleared all hidden categories");
        Ok(())
    }

    // ============ SETTINGS ============

    /// Whether the auto-load button is shown; defaults to true.
    pub async fn show_autoload_button(&self) -> Result<bool> {
        self.settings
            .load_bool(SHOW_AUTOLOAD_BUTTON_KEY, true)
            .await
    }

    pub async fn set_show_autoload_button(&self, show: bool) -> Result<()> {
        self.settings
            .save_bool(SHOW_AUTOLOAD_BUTTON_KEY, show)
            .await
    }

    // ============ VISIBILITY / TRANSFER ============

    /// Current hidden offers and categories for evaluating cards.
    pub async fn visibility_rules(&self) -> Result<VisibilityRules> {
        let offers = self.hidden_offers().await?;
        let categories = self.hidden_categories().await?;
        Ok(VisibilityRules::new(offers, categories))
    }

    pub async fn export(&self, now: DateTime<Utc>) -> Result<ExportDocument> {
        let offers = self.hidden_offers().await?;
        let categories = self.hidden_categories().await?;
        Ok(ExportDocument::new(offers, categories, now))
    }

    /// Merge an export file into the stored collections.
    ///
    /// The file is fully validated before anything is written. Offers and
    /// categories are then written separately: if the category write fails,
    /// the merged offers stay saved and the error is returned.
    pub async fn import_json(&self, text: &str) -> Result<ImportSummary> {
        let payload = parse_import(text)?;

        let existing = self.hidden_offers().await?;
        let (merged, offers_added) = merge_unique(existing, &payload.hidden_offers);
        self.offers.save(HIDDEN_OFFERS_KEY, &merged).await?;

        let mut categories_added = 0;
        if let Some(incoming) = &payload.hidden_categories {
            let existing = self.hidden_categories().await?;
            let (merged, added) = merge_unique(existing, incoming);
            self.categories.save(HIDDEN_CATEGORIES_KEY, &merged).await?;
            categories_added = added;
        }

        let summary = ImportSummary {
            offers_in_file: payload.hidden_offers.len(),
            categories_in_file: payload.hidden_categories.as_ref().map(Vec::len),
            offers_added,
            categories_added,
        };
        info!(
            "Imported {} offers ({} new), {} new categories",
            summary.offers_in_file, offers_added, categories_added
        );
        Ok(summary)
    }

    /// Watch both areas for changes to these preferences.
    pub fn watch(&self) -> PreferenceWatcher {
        PreferenceWatcher {
            sync: Some(self.sync.subscribe()),
            local: Some(self.local.subscribe()),
        }
    }
}

/// Which preferences a storage notification touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreferenceChanges {
    pub hidden_offers: bool,
    pub hidden_categories: bool,
    pub show_autoload_button: bool,
}

impl PreferenceChanges {
    pub fn classify(event: &StorageChanges) -> Self {
        match event.namespace {
            Namespace::Sync => Self {
                hidden_offers: is_relevant(&event.changes, HIDDEN_OFFERS_KEY),
                hidden_categories: touches_key(&event.changes, HIDDEN_CATEGORIES_KEY),
                show_autoload_button: false,
            },
            Namespace::Local => Self {
                show_autoload_button: touches_key(&event.changes, SHOW_AUTOLOAD_BUTTON_KEY),
                ..Self::default()
            },
        }
    }

    /// Everything may have changed (missed notifications).
    pub fn all() -> Self {
        Self {
            hidden_offers: true,
            hidden_categories: true,
            show_autoload_button: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.hidden_offers || self.hidden_categories || self.show_autoload_button)
    }
}

/// Stream of classified preference changes. Consumers reload what changed.
pub struct PreferenceWatcher {
    sync: Option<broadcast::Receiver<StorageChanges>>,
    local: Option<broadcast::Receiver<StorageChanges>>,
}

impl PreferenceWatcher {
    /// Next notification that touched a preference, or `None` once both
    /// areas are gone.
    pub async fn next(&mut self) -> Option<PreferenceChanges> {
        loop {
            let received = match (self.sync.as_mut(), self.local.as_mut()) {
                (None, None) => return None,
                (Some(sync), None) => (Namespace::Sync, sync.recv().await),
                (None, Some(local)) => (Namespace::Local, local.recv().await),
                (Some(sync), Some(local)) => tokio::select! {
                    r = sync.recv() => (Namespace::Sync, r),
                    r = local.recv() => (Namespace::Local, r),
                },
            };

            match received {
                (_, Ok(event)) => {
                    let changes = PreferenceChanges::classify(&event);
                    if !changes.is_empty() {
                        return Some(changes);
                    }
                }
                (namespace, Err(RecvError::Lagged(missed))) => {
                    warn!(
                        "Missed {} {} notifications, reloading everything",
                        missed,
                        namespace.as_str()
                    );
                    return Some(PreferenceChanges::all());
                }
                (Namespace::Sync, Err(RecvError::Closed)) => self.sync = None,
                (Namespace::Local, Err(RecvError::Closed)) => self.local = None,
            }
        }
    }
}
