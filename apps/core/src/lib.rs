//! tbc-offers Core Library
//!
//! Persistence for the "hide offers" browser tool: which offer cards and
//! offer categories a user has hidden, synchronized across devices through a
//! quota-limited key/value store.
//! Provides the following capabilities:
//! - Chunked storage of unbounded string lists under a per-item byte ceiling
//! - Transparent migration from the pre-chunking single-key layout
//! - Change classification so consumers know when to reload
//! - Import/export and the offer visibility rules

pub mod config;
pub mod error;
pub mod offers;
pub mod preferences;
pub mod storage;
pub mod transfer;

// Re-export main types
pub use config::Config;
pub use error::{Result, StoreError};
pub use offers::{normalize_offer_url, OfferCard, OfferVisibility, VisibilityRules};
pub use preferences::{
    PreferenceChanges, PreferenceWatcher, Preferences, HIDDEN_CATEGORIES_KEY, HIDDEN_OFFERS_KEY,
    SHOW_AUTOLOAD_BUTTON_KEY,
};
pub use storage::{
    ChunkedCollectionStore, FileArea, MemoryArea, MigrationCoordinator, Namespace, StorageArea,
};
pub use transfer::{ExportDocument, ImportSummary};
