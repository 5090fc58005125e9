//! Integration tests for the chunked storage layer and the preference facade.
//!
//! Covers save/load round trips, legacy migration (including concurrent
//! loaders), shrink reconciliation, change classification and import merge.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tbc_offers_core::storage::changes::is_relevant;
use tbc_offers_core::storage::chunked::{chunk_key, is_chunk_key};
use tbc_offers_core::storage::{
    ChunkedCollectionStore, MemoryArea, MigrationCoordinator, Namespace, StorageArea,
};
use tbc_offers_core::{Config, Preferences, HIDDEN_OFFERS_KEY};

fn chunk_keys(all: &std::collections::BTreeMap<String, serde_json::Value>) -> Vec<String> {
    all.keys()
        .filter(|k| is_chunk_key(HIDDEN_OFFERS_KEY, k))
        .cloned()
        .collect()
}

fn store(area: &Arc<MemoryArea>) -> ChunkedCollectionStore {
    ChunkedCollectionStore::new(area.clone(), Arc::new(MigrationCoordinator::new()))
}

// ===========================================================================
// Round trips
// ===========================================================================

mod round_trip {
    use super::*;

    #[tokio::test]
    async fn test_save_then_load_returns_same_order() {
        let area = Arc::new(MemoryArea::sync_with_quota(8192));
        let store = store(&area);
        let items: Vec<String> = (0..2000).map(|i| format!("/offer{:05}/some-name", i)).collect();

        store.save(HIDDEN_OFFERS_KEY, &items).await.unwrap();

        let all = area.get_all().await.unwrap();
        assert!(chunk_keys(&all).len() > 1, "expected several chunks");
        assert_eq!(store.load(HIDDEN_OFFERS_KEY).await.unwrap(), items);
    }

    #[tokio::test]
    async fn test_empty_collection_round_trip() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        let store = store(&area);
        store.save(HIDDEN_OFFERS_KEY, &["a", "b"]).await.unwrap();

        let empty: Vec<String> = Vec::new();
        store.save(HIDDEN_OFFERS_KEY, &empty).await.unwrap();

        assert!(store.load(HIDDEN_OFFERS_KEY).await.unwrap().is_empty());
        assert!(chunk_keys(&area.get_all().await.unwrap()).is_empty());
    }

    #[tokio::test]
    async fn test_save_is_idempotent() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        let store = store(&area).with_budget(40);
        let items = vec!["alpha", "beta", "gamma", "delta", "epsilon"];

        store.save(HIDDEN_OFFERS_KEY, &items).await.unwrap();
        let first = area.get_all().await.unwrap();
        store.save(HIDDEN_OFFERS_KEY, &items).await.unwrap();
        let second = area.get_all().await.unwrap();

        assert_eq!(first, second);
    }
}

// ===========================================================================
// Legacy migration
// ===========================================================================

mod migration {
    use super::*;

    #[tokio::test]
    async fn test_first_load_migrates_legacy_record() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        area.insert_raw(HIDDEN_OFFERS_KEY, json!(["a", "b", "c"]));
        let store = store(&area);

        let items = store.load(HIDDEN_OFFERS_KEY).await.unwrap();
        assert_eq!(items, vec!["a", "b", "c"]);

        let all = area.get_all().await.unwrap();
        assert!(!all.contains_key(HIDDEN_OFFERS_KEY));
        let mut concatenated = Vec::new();
        for key in chunk_keys(&all) {
            concatenated.extend(all[&key].as_array().unwrap().iter().cloned());
        }
        assert_eq!(concatenated, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn test_concurrent_loads_migrate_once() {
        let area = Arc::new(
            MemoryArea::new(Namespace::Sync).with_latency(Duration::from_millis(5)),
        );
        area.insert_raw(HIDDEN_OFFERS_KEY, json!(["a", "b", "c"]));
        let store = store(&area);

        let (first, second) = tokio::join!(
            store.load(HIDDEN_OFFERS_KEY),
            store.load(HIDDEN_OFFERS_KEY)
        );

        assert_eq!(first.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(second.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(area.set_calls(), 1);
        assert_eq!(area.remove_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_across_tasks() {
        let area = Arc::new(
            MemoryArea::new(Namespace::Sync).with_latency(Duration::from_millis(2)),
        );
        area.insert_raw(HIDDEN_OFFERS_KEY, json!(["x", "y"]));
        let store = store(&area);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.load(HIDDEN_OFFERS_KEY).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), vec!["x", "y"]);
        }
        assert_eq!(area.remove_calls(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_storage_fails_then_migration_resumes() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        area.insert_raw(HIDDEN_OFFERS_KEY, json!(["a"]));
        let coordinator = Arc::new(MigrationCoordinator::new());
        let store = ChunkedCollectionStore::new(area.clone(), coordinator.clone());

        area.set_failing(true);
        assert!(store.load(HIDDEN_OFFERS_KEY).await.is_err());
        assert!(!coordinator.is_active(HIDDEN_OFFERS_KEY));

        area.set_failing(false);
        assert_eq!(store.load(HIDDEN_OFFERS_KEY).await.unwrap(), vec!["a"]);
        assert!(!area.get_all().await.unwrap().contains_key(HIDDEN_OFFERS_KEY));
    }
}

// ===========================================================================
// Reconciliation and change classification
// ===========================================================================

mod reconciliation {
    use super::*;

    #[tokio::test]
    async fn test_shrinking_collection_drops_stale_chunks() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        let store = store(&area).with_budget(20);

        store
            .save(HIDDEN_OFFERS_KEY, &["aaaaaaaa", "bbbbbbbb", "cccccccc"])
            .await
            .unwrap();
        assert_eq!(chunk_keys(&area.get_all().await.unwrap()).len(), 3);

        store.save(HIDDEN_OFFERS_KEY, &["z"]).await.unwrap();

        let all = area.get_all().await.unwrap();
        assert_eq!(chunk_keys(&all), vec![chunk_key(HIDDEN_OFFERS_KEY, 0)]);
        assert_eq!(store.load(HIDDEN_OFFERS_KEY).await.unwrap(), vec!["z"]);
    }

    #[tokio::test]
    async fn test_chunk_writes_are_classified_for_their_prefix() {
        let area = Arc::new(MemoryArea::new(Namespace::Sync));
        let mut rx = area.subscribe();
        store(&area)
            .save(HIDDEN_OFFERS_KEY, &["a"])
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert!(is_relevant(&event.changes, "tbc_hidden_offers"));
        assert!(!is_relevant(&event.changes, "tbc_hidden_categories"));
    }
}

// ===========================================================================
// Preferences facade
// ===========================================================================

mod preferences {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_import_merges_as_set_union() {
        let sync = Arc::new(MemoryArea::sync_with_quota(8192));
        let local = Arc::new(MemoryArea::new(Namespace::Local));
        let prefs = Preferences::new(sync, local);
        prefs.hide_offer("y").await.unwrap();
        prefs.hide_offer("z").await.unwrap();

        let summary = prefs
            .import_json(r#"{"hiddenOffers": ["x", "y"]}"#)
            .await
            .unwrap();

        let loaded: HashSet<String> = prefs.hidden_offers().await.unwrap().into_iter().collect();
        let expected: HashSet<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
        assert_eq!(loaded, expected);
        assert_eq!(prefs.hidden_offer_count().await.unwrap(), 3);
        assert_eq!(summary.offers_added, 1);
        assert_eq!(summary.message(), "Imported 2 hidden offers");
    }

    #[tokio::test]
    async fn test_import_merges_categories() {
        let sync = Arc::new(MemoryArea::sync_with_quota(8192));
        let local = Arc::new(MemoryArea::new(Namespace::Local));
        let prefs = Preferences::new(sync, local);
        prefs.hide_category("Food").await.unwrap();

        let summary = prefs
            .import_json(r#"{"hiddenOffers": [], "hiddenCategories": ["Food", "Travel"]}"#)
            .await
            .unwrap();

        assert_eq!(
            prefs.hidden_categories().await.unwrap(),
            vec!["Food", "Travel"]
        );
        assert_eq!(summary.categories_added, 1);
        assert_eq!(
            summary.message(),
            "Imported 0 hidden offers and 2 categories"
        );
    }

    #[tokio::test]
    async fn test_file_backed_preferences_persist_and_migrate() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::with_data_dir(temp_dir.path().to_path_buf());

        // Data written by the pre-chunking layout
        std::fs::write(
            config.sync_area_path(),
            r#"{"tbc_hidden_offers": ["/a/one", "/b/two"]}"#,
        )
        .unwrap();

        let prefs = Preferences::from_config(&config).unwrap();
        assert_eq!(
            prefs.hidden_offers().await.unwrap(),
            vec!["/a/one", "/b/two"]
        );
        prefs.set_show_autoload_button(false).await.unwrap();
        drop(prefs);

        let reopened = Preferences::from_config(&config).unwrap();
        assert_eq!(reopened.hidden_offer_count().await.unwrap(), 2);
        assert!(!reopened.show_autoload_button().await.unwrap());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(config.sync_area_path()).unwrap())
                .unwrap();
        assert!(raw.get(HIDDEN_OFFERS_KEY).is_none());
        assert_eq!(raw["tbc_hidden_offers_chunk_0"], json!(["/a/one", "/b/two"]));
    }
}
