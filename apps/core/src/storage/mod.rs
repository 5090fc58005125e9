//! Storage module - Sync-friendly persistence for hidden offers and settings.
//!
//! This module contains:
//! - The raw storage capability (`StorageArea`) with memory and file backends
//! - Byte-budget partitioning and chunked collections with legacy migration
//! - Single-key values and device-local settings
//! - Classification of change notifications

pub mod area;
pub mod changes;
pub mod chunked;
pub mod file;
pub mod memory;
pub mod migration;
pub mod partition;
pub mod simple;

pub use area::{ChangeSet, Namespace, StorageArea, StorageChange, StorageChanges};
pub use chunked::ChunkedCollectionStore;
pub use file::FileArea;
pub use memory::MemoryArea;
pub use migration::{MigrationCoordinator, MigrationGuard, RetryPolicy};
pub use partition::{partition, serialized_size, MAX_CHUNK_BYTES};
pub use simple::{LocalSettings, SimpleValueStore};
