//! Change classification for storage notifications.
//!
//! Consumers receive raw change sets and only need to know whether a logical
//! collection was touched; chunk layout stays private to the storage layer.

use crate::storage::area::ChangeSet;
use crate::storage::chunked::is_chunk_key;

/// True iff any changed key is a chunk of the collection under `prefix`.
pub fn is_relevant(changes: &ChangeSet, prefix: &str) -> bool {
    changes.keys().any(|key| is_chunk_key(prefix, key))
}

/// True if the plain key `key` changed.
pub fn touches_key(changes: &ChangeSet, key: &str) -> bool {
    changes.contains_key(key)
}
