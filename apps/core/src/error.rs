//! Error types for the storage layer and the preference facade.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The storage capability failed or is unavailable.
    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Quota exceeded for key {key}: {size} bytes > {limit} bytes")]
    QuotaExceeded {
        key: String,
        size: usize,
        limit: usize,
    },

    /// A concurrent migration did not finish within the retry budget.
    #[error("Timed out waiting for migration of {prefix} after {attempts} attempts")]
    Timeout { prefix: String, attempts: u32 },

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Corrupt value under key {key}: {reason}")]
    CorruptValue { key: String, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn corrupt(key: &str, reason: impl Into<String>) -> Self {
        Self::CorruptValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Timeout { .. } | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
