//! Import/export of hidden offers and categories as a JSON document.
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "exportDate": "2026-10-19T08:30:00.000Z",
//!   "hiddenOffers": ["/5xrD86h/name"],
//!   "hiddenCategories": ["Travel"]
//! }
//! ```

use crate::error::{Result, StoreError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

pub const EXPORT_VERSION: &str = "1.0";

/// Exported document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: String,
    pub export_date: String,
    pub hidden_offers: Vec<String>,
    pub hidden_categories: Vec<String>,
}

impl ExportDocument {
    pub fn new(
        hidden_offers: Vec<String>,
        hidden_categories: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            version: EXPORT_VERSION.to_string(),
            export_date: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            hidden_offers,
            hidden_categories,
        }
    }

    /// Pretty JSON with two-space indentation.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Suggested file name for an export taken at `now`.
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("tbc-hidden-offers-{}.json", now.timestamp_millis())
}

/// Validated contents of an import file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPayload {
    pub hidden_offers: Vec<String>,
    /// `None` when the file has no usable category list
    pub hidden_categories: Option<Vec<String>>,
}

fn strings(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// Parse and validate an import file without touching storage.
pub fn parse_import(text: &str) -> Result<ImportPayload> {
    let data: Value =
        serde_json::from_str(text).map_err(|e| StoreError::InvalidFormat(e.to_string()))?;

    let hidden_offers = data
        .get("hiddenOffers")
        .and_then(strings)
        .ok_or_else(|| {
            StoreError::InvalidFormat("hiddenOffers must be an array of strings".to_string())
        })?;
    let hidden_categories = data.get("hiddenCategories").and_then(strings);

    Ok(ImportPayload {
        hidden_offers,
        hidden_categories,
    })
}

/// Set union keeping `existing` order, then new items in `incoming` order.
/// Returns the merged list and how many items were added.
pub fn merge_unique(existing: Vec<String>, incoming: &[String]) -> (Vec<String>, usize) {
    let mut seen: HashSet<String> = HashSet::with_capacity(existing.len() + incoming.len());
    let mut merged = Vec::with_capacity(existing.len() + incoming.len());

    for item in existing {
        if seen.insert(item.clone()) {
            merged.push(item);
        }
    }
    let before = merged.len();
    for item in incoming {
        if seen.insert(item.clone()) {
            merged.push(item.clone());
        }
    }
    let added = merged.len() - before;
    (merged, added)
}

/// Outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub offers_in_file: usize,
    pub categories_in_file: Option<usize>,
    pub offers_added: usize,
    pub categories_added: usize,
}

impl ImportSummary {
    /// User-facing notification text.
    pub fn message(&self) -> String {
        match self.categories_in_file {
            Some(n) => format!(
                "Imported {} hidden offers and {} categories",
                self.offers_in_file, n
            ),
            None => format!("Imported {} hidden offers", self.offers_in_file),
        }
    }
}
