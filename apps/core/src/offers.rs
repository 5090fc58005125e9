//! Offer identity and visibility rules.
//!
//! Offer cards are discovered by page-side code; this module only sees what
//! that code reports for a card (its link, category names, ended badge) and
//! decides whether the card is hidden and which icon it shows.

use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

static OFFER_PATH: OnceLock<Regex> = OnceLock::new();

fn offer_path_regex() -> &'static Regex {
    OFFER_PATH.get_or_init(|| {
        Regex::new(r"/[a-z]{2}/offers(?:/all-offers)?/(.*)").expect("offer path regex is valid")
    })
}

/// Strip the language prefix and listing path from an offer link.
///
/// `/en/offers/5xrD86h/name` and `/ka/offers/all-offers/5xrD86h/name` both
/// become `/5xrD86h/name`. Links that don't match are returned unchanged.
pub fn normalize_offer_url(url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }
    match offer_path_regex().captures(url) {
        Some(caps) => Some(format!("/{}", &caps[1])),
        None => Some(url.to_string()),
    }
}

/// What page-side code reports about one offer card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferCard {
    /// Normalized offer identifier
    pub id: String,
    /// Category names shown on the card
    pub categories: BTreeSet<String>,
    /// Card carries the "Ended" badge
    pub ended: bool,
}

impl OfferCard {
    /// Build a card from a raw link; `None` if the link is empty.
    pub fn from_link(
        href: &str,
        categories: impl IntoIterator<Item = String>,
        ended: bool,
    ) -> Option<Self> {
        Some(Self {
            id: normalize_offer_url(href)?,
            categories: categories.into_iter().collect(),
            ended,
        })
    }
}

/// Why a card is hidden, strongest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HiddenReason {
    Manual,
    Category(String),
    Ended,
}

/// Visibility decision for one card.
///
/// `hidden` is manual OR category OR ended. `icon_hidden` follows the manual
/// flag only, so the toggle always shows what clicking it will undo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferVisibility {
    pub hidden: bool,
    pub icon_hidden: bool,
    pub reason: Option<HiddenReason>,
}

/// Snapshot of hidden offers and categories used to evaluate cards.
#[derive(Debug, Clone, Default)]
pub struct VisibilityRules {
    hidden_offers: HashSet<String>,
    hidden_categories: HashSet<String>,
}

impl VisibilityRules {
    pub fn new(
        hidden_offers: impl IntoIterator<Item = String>,
        hidden_categories: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            hidden_offers: hidden_offers.into_iter().collect(),
            hidden_categories: hidden_categories.into_iter().collect(),
        }
    }

    pub fn is_manually_hidden(&self, id: &str) -> bool {
        self.hidden_offers.contains(id)
    }

    pub fn evaluate(&self, card: &OfferCard) -> OfferVisibility {
        let manual = self.is_manually_hidden(&card.id);
        let category = card
            .categories
            .iter()
            .find(|c| self.hidden_categories.contains(*c));

        let reason = if manual {
            Some(HiddenReason::Manual)
        } else if let Some(category) = category {
            Some(HiddenReason::Category(category.clone()))
        } else if card.ended {
            Some(HiddenReason::Ended)
        } else {
            None
        };

        OfferVisibility {
            hidden: reason.is_some(),
            icon_hidden: manual,
            reason,
        }
    }
}
