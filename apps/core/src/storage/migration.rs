//! Migration coordination - At most one legacy migration per prefix.
//!
//! The coordinator is an ordinary value owned by whoever orchestrates storage
//! access (see `Preferences`), shared through an `Arc`. A fresh coordinator
//! starts empty, so tests and reloads begin from a clean state.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Prefixes currently being migrated from the legacy layout.
#[derive(Debug, Default)]
pub struct MigrationCoordinator {
    active: Mutex<HashSet<String>>,
}

impl MigrationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark `prefix` as migrating. Returns false if it already was.
    pub fn try_enter(&self, prefix: &str) -> bool {
        self.active().insert(prefix.to_string())
    }

    pub fn leave(&self, prefix: &str) {
        self.active().remove(prefix);
    }

    pub fn is_active(&self, prefix: &str) -> bool {
        self.active().contains(prefix)
    }

    /// Enter `prefix` and get a guard that leaves on drop, or `None` if
    /// another caller is already migrating it.
    pub fn enter(self: &Arc<Self>, prefix: &str) -> Option<MigrationGuard> {
        if self.try_enter(prefix) {
            Some(MigrationGuard {
                coordinator: Arc::clone(self),
                prefix: prefix.to_string(),
            })
        } else {
            None
        }
    }
}

/// Holds a prefix in the migrating set until dropped.
#[derive(Debug)]
pub struct MigrationGuard {
    coordinator: Arc<MigrationCoordinator>,
    prefix: String,
}

impl MigrationGuard {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Drop for MigrationGuard {
    fn drop(&mut self) {
        self.coordinator.leave(&self.prefix);
    }
}

/// Bounded exponential backoff for loaders waiting on a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Waits before giving up with a timeout
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Delay before wait number `attempt` (0-based), doubling up to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_enter_is_exclusive() {
        let coordinator = MigrationCoordinator::new();
        assert!(coordinator.try_enter("p"));
        assert!(!coordinator.try_enter("p"));
        assert!(coordinator.try_enter("q"));
        assert!(coordinator.is_active("p"));

        coordinator.leave("p");
        assert!(!coordinator.is_active("p"));
        assert!(coordinator.try_enter("p"));
    }

    #[test]
    fn test_guard_leaves_on_drop() {
        let coordinator = Arc::new(MigrationCoordinator::new());
        {
            let guard = coordinator.enter("tbc_hidden_offers").unwrap();
            assert_eq!(guard.prefix(), "tbc_hidden_offers");
            assert!(coordinator.is_active("tbc_hidden_offers"));
            assert!(coordinator.enter("tbc_hidden_offers").is_none());
        }
        assert!(!coordinator.is_active("tbc_hidden_offers"));
    }

    #[test]
    fn test_fresh_coordinators_are_independent() {
        let first = MigrationCoordinator::new();
        first.try_enter("p");
        let second = MigrationCoordinator::new();
        assert!(!second.is_active("p"));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(50));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(1000));
    }
}
