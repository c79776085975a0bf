//! Inventory store port: the authoritative total-capacity counter per
//! sellable item.
//!
//! Availability reads elsewhere in the system are advisory; the guarded
//! decrement here is the single place oversell is structurally prevented.
//! The decrement must be one atomic conditional operation: decrement if
//! current >= requested, else fail.

use crate::types::ItemKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from the inventory store
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The item has no inventory record
    #[error("no inventory record for item {item}")]
    UnknownItem {
        /// The missing item
        item: ItemKey,
    },

    /// Transport failure against a remote store
    #[error("inventory store unavailable: {0}")]
    Unavailable(String),
}

/// Result of a guarded decrement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// The conditional decrement applied
    Applied {
        /// Units remaining after the decrement
        remaining: u32,
    },
    /// Current inventory was below the requested amount; nothing changed
    Insufficient {
        /// Units currently held
        current: u32,
    },
}

/// One item's inventory record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInventory {
    /// The item
    pub item: ItemKey,
    /// Total units currently in inventory
    pub total: u32,
}

/// Port for the authoritative inventory counters.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Atomically decrement `amount` units if at least that many remain.
    ///
    /// # Errors
    ///
    /// Returns an error if the item is unknown or the store is unreachable.
    async fn guarded_decrement(
        &self,
        item: &ItemKey,
        amount: u32,
    ) -> Result<DecrementOutcome, InventoryError>;

    /// Current total units for an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the item is unknown or the store is unreachable.
    async fn total(&self, item: &ItemKey) -> Result<u32, InventoryError>;

    /// All inventory records for a region (availability display read path).
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn scan_by_region(&self, region: &str) -> Result<Vec<ItemInventory>, InventoryError>;

    /// Set an item's total (admin seeding).
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn set_total(&self, item: &ItemKey, total: u32) -> Result<(), InventoryError>;
}

/// In-memory inventory store.
///
/// All mutation runs under one write lock, which makes the guarded
/// decrement the atomic conditional operation the checkout path relies on.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    items: Arc<RwLock<HashMap<ItemKey, u32>>>,
}

impl InMemoryInventoryStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn guarded_decrement(
        &self,
        item: &ItemKey,
        amount: u32,
    ) -> Result<DecrementOutcome, InventoryError> {
        let mut items = self.items.write().await;
        let current = items
            .get_mut(item)
            .ok_or_else(|| InventoryError::UnknownItem { item: item.clone() })?;

        if *current >= amount {
            *current -= amount;
            let remaining = *current;
            tracing::debug!(item = %item, amount, remaining, "Guarded decrement applied");
            Ok(DecrementOutcome::Applied { remaining })
        } else {
            tracing::warn!(
                item = %item,
                amount,
                current = *current,
                "Guarded decrement refused, insufficient inventory"
            );
            Ok(DecrementOutcome::Insufficient { current: *current })
        }
    }

    async fn total(&self, item: &ItemKey) -> Result<u32, InventoryError> {
        self.items
            .read()
            .await
            .get(item)
            .copied()
            .ok_or_else(|| InventoryError::UnknownItem { item: item.clone() })
    }

    async fn scan_by_region(&self, region: &str) -> Result<Vec<ItemInventory>, InventoryError> {
        let items = self.items.read().await;
        let mut records: Vec<ItemInventory> = items
            .iter()
            .filter(|(key, _)| key.region == region)
            .map(|(key, total)| ItemInventory {
                item: key.clone(),
                total: *total,
            })
            .collect();
        records.sort_by(|a, b| a.item.variant.cmp(&b.item.variant));
        Ok(records)
    }

    async fn set_total(&self, item: &ItemKey, total: u32) -> Result<(), InventoryError> {
        self.items.write().await.insert(item.clone(), total);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn key(region: &str, variant: &str) -> ItemKey {
        ItemKey::new(region, variant)
    }

    #[tokio::test]
    async fn guarded_decrement_applies_when_sufficient() {
        let store = InMemoryInventoryStore::new();
        store.set_total(&key("MT", "half"), 3).await.unwrap();

        let outcome = store.guarded_decrement(&key("MT", "half"), 1).await.unwrap();
        assert_eq!(outcome, DecrementOutcome::Applied { remaining: 2 });
        assert_eq!(store.total(&key("MT", "half")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn guarded_decrement_refuses_when_insufficient() {
        let store = InMemoryInventoryStore::new();
        store.set_total(&key("MT", "half"), 2).await.unwrap();

        let outcome = store.guarded_decrement(&key("MT", "half"), 3).await.unwrap();
        assert_eq!(outcome, DecrementOutcome::Insufficient { current: 2 });
        // Nothing changed
        assert_eq!(store.total(&key("MT", "half")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_decrements_never_go_negative() {
        let store = Arc::new(InMemoryInventoryStore::new());
        store.set_total(&key("CA", "quarter"), 5).await.unwrap();

        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.guarded_decrement(&key("CA", "quarter"), 3).await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.guarded_decrement(&key("CA", "quarter"), 3).await })
        };

        let outcome_a = a.await.unwrap().unwrap();
        let outcome_b = b.await.unwrap().unwrap();

        let applied = [outcome_a, outcome_b]
            .iter()
            .filter(|o| matches!(o, DecrementOutcome::Applied { .. }))
            .count();
        assert_eq!(applied, 1, "given 5 total, only one decrement of 3 may win");
        assert_eq!(store.total(&key("CA", "quarter")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn scan_by_region_filters_and_sorts() {
        let store = InMemoryInventoryStore::new();
        store.set_total(&key("MT", "half"), 3).await.unwrap();
        store.set_total(&key("MT", "full"), 1).await.unwrap();
        store.set_total(&key("CA", "half"), 9).await.unwrap();

        let records = store.scan_by_region("MT").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].item.variant, "full");
        assert_eq!(records[1].item.variant, "half");
    }

    #[tokio::test]
    async fn unknown_item_is_an_error() {
        let store = InMemoryInventoryStore::new();
        let err = store.guarded_decrement(&key("ZZ", "none"), 1).await;
        assert!(matches!(err, Err(InventoryError::UnknownItem { .. })));
    }
}
