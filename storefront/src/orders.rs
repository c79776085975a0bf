//! Order store port: durable record of completed purchases.
//!
//! Insertion is unique per payment confirmation id. That uniqueness is the
//! durable idempotency backstop for the finalizer: a concurrent or repeated
//! finalize for the same confirmation finds the existing order instead of
//! writing a second one.

use crate::types::{ConfirmationId, HolderId, ItemKey, Order, OrderId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from the order store
#[derive(Debug, Error)]
pub enum OrderStoreError {
    /// An order already exists for this confirmation id
    #[error("an order already exists for confirmation {0}")]
    DuplicateConfirmation(ConfirmationId),

    /// No order with this id
    #[error("order {0} not found")]
    NotFound(OrderId),

    /// The order has no fulfillment slot at this position
    #[error("order {order_id} has no slot {slot_number} for item {item}")]
    SlotNotFound {
        /// The order
        order_id: OrderId,
        /// The item line
        item: ItemKey,
        /// Requested slot position
        slot_number: u32,
    },

    /// Transport failure against a remote store
    #[error("order store unavailable: {0}")]
    Unavailable(String),
}

/// Port for the durable order record.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order, unique per confirmation id.
    ///
    /// # Errors
    ///
    /// Returns [`OrderStoreError::DuplicateConfirmation`] when an order for
    /// the same confirmation already exists. Nothing is written in that case.
    async fn insert_new(&self, order: Order) -> Result<(), OrderStoreError>;

    /// Fetch one order.
    ///
    /// # Errors
    ///
    /// Returns an error if the order is unknown or the store is unreachable.
    async fn get(&self, id: &OrderId) -> Result<Order, OrderStoreError>;

    /// Find the order created for a confirmation id, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn find_by_confirmation(
        &self,
        confirmation_id: &ConfirmationId,
    ) -> Result<Option<Order>, OrderStoreError>;

    /// All orders for a holder, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn list_for_holder(&self, holder: &HolderId) -> Result<Vec<Order>, OrderStoreError>;

    /// Record a fulfillment submission against one slot.
    ///
    /// First submission marks the slot completed; later ones update the url
    /// and edit timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the order or slot is unknown.
    async fn submit_slot(
        &self,
        order_id: &OrderId,
        item: &ItemKey,
        slot_number: u32,
        submission_url: String,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderStoreError>;
}

/// In-memory order store.
///
/// All mutation runs under one write lock, making the insert-if-absent on
/// the confirmation index atomic.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    inner: Arc<RwLock<OrderRecords>>,
}

#[derive(Debug, Default)]
struct OrderRecords {
    orders: HashMap<OrderId, Order>,
    by_confirmation: HashMap<ConfirmationId, OrderId>,
}

impl InMemoryOrderStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_new(&self, order: Order) -> Result<(), OrderStoreError> {
        let mut records = self.inner.write().await;
        if records.by_confirmation.contains_key(&order.confirmation_id) {
            tracing::warn!(
                confirmation_id = %order.confirmation_id,
                "Refused duplicate order insert"
            );
            return Err(OrderStoreError::DuplicateConfirmation(
                order.confirmation_id.clone(),
            ));
        }
        records
            .by_confirmation
            .insert(order.confirmation_id.clone(), order.id);
        tracing::info!(
            order_id = %order.id,
            confirmation_id = %order.confirmation_id,
            holder = %order.holder,
            total = %order.total,
            "Order recorded"
        );
        records.orders.insert(order.id, order);
        Ok(())
    }

    async fn get(&self, id: &OrderId) -> Result<Order, OrderStoreError> {
        self.inner
            .read()
            .await
            .orders
            .get(id)
            .cloned()
            .ok_or(OrderStoreError::NotFound(*id))
    }

    async fn find_by_confirmation(
        &self,
        confirmation_id: &ConfirmationId,
    ) -> Result<Option<Order>, OrderStoreError> {
        let records = self.inner.read().await;
        Ok(records
            .by_confirmation
            .get(confirmation_id)
            .and_then(|id| records.orders.get(id))
            .cloned())
    }

    async fn list_for_holder(&self, holder: &HolderId) -> Result<Vec<Order>, OrderStoreError> {
        let records = self.inner.read().await;
        let mut orders: Vec<Order> = records
            .orders
            .values()
            .filter(|order| &order.holder == holder)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn submit_slot(
        &self,
        order_id: &OrderId,
        item: &ItemKey,
        slot_number: u32,
        submission_url: String,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderStoreError> {
        let mut records = self.inner.write().await;
        let order = records
            .orders
            .get_mut(order_id)
            .ok_or(OrderStoreError::NotFound(*order_id))?;

        let slot = order
            .fulfillment
            .get_mut(item)
            .and_then(|slots| {
                slots
                    .iter_mut()
                    .find(|slot| slot.slot_number == slot_number)
            })
            .ok_or(OrderStoreError::SlotNotFound {
                order_id: *order_id,
                item: item.clone(),
                slot_number,
            })?;

        slot.submit(submission_url, now);
        Ok(order.clone())
    }
}
