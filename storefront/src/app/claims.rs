//! Claim flow: availability reads and the hold-then-cart sequence.

use super::{Services, StorefrontError};
use crate::aggregates::LedgerError;
use crate::types::{Cart, HolderId, ItemKey, Money, ReservationStatus};
use serde::{Deserialize, Serialize};

/// One item's advisory availability
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAvailability {
    /// The item
    pub item: ItemKey,
    /// Total units in inventory
    pub total: u32,
    /// Units not covered by an active unexpired hold
    pub available: u32,
}

impl Services {
    /// Advisory availability for every item in a region
    ///
    /// # Errors
    ///
    /// Returns an error if the inventory store is unreachable.
    pub async fn availability(
        &self,
        region: &str,
    ) -> Result<Vec<ItemAvailability>, StorefrontError> {
        let records = self.inventory.scan_by_region(region).await?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let available = self.ledger.available(&record.item, record.total).await;
            out.push(ItemAvailability {
                item: record.item,
                total: record.total,
                available,
            });
        }
        Ok(out)
    }

    /// Claim `quantity` units of an item: availability gate, hold, cart line.
    ///
    /// Re-claiming an item already in the cart grows the existing hold and
    /// accumulates the line quantity instead of duplicating either. If the
    /// old hold has meanwhile expired or been released, a fresh hold is
    /// created covering the whole line.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::AvailabilityConflict`] when the advisory
    /// availability cannot cover the request, or a validation error from the
    /// ledger or cart.
    pub async fn claim(
        &self,
        holder: HolderId,
        item: ItemKey,
        title: String,
        unit_price: Money,
        quantity: u32,
    ) -> Result<Cart, StorefrontError> {
        if quantity == 0 {
            return Err(StorefrontError::Validation(
                "quantity must be positive".to_string(),
            ));
        }

        let total = self.inventory.total(&item).await?;
        let available = self.ledger.available(&item, total).await;
        if quantity > available {
            return Err(StorefrontError::AvailabilityConflict {
                item,
                requested: quantity,
                available,
            });
        }

        let existing = self
            .cart
            .get(&holder)
            .await
            .and_then(|cart| cart.line_for(&item).cloned());

        let reservation_id = match existing {
            Some(line) => match self.ledger.increase_hold(line.reservation_id, quantity).await {
                Ok(()) => line.reservation_id,
                // The old hold died (expired and swept, or released); a new
                // one must cover the whole accumulated line
                Err(LedgerError::NotActive { .. } | LedgerError::NotFound(_)) => {
                    self.ledger
                        .create_reservation(
                            holder.clone(),
                            item.clone(),
                            line.quantity + quantity,
                            None,
                        )
                        .await?
                }
                Err(e) => return Err(e.into()),
            },
            None => {
                self.ledger
                    .create_reservation(holder.clone(), item.clone(), quantity, None)
                    .await?
            }
        };

        let cart = self
            .cart
            .add_line(holder, item, title, unit_price, quantity, reservation_id)
            .await?;
        Ok(cart)
    }

    /// Drop an item from the cart, releasing its backing hold first
    ///
    /// # Errors
    ///
    /// Returns an error if the cart or line is missing.
    pub async fn remove_claim(
        &self,
        holder: HolderId,
        item: ItemKey,
    ) -> Result<(), StorefrontError> {
        let line = self
            .cart
            .get(&holder)
            .await
            .and_then(|cart| cart.line_for(&item).cloned())
            .ok_or_else(|| StorefrontError::NotFound(format!("cart line for {item}")))?;

        self.release_quietly(line.reservation_id).await;
        self.cart.remove_line(holder, item).await?;
        Ok(())
    }

    /// Drop the whole cart, releasing every backing hold
    pub async fn clear_claims(&self, holder: HolderId) {
        if let Some(cart) = self.cart.get(&holder).await {
            for line in &cart.lines {
                self.release_quietly(line.reservation_id).await;
            }
        }
        self.cart.clear(holder).await;
    }

    /// Push every active hold in the cart forward (holder is still shopping)
    ///
    /// # Errors
    ///
    /// Returns an error if the holder has no cart.
    pub async fn extend_claims(
        &self,
        holder: &HolderId,
        additional_minutes: i64,
    ) -> Result<(), StorefrontError> {
        let cart = self
            .cart
            .get(holder)
            .await
            .ok_or_else(|| StorefrontError::NotFound(format!("cart for holder {holder}")))?;
        for line in &cart.lines {
            match self.ledger.extend(line.reservation_id, additional_minutes).await {
                Ok(_) => {}
                // A dead hold stays dead; the line will fail at checkout
                Err(LedgerError::NotActive { .. } | LedgerError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Release a hold, tolerating holds that are already terminal
    pub(crate) async fn release_quietly(&self, id: crate::types::ReservationId) {
        match self.ledger.release(id).await {
            Ok(()) => {}
            Err(e) => {
                // Completed holds belong to a finished purchase; anything
                // else is logged and left to the sweep
                if self
                    .ledger
                    .get(id)
                    .await
                    .is_some_and(|r| r.status == ReservationStatus::Completed)
                {
                    tracing::debug!(reservation_id = %id, "Hold already completed, not released");
                } else {
                    tracing::warn!(reservation_id = %id, error = %e, "Hold release failed");
                }
            }
        }
    }
}
