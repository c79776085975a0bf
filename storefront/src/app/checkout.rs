//! Checkout flow: building finalize requests and driving the saga.

use super::{Services, StorefrontError};
use crate::checkout::{CheckoutError, CheckoutOutcome, CheckoutRequest, CheckoutSource};
use crate::types::{BuyerContact, ConfirmationId, HolderId, ItemKey, Order, OrderId, OrderLine};

impl Services {
    /// Finalize a cart purchase against a payment confirmation.
    ///
    /// The line snapshot is taken from the live cart at finalize time; the
    /// saga clears the cart only once the order is durably recorded.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the cart is empty, or propagates the
    /// saga's failure taxonomy.
    pub async fn checkout_cart(
        &self,
        holder: HolderId,
        confirmation_id: ConfirmationId,
        contact: Option<BuyerContact>,
    ) -> Result<CheckoutOutcome, StorefrontError> {
        let cart = self
            .cart
            .get(&holder)
            .await
            .filter(|cart| !cart.lines.is_empty())
            .ok_or_else(|| StorefrontError::Validation("cart is empty".to_string()))?;

        let lines = cart
            .lines
            .iter()
            .map(|line| OrderLine {
                item: line.item.clone(),
                title: line.title.clone(),
                unit_price: line.unit_price,
                quantity: line.quantity,
                reservation_id: line.reservation_id,
            })
            .collect();

        self.finalize(CheckoutRequest {
            confirmation_id,
            holder,
            contact,
            lines,
            source: CheckoutSource::Cart,
        })
        .await
    }

    /// Finalize a purchase whose lines ride on the payment metadata rather
    /// than a cart (single-item express checkout).
    ///
    /// Each metadata line gets a short hold before the saga runs, so the
    /// finalize path is uniform: every order line has a backing reservation.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the metadata carries no lines, or
    /// propagates the saga's failure taxonomy.
    pub async fn checkout_direct(
        &self,
        confirmation_id: ConfirmationId,
    ) -> Result<CheckoutOutcome, StorefrontError> {
        let confirmation = self.payments.retrieve_payment(&confirmation_id).await?;
        if confirmation.metadata.lines.is_empty() {
            return Err(StorefrontError::Validation(
                "payment metadata carries no purchase lines".to_string(),
            ));
        }
        let holder = confirmation
            .metadata
            .holder
            .clone()
            .unwrap_or_else(HolderId::guest);

        let mut lines = Vec::with_capacity(confirmation.metadata.lines.len());
        for meta in &confirmation.metadata.lines {
            let reservation_id = self
                .ledger
                .create_reservation(holder.clone(), meta.item.clone(), meta.quantity, None)
                .await?;
            lines.push(OrderLine {
                item: meta.item.clone(),
                title: meta.title.clone(),
                unit_price: meta.unit_price,
                quantity: meta.quantity,
                reservation_id,
            });
        }

        self.finalize(CheckoutRequest {
            confirmation_id,
            holder,
            contact: confirmation.metadata.contact.clone(),
            lines,
            source: CheckoutSource::Direct,
        })
        .await
    }

    /// Drive the saga and translate its failure taxonomy
    pub(crate) async fn finalize(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, StorefrontError> {
        match self.checkout.finalize(request).await {
            Ok(outcome) => Ok(outcome),
            Err(CheckoutError::InProgress(id)) => Err(StorefrontError::CheckoutInProgress(id)),
            Err(CheckoutError::Unavailable(reason)) => Err(StorefrontError::Unavailable(reason)),
        }
    }

    /// Fetch one order
    ///
    /// # Errors
    ///
    /// Returns an error if the order is unknown.
    pub async fn order(&self, id: &OrderId) -> Result<Order, StorefrontError> {
        Ok(self.orders.get(id).await?)
    }

    /// Find the order a confirmation settled, if finalize has run
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn order_for_confirmation(
        &self,
        confirmation_id: &ConfirmationId,
    ) -> Result<Option<Order>, StorefrontError> {
        Ok(self.orders.find_by_confirmation(confirmation_id).await?)
    }

    /// All orders for a holder, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn orders_for_holder(
        &self,
        holder: &HolderId,
    ) -> Result<Vec<Order>, StorefrontError> {
        Ok(self.orders.list_for_holder(holder).await?)
    }

    /// Record a creative submission against a fulfillment slot
    ///
    /// # Errors
    ///
    /// Returns an error if the order or slot is unknown.
    pub async fn submit_slot(
        &self,
        order_id: &OrderId,
        item: &ItemKey,
        slot_number: u32,
        submission_url: String,
    ) -> Result<Order, StorefrontError> {
        let now = self.clock.now();
        Ok(self
            .orders
            .submit_slot(order_id, item, slot_number, submission_url, now)
            .await?)
    }
}
