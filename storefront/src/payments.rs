//! Payment provider port.
//!
//! The finalizer only ever asks the provider one question: what is the
//! status of this confirmation, and what metadata was attached to it. All
//! charging mechanics live with the provider and are out of scope here.
//! The mock implementation registers confirmations up front so tests and
//! development can drive the checkout path end to end.

use crate::types::{BuyerContact, ConfirmationId, HolderId, ItemKey, Money};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Payment provider error
#[derive(Debug, Clone, Error)]
pub enum PaymentProviderError {
    /// No confirmation with this id is known to the provider
    #[error("unknown payment confirmation {0}")]
    UnknownConfirmation(ConfirmationId),

    /// Transport failure against the provider
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
}

/// Status of a payment confirmation as reported by the provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// The charge went through; the finalizer may commit
    Succeeded,
    /// The charge is still being processed
    Processing,
    /// The charge requires further buyer action
    RequiresAction,
    /// The charge failed
    Failed,
}

/// One purchased line carried on the confirmation's metadata.
///
/// Used by the single-item and bundle checkout variants, where the purchased
/// lines ride along with the payment rather than living in a cart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataLine {
    /// Item purchased
    pub item: ItemKey,
    /// Display title
    pub title: String,
    /// Unit price
    pub unit_price: Money,
    /// Units purchased
    pub quantity: u32,
}

/// Metadata attached to a payment confirmation at charge time
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentMetadata {
    /// Holder the charge was made for, when known
    pub holder: Option<HolderId>,
    /// Buyer contact captured by the payment page, when present
    pub contact: Option<BuyerContact>,
    /// Purchased lines, for checkout variants that do not read a live cart
    pub lines: Vec<MetadataLine>,
}

/// A payment confirmation: status plus attached metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    /// Provider-issued confirmation id
    pub id: ConfirmationId,
    /// Current charge status
    pub status: PaymentStatus,
    /// Amount charged
    pub amount: Money,
    /// Metadata attached at charge time
    pub metadata: PaymentMetadata,
}

/// Port over the payment provider.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Retrieve the status and metadata of a payment confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error if the confirmation is unknown or the provider is
    /// unreachable.
    async fn retrieve_payment(
        &self,
        confirmation_id: &ConfirmationId,
    ) -> Result<PaymentConfirmation, PaymentProviderError>;
}

/// Mock payment provider for development and testing.
///
/// Confirmations are registered explicitly; retrieval returns whatever was
/// registered, so tests control exactly what the finalizer sees.
#[derive(Debug, Default)]
pub struct MockPaymentProvider {
    confirmations: Arc<RwLock<HashMap<ConfirmationId, PaymentConfirmation>>>,
}

impl MockPaymentProvider {
    /// Creates an empty mock provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a confirmation the provider will report
    pub async fn register(&self, confirmation: PaymentConfirmation) {
        tracing::debug!(
            confirmation_id = %confirmation.id,
            status = ?confirmation.status,
            "Registered mock payment confirmation"
        );
        self.confirmations
            .write()
            .await
            .insert(confirmation.id.clone(), confirmation);
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn retrieve_payment(
        &self,
        confirmation_id: &ConfirmationId,
    ) -> Result<PaymentConfirmation, PaymentProviderError> {
        self.confirmations
            .read()
            .await
            .get(confirmation_id)
            .cloned()
            .ok_or_else(|| PaymentProviderError::UnknownConfirmation(confirmation_id.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retrieve_returns_registered_confirmation() {
        let provider = MockPaymentProvider::new();
        let id = ConfirmationId::new("pi_test_1");
        provider
            .register(PaymentConfirmation {
                id: id.clone(),
                status: PaymentStatus::Succeeded,
                amount: Money::from_major(100),
                metadata: PaymentMetadata::default(),
            })
            .await;

        let confirmation = provider.retrieve_payment(&id).await.unwrap();
        assert_eq!(confirmation.status, PaymentStatus::Succeeded);
        assert_eq!(confirmation.amount, Money::from_major(100));
    }

    #[tokio::test]
    async fn retrieve_unknown_confirmation_errors() {
        let provider = MockPaymentProvider::new();
        let result = provider
            .retrieve_payment(&ConfirmationId::new("pi_missing"))
            .await;
        assert!(matches!(
            result,
            Err(PaymentProviderError::UnknownConfirmation(_))
        ));
    }
}
