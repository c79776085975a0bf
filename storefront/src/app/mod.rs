//! Application services: the orchestration layer between the HTTP surface
//! and the aggregates and ports.
//!
//! Services sequence the cross-aggregate flows the reducers deliberately
//! stay out of: "check availability, create the hold, then touch the cart",
//! bundle creation with per-item holds, and driving the checkout saga.

pub mod bundles;
pub mod checkout;
pub mod claims;

use crate::aggregates::{BundleError, CartError, LedgerError};
use crate::checkout::{CheckoutStore, ManualActionLog};
use crate::config::HoldConfig;
use crate::inventory::{InventoryError, InventoryStore};
use crate::orders::{OrderStore, OrderStoreError};
use crate::payments::{PaymentProvider, PaymentProviderError};
use crate::stores::{BundleStore, CartStore, LedgerStore};
use crate::types::{ConfirmationId, ItemKey};
use adspace_core::environment::Clock;
use std::sync::Arc;
use thiserror::Error;

/// Failure taxonomy for the service layer.
///
/// The HTTP layer maps these onto status codes; the distinctions matter
/// because "you asked for too many" and "your money moved but we could not
/// deliver" demand very different responses.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// The request is malformed or violates a domain rule
    #[error("validation failed: {0}")]
    Validation(String),

    /// Not enough advisory availability to accept the claim
    #[error("only {available} of {item} available, {requested} requested")]
    AvailabilityConflict {
        /// The contested item
        item: ItemKey,
        /// Units the caller wanted
        requested: u32,
        /// Units currently available
        available: u32,
    },

    /// The referenced resource does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Another checkout run holds this confirmation
    #[error("checkout for confirmation {0} is already in progress")]
    CheckoutInProgress(ConfirmationId),

    /// Payment succeeded but fulfillment could not be applied
    #[error("payment succeeded but fulfillment failed; manual action recorded")]
    FulfillmentFailed,

    /// Reservation ledger refused the operation
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Cart refused the operation
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Bundle aggregate refused the operation
    #[error(transparent)]
    Bundle(#[from] BundleError),

    /// Inventory store failed
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Order store failed
    #[error(transparent)]
    Orders(#[from] OrderStoreError),

    /// Payment provider failed
    #[error(transparent)]
    Payments(#[from] PaymentProviderError),

    /// A downstream dependency was unreachable
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// The application's service bundle, shared across request handlers
#[derive(Clone)]
pub struct Services {
    /// Hold-window configuration
    pub holds: HoldConfig,
    /// Clock shared with every store
    pub clock: Arc<dyn Clock>,
    /// Authoritative inventory counters
    pub inventory: Arc<dyn InventoryStore>,
    /// Payment provider port
    pub payments: Arc<dyn PaymentProvider>,
    /// Durable order record
    pub orders: Arc<dyn OrderStore>,
    /// Reservation ledger
    pub ledger: LedgerStore,
    /// Per-holder carts
    pub cart: CartStore,
    /// Curated bundles
    pub bundles: BundleStore,
    /// Checkout saga driver
    pub checkout: CheckoutStore,
    /// Operator escape hatch
    pub manual_actions: Arc<ManualActionLog>,
}
