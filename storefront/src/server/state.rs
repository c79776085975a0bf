//! Shared application state and service wiring.

use crate::aggregates::{CartEnvironment, LedgerEnvironment};
use crate::aggregates::bundle::BundleEnvironment;
use crate::app::Services;
use crate::checkout::{CheckoutEnvironment, CheckoutStore, ManualActionLog};
use crate::config::HoldConfig;
use crate::inventory::{InMemoryInventoryStore, InventoryStore};
use crate::orders::{InMemoryOrderStore, OrderStore};
use crate::payments::{MockPaymentProvider, PaymentProvider};
use crate::stores::{BundleStore, CartStore, LedgerStore};
use adspace_core::environment::{Clock, SystemClock};
use std::sync::Arc;

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    /// The application's service bundle
    pub services: Services,
}

impl AppState {
    /// Creates state around an already-wired service bundle
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

/// Wire a service bundle with the in-memory adapters and the system clock
#[must_use]
pub fn build_services(holds: HoldConfig) -> Services {
    build_services_with(
        holds,
        Arc::new(SystemClock),
        Arc::new(MockPaymentProvider::new()),
    )
}

/// Wire a service bundle with explicit clock and payment provider.
///
/// Tests inject a fixed clock and a pre-registered mock provider here;
/// production swaps the provider for a real gateway adapter.
#[must_use]
pub fn build_services_with(
    holds: HoldConfig,
    clock: Arc<dyn Clock>,
    payments: Arc<dyn PaymentProvider>,
) -> Services {
    let inventory: Arc<dyn InventoryStore> = Arc::new(InMemoryInventoryStore::new());
    let orders: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
    let manual_actions = Arc::new(ManualActionLog::new());

    let ledger = LedgerStore::new(LedgerEnvironment::new(
        Arc::clone(&clock),
        holds.cart_hold(),
    ));
    let cart = CartStore::new(CartEnvironment::new(Arc::clone(&clock)));
    let bundles = BundleStore::new(BundleEnvironment::new(Arc::clone(&clock)));

    let checkout = CheckoutStore::new(CheckoutEnvironment {
        clock: Arc::clone(&clock),
        payments: Arc::clone(&payments),
        inventory: Arc::clone(&inventory),
        orders: Arc::clone(&orders),
        ledger: ledger.clone(),
        cart: cart.clone(),
        bundles: bundles.clone(),
        manual_actions: Arc::clone(&manual_actions),
    });

    Services {
        holds,
        clock,
        inventory,
        payments,
        orders,
        ledger,
        cart,
        bundles,
        checkout,
        manual_actions,
    }
}

#[cfg(test)]
pub(crate) fn test_services() -> Services {
    use adspace_testing::test_clock;
    build_services_with(
        HoldConfig {
            cart_hold_minutes: 15,
            bundle_hold_hours: 24,
            sweep_interval_secs: 60,
        },
        Arc::new(test_clock()),
        Arc::new(MockPaymentProvider::new()),
    )
}
