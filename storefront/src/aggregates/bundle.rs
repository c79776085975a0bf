//! Custom bundle holds: admin-curated multi-item offers sold as a single
//! flat-priced unit via shareable link or account assignment.
//!
//! Bundles reuse the reservation ledger for their per-item holds (one
//! reservation per constituent item, expiry overridden to the bundle's
//! longer window). The application service layer owns that sequencing; this
//! aggregate tracks the bundle records and their lifecycle.

use crate::types::{Bundle, BundleId, BundleStatus, HolderId, ItemKey, Money};
use adspace_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Typed validation failures from the bundle aggregate
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum BundleError {
    /// No bundle with this id
    #[error("bundle {0} not found")]
    NotFound(BundleId),

    /// A bundle needs at least one item
    #[error("bundle must contain at least one item")]
    NoItems,

    /// Item quantities must be positive
    #[error("bundle item quantities must be positive")]
    InvalidQuantity,

    /// The operation requires an active bundle
    #[error("bundle {id} is {status:?}, not active")]
    NotActive {
        /// The bundle
        id: BundleId,
        /// Its current terminal status
        status: BundleStatus,
    },
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the bundle aggregate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BundleAction {
    // Commands
    /// Record a new active bundle. The service layer has already created
    /// one ledger hold per item and stamped their ids on the bundle.
    CreateBundle {
        /// The bundle, holds bound
        bundle: Bundle,
    },

    /// Mark purchased (terminal), recording purchaser identity. Happens
    /// exactly once, on successful payment.
    MarkPurchased {
        /// The bundle
        id: BundleId,
        /// Who bought it
        purchaser: HolderId,
    },

    /// Mark expired (terminal). Hold window lapsed without payment.
    ExpireBundle {
        /// The bundle
        id: BundleId,
    },

    /// Remove the bundle record. The service layer releases all bound
    /// reservations first so no orphaned holds remain.
    RemoveBundle {
        /// The bundle
        id: BundleId,
    },

    // Events
    /// A bundle was recorded
    BundleCreated {
        /// The bundle
        bundle: Bundle,
    },

    /// A bundle was purchased
    BundlePurchased {
        /// The bundle
        id: BundleId,
        /// Who bought it
        purchaser: HolderId,
    },

    /// A bundle expired
    BundleExpired {
        /// The bundle
        id: BundleId,
    },

    /// A bundle record was removed
    BundleRemoved {
        /// The bundle
        id: BundleId,
    },

    /// Validation failed
    ValidationFailed {
        /// The typed failure
        error: BundleError,
    },
}

// ============================================================================
// State
// ============================================================================

/// State for the bundle aggregate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BundleState {
    /// All bundles indexed by ID
    pub bundles: HashMap<BundleId, Bundle>,
    /// Last validation error
    pub last_error: Option<BundleError>,
}

impl BundleState {
    /// Creates a new empty `BundleState`
    #[must_use]
    pub fn new() -> Self {
        Self {
            bundles: HashMap::new(),
            last_error: None,
        }
    }

    /// Gets a bundle by ID
    #[must_use]
    pub fn get(&self, id: &BundleId) -> Option<&Bundle> {
        self.bundles.get(id)
    }

    /// Finds a bundle by its shareable-link access token
    #[must_use]
    pub fn find_by_token(&self, token: &str) -> Option<&Bundle> {
        self.bundles.values().find(|b| b.access_token == token)
    }

    /// Returns the number of bundles
    #[must_use]
    pub fn count(&self) -> usize {
        self.bundles.len()
    }
}

impl Default for BundleState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Price allocation
// ============================================================================

/// One constituent item's share of the flat bundle price
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocatedItem {
    /// The item
    pub item: ItemKey,
    /// Display title
    pub title: String,
    /// Units included
    pub quantity: u32,
    /// This item's allocated share of the flat price
    pub line_total: Money,
    /// Allocated price per unit (line total over quantity, cent-rounded)
    pub unit_price: Money,
}

/// Allocates the flat bundle price across constituent items proportionally
/// by each item's share of total retail value. Every line total is rounded
/// to the cent and the last item absorbs the rounding remainder, so the
/// line totals always sum back to the flat price exactly.
///
/// Returns an empty allocation when the bundle has no items or zero retail
/// value (nothing meaningful to apportion).
#[must_use]
pub fn allocate_bundle_prices(bundle: &Bundle) -> Vec<AllocatedItem> {
    let retail_total = bundle.retail_value();
    if bundle.items.is_empty() || retail_total.is_zero() {
        return Vec::new();
    }

    let mut allocated = Vec::with_capacity(bundle.items.len());
    let mut remaining = bundle.flat_price;
    let last = bundle.items.len() - 1;

    for (index, item) in bundle.items.iter().enumerate() {
        let line_total = if index == last {
            remaining
        } else {
            let share = item.retail().amount() / retail_total.amount();
            Money::new(bundle.flat_price.amount() * share).round_cents()
        };
        remaining = remaining - line_total;

        let unit_price = Money::new(line_total.amount() / Decimal::from(item.quantity.max(1)))
            .round_cents();

        allocated.push(AllocatedItem {
            item: bundle.item_key(item),
            title: item.title.clone(),
            quantity: item.quantity,
            line_total,
            unit_price,
        });
    }

    allocated
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the bundle aggregate
#[derive(Clone)]
pub struct BundleEnvironment {
    /// Clock for lifecycle timestamps
    pub clock: Arc<dyn Clock>,
}

impl BundleEnvironment {
    /// Creates a new `BundleEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the bundle aggregate
#[derive(Clone, Debug, Default)]
pub struct BundleReducer;

impl BundleReducer {
    /// Creates a new `BundleReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_create(bundle: &Bundle) -> Result<(), BundleError> {
        if bundle.items.is_empty() {
            return Err(BundleError::NoItems);
        }
        if bundle.items.iter().any(|item| item.quantity == 0) {
            return Err(BundleError::InvalidQuantity);
        }
        Ok(())
    }

    fn require_active(state: &BundleState, id: &BundleId) -> Result<(), BundleError> {
        let bundle = state.get(id).ok_or(BundleError::NotFound(*id))?;
        if bundle.status == BundleStatus::Active {
            Ok(())
        } else {
            Err(BundleError::NotActive {
                id: *id,
                status: bundle.status,
            })
        }
    }

    fn apply_event(state: &mut BundleState, action: &BundleAction) {
        match action {
            BundleAction::BundleCreated { bundle } => {
                state.bundles.insert(bundle.id, bundle.clone());
                state.last_error = None;
            }

            BundleAction::BundlePurchased { id, purchaser } => {
                if let Some(bundle) = state.bundles.get_mut(id) {
                    bundle.status = BundleStatus::Purchased;
                    bundle.purchased_by = Some(purchaser.clone());
                }
                state.last_error = None;
            }

            BundleAction::BundleExpired { id } => {
                if let Some(bundle) = state.bundles.get_mut(id) {
                    bundle.status = BundleStatus::Expired;
                }
                state.last_error = None;
            }

            BundleAction::BundleRemoved { id } => {
                state.bundles.remove(id);
                state.last_error = None;
            }

            BundleAction::ValidationFailed { error } => {
                state.last_error = Some(error.clone());
            }

            // Commands don't modify state
            BundleAction::CreateBundle { .. }
            | BundleAction::MarkPurchased { .. }
            | BundleAction::ExpireBundle { .. }
            | BundleAction::RemoveBundle { .. } => {}
        }
    }
}

impl Reducer for BundleReducer {
    type State = BundleState;
    type Action = BundleAction;
    type Environment = BundleEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            BundleAction::CreateBundle { bundle } => {
                match Self::validate_create(&bundle) {
                    Ok(()) => Self::apply_event(state, &BundleAction::BundleCreated { bundle }),
                    Err(error) => {
                        Self::apply_event(state, &BundleAction::ValidationFailed { error });
                    }
                }
                SmallVec::new()
            }

            BundleAction::MarkPurchased { id, purchaser } => {
                match Self::require_active(state, &id) {
                    Ok(()) => {
                        Self::apply_event(state, &BundleAction::BundlePurchased { id, purchaser });
                    }
                    Err(error) => {
                        Self::apply_event(state, &BundleAction::ValidationFailed { error });
                    }
                }
                SmallVec::new()
            }

            BundleAction::ExpireBundle { id } => {
                match Self::require_active(state, &id) {
                    Ok(()) => Self::apply_event(state, &BundleAction::BundleExpired { id }),
                    Err(error) => {
                        Self::apply_event(state, &BundleAction::ValidationFailed { error });
                    }
                }
                SmallVec::new()
            }

            BundleAction::RemoveBundle { id } => {
                if state.get(&id).is_some() {
                    Self::apply_event(state, &BundleAction::BundleRemoved { id });
                } else {
                    Self::apply_event(
                        state,
                        &BundleAction::ValidationFailed {
                            error: BundleError::NotFound(id),
                        },
                    );
                }
                SmallVec::new()
            }

            event => {
                Self::apply_event(state, &event);
                SmallVec::new()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{BundleItem, DeliveryMode};
    use adspace_testing::{ReducerTest, test_clock};
    use chrono::Duration;

    fn test_env() -> BundleEnvironment {
        BundleEnvironment::new(Arc::new(test_clock()))
    }

    fn bundle(items: Vec<BundleItem>, flat_price: Money) -> Bundle {
        let now = test_clock().now();
        Bundle {
            id: BundleId::new(),
            name: "Western pack".to_string(),
            description: "Two-state special".to_string(),
            region: "MT".to_string(),
            items,
            flat_price,
            status: BundleStatus::Active,
            delivery: DeliveryMode::ShareableLink,
            access_token: "tok_abc".to_string(),
            purchased_by: None,
            expires_at: now + Duration::hours(24),
            reservation_ids: Vec::new(),
            created_at: now,
        }
    }

    fn item(variant: &str, quantity: u32, unit_price: i64) -> BundleItem {
        BundleItem {
            variant: variant.to_string(),
            title: format!("{variant} page"),
            quantity,
            unit_price: Money::from_major(unit_price),
        }
    }

    #[test]
    fn create_records_active_bundle() {
        let b = bundle(vec![item("full", 1, 700)], Money::from_major(500));
        let id = b.id;

        ReducerTest::new(BundleReducer::new())
            .with_env(test_env())
            .given_state(BundleState::new())
            .when_action(BundleAction::CreateBundle { bundle: b })
            .then_state(move |state| {
                assert_eq!(state.get(&id).unwrap().status, BundleStatus::Active);
            })
            .run();
    }

    #[test]
    fn create_rejects_empty_item_list() {
        let b = bundle(Vec::new(), Money::from_major(500));

        ReducerTest::new(BundleReducer::new())
            .with_env(test_env())
            .given_state(BundleState::new())
            .when_action(BundleAction::CreateBundle { bundle: b })
            .then_state(|state| {
                assert_eq!(state.count(), 0);
                assert_eq!(state.last_error, Some(BundleError::NoItems));
            })
            .run();
    }

    #[test]
    fn purchase_is_terminal_and_records_purchaser() {
        let b = bundle(vec![item("full", 1, 700)], Money::from_major(500));
        let id = b.id;
        let mut state = BundleState::new();
        state.bundles.insert(id, b);

        ReducerTest::new(BundleReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(BundleAction::MarkPurchased {
                id,
                purchaser: HolderId::new("buyer-9"),
            })
            .then_state(move |state| {
                let bundle = state.get(&id).unwrap();
                assert_eq!(bundle.status, BundleStatus::Purchased);
                assert_eq!(bundle.purchased_by, Some(HolderId::new("buyer-9")));
            })
            .run();
    }

    #[test]
    fn purchased_bundle_cannot_expire() {
        let b = bundle(vec![item("full", 1, 700)], Money::from_major(500));
        let id = b.id;
        let mut state = BundleState::new();
        let mut b = b;
        b.status = BundleStatus::Purchased;
        state.bundles.insert(id, b);

        ReducerTest::new(BundleReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(BundleAction::ExpireBundle { id })
            .then_state(move |state| {
                assert_eq!(state.get(&id).unwrap().status, BundleStatus::Purchased);
                assert!(matches!(
                    state.last_error,
                    Some(BundleError::NotActive { .. })
                ));
            })
            .run();
    }

    #[test]
    fn find_by_token_matches_access_token() {
        let b = bundle(vec![item("full", 1, 700)], Money::from_major(500));
        let id = b.id;
        let mut state = BundleState::new();
        state.bundles.insert(id, b);

        assert_eq!(state.find_by_token("tok_abc").unwrap().id, id);
        assert!(state.find_by_token("tok_other").is_none());
    }

    #[test]
    fn allocation_is_proportional_to_retail_share() {
        // Retail $1000 = $700 + $300; flat price $500 allocates $350/$150
        let b = bundle(
            vec![item("full", 1, 700), item("quarter", 1, 300)],
            Money::from_major(500),
        );

        let allocated = allocate_bundle_prices(&b);
        assert_eq!(allocated.len(), 2);
        assert_eq!(allocated[0].line_total, Money::from_major(350));
        assert_eq!(allocated[1].line_total, Money::from_major(150));
    }

    #[test]
    fn allocation_line_totals_reconcile_to_flat_price() {
        // Thirds do not split evenly at cent precision; the last line
        // absorbs the remainder
        let b = bundle(
            vec![
                item("full", 1, 100),
                item("half", 1, 100),
                item("quarter", 1, 100),
            ],
            Money::from_major(100),
        );

        let allocated = allocate_bundle_prices(&b);
        let sum: Money = allocated.iter().map(|a| a.line_total).sum();
        assert_eq!(sum, Money::from_major(100));
    }

    #[test]
    fn allocation_of_empty_bundle_is_empty() {
        let b = bundle(Vec::new(), Money::from_major(100));
        assert!(allocate_bundle_prices(&b).is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Whatever the item mix, allocated line totals reconcile to the
            // flat price exactly
            #[test]
            fn allocation_always_reconciles(
                retails in proptest::collection::vec((1i64..2000, 1u32..5), 1..6),
                flat in 1i64..5000,
            ) {
                let items = retails
                    .iter()
                    .enumerate()
                    .map(|(i, (price, quantity))| BundleItem {
                        variant: format!("v{i}"),
                        title: format!("Item {i}"),
                        quantity: *quantity,
                        unit_price: Money::from_major(*price),
                    })
                    .collect();
                let b = bundle(items, Money::from_major(flat));

                let allocated = allocate_bundle_prices(&b);
                let sum: Money = allocated.iter().map(|a| a.line_total).sum();
                prop_assert_eq!(sum, Money::from_major(flat));
            }
        }
    }
}
