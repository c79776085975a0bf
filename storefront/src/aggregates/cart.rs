//! Cart: per-holder mutable list of claimed items.
//!
//! Each line is bound to a reservation by id only; the cart never owns
//! reservation lifecycle. The cart also never calls the ledger itself: the
//! application service layer sequences "check availability, create or grow
//! the reservation, then touch the cart", keeping the two decoupled.
//!
//! Concurrent adds to the same cart race as last-write-wins on the line
//! list. Accepted limitation for a low-concurrency-per-user resource.

use crate::types::{Cart, CartLine, CartTotals, HolderId, ItemKey, Money, ReservationId};
use adspace_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Typed validation failures from the cart
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CartError {
    /// The holder has no cart
    #[error("no cart for holder {0}")]
    NoCart(HolderId),

    /// The cart has no line for this item
    #[error("no cart line for item {0}")]
    LineNotFound(ItemKey),

    /// Quantity must be a positive integer
    #[error("quantity must be positive")]
    InvalidQuantity,
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the cart
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CartAction {
    // Commands
    /// Add a claimed item. Creates the cart lazily; an existing line for the
    /// same item key grows in place instead of duplicating.
    AddLine {
        /// Cart owner
        holder: HolderId,
        /// Item claimed
        item: ItemKey,
        /// Display title
        title: String,
        /// Unit price
        unit_price: Money,
        /// Units claimed
        quantity: u32,
        /// Hold backing this line
        reservation_id: ReservationId,
    },

    /// Delete the line for an item; errors if absent.
    RemoveLine {
        /// Cart owner
        holder: HolderId,
        /// Item to drop
        item: ItemKey,
    },

    /// Delete the whole cart record.
    Clear {
        /// Cart owner
        holder: HolderId,
    },

    // Events
    /// A line was added or grown
    LineAdded {
        /// Cart owner
        holder: HolderId,
        /// The resulting line
        line: CartLine,
    },

    /// A line was removed
    LineRemoved {
        /// Cart owner
        holder: HolderId,
        /// Item removed
        item: ItemKey,
    },

    /// The cart was deleted
    Cleared {
        /// Cart owner
        holder: HolderId,
    },

    /// Validation failed
    ValidationFailed {
        /// The typed failure
        error: CartError,
    },
}

// ============================================================================
// State
// ============================================================================

/// State for the cart aggregate: one cart per holder
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartState {
    /// All carts indexed by holder
    pub carts: HashMap<HolderId, Cart>,
    /// Last validation error
    pub last_error: Option<CartError>,
}

impl CartState {
    /// Creates a new empty `CartState`
    #[must_use]
    pub fn new() -> Self {
        Self {
            carts: HashMap::new(),
            last_error: None,
        }
    }

    /// Gets a holder's cart
    #[must_use]
    pub fn get(&self, holder: &HolderId) -> Option<&Cart> {
        self.carts.get(holder)
    }

    /// Returns the number of carts
    #[must_use]
    pub fn count(&self) -> usize {
        self.carts.len()
    }
}

impl Default for CartState {
    fn default() -> Self {
        Self::new()
    }
}

/// Totals over a set of cart lines: subtotal = Σ price × quantity,
/// total = subtotal (no tax in this domain), item count = Σ quantity.
#[must_use]
pub fn calculate_cart_totals(lines: &[CartLine]) -> CartTotals {
    let subtotal: Money = lines.iter().map(CartLine::line_total).sum();
    let item_count = lines.iter().map(|line| line.quantity).sum();
    CartTotals {
        subtotal,
        total: subtotal,
        item_count,
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the cart
#[derive(Clone)]
pub struct CartEnvironment {
    /// Clock for created/updated timestamps
    pub clock: Arc<dyn Clock>,
}

impl CartEnvironment {
    /// Creates a new `CartEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the cart
#[derive(Clone, Debug, Default)]
pub struct CartReducer;

impl CartReducer {
    /// Creates a new `CartReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn apply_event(state: &mut CartState, action: &CartAction, now: chrono::DateTime<chrono::Utc>) {
        match action {
            CartAction::LineAdded { holder, line } => {
                let cart = state
                    .carts
                    .entry(holder.clone())
                    .or_insert_with(|| Cart::new(holder.clone(), now));
                if let Some(existing) = cart.lines.iter_mut().find(|l| l.item == line.item) {
                    *existing = line.clone();
                } else {
                    cart.lines.push(line.clone());
                }
                cart.updated_at = now;
                state.last_error = None;
            }

            CartAction::LineRemoved { holder, item } => {
                if let Some(cart) = state.carts.get_mut(holder) {
                    cart.lines.retain(|l| &l.item != item);
                    cart.updated_at = now;
                }
                state.last_error = None;
            }

            CartAction::Cleared { holder } => {
                state.carts.remove(holder);
                state.last_error = None;
            }

            CartAction::ValidationFailed { error } => {
                state.last_error = Some(error.clone());
            }

            // Commands don't modify state
            CartAction::AddLine { .. } | CartAction::RemoveLine { .. } | CartAction::Clear { .. } => {}
        }
    }
}

impl Reducer for CartReducer {
    type State = CartState;
    type Action = CartAction;
    type Environment = CartEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let now = env.clock.now();
        match action {
            CartAction::AddLine {
                holder,
                item,
                title,
                unit_price,
                quantity,
                reservation_id,
            } => {
                if quantity == 0 {
                    Self::apply_event(
                        state,
                        &CartAction::ValidationFailed {
                            error: CartError::InvalidQuantity,
                        },
                        now,
                    );
                    return SmallVec::new();
                }

                // Merge-add: one line per item key, quantity accumulates.
                // The caller has already grown (or replaced) the backing
                // reservation; the line tracks the latest binding.
                let line = match state.get(&holder).and_then(|cart| cart.line_for(&item)) {
                    Some(existing) => CartLine {
                        item,
                        title,
                        unit_price,
                        quantity: existing.quantity + quantity,
                        added_at: existing.added_at,
                        reservation_id,
                    },
                    None => CartLine {
                        item,
                        title,
                        unit_price,
                        quantity,
                        added_at: now,
                        reservation_id,
                    },
                };
                Self::apply_event(state, &CartAction::LineAdded { holder, line }, now);
                SmallVec::new()
            }

            CartAction::RemoveLine { holder, item } => {
                let present = state
                    .get(&holder)
                    .is_some_and(|cart| cart.line_for(&item).is_some());
                if state.get(&holder).is_none() {
                    Self::apply_event(
                        state,
                        &CartAction::ValidationFailed {
                            error: CartError::NoCart(holder),
                        },
                        now,
                    );
                } else if present {
                    Self::apply_event(state, &CartAction::LineRemoved { holder, item }, now);
                } else {
                    Self::apply_event(
                        state,
                        &CartAction::ValidationFailed {
                            error: CartError::LineNotFound(item),
                        },
                        now,
                    );
                }
                SmallVec::new()
            }

            CartAction::Clear { holder } => {
                Self::apply_event(state, &CartAction::Cleared { holder }, now);
                SmallVec::new()
            }

            event => {
                Self::apply_event(state, &event, now);
                SmallVec::new()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use adspace_testing::{ReducerTest, test_clock};

    fn test_env() -> CartEnvironment {
        CartEnvironment::new(Arc::new(test_clock()))
    }

    fn add_action(holder: &HolderId, quantity: u32, reservation_id: ReservationId) -> CartAction {
        CartAction::AddLine {
            holder: holder.clone(),
            item: ItemKey::new("CA", "quarter"),
            title: "Quarter page".to_string(),
            unit_price: Money::from_major(150),
            quantity,
            reservation_id,
        }
    }

    #[test]
    fn add_creates_cart_lazily() {
        let holder = HolderId::new("holder-1");
        let reservation_id = ReservationId::new();

        ReducerTest::new(CartReducer::new())
            .with_env(test_env())
            .given_state(CartState::new())
            .when_action(add_action(&holder, 2, reservation_id))
            .then_state(move |state| {
                let cart = state.get(&holder).unwrap();
                assert_eq!(cart.lines.len(), 1);
                assert_eq!(cart.lines[0].quantity, 2);
                assert_eq!(cart.lines[0].reservation_id, reservation_id);
            })
            .run();
    }

    #[test]
    fn add_same_item_twice_accumulates_one_line() {
        let holder = HolderId::new("holder-1");
        let first = ReservationId::new();
        let second = ReservationId::new();

        let mut state = CartState::new();
        let env = test_env();
        let reducer = CartReducer::new();
        reducer.reduce(&mut state, add_action(&holder, 2, first), &env);
        reducer.reduce(&mut state, add_action(&holder, 3, second), &env);

        let cart = state.get(&holder).unwrap();
        assert_eq!(cart.lines.len(), 1, "one line per item key");
        assert_eq!(cart.lines[0].quantity, 5);
        // Line tracks the latest reservation binding
        assert_eq!(cart.lines[0].reservation_id, second);
    }

    #[test]
    fn remove_missing_line_is_a_typed_error() {
        let holder = HolderId::new("holder-1");

        let mut state = CartState::new();
        let env = test_env();
        let reducer = CartReducer::new();
        reducer.reduce(&mut state, add_action(&holder, 1, ReservationId::new()), &env);

        ReducerTest::new(CartReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(CartAction::RemoveLine {
                holder,
                item: ItemKey::new("CA", "full"),
            })
            .then_state(|state| {
                assert!(matches!(
                    state.last_error,
                    Some(CartError::LineNotFound(_))
                ));
            })
            .run();
    }

    #[test]
    fn remove_without_cart_is_a_typed_error() {
        ReducerTest::new(CartReducer::new())
            .with_env(test_env())
            .given_state(CartState::new())
            .when_action(CartAction::RemoveLine {
                holder: HolderId::new("nobody"),
                item: ItemKey::new("CA", "quarter"),
            })
            .then_state(|state| {
                assert!(matches!(state.last_error, Some(CartError::NoCart(_))));
            })
            .run();
    }

    #[test]
    fn clear_deletes_the_cart_record() {
        let holder = HolderId::new("holder-1");

        let mut state = CartState::new();
        let env = test_env();
        let reducer = CartReducer::new();
        reducer.reduce(&mut state, add_action(&holder, 1, ReservationId::new()), &env);

        ReducerTest::new(CartReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(CartAction::Clear {
                holder: holder.clone(),
            })
            .then_state(move |state| {
                assert!(state.get(&holder).is_none());
            })
            .run();
    }

    #[test]
    fn totals_sum_lines_without_tax() {
        let lines = vec![
            CartLine {
                item: ItemKey::new("CA", "quarter"),
                title: "Quarter page".to_string(),
                unit_price: Money::from_major(150),
                quantity: 2,
                added_at: test_clock().now(),
                reservation_id: ReservationId::new(),
            },
            CartLine {
                item: ItemKey::new("CA", "half"),
                title: "Half page".to_string(),
                unit_price: Money::from_major(250),
                quantity: 1,
                added_at: test_clock().now(),
                reservation_id: ReservationId::new(),
            },
        ];

        let totals = calculate_cart_totals(&lines);
        assert_eq!(totals.subtotal, Money::from_major(550));
        assert_eq!(totals.total, totals.subtotal);
        assert_eq!(totals.item_count, 3);
    }

    #[test]
    fn totals_of_empty_cart_are_zero() {
        let totals = calculate_cart_totals(&[]);
        assert_eq!(totals.subtotal, Money::ZERO);
        assert_eq!(totals.item_count, 0);
    }
}
