//! Order finalizer: the saga that turns a succeeded payment into a durable
//! order.
//!
//! The pipeline per confirmation id is: verify the payment, guard-decrement
//! inventory for every line, complete the backing holds, write the order,
//! then clean up the purchase source (cart or bundle). Each step is driven
//! by an effect whose feedback action advances the attempt's phase, leaving
//! a step log behind for diagnosis.
//!
//! Idempotency is enforced two ways. The in-memory attempt map refuses a
//! second concurrent run for the same confirmation, and the order store's
//! uniqueness per confirmation id is the durable backstop: a repeated
//! finalize finds the existing order and reports it as completed.
//!
//! When money has moved but fulfillment cannot be applied, the saga never
//! reverses the charge. It records a manual action for an operator and
//! reports the failure honestly.

use crate::checkout::manual::{ManualActionLog, ManualActionRequired};
use crate::inventory::{DecrementOutcome, InventoryStore};
use crate::metrics::record_checkout;
use crate::orders::{OrderStore, OrderStoreError};
use crate::payments::{PaymentProvider, PaymentStatus};
use crate::stores::{BundleStore, CartStore, LedgerStore};
use crate::types::{
    BundleId, BuyerContact, ConfirmationId, HolderId, ItemKey, Order, OrderId, OrderLine,
};
use adspace_core::{
    SmallVec, async_effect, effect::Effect, environment::Clock, reducer::Reducer, smallvec,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

// ============================================================================
// Request and outcome
// ============================================================================

/// Where the purchased lines came from, and what to clean up on success
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckoutSource {
    /// Lines came from the holder's cart; the cart is cleared on success
    Cart,
    /// Lines came from a bundle; the bundle is marked purchased on success
    Bundle {
        /// The bundle being bought
        bundle_id: BundleId,
    },
    /// Lines rode along on the payment metadata; nothing to clean up
    Direct,
}

/// One finalize request: a confirmation id plus the resolved line snapshot
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Payment confirmation to settle (idempotency key)
    pub confirmation_id: ConfirmationId,
    /// Purchasing holder
    pub holder: HolderId,
    /// Contact fallback when the payment metadata carries none
    pub contact: Option<BuyerContact>,
    /// Resolved lines, each bound to its backing hold
    pub lines: Vec<OrderLine>,
    /// Purchase source
    pub source: CheckoutSource,
}

/// Terminal result of one finalize run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckoutOutcome {
    /// An order exists for this confirmation
    Completed {
        /// The order
        order_id: OrderId,
    },
    /// The payment has not succeeded; nothing was committed
    PaymentNotSucceeded {
        /// Status the provider reported
        status: PaymentStatus,
    },
    /// The payment succeeded but fulfillment could not be applied.
    /// A manual action was recorded; the charge was not reversed.
    FulfillmentFailed,
}

/// Failures that prevent a finalize run from reaching a terminal outcome
#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    /// Another run for the same confirmation is in flight
    #[error("checkout for confirmation {0} is already in progress")]
    InProgress(ConfirmationId),

    /// A port was unreachable; the run can be retried
    #[error("checkout step failed: {0}")]
    Unavailable(String),
}

// ============================================================================
// Actions
// ============================================================================

/// Actions driving the finalizer saga
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CheckoutAction {
    // Commands
    /// Start (or replay) a finalize run for a confirmation
    Begin {
        /// The request
        request: CheckoutRequest,
    },

    // Events (feedback from effects)
    /// An order for this confirmation already exists
    AlreadyRecorded {
        /// The confirmation
        confirmation_id: ConfirmationId,
        /// The existing order
        order_id: OrderId,
    },

    /// The provider reported the payment as succeeded
    PaymentVerified {
        /// The confirmation
        confirmation_id: ConfirmationId,
        /// Contact captured by the payment page, when present
        contact: Option<BuyerContact>,
    },

    /// The provider reported a non-succeeded status
    PaymentNotSucceeded {
        /// The confirmation
        confirmation_id: ConfirmationId,
        /// The reported status
        status: PaymentStatus,
    },

    /// Every line's guarded decrement applied
    InventoryCommitted {
        /// The confirmation
        confirmation_id: ConfirmationId,
    },

    /// One or more guarded decrements failed after payment
    FulfillmentFaulted {
        /// The confirmation
        confirmation_id: ConfirmationId,
        /// Items that could not be committed
        items: Vec<ItemKey>,
        /// Per-line failure descriptions
        failures: Vec<String>,
    },

    /// The order was written (or found) for this confirmation
    OrderRecorded {
        /// The confirmation
        confirmation_id: ConfirmationId,
        /// The order
        order_id: OrderId,
    },

    /// A port failed; the run stops and may be retried
    StepFaulted {
        /// The confirmation
        confirmation_id: ConfirmationId,
        /// What failed
        reason: String,
    },
}

// ============================================================================
// State
// ============================================================================

/// Phase of one finalize attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckoutPhase {
    /// Checking the provider and the duplicate-order backstop
    VerifyingPayment,
    /// Fanning out guarded decrements
    CommittingInventory,
    /// Completing holds and writing the order
    RecordingOrder,
    /// Terminal: an order exists
    Completed {
        /// The order
        order_id: OrderId,
    },
    /// Terminal: the payment had not succeeded
    Rejected {
        /// Status the provider reported
        status: PaymentStatus,
    },
    /// Terminal: paid but unfulfillable; manual action recorded
    FulfillmentFailed,
    /// Terminal for this run: a port failed. A new `Begin` restarts it.
    Faulted {
        /// What failed
        reason: String,
    },
}

/// One entry in an attempt's step log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name
    pub step: String,
    /// When the step was recorded
    pub at: DateTime<Utc>,
}

/// One finalize attempt, keyed by confirmation id
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutAttempt {
    /// The request being settled
    pub request: CheckoutRequest,
    /// Current phase
    pub phase: CheckoutPhase,
    /// Contact from the payment metadata, once verified
    pub contact: Option<BuyerContact>,
    /// Ordered step log for diagnosis
    pub steps: Vec<StepRecord>,
    /// When the attempt started
    pub started_at: DateTime<Utc>,
}

impl CheckoutAttempt {
    fn log(&mut self, step: &str, at: DateTime<Utc>) {
        self.steps.push(StepRecord {
            step: step.to_string(),
            at,
        });
    }

    /// Contact for the order: payment metadata first, request fallback second
    fn resolved_contact(&self) -> BuyerContact {
        self.contact
            .clone()
            .or_else(|| self.request.contact.clone())
            .unwrap_or_else(|| {
                tracing::warn!(
                    confirmation_id = %self.request.confirmation_id,
                    "No buyer contact on payment metadata or request"
                );
                BuyerContact {
                    email: String::new(),
                    name: String::new(),
                    phone: None,
                }
            })
    }
}

/// State for the finalizer saga
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckoutState {
    /// All attempts indexed by confirmation id
    pub attempts: HashMap<ConfirmationId, CheckoutAttempt>,
}

impl CheckoutState {
    /// Creates a new empty `CheckoutState`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets an attempt by confirmation id
    #[must_use]
    pub fn get(&self, confirmation_id: &ConfirmationId) -> Option<&CheckoutAttempt> {
        self.attempts.get(confirmation_id)
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the finalizer
#[derive(Clone)]
pub struct CheckoutEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Payment provider port
    pub payments: Arc<dyn PaymentProvider>,
    /// Authoritative inventory counters
    pub inventory: Arc<dyn InventoryStore>,
    /// Durable order record
    pub orders: Arc<dyn OrderStore>,
    /// Reservation ledger
    pub ledger: LedgerStore,
    /// Per-holder carts
    pub cart: CartStore,
    /// Curated bundles
    pub bundles: BundleStore,
    /// Operator escape hatch
    pub manual_actions: Arc<ManualActionLog>,
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the finalizer saga
#[derive(Clone, Debug, Default)]
pub struct CheckoutReducer;

impl CheckoutReducer {
    /// Creates a new `CheckoutReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn verify_effect(
        env: &CheckoutEnvironment,
        confirmation_id: ConfirmationId,
    ) -> Effect<CheckoutAction> {
        let orders = Arc::clone(&env.orders);
        let payments = Arc::clone(&env.payments);
        async_effect! {
            // Durable idempotency backstop first: a finished prior run means
            // this one is a replay
            match orders.find_by_confirmation(&confirmation_id).await {
                Ok(Some(order)) => {
                    return Some(CheckoutAction::AlreadyRecorded {
                        confirmation_id,
                        order_id: order.id,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    return Some(CheckoutAction::StepFaulted {
                        confirmation_id,
                        reason: e.to_string(),
                    });
                }
            }

            match payments.retrieve_payment(&confirmation_id).await {
                Ok(confirmation) if confirmation.status == PaymentStatus::Succeeded => {
                    Some(CheckoutAction::PaymentVerified {
                        confirmation_id,
                        contact: confirmation.metadata.contact,
                    })
                }
                Ok(confirmation) => Some(CheckoutAction::PaymentNotSucceeded {
                    confirmation_id,
                    status: confirmation.status,
                }),
                Err(e) => Some(CheckoutAction::StepFaulted {
                    confirmation_id,
                    reason: e.to_string(),
                }),
            }
        }
    }

    fn commit_effect(
        env: &CheckoutEnvironment,
        confirmation_id: ConfirmationId,
        lines: Vec<OrderLine>,
    ) -> Effect<CheckoutAction> {
        let inventory = Arc::clone(&env.inventory);
        async_effect! {
            // All lines decrement concurrently; failures are collected, not
            // short-circuited, so the manual-action record names every
            // uncommitted item
            let results = join_all(lines.iter().map(|line| {
                let inventory = Arc::clone(&inventory);
                async move {
                    (
                        line.clone(),
                        inventory.guarded_decrement(&line.item, line.quantity).await,
                    )
                }
            }))
            .await;

            let mut items = Vec::new();
            let mut failures = Vec::new();
            for (line, result) in results {
                match result {
                    Ok(DecrementOutcome::Applied { .. }) => {}
                    Ok(DecrementOutcome::Insufficient { current }) => {
                        items.push(line.item.clone());
                        failures.push(format!(
                            "{}: wanted {}, only {current} left",
                            line.item, line.quantity
                        ));
                    }
                    Err(e) => {
                        items.push(line.item.clone());
                        failures.push(format!("{}: {e}", line.item));
                    }
                }
            }

            if failures.is_empty() {
                Some(CheckoutAction::InventoryCommitted { confirmation_id })
            } else {
                Some(CheckoutAction::FulfillmentFaulted {
                    confirmation_id,
                    items,
                    failures,
                })
            }
        }
    }

    fn record_effect(
        env: &CheckoutEnvironment,
        attempt: &CheckoutAttempt,
    ) -> Effect<CheckoutAction> {
        let ledger = env.ledger.clone();
        let orders = Arc::clone(&env.orders);
        let cart = env.cart.clone();
        let bundles = env.bundles.clone();
        let manual_actions = Arc::clone(&env.manual_actions);
        let clock = Arc::clone(&env.clock);
        let request = attempt.request.clone();
        let contact = attempt.resolved_contact();
        async_effect! {
            let confirmation_id = request.confirmation_id.clone();

            // Inventory is already committed; a hold in a bad state must not
            // block the paid order
            for line in &request.lines {
                if let Err(e) = ledger.complete(line.reservation_id).await {
                    tracing::warn!(
                        confirmation_id = %confirmation_id,
                        reservation_id = %line.reservation_id,
                        error = %e,
                        "Hold could not be completed at finalize"
                    );
                }
            }

            let now = clock.now();
            let order = Order::new(
                OrderId::new(),
                confirmation_id.clone(),
                request.holder.clone(),
                contact,
                request.lines.clone(),
                now,
            );
            let order_id = order.id;

            match orders.insert_new(order).await {
                Ok(()) => {
                    match &request.source {
                        CheckoutSource::Cart => {
                            cart.clear(request.holder.clone()).await;
                        }
                        CheckoutSource::Bundle { bundle_id } => {
                            if let Err(e) = bundles
                                .mark_purchased(*bundle_id, request.holder.clone())
                                .await
                            {
                                tracing::warn!(
                                    confirmation_id = %confirmation_id,
                                    bundle_id = %bundle_id,
                                    error = %e,
                                    "Bundle could not be marked purchased"
                                );
                            }
                        }
                        CheckoutSource::Direct => {}
                    }
                    Some(CheckoutAction::OrderRecorded {
                        confirmation_id,
                        order_id,
                    })
                }
                // Lost the race to a concurrent run; its order wins
                Err(OrderStoreError::DuplicateConfirmation(_)) => {
                    match orders.find_by_confirmation(&confirmation_id).await {
                        Ok(Some(existing)) => Some(CheckoutAction::OrderRecorded {
                            confirmation_id,
                            order_id: existing.id,
                        }),
                        Ok(None) | Err(_) => Some(CheckoutAction::StepFaulted {
                            confirmation_id,
                            reason: "duplicate order detected but not readable".to_string(),
                        }),
                    }
                }
                Err(e) => {
                    // Inventory is decremented and the payment stands; this
                    // is operator territory
                    manual_actions
                        .record(ManualActionRequired {
                            confirmation_id: confirmation_id.clone(),
                            holder: request.holder.clone(),
                            items: request.lines.iter().map(|l| l.item.clone()).collect(),
                            reason: format!("order write failed after commit: {e}"),
                            recorded_at: now,
                        })
                        .await;
                    Some(CheckoutAction::StepFaulted {
                        confirmation_id,
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    fn manual_action_effect(
        env: &CheckoutEnvironment,
        confirmation_id: ConfirmationId,
        holder: HolderId,
        items: Vec<ItemKey>,
        failures: Vec<String>,
    ) -> Effect<CheckoutAction> {
        let manual_actions = Arc::clone(&env.manual_actions);
        let clock = Arc::clone(&env.clock);
        async_effect! {
            manual_actions
                .record(ManualActionRequired {
                    confirmation_id,
                    holder,
                    items,
                    reason: failures.join("; "),
                    recorded_at: clock.now(),
                })
                .await;
            None
        }
    }
}

impl Reducer for CheckoutReducer {
    type State = CheckoutState;
    type Action = CheckoutAction;
    type Environment = CheckoutEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let now = env.clock.now();
        match action {
            CheckoutAction::Begin { request } => {
                let confirmation_id = request.confirmation_id.clone();
                match state.attempts.get(&confirmation_id).map(|a| &a.phase) {
                    // A faulted run restarts; anything else stands
                    None | Some(CheckoutPhase::Faulted { .. }) => {}
                    Some(_) => return SmallVec::new(),
                }

                let mut attempt = CheckoutAttempt {
                    request,
                    phase: CheckoutPhase::VerifyingPayment,
                    contact: None,
                    steps: Vec::new(),
                    started_at: now,
                };
                attempt.log("started", now);
                state.attempts.insert(confirmation_id.clone(), attempt);
                smallvec![Self::verify_effect(env, confirmation_id)]
            }

            CheckoutAction::AlreadyRecorded {
                confirmation_id,
                order_id,
            } => {
                if let Some(attempt) = state.attempts.get_mut(&confirmation_id) {
                    attempt.log("already_recorded", now);
                    attempt.phase = CheckoutPhase::Completed { order_id };
                }
                SmallVec::new()
            }

            CheckoutAction::PaymentVerified {
                confirmation_id,
                contact,
            } => {
                let Some(attempt) = state.attempts.get_mut(&confirmation_id) else {
                    return SmallVec::new();
                };
                attempt.contact = contact;
                attempt.log("payment_verified", now);
                attempt.phase = CheckoutPhase::CommittingInventory;
                let lines = attempt.request.lines.clone();
                smallvec![Self::commit_effect(env, confirmation_id, lines)]
            }

            CheckoutAction::PaymentNotSucceeded {
                confirmation_id,
                status,
            } => {
                if let Some(attempt) = state.attempts.get_mut(&confirmation_id) {
                    attempt.log("payment_not_succeeded", now);
                    attempt.phase = CheckoutPhase::Rejected { status };
                }
                SmallVec::new()
            }

            CheckoutAction::InventoryCommitted { confirmation_id } => {
                let Some(attempt) = state.attempts.get_mut(&confirmation_id) else {
                    return SmallVec::new();
                };
                attempt.log("inventory_committed", now);
                attempt.phase = CheckoutPhase::RecordingOrder;
                let effect = Self::record_effect(env, attempt);
                smallvec![effect]
            }

            CheckoutAction::FulfillmentFaulted {
                confirmation_id,
                items,
                failures,
            } => {
                let Some(attempt) = state.attempts.get_mut(&confirmation_id) else {
                    return SmallVec::new();
                };
                attempt.log("fulfillment_faulted", now);
                attempt.phase = CheckoutPhase::FulfillmentFailed;
                let holder = attempt.request.holder.clone();
                smallvec![Self::manual_action_effect(
                    env,
                    confirmation_id,
                    holder,
                    items,
                    failures
                )]
            }

            CheckoutAction::OrderRecorded {
                confirmation_id,
                order_id,
            } => {
                if let Some(attempt) = state.attempts.get_mut(&confirmation_id) {
                    attempt.log("order_recorded", now);
                    attempt.phase = CheckoutPhase::Completed { order_id };
                }
                SmallVec::new()
            }

            CheckoutAction::StepFaulted {
                confirmation_id,
                reason,
            } => {
                if let Some(attempt) = state.attempts.get_mut(&confirmation_id) {
                    attempt.log("step_faulted", now);
                    attempt.phase = CheckoutPhase::Faulted { reason };
                }
                SmallVec::new()
            }
        }
    }
}

// ============================================================================
// Store (drive loop)
// ============================================================================

/// Store driving finalize attempts to a terminal phase
#[derive(Clone)]
pub struct CheckoutStore {
    state: Arc<RwLock<CheckoutState>>,
    reducer: CheckoutReducer,
    env: CheckoutEnvironment,
}

impl CheckoutStore {
    /// Creates a new store with empty state
    #[must_use]
    pub fn new(env: CheckoutEnvironment) -> Self {
        Self {
            state: Arc::new(RwLock::new(CheckoutState::new())),
            reducer: CheckoutReducer::new(),
            env,
        }
    }

    async fn dispatch(&self, action: CheckoutAction) -> SmallVec<[Effect<CheckoutAction>; 4]> {
        let mut state = self.state.write().await;
        self.reducer.reduce(&mut state, action, &self.env)
    }

    /// Drive one finalize run to its terminal phase.
    ///
    /// Safe to call repeatedly for the same confirmation: a finished run
    /// replays its outcome, and a concurrent run is refused.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::InProgress`] when another run holds the
    /// confirmation, or [`CheckoutError::Unavailable`] when a port failed.
    pub async fn finalize(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let confirmation_id = request.confirmation_id.clone();
        let started = std::time::Instant::now();

        let mut pending = vec![CheckoutAction::Begin { request }];
        while let Some(action) = pending.pop() {
            let effects = self.dispatch(action).await;
            let mut stack: Vec<Effect<CheckoutAction>> = effects.into_iter().collect();
            while let Some(effect) = stack.pop() {
                match effect {
                    Effect::None => {}
                    Effect::Parallel(more) | Effect::Sequential(more) => stack.extend(more),
                    Effect::Delay { duration, action } => {
                        tokio::time::sleep(duration).await;
                        pending.push(*action);
                    }
                    Effect::Future(future) => {
                        if let Some(next) = future.await {
                            pending.push(next);
                        }
                    }
                }
            }
        }

        let phase = self
            .state
            .read()
            .await
            .get(&confirmation_id)
            .map(|attempt| attempt.phase.clone());
        let elapsed = started.elapsed().as_secs_f64();

        match phase {
            Some(CheckoutPhase::Completed { order_id }) => {
                record_checkout("completed", elapsed);
                tracing::info!(
                    confirmation_id = %confirmation_id,
                    order_id = %order_id,
                    "Checkout completed"
                );
                Ok(CheckoutOutcome::Completed { order_id })
            }
            Some(CheckoutPhase::Rejected { status }) => {
                record_checkout("rejected", elapsed);
                Ok(CheckoutOutcome::PaymentNotSucceeded { status })
            }
            Some(CheckoutPhase::FulfillmentFailed) => {
                record_checkout("fulfillment_failed", elapsed);
                Ok(CheckoutOutcome::FulfillmentFailed)
            }
            Some(CheckoutPhase::Faulted { reason }) => Err(CheckoutError::Unavailable(reason)),
            Some(_) => Err(CheckoutError::InProgress(confirmation_id)),
            None => Err(CheckoutError::Unavailable(
                "checkout attempt was not recorded".to_string(),
            )),
        }
    }

    /// Snapshot of one attempt's step log, for diagnosis
    pub async fn attempt(&self, confirmation_id: &ConfirmationId) -> Option<CheckoutAttempt> {
        self.state.read().await.get(confirmation_id).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aggregates::{CartEnvironment, LedgerEnvironment};
    use crate::aggregates::bundle::BundleEnvironment;
    use crate::inventory::InMemoryInventoryStore;
    use crate::orders::InMemoryOrderStore;
    use crate::payments::{MockPaymentProvider, PaymentConfirmation, PaymentMetadata};
    use crate::types::{Money, ReservationId, ReservationStatus};
    use adspace_core::environment::Clock;
    use adspace_testing::test_clock;
    use chrono::Duration;

    struct Harness {
        store: CheckoutStore,
        payments: Arc<MockPaymentProvider>,
        inventory: Arc<InMemoryInventoryStore>,
        orders: Arc<InMemoryOrderStore>,
        ledger: LedgerStore,
        cart: CartStore,
        manual_actions: Arc<ManualActionLog>,
    }

    fn harness() -> Harness {
        let clock: Arc<dyn Clock> = Arc::new(test_clock());
        let payments = Arc::new(MockPaymentProvider::new());
        let inventory = Arc::new(InMemoryInventoryStore::new());
        let orders = Arc::new(InMemoryOrderStore::new());
        let ledger = LedgerStore::new(LedgerEnvironment::new(
            Arc::clone(&clock),
            Duration::minutes(15),
        ));
        let cart = CartStore::new(CartEnvironment::new(Arc::clone(&clock)));
        let bundles = BundleStore::new(BundleEnvironment::new(Arc::clone(&clock)));
        let manual_actions = Arc::new(ManualActionLog::new());

        let store = CheckoutStore::new(CheckoutEnvironment {
            clock,
            payments: Arc::clone(&payments) as Arc<dyn PaymentProvider>,
            inventory: Arc::clone(&inventory) as Arc<dyn InventoryStore>,
            orders: Arc::clone(&orders) as Arc<dyn OrderStore>,
            ledger: ledger.clone(),
            cart: cart.clone(),
            bundles,
            manual_actions: Arc::clone(&manual_actions),
        });

        Harness {
            store,
            payments,
            inventory,
            orders,
            ledger,
            cart,
            manual_actions,
        }
    }

    fn contact() -> BuyerContact {
        BuyerContact {
            email: "buyer@example.com".to_string(),
            name: "Buyer".to_string(),
            phone: None,
        }
    }

    async fn register_succeeded(h: &Harness, confirmation: &str, amount: Money) {
        h.payments
            .register(PaymentConfirmation {
                id: ConfirmationId::new(confirmation),
                status: PaymentStatus::Succeeded,
                amount,
                metadata: PaymentMetadata {
                    holder: None,
                    contact: Some(contact()),
                    lines: Vec::new(),
                },
            })
            .await;
    }

    async fn claimed_line(h: &Harness, holder: &HolderId, quantity: u32) -> OrderLine {
        let item = ItemKey::new("MT", "half");
        let reservation_id = h
            .ledger
            .create_reservation(holder.clone(), item.clone(), quantity, None)
            .await
            .unwrap();
        h.cart
            .add_line(
                holder.clone(),
                item.clone(),
                "Half page".to_string(),
                Money::from_major(250),
                quantity,
                reservation_id,
            )
            .await
            .unwrap();
        OrderLine {
            item,
            title: "Half page".to_string(),
            unit_price: Money::from_major(250),
            quantity,
            reservation_id,
        }
    }

    fn request(confirmation: &str, holder: &HolderId, lines: Vec<OrderLine>) -> CheckoutRequest {
        CheckoutRequest {
            confirmation_id: ConfirmationId::new(confirmation),
            holder: holder.clone(),
            contact: None,
            lines,
            source: CheckoutSource::Cart,
        }
    }

    #[tokio::test]
    async fn happy_path_commits_everything() {
        let h = harness();
        let holder = HolderId::new("h1");
        let item = ItemKey::new("MT", "half");
        h.inventory.set_total(&item, 3).await.unwrap();
        register_succeeded(&h, "pi_1", Money::from_major(500)).await;
        let line = claimed_line(&h, &holder, 2).await;
        let reservation_id = line.reservation_id;

        let outcome = h
            .store
            .finalize(request("pi_1", &holder, vec![line]))
            .await
            .unwrap();

        let CheckoutOutcome::Completed { order_id } = outcome else {
            panic!("expected completion, got {outcome:?}");
        };

        // Inventory decremented, hold completed, order written, cart gone
        assert_eq!(h.inventory.total(&item).await.unwrap(), 1);
        assert_eq!(
            h.ledger.get(reservation_id).await.unwrap().status,
            ReservationStatus::Completed
        );
        let order = h.orders.get(&order_id).await.unwrap();
        assert_eq!(order.total, Money::from_major(500));
        assert_eq!(order.contact, contact());
        assert!(h.cart.get(&holder).await.is_none());
        assert!(h.manual_actions.is_empty().await);
    }

    #[tokio::test]
    async fn repeated_finalize_returns_the_same_order() {
        let h = harness();
        let holder = HolderId::new("h1");
        let item = ItemKey::new("MT", "half");
        h.inventory.set_total(&item, 3).await.unwrap();
        register_succeeded(&h, "pi_1", Money::from_major(250)).await;
        let line = claimed_line(&h, &holder, 1).await;

        let first = h
            .store
            .finalize(request("pi_1", &holder, vec![line.clone()]))
            .await
            .unwrap();
        let second = h
            .store
            .finalize(request("pi_1", &holder, vec![line]))
            .await
            .unwrap();

        assert_eq!(first, second);
        // No double decrement
        assert_eq!(h.inventory.total(&item).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn non_succeeded_payment_commits_nothing() {
        let h = harness();
        let holder = HolderId::new("h1");
        let item = ItemKey::new("MT", "half");
        h.inventory.set_total(&item, 3).await.unwrap();
        h.payments
            .register(PaymentConfirmation {
                id: ConfirmationId::new("pi_1"),
                status: PaymentStatus::Processing,
                amount: Money::from_major(250),
                metadata: PaymentMetadata::default(),
            })
            .await;
        let line = claimed_line(&h, &holder, 1).await;
        let reservation_id = line.reservation_id;

        let outcome = h
            .store
            .finalize(request("pi_1", &holder, vec![line]))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CheckoutOutcome::PaymentNotSucceeded {
                status: PaymentStatus::Processing
            }
        );
        assert_eq!(h.inventory.total(&item).await.unwrap(), 3);
        assert_eq!(
            h.ledger.get(reservation_id).await.unwrap().status,
            ReservationStatus::Active
        );
        assert!(h.cart.get(&holder).await.is_some());
    }

    #[tokio::test]
    async fn insufficient_inventory_after_payment_records_manual_action() {
        let h = harness();
        let holder = HolderId::new("h1");
        let item = ItemKey::new("MT", "half");
        // Paid for 2 but only 1 left: the advisory hold did not prevent a
        // concurrent sale elsewhere
        h.inventory.set_total(&item, 1).await.unwrap();
        register_succeeded(&h, "pi_1", Money::from_major(500)).await;
        let line = claimed_line(&h, &holder, 2).await;

        let outcome = h
            .store
            .finalize(request("pi_1", &holder, vec![line]))
            .await
            .unwrap();

        assert_eq!(outcome, CheckoutOutcome::FulfillmentFailed);
        // Nothing decremented, no order written, operator notified
        assert_eq!(h.inventory.total(&item).await.unwrap(), 1);
        assert!(h
            .orders
            .find_by_confirmation(&ConfirmationId::new("pi_1"))
            .await
            .unwrap()
            .is_none());
        let records = h.manual_actions.snapshot().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].items, vec![item]);
    }

    #[tokio::test]
    async fn unknown_confirmation_is_retryable() {
        let h = harness();
        let holder = HolderId::new("h1");
        let item = ItemKey::new("MT", "half");
        h.inventory.set_total(&item, 3).await.unwrap();
        let line = claimed_line(&h, &holder, 1).await;

        let err = h
            .store
            .finalize(request("pi_missing", &holder, vec![line.clone()]))
            .await;
        assert!(matches!(err, Err(CheckoutError::Unavailable(_))));

        // Registering the payment and retrying succeeds
        register_succeeded(&h, "pi_missing", Money::from_major(250)).await;
        let outcome = h
            .store
            .finalize(request("pi_missing", &holder, vec![line]))
            .await
            .unwrap();
        assert!(matches!(outcome, CheckoutOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn step_log_traces_the_happy_path() {
        let h = harness();
        let holder = HolderId::new("h1");
        let item = ItemKey::new("MT", "half");
        h.inventory.set_total(&item, 3).await.unwrap();
        register_succeeded(&h, "pi_1", Money::from_major(250)).await;
        let line = claimed_line(&h, &holder, 1).await;

        h.store
            .finalize(request("pi_1", &holder, vec![line]))
            .await
            .unwrap();

        let attempt = h.store.attempt(&ConfirmationId::new("pi_1")).await.unwrap();
        let steps: Vec<&str> = attempt.steps.iter().map(|s| s.step.as_str()).collect();
        assert_eq!(
            steps,
            vec![
                "started",
                "payment_verified",
                "inventory_committed",
                "order_recorded"
            ]
        );
    }

    #[tokio::test]
    async fn partial_failure_names_only_uncommitted_items() {
        let h = harness();
        let holder = HolderId::new("h1");
        let plenty = ItemKey::new("MT", "half");
        let scarce = ItemKey::new("MT", "full");
        h.inventory.set_total(&plenty, 5).await.unwrap();
        h.inventory.set_total(&scarce, 0).await.unwrap();
        register_succeeded(&h, "pi_1", Money::from_major(950)).await;

        let r1 = h
            .ledger
            .create_reservation(holder.clone(), plenty.clone(), 1, None)
            .await
            .unwrap();
        let r2 = h
            .ledger
            .create_reservation(holder.clone(), scarce.clone(), 1, None)
            .await
            .unwrap();
        let lines = vec![
            OrderLine {
                item: plenty.clone(),
                title: "Half page".to_string(),
                unit_price: Money::from_major(250),
                quantity: 1,
                reservation_id: r1,
            },
            OrderLine {
                item: scarce.clone(),
                title: "Full page".to_string(),
                unit_price: Money::from_major(700),
                quantity: 1,
                reservation_id: r2,
            },
        ];

        let outcome = h
            .store
            .finalize(request("pi_1", &holder, lines))
            .await
            .unwrap();

        assert_eq!(outcome, CheckoutOutcome::FulfillmentFailed);
        let records = h.manual_actions.snapshot().await;
        assert_eq!(records[0].items, vec![scarce]);
        // The committed line stays committed pending operator reconciliation
        assert_eq!(h.inventory.total(&plenty).await.unwrap(), 4);
    }
}
