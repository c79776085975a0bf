//! Reservation ledger: short-lived claims against inventory.
//!
//! The ledger owns reservation lifecycles exclusively. Cart and bundle hold
//! only the reservation id, never a copy of mutable state. Availability is
//! computed here as total inventory minus active unexpired holds, floored at
//! zero, and is advisory only: the guarded inventory decrement at finalize
//! time is the real oversell backstop.
//!
//! Expiry is filtered at read time (`expires_at` checks) and enforced by the
//! periodic cleanup sweep, never inline in the request path.

use crate::types::{HolderId, ItemKey, Reservation, ReservationId, ReservationStatus};
use adspace_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Typed validation failures from the reservation ledger
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LedgerError {
    /// No reservation with this id
    #[error("reservation {0} not found")]
    NotFound(ReservationId),

    /// Quantity must be a positive integer
    #[error("quantity must be positive")]
    InvalidQuantity,

    /// The operation requires an active reservation
    #[error("reservation {id} is {status:?}, not active")]
    NotActive {
        /// The reservation
        id: ReservationId,
        /// Its current terminal status
        status: ReservationStatus,
    },

    /// Completed is terminal; a completed hold cannot be released
    #[error("reservation {0} is completed and cannot be released")]
    AlreadyCompleted(ReservationId),

    /// Released is terminal; a released hold cannot be completed
    #[error("reservation {0} is released and cannot be completed")]
    AlreadyReleased(ReservationId),
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the reservation ledger
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LedgerAction {
    // Commands
    /// Unconditionally insert a new active hold.
    ///
    /// Availability is deliberately NOT checked here; callers check first
    /// via [`LedgerState::available_inventory`]. See the module docs.
    CreateReservation {
        /// Pre-allocated reservation id
        id: ReservationId,
        /// Claiming holder
        holder: HolderId,
        /// Item claimed
        item: ItemKey,
        /// Units claimed
        quantity: u32,
        /// Absolute expiry override (bundle holds); defaults to
        /// now + the environment's hold window
        expires_at: Option<DateTime<Utc>>,
    },

    /// Set status to released. Idempotent on already-released holds.
    ReleaseReservation {
        /// The reservation
        id: ReservationId,
    },

    /// Set status to completed. Called only after the paired inventory
    /// decrement has been durably applied.
    CompleteReservation {
        /// The reservation
        id: ReservationId,
    },

    /// Push the expiry forward; fails if the hold is not active.
    ExtendReservation {
        /// The reservation
        id: ReservationId,
        /// Minutes to add to the current expiry
        additional_minutes: i64,
    },

    /// Grow an active hold's quantity (cart merge-add).
    IncreaseHold {
        /// The reservation
        id: ReservationId,
        /// Units to add
        additional_quantity: u32,
    },

    /// Release every active hold whose expiry has passed. Dispatched by the
    /// periodic sweep, never inline in the request path.
    CleanupExpired,

    // Events
    /// A hold was created
    ReservationCreated {
        /// The new reservation
        reservation: Reservation,
    },

    /// A hold was released
    ReservationReleased {
        /// The reservation
        id: ReservationId,
    },

    /// A hold was completed
    ReservationCompleted {
        /// The reservation
        id: ReservationId,
    },

    /// A hold's expiry moved forward
    ReservationExtended {
        /// The reservation
        id: ReservationId,
        /// The new expiry
        expires_at: DateTime<Utc>,
    },

    /// A hold's quantity grew
    HoldIncreased {
        /// The reservation
        id: ReservationId,
        /// Units added
        additional_quantity: u32,
    },

    /// The sweep released a batch of expired holds
    ExpiredSwept {
        /// Exactly the holds that were active with `expires_at <= now`
        ids: Vec<ReservationId>,
    },

    /// Validation failed
    ValidationFailed {
        /// The typed failure
        error: LedgerError,
    },
}

// ============================================================================
// State
// ============================================================================

/// State for the reservation ledger
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerState {
    /// All reservations indexed by ID
    pub reservations: HashMap<ReservationId, Reservation>,
    /// Last validation error
    pub last_error: Option<LedgerError>,
    /// Holds released by the most recent sweep
    pub last_swept: Vec<ReservationId>,
}

impl LedgerState {
    /// Creates a new empty `LedgerState`
    #[must_use]
    pub fn new() -> Self {
        Self {
            reservations: HashMap::new(),
            last_error: None,
            last_swept: Vec::new(),
        }
    }

    /// Gets a reservation by ID
    #[must_use]
    pub fn get(&self, id: &ReservationId) -> Option<&Reservation> {
        self.reservations.get(id)
    }

    /// Checks if a reservation exists
    #[must_use]
    pub fn exists(&self, id: &ReservationId) -> bool {
        self.reservations.contains_key(id)
    }

    /// Returns the number of reservations
    #[must_use]
    pub fn count(&self) -> usize {
        self.reservations.len()
    }

    /// Units held against an item by active, unexpired reservations
    #[must_use]
    pub fn active_held_quantity(&self, item: &ItemKey, now: DateTime<Utc>) -> u64 {
        self.reservations
            .values()
            .filter(|r| &r.item == item && r.counts_against_availability(now))
            .map(|r| u64::from(r.quantity))
            .sum()
    }

    /// Available inventory: total minus active unexpired holds, floored at
    /// zero. Advisory only; see the module docs.
    #[must_use]
    pub fn available_inventory(&self, item: &ItemKey, total: u32, now: DateTime<Utc>) -> u32 {
        let held = self.active_held_quantity(item, now);
        u32::try_from(u64::from(total).saturating_sub(held)).unwrap_or(0)
    }
}

impl Default for LedgerState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the reservation ledger
#[derive(Clone)]
pub struct LedgerEnvironment {
    /// Clock for expiry arithmetic
    pub clock: Arc<dyn Clock>,
    /// Default hold window for cart adds
    pub default_hold: Duration,
}

impl LedgerEnvironment {
    /// Creates a new `LedgerEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, default_hold: Duration) -> Self {
        Self {
            clock,
            default_hold,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the reservation ledger
#[derive(Clone, Debug, Default)]
pub struct LedgerReducer;

impl LedgerReducer {
    /// Creates a new `LedgerReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_release(
        state: &LedgerState,
        id: &ReservationId,
    ) -> Result<Option<LedgerAction>, LedgerError> {
        let reservation = state.get(id).ok_or(LedgerError::NotFound(*id))?;
        match reservation.status {
            ReservationStatus::Active => Ok(Some(LedgerAction::ReservationReleased { id: *id })),
            // Releasing an already-released hold is an idempotent no-op
            ReservationStatus::Released => Ok(None),
            // Completed is terminal in the other direction; refuse
            ReservationStatus::Completed => Err(LedgerError::AlreadyCompleted(*id)),
        }
    }

    fn validate_complete(
        state: &LedgerState,
        id: &ReservationId,
    ) -> Result<Option<LedgerAction>, LedgerError> {
        let reservation = state.get(id).ok_or(LedgerError::NotFound(*id))?;
        match reservation.status {
            ReservationStatus::Active => Ok(Some(LedgerAction::ReservationCompleted { id: *id })),
            // Completing twice is an idempotent no-op
            ReservationStatus::Completed => Ok(None),
            ReservationStatus::Released => Err(LedgerError::AlreadyReleased(*id)),
        }
    }

    fn require_active(state: &LedgerState, id: &ReservationId) -> Result<(), LedgerError> {
        let reservation = state.get(id).ok_or(LedgerError::NotFound(*id))?;
        if reservation.status == ReservationStatus::Active {
            Ok(())
        } else {
            Err(LedgerError::NotActive {
                id: *id,
                status: reservation.status,
            })
        }
    }

    /// Applies an event to state
    fn apply_event(state: &mut LedgerState, action: &LedgerAction) {
        match action {
            LedgerAction::ReservationCreated { reservation } => {
                state
                    .reservations
                    .insert(reservation.id, reservation.clone());
                state.last_error = None;
            }

            LedgerAction::ReservationReleased { id } => {
                if let Some(reservation) = state.reservations.get_mut(id) {
                    reservation.status = ReservationStatus::Released;
                }
                state.last_error = None;
            }

            LedgerAction::ReservationCompleted { id } => {
                if let Some(reservation) = state.reservations.get_mut(id) {
                    reservation.status = ReservationStatus::Completed;
                }
                state.last_error = None;
            }

            LedgerAction::ReservationExtended { id, expires_at } => {
                if let Some(reservation) = state.reservations.get_mut(id) {
                    reservation.expires_at = *expires_at;
                }
                state.last_error = None;
            }

            LedgerAction::HoldIncreased {
                id,
                additional_quantity,
            } => {
                if let Some(reservation) = state.reservations.get_mut(id) {
                    reservation.quantity += additional_quantity;
                }
                state.last_error = None;
            }

            LedgerAction::ExpiredSwept { ids } => {
                for id in ids {
                    if let Some(reservation) = state.reservations.get_mut(id) {
                        reservation.status = ReservationStatus::Released;
                    }
                }
                state.last_swept.clone_from(ids);
                state.last_error = None;
            }

            LedgerAction::ValidationFailed { error } => {
                state.last_error = Some(error.clone());
            }

            // Commands don't modify state
            LedgerAction::CreateReservation { .. }
            | LedgerAction::ReleaseReservation { .. }
            | LedgerAction::CompleteReservation { .. }
            | LedgerAction::ExtendReservation { .. }
            | LedgerAction::IncreaseHold { .. }
            | LedgerAction::CleanupExpired => {}
        }
    }
}

impl Reducer for LedgerReducer {
    type State = LedgerState;
    type Action = LedgerAction;
    type Environment = LedgerEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            LedgerAction::CreateReservation {
                id,
                holder,
                item,
                quantity,
                expires_at,
            } => {
                if quantity == 0 {
                    Self::apply_event(
                        state,
                        &LedgerAction::ValidationFailed {
                            error: LedgerError::InvalidQuantity,
                        },
                    );
                    return SmallVec::new();
                }

                let now = env.clock.now();
                let expires_at = expires_at.unwrap_or(now + env.default_hold);
                let reservation = Reservation::new(id, holder, item, quantity, now, expires_at);
                Self::apply_event(state, &LedgerAction::ReservationCreated { reservation });
                smallvec![Effect::None]
            }

            LedgerAction::ReleaseReservation { id } => {
                match Self::validate_release(state, &id) {
                    Ok(Some(event)) => Self::apply_event(state, &event),
                    Ok(None) => state.last_error = None,
                    Err(error) => {
                        Self::apply_event(state, &LedgerAction::ValidationFailed { error });
                    }
                }
                SmallVec::new()
            }

            LedgerAction::CompleteReservation { id } => {
                match Self::validate_complete(state, &id) {
                    Ok(Some(event)) => Self::apply_event(state, &event),
                    Ok(None) => state.last_error = None,
                    Err(error) => {
                        Self::apply_event(state, &LedgerAction::ValidationFailed { error });
                    }
                }
                SmallVec::new()
            }

            LedgerAction::ExtendReservation {
                id,
                additional_minutes,
            } => {
                match Self::require_active(state, &id) {
                    Ok(()) => {
                        // require_active guarantees presence
                        let expires_at = state
                            .get(&id)
                            .map(|r| r.expires_at + Duration::minutes(additional_minutes));
                        if let Some(expires_at) = expires_at {
                            Self::apply_event(
                                state,
                                &LedgerAction::ReservationExtended { id, expires_at },
                            );
                        }
                    }
                    Err(error) => {
                        Self::apply_event(state, &LedgerAction::ValidationFailed { error });
                    }
                }
                SmallVec::new()
            }

            LedgerAction::IncreaseHold {
                id,
                additional_quantity,
            } => {
                if additional_quantity == 0 {
                    Self::apply_event(
                        state,
                        &LedgerAction::ValidationFailed {
                            error: LedgerError::InvalidQuantity,
                        },
                    );
                    return SmallVec::new();
                }
                match Self::require_active(state, &id) {
                    Ok(()) => Self::apply_event(
                        state,
                        &LedgerAction::HoldIncreased {
                            id,
                            additional_quantity,
                        },
                    ),
                    Err(error) => {
                        Self::apply_event(state, &LedgerAction::ValidationFailed { error });
                    }
                }
                SmallVec::new()
            }

            LedgerAction::CleanupExpired => {
                let now = env.clock.now();
                let ids: Vec<ReservationId> = state
                    .reservations
                    .values()
                    .filter(|r| r.status == ReservationStatus::Active && r.is_expired(now))
                    .map(|r| r.id)
                    .collect();
                Self::apply_event(state, &LedgerAction::ExpiredSwept { ids });
                SmallVec::new()
            }

            // Events (replayed or dispatched directly)
            event => {
                Self::apply_event(state, &event);
                SmallVec::new()
            }
        }
    }
}
