//! App-local stores wrapping the pure reducers.
//!
//! Each store owns its aggregate state behind an `RwLock` and dispatches
//! actions through the reducer while holding the write lock. Typed wrapper
//! methods read `last_error` under the same lock, so the dispatch and its
//! outcome are observed as one atomic step even under concurrent callers.
//!
//! Reducers stay pure; metric recording happens here.

use crate::aggregates::{
    BundleAction, BundleEnvironment, BundleError, BundleReducer, BundleState, CartAction,
    CartEnvironment, CartError, CartReducer, CartState, LedgerAction, LedgerEnvironment,
    LedgerError, LedgerReducer, LedgerState, calculate_cart_totals,
};
use crate::metrics::{
    record_reservation_completed, record_reservation_created, record_reservation_released,
    record_sweep_released,
};
use crate::types::{
    Bundle, BundleId, Cart, CartTotals, HolderId, ItemKey, Money, Reservation, ReservationId,
};
use adspace_core::reducer::Reducer;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

// ============================================================================
// Ledger store
// ============================================================================

/// Store for the reservation ledger
#[derive(Clone)]
pub struct LedgerStore {
    state: Arc<RwLock<LedgerState>>,
    reducer: LedgerReducer,
    env: LedgerEnvironment,
}

impl LedgerStore {
    /// Creates a new store with empty state
    #[must_use]
    pub fn new(env: LedgerEnvironment) -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::new())),
            reducer: LedgerReducer::new(),
            env,
        }
    }

    /// Create an active hold and return its id.
    ///
    /// `expires_at` overrides the default hold window (bundle holds).
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if validation fails.
    pub async fn create_reservation(
        &self,
        holder: HolderId,
        item: ItemKey,
        quantity: u32,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ReservationId, LedgerError> {
        let id = ReservationId::new();
        let mut state = self.state.write().await;
        self.reducer.reduce(
            &mut state,
            LedgerAction::CreateReservation {
                id,
                holder,
                item,
                quantity,
                expires_at,
            },
            &self.env,
        );
        match state.last_error.clone() {
            Some(error) => Err(error),
            None => {
                record_reservation_created(quantity);
                Ok(id)
            }
        }
    }

    /// Release a hold. Idempotent on already-released holds.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if the hold is unknown or completed.
    pub async fn release(&self, id: ReservationId) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        let was_active = state
            .get(&id)
            .is_some_and(|r| r.status == crate::types::ReservationStatus::Active);
        self.reducer
            .reduce(&mut state, LedgerAction::ReleaseReservation { id }, &self.env);
        match state.last_error.clone() {
            Some(error) => Err(error),
            None => {
                if was_active {
                    record_reservation_released();
                }
                Ok(())
            }
        }
    }

    /// Complete a hold after its inventory decrement has been applied.
    /// Idempotent on already-completed holds.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if the hold is unknown or released.
    pub async fn complete(&self, id: ReservationId) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        let was_active = state
            .get(&id)
            .is_some_and(|r| r.status == crate::types::ReservationStatus::Active);
        self.reducer.reduce(
            &mut state,
            LedgerAction::CompleteReservation { id },
            &self.env,
        );
        match state.last_error.clone() {
            Some(error) => Err(error),
            None => {
                if was_active {
                    record_reservation_completed();
                }
                Ok(())
            }
        }
    }

    /// Push a hold's expiry forward and return the new expiry.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if the hold is not active.
    pub async fn extend(
        &self,
        id: ReservationId,
        additional_minutes: i64,
    ) -> Result<DateTime<Utc>, LedgerError> {
        let mut state = self.state.write().await;
        self.reducer.reduce(
            &mut state,
            LedgerAction::ExtendReservation {
                id,
                additional_minutes,
            },
            &self.env,
        );
        match state.last_error.clone() {
            Some(error) => Err(error),
            None => state
                .get(&id)
                .map(|r| r.expires_at)
                .ok_or(LedgerError::NotFound(id)),
        }
    }

    /// Grow an active hold's quantity.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if the hold is not active.
    pub async fn increase_hold(
        &self,
        id: ReservationId,
        additional_quantity: u32,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        self.reducer.reduce(
            &mut state,
            LedgerAction::IncreaseHold {
                id,
                additional_quantity,
            },
            &self.env,
        );
        match state.last_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Release every active hold past its expiry. Returns how many were
    /// swept.
    pub async fn cleanup_expired(&self) -> usize {
        let mut state = self.state.write().await;
        self.reducer
            .reduce(&mut state, LedgerAction::CleanupExpired, &self.env);
        let swept = state.last_swept.len();
        record_sweep_released(swept as u64);
        swept
    }

    /// Snapshot of one reservation
    pub async fn get(&self, id: ReservationId) -> Option<Reservation> {
        self.state.read().await.get(&id).cloned()
    }

    /// Advisory availability: `total` minus active unexpired holds,
    /// floored at zero
    pub async fn available(&self, item: &ItemKey, total: u32) -> u32 {
        let now = self.env.clock.now();
        self.state
            .read()
            .await
            .available_inventory(item, total, now)
    }

    /// Units currently held against an item by active unexpired holds
    pub async fn active_held(&self, item: &ItemKey) -> u64 {
        let now = self.env.clock.now();
        self.state.read().await.active_held_quantity(item, now)
    }
}

// ============================================================================
// Cart store
// ============================================================================

/// Store for per-holder carts
#[derive(Clone)]
pub struct CartStore {
    state: Arc<RwLock<CartState>>,
    reducer: CartReducer,
    env: CartEnvironment,
}

impl CartStore {
    /// Creates a new store with empty state
    #[must_use]
    pub fn new(env: CartEnvironment) -> Self {
        Self {
            state: Arc::new(RwLock::new(CartState::new())),
            reducer: CartReducer::new(),
            env,
        }
    }

    /// Add a claimed line (merge-add on an existing item key).
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if validation fails.
    pub async fn add_line(
        &self,
        holder: HolderId,
        item: ItemKey,
        title: String,
        unit_price: Money,
        quantity: u32,
        reservation_id: ReservationId,
    ) -> Result<Cart, CartError> {
        let mut state = self.state.write().await;
        self.reducer.reduce(
            &mut state,
            CartAction::AddLine {
                holder: holder.clone(),
                item,
                title,
                unit_price,
                quantity,
                reservation_id,
            },
            &self.env,
        );
        match state.last_error.clone() {
            Some(error) => Err(error),
            None => state
                .get(&holder)
                .cloned()
                .ok_or(CartError::NoCart(holder)),
        }
    }

    /// Remove the line for an item.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if the cart or line is missing.
    pub async fn remove_line(&self, holder: HolderId, item: ItemKey) -> Result<(), CartError> {
        let mut state = self.state.write().await;
        self.reducer
            .reduce(&mut state, CartAction::RemoveLine { holder, item }, &self.env);
        match state.last_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Delete the holder's cart record
    pub async fn clear(&self, holder: HolderId) {
        let mut state = self.state.write().await;
        self.reducer
            .reduce(&mut state, CartAction::Clear { holder }, &self.env);
    }

    /// Snapshot of a holder's cart
    pub async fn get(&self, holder: &HolderId) -> Option<Cart> {
        self.state.read().await.get(holder).cloned()
    }

    /// Totals for a holder's cart; zero totals when there is no cart
    pub async fn totals(&self, holder: &HolderId) -> CartTotals {
        let state = self.state.read().await;
        let lines = state.get(holder).map(|cart| cart.lines.as_slice());
        calculate_cart_totals(lines.unwrap_or(&[]))
    }
}

// ============================================================================
// Bundle store
// ============================================================================

/// Store for curated bundles
#[derive(Clone)]
pub struct BundleStore {
    state: Arc<RwLock<BundleState>>,
    reducer: BundleReducer,
    env: BundleEnvironment,
}

impl BundleStore {
    /// Creates a new store with empty state
    #[must_use]
    pub fn new(env: BundleEnvironment) -> Self {
        Self {
            state: Arc::new(RwLock::new(BundleState::new())),
            reducer: BundleReducer::new(),
            env,
        }
    }

    /// Record a new active bundle.
    ///
    /// # Errors
    ///
    /// Returns a [`BundleError`] if validation fails.
    pub async fn create(&self, bundle: Bundle) -> Result<(), BundleError> {
        let mut state = self.state.write().await;
        self.reducer
            .reduce(&mut state, BundleAction::CreateBundle { bundle }, &self.env);
        match state.last_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Mark a bundle purchased by `purchaser`.
    ///
    /// # Errors
    ///
    /// Returns a [`BundleError`] if the bundle is not active.
    pub async fn mark_purchased(
        &self,
        id: BundleId,
        purchaser: HolderId,
    ) -> Result<(), BundleError> {
        let mut state = self.state.write().await;
        self.reducer.reduce(
            &mut state,
            BundleAction::MarkPurchased { id, purchaser },
            &self.env,
        );
        match state.last_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Mark a bundle expired.
    ///
    /// # Errors
    ///
    /// Returns a [`BundleError`] if the bundle is not active.
    pub async fn expire(&self, id: BundleId) -> Result<(), BundleError> {
        let mut state = self.state.write().await;
        self.reducer
            .reduce(&mut state, BundleAction::ExpireBundle { id }, &self.env);
        match state.last_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Remove a bundle record.
    ///
    /// # Errors
    ///
    /// Returns a [`BundleError`] if the bundle is unknown.
    pub async fn remove(&self, id: BundleId) -> Result<(), BundleError> {
        let mut state = self.state.write().await;
        self.reducer
            .reduce(&mut state, BundleAction::RemoveBundle { id }, &self.env);
        match state.last_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Snapshot of one bundle
    pub async fn get(&self, id: BundleId) -> Option<Bundle> {
        self.state.read().await.get(&id).cloned()
    }

    /// Find a bundle by its shareable-link access token
    pub async fn find_by_token(&self, token: &str) -> Option<Bundle> {
        self.state.read().await.find_by_token(token).cloned()
    }

    /// Snapshot of all bundles
    pub async fn list(&self) -> Vec<Bundle> {
        self.state.read().await.bundles.values().cloned().collect()
    }
}
