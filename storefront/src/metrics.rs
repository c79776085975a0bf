//! Business metrics for the storefront.
//!
//! This module provides Prometheus metrics for tracking business operations:
//! - Reservations (created, released, completed, swept)
//! - Checkouts (completed, rejected, fulfillment failures)
//! - Manual-action records emitted by the finalizer
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `adspace_reservations_total{status}` - Total reservations by transition
//! - `adspace_checkouts_total{outcome}` - Finalizer outcomes
//! - `adspace_manual_actions_total` - Manual-action records emitted
//! - `adspace_sweep_released_total` - Holds released by the expiry sweep
//!
//! ## Gauges
//! - `adspace_active_holds` - Current active reservations
//!
//! ## Histograms
//! - `adspace_checkout_duration_seconds` - Finalizer end-to-end latency

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "adspace_reservations_total",
        "Total number of reservation transitions (created, released, completed)"
    );
    describe_gauge!(
        "adspace_active_holds",
        "Current number of active reservations"
    );

    describe_counter!(
        "adspace_checkouts_total",
        "Total finalizer runs by outcome (completed, rejected, fulfillment_failed)"
    );
    describe_histogram!(
        "adspace_checkout_duration_seconds",
        "Time taken to drive one checkout attempt to its terminal state"
    );

    describe_counter!(
        "adspace_manual_actions_total",
        "Manual-action records emitted for out-of-band reconciliation"
    );
    describe_counter!(
        "adspace_sweep_released_total",
        "Stale holds released by the expiry sweep"
    );

    tracing::info!("Business metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a reservation created.
pub fn record_reservation_created(quantity: u32) {
    metrics::counter!("adspace_reservations_total", "status" => "created").increment(1);
    metrics::gauge!("adspace_active_holds").increment(1.0);
    tracing::debug!(quantity, "Recorded reservation_created metric");
}

/// Record a reservation released (cancelled or expired).
pub fn record_reservation_released() {
    metrics::counter!("adspace_reservations_total", "status" => "released").increment(1);
    metrics::gauge!("adspace_active_holds").decrement(1.0);
    tracing::debug!("Recorded reservation_released metric");
}

/// Record a reservation completed at finalize time.
pub fn record_reservation_completed() {
    metrics::counter!("adspace_reservations_total", "status" => "completed").increment(1);
    metrics::gauge!("adspace_active_holds").decrement(1.0);
    tracing::debug!("Recorded reservation_completed metric");
}

/// Record a finished checkout attempt.
///
/// # Arguments
///
/// * `outcome` - "completed", "rejected", or "fulfillment_failed"
/// * `duration_secs` - End-to-end finalizer latency in seconds
pub fn record_checkout(outcome: &'static str, duration_secs: f64) {
    metrics::counter!("adspace_checkouts_total", "outcome" => outcome).increment(1);
    metrics::histogram!("adspace_checkout_duration_seconds").record(duration_secs);
    tracing::debug!(outcome, duration_secs, "Recorded checkout metric");
}

/// Record a manual-action record emitted by the finalizer.
pub fn record_manual_action() {
    metrics::counter!("adspace_manual_actions_total").increment(1);
    tracing::debug!("Recorded manual_action metric");
}

/// Record holds released by one sweep pass.
pub fn record_sweep_released(count: u64) {
    if count > 0 {
        metrics::counter!("adspace_sweep_released_total").increment(count);
    }
    tracing::debug!(count, "Recorded sweep_released metric");
}
