//! # Adspace Storefront
//!
//! Inventory-reservation and checkout core for a multi-tenant advertising
//! marketplace. Regional publications sell page placements; advertisers
//! claim them into short-lived holds, pay through an external provider,
//! and the order finalizer turns succeeded payments into durable orders
//! without ever overselling.
//!
//! ## Architecture
//!
//! - **Aggregates** ([`aggregates`]): pure reducers for the reservation
//!   ledger, carts, and bundles
//! - **Stores** ([`stores`]): lock-guarded wrappers dispatching actions and
//!   surfacing typed results
//! - **Checkout** ([`checkout`]): the finalizer saga and its manual-action
//!   escape hatch
//! - **Ports** ([`inventory`], [`payments`], [`orders`]): trait seams with
//!   in-memory adapters
//! - **Services** ([`app`]): cross-aggregate orchestration
//! - **HTTP** ([`server`], [`api`]): axum surface
//! - **Sweep** ([`sweep`]): the only actor that cancels stale holds

pub mod aggregates;
pub mod api;
pub mod app;
pub mod checkout;
pub mod config;
pub mod inventory;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod server;
pub mod stores;
pub mod sweep;
pub mod types;
