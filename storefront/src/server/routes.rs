//! Route table.

use super::{AppState, health};
use crate::api;
use axum::Router;
use axum::routing::{delete, get, post, put};

/// Build the full application router
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .nest("/api", api_router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        // Availability display and admin seeding
        .route(
            "/availability/:region",
            get(api::availability::get_region_availability),
        )
        .route("/admin/inventory", put(api::availability::seed_inventory))
        // Cart
        .route(
            "/cart",
            get(api::cart::get_cart).delete(api::cart::clear_cart),
        )
        .route("/cart/items", post(api::cart::add_item))
        .route(
            "/cart/items/:region/:variant",
            delete(api::cart::remove_item),
        )
        .route("/cart/extend", post(api::cart::extend_cart))
        // Checkout
        .route("/checkout", post(api::checkout::checkout_cart))
        .route("/checkout/direct", post(api::checkout::checkout_direct))
        .route(
            "/admin/manual-actions",
            get(api::checkout::list_manual_actions),
        )
        // Orders and fulfillment
        .route("/orders", get(api::orders::list_orders))
        .route("/orders/:id", get(api::orders::get_order))
        .route("/orders/:id/slots", post(api::orders::submit_slot))
        // Bundles
        .route(
            "/admin/bundles",
            post(api::bundles::create_bundle).get(api::bundles::list_bundles),
        )
        .route("/admin/bundles/:id", delete(api::bundles::delete_bundle))
        .route("/bundles/:token", get(api::bundles::get_bundle_offer))
        .route(
            "/bundles/:token/purchase",
            post(api::bundles::purchase_bundle),
        )
}
