//! Cart endpoints: claim, drop, clear, extend.

use crate::server::extract::Holder;
use crate::server::{AppError, AppState};
use crate::types::{Cart, CartLine, CartTotals, ItemKey, Money};
use crate::aggregates::calculate_cart_totals;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Cart as rendered to the client
#[derive(Debug, Serialize)]
pub struct CartView {
    /// Current lines
    pub lines: Vec<CartLine>,
    /// Totals over the lines
    pub totals: CartTotals,
}

impl CartView {
    fn from_cart(cart: Option<Cart>) -> Self {
        let lines = cart.map(|cart| cart.lines).unwrap_or_default();
        let totals = calculate_cart_totals(&lines);
        Self { lines, totals }
    }
}

/// Request to claim units of an item into the cart
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    /// Region of the item
    pub region: String,
    /// Variant of the item
    pub variant: String,
    /// Display title for the line
    pub title: String,
    /// Unit price quoted to the buyer
    pub unit_price: Money,
    /// Units to claim
    pub quantity: u32,
}

/// Request to push the cart's holds forward
#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    /// Minutes to add to each active hold's expiry
    pub additional_minutes: i64,
}

/// Current cart for the acting holder
pub async fn get_cart(State(state): State<AppState>, Holder(holder): Holder) -> Json<CartView> {
    let cart = state.services.cart.get(&holder).await;
    Json(CartView::from_cart(cart))
}

/// Claim units of an item: availability gate, hold, cart line
pub async fn add_item(
    State(state): State<AppState>,
    Holder(holder): Holder,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartView>, AppError> {
    let item = ItemKey::new(&request.region, &request.variant);
    let cart = state
        .services
        .claim(
            holder,
            item,
            request.title,
            request.unit_price,
            request.quantity,
        )
        .await?;
    Ok(Json(CartView::from_cart(Some(cart))))
}

/// Drop one item from the cart, releasing its hold
pub async fn remove_item(
    State(state): State<AppState>,
    Holder(holder): Holder,
    Path((region, variant)): Path<(String, String)>,
) -> Result<Json<CartView>, AppError> {
    let item = ItemKey::new(&region, &variant);
    state.services.remove_claim(holder.clone(), item).await?;
    let cart = state.services.cart.get(&holder).await;
    Ok(Json(CartView::from_cart(cart)))
}

/// Drop the whole cart, releasing every hold
pub async fn clear_cart(
    State(state): State<AppState>,
    Holder(holder): Holder,
) -> StatusCode {
    state.services.clear_claims(holder).await;
    StatusCode::NO_CONTENT
}

/// Push every active hold in the cart forward
pub async fn extend_cart(
    State(state): State<AppState>,
    Holder(holder): Holder,
    Json(request): Json<ExtendRequest>,
) -> Result<StatusCode, AppError> {
    state
        .services
        .extend_claims(&holder, request.additional_minutes)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
