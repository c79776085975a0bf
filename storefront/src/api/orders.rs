//! Order endpoints: lookup and fulfillment slot submissions.

use crate::server::extract::Holder;
use crate::server::{AppError, AppState};
use crate::types::{ItemKey, Order, OrderId};
use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

/// Request to record a creative submission against a slot
#[derive(Debug, Deserialize)]
pub struct SlotSubmission {
    /// Region of the line's item
    pub region: String,
    /// Variant of the line's item
    pub variant: String,
    /// Slot position within the line (1-based)
    pub slot_number: u32,
    /// Object-storage reference to the submitted creative
    pub submission_url: String,
}

/// All orders for the acting holder, newest first
pub async fn list_orders(
    State(state): State<AppState>,
    Holder(holder): Holder,
) -> Result<Json<Vec<Order>>, AppError> {
    let orders = state.services.orders_for_holder(&holder).await?;
    Ok(Json(orders))
}

/// One order by id
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.services.order(&OrderId::from_uuid(id)).await?;
    Ok(Json(order))
}

/// Record a creative submission; first one completes the slot, later ones
/// edit it
pub async fn submit_slot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(submission): Json<SlotSubmission>,
) -> Result<Json<Order>, AppError> {
    let item = ItemKey::new(&submission.region, &submission.variant);
    let order = state
        .services
        .submit_slot(
            &OrderId::from_uuid(id),
            &item,
            submission.slot_number,
            submission.submission_url,
        )
        .await?;
    Ok(Json(order))
}
