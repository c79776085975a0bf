//! Availability display and admin inventory seeding.

use crate::app::claims::ItemAvailability;
use crate::server::{AppError, AppState};
use crate::types::ItemKey;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

/// Advisory availability for every item in a region
pub async fn get_region_availability(
    State(state): State<AppState>,
    Path(region): Path<String>,
) -> Result<Json<Vec<ItemAvailability>>, AppError> {
    let availability = state.services.availability(&region).await?;
    Ok(Json(availability))
}

/// Admin request to set an item's total inventory
#[derive(Debug, Deserialize)]
pub struct SeedInventoryRequest {
    /// Region of the item
    pub region: String,
    /// Variant of the item
    pub variant: String,
    /// Total units to carry
    pub total: u32,
}

/// Set an item's total inventory (admin seeding)
pub async fn seed_inventory(
    State(state): State<AppState>,
    Json(request): Json<SeedInventoryRequest>,
) -> Result<StatusCode, AppError> {
    let item = ItemKey::new(&request.region, &request.variant);
    state
        .services
        .inventory
        .set_total(&item, request.total)
        .await
        .map_err(crate::app::StorefrontError::from)?;
    tracing::info!(item = %item, total = request.total, "Inventory seeded");
    Ok(StatusCode::NO_CONTENT)
}
