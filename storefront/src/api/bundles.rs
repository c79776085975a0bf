//! Bundle endpoints: admin curation and the public offer page.

use crate::app::bundles::NewBundle;
use crate::server::extract::Holder;
use crate::server::{AppError, AppState};
use crate::types::{Bundle, BundleId, BundleItem, BuyerContact, ConfirmationId, Money};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The offer page view of a bundle; purchaser identity stays internal
#[derive(Debug, Serialize)]
pub struct BundleOffer {
    /// Display name
    pub name: String,
    /// Description shown on the offer page
    pub description: String,
    /// Region the items belong to
    pub region: String,
    /// Constituent items
    pub items: Vec<BundleItem>,
    /// Flat price for the whole bundle
    pub flat_price: Money,
    /// Sum of constituent retail prices, for the savings pitch
    pub retail_value: Money,
    /// When the offer lapses
    pub expires_at: DateTime<Utc>,
}

impl From<Bundle> for BundleOffer {
    fn from(bundle: Bundle) -> Self {
        let retail_value = bundle.retail_value();
        Self {
            name: bundle.name,
            description: bundle.description,
            region: bundle.region,
            items: bundle.items,
            flat_price: bundle.flat_price,
            retail_value,
            expires_at: bundle.expires_at,
        }
    }
}

/// Request to purchase a bundle
#[derive(Debug, Deserialize)]
pub struct PurchaseBundleBody {
    /// Provider-issued confirmation id
    pub confirmation_id: ConfirmationId,
    /// Contact fallback when the payment metadata carries none
    pub contact: Option<BuyerContact>,
}

/// Create a bundle with its per-item holds (admin)
pub async fn create_bundle(
    State(state): State<AppState>,
    Json(spec): Json<NewBundle>,
) -> Result<(StatusCode, Json<Bundle>), AppError> {
    let bundle = state.services.create_bundle(spec).await?;
    Ok((StatusCode::CREATED, Json(bundle)))
}

/// All bundles (admin)
pub async fn list_bundles(State(state): State<AppState>) -> Json<Vec<Bundle>> {
    Json(state.services.list_bundles().await)
}

/// Delete a bundle and release its holds (admin)
pub async fn delete_bundle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .services
        .delete_bundle(BundleId::from_uuid(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The offer behind a shareable-link token
pub async fn get_bundle_offer(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<BundleOffer>, AppError> {
    let bundle = state.services.bundle_by_token(&token).await?;
    Ok(Json(BundleOffer::from(bundle)))
}

/// Finalize a bundle purchase against a payment confirmation
pub async fn purchase_bundle(
    State(state): State<AppState>,
    Holder(holder): Holder,
    Path(token): Path<String>,
    Json(body): Json<PurchaseBundleBody>,
) -> Result<Response, AppError> {
    let outcome = state
        .services
        .purchase_bundle(&token, body.confirmation_id, holder, body.contact)
        .await?;
    Ok(super::checkout::outcome_response(outcome))
}
