//! Checkout endpoints.

use crate::app::StorefrontError;
use crate::checkout::CheckoutOutcome;
use crate::payments::PaymentStatus;
use crate::server::extract::Holder;
use crate::server::{AppError, AppState};
use crate::types::{BuyerContact, ConfirmationId, OrderId};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Request to finalize a purchase against a payment confirmation
#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    /// Provider-issued confirmation id
    pub confirmation_id: ConfirmationId,
    /// Contact fallback when the payment metadata carries none
    pub contact: Option<BuyerContact>,
}

/// Terminal checkout outcome as rendered to the client
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum CheckoutResponse {
    /// An order exists for this confirmation
    Completed {
        /// The order
        order_id: OrderId,
    },
    /// The provider has not reported success yet
    PaymentNotSucceeded {
        /// Status the provider reported
        payment_status: PaymentStatus,
    },
}

/// Render an outcome: completion and pending payments answer normally,
/// a post-payment fulfillment failure goes through the error mapping so
/// the client sees the charge-stands messaging
pub(crate) fn outcome_response(outcome: CheckoutOutcome) -> Response {
    match outcome {
        CheckoutOutcome::Completed { order_id } => {
            (StatusCode::OK, Json(CheckoutResponse::Completed { order_id })).into_response()
        }
        CheckoutOutcome::PaymentNotSucceeded { status } => (
            StatusCode::PAYMENT_REQUIRED,
            Json(CheckoutResponse::PaymentNotSucceeded {
                payment_status: status,
            }),
        )
            .into_response(),
        CheckoutOutcome::FulfillmentFailed => {
            AppError::from(StorefrontError::FulfillmentFailed).into_response()
        }
    }
}

/// Finalize the acting holder's cart against a payment confirmation
pub async fn checkout_cart(
    State(state): State<AppState>,
    Holder(holder): Holder,
    Json(body): Json<CheckoutBody>,
) -> Result<Response, AppError> {
    let outcome = state
        .services
        .checkout_cart(holder, body.confirmation_id, body.contact)
        .await?;
    Ok(outcome_response(outcome))
}

/// Finalize a purchase carried entirely on the payment metadata
pub async fn checkout_direct(
    State(state): State<AppState>,
    Json(body): Json<CheckoutBody>,
) -> Result<Response, AppError> {
    let outcome = state.services.checkout_direct(body.confirmation_id).await?;
    Ok(outcome_response(outcome))
}

/// Outstanding manual-action records, oldest first (admin)
pub async fn list_manual_actions(
    State(state): State<AppState>,
) -> Json<Vec<crate::checkout::ManualActionRequired>> {
    Json(state.services.manual_actions.snapshot().await)
}
