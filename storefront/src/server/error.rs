//! HTTP error mapping.
//!
//! Every service failure becomes a JSON body with a stable machine-readable
//! code. The mapping is deliberate about the taxonomy: a conflict over
//! availability carries the number still available so the client can adjust,
//! and a fulfillment failure after payment is a 502 whose message says the
//! charge stands.

use crate::aggregates::{BundleError, CartError, LedgerError};
use crate::app::StorefrontError;
use crate::inventory::InventoryError;
use crate::orders::OrderStoreError;
use crate::payments::PaymentProviderError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// An error ready to leave the HTTP surface
#[derive(Debug)]
pub struct AppError {
    /// HTTP status
    pub status: StatusCode,
    /// Stable machine-readable code
    pub code: &'static str,
    /// Human-readable message
    pub message: String,
    /// Units still available, on availability conflicts
    pub available: Option<u32>,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<u32>,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            available: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "Request failed");
        } else {
            tracing::debug!(code = self.code, message = %self.message, "Request rejected");
        }
        let body = ErrorBody {
            code: self.code,
            message: self.message,
            available: self.available,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StorefrontError> for AppError {
    fn from(error: StorefrontError) -> Self {
        match error {
            StorefrontError::Validation(message) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_failed", message)
            }

            StorefrontError::AvailabilityConflict { available, .. } => Self {
                status: StatusCode::CONFLICT,
                code: "availability_conflict",
                message: error.to_string(),
                available: Some(available),
            },

            StorefrontError::NotFound(what) => Self::new(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{what} not found"),
            ),

            StorefrontError::CheckoutInProgress(_) => Self::new(
                StatusCode::CONFLICT,
                "checkout_in_progress",
                error.to_string(),
            ),

            StorefrontError::FulfillmentFailed => Self::new(
                StatusCode::BAD_GATEWAY,
                "fulfillment_failed",
                "Your payment succeeded but the order could not be fulfilled. \
                 Support has been notified and will reconcile the charge.",
            ),

            StorefrontError::Ledger(e) => match e {
                LedgerError::NotFound(_) => {
                    Self::new(StatusCode::NOT_FOUND, "not_found", e.to_string())
                }
                _ => Self::new(StatusCode::BAD_REQUEST, "validation_failed", e.to_string()),
            },

            StorefrontError::Cart(e) => match e {
                CartError::NoCart(_) | CartError::LineNotFound(_) => {
                    Self::new(StatusCode::NOT_FOUND, "not_found", e.to_string())
                }
                CartError::InvalidQuantity => {
                    Self::new(StatusCode::BAD_REQUEST, "validation_failed", e.to_string())
                }
            },

            StorefrontError::Bundle(e) => match e {
                BundleError::NotFound(_) => {
                    Self::new(StatusCode::NOT_FOUND, "not_found", e.to_string())
                }
                _ => Self::new(StatusCode::BAD_REQUEST, "validation_failed", e.to_string()),
            },

            StorefrontError::Inventory(e) => match e {
                InventoryError::UnknownItem { .. } => {
                    Self::new(StatusCode::NOT_FOUND, "not_found", e.to_string())
                }
                InventoryError::Unavailable(_) => Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    e.to_string(),
                ),
            },

            StorefrontError::Orders(e) => match e {
                OrderStoreError::NotFound(_) | OrderStoreError::SlotNotFound { .. } => {
                    Self::new(StatusCode::NOT_FOUND, "not_found", e.to_string())
                }
                OrderStoreError::DuplicateConfirmation(_) => {
                    Self::new(StatusCode::CONFLICT, "duplicate_order", e.to_string())
                }
                OrderStoreError::Unavailable(_) => Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    e.to_string(),
                ),
            },

            StorefrontError::Payments(e) => match e {
                PaymentProviderError::UnknownConfirmation(_) => {
                    Self::new(StatusCode::NOT_FOUND, "not_found", e.to_string())
                }
                PaymentProviderError::Unavailable(_) => Self::new(
                    StatusCode::BAD_GATEWAY,
                    "payment_provider_unavailable",
                    e.to_string(),
                ),
            },

            StorefrontError::Unavailable(reason) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                reason,
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ItemKey;

    #[test]
    fn availability_conflict_carries_available_count() {
        let error: AppError = StorefrontError::AvailabilityConflict {
            item: ItemKey::new("MT", "half"),
            requested: 3,
            available: 1,
        }
        .into();

        assert_eq!(error.status, StatusCode::CONFLICT);
        assert_eq!(error.available, Some(1));
    }

    #[test]
    fn fulfillment_failure_is_a_gateway_error() {
        let error: AppError = StorefrontError::FulfillmentFailed.into();
        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
        assert!(error.message.contains("payment succeeded"));
    }

    #[test]
    fn unknown_ledger_id_maps_to_not_found() {
        let error: AppError =
            StorefrontError::Ledger(LedgerError::NotFound(crate::types::ReservationId::new()))
                .into();
        assert_eq!(error.status, StatusCode::NOT_FOUND);
    }
}
