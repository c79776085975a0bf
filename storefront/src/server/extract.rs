//! Request extractors.

use crate::types::HolderId;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

/// Header naming the acting holder. Supplied by the auth proxy in front of
/// this service; absent for anonymous bundle-link visitors.
pub const HOLDER_HEADER: &str = "x-holder-id";

/// The holder a request acts as; guest when the header is missing
#[derive(Clone, Debug)]
pub struct Holder(pub HolderId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Holder
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let holder = parts
            .headers
            .get(HOLDER_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map_or_else(HolderId::guest, HolderId::new);
        Ok(Self(holder))
    }
}
