//! HTTP API handlers and their request/response DTOs.

pub mod availability;
pub mod bundles;
pub mod cart;
pub mod checkout;
pub mod orders;
