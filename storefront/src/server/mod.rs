//! HTTP server: routing, shared state, error mapping, and extractors.

pub mod error;
pub mod extract;
pub mod health;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use routes::build_router;
pub use state::AppState;
