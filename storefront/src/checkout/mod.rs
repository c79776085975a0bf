//! Checkout: the order finalizer saga and its manual-action escape hatch.

pub mod finalizer;
pub mod manual;

pub use finalizer::{
    CheckoutAction, CheckoutEnvironment, CheckoutError, CheckoutOutcome, CheckoutPhase,
    CheckoutReducer, CheckoutRequest, CheckoutSource, CheckoutState, CheckoutStore,
};
pub use manual::{ManualActionLog, ManualActionRequired};
