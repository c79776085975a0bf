//! Pure aggregates: reducers over the reservation ledger, carts, and
//! bundles. All side effects live in the environments and store wrappers.

pub mod bundle;
pub mod cart;
pub mod ledger;

pub use bundle::{
    AllocatedItem, BundleAction, BundleEnvironment, BundleError, BundleReducer, BundleState,
    allocate_bundle_prices,
};
pub use cart::{
    CartAction, CartEnvironment, CartError, CartReducer, CartState, calculate_cart_totals,
};
pub use ledger::{LedgerAction, LedgerEnvironment, LedgerError, LedgerReducer, LedgerState};
