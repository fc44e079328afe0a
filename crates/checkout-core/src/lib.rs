//! # checkout-core
//!
//! Core types and orchestration for the checkout & billing engine.
//!
//! This crate provides:
//! - `CartStore` for session-scoped cart state with a pluggable backend
//! - `CouponStore` with atomic redemption semantics
//! - `PricingConfig` computing the authoritative charge amount
//! - `PaymentGateway` trait the payment rails implement
//! - `Ledger` for orders, transactions and purchased items
//! - `CheckoutOrchestrator`, the state machine tying it together
//! - `CheckoutError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use checkout_core::{CheckoutOrchestrator, CheckoutRequest, CheckoutOutcome};
//!
//! let orchestrator = CheckoutOrchestrator::new(
//!     cart, coupons, ledger, accounts, methods, gateways, timeout,
//! );
//!
//! match orchestrator.checkout(&session_id, request).await? {
//!     CheckoutOutcome::Confirmed { order_id, .. } => { /* done */ }
//!     CheckoutOutcome::RedirectPending { redirect_url, .. } => {
//!         // send the user to the wallet's approval page;
//!         // the callback endpoint will call orchestrator.reconcile(..)
//!     }
//! }
//! ```

pub mod account;
pub mod cart;
pub mod catalog;
pub mod coupon;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod money;
pub mod orchestrator;
pub mod pricing;

// Re-exports for convenience
pub use account::{AccountProfile, AccountProvider, SequentialAccounts};
pub use cart::{
    CartBackend, CartLine, CartSnapshot, CartState, CartStore, InMemoryCartBackend, RemoveTarget,
};
pub use catalog::{Catalog, CatalogItem, ItemCatalog};
pub use coupon::{Coupon, CouponStore, InMemoryCouponStore};
pub use error::{CheckoutError, CheckoutResult};
pub use gateway::{
    resolve_rail, BillingMethod, BillingMethodDirectory, BoxedGateway, CardDetails,
    GatewayDisposition, GatewayResult, GatewaySelector, InMemoryBillingMethods, PaymentDetails,
    PaymentGateway, PlanRef, Rail,
};
pub use ledger::{
    BillingAddress, CreditCardRecord, InMemoryLedger, Ledger, NewTransaction, Order, OrderLine,
    PurchasedItem, Transaction, TransactionStatus,
};
pub use money::{Currency, Price};
pub use orchestrator::{
    BillingFields, CallbackOutcome, CheckoutOrchestrator, CheckoutOutcome, CheckoutRequest,
    ReconcileOutcome,
};
pub use pricing::{CartTotals, PricingConfig};
