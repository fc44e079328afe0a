//! # checkout-gateway
//!
//! Provider gateways for checkout-rs.
//!
//! Three rails are implemented:
//!
//! 1. **BillsbyCardGateway** - immediate card charge
//!    - Raw card details or a client-side token
//!    - Idempotent on the transaction id
//! 2. **BillsbySubscriptionGateway** - recurring subscription provisioning
//!    - Requires a billing plan reference
//! 3. **PayPalWalletGateway** - redirect wallet payment
//!    - Suspends the checkout until the signed callback arrives
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use checkout_gateway::{BillsbyCardGateway, PayPalWalletGateway};
//! use checkout_core::GatewaySelector;
//!
//! let gateways = GatewaySelector::new()
//!     .with_gateway(Arc::new(BillsbyCardGateway::from_env()?))
//!     .with_gateway(Arc::new(PayPalWalletGateway::from_env()?));
//! ```
//!
//! ## Callback Handling
//!
//! ```rust,ignore
//! use checkout_gateway::callback::verify_callback;
//!
//! // In your callback endpoint:
//! let event = verify_callback(&secret, body, signature_header)?;
//! orchestrator.reconcile(&event.external_id, event.outcome).await?;
//! ```

pub mod billsby;
pub mod callback;
pub mod config;
pub mod paypal;

pub use billsby::{BillsbyCardGateway, BillsbySubscriptionGateway};
pub use callback::{verify_callback, CallbackEvent};
pub use config::{BillsbyConfig, PayPalConfig};
pub use paypal::PayPalWalletGateway;
