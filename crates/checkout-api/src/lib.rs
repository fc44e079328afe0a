//! # checkout-api
//!
//! HTTP API layer for checkout-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints for cart, coupons and checkout
//! - Signed callback handler for wallet payment outcomes
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/v1/cart/items` | Add item to cart |
//! | GET | `/api/v1/cart` | Cart contents and totals |
//! | DELETE | `/api/v1/cart/items/:id` | Remove one item |
//! | DELETE | `/api/v1/cart/items` | Empty the cart |
//! | POST | `/api/v1/cart/coupon` | Apply coupon |
//! | DELETE | `/api/v1/cart/coupon` | Remove coupon |
//! | POST | `/api/v1/checkout` | Run a checkout attempt |
//! | POST | `/callback/wallet` | Wallet payment callback |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
