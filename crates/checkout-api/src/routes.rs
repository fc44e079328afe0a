//! # Routes
//!
//! Axum router configuration for the checkout API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Cart (session-scoped via `X-Session-Id`):
///   - POST   /api/v1/cart/items - Add an item
///   - GET    /api/v1/cart - Cart contents and totals
///   - DELETE /api/v1/cart/items/{item_id} - Remove one item
///   - DELETE /api/v1/cart/items - Empty the cart
///   - POST   /api/v1/cart/coupon - Apply a coupon
///   - DELETE /api/v1/cart/coupon - Remove the coupon
///
/// - Checkout:
///   - POST /api/v1/checkout - Run a checkout attempt
///
/// - Callbacks:
///   - POST /callback/wallet - Signed wallet payment callback
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let cart_routes = Router::new()
        .route("/", get(handlers::get_cart))
        .route(
            "/items",
            post(handlers::add_cart_item).delete(handlers::clear_cart_items),
        )
        .route("/items/{item_id}", delete(handlers::remove_cart_item))
        .route(
            "/coupon",
            post(handlers::apply_coupon).delete(handlers::remove_coupon),
        );

    let api_routes = Router::new()
        .nest("/cart", cart_routes)
        .route("/checkout", post(handlers::checkout));

    // Callback routes take the raw body for signature verification
    let callback_routes = Router::new().route("/wallet", post(handlers::wallet_callback));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/api/v1", api_routes)
        .nest("/callback", callback_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
