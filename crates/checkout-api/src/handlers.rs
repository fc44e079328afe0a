//! # Request Handlers
//!
//! Axum request handlers for the checkout API. Cart endpoints are
//! scoped to the session carried in the `X-Session-Id` header.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use checkout_core::{CheckoutError, CheckoutOutcome, CheckoutRequest, ReconcileOutcome, RemoveTarget};
use checkout_gateway::callback::verify_callback;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Add-to-cart request
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub item_id: String,
}

/// Apply-coupon request
#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn checkout_error_to_response(err: CheckoutError) -> HandlerError {
    let code = err.status_code();
    let response = ErrorResponse::new(err.to_string(), code);
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

/// Extract the session id from the `X-Session-Id` header
fn session_id(headers: &HeaderMap) -> Result<String, HandlerError> {
    headers
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Missing X-Session-Id header", 400)),
            )
        })
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "checkout-rs",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Add an item to the session cart
#[instrument(skip(state, headers))]
pub async fn add_cart_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AddItemRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let session = session_id(&headers)?;
    let count = state
        .orchestrator
        .cart()
        .add_item(&session, &request.item_id)
        .map_err(checkout_error_to_response)?;

    info!("Added {} to cart, {} items", request.item_id, count);
    Ok(Json(serde_json::json!({ "count": count })))
}

/// Current cart contents with recomputed totals
pub async fn get_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HandlerError> {
    let session = session_id(&headers)?;
    let snapshot = state.orchestrator.cart().snapshot(&session);

    Ok(Json(serde_json::json!({
        "items": snapshot.lines,
        "count": snapshot.lines.len(),
        "coupon": snapshot.coupon.map(|c| c.code),
        "subtotal": snapshot.totals.subtotal.amount,
        "discount": snapshot.totals.discount.amount,
        "total": snapshot.totals.total.amount,
        "currency": snapshot.totals.total.currency.as_str(),
    })))
}

/// Remove one item from the session cart
#[instrument(skip(state, headers))]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(item_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let session = session_id(&headers)?;
    let count = state
        .orchestrator
        .cart()
        .remove_item(&session, RemoveTarget::Item(item_id))
        .map_err(checkout_error_to_response)?;

    Ok(Json(serde_json::json!({ "count": count })))
}

/// Empty the session cart
#[instrument(skip(state, headers))]
pub async fn clear_cart_items(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HandlerError> {
    let session = session_id(&headers)?;
    let count = state
        .orchestrator
        .cart()
        .remove_item(&session, RemoveTarget::All)
        .map_err(checkout_error_to_response)?;

    Ok(Json(serde_json::json!({ "count": count })))
}

/// Validate a coupon and attach it to the session cart
#[instrument(skip(state, headers))]
pub async fn apply_coupon(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let session = session_id(&headers)?;
    let coupon = state
        .orchestrator
        .cart()
        .apply_coupon(&session, &request.code, Utc::now())
        .map_err(checkout_error_to_response)?;

    info!("Applied coupon {}", coupon.code);
    Ok(Json(serde_json::json!({
        "code": coupon.code,
        "discount_percent": coupon.discount_percent,
    })))
}

/// Detach any coupon from the session cart
pub async fn remove_coupon(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HandlerError> {
    let session = session_id(&headers)?;
    state.orchestrator.cart().clear_coupon(&session);
    Ok(StatusCode::NO_CONTENT)
}

/// Run a checkout attempt for the session cart
#[instrument(skip(state, headers, request))]
pub async fn checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let session = session_id(&headers)?;

    let outcome = state
        .orchestrator
        .checkout(&session, request)
        .await
        .map_err(|e| {
            error!("Checkout failed: {}", e);
            checkout_error_to_response(e)
        })?;

    let response = match &outcome {
        CheckoutOutcome::Confirmed {
            order_id,
            transaction_id,
            total,
        } => serde_json::json!({
            "status": "confirmed",
            "order_id": order_id,
            "transaction_id": transaction_id,
            "total": total.amount,
            "currency": total.currency.as_str(),
        }),
        CheckoutOutcome::RedirectPending {
            order_id,
            transaction_id,
            external_id,
            redirect_url,
        } => serde_json::json!({
            "status": "pending",
            "order_id": order_id,
            "transaction_id": transaction_id,
            "external_id": external_id,
            "redirect_url": redirect_url,
        }),
    };

    Ok(Json(response))
}

/// Handle the wallet provider's signed payment callback
#[instrument(skip(state, headers, body))]
pub async fn wallet_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, HandlerError> {
    let signature = headers
        .get("x-callback-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Missing X-Callback-Signature header", 400)),
            )
        })?;

    let event = verify_callback(&state.callback_secret, &body, signature).map_err(|e| {
        error!("Callback verification failed: {}", e);
        checkout_error_to_response(e)
    })?;

    let outcome = state
        .orchestrator
        .reconcile(&event.external_id, event.outcome)
        .map_err(|e| {
            error!("Callback reconciliation failed: {}", e);
            checkout_error_to_response(e)
        })?;

    match outcome {
        ReconcileOutcome::Confirmed { transaction_id } => {
            info!("Callback confirmed transaction {}", transaction_id);
        }
        ReconcileOutcome::AlreadyConfirmed => {
            info!("Duplicate callback ignored");
        }
        ReconcileOutcome::Failed { transaction_id } => {
            info!("Callback failed transaction {}", transaction_id);
        }
    }

    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("Test error", 400);
        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, 400);
    }

    #[test]
    fn test_checkout_error_conversion() {
        let err = CheckoutError::EmptyCart;
        let (status, _json) = checkout_error_to_response(err);
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let err = CheckoutError::PaymentRejected {
            provider: "billsby".into(),
            reason: "declined".into(),
        };
        let (status, _json) = checkout_error_to_response(err);
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_session_id_extraction() {
        let mut headers = HeaderMap::new();
        assert!(session_id(&headers).is_err());

        headers.insert("x-session-id", "sess-1".parse().unwrap());
        assert_eq!(session_id(&headers).unwrap(), "sess-1");
    }
}
