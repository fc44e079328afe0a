//! # Checkout Error Types
//!
//! Typed error handling for the checkout engine.
//! All checkout operations return `Result<T, CheckoutError>`.

use thiserror::Error;

/// Core error type for all checkout and billing operations
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Item not found in catalog
    #[error("The product does not exist: {item_id}")]
    ItemNotFound { item_id: String },

    /// Item exists but is not available for purchase
    #[error("The product is not active: {item_id}")]
    ItemNotActive { item_id: String },

    /// Item is already in the cart
    #[error("This product is already in your shopping cart: {item_id}")]
    DuplicateItem { item_id: String },

    /// Checkout attempted with no cart lines
    #[error("The shopping cart is empty")]
    EmptyCart,

    /// Coupon code does not resolve
    #[error("There is no such coupon: {code}")]
    CouponNotFound { code: String },

    /// Coupon exists but is disabled
    #[error("This coupon is not active: {code}")]
    CouponInactive { code: String },

    /// Coupon has no remaining uses
    #[error("This coupon has already been used the maximum number of times: {code}")]
    CouponExhausted { code: String },

    /// Coupon expiry date has passed
    #[error("The coupon has expired: {code}")]
    CouponExpired { code: String },

    /// Billing method cannot be mapped to a payment rail
    #[error("Unsupported billing method: {name}")]
    UnsupportedMethod { name: String },

    /// Gateway declined the payment
    #[error("Payment rejected [{provider}]: {reason}")]
    PaymentRejected { provider: String, reason: String },

    /// Payment provider API error
    #[error("Provider error [{provider}]: {message}")]
    Provider { provider: String, message: String },

    /// Gateway unreachable or timed out; outcome is ambiguous
    #[error("Payment provider unavailable: {0}")]
    ExternalUnavailable(String),

    /// Inbound callback references an external id we never dispatched
    #[error("Unknown payment reference: {external_id}")]
    UnknownPaymentReference { external_id: String },

    /// Order committed without a matching transaction (crash between commits)
    #[error("Ledger inconsistency: {0}")]
    Consistency(String),

    /// Callback signature verification failed
    #[error("Callback verification failed: {0}")]
    CallbackVerificationFailed(String),

    /// Network/HTTP error communicating with a provider
    #[error("Network error: {0}")]
    Network(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CheckoutError {
    /// Returns true if retrying the operation is safe and may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::Network(_)
                | CheckoutError::ExternalUnavailable(_)
                | CheckoutError::Provider { .. }
        )
    }

    /// Returns true if the caller can correct the failure themselves
    /// (as opposed to operational errors that need alerting)
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            CheckoutError::InvalidRequest(_)
                | CheckoutError::ItemNotFound { .. }
                | CheckoutError::ItemNotActive { .. }
                | CheckoutError::DuplicateItem { .. }
                | CheckoutError::EmptyCart
                | CheckoutError::CouponNotFound { .. }
                | CheckoutError::CouponInactive { .. }
                | CheckoutError::CouponExhausted { .. }
                | CheckoutError::CouponExpired { .. }
                | CheckoutError::UnsupportedMethod { .. }
                | CheckoutError::PaymentRejected { .. }
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            CheckoutError::Configuration(_) => 500,
            CheckoutError::InvalidRequest(_) => 400,
            CheckoutError::ItemNotFound { .. } => 404,
            CheckoutError::ItemNotActive { .. } => 400,
            CheckoutError::DuplicateItem { .. } => 409,
            CheckoutError::EmptyCart => 400,
            CheckoutError::CouponNotFound { .. } => 404,
            CheckoutError::CouponInactive { .. } => 400,
            CheckoutError::CouponExhausted { .. } => 409,
            CheckoutError::CouponExpired { .. } => 400,
            CheckoutError::UnsupportedMethod { .. } => 400,
            CheckoutError::PaymentRejected { .. } => 402,
            CheckoutError::Provider { .. } => 502,
            CheckoutError::ExternalUnavailable(_) => 503,
            CheckoutError::UnknownPaymentReference { .. } => 404,
            CheckoutError::Consistency(_) => 500,
            CheckoutError::CallbackVerificationFailed(_) => 401,
            CheckoutError::Network(_) => 503,
            CheckoutError::Serialization(_) => 500,
            CheckoutError::Internal(_) => 500,
        }
    }
}

/// Result type alias for checkout operations
pub type CheckoutResult<T> = Result<T, CheckoutError>;
