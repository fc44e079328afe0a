//! # Gateway Configuration
//!
//! Provider credentials and endpoints. All secrets are loaded from
//! environment variables.

use checkout_core::CheckoutError;
use std::env;

/// Billsby API configuration (card charges and subscriptions)
#[derive(Debug, Clone)]
pub struct BillsbyConfig {
    /// API key
    pub api_key: String,

    /// API base URL (overridable for testing/mocking)
    pub api_base_url: String,
}

impl BillsbyConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `BILLSBY_API_KEY`
    pub fn from_env() -> Result<Self, CheckoutError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let api_key = env::var("BILLSBY_API_KEY")
            .map_err(|_| CheckoutError::Configuration("BILLSBY_API_KEY not set".to_string()))?;

        let api_base_url = env::var("BILLSBY_API_URL")
            .unwrap_or_else(|_| "https://public.billsby.com/api/v1".to_string());

        Ok(Self {
            api_key,
            api_base_url,
        })
    }

    /// Create config with explicit values (for testing)
    pub fn new(api_key: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base_url: api_base_url.into(),
        }
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

/// PayPal API configuration (redirect wallet payments)
#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,

    /// API base URL (overridable for testing/mocking)
    pub api_base_url: String,

    /// Where the wallet sends the user after approving the payment
    pub return_url: String,

    /// Where the wallet sends the user after cancelling
    pub cancel_url: String,

    /// Shared secret for inbound callback signature verification
    pub callback_secret: String,
}

impl PayPalConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `PAYPAL_CLIENT_ID`
    /// - `PAYPAL_CLIENT_SECRET`
    /// - `PAYPAL_CALLBACK_SECRET`
    pub fn from_env() -> Result<Self, CheckoutError> {
        dotenvy::dotenv().ok();

        let client_id = env::var("PAYPAL_CLIENT_ID")
            .map_err(|_| CheckoutError::Configuration("PAYPAL_CLIENT_ID not set".to_string()))?;

        let client_secret = env::var("PAYPAL_CLIENT_SECRET").map_err(|_| {
            CheckoutError::Configuration("PAYPAL_CLIENT_SECRET not set".to_string())
        })?;

        let callback_secret = env::var("PAYPAL_CALLBACK_SECRET").map_err(|_| {
            CheckoutError::Configuration("PAYPAL_CALLBACK_SECRET not set".to_string())
        })?;

        let api_base_url = env::var("PAYPAL_API_URL")
            .unwrap_or_else(|_| "https://api-m.paypal.com".to_string());

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
        let return_url = env::var("ORDER_RETURN_URL")
            .unwrap_or_else(|_| format!("{base_url}/checkout/return"));
        let cancel_url = env::var("ORDER_CANCEL_URL")
            .unwrap_or_else(|_| format!("{base_url}/checkout/cancel"));

        Ok(Self {
            client_id,
            client_secret,
            api_base_url,
            return_url,
            cancel_url,
            callback_secret,
        })
    }

    /// Create config with explicit values (for testing)
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        callback_secret: impl Into<String>,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_base_url: api_base_url.into(),
            return_url: "http://localhost:8080/checkout/return".to_string(),
            cancel_url: "http://localhost:8080/checkout/cancel".to_string(),
            callback_secret: callback_secret.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billsby_auth_header() {
        let config = BillsbyConfig::new("key_abc123", "https://mock.test");
        assert_eq!(config.auth_header(), "Bearer key_abc123");
    }

    #[test]
    fn test_paypal_explicit_config() {
        let config = PayPalConfig::new("cid", "secret", "cb_secret", "https://mock.test");
        assert_eq!(config.api_base_url, "https://mock.test");
        assert!(config.return_url.ends_with("/checkout/return"));
    }
}
