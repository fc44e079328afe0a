//! # PayPal Wallet Gateway
//!
//! Redirect-based wallet rail. A dispatch creates a payment at the
//! provider and suspends: the caller is handed an approval URL, and the
//! final outcome arrives later through the signed callback endpoint.

use crate::config::PayPalConfig;
use async_trait::async_trait;
use checkout_core::{
    CheckoutError, CheckoutResult, GatewayDisposition, GatewayResult, PaymentDetails,
    PaymentGateway, Rail, Transaction,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

pub struct PayPalWalletGateway {
    config: PayPalConfig,
    client: Client,
}

const PROVIDER: &str = "paypal";

impl PayPalWalletGateway {
    pub fn new(config: PayPalConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> CheckoutResult<Self> {
        Ok(Self::new(PayPalConfig::from_env()?))
    }
}

#[async_trait]
impl PaymentGateway for PayPalWalletGateway {
    #[instrument(skip(self, transaction, _details), fields(transaction_id = %transaction.id))]
    async fn execute(
        &self,
        transaction: &Transaction,
        _details: &PaymentDetails,
        timeout: Duration,
    ) -> CheckoutResult<GatewayResult> {
        let request = CreatePaymentRequest {
            amount: transaction.amount.amount,
            currency: transaction.amount.currency.as_str().to_string(),
            reference: transaction.id.clone(),
            return_url: self.config.return_url.clone(),
            cancel_url: self.config.cancel_url.clone(),
        };

        debug!(
            "Creating wallet payment: {}",
            transaction.amount.display()
        );

        let url = format!("{}/v1/payments", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    CheckoutError::ExternalUnavailable(format!("{PROVIDER}: {e}"))
                } else {
                    CheckoutError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CheckoutError::Provider {
                provider: PROVIDER.to_string(),
                message: format!("HTTP {status}: {body}"),
            });
        }

        let payment: CreatePaymentResponse = response.json().await.map_err(|e| {
            CheckoutError::Serialization(format!("Failed to parse payment response: {e}"))
        })?;

        info!(
            "Wallet payment {} suspended pending approval",
            payment.id
        );

        Ok(GatewayResult {
            disposition: GatewayDisposition::PendingCallback {
                redirect_url: payment.approval_url,
            },
            external_id: Some(payment.id),
            message: None,
        })
    }

    fn rail(&self) -> Rail {
        Rail::RedirectWallet
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

#[derive(Debug, Serialize)]
struct CreatePaymentRequest {
    amount: i64,
    currency: String,
    reference: String,
    return_url: String,
    cancel_url: String,
}

#[derive(Debug, Deserialize)]
struct CreatePaymentResponse {
    id: String,
    approval_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::{Currency, Price, TransactionStatus};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transaction() -> Transaction {
        Transaction {
            id: "txn-9".into(),
            order_id: Some("order-9".into()),
            user_id: 3,
            amount: Price::from_cents(2000, Currency::USD),
            billing_method_id: 1,
            card_id: None,
            external_id: None,
            recurring: false,
            plan_id: None,
            status: TransactionStatus::SentToGateway,
            failure_reason: None,
            created_at: chrono::Utc::now(),
        }
    }

    fn details() -> PaymentDetails {
        PaymentDetails {
            method_id: 1,
            card: None,
            plan: None,
        }
    }

    fn config(uri: String) -> PayPalConfig {
        PayPalConfig::new("cid", "secret", "cb_secret", uri)
    }

    #[tokio::test]
    async fn dispatch_suspends_with_approval_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "PAY-42",
                "approval_url": "https://wallet.test/approve/PAY-42"
            })))
            .mount(&server)
            .await;

        let gateway = PayPalWalletGateway::new(config(server.uri()));
        let result = gateway
            .execute(&transaction(), &details(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(result.external_id.as_deref(), Some("PAY-42"));
        assert_eq!(
            result.disposition,
            GatewayDisposition::PendingCallback {
                redirect_url: "https://wallet.test/approve/PAY-42".into()
            }
        );
    }

    #[tokio::test]
    async fn provider_rejection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payments"))
            .respond_with(ResponseTemplate::new(422).set_body_string("currency not supported"))
            .mount(&server)
            .await;

        let gateway = PayPalWalletGateway::new(config(server.uri()));
        let err = gateway
            .execute(&transaction(), &details(), Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            CheckoutError::Provider { provider, message } => {
                assert_eq!(provider, "paypal");
                assert!(message.contains("currency not supported"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_provider_maps_to_unavailable() {
        // nothing listens on this port
        let gateway = PayPalWalletGateway::new(config("http://127.0.0.1:1".into()));
        let err = gateway
            .execute(&transaction(), &details(), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::ExternalUnavailable(_)));
    }
}
