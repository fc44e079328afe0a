//! # Billsby Gateways
//!
//! Two payment rails against the Billsby API: immediate card charges
//! and recurring subscription provisioning. Both are synchronous; a
//! successful call confirms the transaction immediately.

use crate::config::BillsbyConfig;
use async_trait::async_trait;
use checkout_core::{
    CheckoutError, CheckoutResult, GatewayDisposition, GatewayResult, PaymentDetails,
    PaymentGateway, Rail, Transaction,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Immediate card charge via Billsby
pub struct BillsbyCardGateway {
    config: BillsbyConfig,
    client: Client,
}

impl BillsbyCardGateway {
    pub fn new(config: BillsbyConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> CheckoutResult<Self> {
        Ok(Self::new(BillsbyConfig::from_env()?))
    }
}

/// Subscription provisioning via Billsby
pub struct BillsbySubscriptionGateway {
    config: BillsbyConfig,
    client: Client,
}

impl BillsbySubscriptionGateway {
    pub fn new(config: BillsbyConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> CheckoutResult<Self> {
        Ok(Self::new(BillsbyConfig::from_env()?))
    }
}

const PROVIDER: &str = "billsby";

/// Map transport failures: an ambiguous timeout/connect error must
/// surface as retryable-unavailable, not as a definite failure
fn map_transport_error(e: reqwest::Error) -> CheckoutError {
    if e.is_timeout() || e.is_connect() {
        CheckoutError::ExternalUnavailable(format!("{PROVIDER}: {e}"))
    } else {
        CheckoutError::Network(e.to_string())
    }
}

async fn read_provider_error(response: reqwest::Response) -> CheckoutError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error!("Billsby API error: status={}, body={}", status, body);

    if let Ok(parsed) = serde_json::from_str::<BillsbyErrorResponse>(&body) {
        return CheckoutError::Provider {
            provider: PROVIDER.to_string(),
            message: parsed.error.message,
        };
    }
    CheckoutError::Provider {
        provider: PROVIDER.to_string(),
        message: format!("HTTP {status}: {body}"),
    }
}

#[async_trait]
impl PaymentGateway for BillsbyCardGateway {
    #[instrument(skip(self, transaction, details), fields(transaction_id = %transaction.id))]
    async fn execute(
        &self,
        transaction: &Transaction,
        details: &PaymentDetails,
        timeout: Duration,
    ) -> CheckoutResult<GatewayResult> {
        let card = details.card.as_ref().ok_or_else(|| {
            CheckoutError::InvalidRequest("Card charge requires card details".to_string())
        })?;

        let request = ChargeRequest {
            amount: transaction.amount.amount,
            currency: transaction.amount.currency.as_str().to_string(),
            reference: transaction.id.clone(),
            token: card.token.clone(),
            card: card.token.is_none().then(|| ChargeCard {
                number: card.number.clone(),
                name: card.name_on_card.clone(),
                expiry: card.expiry.clone(),
            }),
        };

        debug!("Dispatching card charge: {}", transaction.amount.display());

        let url = format!("{}/charges", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            // the transaction id doubles as the idempotency key, so a
            // retried request cannot produce a second charge
            .header("Idempotency-Key", &transaction.id)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(read_provider_error(response).await);
        }

        let charge: ChargeResponse = response.json().await.map_err(|e| {
            CheckoutError::Serialization(format!("Failed to parse charge response: {e}"))
        })?;

        info!("Charge {} -> {}", charge.id, charge.status);

        match charge.status.as_str() {
            "succeeded" => Ok(GatewayResult {
                disposition: GatewayDisposition::Confirmed,
                external_id: Some(charge.id),
                message: charge.message,
            }),
            _ => Ok(GatewayResult {
                disposition: GatewayDisposition::Rejected {
                    reason: charge
                        .message
                        .unwrap_or_else(|| format!("Charge {}", charge.status)),
                },
                external_id: Some(charge.id),
                message: None,
            }),
        }
    }

    fn rail(&self) -> Rail {
        Rail::CardCharge
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

#[async_trait]
impl PaymentGateway for BillsbySubscriptionGateway {
    #[instrument(skip(self, transaction, details), fields(transaction_id = %transaction.id))]
    async fn execute(
        &self,
        transaction: &Transaction,
        details: &PaymentDetails,
        timeout: Duration,
    ) -> CheckoutResult<GatewayResult> {
        let plan = details.plan.as_ref().ok_or_else(|| {
            CheckoutError::InvalidRequest("Subscription requires a billing plan".to_string())
        })?;
        let token = details.card.as_ref().and_then(|c| c.token.clone());

        let request = SubscriptionRequest {
            plan_id: plan.id.clone(),
            customer_reference: transaction.user_id.to_string(),
            reference: transaction.id.clone(),
            token,
        };

        let url = format!("{}/subscriptions", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Idempotency-Key", &transaction.id)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(read_provider_error(response).await);
        }

        let subscription: SubscriptionResponse = response.json().await.map_err(|e| {
            CheckoutError::Serialization(format!("Failed to parse subscription response: {e}"))
        })?;

        info!(
            "Provisioned subscription {} on plan {}",
            subscription.id, plan.id
        );

        // the subscription id anchors later recurring-charge
        // reconciliation by the periodic collaborator
        Ok(GatewayResult {
            disposition: GatewayDisposition::Confirmed,
            external_id: Some(subscription.id),
            message: None,
        })
    }

    fn rail(&self) -> Rail {
        Rail::RecurringSubscription
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

// =============================================================================
// Billsby API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChargeRequest {
    amount: i64,
    currency: String,
    reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    card: Option<ChargeCard>,
}

#[derive(Debug, Serialize)]
struct ChargeCard {
    number: String,
    name: String,
    expiry: String,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    id: String,
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubscriptionRequest {
    plan_id: String,
    customer_reference: String,
    reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BillsbyErrorResponse {
    error: BillsbyError,
}

#[derive(Debug, Deserialize)]
struct BillsbyError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::{CardDetails, Currency, PlanRef, Price};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transaction() -> Transaction {
        Transaction {
            id: "txn-1".into(),
            order_id: Some("order-1".into()),
            user_id: 7,
            amount: Price::from_cents(1350, Currency::USD),
            billing_method_id: 2,
            card_id: None,
            external_id: None,
            recurring: false,
            plan_id: None,
            status: checkout_core::TransactionStatus::SentToGateway,
            failure_reason: None,
            created_at: chrono::Utc::now(),
        }
    }

    fn card_details(token: Option<&str>) -> PaymentDetails {
        PaymentDetails {
            method_id: 2,
            card: Some(CardDetails {
                number: "4242424242424242".into(),
                name_on_card: "Ada Lovelace".into(),
                expiry: "04/27".into(),
                card_type: "visa".into(),
                token: token.map(String::from),
            }),
            plan: None,
        }
    }

    #[tokio::test]
    async fn charge_success_confirms() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/charges"))
            .and(header("Idempotency-Key", "txn-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "ch_123",
                "status": "succeeded"
            })))
            .mount(&server)
            .await;

        let gateway = BillsbyCardGateway::new(BillsbyConfig::new("key", server.uri()));
        let result = gateway
            .execute(&transaction(), &card_details(None), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(result.disposition, GatewayDisposition::Confirmed);
        assert_eq!(result.external_id.as_deref(), Some("ch_123"));
    }

    #[tokio::test]
    async fn charge_decline_is_rejected_with_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/charges"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "ch_124",
                "status": "declined",
                "message": "insufficient funds"
            })))
            .mount(&server)
            .await;

        let gateway = BillsbyCardGateway::new(BillsbyConfig::new("key", server.uri()));
        let result = gateway
            .execute(&transaction(), &card_details(None), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(
            result.disposition,
            GatewayDisposition::Rejected {
                reason: "insufficient funds".into()
            }
        );
    }

    #[tokio::test]
    async fn provider_error_body_is_attributed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/charges"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "message": "invalid card number" }
            })))
            .mount(&server)
            .await;

        let gateway = BillsbyCardGateway::new(BillsbyConfig::new("key", server.uri()));
        let err = gateway
            .execute(&transaction(), &card_details(None), Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            CheckoutError::Provider { provider, message } => {
                assert_eq!(provider, "billsby");
                assert_eq!(message, "invalid card number");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscription_provisioning_returns_subscription_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "sub_987"
            })))
            .mount(&server)
            .await;

        let gateway = BillsbySubscriptionGateway::new(BillsbyConfig::new("key", server.uri()));
        let mut details = card_details(Some("tok_abc"));
        details.plan = Some(PlanRef {
            id: "plan-monthly".into(),
            recurring: true,
        });

        let result = gateway
            .execute(&transaction(), &details, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(result.disposition, GatewayDisposition::Confirmed);
        assert_eq!(result.external_id.as_deref(), Some("sub_987"));
    }

    #[tokio::test]
    async fn subscription_without_plan_is_invalid() {
        let gateway =
            BillsbySubscriptionGateway::new(BillsbyConfig::new("key", "http://unused.test"));
        let err = gateway
            .execute(&transaction(), &card_details(None), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidRequest(_)));
    }
}
