//! # Payment Gateway Contract
//!
//! One uniform contract the orchestrator drives regardless of which
//! payment rail a checkout resolves to. Concrete gateways live in the
//! `checkout-gateway` crate.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  PaymentGateway (trait)                 │
//! │  ├── execute()                                          │
//! │  ├── rail()                                             │
//! │  └── provider_name()                                    │
//! └─────────────────────────────────────────────────────────┘
//!                            ▲
//!          ┌─────────────────┼─────────────────┐
//!          │                 │                 │
//!  ┌───────┴───────┐ ┌───────┴───────┐ ┌───────┴────────┐
//!  │  CardCharge   │ │ Subscription  │ │ WalletRedirect │
//!  │   Gateway     │ │   Gateway     │ │    Gateway     │
//!  └───────────────┘ └───────────────┘ └────────────────┘
//! ```

use crate::error::{CheckoutError, CheckoutResult};
use crate::ledger::Transaction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Payment rail a checkout is dispatched on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rail {
    /// Immediate synchronous card charge
    CardCharge,
    /// Subscription provisioning with an external billing provider
    RecurringSubscription,
    /// Redirect-based wallet payment confirmed by a later callback
    RedirectWallet,
}

impl Rail {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rail::CardCharge => "card_charge",
            Rail::RecurringSubscription => "recurring_subscription",
            Rail::RedirectWallet => "redirect_wallet",
        }
    }
}

impl std::fmt::Display for Rail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Administrative billing-method record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingMethod {
    pub id: u32,
    pub name: String,
}

/// Billing-method collaborator
pub trait BillingMethodDirectory: Send + Sync {
    fn get_method(&self, id: u32) -> Option<BillingMethod>;
}

/// Fixed in-memory method table
#[derive(Debug, Default)]
pub struct InMemoryBillingMethods {
    methods: Vec<BillingMethod>,
}

impl InMemoryBillingMethods {
    pub fn new(methods: Vec<BillingMethod>) -> Self {
        Self { methods }
    }

    /// The method set the source system ships with
    pub fn standard() -> Self {
        Self::new(vec![
            BillingMethod {
                id: 1,
                name: "paypal".into(),
            },
            BillingMethod {
                id: 2,
                name: "card".into(),
            },
            BillingMethod {
                id: 3,
                name: "billsby".into(),
            },
        ])
    }
}

impl BillingMethodDirectory for InMemoryBillingMethods {
    fn get_method(&self, id: u32) -> Option<BillingMethod> {
        self.methods.iter().find(|m| m.id == id).cloned()
    }
}

/// Raw card input from the checkout request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub name_on_card: String,
    /// `MM/YY`
    pub expiry: String,
    pub card_type: String,
    /// Provider token, when the card was tokenized client-side
    #[serde(default)]
    pub token: Option<String>,
}

/// Reference to a billing plan for subscription checkouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRef {
    pub id: String,
    pub recurring: bool,
}

/// Payment fields of a checkout request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub method_id: u32,
    #[serde(default)]
    pub card: Option<CardDetails>,
    #[serde(default)]
    pub plan: Option<PlanRef>,
}

/// Resolve the payment rail once, at method resolution.
///
/// Rule: the method name `paypal` selects the wallet redirect flow; a
/// recurring plan selects subscription provisioning; a supplied card or
/// token selects the immediate charge. Anything else is unsupported.
pub fn resolve_rail(method: &BillingMethod, details: &PaymentDetails) -> CheckoutResult<Rail> {
    if method.name == "paypal" {
        return Ok(Rail::RedirectWallet);
    }
    if details.plan.as_ref().is_some_and(|p| p.recurring) {
        return Ok(Rail::RecurringSubscription);
    }
    if details
        .card
        .as_ref()
        .is_some_and(|c| !c.number.is_empty() || c.token.is_some())
    {
        return Ok(Rail::CardCharge);
    }
    Err(CheckoutError::UnsupportedMethod {
        name: method.name.clone(),
    })
}

/// Terminal disposition of a gateway dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayDisposition {
    /// Payment confirmed synchronously
    Confirmed,
    /// Outcome arrives later through the callback endpoint; the user is
    /// sent to `redirect_url` in the meantime
    PendingCallback { redirect_url: String },
    /// Gateway declined the payment
    Rejected { reason: String },
}

/// Result of a gateway dispatch
#[derive(Debug, Clone)]
pub struct GatewayResult {
    pub disposition: GatewayDisposition,
    /// Provider's payment reference; the reconciliation key for
    /// asynchronous rails
    pub external_id: Option<String>,
    pub message: Option<String>,
}

/// Uniform payment execution contract.
///
/// `execute` must respect the caller-supplied timeout. A timed-out call
/// returns `ExternalUnavailable` so the orchestrator can leave the
/// transaction pending; the charge may have succeeded upstream, and an
/// ambiguous outcome must never be reported as a definite one.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn execute(
        &self,
        transaction: &Transaction,
        details: &PaymentDetails,
        timeout: Duration,
    ) -> CheckoutResult<GatewayResult>;

    /// The rail this gateway serves
    fn rail(&self) -> Rail;

    /// Provider name (for logging and error attribution)
    fn provider_name(&self) -> &'static str;
}

/// Type alias for a boxed gateway (dynamic dispatch)
pub type BoxedGateway = Arc<dyn PaymentGateway>;

/// Gateway registry keyed by rail
#[derive(Clone, Default)]
pub struct GatewaySelector {
    gateways: HashMap<Rail, BoxedGateway>,
}

impl GatewaySelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, gateway: BoxedGateway) {
        self.gateways.insert(gateway.rail(), gateway);
    }

    /// Register with builder pattern
    pub fn with_gateway(mut self, gateway: BoxedGateway) -> Self {
        self.register(gateway);
        self
    }

    pub fn get(&self, rail: Rail) -> Option<&BoxedGateway> {
        self.gateways.get(&rail)
    }

    pub fn rails(&self) -> Vec<Rail> {
        self.gateways.keys().copied().collect()
    }
}
