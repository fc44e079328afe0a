//! # Checkout Orchestrator
//!
//! The top-level state machine that turns a session cart into a paid
//! transaction:
//!
//! ```text
//! Idle -> PricingComputed -> AddressRecorded -> MethodResolved
//!      -> OrderCommitted -> GatewayDispatched
//!      -> { Confirmed | Rejected | AwaitingCallback }
//!      -> { ItemsGranted | Failed }
//! ```
//!
//! The cart is cleared only on confirmed success; every other outcome
//! leaves the cart and its coupon intact so the user can retry without
//! re-selecting items. Every failure after the order commit is recorded
//! on the transaction row before it is reported.

use crate::account::{AccountProfile, AccountProvider};
use crate::cart::CartStore;
use crate::coupon::CouponStore;
use crate::error::{CheckoutError, CheckoutResult};
use crate::gateway::{
    resolve_rail, BillingMethodDirectory, GatewayDisposition, GatewaySelector, PaymentDetails,
};
use crate::ledger::{
    order_lines_from_cart, BillingAddress, Ledger, NewTransaction, Order, PurchasedItem,
    TransactionStatus,
};
use crate::money::Price;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Billing address fields of a checkout request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingFields {
    pub company_name: String,
    pub company_address: String,
    pub zip_code: String,
    pub city: String,
    pub country: String,
    pub tax_number: String,
}

/// A single checkout request carrying identity, address and payment
/// fields; cart identity is implicit via the session
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    /// Authenticated user, if any
    #[serde(default)]
    pub user_id: Option<u64>,
    /// Guest profile, used to provision an account when `user_id` is
    /// absent
    #[serde(default)]
    pub account: Option<AccountProfile>,
    pub billing: BillingFields,
    pub payment: PaymentDetails,
}

/// Successful checkout outcomes
#[derive(Debug, Clone, Serialize)]
pub enum CheckoutOutcome {
    /// Payment confirmed synchronously; items granted, cart cleared
    Confirmed {
        order_id: String,
        transaction_id: String,
        total: Price,
    },
    /// Asynchronous rail: the user must complete payment at
    /// `redirect_url`; the outcome arrives later via `reconcile`
    RedirectPending {
        order_id: String,
        transaction_id: String,
        external_id: String,
        redirect_url: String,
    },
}

/// Outcome delivered by the gateway callback endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Approved,
    Declined { reason: String },
}

/// Result of applying a callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Confirmed { transaction_id: String },
    /// Duplicate callback for an already-confirmed payment: no-op
    AlreadyConfirmed,
    Failed { transaction_id: String },
}

/// Sequences cart, pricing, coupon, ledger and gateway into one
/// checkout attempt
pub struct CheckoutOrchestrator {
    cart: Arc<CartStore>,
    coupons: Arc<dyn CouponStore>,
    ledger: Arc<dyn Ledger>,
    accounts: Arc<dyn AccountProvider>,
    methods: Arc<dyn BillingMethodDirectory>,
    gateways: GatewaySelector,
    gateway_timeout: Duration,
    /// Sessions awaiting an external callback, keyed by the gateway's
    /// payment reference; lets a confirmed callback clear the right cart
    pending_sessions: Mutex<HashMap<String, String>>,
}

impl CheckoutOrchestrator {
    pub fn new(
        cart: Arc<CartStore>,
        coupons: Arc<dyn CouponStore>,
        ledger: Arc<dyn Ledger>,
        accounts: Arc<dyn AccountProvider>,
        methods: Arc<dyn BillingMethodDirectory>,
        gateways: GatewaySelector,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            cart,
            coupons,
            ledger,
            accounts,
            methods,
            gateways,
            gateway_timeout,
            pending_sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn cart(&self) -> &CartStore {
        &self.cart
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Run one checkout attempt end to end for a session.
    #[instrument(skip(self, request), fields(session_id = %session_id))]
    pub async fn checkout(
        &self,
        session_id: &str,
        request: CheckoutRequest,
    ) -> CheckoutResult<CheckoutOutcome> {
        // Idle -> PricingComputed
        let snapshot = self.cart.snapshot(session_id);
        if snapshot.lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let totals = snapshot.totals;

        // Identity is established here and nowhere else
        let user_id = match request.user_id {
            Some(id) => id,
            None => {
                let profile = request.account.as_ref().ok_or_else(|| {
                    CheckoutError::InvalidRequest(
                        "Guest checkout requires account details".into(),
                    )
                })?;
                profile.validate()?;
                let id = self.accounts.create_account(profile)?;
                info!(user_id = id, "Provisioned account for guest checkout");
                id
            }
        };

        // -> AddressRecorded (additive, non-financial; no rollback needed)
        self.ledger.record_billing_address(BillingAddress {
            user_id,
            company_name: request.billing.company_name.clone(),
            company_address: request.billing.company_address.clone(),
            zip_code: request.billing.zip_code.clone(),
            city: request.billing.city.clone(),
            country: request.billing.country.clone(),
            tax_number: request.billing.tax_number.clone(),
        })?;

        // -> MethodResolved
        let method = self
            .methods
            .get_method(request.payment.method_id)
            .ok_or_else(|| CheckoutError::UnsupportedMethod {
                name: format!("method #{}", request.payment.method_id),
            })?;
        let rail = resolve_rail(&method, &request.payment)?;
        let gateway = self.gateways.get(rail).ok_or_else(|| {
            CheckoutError::Configuration(format!("No gateway registered for rail: {rail}"))
        })?;

        let card = match &request.payment.card {
            Some(details) => Some(self.ledger.check_or_create_card(user_id, details)?),
            None => None,
        };

        // Commit-time coupon re-validation; the usage decrement is atomic
        // so two concurrent checkouts cannot both pass a cap of 1
        let coupon_code = match &snapshot.coupon {
            Some(coupon) => {
                self.coupons.redeem(&coupon.code, Utc::now())?;
                Some(coupon.code.clone())
            }
            None => None,
        };

        // -> OrderCommitted, from the already-computed total; the cart is
        // never re-read between pricing and commit
        let lines = order_lines_from_cart(&snapshot.lines, totals.total);
        let order = self
            .ledger
            .commit_order(user_id, totals.total, lines, coupon_code)?;

        let plan = request.payment.plan.as_ref();
        let transaction = self.ledger.commit_transaction(NewTransaction {
            order_id: Some(order.id.clone()),
            user_id,
            amount: totals.total,
            billing_method_id: method.id,
            card_id: card.map(|c| c.id),
            external_id: None,
            recurring: plan.is_some_and(|p| p.recurring),
            plan_id: plan.map(|p| p.id.clone()),
        })?;

        // -> GatewayDispatched
        self.ledger
            .set_transaction_status(&transaction.id, TransactionStatus::SentToGateway, None)?;

        info!(
            order_id = %order.id,
            transaction_id = %transaction.id,
            rail = %rail,
            total = %totals.total.display(),
            "Dispatching payment"
        );

        let result = match gateway
            .execute(&transaction, &request.payment, self.gateway_timeout)
            .await
        {
            Ok(result) => result,
            Err(err @ CheckoutError::ExternalUnavailable(_)) => {
                // The charge may have succeeded upstream. Leave the
                // transaction pending rather than guessing it failed.
                warn!(transaction_id = %transaction.id, "Gateway unreachable, outcome ambiguous");
                self.ledger.set_transaction_status(
                    &transaction.id,
                    TransactionStatus::AwaitingCallback,
                    None,
                )?;
                return Err(err);
            }
            Err(err) => {
                self.ledger.set_transaction_status(
                    &transaction.id,
                    TransactionStatus::Failed,
                    Some(err.to_string()),
                )?;
                return Err(err);
            }
        };

        if let Some(external_id) = &result.external_id {
            self.ledger.set_external_id(&transaction.id, external_id)?;
        }

        match result.disposition {
            GatewayDisposition::Confirmed => {
                self.ledger.set_transaction_status(
                    &transaction.id,
                    TransactionStatus::Confirmed,
                    None,
                )?;
                self.grant_items(&order)?;
                // The only path that clears the cart
                self.cart.clear(session_id);
                info!(order_id = %order.id, "Checkout confirmed");
                Ok(CheckoutOutcome::Confirmed {
                    order_id: order.id,
                    transaction_id: transaction.id,
                    total: totals.total,
                })
            }
            GatewayDisposition::Rejected { reason } => {
                // Order stays as a failed-attempt audit record; cart intact
                self.ledger.set_transaction_status(
                    &transaction.id,
                    TransactionStatus::Failed,
                    Some(reason.clone()),
                )?;
                warn!(order_id = %order.id, %reason, "Payment rejected");
                Err(CheckoutError::PaymentRejected {
                    provider: gateway.provider_name().to_string(),
                    reason,
                })
            }
            GatewayDisposition::PendingCallback { redirect_url } => {
                let external_id = result.external_id.ok_or_else(|| {
                    CheckoutError::Internal(
                        "Gateway returned pending-callback without an external id".into(),
                    )
                })?;
                self.ledger.set_transaction_status(
                    &transaction.id,
                    TransactionStatus::AwaitingCallback,
                    None,
                )?;
                self.pending_sessions
                    .lock()
                    .expect("pending session table poisoned")
                    .insert(external_id.clone(), session_id.to_string());
                info!(order_id = %order.id, %external_id, "Awaiting external callback");
                Ok(CheckoutOutcome::RedirectPending {
                    order_id: order.id,
                    transaction_id: transaction.id,
                    external_id,
                    redirect_url,
                })
            }
        }
    }

    /// Apply an asynchronously delivered payment outcome.
    ///
    /// Idempotent per external id: the `AwaitingCallback -> terminal`
    /// status transition is an atomic claim in the ledger, so of any
    /// number of duplicate callbacks, concurrent or not, exactly one
    /// applies the outcome and grants items. The rest observe the
    /// winner's terminal state.
    #[instrument(skip(self), fields(external_id = %external_id))]
    pub fn reconcile(
        &self,
        external_id: &str,
        outcome: CallbackOutcome,
    ) -> CheckoutResult<ReconcileOutcome> {
        let transaction = self
            .ledger
            .transaction_by_external_id(external_id)
            .ok_or_else(|| CheckoutError::UnknownPaymentReference {
                external_id: external_id.to_string(),
            })?;

        if transaction.status == TransactionStatus::Confirmed {
            info!(transaction_id = %transaction.id, "Duplicate callback for confirmed payment, ignoring");
            return Ok(ReconcileOutcome::AlreadyConfirmed);
        }

        match outcome {
            CallbackOutcome::Approved => {
                let won = self.ledger.set_transaction_status_if(
                    &transaction.id,
                    TransactionStatus::AwaitingCallback,
                    TransactionStatus::Confirmed,
                    None,
                )?;
                if !won {
                    return self.settled_elsewhere(&transaction.id);
                }
                let order = transaction
                    .order_id
                    .as_deref()
                    .and_then(|id| self.ledger.order(id))
                    .ok_or_else(|| {
                        CheckoutError::Consistency(format!(
                            "Confirmed transaction {} has no order",
                            transaction.id
                        ))
                    })?;
                self.grant_items(&order)?;
                if let Some(session_id) = self.take_pending_session(external_id) {
                    self.cart.clear(&session_id);
                }
                info!(transaction_id = %transaction.id, "Callback confirmed payment");
                Ok(ReconcileOutcome::Confirmed {
                    transaction_id: transaction.id,
                })
            }
            CallbackOutcome::Declined { reason } => {
                let won = self.ledger.set_transaction_status_if(
                    &transaction.id,
                    TransactionStatus::AwaitingCallback,
                    TransactionStatus::Failed,
                    Some(reason.clone()),
                )?;
                if !won {
                    return self.settled_elsewhere(&transaction.id);
                }
                self.take_pending_session(external_id);
                warn!(transaction_id = %transaction.id, %reason, "Callback declined payment");
                Ok(ReconcileOutcome::Failed {
                    transaction_id: transaction.id,
                })
            }
        }
    }

    /// Lost the status claim: report the terminal state the winning
    /// callback already applied.
    fn settled_elsewhere(&self, txn_id: &str) -> CheckoutResult<ReconcileOutcome> {
        match self.ledger.transaction(txn_id).map(|t| t.status) {
            Some(TransactionStatus::Confirmed) => Ok(ReconcileOutcome::AlreadyConfirmed),
            Some(TransactionStatus::Failed) => Ok(ReconcileOutcome::Failed {
                transaction_id: txn_id.to_string(),
            }),
            other => Err(CheckoutError::Consistency(format!(
                "Callback for transaction {txn_id} in unexpected state: {other:?}"
            ))),
        }
    }

    fn take_pending_session(&self, external_id: &str) -> Option<String> {
        self.pending_sessions
            .lock()
            .expect("pending session table poisoned")
            .remove(external_id)
    }

    /// One PurchasedItem per order line
    fn grant_items(&self, order: &Order) -> CheckoutResult<()> {
        let items = order
            .lines
            .iter()
            .map(|line| PurchasedItem {
                user_id: order.user_id,
                item_id: line.item_id.clone(),
                amount: line.amount,
            })
            .collect();
        self.ledger.commit_purchased_items(items)
    }

    /// Surface orders that have no transaction row (crash between the
    /// two ledger commits). Reported to the alerting path, never
    /// auto-retried.
    pub fn audit_orphaned_orders(&self) -> Vec<Order> {
        let orphans = self.ledger.orders_without_transactions();
        for order in &orphans {
            error!(
                order_id = %order.id,
                user_id = order.user_id,
                "Order committed without a transaction; manual review required"
            );
        }
        orphans
    }
}
