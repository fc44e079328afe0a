//! # Ledger
//!
//! Durable financial records: orders, transactions, purchased items,
//! stored cards and billing addresses. The `Ledger` trait is the seam a
//! relational store implements in production; the in-memory
//! implementation backs tests and single-node runs.
//!
//! Order and Transaction are committed as two separate calls (matching
//! the source system), so a crash between them can leave an Order with
//! no Transaction. `orders_without_transactions` exposes those for the
//! operational alerting path instead of hiding them; they are never
//! retried automatically because that risks a double charge.

use crate::cart::CartLine;
use crate::error::{CheckoutError, CheckoutResult};
use crate::gateway::CardDetails;
use crate::money::Price;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// One purchased line within an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: String,
    pub name: String,
    /// This line's share of the coupon-adjusted total
    pub amount: Price,
}

/// A committed order. Immutable after creation; only transaction state
/// moves afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: u64,
    pub total: Price,
    pub lines: Vec<OrderLine>,
    pub coupon_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Transaction status lifecycle:
/// `Created -> SentToGateway -> { Confirmed | Failed | AwaitingCallback }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Created,
    SentToGateway,
    Confirmed,
    Failed,
    AwaitingCallback,
}

/// One transaction per checkout attempt. `external_id` is the
/// idempotency anchor for gateway callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub order_id: Option<String>,
    pub user_id: u64,
    pub amount: Price,
    pub billing_method_id: u32,
    pub card_id: Option<String>,
    pub external_id: Option<String>,
    pub recurring: bool,
    pub plan_id: Option<String>,
    pub status: TransactionStatus,
    /// Provider message recorded on failure, so the audit trail matches
    /// what the user was told
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for `commit_transaction`
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub order_id: Option<String>,
    pub user_id: u64,
    pub amount: Price,
    pub billing_method_id: u32,
    pub card_id: Option<String>,
    pub external_id: Option<String>,
    pub recurring: bool,
    pub plan_id: Option<String>,
}

/// One row per cart line, created only after the transaction confirms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchasedItem {
    pub user_id: u64,
    pub item_id: String,
    pub amount: Price,
}

/// A stored card. At most one live record per user; checkout reuses it
/// instead of creating duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditCardRecord {
    pub id: String,
    pub user_id: u64,
    pub masked_number: String,
    pub name_on_card: String,
    pub expires: NaiveDate,
    pub gateway_token: Option<String>,
}

/// Billing address captured at checkout; additive, non-financial data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingAddress {
    pub user_id: u64,
    pub company_name: String,
    pub company_address: String,
    pub zip_code: String,
    pub city: String,
    pub country: String,
    pub tax_number: String,
}

/// Persistence seam for all durable financial records
pub trait Ledger: Send + Sync {
    /// Create an order from the already-computed total; each line
    /// carries its share of that total
    fn commit_order(
        &self,
        user_id: u64,
        total: Price,
        lines: Vec<OrderLine>,
        coupon_code: Option<String>,
    ) -> CheckoutResult<Order>;

    fn order(&self, order_id: &str) -> Option<Order>;

    fn commit_transaction(&self, new: NewTransaction) -> CheckoutResult<Transaction>;

    fn transaction(&self, txn_id: &str) -> Option<Transaction>;

    /// Lookup by the gateway's payment reference (callback routing key)
    fn transaction_by_external_id(&self, external_id: &str) -> Option<Transaction>;

    fn transactions_for_user(&self, user_id: u64) -> Vec<Transaction>;

    fn set_transaction_status(
        &self,
        txn_id: &str,
        status: TransactionStatus,
        failure_reason: Option<String>,
    ) -> CheckoutResult<()>;

    /// Transition the status only if it currently equals `expected`,
    /// atomically. Returns whether the transition was applied; a
    /// `false` means another caller already moved the transaction to a
    /// terminal state. This is the claim concurrent callback handlers
    /// race on.
    fn set_transaction_status_if(
        &self,
        txn_id: &str,
        expected: TransactionStatus,
        status: TransactionStatus,
        failure_reason: Option<String>,
    ) -> CheckoutResult<bool>;

    fn set_external_id(&self, txn_id: &str, external_id: &str) -> CheckoutResult<()>;

    fn commit_purchased_items(&self, items: Vec<PurchasedItem>) -> CheckoutResult<()>;

    fn purchased_items_for_user(&self, user_id: u64) -> Vec<PurchasedItem>;

    /// Return the user's stored card, or create one from the supplied
    /// details. Idempotent per user.
    fn check_or_create_card(
        &self,
        user_id: u64,
        card: &CardDetails,
    ) -> CheckoutResult<CreditCardRecord>;

    fn record_billing_address(&self, address: BillingAddress) -> CheckoutResult<()>;

    /// Orders with no transaction row: evidence of a crash between the
    /// two commits. Surfaced for alerting, never auto-retried.
    fn orders_without_transactions(&self) -> Vec<Order>;
}

/// Build order lines from cart lines, spreading the coupon-adjusted
/// total across them
pub fn order_lines_from_cart(lines: &[CartLine], total: Price) -> Vec<OrderLine> {
    let shares = crate::pricing::split_even(total.amount, lines.len());
    lines
        .iter()
        .zip(shares)
        .map(|(line, share)| OrderLine {
            item_id: line.item_id.clone(),
            name: line.name.clone(),
            amount: Price::from_cents(share, total.currency),
        })
        .collect()
}

/// Keep only the last four digits of a card number
fn mask_card_number(number: &str) -> String {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 4 {
        return digits;
    }
    format!("****{}", &digits[digits.len() - 4..])
}

/// Parse a `MM/YY` card expiry into the first day of that month
fn parse_card_expiry(expiry: &str) -> CheckoutResult<NaiveDate> {
    let bad = || CheckoutError::InvalidRequest(format!("Invalid card expiry: {expiry}"));

    let (month, year) = expiry.split_once('/').ok_or_else(bad)?;
    let month: u32 = month.trim().parse().map_err(|_| bad())?;
    let year: i32 = year.trim().parse().map_err(|_| bad())?;

    NaiveDate::from_ymd_opt(2000 + year, month, 1).ok_or_else(bad)
}

#[derive(Debug, Default)]
struct LedgerState {
    orders: HashMap<String, Order>,
    transactions: HashMap<String, Transaction>,
    purchased: Vec<PurchasedItem>,
    cards: HashMap<u64, CreditCardRecord>,
    addresses: Vec<BillingAddress>,
}

/// In-memory ledger. A single mutex keeps each trait call a single
/// persistence unit.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().expect("ledger lock poisoned")
    }
}

impl Ledger for InMemoryLedger {
    fn commit_order(
        &self,
        user_id: u64,
        total: Price,
        lines: Vec<OrderLine>,
        coupon_code: Option<String>,
    ) -> CheckoutResult<Order> {
        let order = Order {
            id: Uuid::new_v4().to_string(),
            user_id,
            total,
            lines,
            coupon_code,
            created_at: Utc::now(),
        };
        self.lock().orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    fn order(&self, order_id: &str) -> Option<Order> {
        self.lock().orders.get(order_id).cloned()
    }

    fn commit_transaction(&self, new: NewTransaction) -> CheckoutResult<Transaction> {
        let txn = Transaction {
            id: Uuid::new_v4().to_string(),
            order_id: new.order_id,
            user_id: new.user_id,
            amount: new.amount,
            billing_method_id: new.billing_method_id,
            card_id: new.card_id,
            external_id: new.external_id,
            recurring: new.recurring,
            plan_id: new.plan_id,
            status: TransactionStatus::Created,
            failure_reason: None,
            created_at: Utc::now(),
        };
        self.lock()
            .transactions
            .insert(txn.id.clone(), txn.clone());
        Ok(txn)
    }

    fn transaction(&self, txn_id: &str) -> Option<Transaction> {
        self.lock().transactions.get(txn_id).cloned()
    }

    fn transaction_by_external_id(&self, external_id: &str) -> Option<Transaction> {
        self.lock()
            .transactions
            .values()
            .find(|t| t.external_id.as_deref() == Some(external_id))
            .cloned()
    }

    fn transactions_for_user(&self, user_id: u64) -> Vec<Transaction> {
        let mut txns: Vec<Transaction> = self
            .lock()
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        txns.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        txns
    }

    fn set_transaction_status(
        &self,
        txn_id: &str,
        status: TransactionStatus,
        failure_reason: Option<String>,
    ) -> CheckoutResult<()> {
        let mut state = self.lock();
        let txn = state
            .transactions
            .get_mut(txn_id)
            .ok_or_else(|| CheckoutError::Internal(format!("No such transaction: {txn_id}")))?;
        txn.status = status;
        if failure_reason.is_some() {
            txn.failure_reason = failure_reason;
        }
        Ok(())
    }

    fn set_transaction_status_if(
        &self,
        txn_id: &str,
        expected: TransactionStatus,
        status: TransactionStatus,
        failure_reason: Option<String>,
    ) -> CheckoutResult<bool> {
        let mut state = self.lock();
        let txn = state
            .transactions
            .get_mut(txn_id)
            .ok_or_else(|| CheckoutError::Internal(format!("No such transaction: {txn_id}")))?;
        if txn.status != expected {
            return Ok(false);
        }
        txn.status = status;
        if failure_reason.is_some() {
            txn.failure_reason = failure_reason;
        }
        Ok(true)
    }

    fn set_external_id(&self, txn_id: &str, external_id: &str) -> CheckoutResult<()> {
        let mut state = self.lock();
        let txn = state
            .transactions
            .get_mut(txn_id)
            .ok_or_else(|| CheckoutError::Internal(format!("No such transaction: {txn_id}")))?;
        txn.external_id = Some(external_id.to_string());
        Ok(())
    }

    fn commit_purchased_items(&self, items: Vec<PurchasedItem>) -> CheckoutResult<()> {
        self.lock().purchased.extend(items);
        Ok(())
    }

    fn purchased_items_for_user(&self, user_id: u64) -> Vec<PurchasedItem> {
        self.lock()
            .purchased
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect()
    }

    fn check_or_create_card(
        &self,
        user_id: u64,
        card: &CardDetails,
    ) -> CheckoutResult<CreditCardRecord> {
        let expires = parse_card_expiry(&card.expiry)?;
        let mut state = self.lock();
        if let Some(existing) = state.cards.get(&user_id) {
            return Ok(existing.clone());
        }
        let record = CreditCardRecord {
            id: Uuid::new_v4().to_string(),
            user_id,
            masked_number: mask_card_number(&card.number),
            name_on_card: card.name_on_card.clone(),
            expires,
            gateway_token: card.token.clone(),
        };
        state.cards.insert(user_id, record.clone());
        Ok(record)
    }

    fn record_billing_address(&self, address: BillingAddress) -> CheckoutResult<()> {
        self.lock().addresses.push(address);
        Ok(())
    }

    fn orders_without_transactions(&self) -> Vec<Order> {
        let state = self.lock();
        state
            .orders
            .values()
            .filter(|o| {
                !state
                    .transactions
                    .values()
                    .any(|t| t.order_id.as_deref() == Some(o.id.as_str()))
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    fn usd(cents: i64) -> Price {
        Price::from_cents(cents, Currency::USD)
    }

    fn card() -> CardDetails {
        CardDetails {
            number: "4242 4242 4242 4242".into(),
            name_on_card: "Ada Lovelace".into(),
            expiry: "04/27".into(),
            card_type: "visa".into(),
            token: Some("tok_abc".into()),
        }
    }

    #[test]
    fn test_order_then_transaction() {
        let ledger = InMemoryLedger::new();
        let order = ledger
            .commit_order(7, usd(1350), Vec::new(), Some("SAVE10".into()))
            .unwrap();

        let txn = ledger
            .commit_transaction(NewTransaction {
                order_id: Some(order.id.clone()),
                user_id: 7,
                amount: usd(1350),
                billing_method_id: 2,
                card_id: None,
                external_id: None,
                recurring: false,
                plan_id: None,
            })
            .unwrap();

        assert_eq!(txn.status, TransactionStatus::Created);
        assert!(ledger.orders_without_transactions().is_empty());
    }

    #[test]
    fn test_orphaned_order_detected() {
        let ledger = InMemoryLedger::new();
        ledger.commit_order(7, usd(500), Vec::new(), None).unwrap();
        assert_eq!(ledger.orders_without_transactions().len(), 1);
    }

    #[test]
    fn test_status_and_external_id() {
        let ledger = InMemoryLedger::new();
        let txn = ledger
            .commit_transaction(NewTransaction {
                order_id: None,
                user_id: 7,
                amount: usd(500),
                billing_method_id: 1,
                card_id: None,
                external_id: None,
                recurring: false,
                plan_id: None,
            })
            .unwrap();

        ledger.set_external_id(&txn.id, "PAY-123").unwrap();
        ledger
            .set_transaction_status(&txn.id, TransactionStatus::AwaitingCallback, None)
            .unwrap();

        let found = ledger.transaction_by_external_id("PAY-123").unwrap();
        assert_eq!(found.id, txn.id);
        assert_eq!(found.status, TransactionStatus::AwaitingCallback);
    }

    #[test]
    fn test_status_transition_claim_applies_once() {
        let ledger = InMemoryLedger::new();
        let txn = ledger
            .commit_transaction(NewTransaction {
                order_id: None,
                user_id: 7,
                amount: usd(500),
                billing_method_id: 1,
                card_id: None,
                external_id: None,
                recurring: false,
                plan_id: None,
            })
            .unwrap();
        ledger
            .set_transaction_status(&txn.id, TransactionStatus::AwaitingCallback, None)
            .unwrap();

        assert!(ledger
            .set_transaction_status_if(
                &txn.id,
                TransactionStatus::AwaitingCallback,
                TransactionStatus::Confirmed,
                None,
            )
            .unwrap());

        // the claim is spent: a second transition from the same
        // expected state must be refused
        assert!(!ledger
            .set_transaction_status_if(
                &txn.id,
                TransactionStatus::AwaitingCallback,
                TransactionStatus::Failed,
                Some("late decline".into()),
            )
            .unwrap());

        let txn = ledger.transaction(&txn.id).unwrap();
        assert_eq!(txn.status, TransactionStatus::Confirmed);
        assert!(txn.failure_reason.is_none());
    }

    #[test]
    fn test_check_or_create_card_is_idempotent() {
        let ledger = InMemoryLedger::new();
        let first = ledger.check_or_create_card(7, &card()).unwrap();
        let second = ledger.check_or_create_card(7, &card()).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.masked_number, "****4242");
        assert_eq!(first.expires, NaiveDate::from_ymd_opt(2027, 4, 1).unwrap());
    }

    #[test]
    fn test_bad_expiry_rejected() {
        let ledger = InMemoryLedger::new();
        let mut bad = card();
        bad.expiry = "13/27".into();
        assert!(matches!(
            ledger.check_or_create_card(7, &bad).unwrap_err(),
            CheckoutError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_order_lines_from_cart_sum_to_total() {
        use crate::cart::CartLine;

        let lines: Vec<CartLine> = (1..=3)
            .map(|i| CartLine {
                item_id: format!("track-{i}"),
                name: format!("Track {i}"),
                unit_price: usd(500),
            })
            .collect();

        let order_lines = order_lines_from_cart(&lines, usd(1000));
        let sum: i64 = order_lines.iter().map(|l| l.amount.amount).sum();
        assert_eq!(sum, 1000);
        assert_eq!(order_lines.len(), 3);
    }
}
