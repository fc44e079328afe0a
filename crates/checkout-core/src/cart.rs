//! # Session Carts
//!
//! Session-scoped cart state: line items plus the currently applied
//! coupon. Carts hold no business rules beyond line uniqueness; pricing
//! and coupon rules live in their own modules.
//!
//! Storage is behind the `CartBackend` seam (in-memory map here, a
//! persistent key-value store in production). Mutations within one
//! session are serialized by a per-session lock held across the whole
//! load-mutate-save cycle, so concurrent requests from the same session
//! cannot lose updates to the line set.

use crate::catalog::Catalog;
use crate::coupon::{Coupon, CouponStore};
use crate::error::{CheckoutError, CheckoutResult};
use crate::money::Price;
use crate::pricing::{CartTotals, PricingConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A single cart line: the item and the unit price snapshotted when it
/// was added
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: String,
    pub name: String,
    pub unit_price: Price,
}

/// The durable-per-session part of a cart
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartState {
    pub lines: Vec<CartLine>,
    pub coupon: Option<Coupon>,
}

/// Ephemeral view of a cart with totals; recomputed on every read
#[derive(Debug, Clone)]
pub struct CartSnapshot {
    pub lines: Vec<CartLine>,
    pub coupon: Option<Coupon>,
    pub totals: CartTotals,
}

/// Removal target for `remove_item`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveTarget {
    Item(String),
    All,
}

/// Storage seam for session carts
pub trait CartBackend: Send + Sync {
    fn load(&self, session_id: &str) -> Option<CartState>;
    fn save(&self, session_id: &str, state: CartState);
    fn remove(&self, session_id: &str);
}

/// In-memory cart backend (tests and single-node deployments)
#[derive(Debug, Default)]
pub struct InMemoryCartBackend {
    carts: Mutex<HashMap<String, CartState>>,
}

impl InMemoryCartBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CartBackend for InMemoryCartBackend {
    fn load(&self, session_id: &str) -> Option<CartState> {
        self.carts
            .lock()
            .expect("cart backend lock poisoned")
            .get(session_id)
            .cloned()
    }

    fn save(&self, session_id: &str, state: CartState) {
        self.carts
            .lock()
            .expect("cart backend lock poisoned")
            .insert(session_id.to_string(), state);
    }

    fn remove(&self, session_id: &str) {
        self.carts
            .lock()
            .expect("cart backend lock poisoned")
            .remove(session_id);
    }
}

/// Cart operations over a pluggable backend
pub struct CartStore {
    backend: Arc<dyn CartBackend>,
    catalog: Arc<dyn Catalog>,
    coupons: Arc<dyn CouponStore>,
    pricing: PricingConfig,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CartStore {
    pub fn new(
        backend: Arc<dyn CartBackend>,
        catalog: Arc<dyn Catalog>,
        coupons: Arc<dyn CouponStore>,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            backend,
            catalog,
            coupons,
            pricing,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// Single-writer discipline: one lock per session, held across
    /// load-mutate-save
    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .session_locks
            .lock()
            .expect("cart session lock table poisoned");
        Arc::clone(
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    fn with_state<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut CartState) -> CheckoutResult<T>,
    ) -> CheckoutResult<T> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().expect("cart session lock poisoned");

        let mut state = self.backend.load(session_id).unwrap_or_default();
        let out = f(&mut state)?;
        self.backend.save(session_id, state);
        Ok(out)
    }

    /// Add an item to the cart. Returns the resulting line count.
    ///
    /// An item may appear at most once per cart.
    pub fn add_item(&self, session_id: &str, item_id: &str) -> CheckoutResult<usize> {
        let item = self
            .catalog
            .lookup(item_id)
            .ok_or_else(|| CheckoutError::ItemNotFound {
                item_id: item_id.to_string(),
            })?;
        if !item.active {
            return Err(CheckoutError::ItemNotActive {
                item_id: item_id.to_string(),
            });
        }

        let unit_price = self.pricing.unit_price;
        self.with_state(session_id, |state| {
            if state.lines.iter().any(|l| l.item_id == item.id) {
                return Err(CheckoutError::DuplicateItem {
                    item_id: item.id.clone(),
                });
            }
            state.lines.push(CartLine {
                item_id: item.id.clone(),
                name: item.name.clone(),
                unit_price,
            });
            Ok(state.lines.len())
        })
    }

    /// Remove one line or all lines. The coupon stays applied.
    pub fn remove_item(&self, session_id: &str, target: RemoveTarget) -> CheckoutResult<usize> {
        self.with_state(session_id, |state| {
            match &target {
                RemoveTarget::All => state.lines.clear(),
                RemoveTarget::Item(id) => state.lines.retain(|l| &l.item_id != id),
            }
            Ok(state.lines.len())
        })
    }

    /// Ordered list of cart lines
    pub fn list_items(&self, session_id: &str) -> Vec<CartLine> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().expect("cart session lock poisoned");
        self.backend
            .load(session_id)
            .map(|s| s.lines)
            .unwrap_or_default()
    }

    pub fn count(&self, session_id: &str) -> usize {
        self.list_items(session_id).len()
    }

    /// Validate a coupon and attach it to the cart.
    ///
    /// Validation here does not consume a use; the atomic redemption
    /// happens again at checkout commit.
    pub fn apply_coupon(
        &self,
        session_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> CheckoutResult<Coupon> {
        let coupon = self.coupons.validate(code, now)?;
        let applied = coupon.clone();
        self.with_state(session_id, move |state| {
            state.coupon = Some(coupon);
            Ok(())
        })?;
        Ok(applied)
    }

    /// Detach the coupon from the cart, if any
    pub fn clear_coupon(&self, session_id: &str) {
        let _ = self.with_state(session_id, |state| {
            state.coupon = None;
            Ok(())
        });
    }

    pub fn coupon(&self, session_id: &str) -> Option<Coupon> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().expect("cart session lock poisoned");
        self.backend.load(session_id).and_then(|s| s.coupon)
    }

    /// Drop the whole cart, lines and coupon both. Called only on
    /// confirmed checkout or explicit user request.
    pub fn clear(&self, session_id: &str) {
        let lock = self.session_lock(session_id);
        {
            let _guard = lock.lock().expect("cart session lock poisoned");
            self.backend.remove(session_id);
        }

        // Evict the session's lock entry so the table does not grow
        // with session churn. Strong count 2 means the table and this
        // frame hold the only references; a concurrent caller that
        // already cloned the Arc keeps the entry alive.
        let mut locks = self
            .session_locks
            .lock()
            .expect("cart session lock table poisoned");
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(session_id);
        }
    }

    #[cfg(test)]
    fn session_lock_entries(&self) -> usize {
        self.session_locks
            .lock()
            .expect("cart session lock table poisoned")
            .len()
    }

    /// Consistent read of lines, coupon and freshly computed totals
    pub fn snapshot(&self, session_id: &str) -> CartSnapshot {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().expect("cart session lock poisoned");

        let state = self.backend.load(session_id).unwrap_or_default();
        let totals = self.pricing.compute(state.lines.len(), state.coupon.as_ref());
        CartSnapshot {
            lines: state.lines,
            coupon: state.coupon,
            totals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogItem, ItemCatalog};
    use crate::coupon::InMemoryCouponStore;
    use crate::money::Currency;
    use chrono::Duration;

    fn test_store() -> CartStore {
        let mut catalog = ItemCatalog::new();
        catalog.add(CatalogItem {
            id: "track-1".into(),
            name: "Track One".into(),
            active: true,
        });
        catalog.add(CatalogItem {
            id: "track-2".into(),
            name: "Track Two".into(),
            active: true,
        });
        catalog.add(CatalogItem {
            id: "track-3".into(),
            name: "Track Three".into(),
            active: true,
        });
        catalog.add(CatalogItem {
            id: "retired".into(),
            name: "Retired".into(),
            active: false,
        });

        let coupons = InMemoryCouponStore::new();
        coupons.insert(Coupon {
            code: "SAVE10".into(),
            discount_percent: 10,
            active: true,
            remaining_uses: 1,
            expires_at: Utc::now() + Duration::days(1),
        });

        CartStore::new(
            Arc::new(InMemoryCartBackend::new()),
            Arc::new(catalog),
            Arc::new(coupons),
            PricingConfig::new(Price::from_cents(500, Currency::USD)),
        )
    }

    #[test]
    fn test_add_and_list() {
        let store = test_store();
        assert_eq!(store.add_item("s1", "track-1").unwrap(), 1);
        assert_eq!(store.add_item("s1", "track-2").unwrap(), 2);
        assert_eq!(store.list_items("s1").len(), 2);
        // other sessions see nothing
        assert_eq!(store.count("s2"), 0);
    }

    #[test]
    fn test_clear_evicts_session_lock() {
        let store = test_store();
        for i in 0..100 {
            let session = format!("s{i}");
            store.add_item(&session, "track-1").unwrap();
            store.clear(&session);
        }
        // session churn must not accumulate lock entries
        assert_eq!(store.session_lock_entries(), 0);

        // cleared sessions start fresh
        assert_eq!(store.add_item("s0", "track-1").unwrap(), 1);
    }

    #[test]
    fn test_duplicate_item_rejected() {
        let store = test_store();
        store.add_item("s1", "track-1").unwrap();
        let err = store.add_item("s1", "track-1").unwrap_err();
        assert!(matches!(err, CheckoutError::DuplicateItem { .. }));
        assert_eq!(store.count("s1"), 1);
    }

    #[test]
    fn test_unknown_and_inactive_items() {
        let store = test_store();
        assert!(matches!(
            store.add_item("s1", "missing").unwrap_err(),
            CheckoutError::ItemNotFound { .. }
        ));
        assert!(matches!(
            store.add_item("s1", "retired").unwrap_err(),
            CheckoutError::ItemNotActive { .. }
        ));
        assert_eq!(store.count("s1"), 0);
    }

    #[test]
    fn test_remove_one_and_all() {
        let store = test_store();
        store.add_item("s1", "track-1").unwrap();
        store.add_item("s1", "track-2").unwrap();

        assert_eq!(
            store
                .remove_item("s1", RemoveTarget::Item("track-1".into()))
                .unwrap(),
            1
        );
        assert_eq!(store.remove_item("s1", RemoveTarget::All).unwrap(), 0);
    }

    #[test]
    fn test_coupon_apply_and_totals() {
        let store = test_store();
        store.add_item("s1", "track-1").unwrap();
        store.add_item("s1", "track-2").unwrap();
        store.add_item("s1", "track-3").unwrap();

        store.apply_coupon("s1", "SAVE10", Utc::now()).unwrap();

        let snapshot = store.snapshot("s1");
        assert_eq!(snapshot.totals.subtotal.amount, 1500);
        assert_eq!(snapshot.totals.discount.amount, 150);
        assert_eq!(snapshot.totals.total.amount, 1350);

        store.clear_coupon("s1");
        assert!(store.coupon("s1").is_none());
        assert_eq!(store.snapshot("s1").totals.total.amount, 1500);
    }

    #[test]
    fn test_apply_unknown_coupon() {
        let store = test_store();
        store.add_item("s1", "track-1").unwrap();
        let err = store.apply_coupon("s1", "NOPE", Utc::now()).unwrap_err();
        assert!(matches!(err, CheckoutError::CouponNotFound { .. }));
        assert!(store.coupon("s1").is_none());
    }

    #[test]
    fn test_clear_drops_lines_and_coupon() {
        let store = test_store();
        store.add_item("s1", "track-1").unwrap();
        store.apply_coupon("s1", "SAVE10", Utc::now()).unwrap();

        store.clear("s1");
        assert_eq!(store.count("s1"), 0);
        assert!(store.coupon("s1").is_none());
    }

    #[test]
    fn test_concurrent_adds_serialize() {
        let store = Arc::new(test_store());

        let handles: Vec<_> = ["track-1", "track-2", "track-3"]
            .into_iter()
            .map(|id| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.add_item("s1", id))
            })
            .collect();

        for h in handles {
            h.join().unwrap().unwrap();
        }
        assert_eq!(store.count("s1"), 3);
    }
}
