//! # Coupons
//!
//! Discount codes with activity, usage-limit and expiry rules.
//!
//! Rule evaluation order is fixed: not-found, inactive, exhausted, expired.
//! The first failing check wins, so error messages are deterministic.
//! Validation runs both when a coupon is applied to a cart and again at
//! checkout commit, because usage count and expiry are mutable between
//! the two events.

use crate::error::{CheckoutError, CheckoutResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// A discount coupon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    /// Coupon code as entered by the user
    pub code: String,

    /// Percentage off the cart subtotal (0-100)
    pub discount_percent: u8,

    /// Whether the coupon is currently enabled
    pub active: bool,

    /// How many redemptions remain
    pub remaining_uses: u32,

    /// Last instant at which the coupon may be redeemed
    pub expires_at: DateTime<Utc>,
}

impl Coupon {
    /// Evaluate the coupon rules in fixed precedence order:
    /// inactive, exhausted, expired.
    pub fn check(&self, now: DateTime<Utc>) -> CheckoutResult<()> {
        if !self.active {
            return Err(CheckoutError::CouponInactive {
                code: self.code.clone(),
            });
        }
        if self.remaining_uses == 0 {
            return Err(CheckoutError::CouponExhausted {
                code: self.code.clone(),
            });
        }
        if now > self.expires_at {
            return Err(CheckoutError::CouponExpired {
                code: self.code.clone(),
            });
        }
        Ok(())
    }
}

/// Shared coupon lookup and redemption
///
/// `redeem` is the only mutation this crate performs on coupons;
/// administrative CRUD lives elsewhere.
pub trait CouponStore: Send + Sync {
    /// Find a coupon by code
    fn find(&self, code: &str) -> Option<Coupon>;

    /// Validate a coupon without consuming a use
    fn validate(&self, code: &str, now: DateTime<Utc>) -> CheckoutResult<Coupon> {
        let coupon = self.find(code).ok_or_else(|| CheckoutError::CouponNotFound {
            code: code.to_string(),
        })?;
        coupon.check(now)?;
        Ok(coupon)
    }

    /// Re-validate and consume one use atomically.
    ///
    /// The check and the decrement must happen under a single critical
    /// section so two concurrent checkouts can never both pass a usage
    /// cap of 1.
    fn redeem(&self, code: &str, now: DateTime<Utc>) -> CheckoutResult<Coupon>;
}

/// In-memory coupon store
///
/// One mutex guards both lookup and decrement, which gives `redeem`
/// its compare-and-decrement atomicity.
#[derive(Debug, Default)]
pub struct InMemoryCouponStore {
    coupons: Mutex<HashMap<String, Coupon>>,
}

impl InMemoryCouponStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a coupon (admin-side setup)
    pub fn insert(&self, coupon: Coupon) {
        self.coupons
            .lock()
            .expect("coupon store lock poisoned")
            .insert(coupon.code.clone(), coupon);
    }

    /// Seed from a list (e.g. parsed from `config/coupons.toml`)
    pub fn with_coupons(coupons: Vec<Coupon>) -> Self {
        let store = Self::new();
        for coupon in coupons {
            store.insert(coupon);
        }
        store
    }
}

impl CouponStore for InMemoryCouponStore {
    fn find(&self, code: &str) -> Option<Coupon> {
        self.coupons
            .lock()
            .expect("coupon store lock poisoned")
            .get(code)
            .cloned()
    }

    fn redeem(&self, code: &str, now: DateTime<Utc>) -> CheckoutResult<Coupon> {
        let mut coupons = self.coupons.lock().expect("coupon store lock poisoned");
        let coupon = coupons
            .get_mut(code)
            .ok_or_else(|| CheckoutError::CouponNotFound {
                code: code.to_string(),
            })?;
        coupon.check(now)?;
        coupon.remaining_uses -= 1;
        Ok(coupon.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(active: bool, remaining: u32, expired: bool) -> Coupon {
        let offset = if expired {
            Duration::days(-1)
        } else {
            Duration::days(1)
        };
        Coupon {
            code: "SAVE10".into(),
            discount_percent: 10,
            active,
            remaining_uses: remaining,
            expires_at: Utc::now() + offset,
        }
    }

    #[test]
    fn test_valid_coupon_passes() {
        assert!(coupon(true, 1, false).check(Utc::now()).is_ok());
    }

    #[test]
    fn test_precedence_inactive_wins() {
        // Inactive, exhausted and expired all at once: the inactive rule
        // must be the one reported.
        let c = coupon(false, 0, true);
        let err = c.check(Utc::now()).unwrap_err();
        assert!(matches!(err, CheckoutError::CouponInactive { .. }));
    }

    #[test]
    fn test_precedence_exhausted_before_expired() {
        let c = coupon(true, 0, true);
        let err = c.check(Utc::now()).unwrap_err();
        assert!(matches!(err, CheckoutError::CouponExhausted { .. }));
    }

    #[test]
    fn test_expired() {
        let c = coupon(true, 3, true);
        let err = c.check(Utc::now()).unwrap_err();
        assert!(matches!(err, CheckoutError::CouponExpired { .. }));
    }

    #[test]
    fn test_store_validate_not_found() {
        let store = InMemoryCouponStore::new();
        let err = store.validate("NOPE", Utc::now()).unwrap_err();
        assert!(matches!(err, CheckoutError::CouponNotFound { .. }));
    }

    #[test]
    fn test_redeem_decrements() {
        let store = InMemoryCouponStore::new();
        store.insert(coupon(true, 2, false));

        store.redeem("SAVE10", Utc::now()).unwrap();
        assert_eq!(store.find("SAVE10").unwrap().remaining_uses, 1);

        store.redeem("SAVE10", Utc::now()).unwrap();
        let err = store.redeem("SAVE10", Utc::now()).unwrap_err();
        assert!(matches!(err, CheckoutError::CouponExhausted { .. }));
        assert_eq!(store.find("SAVE10").unwrap().remaining_uses, 0);
    }

    #[test]
    fn test_concurrent_redeem_single_use() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryCouponStore::new());
        store.insert(coupon(true, 1, false));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.redeem("SAVE10", Utc::now()))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
    }
}
