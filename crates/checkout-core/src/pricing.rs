//! # Pricing Engine
//!
//! Computes the authoritative charge amount for a cart snapshot.
//!
//! The catalog uses a single flat per-item rate, so the subtotal is
//! `line_count * unit_price`. The totals computed here are the numbers
//! persisted into Order and Transaction; nothing downstream recomputes
//! them, so what the user saw is always what was charged.

use crate::coupon::Coupon;
use crate::money::Price;
use serde::{Deserialize, Serialize};

/// Pricing configuration
#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Flat per-item rate applied to every cart line
    pub unit_price: Price,
}

/// Ephemeral cart totals, recomputed on every read and never persisted
/// as a standalone record
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Price,
    pub discount: Price,
    pub total: Price,
}

impl PricingConfig {
    pub fn new(unit_price: Price) -> Self {
        Self { unit_price }
    }

    /// Compute subtotal, discount and total for a cart.
    ///
    /// Pure function of the inputs: same `(line_count, coupon)` always
    /// yields the same totals. The discount is rounded half-up at cent
    /// precision.
    pub fn compute(&self, line_count: usize, coupon: Option<&Coupon>) -> CartTotals {
        let currency = self.unit_price.currency;
        let subtotal = self.unit_price.amount * line_count as i64;

        let discount = match coupon {
            Some(c) => half_up_percent(subtotal, c.discount_percent),
            None => 0,
        };

        CartTotals {
            subtotal: Price::from_cents(subtotal, currency),
            discount: Price::from_cents(discount, currency),
            total: Price::from_cents(subtotal - discount, currency),
        }
    }
}

/// `amount * percent / 100`, rounded half-up in integer cents
fn half_up_percent(amount: i64, percent: u8) -> i64 {
    (amount * percent as i64 + 50) / 100
}

/// Split a total evenly across `count` lines in cents.
///
/// Any remainder lands on the first line so the shares always sum back
/// to the total (used when recording one PurchasedItem per cart line).
pub fn split_even(total: i64, count: usize) -> Vec<i64> {
    if count == 0 {
        return Vec::new();
    }
    let count = count as i64;
    let share = total / count;
    let remainder = total - share * count;
    (0..count)
        .map(|i| if i == 0 { share + remainder } else { share })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use chrono::{Duration, Utc};

    fn config(unit_cents: i64) -> PricingConfig {
        PricingConfig::new(Price::from_cents(unit_cents, Currency::USD))
    }

    fn save10() -> Coupon {
        Coupon {
            code: "SAVE10".into(),
            discount_percent: 10,
            active: true,
            remaining_uses: 1,
            expires_at: Utc::now() + Duration::days(1),
        }
    }

    #[test]
    fn test_subtotal_without_coupon() {
        let totals = config(500).compute(3, None);
        assert_eq!(totals.subtotal.amount, 1500);
        assert_eq!(totals.discount.amount, 0);
        assert_eq!(totals.total.amount, 1500);
    }

    #[test]
    fn test_save10_example() {
        // 3 items at $5.00 with 10% off: subtotal 15.00, discount 1.50,
        // total 13.50
        let totals = config(500).compute(3, Some(&save10()));
        assert_eq!(totals.subtotal.amount, 1500);
        assert_eq!(totals.discount.amount, 150);
        assert_eq!(totals.total.amount, 1350);
    }

    #[test]
    fn test_compute_is_pure() {
        let cfg = config(500);
        let coupon = save10();
        let a = cfg.compute(3, Some(&coupon));
        let b = cfg.compute(3, Some(&coupon));
        assert_eq!(a.total, b.total);
        assert_eq!(a.discount, b.discount);
    }

    #[test]
    fn test_half_up_rounding() {
        // 3 items at $0.05 with 33% off: discount is 4.95 cents,
        // rounded half-up to 5
        let totals = config(5).compute(3, Some(&{
            let mut c = save10();
            c.discount_percent = 33;
            c
        }));
        assert_eq!(totals.discount.amount, 5);
        assert_eq!(totals.total.amount, 10);
    }

    #[test]
    fn test_empty_cart_totals_zero() {
        let totals = config(500).compute(0, None);
        assert_eq!(totals.total.amount, 0);
    }

    #[test]
    fn test_split_even() {
        assert_eq!(split_even(1350, 3), vec![450, 450, 450]);
        assert_eq!(split_even(1000, 3), vec![334, 333, 333]);
        assert_eq!(split_even(1000, 3).iter().sum::<i64>(), 1000);
        assert!(split_even(100, 0).is_empty());
    }
}
