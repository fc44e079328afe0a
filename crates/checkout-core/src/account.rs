//! # Accounts
//!
//! Seam for the user-management collaborator. Checkout only needs two
//! things from it: an authenticated user id, or the ability to provision
//! an account for a guest at the start of checkout.

use crate::error::{CheckoutError, CheckoutResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Profile supplied by a guest checking out without an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountProfile {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub business_type_id: Option<u32>,
}

impl AccountProfile {
    /// Minimal field validation before account provisioning
    pub fn validate(&self) -> CheckoutResult<()> {
        if self.name.trim().is_empty() {
            return Err(CheckoutError::InvalidRequest("Name is required".into()));
        }
        if !self.email.contains('@') {
            return Err(CheckoutError::InvalidRequest(format!(
                "Invalid email address: {}",
                self.email
            )));
        }
        Ok(())
    }
}

/// User-management collaborator
pub trait AccountProvider: Send + Sync {
    fn create_account(&self, profile: &AccountProfile) -> CheckoutResult<u64>;
}

/// In-memory account provider handing out sequential ids
#[derive(Debug)]
pub struct SequentialAccounts {
    next_id: AtomicU64,
}

impl SequentialAccounts {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialAccounts {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountProvider for SequentialAccounts {
    fn create_account(&self, profile: &AccountProfile) -> CheckoutResult<u64> {
        profile.validate()?;
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}
