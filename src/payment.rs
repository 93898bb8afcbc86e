use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::Money;

/// What the caller tendered for a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// e.g. "card", "upi", "wallet"
    pub method: String,
    pub amount: Money,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

/// Accept/reject call to the payment provider. May perform I/O, so the
/// engine never calls it while holding a resource lock.
#[async_trait]
pub trait PaymentAuthorizer: Send + Sync {
    async fn authorize(&self, amount: Money, details: &PaymentDetails) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl PaymentAuthorizer for AcceptAll {
    async fn authorize(&self, _amount: Money, _details: &PaymentDetails) -> bool {
        true
    }
}

/// Approves when the tendered amount is positive and covers the price.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmountCovers;

#[async_trait]
impl PaymentAuthorizer for AmountCovers {
    async fn authorize(&self, amount: Money, details: &PaymentDetails) -> bool {
        details.amount > 0 && details.amount >= amount
    }
}
