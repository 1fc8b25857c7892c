use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Payment lifecycle state recorded on an order (wire-exact)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
    PartialRefund,
}

/// Outcome the gateway reports for a transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeStatus {
    Succeeded,
    Processing,
    Failed,
    Cancelled,
}

/// Hosted-checkout session handed back to the customer for redirect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySession {
    pub transaction_id: String,
    pub redirect_url: String,
    pub amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Transaction details as verified with the provider.
///
/// Every reconciliation entry point re-validates against this record rather
/// than trusting the callback payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCharge {
    pub transaction_id: String,
    pub order_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: ChargeStatus,
    pub card_brand: Option<String>,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub transaction_id: String,
    pub refunded_amount: Decimal,
    pub reference: String,
    pub issued_at: DateTime<Utc>,
}

/// Contract this system requires from the external payment provider.
///
/// All three methods are network-bound; callers bound them with a timeout
/// and treat failure as `Error::Gateway` (order left in its pre-transition
/// state).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted checkout session for an order
    async fn create_session(
        &self,
        order_number: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<GatewaySession>;

    /// Verify a transaction id directly with the provider
    async fn validate(&self, transaction_id: &str) -> Result<GatewayCharge>;

    /// Issue a (full or partial) refund against a settled transaction
    async fn refund(&self, transaction_id: &str, amount: Decimal) -> Result<RefundReceipt>;
}
