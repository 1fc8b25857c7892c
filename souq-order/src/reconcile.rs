use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use souq_core::error::{Error, Result};
use souq_core::gateway::{
    ChargeStatus, GatewayCharge, GatewaySession, PaymentGateway, RefundReceipt,
};
use souq_core::gateway::PaymentStatus;

use crate::engine::OrderWorkflowEngine;
use crate::models::Order;

/// Asynchronous gateway notification, independent of the customer's browser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpnNotice {
    pub order_number: String,
    pub transaction_id: String,
    pub status: String,
}

/// Applies gateway callbacks to the workflow exactly once per transaction.
///
/// Three independent entry points can report the same payment: the customer
/// redirect, the IPN webhook, and an admin-triggered status check. All three
/// funnel into the engine's atomic payment claim, so whichever fires first
/// wins and the rest observe a no-op success.
pub struct PaymentReconciler {
    engine: Arc<OrderWorkflowEngine>,
}

impl PaymentReconciler {
    pub fn new(engine: Arc<OrderWorkflowEngine>) -> Self {
        Self { engine }
    }

    /// Customer redirect after a successful checkout
    pub async fn redirect_success(
        &self,
        order_number: &str,
        transaction_id: &str,
    ) -> Result<Order> {
        self.engine
            .reconcile_transaction(order_number, transaction_id)
            .await
    }

    /// Customer redirect after a failed or abandoned checkout
    pub async fn redirect_failure(
        &self,
        order_number: &str,
        transaction_id: &str,
    ) -> Result<Order> {
        self.engine
            .record_payment_failure(order_number, transaction_id)
            .await
    }

    /// Gateway webhook; the payload's status string decides the path
    pub async fn ipn(&self, notice: &IpnNotice) -> Result<Order> {
        match notice.status.to_ascii_lowercase().as_str() {
            "success" | "paid" | "succeeded" => {
                self.engine
                    .reconcile_transaction(&notice.order_number, &notice.transaction_id)
                    .await
            }
            "failed" | "cancelled" | "canceled" => {
                self.engine
                    .record_payment_failure(&notice.order_number, &notice.transaction_id)
                    .await
            }
            other => Err(Error::validation(format!("unknown IPN status '{other}'"))),
        }
    }

    /// Admin-triggered status check; re-validates with the provider and
    /// applies the outcome if the money actually moved
    pub async fn check_status(&self, order_number: &str) -> Result<Order> {
        let order = self.engine.get(order_number).await?;

        if order.payment.status != PaymentStatus::Pending {
            return Ok(order);
        }
        let Some(transaction_id) = order.payment.transaction_id.clone() else {
            // No session was ever opened; nothing to check against
            return Ok(order);
        };

        self.engine
            .reconcile_transaction(order_number, &transaction_id)
            .await
    }
}

// ============================================================================
// Mock gateway
// ============================================================================

/// In-process gateway double used by tests and local wiring.
///
/// Sessions opened through it settle with `default_outcome`; individual
/// transactions can be registered or overridden to exercise failure paths.
pub struct MockGateway {
    charges: Mutex<HashMap<String, GatewayCharge>>,
    refunds: Mutex<Vec<RefundReceipt>>,
    default_outcome: ChargeStatus,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::with_outcome(ChargeStatus::Succeeded)
    }

    pub fn with_outcome(default_outcome: ChargeStatus) -> Self {
        Self {
            charges: Mutex::new(HashMap::new()),
            refunds: Mutex::new(Vec::new()),
            default_outcome,
        }
    }

    /// Pre-register a transaction the way a real provider would know it
    pub fn register(
        &self,
        transaction_id: &str,
        order_number: &str,
        amount: Decimal,
        status: ChargeStatus,
    ) {
        let charge = GatewayCharge {
            transaction_id: transaction_id.to_string(),
            order_number: order_number.to_string(),
            amount,
            currency: "BDT".to_string(),
            status,
            card_brand: Some("VISA".to_string()),
            verified_at: Utc::now(),
        };
        self.charges
            .lock()
            .expect("mock gateway lock")
            .insert(transaction_id.to_string(), charge);
    }

    pub fn issued_refunds(&self) -> Vec<RefundReceipt> {
        self.refunds.lock().expect("mock gateway lock").clone()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_session(
        &self,
        order_number: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<GatewaySession> {
        let transaction_id = format!("mock_tx_{}", &Uuid::new_v4().simple().to_string()[..12]);

        let charge = GatewayCharge {
            transaction_id: transaction_id.clone(),
            order_number: order_number.to_string(),
            amount,
            currency: currency.to_string(),
            status: self.default_outcome.clone(),
            card_brand: Some("VISA".to_string()),
            verified_at: Utc::now(),
        };
        self.charges
            .lock()
            .expect("mock gateway lock")
            .insert(transaction_id.clone(), charge);

        Ok(GatewaySession {
            redirect_url: format!("https://gateway.test/checkout/{transaction_id}"),
            transaction_id,
            amount,
            currency: currency.to_string(),
            created_at: Utc::now(),
        })
    }

    async fn validate(&self, transaction_id: &str) -> Result<GatewayCharge> {
        self.charges
            .lock()
            .expect("mock gateway lock")
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| Error::gateway(format!("unknown transaction {transaction_id}")))
    }

    async fn refund(&self, transaction_id: &str, amount: Decimal) -> Result<RefundReceipt> {
        let known = self
            .charges
            .lock()
            .expect("mock gateway lock")
            .contains_key(transaction_id);
        if !known {
            return Err(Error::gateway(format!(
                "cannot refund unknown transaction {transaction_id}"
            )));
        }

        let receipt = RefundReceipt {
            transaction_id: transaction_id.to_string(),
            refunded_amount: amount,
            reference: format!("mock_rf_{}", &Uuid::new_v4().simple().to_string()[..12]),
            issued_at: Utc::now(),
        };
        self.refunds
            .lock()
            .expect("mock gateway lock")
            .push(receipt.clone());
        Ok(receipt)
    }
}
