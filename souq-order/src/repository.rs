use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use souq_core::error::{Error, Result};
use souq_core::gateway::PaymentStatus;

use crate::models::{AssignmentStatus, Order};

/// Result of the atomic payment check-and-set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentClaim {
    /// This caller flipped pending → paid and owns the side effects
    Claimed,
    /// Another entry point already applied the payment; no-op success
    AlreadyPaid,
    /// Payment is in a state that cannot become paid
    NotPending(PaymentStatus),
}

/// Consistent snapshot taken in the same transaction that flips an assignment
#[derive(Debug, Clone)]
pub struct AssignmentOutcome {
    pub all_confirmed: bool,
    pub item_ids: Vec<Uuid>,
}

/// Order aggregate persistence.
///
/// `claim_payment` and `respond_assignment` are the two operations whose
/// atomicity the workflow depends on; implementations must make them single
/// storage-level operations, not read-modify-write pairs.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;

    async fn fetch(&self, order_number: &str) -> Result<Option<Order>>;

    /// Write back the full aggregate (items, assignments, payment,
    /// notifications, payouts, derived status) in one unit of work
    async fn persist(&self, order: &Order) -> Result<()>;

    /// Atomic compare-and-set of payment status pending → paid, recording
    /// the winning transaction id
    async fn claim_payment(&self, order_number: &str, transaction_id: &str)
        -> Result<PaymentClaim>;

    /// Flip a pending assignment and evaluate "all confirmed" against a
    /// consistent snapshot of every assignment on the order
    async fn respond_assignment(
        &self,
        order_number: &str,
        vendor_id: Uuid,
        confirm: bool,
        reason: Option<String>,
    ) -> Result<AssignmentOutcome>;

    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<Order>>;

    async fn list_for_vendor(&self, vendor_id: Uuid) -> Result<Vec<Order>>;

    async fn list_all(&self) -> Result<Vec<Order>>;

    /// The only mutation allowed on a recorded notification
    async fn mark_notification_read(&self, order_number: &str, note_id: Uuid) -> Result<()>;
}

/// In-memory order store; a single write lock makes the claim and the
/// assignment flip trivially atomic. The Postgres twin lives in souq-store.
#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.order_number) {
            return Err(Error::conflict(format!(
                "order {} already exists",
                order.order_number
            )));
        }
        orders.insert(order.order_number.clone(), order.clone());
        Ok(())
    }

    async fn fetch(&self, order_number: &str) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(order_number).cloned())
    }

    async fn persist(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.order_number) {
            Some(slot) => {
                *slot = order.clone();
                Ok(())
            }
            None => Err(Error::not_found(format!(
                "order {} not found",
                order.order_number
            ))),
        }
    }

    async fn claim_payment(
        &self,
        order_number: &str,
        transaction_id: &str,
    ) -> Result<PaymentClaim> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_number)
            .ok_or_else(|| Error::not_found(format!("order {order_number} not found")))?;

        match order.payment.status {
            PaymentStatus::Pending => {
                order.payment.status = PaymentStatus::Paid;
                order.payment.transaction_id = Some(transaction_id.to_string());
                order.payment.paid_at = Some(Utc::now());
                order.updated_at = Utc::now();
                Ok(PaymentClaim::Claimed)
            }
            PaymentStatus::Paid => Ok(PaymentClaim::AlreadyPaid),
            other => Ok(PaymentClaim::NotPending(other)),
        }
    }

    async fn respond_assignment(
        &self,
        order_number: &str,
        vendor_id: Uuid,
        confirm: bool,
        reason: Option<String>,
    ) -> Result<AssignmentOutcome> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_number)
            .ok_or_else(|| Error::not_found(format!("order {order_number} not found")))?;

        let assignment = order
            .assignments
            .iter_mut()
            .find(|a| a.vendor_id == vendor_id)
            .ok_or_else(|| {
                Error::authorization(format!("no assignment for vendor {vendor_id} on this order"))
            })?;

        if assignment.status != AssignmentStatus::Pending {
            return Err(Error::conflict("assignment has already been responded to"));
        }

        assignment.status = if confirm {
            AssignmentStatus::Confirmed
        } else {
            AssignmentStatus::Rejected
        };
        assignment.rejection_reason = reason;
        assignment.responded_at = Some(Utc::now());
        let item_ids = assignment.item_ids.clone();

        // Membership test against the same snapshot the flip happened in
        let all_confirmed = order
            .assignments
            .iter()
            .all(|a| a.status == AssignmentStatus::Confirmed);

        order.updated_at = Utc::now();
        Ok(AssignmentOutcome {
            all_confirmed,
            item_ids,
        })
    }

    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut found: Vec<Order> = orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn list_for_vendor(&self, vendor_id: Uuid) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut found: Vec<Order> = orders
            .values()
            .filter(|o| o.assignment_for(vendor_id).is_some())
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut found: Vec<Order> = orders.values().cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn mark_notification_read(&self, order_number: &str, note_id: Uuid) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_number)
            .ok_or_else(|| Error::not_found(format!("order {order_number} not found")))?;

        let note = order
            .notifications
            .iter_mut()
            .find(|n| n.id == note_id)
            .ok_or_else(|| Error::not_found(format!("notification {note_id} not found")))?;

        note.is_read = true;
        Ok(())
    }
}
