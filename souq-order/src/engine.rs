use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use souq_cart::models::{CartCharges, DraftItem, OrderDraft};
use souq_cart::repository::CartStore;
use souq_catalog::inventory::InventoryLedger;
use souq_core::error::{Error, Result};
use souq_core::gateway::{ChargeStatus, GatewaySession, PaymentGateway, PaymentStatus};
use souq_core::identity::Actor;
use souq_core::notify::{
    AdminDirectory, Notification, NotificationKind, NotificationSink, Recipient,
};
use souq_shared::models::events::{
    OrderPaidEvent, OrderPlacedEvent, SettlementEvent, VendorRespondedEvent,
};

use crate::models::{Address, ApprovalStatus, ItemStatus, Order, OrderStatus};
use crate::payouts::{compute_payouts, PayoutRates};
use crate::repository::{OrderStore, PaymentClaim};

/// Tunables for the workflow engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub charges: CartCharges,
    pub payout_rates: PayoutRates,
    pub currency: String,
    /// Upper bound on any single gateway or delivery call
    pub gateway_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            charges: CartCharges::default(),
            payout_rates: PayoutRates::default(),
            currency: "BDT".to_string(),
            gateway_timeout: Duration::from_secs(10),
        }
    }
}

/// Drives the order state machine.
///
/// Owns every legal transition; callers (HTTP handlers, the payment
/// reconciler) never mutate an order directly. Order-level status is always
/// recomputed from sub-state inside the same unit of work as the mutation.
pub struct OrderWorkflowEngine {
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn InventoryLedger>,
    gateway: Arc<dyn PaymentGateway>,
    carts: Arc<dyn CartStore>,
    admins: Arc<dyn AdminDirectory>,
    sink: Arc<dyn NotificationSink>,
    config: EngineConfig,
}

impl OrderWorkflowEngine {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn InventoryLedger>,
        gateway: Arc<dyn PaymentGateway>,
        carts: Arc<dyn CartStore>,
        admins: Arc<dyn AdminDirectory>,
        sink: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            orders,
            ledger,
            gateway,
            carts,
            admins,
            sink,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Checkout path: materialize a validated cart draft into an order.
    /// The cart is cleared only after the order is durably created.
    pub async fn place_from_draft(
        &self,
        draft: OrderDraft,
        shipping_address: Address,
        billing_address: Option<Address>,
    ) -> Result<Order> {
        let customer_id = draft.customer_id.clone();
        let mut order =
            Order::from_draft(draft, shipping_address, billing_address, &self.config.charges)?;

        let message = format!("order {} awaits approval", order.order_number);
        self.notify_admins(&mut order, NotificationKind::OrderPlaced, message)
            .await?;

        self.orders.insert(&order).await?;

        if let Err(e) = self.carts.clear(&customer_id).await {
            tracing::warn!(order_number = %order.order_number, "failed to clear cart: {e}");
        }

        self.deliver_notes(&order, 0).await;
        self.log_placed(&order);
        Ok(order)
    }

    /// Direct order path: ad-hoc item list, no cart involved
    pub async fn place_direct(
        &self,
        customer_id: String,
        items: &[DraftItem],
        discount: Decimal,
        shipping_address: Address,
        billing_address: Option<Address>,
    ) -> Result<Order> {
        let mut order = Order::from_items(
            customer_id,
            items,
            discount,
            shipping_address,
            billing_address,
            &self.config.charges,
        )?;

        let message = format!("order {} awaits approval", order.order_number);
        self.notify_admins(&mut order, NotificationKind::OrderPlaced, message)
            .await?;

        self.orders.insert(&order).await?;
        self.deliver_notes(&order, 0).await;
        self.log_placed(&order);
        Ok(order)
    }

    // ------------------------------------------------------------------
    // Admin approval
    // ------------------------------------------------------------------

    /// Approve and immediately fan out to vendor assignments
    pub async fn approve(&self, actor: &Actor, order_number: &str) -> Result<Order> {
        let admin = actor.require_admin()?.to_string();
        let mut order = self.fetch_required(order_number).await?;

        if order.admin_approval.status != ApprovalStatus::Pending {
            return Err(Error::conflict("approval has already been decided"));
        }

        order.admin_approval.status = ApprovalStatus::Approved;
        order.admin_approval.decided_by = Some(admin);
        order.admin_approval.decided_at = Some(Utc::now());
        order.build_assignments();

        let mark = order.notifications.len();
        order.push_note(Notification::new(
            NotificationKind::OrderApproved,
            Recipient::Customer(order.customer_id.clone()),
            format!("order {} was approved", order.order_number),
        ));
        let vendor_ids: Vec<Uuid> = order.assignments.iter().map(|a| a.vendor_id).collect();
        for vendor_id in vendor_ids {
            order.push_note(Notification::new(
                NotificationKind::VendorAssigned,
                Recipient::Vendor(vendor_id),
                format!("items in order {} await your confirmation", order.order_number),
            ));
        }

        order.sync_status();
        self.orders.persist(&order).await?;
        self.deliver_notes(&order, mark).await;
        Ok(order)
    }

    /// Reject while still pending; no inventory was ever held
    pub async fn reject(
        &self,
        actor: &Actor,
        order_number: &str,
        note: Option<String>,
    ) -> Result<Order> {
        let admin = actor.require_admin()?.to_string();
        let mut order = self.fetch_required(order_number).await?;

        if order.admin_approval.status != ApprovalStatus::Pending {
            return Err(Error::conflict("approval has already been decided"));
        }

        order.admin_approval.status = ApprovalStatus::Rejected;
        order.admin_approval.decided_by = Some(admin);
        order.admin_approval.decided_at = Some(Utc::now());
        order.admin_approval.note = note;

        let mark = order.notifications.len();
        order.push_note(Notification::new(
            NotificationKind::OrderRejected,
            Recipient::Customer(order.customer_id.clone()),
            format!("order {} was rejected", order.order_number),
        ));

        order.sync_status();
        self.orders.persist(&order).await?;
        self.deliver_notes(&order, mark).await;
        Ok(order)
    }

    // ------------------------------------------------------------------
    // Vendor responses
    // ------------------------------------------------------------------

    pub async fn vendor_confirm(&self, actor: &Actor, order_number: &str) -> Result<Order> {
        let vendor_id = actor.require_vendor()?;
        let order = self.fetch_required(order_number).await?;
        if order.assignment_for(vendor_id).is_none() {
            return Err(Error::authorization("assignment does not belong to caller"));
        }

        let outcome = self
            .orders
            .respond_assignment(order_number, vendor_id, true, None)
            .await?;
        tracing::debug!(order_number, %vendor_id, items = outcome.item_ids.len(), "assignment confirmed");
        self.log_vendor_response(order_number, vendor_id, true);

        let mut order = self.fetch_required(order_number).await?;
        let mark = order.notifications.len();
        if outcome.all_confirmed {
            order.push_note(Notification::new(
                NotificationKind::VendorConfirmed,
                Recipient::Customer(order.customer_id.clone()),
                format!(
                    "all vendors confirmed order {}; you can proceed to payment",
                    order.order_number
                ),
            ));
        }

        order.sync_status();
        self.orders.persist(&order).await?;
        self.deliver_notes(&order, mark).await;
        Ok(order)
    }

    /// Rejection leaves the order in vendor_assigned; admin follow-up is
    /// required, nothing auto-cancels.
    pub async fn vendor_reject(
        &self,
        actor: &Actor,
        order_number: &str,
        reason: String,
    ) -> Result<Order> {
        let vendor_id = actor.require_vendor()?;
        let order = self.fetch_required(order_number).await?;
        if order.assignment_for(vendor_id).is_none() {
            return Err(Error::authorization("assignment does not belong to caller"));
        }

        let outcome = self
            .orders
            .respond_assignment(order_number, vendor_id, false, Some(reason.clone()))
            .await?;
        tracing::debug!(order_number, %vendor_id, items = outcome.item_ids.len(), "assignment rejected");
        self.log_vendor_response(order_number, vendor_id, false);

        let mut order = self.fetch_required(order_number).await?;
        let mark = order.notifications.len();
        let message = format!("vendor declined items in order {}: {reason}", order.order_number);
        self.notify_admins(&mut order, NotificationKind::VendorRejected, message)
            .await?;
        order.push_note(Notification::new(
            NotificationKind::VendorRejected,
            Recipient::Customer(order.customer_id.clone()),
            format!("a vendor declined items in order {}", order.order_number),
        ));

        order.sync_status();
        self.orders.persist(&order).await?;
        self.deliver_notes(&order, mark).await;
        Ok(order)
    }

    // ------------------------------------------------------------------
    // Payment
    // ------------------------------------------------------------------

    /// vendor_confirmed → payment_pending; opens a hosted checkout session
    pub async fn start_payment(
        &self,
        actor: &Actor,
        order_number: &str,
        method: String,
    ) -> Result<GatewaySession> {
        let mut order = self.fetch_required(order_number).await?;
        actor.require_customer(&order.customer_id)?;

        if order.derive_status() != OrderStatus::VendorConfirmed {
            return Err(Error::conflict(format!(
                "order {} is not ready for payment",
                order.order_number
            )));
        }

        let session = self
            .bounded(self.gateway.create_session(
                order_number,
                order.totals.total,
                &self.config.currency,
            ))
            .await?;

        order.payment.method = Some(method);
        order.payment.transaction_id = Some(session.transaction_id.clone());
        order.payment.session_opened_at = Some(Utc::now());
        order.sync_status();
        self.orders.persist(&order).await?;

        tracing::info!(order_number, transaction_id = %session.transaction_id, "payment session opened");
        Ok(session)
    }

    /// Apply the gateway's verdict for a transaction. Shared by all three
    /// reconciliation entry points; idempotent per (order_number,
    /// transaction_id) through the atomic payment claim.
    pub async fn reconcile_transaction(
        &self,
        order_number: &str,
        transaction_id: &str,
    ) -> Result<Order> {
        let order = self.fetch_required(order_number).await?;

        if order.payment.status == PaymentStatus::Paid {
            if order.payment.transaction_id.as_deref() != Some(transaction_id) {
                tracing::warn!(
                    order_number,
                    transaction_id,
                    recorded = ?order.payment.transaction_id,
                    "duplicate payment report with a different transaction id"
                );
            }
            return Ok(order);
        }

        let charge = self.bounded(self.gateway.validate(transaction_id)).await?;

        if charge.order_number != order_number {
            return Err(Error::conflict(format!(
                "transaction {transaction_id} belongs to order {}",
                charge.order_number
            )));
        }

        match charge.status {
            ChargeStatus::Succeeded => {
                if charge.amount != order.payment.amount {
                    return Err(Error::conflict(format!(
                        "transaction {transaction_id} settled {} but order {} totals {}",
                        charge.amount, order_number, order.payment.amount
                    )));
                }
                self.apply_successful_payment(order_number, transaction_id).await
            }
            ChargeStatus::Failed | ChargeStatus::Cancelled => {
                self.record_payment_failure(order_number, transaction_id).await
            }
            ChargeStatus::Processing => {
                // Not settled yet; stay in payment_pending and let a later
                // entry point finish the job.
                Ok(order)
            }
        }
    }

    /// Winner of the claim runs the side effects exactly once
    async fn apply_successful_payment(
        &self,
        order_number: &str,
        transaction_id: &str,
    ) -> Result<Order> {
        match self.orders.claim_payment(order_number, transaction_id).await? {
            PaymentClaim::AlreadyPaid => self.fetch_required(order_number).await,
            PaymentClaim::NotPending(status) => Err(Error::conflict(format!(
                "payment for {order_number} is {status:?} and cannot become paid"
            ))),
            PaymentClaim::Claimed => {
                let mut order = self.fetch_required(order_number).await?;

                // Authoritative stock decrement. A conflict here means the
                // order oversold between checkout and payment; the payment
                // stays applied and the failure is surfaced for manual
                // reconciliation.
                self.ledger.commit(&order.committed_lines()).await?;

                for item in &mut order.items {
                    if item.status != ItemStatus::Cancelled {
                        item.status = ItemStatus::Confirmed;
                    }
                }
                order.payouts = compute_payouts(&order.items, &self.config.payout_rates);

                let mark = order.notifications.len();
                order.push_note(Notification::new(
                    NotificationKind::PaymentReceived,
                    Recipient::Customer(order.customer_id.clone()),
                    format!("payment received for order {}", order.order_number),
                ));
                let vendor_ids: Vec<Uuid> =
                    order.assignments.iter().map(|a| a.vendor_id).collect();
                for vendor_id in vendor_ids {
                    order.push_note(Notification::new(
                        NotificationKind::PaymentReceived,
                        Recipient::Vendor(vendor_id),
                        format!("order {} is paid; start fulfillment", order.order_number),
                    ));
                }

                order.sync_status();
                self.orders.persist(&order).await?;

                if let Err(e) = self.carts.clear(&order.customer_id).await {
                    tracing::warn!(order_number, "failed to clear cart after payment: {e}");
                }

                self.deliver_notes(&order, mark).await;

                let event = OrderPaidEvent {
                    order_number: order.order_number.clone(),
                    customer_id: order.customer_id.clone(),
                    transaction_id: transaction_id.to_string(),
                    total: order.totals.total,
                    timestamp: Utc::now().timestamp(),
                };
                tracing::info!(target: "souq::telemetry", event = ?event, "payment applied");
                for payout in &order.payouts {
                    let settlement = SettlementEvent {
                        order_number: order.order_number.clone(),
                        vendor_id: payout.vendor_id,
                        net_amount: payout.net_amount,
                        event_type: "payout_accrued".to_string(),
                        timestamp: Utc::now().timestamp(),
                    };
                    tracing::info!(target: "souq::telemetry", event = ?settlement, "settlement recorded");
                }
                Ok(order)
            }
        }
    }

    /// Failed/cancelled gateway outcome; no ledger effect, stock was never held
    pub async fn record_payment_failure(
        &self,
        order_number: &str,
        transaction_id: &str,
    ) -> Result<Order> {
        let mut order = self.fetch_required(order_number).await?;

        if order.payment.status != PaymentStatus::Pending {
            // Late or duplicate failure report; converge without effects
            return Ok(order);
        }

        order.payment.status = PaymentStatus::Failed;
        order.payment.transaction_id = Some(transaction_id.to_string());

        let mark = order.notifications.len();
        order.push_note(Notification::new(
            NotificationKind::PaymentFailed,
            Recipient::Customer(order.customer_id.clone()),
            format!("payment for order {} did not complete", order.order_number),
        ));

        order.sync_status();
        self.orders.persist(&order).await?;
        self.deliver_notes(&order, mark).await;
        Ok(order)
    }

    // ------------------------------------------------------------------
    // Fulfillment
    // ------------------------------------------------------------------

    /// Advance one item along confirmed → processing → shipped → delivered
    pub async fn advance_item(
        &self,
        actor: &Actor,
        order_number: &str,
        item_id: Uuid,
        target: ItemStatus,
    ) -> Result<Order> {
        let mut order = self.fetch_required(order_number).await?;

        let item = order
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| Error::not_found(format!("item {item_id} not found")))?;

        if !actor.is_admin() && actor.vendor_id() != Some(item.vendor_id) {
            return Err(Error::authorization("item does not belong to caller"));
        }
        if !order.payment.stock_committed() {
            return Err(Error::conflict("order has not been paid"));
        }
        if item.status.next() != Some(target) {
            return Err(Error::conflict(format!(
                "item cannot move from {:?} to {target:?}",
                item.status
            )));
        }

        item.status = target;
        let title = item.title.clone();

        let mark = order.notifications.len();
        order.push_note(Notification::new(
            NotificationKind::ItemStatusChanged,
            Recipient::Customer(order.customer_id.clone()),
            format!("'{title}' in order {} is now {target:?}", order.order_number),
        ));

        order.sync_status();
        self.orders.persist(&order).await?;
        self.deliver_notes(&order, mark).await;
        Ok(order)
    }

    // ------------------------------------------------------------------
    // Cancellation & refund
    // ------------------------------------------------------------------

    /// Cancel by customer or admin. Stock is released only for items whose
    /// stock had actually been committed (order reached paid).
    pub async fn cancel(&self, actor: &Actor, order_number: &str) -> Result<Order> {
        let mut order = self.fetch_required(order_number).await?;
        actor.require_customer(&order.customer_id)?;

        if matches!(
            order.status,
            OrderStatus::Shipped | OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        ) {
            return Err(Error::conflict(format!(
                "order in status {:?} cannot be cancelled",
                order.status
            )));
        }

        let stock_was_committed = order.payment.stock_committed();

        let mut released_lines = Vec::new();
        for item in &mut order.items {
            if !matches!(item.status, ItemStatus::Shipped | ItemStatus::Delivered | ItemStatus::Cancelled) {
                released_lines.push(item.ledger_line());
                item.status = ItemStatus::Cancelled;
            }
        }
        order.cancelled_at = Some(Utc::now());

        if stock_was_committed {
            self.ledger.release(&released_lines).await?;
        }

        let mark = order.notifications.len();
        order.push_note(Notification::new(
            NotificationKind::OrderCancelled,
            Recipient::Customer(order.customer_id.clone()),
            format!("order {} was cancelled", order.order_number),
        ));
        if !actor.is_admin() {
            let message = format!("customer cancelled order {}", order.order_number);
            self.notify_admins(&mut order, NotificationKind::OrderCancelled, message)
                .await?;
        }

        order.sync_status();
        self.orders.persist(&order).await?;
        self.deliver_notes(&order, mark).await;
        Ok(order)
    }

    /// Admin refund against a paid order. Full refunds release all committed
    /// stock and flip the order to refunded; partial refunds only mark the
    /// payment record.
    pub async fn refund(
        &self,
        actor: &Actor,
        order_number: &str,
        amount: Option<Decimal>,
    ) -> Result<Order> {
        actor.require_admin()?;
        let mut order = self.fetch_required(order_number).await?;

        if order.payment.status != PaymentStatus::Paid {
            return Err(Error::conflict("payment is not in a refundable state"));
        }
        let transaction_id = order
            .payment
            .transaction_id
            .clone()
            .ok_or_else(|| Error::conflict("no settled transaction on record"))?;

        let refund_amount = amount.unwrap_or(order.payment.amount);
        if refund_amount <= Decimal::ZERO || refund_amount > order.payment.amount {
            return Err(Error::validation("refund amount out of range"));
        }

        let receipt = self
            .bounded(self.gateway.refund(&transaction_id, refund_amount))
            .await?;
        tracing::info!(order_number, reference = %receipt.reference, "gateway refund issued");

        let full = refund_amount == order.payment.amount;
        let mark;
        if full {
            for payout in &order.payouts {
                let settlement = SettlementEvent {
                    order_number: order.order_number.clone(),
                    vendor_id: payout.vendor_id,
                    net_amount: payout.net_amount,
                    event_type: "payout_reversed".to_string(),
                    timestamp: Utc::now().timestamp(),
                };
                tracing::info!(target: "souq::telemetry", event = ?settlement, "settlement reversed");
            }
            self.ledger.release(&order.committed_lines()).await?;
            order.payment.status = PaymentStatus::Refunded;
            mark = order.notifications.len();
            order.push_note(Notification::new(
                NotificationKind::OrderRefunded,
                Recipient::Customer(order.customer_id.clone()),
                format!("order {} was refunded in full", order.order_number),
            ));
        } else {
            order.payment.status = PaymentStatus::PartialRefund;
            mark = order.notifications.len();
            order.push_note(Notification::new(
                NotificationKind::OrderRefunded,
                Recipient::Customer(order.customer_id.clone()),
                format!(
                    "order {} was partially refunded ({refund_amount})",
                    order.order_number
                ),
            ));
        }

        order.sync_status();
        self.orders.persist(&order).await?;
        self.deliver_notes(&order, mark).await;
        Ok(order)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get(&self, order_number: &str) -> Result<Order> {
        self.fetch_required(order_number).await
    }

    pub async fn orders_for(&self, actor: &Actor) -> Result<Vec<Order>> {
        match actor {
            Actor::Customer { id } => self.orders.list_for_customer(id).await,
            Actor::Vendor { id } => self.orders.list_for_vendor(*id).await,
            Actor::Admin { .. } => self.orders.list_all().await,
        }
    }

    pub async fn mark_notification_read(
        &self,
        order_number: &str,
        note_id: Uuid,
    ) -> Result<()> {
        self.orders.mark_notification_read(order_number, note_id).await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn log_vendor_response(&self, order_number: &str, vendor_id: Uuid, confirmed: bool) {
        let event = VendorRespondedEvent {
            order_number: order_number.to_string(),
            vendor_id,
            confirmed,
            timestamp: Utc::now().timestamp(),
        };
        tracing::info!(target: "souq::telemetry", event = ?event, "vendor responded");
    }

    fn log_placed(&self, order: &Order) {
        let vendors: std::collections::HashSet<Uuid> =
            order.items.iter().map(|i| i.vendor_id).collect();
        let event = OrderPlacedEvent {
            order_number: order.order_number.clone(),
            customer_id: order.customer_id.clone(),
            vendor_count: vendors.len(),
            total: order.totals.total,
            timestamp: Utc::now().timestamp(),
        };
        tracing::info!(target: "souq::telemetry", event = ?event, "order placed");
    }

    async fn fetch_required(&self, order_number: &str) -> Result<Order> {
        self.orders
            .fetch(order_number)
            .await?
            .ok_or_else(|| Error::not_found(format!("order {order_number} not found")))
    }

    /// Time-bound a gateway call; on elapse the order stays in its
    /// pre-transition state and the caller may retry.
    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.config.gateway_timeout, fut)
            .await
            .map_err(|_| Error::gateway("payment gateway timed out"))?
    }

    async fn notify_admins(
        &self,
        order: &mut Order,
        kind: NotificationKind,
        message: String,
    ) -> Result<()> {
        for admin_id in self.admins.admin_ids().await? {
            order.push_note(Notification::new(
                kind,
                Recipient::Admin(admin_id),
                message.clone(),
            ));
        }
        Ok(())
    }

    /// Best-effort outbound delivery of freshly appended records; a delivery
    /// failure never fails the transition that produced them.
    async fn deliver_notes(&self, order: &Order, from: usize) {
        for note in &order.notifications[from..] {
            let delivery = tokio::time::timeout(
                self.config.gateway_timeout,
                self.sink.deliver(&order.order_number, note),
            )
            .await;
            match delivery {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(order_number = %order.order_number, "notification delivery failed: {e}"),
                Err(_) => tracing::warn!(order_number = %order.order_number, "notification delivery timed out"),
            }
        }
    }
}
