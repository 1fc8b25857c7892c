use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use souq_core::error::{Error, Result};
use souq_core::gateway::PaymentStatus;
use souq_core::notify::Notification;
use souq_order::models::{
    AdminApproval, Address, Order, OrderItem, OrderTotals, PaymentRecord, VendorAssignment,
    VendorPayout,
};
use souq_order::repository::{AssignmentOutcome, OrderStore, PaymentClaim};

use crate::db_err;

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn order_id(&self, order_number: &str) -> Result<Option<Uuid>> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM orders WHERE order_number = $1")
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }
}

/// TEXT column <-> wire enum, going through the serde names so storage and
/// the API always agree on the strings
fn to_db<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(ToOwned::to_owned))
        .unwrap_or_default()
}

fn from_db<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_value(Value::String(s.to_string()))
        .map_err(|e| Error::internal(format!("unreadable stored value '{s}': {e}")))
}

fn json_col<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(Error::internal)
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    customer_id: String,
    status: String,
    subtotal: Decimal,
    tax: Decimal,
    shipping_cost: Decimal,
    service_charge: Decimal,
    discount: Decimal,
    total: Decimal,
    shipping_address: Value,
    billing_address: Value,
    approval_status: String,
    approval_decided_by: Option<String>,
    approval_decided_at: Option<DateTime<Utc>>,
    approval_note: Option<String>,
    payment_method: Option<String>,
    payment_status: String,
    transaction_id: Option<String>,
    payment_amount: Decimal,
    payment_session_opened_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    product_id: Uuid,
    vendor_id: Uuid,
    title: String,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
    category_surcharge_rate: Decimal,
    status: String,
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    vendor_id: Uuid,
    item_ids: Vec<Uuid>,
    status: String,
    rejection_reason: Option<String>,
    responded_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    kind: String,
    recipient: Value,
    message: String,
    is_read: bool,
    sent_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PayoutRow {
    vendor_id: Uuid,
    amount: Decimal,
    commission: Decimal,
    service_charge: Decimal,
    net_amount: Decimal,
}

impl PgOrderStore {
    async fn assemble(&self, row: OrderRow) -> Result<Order> {
        let items = sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, product_id, vendor_id, title, quantity, unit_price, total_price, \
                    category_surcharge_rate, status \
             FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let assignments = sqlx::query_as::<_, AssignmentRow>(
            "SELECT vendor_id, item_ids, status, rejection_reason, responded_at \
             FROM vendor_assignments WHERE order_id = $1 ORDER BY vendor_id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let notifications = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, kind, recipient, message, is_read, sent_at \
             FROM order_notifications WHERE order_id = $1 ORDER BY sent_at",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let payouts = sqlx::query_as::<_, PayoutRow>(
            "SELECT vendor_id, amount, commission, service_charge, net_amount \
             FROM vendor_payouts WHERE order_id = $1 ORDER BY vendor_id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let items = items
            .into_iter()
            .map(|i| {
                Ok(OrderItem {
                    id: i.id,
                    product_id: i.product_id,
                    vendor_id: i.vendor_id,
                    title: i.title,
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    total_price: i.total_price,
                    category_surcharge_rate: i.category_surcharge_rate,
                    status: from_db(&i.status)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let assignments = assignments
            .into_iter()
            .map(|a| {
                Ok(VendorAssignment {
                    vendor_id: a.vendor_id,
                    item_ids: a.item_ids,
                    status: from_db(&a.status)?,
                    rejection_reason: a.rejection_reason,
                    responded_at: a.responded_at,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let notifications = notifications
            .into_iter()
            .map(|n| {
                Ok(Notification {
                    id: n.id,
                    kind: from_db(&n.kind)?,
                    recipient: serde_json::from_value(n.recipient).map_err(Error::internal)?,
                    message: n.message,
                    is_read: n.is_read,
                    sent_at: n.sent_at,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let payouts = payouts
            .into_iter()
            .map(|p| VendorPayout {
                vendor_id: p.vendor_id,
                amount: p.amount,
                commission: p.commission,
                service_charge: p.service_charge,
                net_amount: p.net_amount,
            })
            .collect();

        let shipping_address: Address =
            serde_json::from_value(row.shipping_address).map_err(Error::internal)?;
        let billing_address: Address =
            serde_json::from_value(row.billing_address).map_err(Error::internal)?;

        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            customer_id: row.customer_id,
            items,
            shipping_address,
            billing_address,
            totals: OrderTotals {
                subtotal: row.subtotal,
                tax: row.tax,
                shipping_cost: row.shipping_cost,
                service_charge: row.service_charge,
                discount: row.discount,
                total: row.total,
            },
            admin_approval: AdminApproval {
                status: from_db(&row.approval_status)?,
                decided_by: row.approval_decided_by,
                decided_at: row.approval_decided_at,
                note: row.approval_note,
            },
            assignments,
            payment: PaymentRecord {
                method: row.payment_method,
                status: from_db(&row.payment_status)?,
                transaction_id: row.transaction_id,
                amount: row.payment_amount,
                session_opened_at: row.payment_session_opened_at,
                paid_at: row.paid_at,
            },
            notifications,
            payouts,
            cancelled_at: row.cancelled_at,
            status: from_db(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn fetch_by_numbers(&self, numbers: Vec<String>) -> Result<Vec<Order>> {
        let mut orders = Vec::with_capacity(numbers.len());
        for number in numbers {
            if let Some(order) = self.fetch(&number).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    /// Mutable sub-records are rewritten wholesale; notifications are
    /// append-only and only ever inserted.
    async fn write_children(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        order: &Order,
    ) -> Result<()> {
        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order.id)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, vendor_id, title, quantity, \
                                          unit_price, total_price, category_surcharge_rate, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(item.id)
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.vendor_id)
            .bind(&item.title)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.total_price)
            .bind(item.category_surcharge_rate)
            .bind(to_db(&item.status))
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        }

        sqlx::query("DELETE FROM vendor_assignments WHERE order_id = $1")
            .bind(order.id)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        for assignment in &order.assignments {
            sqlx::query(
                "INSERT INTO vendor_assignments (order_id, vendor_id, item_ids, status, \
                                                 rejection_reason, responded_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(order.id)
            .bind(assignment.vendor_id)
            .bind(&assignment.item_ids)
            .bind(to_db(&assignment.status))
            .bind(&assignment.rejection_reason)
            .bind(assignment.responded_at)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        }

        sqlx::query("DELETE FROM vendor_payouts WHERE order_id = $1")
            .bind(order.id)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        for payout in &order.payouts {
            sqlx::query(
                "INSERT INTO vendor_payouts (order_id, vendor_id, amount, commission, \
                                             service_charge, net_amount) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(order.id)
            .bind(payout.vendor_id)
            .bind(payout.amount)
            .bind(payout.commission)
            .bind(payout.service_charge)
            .bind(payout.net_amount)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        }

        for note in &order.notifications {
            sqlx::query(
                "INSERT INTO order_notifications (id, order_id, kind, recipient, message, is_read, sent_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(note.id)
            .bind(order.id)
            .bind(to_db(&note.kind))
            .bind(json_col(&note.recipient)?)
            .bind(&note.message)
            .bind(note.is_read)
            .bind(note.sent_at)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        }

        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let inserted = sqlx::query(
            "INSERT INTO orders (id, order_number, customer_id, status, subtotal, tax, \
                                 shipping_cost, service_charge, discount, total, \
                                 shipping_address, billing_address, approval_status, \
                                 approval_decided_by, approval_decided_at, approval_note, \
                                 payment_method, payment_status, transaction_id, payment_amount, \
                                 payment_session_opened_at, paid_at, cancelled_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
                     $17, $18, $19, $20, $21, $22, $23, $24, $25) \
             ON CONFLICT (order_number) DO NOTHING",
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(&order.customer_id)
        .bind(to_db(&order.status))
        .bind(order.totals.subtotal)
        .bind(order.totals.tax)
        .bind(order.totals.shipping_cost)
        .bind(order.totals.service_charge)
        .bind(order.totals.discount)
        .bind(order.totals.total)
        .bind(json_col(&order.shipping_address)?)
        .bind(json_col(&order.billing_address)?)
        .bind(to_db(&order.admin_approval.status))
        .bind(&order.admin_approval.decided_by)
        .bind(order.admin_approval.decided_at)
        .bind(&order.admin_approval.note)
        .bind(&order.payment.method)
        .bind(to_db(&order.payment.status))
        .bind(&order.payment.transaction_id)
        .bind(order.payment.amount)
        .bind(order.payment.session_opened_at)
        .bind(order.payment.paid_at)
        .bind(order.cancelled_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if inserted.rows_affected() == 0 {
            return Err(Error::conflict(format!(
                "order {} already exists",
                order.order_number
            )));
        }

        Self::write_children(&mut tx, order).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn fetch(&self, order_number: &str) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, order_number, customer_id, status, subtotal, tax, shipping_cost, \
                    service_charge, discount, total, shipping_address, billing_address, \
                    approval_status, approval_decided_by, approval_decided_at, approval_note, \
                    payment_method, payment_status, transaction_id, payment_amount, \
                    payment_session_opened_at, paid_at, cancelled_at, created_at, updated_at \
             FROM orders WHERE order_number = $1",
        )
        .bind(order_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => Ok(Some(self.assemble(row).await?)),
            None => Ok(None),
        }
    }

    async fn persist(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let updated = sqlx::query(
            "UPDATE orders SET status = $2, approval_status = $3, approval_decided_by = $4, \
                               approval_decided_at = $5, approval_note = $6, payment_method = $7, \
                               payment_status = $8, transaction_id = $9, \
                               payment_session_opened_at = $10, paid_at = $11, cancelled_at = $12, \
                               updated_at = NOW() \
             WHERE order_number = $1",
        )
        .bind(&order.order_number)
        .bind(to_db(&order.status))
        .bind(to_db(&order.admin_approval.status))
        .bind(&order.admin_approval.decided_by)
        .bind(order.admin_approval.decided_at)
        .bind(&order.admin_approval.note)
        .bind(&order.payment.method)
        .bind(to_db(&order.payment.status))
        .bind(&order.payment.transaction_id)
        .bind(order.payment.session_opened_at)
        .bind(order.payment.paid_at)
        .bind(order.cancelled_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            return Err(Error::not_found(format!(
                "order {} not found",
                order.order_number
            )));
        }

        Self::write_children(&mut tx, order).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn claim_payment(
        &self,
        order_number: &str,
        transaction_id: &str,
    ) -> Result<PaymentClaim> {
        // The sole serialization point for the three reconciliation entry
        // points: one conditional UPDATE, no read-modify-write.
        let claimed = sqlx::query(
            "UPDATE orders SET payment_status = 'paid', transaction_id = $2, paid_at = NOW(), \
                               updated_at = NOW() \
             WHERE order_number = $1 AND payment_status = 'pending'",
        )
        .bind(order_number)
        .bind(transaction_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if claimed.rows_affected() == 1 {
            return Ok(PaymentClaim::Claimed);
        }

        let status: Option<String> =
            sqlx::query_scalar("SELECT payment_status FROM orders WHERE order_number = $1")
                .bind(order_number)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        match status {
            None => Err(Error::not_found(format!("order {order_number} not found"))),
            Some(s) if s == "paid" => Ok(PaymentClaim::AlreadyPaid),
            Some(s) => {
                let status: PaymentStatus = from_db(&s)?;
                Ok(PaymentClaim::NotPending(status))
            }
        }
    }

    async fn respond_assignment(
        &self,
        order_number: &str,
        vendor_id: Uuid,
        confirm: bool,
        reason: Option<String>,
    ) -> Result<AssignmentOutcome> {
        let order_id = self
            .order_id(order_number)
            .await?
            .ok_or_else(|| Error::not_found(format!("order {order_number} not found")))?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let new_status = if confirm { "confirmed" } else { "rejected" };
        let item_ids: Option<Vec<Uuid>> = sqlx::query_scalar(
            "UPDATE vendor_assignments SET status = $3, rejection_reason = $4, responded_at = NOW() \
             WHERE order_id = $1 AND vendor_id = $2 AND status = 'pending' \
             RETURNING item_ids",
        )
        .bind(order_id)
        .bind(vendor_id)
        .bind(new_status)
        .bind(&reason)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(item_ids) = item_ids else {
            let exists: Option<i64> = sqlx::query_scalar(
                "SELECT COUNT(*) FROM vendor_assignments WHERE order_id = $1 AND vendor_id = $2",
            )
            .bind(order_id)
            .bind(vendor_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

            return Err(if exists.unwrap_or(0) > 0 {
                Error::conflict("assignment has already been responded to")
            } else {
                Error::authorization(format!(
                    "no assignment for vendor {vendor_id} on this order"
                ))
            });
        };

        // Aggregate membership test inside the same transaction as the flip,
        // never against a stale in-memory copy
        let remaining: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM vendor_assignments \
             WHERE order_id = $1 AND status <> 'confirmed'",
        )
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(AssignmentOutcome {
            all_confirmed: remaining == 0,
            item_ids,
        })
    }

    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<Order>> {
        let numbers: Vec<String> = sqlx::query_scalar(
            "SELECT order_number FROM orders WHERE customer_id = $1 ORDER BY created_at DESC",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        self.fetch_by_numbers(numbers).await
    }

    async fn list_for_vendor(&self, vendor_id: Uuid) -> Result<Vec<Order>> {
        let numbers: Vec<String> = sqlx::query_scalar(
            "SELECT o.order_number FROM orders o \
             JOIN vendor_assignments va ON va.order_id = o.id \
             WHERE va.vendor_id = $1 ORDER BY o.created_at DESC",
        )
        .bind(vendor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        self.fetch_by_numbers(numbers).await
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        let numbers: Vec<String> =
            sqlx::query_scalar("SELECT order_number FROM orders ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        self.fetch_by_numbers(numbers).await
    }

    async fn mark_notification_read(&self, order_number: &str, note_id: Uuid) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE order_notifications SET is_read = TRUE \
             WHERE id = $2 AND order_id = (SELECT id FROM orders WHERE order_number = $1)",
        )
        .bind(order_number)
        .bind(note_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            return Err(Error::not_found(format!("notification {note_id} not found")));
        }
        Ok(())
    }
}
