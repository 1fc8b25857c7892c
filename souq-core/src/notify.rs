use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPlaced,
    OrderApproved,
    OrderRejected,
    VendorAssigned,
    VendorConfirmed,
    VendorRejected,
    PaymentReceived,
    PaymentFailed,
    ItemStatusChanged,
    OrderCancelled,
    OrderRefunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Customer(String),
    Vendor(Uuid),
    Admin(String),
}

/// Append-only notification entry attached to an order.
///
/// Immutable after creation except for `is_read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub recipient: Recipient,
    pub message: String,
    pub is_read: bool,
    pub sent_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, recipient: Recipient, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            recipient,
            message: message.into(),
            is_read: false,
            sent_at: Utc::now(),
        }
    }
}

/// Directory lookup for admin broadcast.
///
/// The set of admins is external directory state, not workflow state; the
/// engine never assumes a global admin list.
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    async fn admin_ids(&self) -> Result<Vec<String>>;
}

/// Outbound delivery seam (email, push, ...).
///
/// Delivery is best-effort and time-bounded; a failed delivery never fails
/// the workflow transition that produced the record.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, order_number: &str, note: &Notification) -> Result<()>;
}

/// Sink that only logs; the default wiring when no delivery channel is configured
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn deliver(&self, order_number: &str, note: &Notification) -> Result<()> {
        tracing::info!(
            order_number,
            kind = ?note.kind,
            recipient = ?note.recipient,
            "notification recorded"
        );
        Ok(())
    }
}

/// Fixed admin roster, used in tests and single-tenant deployments
pub struct StaticAdminDirectory {
    admins: Vec<String>,
}

impl StaticAdminDirectory {
    pub fn new(admins: Vec<String>) -> Self {
        Self { admins }
    }
}

#[async_trait]
impl AdminDirectory for StaticAdminDirectory {
    async fn admin_ids(&self) -> Result<Vec<String>> {
        Ok(self.admins.clone())
    }
}
