use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use souq_cart::models::{CartCharges, DraftItem, OrderDraft};
use souq_catalog::inventory::LedgerLine;
use souq_core::error::{Error, Result};
use souq_core::gateway::PaymentStatus;
use souq_core::notify::Notification;
use souq_shared::pii::Masked;

/// Order status in the lifecycle (wire-exact)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingAdminApproval,
    AdminApproved,
    VendorAssigned,
    VendorConfirmed,
    PaymentPending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }
}

/// Per-line fulfillment state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl ItemStatus {
    /// Next step in the fulfillment chain, if any
    pub fn next(&self) -> Option<ItemStatus> {
        match self {
            ItemStatus::Confirmed => Some(ItemStatus::Processing),
            ItemStatus::Processing => Some(ItemStatus::Shipped),
            ItemStatus::Shipped => Some(ItemStatus::Delivered),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ItemStatus::Pending => 0,
            ItemStatus::Confirmed => 1,
            ItemStatus::Processing => 2,
            ItemStatus::Shipped => 3,
            ItemStatus::Delivered => 4,
            ItemStatus::Cancelled => 5,
        }
    }

    pub fn at_least(&self, other: ItemStatus) -> bool {
        self.rank() >= other.rank() && *self != ItemStatus::Cancelled
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Confirmed,
    Rejected,
}

/// Address snapshot copied onto the order at creation; later address edits
/// never retroactively alter a placed order.
///
/// The contact email is wrapped so it never leaks through Debug-formatted
/// logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub line1: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    pub email: Option<Masked<String>>,
}

impl Address {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.line1.trim().is_empty() || self.city.trim().is_empty()
        {
            return Err(Error::validation("shipping address is incomplete"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub title: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub category_surcharge_rate: Decimal,
    pub status: ItemStatus,
}

impl OrderItem {
    fn from_draft(item: &DraftItem) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id: item.product_id,
            vendor_id: item.vendor_id,
            title: item.title.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.line_total(),
            category_surcharge_rate: item.category_surcharge_rate,
            status: ItemStatus::Pending,
        }
    }

    pub fn ledger_line(&self) -> LedgerLine {
        LedgerLine {
            product_id: self.product_id,
            quantity: self.quantity,
            line_total: self.total_price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminApproval {
    pub status: ApprovalStatus,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl Default for AdminApproval {
    fn default() -> Self {
        Self {
            status: ApprovalStatus::Pending,
            decided_by: None,
            decided_at: None,
            note: None,
        }
    }
}

/// Per-vendor sub-approval gating payment until every vendor confirms.
///
/// Normalized: keyed by (order, vendor) with an index into item ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorAssignment {
    pub vendor_id: Uuid,
    pub item_ids: Vec<Uuid>,
    pub status: AssignmentStatus,
    pub rejection_reason: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub method: Option<String>,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub amount: Decimal,
    pub session_opened_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    fn new(amount: Decimal) -> Self {
        Self {
            method: None,
            status: PaymentStatus::Pending,
            transaction_id: None,
            amount,
            session_opened_at: None,
            paid_at: None,
        }
    }

    /// True once stock has been committed for this order
    pub fn stock_committed(&self) -> bool {
        matches!(
            self.status,
            PaymentStatus::Paid | PaymentStatus::PartialRefund | PaymentStatus::Refunded
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping_cost: Decimal,
    pub service_charge: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

/// Per-vendor settlement record, derived from qualifying order items
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VendorPayout {
    pub vendor_id: Uuid,
    pub amount: Decimal,
    pub commission: Decimal,
    pub service_charge: Decimal,
    pub net_amount: Decimal,
}

/// The single source of truth for a customer's purchase.
///
/// Mutated exclusively through the workflow engine; never physically
/// deleted. `status` is a persisted cache of `derive_status()` and is
/// refreshed by `sync_status()` inside every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub totals: OrderTotals,
    pub admin_approval: AdminApproval,
    pub assignments: Vec<VendorAssignment>,
    pub payment: PaymentRecord,
    pub notifications: Vec<Notification>,
    pub payouts: Vec<VendorPayout>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Materialize an order from a checkout draft
    pub fn from_draft(
        draft: OrderDraft,
        shipping_address: Address,
        billing_address: Option<Address>,
        charges: &CartCharges,
    ) -> Result<Self> {
        Self::from_items(
            draft.customer_id,
            &draft.items,
            draft.discount,
            shipping_address,
            billing_address,
            charges,
        )
    }

    /// Materialize an order from an ad-hoc item list (direct order path)
    pub fn from_items(
        customer_id: String,
        items: &[DraftItem],
        discount: Decimal,
        shipping_address: Address,
        billing_address: Option<Address>,
        charges: &CartCharges,
    ) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::validation("an order needs at least one item"));
        }
        shipping_address.validate()?;

        let items: Vec<OrderItem> = items.iter().map(OrderItem::from_draft).collect();
        let totals = compute_totals(&items, discount, charges);
        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            order_number: generate_order_number(),
            customer_id,
            payment: PaymentRecord::new(totals.total),
            items,
            billing_address: billing_address.unwrap_or_else(|| shipping_address.clone()),
            shipping_address,
            totals,
            admin_approval: AdminApproval::default(),
            assignments: Vec::new(),
            notifications: Vec::new(),
            payouts: Vec::new(),
            cancelled_at: None,
            status: OrderStatus::PendingAdminApproval,
            created_at: now,
            updated_at: now,
        })
    }

    /// Order-level status as a pure function of the sub-state machines.
    ///
    /// Never set the field directly; call `sync_status` after mutating
    /// sub-state.
    pub fn derive_status(&self) -> OrderStatus {
        if self.cancelled_at.is_some() || self.admin_approval.status == ApprovalStatus::Rejected {
            return OrderStatus::Cancelled;
        }

        match self.payment.status {
            PaymentStatus::Refunded => return OrderStatus::Refunded,
            PaymentStatus::Failed => return OrderStatus::Cancelled,
            _ => {}
        }

        match self.admin_approval.status {
            ApprovalStatus::Pending => OrderStatus::PendingAdminApproval,
            ApprovalStatus::Rejected => OrderStatus::Cancelled,
            ApprovalStatus::Approved => {
                if self.assignments.is_empty() {
                    OrderStatus::AdminApproved
                } else if self
                    .assignments
                    .iter()
                    .any(|a| a.status != AssignmentStatus::Confirmed)
                {
                    OrderStatus::VendorAssigned
                } else if self.payment.stock_committed() {
                    self.fulfillment_band()
                } else if self.payment.session_opened_at.is_some() {
                    OrderStatus::PaymentPending
                } else {
                    OrderStatus::VendorConfirmed
                }
            }
        }
    }

    /// paid → processing → shipped → delivered, from the line items
    fn fulfillment_band(&self) -> OrderStatus {
        let active: Vec<&OrderItem> = self
            .items
            .iter()
            .filter(|i| i.status != ItemStatus::Cancelled)
            .collect();

        if active.is_empty() {
            return OrderStatus::Paid;
        }
        if active.iter().all(|i| i.status == ItemStatus::Delivered) {
            OrderStatus::Delivered
        } else if active.iter().all(|i| i.status.at_least(ItemStatus::Shipped)) {
            OrderStatus::Shipped
        } else if active.iter().any(|i| i.status.at_least(ItemStatus::Processing)) {
            OrderStatus::Processing
        } else {
            OrderStatus::Paid
        }
    }

    /// Refresh the persisted status cache from sub-state
    pub fn sync_status(&mut self) {
        self.status = self.derive_status();
        self.updated_at = Utc::now();
    }

    pub fn assignment_for(&self, vendor_id: Uuid) -> Option<&VendorAssignment> {
        self.assignments.iter().find(|a| a.vendor_id == vendor_id)
    }

    /// Group items by vendor into pending assignments (admin approval fan-out)
    pub fn build_assignments(&mut self) {
        let mut by_vendor: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
        for item in &self.items {
            by_vendor.entry(item.vendor_id).or_default().push(item.id);
        }
        self.assignments = by_vendor
            .into_iter()
            .map(|(vendor_id, item_ids)| VendorAssignment {
                vendor_id,
                item_ids,
                status: AssignmentStatus::Pending,
                rejection_reason: None,
                responded_at: None,
            })
            .collect();
    }

    /// Ledger lines for all items that hold committed stock
    pub fn committed_lines(&self) -> Vec<LedgerLine> {
        self.items
            .iter()
            .filter(|i| i.status != ItemStatus::Cancelled)
            .map(OrderItem::ledger_line)
            .collect()
    }

    pub fn push_note(&mut self, note: Notification) {
        self.notifications.push(note);
    }

    /// subtotal == Σ item.total_price; checked by tests at every state
    pub fn invariant_holds(&self) -> bool {
        let subtotal: Decimal = self.items.iter().map(|i| i.total_price).sum();
        let recomputed = self.totals.subtotal + self.totals.tax + self.totals.shipping_cost
            + self.totals.service_charge
            - self.totals.discount;
        subtotal == self.totals.subtotal && recomputed.max(Decimal::ZERO) == self.totals.total
    }
}

fn compute_totals(items: &[OrderItem], discount: Decimal, charges: &CartCharges) -> OrderTotals {
    let subtotal: Decimal = items.iter().map(|i| i.total_price).sum();
    let tax = subtotal * charges.tax_rate;
    let shipping_cost = if subtotal > charges.free_shipping_threshold {
        Decimal::ZERO
    } else {
        charges.flat_shipping_fee
    };
    // Category-specific surcharge folded in here, not at cart time
    let service_charge: Decimal = items
        .iter()
        .map(|i| i.total_price * i.category_surcharge_rate)
        .sum();
    let total = (subtotal + tax + shipping_cost + service_charge - discount).max(Decimal::ZERO);

    OrderTotals {
        subtotal,
        tax,
        shipping_cost,
        service_charge,
        discount,
        total,
    }
}

/// Globally unique, human-readable order number
fn generate_order_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let short = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("SOUQ-{date}-{short}")
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use rust_decimal_macros::dec;

    pub fn address() -> Address {
        Address {
            name: "Amina Rahman".to_string(),
            line1: "12 Harbor Lane".to_string(),
            city: "Dhaka".to_string(),
            postal_code: "1207".to_string(),
            country: "BD".to_string(),
            phone: None,
            email: Some(Masked("amina@example.com".to_string())),
        }
    }

    pub fn draft_item(vendor_id: Uuid, quantity: i32, unit_price: Decimal) -> DraftItem {
        DraftItem {
            product_id: Uuid::new_v4(),
            vendor_id,
            title: "Brass Lantern".to_string(),
            quantity,
            unit_price,
            category_surcharge_rate: dec!(0.05),
        }
    }

    pub fn order_with(items: &[DraftItem]) -> Order {
        Order::from_items(
            "cust-1".to_string(),
            items,
            Decimal::ZERO,
            address(),
            None,
            &CartCharges::default(),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_totals_fold_in_category_surcharge() {
        let vendor = Uuid::new_v4();
        let mut item = draft_item(vendor, 3, dec!(400));
        item.category_surcharge_rate = dec!(0.10);

        let order = order_with(&[item]);

        assert_eq!(order.totals.subtotal, dec!(1200));
        assert_eq!(order.totals.tax, dec!(60));
        assert_eq!(order.totals.shipping_cost, dec!(0));
        assert_eq!(order.totals.service_charge, dec!(120));
        assert_eq!(order.totals.total, dec!(1380));
        assert!(order.invariant_holds());
    }

    #[test]
    fn new_order_is_pending_admin_approval() {
        let order = order_with(&[draft_item(Uuid::new_v4(), 1, dec!(100))]);
        assert_eq!(order.status, OrderStatus::PendingAdminApproval);
        assert_eq!(order.derive_status(), order.status);
        assert_eq!(order.payment.amount, order.totals.total);
    }

    #[test]
    fn empty_item_list_is_rejected() {
        let err = Order::from_items(
            "cust-1".to_string(),
            &[],
            Decimal::ZERO,
            address(),
            None,
            &CartCharges::default(),
        )
        .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn incomplete_address_is_rejected() {
        let mut addr = address();
        addr.line1 = "  ".to_string();
        let err = Order::from_items(
            "cust-1".to_string(),
            &[draft_item(Uuid::new_v4(), 1, dec!(100))],
            Decimal::ZERO,
            addr,
            None,
            &CartCharges::default(),
        )
        .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn assignments_group_items_by_vendor() {
        let vendor_a = Uuid::new_v4();
        let vendor_b = Uuid::new_v4();
        let mut order = order_with(&[
            draft_item(vendor_a, 1, dec!(100)),
            draft_item(vendor_b, 2, dec!(50)),
            draft_item(vendor_a, 1, dec!(25)),
        ]);

        order.build_assignments();

        assert_eq!(order.assignments.len(), 2);
        let a = order.assignment_for(vendor_a).unwrap();
        assert_eq!(a.item_ids.len(), 2);
        assert_eq!(a.status, AssignmentStatus::Pending);
    }

    #[test]
    fn status_derivation_tracks_sub_state() {
        let vendor = Uuid::new_v4();
        let mut order = order_with(&[draft_item(vendor, 1, dec!(100))]);

        order.admin_approval.status = ApprovalStatus::Approved;
        order.build_assignments();
        order.sync_status();
        assert_eq!(order.status, OrderStatus::VendorAssigned);

        order.assignments[0].status = AssignmentStatus::Confirmed;
        order.sync_status();
        assert_eq!(order.status, OrderStatus::VendorConfirmed);

        order.payment.session_opened_at = Some(Utc::now());
        order.sync_status();
        assert_eq!(order.status, OrderStatus::PaymentPending);

        order.payment.status = PaymentStatus::Paid;
        for item in &mut order.items {
            item.status = ItemStatus::Confirmed;
        }
        order.sync_status();
        assert_eq!(order.status, OrderStatus::Paid);

        order.items[0].status = ItemStatus::Processing;
        order.sync_status();
        assert_eq!(order.status, OrderStatus::Processing);

        order.items[0].status = ItemStatus::Delivered;
        order.sync_status();
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[test]
    fn delivered_requires_every_item_delivered() {
        let vendor = Uuid::new_v4();
        let mut order = order_with(&[
            draft_item(vendor, 1, dec!(100)),
            draft_item(Uuid::new_v4(), 1, dec!(100)),
        ]);
        order.admin_approval.status = ApprovalStatus::Approved;
        order.build_assignments();
        for a in &mut order.assignments {
            a.status = AssignmentStatus::Confirmed;
        }
        order.payment.status = PaymentStatus::Paid;
        order.items[0].status = ItemStatus::Delivered;
        order.items[1].status = ItemStatus::Shipped;
        order.sync_status();
        assert_ne!(order.status, OrderStatus::Delivered);
        assert_eq!(order.status, OrderStatus::Shipped);

        order.items[1].status = ItemStatus::Delivered;
        order.sync_status();
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[test]
    fn rejected_approval_derives_cancelled() {
        let mut order = order_with(&[draft_item(Uuid::new_v4(), 1, dec!(100))]);
        order.admin_approval.status = ApprovalStatus::Rejected;
        order.sync_status();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[test]
    fn wire_format_of_status_enum() {
        let s = serde_json::to_string(&OrderStatus::PendingAdminApproval).unwrap();
        assert_eq!(s, "\"pending_admin_approval\"");
        let s = serde_json::to_string(&OrderStatus::VendorConfirmed).unwrap();
        assert_eq!(s, "\"vendor_confirmed\"");
        let s = serde_json::to_string(&PaymentStatus::PartialRefund).unwrap();
        assert_eq!(s, "\"partial_refund\"");
    }
}
