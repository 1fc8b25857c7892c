use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-line quantity cap
pub const MAX_LINE_QUANTITY: i32 = 10;

/// Cart-level pricing rules.
///
/// Category-specific surcharges are folded in at order creation, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartCharges {
    pub tax_rate: Decimal,
    pub service_charge_rate: Decimal,
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_fee: Decimal,
}

impl Default for CartCharges {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(5, 2),
            service_charge_rate: Decimal::new(5, 2),
            free_shipping_threshold: Decimal::new(1000, 0),
            flat_shipping_fee: Decimal::new(60, 0),
        }
    }
}

/// Candidate line item with a live price snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub title: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub variant: Option<String>,
    pub category_surcharge_rate: Decimal,
    pub added_at: DateTime<Utc>,
    pub is_available: bool,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Derived totals, recomputed whenever items change
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping_cost: Decimal,
    pub service_charge: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub item_count: i32,
}

/// Per-customer staging area; created lazily on first access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub customer_id: String,
    pub items: Vec<CartItem>,
    pub discount: Decimal,
    pub totals: CartTotals,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            items: Vec::new(),
            discount: Decimal::ZERO,
            totals: CartTotals::default(),
            updated_at: Utc::now(),
        }
    }

    /// Recompute derived totals; called after every mutation
    pub fn recalculate(&mut self, charges: &CartCharges) {
        let subtotal: Decimal = self.items.iter().map(CartItem::line_total).sum();

        let tax = subtotal * charges.tax_rate;
        let shipping_cost = if self.items.is_empty() || subtotal > charges.free_shipping_threshold {
            Decimal::ZERO
        } else {
            charges.flat_shipping_fee
        };
        let service_charge = subtotal * charges.service_charge_rate;
        let total = (subtotal + tax + shipping_cost + service_charge - self.discount)
            .max(Decimal::ZERO);

        self.totals = CartTotals {
            subtotal,
            tax,
            shipping_cost,
            service_charge,
            discount: self.discount,
            total,
            item_count: self.items.iter().map(|i| i.quantity).sum(),
        };
        self.updated_at = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Validated, stock-checked snapshot of cart contents ready to become an order.
///
/// Immutable; the cart it came from is untouched until the order is durably
/// created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDraft {
    pub customer_id: String,
    pub items: Vec<DraftItem>,
    pub discount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftItem {
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub title: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub category_surcharge_rate: Decimal,
}

impl DraftItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}
