use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderPlacedEvent {
    pub order_number: String,
    pub customer_id: String,
    pub vendor_count: usize,
    pub total: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderPaidEvent {
    pub order_number: String,
    pub customer_id: String,
    pub transaction_id: String,
    pub total: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct VendorRespondedEvent {
    pub order_number: String,
    pub vendor_id: Uuid,
    pub confirmed: bool,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SettlementEvent {
    pub order_number: String,
    pub vendor_id: Uuid,
    pub net_amount: Decimal,
    pub event_type: String,
    pub timestamp: i64,
}
