use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use souq_core::error::Result;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    Inactive,
}

/// Tracked stock counters for a product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockLevel {
    pub quantity: i32,
    pub sales_count: i32,
    pub total_sales: Decimal,
}

impl StockLevel {
    pub fn new(quantity: i32) -> Self {
        Self {
            quantity,
            sales_count: 0,
            total_sales: Decimal::ZERO,
        }
    }
}

/// Catalog snapshot of a sellable product.
///
/// The catalog itself (CRUD, categories, brands) is an external collaborator;
/// the workflow only ever reads this view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub title: String,
    pub price: Decimal,
    pub status: ProductStatus,
    /// Category-specific service-charge rate folded in at order creation
    pub category_surcharge_rate: Decimal,
    pub inventory: StockLevel,
}

impl Product {
    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

/// Read-only product lookup used by the cart and order creation.
///
/// Stock read through here is advisory only; the authoritative decrement is
/// the ledger commit at payment time.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Product>>;

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(p) = self.get(*id).await? {
                found.push(p);
            }
        }
        Ok(found)
    }
}
