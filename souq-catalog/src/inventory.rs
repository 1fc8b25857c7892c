use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use souq_core::error::{Error, Result};

use crate::product::{Product, ProductStore};

/// One inventory movement, derived from an order item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub line_total: Decimal,
}

/// Atomic stock adjustment primitive driven by order state transitions.
///
/// `commit` applies lines one at a time; a line that would drive stock below
/// zero fails with a conflict naming the product and leaves earlier lines
/// applied. There is no multi-item batch rollback; a failed commit requires
/// manual reconciliation.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// stock -= qty, sales_count += qty, total_sales += line total
    async fn commit(&self, lines: &[LedgerLine]) -> Result<()>;

    /// Inverse of `commit`, used on cancellation/refund of committed stock
    async fn release(&self, lines: &[LedgerLine]) -> Result<()>;
}

/// In-memory catalog backing both product lookup and the ledger.
///
/// The Postgres implementation lives in souq-store; this one serves tests
/// and single-process wiring, with the same conditional-decrement contract.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    products: Arc<RwLock<HashMap<Uuid, Product>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }

    pub async fn stock_of(&self, product_id: Uuid) -> Option<i32> {
        self.products
            .read()
            .await
            .get(&product_id)
            .map(|p| p.inventory.quantity)
    }
}

#[async_trait]
impl ProductStore for MemoryCatalog {
    async fn get(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl InventoryLedger for MemoryCatalog {
    async fn commit(&self, lines: &[LedgerLine]) -> Result<()> {
        let mut products = self.products.write().await;

        for line in lines {
            let product = products
                .get_mut(&line.product_id)
                .ok_or_else(|| Error::not_found(format!("product {} not tracked", line.product_id)))?;

            // Conditional decrement: never drive quantity below zero.
            // Earlier lines in the batch stay applied.
            if product.inventory.quantity < line.quantity {
                return Err(Error::conflict(format!(
                    "insufficient stock for product {}: requested {}, available {}",
                    line.product_id, line.quantity, product.inventory.quantity
                )));
            }

            product.inventory.quantity -= line.quantity;
            product.inventory.sales_count += line.quantity;
            product.inventory.total_sales += line.line_total;
            tracing::debug!(product_id = %line.product_id, qty = line.quantity, "stock committed");
        }

        Ok(())
    }

    async fn release(&self, lines: &[LedgerLine]) -> Result<()> {
        let mut products = self.products.write().await;

        for line in lines {
            let product = products
                .get_mut(&line.product_id)
                .ok_or_else(|| Error::not_found(format!("product {} not tracked", line.product_id)))?;

            product.inventory.quantity += line.quantity;
            product.inventory.sales_count -= line.quantity;
            product.inventory.total_sales -= line.line_total;
            tracing::debug!(product_id = %line.product_id, qty = line.quantity, "stock released");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{ProductStatus, StockLevel};
    use rust_decimal_macros::dec;

    fn product(quantity: i32) -> Product {
        Product {
            id: Uuid::new_v4(),
            vendor_id: Uuid::new_v4(),
            title: "Ceramic Mug".to_string(),
            price: dec!(100),
            status: ProductStatus::Active,
            category_surcharge_rate: dec!(0.05),
            inventory: StockLevel::new(quantity),
        }
    }

    #[tokio::test]
    async fn commit_and_release_roundtrip() {
        let catalog = MemoryCatalog::new();
        let p = product(10);
        let id = p.id;
        catalog.insert(p).await;

        let lines = vec![LedgerLine {
            product_id: id,
            quantity: 3,
            line_total: dec!(300),
        }];

        catalog.commit(&lines).await.unwrap();
        let after = catalog.get(id).await.unwrap().unwrap();
        assert_eq!(after.inventory.quantity, 7);
        assert_eq!(after.inventory.sales_count, 3);
        assert_eq!(after.inventory.total_sales, dec!(300));

        catalog.release(&lines).await.unwrap();
        let restored = catalog.get(id).await.unwrap().unwrap();
        assert_eq!(restored.inventory.quantity, 10);
        assert_eq!(restored.inventory.sales_count, 0);
        assert_eq!(restored.inventory.total_sales, dec!(0));
    }

    #[tokio::test]
    async fn commit_underflow_is_rejected_not_clamped() {
        let catalog = MemoryCatalog::new();
        let p = product(2);
        let id = p.id;
        catalog.insert(p).await;

        let err = catalog
            .commit(&[LedgerLine {
                product_id: id,
                quantity: 5,
                line_total: dec!(500),
            }])
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 409);
        // Stock untouched
        assert_eq!(catalog.stock_of(id).await, Some(2));
    }

    #[tokio::test]
    async fn partial_commit_leaves_earlier_lines_applied() {
        let catalog = MemoryCatalog::new();
        let first = product(10);
        let second = product(1);
        let (first_id, second_id) = (first.id, second.id);
        catalog.insert(first).await;
        catalog.insert(second).await;

        let lines = vec![
            LedgerLine {
                product_id: first_id,
                quantity: 4,
                line_total: dec!(400),
            },
            LedgerLine {
                product_id: second_id,
                quantity: 2,
                line_total: dec!(200),
            },
        ];

        let err = catalog.commit(&lines).await.unwrap_err();
        assert!(err.to_string().contains(&second_id.to_string()));

        // First line stays applied; callers reconcile manually.
        assert_eq!(catalog.stock_of(first_id).await, Some(6));
        assert_eq!(catalog.stock_of(second_id).await, Some(1));
    }
}
