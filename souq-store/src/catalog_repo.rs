use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use souq_catalog::inventory::{InventoryLedger, LedgerLine};
use souq_catalog::product::{Product, ProductStatus, ProductStore, StockLevel};
use souq_core::error::{Error, Result};

use crate::db_err;

pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    vendor_id: Uuid,
    title: String,
    price: Decimal,
    status: String,
    category_surcharge_rate: Decimal,
    quantity: i32,
    sales_count: i32,
    total_sales: Decimal,
}

impl ProductRow {
    fn into_product(self) -> Product {
        Product {
            id: self.id,
            vendor_id: self.vendor_id,
            title: self.title,
            price: self.price,
            status: if self.status == "active" {
                ProductStatus::Active
            } else {
                ProductStatus::Inactive
            },
            category_surcharge_rate: self.category_surcharge_rate,
            inventory: StockLevel {
                quantity: self.quantity,
                sales_count: self.sales_count,
                total_sales: self.total_sales,
            },
        }
    }
}

#[async_trait]
impl ProductStore for PgCatalogStore {
    async fn get(&self, id: Uuid) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, vendor_id, title, price, status, category_surcharge_rate, quantity, sales_count, total_sales \
             FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(ProductRow::into_product))
    }
}

#[async_trait]
impl InventoryLedger for PgCatalogStore {
    async fn commit(&self, lines: &[LedgerLine]) -> Result<()> {
        for line in lines {
            // Single conditional decrement; two racing commits serialize on
            // the row and the loser sees rows_affected == 0.
            let result = sqlx::query(
                "UPDATE products \
                 SET quantity = quantity - $2, \
                     sales_count = sales_count + $2, \
                     total_sales = total_sales + $3, \
                     updated_at = NOW() \
                 WHERE id = $1 AND quantity >= $2",
            )
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.line_total)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            if result.rows_affected() == 0 {
                let available: Option<i32> =
                    sqlx::query_scalar("SELECT quantity FROM products WHERE id = $1")
                        .bind(line.product_id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(db_err)?;

                return Err(match available {
                    Some(available) => Error::conflict(format!(
                        "insufficient stock for product {}: requested {}, available {available}",
                        line.product_id, line.quantity
                    )),
                    None => Error::not_found(format!("product {} not tracked", line.product_id)),
                });
            }
        }
        Ok(())
    }

    async fn release(&self, lines: &[LedgerLine]) -> Result<()> {
        for line in lines {
            let result = sqlx::query(
                "UPDATE products \
                 SET quantity = quantity + $2, \
                     sales_count = sales_count - $2, \
                     total_sales = total_sales - $3, \
                     updated_at = NOW() \
                 WHERE id = $1",
            )
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.line_total)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            if result.rows_affected() == 0 {
                return Err(Error::not_found(format!(
                    "product {} not tracked",
                    line.product_id
                )));
            }
        }
        Ok(())
    }
}
