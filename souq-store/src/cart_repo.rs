use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use souq_cart::models::{Cart, CartCharges, CartItem};
use souq_cart::repository::CartStore;
use souq_core::error::Result;

use crate::db_err;

pub struct PgCartStore {
    pool: PgPool,
    charges: CartCharges,
}

impl PgCartStore {
    pub fn new(pool: PgPool, charges: CartCharges) -> Self {
        Self { pool, charges }
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: Uuid,
    product_id: Uuid,
    vendor_id: Uuid,
    title: String,
    quantity: i32,
    unit_price: Decimal,
    variant: Option<String>,
    category_surcharge_rate: Decimal,
    added_at: DateTime<Utc>,
    is_available: bool,
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn load_or_create(&self, customer_id: &str) -> Result<Cart> {
        let discount: Option<Decimal> =
            sqlx::query_scalar("SELECT discount FROM carts WHERE customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        let discount = match discount {
            Some(d) => d,
            None => {
                // Created lazily on first access
                sqlx::query("INSERT INTO carts (customer_id) VALUES ($1) ON CONFLICT DO NOTHING")
                    .bind(customer_id)
                    .execute(&self.pool)
                    .await
                    .map_err(db_err)?;
                Decimal::ZERO
            }
        };

        let rows = sqlx::query_as::<_, CartItemRow>(
            "SELECT id, product_id, vendor_id, title, quantity, unit_price, variant, \
                    category_surcharge_rate, added_at, is_available \
             FROM cart_items WHERE customer_id = $1 ORDER BY added_at",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut cart = Cart::new(customer_id);
        cart.discount = discount;
        cart.items = rows
            .into_iter()
            .map(|r| CartItem {
                id: r.id,
                product_id: r.product_id,
                vendor_id: r.vendor_id,
                title: r.title,
                quantity: r.quantity,
                unit_price: r.unit_price,
                variant: r.variant,
                category_surcharge_rate: r.category_surcharge_rate,
                added_at: r.added_at,
                is_available: r.is_available,
            })
            .collect();
        cart.recalculate(&self.charges);
        Ok(cart)
    }

    async fn save(&self, cart: &Cart) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "INSERT INTO carts (customer_id, discount, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (customer_id) DO UPDATE SET discount = $2, updated_at = NOW()",
        )
        .bind(&cart.customer_id)
        .bind(cart.discount)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("DELETE FROM cart_items WHERE customer_id = $1")
            .bind(&cart.customer_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for item in &cart.items {
            sqlx::query(
                "INSERT INTO cart_items (id, customer_id, product_id, vendor_id, title, quantity, \
                                         unit_price, variant, category_surcharge_rate, added_at, is_available) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(item.id)
            .bind(&cart.customer_id)
            .bind(item.product_id)
            .bind(item.vendor_id)
            .bind(&item.title)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(&item.variant)
            .bind(item.category_surcharge_rate)
            .bind(item.added_at)
            .bind(item.is_available)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn clear(&self, customer_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM cart_items WHERE customer_id = $1")
            .bind(customer_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query("UPDATE carts SET discount = 0, updated_at = NOW() WHERE customer_id = $1")
            .bind(customer_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}
