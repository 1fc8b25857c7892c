use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use souq_core::error::Result;

use crate::models::Cart;

/// Cart persistence; one cart per customer, created lazily on first access
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn load_or_create(&self, customer_id: &str) -> Result<Cart>;

    async fn save(&self, cart: &Cart) -> Result<()>;

    /// Empty the cart but keep it; used on checkout/payment confirmation
    async fn clear(&self, customer_id: &str) -> Result<()>;
}

/// In-memory cart store for tests and single-process wiring
#[derive(Clone, Default)]
pub struct MemoryCartStore {
    carts: Arc<RwLock<HashMap<String, Cart>>>,
}

impl MemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn load_or_create(&self, customer_id: &str) -> Result<Cart> {
        let mut carts = self.carts.write().await;
        Ok(carts
            .entry(customer_id.to_string())
            .or_insert_with(|| Cart::new(customer_id))
            .clone())
    }

    async fn save(&self, cart: &Cart) -> Result<()> {
        self.carts
            .write()
            .await
            .insert(cart.customer_id.clone(), cart.clone());
        Ok(())
    }

    async fn clear(&self, customer_id: &str) -> Result<()> {
        let mut carts = self.carts.write().await;
        if let Some(cart) = carts.get_mut(customer_id) {
            cart.items.clear();
            cart.discount = rust_decimal::Decimal::ZERO;
            cart.recalculate(&crate::models::CartCharges::default());
        }
        Ok(())
    }
}
