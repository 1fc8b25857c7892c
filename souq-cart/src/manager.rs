use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use souq_catalog::product::ProductStore;
use souq_core::error::{Error, Result};

use crate::models::{Cart, CartCharges, CartItem, DraftItem, OrderDraft, MAX_LINE_QUANTITY};
use crate::repository::CartStore;

/// Cart operations: add/update/remove/clear and checkout into an order draft.
///
/// Stock checks here are advisory; the authoritative decrement happens at
/// payment time through the inventory ledger.
pub struct CartService {
    products: Arc<dyn ProductStore>,
    carts: Arc<dyn CartStore>,
    charges: CartCharges,
}

impl CartService {
    pub fn new(
        products: Arc<dyn ProductStore>,
        carts: Arc<dyn CartStore>,
        charges: CartCharges,
    ) -> Self {
        Self {
            products,
            carts,
            charges,
        }
    }

    pub async fn get(&self, customer_id: &str) -> Result<Cart> {
        self.carts.load_or_create(customer_id).await
    }

    pub async fn add(
        &self,
        customer_id: &str,
        product_id: Uuid,
        quantity: i32,
        variant: Option<String>,
    ) -> Result<Cart> {
        if quantity < 1 {
            return Err(Error::validation("quantity must be at least 1"));
        }

        let product = self
            .products
            .get(product_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("product {product_id} not found")))?;

        if !product.is_active() {
            return Err(Error::conflict(format!(
                "product '{}' is not available",
                product.title
            )));
        }

        let mut cart = self.carts.load_or_create(customer_id).await?;

        // Identical (product, variant) lines merge; the cap and the stock
        // check apply to the merged quantity, not just the delta.
        let existing = cart
            .items
            .iter()
            .position(|i| i.product_id == product_id && i.variant.as_deref() == variant.as_deref());
        let merged = match existing {
            Some(idx) => cart.items[idx].quantity + quantity,
            None => quantity,
        };

        if merged > MAX_LINE_QUANTITY {
            return Err(Error::validation(format!(
                "quantity for '{}' capped at {MAX_LINE_QUANTITY} per line",
                product.title
            )));
        }
        if merged > product.inventory.quantity {
            return Err(Error::conflict(format!(
                "insufficient stock for '{}': requested {merged}, available {}",
                product.title, product.inventory.quantity
            )));
        }

        match existing {
            Some(idx) => {
                let line = &mut cart.items[idx];
                line.quantity = merged;
                line.unit_price = product.price;
                line.is_available = true;
            }
            None => cart.items.push(CartItem {
                id: Uuid::new_v4(),
                product_id,
                vendor_id: product.vendor_id,
                title: product.title.clone(),
                quantity,
                unit_price: product.price,
                variant,
                category_surcharge_rate: product.category_surcharge_rate,
                added_at: Utc::now(),
                is_available: true,
            }),
        }

        cart.recalculate(&self.charges);
        self.carts.save(&cart).await?;
        Ok(cart)
    }

    pub async fn update(&self, customer_id: &str, item_id: Uuid, quantity: i32) -> Result<Cart> {
        if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
            return Err(Error::validation(format!(
                "quantity must be between 1 and {MAX_LINE_QUANTITY}"
            )));
        }

        let mut cart = self.carts.load_or_create(customer_id).await?;
        let item = cart
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| Error::not_found(format!("cart item {item_id} not found")))?;

        let product = self
            .products
            .get(item.product_id)
            .await?
            .filter(|p| p.is_active())
            .ok_or_else(|| Error::conflict(format!("'{}' is no longer available", item.title)))?;

        if quantity > product.inventory.quantity {
            return Err(Error::conflict(format!(
                "insufficient stock for '{}': requested {quantity}, available {}",
                item.title, product.inventory.quantity
            )));
        }

        item.quantity = quantity;
        item.unit_price = product.price;
        cart.recalculate(&self.charges);
        self.carts.save(&cart).await?;
        Ok(cart)
    }

    pub async fn remove(&self, customer_id: &str, item_id: Uuid) -> Result<Cart> {
        let mut cart = self.carts.load_or_create(customer_id).await?;
        let before = cart.items.len();
        cart.items.retain(|i| i.id != item_id);

        if cart.items.len() == before {
            return Err(Error::not_found(format!("cart item {item_id} not found")));
        }

        cart.recalculate(&self.charges);
        self.carts.save(&cart).await?;
        Ok(cart)
    }

    pub async fn clear(&self, customer_id: &str) -> Result<()> {
        self.carts.clear(customer_id).await
    }

    /// Re-validate every line against the current catalog and snapshot the
    /// cart into an immutable draft. The cart itself is left untouched; it is
    /// cleared only once the order has been durably created.
    pub async fn checkout(&self, customer_id: &str) -> Result<OrderDraft> {
        let mut cart = self.carts.load_or_create(customer_id).await?;

        if cart.is_empty() {
            return Err(Error::validation("cart is empty"));
        }

        let mut unavailable = Vec::new();
        let mut items = Vec::with_capacity(cart.items.len());

        for line in &mut cart.items {
            let product = self.products.get(line.product_id).await?;
            let ok = match &product {
                Some(p) => p.is_active() && p.inventory.quantity >= line.quantity,
                None => false,
            };
            line.is_available = ok;

            if ok {
                items.push(DraftItem {
                    product_id: line.product_id,
                    vendor_id: line.vendor_id,
                    title: line.title.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    category_surcharge_rate: line.category_surcharge_rate,
                });
            } else {
                unavailable.push(line.title.clone());
            }
        }

        if !unavailable.is_empty() {
            // Persist the refreshed availability flags so the customer sees
            // which lines drifted since they were added.
            self.carts.save(&cart).await?;
            return Err(Error::conflict(format!(
                "unavailable items: {}",
                unavailable.join(", ")
            )));
        }

        Ok(OrderDraft {
            customer_id: customer_id.to_string(),
            items,
            discount: cart.discount,
        })
    }

    pub fn charges(&self) -> &CartCharges {
        &self.charges
    }

    /// The read-only catalog view backing this service
    pub fn products(&self) -> &Arc<dyn ProductStore> {
        &self.products
    }
}
