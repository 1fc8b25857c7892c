use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use souq_cart::models::Cart;
use souq_core::error::Error;
use souq_core::identity::Actor;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub variant: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub success: bool,
    pub cart: Cart,
}

fn customer_of(actor: &Actor) -> Result<&str, AppError> {
    match actor {
        Actor::Customer { id } => Ok(id),
        _ => Err(Error::authorization("cart operations are customer-only").into()),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /cart
pub async fn get_cart(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<CartResponse>, AppError> {
    let customer_id = customer_of(&actor)?;
    let cart = state.cart.get(customer_id).await?;
    Ok(Json(CartResponse { success: true, cart }))
}

/// POST /cart/add
pub async fn add_to_cart(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<CartResponse>), AppError> {
    let customer_id = customer_of(&actor)?;
    let cart = state
        .cart
        .add(customer_id, req.product_id, req.quantity, req.variant)
        .await?;
    Ok((StatusCode::CREATED, Json(CartResponse { success: true, cart })))
}

/// PUT /cart/items/{item_id}
pub async fn update_cart_item(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(item_id): Path<Uuid>,
    Json(req): Json<UpdateCartItemRequest>,
) -> Result<Json<CartResponse>, AppError> {
    let customer_id = customer_of(&actor)?;
    let cart = state.cart.update(customer_id, item_id, req.quantity).await?;
    Ok(Json(CartResponse { success: true, cart }))
}

/// DELETE /cart/items/{item_id}
pub async fn remove_cart_item(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<CartResponse>, AppError> {
    let customer_id = customer_of(&actor)?;
    let cart = state.cart.remove(customer_id, item_id).await?;
    Ok(Json(CartResponse { success: true, cart }))
}

/// DELETE /cart
pub async fn clear_cart(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<CartResponse>, AppError> {
    let customer_id = customer_of(&actor)?;
    state.cart.clear(customer_id).await?;
    let cart = state.cart.get(customer_id).await?;
    Ok(Json(CartResponse { success: true, cart }))
}
