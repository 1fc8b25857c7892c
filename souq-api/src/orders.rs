use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use souq_core::error::Error;
use souq_core::identity::Actor;
use souq_order::models::{Address, ItemStatus, Order, VendorPayout};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
}

#[derive(Debug, Deserialize)]
pub struct RejectOrderRequest {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VendorRejectRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemStatusRequest {
    pub item_id: Uuid,
    pub status: ItemStatus,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub success: bool,
    pub order: Order,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub success: bool,
    pub orders: Vec<Order>,
}

#[derive(Debug, Serialize)]
pub struct PayoutListResponse {
    pub success: bool,
    pub payouts: Vec<OrderPayouts>,
}

#[derive(Debug, Serialize)]
pub struct OrderPayouts {
    pub order_number: String,
    pub payouts: Vec<VendorPayout>,
}

fn can_view(actor: &Actor, order: &Order) -> bool {
    match actor {
        Actor::Admin { .. } => true,
        Actor::Customer { id } => *id == order.customer_id,
        Actor::Vendor { id } => order.assignment_for(*id).is_some()
            || order.items.iter().any(|i| i.vendor_id == *id),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /orders
/// Checkout: validate the cart, materialize an order, pending admin approval
pub async fn create_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let Actor::Customer { id: customer_id } = &actor else {
        return Err(Error::authorization("checkout is customer-only").into());
    };

    let draft = state.cart.checkout(customer_id).await?;
    let order = state
        .engine
        .place_from_draft(draft, req.shipping_address, req.billing_address)
        .await?;

    Ok((StatusCode::CREATED, Json(OrderResponse { success: true, order })))
}

/// GET /orders
/// The caller's orders: own orders for customers, assigned orders for
/// vendors, everything for admins
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<OrderListResponse>, AppError> {
    let orders = state.engine.orders_for(&actor).await?;
    Ok(Json(OrderListResponse { success: true, orders }))
}

/// GET /orders/{order_number}
pub async fn get_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.engine.get(&order_number).await?;
    if !can_view(&actor, &order) {
        return Err(Error::authorization("order does not belong to caller").into());
    }
    Ok(Json(OrderResponse { success: true, order }))
}

/// PUT /orders/admin/{order_number}/approve
pub async fn approve_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.engine.approve(&actor, &order_number).await?;
    Ok(Json(OrderResponse { success: true, order }))
}

/// PUT /orders/admin/{order_number}/reject
pub async fn reject_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_number): Path<String>,
    Json(req): Json<RejectOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.engine.reject(&actor, &order_number, req.note).await?;
    Ok(Json(OrderResponse { success: true, order }))
}

/// PUT /orders/vendor/{order_number}/confirm
pub async fn vendor_confirm(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.engine.vendor_confirm(&actor, &order_number).await?;
    Ok(Json(OrderResponse { success: true, order }))
}

/// PUT /orders/vendor/{order_number}/reject
pub async fn vendor_reject(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_number): Path<String>,
    Json(req): Json<VendorRejectRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .engine
        .vendor_reject(&actor, &order_number, req.reason)
        .await?;
    Ok(Json(OrderResponse { success: true, order }))
}

/// PUT /orders/{order_number}/status
/// Advance one item along its fulfillment chain
pub async fn update_item_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_number): Path<String>,
    Json(req): Json<UpdateItemStatusRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .engine
        .advance_item(&actor, &order_number, req.item_id, req.status)
        .await?;
    Ok(Json(OrderResponse { success: true, order }))
}

/// PUT /orders/{order_number}/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.engine.cancel(&actor, &order_number).await?;

    // Stock snapshots are stale once committed stock flows back
    if order.payment.stock_committed() {
        invalidate_product_cache(&state, &order).await;
    }

    Ok(Json(OrderResponse { success: true, order }))
}

/// PUT /orders/admin/{order_number}/refund
pub async fn refund_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_number): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.engine.refund(&actor, &order_number, req.amount).await?;
    invalidate_product_cache(&state, &order).await;
    Ok(Json(OrderResponse { success: true, order }))
}

/// PUT /orders/{order_number}/notifications/{note_id}/read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((order_number, note_id)): Path<(String, Uuid)>,
) -> Result<StatusCode, AppError> {
    let order = state.engine.get(&order_number).await?;
    if !can_view(&actor, &order) {
        return Err(Error::authorization("order does not belong to caller").into());
    }

    state.engine.mark_notification_read(&order_number, note_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /payouts/vendor
/// Settlement summary for the calling vendor
pub async fn vendor_payouts(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<PayoutListResponse>, AppError> {
    let vendor_id = actor.require_vendor()?;
    let orders = state.engine.orders_for(&actor).await?;

    let payouts = orders
        .into_iter()
        .filter_map(|order| {
            let own: Vec<VendorPayout> = order
                .payouts
                .iter()
                .filter(|p| p.vendor_id == vendor_id)
                .cloned()
                .collect();
            (!own.is_empty()).then(|| OrderPayouts {
                order_number: order.order_number,
                payouts: own,
            })
        })
        .collect();

    Ok(Json(PayoutListResponse { success: true, payouts }))
}

pub(crate) async fn invalidate_product_cache(state: &AppState, order: &Order) {
    if let Some(redis) = &state.redis {
        for item in &order.items {
            if let Err(e) = redis.invalidate_product(item.product_id).await {
                tracing::warn!(product_id = %item.product_id, "cache invalidation failed: {e}");
            }
        }
    }
}
