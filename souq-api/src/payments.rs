use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use souq_cart::models::DraftItem;
use souq_core::error::Error;
use souq_core::gateway::{GatewaySession, PaymentStatus};
use souq_core::identity::Actor;
use souq_order::models::{Address, OrderStatus};
use souq_order::reconcile::IpnNotice;

use crate::error::AppError;
use crate::orders::{invalidate_product_cache, OrderResponse};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct InitializePaymentRequest {
    /// Materialize the caller's cart when true; otherwise `items` is used
    #[serde(default)]
    pub use_cart: bool,
    #[serde(default)]
    pub items: Vec<AdHocItem>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
}

#[derive(Debug, Deserialize)]
pub struct AdHocItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct PayRequest {
    pub method: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentSessionResponse {
    pub success: bool,
    pub order_number: String,
    pub session: GatewaySession,
}

#[derive(Debug, Deserialize)]
pub struct RedirectPayload {
    pub order_number: String,
    pub transaction_id: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub success: bool,
    pub order_number: String,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
}

// ============================================================================
// Customer-facing handlers (authenticated)
// ============================================================================

/// POST /payment/initialize
/// Create the order that will later be paid; lands in pending_admin_approval
pub async fn initialize_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<InitializePaymentRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let Actor::Customer { id: customer_id } = &actor else {
        return Err(Error::authorization("payment initialization is customer-only").into());
    };

    let order = if req.use_cart {
        let draft = state.cart.checkout(customer_id).await?;
        state
            .engine
            .place_from_draft(draft, req.shipping_address, req.billing_address)
            .await?
    } else {
        let items = resolve_ad_hoc_items(&state, &req.items).await?;
        state
            .engine
            .place_direct(
                customer_id.clone(),
                &items,
                Decimal::ZERO,
                req.shipping_address,
                req.billing_address,
            )
            .await?
    };

    Ok((StatusCode::CREATED, Json(OrderResponse { success: true, order })))
}

/// POST /payment/pay/{order_number}
/// vendor_confirmed → payment_pending; returns the hosted checkout session
pub async fn pay_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_number): Path<String>,
    Json(req): Json<PayRequest>,
) -> Result<Json<PaymentSessionResponse>, AppError> {
    let session = state
        .engine
        .start_payment(&actor, &order_number, req.method)
        .await?;

    Ok(Json(PaymentSessionResponse {
        success: true,
        order_number,
        session,
    }))
}

/// POST /payment/admin/{order_number}/check
/// Admin-triggered status check; third reconciliation entry point
pub async fn check_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    actor.require_admin()?;
    let order = state.reconciler.check_status(&order_number).await?;
    invalidate_product_cache(&state, &order).await;
    Ok(Json(OrderResponse { success: true, order }))
}

// ============================================================================
// Gateway-facing handlers (unauthenticated, validated against the provider)
// ============================================================================

/// POST /payment/success
/// Customer redirect after checkout; first reconciliation entry point
pub async fn payment_success(
    State(state): State<AppState>,
    Json(payload): Json<RedirectPayload>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .reconciler
        .redirect_success(&payload.order_number, &payload.transaction_id)
        .await?;
    invalidate_product_cache(&state, &order).await;
    Ok(Json(OrderResponse { success: true, order }))
}

/// POST /payment/failed
pub async fn payment_failed(
    State(state): State<AppState>,
    Json(payload): Json<RedirectPayload>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .reconciler
        .redirect_failure(&payload.order_number, &payload.transaction_id)
        .await?;
    Ok(Json(OrderResponse { success: true, order }))
}

/// POST /payment/cancelled
pub async fn payment_cancelled(
    State(state): State<AppState>,
    Json(payload): Json<RedirectPayload>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .reconciler
        .redirect_failure(&payload.order_number, &payload.transaction_id)
        .await?;
    Ok(Json(OrderResponse { success: true, order }))
}

/// POST /payment/ipn
/// Webhook; second reconciliation entry point. Gateway contract: bare
/// 200/500, no JSON body.
pub async fn payment_ipn(State(state): State<AppState>, Json(notice): Json<IpnNotice>) -> StatusCode {
    match state.reconciler.ipn(&notice).await {
        Ok(order) => {
            invalidate_product_cache(&state, &order).await;
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(
                order_number = %notice.order_number,
                transaction_id = %notice.transaction_id,
                "IPN processing failed: {e}"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// GET /payment/validate/{order_number}
/// Current payment/order status only; never mutates
pub async fn validate_payment(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let order = state.engine.get(&order_number).await?;
    Ok(Json(PaymentStatusResponse {
        success: true,
        order_number: order.order_number.clone(),
        order_status: order.status,
        payment_status: order.payment.status,
    }))
}

// ============================================================================
// Internals
// ============================================================================

async fn resolve_ad_hoc_items(
    state: &AppState,
    items: &[AdHocItem],
) -> Result<Vec<DraftItem>, AppError> {
    if items.is_empty() {
        return Err(Error::validation("either use_cart or a non-empty items list is required").into());
    }

    let mut drafts = Vec::with_capacity(items.len());
    for entry in items {
        if entry.quantity < 1 {
            return Err(Error::validation("quantity must be at least 1").into());
        }

        let product = state
            .cart
            .products()
            .get(entry.product_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("product {} not found", entry.product_id)))?;

        if !product.is_active() {
            return Err(Error::conflict(format!("product '{}' is not available", product.title)).into());
        }
        if entry.quantity > product.inventory.quantity {
            return Err(Error::conflict(format!(
                "insufficient stock for '{}': requested {}, available {}",
                product.title, entry.quantity, product.inventory.quantity
            ))
            .into());
        }

        drafts.push(DraftItem {
            product_id: product.id,
            vendor_id: product.vendor_id,
            title: product.title.clone(),
            quantity: entry.quantity,
            unit_price: product.price,
            category_surcharge_rate: product.category_surcharge_rate,
        });
    }
    Ok(drafts)
}
