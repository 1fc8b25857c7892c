use axum::{
    extract::State,
    http::Method,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod cart;
pub mod error;
pub mod middleware;
pub mod orders;
pub mod payments;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    // Gateway-facing endpoints carry no session; every claim in their
    // payloads is re-validated against the provider before it takes effect.
    let public = Router::new()
        .route("/payment/success", post(payments::payment_success))
        .route("/payment/failed", post(payments::payment_failed))
        .route("/payment/cancelled", post(payments::payment_cancelled))
        .route("/payment/ipn", post(payments::payment_ipn))
        .route("/payment/validate/{order_number}", get(payments::validate_payment));

    let protected = Router::new()
        .route("/cart", get(cart::get_cart).delete(cart::clear_cart))
        .route("/cart/add", post(cart::add_to_cart))
        .route(
            "/cart/items/{item_id}",
            put(cart::update_cart_item).delete(cart::remove_cart_item),
        )
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/{order_number}", get(orders::get_order))
        .route("/orders/admin/{order_number}/approve", put(orders::approve_order))
        .route("/orders/admin/{order_number}/reject", put(orders::reject_order))
        .route("/orders/admin/{order_number}/refund", put(orders::refund_order))
        .route("/orders/vendor/{order_number}/confirm", put(orders::vendor_confirm))
        .route("/orders/vendor/{order_number}/reject", put(orders::vendor_reject))
        .route("/orders/{order_number}/status", put(orders::update_item_status))
        .route("/orders/{order_number}/cancel", put(orders::cancel_order))
        .route(
            "/orders/{order_number}/notifications/{note_id}/read",
            put(orders::mark_notification_read),
        )
        .route("/payouts/vendor", get(orders::vendor_payouts))
        .route("/payment/initialize", post(payments::initialize_payment))
        .route("/payment/pay/{order_number}", post(payments::pay_order))
        .route("/payment/admin/{order_number}/check", post(payments::check_payment))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, impl IntoResponse> {
    let Some(redis) = &state.redis else {
        return Ok(next.run(req).await);
    };

    let ip = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let key = format!("ratelimit:{}", ip);

    match redis.check_rate_limit(&key, 100, 60).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err((axum::http::StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")),
        Err(_) => Ok(next.run(req).await), // Fail open
    }
}
