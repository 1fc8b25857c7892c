use std::str::FromStr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use souq_api::middleware::auth::Claims;
use souq_api::state::{AppState, AuthConfig};
use souq_api::app;
use souq_cart::models::CartCharges;
use souq_cart::repository::MemoryCartStore;
use souq_cart::CartService;
use souq_catalog::inventory::MemoryCatalog;
use souq_catalog::product::{Product, ProductStatus, StockLevel};
use souq_core::notify::{StaticAdminDirectory, TracingSink};
use souq_order::engine::EngineConfig;
use souq_order::reconcile::MockGateway;
use souq_order::repository::MemoryOrderStore;
use souq_order::{OrderWorkflowEngine, PaymentReconciler};

const SECRET: &str = "integration-test-secret";

struct TestApp {
    router: Router,
    catalog: MemoryCatalog,
}

fn test_app() -> TestApp {
    let catalog = MemoryCatalog::new();
    let orders = MemoryOrderStore::new();
    let carts = MemoryCartStore::new();
    let gateway = Arc::new(MockGateway::new());
    let charges = CartCharges::default();

    let engine = Arc::new(OrderWorkflowEngine::new(
        Arc::new(orders),
        Arc::new(catalog.clone()),
        gateway,
        Arc::new(carts.clone()),
        Arc::new(StaticAdminDirectory::new(vec!["root-admin".to_string()])),
        Arc::new(TracingSink),
        EngineConfig::default(),
    ));

    let state = AppState {
        reconciler: Arc::new(PaymentReconciler::new(engine.clone())),
        cart: Arc::new(CartService::new(
            Arc::new(catalog.clone()),
            Arc::new(carts),
            charges,
        )),
        engine,
        redis: None,
        auth: AuthConfig {
            secret: SECRET.to_string(),
            expiration: 3600,
        },
    };

    TestApp {
        router: app(state),
        catalog,
    }
}

async fn seed_product(app: &TestApp, price: Decimal, stock: i32, surcharge: Decimal) -> Product {
    let product = Product {
        id: Uuid::new_v4(),
        vendor_id: Uuid::new_v4(),
        title: "Copper Kettle".to_string(),
        price,
        status: ProductStatus::Active,
        category_surcharge_rate: surcharge,
        inventory: StockLevel::new(stock),
    };
    app.catalog.insert(product.clone()).await;
    product
}

fn token(sub: &str, role: &str, vendor_id: Option<Uuid>) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        email: None,
        role: role.to_string(),
        vendor_id,
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn call(
    app: &TestApp,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        builder = builder.header("Authorization", format!("Bearer {t}"));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn dec_of(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).unwrap(),
        other => panic!("not a decimal: {other:?}"),
    }
}

fn shipping_address() -> Value {
    json!({
        "name": "Amina Rahman",
        "line1": "12 Harbor Lane",
        "city": "Dhaka",
        "postal_code": "1207",
        "country": "BD",
        "phone": null
    })
}

#[tokio::test]
async fn full_workflow_over_http() {
    let app = test_app();
    // 10%-surcharge category, the worked scenario: 3 x 400
    let product = seed_product(&app, dec!(400), 10, dec!(0.10)).await;

    let customer = token("cust-1", "CUSTOMER", None);
    let admin = token("root-admin", "ADMIN", None);
    let vendor = token("vendor-user", "VENDOR", Some(product.vendor_id));

    // Add to cart
    let (status, body) = call(
        &app,
        "POST",
        "/cart/add",
        Some(&customer),
        Some(json!({"product_id": product.id, "quantity": 3, "variant": null})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(dec_of(&body["cart"]["totals"]["subtotal"]), dec!(1200));

    // Checkout
    let (status, body) = call(
        &app,
        "POST",
        "/orders",
        Some(&customer),
        Some(json!({"shipping_address": shipping_address(), "billing_address": null})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["order"]["status"], "pending_admin_approval");
    // Order totals fold the 10% category surcharge in
    assert_eq!(dec_of(&body["order"]["totals"]["tax"]), dec!(60));
    assert_eq!(dec_of(&body["order"]["totals"]["shipping_cost"]), dec!(0));
    assert_eq!(dec_of(&body["order"]["totals"]["service_charge"]), dec!(120));
    assert_eq!(dec_of(&body["order"]["totals"]["total"]), dec!(1380));
    let order_number = body["order"]["order_number"].as_str().unwrap().to_string();

    // Cart was cleared once the order was durably created
    let (_, body) = call(&app, "GET", "/cart", Some(&customer), None).await;
    assert_eq!(body["cart"]["items"].as_array().unwrap().len(), 0);

    // Admin approves; fan-out to vendor assignment
    let (status, body) = call(
        &app,
        "PUT",
        &format!("/orders/admin/{order_number}/approve"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "vendor_assigned");

    // Vendor confirms; single vendor, so the order is ready to pay
    let (status, body) = call(
        &app,
        "PUT",
        &format!("/orders/vendor/{order_number}/confirm"),
        Some(&vendor),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "vendor_confirmed");

    // Customer opens the payment session
    let (status, body) = call(
        &app,
        "POST",
        &format!("/payment/pay/{order_number}"),
        Some(&customer),
        Some(json!({"method": "card"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let transaction_id = body["session"]["transaction_id"].as_str().unwrap().to_string();

    // Gateway redirect lands (unauthenticated, verified against provider)
    let (status, body) = call(
        &app,
        "POST",
        "/payment/success",
        None,
        Some(json!({"order_number": order_number, "transaction_id": transaction_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "paid");
    assert_eq!(app.catalog.stock_of(product.id).await, Some(7));

    // The IPN for the same transaction is a no-op success
    let (status, _) = call(
        &app,
        "POST",
        "/payment/ipn",
        None,
        Some(json!({
            "order_number": order_number,
            "transaction_id": transaction_id,
            "status": "success"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.catalog.stock_of(product.id).await, Some(7));

    // Read-only validation endpoint
    let (status, body) = call(
        &app,
        "GET",
        &format!("/payment/validate/{order_number}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_status"], "paid");
    assert_eq!(body["order_status"], "paid");

    // Vendor sees the settlement: 1200 - 10% commission - 2% service charge
    let (status, body) = call(&app, "GET", "/payouts/vendor", Some(&vendor), None).await;
    assert_eq!(status, StatusCode::OK);
    let payouts = body["payouts"].as_array().unwrap();
    assert_eq!(payouts.len(), 1);
    assert_eq!(dec_of(&payouts[0]["payouts"][0]["net_amount"]), dec!(1056));
}

#[tokio::test]
async fn role_mismatch_is_forbidden() {
    let app = test_app();
    let product = seed_product(&app, dec!(100), 10, dec!(0.05)).await;
    let customer = token("cust-1", "CUSTOMER", None);

    call(
        &app,
        "POST",
        "/cart/add",
        Some(&customer),
        Some(json!({"product_id": product.id, "quantity": 1, "variant": null})),
    )
    .await;
    let (_, body) = call(
        &app,
        "POST",
        "/orders",
        Some(&customer),
        Some(json!({"shipping_address": shipping_address(), "billing_address": null})),
    )
    .await;
    let order_number = body["order"]["order_number"].as_str().unwrap().to_string();

    // A customer cannot approve
    let (status, body) = call(
        &app,
        "PUT",
        &format!("/orders/admin/{order_number}/approve"),
        Some(&customer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "authorization_error");

    // A vendor with no assignment on the order cannot confirm
    let stranger = token("vendor-x", "VENDOR", Some(Uuid::new_v4()));
    let admin = token("root-admin", "ADMIN", None);
    call(&app, "PUT", &format!("/orders/admin/{order_number}/approve"), Some(&admin), None).await;
    let (status, _) = call(
        &app,
        "PUT",
        &format!("/orders/vendor/{order_number}/confirm"),
        Some(&stranger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = test_app();
    let (status, _) = call(&app, "GET", "/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = test_app();
    let admin = token("root-admin", "ADMIN", None);
    let (status, body) = call(&app, "GET", "/orders/SOUQ-NOPE", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn illegal_transition_is_a_conflict() {
    let app = test_app();
    let product = seed_product(&app, dec!(100), 10, dec!(0.05)).await;
    let customer = token("cust-1", "CUSTOMER", None);
    let admin = token("root-admin", "ADMIN", None);

    call(
        &app,
        "POST",
        "/cart/add",
        Some(&customer),
        Some(json!({"product_id": product.id, "quantity": 1, "variant": null})),
    )
    .await;
    let (_, body) = call(
        &app,
        "POST",
        "/orders",
        Some(&customer),
        Some(json!({"shipping_address": shipping_address(), "billing_address": null})),
    )
    .await;
    let order_number = body["order"]["order_number"].as_str().unwrap().to_string();

    call(&app, "PUT", &format!("/orders/admin/{order_number}/approve"), Some(&admin), None).await;
    let (status, body) = call(
        &app,
        "PUT",
        &format!("/orders/admin/{order_number}/approve"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn cart_violations_map_to_400_and_409() {
    let app = test_app();
    let product = seed_product(&app, dec!(100), 5, dec!(0.05)).await;
    let customer = token("cust-1", "CUSTOMER", None);

    // Cap violation is the caller's input problem
    let (status, _) = call(
        &app,
        "POST",
        "/cart/add",
        Some(&customer),
        Some(json!({"product_id": product.id, "quantity": 11, "variant": null})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Stock violation is catalog state
    let (status, body) = call(
        &app,
        "POST",
        "/cart/add",
        Some(&customer),
        Some(json!({"product_id": product.id, "quantity": 8, "variant": null})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    // Unknown product
    let (status, _) = call(
        &app,
        "POST",
        "/cart/add",
        Some(&customer),
        Some(json!({"product_id": Uuid::new_v4(), "quantity": 1, "variant": null})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ipn_with_unknown_status_is_a_bare_500() {
    let app = test_app();
    let (status, body) = call(
        &app,
        "POST",
        "/payment/ipn",
        None,
        Some(json!({
            "order_number": "SOUQ-NOPE",
            "transaction_id": "tx-1",
            "status": "garbled"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    // Gateway contract: no JSON body on the IPN endpoint
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn ad_hoc_initialize_creates_pending_order() {
    let app = test_app();
    let product = seed_product(&app, dec!(250), 10, dec!(0.05)).await;
    let customer = token("cust-9", "CUSTOMER", None);

    let (status, body) = call(
        &app,
        "POST",
        "/payment/initialize",
        Some(&customer),
        Some(json!({
            "use_cart": false,
            "items": [{"product_id": product.id, "quantity": 2}],
            "shipping_address": shipping_address(),
            "billing_address": null
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["order"]["status"], "pending_admin_approval");
    assert_eq!(dec_of(&body["order"]["totals"]["subtotal"]), dec!(500));
}

#[tokio::test]
async fn customer_marks_notification_read() {
    let app = test_app();
    let product = seed_product(&app, dec!(100), 10, dec!(0.05)).await;
    let customer = token("cust-1", "CUSTOMER", None);
    let admin = token("root-admin", "ADMIN", None);

    call(
        &app,
        "POST",
        "/cart/add",
        Some(&customer),
        Some(json!({"product_id": product.id, "quantity": 1, "variant": null})),
    )
    .await;
    let (_, body) = call(
        &app,
        "POST",
        "/orders",
        Some(&customer),
        Some(json!({"shipping_address": shipping_address(), "billing_address": null})),
    )
    .await;
    let order_number = body["order"]["order_number"].as_str().unwrap().to_string();
    call(&app, "PUT", &format!("/orders/admin/{order_number}/approve"), Some(&admin), None).await;

    let (_, body) = call(&app, "GET", &format!("/orders/{order_number}"), Some(&customer), None).await;
    let note_id = body["order"]["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["recipient"]["kind"] == "customer")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, _) = call(
        &app,
        "PUT",
        &format!("/orders/{order_number}/notifications/{note_id}/read"),
        Some(&customer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = call(&app, "GET", &format!("/orders/{order_number}"), Some(&customer), None).await;
    let read_flags: Vec<bool> = body["order"]["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|n| n["id"] == note_id.as_str())
        .map(|n| n["is_read"].as_bool().unwrap())
        .collect();
    assert_eq!(read_flags, vec![true]);
}
