use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use souq_api::{app, state::{AppState, AuthConfig}};
use souq_cart::CartService;
use souq_core::notify::{StaticAdminDirectory, TracingSink};
use souq_order::engine::EngineConfig;
use souq_order::reconcile::MockGateway;
use souq_order::{OrderWorkflowEngine, PaymentReconciler};
use souq_store::{CachedProductStore, DbClient, PgCartStore, PgCatalogStore, PgOrderStore, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "souq_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = souq_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Souq API on port {}", config.server.port);

    // Postgres Connection
    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    // Redis Connection
    let redis = Arc::new(
        RedisClient::new(&config.redis.url)
            .await
            .expect("Failed to connect to Redis"),
    );

    let charges = config.business_rules.cart_charges();

    // Catalog: authoritative Postgres store behind a short-lived Redis cache
    // for cart-time advisory reads; the ledger always hits Postgres.
    let pg_catalog = Arc::new(PgCatalogStore::new(db.pool.clone()));
    let products = Arc::new(CachedProductStore::new(
        pg_catalog.clone(),
        redis.clone(),
        30,
    ));

    let cart_store = Arc::new(PgCartStore::new(db.pool.clone(), charges.clone()));
    let order_store = Arc::new(PgOrderStore::new(db.pool.clone()));

    // TODO: wire the hosted-checkout HTTP adapter once provider credentials
    // land; config.gateway already carries store_id/signature_key.
    let gateway = Arc::new(MockGateway::new());

    let engine = Arc::new(OrderWorkflowEngine::new(
        order_store,
        pg_catalog,
        gateway,
        cart_store.clone(),
        Arc::new(StaticAdminDirectory::new(config.admins.clone())),
        Arc::new(TracingSink),
        EngineConfig {
            charges: charges.clone(),
            payout_rates: config.business_rules.payout_rates(),
            currency: config.business_rules.currency.clone(),
            gateway_timeout: Duration::from_secs(config.gateway.timeout_seconds),
        },
    ));

    let app_state = AppState {
        reconciler: Arc::new(PaymentReconciler::new(engine.clone())),
        cart: Arc::new(CartService::new(products, cart_store, charges)),
        engine,
        redis: Some(redis),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
