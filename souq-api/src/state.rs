use std::sync::Arc;

use souq_cart::CartService;
use souq_order::{OrderWorkflowEngine, PaymentReconciler};
use souq_store::RedisClient;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<OrderWorkflowEngine>,
    pub reconciler: Arc<PaymentReconciler>,
    pub cart: Arc<CartService>,
    /// Absent in tests; rate limiting and the product cache fail open
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
}
