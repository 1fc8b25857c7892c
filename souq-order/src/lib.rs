pub mod engine;
pub mod models;
pub mod payouts;
pub mod reconcile;
pub mod repository;

pub use engine::OrderWorkflowEngine;
pub use models::{Order, OrderItem, OrderStatus, ItemStatus, VendorAssignment};
pub use payouts::{compute_payouts, PayoutRates};
pub use reconcile::PaymentReconciler;
pub use repository::{MemoryOrderStore, OrderStore};
