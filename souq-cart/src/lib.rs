pub mod manager;
pub mod models;
pub mod repository;

pub use manager::CartService;
pub use models::{Cart, CartCharges, CartItem, CartTotals, DraftItem, OrderDraft};
pub use repository::{CartStore, MemoryCartStore};
