pub mod app_config;
pub mod cart_repo;
pub mod catalog_repo;
pub mod database;
pub mod order_repo;
pub mod redis_repo;

pub use cart_repo::PgCartStore;
pub use catalog_repo::PgCatalogStore;
pub use database::DbClient;
pub use order_repo::PgOrderStore;
pub use redis_repo::{CachedProductStore, RedisClient};

use souq_core::error::Error;

/// Map a storage failure into the domain taxonomy; details go to the log,
/// not the caller
pub(crate) fn db_err(e: sqlx::Error) -> Error {
    tracing::error!("database error: {e}");
    Error::internal(e)
}
