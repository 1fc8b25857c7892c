pub mod error;
pub mod gateway;
pub mod identity;
pub mod notify;

pub use error::{Error, Result};
pub use identity::Actor;
