use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Authenticated caller of a workflow operation.
///
/// Built by the API layer from verified JWT claims; the workflow engine only
/// ever sees this, never raw tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Actor {
    Customer { id: String },
    Vendor { id: Uuid },
    Admin { id: String },
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin { .. })
    }

    /// Vendor id when the caller is a vendor
    pub fn vendor_id(&self) -> Option<Uuid> {
        match self {
            Actor::Vendor { id } => Some(*id),
            _ => None,
        }
    }

    /// Guard: the caller must be the admin role
    pub fn require_admin(&self) -> Result<&str> {
        match self {
            Actor::Admin { id } => Ok(id),
            _ => Err(Error::authorization("admin role required")),
        }
    }

    /// Guard: the caller must be a vendor
    pub fn require_vendor(&self) -> Result<Uuid> {
        match self {
            Actor::Vendor { id } => Ok(*id),
            _ => Err(Error::authorization("vendor role required")),
        }
    }

    /// Guard: the caller must be the given customer (admins also pass)
    pub fn require_customer(&self, customer_id: &str) -> Result<()> {
        match self {
            Actor::Customer { id } if id == customer_id => Ok(()),
            Actor::Admin { .. } => Ok(()),
            _ => Err(Error::authorization("order does not belong to caller")),
        }
    }
}
