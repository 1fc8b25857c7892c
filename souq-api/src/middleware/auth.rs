use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use souq_core::identity::Actor;

use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: Option<String>,
    pub role: String,
    /// Present only for vendor tokens
    pub vendor_id: Option<Uuid>,
    pub exp: usize,
}

impl Claims {
    /// Map verified claims onto the workflow's actor model
    pub fn actor(&self) -> Option<Actor> {
        match self.role.as_str() {
            "CUSTOMER" => Some(Actor::Customer {
                id: self.sub.clone(),
            }),
            "VENDOR" => self.vendor_id.map(|id| Actor::Vendor { id }),
            "ADMIN" | "SUPER_ADMIN" => Some(Actor::Admin {
                id: self.sub.clone(),
            }),
            _ => None,
        }
    }
}

// ============================================================================
// Authentication Middleware
// ============================================================================

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract token from Authorization header
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Decode and validate JWT
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    // 3. Resolve the role into an actor; unknown roles are forbidden
    let actor = token_data.claims.actor().ok_or(StatusCode::FORBIDDEN)?;

    // 4. Inject into request extensions for handlers
    req.extensions_mut().insert(token_data.claims);
    req.extensions_mut().insert(actor);

    Ok(next.run(req).await)
}
