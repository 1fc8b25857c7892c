use thiserror::Error;

/// Domain error taxonomy shared by every crate in the workspace.
///
/// Each variant maps to one HTTP status at the request boundary; nothing
/// below the API layer knows about HTTP.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input
    #[error("{0}")]
    Validation(String),

    /// Role or ownership mismatch
    #[error("{0}")]
    Authorization(String),

    /// Referenced entity does not exist
    #[error("{0}")]
    NotFound(String),

    /// Illegal state transition, stock underflow, duplicate application
    #[error("{0}")]
    Conflict(String),

    /// Upstream payment provider failure; the order is left in its
    /// pre-transition state so a later retry can still succeed
    #[error("payment gateway: {0}")]
    Gateway(String),

    /// Storage or other infrastructure failure; details are logged, not
    /// exposed
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway(msg.into())
    }

    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self::Internal(msg.to_string())
    }

    /// HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Authorization(_) => 403,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::Gateway(_) => 502,
            Error::Internal(_) => 500,
        }
    }

    /// Stable machine-readable tag for the error envelope
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Authorization(_) => "authorization_error",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Gateway(_) => "gateway_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// True when the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Gateway(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(Error::validation("bad qty").status_code(), 400);
        assert_eq!(Error::authorization("not yours").status_code(), 403);
        assert_eq!(Error::not_found("no such order").status_code(), 404);
        assert_eq!(Error::conflict("already paid").status_code(), 409);
        assert_eq!(Error::gateway("timeout").status_code(), 502);
    }

    #[test]
    fn only_gateway_is_retryable() {
        assert!(Error::gateway("timeout").is_retryable());
        assert!(!Error::conflict("underflow").is_retryable());
        assert!(!Error::validation("bad input").is_retryable());
    }
}
