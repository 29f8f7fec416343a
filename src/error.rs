use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Application error type covering the routing subsystem's failure taxonomy.
///
/// The first six variants are the send-path taxonomy surfaced to clients;
/// the rest are ambient conversions from the libraries underneath.
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Send-path taxonomy =====
    /// Payload violates the type/content invariants. Rejected before
    /// persistence; nothing is stored.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Connection not authenticated, or the sender identity on a request
    /// does not match the authenticated connection.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Unknown channel or recipient. Rejected before persistence.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Sender is not a member of the target channel.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Persistence failed. The send attempt fails as a whole and nothing
    /// is dispatched.
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A single recipient connection's write failed after the message was
    /// already durable. Logged and isolated, never fatal to the send.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    // ===== Ambient conversions =====
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wire-level error code sent to clients in `ServerFrame::Error`.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Auth(_) | AppError::Jwt(_) => "AUTH_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Store(_) => "STORE_ERROR",
            AppError::Dispatch(_) => "DISPATCH_ERROR",
            AppError::Json(_) => "INVALID_FORMAT",
            AppError::Io(_) => "IO_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// User-facing message without internal details.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::Auth(msg) => msg.clone(),
            AppError::Jwt(_) => "Invalid or expired token".to_string(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Forbidden(msg) => msg.clone(),
            AppError::Store(_) => "Message could not be stored, try again".to_string(),
            AppError::Dispatch(_) => "Delivery failed".to_string(),
            AppError::Json(_) => "Invalid message format".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    /// True for errors caused by the client rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_)
                | AppError::Auth(_)
                | AppError::Jwt(_)
                | AppError::NotFound(_)
                | AppError::Forbidden(_)
                | AppError::Json(_)
        )
    }

    /// Log this error at a level matching its severity.
    pub fn log(&self) {
        let code = self.error_code();
        if self.is_client_error() {
            tracing::debug!(error = %self, error_code = %code, "Request rejected");
        } else {
            tracing::error!(error = %self, error_code = %code, "Server error occurred");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_wire_codes() {
        assert_eq!(
            AppError::Validation("content required".into()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(AppError::Auth("no session".into()).error_code(), "AUTH_ERROR");
        assert_eq!(AppError::NotFound("channel".into()).error_code(), "NOT_FOUND");
        assert_eq!(AppError::Forbidden("not a member".into()).error_code(), "FORBIDDEN");
        assert_eq!(AppError::Dispatch("queue closed".into()).error_code(), "DISPATCH_ERROR");
    }

    #[test]
    fn client_errors_are_classified() {
        assert!(AppError::Validation("x".into()).is_client_error());
        assert!(AppError::Forbidden("x".into()).is_client_error());
        assert!(!AppError::Dispatch("x".into()).is_client_error());
        assert!(!AppError::Internal("x".into()).is_client_error());
    }
}
