//! Error types for Weblog
//!
//! Every core operation returns one of these as a typed outcome; the HTTP
//! layer maps them onto status codes with [`WeblogError::status_code`].

use hyper::StatusCode;

/// Main error type for Weblog operations
#[derive(Debug, thiserror::Error)]
pub enum WeblogError {
    /// Caller's role lacks the required permission bit
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Token signature, format or purpose does not match
    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violated on create/update
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Missing or wrong credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WeblogError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            Self::TokenInvalid(_) => StatusCode::BAD_REQUEST,
            Self::TokenExpired => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable kind, used as the `error` field in JSON bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthorizationDenied(_) => "forbidden",
            Self::TokenInvalid(_) => "invalid token",
            Self::TokenExpired => "token expired",
            Self::NotFound(_) => "not found",
            Self::AlreadyExists(_) => "conflict",
            Self::ValidationFailed(_) => "validation failed",
            Self::Unauthorized(_) => "unauthorized",
            Self::BadRequest(_) => "bad request",
            Self::Database(_) => "database unavailable",
            Self::Config(_) | Self::Internal(_) => "internal server error",
        }
    }
}

impl From<rusqlite::Error> for WeblogError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref e, ref msg) = err {
            if e.code == rusqlite::ErrorCode::ConstraintViolation {
                let detail = msg.clone().unwrap_or_else(|| e.to_string());
                return Self::AlreadyExists(detail);
            }
        }
        Self::Database(err.to_string())
    }
}

impl From<std::io::Error> for WeblogError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for WeblogError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for WeblogError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

/// Result type alias for Weblog operations
pub type Result<T> = std::result::Result<T, WeblogError>;
