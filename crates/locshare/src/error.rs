//! Error types for locshare.
//!
//! Request-level variants carry the message returned to the caller in the
//! `{success: false, error}` envelope; the remaining variants cover startup
//! and internal failures.

use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for locshare operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Request Errors ===
    /// Required input was missing or malformed.
    #[error("{message}")]
    Validation {
        /// Message returned to the caller.
        message: String,
    },

    /// The referenced link does not exist.
    #[error("{message}")]
    NotFound {
        /// Message returned to the caller.
        message: String,
    },

    /// The referenced link exists but refuses the operation.
    #[error("{message}")]
    Forbidden {
        /// Message returned to the caller.
        message: String,
    },

    /// The router or an extractor refused the request before a handler ran.
    #[error("{message}")]
    Rejected {
        /// Status chosen by the rejecting layer.
        status: StatusCode,
        /// Message returned to the caller.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Server Errors ===
    /// Failed to bind the listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// File system or socket operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal error occurred (storage or rendering failure).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for locshare operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<BytesRejection> for Error {
    fn from(rejection: BytesRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl Error {
    /// Create a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a new forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The error for a path that is routed but not under `method`.
    #[must_use]
    pub fn method_not_allowed(method: &Method) -> Self {
        Self::Rejected {
            status: StatusCode::METHOD_NOT_ALLOWED,
            message: format!("Method {method} not allowed"),
        }
    }

    /// Check if this error indicates an unknown link.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The HTTP status this error maps to at the service boundary.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Rejected { status, .. } => *status,
            Self::ConfigLoad(_)
            | Self::ConfigValidation { .. }
            | Self::Bind { .. }
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The body of every failed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// Human-readable description of the failure.
    pub error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{self}");
        }
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
