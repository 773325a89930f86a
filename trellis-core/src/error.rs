// Error types for the Trellis dispatch pipeline

use crate::HttpStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Dispatch failures: answered without running application code
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Method not allowed: {method} {path}")]
    MethodNotAllowed {
        method: String,
        path: String,
        allow: Vec<String>,
    },

    #[error("Unsupported Media Type: {0}")]
    UnsupportedMediaType(String),

    #[error("Not Acceptable: {0}")]
    NotAcceptable(String),

    // Raised by endpoints, filters or chain handlers
    #[error("Handler error: {0}")]
    Handler(String),

    #[error("{status}: {message}")]
    Status { status: HttpStatus, message: String },

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("No entity writer for {entity} as {media_type}")]
    NoEntityWriter { entity: String, media_type: String },

    #[error("Connection closed before the response was written")]
    ConnectionClosed,

    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] trellis_config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for an error carrying an explicit status.
    pub fn status(status: HttpStatus, message: impl Into<String>) -> Self {
        Error::Status {
            status,
            message: message.into(),
        }
    }

    /// Get the HTTP status for this error
    pub fn http_status(&self) -> HttpStatus {
        match self {
            Error::RouteNotFound(_) => HttpStatus::NotFound,
            Error::MethodNotAllowed { .. } => HttpStatus::MethodNotAllowed,
            Error::UnsupportedMediaType(_) => HttpStatus::UnsupportedMediaType,
            Error::NotAcceptable(_) => HttpStatus::NotAcceptable,
            Error::Status { status, .. } => *status,
            Error::BadRequest(_) | Error::Deserialization(_) => HttpStatus::BadRequest,
            Error::PayloadTooLarge(_) => HttpStatus::PayloadTooLarge,
            _ => HttpStatus::InternalServerError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        self.http_status().code()
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.http_status().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.http_status().is_server_error()
    }

    /// Dispatch failures map straight to a status without touching
    /// application code.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(
            self,
            Error::RouteNotFound(_)
                | Error::MethodNotAllowed { .. }
                | Error::UnsupportedMediaType(_)
                | Error::NotAcceptable(_)
        )
    }

    /// Value for the `Allow` header, when the error carries one.
    pub fn allow_header(&self) -> Option<String> {
        match self {
            Error::MethodNotAllowed { allow, .. } => Some(allow.join(", ")),
            _ => None,
        }
    }
}
