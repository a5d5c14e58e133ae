//! Error types for the stats gateway

use stats_query::StoreError;
use thiserror::Error;
use warp::http::StatusCode;

/// Errors that can occur while serving a stats request or starting the server
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Caller input the endpoint cannot serve (missing required parameters)
    #[error("{0}")]
    Validation(String),

    /// No resource is mounted at the requested path
    #[error("Unknown endpoint: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl GatewayError {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// HTTP status reported in the error envelope
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
