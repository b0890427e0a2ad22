//! Error types for the action gateway

use std::io;

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for the action gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Action gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication failure (missing or rejected token)
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Malformed inbound request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Data service call failed
    #[error("Data service error: {0}")]
    DataService(String),

    /// A single completion provider failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider rejected the request for quota/rate-limit reasons
    #[error("Provider quota exhausted: {0}")]
    ProviderQuota(String),

    /// Every configured completion provider failed
    #[error("All completion providers exhausted")]
    ProvidersExhausted,

    /// Turn exceeded its wall-clock budget
    #[error("Turn timed out")]
    TurnTimeout,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status for transport-level failures.
    ///
    /// Tool-level problems (validation, permission, resolution) never reach
    /// this mapping; they are returned as structured tool results instead.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::ProvidersExhausted => StatusCode::SERVICE_UNAVAILABLE,
            Self::TurnTimeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show an end user.
    ///
    /// Internal detail (data-service bodies, provider payloads) stays in the
    /// logs; the client only sees a generic description per failure class.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Auth(_) => "Authentication required",
            Self::BadRequest(_) | Self::Json(_) => "Malformed request",
            Self::ProvidersExhausted => "Assistant temporarily unavailable",
            Self::TurnTimeout => "The request took too long to process",
            _ => "Failed to process request",
        }
    }

    /// Whether failover to another completion provider makes sense.
    #[must_use]
    pub fn is_provider_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::ProviderQuota(_) | Self::Http(_) | Self::Io(_)
        )
    }
}
