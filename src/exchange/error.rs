//! Failure classification for signed exchange requests.

use reqwest::StatusCode;
use thiserror::Error;

/// Why a signed request produced no result.
///
/// Callers of [`ExchangeClient::execute`](super::ExchangeClient::execute) only
/// ever see absence; this type exists for logging and the retry decision.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Network or HTTP-layer failure
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// Signature, key or expiry rejected
    #[error("authentication rejected (status {status}): {body}")]
    Auth { status: u16, body: String },

    /// Any other non-2xx response
    #[error("exchange returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx response that is not JSON or lacks an expected field
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Request body could not be encoded
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ApiError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Auth {
                status: status.as_u16(),
                body,
            },
            _ => ApiError::Status {
                status: status.as_u16(),
                body,
            },
        }
    }

    /// Transient failures worth another attempt on an idempotent request.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status >= 500 || *status == 429,
            ApiError::Auth { .. } | ApiError::Malformed(_) | ApiError::Encode(_) => false,
        }
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, ApiError::Auth { .. })
    }
}
