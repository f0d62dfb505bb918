//! Broker error types.

use thiserror::Error;

/// A result type using `BrokerError`.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors that can occur when talking to the authorization broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker rejected our credentials.
    #[error("broker rejected credentials")]
    Unauthorized,

    /// The requested resource does not exist at the broker.
    #[error("not found: {0}")]
    NotFound(String),

    /// Too many requests, rate limited.
    #[error("rate limited")]
    RateLimited,

    /// The request did not complete in time.
    #[error("broker request timed out")]
    Timeout,

    /// The request could not be sent or the connection failed.
    #[error("request failed: {0}")]
    Request(String),

    /// The broker returned a body we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The broker returned an unexpected status.
    #[error("broker returned {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Exchanging client credentials for an access token failed.
    #[error("token fetch failed: {0}")]
    TokenFetchFailed(String),

    /// The configured base URL cannot be used to build endpoint URLs.
    #[error("invalid broker URL: {0}")]
    InvalidUrl(String),
}

impl BrokerError {
    /// Returns `true` if the same request may succeed when retried.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::RateLimited | Self::Timeout | Self::Request(_) | Self::TokenFetchFailed(_) => {
                true
            }
            Self::Server { status, .. } => *status >= 500,
            Self::Unauthorized
            | Self::NotFound(_)
            | Self::InvalidResponse(_)
            | Self::InvalidUrl(_) => false,
        }
    }

    pub(crate) fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(e.to_string())
        }
    }
}
