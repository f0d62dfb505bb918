//! API error types and responses.
//!
//! This module defines the standard error format for all API responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use tether_broker::BrokerError;
use tether_connections::ConnectionError;
use tether_core::IdError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Too many requests, rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A notification lacked mandatory fields.
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// An upstream dependency failed.
    #[error("upstream error: {0}")]
    BadGateway(String),

    /// An upstream dependency did not answer in time.
    #[error("upstream timeout: {0}")]
    GatewayTimeout(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<&'static str>>,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::BadRequest(_) | Self::MissingFields(_) => StatusCode::BAD_REQUEST,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::RateLimited => "rate_limited",
            Self::BadRequest(_) => "bad_request",
            Self::MissingFields(_) => "missing_fields",
            Self::BadGateway(_) => "bad_gateway",
            Self::GatewayTimeout(_) => "gateway_timeout",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();
        let fields = match self {
            Self::MissingFields(fields) => Some(fields),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message,
                fields,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::NotFound(what) => Self::NotFound(what),
            BrokerError::RateLimited => Self::RateLimited,
            BrokerError::Timeout => Self::GatewayTimeout("broker".to_string()),
            BrokerError::Unauthorized | BrokerError::TokenFetchFailed(_) => {
                tracing::error!(error = %err, "Broker rejected our credentials");
                Self::BadGateway("broker authentication failed".to_string())
            }
            BrokerError::InvalidUrl(_) => {
                tracing::error!(error = %err, "Broker URL is misconfigured");
                Self::Internal("broker misconfigured".to_string())
            }
            BrokerError::Request(_) | BrokerError::InvalidResponse(_) | BrokerError::Server { .. } => {
                tracing::warn!(error = %err, "Broker error");
                Self::BadGateway(err.to_string())
            }
        }
    }
}

impl From<ConnectionError> for ApiError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::MissingFields(fields) => Self::MissingFields(fields),
            ConnectionError::InvalidId { .. } => Self::BadRequest(err.to_string()),
            ConnectionError::Broker(broker_err) => Self::from(broker_err),
            ConnectionError::Timeout(what) => Self::GatewayTimeout(what.to_string()),
            ConnectionError::Search(msg) => {
                tracing::warn!(error = %msg, "Search backend error");
                Self::BadGateway(msg)
            }
            ConnectionError::Store(store_err) => {
                tracing::error!(error = %store_err, "Store error");
                Self::Internal("storage error".to_string())
            }
            ConnectionError::Cache(msg) => {
                tracing::error!(error = %msg, "Cache error");
                Self::Internal("cache error".to_string())
            }
        }
    }
}
