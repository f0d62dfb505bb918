//! Error types for the connection service.
//!
//! Only ingestion validation and the supplementary operations surface these
//! to callers. Resolution and disconnection convert dependency failures into
//! degraded results instead.

use tether_core::IdError;
use thiserror::Error;

/// A result type using `ConnectionError`.
pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Errors that can occur in connection operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// A notification lacked one or more mandatory fields.
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// A notification field was present but not a valid identifier.
    #[error("invalid {field}: {source}")]
    InvalidId {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        #[source]
        source: IdError,
    },

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] tether_store::StoreError),

    /// Broker error.
    #[error("broker error: {0}")]
    Broker(#[from] tether_broker::BrokerError),

    /// Cache backend error.
    #[error("cache error: {0}")]
    Cache(String),

    /// Search backend error.
    #[error("search backend error: {0}")]
    Search(String),

    /// A dependency call exceeded its deadline.
    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl ConnectionError {
    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::MissingFields(_) | Self::InvalidId { .. } => false,
            Self::Broker(e) => e.is_retriable(),
            Self::Store(_) | Self::Cache(_) | Self::Search(_) | Self::Timeout(_) => true,
        }
    }
}
