//! Authorization broker client for tether.
//!
//! The broker is the external service that runs the third-party OAuth flows
//! and owns the resulting accounts. This crate provides:
//!
//! - The [`BrokerClient`] trait used by the connection service
//! - [`HttpBrokerClient`], a REST implementation
//! - [`TokenProvider`], which caches the broker access token
//! - `MockBrokerClient` for tests (feature `test-utils`)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Connections    │────▶│   BrokerClient   │
//! │   service        │     │   (trait)        │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │  HttpBrokerClient│
//!                          │  (impl)          │
//!                          └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │  TokenProvider   │
//!                          │  (token cache)   │
//!                          └────────┬─────────┘
//!                                   │ HTTPS
//!                          ┌────────▼─────────┐
//!                          │   Broker REST    │
//!                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tether_broker::{BrokerClient, BrokerConfig, BrokerCredentials, HttpBrokerClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BrokerConfig {
//!     base_url: "https://broker.example.com".to_string(),
//!     project_id: "proj_123".to_string(),
//!     credentials: BrokerCredentials::ApiKey("secret".to_string()),
//!     timeout_seconds: 10,
//! };
//!
//! let client = HttpBrokerClient::new(config);
//! let accounts = client.list_accounts(&"U1".parse()?).await?;
//! println!("{} accounts", accounts.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod token;

pub use client::{BrokerAccount, BrokerClient, ConnectSession, HttpBrokerClient};
pub use error::{BrokerError, Result};
pub use token::TokenProvider;

#[cfg(any(test, feature = "test-utils"))]
pub use client::MockBrokerClient;

use std::fmt;

/// How the service authenticates to the broker.
#[derive(Clone)]
pub enum BrokerCredentials {
    /// A long-lived API key sent as a bearer token.
    ApiKey(String),
    /// OAuth client credentials exchanged for short-lived access tokens.
    ClientCredentials {
        /// OAuth client ID.
        client_id: String,
        /// OAuth client secret.
        client_secret: String,
    },
}

impl fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(..)"),
            Self::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Configuration for the broker REST API.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Base URL for the broker (e.g., `https://api.broker.example`).
    pub base_url: String,
    /// Project the connected accounts belong to.
    pub project_id: String,
    /// Credentials for authenticating to the broker.
    pub credentials: BrokerCredentials,
    /// Request timeout, in seconds.
    pub timeout_seconds: u64,
}

impl BrokerConfig {
    /// Build an endpoint URL under the base URL.
    ///
    /// Each segment is percent-encoded, so ids containing `/`, `?` or `#`
    /// stay inside their own path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| BrokerError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| BrokerError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn project_endpoint(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut path = vec!["v1", "connect", self.project_id.as_str()];
        path.extend_from_slice(segments);
        self.endpoint(&path)
    }

    /// Get the connect-session endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if the base URL cannot carry a path.
    pub fn tokens_url(&self) -> Result<reqwest::Url> {
        self.project_endpoint(&["tokens"])
    }

    /// Get the account collection endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if the base URL cannot carry a path.
    pub fn accounts_url(&self) -> Result<reqwest::Url> {
        self.project_endpoint(&["accounts"])
    }

    /// Get the URL of a single account.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if the base URL cannot carry a path.
    pub fn account_url(&self, account_id: &str) -> Result<reqwest::Url> {
        self.project_endpoint(&["accounts", account_id])
    }

    /// Get the OAuth token endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if the base URL cannot carry a path.
    pub fn oauth_token_url(&self) -> Result<reqwest::Url> {
        self.endpoint(&["v1", "oauth", "token"])
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            project_id: "default".to_string(),
            credentials: BrokerCredentials::ApiKey(String::new()),
            timeout_seconds: 10,
        }
    }
}
