//! Broker access-token fetching and caching.
//!
//! With an API key the key itself is the bearer token. With OAuth client
//! credentials the provider exchanges them at the broker's token endpoint and
//! caches the access token until shortly before it expires.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};
use crate::{BrokerConfig, BrokerCredentials};

/// Tokens are refreshed this long before the broker says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// Token response from the broker's OAuth endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// The bearer token.
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// Cached access token with expiration.
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

/// Supplies bearer tokens for broker requests.
pub struct TokenProvider {
    config: BrokerConfig,
    client: reqwest::Client,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenProvider {
    /// Create a new token provider with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should never happen with default TLS).
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("failed to create HTTP client");

        Self {
            config,
            client,
            cache: RwLock::new(None),
        }
    }

    /// Get a bearer token, fetching a new one if the cached token is stale.
    ///
    /// # Errors
    ///
    /// Returns an error if the token exchange fails.
    pub async fn bearer(&self) -> Result<String> {
        let (client_id, client_secret) = match &self.config.credentials {
            BrokerCredentials::ApiKey(key) => return Ok(key.clone()),
            BrokerCredentials::ClientCredentials {
                client_id,
                client_secret,
            } => (client_id, client_secret),
        };

        // Check cache first
        {
            let cache = self.cache.read();
            if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
                return Ok(cached.token.clone());
            }
        }

        self.fetch(client_id, client_secret).await
    }

    /// Drop the cached token so the next call fetches a new one.
    ///
    /// Called when the broker rejects a token before its advertised expiry.
    pub fn invalidate(&self) {
        *self.cache.write() = None;
    }

    async fn fetch(&self, client_id: &str, client_secret: &str) -> Result<String> {
        let url = self.config.oauth_token_url()?;
        tracing::debug!(url = %url, "Fetching broker access token");

        let response = self
            .client
            .post(url)
            .json(&TokenRequest {
                grant_type: "client_credentials",
                client_id,
                client_secret,
            })
            .send()
            .await
            .map_err(|e| BrokerError::TokenFetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BrokerError::TokenFetchFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::TokenFetchFailed(e.to_string()))?;

        let token = body.access_token.clone();
        *self.cache.write() = Some(CachedToken {
            token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });

        Ok(token)
    }
}
