//! Broker REST client.
//!
//! This module provides the [`BrokerClient`] trait and its HTTP
//! implementation for creating connect sessions, revoking accounts, and
//! listing the accounts a user has authorized.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tether_core::{AccountId, ExternalUserId};

use crate::error::{BrokerError, Result};
use crate::token::TokenProvider;
use crate::BrokerConfig;

/// A short-lived session the user completes in the broker's connect UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectSession {
    /// Opaque session token.
    pub token: String,
    /// URL the user opens to authorize an app.
    pub connect_url: String,
    /// When the session token expires.
    pub expires_at: DateTime<Utc>,
}

/// An account the broker holds on behalf of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerAccount {
    /// Broker-issued account identifier.
    pub id: AccountId,
    /// Raw application slug as reported by the broker.
    pub app: Option<String>,
    /// Email on the external account, if the broker exposes it.
    pub email: Option<String>,
    /// Whether the broker considers the credentials usable.
    pub healthy: bool,
}

/// Trait for talking to the authorization broker.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Create a connect session for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker request fails.
    async fn create_session(&self, external_user_id: &ExternalUserId) -> Result<ConnectSession>;

    /// Revoke an account at the broker.
    ///
    /// An account the broker no longer knows is treated as already revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker request fails.
    async fn delete_account(&self, account_id: &AccountId) -> Result<()>;

    /// List the accounts held for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker request fails.
    async fn list_accounts(&self, external_user_id: &ExternalUserId) -> Result<Vec<BrokerAccount>>;
}

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    external_user_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct RawSession {
    token: String,
    connect_link_url: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawAccountList {
    #[serde(default)]
    data: Vec<RawAccount>,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    id: String,
    #[serde(default)]
    app: Option<RawApp>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default = "default_healthy")]
    healthy: bool,
}

#[derive(Debug, Deserialize)]
struct RawApp {
    #[serde(default)]
    name_slug: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

const fn default_healthy() -> bool {
    true
}

impl RawAccount {
    fn into_account(self) -> Option<BrokerAccount> {
        let id = match self.id.parse::<AccountId>() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(account_id = %self.id, error = %e, "Skipping broker account with invalid id");
                return None;
            }
        };

        Some(BrokerAccount {
            id,
            app: self.app.and_then(|a| a.name_slug.or(a.name)),
            email: self.email.filter(|e| !e.trim().is_empty()),
            healthy: self.healthy,
        })
    }
}

/// HTTP client for the broker REST API.
pub struct HttpBrokerClient {
    config: BrokerConfig,
    client: reqwest::Client,
    tokens: TokenProvider,
}

impl HttpBrokerClient {
    /// Create a new broker client with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should never happen with default TLS).
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("failed to create HTTP client");

        let tokens = TokenProvider::new(config.clone());

        Self {
            config,
            client,
            tokens,
        }
    }

    /// Map a non-success response to a `BrokerError`.
    async fn error_for(&self, response: reqwest::Response, resource: &str) -> BrokerError {
        let status = response.status();
        match status.as_u16() {
            401 | 403 => {
                self.tokens.invalidate();
                BrokerError::Unauthorized
            }
            404 => BrokerError::NotFound(resource.to_string()),
            429 => BrokerError::RateLimited,
            code => {
                let message = response.text().await.unwrap_or_default();
                BrokerError::Server {
                    status: code,
                    message,
                }
            }
        }
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    async fn create_session(&self, external_user_id: &ExternalUserId) -> Result<ConnectSession> {
        let url = self.config.tokens_url()?;
        let bearer = self.tokens.bearer().await?;

        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .json(&CreateSessionRequest {
                external_user_id: external_user_id.as_str(),
            })
            .send()
            .await
            .map_err(|e| BrokerError::from_reqwest(&e))?;

        if !response.status().is_success() {
            return Err(self.error_for(response, "connect session").await);
        }

        let raw: RawSession = response
            .json()
            .await
            .map_err(|e| BrokerError::InvalidResponse(e.to_string()))?;

        tracing::debug!(external_user_id = %external_user_id, "Created connect session");

        Ok(ConnectSession {
            token: raw.token,
            connect_url: raw.connect_link_url,
            expires_at: raw.expires_at,
        })
    }

    async fn delete_account(&self, account_id: &AccountId) -> Result<()> {
        let url = self.config.account_url(account_id.as_str())?;
        let bearer = self.tokens.bearer().await?;

        let response = self
            .client
            .delete(url)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| BrokerError::from_reqwest(&e))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(account_id = %account_id, "Revoked broker account");
            return Ok(());
        }
        if status.as_u16() == 404 {
            tracing::info!(account_id = %account_id, "Broker account already absent");
            return Ok(());
        }

        Err(self.error_for(response, account_id.as_str()).await)
    }

    async fn list_accounts(&self, external_user_id: &ExternalUserId) -> Result<Vec<BrokerAccount>> {
        let url = self.config.accounts_url()?;
        let bearer = self.tokens.bearer().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(bearer)
            .query(&[("external_user_id", external_user_id.as_str())])
            .send()
            .await
            .map_err(|e| BrokerError::from_reqwest(&e))?;

        if !response.status().is_success() {
            return Err(self.error_for(response, external_user_id.as_str()).await);
        }

        let raw: RawAccountList = response
            .json()
            .await
            .map_err(|e| BrokerError::InvalidResponse(e.to_string()))?;

        Ok(raw
            .data
            .into_iter()
            .filter_map(RawAccount::into_account)
            .collect())
    }
}

/// A mock broker client for testing.
///
/// Holds accounts in memory, records revocations, and can be told to fail or
/// stall any operation.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct MockBrokerClient {
    accounts: parking_lot::Mutex<std::collections::HashMap<ExternalUserId, Vec<BrokerAccount>>>,
    deleted: parking_lot::Mutex<Vec<AccountId>>,
    fail: std::sync::atomic::AtomicBool,
    reject: std::sync::atomic::AtomicBool,
    delay: parking_lot::Mutex<Option<Duration>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockBrokerClient {
    /// Create an empty mock broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock broker whose every call fails.
    #[must_use]
    pub fn failing() -> Self {
        let mock = Self::default();
        mock.set_failing(true);
        mock
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Make every subsequent call fail as if our credentials were refused.
    pub fn set_rejecting(&self, reject: bool) {
        self.reject.store(reject, std::sync::atomic::Ordering::SeqCst);
    }

    /// Delay every call by `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Register an account for a user.
    pub fn add_account(&self, external_user_id: &ExternalUserId, account: BrokerAccount) {
        self.accounts
            .lock()
            .entry(external_user_id.clone())
            .or_default()
            .push(account);
    }

    /// Accounts revoked so far, in order.
    #[must_use]
    pub fn deleted_accounts(&self) -> Vec<AccountId> {
        self.deleted.lock().clone()
    }

    async fn gate(&self) -> Result<()> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BrokerError::Unauthorized);
        }
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BrokerError::Server {
                status: 503,
                message: "mock broker unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl BrokerClient for MockBrokerClient {
    async fn create_session(&self, external_user_id: &ExternalUserId) -> Result<ConnectSession> {
        self.gate().await?;
        Ok(ConnectSession {
            token: format!("ctok_{external_user_id}"),
            connect_url: format!("https://connect.invalid/?token=ctok_{external_user_id}"),
            expires_at: Utc::now() + chrono::Duration::hours(4),
        })
    }

    async fn delete_account(&self, account_id: &AccountId) -> Result<()> {
        self.gate().await?;
        for accounts in self.accounts.lock().values_mut() {
            accounts.retain(|a| &a.id != account_id);
        }
        self.deleted.lock().push(account_id.clone());
        Ok(())
    }

    async fn list_accounts(&self, external_user_id: &ExternalUserId) -> Result<Vec<BrokerAccount>> {
        self.gate().await?;
        Ok(self
            .accounts
            .lock()
            .get(external_user_id)
            .cloned()
            .unwrap_or_default())
    }
}
