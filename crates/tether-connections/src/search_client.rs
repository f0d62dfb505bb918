//! HTTP client for the downstream search backend.
//!
//! The search backend indexes the contents of connected accounts. It is told
//! to start syncing when an account is connected and to forget the account
//! when it is disconnected.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_core::{AccountId, AppName};

use crate::error::{ConnectionError, Result};

/// Trait for search backend communication.
///
/// This trait abstracts the search backend interface, allowing for
/// mock implementations in tests.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Start syncing data from a newly connected account.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails or the backend rejects it.
    async fn sync_account(
        &self,
        app: &AppName,
        account_id: &AccountId,
        user_email: Option<&str>,
    ) -> Result<()>;

    /// Drop all indexed data for a disconnected account.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails or the backend rejects it.
    async fn forget_account(
        &self,
        app: &AppName,
        account_id: &AccountId,
        user_email: Option<&str>,
    ) -> Result<()>;
}

/// HTTP client for the search backend.
#[derive(Debug, Clone)]
pub struct HttpSearchBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSearchBackend {
    /// Create a new search backend client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the search service (e.g., "http://search:8080")
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Get the base URL of the search service.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, body: &AccountRequest<'_>) -> Result<()> {
        let url = format!("{}{path}", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ConnectionError::Search(format!("request failed: {e}")))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let error = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error)
            .unwrap_or_else(|_| format!("search backend returned status {status}"));

        tracing::error!(
            app = body.app,
            account_id = body.account_id,
            status = %status,
            error = %error,
            "Search backend request failed"
        );

        Err(ConnectionError::Search(error))
    }
}

/// Request body for sync and forget calls.
#[derive(Debug, Serialize)]
struct AccountRequest<'a> {
    app: &'a str,
    account_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_email: Option<&'a str>,
}

/// Error response from the search backend.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn sync_account(
        &self,
        app: &AppName,
        account_id: &AccountId,
        user_email: Option<&str>,
    ) -> Result<()> {
        let request = AccountRequest {
            app: app.as_str(),
            account_id: account_id.as_str(),
            user_email,
        };
        self.post("/v1/sync", &request).await?;
        tracing::debug!(app = %app, account_id = %account_id, "Requested search sync");
        Ok(())
    }

    async fn forget_account(
        &self,
        app: &AppName,
        account_id: &AccountId,
        user_email: Option<&str>,
    ) -> Result<()> {
        let request = AccountRequest {
            app: app.as_str(),
            account_id: account_id.as_str(),
            user_email,
        };
        self.post("/v1/forget", &request).await?;
        tracing::debug!(app = %app, account_id = %account_id, "Requested search forget");
        Ok(())
    }
}

/// A no-op search backend for when no search service is configured.
///
/// This backend simply logs operations without contacting anything.
#[derive(Debug, Clone, Default)]
pub struct NoopSearchBackend;

impl NoopSearchBackend {
    /// Create a new no-op search backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SearchBackend for NoopSearchBackend {
    async fn sync_account(
        &self,
        app: &AppName,
        account_id: &AccountId,
        _user_email: Option<&str>,
    ) -> Result<()> {
        tracing::debug!(
            app = %app,
            account_id = %account_id,
            "NoopSearchBackend: sync_account called but no search backend configured"
        );
        Ok(())
    }

    async fn forget_account(
        &self,
        app: &AppName,
        account_id: &AccountId,
        _user_email: Option<&str>,
    ) -> Result<()> {
        tracing::debug!(
            app = %app,
            account_id = %account_id,
            "NoopSearchBackend: forget_account called but no search backend configured"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app() -> AppName {
        "google_drive".parse().unwrap()
    }

    fn account() -> AccountId {
        "apn_1".parse().unwrap()
    }

    #[test]
    fn http_client_creation() {
        let client = HttpSearchBackend::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn sync_posts_account() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sync"))
            .and(body_json(serde_json::json!({
                "app": "google_drive",
                "account_id": "apn_1",
                "user_email": "u1@example.com",
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpSearchBackend::new(server.uri());
        client
            .sync_account(&app(), &account(), Some("u1@example.com"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn forget_reports_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/forget"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({ "error": "index locked" })),
            )
            .mount(&server)
            .await;

        let client = HttpSearchBackend::new(server.uri());
        let err = client
            .forget_account(&app(), &account(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Search(ref m) if m == "index locked"));
    }

    #[tokio::test]
    async fn noop_backend_succeeds() {
        let backend = NoopSearchBackend::new();
        backend.sync_account(&app(), &account(), None).await.unwrap();
        backend.forget_account(&app(), &account(), None).await.unwrap();
    }
}
