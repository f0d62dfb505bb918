//! HTTP client for the gateway REST API.
//!
//! This module provides a typed client for interacting with the tether gateway.

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::types::{
    ApiErrorResponse, BrokerLoginRequest, ConnectLink, ConnectionNotification, Connections,
    CredentialBundle, DisconnectResult, Health, IngestReceipt, Owners, UserIdentity,
};

/// Header carrying the webhook shared secret.
const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Error code from the body, if any.
        code: Option<String>,
        /// Error message.
        message: String,
    },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The gateway URL cannot carry a path.
    #[error("invalid gateway URL: {0}")]
    InvalidUrl(String),
}

/// Client for the gateway REST API.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl GatewayClient {
    /// Create a new gateway client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the gateway (e.g., "http://localhost:8080")
    /// * `api_key` - API key for the user routes, if the gateway requires one
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ClientError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            client: Client::new(),
            base_url,
            api_key,
        })
    }

    /// Build a URL from path segments, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Attach the API key, when configured.
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Handle API error responses.
    async fn handle_error(response: Response) -> ClientError {
        let status = response.status().as_u16();
        match response.json::<ApiErrorResponse>().await {
            Ok(err) => {
                let mut message = err.error.message;
                if !err.error.fields.is_empty() {
                    message = format!("{message} [{}]", err.error.fields.join(", "));
                }
                ClientError::Api {
                    status,
                    code: Some(err.error.code),
                    message,
                }
            }
            Err(_) => ClientError::Api {
                status,
                code: None,
                message: "Unknown error".to_string(),
            },
        }
    }

    /// Send a request and decode a successful JSON body.
    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    // =========================================================================
    // User Operations
    // =========================================================================

    /// Resolve the credentials a search call for this user would use.
    pub async fn credentials(
        &self,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<CredentialBundle, ClientError> {
        let url = self.url(&["v1", "users", user_id, "credentials"])?;
        let mut request = self.authorized(self.client.get(url));
        if let Some(email) = email {
            request = request.query(&[("email", email)]);
        }
        Self::send(request).await
    }

    /// List the users that have connections.
    pub async fn owners(&self) -> Result<Owners, ClientError> {
        let url = self.url(&["v1", "users"])?;
        Self::send(self.authorized(self.client.get(url))).await
    }

    /// List a user's stored connections.
    pub async fn connections(&self, user_id: &str) -> Result<Connections, ClientError> {
        let url = self.url(&["v1", "users", user_id, "connections"])?;
        Self::send(self.authorized(self.client.get(url))).await
    }

    /// Disconnect one app.
    ///
    /// A failed disconnect still carries a result body, so 502 and 503 are
    /// decoded rather than treated as errors.
    pub async fn disconnect(
        &self,
        user_id: &str,
        app: &str,
    ) -> Result<DisconnectResult, ClientError> {
        let url = self.url(&["v1", "users", user_id, "connections", app])?;
        let response = self.authorized(self.client.delete(url)).send().await?;

        let status = response.status();
        if !status.is_success()
            && status != StatusCode::BAD_GATEWAY
            && status != StatusCode::SERVICE_UNAVAILABLE
        {
            return Err(Self::handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    /// Create a connect link for the user.
    pub async fn connect_link(&self, user_id: &str) -> Result<ConnectLink, ClientError> {
        let url = self.url(&["v1", "users", user_id, "connect"])?;
        Self::send(self.authorized(self.client.post(url))).await
    }

    /// Record a broker sign-in for the user.
    pub async fn broker_login(
        &self,
        user_id: &str,
        request: &BrokerLoginRequest,
    ) -> Result<UserIdentity, ClientError> {
        let url = self.url(&["v1", "users", user_id, "broker-login"])?;
        Self::send(self.authorized(self.client.post(url)).json(request)).await
    }

    // =========================================================================
    // Webhooks
    // =========================================================================

    /// Deliver a connection notification as the broker would.
    pub async fn ingest(
        &self,
        notification: &ConnectionNotification,
        webhook_secret: Option<&str>,
    ) -> Result<IngestReceipt, ClientError> {
        let url = self.url(&["v1", "webhooks", "connections"])?;
        let mut request = self.client.post(url).json(notification);
        if let Some(secret) = webhook_secret {
            request = request.header(WEBHOOK_SECRET_HEADER, secret);
        }
        Self::send(request).await
    }

    // =========================================================================
    // Utility
    // =========================================================================

    /// Check gateway health.
    pub async fn health(&self) -> Result<Health, ClientError> {
        let url = self.url(&["health"])?;
        Self::send(self.client.get(url)).await
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, api_key: Option<&str>) -> GatewayClient {
        GatewayClient::new(&server.uri(), api_key.map(str::to_string)).unwrap()
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(matches!(
            GatewayClient::new("mailto:ops@example.com", None),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(GatewayClient::new("not a url", None).is_err());
    }

    #[test]
    fn url_encodes_segments() {
        let client = GatewayClient::new("http://localhost:8080/", None).unwrap();
        let url = client
            .url(&["v1", "users", "team/alpha", "credentials"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/v1/users/team%2Falpha/credentials"
        );
    }

    #[tokio::test]
    async fn credentials_sends_key_and_hint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/users/U1/credentials"))
            .and(bearer_token("k1"))
            .and(query_param("email", "a@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "externalUserId": "U1",
                "userEmail": "a@example.com",
                "accountIds": ["A1"],
                "dynamic": true,
                "authSource": "store",
                "connectionQuality": "durable",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let bundle = client_for(&server, Some("k1"))
            .credentials("U1", Some("a@example.com"))
            .await
            .unwrap();
        assert_eq!(bundle.account_ids, vec!["A1".to_string()]);
        assert_eq!(bundle.auth_source, "store");
    }

    #[tokio::test]
    async fn disconnect_failure_still_returns_result() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/users/U1/connections/drive"))
            .respond_with(ResponseTemplate::new(502).set_body_json(json!({
                "success": false,
                "message": "Could not disconnect drive right now. Please try again in a few minutes.",
                "remainingConnections": 1,
                "outcome": "failed-at-broker",
            })))
            .mount(&server)
            .await;

        let result = client_for(&server, None)
            .disconnect("U1", "drive")
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.outcome, "failed-at-broker");
        assert_eq!(result.remaining_connections, 1);
    }

    #[tokio::test]
    async fn api_errors_carry_code_and_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/webhooks/connections"))
            .and(header("x-webhook-secret", "whsec_1"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": "missing_fields",
                    "message": "missing required fields: account_id",
                    "fields": ["account_id"],
                }
            })))
            .mount(&server)
            .await;

        let notification = ConnectionNotification {
            event: "CONNECTION_SUCCESS".into(),
            external_user_id: "U1".into(),
            app: "drive".into(),
            account_id: "A1".into(),
            email: None,
        };
        let err = client_for(&server, None)
            .ingest(&notification, Some("whsec_1"))
            .await
            .unwrap_err();

        match err {
            ClientError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("missing_fields"));
                assert!(message.ends_with("[account_id]"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn owners_lists_users() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/users"))
            .and(bearer_token("k1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "owners": ["U1", "U2"] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let owners = client_for(&server, Some("k1")).owners().await.unwrap();
        assert_eq!(owners.owners, vec!["U1".to_string(), "U2".to_string()]);
    }

    #[tokio::test]
    async fn unauthorized_without_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/users/U1/connections"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .connections("U1")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 401, code: None, .. }));
    }

    #[tokio::test]
    async fn broker_login_posts_camel_case_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/users/U7/broker-login"))
            .and(body_json(json!({ "externalUserId": "ext_7" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "userId": "U7",
                "externalUserId": "ext_7",
                "createdAt": "2026-01-01T00:00:00Z",
                "lastLoginAt": "2026-01-01T00:00:00Z",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let user = client_for(&server, None)
            .broker_login(
                "U7",
                &BrokerLoginRequest {
                    external_user_id: "ext_7".into(),
                    email: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(user.external_user_id.as_deref(), Some("ext_7"));
        assert!(user.email.is_none());
    }
}
