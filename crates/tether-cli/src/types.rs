//! API response types for the gateway client.
//!
//! These types mirror the JSON bodies returned by the tether gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Credentials
// =============================================================================

/// Credentials resolved for an outbound search call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBundle {
    /// Identifier the search service keys accounts by.
    pub external_user_id: String,
    /// Email sent along with the request.
    #[serde(default)]
    pub user_email: Option<String>,
    /// Accounts the search may read from.
    #[serde(default)]
    pub account_ids: Vec<String>,
    /// True when at least one real connection was observed.
    pub dynamic: bool,
    /// Tier that produced the bundle, e.g. `store` or `static-fallback`.
    pub auth_source: String,
    /// Confidence derived from the tier.
    pub connection_quality: String,
}

// =============================================================================
// Connections
// =============================================================================

/// One connected app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedApp {
    /// Normalized app name.
    pub app: String,
    /// Broker account id.
    pub account_id: String,
    /// When the app was connected.
    pub connected_at: DateTime<Utc>,
}

/// A user's stored connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connections {
    /// Owner of the connections.
    pub user_id: String,
    /// `active` or `inactive`.
    pub status: String,
    /// Last-known account email.
    #[serde(default)]
    pub account_email: Option<String>,
    /// Connected apps in connection order.
    #[serde(default)]
    pub apps: Vec<ConnectedApp>,
}

/// Users that have a connection record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owners {
    /// User ids, sorted.
    #[serde(default)]
    pub owners: Vec<String>,
}

/// Result of a disconnect request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResult {
    /// Whether the app is now disconnected.
    pub success: bool,
    /// User-facing message.
    pub message: String,
    /// Apps still connected afterwards.
    pub remaining_connections: usize,
    /// Terminal state, e.g. `disconnected` or `failed-at-broker`.
    pub outcome: String,
}

/// A broker connect session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectLink {
    /// Opaque session token.
    pub token: String,
    /// URL the user opens to authorize an app.
    pub connect_url: String,
    /// When the session expires.
    pub expires_at: DateTime<Utc>,
}

/// A user identity after a broker sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    /// User id.
    pub user_id: String,
    /// Known email.
    #[serde(default)]
    pub email: Option<String>,
    /// Broker id.
    #[serde(default)]
    pub external_user_id: Option<String>,
    /// First seen.
    pub created_at: DateTime<Utc>,
    /// Last broker sign-in.
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Request body for recording a broker sign-in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerLoginRequest {
    /// The broker's id for the user.
    pub external_user_id: String,
    /// Email reported by the broker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// =============================================================================
// Webhooks
// =============================================================================

/// A hand-built connection notification, as the broker would send it.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionNotification {
    /// Event type.
    pub event: String,
    /// Owning user.
    pub external_user_id: String,
    /// App name.
    pub app: String,
    /// Broker account id.
    pub account_id: String,
    /// Account email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Acknowledgement for an ingested notification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    /// `stored`, `connection-failed`, or `ignored`.
    pub status: String,
    /// Normalized app name, for stored connections.
    #[serde(default)]
    pub app: Option<String>,
    /// Whether the store accepted the write.
    #[serde(default)]
    pub persisted: Option<bool>,
}

// =============================================================================
// Misc
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Health {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Error body returned by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// Error details.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Missing fields, for `missing_fields` errors.
    #[serde(default)]
    pub fields: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_parses_gateway_shape() {
        let bundle: CredentialBundle = serde_json::from_str(
            r#"{"externalUserId":"U1","userEmail":null,"accountIds":["A1"],
                "dynamic":true,"authSource":"store","connectionQuality":"durable"}"#,
        )
        .unwrap();
        assert_eq!(bundle.account_ids, vec!["A1".to_string()]);
        assert_eq!(bundle.auth_source, "store");
        assert!(bundle.user_email.is_none());
    }

    #[test]
    fn receipt_tolerates_non_stored_statuses() {
        let receipt: IngestReceipt =
            serde_json::from_str(r#"{"status":"ignored","event":"PING"}"#).unwrap();
        assert_eq!(receipt.status, "ignored");
        assert!(receipt.app.is_none());
    }

    #[test]
    fn notification_omits_absent_email() {
        let body = serde_json::to_value(ConnectionNotification {
            event: "CONNECTION_SUCCESS".into(),
            external_user_id: "U1".into(),
            app: "drive".into(),
            account_id: "A1".into(),
            email: None,
        })
        .unwrap();
        assert!(body.get("email").is_none());
        assert_eq!(body["external_user_id"], "U1");
    }
}
