//! Request and response types for connection operations.
//!
//! These types define the API contracts for ingestion, credential
//! resolution, and disconnection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::{AccountId, AppName, UserId};

/// Which resolver tier produced a credential bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthSource {
    /// Durable connection record.
    Store,
    /// Process-local cache.
    Cache,
    /// Live account listing from the broker.
    BrokerSession,
    /// Configured accounts paired with a caller-supplied email.
    EmailFallback,
    /// Fully static configured identity.
    StaticFallback,
}

/// How much the caller should trust a credential bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionQuality {
    /// Backed by the persistent store.
    Durable,
    /// Seen recently but not confirmed durable.
    Provisional,
    /// Fetched live from the broker for a signed-in user.
    Session,
    /// Real email, configured accounts.
    StaticAccounts,
    /// Nothing user-specific.
    Default,
}

impl AuthSource {
    /// The quality that every bundle from this source carries.
    #[must_use]
    pub const fn quality(self) -> ConnectionQuality {
        match self {
            Self::Store => ConnectionQuality::Durable,
            Self::Cache => ConnectionQuality::Provisional,
            Self::BrokerSession => ConnectionQuality::Session,
            Self::EmailFallback => ConnectionQuality::StaticAccounts,
            Self::StaticFallback => ConnectionQuality::Default,
        }
    }
}

/// Credentials for one outbound search call.
///
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBundle {
    /// Identifier the search service keys accounts by.
    pub external_user_id: String,
    /// Email to send along with the request.
    pub user_email: Option<String>,
    /// Accounts the search may read from.
    pub account_ids: Vec<AccountId>,
    /// True when at least one real connection was observed.
    pub dynamic: bool,
    /// Tier that produced this bundle.
    pub auth_source: AuthSource,
    /// Confidence derived from the tier.
    pub connection_quality: ConnectionQuality,
}

impl CredentialBundle {
    /// Build a bundle, deriving `dynamic` and quality from the source.
    #[must_use]
    pub fn new(
        source: AuthSource,
        external_user_id: impl Into<String>,
        user_email: Option<String>,
        account_ids: Vec<AccountId>,
    ) -> Self {
        Self {
            external_user_id: external_user_id.into(),
            user_email,
            account_ids,
            dynamic: source != AuthSource::StaticFallback,
            auth_source: source,
            connection_quality: source.quality(),
        }
    }
}

/// Terminal state of a disconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisconnectOutcome {
    /// Removed from the broker, the store, and the cache.
    Disconnected,
    /// The app was not connected; nothing changed.
    NotConnected,
    /// The connection record could not be read; nothing changed.
    LookupFailed,
    /// The broker refused or timed out; nothing changed.
    FailedAtBroker,
    /// Revoked at the broker but local removal did not complete.
    FailedAfterBroker,
}

impl DisconnectOutcome {
    /// Returns true for outcomes that leave the app disconnected.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// Result of a disconnection request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResult {
    /// Whether the app is now disconnected.
    pub success: bool,
    /// User-facing message; failures include a retry suggestion.
    pub message: String,
    /// Apps still connected afterwards.
    pub remaining_connections: usize,
    /// Terminal state reached.
    pub outcome: DisconnectOutcome,
}

impl DisconnectResult {
    pub(crate) fn new(
        outcome: DisconnectOutcome,
        message: impl Into<String>,
        remaining_connections: usize,
    ) -> Self {
        Self {
            success: outcome.is_success(),
            message: message.into(),
            remaining_connections,
            outcome,
        }
    }
}

/// A connect session the user follows to authorize a new app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectLink {
    /// Opaque session token.
    pub token: String,
    /// URL to open.
    pub connect_url: String,
    /// When the session expires.
    pub expires_at: DateTime<Utc>,
}

/// The normalized fields of an ingested connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredConnection {
    /// Owner of the connection.
    pub owner: UserId,
    /// Normalized app name.
    pub app: AppName,
    /// Broker account id.
    pub account_id: AccountId,
    /// Email carried by the notification, if any.
    pub email: Option<String>,
    /// Whether the store accepted the write.
    pub persisted: bool,
    /// Whether the cache accepted the write.
    pub cached: bool,
}

/// Acknowledgement for a processed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum IngestReceipt {
    /// A connection was recorded.
    Stored(StoredConnection),
    /// The broker reported a failed connection attempt.
    ConnectionFailed {
        /// Raw event type.
        event: String,
    },
    /// The event type is not one we act on.
    Ignored {
        /// Raw event type.
        event: String,
    },
}

/// Configuration for the connection service.
#[derive(Debug, Clone)]
pub struct ConnectionsConfig {
    /// Identity used when nothing user-specific resolves.
    pub default_external_user_id: String,
    /// Email used when nothing better is known.
    pub default_email: Option<String>,
    /// Accounts used by the email-hint and static tiers.
    pub default_account_ids: Vec<AccountId>,
    /// Deadline for broker calls (seconds).
    pub broker_timeout_seconds: u64,
    /// Deadline for search backend calls (seconds).
    pub search_timeout_seconds: u64,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            default_external_user_id: "default".to_string(),
            default_email: None,
            default_account_ids: Vec::new(),
            broker_timeout_seconds: 10,
            search_timeout_seconds: 15,
        }
    }
}
