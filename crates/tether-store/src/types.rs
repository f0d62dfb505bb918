//! Domain types stored in the database.
//!
//! These types represent the persisted state of connection records and
//! user identities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::{AccountId, AppName, ExternalUserId, UserId};

/// One connected application and the broker account that backs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppLink {
    /// Normalized application name.
    pub app_name: AppName,
    /// Broker-issued account identifier for this app.
    pub account_id: AccountId,
    /// When this app was connected.
    pub connected_at: DateTime<Utc>,
}

/// Whether a connection record currently has any live links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionStatus {
    /// At least one app is connected.
    Active = 1,
    /// No apps are connected (never connected, or all removed).
    #[default]
    Inactive = 2,
}

/// The durable mapping of one user to the apps and accounts they authorized.
///
/// Links are kept as a single ordered collection keyed by app name, so the
/// app-name and account-id views can never drift out of alignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Owner user ID.
    pub owner: UserId,
    links: Vec<AppLink>,
    /// Last-known email associated with any of the accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_email: Option<String>,
    /// Current record status.
    pub status: ConnectionStatus,
    /// When the first app was connected; `None` for a record never persisted.
    pub connected_at: Option<DateTime<Utc>>,
    /// Last modification timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConnectionRecord {
    /// The record returned for a user with no stored connections.
    #[must_use]
    pub fn empty(owner: UserId) -> Self {
        Self {
            owner,
            links: Vec::new(),
            account_email: None,
            status: ConnectionStatus::Inactive,
            connected_at: None,
            updated_at: None,
        }
    }

    /// All links in connection order.
    #[must_use]
    pub fn links(&self) -> &[AppLink] {
        &self.links
    }

    /// App names in connection order.
    #[must_use]
    pub fn app_names(&self) -> Vec<&AppName> {
        self.links.iter().map(|l| &l.app_name).collect()
    }

    /// Account ids, positionally aligned with [`Self::app_names`].
    #[must_use]
    pub fn account_ids(&self) -> Vec<&AccountId> {
        self.links.iter().map(|l| &l.account_id).collect()
    }

    /// Look up the account backing an app.
    #[must_use]
    pub fn account_for(&self, app: &AppName) -> Option<&AccountId> {
        self.links
            .iter()
            .find(|l| &l.app_name == app)
            .map(|l| &l.account_id)
    }

    /// Returns true if the app is connected.
    #[must_use]
    pub fn contains_app(&self, app: &AppName) -> bool {
        self.links.iter().any(|l| &l.app_name == app)
    }

    /// Number of connected apps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Returns true if no apps are connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Add an app link unless the app is already present.
    ///
    /// A non-empty `email` always overwrites the stored email, even when the
    /// link itself is a duplicate. Returns `true` if a link was appended.
    pub fn add_link(
        &mut self,
        app: &AppName,
        account: &AccountId,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        if let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) {
            self.account_email = Some(email.to_string());
        }

        let added = if self.contains_app(app) {
            false
        } else {
            self.links.push(AppLink {
                app_name: app.clone(),
                account_id: account.clone(),
                connected_at: now,
            });
            true
        };

        self.status = ConnectionStatus::Active;
        self.connected_at.get_or_insert(now);
        self.updated_at = Some(now);
        added
    }

    /// Remove the link for an app, returning it if it was present.
    ///
    /// A record whose last link is removed becomes `Inactive`.
    pub fn remove_link(&mut self, app: &AppName, now: DateTime<Utc>) -> Option<AppLink> {
        let index = self.links.iter().position(|l| &l.app_name == app)?;
        let removed = self.links.remove(index);
        if self.links.is_empty() {
            self.status = ConnectionStatus::Inactive;
        }
        self.updated_at = Some(now);
        Some(removed)
    }
}

/// A user identity record.
///
/// Created lazily the first time the user signs in with the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier for the user.
    pub user_id: UserId,
    /// Resolved email address, if known.
    #[serde(default)]
    pub email: Option<String>,
    /// The broker's identifier for this user after an interactive sign-in.
    #[serde(default)]
    pub broker_external_id: Option<ExternalUserId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last broker sign-in timestamp.
    pub last_login_at: Option<DateTime<Utc>>,
}
