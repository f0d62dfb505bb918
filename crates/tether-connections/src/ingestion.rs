//! Ingestion of broker connection notifications.
//!
//! Notifications arrive as loosely structured JSON. This module extracts the
//! owner, app, account, and email from the handful of shapes the broker
//! emits, records the connection durably, mirrors it into the cache, and
//! kicks off a background search sync.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tether_core::{AccountId, AppName, UserId};
use tether_store::{ConnectionStatus, Store};

use crate::cache::{CacheSource, CachedConnection};
use crate::error::{ConnectionError, Result};
use crate::service::ConnectionManager;
use crate::types::{IngestReceipt, StoredConnection};

/// Field name reported when the owner is missing.
pub const OWNER_FIELD: &str = "external_user_id";
/// Field name reported when the app is missing.
pub const APP_FIELD: &str = "app";
/// Field name reported when the account is missing.
pub const ACCOUNT_FIELD: &str = "account_id";

const OWNER_PATHS: &[&[&str]] = &[
    &["external_user_id"],
    &["user_id"],
    &["owner_id"],
    &["owner"],
];
const APP_PATHS: &[&[&str]] = &[&["app", "name_slug"], &["app", "name"], &["app"], &["app_name"]];
// A bare `id` is the event id in the broker envelope, never the account.
const ACCOUNT_PATHS: &[&[&str]] = &[&["account", "id"], &["account"], &["account_id"]];
const EMAIL_PATHS: &[&[&str]] = &[&["account", "email"], &["email"]];

/// What a notification asks us to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A user finished authorizing an app.
    ConnectionSuccess,
    /// An authorization attempt failed at the broker.
    ConnectionError,
    /// Anything else.
    Other,
}

impl EventKind {
    /// Classify a raw event type. A missing type counts as a success.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::ConnectionSuccess;
        };
        if raw.eq_ignore_ascii_case("CONNECTION_SUCCESS") || raw == "connection.created" {
            Self::ConnectionSuccess
        } else if raw.eq_ignore_ascii_case("CONNECTION_ERROR") {
            Self::ConnectionError
        } else {
            Self::Other
        }
    }
}

/// A connection extracted from a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConnection {
    /// Owner of the connection.
    pub owner: UserId,
    /// Normalized app name.
    pub app: AppName,
    /// Broker account id.
    pub account: AccountId,
    /// Email, if the notification carried one.
    pub email: Option<String>,
}

fn string_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Find the first path that yields a string in any scope.
///
/// Paths are tried in priority order, so a specific field in a nested scope
/// beats a generic field at the top level.
fn first_string<'a>(scopes: &[&'a Value], paths: &[&[&str]]) -> Option<&'a str> {
    paths
        .iter()
        .find_map(|path| scopes.iter().find_map(|scope| string_at(scope, path)))
}

/// Read the event type, if present.
#[must_use]
pub fn event_type(payload: &Value) -> Option<&str> {
    string_at(payload, &["event"]).or_else(|| string_at(payload, &["type"]))
}

/// Extract and validate the connection fields of a notification.
///
/// # Errors
///
/// Returns `MissingFields` naming every absent mandatory field, or
/// `InvalidId` when a field is present but malformed.
pub fn extract_connection(payload: &Value) -> Result<NewConnection> {
    let data = payload.get("data").filter(|v| v.is_object());
    let account = payload.get("account").filter(|v| v.is_object());
    let data_account = data
        .and_then(|d| d.get("account"))
        .filter(|v| v.is_object());

    let base: Vec<&Value> = std::iter::once(payload).chain(data).collect();
    let app_scopes: Vec<&Value> = base
        .iter()
        .copied()
        .chain(account)
        .chain(data_account)
        .collect();

    let owner = first_string(&base, OWNER_PATHS);
    let app = first_string(&app_scopes, APP_PATHS);
    let account_id = first_string(&base, ACCOUNT_PATHS);
    let email = first_string(&base, EMAIL_PATHS);

    let mut missing = Vec::new();
    if owner.is_none() {
        missing.push(OWNER_FIELD);
    }
    if app.is_none() {
        missing.push(APP_FIELD);
    }
    if account_id.is_none() {
        missing.push(ACCOUNT_FIELD);
    }
    let (Some(owner), Some(app), Some(account_id)) = (owner, app, account_id) else {
        return Err(ConnectionError::MissingFields(missing));
    };

    Ok(NewConnection {
        owner: owner.parse().map_err(|source| ConnectionError::InvalidId {
            field: OWNER_FIELD,
            source,
        })?,
        app: app.parse().map_err(|source| ConnectionError::InvalidId {
            field: APP_FIELD,
            source,
        })?,
        account: account_id
            .parse()
            .map_err(|source| ConnectionError::InvalidId {
                field: ACCOUNT_FIELD,
                source,
            })?,
        email: email.map(str::to_string),
    })
}

impl<S: Store + 'static> ConnectionManager<S> {
    /// Run the ingestion pipeline for one notification.
    pub(crate) fn ingest_notification(&self, payload: &Value) -> Result<IngestReceipt> {
        let raw_event = event_type(payload);
        let event = raw_event.unwrap_or("CONNECTION_SUCCESS").to_string();
        let event_id = string_at(payload, &["event_id"])
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);

        match EventKind::parse(raw_event) {
            EventKind::ConnectionSuccess => {}
            EventKind::ConnectionError => {
                let error = first_string(&[payload], &[&["error"], &["data", "error"]]);
                tracing::warn!(
                    event_id = %event_id,
                    error = error.unwrap_or("unknown"),
                    "Broker reported a failed connection attempt"
                );
                return Ok(IngestReceipt::ConnectionFailed { event });
            }
            EventKind::Other => {
                tracing::debug!(event_id = %event_id, event = %event, "Ignoring notification");
                return Ok(IngestReceipt::Ignored { event });
            }
        }

        let connection = extract_connection(payload)?;
        let stored = self.record_connection(&event_id, &connection);

        if stored.persisted {
            self.spawn_search_sync(connection);
        }

        Ok(IngestReceipt::Stored(stored))
    }

    /// Write the connection to the store, then mirror it into the cache.
    fn record_connection(&self, event_id: &str, connection: &NewConnection) -> StoredConnection {
        let NewConnection {
            owner,
            app,
            account,
            email,
        } = connection;

        let persisted = match self
            .store
            .upsert_connection(owner, app, account, email.as_deref())
        {
            Ok(record) => {
                tracing::info!(
                    event_id,
                    user_id = %owner,
                    app = %app,
                    account_id = %account,
                    connected_apps = record.len(),
                    "Recorded connection"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    event_id,
                    user_id = %owner,
                    app = %app,
                    error = %e,
                    "Store rejected connection, keeping it in the cache only"
                );
                false
            }
        };

        let entry = CachedConnection {
            account_id: account.clone(),
            app_name: app.clone(),
            email: email.clone(),
            status: ConnectionStatus::Active,
            connected_at: Utc::now(),
            source: if persisted {
                CacheSource::Ingested
            } else {
                CacheSource::FallbackStore
            },
        };

        let cached = match self.cache.put_connection(owner, entry) {
            Ok(()) => true,
            Err(e) if persisted => {
                tracing::warn!(event_id, user_id = %owner, error = %e, "Cache write failed");
                false
            }
            Err(e) => {
                tracing::error!(
                    event_id,
                    user_id = %owner,
                    app = %app,
                    account_id = %account,
                    error = %e,
                    "Connection was neither persisted nor cached"
                );
                false
            }
        };

        StoredConnection {
            owner: owner.clone(),
            app: app.clone(),
            account_id: account.clone(),
            email: email.clone(),
            persisted,
            cached,
        }
    }

    /// Fire-and-forget search sync for a newly recorded account.
    fn spawn_search_sync(&self, connection: NewConnection) {
        let search = Arc::clone(&self.search);
        let deadline = Duration::from_secs(self.config.search_timeout_seconds);

        tokio::spawn(async move {
            let NewConnection {
                app,
                account,
                email,
                ..
            } = connection;

            match tokio::time::timeout(
                deadline,
                search.sync_account(&app, &account, email.as_deref()),
            )
            .await
            {
                Ok(Ok(())) => {
                    tracing::debug!(app = %app, account_id = %account, "Search sync started");
                }
                Ok(Err(e)) => {
                    tracing::warn!(app = %app, account_id = %account, error = %e, "Search sync failed");
                }
                Err(_) => {
                    tracing::warn!(app = %app, account_id = %account, "Search sync timed out");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_kind_aliases() {
        assert_eq!(
            EventKind::parse(Some("CONNECTION_SUCCESS")),
            EventKind::ConnectionSuccess
        );
        assert_eq!(
            EventKind::parse(Some("connection_success")),
            EventKind::ConnectionSuccess
        );
        assert_eq!(
            EventKind::parse(Some("connection.created")),
            EventKind::ConnectionSuccess
        );
        assert_eq!(EventKind::parse(None), EventKind::ConnectionSuccess);
        assert_eq!(
            EventKind::parse(Some("CONNECTION_ERROR")),
            EventKind::ConnectionError
        );
        assert_eq!(EventKind::parse(Some("PING")), EventKind::Other);
    }

    #[test]
    fn extracts_flat_payload() {
        let conn = extract_connection(&json!({
            "owner": "U1",
            "app": "drive",
            "account": "A1",
        }))
        .unwrap();

        assert_eq!(conn.owner.as_str(), "U1");
        assert_eq!(conn.app.as_str(), "drive");
        assert_eq!(conn.account.as_str(), "A1");
        assert!(conn.email.is_none());
    }

    #[test]
    fn extracts_nested_broker_payload() {
        let conn = extract_connection(&json!({
            "event": "CONNECTION_SUCCESS",
            "id": "evt_1",
            "data": {
                "external_user_id": "U7",
                "account": {
                    "id": "apn_42",
                    "email": "u7@example.com",
                    "app": { "name_slug": "google_drive", "name": "Google Drive" }
                }
            }
        }))
        .unwrap();

        assert_eq!(conn.owner.as_str(), "U7");
        assert_eq!(conn.app.as_str(), "google_drive");
        assert_eq!(conn.account.as_str(), "apn_42");
        assert_eq!(conn.email.as_deref(), Some("u7@example.com"));
    }

    #[test]
    fn event_id_is_not_an_account() {
        let err = extract_connection(&json!({
            "event": "CONNECTION_SUCCESS",
            "id": "evt_1",
            "data": {
                "external_user_id": "U1",
                "app": { "name_slug": "drive" },
                "id": "evt_inner"
            }
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::MissingFields(ref f) if f == &vec![ACCOUNT_FIELD]
        ));
    }

    #[test]
    fn specific_account_id_beats_generic() {
        let conn = extract_connection(&json!({
            "user_id": "U1",
            "app_name": "Slack",
            "id": "evt_generic",
            "account_id": "A_generic",
            "account": { "id": "A_specific" },
        }))
        .unwrap();

        assert_eq!(conn.account.as_str(), "A_specific");
        assert_eq!(conn.app.as_str(), "slack");
    }

    #[test]
    fn app_name_is_normalized() {
        let conn = extract_connection(&json!({
            "external_user_id": "U1",
            "app": { "name": "Google Drive" },
            "account_id": "A1",
        }))
        .unwrap();

        assert_eq!(conn.app.as_str(), "google_drive");
    }

    #[test]
    fn missing_fields_are_all_reported() {
        let err = extract_connection(&json!({ "app": "drive" })).unwrap_err();
        match err {
            ConnectionError::MissingFields(fields) => {
                assert_eq!(fields, vec![OWNER_FIELD, ACCOUNT_FIELD]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_fields_count_as_missing() {
        let err = extract_connection(&json!({
            "owner": "  ",
            "app": "",
            "account_id": "A1",
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::MissingFields(ref f) if f == &vec![OWNER_FIELD, APP_FIELD]
        ));
    }

    #[test]
    fn malformed_app_is_invalid() {
        let err = extract_connection(&json!({
            "owner": "U1",
            "app": "drive!",
            "account_id": "A1",
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::InvalidId { field: APP_FIELD, .. }
        ));
    }

    #[test]
    fn event_type_reads_event_or_type() {
        assert_eq!(event_type(&json!({ "event": "X" })), Some("X"));
        assert_eq!(event_type(&json!({ "type": "Y" })), Some("Y"));
        assert_eq!(event_type(&json!({})), None);
    }
}
