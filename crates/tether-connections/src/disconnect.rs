//! Disconnection workflow.
//!
//! Removing a connection touches three systems that cannot be updated
//! atomically. The workflow runs in a fixed order:
//!
//! 1. Look up the account id in the store.
//! 2. Revoke the account at the broker.
//! 3. Concurrently forget the account in the search backend and remove the
//!    link from the store.
//! 4. Drop the app from the cache once the store removal succeeded.
//!
//! A failure before step 3 leaves everything untouched. A failure in step 3
//! leaves the broker revoked with local state behind; this is reported as
//! [`DisconnectOutcome::FailedAfterBroker`] and logged at error level. A
//! retry completes the removal because the broker treats an already revoked
//! account as success.

use std::time::Duration;

use tether_core::{AppName, UserId};
use tether_store::Store;

use crate::error::ConnectionError;
use crate::service::ConnectionManager;
use crate::types::{DisconnectOutcome, DisconnectResult};

impl<S: Store + 'static> ConnectionManager<S> {
    /// Run the disconnection workflow for one app.
    pub(crate) async fn run_disconnect(&self, user_id: &UserId, app: &AppName) -> DisconnectResult {
        // 1. Lookup
        let record = match self.store.get_connections(user_id) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(user_id = %user_id, app = %app, error = %e, "Connection lookup failed");
                return DisconnectResult::new(
                    DisconnectOutcome::LookupFailed,
                    "Could not look up your connections right now. Please try again in a moment.",
                    0,
                );
            }
        };

        let Some(account_id) = record.account_for(app).cloned() else {
            return DisconnectResult::new(
                DisconnectOutcome::NotConnected,
                format!("{app} is not connected."),
                record.len(),
            );
        };

        // 2. Revoke at broker
        let broker_deadline = Duration::from_secs(self.config.broker_timeout_seconds);
        let revoked = tokio::time::timeout(broker_deadline, self.broker.delete_account(&account_id))
            .await
            .map_err(|_| ConnectionError::Timeout("broker revocation"))
            .and_then(|r| r.map_err(ConnectionError::from));

        if let Err(e) = revoked {
            let retriable = e.is_retriable();
            tracing::warn!(
                user_id = %user_id,
                app = %app,
                account_id = %account_id,
                error = %e,
                retriable,
                "Broker revocation failed"
            );
            let message = if retriable {
                format!("Could not disconnect {app} right now. Please try again in a few minutes.")
            } else {
                format!("Could not disconnect {app}: the broker refused the request.")
            };
            return DisconnectResult::new(DisconnectOutcome::FailedAtBroker, message, record.len());
        }

        // 3. Dual removal
        let search_deadline = Duration::from_secs(self.config.search_timeout_seconds);
        let email = record.account_email.as_deref();
        let (forgotten, removed) = tokio::join!(
            async {
                tokio::time::timeout(
                    search_deadline,
                    self.search.forget_account(app, &account_id, email),
                )
                .await
                .map_err(|_| ConnectionError::Timeout("search forget"))
                .and_then(|r| r)
            },
            async { self.store.remove_connection(user_id, app) },
        );

        // 4. Cache invalidation
        if removed.is_ok() {
            if let Err(e) = self.cache.remove_app(user_id, app) {
                tracing::warn!(user_id = %user_id, app = %app, error = %e, "Cache invalidation failed");
            }
        }

        let remaining = self
            .store
            .get_connections(user_id)
            .map_or_else(|_| record.len().saturating_sub(1), |r| r.len());

        match (forgotten, removed) {
            (Ok(()), Ok(_)) => {
                tracing::info!(user_id = %user_id, app = %app, account_id = %account_id, "Disconnected app");
                DisconnectResult::new(
                    DisconnectOutcome::Disconnected,
                    format!("Disconnected {app}."),
                    remaining,
                )
            }
            (forgotten, removed) => {
                tracing::error!(
                    user_id = %user_id,
                    app = %app,
                    account_id = %account_id,
                    search_error = ?forgotten.err(),
                    store_error = ?removed.err(),
                    "Account revoked at broker but local removal did not complete"
                );
                DisconnectResult::new(
                    DisconnectOutcome::FailedAfterBroker,
                    format!(
                        "{app} was revoked but cleanup did not finish. Please try disconnecting again."
                    ),
                    remaining,
                )
            }
        }
    }
}
