//! Connection service implementation.
//!
//! This module provides the `ConnectionService` trait and the
//! `ConnectionManager` implementation that ties the store, cache, broker,
//! and search backend together.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tether_broker::BrokerClient;
use tether_core::{AppName, ExternalUserId, UserId};
use tether_store::{ConnectionRecord, Store, User};

use crate::cache::ConnectionCache;
use crate::error::{ConnectionError, Result};
use crate::resolver::{CredentialResolver, ResolveRequest};
use crate::search_client::SearchBackend;
use crate::types::{ConnectLink, ConnectionsConfig, CredentialBundle, DisconnectResult, IngestReceipt};

/// Trait defining the connection operations.
///
/// Implementations handle persistence, caching, and coordination with the
/// broker and search backend.
#[async_trait]
pub trait ConnectionService: Send + Sync {
    // =========================================================================
    // Core Operations
    // =========================================================================

    /// Ingest a broker notification.
    ///
    /// Once mandatory fields are present the notification is always
    /// acknowledged, even if the store rejects the write.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::MissingFields` or `ConnectionError::InvalidId`
    /// for malformed notifications.
    async fn ingest(&self, payload: &Value) -> Result<IngestReceipt>;

    /// Resolve the credentials for an outbound search call.
    ///
    /// Never fails; degraded results are visible through the bundle's
    /// `auth_source` and `connection_quality`.
    async fn resolve_credentials(
        &self,
        user_id: &UserId,
        email_hint: Option<&str>,
    ) -> CredentialBundle;

    /// Disconnect an app from the broker, the store, the search backend, and
    /// the cache.
    async fn disconnect(&self, user_id: &UserId, app: &AppName) -> DisconnectResult;

    // =========================================================================
    // Supplementary Operations
    // =========================================================================

    /// List the user's stored connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    async fn list_connections(&self, user_id: &UserId) -> Result<ConnectionRecord>;

    /// List every user that has a connection record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    async fn list_owners(&self) -> Result<Vec<UserId>>;

    /// Create a broker connect link for the user.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker rejects the request or times out.
    async fn create_connect_link(&self, user_id: &UserId) -> Result<ConnectLink>;

    /// Record that the user signed in at the broker.
    ///
    /// Creates the identity on first sign-in.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    async fn record_broker_login(
        &self,
        user_id: &UserId,
        external_user_id: &ExternalUserId,
        email: Option<&str>,
    ) -> Result<User>;
}

/// The main connection service implementation.
pub struct ConnectionManager<S: Store> {
    pub(crate) store: Arc<S>,
    pub(crate) cache: Arc<dyn ConnectionCache>,
    pub(crate) broker: Arc<dyn BrokerClient>,
    pub(crate) search: Arc<dyn SearchBackend>,
    pub(crate) resolver: CredentialResolver,
    pub(crate) config: ConnectionsConfig,
}

impl<S: Store + 'static> ConnectionManager<S> {
    /// Create a new connection manager with the standard resolver chain.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        cache: Arc<dyn ConnectionCache>,
        broker: Arc<dyn BrokerClient>,
        search: Arc<dyn SearchBackend>,
        config: ConnectionsConfig,
    ) -> Self {
        let resolver = CredentialResolver::standard(&store, &cache, &broker, &config);
        Self {
            store,
            cache,
            broker,
            search,
            resolver,
            config,
        }
    }

    /// Replace the resolver chain.
    #[must_use]
    pub fn with_resolver(mut self, resolver: CredentialResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ConnectionsConfig {
        &self.config
    }

    /// Load the identity record, treating store failures as unknown.
    fn load_identity(&self, user_id: &UserId) -> Option<User> {
        match self.store.get_user(user_id) {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Identity lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl<S: Store + 'static> ConnectionService for ConnectionManager<S> {
    // =========================================================================
    // Core Operations
    // =========================================================================

    async fn ingest(&self, payload: &Value) -> Result<IngestReceipt> {
        self.ingest_notification(payload)
    }

    async fn resolve_credentials(
        &self,
        user_id: &UserId,
        email_hint: Option<&str>,
    ) -> CredentialBundle {
        let request = ResolveRequest {
            user_id: user_id.clone(),
            email_hint: email_hint
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            identity: self.load_identity(user_id),
        };
        self.resolver.resolve(&request).await
    }

    async fn disconnect(&self, user_id: &UserId, app: &AppName) -> DisconnectResult {
        self.run_disconnect(user_id, app).await
    }

    // =========================================================================
    // Supplementary Operations
    // =========================================================================

    async fn list_connections(&self, user_id: &UserId) -> Result<ConnectionRecord> {
        Ok(self.store.get_connections(user_id)?)
    }

    async fn list_owners(&self) -> Result<Vec<UserId>> {
        Ok(self.store.list_owners()?)
    }

    async fn create_connect_link(&self, user_id: &UserId) -> Result<ConnectLink> {
        let external_id = ExternalUserId::from(user_id);
        let deadline = Duration::from_secs(self.config.broker_timeout_seconds);

        let session = tokio::time::timeout(deadline, self.broker.create_session(&external_id))
            .await
            .map_err(|_| ConnectionError::Timeout("broker connect session"))??;

        tracing::info!(user_id = %user_id, "Created connect link");

        Ok(ConnectLink {
            token: session.token,
            connect_url: session.connect_url,
            expires_at: session.expires_at,
        })
    }

    async fn record_broker_login(
        &self,
        user_id: &UserId,
        external_user_id: &ExternalUserId,
        email: Option<&str>,
    ) -> Result<User> {
        let now = Utc::now();
        let email = email.map(str::trim).filter(|e| !e.is_empty());

        let user = match self.store.get_user(user_id)? {
            Some(mut user) => {
                user.broker_external_id = Some(external_user_id.clone());
                if let Some(email) = email {
                    user.email = Some(email.to_string());
                }
                user.last_login_at = Some(now);
                user
            }
            None => User {
                user_id: user_id.clone(),
                email: email.map(str::to_string),
                broker_external_id: Some(external_user_id.clone()),
                created_at: now,
                last_login_at: Some(now),
            },
        };

        self.store.put_user(&user)?;
        tracing::info!(user_id = %user_id, external_user_id = %external_user_id, "Recorded broker sign-in");

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheSource, CachedConnection, InMemoryConnectionCache};
    use crate::search_client::NoopSearchBackend;
    use crate::types::{AuthSource, ConnectionQuality, DisconnectOutcome};
    use serde_json::json;
    use tether_broker::{BrokerAccount, MockBrokerClient};
    use tether_core::AccountId;
    use tether_store::{ConnectionStatus, RocksStore, StoreError};
    use tempfile::TempDir;

    // =========================================================================
    // Test doubles
    // =========================================================================

    /// Wraps a real store and fails selected operations on demand.
    struct FlakyStore {
        inner: RocksStore,
        fail_reads: std::sync::atomic::AtomicBool,
        fail_writes: std::sync::atomic::AtomicBool,
    }

    impl FlakyStore {
        fn new(inner: RocksStore) -> Self {
            Self {
                inner,
                fail_reads: false.into(),
                fail_writes: false.into(),
            }
        }

        fn fail_reads(&self, fail: bool) {
            self.fail_reads
                .store(fail, std::sync::atomic::Ordering::SeqCst);
        }

        fn fail_writes(&self, fail: bool) {
            self.fail_writes
                .store(fail, std::sync::atomic::Ordering::SeqCst);
        }

        fn check(flag: &std::sync::atomic::AtomicBool) -> tether_store::Result<()> {
            if flag.load(std::sync::atomic::Ordering::SeqCst) {
                Err(StoreError::Database("injected failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl Store for FlakyStore {
        fn upsert_connection(
            &self,
            owner: &UserId,
            app: &AppName,
            account: &AccountId,
            email: Option<&str>,
        ) -> tether_store::Result<ConnectionRecord> {
            Self::check(&self.fail_writes)?;
            self.inner.upsert_connection(owner, app, account, email)
        }

        fn get_connections(&self, owner: &UserId) -> tether_store::Result<ConnectionRecord> {
            Self::check(&self.fail_reads)?;
            self.inner.get_connections(owner)
        }

        fn remove_connection(&self, owner: &UserId, app: &AppName) -> tether_store::Result<bool> {
            Self::check(&self.fail_writes)?;
            self.inner.remove_connection(owner, app)
        }

        fn list_owners(&self) -> tether_store::Result<Vec<UserId>> {
            Self::check(&self.fail_reads)?;
            self.inner.list_owners()
        }

        fn put_user(&self, user: &User) -> tether_store::Result<()> {
            Self::check(&self.fail_writes)?;
            self.inner.put_user(user)
        }

        fn get_user(&self, user_id: &UserId) -> tether_store::Result<Option<User>> {
            Self::check(&self.fail_reads)?;
            self.inner.get_user(user_id)
        }
    }

    /// A cache whose backend is always down.
    struct BrokenCache;

    impl ConnectionCache for BrokenCache {
        fn get(&self, _owner: &UserId) -> Result<Vec<CachedConnection>> {
            Err(ConnectionError::Cache("cache down".to_string()))
        }

        fn set(&self, _owner: &UserId, _entries: Vec<CachedConnection>) -> Result<()> {
            Err(ConnectionError::Cache("cache down".to_string()))
        }

        fn delete(&self, _owner: &UserId) -> Result<()> {
            Err(ConnectionError::Cache("cache down".to_string()))
        }
    }

    /// Records search calls and optionally fails `forget_account`.
    #[derive(Default)]
    struct RecordingSearch {
        synced: parking_lot::Mutex<Vec<(AppName, AccountId)>>,
        forgotten: parking_lot::Mutex<Vec<(AppName, AccountId)>>,
        fail_forget: bool,
    }

    #[async_trait]
    impl SearchBackend for RecordingSearch {
        async fn sync_account(
            &self,
            app: &AppName,
            account_id: &AccountId,
            _user_email: Option<&str>,
        ) -> Result<()> {
            self.synced.lock().push((app.clone(), account_id.clone()));
            Ok(())
        }

        async fn forget_account(
            &self,
            app: &AppName,
            account_id: &AccountId,
            _user_email: Option<&str>,
        ) -> Result<()> {
            if self.fail_forget {
                return Err(ConnectionError::Search("index locked".to_string()));
            }
            self.forgotten.lock().push((app.clone(), account_id.clone()));
            Ok(())
        }
    }

    // =========================================================================
    // Fixtures
    // =========================================================================

    struct Harness {
        manager: ConnectionManager<FlakyStore>,
        store: Arc<FlakyStore>,
        cache: Arc<InMemoryConnectionCache>,
        broker: Arc<MockBrokerClient>,
        search: Arc<RecordingSearch>,
        _dir: TempDir,
    }

    fn config() -> ConnectionsConfig {
        ConnectionsConfig {
            default_external_user_id: "fallback-user".to_string(),
            default_email: Some("ops@example.com".to_string()),
            default_account_ids: vec!["D1".parse().unwrap()],
            broker_timeout_seconds: 2,
            search_timeout_seconds: 2,
        }
    }

    fn harness_with(search: RecordingSearch) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FlakyStore::new(RocksStore::open(dir.path()).unwrap()));
        let cache = Arc::new(InMemoryConnectionCache::new());
        let broker = Arc::new(MockBrokerClient::new());
        let search = Arc::new(search);

        let manager = ConnectionManager::new(
            Arc::clone(&store),
            Arc::clone(&cache) as Arc<dyn ConnectionCache>,
            Arc::clone(&broker) as Arc<dyn BrokerClient>,
            Arc::clone(&search) as Arc<dyn SearchBackend>,
            config(),
        );

        Harness {
            manager,
            store,
            cache,
            broker,
            search,
            _dir: dir,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingSearch::default())
    }

    fn user(id: &str) -> UserId {
        id.parse().unwrap()
    }

    fn app(name: &str) -> AppName {
        name.parse().unwrap()
    }

    fn account(id: &str) -> AccountId {
        id.parse().unwrap()
    }

    fn notification(owner: &str, app: &str, account: &str) -> Value {
        json!({ "owner": owner, "app": app, "account": account })
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    #[tokio::test]
    async fn ingest_then_resolve_from_store() {
        let h = harness();

        let receipt = h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();
        let IngestReceipt::Stored(stored) = receipt else {
            panic!("expected stored receipt");
        };
        assert!(stored.persisted);
        assert!(stored.cached);

        let bundle = h.manager.resolve_credentials(&user("U1"), None).await;
        assert_eq!(bundle.account_ids, vec![account("A1")]);
        assert_eq!(bundle.auth_source, AuthSource::Store);
        assert_eq!(bundle.connection_quality, ConnectionQuality::Durable);
        assert!(bundle.dynamic);
        assert_eq!(bundle.external_user_id, "U1");
    }

    #[tokio::test]
    async fn ingest_twice_keeps_one_link() {
        let h = harness();

        for _ in 0..2 {
            h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();
        }

        let record = h.manager.list_connections(&user("U1")).await.unwrap();
        assert_eq!(record.app_names(), vec![&app("drive")]);
        assert_eq!(record.app_names().len(), record.account_ids().len());
    }

    #[tokio::test]
    async fn ingest_tags_cache_entry() {
        let h = harness();

        h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();

        let entries = h.cache.get(&user("U1")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, CacheSource::Ingested);
        assert_eq!(entries[0].status, ConnectionStatus::Active);
    }

    #[tokio::test]
    async fn ingest_store_failure_falls_back_to_cache() {
        let h = harness();
        h.store.fail_writes(true);

        let receipt = h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();
        let IngestReceipt::Stored(stored) = receipt else {
            panic!("expected stored receipt");
        };
        assert!(!stored.persisted);
        assert!(stored.cached);

        let entries = h.cache.get(&user("U1")).unwrap();
        assert_eq!(entries[0].source, CacheSource::FallbackStore);

        let bundle = h.manager.resolve_credentials(&user("U1"), None).await;
        assert_eq!(bundle.auth_source, AuthSource::Cache);
        assert_eq!(bundle.connection_quality, ConnectionQuality::Provisional);
        assert_eq!(bundle.account_ids, vec![account("A1")]);
    }

    #[tokio::test]
    async fn ingest_cache_failure_still_acknowledged() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let manager = ConnectionManager::new(
            store,
            Arc::new(BrokenCache),
            Arc::new(MockBrokerClient::new()),
            Arc::new(NoopSearchBackend::new()),
            config(),
        );

        let receipt = manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();
        let IngestReceipt::Stored(stored) = receipt else {
            panic!("expected stored receipt");
        };
        assert!(stored.persisted);
        assert!(!stored.cached);
    }

    #[tokio::test]
    async fn ingest_missing_fields_rejected() {
        let h = harness();

        let err = h.manager.ingest(&json!({ "app": "drive" })).await.unwrap_err();
        assert!(matches!(err, ConnectionError::MissingFields(ref f) if f.len() == 2));
    }

    #[tokio::test]
    async fn ingest_ignores_other_events() {
        let h = harness();

        let receipt = h
            .manager
            .ingest(&json!({ "event": "ACCOUNT_REFRESHED", "owner": "U1" }))
            .await
            .unwrap();
        assert_eq!(
            receipt,
            IngestReceipt::Ignored {
                event: "ACCOUNT_REFRESHED".to_string()
            }
        );

        let receipt = h
            .manager
            .ingest(&json!({ "event": "CONNECTION_ERROR", "error": "user cancelled" }))
            .await
            .unwrap();
        assert!(matches!(receipt, IngestReceipt::ConnectionFailed { .. }));
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn ingest_triggers_search_sync() {
        let h = harness();

        h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();

        for _ in 0..50 {
            if !h.search.synced.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            h.search.synced.lock().clone(),
            vec![(app("drive"), account("A1"))]
        );
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    #[tokio::test]
    async fn unknown_user_gets_static_fallback() {
        let h = harness();

        let bundle = h.manager.resolve_credentials(&user("U9"), None).await;
        assert!(!bundle.dynamic);
        assert_eq!(bundle.auth_source, AuthSource::StaticFallback);
        assert_eq!(bundle.external_user_id, "fallback-user");
        assert_eq!(bundle.user_email.as_deref(), Some("ops@example.com"));
    }

    #[tokio::test]
    async fn unknown_user_with_hint_gets_email_fallback() {
        let h = harness();

        let bundle = h
            .manager
            .resolve_credentials(&user("U9"), Some("u9@example.com"))
            .await;
        assert!(bundle.dynamic);
        assert_eq!(bundle.auth_source, AuthSource::EmailFallback);
        assert_eq!(bundle.user_email.as_deref(), Some("u9@example.com"));
        assert_eq!(bundle.account_ids, vec![account("D1")]);
    }

    #[tokio::test]
    async fn blank_hint_is_ignored() {
        let h = harness();

        let bundle = h.manager.resolve_credentials(&user("U9"), Some("   ")).await;
        assert_eq!(bundle.auth_source, AuthSource::StaticFallback);
    }

    #[tokio::test]
    async fn store_wins_over_cache() {
        let h = harness();
        h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();
        h.cache
            .put_connection(
                &user("U1"),
                CachedConnection {
                    account_id: account("A2"),
                    app_name: app("slack"),
                    email: None,
                    status: ConnectionStatus::Active,
                    connected_at: Utc::now(),
                    source: CacheSource::Ingested,
                },
            )
            .unwrap();

        let bundle = h.manager.resolve_credentials(&user("U1"), None).await;
        assert_eq!(bundle.auth_source, AuthSource::Store);
        assert_eq!(bundle.account_ids, vec![account("A1")]);
    }

    #[tokio::test]
    async fn store_outage_serves_cache() {
        let h = harness();
        h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();
        h.store.fail_reads(true);

        let bundle = h.manager.resolve_credentials(&user("U1"), None).await;
        assert_eq!(bundle.auth_source, AuthSource::Cache);
        assert_eq!(bundle.account_ids, vec![account("A1")]);
    }

    #[tokio::test]
    async fn inactive_cache_entries_are_skipped() {
        let h = harness();
        h.cache
            .put_connection(
                &user("U1"),
                CachedConnection {
                    account_id: account("A1"),
                    app_name: app("drive"),
                    email: None,
                    status: ConnectionStatus::Inactive,
                    connected_at: Utc::now(),
                    source: CacheSource::Ingested,
                },
            )
            .unwrap();

        let bundle = h.manager.resolve_credentials(&user("U1"), None).await;
        assert_eq!(bundle.auth_source, AuthSource::StaticFallback);
    }

    #[tokio::test]
    async fn broker_session_tier_uses_signed_in_identity() {
        let h = harness();
        let external: ExternalUserId = "ext-U1".parse().unwrap();
        h.broker.add_account(
            &external,
            BrokerAccount {
                id: account("B1"),
                app: Some("gmail".to_string()),
                email: Some("u1@example.com".to_string()),
                healthy: true,
            },
        );
        h.broker.add_account(
            &external,
            BrokerAccount {
                id: account("B2"),
                app: Some("drive".to_string()),
                email: None,
                healthy: false,
            },
        );

        h.manager
            .record_broker_login(&user("U1"), &external, None)
            .await
            .unwrap();

        let bundle = h.manager.resolve_credentials(&user("U1"), None).await;
        assert_eq!(bundle.auth_source, AuthSource::BrokerSession);
        assert_eq!(bundle.connection_quality, ConnectionQuality::Session);
        assert_eq!(bundle.external_user_id, "ext-U1");
        assert_eq!(bundle.account_ids, vec![account("B1")]);
        assert_eq!(bundle.user_email.as_deref(), Some("u1@example.com"));
    }

    #[tokio::test]
    async fn broker_failure_degrades_to_fallback() {
        let h = harness();
        let external: ExternalUserId = "ext-U1".parse().unwrap();
        h.manager
            .record_broker_login(&user("U1"), &external, Some("u1@example.com"))
            .await
            .unwrap();
        h.broker.set_failing(true);

        let bundle = h.manager.resolve_credentials(&user("U1"), None).await;
        assert_eq!(bundle.auth_source, AuthSource::StaticFallback);
    }

    // =========================================================================
    // Disconnection
    // =========================================================================

    #[tokio::test]
    async fn disconnect_removes_everywhere() {
        let h = harness();
        h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();
        h.manager.ingest(&notification("U1", "slack", "A2")).await.unwrap();

        let result = h.manager.disconnect(&user("U1"), &app("drive")).await;

        assert!(result.success);
        assert_eq!(result.outcome, DisconnectOutcome::Disconnected);
        assert_eq!(result.remaining_connections, 1);
        assert_eq!(h.broker.deleted_accounts(), vec![account("A1")]);
        assert_eq!(
            h.search.forgotten.lock().clone(),
            vec![(app("drive"), account("A1"))]
        );

        let record = h.manager.list_connections(&user("U1")).await.unwrap();
        assert_eq!(record.app_names(), vec![&app("slack")]);
        let cached = h.cache.get(&user("U1")).unwrap();
        assert!(cached.iter().all(|e| e.app_name != app("drive")));
    }

    #[tokio::test]
    async fn disconnect_unknown_app_is_noop() {
        let h = harness();
        h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();

        let result = h.manager.disconnect(&user("U1"), &app("notion")).await;

        assert!(!result.success);
        assert_eq!(result.outcome, DisconnectOutcome::NotConnected);
        assert_eq!(result.remaining_connections, 1);
        assert!(h.broker.deleted_accounts().is_empty());
    }

    #[tokio::test]
    async fn disconnect_broker_failure_leaves_store_intact() {
        let h = harness();
        h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();
        h.broker.set_failing(true);

        let result = h.manager.disconnect(&user("U1"), &app("drive")).await;

        assert!(!result.success);
        assert_eq!(result.outcome, DisconnectOutcome::FailedAtBroker);
        assert!(result.message.contains("try again"));

        let record = h.manager.list_connections(&user("U1")).await.unwrap();
        assert_eq!(record.app_names(), vec![&app("drive")]);
        assert_eq!(h.cache.get(&user("U1")).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn disconnect_refused_by_broker_does_not_suggest_retry() {
        let h = harness();
        h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();
        h.broker.set_rejecting(true);

        let result = h.manager.disconnect(&user("U1"), &app("drive")).await;

        assert_eq!(result.outcome, DisconnectOutcome::FailedAtBroker);
        assert!(!result.message.contains("try again"));
        assert!(result.message.contains("refused"));
        assert_eq!(result.remaining_connections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_broker_timeout_is_failure() {
        let h = harness();
        h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();
        h.broker.set_delay(Duration::from_secs(60));

        let result = h.manager.disconnect(&user("U1"), &app("drive")).await;

        assert_eq!(result.outcome, DisconnectOutcome::FailedAtBroker);
        let record = h.manager.list_connections(&user("U1")).await.unwrap();
        assert!(record.contains_app(&app("drive")));
    }

    #[tokio::test]
    async fn disconnect_lookup_failure_changes_nothing() {
        let h = harness();
        h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();
        h.store.fail_reads(true);

        let result = h.manager.disconnect(&user("U1"), &app("drive")).await;

        assert_eq!(result.outcome, DisconnectOutcome::LookupFailed);
        assert!(h.broker.deleted_accounts().is_empty());
    }

    #[tokio::test]
    async fn disconnect_search_failure_after_broker() {
        let h = harness_with(RecordingSearch {
            fail_forget: true,
            ..RecordingSearch::default()
        });
        h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();

        let result = h.manager.disconnect(&user("U1"), &app("drive")).await;

        assert!(!result.success);
        assert_eq!(result.outcome, DisconnectOutcome::FailedAfterBroker);
        assert_eq!(h.broker.deleted_accounts(), vec![account("A1")]);
        // Store removal ran concurrently and succeeded, so the cache follows.
        assert!(h.cache.get(&user("U1")).unwrap().is_empty());
        assert_eq!(result.remaining_connections, 0);
    }

    #[tokio::test]
    async fn disconnect_store_failure_after_broker_keeps_cache() {
        let h = harness();
        h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();
        h.store.fail_writes(true);

        let result = h.manager.disconnect(&user("U1"), &app("drive")).await;

        assert_eq!(result.outcome, DisconnectOutcome::FailedAfterBroker);
        assert_eq!(h.cache.get(&user("U1")).unwrap().len(), 1);

        // Retrying once the store recovers completes the removal.
        h.store.fail_writes(false);
        let retry = h.manager.disconnect(&user("U1"), &app("drive")).await;
        assert_eq!(retry.outcome, DisconnectOutcome::Disconnected);
        assert_eq!(retry.remaining_connections, 0);
    }

    // =========================================================================
    // Supplementary
    // =========================================================================

    #[tokio::test]
    async fn connect_link_uses_user_id() {
        let h = harness();

        let link = h.manager.create_connect_link(&user("U1")).await.unwrap();
        assert_eq!(link.token, "ctok_U1");
        assert!(link.connect_url.contains("ctok_U1"));
    }

    #[tokio::test]
    async fn connect_link_broker_failure() {
        let h = harness();
        h.broker.set_failing(true);

        let err = h.manager.create_connect_link(&user("U1")).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Broker(_)));
    }

    #[tokio::test]
    async fn broker_login_creates_then_updates_identity() {
        let h = harness();
        let external: ExternalUserId = "ext-1".parse().unwrap();

        let first = h
            .manager
            .record_broker_login(&user("U1"), &external, Some("u1@example.com"))
            .await
            .unwrap();
        assert_eq!(first.email.as_deref(), Some("u1@example.com"));

        let second = h
            .manager
            .record_broker_login(&user("U1"), &external, None)
            .await
            .unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.email.as_deref(), Some("u1@example.com"));
        assert!(second.last_login_at >= first.last_login_at);
    }

    #[tokio::test]
    async fn list_owners_reports_ingested_users() {
        let h = harness();
        h.manager.ingest(&notification("U1", "drive", "A1")).await.unwrap();
        h.manager.ingest(&notification("U2", "gmail", "A2")).await.unwrap();

        let mut owners = h.manager.list_owners().await.unwrap();
        owners.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(owners, vec![user("U1"), user("U2")]);

        h.store.fail_reads(true);
        assert!(matches!(
            h.manager.list_owners().await,
            Err(ConnectionError::Store(_))
        ));
    }

    #[tokio::test]
    async fn list_connections_propagates_store_errors() {
        let h = harness();
        h.store.fail_reads(true);

        let err = h.manager.list_connections(&user("U1")).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Store(_)));
    }
}
