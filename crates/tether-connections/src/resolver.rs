//! Cascading credential resolution.
//!
//! A [`CredentialResolver`] walks an ordered list of [`ResolverTier`]s and
//! returns the first bundle produced. Tier failures are logged and treated as
//! "no result"; the static default at the end of the chain always answers, so
//! resolution itself cannot fail.
//!
//! Default chain:
//!
//! | Tier | Source | Quality |
//! |------|--------|---------|
//! | [`StoreTier`] | connection record | durable |
//! | [`CacheTier`] | process-local cache | provisional |
//! | [`BrokerSessionTier`] | broker account listing | session |
//! | [`EmailHintTier`] | configured accounts + hint | static-accounts |
//! | [`StaticDefaultTier`] | configured identity | default |

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tether_broker::BrokerClient;
use tether_core::{AccountId, UserId};
use tether_store::{ConnectionStatus, Store, User};

use crate::cache::ConnectionCache;
use crate::error::{ConnectionError, Result};
use crate::types::{AuthSource, ConnectionsConfig, CredentialBundle};

/// Input to every tier.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    /// The user being resolved.
    pub user_id: UserId,
    /// Email supplied by the caller, if any.
    pub email_hint: Option<String>,
    /// The user's identity record, loaded once per resolution.
    pub identity: Option<User>,
}

impl ResolveRequest {
    /// Pick the email for a dynamic tier.
    ///
    /// Order: what the tier observed, the identity's email, the caller's hint,
    /// then the configured default.
    fn email(&self, observed: Option<&str>, default: Option<&str>) -> Option<String> {
        observed
            .or_else(|| self.identity.as_ref().and_then(|u| u.email.as_deref()))
            .or(self.email_hint.as_deref())
            .or(default)
            .map(str::to_string)
    }
}

/// One step of the resolution cascade.
#[async_trait]
pub trait ResolverTier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Try to produce a bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if a dependency fails; the resolver moves on.
    async fn resolve(&self, request: &ResolveRequest) -> Result<Option<CredentialBundle>>;
}

/// Accounts from the durable connection record.
pub struct StoreTier<S: Store> {
    store: Arc<S>,
    default_email: Option<String>,
}

impl<S: Store> StoreTier<S> {
    /// Create a store tier.
    #[must_use]
    pub fn new(store: Arc<S>, default_email: Option<String>) -> Self {
        Self {
            store,
            default_email,
        }
    }
}

#[async_trait]
impl<S: Store + 'static> ResolverTier for StoreTier<S> {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn resolve(&self, request: &ResolveRequest) -> Result<Option<CredentialBundle>> {
        let record = self.store.get_connections(&request.user_id)?;
        if record.is_empty() {
            return Ok(None);
        }

        Ok(Some(CredentialBundle::new(
            AuthSource::Store,
            request.user_id.as_str(),
            request.email(record.account_email.as_deref(), self.default_email.as_deref()),
            record.account_ids().into_iter().cloned().collect(),
        )))
    }
}

/// Active cached accounts the store does not know about.
pub struct CacheTier<S: Store> {
    cache: Arc<dyn ConnectionCache>,
    store: Arc<S>,
    default_email: Option<String>,
}

impl<S: Store> CacheTier<S> {
    /// Create a cache tier.
    #[must_use]
    pub fn new(
        cache: Arc<dyn ConnectionCache>,
        store: Arc<S>,
        default_email: Option<String>,
    ) -> Self {
        Self {
            cache,
            store,
            default_email,
        }
    }
}

#[async_trait]
impl<S: Store + 'static> ResolverTier for CacheTier<S> {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn resolve(&self, request: &ResolveRequest) -> Result<Option<CredentialBundle>> {
        let entries = self.cache.get(&request.user_id)?;
        if entries.is_empty() {
            return Ok(None);
        }

        // The store may be the reason we got here; treat it as empty if so.
        let known: HashSet<AccountId> = match self.store.get_connections(&request.user_id) {
            Ok(record) => record.account_ids().into_iter().cloned().collect(),
            Err(e) => {
                tracing::debug!(user_id = %request.user_id, error = %e, "Store unavailable while filtering cache");
                HashSet::new()
            }
        };

        let mut seen = HashSet::new();
        let live: Vec<_> = entries
            .iter()
            .filter(|e| e.status == ConnectionStatus::Active)
            .filter(|e| !known.contains(&e.account_id))
            .filter(|e| seen.insert(e.account_id.clone()))
            .collect();

        if live.is_empty() {
            return Ok(None);
        }

        let observed = live.iter().find_map(|e| e.email.as_deref());
        Ok(Some(CredentialBundle::new(
            AuthSource::Cache,
            request.user_id.as_str(),
            request.email(observed, self.default_email.as_deref()),
            live.iter().map(|e| e.account_id.clone()).collect(),
        )))
    }
}

/// Live accounts from the broker for users who signed in there.
pub struct BrokerSessionTier {
    broker: Arc<dyn BrokerClient>,
    timeout: Duration,
    default_email: Option<String>,
}

impl BrokerSessionTier {
    /// Create a broker-session tier.
    #[must_use]
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        timeout: Duration,
        default_email: Option<String>,
    ) -> Self {
        Self {
            broker,
            timeout,
            default_email,
        }
    }
}

#[async_trait]
impl ResolverTier for BrokerSessionTier {
    fn name(&self) -> &'static str {
        "broker-session"
    }

    async fn resolve(&self, request: &ResolveRequest) -> Result<Option<CredentialBundle>> {
        let Some(external_id) = request
            .identity
            .as_ref()
            .and_then(|u| u.broker_external_id.as_ref())
        else {
            return Ok(None);
        };

        let accounts = tokio::time::timeout(self.timeout, self.broker.list_accounts(external_id))
            .await
            .map_err(|_| ConnectionError::Timeout("broker account listing"))??;

        let healthy: Vec<_> = accounts.into_iter().filter(|a| a.healthy).collect();
        if healthy.is_empty() {
            return Ok(None);
        }

        let observed = healthy.iter().find_map(|a| a.email.as_deref());
        Ok(Some(CredentialBundle::new(
            AuthSource::BrokerSession,
            external_id.as_str(),
            request.email(observed, self.default_email.as_deref()),
            healthy.iter().map(|a| a.id.clone()).collect(),
        )))
    }
}

/// Configured accounts paired with the caller's email hint.
pub struct EmailHintTier {
    account_ids: Vec<AccountId>,
}

impl EmailHintTier {
    /// Create an email-hint tier.
    #[must_use]
    pub fn new(account_ids: Vec<AccountId>) -> Self {
        Self { account_ids }
    }
}

#[async_trait]
impl ResolverTier for EmailHintTier {
    fn name(&self) -> &'static str {
        "email-fallback"
    }

    async fn resolve(&self, request: &ResolveRequest) -> Result<Option<CredentialBundle>> {
        let Some(hint) = request.email_hint.as_deref() else {
            return Ok(None);
        };

        Ok(Some(CredentialBundle::new(
            AuthSource::EmailFallback,
            request.user_id.as_str(),
            Some(hint.to_string()),
            self.account_ids.clone(),
        )))
    }
}

/// The configured identity. Always answers.
#[derive(Debug, Clone)]
pub struct StaticDefaultTier {
    external_user_id: String,
    email: Option<String>,
    account_ids: Vec<AccountId>,
}

impl StaticDefaultTier {
    /// Create the static tier from configuration.
    #[must_use]
    pub fn new(config: &ConnectionsConfig) -> Self {
        Self {
            external_user_id: config.default_external_user_id.clone(),
            email: config.default_email.clone(),
            account_ids: config.default_account_ids.clone(),
        }
    }

    /// The bundle this tier always produces.
    #[must_use]
    pub fn bundle(&self) -> CredentialBundle {
        CredentialBundle::new(
            AuthSource::StaticFallback,
            self.external_user_id.clone(),
            self.email.clone(),
            self.account_ids.clone(),
        )
    }
}

#[async_trait]
impl ResolverTier for StaticDefaultTier {
    fn name(&self) -> &'static str {
        "static-fallback"
    }

    async fn resolve(&self, _request: &ResolveRequest) -> Result<Option<CredentialBundle>> {
        Ok(Some(self.bundle()))
    }
}

/// Runs the tiers in order.
pub struct CredentialResolver {
    tiers: Vec<Box<dyn ResolverTier>>,
    fallback: StaticDefaultTier,
}

impl CredentialResolver {
    /// Create a resolver from explicit tiers.
    ///
    /// `fallback` answers when every tier declines.
    #[must_use]
    pub fn new(tiers: Vec<Box<dyn ResolverTier>>, fallback: StaticDefaultTier) -> Self {
        Self { tiers, fallback }
    }

    /// Build the standard five-tier chain.
    #[must_use]
    pub fn standard<S: Store + 'static>(
        store: &Arc<S>,
        cache: &Arc<dyn ConnectionCache>,
        broker: &Arc<dyn BrokerClient>,
        config: &ConnectionsConfig,
    ) -> Self {
        let email = config.default_email.clone();
        let tiers: Vec<Box<dyn ResolverTier>> = vec![
            Box::new(StoreTier::new(Arc::clone(store), email.clone())),
            Box::new(CacheTier::new(
                Arc::clone(cache),
                Arc::clone(store),
                email.clone(),
            )),
            Box::new(BrokerSessionTier::new(
                Arc::clone(broker),
                Duration::from_secs(config.broker_timeout_seconds),
                email,
            )),
            Box::new(EmailHintTier::new(config.default_account_ids.clone())),
        ];
        Self::new(tiers, StaticDefaultTier::new(config))
    }

    /// Resolve a bundle. Never fails.
    pub async fn resolve(&self, request: &ResolveRequest) -> CredentialBundle {
        for tier in &self.tiers {
            match tier.resolve(request).await {
                Ok(Some(bundle)) => {
                    tracing::debug!(
                        user_id = %request.user_id,
                        tier = tier.name(),
                        accounts = bundle.account_ids.len(),
                        "Resolved credentials"
                    );
                    return bundle;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        user_id = %request.user_id,
                        tier = tier.name(),
                        error = %e,
                        "Resolver tier failed, trying next"
                    );
                }
            }
        }

        tracing::debug!(user_id = %request.user_id, "Falling back to static credentials");
        self.fallback.bundle()
    }
}
