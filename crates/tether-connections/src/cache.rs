//! Process-local connection cache.
//!
//! The cache mirrors recently seen connections so credentials can still be
//! resolved when the store is unreachable. It is advisory: entries may exist
//! without a store record and are trusted less than the store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tether_core::{AccountId, AppName, UserId};
use tether_store::ConnectionStatus;

use crate::error::Result;

/// Where a cache entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheSource {
    /// Written after the store accepted the connection.
    Ingested,
    /// Written because the store rejected the connection.
    FallbackStore,
}

/// One cached connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedConnection {
    /// Broker account id.
    pub account_id: AccountId,
    /// Normalized app name.
    pub app_name: AppName,
    /// Email seen with the connection.
    pub email: Option<String>,
    /// Whether the connection is live.
    pub status: ConnectionStatus,
    /// When the connection was observed.
    pub connected_at: DateTime<Utc>,
    /// Provenance.
    pub source: CacheSource,
}

/// Storage for cached connections, keyed by owner.
///
/// Writes are last-writer-wins per owner.
pub trait ConnectionCache: Send + Sync {
    /// Get all entries for an owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend is unavailable.
    fn get(&self, owner: &UserId) -> Result<Vec<CachedConnection>>;

    /// Replace all entries for an owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend is unavailable.
    fn set(&self, owner: &UserId, entries: Vec<CachedConnection>) -> Result<()>;

    /// Drop all entries for an owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend is unavailable.
    fn delete(&self, owner: &UserId) -> Result<()>;

    /// Insert an entry, replacing any existing entry for the same app.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend is unavailable.
    fn put_connection(&self, owner: &UserId, entry: CachedConnection) -> Result<()> {
        let mut entries = self.get(owner)?;
        entries.retain(|e| e.app_name != entry.app_name);
        entries.push(entry);
        self.set(owner, entries)
    }

    /// Remove the entries for one app, dropping the owner when none remain.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend is unavailable.
    fn remove_app(&self, owner: &UserId, app: &AppName) -> Result<()> {
        let mut entries = self.get(owner)?;
        entries.retain(|e| &e.app_name != app);
        if entries.is_empty() {
            self.delete(owner)
        } else {
            self.set(owner, entries)
        }
    }
}

/// An in-memory [`ConnectionCache`].
#[derive(Debug, Default)]
pub struct InMemoryConnectionCache {
    cache: RwLock<HashMap<UserId, Vec<CachedConnection>>>,
}

impl InMemoryConnectionCache {
    /// Create a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of cached owners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

impl ConnectionCache for InMemoryConnectionCache {
    fn get(&self, owner: &UserId) -> Result<Vec<CachedConnection>> {
        Ok(self.cache.read().get(owner).cloned().unwrap_or_default())
    }

    fn set(&self, owner: &UserId, entries: Vec<CachedConnection>) -> Result<()> {
        self.cache.write().insert(owner.clone(), entries);
        Ok(())
    }

    fn delete(&self, owner: &UserId) -> Result<()> {
        self.cache.write().remove(owner);
        Ok(())
    }
}
