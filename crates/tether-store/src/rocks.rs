//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options,
};
use tether_core::{AccountId, AppName, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{ConnectionRecord, User};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes read-modify-write cycles on connection records.
    ///
    /// `RocksDB` has no conditional update, so "append if absent" is made
    /// atomic by holding this lock across the read and the write.
    connection_writes: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            connection_writes: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read a stored connection record without substituting the empty default.
    fn load_record(&self, owner: &UserId) -> Result<Option<ConnectionRecord>> {
        let cf = self.cf(cf::CONNECTIONS)?;
        let key = keys::connection_key(owner);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Write a connection record.
    fn save_record(&self, record: &ConnectionRecord) -> Result<()> {
        let cf = self.cf(cf::CONNECTIONS)?;
        let key = keys::connection_key(&record.owner);
        let value = Self::serialize(record)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Connection Operations
    // =========================================================================

    fn upsert_connection(
        &self,
        owner: &UserId,
        app: &AppName,
        account: &AccountId,
        email: Option<&str>,
    ) -> Result<ConnectionRecord> {
        let _guard = self.connection_writes.lock();

        let mut record = self
            .load_record(owner)?
            .unwrap_or_else(|| ConnectionRecord::empty(owner.clone()));

        let added = record.add_link(app, account, email, Utc::now());
        self.save_record(&record)?;

        tracing::debug!(
            owner = %owner,
            app = %app,
            added,
            connected_apps = record.len(),
            "Upserted connection"
        );

        Ok(record)
    }

    fn get_connections(&self, owner: &UserId) -> Result<ConnectionRecord> {
        Ok(self
            .load_record(owner)?
            .unwrap_or_else(|| ConnectionRecord::empty(owner.clone())))
    }

    fn remove_connection(&self, owner: &UserId, app: &AppName) -> Result<bool> {
        let _guard = self.connection_writes.lock();

        let Some(mut record) = self.load_record(owner)? else {
            return Ok(false);
        };

        if record.remove_link(app, Utc::now()).is_none() {
            return Ok(false);
        }

        self.save_record(&record)?;

        tracing::debug!(
            owner = %owner,
            app = %app,
            remaining = record.len(),
            "Removed connection"
        );

        Ok(true)
    }

    fn list_owners(&self) -> Result<Vec<UserId>> {
        let cf = self.cf(cf::CONNECTIONS)?;

        let mut owners = Vec::new();
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            owners.push(keys::owner_from_key(&key)?);
        }

        Ok(owners)
    }

    // =========================================================================
    // User Operations
    // =========================================================================

    fn put_user(&self, user: &User) -> Result<()> {
        let cf = self.cf(cf::USERS)?;
        let key = keys::user_key(&user.user_id);
        let value = Self::serialize(user)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        let cf = self.cf(cf::USERS)?;
        let key = keys::user_key(user_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }
}
