//! `RocksDB` storage layer for tether.
//!
//! This crate provides durable storage for connection records and user
//! identities using `RocksDB` column families.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `connections`: One [`ConnectionRecord`] per user, keyed by `user_id`
//! - `users`: [`User`] identities created on broker sign-in
//!
//! # Example
//!
//! ```no_run
//! use tether_store::{RocksStore, Store};
//! use tether_core::{AccountId, AppName, UserId};
//!
//! let store = RocksStore::open("/tmp/tether-db").unwrap();
//!
//! let owner: UserId = "U1".parse().unwrap();
//! let app: AppName = "drive".parse().unwrap();
//! let account: AccountId = "A1".parse().unwrap();
//!
//! let record = store.upsert_connection(&owner, &app, &account, None).unwrap();
//! assert_eq!(record.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::{AppLink, ConnectionRecord, ConnectionStatus, User};

use tether_core::{AccountId, AppName, UserId};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer so services can be exercised
/// against failing or in-memory implementations in tests.
pub trait Store: Send + Sync {
    // =========================================================================
    // Connection Operations
    // =========================================================================

    /// Record that `owner` connected `app` through broker account `account`.
    ///
    /// Creates the record on first connection. On an existing record the link
    /// is appended only if `app` is not already present, so replaying the same
    /// notification is harmless. A non-empty `email` overwrites the stored
    /// account email. The read-modify-write is atomic with respect to other
    /// writers on the same store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn upsert_connection(
        &self,
        owner: &UserId,
        app: &AppName,
        account: &AccountId,
        email: Option<&str>,
    ) -> Result<ConnectionRecord>;

    /// Get the connection record for a user.
    ///
    /// A user with no stored record gets [`ConnectionRecord::empty`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_connections(&self, owner: &UserId) -> Result<ConnectionRecord>;

    /// Remove the link for `app` from the user's record.
    ///
    /// Returns `false` if the app was not connected.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn remove_connection(&self, owner: &UserId, app: &AppName) -> Result<bool>;

    /// List every user that has a connection record.
    ///
    /// Use with caution in production; intended for operator tooling.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_owners(&self) -> Result<Vec<UserId>>;

    // =========================================================================
    // User Operations
    // =========================================================================

    /// Insert or update a user record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_user(&self, user: &User) -> Result<()>;

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_user(&self, user_id: &UserId) -> Result<Option<User>>;
}
