//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Connection records, keyed by owner `user_id`.
    pub const CONNECTIONS: &str = "connections";

    /// User identities, keyed by `user_id`.
    pub const USERS: &str = "users";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::CONNECTIONS, cf::USERS]
}
