//! Key encoding utilities for `RocksDB`.
//!
//! Both column families are keyed by the owner's user id encoded as UTF-8.
//! Keeping a single encoding lets operator listings decode owners straight
//! from the key without touching the value.

use tether_core::UserId;

use crate::error::{Result, StoreError};

/// Encode a connection record key.
#[must_use]
pub fn connection_key(owner: &UserId) -> Vec<u8> {
    owner.as_str().as_bytes().to_vec()
}

/// Encode a user identity key.
#[must_use]
pub fn user_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_str().as_bytes().to_vec()
}

/// Decode the owner id from a connection record key.
///
/// # Errors
///
/// Returns `StoreError::InvalidKey` if the key is not a valid user id.
pub fn owner_from_key(key: &[u8]) -> Result<UserId> {
    let raw = std::str::from_utf8(key).map_err(|e| StoreError::InvalidKey(e.to_string()))?;
    raw.parse()
        .map_err(|e: tether_core::IdError| StoreError::InvalidKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_decodes_from_connection_key() {
        let owner: UserId = "U024BE7LH".parse().unwrap();
        let key = connection_key(&owner);
        assert_eq!(owner_from_key(&key).unwrap(), owner);
    }

    #[test]
    fn invalid_key_is_rejected() {
        assert!(matches!(
            owner_from_key(&[0xff, 0xfe]),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            owner_from_key(b"has space"),
            Err(StoreError::InvalidKey(_))
        ));
    }
}
