//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in column families.

use genledger_core::{EntryId, RequestId, UserId};

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a ledger entry key from an entry ID.
#[must_use]
pub fn entry_key(entry_id: &EntryId) -> Vec<u8> {
    entry_id.to_bytes().to_vec()
}

/// Create a user-scoped index key.
///
/// Format: `user_id (16 bytes) || entry_id (16 bytes)`
///
/// Since ULIDs are time-ordered, keys for one user sort by creation time.
/// Used for both the ledger index and the job index (keyed by the job's
/// charge entry).
#[must_use]
pub fn user_entry_key(user_id: &UserId, entry_id: &EntryId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&entry_id.to_bytes());
    key
}

/// Create a prefix for iterating a user's index entries.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the entry ID from a user-scoped index key.
///
/// Returns `None` if the key is not exactly 32 bytes.
#[must_use]
pub fn entry_id_from_user_key(key: &[u8]) -> Option<EntryId> {
    let bytes: [u8; 16] = key.get(16..32)?.try_into().ok()?;
    Some(EntryId::from_bytes(bytes))
}

/// Create a job key from a request ID.
#[must_use]
pub fn job_key(request_id: &RequestId) -> Vec<u8> {
    request_id.as_bytes().to_vec()
}

/// Decode a request ID stored as an index value.
#[must_use]
pub fn request_id_from_value(value: &[u8]) -> Option<RequestId> {
    let bytes: [u8; 16] = value.try_into().ok()?;
    Some(RequestId::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_key_length() {
        let key = account_key(&UserId::generate());
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn user_entry_key_format() {
        let user_id = UserId::generate();
        let entry_id = EntryId::generate();
        let key = user_entry_key(&user_id, &entry_id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert_eq!(&key[16..], entry_id.to_bytes());
    }

    #[test]
    fn extract_entry_id_roundtrip() {
        let user_id = UserId::generate();
        let entry_id = EntryId::generate();
        let key = user_entry_key(&user_id, &entry_id);

        assert_eq!(entry_id_from_user_key(&key), Some(entry_id));
        assert_eq!(entry_id_from_user_key(&key[..20]), None);
    }

    #[test]
    fn request_id_value_roundtrip() {
        let request_id = RequestId::generate();
        let value = job_key(&request_id);
        assert_eq!(request_id_from_value(&value), Some(request_id));
        assert_eq!(request_id_from_value(b"short"), None);
    }
}
