//! Storage abstraction for key records.
//!
//! A flat name → bytes store. Names are produced by
//! [`StorageName`](crate::StorageName); values are encoded records. The
//! trait is synchronous; callers never hold a lock across an await point.

mod error;
mod memory;
mod redb;

use std::collections::BTreeMap;

pub use error::StorageError;
pub use memory::MemoryStorage;

pub use self::redb::RedbStorage;

/// Persistent name → record store.
///
/// Must be Clone (shared by the key store, directory and KAP service), Send +
/// Sync, and synchronous. Implementations share internal state via Arc, so
/// clones access the same underlying storage.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Load the record stored under `name`.
    ///
    /// Returns `NotFound` if absent.
    fn get(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Store `record` under `name`, replacing any previous value.
    fn set(&self, name: &str, record: &[u8]) -> Result<(), StorageError>;

    /// Remove `name`. Removing an absent name is not an error.
    fn delete(&self, name: &str) -> Result<(), StorageError>;

    /// Every stored record, by name.
    fn list_all(&self) -> Result<BTreeMap<String, Vec<u8>>, StorageError>;

    /// Names starting with `prefix`, sorted.
    fn list_names(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self.list_all()?.into_keys().filter(|name| name.starts_with(prefix)).collect())
    }
}
