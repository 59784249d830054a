#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use super::{Storage, StorageError};

/// In-memory storage implementation for testing and simulation
///
/// Records live in a `BTreeMap` behind `Arc<Mutex<>>` so clones share state.
/// Panics if the mutex is poisoned.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.records.lock().expect("Mutex poisoned").len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite a record with raw bytes, bypassing encoding. Lets tests
    /// plant corrupt records.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn put_raw(&self, name: &str, bytes: Vec<u8>) {
        self.records.lock().expect("Mutex poisoned").insert(name.to_string(), bytes);
    }
}

impl Storage for MemoryStorage {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for test
    /// code.
    #[allow(clippy::expect_used)]
    fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let records = self.records.lock().expect("Mutex poisoned");
        records.get(name).cloned().ok_or_else(|| StorageError::NotFound { name: name.to_string() })
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for test
    /// code.
    #[allow(clippy::expect_used)]
    fn set(&self, name: &str, record: &[u8]) -> Result<(), StorageError> {
        self.records.lock().expect("Mutex poisoned").insert(name.to_string(), record.to_vec());
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for test
    /// code.
    #[allow(clippy::expect_used)]
    fn delete(&self, name: &str) -> Result<(), StorageError> {
        self.records.lock().expect("Mutex poisoned").remove(name);
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for test
    /// code.
    #[allow(clippy::expect_used)]
    fn list_all(&self) -> Result<BTreeMap<String, Vec<u8>>, StorageError> {
        Ok(self.records.lock().expect("Mutex poisoned").clone())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for test
    /// code.
    #[allow(clippy::expect_used)]
    fn list_names(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let records = self.records.lock().expect("Mutex poisoned");
        Ok(records
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect())
    }
}
