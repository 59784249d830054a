//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. All
//! records survive restarts.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};

use super::{Storage, StorageError};

/// Table: records
/// Key: storage name (UTF-8)
/// Value: encoded record bytes
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates the RECORDS table if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(RECORDS).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Storage for RedbStorage {
    fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(RECORDS).map_err(io)?;

        match table.get(name).map_err(io)? {
            Some(value) => Ok(value.value().to_vec()),
            None => Err(StorageError::NotFound { name: name.to_string() }),
        }
    }

    fn set(&self, name: &str, record: &[u8]) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(RECORDS).map_err(io)?;
            table.insert(name, record).map_err(io)?;
        }
        txn.commit().map_err(io)?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(RECORDS).map_err(io)?;
            table.remove(name).map_err(io)?;
        }
        txn.commit().map_err(io)?;
        Ok(())
    }

    fn list_all(&self) -> Result<BTreeMap<String, Vec<u8>>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(RECORDS).map_err(io)?;

        let mut records = BTreeMap::new();
        for entry in table.iter().map_err(io)? {
            let (name, value) = entry.map_err(io)?;
            records.insert(name.value().to_string(), value.value().to_vec());
        }
        Ok(records)
    }

    fn list_names(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(RECORDS).map_err(io)?;

        let mut names = Vec::new();
        for entry in table.range(prefix..).map_err(io)? {
            let (name, _) = entry.map_err(io)?;
            let name = name.value();
            if !name.starts_with(prefix) {
                break;
            }
            names.push(name.to_string());
        }
        Ok(names)
    }
}

fn io(err: impl std::fmt::Display) -> StorageError {
    StorageError::Io(err.to_string())
}
