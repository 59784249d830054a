//! Read-through/write-through key store.
//!
//! Pairs a [`KeyCache`] with a [`Storage`] backend. Loads are type-checked:
//! asking for an `AesKey` where a friendship is stored fails with `BADTYPE`,
//! a miss fails with `NOKEY`.

use std::sync::{Arc, Mutex};

use tracing::{trace, warn};
use waxwing_crypto::{KeyRecord, TypedKey};

use crate::{
    CoreConfig, CoreError, StorageName,
    cache::KeyCache,
    env::Environment,
    storage::{Storage, StorageError},
};

/// Cached, typed access to stored key records.
///
/// Clones share the cache and the backend.
#[derive(Clone)]
pub struct KeyStore<S, E: Environment> {
    storage: S,
    env: E,
    config: CoreConfig,
    cache: Arc<Mutex<KeyCache<E::Instant>>>,
}

impl<S: Storage, E: Environment> KeyStore<S, E> {
    /// Store over `storage`, using `env` for cache timing.
    pub fn new(storage: S, env: E, config: CoreConfig) -> Self {
        let cache = Arc::new(Mutex::new(KeyCache::new(config.cache_ttl)));
        Self { storage, env, config, cache }
    }

    /// Environment shared with every component built on this store.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Timing configuration.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Load a record of type `K`.
    ///
    /// # Errors
    ///
    /// - `NoKey`: nothing stored under `name`
    /// - `BadType`: a different record type is stored under `name`
    /// - `Maimed`: the stored bytes do not decode
    pub fn load<K: TypedKey>(&self, name: &StorageName) -> Result<K, CoreError> {
        Ok(K::from_record(self.load_record(name)?)?)
    }

    /// Load a record of any type.
    pub fn load_record(&self, name: &StorageName) -> Result<KeyRecord, CoreError> {
        let rendered = name.to_string();

        if let Some(record) = self.with_cache(|cache, now| cache.get(&rendered, now)) {
            trace!(storage_name = %rendered, "key cache hit");
            return Ok(record);
        }

        trace!(storage_name = %rendered, "key cache miss");
        let bytes = self.storage.get(&rendered)?;
        let record = KeyRecord::decode(&bytes)?;
        self.with_cache(|cache, now| cache.insert(rendered, record.clone(), now));
        Ok(record)
    }

    /// Load, mapping a miss to `None`.
    pub fn try_load<K: TypedKey>(&self, name: &StorageName) -> Result<Option<K>, CoreError> {
        match self.load(name) {
            Ok(key) => Ok(Some(key)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Persist `key` under `name`, replacing any previous record.
    pub fn store<K: TypedKey>(&self, name: &StorageName, key: K) -> Result<(), CoreError> {
        self.store_record(name, key.into_record())
    }

    /// Persist a record. Cache first, then storage.
    pub fn store_record(&self, name: &StorageName, record: KeyRecord) -> Result<(), CoreError> {
        let rendered = name.to_string();
        let bytes = record.encode()?;

        self.with_cache(|cache, now| cache.insert(rendered.clone(), record, now));
        if let Err(err) = self.storage.set(&rendered, &bytes) {
            self.with_cache(|cache, _| cache.remove(&rendered));
            return Err(err.into());
        }
        Ok(())
    }

    /// Remove a record from cache and storage.
    pub fn delete(&self, name: &StorageName) -> Result<(), CoreError> {
        let rendered = name.to_string();
        self.with_cache(|cache, _| cache.remove(&rendered));
        Ok(self.storage.delete(&rendered)?)
    }

    /// Whether anything is stored under `name`.
    pub fn contains(&self, name: &StorageName) -> Result<bool, CoreError> {
        match self.storage.get(&name.to_string()) {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Every decodable key record whose rendered name starts with `prefix`.
    ///
    /// Records that fail to decode are skipped with a warning.
    pub fn records(&self, prefix: &str) -> Result<Vec<(StorageName, KeyRecord)>, CoreError> {
        let mut records = Vec::new();
        for rendered in self.storage.list_names(prefix)? {
            let Some(name) = StorageName::parse(&rendered) else {
                warn!(storage_name = %rendered, "skipping unparseable storage name");
                continue;
            };
            match self.load_record(&name) {
                Ok(record) => records.push((name, record)),
                Err(CoreError::NoKey { .. }) => {},
                Err(err) => warn!(storage_name = %rendered, error = %err, "skipping record"),
            }
        }
        Ok(records)
    }

    /// Every decodable record of type `K` under `prefix`.
    pub fn typed_records<K: TypedKey>(&self, prefix: &str) -> Result<Vec<(StorageName, K)>, CoreError> {
        Ok(self
            .records(prefix)?
            .into_iter()
            .filter_map(|(name, record)| K::from_record(record).ok().map(|key| (name, key)))
            .collect())
    }

    /// Evict idle cache entries. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        self.with_cache(|cache, now| cache.sweep(now))
    }

    /// # Panics
    ///
    /// Panics if the cache mutex is poisoned (a thread panicked while
    /// holding it).
    #[allow(clippy::expect_used)]
    fn with_cache<T>(&self, f: impl FnOnce(&mut KeyCache<E::Instant>, E::Instant) -> T) -> T {
        let now = self.env.now();
        let mut cache = self.cache.lock().expect("Mutex poisoned");
        f(&mut cache, now)
    }
}
