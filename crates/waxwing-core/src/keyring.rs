//! Keyrings: named, owned scopes for conversation keys.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    CoreError, IdentityVault, KeyStore, StorageName,
    env::Environment,
    naming::TYP_KEY,
    storage::{Storage, StorageError},
};

/// Persisted keyring metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyringDescriptor {
    /// Application namespace
    pub app: String,
    /// Keyring name within the application
    pub name: String,
    /// Principal whose identity signs this keyring's conversations
    pub owner: String,
}

/// An open keyring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyring {
    descriptor: KeyringDescriptor,
}

impl Keyring {
    /// Application namespace.
    pub fn app(&self) -> &str {
        &self.descriptor.app
    }

    /// Keyring name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Owning principal.
    pub fn owner(&self) -> &str {
        &self.descriptor.owner
    }

    /// Storage name of key `id` in this keyring.
    pub fn key_name(&self, id: &str) -> StorageName {
        StorageName::keyring(self.app(), self.name(), TYP_KEY, id)
    }
}

/// Creates and opens keyrings.
#[derive(Clone)]
pub struct KeyringStore<S, E: Environment> {
    store: KeyStore<S, E>,
    vault: IdentityVault<S, E>,
}

impl<S: Storage, E: Environment> KeyringStore<S, E> {
    /// Keyrings over a shared key store.
    pub fn new(store: KeyStore<S, E>) -> Self {
        let vault = IdentityVault::new(store.clone());
        Self { store, vault }
    }

    /// Create keyring `app`/`name` owned by `owner`.
    ///
    /// # Errors
    ///
    /// - `Exists`: the keyring already exists
    /// - `NoIdent`: `owner` has no local identity
    pub fn create(&self, app: &str, name: &str, owner: &str) -> Result<Keyring, CoreError> {
        let storage_name = StorageName::keyring_descriptor(app, name).to_string();
        match self.store.storage().get(&storage_name) {
            Ok(_) => return Err(CoreError::Exists { name: storage_name }),
            Err(StorageError::NotFound { .. }) => {},
            Err(err) => return Err(err.into()),
        }
        if !self.vault.has(owner)? {
            return Err(CoreError::NoIdent { user: owner.to_string() });
        }

        let descriptor =
            KeyringDescriptor { app: app.to_string(), name: name.to_string(), owner: owner.to_string() };
        let mut bytes = Vec::new();
        ciborium::into_writer(&descriptor, &mut bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.storage().set(&storage_name, &bytes)?;

        info!(app, keyring = name, owner, "created keyring");
        Ok(Keyring { descriptor })
    }

    /// Open keyring `app`/`name` on behalf of `principal`.
    ///
    /// # Errors
    ///
    /// - `NoKeyring`: no such keyring
    /// - `OpenKeyring`: the keyring belongs to another principal
    /// - `Maimed`: the descriptor is corrupt
    pub fn open(&self, app: &str, name: &str, principal: &str) -> Result<Keyring, CoreError> {
        let storage_name = StorageName::keyring_descriptor(app, name).to_string();
        let bytes = match self.store.storage().get(&storage_name) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound { .. }) => {
                return Err(CoreError::NoKeyring { name: format!("{app}.{name}") });
            },
            Err(err) => return Err(err.into()),
        };
        let descriptor: KeyringDescriptor =
            ciborium::from_reader(bytes.as_slice()).map_err(|e| CoreError::Maimed(e.to_string()))?;

        if descriptor.owner != principal {
            return Err(CoreError::OpenKeyring {
                reason: format!("{app}.{name} belongs to {}", descriptor.owner),
            });
        }
        Ok(Keyring { descriptor })
    }
}
