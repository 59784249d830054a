//! Own long-term identities.

use std::collections::BTreeMap;

use tracing::info;
use waxwing_crypto::{EccKeyPair, EccPubKey};

use crate::{
    CoreError, KeyStore, StorageName,
    env::Environment,
    invalidation::{self, CascadeReport, KeyStatus},
    naming::TYP_IDENTITY,
    storage::Storage,
};

/// Identity key pairs of the local principals, stored under
/// `$global-id.<user>`.
#[derive(Clone)]
pub struct IdentityVault<S, E: Environment> {
    store: KeyStore<S, E>,
}

impl<S: Storage, E: Environment> IdentityVault<S, E> {
    /// Vault over a shared key store.
    pub fn new(store: KeyStore<S, E>) -> Self {
        Self { store }
    }

    fn name(user: &str) -> StorageName {
        StorageName::global(TYP_IDENTITY, user)
    }

    /// Generate and persist a fresh identity for `user`.
    ///
    /// # Errors
    ///
    /// - `Exists`: `user` already has an identity
    pub fn create(&self, user: &str) -> Result<EccKeyPair, CoreError> {
        let name = Self::name(user);
        if self.store.contains(&name)? {
            return Err(CoreError::Exists { name: name.to_string() });
        }
        let pair = self.generate();
        self.store.store(&name, pair.clone())?;
        info!(user, "created identity");
        Ok(pair)
    }

    /// Persist an existing key pair as `user`'s identity.
    ///
    /// Importing the same key twice is a no-op; a different key fails with
    /// `Exists`.
    pub fn import(&self, user: &str, pair: EccKeyPair) -> Result<(), CoreError> {
        let name = Self::name(user);
        match self.store.try_load::<EccKeyPair>(&name)? {
            Some(existing) if existing == pair => Ok(()),
            Some(_) => Err(CoreError::Exists { name: name.to_string() }),
            None => self.store.store(&name, pair),
        }
    }

    /// Identity of `user`.
    ///
    /// # Errors
    ///
    /// - `NoIdent`: `user` has no identity in this vault
    pub fn load(&self, user: &str) -> Result<EccKeyPair, CoreError> {
        self.store
            .try_load(&Self::name(user))?
            .ok_or_else(|| CoreError::NoIdent { user: user.to_string() })
    }

    /// Whether `user` has an identity here.
    pub fn has(&self, user: &str) -> Result<bool, CoreError> {
        self.store.contains(&Self::name(user))
    }

    /// Every principal with a local identity, sorted.
    pub fn principals(&self) -> Result<Vec<String>, CoreError> {
        Ok(self
            .store
            .typed_records::<EccKeyPair>(&StorageName::global_prefix(TYP_IDENTITY))?
            .into_iter()
            .map(|(name, _)| name.id().to_string())
            .collect())
    }

    /// Replace `user`'s identity with a fresh one.
    ///
    /// Everything derived from the old identity is invalidated: shared keys
    /// naming `user` are flagged and friendships involving `user` are
    /// deleted.
    pub fn regenerate(&self, user: &str) -> Result<(EccKeyPair, CascadeReport), CoreError> {
        self.load(user)?;
        let pair = self.generate();
        self.store.store(&Self::name(user), pair.clone())?;
        info!(user, "regenerated identity");

        let verdicts = BTreeMap::from([(user.to_string(), KeyStatus::Changed(pair.public()))]);
        let report = invalidation::cascade(&self.store, &verdicts)?;
        Ok((pair, report))
    }

    /// Public half of `user`'s identity.
    pub fn public(&self, user: &str) -> Result<EccPubKey, CoreError> {
        Ok(self.load(user)?.public())
    }

    fn generate(&self) -> EccKeyPair {
        let env = self.store.env();
        EccKeyPair::from_secrets(env.random_array(), env.random_array())
    }
}
