//! Persisted friendships and the invite/accept sub-protocol.
//!
//! A friendship is stored once per side, under the owning principal:
//! `user.<owner>-fr.<friendship id>`. The id is role-independent, so both
//! sides file the same friendship under the same id.

mod invite;

use tracing::{debug, info};
use waxwing_crypto::Friendship;

pub use self::invite::{ACCEPT_ACTION, Consent, DECLINE_ACTION, InviteFlow};
use crate::{
    CoreError, KeyStore, StorageName, env::Environment, naming::TYP_FRIENDSHIP, storage::Storage,
};

/// Friendship persistence over the shared key store.
#[derive(Clone)]
pub struct FriendshipStore<S, E: Environment> {
    store: KeyStore<S, E>,
}

impl<S: Storage, E: Environment> FriendshipStore<S, E> {
    /// Store over a shared key store.
    pub fn new(store: KeyStore<S, E>) -> Self {
        Self { store }
    }

    fn name(owner: &str, id: &str) -> StorageName {
        StorageName::principal(owner, TYP_FRIENDSHIP, id)
    }

    /// Persist a completed friendship under its owner.
    ///
    /// Friendships are immutable: a rerun of KAP yields a new id, so this
    /// never updates an existing record in place.
    pub fn store(&self, friendship: &Friendship) -> Result<(), CoreError> {
        let id = friendship.id();
        self.store.store(&Self::name(friendship.owner(), &id), friendship.clone())?;
        info!(owner = friendship.owner(), peer = friendship.other(), "stored friendship");
        Ok(())
    }

    /// Load `owner`'s friendship `id`.
    ///
    /// # Errors
    ///
    /// - `NoKey`: no such friendship
    pub fn load(&self, owner: &str, id: &str) -> Result<Friendship, CoreError> {
        self.store.load(&Self::name(owner, id))
    }

    /// Every friendship owned by `owner`.
    pub fn list(&self, owner: &str) -> Result<Vec<Friendship>, CoreError> {
        let prefix = StorageName::principal_prefix(owner, TYP_FRIENDSHIP);
        Ok(self.store.typed_records::<Friendship>(&prefix)?.into_iter().map(|(_, f)| f).collect())
    }

    /// Every friendship of every local principal.
    pub fn list_all(&self) -> Result<Vec<Friendship>, CoreError> {
        Ok(self
            .store
            .typed_records::<Friendship>(StorageName::any_principal_prefix())?
            .into_iter()
            .map(|(_, f)| f)
            .collect())
    }

    /// An existing friendship between `owner` and `other`, if any.
    pub fn find(&self, owner: &str, other: &str) -> Result<Option<Friendship>, CoreError> {
        Ok(self.list(owner)?.into_iter().find(|f| f.other() == other))
    }

    /// Delete every friendship that involves `user` on either side. Returns
    /// the number deleted.
    pub fn clear_for_user(&self, user: &str) -> Result<usize, CoreError> {
        let mut deleted = 0;
        let records = self.store.typed_records::<Friendship>(StorageName::any_principal_prefix())?;
        for (name, friendship) in records {
            if friendship.involves(user) {
                self.store.delete(&name)?;
                debug!(owner = friendship.owner(), peer = friendship.other(), "deleted friendship");
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use waxwing_crypto::AesKey;

    use super::*;
    use crate::{CoreConfig, storage::MemoryStorage, test_support::TestEnv};

    fn friendships() -> FriendshipStore<MemoryStorage, TestEnv> {
        FriendshipStore::new(KeyStore::new(MemoryStorage::new(), TestEnv::new(), CoreConfig::default()))
    }

    fn friendship(owner: &str, other: &str, a_id: &str) -> Friendship {
        Friendship::establish(owner, other, true, AesKey::from_bytes([7; 32]), a_id, "b")
    }

    #[test]
    fn store_then_load_by_id() {
        let store = friendships();
        let f = friendship("alice", "bob", "a1");
        store.store(&f).unwrap();
        assert_eq!(store.load("alice", &f.id()).unwrap(), f);
        assert!(store.load("bob", &f.id()).unwrap_err().is_not_found());
    }

    #[test]
    fn find_by_peer() {
        let store = friendships();
        store.store(&friendship("alice", "bob", "a1")).unwrap();
        store.store(&friendship("alice", "carol", "a2")).unwrap();

        assert_eq!(store.find("alice", "carol").unwrap().unwrap().a_id(), "a2");
        assert!(store.find("alice", "dave").unwrap().is_none());
        assert_eq!(store.list("alice").unwrap().len(), 2);
    }

    #[test]
    fn clear_for_user_matches_either_side() {
        let store = friendships();
        store.store(&friendship("alice", "bob", "a1")).unwrap();
        store.store(&friendship("bob", "alice", "a1")).unwrap();
        store.store(&friendship("alice", "carol", "a2")).unwrap();

        assert_eq!(store.clear_for_user("bob").unwrap(), 2);
        let left = store.list_all().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].other(), "carol");
    }
}
