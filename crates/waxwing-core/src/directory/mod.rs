//! Public key directory.
//!
//! Publishes and fetches long-term identities through a [`BulletinBoard`].
//! A publication is three posts sharing a timestamp (see
//! [`waxwing_proto::PublicationRecord`]); the signature binds both keys to
//! the username, the posting account and the validity window.
//!
//! Fetched identities are cached under `$global-@.<user>` and served from
//! the cache until the invalidation cascade replaces or drops them.

mod board;
mod select;

use std::sync::Arc;

use async_trait::async_trait;
pub use board::{BoardAccount, BoardPost, BulletinBoard};
pub use select::{FetchedIdentity, select_publication};
use tracing::{debug, info, warn};
use waxwing_crypto::{EccKeyPair, EccPubKey, Sign};
use waxwing_proto::PublicationRecord;

use crate::{
    CoreError, KeyStore, StorageName, env::Environment, naming::TYP_PUBLIC, storage::Storage,
};

/// Resolves a principal name to a trusted public identity.
#[async_trait]
pub trait IdentityResolver: Send + Sync + 'static {
    /// Current identity of `user`.
    ///
    /// # Errors
    ///
    /// - `NoIdent`: nothing verifiable is published
    /// - `Stale`: the published identity has expired
    async fn resolve(&self, user: &str) -> Result<EccPubKey, CoreError>;
}

/// Search query used when the recent timeline has no publication.
pub fn search_query(user: &str) -> String {
    format!("#signkey OR #encryptkey OR #keysig from:{user}")
}

/// Identity publication and lookup over a bulletin board.
pub struct PublicKeyDirectory<S, E: Environment, B> {
    store: KeyStore<S, E>,
    board: Arc<B>,
}

impl<S: Clone, E: Environment, B> Clone for PublicKeyDirectory<S, E, B> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), board: Arc::clone(&self.board) }
    }
}

impl<S: Storage, E: Environment, B: BulletinBoard> PublicKeyDirectory<S, E, B> {
    /// Directory over a shared key store and board.
    pub fn new(store: KeyStore<S, E>, board: Arc<B>) -> Self {
        Self { store, board }
    }

    /// Board handle.
    pub fn board(&self) -> &Arc<B> {
        &self.board
    }

    fn cache_name(user: &str) -> StorageName {
        StorageName::global(TYP_PUBLIC, user)
    }

    /// Publish `user`'s identity from the signed-in board account.
    ///
    /// # Errors
    ///
    /// - `NoEnt`: the board has no signed-in account
    /// - `PubSub`: the signed-in account is not `user`
    /// - `Generic`: posting failed
    pub async fn publish(&self, user: &str, identity: &EccKeyPair) -> Result<PublicationRecord, CoreError> {
        let account = self
            .board
            .current_account()
            .await?
            .ok_or_else(|| CoreError::NoEnt("bulletin board account".into()))?;
        if account.platform_username != user {
            return Err(CoreError::PubSub(format!(
                "signed in as {}, publishing for {user}",
                account.platform_username
            )));
        }

        let minified = identity.public().minify();
        let timestamp = self.store.env().wall_clock_ms();
        let expiration = timestamp + self.store.config().key_lifetime_ms();
        let message = PublicationRecord::signed_message(
            user,
            &account.platform_id,
            &minified.encrypt,
            &minified.sign,
            timestamp,
            expiration,
        );
        let record = PublicationRecord {
            encrypt_key: minified.encrypt,
            sign_key: minified.sign,
            timestamp,
            expiration,
            signature: identity.sign(message.as_bytes()),
        };

        for post in record.posts() {
            self.board.post(&post.to_string(), &account.auth_token).await?;
        }
        info!(user, timestamp, expiration, "published identity");
        Ok(record)
    }

    /// Fetch and verify `user`'s newest publication, bypassing the cache.
    ///
    /// Scans the recent timeline first and falls back to search.
    ///
    /// # Errors
    ///
    /// - `NoIdent`: nothing verifiable found
    pub async fn fetch(&self, user: &str) -> Result<FetchedIdentity, CoreError> {
        let recent = self.board.fetch_recent(user).await.unwrap_or_else(|err| {
            warn!(user, error = %err, "recent timeline unavailable");
            Vec::new()
        });
        if let Some(found) = select_publication(user, &recent)? {
            return Ok(found);
        }

        debug!(user, "no publication in recent timeline, searching");
        let found = self.board.search(&search_query(user)).await.unwrap_or_else(|err| {
            warn!(user, error = %err, "search unavailable");
            Vec::new()
        });
        select_publication(user, &found)?.ok_or_else(|| CoreError::NoIdent { user: user.to_string() })
    }

    /// `user`'s identity, from the cache or freshly fetched.
    ///
    /// # Errors
    ///
    /// - `NoIdent`: nothing verifiable published
    /// - `Stale`: the newest publication has expired
    pub async fn fetch_public(&self, user: &str) -> Result<EccPubKey, CoreError> {
        let name = Self::cache_name(user);
        if let Some(cached) = self.store.try_load::<EccPubKey>(&name)? {
            return Ok(cached);
        }

        let fetched = self.fetch(user).await?;
        if fetched.record.is_stale(self.store.env().wall_clock_ms()) {
            return Err(CoreError::Stale { user: user.to_string() });
        }
        self.store.store(&name, fetched.key.clone())?;
        debug!(user, "cached public identity");
        Ok(fetched.key)
    }

    /// Cached identity of `user`, without fetching.
    pub fn cached(&self, user: &str) -> Result<Option<EccPubKey>, CoreError> {
        self.store.try_load(&Self::cache_name(user))
    }

    /// Check that what is published for `user` is `identity`.
    ///
    /// # Errors
    ///
    /// - `NoIdent`: nothing published
    /// - `InvalidKey`: a different identity is published
    pub async fn check_own(&self, user: &str, identity: &EccKeyPair) -> Result<FetchedIdentity, CoreError> {
        let fetched = self.fetch(user).await?;
        if !fetched.key.same_key(&identity.public()) {
            return Err(CoreError::InvalidKey(format!("published identity of {user} is not ours")));
        }
        Ok(fetched)
    }
}

#[async_trait]
impl<S: Storage, E: Environment, B: BulletinBoard> IdentityResolver for PublicKeyDirectory<S, E, B> {
    async fn resolve(&self, user: &str) -> Result<EccPubKey, CoreError> {
        self.fetch_public(user).await
    }
}
