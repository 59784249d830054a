//! Conversation ids and keys.
//!
//! A conversation id names its creator and is signed by the creator's
//! identity over the id and the key material:
//!
//! ```text
//! id        = prefix ":" b64(creator) ":" nonce-hex ":" signature-hex
//! signed    = prefix ":" b64(creator) ":" nonce-hex ":" key-hex
//! ```
//!
//! Anyone holding the key can check who created the conversation.

use std::{fmt, str::FromStr};

use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::info;
use waxwing_crypto::{AesKey, Sign, Verify};

use crate::{
    CoreError, IdentityVault, KeyStore, Keyring, directory::IdentityResolver, env::Environment,
    storage::Storage,
};

/// Parsed conversation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationId {
    prefix: String,
    creator: String,
    nonce: String,
    signature: String,
}

impl ConversationId {
    /// Application-chosen prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Principal that created the conversation.
    pub fn creator(&self) -> &str {
        &self.creator
    }

    fn signed_part(prefix: &str, creator: &str, nonce: &str) -> String {
        format!("{prefix}:{}:{nonce}", STANDARD.encode(creator))
    }

    fn signing_input(prefix: &str, creator: &str, nonce: &str, key: &AesKey) -> String {
        format!("{}:{}", Self::signed_part(prefix, creator, nonce), key.to_hex())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", Self::signed_part(&self.prefix, &self.creator, &self.nonce), self.signature)
    }
}

impl FromStr for ConversationId {
    type Err = CoreError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let bad = || CoreError::InvalidKey(format!("malformed conversation id {text}"));
        let [prefix, creator, nonce, signature] =
            <[&str; 4]>::try_from(text.split(':').collect::<Vec<_>>()).map_err(|_| bad())?;
        let creator = STANDARD.decode(creator).map_err(|_| bad())?;
        let creator = String::from_utf8(creator).map_err(|_| bad())?;
        if prefix.is_empty() || nonce.is_empty() || signature.is_empty() {
            return Err(bad());
        }
        Ok(Self {
            prefix: prefix.to_string(),
            creator,
            nonce: nonce.to_string(),
            signature: signature.to_string(),
        })
    }
}

/// Creates and loads conversation keys within keyrings.
#[derive(Clone)]
pub struct Conversations<S, E: Environment> {
    store: KeyStore<S, E>,
    vault: IdentityVault<S, E>,
}

impl<S: Storage, E: Environment> Conversations<S, E> {
    /// Conversations over a shared key store.
    pub fn new(store: KeyStore<S, E>) -> Self {
        let vault = IdentityVault::new(store.clone());
        Self { store, vault }
    }

    /// Create a conversation in `keyring`, signed by the keyring owner.
    ///
    /// The new key's principals are `{owner}`.
    ///
    /// # Errors
    ///
    /// - `BadParam`: `prefix` is empty or contains `:`
    /// - `NoIdent`: the owner has no identity
    pub fn create(&self, keyring: &Keyring, prefix: &str) -> Result<(ConversationId, AesKey), CoreError> {
        if prefix.is_empty() || prefix.contains(':') {
            return Err(CoreError::BadParam(format!("conversation prefix {prefix:?}")));
        }
        let owner = keyring.owner();
        let identity = self.vault.load(owner)?;
        let env = self.store.env();

        let mut key = AesKey::from_bytes(env.random_array());
        key.add_principal(owner);
        let nonce = env.random_nonce();
        let signature =
            identity.sign(ConversationId::signing_input(prefix, owner, &nonce, &key).as_bytes());
        let id = ConversationId {
            prefix: prefix.to_string(),
            creator: owner.to_string(),
            nonce,
            signature,
        };

        self.store.store(&keyring.key_name(&id.to_string()), key.clone())?;
        info!(owner, keyring = keyring.name(), "created conversation");
        Ok((id, key))
    }

    /// Key of conversation `id` in `keyring`.
    ///
    /// # Errors
    ///
    /// - `NoKey`: not a member of this conversation
    pub fn key(&self, keyring: &Keyring, id: &str) -> Result<AesKey, CoreError> {
        self.store.load(&keyring.key_name(id))
    }
}

/// Check that `id` was created by the principal it names, for the key
/// `key`. Returns the creator.
///
/// # Errors
///
/// - `InvalidKey`: malformed id or bad signature
/// - resolver errors (`NoIdent`, `Stale`) for the creator
pub async fn verify_conversation_id<R: IdentityResolver + ?Sized>(
    id: &str,
    key: &AesKey,
    resolver: &R,
) -> Result<String, CoreError> {
    let parsed: ConversationId = id.parse()?;
    let creator_key = resolver.resolve(&parsed.creator).await?;
    let input = ConversationId::signing_input(&parsed.prefix, &parsed.creator, &parsed.nonce, key);
    creator_key
        .verify_signature(input.as_bytes(), &parsed.signature)
        .map_err(|_| CoreError::InvalidKey(format!("conversation id not signed by {}", parsed.creator)))?;
    Ok(parsed.creator)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use waxwing_crypto::EccPubKey;

    use super::*;
    use crate::{CoreConfig, KeyringStore, storage::MemoryStorage, test_support::TestEnv};

    struct Known(HashMap<String, EccPubKey>);

    #[async_trait]
    impl IdentityResolver for Known {
        async fn resolve(&self, user: &str) -> Result<EccPubKey, CoreError> {
            self.0.get(user).cloned().ok_or_else(|| CoreError::NoIdent { user: user.to_string() })
        }
    }

    fn setup() -> (Conversations<MemoryStorage, TestEnv>, Keyring, Known) {
        let store = KeyStore::new(MemoryStorage::new(), TestEnv::new(), CoreConfig::default());
        let alice = IdentityVault::new(store.clone()).create("alice").unwrap();
        let keyring = KeyringStore::new(store.clone()).create("mail", "work", "alice").unwrap();
        let known = Known(HashMap::from([("alice".to_string(), alice.public())]));
        (Conversations::new(store), keyring, known)
    }

    #[test]
    fn id_text_form() {
        let id: ConversationId = "mail:YWxpY2U=:00ff:abcd".parse().unwrap();
        assert_eq!(id.creator(), "alice");
        assert_eq!(id.prefix(), "mail");
        assert_eq!(id.to_string(), "mail:YWxpY2U=:00ff:abcd");

        assert!("mail:YWxpY2U=:00ff".parse::<ConversationId>().is_err());
        assert!("mail:!!:00ff:abcd".parse::<ConversationId>().is_err());
    }

    #[test]
    fn create_stores_owner_only_key() {
        let (conversations, keyring, _) = setup();
        let (id, key) = conversations.create(&keyring, "mail").unwrap();

        assert_eq!(id.creator(), "alice");
        let stored = conversations.key(&keyring, &id.to_string()).unwrap();
        assert_eq!(stored, key);
        assert_eq!(stored.principals().iter().collect::<Vec<_>>(), vec!["alice"]);
    }

    #[test]
    fn bad_prefix_is_badparam() {
        let (conversations, keyring, _) = setup();
        assert!(matches!(conversations.create(&keyring, "a:b"), Err(CoreError::BadParam(_))));
    }

    #[tokio::test]
    async fn verify_returns_creator() {
        let (conversations, keyring, known) = setup();
        let (id, key) = conversations.create(&keyring, "mail").unwrap();
        assert_eq!(verify_conversation_id(&id.to_string(), &key, &known).await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn verify_rejects_other_key() {
        let (conversations, keyring, known) = setup();
        let (id, _) = conversations.create(&keyring, "mail").unwrap();
        let other = AesKey::from_bytes([5; 32]);
        assert!(matches!(
            verify_conversation_id(&id.to_string(), &other, &known).await,
            Err(CoreError::InvalidKey(_))
        ));
    }
}
