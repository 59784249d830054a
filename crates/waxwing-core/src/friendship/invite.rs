//! Handing conversation keys to friends.
//!
//! The inviter wraps the conversation key under the friendship's fEnc and
//! authenticates the invite with fMac. The invitee finds the friendship from
//! the invite's nonces, checks the HMAC, unwraps the key and checks that the
//! conversation id was signed by the inviter before storing the key.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use waxwing_crypto::{AesKey, Friendship};
use waxwing_proto::{InviteHeader, InviteMessage, InvitePayload};

use super::FriendshipStore;
use crate::{
    CoreError, KeyStore, Keyring, conversation::verify_conversation_id,
    directory::IdentityResolver, env::Environment, storage::Storage,
};

/// Consent action that lets the flow continue.
pub const ACCEPT_ACTION: &str = "accept";

/// Consent action that aborts the flow.
pub const DECLINE_ACTION: &str = "decline";

/// Asks the user to approve a step.
#[async_trait]
pub trait Consent: Send + Sync + 'static {
    /// Show `text` with the given `actions`; `None` if dismissed.
    async fn prompt(&self, context_id: &str, text: &str, actions: &[&str]) -> Option<String>;
}

/// Invite/accept over stored friendships.
pub struct InviteFlow<S, E: Environment, R, C> {
    store: KeyStore<S, E>,
    friendships: FriendshipStore<S, E>,
    resolver: Arc<R>,
    consent: Arc<C>,
}

impl<S, E, R, C> InviteFlow<S, E, R, C>
where
    S: Storage,
    E: Environment,
    R: IdentityResolver,
    C: Consent,
{
    /// Flow over a shared key store.
    pub fn new(store: KeyStore<S, E>, resolver: Arc<R>, consent: Arc<C>) -> Self {
        let friendships = FriendshipStore::new(store.clone());
        Self { store, friendships, resolver, consent }
    }

    async fn confirm(&self, context_id: &str, text: String) -> Result<(), CoreError> {
        match self.consent.prompt(context_id, &text, &[ACCEPT_ACTION, DECLINE_ACTION]).await {
            Some(action) if action == ACCEPT_ACTION => Ok(()),
            _ => Err(CoreError::Refused(text)),
        }
    }

    /// Invite the peer of friendship `friendship_id` to conversation
    /// `conv_id` of `keyring`.
    ///
    /// On consent the peer is added to the key's principals and the key is
    /// persisted.
    ///
    /// # Errors
    ///
    /// - `NoKey`: unknown friendship or conversation
    /// - `Refused`: the user declined
    pub async fn invite(
        &self,
        keyring: &Keyring,
        friendship_id: &str,
        conv_id: &str,
    ) -> Result<InviteMessage, CoreError> {
        let friendship = self.friendships.load(keyring.owner(), friendship_id)?;
        let key_name = keyring.key_name(conv_id);
        let mut key: AesKey = self.store.load(&key_name)?;

        let convkey = friendship.f_enc().encrypt_text(&key.to_hex(), self.store.env().random_array());
        let unsigned = InviteMessage::new(
            InviteHeader {
                from: keyring.owner().to_string(),
                to: friendship.other().to_string(),
                afid: friendship.a_id().to_string(),
                bfid: friendship.b_id().to_string(),
            },
            InvitePayload { convid: conv_id.to_string(), convkey },
        );
        let hmac = friendship.f_mac().hmac256(unsigned.canonical().as_bytes());
        let invite = unsigned.with_hmac(hmac);

        self.confirm(conv_id, format!("Invite {} to this conversation?", friendship.other())).await?;

        key.add_principal(friendship.other());
        self.store.store(&key_name, key)?;
        info!(owner = keyring.owner(), peer = friendship.other(), "sent invite");
        Ok(invite)
    }

    /// Accept `invite` into `keyring`. Returns the stored key.
    ///
    /// # Errors
    ///
    /// - `OpenKeyring`: the invite is addressed to someone else
    /// - `BadType`: not an invite
    /// - `NoKey`: no friendship with the inviter
    /// - `BadParam`: friendship ids or HMAC do not match
    /// - `InvalidKey`: the key does not unwrap or the conversation was not
    ///   created by the inviter
    /// - `Exists`: a different key is already stored for the conversation
    /// - `Refused`: the user declined
    pub async fn accept_invite(&self, keyring: &Keyring, invite: &InviteMessage) -> Result<AesKey, CoreError> {
        let owner = keyring.owner();
        let hdr = &invite.hdr;
        if hdr.to != owner {
            return Err(CoreError::OpenKeyring { reason: format!("invite addressed to {}", hdr.to) });
        }
        invite.check_type()?;

        let id = Friendship::compute_id(&hdr.afid, &hdr.bfid, owner, &hdr.from);
        let friendship = self.friendships.load(owner, &id)?;
        if friendship.other() != hdr.from || friendship.a_id() != hdr.afid || friendship.b_id() != hdr.bfid {
            return Err(CoreError::BadParam("invite does not match friendship".into()));
        }
        if friendship.f_mac().verify_hmac256(invite.canonical().as_bytes(), &invite.hmac).is_err() {
            warn!(owner, peer = %hdr.from, "invite hmac mismatch");
            return Err(CoreError::BadParam("invite hmac mismatch".into()));
        }

        let key_hex = friendship.f_enc().decrypt_text(&invite.payload.convkey)?;
        let received = AesKey::from_hex(&key_hex)?;
        let creator = verify_conversation_id(&invite.payload.convid, &received, self.resolver.as_ref()).await?;
        if creator != hdr.from {
            return Err(CoreError::InvalidKey(format!(
                "conversation created by {creator}, invited by {}",
                hdr.from
            )));
        }

        let key_name = keyring.key_name(&invite.payload.convid);
        let mut key = match self.store.try_load::<AesKey>(&key_name)? {
            Some(existing) if existing.as_bytes() != received.as_bytes() => {
                return Err(CoreError::Exists { name: key_name.to_string() });
            },
            Some(existing) => existing,
            None => received,
        };

        self.confirm(&invite.payload.convid, format!("Join conversation from {}?", hdr.from)).await?;

        key.add_principal(hdr.from.as_str());
        key.add_principal(owner);
        self.store.store(&key_name, key.clone())?;
        info!(owner, peer = %hdr.from, "accepted invite");
        Ok(key)
    }
}
