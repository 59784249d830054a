//! Result of a completed KAP run.
//!
//! A [`Friendship`] is immutable. Running KAP again produces a new
//! friendship with fresh nonces and a new id; nothing is updated in place.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::{AesKey, KeyError};

/// Derivation label for the channel MAC key
pub const MAC_LABEL: &str = "mac";

/// Derivation label for the channel encryption key
pub const ENC_LABEL: &str = "enc";

/// Shared channel between two principals.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FriendshipRecord", into = "FriendshipRecord")]
pub struct Friendship {
    owner: String,
    other: String,
    initiated: bool,
    master_key: AesKey,
    a_id: String,
    b_id: String,
    f_mac: AesKey,
    f_enc: AesKey,
}

impl Friendship {
    /// Build a friendship from an agreed master key, deriving the channel
    /// keys.
    ///
    /// `owner` is the local principal; `initiated` records whether the owner
    /// sent MSG1.
    pub fn establish(
        owner: impl Into<String>,
        other: impl Into<String>,
        initiated: bool,
        master_key: AesKey,
        a_id: impl Into<String>,
        b_id: impl Into<String>,
    ) -> Self {
        let (f_mac, f_enc) = Self::channel_keys(&master_key);
        Self {
            owner: owner.into(),
            other: other.into(),
            initiated,
            master_key,
            a_id: a_id.into(),
            b_id: b_id.into(),
            f_mac,
            f_enc,
        }
    }

    /// `(fMac, fEnc)` for a master key.
    pub fn channel_keys(master_key: &AesKey) -> (AesKey, AesKey) {
        (master_key.derive_key(MAC_LABEL), master_key.derive_key(ENC_LABEL))
    }

    /// Canonical id: `b64(aId):b64(bId):b64(p1):b64(p2)` where `p1 <= p2`
    /// are the two principal names.
    ///
    /// Sorting the names makes the id identical on both sides of the
    /// friendship.
    pub fn compute_id(a_id: &str, b_id: &str, principal: &str, peer: &str) -> String {
        let (first, second) = if principal <= peer { (principal, peer) } else { (peer, principal) };
        [a_id, b_id, first, second].map(|part| STANDARD.encode(part)).join(":")
    }

    /// Canonical id of this friendship.
    pub fn id(&self) -> String {
        Self::compute_id(&self.a_id, &self.b_id, &self.owner, &self.other)
    }

    /// Local principal.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Remote principal.
    pub fn other(&self) -> &str {
        &self.other
    }

    /// Whether the owner initiated the KAP run.
    pub fn initiated(&self) -> bool {
        self.initiated
    }

    /// Initiator nonce.
    pub fn a_id(&self) -> &str {
        &self.a_id
    }

    /// Responder nonce.
    pub fn b_id(&self) -> &str {
        &self.b_id
    }

    /// XOR of both contributions.
    pub fn master_key(&self) -> &AesKey {
        &self.master_key
    }

    /// Channel MAC key.
    pub fn f_mac(&self) -> &AesKey {
        &self.f_mac
    }

    /// Channel encryption key.
    pub fn f_enc(&self) -> &AesKey {
        &self.f_enc
    }

    /// Whether this friendship involves `principal` on either side.
    pub fn involves(&self, principal: &str) -> bool {
        self.owner == principal || self.other == principal
    }
}

impl fmt::Debug for Friendship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Friendship")
            .field("owner", &self.owner)
            .field("other", &self.other)
            .field("initiated", &self.initiated)
            .field("a_id", &self.a_id)
            .field("b_id", &self.b_id)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Deserialize)]
struct FriendshipRecord {
    #[serde(rename = "self")]
    owner: String,
    other: String,
    initiated: bool,
    #[serde(rename = "masterKey")]
    master_key: String,
    #[serde(rename = "aId")]
    a_id: String,
    #[serde(rename = "bId")]
    b_id: String,
    #[serde(rename = "fEnc")]
    f_enc: String,
    #[serde(rename = "fMac")]
    f_mac: String,
}

impl TryFrom<FriendshipRecord> for Friendship {
    type Error = KeyError;

    fn try_from(record: FriendshipRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            master_key: AesKey::from_base64(&record.master_key)?,
            f_mac: AesKey::from_base64(&record.f_mac)?,
            f_enc: AesKey::from_base64(&record.f_enc)?,
            owner: record.owner,
            other: record.other,
            initiated: record.initiated,
            a_id: record.a_id,
            b_id: record.b_id,
        })
    }
}

impl From<Friendship> for FriendshipRecord {
    fn from(friendship: Friendship) -> Self {
        Self {
            master_key: friendship.master_key.to_base64(),
            f_mac: friendship.f_mac.to_base64(),
            f_enc: friendship.f_enc.to_base64(),
            owner: friendship.owner,
            other: friendship.other,
            initiated: friendship.initiated,
            a_id: friendship.a_id,
            b_id: friendship.b_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> AesKey {
        AesKey::from_bytes([0x11; 32])
    }

    #[test]
    fn id_is_role_independent() {
        let alice = Friendship::establish("alice", "bob", true, master(), "na", "nb");
        let bob = Friendship::establish("bob", "alice", false, master(), "na", "nb");
        assert_eq!(alice.id(), bob.id());
        assert_eq!(alice.id(), Friendship::compute_id("na", "nb", "bob", "alice"));
    }

    #[test]
    fn id_depends_on_nonces() {
        let first = Friendship::compute_id("n1", "n2", "alice", "bob");
        let second = Friendship::compute_id("n1", "n3", "alice", "bob");
        assert_ne!(first, second);
        assert_eq!(first.split(':').count(), 4);
    }

    #[test]
    fn channel_keys_come_from_master() {
        let friendship = Friendship::establish("alice", "bob", true, master(), "na", "nb");
        assert_eq!(friendship.f_mac(), &master().derive_key(MAC_LABEL));
        assert_eq!(friendship.f_enc(), &master().derive_key(ENC_LABEL));
        assert_ne!(friendship.f_mac(), friendship.f_enc());
    }

    #[test]
    fn involves_either_side() {
        let friendship = Friendship::establish("alice", "bob", true, master(), "na", "nb");
        assert!(friendship.involves("alice"));
        assert!(friendship.involves("bob"));
        assert!(!friendship.involves("carol"));
    }
}
