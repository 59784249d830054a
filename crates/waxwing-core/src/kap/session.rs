//! One KAP run with one peer.
//!
//! # State Machine
//!
//! ```text
//!  initiator (A)                               responder (B)
//!  ┌──────┐ MSG1 ┌──────────────┐              ┌──────┐
//!  │ Init │─────>│ AwaitingMsg2 │              │ Init │
//!  └──────┘      └──────────────┘              └──────┘
//!                       │ MSG2 ok, send MSG3       │ MSG1, send MSG2
//!                       ↓                          ↓
//!                ┌──────────────┐            ┌──────────────┐
//!                │ AwaitingMsg4 │            │ AwaitingMsg3 │
//!                └──────────────┘            └──────────────┘
//!                       │ MSG4 ok                  │ MSG3 ok, send MSG4
//!                       ↓                          ↓
//!                ┌──────────┐                ┌──────────┐
//!                │ Complete │                │ Complete │
//!                └──────────┘                └──────────┘
//! ```
//!
//! Any failed check moves the session to `Failed`. `Complete` and `Failed`
//! are terminal.

use waxwing_crypto::{
    AesKey, Decapsulate, EPHEMERAL_SIZE, EccKeyPair, EccPubKey, Encapsulate, Friendship,
    KEM_NONCE_SIZE, Sign, Verify, digests_match,
};
use waxwing_proto::KapMessage;

use crate::CoreError;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KapState {
    /// Nothing sent or received yet
    Init,
    /// Initiator: MSG1 sent
    AwaitingMsg2,
    /// Responder: MSG2 sent
    AwaitingMsg3,
    /// Initiator: MSG3 sent
    AwaitingMsg4,
    /// Friendship established
    Complete,
    /// A check failed
    Failed,
}

impl KapState {
    /// No further messages are accepted.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Which side of the exchange this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KapRole {
    /// Sent MSG1
    Initiator,
    /// Received MSG1
    Responder,
}

/// Fresh randomness for one step.
pub(crate) struct StepEntropy {
    pub(crate) ephemeral: [u8; EPHEMERAL_SIZE],
    pub(crate) nonce: [u8; KEM_NONCE_SIZE],
}

/// Per-peer protocol state.
pub struct KapSession {
    owner: String,
    peer: String,
    role: KapRole,
    state: KapState,
    identity: EccKeyPair,
    peer_key: EccPubKey,
    a_id: String,
    b_id: Option<String>,
    contribution: AesKey,
    /// Initiator: own commitment. Responder: commitment received in MSG1.
    commitment: String,
    master_key: Option<AesKey>,
}

impl KapSession {
    /// Start as initiator. Returns the session and MSG1.
    pub fn initiate(
        owner: &str,
        peer: &str,
        identity: EccKeyPair,
        peer_key: EccPubKey,
        a_id: String,
        contribution: AesKey,
    ) -> (Self, KapMessage) {
        let commitment = contribution.sha256();
        let msg1 = KapMessage::msg1(peer, owner, &a_id, commitment.clone());
        let session = Self {
            owner: owner.to_string(),
            peer: peer.to_string(),
            role: KapRole::Initiator,
            state: KapState::AwaitingMsg2,
            identity,
            peer_key,
            a_id,
            b_id: None,
            contribution,
            commitment,
            master_key: None,
        };
        (session, msg1)
    }

    /// Start as responder to `msg1`. Returns the session and signed MSG2.
    pub(crate) fn respond(
        identity: EccKeyPair,
        peer_key: EccPubKey,
        msg1: &KapMessage,
        b_id: String,
        contribution: AesKey,
        entropy: StepEntropy,
    ) -> Result<(Self, KapMessage), CoreError> {
        let owner = msg1.hdr.to.clone();
        let peer = msg1.hdr.from.clone();
        let commitment = msg1.require_payload()?.to_string();

        let wrapped = peer_key
            .encapsulate(&contribution, entropy.ephemeral, entropy.nonce)
            .map_err(|e| CoreError::kap(&peer, e.to_string()))?;
        let unsigned = KapMessage::msg2(&peer, &owner, &msg1.hdr.afid, &b_id, wrapped);
        let signature = identity.sign(unsigned.canonical().as_bytes());
        let msg2 = unsigned.with_signature(signature);

        let session = Self {
            owner,
            peer,
            role: KapRole::Responder,
            state: KapState::AwaitingMsg3,
            identity,
            peer_key,
            a_id: msg1.hdr.afid.clone(),
            b_id: Some(b_id),
            contribution,
            commitment,
            master_key: None,
        };
        Ok((session, msg2))
    }

    /// Current state.
    pub fn state(&self) -> KapState {
        self.state
    }

    /// Role of the local principal.
    pub fn role(&self) -> KapRole {
        self.role
    }

    /// Remote principal.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Initiator nonce.
    pub fn a_id(&self) -> &str {
        &self.a_id
    }

    /// Responder nonce, once known.
    pub fn b_id(&self) -> Option<&str> {
        self.b_id.as_deref()
    }

    /// Initiator: verify MSG2, derive the master key and produce signed
    /// MSG3.
    pub(crate) fn handle_msg2(&mut self, msg: &KapMessage, entropy: StepEntropy) -> Result<KapMessage, CoreError> {
        self.expect_state(KapState::AwaitingMsg2)?;
        self.check_afid(msg)?;
        let b_id = msg.require_bfid()?.to_string();

        // Signature first: nothing is decapsulated from an unauthenticated
        // message.
        self.verify_signature(msg)?;
        let theirs = self.decapsulate(msg)?;
        let master = self.contribution.xor_key(&theirs).map_err(|e| self.fail(e.to_string()))?;

        let wrapped = self
            .peer_key
            .encapsulate(&self.contribution, entropy.ephemeral, entropy.nonce)
            .map_err(|e| self.fail(e.to_string()))?;
        let unsigned = KapMessage::msg3(&self.peer, &self.owner, &self.a_id, &b_id, wrapped);
        let signature = self.identity.sign(unsigned.canonical().as_bytes());

        self.b_id = Some(b_id);
        self.master_key = Some(master);
        self.state = KapState::AwaitingMsg4;
        Ok(unsigned.with_signature(signature))
    }

    /// Responder: verify MSG3, check the commitment, establish the
    /// friendship and produce HMAC'd MSG4.
    pub(crate) fn handle_msg3(&mut self, msg: &KapMessage) -> Result<(Friendship, KapMessage), CoreError> {
        self.expect_state(KapState::AwaitingMsg3)?;
        self.check_afid(msg)?;
        self.check_bfid(msg)?;

        self.verify_signature(msg)?;
        let theirs = self.decapsulate(msg)?;
        if !digests_match(&theirs.sha256(), &self.commitment) {
            return Err(self.fail("commitment mismatch"));
        }
        let master = theirs.xor_key(&self.contribution).map_err(|e| self.fail(e.to_string()))?;

        let b_id = self.b_id.clone().unwrap_or_default();
        let friendship = Friendship::establish(&self.owner, &self.peer, false, master, &self.a_id, &b_id);
        let unsigned = KapMessage::msg4(&self.peer, &self.owner, &self.a_id, &b_id);
        let hmac = friendship.f_mac().hmac256(unsigned.canonical().as_bytes());

        self.state = KapState::Complete;
        Ok((friendship, unsigned.with_hmac(hmac)))
    }

    /// Initiator: verify MSG4's HMAC and establish the friendship.
    pub(crate) fn handle_msg4(&mut self, msg: &KapMessage) -> Result<Friendship, CoreError> {
        self.expect_state(KapState::AwaitingMsg4)?;
        self.check_afid(msg)?;
        self.check_bfid(msg)?;

        let Some(master) = self.master_key.clone() else {
            return Err(self.fail("no master key"));
        };
        let b_id = self.b_id.clone().unwrap_or_default();
        let friendship = Friendship::establish(&self.owner, &self.peer, true, master, &self.a_id, &b_id);

        let hmac = msg.hmac.as_deref().unwrap_or_default();
        if friendship.f_mac().verify_hmac256(msg.canonical().as_bytes(), hmac).is_err() {
            return Err(self.fail("hmac mismatch"));
        }

        self.state = KapState::Complete;
        Ok(friendship)
    }

    /// Mark failed and build the error.
    pub(crate) fn fail(&mut self, reason: impl Into<String>) -> CoreError {
        self.state = KapState::Failed;
        CoreError::kap(&self.peer, reason)
    }

    fn expect_state(&mut self, expected: KapState) -> Result<(), CoreError> {
        if self.state == expected {
            Ok(())
        } else {
            let reason = format!("unexpected message in state {:?}", self.state);
            Err(self.fail(reason))
        }
    }

    fn check_afid(&mut self, msg: &KapMessage) -> Result<(), CoreError> {
        if msg.hdr.afid == self.a_id { Ok(()) } else { Err(self.fail("AFID mismatch")) }
    }

    fn check_bfid(&mut self, msg: &KapMessage) -> Result<(), CoreError> {
        if msg.hdr.bfid.is_some() && msg.hdr.bfid == self.b_id {
            Ok(())
        } else {
            Err(self.fail("BFID mismatch"))
        }
    }

    fn verify_signature(&mut self, msg: &KapMessage) -> Result<(), CoreError> {
        let signature = msg.signature.as_deref().unwrap_or_default();
        match self.peer_key.verify_signature(msg.canonical().as_bytes(), signature) {
            Ok(()) => Ok(()),
            Err(_) => Err(self.fail("bad signature")),
        }
    }

    fn decapsulate(&mut self, msg: &KapMessage) -> Result<AesKey, CoreError> {
        let payload = msg.payload.as_deref().unwrap_or_default();
        match self.identity.decapsulate(payload) {
            Ok(key) => Ok(key),
            Err(err) => Err(self.fail(err.to_string())),
        }
    }
}
