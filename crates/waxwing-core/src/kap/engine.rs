//! Single-flight KAP session table for one local principal.
//!
//! Sans-IO: the engine consumes inbound messages and returns
//! [`KapAction`]s for the driver to execute. At most one session exists per
//! peer; sessions leave the table on completion or failure.

use std::collections::HashMap;

use tracing::{debug, info, warn};
use waxwing_crypto::{AesKey, EccKeyPair, EccPubKey, Friendship};
use waxwing_proto::{KapMessage, KapType, ProtocolError};

use super::session::{KapRole, KapSession, KapState, StepEntropy};
use crate::{CoreError, env::Environment};

/// Actions returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KapAction {
    /// Deliver this message to its recipient
    Send(KapMessage),
    /// Persist this friendship; the session with its peer is complete
    Established(Friendship),
    /// The session with `peer` failed and was removed
    Failed {
        /// Remote principal
        peer: String,
        /// Why
        error: CoreError,
    },
}

/// KAP sessions of one local principal, keyed by peer.
pub struct KapEngine {
    owner: String,
    identity: EccKeyPair,
    sessions: HashMap<String, KapSession>,
}

impl KapEngine {
    /// Engine for `owner` with its identity key pair.
    pub fn new(owner: impl Into<String>, identity: EccKeyPair) -> Self {
        Self { owner: owner.into(), identity, sessions: HashMap::new() }
    }

    /// Local principal.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Whether a session with `peer` is in flight.
    pub fn has_session(&self, peer: &str) -> bool {
        self.sessions.contains_key(peer)
    }

    /// State of the session with `peer`, if any.
    pub fn state(&self, peer: &str) -> Option<KapState> {
        self.sessions.get(peer).map(KapSession::state)
    }

    /// Number of sessions in flight.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop the session with `peer`. Returns whether one existed.
    pub fn abort(&mut self, peer: &str) -> bool {
        self.sessions.remove(peer).is_some()
    }

    /// Start KAP with `peer`.
    ///
    /// Does nothing if a session with `peer` is already in flight; its
    /// outcome will be reported instead.
    pub fn initiate<E: Environment>(&mut self, env: &E, peer: &str, peer_key: EccPubKey) -> Vec<KapAction> {
        if self.sessions.contains_key(peer) {
            debug!(peer, "session already in flight");
            return Vec::new();
        }

        let contribution = AesKey::from_bytes(env.random_array());
        let (session, msg1) = KapSession::initiate(
            &self.owner,
            peer,
            self.identity.clone(),
            peer_key,
            env.random_nonce(),
            contribution,
        );
        self.sessions.insert(peer.to_string(), session);
        debug!(peer, "sent MSG1");
        vec![KapAction::Send(msg1)]
    }

    /// Process an inbound message.
    ///
    /// `sender_key` is the sender's identity, required for a MSG1 that
    /// starts a new session and ignored otherwise.
    ///
    /// Verification failures inside a session are reported as
    /// [`KapAction::Failed`] and remove the session.
    ///
    /// # Errors
    ///
    /// - `BadParam`: the message is not addressed to this principal or
    ///   lacks a field its type requires
    /// - `KapError`: MSG2/3/4 without a session, or MSG1 from an unresolved
    ///   sender
    pub fn handle<E: Environment>(
        &mut self,
        env: &E,
        msg: &KapMessage,
        sender_key: Option<EccPubKey>,
    ) -> Result<Vec<KapAction>, CoreError> {
        if msg.hdr.to != self.owner {
            return Err(CoreError::BadParam(format!(
                "message for {} delivered to {}",
                msg.hdr.to, self.owner
            )));
        }
        check_shape(msg)?;
        let peer = msg.hdr.from.clone();

        if msg.kind == KapType::Msg1 {
            return self.handle_msg1(env, msg, sender_key);
        }

        let Some(session) = self.sessions.get_mut(&peer) else {
            return Err(CoreError::kap(&peer, format!("{} without a session", msg.kind)));
        };

        let outcome = match msg.kind {
            KapType::Msg2 => session
                .handle_msg2(msg, entropy(env))
                .map(|msg3| vec![KapAction::Send(msg3)]),
            KapType::Msg3 => session.handle_msg3(msg).map(|(friendship, msg4)| {
                vec![KapAction::Established(friendship), KapAction::Send(msg4)]
            }),
            KapType::Msg4 => session.handle_msg4(msg).map(|f| vec![KapAction::Established(f)]),
            KapType::Msg1 => unreachable!("MSG1 handled above"),
        };

        match outcome {
            Ok(actions) => {
                if session.state().is_terminal() {
                    self.sessions.remove(&peer);
                    info!(owner = %self.owner, peer = %peer, "friendship established");
                } else {
                    debug!(peer = %peer, state = ?session.state(), "session advanced");
                }
                Ok(actions)
            },
            Err(error) => {
                self.sessions.remove(&peer);
                warn!(owner = %self.owner, peer = %peer, error = %error, "key agreement failed");
                Ok(vec![KapAction::Failed { peer, error }])
            },
        }
    }

    fn handle_msg1<E: Environment>(
        &mut self,
        env: &E,
        msg: &KapMessage,
        sender_key: Option<EccPubKey>,
    ) -> Result<Vec<KapAction>, CoreError> {
        let peer = &msg.hdr.from;
        if let Some(active) = self.sessions.get(peer) {
            // A fresh AFID from the initiator of our responder session means
            // it gave up on the old run.
            if active.role() == KapRole::Responder && active.a_id() != msg.hdr.afid {
                debug!(peer = %peer, "initiator restarted, replacing session");
                self.sessions.remove(peer);
            } else {
                debug!(peer = %peer, "ignoring MSG1 during active session");
                return Ok(Vec::new());
            }
        }
        let Some(peer_key) = sender_key else {
            return Err(CoreError::kap(peer, "sender identity unresolved"));
        };

        let contribution = AesKey::from_bytes(env.random_array());
        let (session, msg2) = KapSession::respond(
            self.identity.clone(),
            peer_key,
            msg,
            env.random_nonce(),
            contribution,
            entropy(env),
        )?;
        self.sessions.insert(peer.clone(), session);
        debug!(peer = %peer, "sent MSG2");
        Ok(vec![KapAction::Send(msg2)])
    }
}

fn entropy<E: Environment>(env: &E) -> StepEntropy {
    StepEntropy { ephemeral: env.random_array(), nonce: env.random_array() }
}

/// Fields each message type must carry.
fn check_shape(msg: &KapMessage) -> Result<(), ProtocolError> {
    match msg.kind {
        KapType::Msg1 => {
            msg.require_payload()?;
        },
        KapType::Msg2 | KapType::Msg3 => {
            msg.require_bfid()?;
            msg.require_payload()?;
            msg.signature.as_ref().ok_or(ProtocolError::MissingField("signature"))?;
        },
        KapType::Msg4 => {
            msg.require_bfid()?;
            msg.hmac.as_ref().ok_or(ProtocolError::MissingField("hmac"))?;
        },
    }
    Ok(())
}
