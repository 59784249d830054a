//! Conversation key invitations sent over an established friendship.

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, Result, kap::encode_fields};

/// Wire name of an invite.
pub const INVITE_TYPE: &str = "INVITE";

/// Invite header. The nonces identify the friendship on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteHeader {
    /// Inviting principal
    pub from: String,
    /// Invited principal
    pub to: String,
    /// Initiator nonce of the friendship
    #[serde(rename = "AFID")]
    pub afid: String,
    /// Responder nonce of the friendship
    #[serde(rename = "BFID")]
    pub bfid: String,
}

/// Conversation being shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitePayload {
    /// Signed conversation id
    pub convid: String,
    /// Conversation key encrypted under the friendship's fEnc
    pub convkey: String,
}

/// Invite message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteMessage {
    /// Always [`INVITE_TYPE`] when well-formed
    #[serde(rename = "type")]
    pub kind: String,
    /// Header
    pub hdr: InviteHeader,
    /// Conversation id and wrapped key
    pub payload: InvitePayload,
    /// HMAC over the canonical encoding under fMac
    #[serde(default)]
    pub hmac: String,
}

impl InviteMessage {
    /// Unauthenticated invite; attach the HMAC with [`with_hmac`](Self::with_hmac).
    pub fn new(hdr: InviteHeader, payload: InvitePayload) -> Self {
        Self { kind: INVITE_TYPE.to_string(), hdr, payload, hmac: String::new() }
    }

    /// Attach the HMAC.
    #[must_use]
    pub fn with_hmac(mut self, hmac: String) -> Self {
        self.hmac = hmac;
        self
    }

    /// `[type, to, from, AFID, BFID, convid, convkey]` as a JSON array.
    pub fn canonical(&self) -> String {
        encode_fields(&[
            &self.kind,
            &self.hdr.to,
            &self.hdr.from,
            &self.hdr.afid,
            &self.hdr.bfid,
            &self.payload.convid,
            &self.payload.convkey,
        ])
    }

    /// Reject anything that is not an invite.
    ///
    /// # Errors
    ///
    /// - `UnknownType`: `type` is not [`INVITE_TYPE`]
    pub fn check_type(&self) -> Result<()> {
        if self.kind == INVITE_TYPE {
            Ok(())
        } else {
            Err(ProtocolError::UnknownType(self.kind.clone()))
        }
    }

    /// Serialize as a JSON object.
    pub fn to_json(&self) -> String {
        let Ok(json) = serde_json::to_string(self) else {
            unreachable!("InviteMessage contains only strings");
        };
        json
    }

    /// Parse a JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
