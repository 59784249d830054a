//! Key agreement wire messages.
//!
//! ```text
//! A                                   B
//! │ MSG1 {AFID}, sha256(contribA)     │
//! │──────────────────────────────────▶│
//! │ MSG2 {AFID,BFID}, enc_A(contribB) │  signed by B
//! │◀──────────────────────────────────│
//! │ MSG3 {AFID,BFID}, enc_B(contribA) │  signed by A
//! │──────────────────────────────────▶│
//! │ MSG4 {AFID,BFID}                  │  HMAC(fMac)
//! │◀──────────────────────────────────│
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, Result};

/// Version of the canonical signing encoding produced by
/// [`KapMessage::canonical`].
pub const CANONICAL_VERSION: u32 = 1;

/// The four protocol steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KapType {
    /// Initiator commitment
    #[serde(rename = "MSG1")]
    Msg1,
    /// Responder contribution, signed
    #[serde(rename = "MSG2")]
    Msg2,
    /// Initiator reveal, signed
    #[serde(rename = "MSG3")]
    Msg3,
    /// Responder confirmation, HMAC'd
    #[serde(rename = "MSG4")]
    Msg4,
}

impl KapType {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Msg1 => "MSG1",
            Self::Msg2 => "MSG2",
            Self::Msg3 => "MSG3",
            Self::Msg4 => "MSG4",
        }
    }

    /// Parse a wire name.
    ///
    /// # Errors
    ///
    /// - `UnknownType`: not one of `MSG1`..`MSG4`
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "MSG1" => Ok(Self::Msg1),
            "MSG2" => Ok(Self::Msg2),
            "MSG3" => Ok(Self::Msg3),
            "MSG4" => Ok(Self::Msg4),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for KapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing and binding header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KapHeader {
    /// Recipient principal
    pub to: String,
    /// Sender principal
    pub from: String,
    /// Initiator nonce
    #[serde(rename = "AFID")]
    pub afid: String,
    /// Responder nonce, absent in MSG1
    #[serde(rename = "BFID", default, skip_serializing_if = "Option::is_none")]
    pub bfid: Option<String>,
}

/// One key agreement message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KapMessage {
    /// Protocol step
    #[serde(rename = "type")]
    pub kind: KapType,
    /// Header
    pub hdr: KapHeader,
    /// Commitment (MSG1) or encapsulated contribution (MSG2, MSG3)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Signature over the canonical encoding (MSG2, MSG3)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// HMAC over the canonical encoding (MSG4)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

impl KapMessage {
    /// MSG1: commit to the initiator contribution.
    pub fn msg1(to: &str, from: &str, afid: &str, commitment: String) -> Self {
        Self::unsigned(KapType::Msg1, to, from, afid, None, Some(commitment))
    }

    /// MSG2: responder contribution, to be signed.
    pub fn msg2(to: &str, from: &str, afid: &str, bfid: &str, wrapped: String) -> Self {
        Self::unsigned(KapType::Msg2, to, from, afid, Some(bfid), Some(wrapped))
    }

    /// MSG3: initiator reveal, to be signed.
    pub fn msg3(to: &str, from: &str, afid: &str, bfid: &str, wrapped: String) -> Self {
        Self::unsigned(KapType::Msg3, to, from, afid, Some(bfid), Some(wrapped))
    }

    /// MSG4: confirmation, to be HMAC'd. Carries no payload.
    pub fn msg4(to: &str, from: &str, afid: &str, bfid: &str) -> Self {
        Self::unsigned(KapType::Msg4, to, from, afid, Some(bfid), None)
    }

    fn unsigned(
        kind: KapType,
        to: &str,
        from: &str,
        afid: &str,
        bfid: Option<&str>,
        payload: Option<String>,
    ) -> Self {
        Self {
            kind,
            hdr: KapHeader {
                to: to.to_string(),
                from: from.to_string(),
                afid: afid.to_string(),
                bfid: bfid.map(str::to_string),
            },
            payload,
            signature: None,
            hmac: None,
        }
    }

    /// Attach a signature.
    #[must_use]
    pub fn with_signature(mut self, signature: String) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Attach an HMAC.
    #[must_use]
    pub fn with_hmac(mut self, hmac: String) -> Self {
        self.hmac = Some(hmac);
        self
    }

    /// Canonical encoding (version [`CANONICAL_VERSION`]):
    /// `[type, to, from, AFID, BFID|"", payload|""]` as a JSON array.
    ///
    /// Signature and HMAC fields are never part of the encoding.
    pub fn canonical(&self) -> String {
        encode_fields(&[
            self.kind.as_str(),
            &self.hdr.to,
            &self.hdr.from,
            &self.hdr.afid,
            self.hdr.bfid.as_deref().unwrap_or(""),
            self.payload.as_deref().unwrap_or(""),
        ])
    }

    /// Serialize as a JSON object.
    pub fn to_json(&self) -> String {
        let Ok(json) = serde_json::to_string(self) else {
            unreachable!("KapMessage contains only strings");
        };
        json
    }

    /// Parse and shape-check a JSON object.
    ///
    /// # Errors
    ///
    /// - `Malformed`: not JSON, or fields of the wrong JSON type
    /// - `MissingField`: `hdr`, `hdr.to`, `hdr.from` or `hdr.AFID` absent
    /// - `UnknownType`: `type` absent or not `MSG1`..`MSG4`
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawKapMessage = serde_json::from_str(json)?;
        Self::try_from(raw)
    }

    /// BFID, or `MissingField` when absent.
    pub fn require_bfid(&self) -> Result<&str> {
        self.hdr.bfid.as_deref().ok_or(ProtocolError::MissingField("hdr.BFID"))
    }

    /// Payload, or `MissingField` when absent.
    pub fn require_payload(&self) -> Result<&str> {
        self.payload.as_deref().ok_or(ProtocolError::MissingField("payload"))
    }
}

/// Encode strings as a compact JSON array.
pub(crate) fn encode_fields(fields: &[&str]) -> String {
    let Ok(encoded) = serde_json::to_string(fields) else {
        unreachable!("string arrays always serialize");
    };
    encoded
}

/// Lenient shape used to report precise validation errors.
#[derive(Deserialize)]
struct RawKapMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    hdr: Option<RawKapHeader>,
    payload: Option<String>,
    signature: Option<String>,
    hmac: Option<String>,
}

#[derive(Deserialize)]
struct RawKapHeader {
    to: Option<String>,
    from: Option<String>,
    #[serde(rename = "AFID")]
    afid: Option<String>,
    #[serde(rename = "BFID")]
    bfid: Option<String>,
}

impl TryFrom<RawKapMessage> for KapMessage {
    type Error = ProtocolError;

    fn try_from(raw: RawKapMessage) -> Result<Self> {
        let hdr = raw.hdr.ok_or(ProtocolError::MissingField("hdr"))?;
        let to = hdr.to.ok_or(ProtocolError::MissingField("hdr.to"))?;
        let from = hdr.from.ok_or(ProtocolError::MissingField("hdr.from"))?;
        let afid = hdr.afid.ok_or(ProtocolError::MissingField("hdr.AFID"))?;
        let kind = KapType::parse(raw.kind.as_deref().unwrap_or(""))?;

        Ok(Self {
            kind,
            hdr: KapHeader { to, from, afid, bfid: hdr.bfid },
            payload: raw.payload,
            signature: raw.signature,
            hmac: raw.hmac,
        })
    }
}
