//! Identity publication records.
//!
//! An identity is published as three posts sharing one timestamp:
//!
//! ```text
//! #encryptkey <ts> <encrypt-key-hex>
//! #signkey <ts> <sign-key-hex>
//! #keysig <ts> <expiration> <signature-hex>
//! ```
//!
//! Timestamps and expirations are Unix milliseconds.

use std::fmt;

use crate::{ProtocolError, Result};

/// Marker of the encryption key post
pub const ENCRYPT_KEY_MARKER: &str = "#encryptkey";

/// Marker of the signing key post
pub const SIGN_KEY_MARKER: &str = "#signkey";

/// Marker of the signature post
pub const KEY_SIGNATURE_MARKER: &str = "#keysig";

/// One bulletin board post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardRecord {
    /// `#encryptkey <ts> <key>`
    EncryptKey {
        /// Publication timestamp
        timestamp: u64,
        /// Encryption key, hex
        key: String,
    },
    /// `#signkey <ts> <key>`
    SignKey {
        /// Publication timestamp
        timestamp: u64,
        /// Signing key, hex
        key: String,
    },
    /// `#keysig <ts> <expiration> <signature>`
    Signature {
        /// Publication timestamp
        timestamp: u64,
        /// Expiration timestamp
        expiration: u64,
        /// Signature over the publication, hex
        signature: String,
    },
}

impl BoardRecord {
    /// Parse a post.
    ///
    /// # Errors
    ///
    /// - `MalformedRecord`: unknown marker, wrong token count, or
    ///   non-numeric timestamp
    pub fn parse(text: &str) -> Result<Self> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.as_slice() {
            [ENCRYPT_KEY_MARKER, ts, key] => {
                Ok(Self::EncryptKey { timestamp: parse_millis(ts)?, key: (*key).to_string() })
            },
            [SIGN_KEY_MARKER, ts, key] => {
                Ok(Self::SignKey { timestamp: parse_millis(ts)?, key: (*key).to_string() })
            },
            [KEY_SIGNATURE_MARKER, ts, exp, signature] => Ok(Self::Signature {
                timestamp: parse_millis(ts)?,
                expiration: parse_millis(exp)?,
                signature: (*signature).to_string(),
            }),
            _ => Err(ProtocolError::MalformedRecord(text.to_string())),
        }
    }

    /// Publication timestamp shared by the three posts.
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::EncryptKey { timestamp, .. }
            | Self::SignKey { timestamp, .. }
            | Self::Signature { timestamp, .. } => *timestamp,
        }
    }

    /// Marker this record starts with.
    pub fn marker(&self) -> &'static str {
        match self {
            Self::EncryptKey { .. } => ENCRYPT_KEY_MARKER,
            Self::SignKey { .. } => SIGN_KEY_MARKER,
            Self::Signature { .. } => KEY_SIGNATURE_MARKER,
        }
    }
}

impl fmt::Display for BoardRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncryptKey { timestamp, key } | Self::SignKey { timestamp, key } => {
                write!(f, "{} {timestamp} {key}", self.marker())
            },
            Self::Signature { timestamp, expiration, signature } => {
                write!(f, "{} {timestamp} {expiration} {signature}", self.marker())
            },
        }
    }
}

fn parse_millis(token: &str) -> Result<u64> {
    token.parse().map_err(|_| ProtocolError::MalformedRecord(format!("bad timestamp: {token}")))
}

/// A complete published identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationRecord {
    /// Encryption key, hex
    pub encrypt_key: String,
    /// Signing key, hex
    pub sign_key: String,
    /// Publication time (Unix ms)
    pub timestamp: u64,
    /// Expiration time (Unix ms)
    pub expiration: u64,
    /// Signature over [`signed_message`](Self::signed_message), hex
    pub signature: String,
}

impl PublicationRecord {
    /// The exact bytes the signature covers: plain concatenation of username,
    /// platform id, both keys, timestamp and expiration.
    pub fn signed_message(
        username: &str,
        platform_id: &str,
        encrypt_key: &str,
        sign_key: &str,
        timestamp: u64,
        expiration: u64,
    ) -> String {
        format!("{username}{platform_id}{encrypt_key}{sign_key}{timestamp}{expiration}")
    }

    /// Signature input for this record.
    pub fn signing_input(&self, username: &str, platform_id: &str) -> String {
        Self::signed_message(
            username,
            platform_id,
            &self.encrypt_key,
            &self.sign_key,
            self.timestamp,
            self.expiration,
        )
    }

    /// The three posts, in posting order.
    pub fn posts(&self) -> [BoardRecord; 3] {
        [
            BoardRecord::EncryptKey { timestamp: self.timestamp, key: self.encrypt_key.clone() },
            BoardRecord::SignKey { timestamp: self.timestamp, key: self.sign_key.clone() },
            BoardRecord::Signature {
                timestamp: self.timestamp,
                expiration: self.expiration,
                signature: self.signature.clone(),
            },
        ]
    }

    /// Assemble from the three posts of one publication.
    ///
    /// # Errors
    ///
    /// - `MalformedRecord`: a post has the wrong marker or the timestamps
    ///   disagree
    pub fn from_posts(encrypt: &BoardRecord, sign: &BoardRecord, sig: &BoardRecord) -> Result<Self> {
        match (encrypt, sign, sig) {
            (
                BoardRecord::EncryptKey { timestamp: t1, key: encrypt_key },
                BoardRecord::SignKey { timestamp: t2, key: sign_key },
                BoardRecord::Signature { timestamp: t3, expiration, signature },
            ) if t1 == t2 && t2 == t3 => Ok(Self {
                encrypt_key: encrypt_key.clone(),
                sign_key: sign_key.clone(),
                timestamp: *t1,
                expiration: *expiration,
                signature: signature.clone(),
            }),
            _ => Err(ProtocolError::MalformedRecord("posts do not form one publication".into())),
        }
    }

    /// Past its expiration at `now_ms`.
    pub fn is_stale(&self, now_ms: u64) -> bool {
        now_ms > self.expiration
    }

    /// Milliseconds since publication. Zero if the timestamp is in the
    /// future.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PublicationRecord {
        PublicationRecord {
            encrypt_key: "e1".into(),
            sign_key: "s1".into(),
            timestamp: 1_000,
            expiration: 5_000,
            signature: "ab".into(),
        }
    }

    #[test]
    fn post_text() {
        let [enc, sign, sig] = record().posts().map(|post| post.to_string());
        assert_eq!(enc, "#encryptkey 1000 e1");
        assert_eq!(sign, "#signkey 1000 s1");
        assert_eq!(sig, "#keysig 1000 5000 ab");
    }

    #[test]
    fn parse_posts_back() {
        let posts = record().posts();
        let parsed: Vec<_> =
            posts.iter().map(|post| BoardRecord::parse(&post.to_string()).unwrap()).collect();
        assert_eq!(parsed, posts.to_vec());
        assert_eq!(PublicationRecord::from_posts(&parsed[0], &parsed[1], &parsed[2]).unwrap(), record());
    }

    #[test]
    fn parse_rejects_wrong_token_counts() {
        assert!(BoardRecord::parse("#encryptkey 1000").is_err());
        assert!(BoardRecord::parse("#signkey 1000 a b").is_err());
        assert!(BoardRecord::parse("#keysig 1000 ab").is_err());
        assert!(BoardRecord::parse("#keysig x 1000 ab").is_err());
        assert!(BoardRecord::parse("just chatting").is_err());
    }

    #[test]
    fn mismatched_timestamps_do_not_assemble() {
        let [enc, _, sig] = record().posts();
        let sign = BoardRecord::SignKey { timestamp: 999, key: "s1".into() };
        assert!(PublicationRecord::from_posts(&enc, &sign, &sig).is_err());
    }

    #[test]
    fn signed_message_concatenation() {
        assert_eq!(record().signing_input("alice", "42"), "alice42e1s110005000");
    }

    #[test]
    fn staleness_boundary() {
        assert!(!record().is_stale(5_000));
        assert!(record().is_stale(5_001));
        assert_eq!(record().age_ms(500), 0);
        assert_eq!(record().age_ms(1_500), 500);
    }
}
