//! Key type errors.

use thiserror::Error;

/// Errors produced by key construction, parsing, and cryptographic checks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Record carries a discriminant no key variant is registered for
    #[error("unknown key record type: {0}")]
    UnknownTag(String),

    /// Record decoded fine but is a different variant than requested
    #[error("expected {expected} record, found {found}")]
    TypeMismatch {
        /// Tag the caller asked for
        expected: &'static str,
        /// Tag actually stored
        found: &'static str,
    },

    /// Key material has the wrong size or is not a valid curve point/scalar
    #[error("invalid key material: {reason}")]
    InvalidKey {
        /// What was wrong with the material
        reason: String,
    },

    /// XOR combination of keys with different bit lengths
    #[error("incompatible key sizes: expected {expected_bits} bits, got {actual_bits}")]
    IncompatibleKeys {
        /// Bit length of the left operand
        expected_bits: usize,
        /// Bit length of the right operand
        actual_bits: usize,
    },

    /// Signature did not verify under the given public key
    #[error("signature verification failed")]
    BadSignature,

    /// Keyed hash did not match
    #[error("hmac verification failed")]
    BadMac,

    /// Ciphertext could not be opened (tamper, wrong key, malformed framing)
    #[error("decryption failed: {reason}")]
    Decryption {
        /// Failure detail
        reason: String,
    },

    /// Record or text encoding could not be produced or parsed
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl KeyError {
    /// Whether this error means the input was forged or tampered with, as
    /// opposed to being malformed.
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Self::BadSignature | Self::BadMac | Self::Decryption { .. })
    }

    pub(crate) fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey { reason: reason.into() }
    }

    pub(crate) fn decryption(reason: impl Into<String>) -> Self {
        Self::Decryption { reason: reason.into() }
    }
}
