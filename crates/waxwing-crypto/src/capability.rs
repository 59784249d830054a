//! Capability traits for asymmetric keys.
//!
//! Public-only keys implement [`Verify`] and [`Encapsulate`]. Key pairs also
//! implement [`Sign`] and [`Decapsulate`]. Code that needs a capability
//! bounds on the trait rather than on a concrete key family.

use std::{fmt, str::FromStr};

use crate::{AesKey, EPHEMERAL_SIZE, KEM_NONCE_SIZE, KeyError};

/// Check signatures produced by the matching [`Sign`] key.
pub trait Verify {
    /// Verify a hex-encoded signature over `message`.
    ///
    /// # Errors
    ///
    /// - `BadSignature`: signature malformed or not produced by this key
    fn verify_signature(&self, message: &[u8], signature: &str) -> Result<(), KeyError>;
}

/// Produce signatures. Output is lowercase hex.
pub trait Sign {
    /// Sign `message`.
    fn sign(&self, message: &[u8]) -> String;
}

/// Wrap a symmetric key so only the holder of the matching private key can
/// recover it.
pub trait Encapsulate {
    /// Wrap `key` for this public key.
    ///
    /// `ephemeral` seeds the one-time key agreement secret and `nonce` the
    /// AEAD; both MUST come from a cryptographically secure RNG.
    ///
    /// # Errors
    ///
    /// - `InvalidKey`: `ephemeral` is not a usable secret for this curve, or
    ///   the recipient key is degenerate
    fn encapsulate(
        &self,
        key: &AesKey,
        ephemeral: [u8; EPHEMERAL_SIZE],
        nonce: [u8; KEM_NONCE_SIZE],
    ) -> Result<String, KeyError>;
}

/// Recover symmetric keys wrapped by [`Encapsulate`].
pub trait Decapsulate {
    /// Unwrap a key produced by `encapsulate` on the matching public key.
    ///
    /// # Errors
    ///
    /// - `Decryption`: malformed framing, wrong recipient, or tampering
    fn decapsulate(&self, wrapped: &str) -> Result<AesKey, KeyError>;
}

/// Compact public identity: hex encodings of the encryption and signing
/// points.
///
/// The wire form is `encrypt ":" sign`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MinifiedKey {
    /// Encryption point, hex
    pub encrypt: String,
    /// Signing point, hex
    pub sign: String,
}

impl fmt::Display for MinifiedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.encrypt, self.sign)
    }
}

impl FromStr for MinifiedKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((encrypt, sign)) = s.split_once(':') else {
            return Err(KeyError::Encoding(format!("minified key missing separator: {s}")));
        };
        if encrypt.is_empty() || sign.is_empty() || sign.contains(':') {
            return Err(KeyError::Encoding(format!("malformed minified key: {s}")));
        }
        Ok(Self { encrypt: encrypt.to_string(), sign: sign.to_string() })
    }
}
