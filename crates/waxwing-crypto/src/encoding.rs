//! Hashing and text encodings shared by the key types.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::KeyError;

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compare two hex digests without early exit.
///
/// Case-insensitive. Digests of different length never match.
pub fn digests_match(expected: &str, actual: &str) -> bool {
    let expected = expected.to_ascii_lowercase();
    let actual = actual.to_ascii_lowercase();
    expected.len() == actual.len() && bool::from(expected.as_bytes().ct_eq(actual.as_bytes()))
}

pub(crate) fn decode_hex(text: &str) -> Result<Vec<u8>, KeyError> {
    hex::decode(text).map_err(|e| KeyError::Encoding(format!("hex: {e}")))
}

pub(crate) fn decode_hex_array<const N: usize>(text: &str) -> Result<[u8; N], KeyError> {
    let bytes = decode_hex(text)?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| KeyError::invalid_key(format!("expected {N} bytes, got {}", v.len())))
}
