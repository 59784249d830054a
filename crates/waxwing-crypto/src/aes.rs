//! 256-bit symmetric keys with access-control state.
//!
//! An [`AesKey`] carries two principal sets next to its material:
//! `principals` (who may use the key) and `invalid` (principals whose
//! identity changed or expired since they were granted access). The
//! `invalid` set only ever grows; a revoked principal is cleared by
//! replacing the key.

use std::{collections::BTreeSet, fmt};

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{
    KeyError,
    encoding::{decode_hex, sha256_hex},
};

type HmacSha256 = Hmac<Sha256>;

/// Key size in bytes
pub const AES_KEY_SIZE: usize = 32;

/// Key size in bits
pub const AES_KEY_BITS: usize = AES_KEY_SIZE * 8;

/// AES-GCM nonce size (12 bytes)
pub const AES_NONCE_SIZE: usize = 12;

/// GCM tag size (16 bytes)
const GCM_TAG_SIZE: usize = 16;

/// Symmetric key used for conversations, KAP contributions and channel keys.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AesRecord", into = "AesRecord")]
pub struct AesKey {
    material: [u8; AES_KEY_SIZE],
    principals: BTreeSet<String>,
    invalid: BTreeSet<String>,
}

impl AesKey {
    /// Wrap raw key material. Both principal sets start empty.
    pub fn from_bytes(material: [u8; AES_KEY_SIZE]) -> Self {
        Self { material, principals: BTreeSet::new(), invalid: BTreeSet::new() }
    }

    /// Wrap key material of unchecked length.
    ///
    /// # Errors
    ///
    /// - `InvalidKey`: if `material` is not exactly 256 bits
    pub fn from_slice(material: &[u8]) -> Result<Self, KeyError> {
        let material: [u8; AES_KEY_SIZE] = material.try_into().map_err(|_| {
            KeyError::invalid_key(format!(
                "AES key must be {AES_KEY_BITS} bits, got {}",
                material.len() * 8
            ))
        })?;
        Ok(Self::from_bytes(material))
    }

    /// Parse hex-encoded key material.
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let mut bytes = decode_hex(text)?;
        let key = Self::from_slice(&bytes);
        bytes.zeroize();
        key
    }

    /// Parse base64-encoded key material.
    pub fn from_base64(text: &str) -> Result<Self, KeyError> {
        let mut bytes =
            STANDARD.decode(text).map_err(|e| KeyError::Encoding(format!("base64: {e}")))?;
        let key = Self::from_slice(&bytes);
        bytes.zeroize();
        key
    }

    /// Lowercase hex encoding of the key material.
    pub fn to_hex(&self) -> String {
        hex::encode(self.material)
    }

    /// Base64 encoding of the key material.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.material)
    }

    /// Raw key material.
    pub fn as_bytes(&self) -> &[u8; AES_KEY_SIZE] {
        &self.material
    }

    /// Key length in bits. Always 256.
    pub fn bits(&self) -> usize {
        AES_KEY_BITS
    }

    /// Principals allowed to use this key.
    pub fn principals(&self) -> &BTreeSet<String> {
        &self.principals
    }

    /// Whether `principal` is in the access set.
    pub fn has_principal(&self, principal: &str) -> bool {
        self.principals.contains(principal)
    }

    /// Grant `principal` access. Returns `false` if already present.
    pub fn add_principal(&mut self, principal: impl Into<String>) -> bool {
        self.principals.insert(principal.into())
    }

    /// Principals whose access has been revoked. Empty when the key is
    /// clean.
    pub fn invalid(&self) -> &BTreeSet<String> {
        &self.invalid
    }

    /// Whether any principal of this key has been revoked.
    pub fn is_invalid(&self) -> bool {
        !self.invalid.is_empty()
    }

    /// Revoke `principal`. Returns `false` if it was already revoked.
    pub fn invalidate(&mut self, principal: impl Into<String>) -> bool {
        self.invalid.insert(principal.into())
    }

    /// Lowercase hex SHA-256 of the key material.
    pub fn sha256(&self) -> String {
        sha256_hex(&self.material)
    }

    /// Lowercase hex HMAC-SHA256 of `data` under this key.
    pub fn hmac256(&self, data: &[u8]) -> String {
        hex::encode(self.hmac_bytes(data))
    }

    /// Check a hex HMAC-SHA256 tag in constant time.
    ///
    /// # Errors
    ///
    /// - `BadMac`: if the tag is malformed or does not match
    pub fn verify_hmac256(&self, data: &[u8], tag_hex: &str) -> Result<(), KeyError> {
        let tag = hex::decode(tag_hex).map_err(|_| KeyError::BadMac)?;
        let mut mac = self.mac();
        mac.update(data);
        mac.verify_slice(&tag).map_err(|_| KeyError::BadMac)
    }

    /// Derive an independent child key as HMAC-SHA256(self, label).
    ///
    /// The child inherits the parent's principals but starts with no
    /// revocations.
    pub fn derive_key(&self, label: &str) -> AesKey {
        let mut material = self.hmac_bytes(label.as_bytes());
        let mut child = AesKey::from_bytes(material);
        material.zeroize();
        child.principals.clone_from(&self.principals);
        child
    }

    /// Bitwise XOR with another key.
    pub fn xor_key(&self, other: &AesKey) -> Result<AesKey, KeyError> {
        self.xor_material(&other.material)
    }

    /// Bitwise XOR with raw material.
    ///
    /// # Errors
    ///
    /// - `IncompatibleKeys`: if `other` is not 256 bits
    pub fn xor_material(&self, other: &[u8]) -> Result<AesKey, KeyError> {
        if other.len() != AES_KEY_SIZE {
            return Err(KeyError::IncompatibleKeys {
                expected_bits: AES_KEY_BITS,
                actual_bits: other.len() * 8,
            });
        }

        let mut material = [0u8; AES_KEY_SIZE];
        for (out, (a, b)) in material.iter_mut().zip(self.material.iter().zip(other)) {
            *out = a ^ b;
        }

        let mut combined = AesKey::from_bytes(material);
        material.zeroize();
        combined.principals.clone_from(&self.principals);
        Ok(combined)
    }

    /// Encrypt UTF-8 text with AES-256-GCM.
    ///
    /// Output is `base64(nonce || ciphertext || tag)`. Caller MUST provide a
    /// fresh random nonce per encryption.
    pub fn encrypt_text(&self, plaintext: &str, nonce: [u8; AES_NONCE_SIZE]) -> String {
        let cipher = Aes256Gcm::new((&self.material).into());

        let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        else {
            unreachable!("AES-256-GCM encryption cannot fail with valid inputs");
        };

        let mut sealed = Vec::with_capacity(AES_NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        STANDARD.encode(sealed)
    }

    /// Decrypt text produced by [`encrypt_text`](Self::encrypt_text).
    ///
    /// # Errors
    ///
    /// - `Decryption`: malformed framing, wrong key, tampered ciphertext, or
    ///   non-UTF-8 plaintext
    pub fn decrypt_text(&self, sealed: &str) -> Result<String, KeyError> {
        let sealed = STANDARD.decode(sealed).map_err(|e| KeyError::decryption(e.to_string()))?;
        if sealed.len() < AES_NONCE_SIZE + GCM_TAG_SIZE {
            return Err(KeyError::decryption("ciphertext too short"));
        }

        let (nonce, ciphertext) = sealed.split_at(AES_NONCE_SIZE);
        let cipher = Aes256Gcm::new((&self.material).into());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| KeyError::decryption("authentication failed"))?;

        String::from_utf8(plaintext).map_err(|_| KeyError::decryption("plaintext is not UTF-8"))
    }

    fn mac(&self) -> HmacSha256 {
        let Ok(mac) = <HmacSha256 as Mac>::new_from_slice(&self.material) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac
    }

    fn hmac_bytes(&self, data: &[u8]) -> [u8; 32] {
        let mut mac = self.mac();
        mac.update(data);
        mac.finalize().into_bytes().into()
    }
}

impl Drop for AesKey {
    fn drop(&mut self) {
        self.material.zeroize();
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesKey")
            .field("principals", &self.principals)
            .field("invalid", &self.invalid)
            .finish_non_exhaustive()
    }
}

/// Stored form: `{key: base64, principals, invalid}`.
#[derive(Serialize, Deserialize)]
struct AesRecord {
    key: String,
    #[serde(default)]
    principals: BTreeSet<String>,
    #[serde(default)]
    invalid: BTreeSet<String>,
}

impl TryFrom<AesRecord> for AesKey {
    type Error = KeyError;

    fn try_from(record: AesRecord) -> Result<Self, Self::Error> {
        let mut key = AesKey::from_base64(&record.key)?;
        key.principals = record.principals;
        key.invalid = record.invalid;
        Ok(key)
    }
}

impl From<AesKey> for AesRecord {
    fn from(key: AesKey) -> Self {
        Self { key: key.to_base64(), principals: key.principals.clone(), invalid: key.invalid.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(fill: u8) -> AesKey {
        AesKey::from_bytes([fill; AES_KEY_SIZE])
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(AesKey::from_slice(&[0u8; 16]), Err(KeyError::InvalidKey { .. })));
        assert!(matches!(AesKey::from_hex("00ff"), Err(KeyError::InvalidKey { .. })));
        assert!(AesKey::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn hex_and_base64_roundtrip() {
        let original = key(0x5a);
        assert_eq!(AesKey::from_hex(&original.to_hex()).unwrap(), original);
        assert_eq!(AesKey::from_base64(&original.to_base64()).unwrap(), original);
    }

    #[test]
    fn xor_rejects_mismatched_lengths() {
        let result = key(1).xor_material(&[0u8; 16]);
        assert_eq!(
            result.unwrap_err(),
            KeyError::IncompatibleKeys { expected_bits: 256, actual_bits: 128 }
        );
    }

    #[test]
    fn xor_with_self_is_zero() {
        let k = key(0xa7);
        assert_eq!(k.xor_key(&k).unwrap().as_bytes(), &[0u8; AES_KEY_SIZE]);
    }

    #[test]
    fn derived_keys_are_label_separated() {
        let mut parent = key(9);
        parent.add_principal("alice");

        let mac = parent.derive_key("mac");
        let enc = parent.derive_key("enc");

        assert_ne!(mac.as_bytes(), enc.as_bytes());
        assert_ne!(mac.as_bytes(), parent.as_bytes());
        assert_eq!(mac, parent.derive_key("mac"));
        assert!(mac.has_principal("alice"));
    }

    #[test]
    fn hmac_verifies_and_rejects_tamper() {
        let k = key(3);
        let tag = k.hmac256(b"payload");
        assert_eq!(tag.len(), 64);

        assert!(k.verify_hmac256(b"payload", &tag).is_ok());
        assert_eq!(k.verify_hmac256(b"payloaD", &tag), Err(KeyError::BadMac));
        assert_eq!(key(4).verify_hmac256(b"payload", &tag), Err(KeyError::BadMac));
        assert_eq!(k.verify_hmac256(b"payload", "not hex"), Err(KeyError::BadMac));
    }

    #[test]
    fn encrypt_decrypt_text() {
        let k = key(7);
        let sealed = k.encrypt_text("hello waxwing", [1u8; AES_NONCE_SIZE]);
        assert_eq!(k.decrypt_text(&sealed).unwrap(), "hello waxwing");
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let sealed = key(7).encrypt_text("secret", [2u8; AES_NONCE_SIZE]);
        assert!(matches!(key(8).decrypt_text(&sealed), Err(KeyError::Decryption { .. })));
    }

    #[test]
    fn decrypt_rejects_short_input() {
        let short = STANDARD.encode([0u8; 10]);
        assert!(matches!(key(1).decrypt_text(&short), Err(KeyError::Decryption { .. })));
    }

    #[test]
    fn invalidation_is_monotonic() {
        let mut k = key(1);
        assert!(!k.is_invalid());
        assert!(k.invalidate("bob"));
        assert!(!k.invalidate("bob"));
        assert!(k.is_invalid());
        assert_eq!(k.invalid().iter().collect::<Vec<_>>(), vec!["bob"]);
    }

    #[test]
    fn debug_hides_material() {
        let rendered = format!("{:?}", key(0xab));
        assert!(!rendered.contains("ab, ab"));
        assert!(!rendered.contains(&key(0xab).to_hex()));
    }
}
