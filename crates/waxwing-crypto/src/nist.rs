//! NIST P-256 keys: ECDSA signatures, ECDH key wrapping.

use std::fmt;

use p256::{
    PublicKey, SecretKey,
    ecdh::diffie_hellman,
    ecdsa::{
        Signature, SigningKey, VerifyingKey,
        signature::{Signer, Verifier},
    },
    elliptic_curve::sec1::ToEncodedPoint,
};
use serde::{Deserialize, Serialize};

use crate::{
    AesKey, Decapsulate, EPHEMERAL_SIZE, Encapsulate, KEM_NONCE_SIZE, KeyError, MinifiedKey, Sign,
    Verify,
    encoding::{decode_hex, decode_hex_array},
    kem,
    record::{KeyPairRecord, PublicKeyRecord},
};

/// Public half of a P-256 identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PublicKeyRecord", into = "PublicKeyRecord")]
pub struct PubKey {
    sign: PublicKey,
    encrypt: PublicKey,
    valid: bool,
}

impl PubKey {
    /// Parse SEC1-encoded points (compressed or uncompressed).
    pub fn from_sec1(sign: &[u8], encrypt: &[u8]) -> Result<Self, KeyError> {
        Ok(Self { sign: parse_point(sign)?, encrypt: parse_point(encrypt)?, valid: true })
    }

    /// Compressed SEC1 hex encodings of both points.
    pub fn minify(&self) -> MinifiedKey {
        MinifiedKey { encrypt: point_hex(&self.encrypt), sign: point_hex(&self.sign) }
    }

    /// Rebuild from [`minify`](Self::minify) output.
    pub fn unminify(minified: &MinifiedKey) -> Result<Self, KeyError> {
        Self::from_sec1(&decode_hex(&minified.sign)?, &decode_hex(&minified.encrypt)?)
    }

    /// Same key material, ignoring the validity flag.
    pub fn same_key(&self, other: &PubKey) -> bool {
        self.sign == other.sign && self.encrypt == other.encrypt
    }

    /// Whether this identity is still considered usable.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Mark the identity usable or not.
    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }
}

impl Verify for PubKey {
    fn verify_signature(&self, message: &[u8], signature: &str) -> Result<(), KeyError> {
        let bytes = decode_hex(signature).map_err(|_| KeyError::BadSignature)?;
        let signature = Signature::from_slice(&bytes).map_err(|_| KeyError::BadSignature)?;
        VerifyingKey::from(&self.sign).verify(message, &signature).map_err(|_| KeyError::BadSignature)
    }
}

impl Encapsulate for PubKey {
    fn encapsulate(
        &self,
        key: &AesKey,
        ephemeral: [u8; EPHEMERAL_SIZE],
        nonce: [u8; KEM_NONCE_SIZE],
    ) -> Result<String, KeyError> {
        let secret = SecretKey::from_slice(&ephemeral)
            .map_err(|_| KeyError::invalid_key("ephemeral is not a valid P-256 scalar"))?;
        let ephemeral_public = secret.public_key().to_encoded_point(true);
        let recipient = self.encrypt.to_encoded_point(true);
        let shared = diffie_hellman(secret.to_nonzero_scalar(), self.encrypt.as_affine());

        Ok(kem::seal(
            shared.raw_secret_bytes().as_slice(),
            ephemeral_public.as_bytes(),
            recipient.as_bytes(),
            key,
            nonce,
        ))
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PubKey")
            .field("identity", &self.minify().to_string())
            .field("valid", &self.valid)
            .finish()
    }
}

/// Full P-256 identity: signing and decryption scalars.
#[derive(Clone)]
pub struct KeyPair {
    sign: SecretKey,
    encrypt: SecretKey,
}

impl KeyPair {
    /// Build from two 32-byte big-endian scalars.
    ///
    /// # Errors
    ///
    /// - `InvalidKey`: a scalar is zero or not below the group order
    pub fn from_secrets(sign: [u8; 32], encrypt: [u8; 32]) -> Result<Self, KeyError> {
        Ok(Self { sign: parse_scalar(&sign)?, encrypt: parse_scalar(&encrypt)? })
    }

    /// Public half.
    pub fn public(&self) -> PubKey {
        PubKey { sign: self.sign.public_key(), encrypt: self.encrypt.public_key(), valid: true }
    }
}

impl Sign for KeyPair {
    fn sign(&self, message: &[u8]) -> String {
        let signature: Signature = SigningKey::from(&self.sign).sign(message);
        hex::encode(signature.to_bytes())
    }
}

impl Verify for KeyPair {
    fn verify_signature(&self, message: &[u8], signature: &str) -> Result<(), KeyError> {
        self.public().verify_signature(message, signature)
    }
}

impl Encapsulate for KeyPair {
    fn encapsulate(
        &self,
        key: &AesKey,
        ephemeral: [u8; EPHEMERAL_SIZE],
        nonce: [u8; KEM_NONCE_SIZE],
    ) -> Result<String, KeyError> {
        self.public().encapsulate(key, ephemeral, nonce)
    }
}

impl Decapsulate for KeyPair {
    fn decapsulate(&self, wrapped: &str) -> Result<AesKey, KeyError> {
        let (ephemeral, body) = kem::split(wrapped)?;
        let ephemeral_public =
            PublicKey::from_sec1_bytes(&ephemeral).map_err(|_| KeyError::decryption("bad ephemeral"))?;
        let shared = diffie_hellman(self.encrypt.to_nonzero_scalar(), ephemeral_public.as_affine());
        let recipient = self.encrypt.public_key().to_encoded_point(true);

        kem::open(shared.raw_secret_bytes().as_slice(), &ephemeral, recipient.as_bytes(), &body)
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.sign.to_bytes() == other.sign.to_bytes()
            && self.encrypt.to_bytes() == other.encrypt.to_bytes()
    }
}

impl Eq for KeyPair {}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public().minify().to_string())
            .finish_non_exhaustive()
    }
}

fn parse_point(bytes: &[u8]) -> Result<PublicKey, KeyError> {
    PublicKey::from_sec1_bytes(bytes).map_err(|_| KeyError::invalid_key("not a P-256 point"))
}

fn parse_scalar(bytes: &[u8]) -> Result<SecretKey, KeyError> {
    SecretKey::from_slice(bytes).map_err(|_| KeyError::invalid_key("not a valid P-256 scalar"))
}

fn point_hex(point: &PublicKey) -> String {
    hex::encode(point.to_encoded_point(true).as_bytes())
}

impl TryFrom<PublicKeyRecord> for PubKey {
    type Error = KeyError;

    fn try_from(record: PublicKeyRecord) -> Result<Self, Self::Error> {
        let mut key =
            Self::from_sec1(&decode_hex(&record.sign.public)?, &decode_hex(&record.encrypt.public)?)?;
        key.valid = record.valid;
        Ok(key)
    }
}

impl From<PubKey> for PublicKeyRecord {
    fn from(key: PubKey) -> Self {
        let minified = key.minify();
        PublicKeyRecord::new(minified.sign, minified.encrypt, key.valid)
    }
}

impl TryFrom<KeyPairRecord> for KeyPair {
    type Error = KeyError;

    fn try_from(record: KeyPairRecord) -> Result<Self, Self::Error> {
        Self::from_secrets(
            decode_hex_array::<32>(&record.sign.secret)?,
            decode_hex_array::<32>(&record.encrypt.secret)?,
        )
    }
}

impl Serialize for KeyPair {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        KeyPairRecord::new(hex::encode(self.sign.to_bytes()), hex::encode(self.encrypt.to_bytes()))
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for KeyPair {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = KeyPairRecord::deserialize(deserializer)?;
        KeyPair::try_from(record).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(seed: u8) -> KeyPair {
        let mut sign = [seed; 32];
        sign[0] = 0x01;
        let mut encrypt = [seed.wrapping_add(1); 32];
        encrypt[0] = 0x02;
        KeyPair::from_secrets(sign, encrypt).unwrap()
    }

    fn ephemeral(seed: u8) -> [u8; 32] {
        let mut bytes = [seed; 32];
        bytes[0] = 0x03;
        bytes
    }

    #[test]
    fn rejects_zero_scalar() {
        assert!(matches!(KeyPair::from_secrets([0; 32], [1; 32]), Err(KeyError::InvalidKey { .. })));
    }

    #[test]
    fn sign_verify() {
        let key = pair(7);
        let signature = key.sign(b"directory record");
        assert!(key.public().verify_signature(b"directory record", &signature).is_ok());
        assert_eq!(
            key.public().verify_signature(b"directory recorD", &signature),
            Err(KeyError::BadSignature)
        );
        assert_eq!(
            pair(8).public().verify_signature(b"directory record", &signature),
            Err(KeyError::BadSignature)
        );
    }

    #[test]
    fn encapsulate_decapsulate() {
        let key = pair(11);
        let secret = AesKey::from_bytes([0x5c; 32]);
        let wrapped = key.public().encapsulate(&secret, ephemeral(4), [6; KEM_NONCE_SIZE]).unwrap();
        assert_eq!(key.decapsulate(&wrapped).unwrap(), secret);
        assert!(pair(12).decapsulate(&wrapped).is_err());
    }

    #[test]
    fn minify_roundtrip() {
        let public = pair(21).public();
        let minified = public.minify();
        assert_eq!(minified.sign.len(), 66);
        assert!(PubKey::unminify(&minified).unwrap().same_key(&public));
    }
}
