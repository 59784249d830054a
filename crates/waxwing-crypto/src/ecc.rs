//! Curve25519 identity keys: Ed25519 signatures, X25519 key wrapping.
//!
//! This is the identity family published to the bulletin board and used by
//! KAP.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::{
    AesKey, Decapsulate, EPHEMERAL_SIZE, Encapsulate, KEM_NONCE_SIZE, KeyError, MinifiedKey, Sign,
    Verify,
    encoding::decode_hex_array,
    kem,
    record::{KeyPairRecord, PublicKeyRecord},
};

/// Public half of a Curve25519 identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PublicKeyRecord", into = "PublicKeyRecord")]
pub struct EccPubKey {
    sign: VerifyingKey,
    encrypt: X25519Public,
    valid: bool,
}

impl EccPubKey {
    /// Build from raw points.
    ///
    /// # Errors
    ///
    /// - `InvalidKey`: `sign` is not a valid Ed25519 point
    pub fn from_bytes(sign: &[u8; 32], encrypt: [u8; 32]) -> Result<Self, KeyError> {
        let sign = VerifyingKey::from_bytes(sign).map_err(|e| KeyError::invalid_key(e.to_string()))?;
        Ok(Self { sign, encrypt: X25519Public::from(encrypt), valid: true })
    }

    /// Hex encodings of both points.
    pub fn minify(&self) -> MinifiedKey {
        MinifiedKey {
            encrypt: hex::encode(self.encrypt.as_bytes()),
            sign: hex::encode(self.sign.as_bytes()),
        }
    }

    /// Rebuild from [`minify`](Self::minify) output.
    pub fn unminify(minified: &MinifiedKey) -> Result<Self, KeyError> {
        let encrypt = decode_hex_array::<32>(&minified.encrypt)?;
        let sign = decode_hex_array::<32>(&minified.sign)?;
        Self::from_bytes(&sign, encrypt)
    }

    /// `encrypt:sign` wire form.
    pub fn to_wire(&self) -> String {
        self.minify().to_string()
    }

    /// Parse the `encrypt:sign` wire form.
    pub fn from_wire(wire: &str) -> Result<Self, KeyError> {
        Self::unminify(&wire.parse()?)
    }

    /// Same key material, ignoring the validity flag.
    pub fn same_key(&self, other: &EccPubKey) -> bool {
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

impl Verify for EccPubKey {
    fn verify_signature(&self, message: &[u8], signature: &str) -> Result<(), KeyError> {
        let bytes = decode_hex_array::<64>(signature).map_err(|_| KeyError::BadSignature)?;
        let signature = Signature::from_bytes(&bytes);
        self.sign.verify(message, &signature).map_err(|_| KeyError::BadSignature)
    }
}

impl Encapsulate for EccPubKey {
    fn encapsulate(
        &self,
        key: &AesKey,
        ephemeral: [u8; EPHEMERAL_SIZE],
        nonce: [u8; KEM_NONCE_SIZE],
    ) -> Result<String, KeyError> {
        let secret = StaticSecret::from(ephemeral);
        let ephemeral_public = X25519Public::from(&secret);
        let shared = secret.diffie_hellman(&self.encrypt);
        if !shared.was_contributory() {
            return Err(KeyError::invalid_key("low-order encryption key"));
        }

        Ok(kem::seal(
            shared.as_bytes(),
            ephemeral_public.as_bytes(),
            self.encrypt.as_bytes(),
            key,
            nonce,
        ))
    }
}

impl fmt::Debug for EccPubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EccPubKey")
            .field("identity", &self.to_wire())
            .field("valid", &self.valid)
            .finish()
    }
}

/// Full Curve25519 identity: signing and decryption secrets.
#[derive(Clone)]
pub struct EccKeyPair {
    sign: SigningKey,
    encrypt: StaticSecret,
}

impl EccKeyPair {
    /// Build from two 32-byte secrets. Any 32 bytes are a valid secret for
    /// both curves.
    pub fn from_secrets(sign: [u8; 32], encrypt: [u8; 32]) -> Self {
        Self { sign: SigningKey::from_bytes(&sign), encrypt: StaticSecret::from(encrypt) }
    }

    /// Public half.
    pub fn public(&self) -> EccPubKey {
        EccPubKey {
            sign: self.sign.verifying_key(),
            encrypt: X25519Public::from(&self.encrypt),
            valid: true,
        }
    }
}

impl Sign for EccKeyPair {
    fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.sign.sign(message).to_bytes())
    }
}

impl Verify for EccKeyPair {
    fn verify_signature(&self, message: &[u8], signature: &str) -> Result<(), KeyError> {
        self.public().verify_signature(message, signature)
    }
}

impl Encapsulate for EccKeyPair {
    fn encapsulate(
        &self,
        key: &AesKey,
        ephemeral: [u8; EPHEMERAL_SIZE],
        nonce: [u8; KEM_NONCE_SIZE],
    ) -> Result<String, KeyError> {
        self.public().encapsulate(key, ephemeral, nonce)
    }
}

impl Decapsulate for EccKeyPair {
    fn decapsulate(&self, wrapped: &str) -> Result<AesKey, KeyError> {
        let (ephemeral, body) = kem::split(wrapped)?;
        let ephemeral: [u8; 32] =
            ephemeral.try_into().map_err(|_| KeyError::decryption("bad ephemeral length"))?;
        let ephemeral = X25519Public::from(ephemeral);

        let shared = self.encrypt.diffie_hellman(&ephemeral);
        let recipient = X25519Public::from(&self.encrypt);
        kem::open(shared.as_bytes(), ephemeral.as_bytes(), recipient.as_bytes(), &body)
    }
}

impl PartialEq for EccKeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.sign == other.sign && self.encrypt.to_bytes() == other.encrypt.to_bytes()
    }
}

impl Eq for EccKeyPair {}

impl fmt::Debug for EccKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EccKeyPair").field("public", &self.public().to_wire()).finish_non_exhaustive()
    }
}

impl TryFrom<PublicKeyRecord> for EccPubKey {
    type Error = KeyError;

    fn try_from(record: PublicKeyRecord) -> Result<Self, Self::Error> {
        let sign = decode_hex_array::<32>(&record.sign.public)?;
        let encrypt = decode_hex_array::<32>(&record.encrypt.public)?;
        let mut key = Self::from_bytes(&sign, encrypt)?;
        key.valid = record.valid;
        Ok(key)
    }
}

impl From<EccPubKey> for PublicKeyRecord {
    fn from(key: EccPubKey) -> Self {
        let minified = key.minify();
        PublicKeyRecord::new(minified.sign, minified.encrypt, key.valid)
    }
}

impl Serialize for EccKeyPair {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        KeyPairRecord::new(hex::encode(self.sign.to_bytes()), hex::encode(self.encrypt.to_bytes()))
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EccKeyPair {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = KeyPairRecord::deserialize(deserializer)?;
        let sign = decode_hex_array::<32>(&record.sign.secret).map_err(serde::de::Error::custom)?;
        let encrypt =
            decode_hex_array::<32>(&record.encrypt.secret).map_err(serde::de::Error::custom)?;
        Ok(Self::from_secrets(sign, encrypt))
    }
}
