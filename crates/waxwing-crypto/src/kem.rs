//! Key wrapping shared by both asymmetric families.
//!
//! An ephemeral Diffie-Hellman secret is agreed with the recipient, expanded
//! with HKDF-SHA256 (salted with both public points), and used to seal the
//! 256-bit key with `XChaCha20-Poly1305`.
//!
//! Wire form: `hex(ephemeral_public) ":" base64(nonce || ciphertext)`.

use base64::{Engine, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{AesKey, KeyError, encoding::decode_hex};

/// Size of the caller-provided ephemeral secret
pub const EPHEMERAL_SIZE: usize = 32;

/// `XChaCha20` nonce size
pub const KEM_NONCE_SIZE: usize = 24;

/// Label for the wrapping key derivation
const WRAP_LABEL: &[u8] = b"waxwingKeyWrapV1";

/// Seal `key` under the agreed secret.
pub(crate) fn seal(
    shared_secret: &[u8],
    ephemeral_public: &[u8],
    recipient_public: &[u8],
    key: &AesKey,
    nonce: [u8; KEM_NONCE_SIZE],
) -> String {
    let mut wrapping = wrapping_key(shared_secret, ephemeral_public, recipient_public);
    let cipher = XChaCha20Poly1305::new((&wrapping).into());
    wrapping.zeroize();

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), key.as_bytes().as_slice())
    else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut body = Vec::with_capacity(KEM_NONCE_SIZE + ciphertext.len());
    body.extend_from_slice(&nonce);
    body.extend_from_slice(&ciphertext);

    format!("{}:{}", hex::encode(ephemeral_public), STANDARD.encode(body))
}

/// Split wire form into (ephemeral public bytes, sealed body).
pub(crate) fn split(wrapped: &str) -> Result<(Vec<u8>, Vec<u8>), KeyError> {
    let Some((ephemeral, body)) = wrapped.split_once(':') else {
        return Err(KeyError::decryption("wrapped key missing separator"));
    };
    let ephemeral = decode_hex(ephemeral).map_err(|_| KeyError::decryption("bad ephemeral"))?;
    let body = STANDARD.decode(body).map_err(|_| KeyError::decryption("bad body encoding"))?;
    Ok((ephemeral, body))
}

/// Open a sealed body under the agreed secret.
pub(crate) fn open(
    shared_secret: &[u8],
    ephemeral_public: &[u8],
    recipient_public: &[u8],
    body: &[u8],
) -> Result<AesKey, KeyError> {
    if body.len() < KEM_NONCE_SIZE {
        return Err(KeyError::decryption("wrapped key too short"));
    }
    let (nonce, ciphertext) = body.split_at(KEM_NONCE_SIZE);

    let mut wrapping = wrapping_key(shared_secret, ephemeral_public, recipient_public);
    let cipher = XChaCha20Poly1305::new((&wrapping).into());
    wrapping.zeroize();

    let mut material = cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| KeyError::decryption("authentication failed"))?;

    let key = AesKey::from_slice(&material)
        .map_err(|_| KeyError::decryption("wrapped key has wrong length"));
    material.zeroize();
    key
}

fn wrapping_key(shared_secret: &[u8], ephemeral_public: &[u8], recipient_public: &[u8]) -> [u8; 32] {
    let mut salt = Vec::with_capacity(ephemeral_public.len() + recipient_public.len());
    salt.extend_from_slice(ephemeral_public);
    salt.extend_from_slice(recipient_public);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
    let mut okm = [0u8; 32];
    let Ok(()) = hkdf.expand(WRAP_LABEL, &mut okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    okm
}
