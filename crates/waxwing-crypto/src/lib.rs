//! Waxwing Key Types
//!
//! Typed key material for the Waxwing trust layer. Every operation is a pure
//! function: callers provide random bytes (nonces, ephemeral secrets) so the
//! whole protocol can be replayed deterministically in tests.
//!
//! # Key Hierarchy
//!
//! ```text
//! Identity key pair (Ed25519 sign + X25519 encrypt)
//!        │  signs / encapsulates
//!        ▼
//! KAP contributions (256-bit AesKey each side)
//!        │  XOR
//!        ▼
//! Master key ──HMAC("mac")──▶ fMac (authenticates invites, MSG4)
//!        │
//!        └────HMAC("enc")──▶ fEnc (wraps conversation keys)
//!                                   │
//!                                   ▼
//!                        Conversation AesKey {principals, invalid}
//! ```
//!
//! # Capabilities
//!
//! Asymmetric keys are split by capability instead of by inheritance.
//! Public-only keys implement [`Verify`] and [`Encapsulate`]; full key pairs
//! additionally implement [`Sign`] and [`Decapsulate`]. Two families exist:
//! [`EccPubKey`]/[`EccKeyPair`] (Curve25519) and [`PubKey`]/[`KeyPair`]
//! (NIST P-256).
//!
//! # Storage
//!
//! [`KeyRecord`] is the closed set of persisted key variants. Records are
//! CBOR maps tagged by a `typ` discriminant (`aes`, `pubk`, `kp`, `eccPubk`,
//! `ecckp`, `anon`, `fr`); decoding an unknown tag fails with
//! [`KeyError::UnknownTag`] and loading the wrong variant fails with
//! [`KeyError::TypeMismatch`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod aes;
mod anon;
mod capability;
mod ecc;
mod encoding;
mod error;
mod friendship;
mod kem;
mod nist;
mod record;

pub use aes::{AES_KEY_BITS, AES_KEY_SIZE, AES_NONCE_SIZE, AesKey};
pub use anon::AnonKey;
pub use capability::{Decapsulate, Encapsulate, MinifiedKey, Sign, Verify};
pub use ecc::{EccKeyPair, EccPubKey};
pub use encoding::{digests_match, sha256_hex};
pub use error::KeyError;
pub use friendship::{ENC_LABEL, Friendship, MAC_LABEL};
pub use kem::{EPHEMERAL_SIZE, KEM_NONCE_SIZE};
pub use nist::{KeyPair, PubKey};
pub use record::{KeyRecord, TypedKey};
