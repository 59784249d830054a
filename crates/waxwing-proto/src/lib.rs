//! Waxwing wire formats.
//!
//! Three text formats cross trust boundaries:
//!
//! - [`KapMessage`]: the four key agreement messages, exchanged as JSON
//!   objects. Signatures and HMACs cover the [canonical
//!   encoding](KapMessage::canonical), not the JSON object.
//! - [`InviteMessage`]: hands a conversation key to a friend, authenticated
//!   with the friendship's channel MAC key.
//! - [`BoardRecord`]: the three short posts that publish an identity on the
//!   bulletin board, assembled into a [`PublicationRecord`].
//!
//! # Canonical Encoding
//!
//! Field order is part of the signed contract. The canonical form is a JSON
//! array of strings in a fixed order, with absent optional fields encoded as
//! the empty string. A generic key-sorted object encoding is never used as
//! signature input.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod invite;
mod kap;
mod publication;

pub use error::{ProtocolError, Result};
pub use invite::{INVITE_TYPE, InviteHeader, InviteMessage, InvitePayload};
pub use kap::{CANONICAL_VERSION, KapHeader, KapMessage, KapType};
pub use publication::{
    BoardRecord, ENCRYPT_KEY_MARKER, KEY_SIGNATURE_MARKER, PublicationRecord, SIGN_KEY_MARKER,
};
