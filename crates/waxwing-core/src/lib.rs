//! Waxwing Core
//!
//! Trust establishment and key management. Two principals run the key
//! agreement protocol ([`kap`]) to obtain a [`Friendship`]; friendships
//! carry conversation keys between them ([`friendship`]); long-term
//! identities are published to and fetched from a bulletin board
//! ([`directory`]) and re-checked periodically ([`maintenance`]). When a
//! peer's identity changes or expires, the [`invalidation`] cascade flags
//! shared keys and drops friendships.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  ┌────────────────────┐  ┌─────────────┐
//! │ KapService │  │ PublicKeyDirectory │  │ Maintenance │
//! └─────┬──────┘  └─────────┬──────────┘  └──────┬──────┘
//!       │ KapEngine         │ BulletinBoard      │ cascade
//!       ▼                   ▼                    ▼
//! ┌─────────────────────────────────────────────────────┐
//! │            KeyStore (KeyCache + Storage)            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Collaborators (transport, bulletin board, consent prompts, storage) are
//! traits. Time and randomness come from an [`Environment`], so the whole
//! stack runs deterministically under simulation.
//!
//! [`Friendship`]: waxwing_crypto::Friendship

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cache;
mod config;
pub mod conversation;
pub mod directory;
pub mod env;
mod error;
pub mod friendship;
pub mod invalidation;
pub mod kap;
mod keyring;
mod keystore;
pub mod maintenance;
mod naming;
pub mod storage;
mod vault;

#[cfg(test)]
mod test_support;

pub use cache::KeyCache;
pub use config::CoreConfig;
pub use conversation::{ConversationId, Conversations, verify_conversation_id};
pub use directory::{
    BoardAccount, BoardPost, BulletinBoard, FetchedIdentity, IdentityResolver, PublicKeyDirectory,
};
pub use env::Environment;
pub use error::{CoreError, ErrorCode};
pub use friendship::{Consent, FriendshipStore, InviteFlow};
pub use invalidation::{CascadeReport, KeyStatus};
pub use kap::{KapAction, KapEngine, KapService, KapState, Transport};
pub use keyring::{Keyring, KeyringDescriptor, KeyringStore};
pub use keystore::KeyStore;
pub use maintenance::{DistributeOutcome, Maintenance, RepublishReason, Schedule};
pub use naming::{
    StorageName, TYP_FRIENDSHIP, TYP_IDENTITY, TYP_KEY, TYP_KEYRING, TYP_PUBLIC,
};
pub use storage::{MemoryStorage, RedbStorage, Storage, StorageError};
pub use vault::IdentityVault;
