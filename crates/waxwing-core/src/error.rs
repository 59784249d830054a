//! Core error taxonomy.
//!
//! Every failure maps to one stable [`ErrorCode`]. Callers branch on the
//! code: `NOKEY` usually means "create it", `KAPERROR` means "start a fresh
//! session", `STALE`/`NOIDENT` mean the peer has to republish.

use std::fmt;

use thiserror::Error;
use waxwing_crypto::KeyError;
use waxwing_proto::ProtocolError;

use crate::storage::StorageError;

/// Stable error codes shared with every caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCode {
    /// Keyring does not exist
    NoKeyring,
    /// Key not found in storage
    NoKey,
    /// Record already exists with different content
    Exists,
    /// Keyring is not open for this principal
    OpenKeyring,
    /// Wrong record or message type
    BadType,
    /// Malformed or inconsistent parameter
    BadParam,
    /// Key agreement verification failed
    KapError,
    /// Key material or identity does not check out
    InvalidKey,
    /// No verifiable published identity
    NoIdent,
    /// Published identity is past its expiration
    Stale,
    /// Bulletin board account does not match the identity
    PubSub,
    /// User declined consent
    Refused,
    /// Stored record is corrupt
    Maimed,
    /// Anything else (I/O, transport)
    Generic,
    /// Protected input area problem; raised only by UI layers
    InvalidParea,
    /// Referenced entity does not exist
    NoEnt,
}

impl ErrorCode {
    /// Upper-case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoKeyring => "NOKEYRING",
            Self::NoKey => "NOKEY",
            Self::Exists => "EXISTS",
            Self::OpenKeyring => "OPENKEYRING",
            Self::BadType => "BADTYPE",
            Self::BadParam => "BADPARAM",
            Self::KapError => "KAPERROR",
            Self::InvalidKey => "INVALIDKEY",
            Self::NoIdent => "NOIDENT",
            Self::Stale => "STALE",
            Self::PubSub => "PUBSUB",
            Self::Refused => "REFUSED",
            Self::Maimed => "MAIMED",
            Self::Generic => "GENERIC",
            Self::InvalidParea => "INVALIDPAREA",
            Self::NoEnt => "NOENT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Keyring lookup failed
    #[error("no keyring {name}")]
    NoKeyring {
        /// Keyring name
        name: String,
    },

    /// Storage miss
    #[error("no key at {name}")]
    NoKey {
        /// Storage name looked up
        name: String,
    },

    /// Conflicting record
    #[error("{name} already exists")]
    Exists {
        /// Storage name or entity that already exists
        name: String,
    },

    /// Keyring is owned by or addressed to another principal
    #[error("keyring not open: {reason}")]
    OpenKeyring {
        /// Detail
        reason: String,
    },

    /// Record or message of the wrong type
    #[error("bad type: {0}")]
    BadType(String),

    /// Malformed input rejected at the boundary
    #[error("bad parameter: {0}")]
    BadParam(String),

    /// Key agreement with `peer` failed
    #[error("key agreement with {peer} failed: {reason}")]
    Kap {
        /// Remote principal
        peer: String,
        /// Which check failed
        reason: String,
    },

    /// Key material or identity did not check out
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// No verifiable identity published for `user`
    #[error("no identity published for {user}")]
    NoIdent {
        /// Principal looked up
        user: String,
    },

    /// Identity for `user` is past its expiration
    #[error("identity of {user} is stale")]
    Stale {
        /// Principal looked up
        user: String,
    },

    /// Bulletin board account mismatch
    #[error("publish/subscribe mismatch: {0}")]
    PubSub(String),

    /// User declined
    #[error("refused: {0}")]
    Refused(String),

    /// Stored record could not be decoded
    #[error("corrupt record: {0}")]
    Maimed(String),

    /// Missing entity other than a key
    #[error("no such entity: {0}")]
    NoEnt(String),

    /// I/O, transport or other failure
    #[error("{0}")]
    Generic(String),
}

impl CoreError {
    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoKeyring { .. } => ErrorCode::NoKeyring,
            Self::NoKey { .. } => ErrorCode::NoKey,
            Self::Exists { .. } => ErrorCode::Exists,
            Self::OpenKeyring { .. } => ErrorCode::OpenKeyring,
            Self::BadType(_) => ErrorCode::BadType,
            Self::BadParam(_) => ErrorCode::BadParam,
            Self::Kap { .. } => ErrorCode::KapError,
            Self::InvalidKey(_) => ErrorCode::InvalidKey,
            Self::NoIdent { .. } => ErrorCode::NoIdent,
            Self::Stale { .. } => ErrorCode::Stale,
            Self::PubSub(_) => ErrorCode::PubSub,
            Self::Refused(_) => ErrorCode::Refused,
            Self::Maimed(_) => ErrorCode::Maimed,
            Self::NoEnt(_) => ErrorCode::NoEnt,
            Self::Generic(_) => ErrorCode::Generic,
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Only environmental failures (storage, transport, board) qualify.
    /// Verification failures never do: KAP must restart with new nonces.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Generic(_))
    }

    /// Storage miss, usually handled as "create it".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoKey { .. })
    }

    pub(crate) fn kap(peer: &str, reason: impl Into<String>) -> Self {
        Self::Kap { peer: peer.to_string(), reason: reason.into() }
    }
}

impl From<KeyError> for CoreError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::UnknownTag(_) | KeyError::TypeMismatch { .. } => Self::BadType(err.to_string()),
            KeyError::Encoding(_) => Self::Maimed(err.to_string()),
            KeyError::InvalidKey { .. }
            | KeyError::IncompatibleKeys { .. }
            | KeyError::BadSignature
            | KeyError::BadMac
            | KeyError::Decryption { .. } => Self::InvalidKey(err.to_string()),
        }
    }
}

impl From<ProtocolError> for CoreError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnknownType(_) => Self::BadType(err.to_string()),
            ProtocolError::Malformed(_)
            | ProtocolError::MissingField(_)
            | ProtocolError::MalformedRecord(_) => Self::BadParam(err.to_string()),
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { name } => Self::NoKey { name },
            StorageError::Serialization(_) => Self::Maimed(err.to_string()),
            StorageError::Io(_) => Self::Generic(err.to_string()),
        }
    }
}
