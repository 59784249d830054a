//! Protocol error types.

use thiserror::Error;

/// Result alias for wire format operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from parsing or validating wire messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input is not valid JSON or has the wrong shape
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Message `type` is not one this endpoint understands
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// A required header or body field is absent
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Bulletin board post does not follow the record grammar
    #[error("malformed board record: {0}")]
    MalformedRecord(String),
}

impl ProtocolError {
    /// Whether the error is about the shape of the input rather than its
    /// type discriminant.
    pub fn is_shape_error(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::MissingField(_) | Self::MalformedRecord(_))
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
