//! Codec error types.

use thiserror::Error;

/// Errors produced while parsing a wire line into a [`crate::Message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageParseError {
    #[error("empty message")]
    Empty,

    #[error("missing verb")]
    MissingVerb,

    #[error("invalid verb: {0:?}")]
    InvalidVerb(String),
}
