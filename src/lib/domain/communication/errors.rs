//! Validation errors for outbound messages

use std::fmt;

use thiserror::Error;

/// Which part of a message an address came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressRole {
    /// A `to` recipient
    To,

    /// A `cc` recipient
    Cc,

    /// The sender
    From,
}

impl fmt::Display for AddressRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::To => write!(f, "recipient"),
            Self::Cc => write!(f, "cc"),
            Self::From => write!(f, "sender"),
        }
    }
}

/// A message that must not reach any backend
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The message has no `to` recipients
    #[error("no recipients given")]
    NoRecipients,

    /// Neither the message nor the process configuration names a sender
    #[error("no sender address given")]
    MissingSender,

    /// An address failed validation
    #[error("invalid {role} address: {address:?}")]
    InvalidAddress {
        /// Where the address appeared
        role: AddressRole,

        /// The rejected address
        address: String,
    },

    /// The message has no plain text body and no HTML body that yields one
    #[error("message has no plain text body and no HTML body to derive one from")]
    MissingBody,

    /// An attachment declared a media type that cannot be parsed
    #[error("attachment {filename:?} has invalid content type {content_type:?}")]
    InvalidContentType {
        /// The attachment's file name
        filename: String,

        /// The rejected media type
        content_type: String,
    },
}
