//! Mailer errors

use thiserror::Error;

use crate::domain::communication::errors::ValidationError;

/// Codes of transient network failures worth another SMTP attempt
const RETRYABLE_CODES: [&str; 5] = ["ECONNRESET", "ETIMEDOUT", "EHOSTUNREACH", "ECONNREFUSED", "EPIPE"];

/// Lowercase message fragments of transient SMTP failures
const RETRYABLE_SYMPTOMS: [&str; 12] = [
    "econnreset",
    "etimedout",
    "ehostunreach",
    "econnrefused",
    "epipe",
    "connection reset",
    "timed out",
    "host unreachable",
    "connection refused",
    "broken pipe",
    "connection closed",
    "socket hang up",
];

/// Mailer errors
#[derive(Debug, Error)]
pub enum MailerError {
    /// The message was rejected before any backend was invoked
    #[error("email is not valid: {0}")]
    Validation(#[from] ValidationError),

    /// An SMTP transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A hosted API provider failure
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The selected backend cannot be built from the configuration
    #[error("mailer is misconfigured: {0}")]
    Configuration(String),

    /// Unknown error
    #[error(transparent)]
    UnknownError(anyhow::Error),
}

impl From<anyhow::Error> for MailerError {
    fn from(err: anyhow::Error) -> Self {
        MailerError::UnknownError(err)
    }
}

/// A failure reported by the SMTP transport
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// Symbolic error code, e.g. `ECONNRESET`, when the failure maps to one
    pub code: Option<String>,

    /// Human readable description, including the underlying causes
    pub message: String,
}

impl TransportError {
    /// Creates a transport error without a code
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Creates a transport error with a symbolic code
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Whether the failure looks transient: a known network code, or a known symptom in the
    /// message. Anything else (authentication, rejected payload, ...) is terminal.
    pub fn is_retryable(&self) -> bool {
        if let Some(code) = &self.code {
            if RETRYABLE_CODES.contains(&code.as_str()) {
                return true;
            }
        }

        let message = self.message.to_lowercase();

        RETRYABLE_SYMPTOMS
            .iter()
            .any(|symptom| message.contains(symptom))
    }
}

/// A failure reported by a hosted API provider
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{provider} request failed: {message}")]
pub struct ProviderError {
    /// The provider that failed
    pub provider: &'static str,

    /// HTTP status, when the provider answered
    pub status: Option<u16>,

    /// Human readable description
    pub message: String,
}

impl ProviderError {
    /// Creates a provider error without an HTTP status
    pub fn new(provider: &'static str, message: impl Into<String>) -> Self {
        Self {
            provider,
            status: None,
            message: message.into(),
        }
    }

    /// Attaches the HTTP status the provider answered with
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}
