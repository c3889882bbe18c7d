//! Email message

use serde::Serialize;

use crate::domain::communication::errors::ValidationError;

use super::plain_text::plain_text_from_html;

/// The sender of an email
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sender {
    /// A bare address
    Address(String),

    /// An address with a display name
    Named {
        /// The display name
        name: String,

        /// The address
        email: String,
    },
}

impl Sender {
    /// The sender's address, without display name
    pub fn email(&self) -> &str {
        match self {
            Self::Address(email) => email,
            Self::Named { email, .. } => email,
        }
    }

    /// The sender's display name, if any
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Address(_) => None,
            Self::Named { name, .. } => Some(name),
        }
    }
}

impl From<&str> for Sender {
    fn from(email: &str) -> Self {
        Self::Address(email.to_string())
    }
}

impl From<String> for Sender {
    fn from(email: String) -> Self {
        Self::Address(email)
    }
}

/// How a mail client should present an attachment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Disposition {
    /// Rendered within the body, usually referenced by content-id
    Inline,

    /// Offered as a download
    #[default]
    Attachment,
}

impl Disposition {
    /// The `Content-Disposition` type name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Attachment => "attachment",
        }
    }
}

/// An email attachment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    /// The file name shown to the recipient
    pub filename: String,

    /// The raw content; backends declare it base64 encoded on the wire
    pub content: Vec<u8>,

    /// The media type, e.g. `application/pdf`
    pub content_type: String,

    /// Inline or attachment
    pub disposition: Disposition,

    /// Content-id for inline references (`cid:...`)
    pub content_id: Option<String>,
}

impl Attachment {
    /// Creates a regular (non-inline) attachment
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content,
            content_type: content_type.into(),
            disposition: Disposition::Attachment,
            content_id: None,
        }
    }

    /// Marks the attachment inline under the given content-id
    pub fn inline(mut self, content_id: impl Into<String>) -> Self {
        self.disposition = Disposition::Inline;
        self.content_id = Some(content_id.into());
        self
    }
}

/// Email message, independent of any transport
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    /// The recipients of the email
    pub to: Vec<String>,

    /// Carbon copy recipients
    pub cc: Vec<String>,

    /// The sender; falls back to the process default when absent
    pub from: Option<Sender>,

    /// The subject of the email
    pub subject: String,

    /// The plain text body of the email
    pub text: Option<String>,

    /// The HTML body of the email
    pub html: Option<String>,

    /// Attachments, in order
    pub attachments: Vec<Attachment>,
}

impl OutboundMessage {
    /// Creates a message to a single recipient
    pub fn new(to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            to: vec![to.into()],
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Sets the plain text body
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the HTML body
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Sets the sender
    pub fn with_sender(mut self, from: impl Into<Sender>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Adds a carbon copy recipient
    pub fn with_cc(mut self, cc: impl Into<String>) -> Self {
        self.cc.push(cc.into());
        self
    }

    /// Adds an attachment
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// The sender, or [`ValidationError::MissingSender`]
    pub fn sender(&self) -> Result<&Sender, ValidationError> {
        self.from.as_ref().ok_or(ValidationError::MissingSender)
    }

    /// Resolves the body pair to transmit.
    ///
    /// Explicit plain text is used verbatim; otherwise it is derived from the HTML. HTML
    /// without any text, such as a lone image, falls back to the subject so the plain part is
    /// never empty.
    pub fn body(&self) -> Result<ResolvedBody, ValidationError> {
        let text = match (&self.text, &self.html) {
            (Some(text), _) => text.clone(),
            (None, Some(html)) => {
                let derived = plain_text_from_html(html);

                match (derived.is_empty(), self.subject.trim()) {
                    (false, _) => derived,
                    (true, "") => return Err(ValidationError::MissingBody),
                    (true, subject) => subject.to_string(),
                }
            }
            (None, None) => return Err(ValidationError::MissingBody),
        };

        Ok(ResolvedBody {
            text,
            html: self.html.clone(),
        })
    }
}

/// The body of a message as it goes on the wire
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedBody {
    /// Plain text, explicit or derived from the HTML
    pub text: String,

    /// HTML, when given
    pub html: Option<String>,
}

/// What a provider answered for a delivered message
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderResponse {
    /// The provider that accepted the message
    pub provider: &'static str,

    /// The provider's message id, when it reports one
    pub message_id: Option<String>,

    /// The provider's raw acknowledgement
    pub detail: String,
}
