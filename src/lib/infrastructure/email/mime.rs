//! MIME rendering of outbound messages with lettre

use anyhow::anyhow;
use lettre::{
    message::{
        header::{ContentDisposition, ContentId, ContentTransferEncoding, ContentType},
        Body, Mailbox, MultiPart, SinglePart,
    },
    Address, Message,
};

use crate::domain::communication::{
    errors::{AddressRole, ValidationError},
    mailer::{Attachment, Disposition, MailerError, OutboundMessage, Sender},
};

/// Whether inline content-ids survive the translation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ContentIds {
    Keep,
    Drop,
}

/// Builds the RFC 5322 message for `message`.
///
/// The body is `multipart/alternative` when HTML is present, wrapped in `multipart/mixed` when
/// there are attachments. Attachment content is always base64 encoded.
pub(crate) fn build_message(
    message: &OutboundMessage,
    content_ids: ContentIds,
) -> Result<Message, MailerError> {
    let mut builder = Message::builder()
        .from(sender_mailbox(message.sender()?)?)
        .subject(message.subject.clone());

    for to in &message.to {
        builder = builder.to(mailbox(AddressRole::To, to)?);
    }

    for cc in &message.cc {
        builder = builder.cc(mailbox(AddressRole::Cc, cc)?);
    }

    let body = message.body()?;

    let email = match (body.html, message.attachments.is_empty()) {
        (Some(html), true) => builder.multipart(MultiPart::alternative_plain_html(body.text, html)),
        (None, true) => builder.singlepart(SinglePart::plain(body.text)),
        (html, false) => {
            let mut mixed = match html {
                Some(html) => MultiPart::mixed()
                    .multipart(MultiPart::alternative_plain_html(body.text, html)),
                None => MultiPart::mixed().singlepart(SinglePart::plain(body.text)),
            };

            for attachment in &message.attachments {
                mixed = mixed.singlepart(attachment_part(attachment, content_ids)?);
            }

            builder.multipart(mixed)
        }
    };

    email.map_err(|err| MailerError::UnknownError(err.into()))
}

/// Renders the sender as `Name <address>` or a bare address
pub(crate) fn sender_mailbox(sender: &Sender) -> Result<Mailbox, ValidationError> {
    let email = parse_address(AddressRole::From, sender.email())?;

    Ok(Mailbox::new(sender.name().map(str::to_string), email))
}

fn mailbox(role: AddressRole, raw: &str) -> Result<Mailbox, ValidationError> {
    Ok(Mailbox::new(None, parse_address(role, raw)?))
}

fn parse_address(role: AddressRole, raw: &str) -> Result<Address, ValidationError> {
    raw.parse().map_err(|_| ValidationError::InvalidAddress {
        role,
        address: raw.to_string(),
    })
}

fn attachment_part(
    attachment: &Attachment,
    content_ids: ContentIds,
) -> Result<SinglePart, MailerError> {
    let content_type =
        ContentType::parse(&attachment.content_type).map_err(|_| {
            ValidationError::InvalidContentType {
                filename: attachment.filename.clone(),
                content_type: attachment.content_type.clone(),
            }
        })?;

    let disposition = match attachment.disposition {
        Disposition::Inline => ContentDisposition::inline_with_name(&attachment.filename),
        Disposition::Attachment => ContentDisposition::attachment(&attachment.filename),
    };

    let body = Body::new_with_encoding(attachment.content.clone(), ContentTransferEncoding::Base64)
        .map_err(|_| anyhow!("could not base64 encode {}", attachment.filename))?;

    let mut part = SinglePart::builder().header(content_type).header(disposition);

    if let (ContentIds::Keep, Some(content_id)) = (content_ids, &attachment.content_id) {
        part = part.header(ContentId::from(format!("<{content_id}>")));
    }

    Ok(part.body(body))
}
