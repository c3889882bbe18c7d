//! Mail service: the single entry point for sending email

use std::sync::Arc;

use tracing::{error, info};

use crate::domain::communication::{
    email_addresses::{all_valid_emails, is_valid_email},
    errors::{AddressRole, ValidationError},
    mailer::{Mailer, MailerError, OutboundMessage, ProviderResponse, Sender},
    medium::MailMedium,
};

/// Process-wide settings of the mail service, loaded once at startup
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MailSettings {
    /// The medium the configured mailer delivers through
    pub medium: MailMedium,

    /// Sender used when a message does not name one
    pub default_sender: Option<Sender>,
}

/// Mail service
///
/// Validates messages, resolves their sender and hands them to the one configured [`Mailer`].
/// Retrying is left to the mailer.
#[derive(Debug, Clone)]
pub struct MailService<M>
where
    M: Mailer,
{
    mailer: Arc<M>,
    settings: MailSettings,
}

impl<M> MailService<M>
where
    M: Mailer,
{
    /// Creates a new mail service.
    pub fn new(mailer: Arc<M>, settings: MailSettings) -> Self {
        Self { mailer, settings }
    }

    /// Sends an email through the configured mailer.
    ///
    /// # Arguments
    /// * `message` - The message to send. Without an explicit sender, the default is used.
    ///
    /// # Returns
    /// - [`Ok`] with the provider's [`ProviderResponse`].
    /// - [`Err`] with [`MailerError::Validation`] if any address or the body is unusable; the
    ///   mailer is not invoked in that case.
    /// - [`Err`] with the mailer's own error, unchanged, if delivery failed.
    pub async fn send_email(
        &self,
        mut message: OutboundMessage,
    ) -> Result<ProviderResponse, MailerError> {
        if message.from.is_none() {
            message.from = self.settings.default_sender.clone();
        }

        info!(
            medium = %self.settings.medium,
            "starting email send process"
        );
        info!(
            to = ?message.to,
            cc = ?message.cc,
            from = ?message.from,
            "email parameters"
        );

        if let Err(err) = validate(&message) {
            error!(
                valid_to = all_valid_emails(&message.to),
                valid_from = message.from.as_ref().is_some_and(|from| is_valid_email(from.email())),
                error = %err,
                "email validation failed"
            );

            return Err(err.into());
        }

        info!("email validation passed, proceeding with mailer");

        match self.mailer.send_email(&message).await {
            Ok(response) => {
                info!(
                    provider = response.provider,
                    message_id = ?response.message_id,
                    "email sent"
                );

                Ok(response)
            }
            Err(err) => {
                error!(
                    to = ?message.to,
                    cc = ?message.cc,
                    error = %err,
                    "failed to send email"
                );

                Err(err)
            }
        }
    }
}

fn validate(message: &OutboundMessage) -> Result<(), ValidationError> {
    if message.to.is_empty() {
        return Err(ValidationError::NoRecipients);
    }

    let recipients = message
        .to
        .iter()
        .map(|address| (AddressRole::To, address.as_str()))
        .chain(message.cc.iter().map(|address| (AddressRole::Cc, address.as_str())));

    for (role, address) in recipients {
        if !is_valid_email(address) {
            return Err(ValidationError::InvalidAddress {
                role,
                address: address.to_string(),
            });
        }
    }

    let sender = message.sender()?;

    if !is_valid_email(sender.email()) {
        return Err(ValidationError::InvalidAddress {
            role: AddressRole::From,
            address: sender.email().to_string(),
        });
    }

    message.body()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::domain::communication::mailer::{tests::MockMailer, TransportError};

    use super::*;

    fn settings() -> MailSettings {
        MailSettings {
            medium: MailMedium::Smtp,
            default_sender: Some(Sender::from("noreply@example.com")),
        }
    }

    fn response() -> ProviderResponse {
        ProviderResponse {
            provider: "smtp",
            message_id: None,
            detail: "250 OK".to_string(),
        }
    }

    fn message() -> OutboundMessage {
        OutboundMessage::new("user@example.com", "Welcome").with_text("Hello")
    }

    async fn assert_rejected(message: OutboundMessage, settings: MailSettings) -> ValidationError {
        let mut mailer = MockMailer::new();

        mailer.expect_send_email().times(0);

        let service = MailService::new(Arc::new(mailer), settings);

        match service.send_email(message).await {
            Err(MailerError::Validation(err)) => err,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_email_success_uses_default_sender() -> TestResult {
        let mut mailer = MockMailer::new();

        mailer
            .expect_send_email()
            .times(1)
            .withf(|message| {
                message.from == Some(Sender::from("noreply@example.com"))
                    && message.to == vec!["user@example.com".to_string()]
                    && message.text.as_deref() == Some("Hello")
            })
            .returning(|_| Ok(response()));

        let service = MailService::new(Arc::new(mailer), settings());

        let result = service.send_email(message()).await?;

        assert_eq!(result, response());

        Ok(())
    }

    #[tokio::test]
    async fn test_explicit_sender_overrides_default() -> TestResult {
        let sender = Sender::Named {
            name: "Support".to_string(),
            email: "support@example.com".to_string(),
        };
        let expected = sender.clone();

        let mut mailer = MockMailer::new();

        mailer
            .expect_send_email()
            .times(1)
            .withf(move |message| message.from.as_ref() == Some(&expected))
            .returning(|_| Ok(response()));

        let service = MailService::new(Arc::new(mailer), settings());

        service.send_email(message().with_sender(sender)).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_empty_recipients_are_rejected() {
        let mut message = message();
        message.to.clear();

        let err = assert_rejected(message, settings()).await;

        assert_eq!(err, ValidationError::NoRecipients);
    }

    #[tokio::test]
    async fn test_malformed_recipient_is_rejected() {
        let mut message = message();
        message.to.push("not-an-address".to_string());

        let err = assert_rejected(message, settings()).await;

        assert_eq!(
            err,
            ValidationError::InvalidAddress {
                role: AddressRole::To,
                address: "not-an-address".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_cc_is_rejected() {
        let err = assert_rejected(message().with_cc("missing@domain"), settings()).await;

        assert!(matches!(
            err,
            ValidationError::InvalidAddress {
                role: AddressRole::Cc,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_malformed_sender_is_rejected() {
        let message = message().with_sender(Sender::Named {
            name: "Support".to_string(),
            email: "support at example.com".to_string(),
        });

        let err = assert_rejected(message, settings()).await;

        assert!(matches!(
            err,
            ValidationError::InvalidAddress {
                role: AddressRole::From,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_sender_is_rejected() {
        let err = assert_rejected(message(), MailSettings::default()).await;

        assert_eq!(err, ValidationError::MissingSender);
    }

    #[tokio::test]
    async fn test_missing_body_is_rejected() {
        let message = OutboundMessage::new("user@example.com", "Empty");

        let err = assert_rejected(message, settings()).await;

        assert_eq!(err, ValidationError::MissingBody);
    }

    #[tokio::test]
    async fn test_html_without_text_or_subject_is_rejected() {
        let message = OutboundMessage::new("user@example.com", "").with_html(r#"<img src="cid:logo">"#);

        let err = assert_rejected(message, settings()).await;

        assert_eq!(err, ValidationError::MissingBody);
    }

    #[tokio::test]
    async fn test_mailer_error_is_returned_unchanged() {
        let mut mailer = MockMailer::new();

        mailer.expect_send_email().times(1).returning(|_| {
            Err(MailerError::Transport(TransportError::new(
                "permanent error (535): authentication failed",
            )))
        });

        let service = MailService::new(Arc::new(mailer), settings());

        let result = service.send_email(message()).await;

        match result {
            Err(MailerError::Transport(err)) => {
                assert_eq!(err.message, "permanent error (535): authentication failed");
                assert_eq!(err.code, None);
            }
            other => panic!("expected the transport error, got {other:?}"),
        }
    }
}
