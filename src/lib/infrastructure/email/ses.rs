//! Amazon SES email service implementation

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use aws_sdk_sesv2::{
    config::{BehaviorVersion, Credentials, Region},
    error::DisplayErrorContext,
    primitives::Blob,
    types::{Destination, EmailContent, RawMessage},
    Client,
};
use clap::Parser;
use tokio::time::sleep;
use tracing::{debug, error, info};

#[cfg(test)]
use mockall::mock;

use crate::domain::communication::mailer::{
    Mailer, MailerError, OutboundMessage, ProviderError, ProviderResponse, RetryPolicy,
};

use super::mime::{build_message, sender_mailbox, ContentIds};

const PROVIDER: &str = "ses";

/// SES configuration
#[derive(Clone, Default, Debug, Parser)]
pub struct SesConfig {
    /// The AWS region, e.g. `eu-west-1`
    #[arg(long = "aws-region", env = "AWS_REGION")]
    pub region: Option<String>,

    /// The AWS access key id
    #[arg(long = "aws-access-key", env = "AWS_ACCESS_KEY")]
    pub access_key: Option<String>,

    /// The AWS secret access key
    #[arg(long = "aws-secret-key", env = "AWS_SECRET_KEY")]
    pub secret_key: Option<String>,
}

/// A rendered message ready for `SendEmail`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SesPayload {
    /// The sender, `Name <address>` or a bare address
    pub from: String,

    /// `to` recipients
    pub to: Vec<String>,

    /// `cc` recipients
    pub cc: Vec<String>,

    /// The full MIME message
    pub raw: Vec<u8>,
}

impl SesPayload {
    /// Renders a message for SES. Inline attachments keep their disposition but lose their
    /// content-id.
    pub fn from_message(message: &OutboundMessage) -> Result<Self, MailerError> {
        let from = sender_mailbox(message.sender()?)?.to_string();
        let email = build_message(message, ContentIds::Drop)?;

        Ok(Self {
            from,
            to: message.to.clone(),
            cc: message.cc.clone(),
            raw: email.formatted(),
        })
    }
}

/// The SES API a [`SesMailer`] delivers through
#[async_trait]
pub trait SesClient: Send + Sync + 'static {
    /// Sends one raw message
    async fn send(&self, payload: &SesPayload) -> Result<ProviderResponse, ProviderError>;
}

#[cfg(test)]
mock! {
    pub SesClient {}

    #[async_trait]
    impl SesClient for SesClient {
        async fn send(&self, payload: &SesPayload) -> Result<ProviderResponse, ProviderError>;
    }
}

/// SES v2 client from the AWS SDK
#[derive(Debug)]
pub struct AwsSesClient {
    client: Client,
}

impl AwsSesClient {
    /// Create a new SES client with static credentials
    pub fn new(config: &SesConfig) -> Result<Self, MailerError> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|value| !value.is_empty())
                .ok_or_else(|| MailerError::Configuration(format!("{name} is not set")))
        };

        let region = required(&config.region, "AWS_REGION")?;
        let access_key = required(&config.access_key, "AWS_ACCESS_KEY")?;
        let secret_key = required(&config.secret_key, "AWS_SECRET_KEY")?;

        let sdk_config = aws_sdk_sesv2::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "mail-dispatch",
            ))
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
        })
    }
}

#[async_trait]
impl SesClient for AwsSesClient {
    async fn send(&self, payload: &SesPayload) -> Result<ProviderResponse, ProviderError> {
        let raw = RawMessage::builder()
            .data(Blob::new(payload.raw.clone()))
            .build()
            .map_err(|err| ProviderError::new(PROVIDER, err.to_string()))?;

        let destination = Destination::builder()
            .set_to_addresses(Some(payload.to.clone()))
            .set_cc_addresses((!payload.cc.is_empty()).then(|| payload.cc.clone()))
            .build();

        let output = self
            .client
            .send_email()
            .from_email_address(&payload.from)
            .destination(destination)
            .content(EmailContent::builder().raw(raw).build())
            .send()
            .await
            .map_err(|err| ProviderError::new(PROVIDER, DisplayErrorContext(&err).to_string()))?;

        Ok(ProviderResponse {
            provider: PROVIDER,
            message_id: output.message_id().map(str::to_string),
            detail: format!("{output:?}"),
        })
    }
}

/// SES mailer
///
/// Every failure is retried until the attempt budget is spent.
#[derive(Debug)]
pub struct SesMailer<C>
where
    C: SesClient,
{
    client: Arc<C>,
    policy: RetryPolicy,
}

impl<C> Clone for SesMailer<C>
where
    C: SesClient,
{
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            policy: self.policy,
        }
    }
}

impl<C> SesMailer<C>
where
    C: SesClient,
{
    /// Create a new SES mailer
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            policy: RetryPolicy::immediate(),
        }
    }
}

#[async_trait]
impl<C> Mailer for SesMailer<C>
where
    C: SesClient,
{
    async fn send_email(&self, message: &OutboundMessage) -> Result<ProviderResponse, MailerError> {
        info!(to = ?message.to, "starting SES email process");
        info!(
            subject = %message.subject,
            cc = ?message.cc,
            attachments = message.attachments.len(),
            "email configuration"
        );

        let payload = SesPayload::from_message(message)?;
        let mut attempt = self.policy.first_attempt();

        loop {
            info!(
                attempt = attempt.number(),
                max_attempts = attempt.max_attempts(),
                "SES attempt"
            );

            match self.client.send(&payload).await {
                Ok(response) => {
                    info!(attempt = attempt.number(), "SES mail sent successfully");
                    debug!(response = ?response, "SES response");

                    return Ok(response);
                }
                Err(err) => {
                    error!(attempt = attempt.number(), error = %err, "SES attempt failed");

                    if attempt.is_last() {
                        error!("max retries reached for SES, giving up");

                        return Err(err.into());
                    }
                }
            }

            let delay: Duration = self.policy.delay_after(attempt.number());

            if !delay.is_zero() {
                sleep(delay).await;
            }

            attempt = attempt.next();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use mockall::Sequence;
    use testresult::TestResult;
    use tokio::time::Instant;

    use crate::domain::communication::mailer::{Attachment, Sender};

    use super::*;

    fn accepted() -> ProviderResponse {
        ProviderResponse {
            provider: PROVIDER,
            message_id: Some("0100018f-ses".to_string()),
            detail: "SendEmailOutput".to_string(),
        }
    }

    fn message() -> OutboundMessage {
        OutboundMessage::new("user@example.com", "Welcome")
            .with_sender("noreply@example.com")
            .with_text("Hello")
    }

    #[test]
    fn test_payload_renders_raw_mime() -> TestResult {
        let message = OutboundMessage::new("user@example.com", "Welcome")
            .with_cc("team@example.com")
            .with_sender(Sender::Named {
                name: "Support".to_string(),
                email: "support@example.com".to_string(),
            })
            .with_html("<h1>Welcome</h1><p>Glad   you're here</p>")
            .with_attachment(Attachment::new("logo.png", "image/png", b"png".to_vec()).inline("logo"));

        let payload = SesPayload::from_message(&message)?;
        let raw = String::from_utf8_lossy(&payload.raw);

        assert_eq!(payload.from, "Support <support@example.com>");
        assert_eq!(payload.to, vec!["user@example.com".to_string()]);
        assert_eq!(payload.cc, vec!["team@example.com".to_string()]);
        assert!(raw.contains("Welcome\r\nGlad you're here") || raw.contains("Welcome\nGlad you're here"));
        assert!(raw.contains("Content-Disposition: inline; filename=\"logo.png\""));
        assert!(raw.contains("cG5n"));
        assert!(!raw.contains("Content-ID"));

        Ok(())
    }

    #[tokio::test]
    async fn test_send_email_success() -> TestResult {
        let mut client = MockSesClient::new();

        client
            .expect_send()
            .times(1)
            .withf(|payload| payload.from == "noreply@example.com")
            .returning(|_| Ok(accepted()));

        let mailer = SesMailer::new(Arc::new(client));

        assert_eq!(mailer.send_email(&message()).await?, accepted());

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_retried_until_success() -> TestResult {
        let mut client = MockSesClient::new();
        let mut seq = Sequence::new();

        client
            .expect_send()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(ProviderError::new(PROVIDER, "Throttling: Maximum sending rate exceeded")));
        client
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(accepted()));

        let mailer = SesMailer::new(Arc::new(client));
        let started = Instant::now();

        assert_eq!(mailer.send_email(&message()).await?, accepted());
        assert_eq!(started.elapsed(), Duration::ZERO);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_failure_exhausts_three_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let mut client = MockSesClient::new();

        client.expect_send().times(3).returning(move |_| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;

            Err(ProviderError::new(
                PROVIDER,
                format!("MessageRejected: Email address is not verified (attempt {attempt})"),
            ))
        });

        let mailer = SesMailer::new(Arc::new(client));
        let started = Instant::now();

        let result = mailer.send_email(&message()).await;

        assert_eq!(started.elapsed(), Duration::ZERO);

        match result {
            Err(MailerError::Provider(err)) => assert_eq!(
                err.message,
                "MessageRejected: Email address is not verified (attempt 3)"
            ),
            other => panic!("expected the third provider error, got {other:?}"),
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_missing_credentials_are_a_configuration_error() {
        let config = SesConfig {
            region: Some("eu-west-1".to_string()),
            access_key: Some("AKIDEXAMPLE".to_string()),
            secret_key: None,
        };

        let result = AwsSesClient::new(&config);

        assert!(matches!(result, Err(MailerError::Configuration(message)) if message.contains("AWS_SECRET_KEY")));
    }
}
