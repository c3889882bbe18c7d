//! SendGrid email service implementation

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[cfg(test)]
use mockall::mock;

use crate::domain::communication::mailer::{
    Attachment, Disposition, Mailer, MailerError, OutboundMessage, ProviderError,
    ProviderResponse, RetryPolicy, Sender,
};

const PROVIDER: &str = "sendgrid";

/// The v3 mail send endpoint
pub const DEFAULT_SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// SendGrid configuration
#[derive(Clone, Debug, Parser)]
pub struct SendGridConfig {
    /// The SendGrid API key
    #[arg(long = "sendgrid-api-key", env = "EMAIL_KEY")]
    pub api_key: Option<String>,

    /// The mail send endpoint
    #[arg(long = "sendgrid-api-url", env = "SENDGRID_API_URL", default_value = DEFAULT_SENDGRID_API_URL)]
    pub api_url: String,
}

impl Default for SendGridConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_SENDGRID_API_URL.to_string(),
        }
    }
}

/// A SendGrid address
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendGridAddress {
    /// The address
    pub email: String,

    /// The display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SendGridAddress {
    fn bare(email: &str) -> Self {
        Self {
            email: email.to_string(),
            name: None,
        }
    }
}

impl From<&Sender> for SendGridAddress {
    fn from(sender: &Sender) -> Self {
        Self {
            email: sender.email().to_string(),
            name: sender.name().map(str::to_string),
        }
    }
}

/// Recipients of one copy of the message
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Personalization {
    /// `to` recipients
    pub to: Vec<SendGridAddress>,

    /// `cc` recipients
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<SendGridAddress>,
}

/// One body part
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendGridContent {
    /// The media type, `text/plain` or `text/html`
    #[serde(rename = "type")]
    pub content_type: &'static str,

    /// The body
    pub value: String,
}

/// An attachment, with base64 encoded content
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendGridAttachment {
    /// Base64 encoded content
    pub content: String,

    /// The file name
    pub filename: String,

    /// The media type
    #[serde(rename = "type")]
    pub content_type: String,

    /// `inline` or `attachment`
    pub disposition: &'static str,

    /// Content-id, only for inline attachments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
}

impl From<&Attachment> for SendGridAttachment {
    fn from(attachment: &Attachment) -> Self {
        let content_id = match attachment.disposition {
            Disposition::Inline => attachment.content_id.clone(),
            Disposition::Attachment => None,
        };

        Self {
            content: STANDARD.encode(&attachment.content),
            filename: attachment.filename.clone(),
            content_type: attachment.content_type.clone(),
            disposition: attachment.disposition.as_str(),
            content_id,
        }
    }
}

/// The JSON body of a v3 mail send request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendGridPayload {
    /// Recipients
    pub personalizations: Vec<Personalization>,

    /// The sender
    pub from: SendGridAddress,

    /// The subject
    pub subject: String,

    /// Plain text first, then HTML
    pub content: Vec<SendGridContent>,

    /// Attachments
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<SendGridAttachment>,
}

impl SendGridPayload {
    /// Translates a message into a SendGrid request body
    pub fn from_message(message: &OutboundMessage) -> Result<Self, MailerError> {
        let from = SendGridAddress::from(message.sender()?);
        let body = message.body()?;

        let mut content = vec![SendGridContent {
            content_type: "text/plain",
            value: body.text,
        }];

        if let Some(html) = body.html {
            content.push(SendGridContent {
                content_type: "text/html",
                value: html,
            });
        }

        Ok(Self {
            personalizations: vec![Personalization {
                to: message.to.iter().map(String::as_str).map(SendGridAddress::bare).collect(),
                cc: message.cc.iter().map(String::as_str).map(SendGridAddress::bare).collect(),
            }],
            from,
            subject: message.subject.clone(),
            content,
            attachments: message.attachments.iter().map(SendGridAttachment::from).collect(),
        })
    }
}

/// The HTTP client a [`SendGridMailer`] delivers through
#[async_trait]
pub trait SendGridClient: Send + Sync + 'static {
    /// Posts one mail send request
    async fn send(&self, payload: &SendGridPayload) -> Result<ProviderResponse, ProviderError>;
}

#[cfg(test)]
mock! {
    pub SendGridClient {}

    #[async_trait]
    impl SendGridClient for SendGridClient {
        async fn send(&self, payload: &SendGridPayload) -> Result<ProviderResponse, ProviderError>;
    }
}

/// SendGrid client over reqwest
#[derive(Debug)]
pub struct ReqwestSendGridClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl ReqwestSendGridClient {
    /// Create a new SendGrid client
    pub fn new(config: &SendGridConfig) -> Result<Self, MailerError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| MailerError::Configuration("EMAIL_KEY is not set".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| MailerError::Configuration(format!("invalid HTTP client: {err}")))?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl SendGridClient for ReqwestSendGridClient {
    async fn send(&self, payload: &SendGridPayload) -> Result<ProviderResponse, ProviderError> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|err| ProviderError::new(PROVIDER, err.to_string()))?;

        let status = response.status();
        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                warn!(status = %status, error = %err, "could not read SendGrid response body");

                format!("<unreadable body: {err}>")
            }
        };

        if !status.is_success() {
            return Err(
                ProviderError::new(PROVIDER, format!("{status}: {body}")).with_status(status.as_u16())
            );
        }

        Ok(ProviderResponse {
            provider: PROVIDER,
            message_id,
            detail: status.to_string(),
        })
    }
}

/// SendGrid mailer
///
/// Every failure is retried until the attempt budget is spent.
#[derive(Debug)]
pub struct SendGridMailer<C>
where
    C: SendGridClient,
{
    client: Arc<C>,
    policy: RetryPolicy,
}

impl<C> Clone for SendGridMailer<C>
where
    C: SendGridClient,
{
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            policy: self.policy,
        }
    }
}

impl<C> SendGridMailer<C>
where
    C: SendGridClient,
{
    /// Create a new SendGrid mailer
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            policy: RetryPolicy::immediate(),
        }
    }
}

#[async_trait]
impl<C> Mailer for SendGridMailer<C>
where
    C: SendGridClient,
{
    async fn send_email(&self, message: &OutboundMessage) -> Result<ProviderResponse, MailerError> {
        info!(to = ?message.to, "starting SendGrid email attempt");

        let payload = SendGridPayload::from_message(message)?;
        let mut attempt = self.policy.first_attempt();

        loop {
            info!(
                attempt = attempt.number(),
                max_attempts = attempt.max_attempts(),
                "SendGrid attempt"
            );

            match self.client.send(&payload).await {
                Ok(response) => {
                    info!(attempt = attempt.number(), "SendGrid email sent successfully");
                    debug!(response = ?response, "SendGrid response");

                    return Ok(response);
                }
                Err(err) => {
                    error!(
                        attempt = attempt.number(),
                        status = ?err.status,
                        error = %err,
                        "SendGrid attempt failed"
                    );

                    if attempt.is_last() {
                        error!("max retries reached for SendGrid, giving up");

                        return Err(err.into());
                    }
                }
            }

            let delay = self.policy.delay_after(attempt.number());

            if !delay.is_zero() {
                sleep(delay).await;
            }

            attempt = attempt.next();
        }
    }
}
