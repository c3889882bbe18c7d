//! Email transports and mailer selection

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tracing::info;

use crate::domain::communication::{
    mail_service::MailSettings,
    mailer::{Mailer, MailerError, OutboundMessage, ProviderResponse, Sender},
    medium::MailMedium,
};

mod mime;

pub mod sendgrid;
pub mod ses;
pub mod smtp;

use sendgrid::{ReqwestSendGridClient, SendGridConfig, SendGridMailer};
use ses::{AwsSesClient, SesConfig, SesMailer};
use smtp::{LettreSmtpConnection, SmtpConfig, SmtpMailer};

/// Mail configuration, read once at startup
#[derive(Clone, Debug, Default, Parser)]
pub struct MailConfig {
    /// The medium to deliver through: `SMTP` (default), `SEND_GRID` or `SES`
    #[arg(
        long = "medium",
        env = "EMAIL_MEDIUM",
        default_value = "SMTP",
        value_parser = MailMedium::from_config
    )]
    pub medium: MailMedium,

    /// The sender used when a message does not name one
    #[arg(long = "email-from", env = "EMAIL_FROM")]
    pub default_sender: Option<String>,

    /// Display name for the default sender
    #[arg(long = "email-from-name", env = "EMAIL_FROM_NAME")]
    pub default_sender_name: Option<String>,

    /// SMTP settings
    #[clap(flatten)]
    pub smtp: SmtpConfig,

    /// SendGrid settings
    #[clap(flatten)]
    pub sendgrid: SendGridConfig,

    /// SES settings
    #[clap(flatten)]
    pub ses: SesConfig,
}

impl MailConfig {
    /// The settings the mail service needs from this configuration
    pub fn settings(&self) -> MailSettings {
        let default_sender = self
            .default_sender
            .clone()
            .filter(|email| !email.is_empty())
            .map(|email| match self.default_sender_name.clone() {
                Some(name) if !name.is_empty() => Sender::Named { name, email },
                _ => Sender::Address(email),
            });

        MailSettings {
            medium: self.medium,
            default_sender,
        }
    }
}

/// The one mailer chosen for the lifetime of the process
#[derive(Clone, Debug)]
pub enum SelectedMailer {
    /// Direct SMTP
    Smtp(SmtpMailer<LettreSmtpConnection>),

    /// SendGrid
    SendGrid(SendGridMailer<ReqwestSendGridClient>),

    /// Amazon SES
    Ses(SesMailer<AwsSesClient>),
}

impl SelectedMailer {
    /// The medium this mailer delivers through
    pub fn medium(&self) -> MailMedium {
        match self {
            Self::Smtp(_) => MailMedium::Smtp,
            Self::SendGrid(_) => MailMedium::SendGrid,
            Self::Ses(_) => MailMedium::Ses,
        }
    }
}

#[async_trait]
impl Mailer for SelectedMailer {
    async fn send_email(&self, message: &OutboundMessage) -> Result<ProviderResponse, MailerError> {
        match self {
            Self::Smtp(mailer) => mailer.send_email(message).await,
            Self::SendGrid(mailer) => mailer.send_email(message).await,
            Self::Ses(mailer) => mailer.send_email(message).await,
        }
    }
}

/// Builds the mailer for the configured medium.
///
/// Only the selected backend is constructed, so only its credentials are required. The SMTP
/// connection is verified once here; a failed verification is logged, not returned.
pub async fn select_mailer(config: &MailConfig) -> Result<SelectedMailer, MailerError> {
    info!(medium = %config.medium, "selecting mailer");

    let mailer = match config.medium {
        MailMedium::Smtp => {
            let connection = LettreSmtpConnection::new(config.smtp.clone())?;

            SelectedMailer::Smtp(SmtpMailer::new(Arc::new(connection)).await)
        }
        MailMedium::SendGrid => SelectedMailer::SendGrid(SendGridMailer::new(Arc::new(
            ReqwestSendGridClient::new(&config.sendgrid)?,
        ))),
        MailMedium::Ses => {
            SelectedMailer::Ses(SesMailer::new(Arc::new(AwsSesClient::new(&config.ses)?)))
        }
    };

    Ok(mailer)
}
