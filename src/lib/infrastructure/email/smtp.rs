//! SMTP email service implementation

use std::{error::Error as _, fmt, io, sync::Arc, time::Duration};

use async_trait::async_trait;
use clap::{ArgAction, Parser};
use lettre::{
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
        Error as SmtpError, PoolConfig,
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tokio::{sync::RwLock, time::sleep};
use tracing::{debug, error, info, warn};

#[cfg(test)]
use mockall::mock;

use crate::domain::communication::mailer::{
    Mailer, MailerError, OutboundMessage, ProviderResponse, RetryPolicy, TransportError,
};

use super::mime::{build_message, ContentIds};

const PROVIDER: &str = "smtp";

/// Connection, greeting and socket timeout
const SOCKET_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound of pooled connections
const MAX_CONNECTIONS: u32 = 5;

const SMTP_RETRY_POLICY: RetryPolicy =
    RetryPolicy::exponential(Duration::from_millis(1000), Duration::from_millis(5000));

/// SMTP configuration
#[derive(Clone, Debug, Parser)]
pub struct SmtpConfig {
    /// The SMTP host
    #[arg(long = "smtp-host", env = "SMTP_SERVICE_HOST")]
    pub host: Option<String>,

    /// The SMTP port
    #[arg(long = "smtp-port", env = "SMTP_SERVICE_PORT", default_value = "587")]
    pub port: u16,

    /// Connect over implicit TLS instead of upgrading with STARTTLS
    #[arg(long = "smtp-ssl", env = "SMTP_SERVICE_SSL", default_value = "false", action = ArgAction::Set)]
    pub ssl: bool,

    /// The SMTP username
    #[arg(long = "smtp-username", env = "SMTP_SERVICE_USERNAME")]
    pub username: Option<String>,

    /// The SMTP password
    #[arg(long = "smtp-password", env = "SMTP_SERVICE_PASSWORD")]
    pub password: Option<String>,

    /// Verify the TLS certificate
    #[arg(long = "smtp-verify-tls", env = "SMTP_VERIFY_TLS", default_value = "true", action = ArgAction::Set)]
    pub verify_tls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            ssl: false,
            username: None,
            password: None,
            verify_tls: true,
        }
    }
}

/// The pooled connection an [`SmtpMailer`] delivers through
///
/// The pool owns connection-level mutual exclusion: concurrent calls may share it freely.
#[async_trait]
pub trait SmtpConnection: Send + Sync + 'static {
    /// Checks that the server is reachable and accepts our session
    async fn verify(&self) -> Result<(), TransportError>;

    /// Transmits a rendered message
    async fn send(&self, email: Message) -> Result<ProviderResponse, TransportError>;

    /// Drops the current connections so the next use starts fresh
    async fn close(&self);
}

#[cfg(test)]
mock! {
    pub SmtpConnection {}

    #[async_trait]
    impl SmtpConnection for SmtpConnection {
        async fn verify(&self) -> Result<(), TransportError>;
        async fn send(&self, email: Message) -> Result<ProviderResponse, TransportError>;
        async fn close(&self);
    }
}

/// lettre's pooled async SMTP transport
pub struct LettreSmtpConnection {
    config: SmtpConfig,
    transport: RwLock<AsyncSmtpTransport<Tokio1Executor>>,
}

impl LettreSmtpConnection {
    /// Create a new SMTP connection pool. Nothing is dialed until first use.
    pub fn new(config: SmtpConfig) -> Result<Self, MailerError> {
        let transport = build_transport(&config)?;

        Ok(Self {
            config,
            transport: RwLock::new(transport),
        })
    }

    async fn transport(&self) -> AsyncSmtpTransport<Tokio1Executor> {
        self.transport.read().await.clone()
    }
}

impl fmt::Debug for LettreSmtpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LettreSmtpConnection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("ssl", &self.config.ssl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SmtpConnection for LettreSmtpConnection {
    async fn verify(&self) -> Result<(), TransportError> {
        match self.transport().await.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransportError::new(
                "Protocol error: Connection closed during verification",
            )),
            Err(err) => Err(transport_error(&err)),
        }
    }

    async fn send(&self, email: Message) -> Result<ProviderResponse, TransportError> {
        let response = self
            .transport()
            .await
            .send(email)
            .await
            .map_err(|err| transport_error(&err))?;

        let lines: Vec<&str> = response.message().collect();

        Ok(ProviderResponse {
            provider: PROVIDER,
            message_id: None,
            detail: format!("{} {}", response.code(), lines.join(" ")),
        })
    }

    async fn close(&self) {
        match build_transport(&self.config) {
            Ok(fresh) => *self.transport.write().await = fresh,
            Err(err) => warn!(error = %err, "could not rebuild SMTP transport"),
        }
    }
}

fn build_transport(config: &SmtpConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailerError> {
    let host = config
        .host
        .as_deref()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| MailerError::Configuration("SMTP_SERVICE_HOST is not set".to_string()))?;

    let tls = TlsParameters::builder(host.to_string())
        .dangerous_accept_invalid_certs(!config.verify_tls)
        .build()
        .map_err(|err| MailerError::Configuration(format!("invalid TLS parameters: {err}")))?;

    let tls = if config.ssl {
        Tls::Wrapper(tls)
    } else {
        Tls::Opportunistic(tls)
    };

    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        .port(config.port)
        .tls(tls)
        .timeout(Some(SOCKET_TIMEOUT))
        .pool_config(PoolConfig::new().max_size(MAX_CONNECTIONS));

    if let Some(username) = &config.username {
        builder = builder.credentials(Credentials::new(
            username.clone(),
            config.password.clone().unwrap_or_default(),
        ));
    }

    Ok(builder.build())
}

/// Flattens a lettre error and its causes, picking up the network error code on the way
fn transport_error(err: &SmtpError) -> TransportError {
    let mut message = err.to_string();
    let mut code = None;
    let mut source = err.source();

    while let Some(cause) = source {
        if code.is_none() {
            code = cause.downcast_ref::<io::Error>().and_then(io_error_code);
        }

        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    if code.is_none() && err.is_timeout() {
        code = Some("ETIMEDOUT");
    }

    TransportError {
        code: code.map(str::to_string),
        message,
    }
}

fn io_error_code(err: &io::Error) -> Option<&'static str> {
    match err.kind() {
        io::ErrorKind::ConnectionReset => Some("ECONNRESET"),
        io::ErrorKind::TimedOut => Some("ETIMEDOUT"),
        io::ErrorKind::HostUnreachable => Some("EHOSTUNREACH"),
        io::ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
        io::ErrorKind::BrokenPipe => Some("EPIPE"),
        _ => None,
    }
}

/// SMTP mailer
///
/// Verifies the pooled connection before every attempt, retries transient failures with capped
/// exponential backoff and closes the connection before each retry.
#[derive(Debug)]
pub struct SmtpMailer<C>
where
    C: SmtpConnection,
{
    connection: Arc<C>,
    policy: RetryPolicy,
}

impl<C> Clone for SmtpMailer<C>
where
    C: SmtpConnection,
{
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            policy: self.policy,
        }
    }
}

impl<C> SmtpMailer<C>
where
    C: SmtpConnection,
{
    /// Create a new SMTP mailer, verifying the connection once.
    ///
    /// A failed verification is logged, not returned: the server may come up before the first
    /// message is sent.
    pub async fn new(connection: Arc<C>) -> Self {
        let mailer = Self {
            connection,
            policy: SMTP_RETRY_POLICY,
        };

        match mailer.connection.verify().await {
            Ok(()) => info!("SMTP server connection verified"),
            Err(err) => error!(error = %err, "SMTP connection verification failed"),
        }

        mailer
    }

    /// Re-verifies the connection after a transport error observed outside of `send_email`.
    ///
    /// Called by the connection layer; never fails.
    pub async fn recover_connection(&self, error: &TransportError) {
        error!(error = %error, "SMTP transport error occurred");

        if let Err(err) = self.connection.verify().await {
            error!(error = %err, "failed to recreate SMTP connection");
        }
    }

    async fn attempt(&self, email: Message) -> Result<ProviderResponse, TransportError> {
        self.connection.verify().await?;

        debug!("sending mail via SMTP");

        self.connection.send(email).await
    }
}

#[async_trait]
impl<C> Mailer for SmtpMailer<C>
where
    C: SmtpConnection,
{
    async fn send_email(&self, message: &OutboundMessage) -> Result<ProviderResponse, MailerError> {
        info!(to = ?message.to, "starting SMTP email process");
        info!(
            subject = %message.subject,
            cc = ?message.cc,
            attachments = message.attachments.len(),
            "email configuration"
        );

        let email = build_message(message, ContentIds::Keep)?;
        let mut attempt = self.policy.first_attempt();

        loop {
            info!(
                attempt = attempt.number(),
                max_attempts = attempt.max_attempts(),
                "SMTP attempt, verifying connection"
            );

            let err = match self.attempt(email.clone()).await {
                Ok(response) => {
                    info!(
                        attempt = attempt.number(),
                        elapsed_ms = attempt.elapsed_ms(),
                        "SMTP mail sent successfully"
                    );
                    debug!(response = ?response, "SMTP response");

                    return Ok(response);
                }
                Err(err) => err,
            };

            error!(
                attempt = attempt.number(),
                code = ?err.code,
                error = %err,
                "SMTP attempt failed"
            );

            if !err.is_retryable() || attempt.is_last() {
                error!("non-retryable error or max retries reached, giving up");

                return Err(err.into());
            }

            let delay = self.policy.delay_after(attempt.number());

            info!(
                delay_ms = delay.as_millis() as u64,
                next_attempt = attempt.number() + 1,
                "retrying SMTP"
            );
            debug!("closing current SMTP connection before retry");

            self.connection.close().await;
            sleep(delay).await;

            attempt = attempt.next();
        }
    }
}
