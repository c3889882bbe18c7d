//! Email transport module

use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

mod attempt;
mod errors;
mod message;
mod plain_text;

pub use attempt::{Backoff, DeliveryAttempt, RetryPolicy, MAX_ATTEMPTS};
pub use errors::{MailerError, ProviderError, TransportError};
pub use message::{
    Attachment, Disposition, OutboundMessage, ProviderResponse, ResolvedBody, Sender,
};
pub use plain_text::plain_text_from_html;

/// A transport backend able to deliver a normalized message
///
/// Implementations own their retry policy: a call runs to terminal success or terminal failure,
/// and the final error is returned unchanged.
#[async_trait]
pub trait Mailer: Clone + Send + Sync + 'static {
    /// Send an email
    ///
    /// # Arguments
    /// * `message` - The [`OutboundMessage`] to deliver. Its sender must already be resolved.
    ///
    /// # Returns
    /// - [`Ok`] with the provider's [`ProviderResponse`] from the successful attempt.
    /// - [`Err`] with the last attempt's [`MailerError`] once no further attempt will be made.
    async fn send_email(&self, message: &OutboundMessage) -> Result<ProviderResponse, MailerError>;
}

#[cfg(test)]
mock! {
    pub Mailer {}

    impl Clone for Mailer {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl Mailer for Mailer {
        async fn send_email(&self, message: &OutboundMessage) -> Result<ProviderResponse, MailerError>;
    }
}

#[cfg(test)]
pub mod tests {
    pub use super::MockMailer;
}
