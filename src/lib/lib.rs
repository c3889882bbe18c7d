#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Provider-agnostic email dispatch
//!
//! A [`MailService`](domain::communication::mail_service::MailService) validates outbound
//! messages and hands them to exactly one transport backend (SMTP, SendGrid or Amazon SES),
//! chosen once at startup from [`MailConfig`](infrastructure::email::MailConfig).

pub mod domain;
pub mod infrastructure;
