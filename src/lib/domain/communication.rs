//! Outbound email: message model, validation, dispatch

pub mod email_addresses;
pub mod errors;
pub mod mail_service;
pub mod mailer;
pub mod medium;
