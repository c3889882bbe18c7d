//! Email addresses module.

mod email_address;

pub use email_address::{all_valid_emails, is_valid_email, EmailAddress, EmailAddressError};
