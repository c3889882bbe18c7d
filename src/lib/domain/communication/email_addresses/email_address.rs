//! Email Address

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

use std::fmt;

use lettre::Address;
use thiserror::Error;

use EmailAddressError::*;

/// An error that can occur when creating an email address
#[derive(Debug, Error)]
pub enum EmailAddressError {
    /// The email address is empty
    #[error("email is empty")]
    EmptyEmailAddress,

    /// The email address is invalid
    #[error("email is invalid")]
    InvalidEmailAddress,
}

/// An email address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Create a new email address
    ///
    /// Leading and trailing whitespace is not accepted: the candidate must already be a bare
    /// `local-part@domain` with at least one dot in the domain, and must parse as an RFC 5321
    /// address so every transport can put it on the wire.
    pub fn new(raw: &str) -> Result<Self, EmailAddressError> {
        if raw.trim().is_empty() {
            return Err(EmptyEmailAddress);
        }

        if !EMAIL_REGEX.is_match(raw) || raw.parse::<Address>().is_err() {
            return Err(InvalidEmailAddress);
        }

        Ok(Self(raw.to_string()))
    }

    /// Returns the address as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<EmailAddress> for String {
    fn from(email: EmailAddress) -> Self {
        email.0
    }
}

/// Returns `true` if `candidate` is a well-formed email address
pub fn is_valid_email(candidate: &str) -> bool {
    EmailAddress::new(candidate).is_ok()
}

/// Returns `true` if `candidates` is non-empty and every entry is a well-formed email address
pub fn all_valid_emails<I, S>(candidates: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen_any = false;

    for candidate in candidates {
        if !is_valid_email(candidate.as_ref()) {
            return false;
        }

        seen_any = true;
    }

    seen_any
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn test_email_address_display() -> TestResult {
        let email = EmailAddress::new("email@example.com")?;

        assert_eq!(format!("{}", email), "email@example.com".to_string());

        Ok(())
    }

    #[test]
    fn test_empty_email_address_is_invalid() {
        let result = EmailAddress::new("   ");
        assert!(matches!(result.unwrap_err(), EmptyEmailAddress));
    }

    #[test]
    fn test_email_address_without_at_symbol_is_invalid() {
        let result = EmailAddress::new("not-an-address");
        assert!(matches!(result.unwrap_err(), InvalidEmailAddress));
    }

    #[test]
    fn test_email_address_without_dot_in_domain_is_invalid() {
        assert!(!is_valid_email("missing@domain"));
    }

    #[test]
    fn test_email_address_with_whitespace_is_invalid() {
        assert!(!is_valid_email("first last@example.com"));
        assert!(!is_valid_email(" email@example.com"));
        assert!(!is_valid_email("email@exam\tple.com"));
    }

    #[test]
    fn test_email_address_with_empty_local_part_is_invalid() {
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn test_email_address_with_forbidden_characters_is_invalid() {
        assert!(!is_valid_email("a<b@example.com"));
        assert!(is_valid_email("first.last+tag@mail.example.co.uk"));
    }

    #[test]
    fn test_all_valid_emails() {
        assert!(all_valid_emails(["a@example.com", "b@example.org"]));
        assert!(!all_valid_emails(["a@example.com", "missing@domain"]));
        assert!(!all_valid_emails(Vec::<String>::new()));
    }

    #[test]
    fn test_valid_email_to_string() -> TestResult {
        let email = EmailAddress::new("email@example.com")?;

        assert_eq!(String::from(email), "email@example.com".to_string());

        Ok(())
    }
}
