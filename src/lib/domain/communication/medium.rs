//! Transport medium selection

use std::{convert::Infallible, fmt};

/// The transport family used to deliver email
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MailMedium {
    /// Direct SMTP through a pooled connection
    #[default]
    Smtp,

    /// The SendGrid v3 mail API
    SendGrid,

    /// Amazon Simple Email Service
    Ses,
}

impl MailMedium {
    /// Parses a configured medium identifier.
    ///
    /// Unrecognized or empty identifiers fall back to [`MailMedium::Smtp`], so this never fails;
    /// the `Result` only exists to plug into clap's value parser.
    pub fn from_config(raw: &str) -> Result<Self, Infallible> {
        Ok(match raw.trim() {
            "SEND_GRID" => Self::SendGrid,
            "SES" => Self::Ses,
            _ => Self::Smtp,
        })
    }

    /// The configuration identifier for this medium
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Smtp => "SMTP",
            Self::SendGrid => "SEND_GRID",
            Self::Ses => "SES",
        }
    }
}

impl fmt::Display for MailMedium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn test_known_mediums() -> TestResult {
        assert_eq!(MailMedium::from_config("SMTP")?, MailMedium::Smtp);
        assert_eq!(MailMedium::from_config("SEND_GRID")?, MailMedium::SendGrid);
        assert_eq!(MailMedium::from_config("SES")?, MailMedium::Ses);

        Ok(())
    }

    #[test]
    fn test_unknown_medium_falls_back_to_smtp() -> TestResult {
        assert_eq!(MailMedium::from_config("")?, MailMedium::Smtp);
        assert_eq!(MailMedium::from_config("POSTMARK")?, MailMedium::Smtp);
        assert_eq!(MailMedium::from_config("ses")?, MailMedium::Smtp);

        Ok(())
    }
}
