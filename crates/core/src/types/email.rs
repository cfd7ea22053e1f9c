//! Login email addresses.
//!
//! A user's email is the one credential that is unique across every
//! organization, so it is normalized once at the edge (trimmed and
//! lowercased) and stored only in that form. Login lookups and the unique
//! index then agree on what "the same address" means.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Why a string is not a usable login email.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email cannot be empty")]
    Empty,
    #[error("email must be at most {max} characters")]
    TooLong { max: usize },
    #[error("email must contain an @ symbol")]
    MissingAtSymbol,
    #[error("email must contain exactly one @ symbol")]
    MultipleAtSymbols,
    #[error("email local part cannot be empty")]
    EmptyLocalPart,
    #[error("email domain cannot be empty")]
    EmptyDomain,
}

/// A normalized login email: `local@domain`, lowercase, no surrounding
/// whitespace, at most [`Email::MAX_LENGTH`] bytes.
///
/// Only the shape is checked. Whether the mailbox exists is not our concern.
///
/// ```
/// use autohaul_core::Email;
///
/// let email = Email::parse("  Dispatch@Acme.TEST ").unwrap();
/// assert_eq!(email.as_str(), "dispatch@acme.test");
/// assert!(Email::parse("dispatch.acme.test").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// RFC 5321 path limit.
    pub const MAX_LENGTH: usize = 254;

    /// Normalize `input` and check its shape.
    ///
    /// # Errors
    ///
    /// Returns the first [`EmailError`] the normalized address violates.
    pub fn parse(input: &str) -> Result<Self, EmailError> {
        let normalized = input.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(EmailError::Empty);
        }
        if normalized.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        let (local, domain) = normalized
            .split_once('@')
            .ok_or(EmailError::MissingAtSymbol)?;
        if local.is_empty() {
            return Err(EmailError::EmptyLocalPart);
        }
        if domain.contains('@') {
            return Err(EmailError::MultipleAtSymbols);
        }
        if domain.is_empty() {
            return Err(EmailError::EmptyDomain);
        }

        Ok(Self(normalized))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_spellings_of_one_login_compare_equal() {
        let typed = Email::parse("\tOwner@ACME.test \n").unwrap();
        let stored = Email::parse("owner@acme.test").unwrap();
        assert_eq!(typed, stored);
        assert_eq!(typed.to_string(), "owner@acme.test");
    }

    #[test]
    fn test_plus_tags_and_subdomains_are_kept() {
        let email = Email::parse("ops+night@dispatch.acme.co.uk").unwrap();
        assert_eq!(String::from(email), "ops+night@dispatch.acme.co.uk");
    }

    #[test]
    fn test_malformed_addresses() {
        for (input, expected) in [
            ("", EmailError::Empty),
            ("  ", EmailError::Empty),
            ("dispatch.acme.test", EmailError::MissingAtSymbol),
            ("@acme.test", EmailError::EmptyLocalPart),
            ("dispatch@", EmailError::EmptyDomain),
            ("dispatch@acme@test", EmailError::MultipleAtSymbols),
        ] {
            assert_eq!(Email::parse(input), Err(expected), "{input:?}");
        }
    }

    #[test]
    fn test_length_limit_applies_after_trimming() {
        let at_limit = format!("{}@acme.test", "a".repeat(Email::MAX_LENGTH - 10));
        assert!(Email::parse(&format!("  {at_limit}  ")).is_ok());
        assert_eq!(
            Email::parse(&format!("a{at_limit}")),
            Err(EmailError::TooLong {
                max: Email::MAX_LENGTH
            })
        );
    }

    #[test]
    fn test_json_input_is_normalized_and_checked() {
        let email: Email = serde_json::from_str(r#""Billing@Acme.test""#).unwrap();
        assert_eq!(email.as_str(), "billing@acme.test");
        assert!(serde_json::from_str::<Email>(r#""billing""#).is_err());
    }
}
