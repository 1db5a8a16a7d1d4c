//! Validated text primitives shared across the Nadym crates.
//!
//! These wrappers are checked once at construction so that services further down never have to
//! re-validate a name, a diagnosis or an email address they were handed.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input is not a plausible email address
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, utoipa::ToSchema)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Errors
    ///
    /// Returns `TextError::Empty` if the input is empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the owned string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A syntactically plausible, lowercased email address.
///
/// This is the same check a sign-up form applies: one `@`, a local part, and a dotted domain.
/// It does not attempt full RFC 5322 parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, utoipa::ToSchema)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parses and normalises an email address.
    ///
    /// # Errors
    ///
    /// Returns `TextError::Empty` for blank input and `TextError::InvalidEmail` when the address
    /// does not have the `local@domain.tld` shape.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }

        let invalid = || TextError::InvalidEmail(trimmed.to_owned());

        if trimmed.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let mut parts = trimmed.split('@');
        let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) => (local, domain),
            _ => return Err(invalid()),
        };

        if local.is_empty()
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
            || domain.contains("..")
        {
            return Err(invalid());
        }

        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for EmailAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for EmailAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EmailAddress::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text_trims_input() {
        let text = NonEmptyText::new("  Marie  ").unwrap();
        assert_eq!(text.as_str(), "Marie");
    }

    #[test]
    fn test_non_empty_text_rejects_whitespace() {
        assert_eq!(NonEmptyText::new("   \t"), Err(TextError::Empty));
    }

    #[test]
    fn test_non_empty_text_deserialize_rejects_empty_string() {
        let result: Result<NonEmptyText, _> = serde_json::from_str("\"  \"");
        assert!(result.is_err());
    }

    #[test]
    fn test_email_is_lowercased() {
        let email = EmailAddress::parse(" Marie.Dupont@Example.FR ").unwrap();
        assert_eq!(email.as_str(), "marie.dupont@example.fr");
    }

    #[test]
    fn test_email_rejects_malformed_addresses() {
        for bad in [
            "marie",
            "marie@",
            "@example.fr",
            "marie@example",
            "marie@@example.fr",
            "marie@.example.fr",
            "marie@example.fr.",
            "marie dupont@example.fr",
            "marie@example..fr",
        ] {
            assert!(
                matches!(EmailAddress::parse(bad), Err(TextError::InvalidEmail(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_email_empty_is_reported_as_empty() {
        assert_eq!(EmailAddress::parse(""), Err(TextError::Empty));
    }
}
