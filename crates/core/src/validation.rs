//! Form validation helpers.
//!
//! Drafts collect every rejected field before failing, so a caller can show all messages at
//! once instead of one per round trip.

use crate::error::{FieldError, PracticeError, PracticeResult};
use nadym_types::{EmailAddress, NonEmptyText, TextError};
use std::fmt::Display;

pub const REQUIRED: &str = "this field is required";

/// Accumulates field errors for one draft.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: Vec<FieldError>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// Checks a required text field, returning the trimmed value when present.
    pub fn required(&mut self, field: &str, value: Option<&str>) -> Option<NonEmptyText> {
        match value.map(NonEmptyText::new) {
            Some(Ok(text)) => Some(text),
            _ => {
                self.push(field, REQUIRED);
                None
            }
        }
    }

    /// Checks a required email field.
    pub fn email(&mut self, field: &str, value: Option<&str>) -> Option<EmailAddress> {
        match value.map(EmailAddress::parse) {
            Some(Ok(email)) => Some(email),
            Some(Err(TextError::InvalidEmail(_))) => {
                self.push(field, "invalid email address");
                None
            }
            _ => {
                self.push(field, REQUIRED);
                None
            }
        }
    }

    /// Checks that `value`, when present, lies within `min..=max`.
    pub fn range<T>(&mut self, field: &str, value: Option<T>, min: T, max: T)
    where
        T: PartialOrd + Display + Copy,
    {
        if let Some(v) = value {
            if v < min || v > max {
                self.push(field, format!("must be between {} and {}", min, max));
            }
        }
    }

    /// Checks that `value`, when present, is strictly positive.
    pub fn positive(&mut self, field: &str, value: Option<i64>) {
        if let Some(v) = value {
            if v <= 0 {
                self.push(field, "must be greater than zero");
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fails with [`PracticeError::Validation`] if any field was rejected.
    pub fn finish(self) -> PracticeResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(PracticeError::Validation(self.errors))
        }
    }
}

/// Trims an optional free-text field, mapping blank input to `None`.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_every_error() {
        let mut errors = FieldErrors::new();
        assert!(errors.required("first_name", Some("  ")).is_none());
        assert!(errors.email("email", Some("not-an-email")).is_none());
        errors.range("duration_minutes", Some(2), 5, 480);
        errors.positive("quantity", Some(0));

        match errors.finish() {
            Err(PracticeError::Validation(list)) => {
                let fields: Vec<_> = list.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, ["first_name", "email", "duration_minutes", "quantity"]);
                assert_eq!(list[1].message, "invalid email address");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_email_is_required_not_invalid() {
        let mut errors = FieldErrors::new();
        errors.email("email", None);
        let Err(PracticeError::Validation(list)) = errors.finish() else {
            panic!("expected validation error");
        };
        assert_eq!(list[0].message, REQUIRED);
    }

    #[test]
    fn test_valid_values_pass() {
        let mut errors = FieldErrors::new();
        let name = errors.required("last_name", Some(" Martin "));
        errors.range("score", Some(100), 0, 100);
        errors.range::<i64>("absent", None, 0, 1);
        assert_eq!(name.map(NonEmptyText::into_inner).as_deref(), Some("Martin"));
        assert!(errors.finish().is_ok());
    }

    #[test]
    fn test_optional_text_drops_blank() {
        assert_eq!(optional_text(Some("   ".into())), None);
        assert_eq!(optional_text(Some(" note ".into())), Some("note".into()));
    }
}
