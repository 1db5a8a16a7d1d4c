//! Caller identification.
//!
//! Requests carry an optional shared API key (`x-api-key`) and the caller's role
//! (`x-user-role`). Both checks are plain functions so any transport can apply them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Doctor,
    Nurse,
    Patient,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "DOCTOR",
            Role::Nurse => "NURSE",
            Role::Patient => "PATIENT",
            Role::Admin => "ADMIN",
        }
    }

    /// Whether this role may perform an action reserved for `allowed`. ADMIN always may.
    pub fn is_any_of(&self, allowed: &[Role]) -> bool {
        *self == Role::Admin || allowed.contains(self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DOCTOR" => Ok(Role::Doctor),
            "NURSE" => Ok(Role::Nurse),
            "PATIENT" => Ok(Role::Patient),
            "ADMIN" => Ok(Role::Admin),
            other => Err(AuthError::UnknownRole(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("missing caller role")]
    MissingRole,
    #[error("unknown caller role: {0}")]
    UnknownRole(String),
    #[error("role {role} may not perform this action")]
    Forbidden { role: Role },
}

impl AuthError {
    /// True when the caller could not be identified at all, as opposed to being identified
    /// and refused.
    pub fn is_unauthenticated(&self) -> bool {
        !matches!(self, AuthError::Forbidden { .. })
    }
}

/// Checks the provided API key against the configured one.
///
/// When no key is configured every request passes.
pub fn validate_api_key(expected: Option<&str>, provided: Option<&str>) -> Result<(), AuthError> {
    match (expected, provided) {
        (None, _) => Ok(()),
        (Some(_), None) => Err(AuthError::MissingApiKey),
        (Some(expected), Some(provided)) if expected == provided => Ok(()),
        (Some(_), Some(_)) => Err(AuthError::InvalidApiKey),
    }
}

/// Parses the role header value.
pub fn parse_role(header: Option<&str>) -> Result<Role, AuthError> {
    match header {
        Some(value) if !value.trim().is_empty() => value.parse(),
        _ => Err(AuthError::MissingRole),
    }
}

/// Fails with [`AuthError::Forbidden`] unless `role` is one of `allowed` (or ADMIN).
pub fn require_role(role: Role, allowed: &[Role]) -> Result<(), AuthError> {
    if role.is_any_of(allowed) {
        Ok(())
    } else {
        Err(AuthError::Forbidden { role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_is_optional() {
        assert_eq!(validate_api_key(None, None), Ok(()));
        assert_eq!(validate_api_key(None, Some("anything")), Ok(()));
    }

    #[test]
    fn test_api_key_must_match_when_configured() {
        assert_eq!(validate_api_key(Some("s3cret"), Some("s3cret")), Ok(()));
        assert_eq!(
            validate_api_key(Some("s3cret"), None),
            Err(AuthError::MissingApiKey)
        );
        assert_eq!(
            validate_api_key(Some("s3cret"), Some("guess")),
            Err(AuthError::InvalidApiKey)
        );
    }

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role(Some("doctor")), Ok(Role::Doctor));
        assert_eq!(parse_role(Some(" NURSE ")), Ok(Role::Nurse));
        assert_eq!(parse_role(None), Err(AuthError::MissingRole));
        assert_eq!(parse_role(Some("  ")), Err(AuthError::MissingRole));
        assert!(matches!(
            parse_role(Some("surgeon")),
            Err(AuthError::UnknownRole(_))
        ));
    }

    #[test]
    fn test_admin_passes_every_guard() {
        assert_eq!(require_role(Role::Admin, &[Role::Doctor]), Ok(()));
        assert_eq!(require_role(Role::Nurse, &[Role::Doctor, Role::Nurse]), Ok(()));

        let err = require_role(Role::Patient, &[Role::Doctor]).unwrap_err();
        assert_eq!(err, AuthError::Forbidden { role: Role::Patient });
        assert!(!err.is_unauthenticated());
        assert!(AuthError::MissingRole.is_unauthenticated());
    }
}
