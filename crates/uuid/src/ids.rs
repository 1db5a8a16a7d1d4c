//! Canonical record identifiers and content hashes.

use crate::{UuidError, UuidResult};
use std::path::{Path, PathBuf};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// Canonical record identifier (32 lowercase hex characters, no hyphens).
///
/// Once constructed, the contained UUID is known to be valid, so callers can derive storage
/// paths from it without further checks.
///
/// # Construction
/// - [`RecordId::new`] generates a fresh identifier for a new record.
/// - [`RecordId::parse`] validates an externally supplied identifier (path segment, CLI
///   argument, JSON field).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(Uuid);

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordId {
    /// Generates a new random (v4) identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses an identifier that must already be in canonical form.
    ///
    /// Hyphenated or uppercase UUIDs are rejected rather than normalised, so that one record
    /// can never be addressed by two different strings.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is not canonical.
    pub fn parse(input: &str) -> UuidResult<Self> {
        if !Self::is_canonical(input) {
            return Err(UuidError::InvalidInput(format!(
                "record id must be 32 lowercase hex characters without hyphens, got: '{}'",
                input
            )));
        }

        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| UuidError::InvalidInput(e.to_string()))
    }

    /// Returns the underlying `uuid::Uuid`.
    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true if `input` is exactly 32 characters of `0-9a-f`.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Returns `parent_dir/<s1>/<s2>/<id>/` where `s1`/`s2` are the first two pairs of hex
    /// characters of this identifier.
    pub fn sharded_dir(&self, parent_dir: &Path) -> PathBuf {
        let canonical = self.0.simple().to_string();
        let s1 = &canonical[0..2];
        let s2 = &canonical[2..4];
        parent_dir.join(s1).join(s2).join(&canonical)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for RecordId {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordId::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for RecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RecordId::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl<'s> utoipa::ToSchema<'s> for RecordId {
    fn schema() -> (
        &'s str,
        utoipa::openapi::RefOr<utoipa::openapi::schema::Schema>,
    ) {
        (
            "RecordId",
            utoipa::openapi::ObjectBuilder::new()
                .schema_type(utoipa::openapi::SchemaType::String)
                .description(Some("32 lowercase hexadecimal characters"))
                .into(),
        )
    }
}

/// Lowercase hexadecimal SHA-256 digest.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Builds the hex form of a raw 32-byte digest.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Validates a 64-character lowercase hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] for any other length or character set.
    pub fn parse(input: &str) -> UuidResult<Self> {
        let ok = input.len() == 64
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !ok {
            return Err(UuidError::InvalidInput(format!(
                "sha256 hash must be 64 lowercase hex characters, got: '{}'",
                input
            )));
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Sha256Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Sha256Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Sha256Hash::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_generates_canonical_id() {
        let id = RecordId::new();
        assert!(RecordId::is_canonical(&id.to_string()));
    }

    #[test]
    fn test_parse_valid_canonical_id() {
        let canonical = "550e8400e29b41d4a716446655440000";
        let id = RecordId::parse(canonical).expect("canonical id should parse");
        assert_eq!(id.to_string(), canonical);
    }

    #[test]
    fn test_parse_rejects_non_canonical_forms() {
        for input in [
            "550e8400-e29b-41d4-a716-446655440000",
            "550E8400E29B41D4A716446655440000",
            "550e8400e29b41d4a71644665544000",
            "550e8400e29b41d4a7164466554400000",
            "550e8400e29b41d4a716446655440zzz",
            "",
        ] {
            assert!(RecordId::parse(input).is_err(), "{input:?} should fail");
        }
    }

    #[test]
    fn test_sharded_dir_structure() {
        let id = RecordId::parse("550e8400e29b41d4a716446655440000").unwrap();
        let dir = id.sharded_dir(Path::new("/data/patients"));
        assert_eq!(
            dir,
            PathBuf::from("/data/patients/55/0e/550e8400e29b41d4a716446655440000")
        );
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let id = RecordId::parse("550e8400e29b41d4a716446655440000").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400e29b41d4a716446655440000\"");

        let back: RecordId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        let bad: Result<RecordId, _> =
            serde_json::from_str("\"550e8400-e29b-41d4-a716-446655440000\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_sha256_hash_from_bytes_is_hex() {
        let hash = Sha256Hash::from_bytes(&[0xab; 32]);
        assert_eq!(hash.as_str().len(), 64);
        assert!(hash.as_str().starts_with("abab"));
        assert!(Sha256Hash::parse(hash.as_str()).is_ok());
    }

    #[test]
    fn test_sha256_hash_from_bytes_keeps_leading_zeros() {
        let mut bytes = [0u8; 32];
        bytes[1] = 0x0f;
        bytes[2] = 0xff;
        bytes[31] = 0x01;
        let hash = Sha256Hash::from_bytes(&bytes);
        assert!(hash.as_str().starts_with("000fff00"));
        assert!(hash.as_str().ends_with("0001"));
    }

    #[test]
    fn test_sha256_hash_parse_rejects_short_input() {
        assert!(Sha256Hash::parse("abcd").is_err());
    }
}
