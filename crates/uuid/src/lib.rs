//! Record identifiers and sharded-path utilities.
//!
//! Nadym stores every record (patients, appointments, prescriptions and the feature-local
//! records) under a sharded directory derived from its identifier.
//!
//! To keep path derivation deterministic, identifiers use a *canonical* representation:
//! **32 lowercase hexadecimal characters** (no hyphens), the same value you would get from
//! `Uuid::new_v4().simple().to_string()`.
//!
//! ## Sharded directory layout
//! For a canonical id `u`, a record lives under:
//! `table_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `practice_data/patients/55/0e/550e8400e29b41d4a716446655440000/`

mod ids;

pub use ids::{RecordId, Sha256Hash, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
