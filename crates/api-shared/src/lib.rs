//! # API Shared
//!
//! Shared utilities and definitions for Nadym APIs.
//!
//! Contains:
//! - the health response and `HealthService`
//! - caller roles and the API key check, independent of any HTTP framework
//!
//! Used by `api-rest` and the `nadym-run` binary.

pub mod auth;
pub mod health;

pub use auth::{AuthError, Role};
pub use health::{HealthRes, HealthService};
