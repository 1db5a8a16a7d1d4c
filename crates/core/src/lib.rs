//! # Nadym Core
//!
//! Business logic for the Nadym practice management system.
//!
//! Every record is a YAML file in a sharded directory under the practice data directory (see
//! [`store`]). Each feature owns a service built from a shared [`CoreConfig`]:
//! - patients, appointments (with calendar views) and prescriptions
//! - medication observance: intakes, adherence reports and reminders
//! - teleconsultation rooms and chat, tele-expertise requests
//! - multidisciplinary meetings (RCP) and cancer care files (DCC)
//! - consultation audio transcription
//! - dashboard statistics
//!
//! **No API concerns**: authentication and HTTP routing belong in `api-shared` and `api-rest`.

pub mod appointments;
pub mod calendar;
pub mod config;
pub mod constants;
pub mod dcc;
pub mod error;
pub mod observance;
pub mod patients;
pub mod prescriptions;
pub mod rcp;
pub mod statistics;
pub mod store;
pub mod teleexpertise;
pub mod telemedicine;
pub mod transcription;
pub mod validation;

pub use config::CoreConfig;
pub use error::{FieldError, PracticeError, PracticeResult};
pub use nadym_types::{EmailAddress, NonEmptyText, TextError};
pub use nadym_uuid::{RecordId, Sha256Hash};
pub use store::{Page, PageRequest, SortDirection};
