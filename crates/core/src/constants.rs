//! Constants used throughout the Nadym core crate.
//!
//! Table names double as directory names under the practice data directory, so changing one
//! orphans every record already stored under the old name.

/// Default directory for practice data when no explicit directory is configured.
pub const DEFAULT_PRACTICE_DATA_DIR: &str = "practice_data";

/// Filename of the YAML document inside each record directory.
pub const RECORD_FILE_NAME: &str = "record.yaml";

pub const PATIENTS_TABLE: &str = "patients";
pub const APPOINTMENTS_TABLE: &str = "appointments";
pub const PRESCRIPTIONS_TABLE: &str = "prescriptions";
pub const INTAKES_TABLE: &str = "medication_intakes";
pub const REMINDERS_TABLE: &str = "medication_reminders";
pub const CONSULTATIONS_TABLE: &str = "video_consultations";
pub const CHAT_MESSAGES_TABLE: &str = "chat_messages";
pub const EXPERTISE_REQUESTS_TABLE: &str = "teleexpertise_requests";
pub const RCP_MEETINGS_TABLE: &str = "rcp_meetings";
pub const DCC_CASES_TABLE: &str = "dcc_cases";
pub const TRANSCRIPTIONS_TABLE: &str = "transcriptions";

/// Public STUN server handed to clients when none is configured.
pub const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";

/// Largest accepted consultation recording (100 MiB).
pub const DEFAULT_AUDIO_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// Page size used when a caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Upper bound on a requested page size.
pub const MAX_PAGE_SIZE: usize = 100;

/// Number of patients shown in the dashboard's "recent" panel.
pub const RECENT_PATIENTS_LIMIT: usize = 5;
