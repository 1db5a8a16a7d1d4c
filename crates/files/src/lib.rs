//! Nadym file storage
//!
//! Binary payloads (consultation recordings, chat attachments) are kept apart from the YAML
//! record they belong to:
//!
//! - Binary files are immutable once added (new content creates a new file)
//! - Files are addressed by the SHA-256 of their content
//! - Each record directory owns its files; there is no global binary namespace
//!
//! ```text
//! <table>/
//! └── <s1>/<s2>/<record_id>/
//!     ├── record.yaml
//!     └── files/
//!         └── sha256/
//!             └── ab/
//!                 └── cd/
//!                     └── abcd3f9e…
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use nadym_files::FilesService;
//! use nadym_uuid::RecordId;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = Path::new("practice_data/transcriptions");
//! let record_id = RecordId::parse("550e8400e29b41d4a716446655440000")?;
//!
//! let service = FilesService::new(root, record_id)?;
//! let metadata = service.add_bytes("consultation.wav", b"RIFF....WAVE")?;
//! println!("stored at {}", metadata.relative_path);
//! # Ok(())
//! # }
//! ```

mod files;

pub use files::{FileMetadata, FilesService};
pub use nadym_uuid::{RecordId, Sha256Hash};

/// Name of the per-record folder holding binary files.
pub const FILES_FOLDER_NAME: &str = "files";

/// Errors that can occur during file operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Record directory does not exist
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Original filename was empty once trimmed
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    /// File already exists in content-addressed storage (immutability violation)
    #[error("File with hash {0} already exists in storage")]
    FileAlreadyExists(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Identifier or hash failed validation
    #[error("UUID error: {0}")]
    Uuid(#[from] nadym_uuid::UuidError),
}
