//! Record-scoped file storage.
//!
//! [`FilesService`] stores binary payloads beside the YAML record that owns them. Paths are
//! derived from the SHA-256 of the content, so the same recording uploaded twice to one
//! record is detected rather than silently overwritten.
//!
//! The service is stateless: the constructor validates the record directory and nothing is
//! created on disk until the first [`FilesService::add_bytes`] call.

use crate::{FilesError, FILES_FOLDER_NAME};
use chrono::{DateTime, Utc};
use nadym_types::NonEmptyText;
use nadym_uuid::{RecordId, Sha256Hash};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata for a stored file.
///
/// Serialised inside the owning record's YAML, so it carries no patient identifiers of its
/// own.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    /// Always "sha256" for now
    pub hash_algorithm: NonEmptyText,

    pub hash: Sha256Hash,

    /// Path relative to the record directory
    pub relative_path: NonEmptyText,

    pub size_bytes: u64,

    /// Best-effort sniffed media type; `None` when the content is not recognised.
    pub media_type: Option<NonEmptyText>,

    pub original_filename: NonEmptyText,

    pub stored_at: DateTime<Utc>,
}

/// Binary storage bound to one record directory.
#[derive(Debug)]
pub struct FilesService {
    record_root: PathBuf,
}

impl FilesService {
    /// Creates a service for the record `record_id` stored under `table_dir`.
    ///
    /// # Errors
    ///
    /// - [`FilesError::InvalidRootDirectory`] if `table_dir` is missing or not a directory
    /// - [`FilesError::RecordNotFound`] if the record's sharded directory does not exist
    pub fn new(table_dir: &Path, record_id: RecordId) -> Result<Self, FilesError> {
        if !table_dir.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                table_dir.display()
            )));
        }

        let table_dir = table_dir.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                table_dir.display(),
                e
            ))
        })?;

        let record_root = record_id.sharded_dir(&table_dir);
        if !record_root.is_dir() {
            return Err(FilesError::RecordNotFound(format!(
                "Record directory does not exist: {}",
                record_root.display()
            )));
        }

        Ok(Self { record_root })
    }

    /// Stores `bytes` in content-addressed storage and returns its metadata.
    ///
    /// Files live at `<record>/files/sha256/<h[0..2]>/<h[2..4]>/<hash>`.
    ///
    /// # Errors
    ///
    /// - [`FilesError::InvalidFilename`] if `original_filename` is blank
    /// - [`FilesError::FileAlreadyExists`] if identical content is already stored for this record
    /// - [`FilesError::Io`] if the directory or file cannot be written
    pub fn add_bytes(
        &self,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<FileMetadata, FilesError> {
        let original_filename = NonEmptyText::new(original_filename)
            .map_err(|_| FilesError::InvalidFilename(original_filename.to_owned()))?;

        let digest: [u8; 32] = Sha256::digest(bytes).into();
        let hash = Sha256Hash::from_bytes(&digest);

        let relative_path = Self::relative_path(&hash);
        let storage_path = self.record_root.join(&relative_path);

        if storage_path.exists() {
            return Err(FilesError::FileAlreadyExists(hash.to_string()));
        }

        if let Some(parent) = storage_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                FilesError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create storage directory {}: {}",
                        parent.display(),
                        e
                    ),
                ))
            })?;
        }

        fs::write(&storage_path, bytes).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write file to {}: {}", storage_path.display(), e),
            ))
        })?;

        let media_type = infer::get(bytes).and_then(|kind| NonEmptyText::new(kind.mime_type()).ok());

        Ok(FileMetadata {
            hash_algorithm: text("sha256")?,
            hash,
            relative_path: text(&relative_path)?,
            size_bytes: bytes.len() as u64,
            media_type,
            original_filename,
            stored_at: Utc::now(),
        })
    }

    /// Reads back a stored file by hash.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::Io`] with kind `NotFound` when no file has that hash.
    pub fn read(&self, hash: &Sha256Hash) -> Result<Vec<u8>, FilesError> {
        let storage_path = self.record_root.join(Self::relative_path(hash));

        if !storage_path.exists() {
            return Err(FilesError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found for hash: {}", hash),
            )));
        }

        fs::read(&storage_path).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read file from {}: {}", storage_path.display(), e),
            ))
        })
    }

    /// Returns true if content with this hash is stored for the record.
    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.record_root.join(Self::relative_path(hash)).is_file()
    }

    /// Directory of the record this service is bound to.
    #[must_use]
    pub fn record_root(&self) -> &Path {
        &self.record_root
    }

    fn relative_path(hash: &Sha256Hash) -> String {
        let hex = hash.as_str();
        format!("{}/sha256/{}/{}/{}", FILES_FOLDER_NAME, &hex[0..2], &hex[2..4], hex)
    }
}

fn text(value: &str) -> Result<NonEmptyText, FilesError> {
    NonEmptyText::new(value).map_err(|_| FilesError::InvalidFilename(value.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const WAV_HEADER: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt \x10\x00\x00\x00";

    fn setup_record() -> (TempDir, PathBuf, RecordId) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let table_dir = temp_dir.path().join("transcriptions");
        let record_id = RecordId::new();
        fs::create_dir_all(record_id.sharded_dir(&table_dir))
            .expect("Failed to create record dir");
        (temp_dir, table_dir, record_id)
    }

    #[test]
    fn test_files_service_root_not_exists() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let missing = temp_dir.path().join("missing");
        let result = FilesService::new(&missing, RecordId::new());
        assert!(matches!(result, Err(FilesError::InvalidRootDirectory(_))));
    }

    #[test]
    fn test_files_service_record_not_exists() {
        let (_temp, table_dir, _) = setup_record();
        let result = FilesService::new(&table_dir, RecordId::new());
        assert!(matches!(result, Err(FilesError::RecordNotFound(_))));
    }

    #[test]
    fn test_add_bytes_success() {
        let (_temp, table_dir, record_id) = setup_record();
        let service = FilesService::new(&table_dir, record_id).expect("service should build");

        let metadata = service
            .add_bytes("consultation.wav", WAV_HEADER)
            .expect("add_bytes should succeed");

        assert_eq!(metadata.hash_algorithm.as_str(), "sha256");
        assert_eq!(metadata.size_bytes, WAV_HEADER.len() as u64);
        assert_eq!(metadata.original_filename.as_str(), "consultation.wav");
        assert_eq!(
            metadata.media_type.as_ref().map(NonEmptyText::as_str),
            Some("audio/x-wav")
        );

        let hex = metadata.hash.as_str();
        let expected = format!("files/sha256/{}/{}/{}", &hex[0..2], &hex[2..4], hex);
        assert_eq!(metadata.relative_path.as_str(), expected);
        assert!(service.record_root().join(&expected).is_file());
    }

    #[test]
    fn test_add_bytes_immutability() {
        let (_temp, table_dir, record_id) = setup_record();
        let service = FilesService::new(&table_dir, record_id).unwrap();

        service.add_bytes("a.wav", WAV_HEADER).unwrap();
        let second = service.add_bytes("b.wav", WAV_HEADER);
        assert!(matches!(second, Err(FilesError::FileAlreadyExists(_))));
    }

    #[test]
    fn test_add_bytes_rejects_blank_filename() {
        let (_temp, table_dir, record_id) = setup_record();
        let service = FilesService::new(&table_dir, record_id).unwrap();
        let result = service.add_bytes("   ", b"data");
        assert!(matches!(result, Err(FilesError::InvalidFilename(_))));
    }

    #[test]
    fn test_unknown_content_has_no_media_type() {
        let (_temp, table_dir, record_id) = setup_record();
        let service = FilesService::new(&table_dir, record_id).unwrap();
        let metadata = service.add_bytes("notes.txt", b"plain words").unwrap();
        assert!(metadata.media_type.is_none());
    }

    #[test]
    fn test_read_file_success() {
        let (_temp, table_dir, record_id) = setup_record();
        let service = FilesService::new(&table_dir, record_id).unwrap();
        let metadata = service.add_bytes("consultation.wav", WAV_HEADER).unwrap();

        assert!(service.contains(&metadata.hash));
        let bytes = service.read(&metadata.hash).expect("read should succeed");
        assert_eq!(bytes, WAV_HEADER);
    }

    #[test]
    fn test_read_file_not_found() {
        let (_temp, table_dir, record_id) = setup_record();
        let service = FilesService::new(&table_dir, record_id).unwrap();
        let hash = Sha256Hash::from_bytes(&[0u8; 32]);

        assert!(!service.contains(&hash));
        match service.read(&hash) {
            Err(FilesError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_metadata_serialises_to_yaml() {
        let (_temp, table_dir, record_id) = setup_record();
        let service = FilesService::new(&table_dir, record_id).unwrap();
        let metadata = service.add_bytes("consultation.wav", WAV_HEADER).unwrap();

        let yaml = serde_yaml::to_string(&metadata).unwrap();
        let back: FileMetadata = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, metadata);
    }
}
