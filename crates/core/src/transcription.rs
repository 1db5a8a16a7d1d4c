//! Consultation audio transcription.
//!
//! Audio is stored content-addressed next to the transcription record through
//! [`nadym_files::FilesService`]. Speech-to-text happens outside Nadym: callers hand the raw
//! text to [`TranscriptionService::process`], which runs it through a [`NoteStructurer`] to
//! produce the structured clinical note.

use crate::config::CoreConfig;
use crate::constants::TRANSCRIPTIONS_TABLE;
use crate::error::{PracticeError, PracticeResult};
use crate::patients::PatientService;
use crate::store::{Page, PageRequest, Query, Record, RecordStore, SortDirection};
use crate::validation::{optional_text, FieldErrors, REQUIRED};
use chrono::{DateTime, Utc};
use nadym_files::{FilesError, FilesService};
use nadym_types::NonEmptyText;
use nadym_uuid::{RecordId, Sha256Hash};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Content types accepted for uploaded recordings.
pub const ALLOWED_AUDIO_TYPES: &[&str] = &[
    "audio/mp3",
    "audio/wav",
    "audio/m4a",
    "audio/ogg",
    "audio/mpeg",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranscriptionStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// A stored recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AudioFile {
    #[schema(value_type = String)]
    pub hash: Sha256Hash,
    pub content_type: String,
    /// Media type sniffed from the bytes, when recognised.
    pub detected_media_type: Option<String>,
    pub original_filename: String,
    pub size_bytes: u64,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Transcription {
    pub id: RecordId,
    pub consultation_id: RecordId,
    pub doctor_id: NonEmptyText,
    pub patient_id: Option<RecordId>,
    pub audio_file_url: Option<String>,
    pub audio: Option<AudioFile>,
    pub raw_transcription: Option<String>,
    pub structured_notes: Option<String>,
    pub medical_summary: Option<String>,
    pub key_findings: Option<String>,
    pub recommendations: Option<String>,
    pub status: TranscriptionStatus,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub confidence_score: Option<f64>,
    pub language_detected: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Transcription {
    const TABLE: &'static str = TRANSCRIPTIONS_TABLE;
    const KIND: &'static str = "transcription";

    fn id(&self) -> RecordId {
        self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct TranscriptionDraft {
    pub consultation_id: Option<RecordId>,
    pub doctor_id: Option<String>,
    pub patient_id: Option<RecordId>,
    pub audio_file_url: Option<String>,
}

/// Output of a [`NoteStructurer`].
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredNote {
    pub structured_notes: String,
    pub medical_summary: String,
    pub key_findings: String,
    pub recommendations: String,
    pub confidence_score: Option<f64>,
    pub language_detected: Option<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StructurerError(pub String);

/// Turns a raw consultation transcript into a structured clinical note.
pub trait NoteStructurer: Send + Sync {
    fn structure(&self, raw_text: &str) -> Result<StructuredNote, StructurerError>;
}

/// Keeps the raw text as the note and marks the derived sections unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughStructurer;

impl PassthroughStructurer {
    pub const SUMMARY_UNAVAILABLE: &'static str =
        "Medical summary unavailable: no note structuring service configured";
    pub const FINDINGS_UNAVAILABLE: &'static str = "Key findings unavailable";
    pub const RECOMMENDATIONS_UNAVAILABLE: &'static str = "Recommendations unavailable";
}

impl NoteStructurer for PassthroughStructurer {
    fn structure(&self, raw_text: &str) -> Result<StructuredNote, StructurerError> {
        Ok(StructuredNote {
            structured_notes: raw_text.to_owned(),
            medical_summary: Self::SUMMARY_UNAVAILABLE.to_owned(),
            key_findings: Self::FINDINGS_UNAVAILABLE.to_owned(),
            recommendations: Self::RECOMMENDATIONS_UNAVAILABLE.to_owned(),
            confidence_score: None,
            language_detected: None,
        })
    }
}

/// `audio/wav; codecs=1` becomes `audio/wav`.
fn normalise_content_type(declared: &str) -> String {
    declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn files_error(err: FilesError) -> PracticeError {
    match err {
        FilesError::FileAlreadyExists(hash) => {
            PracticeError::Conflict(format!("audio {} is already stored", hash))
        }
        other => PracticeError::Files(other),
    }
}

#[derive(Clone, Debug)]
pub struct TranscriptionService {
    cfg: Arc<CoreConfig>,
    store: RecordStore<Transcription>,
    patients: PatientService,
}

impl TranscriptionService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            store: RecordStore::new(&cfg),
            patients: PatientService::new(cfg.clone()),
            cfg,
        }
    }

    /// A doctor's transcriptions, newest first.
    pub fn doctor_transcriptions(&self, doctor_id: &str, page: PageRequest) -> Page<Transcription> {
        let doctor_id = doctor_id.trim().to_owned();
        let query = Query::new()
            .filter(move |t: &Transcription| t.doctor_id.as_str() == doctor_id)
            .order_by(
                |a: &Transcription, b: &Transcription| a.created_at.cmp(&b.created_at),
                SortDirection::Desc,
            )
            .paged(page);
        self.store.query(&query)
    }

    pub fn get(&self, id: RecordId) -> PracticeResult<Transcription> {
        self.store.get(id)
    }

    pub fn by_consultation(&self, consultation_id: RecordId) -> Vec<Transcription> {
        let query = Query::new()
            .filter(move |t: &Transcription| t.consultation_id == consultation_id)
            .order_by(
                |a: &Transcription, b: &Transcription| a.created_at.cmp(&b.created_at),
                SortDirection::Asc,
            );
        self.store.query(&query).items
    }

    fn new_record(&self, draft: TranscriptionDraft) -> PracticeResult<Transcription> {
        let mut errors = FieldErrors::new();
        if draft.consultation_id.is_none() {
            errors.push("consultation_id", REQUIRED);
        }
        let doctor_id = errors.required("doctor_id", draft.doctor_id.as_deref());
        errors.finish()?;

        let (Some(consultation_id), Some(doctor_id)) = (draft.consultation_id, doctor_id) else {
            return Err(PracticeError::InvalidInput(
                "transcription form is incomplete".into(),
            ));
        };

        if let Some(patient_id) = draft.patient_id {
            if !self.patients.exists(patient_id)? {
                return Err(PracticeError::field("patient_id", "patient does not exist"));
            }
        }

        let now = Utc::now();
        Ok(Transcription {
            id: RecordId::new(),
            consultation_id,
            doctor_id,
            patient_id: draft.patient_id,
            audio_file_url: optional_text(draft.audio_file_url),
            audio: None,
            raw_transcription: None,
            structured_notes: None,
            medical_summary: None,
            key_findings: None,
            recommendations: None,
            status: TranscriptionStatus::Pending,
            processing_started_at: None,
            processing_completed_at: None,
            error_message: None,
            confidence_score: None,
            language_detected: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Registers a transcription for audio already hosted elsewhere.
    pub fn create(&self, draft: TranscriptionDraft) -> PracticeResult<Transcription> {
        let record = self.store.insert(self.new_record(draft)?)?;
        tracing::info!(
            "created transcription {} for consultation {}",
            record.id,
            record.consultation_id
        );
        Ok(record)
    }

    /// Creates a transcription and stores its recording.
    ///
    /// The declared content type must be one of [`ALLOWED_AUDIO_TYPES`] and the payload must
    /// fit the configured audio limit. Nothing is kept when storing the audio fails.
    pub fn upload_audio(
        &self,
        draft: TranscriptionDraft,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> PracticeResult<Transcription> {
        let content_type = normalise_content_type(content_type);
        let mut errors = FieldErrors::new();
        if !ALLOWED_AUDIO_TYPES.contains(&content_type.as_str()) {
            errors.push(
                "audio",
                format!("unsupported audio type '{}'", content_type),
            );
        }
        if bytes.is_empty() {
            errors.push("audio", "the audio file is empty");
        } else if bytes.len() as u64 > self.cfg.audio_max_bytes() {
            errors.push(
                "audio",
                format!("the audio file exceeds {} bytes", self.cfg.audio_max_bytes()),
            );
        }
        if filename.trim().is_empty() {
            errors.push("filename", REQUIRED);
        }
        errors.finish()?;

        let mut record = self.new_record(draft)?;
        record.audio_file_url = Some(format!("/api/transcriptions/{}/audio", record.id));
        let record = self.store.insert(record)?;

        let stored = FilesService::new(self.store.table_dir(), record.id)
            .and_then(|files| files.add_bytes(filename, bytes));
        let metadata = match stored {
            Ok(metadata) => metadata,
            Err(e) => {
                if let Err(cleanup) = self.store.delete(record.id) {
                    tracing::warn!(
                        "failed to remove transcription {} after audio error: {}",
                        record.id,
                        cleanup
                    );
                }
                return Err(files_error(e));
            }
        };

        let updated = self.store.update(record.id, |t| {
            t.audio = Some(AudioFile {
                hash: metadata.hash,
                content_type,
                detected_media_type: metadata.media_type.map(NonEmptyText::into_inner),
                original_filename: metadata.original_filename.into_inner(),
                size_bytes: metadata.size_bytes,
                stored_at: metadata.stored_at,
            });
            Ok(())
        })?;

        tracing::info!(
            "stored {} bytes of audio for transcription {}",
            bytes.len(),
            updated.id
        );
        Ok(updated)
    }

    /// Returns the stored recording and its bytes.
    pub fn read_audio(&self, id: RecordId) -> PracticeResult<(AudioFile, Vec<u8>)> {
        let record = self.store.get(id)?;
        let audio = record
            .audio
            .ok_or_else(|| PracticeError::not_found("transcription audio", id))?;
        let bytes = FilesService::new(self.store.table_dir(), id)
            .and_then(|files| files.read(&audio.hash))
            .map_err(files_error)?;
        Ok((audio, bytes))
    }

    /// Structures `raw_text` into the transcription's notes.
    ///
    /// A structurer failure is recorded on the transcription (status FAILED with the message)
    /// rather than returned, so the caller always gets the saved record back.
    pub fn process(
        &self,
        id: RecordId,
        raw_text: &str,
        structurer: &dyn NoteStructurer,
        now: DateTime<Utc>,
    ) -> PracticeResult<Transcription> {
        let raw_text = NonEmptyText::new(raw_text)
            .map_err(|_| PracticeError::field("raw_text", REQUIRED))?;

        self.store.update(id, |t| {
            if t.status == TranscriptionStatus::Cancelled {
                return Err(PracticeError::Conflict(format!(
                    "transcription {} was cancelled",
                    t.id
                )));
            }
            t.status = TranscriptionStatus::Processing;
            t.processing_started_at = Some(now);
            t.raw_transcription = Some(raw_text.as_str().to_owned());
            t.error_message = None;
            Ok(())
        })?;

        let outcome = structurer.structure(raw_text.as_str());
        let processed = self.store.update(id, |t| {
            match outcome {
                Ok(note) => {
                    t.status = TranscriptionStatus::Completed;
                    t.structured_notes = Some(note.structured_notes);
                    t.medical_summary = Some(note.medical_summary);
                    t.key_findings = Some(note.key_findings);
                    t.recommendations = Some(note.recommendations);
                    t.confidence_score = note.confidence_score;
                    t.language_detected = note.language_detected;
                }
                Err(e) => {
                    t.status = TranscriptionStatus::Failed;
                    t.error_message = Some(e.to_string());
                }
            }
            t.processing_completed_at = Some(now);
            Ok(())
        })?;

        if processed.status == TranscriptionStatus::Failed {
            tracing::error!(
                "structuring transcription {} failed: {}",
                id,
                processed.error_message.as_deref().unwrap_or_default()
            );
        }
        Ok(processed)
    }

    pub fn cancel(&self, id: RecordId) -> PracticeResult<Transcription> {
        self.store.update(id, |t| {
            t.status = TranscriptionStatus::Cancelled;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patients::tests::{draft as patient_draft, test_cfg};
    use crate::patients::Patient;
    use chrono::TimeZone;
    use tempfile::TempDir;

    // Minimal RIFF/WAVE header followed by a few samples.
    const WAV: &[u8] = &[
        0x52, 0x49, 0x46, 0x46, 0x2c, 0x00, 0x00, 0x00, 0x57, 0x41, 0x56, 0x45, 0x66, 0x6d, 0x74,
        0x20, 0x10, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x40, 0x1f, 0x00, 0x00, 0x80, 0x3e,
        0x00, 0x00, 0x02, 0x00, 0x10, 0x00, 0x64, 0x61, 0x74, 0x61, 0x08, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x10, 0x00, 0x20, 0x00, 0x10, 0x00,
    ];

    struct Failing;

    impl NoteStructurer for Failing {
        fn structure(&self, _raw_text: &str) -> Result<StructuredNote, StructurerError> {
            Err(StructurerError("structuring service unreachable".into()))
        }
    }

    fn setup_with(cfg: Arc<CoreConfig>) -> (TranscriptionService, Patient) {
        let patient = PatientService::new(cfg.clone())
            .create(patient_draft("Louise", "Michel", "louise@example.fr"))
            .expect("patient create should succeed");
        (TranscriptionService::new(cfg), patient)
    }

    fn draft(patient: &Patient, consultation_id: RecordId) -> TranscriptionDraft {
        TranscriptionDraft {
            consultation_id: Some(consultation_id),
            doctor_id: Some("dr-house".into()),
            patient_id: Some(patient.id),
            audio_file_url: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_upload_stores_and_reads_back_audio() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let (service, patient) = setup_with(test_cfg(temp_dir.path()));

        let t = service
            .upload_audio(draft(&patient, RecordId::new()), "visit.wav", "audio/wav", WAV)
            .expect("upload should succeed");

        let audio = t.audio.clone().expect("audio metadata should be recorded");
        assert_eq!(audio.content_type, "audio/wav");
        assert_eq!(audio.size_bytes, WAV.len() as u64);
        assert_eq!(audio.original_filename, "visit.wav");
        assert_eq!(
            t.audio_file_url.as_deref(),
            Some(format!("/api/transcriptions/{}/audio", t.id).as_str())
        );

        let (meta, bytes) = service.read_audio(t.id).expect("read should succeed");
        assert_eq!(meta, audio);
        assert_eq!(bytes, WAV);
    }

    #[test]
    fn test_upload_rejects_type_and_size() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = Arc::new(
            CoreConfig::new(
                temp_dir.path().to_path_buf(),
                vec!["stun:stun.example.org".into()],
                16,
            )
            .expect("config should be valid"),
        );
        let (service, patient) = setup_with(cfg);

        let wrong_type =
            service.upload_audio(draft(&patient, RecordId::new()), "notes.txt", "text/plain", b"hi");
        assert!(matches!(wrong_type, Err(PracticeError::Validation(_))));

        let too_big =
            service.upload_audio(draft(&patient, RecordId::new()), "visit.wav", "audio/wav", WAV);
        let Err(PracticeError::Validation(errors)) = too_big else {
            panic!("expected validation error");
        };
        assert_eq!(errors[0].message, "the audio file exceeds 16 bytes");
        assert_eq!(service.doctor_transcriptions("dr-house", PageRequest::default()).total_items, 0);
    }

    #[test]
    fn test_content_type_parameters_are_ignored() {
        assert_eq!(normalise_content_type(" Audio/OGG; codecs=opus"), "audio/ogg");
    }

    #[test]
    fn test_process_with_passthrough() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let (service, patient) = setup_with(test_cfg(temp_dir.path()));
        let t = service.create(draft(&patient, RecordId::new())).unwrap();
        assert_eq!(t.status, TranscriptionStatus::Pending);

        let done = service
            .process(t.id, "Patient reports chest pain.", &PassthroughStructurer, now())
            .unwrap();
        assert_eq!(done.status, TranscriptionStatus::Completed);
        assert_eq!(done.structured_notes.as_deref(), Some("Patient reports chest pain."));
        assert_eq!(
            done.medical_summary.as_deref(),
            Some(PassthroughStructurer::SUMMARY_UNAVAILABLE)
        );
        assert_eq!(done.processing_started_at, Some(now()));
        assert_eq!(done.processing_completed_at, Some(now()));
    }

    #[test]
    fn test_structurer_failure_marks_failed() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let (service, patient) = setup_with(test_cfg(temp_dir.path()));
        let t = service.create(draft(&patient, RecordId::new())).unwrap();

        let failed = service.process(t.id, "some words", &Failing, now()).unwrap();
        assert_eq!(failed.status, TranscriptionStatus::Failed);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("structuring service unreachable")
        );
        assert_eq!(failed.raw_transcription.as_deref(), Some("some words"));
    }

    #[test]
    fn test_cancelled_transcription_is_not_processed() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let (service, patient) = setup_with(test_cfg(temp_dir.path()));
        let t = service.create(draft(&patient, RecordId::new())).unwrap();
        service.cancel(t.id).unwrap();

        assert!(matches!(
            service.process(t.id, "text", &PassthroughStructurer, now()),
            Err(PracticeError::Conflict(_))
        ));
        assert!(matches!(
            service.process(t.id, "   ", &PassthroughStructurer, now()),
            Err(PracticeError::Validation(_))
        ));
    }

    #[test]
    fn test_lookups() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let (service, patient) = setup_with(test_cfg(temp_dir.path()));
        let consultation = RecordId::new();
        let t = service.create(draft(&patient, consultation)).unwrap();
        service.create(draft(&patient, RecordId::new())).unwrap();

        let found: Vec<_> = service.by_consultation(consultation).into_iter().map(|t| t.id).collect();
        assert_eq!(found, [t.id]);
        assert_eq!(
            service.doctor_transcriptions("dr-house", PageRequest::default()).total_items,
            2
        );
        assert!(matches!(
            service.read_audio(t.id),
            Err(PracticeError::NotFound { .. })
        ));

        let mut missing_patient = draft(&patient, consultation);
        missing_patient.patient_id = Some(RecordId::new());
        assert!(matches!(
            service.create(missing_patient),
            Err(PracticeError::Validation(_))
        ));
    }
}
