//! Video consultations and their chat.
//!
//! The media path itself runs peer to peer in the client. This module only tracks the
//! consultation lifecycle, allocates the room identifier both parties join, stores the chat
//! transcript and hands out the ICE server list from configuration.

use crate::config::CoreConfig;
use crate::constants::{CHAT_MESSAGES_TABLE, CONSULTATIONS_TABLE};
use crate::error::{PracticeError, PracticeResult};
use crate::patients::PatientService;
use crate::store::{Page, PageRequest, Query, Record, RecordStore, SortDirection};
use crate::validation::{optional_text, FieldErrors, REQUIRED};
use chrono::{DateTime, Utc};
use nadym_types::NonEmptyText;
use nadym_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const ROOM_PREFIX: &str = "room_";
const ROOM_SUFFIX_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsultationStatus {
    #[default]
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
    TechnicalIssue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VideoConsultation {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub doctor_id: NonEmptyText,
    pub scheduled_time: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: ConsultationStatus,
    pub room_id: String,
    pub recording_url: Option<String>,
    pub consultation_notes: Option<String>,
    pub technical_issues: Option<String>,
    pub duration_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for VideoConsultation {
    const TABLE: &'static str = CONSULTATIONS_TABLE;
    const KIND: &'static str = "consultation";

    fn id(&self) -> RecordId {
        self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderType {
    Doctor,
    Patient,
    Nurse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    #[default]
    Text,
    File,
    Image,
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ChatMessage {
    pub id: RecordId,
    pub consultation_id: RecordId,
    pub sender_id: NonEmptyText,
    pub sender_type: SenderType,
    pub content: NonEmptyText,
    pub message_type: MessageType,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

impl Record for ChatMessage {
    const TABLE: &'static str = CHAT_MESSAGES_TABLE;
    const KIND: &'static str = "chat message";

    fn id(&self) -> RecordId {
        self.id
    }

    // Messages are immutable apart from `read_at`, which is its own timestamp.
    fn touch(&mut self, _now: DateTime<Utc>) {}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct MessageDraft {
    pub sender_id: Option<String>,
    pub sender_type: Option<SenderType>,
    pub content: Option<String>,
    pub message_type: Option<MessageType>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct IceServer {
    pub urls: String,
}

/// Peer-connection settings for the browser client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct RtcConfig {
    pub ice_servers: Vec<IceServer>,
}

/// `room_` followed by 12 lowercase hex characters.
pub fn generate_room_id() -> String {
    let hex = RecordId::new().to_string();
    format!("{}{}", ROOM_PREFIX, &hex[..ROOM_SUFFIX_LEN])
}

pub fn is_valid_room_id(room_id: &str) -> bool {
    room_id
        .strip_prefix(ROOM_PREFIX)
        .is_some_and(|s| {
            s.len() == ROOM_SUFFIX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        })
}

/// Teleconsultation operations.
#[derive(Clone, Debug)]
pub struct TelemedicineService {
    cfg: Arc<CoreConfig>,
    consultations: RecordStore<VideoConsultation>,
    messages: RecordStore<ChatMessage>,
    patients: PatientService,
}

impl TelemedicineService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            consultations: RecordStore::new(&cfg),
            messages: RecordStore::new(&cfg),
            patients: PatientService::new(cfg.clone()),
            cfg,
        }
    }

    fn page_where(
        &self,
        keep: impl Fn(&VideoConsultation) -> bool + Send + Sync,
        page: PageRequest,
    ) -> Page<VideoConsultation> {
        let query = Query::new()
            .filter(keep)
            .order_by(
                |a: &VideoConsultation, b: &VideoConsultation| a.scheduled_time.cmp(&b.scheduled_time),
                SortDirection::Desc,
            )
            .paged(page);
        self.consultations.query(&query)
    }

    /// A doctor's consultations, latest scheduled first.
    pub fn doctor_consultations(&self, doctor_id: &str, page: PageRequest) -> Page<VideoConsultation> {
        let doctor_id = doctor_id.trim().to_owned();
        self.page_where(move |c| c.doctor_id.as_str() == doctor_id, page)
    }

    /// A patient's consultations, latest scheduled first.
    pub fn patient_consultations(
        &self,
        patient_id: RecordId,
        page: PageRequest,
    ) -> Page<VideoConsultation> {
        self.page_where(move |c| c.patient_id == patient_id, page)
    }

    pub fn get(&self, id: RecordId) -> PracticeResult<VideoConsultation> {
        self.consultations.get(id)
    }

    pub fn by_room(&self, room_id: &str) -> PracticeResult<VideoConsultation> {
        self.consultations
            .list()
            .into_iter()
            .find(|c| c.room_id == room_id)
            .ok_or_else(|| PracticeError::not_found("consultation room", room_id))
    }

    /// Schedules a consultation and allocates its room.
    pub fn schedule(
        &self,
        patient_id: RecordId,
        doctor_id: &str,
        scheduled_time: DateTime<Utc>,
    ) -> PracticeResult<VideoConsultation> {
        let doctor_id = NonEmptyText::new(doctor_id)
            .map_err(|_| PracticeError::field("doctor_id", REQUIRED))?;

        if !self.patients.exists(patient_id)? {
            return Err(PracticeError::field("patient_id", "patient does not exist"));
        }

        let room_id = self.allocate_room_id()?;
        let now = Utc::now();
        let consultation = self.consultations.insert(VideoConsultation {
            id: RecordId::new(),
            patient_id,
            doctor_id,
            scheduled_time,
            started_at: None,
            ended_at: None,
            status: ConsultationStatus::Scheduled,
            room_id,
            recording_url: None,
            consultation_notes: None,
            technical_issues: None,
            duration_minutes: None,
            created_at: now,
            updated_at: now,
        })?;

        tracing::info!(
            "scheduled consultation {} in {}",
            consultation.id,
            consultation.room_id
        );
        Ok(consultation)
    }

    fn allocate_room_id(&self) -> PracticeResult<String> {
        let taken: Vec<String> = self
            .consultations
            .list()
            .into_iter()
            .map(|c| c.room_id)
            .collect();

        for _attempt in 0..5 {
            let candidate = generate_room_id();
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
        }

        Err(PracticeError::Conflict(
            "could not allocate a unique consultation room".into(),
        ))
    }

    pub fn start(&self, id: RecordId, now: DateTime<Utc>) -> PracticeResult<VideoConsultation> {
        self.consultations.update(id, |c| {
            c.status = ConsultationStatus::InProgress;
            c.started_at = Some(now);
            Ok(())
        })
    }

    /// Completes a consultation. The duration is recorded in whole minutes when it was started.
    pub fn end(
        &self,
        id: RecordId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> PracticeResult<VideoConsultation> {
        self.consultations.update(id, |c| {
            c.status = ConsultationStatus::Completed;
            c.ended_at = Some(now);
            c.consultation_notes = optional_text(notes);
            if let Some(started) = c.started_at {
                c.duration_minutes = Some((now - started).num_minutes());
            }
            Ok(())
        })
    }

    /// Cancels a consultation. The reason is kept in `technical_issues`.
    pub fn cancel(&self, id: RecordId, reason: Option<String>) -> PracticeResult<VideoConsultation> {
        self.consultations.update(id, |c| {
            c.status = ConsultationStatus::Cancelled;
            c.technical_issues = optional_text(reason);
            Ok(())
        })
    }

    pub fn report_technical_issue(
        &self,
        id: RecordId,
        detail: &str,
    ) -> PracticeResult<VideoConsultation> {
        let detail = NonEmptyText::new(detail)
            .map_err(|_| PracticeError::field("technical_issues", REQUIRED))?;
        let updated = self.consultations.update(id, |c| {
            c.status = ConsultationStatus::TechnicalIssue;
            c.technical_issues = Some(detail.into_inner());
            Ok(())
        })?;
        tracing::warn!("technical issue reported on consultation {}", id);
        Ok(updated)
    }

    pub fn post_message(
        &self,
        consultation_id: RecordId,
        draft: MessageDraft,
        now: DateTime<Utc>,
    ) -> PracticeResult<ChatMessage> {
        let mut errors = FieldErrors::new();
        let sender_id = errors.required("sender_id", draft.sender_id.as_deref());
        if draft.sender_type.is_none() {
            errors.push("sender_type", REQUIRED);
        }
        let content = errors.required("content", draft.content.as_deref());
        errors.finish()?;

        let (Some(sender_id), Some(sender_type), Some(content)) =
            (sender_id, draft.sender_type, content)
        else {
            return Err(PracticeError::InvalidInput("message is incomplete".into()));
        };

        // Posting to an unknown consultation is a not-found, not a form error.
        self.consultations.get(consultation_id)?;

        self.messages.insert(ChatMessage {
            id: RecordId::new(),
            consultation_id,
            sender_id,
            sender_type,
            content,
            message_type: draft.message_type.unwrap_or_default(),
            sent_at: now,
            read_at: None,
            file_url: optional_text(draft.file_url),
            file_name: optional_text(draft.file_name),
            file_size: draft.file_size,
        })
    }

    /// Chat transcript of a consultation, oldest first.
    pub fn messages(&self, consultation_id: RecordId) -> Vec<ChatMessage> {
        let query = Query::new()
            .filter(move |m: &ChatMessage| m.consultation_id == consultation_id)
            .order_by(
                |a: &ChatMessage, b: &ChatMessage| a.sent_at.cmp(&b.sent_at),
                SortDirection::Asc,
            );
        self.messages.query(&query).items
    }

    pub fn mark_read(&self, message_id: RecordId, now: DateTime<Utc>) -> PracticeResult<ChatMessage> {
        self.messages.update(message_id, |m| {
            if m.read_at.is_none() {
                m.read_at = Some(now);
            }
            Ok(())
        })
    }

    pub fn rtc_config(&self) -> RtcConfig {
        RtcConfig {
            ice_servers: self
                .cfg
                .rtc_ice_servers()
                .iter()
                .map(|urls| IceServer { urls: urls.clone() })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_ICE_SERVER;
    use crate::patients::tests::{draft as patient_draft, test_cfg};
    use crate::patients::Patient;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn setup() -> (TempDir, TelemedicineService, Patient) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = test_cfg(temp_dir.path());
        let patient = PatientService::new(cfg.clone())
            .create(patient_draft("Marie", "Curie", "marie@example.fr"))
            .expect("patient create should succeed");
        (temp_dir, TelemedicineService::new(cfg), patient)
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_room_id_format() {
        let room = generate_room_id();
        assert!(is_valid_room_id(&room), "{room}");
        assert_eq!(room.len(), ROOM_PREFIX.len() + ROOM_SUFFIX_LEN);
        assert!(!is_valid_room_id("room_XYZ"));
        assert!(!is_valid_room_id("abc"));
    }

    #[test]
    fn test_schedule_and_lookup_by_room() {
        let (_tmp, service, patient) = setup();
        let c = service
            .schedule(patient.id, "dr-house", at(9, 0))
            .expect("schedule should succeed");

        assert_eq!(c.status, ConsultationStatus::Scheduled);
        assert!(is_valid_room_id(&c.room_id));
        assert_eq!(service.by_room(&c.room_id).unwrap().id, c.id);
        assert!(matches!(
            service.by_room("room_000000000000"),
            Err(PracticeError::NotFound { .. })
        ));
    }

    #[test]
    fn test_schedule_rejects_unknown_patient_and_blank_doctor() {
        let (_tmp, service, patient) = setup();
        assert!(matches!(
            service.schedule(RecordId::new(), "dr-house", at(9, 0)),
            Err(PracticeError::Validation(_))
        ));
        assert!(matches!(
            service.schedule(patient.id, "  ", at(9, 0)),
            Err(PracticeError::Validation(_))
        ));
    }

    #[test]
    fn test_start_then_end_records_duration() {
        let (_tmp, service, patient) = setup();
        let c = service.schedule(patient.id, "dr-house", at(9, 0)).unwrap();

        let started = service.start(c.id, at(9, 2)).unwrap();
        assert_eq!(started.status, ConsultationStatus::InProgress);

        let ended = service
            .end(c.id, Some("Follow up in a month".into()), at(9, 2) + Duration::seconds(25 * 60 + 40))
            .unwrap();
        assert_eq!(ended.status, ConsultationStatus::Completed);
        assert_eq!(ended.duration_minutes, Some(25));
        assert_eq!(ended.consultation_notes.as_deref(), Some("Follow up in a month"));
    }

    #[test]
    fn test_end_without_start_has_no_duration() {
        let (_tmp, service, patient) = setup();
        let c = service.schedule(patient.id, "dr-house", at(9, 0)).unwrap();
        let ended = service.end(c.id, None, at(10, 0)).unwrap();
        assert_eq!(ended.duration_minutes, None);
    }

    #[test]
    fn test_cancel_keeps_reason_in_technical_issues() {
        let (_tmp, service, patient) = setup();
        let c = service.schedule(patient.id, "dr-house", at(9, 0)).unwrap();
        let cancelled = service.cancel(c.id, Some("patient unavailable".into())).unwrap();
        assert_eq!(cancelled.status, ConsultationStatus::Cancelled);
        assert_eq!(cancelled.technical_issues.as_deref(), Some("patient unavailable"));

        let issue = service.report_technical_issue(c.id, "no audio").unwrap();
        assert_eq!(issue.status, ConsultationStatus::TechnicalIssue);
    }

    #[test]
    fn test_consultation_lists_are_paged_latest_first() {
        let (_tmp, service, patient) = setup();
        service.schedule(patient.id, "dr-house", at(9, 0)).unwrap();
        service.schedule(patient.id, "dr-house", at(11, 0)).unwrap();
        service.schedule(patient.id, "dr-grey", at(10, 0)).unwrap();

        let house = service.doctor_consultations("dr-house", PageRequest::default());
        assert_eq!(house.total_items, 2);
        assert_eq!(house.items[0].scheduled_time, at(11, 0));

        let mine = service.patient_consultations(patient.id, PageRequest::new(Some(0), Some(1)));
        assert_eq!(mine.total_items, 3);
        assert_eq!(mine.total_pages, 3);
    }

    #[test]
    fn test_chat_messages_in_order_and_mark_read() {
        let (_tmp, service, patient) = setup();
        let c = service.schedule(patient.id, "dr-house", at(9, 0)).unwrap();

        let message = |content: &str| MessageDraft {
            sender_id: Some("dr-house".into()),
            sender_type: Some(SenderType::Doctor),
            content: Some(content.into()),
            ..MessageDraft::default()
        };

        service.post_message(c.id, message("second"), at(9, 5)).unwrap();
        let first = service.post_message(c.id, message("first"), at(9, 1)).unwrap();
        assert_eq!(first.message_type, MessageType::Text);

        let contents: Vec<_> = service
            .messages(c.id)
            .into_iter()
            .map(|m| m.content.into_inner())
            .collect();
        assert_eq!(contents, ["first", "second"]);

        let read = service.mark_read(first.id, at(9, 6)).unwrap();
        assert_eq!(read.read_at, Some(at(9, 6)));
        let again = service.mark_read(first.id, at(9, 9)).unwrap();
        assert_eq!(again.read_at, Some(at(9, 6)));
    }

    #[test]
    fn test_post_message_validation() {
        let (_tmp, service, patient) = setup();
        let c = service.schedule(patient.id, "dr-house", at(9, 0)).unwrap();

        let empty = service.post_message(c.id, MessageDraft::default(), at(9, 1));
        let Err(PracticeError::Validation(list)) = empty else {
            panic!("expected validation error");
        };
        assert_eq!(list.len(), 3);

        let orphan = service.post_message(
            RecordId::new(),
            MessageDraft {
                sender_id: Some("p1".into()),
                sender_type: Some(SenderType::Patient),
                content: Some("hello".into()),
                ..MessageDraft::default()
            },
            at(9, 1),
        );
        assert!(matches!(orphan, Err(PracticeError::NotFound { .. })));
    }

    #[test]
    fn test_rtc_config_uses_configured_servers() {
        let (_tmp, service, _patient) = setup();
        assert_eq!(
            service.rtc_config().ice_servers,
            [IceServer {
                urls: DEFAULT_ICE_SERVER.to_owned()
            }]
        );
    }
}
