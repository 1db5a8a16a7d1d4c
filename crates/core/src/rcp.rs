//! Multidisciplinary team meetings (RCP) discussing one patient's case.
//!
//! Participants live inside the meeting record. The organizer is always a participant with
//! the ORGANIZER role.

use crate::config::CoreConfig;
use crate::constants::RCP_MEETINGS_TABLE;
use crate::error::{PracticeError, PracticeResult};
use crate::patients::PatientService;
use crate::store::{Query, Record, RecordStore, SortDirection};
use crate::validation::{optional_text, FieldErrors, REQUIRED};
use chrono::{DateTime, Utc};
use nadym_types::NonEmptyText;
use nadym_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MIN_DURATION_MINUTES: i64 = 15;
pub const MAX_DURATION_MINUTES: i64 = 480;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeetingStatus {
    #[default]
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Postponed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeetingType {
    #[default]
    Virtual,
    Physical,
    Hybrid,
}

impl MeetingType {
    pub fn needs_location(self) -> bool {
        matches!(self, MeetingType::Physical | MeetingType::Hybrid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
    Organizer,
    Presenter,
    #[default]
    Participant,
    Observer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Attendance {
    #[default]
    Invited,
    Confirmed,
    Attended,
    Absent,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Participant {
    pub doctor_id: NonEmptyText,
    pub doctor_name: Option<String>,
    pub specialty: Option<String>,
    pub role: ParticipantRole,
    pub attendance: Attendance,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
    pub contribution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RcpMeeting {
    pub id: RecordId,
    pub title: NonEmptyText,
    pub patient_id: RecordId,
    pub organizer_id: NonEmptyText,
    pub scheduled_date: DateTime<Utc>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub status: MeetingStatus,
    pub meeting_type: MeetingType,
    pub location: Option<String>,
    pub room_url: Option<String>,
    pub pathology: NonEmptyText,
    pub clinical_summary: NonEmptyText,
    pub decision_summary: Option<String>,
    pub recommendations: Option<String>,
    pub next_steps: Option<String>,
    pub duration_minutes: Option<i64>,
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RcpMeeting {
    pub fn participant(&self, doctor_id: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.doctor_id.as_str() == doctor_id)
    }
}

impl Record for RcpMeeting {
    const TABLE: &'static str = RCP_MEETINGS_TABLE;
    const KIND: &'static str = "rcp meeting";

    fn id(&self) -> RecordId {
        self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct ParticipantDraft {
    pub doctor_id: Option<String>,
    pub doctor_name: Option<String>,
    pub specialty: Option<String>,
    pub role: Option<ParticipantRole>,
}

impl ParticipantDraft {
    fn check(self, prefix: &str, errors: &mut FieldErrors) -> Option<Participant> {
        let doctor_id = errors.required(&format!("{prefix}doctor_id"), self.doctor_id.as_deref())?;
        Some(Participant {
            doctor_id,
            doctor_name: optional_text(self.doctor_name),
            specialty: optional_text(self.specialty),
            role: self.role.unwrap_or_default(),
            attendance: Attendance::Invited,
            joined_at: None,
            left_at: None,
            contribution: None,
        })
    }
}

/// Meeting form, used for both creation and full updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct RcpMeetingDraft {
    pub title: Option<String>,
    pub patient_id: Option<RecordId>,
    pub organizer_id: Option<String>,
    pub organizer_name: Option<String>,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub meeting_type: Option<MeetingType>,
    pub location: Option<String>,
    pub room_url: Option<String>,
    pub pathology: Option<String>,
    pub clinical_summary: Option<String>,
    pub duration_minutes: Option<i64>,
    pub participants: Vec<ParticipantDraft>,
}

struct MeetingForm {
    title: NonEmptyText,
    patient_id: RecordId,
    organizer_id: NonEmptyText,
    organizer_name: Option<String>,
    scheduled_date: DateTime<Utc>,
    meeting_type: MeetingType,
    location: Option<String>,
    room_url: Option<String>,
    pathology: NonEmptyText,
    clinical_summary: NonEmptyText,
    duration_minutes: Option<i64>,
    participants: Vec<Participant>,
}

impl RcpMeetingDraft {
    fn validate(self) -> PracticeResult<MeetingForm> {
        let mut errors = FieldErrors::new();
        let title = errors.required("title", self.title.as_deref());
        if self.patient_id.is_none() {
            errors.push("patient_id", REQUIRED);
        }
        let organizer_id = errors.required("organizer_id", self.organizer_id.as_deref());
        if self.scheduled_date.is_none() {
            errors.push("scheduled_date", REQUIRED);
        }
        let pathology = errors.required("pathology", self.pathology.as_deref());
        let clinical_summary = errors.required("clinical_summary", self.clinical_summary.as_deref());
        errors.range(
            "duration_minutes",
            self.duration_minutes,
            MIN_DURATION_MINUTES,
            MAX_DURATION_MINUTES,
        );

        let meeting_type = self.meeting_type.unwrap_or_default();
        let location = optional_text(self.location);
        if meeting_type.needs_location() && location.is_none() {
            errors.push("location", "a location is required for physical and hybrid meetings");
        }

        let participants: Vec<Option<Participant>> = self
            .participants
            .into_iter()
            .enumerate()
            .map(|(i, p)| p.check(&format!("participants[{i}]."), &mut errors))
            .collect();

        errors.finish()?;

        let (
            Some(title),
            Some(patient_id),
            Some(organizer_id),
            Some(scheduled_date),
            Some(pathology),
            Some(clinical_summary),
        ) = (
            title,
            self.patient_id,
            organizer_id,
            self.scheduled_date,
            pathology,
            clinical_summary,
        )
        else {
            return Err(PracticeError::InvalidInput("meeting form is incomplete".into()));
        };

        Ok(MeetingForm {
            title,
            patient_id,
            organizer_id,
            organizer_name: optional_text(self.organizer_name),
            scheduled_date,
            meeting_type,
            location,
            room_url: optional_text(self.room_url),
            pathology,
            clinical_summary,
            duration_minutes: self.duration_minutes,
            participants: participants.into_iter().flatten().collect(),
        })
    }
}

/// Outcome recorded when a meeting completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct MeetingDecision {
    pub decision_summary: Option<String>,
    pub recommendations: Option<String>,
    pub next_steps: Option<String>,
}

/// Puts the organizer first with the ORGANIZER role, adding them when absent.
fn ensure_organizer(
    mut participants: Vec<Participant>,
    organizer_id: &NonEmptyText,
    organizer_name: Option<String>,
) -> Vec<Participant> {
    match participants.iter().position(|p| &p.doctor_id == organizer_id) {
        Some(i) => {
            let mut organizer = participants.remove(i);
            organizer.role = ParticipantRole::Organizer;
            if organizer.doctor_name.is_none() {
                organizer.doctor_name = organizer_name;
            }
            participants.insert(0, organizer);
        }
        None => participants.insert(
            0,
            Participant {
                doctor_id: organizer_id.clone(),
                doctor_name: organizer_name,
                specialty: None,
                role: ParticipantRole::Organizer,
                attendance: Attendance::Confirmed,
                joined_at: None,
                left_at: None,
                contribution: None,
            },
        ),
    }
    participants
}

fn by_schedule(a: &RcpMeeting, b: &RcpMeeting) -> std::cmp::Ordering {
    a.scheduled_date.cmp(&b.scheduled_date)
}

#[derive(Clone, Debug)]
pub struct RcpService {
    store: RecordStore<RcpMeeting>,
    patients: PatientService,
}

impl RcpService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            store: RecordStore::new(&cfg),
            patients: PatientService::new(cfg),
        }
    }

    /// All meetings, earliest scheduled first.
    pub fn list(&self) -> Vec<RcpMeeting> {
        let query = Query::new().order_by(by_schedule, SortDirection::Asc);
        self.store.query(&query).items
    }

    pub fn get(&self, id: RecordId) -> PracticeResult<RcpMeeting> {
        self.store.get(id)
    }

    pub fn for_patient(&self, patient_id: RecordId) -> Vec<RcpMeeting> {
        let query = Query::new()
            .filter(move |m: &RcpMeeting| m.patient_id == patient_id)
            .order_by(by_schedule, SortDirection::Asc);
        self.store.query(&query).items
    }

    /// Scheduled or postponed meetings from `now` on.
    pub fn upcoming(&self, now: DateTime<Utc>) -> Vec<RcpMeeting> {
        let query = Query::new()
            .filter(move |m: &RcpMeeting| {
                m.scheduled_date >= now
                    && matches!(m.status, MeetingStatus::Scheduled | MeetingStatus::Postponed)
            })
            .order_by(by_schedule, SortDirection::Asc);
        self.store.query(&query).items
    }

    pub fn create(&self, draft: RcpMeetingDraft) -> PracticeResult<RcpMeeting> {
        let form = draft.validate()?;
        if !self.patients.exists(form.patient_id)? {
            return Err(PracticeError::field("patient_id", "patient does not exist"));
        }

        let now = Utc::now();
        let participants =
            ensure_organizer(form.participants, &form.organizer_id, form.organizer_name);
        let meeting = self.store.insert(RcpMeeting {
            id: RecordId::new(),
            title: form.title,
            patient_id: form.patient_id,
            organizer_id: form.organizer_id,
            scheduled_date: form.scheduled_date,
            actual_start_time: None,
            actual_end_time: None,
            status: MeetingStatus::Scheduled,
            meeting_type: form.meeting_type,
            location: form.location,
            room_url: form.room_url,
            pathology: form.pathology,
            clinical_summary: form.clinical_summary,
            decision_summary: None,
            recommendations: None,
            next_steps: None,
            duration_minutes: form.duration_minutes,
            participants,
            created_at: now,
            updated_at: now,
        })?;

        tracing::info!(
            "scheduled rcp meeting {} with {} participants",
            meeting.id,
            meeting.participants.len()
        );
        Ok(meeting)
    }

    /// Replaces the planning fields. Participants listed in the form are merged with the
    /// existing ones; attendance already recorded is kept.
    pub fn update(&self, id: RecordId, draft: RcpMeetingDraft) -> PracticeResult<RcpMeeting> {
        let form = draft.validate()?;
        if !self.patients.exists(form.patient_id)? {
            return Err(PracticeError::field("patient_id", "patient does not exist"));
        }

        self.store.update(id, |m| {
            let mut participants = std::mem::take(&mut m.participants);
            for incoming in form.participants {
                match participants
                    .iter_mut()
                    .find(|p| p.doctor_id == incoming.doctor_id)
                {
                    Some(existing) => {
                        existing.doctor_name = incoming.doctor_name.or(existing.doctor_name.take());
                        existing.specialty = incoming.specialty.or(existing.specialty.take());
                        existing.role = incoming.role;
                    }
                    None => participants.push(incoming),
                }
            }
            // A demoted organizer stays on as a plain participant.
            for p in participants.iter_mut() {
                if p.role == ParticipantRole::Organizer && p.doctor_id != form.organizer_id {
                    p.role = ParticipantRole::Participant;
                }
            }

            m.title = form.title;
            m.patient_id = form.patient_id;
            m.participants = ensure_organizer(participants, &form.organizer_id, form.organizer_name);
            m.organizer_id = form.organizer_id;
            m.scheduled_date = form.scheduled_date;
            m.meeting_type = form.meeting_type;
            m.location = form.location;
            m.room_url = form.room_url;
            m.pathology = form.pathology;
            m.clinical_summary = form.clinical_summary;
            m.duration_minutes = form.duration_minutes;
            Ok(())
        })
    }

    pub fn delete(&self, id: RecordId) -> PracticeResult<()> {
        self.store.delete(id)?;
        tracing::info!("deleted rcp meeting {}", id);
        Ok(())
    }

    pub fn add_participant(
        &self,
        id: RecordId,
        draft: ParticipantDraft,
    ) -> PracticeResult<RcpMeeting> {
        let mut errors = FieldErrors::new();
        let participant = draft.check("", &mut errors);
        errors.finish()?;
        let Some(participant) = participant else {
            return Err(PracticeError::InvalidInput("participant is incomplete".into()));
        };
        if participant.role == ParticipantRole::Organizer {
            return Err(PracticeError::field(
                "role",
                "the organizer is set on the meeting itself",
            ));
        }

        self.store.update(id, |m| {
            if m.participant(participant.doctor_id.as_str()).is_some() {
                return Err(PracticeError::Conflict(format!(
                    "{} already participates in this meeting",
                    participant.doctor_id
                )));
            }
            m.participants.push(participant);
            Ok(())
        })
    }

    /// Records a participant's attendance. ATTENDED stamps `joined_at` the first time.
    pub fn set_attendance(
        &self,
        id: RecordId,
        doctor_id: &str,
        attendance: Attendance,
        contribution: Option<String>,
        now: DateTime<Utc>,
    ) -> PracticeResult<RcpMeeting> {
        let doctor_id = doctor_id.trim();
        self.store.update(id, |m| {
            let participant = m
                .participants
                .iter_mut()
                .find(|p| p.doctor_id.as_str() == doctor_id)
                .ok_or_else(|| PracticeError::not_found("rcp participant", doctor_id))?;
            participant.attendance = attendance;
            if attendance == Attendance::Attended && participant.joined_at.is_none() {
                participant.joined_at = Some(now);
            }
            if let Some(contribution) = optional_text(contribution) {
                participant.contribution = Some(contribution);
            }
            Ok(())
        })
    }

    pub fn start(&self, id: RecordId, now: DateTime<Utc>) -> PracticeResult<RcpMeeting> {
        self.store.update(id, |m| {
            m.status = MeetingStatus::InProgress;
            m.actual_start_time = Some(now);
            Ok(())
        })
    }

    /// Closes the meeting with its decision. The decision summary is mandatory and the
    /// duration becomes the actual one when the meeting was started.
    pub fn complete(
        &self,
        id: RecordId,
        decision: MeetingDecision,
        now: DateTime<Utc>,
    ) -> PracticeResult<RcpMeeting> {
        let summary = NonEmptyText::new(decision.decision_summary.unwrap_or_default())
            .map_err(|_| PracticeError::field("decision_summary", REQUIRED))?;

        let meeting = self.store.update(id, |m| {
            m.status = MeetingStatus::Completed;
            m.actual_end_time = Some(now);
            m.decision_summary = Some(summary.into_inner());
            m.recommendations = optional_text(decision.recommendations);
            m.next_steps = optional_text(decision.next_steps);
            if let Some(started) = m.actual_start_time {
                m.duration_minutes = Some((now - started).num_minutes());
            }
            for p in m.participants.iter_mut() {
                if p.attendance == Attendance::Attended && p.left_at.is_none() {
                    p.left_at = Some(now);
                }
            }
            Ok(())
        })?;
        tracing::info!("completed rcp meeting {}", id);
        Ok(meeting)
    }

    pub fn cancel(&self, id: RecordId) -> PracticeResult<RcpMeeting> {
        self.store.update(id, |m| {
            m.status = MeetingStatus::Cancelled;
            Ok(())
        })
    }

    pub fn postpone(&self, id: RecordId, new_date: DateTime<Utc>) -> PracticeResult<RcpMeeting> {
        self.store.update(id, |m| {
            m.status = MeetingStatus::Postponed;
            m.scheduled_date = new_date;
            Ok(())
        })
    }
}
