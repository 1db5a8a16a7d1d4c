//! Appointment scheduling.
//!
//! Appointments link one patient to one doctor at a point in time. Status is a plain field:
//! any status can be set from any other through [`AppointmentService::update`] or
//! [`AppointmentService::set_status`], with no transition table.
//!
//! Reads embed the patient record ([`AppointmentWithPatient`]). A dangling `patient_id` reads
//! back with `patient: None` instead of failing.

use crate::calendar::Dated;
use crate::config::CoreConfig;
use crate::constants::APPOINTMENTS_TABLE;
use crate::error::{PracticeError, PracticeResult};
use crate::patients::{Patient, PatientService};
use crate::store::{Query, Record, RecordStore, SortDirection};
use crate::validation::{optional_text, FieldErrors};
use chrono::{DateTime, Utc};
use nadym_types::NonEmptyText;
use nadym_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_DURATION_MINUTES: u32 = 30;
const MIN_DURATION_MINUTES: u32 = 5;
const MAX_DURATION_MINUTES: u32 = 480;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Confirmed => "CONFIRMED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::NoShow => "NO_SHOW",
        }
    }

    /// Scheduled or confirmed, i.e. still expected to happen.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Confirmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentType {
    Consultation,
    FollowUp,
    Emergency,
    Telemedicine,
    Vaccination,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consultation => "CONSULTATION",
            Self::FollowUp => "FOLLOW_UP",
            Self::Emergency => "EMERGENCY",
            Self::Telemedicine => "TELEMEDICINE",
            Self::Vaccination => "VACCINATION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Appointment {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub doctor_id: NonEmptyText,
    pub appointment_date: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(rename = "type")]
    pub appointment_type: Option<AppointmentType>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub duration_minutes: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Appointment {
    const TABLE: &'static str = APPOINTMENTS_TABLE;
    const KIND: &'static str = "appointment";

    fn id(&self) -> RecordId {
        self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// An appointment with its patient embedded.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct AppointmentWithPatient {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient: Option<Patient>,
}

impl Dated for Appointment {
    fn date(&self) -> DateTime<Utc> {
        self.appointment_date
    }
}

impl Dated for AppointmentWithPatient {
    fn date(&self) -> DateTime<Utc> {
        self.appointment.appointment_date
    }
}

/// Booking form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct AppointmentDraft {
    pub patient_id: Option<RecordId>,
    pub doctor_id: Option<String>,
    pub appointment_date: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
    #[serde(rename = "type")]
    pub appointment_type: Option<AppointmentType>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub duration_minutes: Option<u32>,
}

/// Partial update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct AppointmentPatch {
    pub patient_id: Option<RecordId>,
    pub doctor_id: Option<String>,
    pub appointment_date: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
    #[serde(rename = "type")]
    pub appointment_type: Option<AppointmentType>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub duration_minutes: Option<u32>,
}

/// Appointment operations.
#[derive(Clone, Debug)]
pub struct AppointmentService {
    store: RecordStore<Appointment>,
    patients: PatientService,
}

impl AppointmentService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            store: RecordStore::new(&cfg),
            patients: PatientService::new(cfg),
        }
    }

    fn with_patients(&self, appointments: Vec<Appointment>) -> Vec<AppointmentWithPatient> {
        let patients: HashMap<RecordId, Patient> = self
            .patients
            .all()
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        appointments
            .into_iter()
            .map(|appointment| AppointmentWithPatient {
                patient: patients.get(&appointment.patient_id).cloned(),
                appointment,
            })
            .collect()
    }

    fn embed(&self, appointment: Appointment) -> PracticeResult<AppointmentWithPatient> {
        let patient = self.patients.find(appointment.patient_id)?;
        Ok(AppointmentWithPatient {
            appointment,
            patient,
        })
    }

    fn select(
        &self,
        query: Query<'_, Appointment>,
    ) -> Vec<AppointmentWithPatient> {
        self.with_patients(self.store.query(&query).items)
    }

    /// Raw appointments without the patient join, for aggregate views.
    pub fn all_raw(&self) -> Vec<Appointment> {
        self.store.list()
    }

    /// Every appointment, earliest first.
    pub fn list_all(&self) -> Vec<AppointmentWithPatient> {
        self.select(Query::new().order_by(by_date, SortDirection::Asc))
    }

    pub fn get(&self, id: RecordId) -> PracticeResult<AppointmentWithPatient> {
        self.embed(self.store.get(id)?)
    }

    /// A patient's appointments, most recent first.
    pub fn for_patient(&self, patient_id: RecordId) -> Vec<AppointmentWithPatient> {
        self.select(
            Query::new()
                .filter(move |a: &Appointment| a.patient_id == patient_id)
                .order_by(by_date, SortDirection::Desc),
        )
    }

    /// A doctor's appointments, earliest first.
    pub fn for_doctor(&self, doctor_id: &str) -> Vec<AppointmentWithPatient> {
        let doctor_id = doctor_id.trim().to_owned();
        self.select(
            Query::new()
                .filter(move |a: &Appointment| a.doctor_id.as_str() == doctor_id)
                .order_by(by_date, SortDirection::Asc),
        )
    }

    /// Scheduled or confirmed appointments at or after `now`, earliest first.
    pub fn upcoming(&self, now: DateTime<Utc>) -> Vec<AppointmentWithPatient> {
        self.select(
            Query::new()
                .filter(move |a: &Appointment| {
                    a.appointment_date >= now && a.status.is_pending()
                })
                .order_by(by_date, SortDirection::Asc),
        )
    }

    /// Appointments whose date falls in `start..end`, earliest first.
    pub fn between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<AppointmentWithPatient> {
        self.select(
            Query::new()
                .filter(move |a: &Appointment| {
                    a.appointment_date >= start && a.appointment_date < end
                })
                .order_by(by_date, SortDirection::Asc),
        )
    }

    /// Books an appointment.
    ///
    /// # Errors
    ///
    /// Returns [`PracticeError::Validation`] for missing fields, an out-of-range duration or a
    /// `patient_id` that does not name an existing patient.
    pub fn book(&self, draft: AppointmentDraft) -> PracticeResult<AppointmentWithPatient> {
        let mut errors = FieldErrors::new();

        if draft.patient_id.is_none() {
            errors.push("patient_id", crate::validation::REQUIRED);
        }
        let doctor_id = errors.required("doctor_id", draft.doctor_id.as_deref());
        if draft.appointment_date.is_none() {
            errors.push("appointment_date", crate::validation::REQUIRED);
        }
        errors.range(
            "duration_minutes",
            draft.duration_minutes,
            MIN_DURATION_MINUTES,
            MAX_DURATION_MINUTES,
        );
        errors.finish()?;

        let (Some(patient_id), Some(doctor_id), Some(appointment_date)) =
            (draft.patient_id, doctor_id, draft.appointment_date)
        else {
            return Err(PracticeError::InvalidInput(
                "appointment form is incomplete".into(),
            ));
        };

        self.require_patient(patient_id)?;

        let now = Utc::now();
        let appointment = Appointment {
            id: RecordId::new(),
            patient_id,
            doctor_id,
            appointment_date,
            status: draft.status.unwrap_or_default(),
            appointment_type: draft.appointment_type,
            reason: optional_text(draft.reason),
            notes: optional_text(draft.notes),
            duration_minutes: draft.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES),
            created_at: now,
            updated_at: now,
        };

        let appointment = self.store.insert(appointment)?;
        tracing::info!(
            "booked appointment {} for patient {}",
            appointment.id,
            appointment.patient_id
        );
        self.embed(appointment)
    }

    /// Applies a partial update. Status may be changed to any value.
    pub fn update(
        &self,
        id: RecordId,
        patch: AppointmentPatch,
    ) -> PracticeResult<AppointmentWithPatient> {
        let mut errors = FieldErrors::new();
        errors.range(
            "duration_minutes",
            patch.duration_minutes,
            MIN_DURATION_MINUTES,
            MAX_DURATION_MINUTES,
        );
        let doctor_id = match patch.doctor_id.as_deref() {
            Some(d) => errors.required("doctor_id", Some(d)),
            None => None,
        };
        errors.finish()?;

        if let Some(patient_id) = patch.patient_id {
            self.require_patient(patient_id)?;
        }

        let updated = self.store.update(id, |a| {
            if let Some(patient_id) = patch.patient_id {
                a.patient_id = patient_id;
            }
            if let Some(doctor_id) = doctor_id {
                a.doctor_id = doctor_id;
            }
            if let Some(date) = patch.appointment_date {
                a.appointment_date = date;
            }
            if let Some(status) = patch.status {
                a.status = status;
            }
            if patch.appointment_type.is_some() {
                a.appointment_type = patch.appointment_type;
            }
            if patch.reason.is_some() {
                a.reason = optional_text(patch.reason);
            }
            if patch.notes.is_some() {
                a.notes = optional_text(patch.notes);
            }
            if let Some(duration) = patch.duration_minutes {
                a.duration_minutes = duration;
            }
            Ok(())
        })?;

        self.embed(updated)
    }

    pub fn set_status(
        &self,
        id: RecordId,
        status: AppointmentStatus,
    ) -> PracticeResult<AppointmentWithPatient> {
        let updated = self.store.update(id, |a| {
            a.status = status;
            Ok(())
        })?;
        tracing::info!("appointment {} set to {}", id, status.as_str());
        self.embed(updated)
    }

    pub fn confirm(&self, id: RecordId) -> PracticeResult<AppointmentWithPatient> {
        self.set_status(id, AppointmentStatus::Confirmed)
    }

    pub fn cancel(&self, id: RecordId) -> PracticeResult<AppointmentWithPatient> {
        self.set_status(id, AppointmentStatus::Cancelled)
    }

    pub fn complete(&self, id: RecordId) -> PracticeResult<AppointmentWithPatient> {
        self.set_status(id, AppointmentStatus::Completed)
    }

    pub fn delete(&self, id: RecordId) -> PracticeResult<()> {
        self.store.delete(id)
    }

    pub fn count(&self) -> usize {
        self.store.count()
    }

    fn require_patient(&self, patient_id: RecordId) -> PracticeResult<()> {
        if self.patients.exists(patient_id)? {
            Ok(())
        } else {
            Err(PracticeError::field("patient_id", "patient does not exist"))
        }
    }
}

fn by_date(a: &Appointment, b: &Appointment) -> std::cmp::Ordering {
    a.appointment_date.cmp(&b.appointment_date)
}
