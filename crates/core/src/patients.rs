//! Patient records.
//!
//! Patients are the root of every other table: appointments, prescriptions, intakes and case
//! files all carry a `patient_id`. Email addresses are unique across the practice.
//!
//! ## Pure Data Operations
//!
//! This module contains **only** data operations. Role checks and HTTP concerns belong in
//! `api-shared` and `api-rest`.

use crate::config::CoreConfig;
use crate::constants::PATIENTS_TABLE;
use crate::error::{PracticeError, PracticeResult};
use crate::store::{Page, PageRequest, Query, Record, RecordStore, SortDirection};
use crate::validation::{optional_text, FieldErrors};
use chrono::{DateTime, NaiveDate, Utc};
use nadym_types::{EmailAddress, NonEmptyText};
use nadym_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The eight ABO/Rh blood groups accepted on the patient form.
pub const BLOOD_TYPES: [&str; 8] = ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "OTHER")]
    Other,
}

/// Validated patient details, shared by create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PatientDetails {
    pub first_name: NonEmptyText,
    pub last_name: NonEmptyText,
    pub date_of_birth: NaiveDate,
    pub gender: Option<Gender>,
    pub email: EmailAddress,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
    pub blood_type: Option<String>,
    pub insurance_number: Option<String>,
    pub current_medications: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

impl PatientDetails {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Patient {
    pub id: RecordId,
    #[serde(flatten)]
    pub details: PatientDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Patient {
    const TABLE: &'static str = PATIENTS_TABLE;
    const KIND: &'static str = "patient";

    fn id(&self) -> RecordId {
        self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Unvalidated patient form.
///
/// Every field is optional at this stage so that [`PatientDraft::validate`] can report all
/// missing and malformed fields in one go.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct PatientDraft {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
    pub blood_type: Option<String>,
    pub insurance_number: Option<String>,
    pub current_medications: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

impl PatientDraft {
    /// Validates the form against `today`.
    ///
    /// # Errors
    ///
    /// Returns [`PracticeError::Validation`] listing every rejected field: missing names,
    /// email or birth date, a malformed email, a birth date in the future, or an unknown blood
    /// group.
    pub fn validate(self, today: NaiveDate) -> PracticeResult<PatientDetails> {
        let mut errors = FieldErrors::new();

        let first_name = errors.required("first_name", self.first_name.as_deref());
        let last_name = errors.required("last_name", self.last_name.as_deref());
        let email = errors.email("email", self.email.as_deref());

        match self.date_of_birth {
            None => errors.push("date_of_birth", crate::validation::REQUIRED),
            Some(dob) if dob > today => {
                errors.push("date_of_birth", "cannot be in the future");
            }
            Some(_) => {}
        }

        let blood_type = optional_text(self.blood_type).map(|b| b.to_uppercase());
        if let Some(bt) = &blood_type {
            if !BLOOD_TYPES.contains(&bt.as_str()) {
                errors.push("blood_type", format!("must be one of {}", BLOOD_TYPES.join(", ")));
            }
        }

        errors.finish()?;

        match (first_name, last_name, email, self.date_of_birth) {
            (Some(first_name), Some(last_name), Some(email), Some(date_of_birth)) => {
                Ok(PatientDetails {
                    first_name,
                    last_name,
                    date_of_birth,
                    gender: self.gender,
                    email,
                    phone: optional_text(self.phone),
                    address: optional_text(self.address),
                    city: optional_text(self.city),
                    postal_code: optional_text(self.postal_code),
                    country: optional_text(self.country),
                    medical_history: optional_text(self.medical_history),
                    allergies: optional_text(self.allergies),
                    blood_type,
                    insurance_number: optional_text(self.insurance_number),
                    current_medications: optional_text(self.current_medications),
                    emergency_contact_name: optional_text(self.emergency_contact_name),
                    emergency_contact_phone: optional_text(self.emergency_contact_phone),
                })
            }
            _ => Err(PracticeError::InvalidInput(
                "patient form is incomplete".into(),
            )),
        }
    }
}

/// Sort keys offered by the patient list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PatientSort {
    #[default]
    LastName,
    FirstName,
    CreatedAt,
    DateOfBirth,
}

fn compare_by(sort: PatientSort, a: &Patient, b: &Patient) -> std::cmp::Ordering {
    let (a_d, b_d) = (&a.details, &b.details);
    match sort {
        PatientSort::LastName => a_d
            .last_name
            .as_str()
            .to_lowercase()
            .cmp(&b_d.last_name.as_str().to_lowercase())
            .then_with(|| {
                a_d.first_name
                    .as_str()
                    .to_lowercase()
                    .cmp(&b_d.first_name.as_str().to_lowercase())
            }),
        PatientSort::FirstName => a_d
            .first_name
            .as_str()
            .to_lowercase()
            .cmp(&b_d.first_name.as_str().to_lowercase()),
        PatientSort::CreatedAt => a.created_at.cmp(&b.created_at),
        PatientSort::DateOfBirth => a_d.date_of_birth.cmp(&b_d.date_of_birth),
    }
}

/// Patient record operations.
#[derive(Clone, Debug)]
pub struct PatientService {
    store: RecordStore<Patient>,
}

impl PatientService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            store: RecordStore::new(&cfg),
        }
    }

    /// Lists patients one page at a time, by last name unless asked otherwise.
    pub fn list(
        &self,
        page: PageRequest,
        sort: PatientSort,
        direction: SortDirection,
    ) -> Page<Patient> {
        let query = Query::new()
            .order_by(move |a, b| compare_by(sort, a, b), direction)
            .paged(page);
        self.store.query(&query)
    }

    pub fn get(&self, id: RecordId) -> PracticeResult<Patient> {
        self.store.get(id)
    }

    pub fn find(&self, id: RecordId) -> PracticeResult<Option<Patient>> {
        self.store.find(id)
    }

    /// Returns true if a patient with this id exists.
    pub fn exists(&self, id: RecordId) -> PracticeResult<bool> {
        Ok(self.store.find(id)?.is_some())
    }

    pub fn find_by_email(&self, email: &str) -> Option<Patient> {
        let needle = email.trim().to_lowercase();
        self.store
            .list()
            .into_iter()
            .find(|p| p.details.email.as_str() == needle)
    }

    /// Case-insensitive substring search over first name, last name and email.
    ///
    /// A blank term matches every patient.
    pub fn search(&self, term: &str, page: PageRequest) -> Page<Patient> {
        let needle = term.trim().to_lowercase();
        let query = Query::new()
            .filter(move |p: &Patient| {
                needle.is_empty()
                    || p.details.first_name.as_str().to_lowercase().contains(&needle)
                    || p.details.last_name.as_str().to_lowercase().contains(&needle)
                    || p.details.email.as_str().contains(&needle)
            })
            .order_by(
                |a, b| compare_by(PatientSort::LastName, a, b),
                SortDirection::Asc,
            )
            .paged(page);
        self.store.query(&query)
    }

    /// Creates a patient from a form.
    ///
    /// # Errors
    ///
    /// - [`PracticeError::Validation`] if the form is invalid
    /// - [`PracticeError::Conflict`] if another patient already uses the email address
    pub fn create(&self, draft: PatientDraft) -> PracticeResult<Patient> {
        let now = Utc::now();
        let details = draft.validate(now.date_naive())?;

        if self.find_by_email(details.email.as_str()).is_some() {
            return Err(PracticeError::Conflict(format!(
                "a patient with email {} already exists",
                details.email
            )));
        }

        let patient = Patient {
            id: RecordId::new(),
            details,
            created_at: now,
            updated_at: now,
        };

        let patient = self.store.insert(patient)?;
        tracing::info!("created patient {}", patient.id);
        Ok(patient)
    }

    /// Replaces a patient's details.
    ///
    /// Email uniqueness is only checked when the address actually changes.
    pub fn update(&self, id: RecordId, draft: PatientDraft) -> PracticeResult<Patient> {
        let details = draft.validate(Utc::now().date_naive())?;
        let current = self.store.get(id)?;

        if current.details.email != details.email {
            if let Some(other) = self.find_by_email(details.email.as_str()) {
                if other.id != id {
                    return Err(PracticeError::Conflict(format!(
                        "a patient with email {} already exists",
                        details.email
                    )));
                }
            }
        }

        self.store.update(id, |p| {
            p.details = details;
            Ok(())
        })
    }

    pub fn delete(&self, id: RecordId) -> PracticeResult<()> {
        self.store.delete(id)?;
        tracing::info!("deleted patient {}", id);
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.store.count()
    }

    /// The `limit` most recently created patients, newest first. A zero limit yields nothing.
    pub fn recent(&self, limit: usize) -> Vec<Patient> {
        if limit == 0 {
            return Vec::new();
        }
        let query = Query::new()
            .order_by(
                |a: &Patient, b: &Patient| a.created_at.cmp(&b.created_at),
                SortDirection::Desc,
            )
            .paged(PageRequest::new(Some(0), Some(limit)));
        self.store.query(&query).items
    }

    /// Every patient, unordered. Used by services that need to join on patients.
    pub fn all(&self) -> Vec<Patient> {
        self.store.list()
    }
}
