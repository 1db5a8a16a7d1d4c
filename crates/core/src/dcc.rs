//! Shared cancer care files (DCC): the long-running oncology follow-up of one patient.
//!
//! A patient has at most one case.

use crate::config::CoreConfig;
use crate::constants::DCC_CASES_TABLE;
use crate::error::{PracticeError, PracticeResult};
use crate::patients::PatientService;
use crate::store::{Query, Record, RecordStore, SortDirection};
use crate::validation::{optional_text, FieldErrors, REQUIRED};
use chrono::{DateTime, NaiveDate, Utc};
use nadym_types::NonEmptyText;
use nadym_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MAX_PERFORMANCE_STATUS: u8 = 4;
pub const MAX_SCORE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TreatmentPhase {
    #[default]
    Diagnostic,
    Treatment,
    Surveillance,
    Palliative,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseRiskLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DccStatus {
    #[default]
    Active,
    Completed,
    Suspended,
    Transferred,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DccCase {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub assigned_doctor_id: NonEmptyText,
    pub assigned_nurse_id: Option<String>,
    pub diagnosis: NonEmptyText,
    pub cancer_stage: Option<String>,
    pub histology: Option<String>,
    pub treatment_phase: TreatmentPhase,
    pub risk_level: CaseRiskLevel,
    pub status: DccStatus,
    pub diagnosis_date: Option<NaiveDate>,
    pub treatment_start_date: Option<NaiveDate>,
    pub last_consultation_date: Option<NaiveDate>,
    pub next_appointment_date: Option<NaiveDate>,
    pub medical_history: Option<String>,
    pub current_treatment: Option<String>,
    pub treatment_response: Option<String>,
    pub side_effects: Option<String>,
    pub performance_status: Option<u8>,
    pub quality_of_life_score: Option<u8>,
    pub completion_percentage: u8,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_update_date: DateTime<Utc>,
}

impl Record for DccCase {
    const TABLE: &'static str = DCC_CASES_TABLE;
    const KIND: &'static str = "dcc case";

    fn id(&self) -> RecordId {
        self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_update_date = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct DccCaseDraft {
    pub patient_id: Option<RecordId>,
    pub assigned_doctor_id: Option<String>,
    pub assigned_nurse_id: Option<String>,
    pub diagnosis: Option<String>,
    pub cancer_stage: Option<String>,
    pub histology: Option<String>,
    pub treatment_phase: Option<TreatmentPhase>,
    pub risk_level: Option<CaseRiskLevel>,
    pub status: Option<DccStatus>,
    pub diagnosis_date: Option<NaiveDate>,
    pub treatment_start_date: Option<NaiveDate>,
    pub last_consultation_date: Option<NaiveDate>,
    pub next_appointment_date: Option<NaiveDate>,
    pub medical_history: Option<String>,
    pub current_treatment: Option<String>,
    pub treatment_response: Option<String>,
    pub side_effects: Option<String>,
    pub performance_status: Option<u8>,
    pub quality_of_life_score: Option<u8>,
    pub completion_percentage: Option<u8>,
    pub notes: Option<String>,
}

/// Optional criteria for [`DccService::list`]; unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(default)]
pub struct DccFilter {
    pub status: Option<DccStatus>,
    pub risk_level: Option<CaseRiskLevel>,
    pub treatment_phase: Option<TreatmentPhase>,
}

impl DccFilter {
    fn matches(&self, case: &DccCase) -> bool {
        self.status.map_or(true, |s| case.status == s)
            && self.risk_level.map_or(true, |r| case.risk_level == r)
            && self.treatment_phase.map_or(true, |p| case.treatment_phase == p)
    }
}

impl DccCaseDraft {
    /// Validates the form into a case, keeping `id` and `created_at` from `base` when given.
    fn into_case(self, now: DateTime<Utc>, base: Option<&DccCase>) -> PracticeResult<DccCase> {
        let mut errors = FieldErrors::new();
        if self.patient_id.is_none() {
            errors.push("patient_id", REQUIRED);
        }
        let doctor = errors.required("assigned_doctor_id", self.assigned_doctor_id.as_deref());
        let diagnosis = errors.required("diagnosis", self.diagnosis.as_deref());
        errors.range(
            "performance_status",
            self.performance_status,
            0,
            MAX_PERFORMANCE_STATUS,
        );
        errors.range("quality_of_life_score", self.quality_of_life_score, 0, MAX_SCORE);
        errors.range("completion_percentage", self.completion_percentage, 0, MAX_SCORE);
        errors.finish()?;

        let (Some(patient_id), Some(assigned_doctor_id), Some(diagnosis)) =
            (self.patient_id, doctor, diagnosis)
        else {
            return Err(PracticeError::InvalidInput("dcc form is incomplete".into()));
        };

        Ok(DccCase {
            id: base.map_or_else(RecordId::new, |b| b.id),
            patient_id,
            assigned_doctor_id,
            assigned_nurse_id: optional_text(self.assigned_nurse_id),
            diagnosis,
            cancer_stage: optional_text(self.cancer_stage),
            histology: optional_text(self.histology),
            treatment_phase: self.treatment_phase.unwrap_or_default(),
            risk_level: self.risk_level.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            diagnosis_date: self.diagnosis_date,
            treatment_start_date: self.treatment_start_date,
            last_consultation_date: self.last_consultation_date,
            next_appointment_date: self.next_appointment_date,
            medical_history: optional_text(self.medical_history),
            current_treatment: optional_text(self.current_treatment),
            treatment_response: optional_text(self.treatment_response),
            side_effects: optional_text(self.side_effects),
            performance_status: self.performance_status,
            quality_of_life_score: self.quality_of_life_score,
            completion_percentage: self.completion_percentage.unwrap_or(0),
            notes: optional_text(self.notes),
            created_at: base.map_or(now, |b| b.created_at),
            last_update_date: now,
        })
    }
}

#[derive(Clone, Debug)]
pub struct DccService {
    store: RecordStore<DccCase>,
    patients: PatientService,
}

impl DccService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            store: RecordStore::new(&cfg),
            patients: PatientService::new(cfg),
        }
    }

    /// Cases matching `filter`, most recently updated first.
    pub fn list(&self, filter: DccFilter) -> Vec<DccCase> {
        let query = Query::new()
            .filter(move |c: &DccCase| filter.matches(c))
            .order_by(
                |a: &DccCase, b: &DccCase| a.last_update_date.cmp(&b.last_update_date),
                SortDirection::Desc,
            );
        self.store.query(&query).items
    }

    pub fn get(&self, id: RecordId) -> PracticeResult<DccCase> {
        self.store.get(id)
    }

    pub fn by_patient(&self, patient_id: RecordId) -> PracticeResult<DccCase> {
        self.store
            .list()
            .into_iter()
            .find(|c| c.patient_id == patient_id)
            .ok_or_else(|| PracticeError::not_found("dcc case for patient", patient_id))
    }

    fn check_patient(&self, patient_id: RecordId, except: Option<RecordId>) -> PracticeResult<()> {
        if !self.patients.exists(patient_id)? {
            return Err(PracticeError::field("patient_id", "patient does not exist"));
        }
        let taken = self
            .store
            .list()
            .iter()
            .any(|c| c.patient_id == patient_id && Some(c.id) != except);
        if taken {
            return Err(PracticeError::Conflict(format!(
                "patient {} already has a dcc case",
                patient_id
            )));
        }
        Ok(())
    }

    pub fn create(&self, draft: DccCaseDraft) -> PracticeResult<DccCase> {
        let case = draft.into_case(Utc::now(), None)?;
        self.check_patient(case.patient_id, None)?;
        let case = self.store.insert(case)?;
        tracing::info!("opened dcc case {} for patient {}", case.id, case.patient_id);
        Ok(case)
    }

    pub fn update(&self, id: RecordId, draft: DccCaseDraft) -> PracticeResult<DccCase> {
        let existing = self.store.get(id)?;
        let replacement = draft.into_case(Utc::now(), Some(&existing))?;
        if replacement.patient_id != existing.patient_id {
            self.check_patient(replacement.patient_id, Some(id))?;
        }
        self.store.update(id, |c| {
            *c = replacement;
            Ok(())
        })
    }

    /// Moves the case to `phase`. Reaching COMPLETED closes the case at 100%.
    pub fn advance_phase(&self, id: RecordId, phase: TreatmentPhase) -> PracticeResult<DccCase> {
        self.store.update(id, |c| {
            c.treatment_phase = phase;
            if phase == TreatmentPhase::Completed {
                c.status = DccStatus::Completed;
                c.completion_percentage = MAX_SCORE;
            }
            Ok(())
        })
    }

    pub fn set_completion(&self, id: RecordId, percentage: u8) -> PracticeResult<DccCase> {
        if percentage > MAX_SCORE {
            return Err(PracticeError::field(
                "completion_percentage",
                format!("must be between 0 and {}", MAX_SCORE),
            ));
        }
        self.store.update(id, |c| {
            c.completion_percentage = percentage;
            Ok(())
        })
    }

    pub fn delete(&self, id: RecordId) -> PracticeResult<()> {
        self.store.delete(id)?;
        tracing::info!("deleted dcc case {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patients::tests::{draft as patient_draft, test_cfg};
    use crate::patients::Patient;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DccService, Patient, Patient) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = test_cfg(temp_dir.path());
        let patients = PatientService::new(cfg.clone());
        let a = patients
            .create(patient_draft("Anne", "Leroy", "anne@example.fr"))
            .expect("patient create should succeed");
        let b = patients
            .create(patient_draft("Bruno", "Petit", "bruno@example.fr"))
            .expect("patient create should succeed");
        (temp_dir, DccService::new(cfg), a, b)
    }

    fn case(patient: &Patient) -> DccCaseDraft {
        DccCaseDraft {
            patient_id: Some(patient.id),
            assigned_doctor_id: Some("dr-onco".into()),
            diagnosis: Some("Breast carcinoma".into()),
            cancer_stage: Some("IIA".into()),
            ..DccCaseDraft::default()
        }
    }

    #[test]
    fn test_create_applies_defaults() {
        let (_tmp, service, a, _b) = setup();
        let c = service.create(case(&a)).expect("create should succeed");
        assert_eq!(c.treatment_phase, TreatmentPhase::Diagnostic);
        assert_eq!(c.risk_level, CaseRiskLevel::Medium);
        assert_eq!(c.status, DccStatus::Active);
        assert_eq!(c.completion_percentage, 0);
        assert_eq!(service.by_patient(a.id).unwrap().id, c.id);
    }

    #[test]
    fn test_one_case_per_patient() {
        let (_tmp, service, a, b) = setup();
        service.create(case(&a)).unwrap();
        assert!(matches!(service.create(case(&a)), Err(PracticeError::Conflict(_))));

        let other = service.create(case(&b)).unwrap();
        assert!(matches!(
            service.update(other.id, case(&a)),
            Err(PracticeError::Conflict(_))
        ));
        // Saving a case again for its own patient is fine.
        assert!(service.update(other.id, case(&b)).is_ok());
    }

    #[test]
    fn test_score_ranges_are_validated() {
        let (_tmp, service, a, _b) = setup();
        let mut draft = case(&a);
        draft.performance_status = Some(5);
        draft.quality_of_life_score = Some(101);
        draft.diagnosis = None;

        let Err(PracticeError::Validation(errors)) = service.create(draft) else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["diagnosis", "performance_status", "quality_of_life_score"]);
    }

    #[test]
    fn test_advance_to_completed_closes_case() {
        let (_tmp, service, a, _b) = setup();
        let c = service.create(case(&a)).unwrap();

        let treating = service.advance_phase(c.id, TreatmentPhase::Treatment).unwrap();
        assert_eq!(treating.status, DccStatus::Active);

        let halfway = service.set_completion(c.id, 50).unwrap();
        assert_eq!(halfway.completion_percentage, 50);
        assert!(matches!(
            service.set_completion(c.id, 120),
            Err(PracticeError::Validation(_))
        ));

        let done = service.advance_phase(c.id, TreatmentPhase::Completed).unwrap();
        assert_eq!(done.status, DccStatus::Completed);
        assert_eq!(done.completion_percentage, 100);
    }

    #[test]
    fn test_list_filters() {
        let (_tmp, service, a, b) = setup();
        let mut high = case(&a);
        high.risk_level = Some(CaseRiskLevel::High);
        service.create(high).unwrap();
        let low = service.create(case(&b)).unwrap();
        service.advance_phase(low.id, TreatmentPhase::Surveillance).unwrap();

        assert_eq!(service.list(DccFilter::default()).len(), 2);
        let filter = DccFilter {
            risk_level: Some(CaseRiskLevel::High),
            ..DccFilter::default()
        };
        assert_eq!(service.list(filter).len(), 1);
        let filter = DccFilter {
            treatment_phase: Some(TreatmentPhase::Surveillance),
            status: Some(DccStatus::Active),
            ..DccFilter::default()
        };
        assert_eq!(service.list(filter)[0].id, low.id);

        service.delete(low.id).unwrap();
        assert!(matches!(service.by_patient(b.id), Err(PracticeError::NotFound { .. })));
    }
}
