//! Tele-expertise: asking a specialist for a written opinion on a case.
//!
//! A request starts PENDING with a deadline derived from its urgency. An expert is assigned,
//! reviews the case and answers; requests still PENDING at their deadline are reported by
//! [`TeleexpertiseService::expired`].

use crate::config::CoreConfig;
use crate::constants::EXPERTISE_REQUESTS_TABLE;
use crate::error::{PracticeError, PracticeResult};
use crate::patients::PatientService;
use crate::store::{Page, PageRequest, Query, Record, RecordStore, SortDirection};
use crate::validation::{optional_text, FieldErrors, REQUIRED};
use chrono::{DateTime, Duration, Utc};
use nadym_types::NonEmptyText;
use nadym_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Urgency {
    /// Time the expert has to answer.
    pub fn response_window(self) -> Duration {
        match self {
            Urgency::Urgent => Duration::hours(2),
            Urgency::High => Duration::hours(24),
            Urgency::Medium => Duration::days(3),
            Urgency::Low => Duration::days(7),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    #[default]
    Pending,
    Assigned,
    InReview,
    Completed,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ExpertiseRequest {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub requesting_doctor_id: NonEmptyText,
    pub expert_doctor_id: Option<NonEmptyText>,
    pub specialty: NonEmptyText,
    pub clinical_question: NonEmptyText,
    pub patient_history: Option<String>,
    pub current_treatment: Option<String>,
    pub examination_findings: Option<String>,
    pub diagnostic_results: Option<String>,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub expert_response: Option<String>,
    pub expert_recommendations: Option<String>,
    pub cancellation_reason: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for ExpertiseRequest {
    const TABLE: &'static str = EXPERTISE_REQUESTS_TABLE;
    const KIND: &'static str = "expertise request";

    fn id(&self) -> RecordId {
        self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct ExpertiseRequestDraft {
    pub patient_id: Option<RecordId>,
    pub requesting_doctor_id: Option<String>,
    pub specialty: Option<String>,
    pub clinical_question: Option<String>,
    pub patient_history: Option<String>,
    pub current_treatment: Option<String>,
    pub examination_findings: Option<String>,
    pub diagnostic_results: Option<String>,
    pub urgency: Option<Urgency>,
}

#[derive(Clone, Debug)]
pub struct TeleexpertiseService {
    store: RecordStore<ExpertiseRequest>,
    patients: PatientService,
}

impl TeleexpertiseService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            store: RecordStore::new(&cfg),
            patients: PatientService::new(cfg),
        }
    }

    fn newest_first(
        &self,
        keep: impl Fn(&ExpertiseRequest) -> bool + Send + Sync,
        page: PageRequest,
    ) -> Page<ExpertiseRequest> {
        let query = Query::new()
            .filter(keep)
            .order_by(
                |a: &ExpertiseRequest, b: &ExpertiseRequest| a.created_at.cmp(&b.created_at),
                SortDirection::Desc,
            )
            .paged(page);
        self.store.query(&query)
    }

    pub fn by_requesting_doctor(&self, doctor_id: &str, page: PageRequest) -> Page<ExpertiseRequest> {
        let doctor_id = doctor_id.trim().to_owned();
        self.newest_first(move |r| r.requesting_doctor_id.as_str() == doctor_id, page)
    }

    pub fn by_expert(&self, expert_id: &str, page: PageRequest) -> Page<ExpertiseRequest> {
        let expert_id = expert_id.trim().to_owned();
        self.newest_first(
            move |r| {
                r.expert_doctor_id
                    .as_ref()
                    .is_some_and(|e| e.as_str() == expert_id)
            },
            page,
        )
    }

    /// Requests for a specialty, compared case-insensitively.
    pub fn by_specialty(&self, specialty: &str, page: PageRequest) -> Page<ExpertiseRequest> {
        let specialty = specialty.trim().to_lowercase();
        self.newest_first(
            move |r| r.specialty.as_str().to_lowercase() == specialty,
            page,
        )
    }

    pub fn by_status(&self, status: RequestStatus, page: PageRequest) -> Page<ExpertiseRequest> {
        self.newest_first(move |r| r.status == status, page)
    }

    pub fn get(&self, id: RecordId) -> PracticeResult<ExpertiseRequest> {
        self.store.get(id)
    }

    pub fn create(
        &self,
        draft: ExpertiseRequestDraft,
        now: DateTime<Utc>,
    ) -> PracticeResult<ExpertiseRequest> {
        let mut errors = FieldErrors::new();
        if draft.patient_id.is_none() {
            errors.push("patient_id", REQUIRED);
        }
        let requesting_doctor_id =
            errors.required("requesting_doctor_id", draft.requesting_doctor_id.as_deref());
        let specialty = errors.required("specialty", draft.specialty.as_deref());
        let clinical_question =
            errors.required("clinical_question", draft.clinical_question.as_deref());
        errors.finish()?;

        let (Some(patient_id), Some(requesting_doctor_id), Some(specialty), Some(clinical_question)) =
            (draft.patient_id, requesting_doctor_id, specialty, clinical_question)
        else {
            return Err(PracticeError::InvalidInput(
                "expertise request is incomplete".into(),
            ));
        };

        if !self.patients.exists(patient_id)? {
            return Err(PracticeError::field("patient_id", "patient does not exist"));
        }

        let urgency = draft.urgency.unwrap_or_default();
        let request = self.store.insert(ExpertiseRequest {
            id: RecordId::new(),
            patient_id,
            requesting_doctor_id,
            expert_doctor_id: None,
            specialty,
            clinical_question,
            patient_history: optional_text(draft.patient_history),
            current_treatment: optional_text(draft.current_treatment),
            examination_findings: optional_text(draft.examination_findings),
            diagnostic_results: optional_text(draft.diagnostic_results),
            urgency,
            status: RequestStatus::Pending,
            expert_response: None,
            expert_recommendations: None,
            cancellation_reason: None,
            assigned_at: None,
            responded_at: None,
            deadline: now + urgency.response_window(),
            created_at: now,
            updated_at: now,
        })?;

        tracing::info!(
            "created {:?} expertise request {} in {}",
            request.urgency,
            request.id,
            request.specialty
        );
        Ok(request)
    }

    pub fn assign(
        &self,
        id: RecordId,
        expert_id: &str,
        now: DateTime<Utc>,
    ) -> PracticeResult<ExpertiseRequest> {
        let expert = NonEmptyText::new(expert_id)
            .map_err(|_| PracticeError::field("expert_doctor_id", REQUIRED))?;
        self.store.update(id, |r| {
            r.expert_doctor_id = Some(expert);
            r.status = RequestStatus::Assigned;
            r.assigned_at = Some(now);
            Ok(())
        })
    }

    pub fn start_review(&self, id: RecordId) -> PracticeResult<ExpertiseRequest> {
        self.store.update(id, |r| {
            r.status = RequestStatus::InReview;
            Ok(())
        })
    }

    /// Records the expert's answer. The response text is mandatory.
    pub fn complete(
        &self,
        id: RecordId,
        response: &str,
        recommendations: Option<String>,
        now: DateTime<Utc>,
    ) -> PracticeResult<ExpertiseRequest> {
        let response = NonEmptyText::new(response)
            .map_err(|_| PracticeError::field("expert_response", REQUIRED))?;
        self.store.update(id, |r| {
            r.expert_response = Some(response.into_inner());
            r.expert_recommendations = optional_text(recommendations);
            r.status = RequestStatus::Completed;
            r.responded_at = Some(now);
            Ok(())
        })
    }

    pub fn cancel(&self, id: RecordId, reason: Option<String>) -> PracticeResult<ExpertiseRequest> {
        self.store.update(id, |r| {
            r.status = RequestStatus::Cancelled;
            r.cancellation_reason = optional_text(reason);
            Ok(())
        })
    }

    /// PENDING requests whose deadline has passed, most overdue first.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<ExpertiseRequest> {
        let query = Query::new()
            .filter(move |r: &ExpertiseRequest| {
                r.status == RequestStatus::Pending && r.deadline <= now
            })
            .order_by(
                |a: &ExpertiseRequest, b: &ExpertiseRequest| a.deadline.cmp(&b.deadline),
                SortDirection::Asc,
            );
        self.store.query(&query).items
    }

    pub fn count_completed_by_requesting_doctor(&self, doctor_id: &str) -> usize {
        let doctor_id = doctor_id.trim();
        self.store
            .list()
            .iter()
            .filter(|r| {
                r.status == RequestStatus::Completed && r.requesting_doctor_id.as_str() == doctor_id
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patients::tests::{draft as patient_draft, test_cfg};
    use crate::patients::Patient;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TeleexpertiseService, Patient) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = test_cfg(temp_dir.path());
        let patient = PatientService::new(cfg.clone())
            .create(patient_draft("Jean", "Valjean", "jean@example.fr"))
            .expect("patient create should succeed");
        (temp_dir, TeleexpertiseService::new(cfg), patient)
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn request(patient: &Patient, specialty: &str, urgency: Option<Urgency>) -> ExpertiseRequestDraft {
        ExpertiseRequestDraft {
            patient_id: Some(patient.id),
            requesting_doctor_id: Some("dr-gp".into()),
            specialty: Some(specialty.into()),
            clinical_question: Some("Is this lesion suspicious?".into()),
            urgency,
            ..ExpertiseRequestDraft::default()
        }
    }

    #[test]
    fn test_deadline_follows_urgency() {
        let (_tmp, service, patient) = setup();
        let cases = [
            (Some(Urgency::Urgent), Duration::hours(2)),
            (Some(Urgency::High), Duration::hours(24)),
            (None, Duration::days(3)),
            (Some(Urgency::Low), Duration::days(7)),
        ];
        for (urgency, window) in cases {
            let r = service
                .create(request(&patient, "Dermatology", urgency), noon())
                .expect("create should succeed");
            assert_eq!(r.status, RequestStatus::Pending);
            assert_eq!(r.deadline, noon() + window);
        }
    }

    #[test]
    fn test_create_requires_specialty_and_question() {
        let (_tmp, service, patient) = setup();
        let mut draft = request(&patient, " ", None);
        draft.clinical_question = None;

        let Err(PracticeError::Validation(errors)) = service.create(draft, noon()) else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["specialty", "clinical_question"]);
    }

    #[test]
    fn test_lifecycle_assign_review_complete() {
        let (_tmp, service, patient) = setup();
        let r = service.create(request(&patient, "Cardiology", None), noon()).unwrap();

        let assigned = service.assign(r.id, "dr-cardio", noon()).unwrap();
        assert_eq!(assigned.status, RequestStatus::Assigned);
        assert_eq!(assigned.assigned_at, Some(noon()));

        let reviewing = service.start_review(r.id).unwrap();
        assert_eq!(reviewing.status, RequestStatus::InReview);

        assert!(matches!(
            service.complete(r.id, "  ", None, noon()),
            Err(PracticeError::Validation(_))
        ));

        let done = service
            .complete(r.id, "Benign", Some("Check again in 6 months".into()), noon())
            .unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        assert_eq!(done.expert_response.as_deref(), Some("Benign"));
        assert_eq!(service.count_completed_by_requesting_doctor("dr-gp"), 1);

        let by_expert = service.by_expert("dr-cardio", PageRequest::default());
        assert_eq!(by_expert.total_items, 1);
    }

    #[test]
    fn test_by_specialty_is_case_insensitive() {
        let (_tmp, service, patient) = setup();
        service.create(request(&patient, "Cardiology", None), noon()).unwrap();
        service.create(request(&patient, "Neurology", None), noon()).unwrap();

        let found = service.by_specialty("cardiology", PageRequest::default());
        assert_eq!(found.total_items, 1);
        assert_eq!(found.items[0].specialty.as_str(), "Cardiology");
    }

    #[test]
    fn test_expired_only_lists_pending_past_deadline() {
        let (_tmp, service, patient) = setup();
        let urgent = service
            .create(request(&patient, "Oncology", Some(Urgency::Urgent)), noon())
            .unwrap();
        let assigned = service
            .create(request(&patient, "Oncology", Some(Urgency::Urgent)), noon())
            .unwrap();
        service.assign(assigned.id, "dr-onco", noon()).unwrap();
        service
            .create(request(&patient, "Oncology", Some(Urgency::Low)), noon())
            .unwrap();

        let later = noon() + Duration::hours(3);
        let expired: Vec<_> = service.expired(later).into_iter().map(|r| r.id).collect();
        assert_eq!(expired, [urgent.id]);

        let cancelled = service.cancel(urgent.id, Some("resolved".into())).unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert!(service.expired(later).is_empty());
        assert_eq!(
            service.by_status(RequestStatus::Pending, PageRequest::default()).total_items,
            1
        );
    }

    #[test]
    fn test_unknown_request_is_not_found() {
        let (_tmp, service, _patient) = setup();
        assert!(matches!(
            service.start_review(RecordId::new()),
            Err(PracticeError::NotFound { .. })
        ));
    }
}
