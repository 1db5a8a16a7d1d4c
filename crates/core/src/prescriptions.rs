//! Prescriptions and their medication items.
//!
//! Items are stored inside the prescription record, in the order they were added, so a
//! prescription and its items are always written together. Reads embed the patient the same
//! way appointments do.
//!
//! No dosing or interaction checks are performed.

use crate::config::CoreConfig;
use crate::constants::PRESCRIPTIONS_TABLE;
use crate::error::{PracticeError, PracticeResult};
use crate::patients::{Patient, PatientService};
use crate::store::{Query, Record, RecordStore, SortDirection};
use crate::validation::{optional_text, FieldErrors, REQUIRED};
use chrono::{DateTime, NaiveDate, Utc};
use nadym_types::NonEmptyText;
use nadym_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrescriptionStatus {
    #[default]
    Active,
    Completed,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PrescriptionItem {
    pub id: RecordId,
    pub medication_name: NonEmptyText,
    pub medication_code: Option<String>,
    pub dosage: NonEmptyText,
    pub frequency: NonEmptyText,
    pub duration_days: Option<u32>,
    pub quantity: Option<u32>,
    pub instructions: Option<String>,
    pub side_effects: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Prescription {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub doctor_id: NonEmptyText,
    pub prescription_date: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub status: PrescriptionStatus,
    pub diagnosis: NonEmptyText,
    pub notes: Option<String>,
    pub items: Vec<PrescriptionItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Prescription {
    const TABLE: &'static str = PRESCRIPTIONS_TABLE;
    const KIND: &'static str = "prescription";

    fn id(&self) -> RecordId {
        self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Prescription {
    pub fn item(&self, item_id: RecordId) -> Option<&PrescriptionItem> {
        self.items.iter().find(|i| i.id == item_id)
    }
}

/// A prescription with its patient embedded.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct PrescriptionWithPatient {
    #[serde(flatten)]
    pub prescription: Prescription,
    pub patient: Option<Patient>,
}

/// Item form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct PrescriptionItemDraft {
    pub medication_name: Option<String>,
    pub medication_code: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration_days: Option<i64>,
    pub quantity: Option<i64>,
    pub instructions: Option<String>,
    pub side_effects: Option<String>,
}

impl PrescriptionItemDraft {
    /// Validates into `errors`, prefixing field names with `prefix` (e.g. `items[2].`).
    fn check(self, prefix: &str, errors: &mut FieldErrors) -> Option<PrescriptionItem> {
        let field = |name: &str| format!("{prefix}{name}");

        let medication_name =
            errors.required(&field("medication_name"), self.medication_name.as_deref());
        let dosage = errors.required(&field("dosage"), self.dosage.as_deref());
        let frequency = errors.required(&field("frequency"), self.frequency.as_deref());
        let duration_days = count(errors, &field("duration_days"), self.duration_days);
        let quantity = count(errors, &field("quantity"), self.quantity);

        Some(PrescriptionItem {
            id: RecordId::new(),
            medication_name: medication_name?,
            medication_code: optional_text(self.medication_code),
            dosage: dosage?,
            frequency: frequency?,
            duration_days,
            quantity,
            instructions: optional_text(self.instructions),
            side_effects: optional_text(self.side_effects),
        })
    }

    /// Validates a single item.
    pub fn validate(self) -> PracticeResult<PrescriptionItem> {
        let mut errors = FieldErrors::new();
        let item = self.check("", &mut errors);
        errors.finish()?;
        item.ok_or_else(|| PracticeError::InvalidInput("item form is incomplete".into()))
    }
}

/// Optional strictly positive count.
fn count(errors: &mut FieldErrors, field: &str, value: Option<i64>) -> Option<u32> {
    let v = value?;
    if v <= 0 {
        errors.push(field, "must be greater than zero");
        return None;
    }
    match u32::try_from(v) {
        Ok(n) => Some(n),
        Err(_) => {
            errors.push(field, "is too large");
            None
        }
    }
}

/// Prescription form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct PrescriptionDraft {
    pub patient_id: Option<RecordId>,
    pub doctor_id: Option<String>,
    /// Defaults to today.
    pub prescription_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub status: Option<PrescriptionStatus>,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
}

/// Partial update of the prescription header. Items have their own operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct PrescriptionPatch {
    pub doctor_id: Option<String>,
    pub prescription_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub status: Option<PrescriptionStatus>,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
}

fn check_validity_window(
    prescription_date: NaiveDate,
    valid_until: Option<NaiveDate>,
) -> PracticeResult<()> {
    match valid_until {
        Some(until) if until < prescription_date => Err(PracticeError::field(
            "valid_until",
            "cannot be before the prescription date",
        )),
        _ => Ok(()),
    }
}

fn by_date(a: &Prescription, b: &Prescription) -> std::cmp::Ordering {
    a.prescription_date
        .cmp(&b.prescription_date)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Prescription operations.
#[derive(Clone, Debug)]
pub struct PrescriptionService {
    store: RecordStore<Prescription>,
    patients: PatientService,
}

impl PrescriptionService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            store: RecordStore::new(&cfg),
            patients: PatientService::new(cfg),
        }
    }

    fn with_patients(&self, prescriptions: Vec<Prescription>) -> Vec<PrescriptionWithPatient> {
        let patients: HashMap<RecordId, Patient> = self
            .patients
            .all()
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        prescriptions
            .into_iter()
            .map(|prescription| PrescriptionWithPatient {
                patient: patients.get(&prescription.patient_id).cloned(),
                prescription,
            })
            .collect()
    }

    fn embed(&self, prescription: Prescription) -> PracticeResult<PrescriptionWithPatient> {
        let patient = self.patients.find(prescription.patient_id)?;
        Ok(PrescriptionWithPatient {
            prescription,
            patient,
        })
    }

    fn select(&self, query: Query<'_, Prescription>) -> Vec<PrescriptionWithPatient> {
        self.with_patients(self.store.query(&query).items)
    }

    /// Every prescription, newest first.
    pub fn list(&self) -> Vec<PrescriptionWithPatient> {
        self.select(Query::new().order_by(by_date, SortDirection::Desc))
    }

    pub fn get(&self, id: RecordId) -> PracticeResult<PrescriptionWithPatient> {
        self.embed(self.store.get(id)?)
    }

    /// Raw record, without the patient join.
    pub fn get_raw(&self, id: RecordId) -> PracticeResult<Prescription> {
        self.store.get(id)
    }

    pub fn for_patient(&self, patient_id: RecordId) -> Vec<PrescriptionWithPatient> {
        self.select(
            Query::new()
                .filter(move |p: &Prescription| p.patient_id == patient_id)
                .order_by(by_date, SortDirection::Desc),
        )
    }

    /// ACTIVE prescriptions, newest first.
    pub fn active(&self) -> Vec<PrescriptionWithPatient> {
        self.select(
            Query::new()
                .filter(|p: &Prescription| p.status == PrescriptionStatus::Active)
                .order_by(by_date, SortDirection::Desc),
        )
    }

    pub fn count_active(&self) -> usize {
        self.store
            .list()
            .iter()
            .filter(|p| p.status == PrescriptionStatus::Active)
            .count()
    }

    /// Creates a prescription with its items.
    ///
    /// # Errors
    ///
    /// [`PracticeError::Validation`] for missing header fields, invalid items (reported as
    /// `items[i].field`), an inverted validity window, or an unknown patient.
    pub fn create(
        &self,
        draft: PrescriptionDraft,
        items: Vec<PrescriptionItemDraft>,
    ) -> PracticeResult<PrescriptionWithPatient> {
        let now = Utc::now();
        let mut errors = FieldErrors::new();

        if draft.patient_id.is_none() {
            errors.push("patient_id", REQUIRED);
        }
        let doctor_id = errors.required("doctor_id", draft.doctor_id.as_deref());
        let diagnosis = errors.required("diagnosis", draft.diagnosis.as_deref());

        let checked: Vec<Option<PrescriptionItem>> = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| item.check(&format!("items[{i}]."), &mut errors))
            .collect();

        errors.finish()?;

        let (Some(patient_id), Some(doctor_id), Some(diagnosis)) =
            (draft.patient_id, doctor_id, diagnosis)
        else {
            return Err(PracticeError::InvalidInput(
                "prescription form is incomplete".into(),
            ));
        };
        let items: Vec<PrescriptionItem> = checked.into_iter().flatten().collect();

        let prescription_date = draft.prescription_date.unwrap_or_else(|| now.date_naive());
        check_validity_window(prescription_date, draft.valid_until)?;

        if !self.patients.exists(patient_id)? {
            return Err(PracticeError::field("patient_id", "patient does not exist"));
        }

        let prescription = Prescription {
            id: RecordId::new(),
            patient_id,
            doctor_id,
            prescription_date,
            valid_until: draft.valid_until,
            status: draft.status.unwrap_or_default(),
            diagnosis,
            notes: optional_text(draft.notes),
            items,
            created_at: now,
            updated_at: now,
        };

        let prescription = self.store.insert(prescription)?;
        tracing::info!(
            "created prescription {} with {} item(s) for patient {}",
            prescription.id,
            prescription.items.len(),
            prescription.patient_id
        );
        self.embed(prescription)
    }

    pub fn update(
        &self,
        id: RecordId,
        patch: PrescriptionPatch,
    ) -> PracticeResult<PrescriptionWithPatient> {
        let mut errors = FieldErrors::new();
        let doctor_id = match patch.doctor_id.as_deref() {
            Some(d) => errors.required("doctor_id", Some(d)),
            None => None,
        };
        let diagnosis = match patch.diagnosis.as_deref() {
            Some(d) => errors.required("diagnosis", Some(d)),
            None => None,
        };
        errors.finish()?;

        let updated = self.store.update(id, |p| {
            if let Some(doctor_id) = doctor_id {
                p.doctor_id = doctor_id;
            }
            if let Some(date) = patch.prescription_date {
                p.prescription_date = date;
            }
            if patch.valid_until.is_some() {
                p.valid_until = patch.valid_until;
            }
            if let Some(status) = patch.status {
                p.status = status;
            }
            if let Some(diagnosis) = diagnosis {
                p.diagnosis = diagnosis;
            }
            if patch.notes.is_some() {
                p.notes = optional_text(patch.notes);
            }
            check_validity_window(p.prescription_date, p.valid_until)
        })?;

        self.embed(updated)
    }

    pub fn delete(&self, id: RecordId) -> PracticeResult<()> {
        self.store.delete(id)
    }

    /// Appends an item and returns it.
    pub fn add_item(
        &self,
        id: RecordId,
        draft: PrescriptionItemDraft,
    ) -> PracticeResult<PrescriptionItem> {
        let item = draft.validate()?;
        let added = item.clone();
        self.store.update(id, |p| {
            p.items.push(item);
            Ok(())
        })?;
        Ok(added)
    }

    /// Replaces an item's content, keeping its id and position.
    pub fn update_item(
        &self,
        id: RecordId,
        item_id: RecordId,
        draft: PrescriptionItemDraft,
    ) -> PracticeResult<PrescriptionItem> {
        let mut replacement = draft.validate()?;
        replacement.id = item_id;
        let result = replacement.clone();

        self.store.update(id, |p| {
            let slot = p
                .items
                .iter_mut()
                .find(|i| i.id == item_id)
                .ok_or_else(|| PracticeError::not_found("prescription item", item_id))?;
            *slot = replacement;
            Ok(())
        })?;
        Ok(result)
    }

    pub fn delete_item(&self, id: RecordId, item_id: RecordId) -> PracticeResult<()> {
        self.store.update(id, |p| {
            let before = p.items.len();
            p.items.retain(|i| i.id != item_id);
            if p.items.len() == before {
                return Err(PracticeError::not_found("prescription item", item_id));
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Marks ACTIVE prescriptions whose `valid_until` is before `today` as EXPIRED.
    ///
    /// Returns the ids that changed. Failures on individual records are logged and skipped.
    pub fn expire_lapsed(&self, today: NaiveDate) -> Vec<RecordId> {
        let lapsed: Vec<RecordId> = self
            .store
            .list()
            .into_iter()
            .filter(|p| {
                p.status == PrescriptionStatus::Active
                    && p.valid_until.is_some_and(|until| until < today)
            })
            .map(|p| p.id)
            .collect();

        let mut expired = Vec::with_capacity(lapsed.len());
        for id in lapsed {
            match self.store.update(id, |p| {
                p.status = PrescriptionStatus::Expired;
                Ok(())
            }) {
                Ok(_) => expired.push(id),
                Err(e) => tracing::error!("failed to expire prescription {}: {:?}", id, e),
            }
        }

        if !expired.is_empty() {
            tracing::info!("expired {} lapsed prescription(s)", expired.len());
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patients::tests::{draft as patient_draft, test_cfg};
    use tempfile::TempDir;

    fn setup() -> (TempDir, PrescriptionService, Patient) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = test_cfg(temp_dir.path());
        let patient = PatientService::new(cfg.clone())
            .create(patient_draft("Marie", "Curie", "marie@example.fr"))
            .expect("patient create should succeed");
        (temp_dir, PrescriptionService::new(cfg), patient)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn header(patient_id: RecordId, on: NaiveDate) -> PrescriptionDraft {
        PrescriptionDraft {
            patient_id: Some(patient_id),
            doctor_id: Some("dr-house".into()),
            prescription_date: Some(on),
            diagnosis: Some("Hypertension".into()),
            ..PrescriptionDraft::default()
        }
    }

    fn item(name: &str) -> PrescriptionItemDraft {
        PrescriptionItemDraft {
            medication_name: Some(name.into()),
            dosage: Some("5 mg".into()),
            frequency: Some("once daily".into()),
            duration_days: Some(30),
            quantity: Some(30),
            ..PrescriptionItemDraft::default()
        }
    }

    #[test]
    fn test_create_keeps_item_order() {
        let (_tmp, service, patient) = setup();
        let created = service
            .create(
                header(patient.id, date(2024, 3, 1)),
                vec![item("Amlodipine"), item("Ramipril")],
            )
            .expect("create should succeed");

        let names: Vec<_> = created
            .prescription
            .items
            .iter()
            .map(|i| i.medication_name.as_str())
            .collect();
        assert_eq!(names, ["Amlodipine", "Ramipril"]);
        assert_eq!(created.prescription.status, PrescriptionStatus::Active);
        assert!(created.patient.is_some());
    }

    #[test]
    fn test_create_reports_item_errors_by_index() {
        let (_tmp, service, patient) = setup();
        let mut bad = item("Ramipril");
        bad.dosage = None;
        bad.quantity = Some(0);

        let result = service.create(
            header(patient.id, date(2024, 3, 1)),
            vec![item("Amlodipine"), bad],
        );
        let Err(PracticeError::Validation(list)) = result else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = list.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["items[1].dosage", "items[1].quantity"]);
    }

    #[test]
    fn test_create_rejects_inverted_validity_window() {
        let (_tmp, service, patient) = setup();
        let mut draft = header(patient.id, date(2024, 3, 10));
        draft.valid_until = Some(date(2024, 3, 9));
        let result = service.create(draft, vec![]);
        assert!(matches!(result, Err(PracticeError::Validation(_))));
    }

    #[test]
    fn test_list_and_for_patient_are_newest_first() {
        let (_tmp, service, patient) = setup();
        service.create(header(patient.id, date(2024, 1, 1)), vec![]).unwrap();
        service.create(header(patient.id, date(2024, 3, 1)), vec![]).unwrap();

        let dates: Vec<_> = service
            .list()
            .iter()
            .map(|p| p.prescription.prescription_date)
            .collect();
        assert_eq!(dates, [date(2024, 3, 1), date(2024, 1, 1)]);
        assert_eq!(service.for_patient(patient.id).len(), 2);
    }

    #[test]
    fn test_item_operations() {
        let (_tmp, service, patient) = setup();
        let id = service
            .create(header(patient.id, date(2024, 3, 1)), vec![item("Amlodipine")])
            .unwrap()
            .prescription
            .id;

        let added = service.add_item(id, item("Ramipril")).expect("add_item should succeed");

        let mut changed = item("Ramipril");
        changed.dosage = Some("10 mg".into());
        let updated = service
            .update_item(id, added.id, changed)
            .expect("update_item should succeed");
        assert_eq!(updated.id, added.id);

        let stored = service.get_raw(id).unwrap();
        assert_eq!(stored.items.len(), 2);
        assert_eq!(stored.item(added.id).unwrap().dosage.as_str(), "10 mg");

        service.delete_item(id, added.id).unwrap();
        assert_eq!(service.get_raw(id).unwrap().items.len(), 1);
        assert!(matches!(
            service.delete_item(id, added.id),
            Err(PracticeError::NotFound { .. })
        ));
    }

    #[test]
    fn test_expire_lapsed_only_touches_active_past_validity() {
        let (_tmp, service, patient) = setup();

        let mut lapsed = header(patient.id, date(2024, 1, 1));
        lapsed.valid_until = Some(date(2024, 1, 31));
        let lapsed = service.create(lapsed, vec![]).unwrap().prescription.id;

        let mut current = header(patient.id, date(2024, 1, 1));
        current.valid_until = Some(date(2024, 3, 1));
        service.create(current, vec![]).unwrap();

        let mut cancelled = header(patient.id, date(2024, 1, 1));
        cancelled.valid_until = Some(date(2024, 1, 2));
        cancelled.status = Some(PrescriptionStatus::Cancelled);
        service.create(cancelled, vec![]).unwrap();

        let expired = service.expire_lapsed(date(2024, 3, 1));
        assert_eq!(expired, [lapsed]);
        assert_eq!(
            service.get_raw(lapsed).unwrap().status,
            PrescriptionStatus::Expired
        );
        assert_eq!(service.count_active(), 1);
        assert_eq!(service.active().len(), 1);
    }

    #[test]
    fn test_update_patch_revalidates_window() {
        let (_tmp, service, patient) = setup();
        let id = service
            .create(header(patient.id, date(2024, 3, 1)), vec![])
            .unwrap()
            .prescription
            .id;

        let result = service.update(
            id,
            PrescriptionPatch {
                valid_until: Some(date(2024, 2, 1)),
                ..PrescriptionPatch::default()
            },
        );
        assert!(matches!(result, Err(PracticeError::Validation(_))));

        let ok = service
            .update(
                id,
                PrescriptionPatch {
                    status: Some(PrescriptionStatus::Completed),
                    ..PrescriptionPatch::default()
                },
            )
            .unwrap();
        assert_eq!(ok.prescription.status, PrescriptionStatus::Completed);
    }
}
