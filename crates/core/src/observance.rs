//! Medication adherence ("observance") tracking.
//!
//! Each scheduled dose is one [`MedicationIntake`]. Adherence is measured only over doses
//! with a known outcome:
//!
//! ```text
//! rate = taken / (taken + missed) * 100      (0 when both are zero)
//! ```
//!
//! Delayed and skipped doses count towards the dose total of a report but not towards the
//! rate. Reminders are independent records tied to a patient and, optionally, a prescription
//! item.

use crate::config::CoreConfig;
use crate::constants::{INTAKES_TABLE, REMINDERS_TABLE};
use crate::error::{PracticeError, PracticeResult};
use crate::patients::PatientService;
use crate::store::{Page, PageRequest, Query, Record, RecordStore, SortDirection};
use crate::validation::{optional_text, FieldErrors, REQUIRED};
use chrono::{DateTime, Duration, Utc};
use nadym_types::NonEmptyText;
use nadym_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Change in rate (percentage points) that counts as improving or declining.
const TREND_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntakeStatus {
    #[default]
    Scheduled,
    Taken,
    Missed,
    Delayed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MedicationIntake {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub prescription_id: Option<RecordId>,
    pub prescription_item_id: Option<RecordId>,
    pub medication_name: NonEmptyText,
    pub scheduled_time: DateTime<Utc>,
    pub actual_time: Option<DateTime<Utc>>,
    pub status: IntakeStatus,
    pub notes: Option<String>,
    pub side_effects: Option<String>,
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for MedicationIntake {
    const TABLE: &'static str = INTAKES_TABLE;
    const KIND: &'static str = "medication intake";

    fn id(&self) -> RecordId {
        self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct IntakeDraft {
    pub patient_id: Option<RecordId>,
    pub prescription_id: Option<RecordId>,
    pub prescription_item_id: Option<RecordId>,
    pub medication_name: Option<String>,
    /// Required when scheduling; defaults to the recording time when recording a dose.
    pub scheduled_time: Option<DateTime<Utc>>,
    pub status: Option<IntakeStatus>,
    pub notes: Option<String>,
    pub side_effects: Option<String>,
    pub reminder_sent: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderType {
    MedicationTime,
    RefillNeeded,
    AppointmentReminder,
    SideEffectCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderStatus {
    #[default]
    Pending,
    Sent,
    Acknowledged,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Reminder {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub prescription_item_id: Option<RecordId>,
    pub reminder_time: DateTime<Utc>,
    #[serde(rename = "type")]
    pub reminder_type: ReminderType,
    pub status: ReminderStatus,
    pub message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Reminder {
    const TABLE: &'static str = REMINDERS_TABLE;
    const KIND: &'static str = "reminder";

    fn id(&self) -> RecordId {
        self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct ReminderDraft {
    pub patient_id: Option<RecordId>,
    pub prescription_item_id: Option<RecordId>,
    pub reminder_time: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub reminder_type: Option<ReminderType>,
    pub message: Option<String>,
}

/// Reporting window for adherence reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub enum ReportPeriod {
    #[default]
    #[serde(rename = "7days")]
    SevenDays,
    #[serde(rename = "30days")]
    ThirtyDays,
    #[serde(rename = "3months")]
    ThreeMonths,
}

impl ReportPeriod {
    pub fn days(&self) -> i64 {
        match self {
            Self::SevenDays => 7,
            Self::ThirtyDays => 30,
            Self::ThreeMonths => 90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

impl Trend {
    fn between(previous: Option<f64>, current: f64) -> Self {
        match previous {
            Some(prev) if current - prev >= TREND_THRESHOLD => Self::Improving,
            Some(prev) if prev - current >= TREND_THRESHOLD => Self::Declining,
            _ => Self::Stable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// ≥ 90 % is low risk, ≥ 70 % medium, anything below high.
    pub fn from_rate(rate: f64) -> Self {
        if rate >= 90.0 {
            Self::Low
        } else if rate >= 70.0 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct MedicationAdherence {
    pub medication_name: String,
    pub total_doses: usize,
    pub taken_doses: usize,
    pub missed_doses: usize,
    pub adherence_rate: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct AdherenceReport {
    pub patient_id: RecordId,
    pub patient_name: String,
    pub period: ReportPeriod,
    pub overall_adherence: f64,
    pub risk_level: RiskLevel,
    pub medications: Vec<MedicationAdherence>,
    /// Most recent intake update in the window.
    pub last_update: Option<DateTime<Utc>>,
}

/// Counts of doses with a known outcome.
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    total: usize,
    taken: usize,
    missed: usize,
}

impl Tally {
    fn add(&mut self, status: IntakeStatus) {
        self.total += 1;
        match status {
            IntakeStatus::Taken => self.taken += 1,
            IntakeStatus::Missed => self.missed += 1,
            _ => {}
        }
    }

    fn rate(&self) -> f64 {
        let known = self.taken + self.missed;
        if known == 0 {
            0.0
        } else {
            self.taken as f64 / known as f64 * 100.0
        }
    }

    fn has_outcomes(&self) -> bool {
        self.taken + self.missed > 0
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Observance operations.
#[derive(Clone, Debug)]
pub struct ObservanceService {
    intakes: RecordStore<MedicationIntake>,
    reminders: RecordStore<Reminder>,
    patients: PatientService,
}

impl ObservanceService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            intakes: RecordStore::new(&cfg),
            reminders: RecordStore::new(&cfg),
            patients: PatientService::new(cfg),
        }
    }

    fn build_intake(
        &self,
        draft: IntakeDraft,
        default_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> PracticeResult<MedicationIntake> {
        let mut errors = FieldErrors::new();
        if draft.patient_id.is_none() {
            errors.push("patient_id", REQUIRED);
        }
        let medication_name = errors.required("medication_name", draft.medication_name.as_deref());
        let scheduled_time = draft.scheduled_time.or(default_time);
        if scheduled_time.is_none() {
            errors.push("scheduled_time", REQUIRED);
        }
        errors.finish()?;

        let (Some(patient_id), Some(medication_name), Some(scheduled_time)) =
            (draft.patient_id, medication_name, scheduled_time)
        else {
            return Err(PracticeError::InvalidInput("intake form is incomplete".into()));
        };

        if !self.patients.exists(patient_id)? {
            return Err(PracticeError::field("patient_id", "patient does not exist"));
        }

        Ok(MedicationIntake {
            id: RecordId::new(),
            patient_id,
            prescription_id: draft.prescription_id,
            prescription_item_id: draft.prescription_item_id,
            medication_name,
            scheduled_time,
            actual_time: None,
            status: draft.status.unwrap_or_default(),
            notes: optional_text(draft.notes),
            side_effects: optional_text(draft.side_effects),
            reminder_sent: draft.reminder_sent.unwrap_or(false),
            created_at: now,
            updated_at: now,
        })
    }

    /// Plans a future dose.
    pub fn schedule_intake(&self, draft: IntakeDraft) -> PracticeResult<MedicationIntake> {
        let intake = self.build_intake(draft, None, Utc::now())?;
        self.intakes.insert(intake)
    }

    /// Records a dose as taken at `now`.
    pub fn record_intake(
        &self,
        draft: IntakeDraft,
        now: DateTime<Utc>,
    ) -> PracticeResult<MedicationIntake> {
        let mut intake = self.build_intake(draft, Some(now), now)?;
        intake.status = IntakeStatus::Taken;
        intake.actual_time = Some(now);

        let intake = self.intakes.insert(intake)?;
        tracing::info!(
            "recorded intake {} of {} for patient {}",
            intake.id,
            intake.medication_name,
            intake.patient_id
        );
        Ok(intake)
    }

    pub fn get_intake(&self, id: RecordId) -> PracticeResult<MedicationIntake> {
        self.intakes.get(id)
    }

    /// A patient's intakes, latest scheduled first.
    pub fn patient_intakes(&self, patient_id: RecordId, page: PageRequest) -> Page<MedicationIntake> {
        let query = Query::new()
            .filter(move |i: &MedicationIntake| i.patient_id == patient_id)
            .order_by(
                |a: &MedicationIntake, b: &MedicationIntake| a.scheduled_time.cmp(&b.scheduled_time),
                SortDirection::Desc,
            )
            .paged(page);
        self.intakes.query(&query)
    }

    pub fn mark_missed(&self, id: RecordId) -> PracticeResult<MedicationIntake> {
        self.intakes.update(id, |i| {
            i.status = IntakeStatus::Missed;
            Ok(())
        })
    }

    /// Intakes scheduled within `start..=end`, earliest first.
    pub fn intakes_for_period(
        &self,
        patient_id: RecordId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<MedicationIntake> {
        let query = Query::new()
            .filter(move |i: &MedicationIntake| {
                i.patient_id == patient_id && i.scheduled_time >= start && i.scheduled_time <= end
            })
            .order_by(
                |a: &MedicationIntake, b: &MedicationIntake| a.scheduled_time.cmp(&b.scheduled_time),
                SortDirection::Asc,
            );
        self.intakes.query(&query).items
    }

    /// SCHEDULED intakes whose time has come, oldest first.
    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<MedicationIntake> {
        let query = Query::new()
            .filter(move |i: &MedicationIntake| {
                i.status == IntakeStatus::Scheduled && i.scheduled_time <= now
            })
            .order_by(
                |a: &MedicationIntake, b: &MedicationIntake| a.scheduled_time.cmp(&b.scheduled_time),
                SortDirection::Asc,
            );
        self.intakes.query(&query).items
    }

    /// Lifetime adherence rate for a patient, in percent.
    pub fn adherence_rate(&self, patient_id: RecordId) -> f64 {
        let mut tally = Tally::default();
        for intake in self.intakes.list() {
            if intake.patient_id == patient_id {
                tally.add(intake.status);
            }
        }
        tally.rate()
    }

    /// Per-medication adherence over the `period` ending at `now`, with a trend against the
    /// preceding period of the same length.
    pub fn adherence_report(
        &self,
        patient_id: RecordId,
        period: ReportPeriod,
        now: DateTime<Utc>,
    ) -> PracticeResult<AdherenceReport> {
        let patient = self.patients.get(patient_id)?;

        let span = Duration::days(period.days());
        let start = now - span;
        let previous_start = start - span;

        let mut current: BTreeMap<String, Tally> = BTreeMap::new();
        let mut previous: BTreeMap<String, Tally> = BTreeMap::new();
        let mut overall = Tally::default();
        let mut last_update: Option<DateTime<Utc>> = None;

        for intake in self.intakes.list() {
            if intake.patient_id != patient_id {
                continue;
            }
            let t = intake.scheduled_time;
            let name = intake.medication_name.as_str().to_owned();

            if t > start && t <= now {
                current.entry(name).or_default().add(intake.status);
                overall.add(intake.status);
                last_update = last_update.max(Some(intake.updated_at));
            } else if t > previous_start && t <= start {
                previous.entry(name).or_default().add(intake.status);
            }
        }

        let medications = current
            .into_iter()
            .map(|(medication_name, tally)| {
                let prior = previous
                    .get(&medication_name)
                    .filter(|p| p.has_outcomes())
                    .map(Tally::rate);
                MedicationAdherence {
                    trend: Trend::between(prior, tally.rate()),
                    medication_name,
                    total_doses: tally.total,
                    taken_doses: tally.taken,
                    missed_doses: tally.missed,
                    adherence_rate: round1(tally.rate()),
                }
            })
            .collect();

        let overall_rate = overall.rate();
        Ok(AdherenceReport {
            patient_id,
            patient_name: patient.details.full_name(),
            period,
            overall_adherence: round1(overall_rate),
            risk_level: RiskLevel::from_rate(overall_rate),
            medications,
            last_update,
        })
    }

    pub fn create_reminder(&self, draft: ReminderDraft) -> PracticeResult<Reminder> {
        let mut errors = FieldErrors::new();
        if draft.patient_id.is_none() {
            errors.push("patient_id", REQUIRED);
        }
        if draft.reminder_time.is_none() {
            errors.push("reminder_time", REQUIRED);
        }
        if draft.reminder_type.is_none() {
            errors.push("type", REQUIRED);
        }
        errors.finish()?;

        let (Some(patient_id), Some(reminder_time), Some(reminder_type)) =
            (draft.patient_id, draft.reminder_time, draft.reminder_type)
        else {
            return Err(PracticeError::InvalidInput("reminder form is incomplete".into()));
        };

        if !self.patients.exists(patient_id)? {
            return Err(PracticeError::field("patient_id", "patient does not exist"));
        }

        let now = Utc::now();
        self.reminders.insert(Reminder {
            id: RecordId::new(),
            patient_id,
            prescription_item_id: draft.prescription_item_id,
            reminder_time,
            reminder_type,
            status: ReminderStatus::Pending,
            message: optional_text(draft.message),
            sent_at: None,
            acknowledged_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// A patient's reminders, earliest first.
    pub fn reminders_for_patient(&self, patient_id: RecordId) -> Vec<Reminder> {
        let query = Query::new()
            .filter(move |r: &Reminder| r.patient_id == patient_id)
            .order_by(
                |a: &Reminder, b: &Reminder| a.reminder_time.cmp(&b.reminder_time),
                SortDirection::Asc,
            );
        self.reminders.query(&query).items
    }

    pub fn mark_sent(&self, id: RecordId, now: DateTime<Utc>) -> PracticeResult<Reminder> {
        self.reminders.update(id, |r| {
            r.status = ReminderStatus::Sent;
            r.sent_at = Some(now);
            Ok(())
        })
    }

    pub fn acknowledge(&self, id: RecordId, now: DateTime<Utc>) -> PracticeResult<Reminder> {
        self.reminders.update(id, |r| {
            r.status = ReminderStatus::Acknowledged;
            r.acknowledged_at = Some(now);
            Ok(())
        })
    }

    /// Expires PENDING reminders whose time is before `now`. Returns the affected ids.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> Vec<RecordId> {
        let stale: Vec<RecordId> = self
            .reminders
            .list()
            .into_iter()
            .filter(|r| r.status == ReminderStatus::Pending && r.reminder_time < now)
            .map(|r| r.id)
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for id in stale {
            match self.reminders.update(id, |r| {
                r.status = ReminderStatus::Expired;
                Ok(())
            }) {
                Ok(_) => expired.push(id),
                Err(e) => tracing::error!("failed to expire reminder {}: {:?}", id, e),
            }
        }
        expired
    }
}
