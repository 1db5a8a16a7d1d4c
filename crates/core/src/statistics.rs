//! Dashboard figures for the whole practice.

use crate::appointments::AppointmentService;
use crate::appointments::AppointmentStatus;
use crate::config::CoreConfig;
use crate::constants::RECENT_PATIENTS_LIMIT;
use crate::error::{PracticeError, PracticeResult};
use crate::patients::{Patient, PatientService};
use crate::prescriptions::PrescriptionService;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;

/// Label used for appointments booked without a type.
pub const UNKNOWN_TYPE: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct PracticeStatistics {
    pub total_patients: usize,
    pub total_appointments: usize,
    pub upcoming_appointments: usize,
    pub completed_appointments: usize,
    pub cancelled_appointments: usize,
    pub active_prescriptions: usize,
    pub appointments_by_type: BTreeMap<String, usize>,
    pub appointments_by_status: BTreeMap<String, usize>,
    pub recent_patients: Vec<Patient>,
}

#[derive(Clone, Debug)]
pub struct StatisticsService {
    cfg: Arc<CoreConfig>,
    patients: PatientService,
    appointments: AppointmentService,
    prescriptions: PrescriptionService,
}

impl StatisticsService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            patients: PatientService::new(cfg.clone()),
            appointments: AppointmentService::new(cfg.clone()),
            prescriptions: PrescriptionService::new(cfg.clone()),
            cfg,
        }
    }

    /// Statistics as of `now`, or zeroes when the practice data cannot be read.
    pub fn dashboard(&self, now: DateTime<Utc>) -> PracticeStatistics {
        match self.compute(now) {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!("failed to compute practice statistics: {}", e);
                PracticeStatistics::default()
            }
        }
    }

    pub fn compute(&self, now: DateTime<Utc>) -> PracticeResult<PracticeStatistics> {
        // A practice that has never stored anything has no data directory yet.
        match fs::read_dir(self.cfg.data_dir()) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PracticeStatistics::default()),
            Err(e) => return Err(PracticeError::FileRead(e)),
        }

        let appointments = self.appointments.all_raw();
        let mut stats = PracticeStatistics {
            total_patients: self.patients.count(),
            total_appointments: appointments.len(),
            active_prescriptions: self.prescriptions.count_active(),
            recent_patients: self.patients.recent(RECENT_PATIENTS_LIMIT),
            ..PracticeStatistics::default()
        };

        for a in &appointments {
            if a.appointment_date > now && a.status.is_pending() {
                stats.upcoming_appointments += 1;
            }
            match a.status {
                AppointmentStatus::Completed => stats.completed_appointments += 1,
                AppointmentStatus::Cancelled => stats.cancelled_appointments += 1,
                _ => {}
            }

            let kind = a.appointment_type.map_or(UNKNOWN_TYPE, |t| t.as_str());
            *stats.appointments_by_type.entry(kind.to_owned()).or_default() += 1;
            *stats
                .appointments_by_status
                .entry(a.status.as_str().to_owned())
                .or_default() += 1;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointments::{AppointmentDraft, AppointmentType};
    use crate::patients::tests::{draft as patient_draft, test_cfg};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    #[test]
    fn test_empty_practice_is_all_zero() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = StatisticsService::new(test_cfg(&temp_dir.path().join("missing")));
        assert_eq!(service.dashboard(Utc::now()), PracticeStatistics::default());
    }

    #[test]
    fn test_unreadable_data_dir_yields_zeroes() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file = temp_dir.path().join("not-a-dir");
        fs::write(&file, b"x").expect("write should succeed");
        let service = StatisticsService::new(test_cfg(&file));

        assert!(service.compute(Utc::now()).is_err());
        assert_eq!(service.dashboard(Utc::now()), PracticeStatistics::default());
    }

    #[test]
    fn test_counts_and_groupings() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = test_cfg(temp_dir.path());
        let patient = PatientService::new(cfg.clone())
            .create(patient_draft("Ada", "Lovelace", "ada@example.org"))
            .expect("patient create should succeed");
        let appointments = AppointmentService::new(cfg.clone());
        let now = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();

        let book = |offset_hours: i64, kind: Option<AppointmentType>| {
            appointments
                .book(AppointmentDraft {
                    patient_id: Some(patient.id),
                    doctor_id: Some("dr-1".into()),
                    appointment_date: Some(now + Duration::hours(offset_hours)),
                    appointment_type: kind,
                    ..AppointmentDraft::default()
                })
                .expect("booking should succeed")
        };

        book(24, Some(AppointmentType::Consultation));
        let confirmed = book(48, Some(AppointmentType::Consultation));
        appointments.confirm(confirmed.appointment.id).unwrap();
        let past = book(-24, None);
        appointments.complete(past.appointment.id).unwrap();
        let cancelled = book(72, Some(AppointmentType::FollowUp));
        appointments.cancel(cancelled.appointment.id).unwrap();

        let stats = StatisticsService::new(cfg).dashboard(now);
        assert_eq!(stats.total_patients, 1);
        assert_eq!(stats.total_appointments, 4);
        assert_eq!(stats.upcoming_appointments, 2);
        assert_eq!(stats.completed_appointments, 1);
        assert_eq!(stats.cancelled_appointments, 1);
        assert_eq!(stats.active_prescriptions, 0);
        assert_eq!(stats.appointments_by_type["CONSULTATION"], 2);
        assert_eq!(stats.appointments_by_type[UNKNOWN_TYPE], 1);
        assert_eq!(stats.appointments_by_status["CONFIRMED"], 1);
        assert_eq!(stats.recent_patients.len(), 1);
    }
}
