use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use nadym_core::constants::DEFAULT_PRACTICE_DATA_DIR;
use nadym_core::observance::ObservanceService;
use nadym_core::patients::{PatientDraft, PatientService, PatientSort};
use nadym_core::prescriptions::PrescriptionService;
use nadym_core::statistics::StatisticsService;
use nadym_core::teleexpertise::TeleexpertiseService;
use nadym_core::{CoreConfig, PageRequest, PracticeError, SortDirection};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "nadym")]
#[command(about = "Nadym practice management CLI")]
struct Cli {
    /// Practice data directory (defaults to $PRACTICE_DATA_DIR, then `practice_data`)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List patients by last name
    List {
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        size: Option<usize>,
    },
    /// Search patients by name, email or phone
    Search { term: String },
    /// Register a patient
    AddPatient {
        first_name: String,
        last_name: String,
        /// Date of birth (YYYY-MM-DD)
        date_of_birth: NaiveDate,
        email: String,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Print dashboard statistics
    Stats,
    /// Mark ACTIVE prescriptions past their validity date as EXPIRED
    ExpirePrescriptions {
        /// Reference day (defaults to today, UTC)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Mark reminders left PENDING past their time as EXPIRED
    ExpireReminders,
    /// List scheduled intakes whose time has passed
    OverdueIntakes,
    /// List tele-expertise requests still PENDING past their deadline
    ExpiredRequests,
}

fn config(data_dir: Option<PathBuf>) -> Result<Arc<CoreConfig>, PracticeError> {
    let data_dir = data_dir
        .or_else(|| std::env::var("PRACTICE_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PRACTICE_DATA_DIR));
    Ok(Arc::new(CoreConfig::with_defaults(data_dir)?))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'nadym --help' for commands");
        return Ok(());
    };
    let cfg = config(cli.data_dir)?;

    match command {
        Commands::List { page, size } => {
            let page = PatientService::new(cfg).list(
                PageRequest::new(page, size),
                PatientSort::LastName,
                SortDirection::Asc,
            );
            if page.items.is_empty() {
                println!("No patients found.");
            }
            for patient in &page.items {
                println!(
                    "ID: {}, Name: {}, Born: {}, Email: {}",
                    patient.id,
                    patient.details.full_name(),
                    patient.details.date_of_birth,
                    patient.details.email
                );
            }
            println!(
                "Page {} of {} ({} patients)",
                page.page + 1,
                page.total_pages.max(1),
                page.total_items
            );
        }
        Commands::Search { term } => {
            let found = PatientService::new(cfg).search(&term, PageRequest::new(None, None));
            for patient in found.items {
                println!("ID: {}, Name: {}", patient.id, patient.details.full_name());
            }
        }
        Commands::AddPatient {
            first_name,
            last_name,
            date_of_birth,
            email,
            phone,
        } => {
            let draft = PatientDraft {
                first_name: Some(first_name),
                last_name: Some(last_name),
                date_of_birth: Some(date_of_birth),
                email: Some(email),
                phone,
                ..PatientDraft::default()
            };
            match PatientService::new(cfg).create(draft) {
                Ok(patient) => println!("Created patient with ID: {}", patient.id),
                Err(PracticeError::Validation(fields)) => {
                    for field in fields {
                        eprintln!("{}", field);
                    }
                }
                Err(e) => eprintln!("Error creating patient: {}", e),
            }
        }
        Commands::Stats => {
            let stats = StatisticsService::new(cfg).compute(Utc::now())?;
            println!("Patients:              {}", stats.total_patients);
            println!("Appointments:          {}", stats.total_appointments);
            println!("  upcoming:            {}", stats.upcoming_appointments);
            println!("  completed:           {}", stats.completed_appointments);
            println!("  cancelled:           {}", stats.cancelled_appointments);
            println!("Active prescriptions:  {}", stats.active_prescriptions);
            for (kind, count) in &stats.appointments_by_type {
                println!("  type {}: {}", kind, count);
            }
        }
        Commands::ExpirePrescriptions { today } => {
            let today = today.unwrap_or_else(|| Utc::now().date_naive());
            let expired = PrescriptionService::new(cfg).expire_lapsed(today);
            println!("Expired {} prescription(s)", expired.len());
        }
        Commands::ExpireReminders => {
            let expired = ObservanceService::new(cfg).expire_stale(Utc::now());
            println!("Expired {} reminder(s)", expired.len());
        }
        Commands::OverdueIntakes => {
            for intake in ObservanceService::new(cfg).overdue(Utc::now()) {
                println!(
                    "ID: {}, Patient: {}, Medication: {}, Due: {}",
                    intake.id, intake.patient_id, intake.medication_name, intake.scheduled_time
                );
            }
        }
        Commands::ExpiredRequests => {
            for request in TeleexpertiseService::new(cfg).expired(Utc::now()) {
                println!(
                    "ID: {}, Specialty: {}, Deadline: {}",
                    request.id, request.specialty, request.deadline
                );
            }
        }
    }

    Ok(())
}
