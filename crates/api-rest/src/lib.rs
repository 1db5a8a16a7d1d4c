//! # Nadym REST API
//!
//! HTTP surface of the practice management system, built with axum.
//!
//! - `GET /health` is open to everyone.
//! - Everything under `/api` requires the configured `x-api-key` (when one is set).
//! - Writes, and reads of patient or clinical data, also require an `x-user-role` header naming
//!   a role allowed for the action.
//! - OpenAPI documentation is served at `/api-docs/openapi.json` with Swagger UI at
//!   `/swagger-ui`.
//!
//! Handlers hold no logic of their own: they parse the request, check the caller's role and
//! call the matching `nadym-core` service.

mod auth;
mod error;
pub mod handlers;

use api_shared::{HealthRes, HealthService};
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::response::Json;
use axum::routing::{get, post, put};
use axum::Router;
use handlers::{
    appointments, dcc, observance, patients, prescriptions, rcp, statistics, teleexpertise,
    telemedicine, transcription,
};
use nadym_core::appointments::AppointmentService;
use nadym_core::dcc::DccService;
use nadym_core::observance::ObservanceService;
use nadym_core::patients::PatientService;
use nadym_core::prescriptions::PrescriptionService;
use nadym_core::rcp::RcpService;
use nadym_core::statistics::StatisticsService;
use nadym_core::teleexpertise::TeleexpertiseService;
use nadym_core::telemedicine::TelemedicineService;
use nadym_core::transcription::{NoteStructurer, PassthroughStructurer, TranscriptionService};
use nadym_core::config::core_config_from_env_values;
use nadym_core::{CoreConfig, PracticeResult};
use std::ops::Deref;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::{ApiError, ApiResult, ErrorBody};

/// Everything a handler can reach.
pub struct Services {
    pub cfg: Arc<CoreConfig>,
    /// Expected `x-api-key`; `None` disables the check.
    pub api_key: Option<String>,
    pub patients: PatientService,
    pub appointments: AppointmentService,
    pub prescriptions: PrescriptionService,
    pub observance: ObservanceService,
    pub telemedicine: TelemedicineService,
    pub teleexpertise: TeleexpertiseService,
    pub rcp: RcpService,
    pub dcc: DccService,
    pub transcription: TranscriptionService,
    pub statistics: StatisticsService,
    pub structurer: Arc<dyn NoteStructurer>,
}

/// Shared application state, cheap to clone.
#[derive(Clone)]
pub struct AppState(Arc<Services>);

impl AppState {
    /// State using the bundled [`PassthroughStructurer`] for transcripts.
    pub fn new(cfg: Arc<CoreConfig>, api_key: Option<String>) -> Self {
        Self::with_structurer(cfg, api_key, Arc::new(PassthroughStructurer))
    }

    pub fn with_structurer(
        cfg: Arc<CoreConfig>,
        api_key: Option<String>,
        structurer: Arc<dyn NoteStructurer>,
    ) -> Self {
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        Self(Arc::new(Services {
            patients: PatientService::new(cfg.clone()),
            appointments: AppointmentService::new(cfg.clone()),
            prescriptions: PrescriptionService::new(cfg.clone()),
            observance: ObservanceService::new(cfg.clone()),
            telemedicine: TelemedicineService::new(cfg.clone()),
            teleexpertise: TeleexpertiseService::new(cfg.clone()),
            rcp: RcpService::new(cfg.clone()),
            dcc: DccService::new(cfg.clone()),
            transcription: TranscriptionService::new(cfg.clone()),
            statistics: StatisticsService::new(cfg.clone()),
            cfg,
            api_key,
            structurer,
        }))
    }
}

impl Deref for AppState {
    type Target = Services;

    fn deref(&self) -> &Services {
        &self.0
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Nadym practice API"),
    paths(
        health,
        patients::list_patients,
        patients::search_patients,
        patients::count_patients,
        patients::recent_patients,
        patients::create_patient,
        patients::get_patient,
        patients::update_patient,
        patients::delete_patient,
        patients::patient_appointments,
        patients::patient_prescriptions,
        appointments::list_appointments,
        appointments::upcoming_appointments,
        appointments::calendar_day,
        appointments::calendar_week,
        appointments::calendar_month,
        appointments::book_appointment,
        appointments::get_appointment,
        appointments::update_appointment,
        appointments::set_appointment_status,
        appointments::delete_appointment,
        prescriptions::list_prescriptions,
        prescriptions::active_prescriptions,
        prescriptions::create_prescription,
        prescriptions::get_prescription,
        prescriptions::update_prescription,
        prescriptions::delete_prescription,
        prescriptions::add_item,
        prescriptions::update_item,
        prescriptions::delete_item,
        observance::schedule_intake,
        observance::record_intake,
        observance::overdue_intakes,
        observance::get_intake,
        observance::mark_missed,
        observance::patient_intakes,
        observance::intakes_for_period,
        observance::adherence_rate,
        observance::adherence_report,
        observance::create_reminder,
        observance::patient_reminders,
        observance::mark_reminder_sent,
        observance::acknowledge_reminder,
        telemedicine::rtc_config,
        telemedicine::schedule_consultation,
        telemedicine::get_consultation,
        telemedicine::consultation_by_room,
        telemedicine::doctor_consultations,
        telemedicine::patient_consultations,
        telemedicine::start_consultation,
        telemedicine::end_consultation,
        telemedicine::cancel_consultation,
        telemedicine::report_technical_issue,
        telemedicine::post_message,
        telemedicine::list_messages,
        telemedicine::mark_message_read,
        teleexpertise::create_request,
        teleexpertise::requests_by_status,
        teleexpertise::expired_requests,
        teleexpertise::get_request,
        teleexpertise::assign_expert,
        teleexpertise::start_review,
        teleexpertise::complete_request,
        teleexpertise::cancel_request,
        teleexpertise::requests_by_doctor,
        teleexpertise::requests_for_expert,
        teleexpertise::completed_count,
        teleexpertise::requests_by_specialty,
        rcp::list_meetings,
        rcp::upcoming_meetings,
        rcp::patient_meetings,
        rcp::create_meeting,
        rcp::get_meeting,
        rcp::update_meeting,
        rcp::delete_meeting,
        rcp::add_participant,
        rcp::set_attendance,
        rcp::start_meeting,
        rcp::complete_meeting,
        rcp::cancel_meeting,
        rcp::postpone_meeting,
        dcc::list_cases,
        dcc::create_case,
        dcc::get_case,
        dcc::patient_case,
        dcc::update_case,
        dcc::advance_phase,
        dcc::set_completion,
        dcc::delete_case,
        transcription::doctor_transcriptions,
        transcription::consultation_transcriptions,
        transcription::create_transcription,
        transcription::upload_audio,
        transcription::get_transcription,
        transcription::download_audio,
        transcription::process_transcription,
        transcription::cancel_transcription,
        statistics::dashboard,
    ),
    components(schemas(
        HealthRes,
        ErrorBody,
        nadym_core::FieldError,
        nadym_core::SortDirection,
        handlers::CountRes,
        nadym_core::store::PatientPage,
        nadym_core::store::IntakePage,
        nadym_core::store::ConsultationPage,
        nadym_core::store::ExpertiseRequestPage,
        nadym_core::store::TranscriptionPage,
        nadym_core::patients::Gender,
        nadym_core::patients::PatientDetails,
        nadym_core::patients::Patient,
        nadym_core::patients::PatientDraft,
        nadym_core::patients::PatientSort,
        nadym_core::appointments::AppointmentStatus,
        nadym_core::appointments::AppointmentType,
        nadym_core::appointments::Appointment,
        nadym_core::appointments::AppointmentWithPatient,
        nadym_core::appointments::AppointmentDraft,
        nadym_core::appointments::AppointmentPatch,
        nadym_core::calendar::AppointmentDayCell,
        nadym_core::calendar::AppointmentMonthCell,
        appointments::StatusReq,
        appointments::DayView,
        appointments::WeekView,
        appointments::MonthView,
        nadym_core::prescriptions::PrescriptionStatus,
        nadym_core::prescriptions::PrescriptionItem,
        nadym_core::prescriptions::Prescription,
        nadym_core::prescriptions::PrescriptionWithPatient,
        nadym_core::prescriptions::PrescriptionItemDraft,
        nadym_core::prescriptions::PrescriptionDraft,
        nadym_core::prescriptions::PrescriptionPatch,
        prescriptions::CreatePrescriptionReq,
        nadym_core::observance::IntakeStatus,
        nadym_core::observance::MedicationIntake,
        nadym_core::observance::IntakeDraft,
        nadym_core::observance::ReminderType,
        nadym_core::observance::ReminderStatus,
        nadym_core::observance::Reminder,
        nadym_core::observance::ReminderDraft,
        nadym_core::observance::ReportPeriod,
        nadym_core::observance::Trend,
        nadym_core::observance::RiskLevel,
        nadym_core::observance::MedicationAdherence,
        nadym_core::observance::AdherenceReport,
        observance::AdherenceRateRes,
        nadym_core::telemedicine::ConsultationStatus,
        nadym_core::telemedicine::VideoConsultation,
        nadym_core::telemedicine::SenderType,
        nadym_core::telemedicine::MessageType,
        nadym_core::telemedicine::ChatMessage,
        nadym_core::telemedicine::MessageDraft,
        nadym_core::telemedicine::IceServer,
        nadym_core::telemedicine::RtcConfig,
        telemedicine::ScheduleReq,
        telemedicine::NoteReq,
        telemedicine::IssueReq,
        nadym_core::teleexpertise::Urgency,
        nadym_core::teleexpertise::RequestStatus,
        nadym_core::teleexpertise::ExpertiseRequest,
        nadym_core::teleexpertise::ExpertiseRequestDraft,
        teleexpertise::AssignReq,
        teleexpertise::ResponseReq,
        teleexpertise::CancelReq,
        nadym_core::rcp::MeetingStatus,
        nadym_core::rcp::MeetingType,
        nadym_core::rcp::ParticipantRole,
        nadym_core::rcp::Attendance,
        nadym_core::rcp::Participant,
        nadym_core::rcp::RcpMeeting,
        nadym_core::rcp::ParticipantDraft,
        nadym_core::rcp::RcpMeetingDraft,
        nadym_core::rcp::MeetingDecision,
        rcp::AttendanceReq,
        rcp::PostponeReq,
        nadym_core::dcc::TreatmentPhase,
        nadym_core::dcc::CaseRiskLevel,
        nadym_core::dcc::DccStatus,
        nadym_core::dcc::DccCase,
        nadym_core::dcc::DccCaseDraft,
        dcc::PhaseReq,
        dcc::CompletionReq,
        nadym_core::transcription::TranscriptionStatus,
        nadym_core::transcription::AudioFile,
        nadym_core::transcription::Transcription,
        nadym_core::transcription::TranscriptionDraft,
        transcription::ProcessReq,
        nadym_core::statistics::PracticeStatistics,
    ))
)]
pub struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthRes))
)]
async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

/// Routes under `/api`, before the API key layer.
fn api_routes(state: &AppState) -> Router<AppState> {
    let audio_limit = usize::try_from(state.cfg.audio_max_bytes()).unwrap_or(usize::MAX);

    Router::new()
        .route(
            "/patients",
            get(patients::list_patients).post(patients::create_patient),
        )
        .route("/patients/search", get(patients::search_patients))
        .route("/patients/count", get(patients::count_patients))
        .route("/patients/recent", get(patients::recent_patients))
        .route(
            "/patients/:id",
            get(patients::get_patient)
                .put(patients::update_patient)
                .delete(patients::delete_patient),
        )
        .route(
            "/patients/:id/appointments",
            get(patients::patient_appointments),
        )
        .route(
            "/patients/:id/prescriptions",
            get(patients::patient_prescriptions),
        )
        .route("/patients/:id/rcp", get(rcp::patient_meetings))
        .route("/patients/:id/dcc", get(dcc::patient_case))
        .route(
            "/appointments",
            get(appointments::list_appointments).post(appointments::book_appointment),
        )
        .route(
            "/appointments/upcoming",
            get(appointments::upcoming_appointments),
        )
        .route("/appointments/calendar/day", get(appointments::calendar_day))
        .route(
            "/appointments/calendar/week",
            get(appointments::calendar_week),
        )
        .route(
            "/appointments/calendar/month",
            get(appointments::calendar_month),
        )
        .route(
            "/appointments/:id",
            get(appointments::get_appointment)
                .put(appointments::update_appointment)
                .delete(appointments::delete_appointment),
        )
        .route(
            "/appointments/:id/status",
            put(appointments::set_appointment_status),
        )
        .route(
            "/prescriptions",
            get(prescriptions::list_prescriptions).post(prescriptions::create_prescription),
        )
        .route(
            "/prescriptions/active",
            get(prescriptions::active_prescriptions),
        )
        .route(
            "/prescriptions/:id",
            get(prescriptions::get_prescription)
                .put(prescriptions::update_prescription)
                .delete(prescriptions::delete_prescription),
        )
        .route("/prescriptions/:id/items", post(prescriptions::add_item))
        .route(
            "/prescriptions/:id/items/:item_id",
            put(prescriptions::update_item).delete(prescriptions::delete_item),
        )
        .route("/observance/intakes", post(observance::schedule_intake))
        .route(
            "/observance/intakes/record",
            post(observance::record_intake),
        )
        .route(
            "/observance/intakes/overdue",
            get(observance::overdue_intakes),
        )
        .route("/observance/intakes/:id", get(observance::get_intake))
        .route(
            "/observance/intakes/:id/missed",
            put(observance::mark_missed),
        )
        .route(
            "/observance/patients/:id/intakes",
            get(observance::patient_intakes),
        )
        .route(
            "/observance/patients/:id/intakes/period",
            get(observance::intakes_for_period),
        )
        .route(
            "/observance/patients/:id/adherence",
            get(observance::adherence_rate),
        )
        .route(
            "/observance/patients/:id/report",
            get(observance::adherence_report),
        )
        .route(
            "/observance/patients/:id/reminders",
            get(observance::patient_reminders),
        )
        .route("/observance/reminders", post(observance::create_reminder))
        .route(
            "/observance/reminders/:id/sent",
            put(observance::mark_reminder_sent),
        )
        .route(
            "/observance/reminders/:id/acknowledge",
            put(observance::acknowledge_reminder),
        )
        .route("/telemedicine/rtc-config", get(telemedicine::rtc_config))
        .route(
            "/telemedicine/consultations",
            post(telemedicine::schedule_consultation),
        )
        .route(
            "/telemedicine/consultations/:id",
            get(telemedicine::get_consultation),
        )
        .route(
            "/telemedicine/consultations/:id/start",
            put(telemedicine::start_consultation),
        )
        .route(
            "/telemedicine/consultations/:id/end",
            put(telemedicine::end_consultation),
        )
        .route(
            "/telemedicine/consultations/:id/cancel",
            put(telemedicine::cancel_consultation),
        )
        .route(
            "/telemedicine/consultations/:id/technical-issue",
            put(telemedicine::report_technical_issue),
        )
        .route(
            "/telemedicine/consultations/:id/messages",
            get(telemedicine::list_messages).post(telemedicine::post_message),
        )
        .route(
            "/telemedicine/messages/:id/read",
            put(telemedicine::mark_message_read),
        )
        .route(
            "/telemedicine/rooms/:room_id",
            get(telemedicine::consultation_by_room),
        )
        .route(
            "/telemedicine/doctors/:doctor_id/consultations",
            get(telemedicine::doctor_consultations),
        )
        .route(
            "/telemedicine/patients/:id/consultations",
            get(telemedicine::patient_consultations),
        )
        .route(
            "/teleexpertise/requests",
            get(teleexpertise::requests_by_status).post(teleexpertise::create_request),
        )
        .route(
            "/teleexpertise/requests/expired",
            get(teleexpertise::expired_requests),
        )
        .route(
            "/teleexpertise/requests/:id",
            get(teleexpertise::get_request),
        )
        .route(
            "/teleexpertise/requests/:id/assign",
            put(teleexpertise::assign_expert),
        )
        .route(
            "/teleexpertise/requests/:id/review",
            put(teleexpertise::start_review),
        )
        .route(
            "/teleexpertise/requests/:id/complete",
            put(teleexpertise::complete_request),
        )
        .route(
            "/teleexpertise/requests/:id/cancel",
            put(teleexpertise::cancel_request),
        )
        .route(
            "/teleexpertise/doctors/:doctor_id/requests",
            get(teleexpertise::requests_by_doctor),
        )
        .route(
            "/teleexpertise/doctors/:doctor_id/assigned",
            get(teleexpertise::requests_for_expert),
        )
        .route(
            "/teleexpertise/doctors/:doctor_id/completed-count",
            get(teleexpertise::completed_count),
        )
        .route(
            "/teleexpertise/specialties/:specialty/requests",
            get(teleexpertise::requests_by_specialty),
        )
        .route(
            "/rcp/meetings",
            get(rcp::list_meetings).post(rcp::create_meeting),
        )
        .route("/rcp/meetings/upcoming", get(rcp::upcoming_meetings))
        .route(
            "/rcp/meetings/:id",
            get(rcp::get_meeting)
                .put(rcp::update_meeting)
                .delete(rcp::delete_meeting),
        )
        .route(
            "/rcp/meetings/:id/participants",
            post(rcp::add_participant),
        )
        .route(
            "/rcp/meetings/:id/participants/:doctor_id/attendance",
            put(rcp::set_attendance),
        )
        .route("/rcp/meetings/:id/start", put(rcp::start_meeting))
        .route("/rcp/meetings/:id/complete", put(rcp::complete_meeting))
        .route("/rcp/meetings/:id/cancel", put(rcp::cancel_meeting))
        .route("/rcp/meetings/:id/postpone", put(rcp::postpone_meeting))
        .route("/dcc", get(dcc::list_cases).post(dcc::create_case))
        .route(
            "/dcc/:id",
            get(dcc::get_case)
                .put(dcc::update_case)
                .delete(dcc::delete_case),
        )
        .route("/dcc/:id/phase", put(dcc::advance_phase))
        .route("/dcc/:id/completion", put(dcc::set_completion))
        .route(
            "/transcriptions",
            post(transcription::create_transcription),
        )
        .route(
            "/transcriptions/upload",
            post(transcription::upload_audio).layer(DefaultBodyLimit::max(audio_limit)),
        )
        .route(
            "/transcriptions/doctors/:doctor_id",
            get(transcription::doctor_transcriptions),
        )
        .route(
            "/transcriptions/consultations/:id",
            get(transcription::consultation_transcriptions),
        )
        .route(
            "/transcriptions/:id",
            get(transcription::get_transcription),
        )
        .route(
            "/transcriptions/:id/audio",
            get(transcription::download_audio),
        )
        .route(
            "/transcriptions/:id/process",
            put(transcription::process_transcription),
        )
        .route(
            "/transcriptions/:id/cancel",
            put(transcription::cancel_transcription),
        )
        .route("/statistics", get(statistics::dashboard))
}

/// The complete application: health check, the key-protected API, Swagger UI and CORS.
pub fn router(state: AppState) -> Router {
    let api = api_routes(&state).route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_api_key,
    ));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .merge(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Default listen address for the REST server.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Listen address from `NADYM_REST_ADDR`.
pub fn rest_addr_from_env() -> String {
    std::env::var("NADYM_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into())
}

/// Core configuration from `PRACTICE_DATA_DIR`, `NADYM_ICE_SERVERS` and `NADYM_AUDIO_MAX_BYTES`.
pub fn config_from_env() -> PracticeResult<Arc<CoreConfig>> {
    core_config_from_env_values(
        std::env::var("PRACTICE_DATA_DIR").ok(),
        std::env::var("NADYM_ICE_SERVERS").ok(),
        std::env::var("NADYM_AUDIO_MAX_BYTES").ok(),
    )
    .map(Arc::new)
}

/// `API_KEY`, warning when it is unset since `/api` is then open to any caller.
pub fn api_key_from_env() -> Option<String> {
    let api_key = std::env::var("API_KEY").ok().filter(|k| !k.trim().is_empty());
    if api_key.is_none() {
        tracing::warn!("API_KEY is not set; /api is open to any caller");
    }
    api_key
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    fn app(temp_dir: &TempDir) -> Router {
        let cfg = Arc::new(
            CoreConfig::with_defaults(temp_dir.path().to_path_buf())
                .expect("CoreConfig::with_defaults should succeed"),
        );
        router(AppState::new(cfg, Some(KEY.into())))
    }

    fn request(method: &str, uri: &str, role: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-api-key", KEY);
        if let Some(role) = role {
            builder = builder.header("x-user-role", role);
        }
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("request should build"),
            None => builder.body(Body::empty()).expect("request should build"),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.expect("router is infallible");
        let status = res.status();
        let bytes = res
            .into_body()
            .collect()
            .await
            .expect("body should be readable")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn patient_json(email: &str) -> Value {
        json!({
            "first_name": "Amina",
            "last_name": "Benali",
            "date_of_birth": "1984-03-12",
            "email": email,
        })
    }

    #[tokio::test]
    async fn test_health_needs_no_key() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let app = app(&temp_dir);

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("request should build");
        let (status, body) = send(&app, req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_api_rejects_wrong_key() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let app = app(&temp_dir);

        let req = Request::builder()
            .uri("/api/patients")
            .header("x-api-key", "nope")
            .body(Body::empty())
            .expect("request should build");
        let (status, body) = send(&app, req).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid API key");
    }

    #[tokio::test]
    async fn test_writes_need_a_role() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let app = app(&temp_dir);

        let (status, _) = send(
            &app,
            request("POST", "/api/patients", None, Some(patient_json("a@example.com"))),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/patients",
                Some("PATIENT"),
                Some(patient_json("a@example.com")),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "role PATIENT may not perform this action");
    }

    #[tokio::test]
    async fn test_create_then_get_patient() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let app = app(&temp_dir);

        let (status, created) = send(
            &app,
            request(
                "POST",
                "/api/patients",
                Some("NURSE"),
                Some(patient_json("amina@example.com")),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().expect("id should be a string").to_owned();

        let (status, fetched) =
            send(&app, request("GET", &format!("/api/patients/{id}"), Some("NURSE"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["last_name"], "Benali");

        let (status, page) =
            send(&app, request("GET", "/api/patients", Some("DOCTOR"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total_items"], 1);
    }

    #[tokio::test]
    async fn test_validation_errors_list_fields() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let app = app(&temp_dir);

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/patients",
                Some("DOCTOR"),
                Some(json!({ "email": "not-an-email" })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation failed");
        let fields: Vec<&str> = body["fields"]
            .as_array()
            .expect("fields should be an array")
            .iter()
            .filter_map(|f| f["field"].as_str())
            .collect();
        assert!(fields.contains(&"first_name"));
        assert!(fields.contains(&"email"));
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let app = app(&temp_dir);

        let missing = nadym_core::RecordId::new();
        let (status, _) = send(
            &app,
            request("GET", &format!("/api/patients/{missing}"), Some("DOCTOR"), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            request("GET", "/api/patients/not-an-id", Some("DOCTOR"), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_calendar_week_has_seven_days() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let app = app(&temp_dir);

        let (status, body) = send(
            &app,
            request(
                "GET",
                "/api/appointments/calendar/week?date=2024-05-15&offset=1",
                None,
                None,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["start"], "2024-05-19");
        assert_eq!(body["end"], "2024-05-25");
        assert_eq!(body["days"].as_array().map(Vec::len), Some(7));
    }

    #[tokio::test]
    async fn test_statistics_on_empty_practice() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let app = app(&temp_dir);

        let (status, body) = send(&app, request("GET", "/api/statistics", None, None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_patients"], 0);
    }

    #[tokio::test]
    async fn test_consultation_room_lookup() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let app = app(&temp_dir);

        let (_, patient) = send(
            &app,
            request(
                "POST",
                "/api/patients",
                Some("DOCTOR"),
                Some(patient_json("room@example.com")),
            ),
        )
        .await;

        let (status, consultation) = send(
            &app,
            request(
                "POST",
                "/api/telemedicine/consultations",
                Some("DOCTOR"),
                Some(json!({
                    "patient_id": patient["id"],
                    "doctor_id": "dr-house",
                    "scheduled_time": "2030-01-10T09:00:00Z",
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let room = consultation["room_id"].as_str().expect("room id").to_owned();
        assert!(room.starts_with("room_"));

        let (status, found) = send(
            &app,
            request("GET", &format!("/api/telemedicine/rooms/{room}"), None, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["id"], consultation["id"]);
    }

    #[tokio::test]
    async fn test_patient_list_is_for_staff() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let app = app(&temp_dir);

        let (status, _) = send(&app, request("GET", "/api/patients", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) =
            send(&app, request("GET", "/api/patients", Some("PATIENT"), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "role PATIENT may not perform this action");

        let (status, _) = send(
            &app,
            request("GET", "/api/patients/count", Some("PATIENT"), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, request("GET", "/api/patients", Some("NURSE"), None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, request("GET", "/api/patients", Some("ADMIN"), None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_doctor_only_reads() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let app = app(&temp_dir);

        let (status, _) = send(
            &app,
            request("GET", "/api/teleexpertise/requests/expired", Some("NURSE"), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            request("GET", "/api/teleexpertise/requests/expired", Some("DOCTOR"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let missing = nadym_core::RecordId::new();
        let (status, _) = send(
            &app,
            request("GET", &format!("/api/transcriptions/{missing}"), Some("NURSE"), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            request("GET", "/api/observance/intakes/overdue", Some("PATIENT"), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_calendar_rejects_offsets_past_the_date_range() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let app = app(&temp_dir);

        for uri in [
            "/api/appointments/calendar/day?date=2024-05-15&offset=2147483647",
            "/api/appointments/calendar/day?date=2024-05-15&offset=-2147483648",
            "/api/appointments/calendar/week?date=2024-05-15&offset=2147483647",
            "/api/appointments/calendar/week?date=2024-05-15&offset=-2147483648",
            "/api/appointments/calendar/month?date=2024-05-15&offset=2147483647",
        ] {
            let (status, body) = send(&app, request("GET", uri, None, None)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["error"].as_str().is_some(), "{uri}");
        }

        let (status, body) = send(
            &app,
            request(
                "GET",
                "/api/appointments/calendar/day?date=2024-02-28&offset=2",
                None,
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["date"], "2024-03-01");
    }

    #[tokio::test]
    async fn test_patient_may_start_a_consultation() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let app = app(&temp_dir);

        let (_, patient) = send(
            &app,
            request(
                "POST",
                "/api/patients",
                Some("DOCTOR"),
                Some(patient_json("video@example.com")),
            ),
        )
        .await;
        let (_, consultation) = send(
            &app,
            request(
                "POST",
                "/api/telemedicine/consultations",
                Some("NURSE"),
                Some(json!({
                    "patient_id": patient["id"],
                    "doctor_id": "dr-house",
                    "scheduled_time": "2030-01-10T09:00:00Z",
                })),
            ),
        )
        .await;
        let id = consultation["id"].as_str().expect("id should be a string").to_owned();
        let start = format!("/api/telemedicine/consultations/{id}/start");

        let (status, _) = send(&app, request("PUT", &start, Some("NURSE"), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, started) = send(&app, request("PUT", &start, Some("PATIENT"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(started["status"], "IN_PROGRESS");
    }

    #[tokio::test]
    async fn test_intake_recording_is_for_patients_and_nurses() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let app = app(&temp_dir);

        let (_, patient) = send(
            &app,
            request(
                "POST",
                "/api/patients",
                Some("NURSE"),
                Some(patient_json("dose@example.com")),
            ),
        )
        .await;
        let dose = json!({
            "patient_id": patient["id"],
            "medication_name": "Tamoxifen",
        });

        let (status, _) = send(
            &app,
            request("POST", "/api/observance/intakes/record", Some("DOCTOR"), Some(dose.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        for role in ["PATIENT", "NURSE"] {
            let (status, recorded) = send(
                &app,
                request("POST", "/api/observance/intakes/record", Some(role), Some(dose.clone())),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED, "{role}");
            assert_eq!(recorded["status"], "TAKEN");
        }
    }
}
