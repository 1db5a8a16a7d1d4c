use crate::auth::{Caller, CARE_TEAM_AND_PATIENT, PATIENT_OR_NURSE, STAFF};
use crate::error::{ApiResult, ErrorBody};
use crate::handlers::{record_id, PageParams};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use nadym_core::observance::{
    AdherenceReport, IntakeDraft, MedicationIntake, Reminder, ReminderDraft, ReportPeriod,
};
use nadym_core::store::IntakePage;
use nadym_core::{PracticeError, RecordId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PeriodParams {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReportParams {
    /// `7days` (default), `30days` or `3months`.
    pub period: Option<ReportPeriod>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, utoipa::ToSchema)]
pub struct AdherenceRateRes {
    pub patient_id: RecordId,
    /// Percent of doses with a known outcome that were taken.
    pub adherence_rate: f64,
}

#[utoipa::path(
    post,
    path = "/api/observance/intakes",
    request_body = IntakeDraft,
    responses(
        (status = 201, description = "Intake scheduled", body = MedicationIntake),
        (status = 400, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn schedule_intake(
    State(state): State<AppState>,
    caller: Caller,
    Json(draft): Json<IntakeDraft>,
) -> ApiResult<(StatusCode, Json<MedicationIntake>)> {
    caller.require(STAFF)?;
    let intake = state.observance.schedule_intake(draft)?;
    Ok((StatusCode::CREATED, Json(intake)))
}

#[utoipa::path(
    post,
    path = "/api/observance/intakes/record",
    request_body = IntakeDraft,
    responses(
        (status = 201, description = "Dose recorded", body = MedicationIntake),
        (status = 400, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn record_intake(
    State(state): State<AppState>,
    caller: Caller,
    Json(draft): Json<IntakeDraft>,
) -> ApiResult<(StatusCode, Json<MedicationIntake>)> {
    caller.require(PATIENT_OR_NURSE)?;
    let intake = state.observance.record_intake(draft, Utc::now())?;
    Ok((StatusCode::CREATED, Json(intake)))
}

#[utoipa::path(
    get,
    path = "/api/observance/intakes/overdue",
    responses((status = 200, description = "Scheduled intakes whose time has passed", body = [MedicationIntake]))
)]
pub async fn overdue_intakes(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<Vec<MedicationIntake>>> {
    caller.require(STAFF)?;
    Ok(Json(state.observance.overdue(Utc::now())))
}

#[utoipa::path(
    get,
    path = "/api/observance/intakes/{id}",
    params(("id" = String, Path, description = "Intake id")),
    responses(
        (status = 200, description = "Intake", body = MedicationIntake),
        (status = 404, description = "Unknown intake", body = ErrorBody)
    )
)]
pub async fn get_intake(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<MedicationIntake>> {
    caller.require(CARE_TEAM_AND_PATIENT)?;
    Ok(Json(state.observance.get_intake(record_id(&id)?)?))
}

#[utoipa::path(
    put,
    path = "/api/observance/intakes/{id}/missed",
    params(("id" = String, Path, description = "Intake id")),
    responses(
        (status = 200, description = "Intake marked missed", body = MedicationIntake),
        (status = 404, description = "Unknown intake", body = ErrorBody)
    )
)]
pub async fn mark_missed(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<MedicationIntake>> {
    caller.require(STAFF)?;
    Ok(Json(state.observance.mark_missed(record_id(&id)?)?))
}

#[utoipa::path(
    get,
    path = "/api/observance/patients/{id}/intakes",
    params(("id" = String, Path, description = "Patient id"), PageParams),
    responses((status = 200, description = "Intakes, latest scheduled first", body = IntakePage))
)]
pub async fn patient_intakes(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<IntakePage>> {
    caller.require(CARE_TEAM_AND_PATIENT)?;
    Ok(Json(
        state.observance.patient_intakes(record_id(&id)?, page.into()),
    ))
}

#[utoipa::path(
    get,
    path = "/api/observance/patients/{id}/intakes/period",
    params(("id" = String, Path, description = "Patient id"), PeriodParams),
    responses(
        (status = 200, description = "Intakes scheduled inside the window", body = [MedicationIntake]),
        (status = 400, description = "Window ends before it starts", body = ErrorBody)
    )
)]
pub async fn intakes_for_period(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Query(params): Query<PeriodParams>,
) -> ApiResult<Json<Vec<MedicationIntake>>> {
    caller.require(STAFF)?;
    if params.end < params.start {
        return Err(PracticeError::field("end", "cannot be before start").into());
    }
    Ok(Json(state.observance.intakes_for_period(
        record_id(&id)?,
        params.start,
        params.end,
    )))
}

#[utoipa::path(
    get,
    path = "/api/observance/patients/{id}/adherence",
    params(("id" = String, Path, description = "Patient id")),
    responses((status = 200, description = "Lifetime adherence rate", body = AdherenceRateRes))
)]
pub async fn adherence_rate(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<AdherenceRateRes>> {
    caller.require(STAFF)?;
    let patient_id = record_id(&id)?;
    Ok(Json(AdherenceRateRes {
        patient_id,
        adherence_rate: state.observance.adherence_rate(patient_id),
    }))
}

#[utoipa::path(
    get,
    path = "/api/observance/patients/{id}/report",
    params(("id" = String, Path, description = "Patient id"), ReportParams),
    responses(
        (status = 200, description = "Per-medication adherence with trend", body = AdherenceReport),
        (status = 404, description = "Unknown patient", body = ErrorBody)
    )
)]
pub async fn adherence_report(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Query(params): Query<ReportParams>,
) -> ApiResult<Json<AdherenceReport>> {
    caller.require(STAFF)?;
    let report = state.observance.adherence_report(
        record_id(&id)?,
        params.period.unwrap_or_default(),
        Utc::now(),
    )?;
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/api/observance/reminders",
    request_body = ReminderDraft,
    responses(
        (status = 201, description = "Reminder created", body = Reminder),
        (status = 400, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn create_reminder(
    State(state): State<AppState>,
    caller: Caller,
    Json(draft): Json<ReminderDraft>,
) -> ApiResult<(StatusCode, Json<Reminder>)> {
    caller.require(STAFF)?;
    let reminder = state.observance.create_reminder(draft)?;
    Ok((StatusCode::CREATED, Json(reminder)))
}

#[utoipa::path(
    get,
    path = "/api/observance/patients/{id}/reminders",
    params(("id" = String, Path, description = "Patient id")),
    responses((status = 200, description = "Reminders, earliest first", body = [Reminder]))
)]
pub async fn patient_reminders(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Reminder>>> {
    caller.require(CARE_TEAM_AND_PATIENT)?;
    Ok(Json(
        state.observance.reminders_for_patient(record_id(&id)?),
    ))
}

#[utoipa::path(
    put,
    path = "/api/observance/reminders/{id}/sent",
    params(("id" = String, Path, description = "Reminder id")),
    responses(
        (status = 200, description = "Reminder marked sent", body = Reminder),
        (status = 404, description = "Unknown reminder", body = ErrorBody)
    )
)]
pub async fn mark_reminder_sent(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Reminder>> {
    caller.require(STAFF)?;
    Ok(Json(state.observance.mark_sent(record_id(&id)?, Utc::now())?))
}

#[utoipa::path(
    put,
    path = "/api/observance/reminders/{id}/acknowledge",
    params(("id" = String, Path, description = "Reminder id")),
    responses(
        (status = 200, description = "Reminder acknowledged", body = Reminder),
        (status = 404, description = "Unknown reminder", body = ErrorBody)
    )
)]
pub async fn acknowledge_reminder(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Reminder>> {
    caller.require(CARE_TEAM_AND_PATIENT)?;
    Ok(Json(
        state.observance.acknowledge(record_id(&id)?, Utc::now())?,
    ))
}
