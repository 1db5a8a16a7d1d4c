use crate::auth::{Caller, CARE_TEAM_AND_PATIENT, DOCTORS, STAFF};
use crate::error::{ApiResult, ErrorBody};
use crate::handlers::{record_id, CountRes, PageParams};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use nadym_core::appointments::AppointmentWithPatient;
use nadym_core::constants::RECENT_PATIENTS_LIMIT;
use nadym_core::patients::{Patient, PatientDraft, PatientSort};
use nadym_core::prescriptions::PrescriptionWithPatient;
use nadym_core::store::PatientPage;
use nadym_core::SortDirection;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    pub sort: Option<PatientSort>,
    pub direction: Option<SortDirection>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Matched against first name, last name, email and phone.
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecentParams {
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/api/patients",
    params(PageParams, ListParams),
    responses((status = 200, description = "One page of patients", body = PatientPage))
)]
pub async fn list_patients(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<PageParams>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<PatientPage>> {
    caller.require(STAFF)?;
    Ok(Json(state.patients.list(
        page.into(),
        params.sort.unwrap_or_default(),
        params.direction.unwrap_or_default(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/patients/search",
    params(PageParams, SearchParams),
    responses((status = 200, description = "Matching patients", body = PatientPage))
)]
pub async fn search_patients(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<PageParams>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<PatientPage>> {
    caller.require(STAFF)?;
    Ok(Json(
        state
            .patients
            .search(params.q.as_deref().unwrap_or_default(), page.into()),
    ))
}

#[utoipa::path(
    get,
    path = "/api/patients/count",
    responses((status = 200, description = "Number of patients", body = CountRes))
)]
pub async fn count_patients(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<CountRes>> {
    caller.require(STAFF)?;
    Ok(Json(CountRes {
        count: state.patients.count(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/patients/recent",
    params(RecentParams),
    responses((status = 200, description = "Most recently created patients", body = [Patient]))
)]
pub async fn recent_patients(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<RecentParams>,
) -> ApiResult<Json<Vec<Patient>>> {
    caller.require(STAFF)?;
    Ok(Json(
        state
            .patients
            .recent(params.limit.unwrap_or(RECENT_PATIENTS_LIMIT)),
    ))
}

#[utoipa::path(
    post,
    path = "/api/patients",
    request_body = PatientDraft,
    responses(
        (status = 201, description = "Patient created", body = Patient),
        (status = 400, description = "Invalid form", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    )
)]
pub async fn create_patient(
    State(state): State<AppState>,
    caller: Caller,
    Json(draft): Json<PatientDraft>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    caller.require(STAFF)?;
    let patient = state.patients.create(draft)?;
    Ok((StatusCode::CREATED, Json(patient)))
}

#[utoipa::path(
    get,
    path = "/api/patients/{id}",
    params(("id" = String, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient", body = Patient),
        (status = 404, description = "Unknown patient", body = ErrorBody)
    )
)]
pub async fn get_patient(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Patient>> {
    caller.require(CARE_TEAM_AND_PATIENT)?;
    Ok(Json(state.patients.get(record_id(&id)?)?))
}

#[utoipa::path(
    put,
    path = "/api/patients/{id}",
    params(("id" = String, Path, description = "Patient id")),
    request_body = PatientDraft,
    responses(
        (status = 200, description = "Patient updated", body = Patient),
        (status = 400, description = "Invalid form", body = ErrorBody),
        (status = 404, description = "Unknown patient", body = ErrorBody)
    )
)]
pub async fn update_patient(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(draft): Json<PatientDraft>,
) -> ApiResult<Json<Patient>> {
    caller.require(STAFF)?;
    Ok(Json(state.patients.update(record_id(&id)?, draft)?))
}

#[utoipa::path(
    delete,
    path = "/api/patients/{id}",
    params(("id" = String, Path, description = "Patient id")),
    responses(
        (status = 204, description = "Patient deleted"),
        (status = 403, description = "Only doctors may delete patients", body = ErrorBody),
        (status = 404, description = "Unknown patient", body = ErrorBody)
    )
)]
pub async fn delete_patient(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    caller.require(DOCTORS)?;
    state.patients.delete(record_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/patients/{id}/appointments",
    params(("id" = String, Path, description = "Patient id")),
    responses((status = 200, description = "Appointments, latest first", body = [AppointmentWithPatient]))
)]
pub async fn patient_appointments(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<AppointmentWithPatient>>> {
    caller.require(CARE_TEAM_AND_PATIENT)?;
    Ok(Json(state.appointments.for_patient(record_id(&id)?)))
}

#[utoipa::path(
    get,
    path = "/api/patients/{id}/prescriptions",
    params(("id" = String, Path, description = "Patient id")),
    responses((status = 200, description = "Prescriptions, latest first", body = [PrescriptionWithPatient]))
)]
pub async fn patient_prescriptions(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<PrescriptionWithPatient>>> {
    caller.require(CARE_TEAM_AND_PATIENT)?;
    Ok(Json(state.prescriptions.for_patient(record_id(&id)?)))
}
