use crate::auth::{Caller, DOCTORS};
use crate::error::{ApiResult, ErrorBody};
use crate::handlers::{record_id, CountRes, PageParams};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use nadym_core::store::ExpertiseRequestPage;
use nadym_core::teleexpertise::{ExpertiseRequest, ExpertiseRequestDraft, RequestStatus};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusParams {
    /// Defaults to `PENDING`.
    pub status: Option<RequestStatus>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct AssignReq {
    pub expert_doctor_id: String,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct ResponseReq {
    pub expert_response: String,
    pub expert_recommendations: Option<String>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct CancelReq {
    pub reason: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/teleexpertise/requests",
    request_body = ExpertiseRequestDraft,
    responses(
        (status = 201, description = "Request opened with a deadline set by urgency", body = ExpertiseRequest),
        (status = 400, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    caller: Caller,
    Json(draft): Json<ExpertiseRequestDraft>,
) -> ApiResult<(StatusCode, Json<ExpertiseRequest>)> {
    caller.require(DOCTORS)?;
    let request = state.teleexpertise.create(draft, Utc::now())?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(
    get,
    path = "/api/teleexpertise/requests",
    params(StatusParams, PageParams),
    responses((status = 200, description = "Requests in one status, newest first", body = ExpertiseRequestPage))
)]
pub async fn requests_by_status(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
    Query(page): Query<PageParams>,
) -> Json<ExpertiseRequestPage> {
    Json(
        state
            .teleexpertise
            .by_status(params.status.unwrap_or_default(), page.into()),
    )
}

#[utoipa::path(
    get,
    path = "/api/teleexpertise/requests/expired",
    responses((status = 200, description = "Pending requests past their deadline", body = [ExpertiseRequest]))
)]
pub async fn expired_requests(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<Vec<ExpertiseRequest>>> {
    caller.require(DOCTORS)?;
    Ok(Json(state.teleexpertise.expired(Utc::now())))
}

#[utoipa::path(
    get,
    path = "/api/teleexpertise/requests/{id}",
    params(("id" = String, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request", body = ExpertiseRequest),
        (status = 404, description = "Unknown request", body = ErrorBody)
    )
)]
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExpertiseRequest>> {
    Ok(Json(state.teleexpertise.get(record_id(&id)?)?))
}

#[utoipa::path(
    put,
    path = "/api/teleexpertise/requests/{id}/assign",
    params(("id" = String, Path, description = "Request id")),
    request_body = AssignReq,
    responses(
        (status = 200, description = "Expert assigned", body = ExpertiseRequest),
        (status = 404, description = "Unknown request", body = ErrorBody)
    )
)]
pub async fn assign_expert(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<AssignReq>,
) -> ApiResult<Json<ExpertiseRequest>> {
    caller.require(DOCTORS)?;
    let assigned = state
        .teleexpertise
        .assign(record_id(&id)?, &req.expert_doctor_id, Utc::now())?;
    Ok(Json(assigned))
}

#[utoipa::path(
    put,
    path = "/api/teleexpertise/requests/{id}/review",
    params(("id" = String, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request under review", body = ExpertiseRequest),
        (status = 404, description = "Unknown request", body = ErrorBody)
    )
)]
pub async fn start_review(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<ExpertiseRequest>> {
    caller.require(DOCTORS)?;
    Ok(Json(state.teleexpertise.start_review(record_id(&id)?)?))
}

#[utoipa::path(
    put,
    path = "/api/teleexpertise/requests/{id}/complete",
    params(("id" = String, Path, description = "Request id")),
    request_body = ResponseReq,
    responses(
        (status = 200, description = "Expert answer recorded", body = ExpertiseRequest),
        (status = 400, description = "Empty response", body = ErrorBody),
        (status = 404, description = "Unknown request", body = ErrorBody)
    )
)]
pub async fn complete_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<ResponseReq>,
) -> ApiResult<Json<ExpertiseRequest>> {
    caller.require(DOCTORS)?;
    let completed = state.teleexpertise.complete(
        record_id(&id)?,
        &req.expert_response,
        req.expert_recommendations,
        Utc::now(),
    )?;
    Ok(Json(completed))
}

#[utoipa::path(
    put,
    path = "/api/teleexpertise/requests/{id}/cancel",
    params(("id" = String, Path, description = "Request id")),
    request_body = CancelReq,
    responses(
        (status = 200, description = "Request cancelled", body = ExpertiseRequest),
        (status = 404, description = "Unknown request", body = ErrorBody)
    )
)]
pub async fn cancel_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Option<Json<CancelReq>>,
) -> ApiResult<Json<ExpertiseRequest>> {
    caller.require(DOCTORS)?;
    let reason = body.and_then(|Json(req)| req.reason);
    Ok(Json(state.teleexpertise.cancel(record_id(&id)?, reason)?))
}

#[utoipa::path(
    get,
    path = "/api/teleexpertise/doctors/{doctor_id}/requests",
    params(("doctor_id" = String, Path, description = "Requesting doctor id"), PageParams),
    responses((status = 200, description = "Requests opened by the doctor", body = ExpertiseRequestPage))
)]
pub async fn requests_by_doctor(
    State(state): State<AppState>,
    caller: Caller,
    Path(doctor_id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<ExpertiseRequestPage>> {
    caller.require(DOCTORS)?;
    Ok(Json(
        state
            .teleexpertise
            .by_requesting_doctor(&doctor_id, page.into()),
    ))
}

#[utoipa::path(
    get,
    path = "/api/teleexpertise/doctors/{doctor_id}/assigned",
    params(("doctor_id" = String, Path, description = "Expert doctor id"), PageParams),
    responses((status = 200, description = "Requests assigned to the expert", body = ExpertiseRequestPage))
)]
pub async fn requests_for_expert(
    State(state): State<AppState>,
    caller: Caller,
    Path(doctor_id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<ExpertiseRequestPage>> {
    caller.require(DOCTORS)?;
    Ok(Json(state.teleexpertise.by_expert(&doctor_id, page.into())))
}

#[utoipa::path(
    get,
    path = "/api/teleexpertise/doctors/{doctor_id}/completed-count",
    params(("doctor_id" = String, Path, description = "Requesting doctor id")),
    responses((status = 200, description = "Completed requests opened by the doctor", body = CountRes))
)]
pub async fn completed_count(
    State(state): State<AppState>,
    caller: Caller,
    Path(doctor_id): Path<String>,
) -> ApiResult<Json<CountRes>> {
    caller.require(DOCTORS)?;
    Ok(Json(CountRes {
        count: state
            .teleexpertise
            .count_completed_by_requesting_doctor(&doctor_id),
    }))
}

#[utoipa::path(
    get,
    path = "/api/teleexpertise/specialties/{specialty}/requests",
    params(("specialty" = String, Path, description = "Specialty, case-insensitive"), PageParams),
    responses((status = 200, description = "Requests for the specialty", body = ExpertiseRequestPage))
)]
pub async fn requests_by_specialty(
    State(state): State<AppState>,
    Path(specialty): Path<String>,
    Query(page): Query<PageParams>,
) -> Json<ExpertiseRequestPage> {
    Json(state.teleexpertise.by_specialty(&specialty, page.into()))
}
