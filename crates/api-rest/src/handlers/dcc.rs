use crate::auth::{Caller, STAFF};
use crate::error::{ApiResult, ErrorBody};
use crate::handlers::record_id;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use nadym_core::dcc::{DccCase, DccCaseDraft, DccFilter, TreatmentPhase};
use serde::Deserialize;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PhaseReq {
    pub treatment_phase: TreatmentPhase,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CompletionReq {
    pub completion_percentage: u8,
}

#[utoipa::path(
    get,
    path = "/api/dcc",
    params(DccFilter),
    responses((status = 200, description = "Cases, most recently updated first", body = [DccCase]))
)]
pub async fn list_cases(
    State(state): State<AppState>,
    Query(filter): Query<DccFilter>,
) -> Json<Vec<DccCase>> {
    Json(state.dcc.list(filter))
}

#[utoipa::path(
    post,
    path = "/api/dcc",
    request_body = DccCaseDraft,
    responses(
        (status = 201, description = "Case opened", body = DccCase),
        (status = 400, description = "Invalid form", body = ErrorBody),
        (status = 409, description = "Patient already has a case", body = ErrorBody)
    )
)]
pub async fn create_case(
    State(state): State<AppState>,
    caller: Caller,
    Json(draft): Json<DccCaseDraft>,
) -> ApiResult<(StatusCode, Json<DccCase>)> {
    caller.require(STAFF)?;
    let case = state.dcc.create(draft)?;
    Ok((StatusCode::CREATED, Json(case)))
}

#[utoipa::path(
    get,
    path = "/api/dcc/{id}",
    params(("id" = String, Path, description = "Case id")),
    responses(
        (status = 200, description = "Case", body = DccCase),
        (status = 404, description = "Unknown case", body = ErrorBody)
    )
)]
pub async fn get_case(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DccCase>> {
    Ok(Json(state.dcc.get(record_id(&id)?)?))
}

#[utoipa::path(
    get,
    path = "/api/patients/{id}/dcc",
    params(("id" = String, Path, description = "Patient id")),
    responses(
        (status = 200, description = "The patient's case", body = DccCase),
        (status = 404, description = "Patient has no case", body = ErrorBody)
    )
)]
pub async fn patient_case(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DccCase>> {
    Ok(Json(state.dcc.by_patient(record_id(&id)?)?))
}

#[utoipa::path(
    put,
    path = "/api/dcc/{id}",
    params(("id" = String, Path, description = "Case id")),
    request_body = DccCaseDraft,
    responses(
        (status = 200, description = "Case updated", body = DccCase),
        (status = 400, description = "Invalid form", body = ErrorBody),
        (status = 404, description = "Unknown case", body = ErrorBody)
    )
)]
pub async fn update_case(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(draft): Json<DccCaseDraft>,
) -> ApiResult<Json<DccCase>> {
    caller.require(STAFF)?;
    Ok(Json(state.dcc.update(record_id(&id)?, draft)?))
}

#[utoipa::path(
    put,
    path = "/api/dcc/{id}/phase",
    params(("id" = String, Path, description = "Case id")),
    request_body = PhaseReq,
    responses(
        (status = 200, description = "Phase changed", body = DccCase),
        (status = 404, description = "Unknown case", body = ErrorBody)
    )
)]
pub async fn advance_phase(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<PhaseReq>,
) -> ApiResult<Json<DccCase>> {
    caller.require(STAFF)?;
    Ok(Json(
        state.dcc.advance_phase(record_id(&id)?, req.treatment_phase)?,
    ))
}

#[utoipa::path(
    put,
    path = "/api/dcc/{id}/completion",
    params(("id" = String, Path, description = "Case id")),
    request_body = CompletionReq,
    responses(
        (status = 200, description = "Completion updated", body = DccCase),
        (status = 400, description = "Percentage above 100", body = ErrorBody),
        (status = 404, description = "Unknown case", body = ErrorBody)
    )
)]
pub async fn set_completion(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<CompletionReq>,
) -> ApiResult<Json<DccCase>> {
    caller.require(STAFF)?;
    Ok(Json(
        state
            .dcc
            .set_completion(record_id(&id)?, req.completion_percentage)?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/dcc/{id}",
    params(("id" = String, Path, description = "Case id")),
    responses(
        (status = 204, description = "Case deleted"),
        (status = 404, description = "Unknown case", body = ErrorBody)
    )
)]
pub async fn delete_case(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    caller.require(STAFF)?;
    state.dcc.delete(record_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT)
}
