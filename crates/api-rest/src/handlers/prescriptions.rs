use crate::auth::{Caller, STAFF};
use crate::error::{ApiResult, ErrorBody};
use crate::handlers::record_id;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use nadym_core::prescriptions::{
    PrescriptionDraft, PrescriptionItem, PrescriptionItemDraft, PrescriptionPatch,
    PrescriptionWithPatient,
};
use serde::Deserialize;

/// A prescription header together with its initial items.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct CreatePrescriptionReq {
    #[serde(flatten)]
    pub prescription: PrescriptionDraft,
    #[serde(default)]
    pub items: Vec<PrescriptionItemDraft>,
}

#[utoipa::path(
    get,
    path = "/api/prescriptions",
    responses((status = 200, description = "All prescriptions, latest first", body = [PrescriptionWithPatient]))
)]
pub async fn list_prescriptions(State(state): State<AppState>) -> Json<Vec<PrescriptionWithPatient>> {
    Json(state.prescriptions.list())
}

#[utoipa::path(
    get,
    path = "/api/prescriptions/active",
    responses((status = 200, description = "Active prescriptions", body = [PrescriptionWithPatient]))
)]
pub async fn active_prescriptions(
    State(state): State<AppState>,
) -> Json<Vec<PrescriptionWithPatient>> {
    Json(state.prescriptions.active())
}

#[utoipa::path(
    post,
    path = "/api/prescriptions",
    request_body = CreatePrescriptionReq,
    responses(
        (status = 201, description = "Prescription created", body = PrescriptionWithPatient),
        (status = 400, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn create_prescription(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreatePrescriptionReq>,
) -> ApiResult<(StatusCode, Json<PrescriptionWithPatient>)> {
    caller.require(STAFF)?;
    let created = state.prescriptions.create(req.prescription, req.items)?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/prescriptions/{id}",
    params(("id" = String, Path, description = "Prescription id")),
    responses(
        (status = 200, description = "Prescription", body = PrescriptionWithPatient),
        (status = 404, description = "Unknown prescription", body = ErrorBody)
    )
)]
pub async fn get_prescription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PrescriptionWithPatient>> {
    Ok(Json(state.prescriptions.get(record_id(&id)?)?))
}

#[utoipa::path(
    put,
    path = "/api/prescriptions/{id}",
    params(("id" = String, Path, description = "Prescription id")),
    request_body = PrescriptionPatch,
    responses(
        (status = 200, description = "Prescription updated", body = PrescriptionWithPatient),
        (status = 400, description = "Invalid form", body = ErrorBody),
        (status = 404, description = "Unknown prescription", body = ErrorBody)
    )
)]
pub async fn update_prescription(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(patch): Json<PrescriptionPatch>,
) -> ApiResult<Json<PrescriptionWithPatient>> {
    caller.require(STAFF)?;
    Ok(Json(state.prescriptions.update(record_id(&id)?, patch)?))
}

#[utoipa::path(
    delete,
    path = "/api/prescriptions/{id}",
    params(("id" = String, Path, description = "Prescription id")),
    responses(
        (status = 204, description = "Prescription deleted"),
        (status = 404, description = "Unknown prescription", body = ErrorBody)
    )
)]
pub async fn delete_prescription(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    caller.require(STAFF)?;
    state.prescriptions.delete(record_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/prescriptions/{id}/items",
    params(("id" = String, Path, description = "Prescription id")),
    request_body = PrescriptionItemDraft,
    responses(
        (status = 201, description = "Item added", body = PrescriptionItem),
        (status = 400, description = "Invalid item", body = ErrorBody),
        (status = 404, description = "Unknown prescription", body = ErrorBody)
    )
)]
pub async fn add_item(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(draft): Json<PrescriptionItemDraft>,
) -> ApiResult<(StatusCode, Json<PrescriptionItem>)> {
    caller.require(STAFF)?;
    let item = state.prescriptions.add_item(record_id(&id)?, draft)?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[utoipa::path(
    put,
    path = "/api/prescriptions/{id}/items/{item_id}",
    params(
        ("id" = String, Path, description = "Prescription id"),
        ("item_id" = String, Path, description = "Item id")
    ),
    request_body = PrescriptionItemDraft,
    responses(
        (status = 200, description = "Item replaced", body = PrescriptionItem),
        (status = 404, description = "Unknown prescription or item", body = ErrorBody)
    )
)]
pub async fn update_item(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, item_id)): Path<(String, String)>,
    Json(draft): Json<PrescriptionItemDraft>,
) -> ApiResult<Json<PrescriptionItem>> {
    caller.require(STAFF)?;
    let item = state
        .prescriptions
        .update_item(record_id(&id)?, record_id(&item_id)?, draft)?;
    Ok(Json(item))
}

#[utoipa::path(
    delete,
    path = "/api/prescriptions/{id}/items/{item_id}",
    params(
        ("id" = String, Path, description = "Prescription id"),
        ("item_id" = String, Path, description = "Item id")
    ),
    responses(
        (status = 204, description = "Item removed"),
        (status = 404, description = "Unknown prescription or item", body = ErrorBody)
    )
)]
pub async fn delete_item(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, item_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    caller.require(STAFF)?;
    state
        .prescriptions
        .delete_item(record_id(&id)?, record_id(&item_id)?)?;
    Ok(StatusCode::NO_CONTENT)
}
