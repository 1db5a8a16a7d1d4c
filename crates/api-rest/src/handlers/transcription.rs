use crate::auth::{Caller, DOCTORS};
use crate::error::{ApiResult, ErrorBody};
use crate::handlers::{record_id, PageParams};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use nadym_core::store::TranscriptionPage;
use nadym_core::transcription::{Transcription, TranscriptionDraft};
use nadym_core::RecordId;
use serde::Deserialize;

/// Fields of a transcription created from a raw audio upload.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadParams {
    pub consultation_id: Option<String>,
    pub doctor_id: Option<String>,
    pub patient_id: Option<String>,
    /// Name the recording had on the client.
    pub filename: Option<String>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct ProcessReq {
    pub raw_text: String,
}

fn optional_id(raw: Option<&str>) -> ApiResult<Option<RecordId>> {
    match raw.map(str::trim) {
        Some(s) if !s.is_empty() => Ok(Some(record_id(s)?)),
        _ => Ok(None),
    }
}

#[utoipa::path(
    get,
    path = "/api/transcriptions/doctors/{doctor_id}",
    params(("doctor_id" = String, Path, description = "Doctor id"), PageParams),
    responses((status = 200, description = "Transcriptions, newest first", body = TranscriptionPage))
)]
pub async fn doctor_transcriptions(
    State(state): State<AppState>,
    caller: Caller,
    Path(doctor_id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<TranscriptionPage>> {
    caller.require(DOCTORS)?;
    Ok(Json(
        state
            .transcription
            .doctor_transcriptions(&doctor_id, page.into()),
    ))
}

#[utoipa::path(
    get,
    path = "/api/transcriptions/consultations/{id}",
    params(("id" = String, Path, description = "Consultation id")),
    responses((status = 200, description = "Transcriptions of one consultation", body = [Transcription]))
)]
pub async fn consultation_transcriptions(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Transcription>>> {
    caller.require(DOCTORS)?;
    Ok(Json(state.transcription.by_consultation(record_id(&id)?)))
}

#[utoipa::path(
    post,
    path = "/api/transcriptions",
    request_body = TranscriptionDraft,
    responses(
        (status = 201, description = "Transcription created", body = Transcription),
        (status = 400, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn create_transcription(
    State(state): State<AppState>,
    caller: Caller,
    Json(draft): Json<TranscriptionDraft>,
) -> ApiResult<(StatusCode, Json<Transcription>)> {
    caller.require(DOCTORS)?;
    let created = state.transcription.create(draft)?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    post,
    path = "/api/transcriptions/upload",
    params(UploadParams),
    request_body(content = Vec<u8>, description = "Raw audio bytes", content_type = "audio/mpeg"),
    responses(
        (status = 201, description = "Audio stored and transcription created", body = Transcription),
        (status = 400, description = "Unsupported, empty or oversized audio", body = ErrorBody)
    )
)]
pub async fn upload_audio(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Transcription>)> {
    caller.require(DOCTORS)?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let draft = TranscriptionDraft {
        consultation_id: optional_id(params.consultation_id.as_deref())?,
        doctor_id: params.doctor_id,
        patient_id: optional_id(params.patient_id.as_deref())?,
        audio_file_url: None,
    };
    let created = state.transcription.upload_audio(
        draft,
        params.filename.as_deref().unwrap_or_default(),
        content_type,
        &body,
    )?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/transcriptions/{id}",
    params(("id" = String, Path, description = "Transcription id")),
    responses(
        (status = 200, description = "Transcription", body = Transcription),
        (status = 404, description = "Unknown transcription", body = ErrorBody)
    )
)]
pub async fn get_transcription(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Transcription>> {
    caller.require(DOCTORS)?;
    Ok(Json(state.transcription.get(record_id(&id)?)?))
}

#[utoipa::path(
    get,
    path = "/api/transcriptions/{id}/audio",
    params(("id" = String, Path, description = "Transcription id")),
    responses(
        (status = 200, description = "The stored recording", content_type = "application/octet-stream"),
        (status = 404, description = "No audio stored", body = ErrorBody)
    )
)]
pub async fn download_audio(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    caller.require(DOCTORS)?;
    let (audio, bytes) = state.transcription.read_audio(record_id(&id)?)?;
    Ok(([(header::CONTENT_TYPE, audio.content_type)], bytes))
}

#[utoipa::path(
    put,
    path = "/api/transcriptions/{id}/process",
    params(("id" = String, Path, description = "Transcription id")),
    request_body = ProcessReq,
    responses(
        (status = 200, description = "Transcript structured, or marked FAILED", body = Transcription),
        (status = 409, description = "Transcription was cancelled", body = ErrorBody)
    )
)]
pub async fn process_transcription(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<ProcessReq>,
) -> ApiResult<Json<Transcription>> {
    caller.require(DOCTORS)?;
    let processed = state.transcription.process(
        record_id(&id)?,
        &req.raw_text,
        state.structurer.as_ref(),
        Utc::now(),
    )?;
    Ok(Json(processed))
}

#[utoipa::path(
    put,
    path = "/api/transcriptions/{id}/cancel",
    params(("id" = String, Path, description = "Transcription id")),
    responses(
        (status = 200, description = "Transcription cancelled", body = Transcription),
        (status = 404, description = "Unknown transcription", body = ErrorBody)
    )
)]
pub async fn cancel_transcription(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Transcription>> {
    caller.require(DOCTORS)?;
    Ok(Json(state.transcription.cancel(record_id(&id)?)?))
}
