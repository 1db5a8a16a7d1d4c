use crate::auth::{Caller, CARE_TEAM_AND_PATIENT, DOCTORS, DOCTOR_OR_PATIENT, PATIENTS, STAFF};
use crate::error::{ApiResult, ErrorBody};
use crate::handlers::{record_id, PageParams};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use nadym_core::store::ConsultationPage;
use nadym_core::telemedicine::{ChatMessage, MessageDraft, RtcConfig, VideoConsultation};
use nadym_core::validation::REQUIRED;
use nadym_core::{PracticeError, RecordId};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct ScheduleReq {
    pub patient_id: Option<RecordId>,
    pub doctor_id: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
}

/// Free text attached to a state change (closing notes, a cancellation reason).
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct NoteReq {
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct IssueReq {
    pub detail: String,
}

fn note(body: Option<Json<NoteReq>>) -> Option<String> {
    body.and_then(|Json(req)| req.note)
}

#[utoipa::path(
    get,
    path = "/api/telemedicine/rtc-config",
    responses((status = 200, description = "ICE servers for the browser client", body = RtcConfig))
)]
pub async fn rtc_config(State(state): State<AppState>) -> Json<RtcConfig> {
    Json(state.telemedicine.rtc_config())
}

#[utoipa::path(
    post,
    path = "/api/telemedicine/consultations",
    request_body = ScheduleReq,
    responses(
        (status = 201, description = "Consultation scheduled with a fresh room", body = VideoConsultation),
        (status = 400, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn schedule_consultation(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<ScheduleReq>,
) -> ApiResult<(StatusCode, Json<VideoConsultation>)> {
    caller.require(STAFF)?;
    let (Some(patient_id), Some(scheduled_time)) = (req.patient_id, req.scheduled_time) else {
        let field = if req.patient_id.is_none() {
            "patient_id"
        } else {
            "scheduled_time"
        };
        return Err(PracticeError::field(field, REQUIRED).into());
    };
    let consultation = state.telemedicine.schedule(
        patient_id,
        req.doctor_id.as_deref().unwrap_or_default(),
        scheduled_time,
    )?;
    Ok((StatusCode::CREATED, Json(consultation)))
}

#[utoipa::path(
    get,
    path = "/api/telemedicine/consultations/{id}",
    params(("id" = String, Path, description = "Consultation id")),
    responses(
        (status = 200, description = "Consultation", body = VideoConsultation),
        (status = 404, description = "Unknown consultation", body = ErrorBody)
    )
)]
pub async fn get_consultation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VideoConsultation>> {
    Ok(Json(state.telemedicine.get(record_id(&id)?)?))
}

#[utoipa::path(
    get,
    path = "/api/telemedicine/rooms/{room_id}",
    params(("room_id" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Consultation held in the room", body = VideoConsultation),
        (status = 404, description = "Unknown room", body = ErrorBody)
    )
)]
pub async fn consultation_by_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<VideoConsultation>> {
    Ok(Json(state.telemedicine.by_room(&room_id)?))
}

#[utoipa::path(
    get,
    path = "/api/telemedicine/doctors/{doctor_id}/consultations",
    params(("doctor_id" = String, Path, description = "Doctor id"), PageParams),
    responses((status = 200, description = "Consultations, latest scheduled first", body = ConsultationPage))
)]
pub async fn doctor_consultations(
    State(state): State<AppState>,
    caller: Caller,
    Path(doctor_id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<ConsultationPage>> {
    caller.require(DOCTORS)?;
    Ok(Json(
        state
            .telemedicine
            .doctor_consultations(&doctor_id, page.into()),
    ))
}

#[utoipa::path(
    get,
    path = "/api/telemedicine/patients/{id}/consultations",
    params(("id" = String, Path, description = "Patient id"), PageParams),
    responses((status = 200, description = "Consultations, latest scheduled first", body = ConsultationPage))
)]
pub async fn patient_consultations(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<ConsultationPage>> {
    caller.require(PATIENTS)?;
    Ok(Json(
        state
            .telemedicine
            .patient_consultations(record_id(&id)?, page.into()),
    ))
}

#[utoipa::path(
    put,
    path = "/api/telemedicine/consultations/{id}/start",
    params(("id" = String, Path, description = "Consultation id")),
    responses(
        (status = 200, description = "Consultation in progress", body = VideoConsultation),
        (status = 404, description = "Unknown consultation", body = ErrorBody)
    )
)]
pub async fn start_consultation(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<VideoConsultation>> {
    caller.require(DOCTOR_OR_PATIENT)?;
    Ok(Json(state.telemedicine.start(record_id(&id)?, Utc::now())?))
}

#[utoipa::path(
    put,
    path = "/api/telemedicine/consultations/{id}/end",
    params(("id" = String, Path, description = "Consultation id")),
    request_body = NoteReq,
    responses(
        (status = 200, description = "Consultation completed", body = VideoConsultation),
        (status = 404, description = "Unknown consultation", body = ErrorBody)
    )
)]
pub async fn end_consultation(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Option<Json<NoteReq>>,
) -> ApiResult<Json<VideoConsultation>> {
    caller.require(DOCTORS)?;
    let ended = state
        .telemedicine
        .end(record_id(&id)?, note(body), Utc::now())?;
    Ok(Json(ended))
}

#[utoipa::path(
    put,
    path = "/api/telemedicine/consultations/{id}/cancel",
    params(("id" = String, Path, description = "Consultation id")),
    request_body = NoteReq,
    responses(
        (status = 200, description = "Consultation cancelled", body = VideoConsultation),
        (status = 404, description = "Unknown consultation", body = ErrorBody)
    )
)]
pub async fn cancel_consultation(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Option<Json<NoteReq>>,
) -> ApiResult<Json<VideoConsultation>> {
    caller.require(DOCTOR_OR_PATIENT)?;
    Ok(Json(
        state.telemedicine.cancel(record_id(&id)?, note(body))?,
    ))
}

#[utoipa::path(
    put,
    path = "/api/telemedicine/consultations/{id}/technical-issue",
    params(("id" = String, Path, description = "Consultation id")),
    request_body = IssueReq,
    responses(
        (status = 200, description = "Issue recorded", body = VideoConsultation),
        (status = 400, description = "Empty description", body = ErrorBody),
        (status = 404, description = "Unknown consultation", body = ErrorBody)
    )
)]
pub async fn report_technical_issue(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<IssueReq>,
) -> ApiResult<Json<VideoConsultation>> {
    caller.require(CARE_TEAM_AND_PATIENT)?;
    let updated = state
        .telemedicine
        .report_technical_issue(record_id(&id)?, &req.detail)?;
    Ok(Json(updated))
}

#[utoipa::path(
    post,
    path = "/api/telemedicine/consultations/{id}/messages",
    params(("id" = String, Path, description = "Consultation id")),
    request_body = MessageDraft,
    responses(
        (status = 201, description = "Message posted", body = ChatMessage),
        (status = 400, description = "Invalid message", body = ErrorBody),
        (status = 404, description = "Unknown consultation", body = ErrorBody)
    )
)]
pub async fn post_message(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(draft): Json<MessageDraft>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    caller.require(CARE_TEAM_AND_PATIENT)?;
    let message = state
        .telemedicine
        .post_message(record_id(&id)?, draft, Utc::now())?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[utoipa::path(
    get,
    path = "/api/telemedicine/consultations/{id}/messages",
    params(("id" = String, Path, description = "Consultation id")),
    responses((status = 200, description = "Chat history, oldest first", body = [ChatMessage]))
)]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    Ok(Json(state.telemedicine.messages(record_id(&id)?)))
}

#[utoipa::path(
    put,
    path = "/api/telemedicine/messages/{id}/read",
    params(("id" = String, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message marked read", body = ChatMessage),
        (status = 404, description = "Unknown message", body = ErrorBody)
    )
)]
pub async fn mark_message_read(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<ChatMessage>> {
    caller.require(CARE_TEAM_AND_PATIENT)?;
    Ok(Json(
        state.telemedicine.mark_read(record_id(&id)?, Utc::now())?,
    ))
}
