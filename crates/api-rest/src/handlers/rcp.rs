use crate::auth::{Caller, DOCTORS};
use crate::error::{ApiResult, ErrorBody};
use crate::handlers::record_id;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use nadym_core::rcp::{Attendance, MeetingDecision, ParticipantDraft, RcpMeeting, RcpMeetingDraft};
use serde::Deserialize;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AttendanceReq {
    pub attendance: Attendance,
    pub contribution: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PostponeReq {
    pub new_date: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/api/rcp/meetings",
    responses((status = 200, description = "All meetings, latest first", body = [RcpMeeting]))
)]
pub async fn list_meetings(State(state): State<AppState>) -> Json<Vec<RcpMeeting>> {
    Json(state.rcp.list())
}

#[utoipa::path(
    get,
    path = "/api/rcp/meetings/upcoming",
    responses((status = 200, description = "Scheduled or postponed meetings from now on", body = [RcpMeeting]))
)]
pub async fn upcoming_meetings(State(state): State<AppState>) -> Json<Vec<RcpMeeting>> {
    Json(state.rcp.upcoming(Utc::now()))
}

#[utoipa::path(
    get,
    path = "/api/patients/{id}/rcp",
    params(("id" = String, Path, description = "Patient id")),
    responses((status = 200, description = "Meetings discussing the patient", body = [RcpMeeting]))
)]
pub async fn patient_meetings(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<RcpMeeting>>> {
    Ok(Json(state.rcp.for_patient(record_id(&id)?)))
}

#[utoipa::path(
    post,
    path = "/api/rcp/meetings",
    request_body = RcpMeetingDraft,
    responses(
        (status = 201, description = "Meeting created with its organizer first", body = RcpMeeting),
        (status = 400, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn create_meeting(
    State(state): State<AppState>,
    caller: Caller,
    Json(draft): Json<RcpMeetingDraft>,
) -> ApiResult<(StatusCode, Json<RcpMeeting>)> {
    caller.require(DOCTORS)?;
    let meeting = state.rcp.create(draft)?;
    Ok((StatusCode::CREATED, Json(meeting)))
}

#[utoipa::path(
    get,
    path = "/api/rcp/meetings/{id}",
    params(("id" = String, Path, description = "Meeting id")),
    responses(
        (status = 200, description = "Meeting", body = RcpMeeting),
        (status = 404, description = "Unknown meeting", body = ErrorBody)
    )
)]
pub async fn get_meeting(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RcpMeeting>> {
    Ok(Json(state.rcp.get(record_id(&id)?)?))
}

#[utoipa::path(
    put,
    path = "/api/rcp/meetings/{id}",
    params(("id" = String, Path, description = "Meeting id")),
    request_body = RcpMeetingDraft,
    responses(
        (status = 200, description = "Meeting updated", body = RcpMeeting),
        (status = 400, description = "Invalid form", body = ErrorBody),
        (status = 404, description = "Unknown meeting", body = ErrorBody)
    )
)]
pub async fn update_meeting(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(draft): Json<RcpMeetingDraft>,
) -> ApiResult<Json<RcpMeeting>> {
    caller.require(DOCTORS)?;
    Ok(Json(state.rcp.update(record_id(&id)?, draft)?))
}

#[utoipa::path(
    delete,
    path = "/api/rcp/meetings/{id}",
    params(("id" = String, Path, description = "Meeting id")),
    responses(
        (status = 204, description = "Meeting deleted"),
        (status = 404, description = "Unknown meeting", body = ErrorBody)
    )
)]
pub async fn delete_meeting(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    caller.require(DOCTORS)?;
    state.rcp.delete(record_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/rcp/meetings/{id}/participants",
    params(("id" = String, Path, description = "Meeting id")),
    request_body = ParticipantDraft,
    responses(
        (status = 201, description = "Participant invited", body = RcpMeeting),
        (status = 409, description = "Doctor already invited", body = ErrorBody)
    )
)]
pub async fn add_participant(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(draft): Json<ParticipantDraft>,
) -> ApiResult<(StatusCode, Json<RcpMeeting>)> {
    caller.require(DOCTORS)?;
    let meeting = state.rcp.add_participant(record_id(&id)?, draft)?;
    Ok((StatusCode::CREATED, Json(meeting)))
}

#[utoipa::path(
    put,
    path = "/api/rcp/meetings/{id}/participants/{doctor_id}/attendance",
    params(
        ("id" = String, Path, description = "Meeting id"),
        ("doctor_id" = String, Path, description = "Participant doctor id")
    ),
    request_body = AttendanceReq,
    responses(
        (status = 200, description = "Attendance recorded", body = RcpMeeting),
        (status = 404, description = "Unknown meeting or participant", body = ErrorBody)
    )
)]
pub async fn set_attendance(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, doctor_id)): Path<(String, String)>,
    Json(req): Json<AttendanceReq>,
) -> ApiResult<Json<RcpMeeting>> {
    caller.require(DOCTORS)?;
    let meeting = state.rcp.set_attendance(
        record_id(&id)?,
        &doctor_id,
        req.attendance,
        req.contribution,
        Utc::now(),
    )?;
    Ok(Json(meeting))
}

#[utoipa::path(
    put,
    path = "/api/rcp/meetings/{id}/start",
    params(("id" = String, Path, description = "Meeting id")),
    responses(
        (status = 200, description = "Meeting in progress", body = RcpMeeting),
        (status = 404, description = "Unknown meeting", body = ErrorBody)
    )
)]
pub async fn start_meeting(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<RcpMeeting>> {
    caller.require(DOCTORS)?;
    Ok(Json(state.rcp.start(record_id(&id)?, Utc::now())?))
}

#[utoipa::path(
    put,
    path = "/api/rcp/meetings/{id}/complete",
    params(("id" = String, Path, description = "Meeting id")),
    request_body = MeetingDecision,
    responses(
        (status = 200, description = "Decision recorded", body = RcpMeeting),
        (status = 400, description = "Missing decision summary", body = ErrorBody),
        (status = 404, description = "Unknown meeting", body = ErrorBody)
    )
)]
pub async fn complete_meeting(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(decision): Json<MeetingDecision>,
) -> ApiResult<Json<RcpMeeting>> {
    caller.require(DOCTORS)?;
    Ok(Json(
        state.rcp.complete(record_id(&id)?, decision, Utc::now())?,
    ))
}

#[utoipa::path(
    put,
    path = "/api/rcp/meetings/{id}/cancel",
    params(("id" = String, Path, description = "Meeting id")),
    responses(
        (status = 200, description = "Meeting cancelled", body = RcpMeeting),
        (status = 404, description = "Unknown meeting", body = ErrorBody)
    )
)]
pub async fn cancel_meeting(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<RcpMeeting>> {
    caller.require(DOCTORS)?;
    Ok(Json(state.rcp.cancel(record_id(&id)?)?))
}

#[utoipa::path(
    put,
    path = "/api/rcp/meetings/{id}/postpone",
    params(("id" = String, Path, description = "Meeting id")),
    request_body = PostponeReq,
    responses(
        (status = 200, description = "Meeting moved", body = RcpMeeting),
        (status = 404, description = "Unknown meeting", body = ErrorBody)
    )
)]
pub async fn postpone_meeting(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<PostponeReq>,
) -> ApiResult<Json<RcpMeeting>> {
    caller.require(DOCTORS)?;
    Ok(Json(state.rcp.postpone(record_id(&id)?, req.new_date)?))
}
