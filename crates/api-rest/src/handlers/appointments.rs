use crate::auth::{Caller, STAFF};
use crate::error::{ApiResult, ErrorBody};
use crate::handlers::record_id;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDate, Utc};
use nadym_core::appointments::{
    AppointmentDraft, AppointmentPatch, AppointmentStatus, AppointmentWithPatient,
};
use nadym_core::calendar::{
    self, AppointmentDayCell, AppointmentMonthCell, DayCell, MonthCell,
};
use nadym_core::PracticeError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Restrict to one doctor's appointments.
    pub doctor_id: Option<String>,
}

/// Calendar navigation: an anchor date (today when absent) and a number of days, weeks or
/// months to move from it.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CalendarParams {
    pub date: Option<NaiveDate>,
    pub offset: Option<i32>,
}

impl CalendarParams {
    fn anchor(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Utc::now().date_naive())
    }

    fn offset(&self) -> i64 {
        i64::from(self.offset.unwrap_or(0))
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct StatusReq {
    pub status: AppointmentStatus,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DayView {
    pub date: NaiveDate,
    pub appointments: Vec<AppointmentWithPatient>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct WeekView {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<AppointmentDayCell>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MonthView {
    /// First day of the displayed month.
    pub month: NaiveDate,
    pub cells: Vec<AppointmentMonthCell>,
}

#[utoipa::path(
    get,
    path = "/api/appointments",
    params(ListParams),
    responses((status = 200, description = "Appointments, earliest first", body = [AppointmentWithPatient]))
)]
pub async fn list_appointments(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Vec<AppointmentWithPatient>> {
    let items = match params.doctor_id.as_deref() {
        Some(doctor) if !doctor.trim().is_empty() => state.appointments.for_doctor(doctor),
        _ => state.appointments.list_all(),
    };
    Json(items)
}

#[utoipa::path(
    get,
    path = "/api/appointments/upcoming",
    responses((status = 200, description = "Pending appointments from now on", body = [AppointmentWithPatient]))
)]
pub async fn upcoming_appointments(
    State(state): State<AppState>,
) -> Json<Vec<AppointmentWithPatient>> {
    Json(state.appointments.upcoming(Utc::now()))
}

#[utoipa::path(
    get,
    path = "/api/appointments/calendar/day",
    params(CalendarParams),
    responses(
        (status = 200, description = "Appointments of one day", body = DayView),
        (status = 400, description = "Offset leaves the supported date range", body = ErrorBody)
    )
)]
pub async fn calendar_day(
    State(state): State<AppState>,
    Query(params): Query<CalendarParams>,
) -> ApiResult<Json<DayView>> {
    let (date, next) = calendar::shift_day(params.anchor(), params.offset())
        .and_then(|date| Some((date, date.succ_opt()?)))
        .ok_or_else(|| out_of_range("day"))?;
    let appointments = state
        .appointments
        .between(calendar::start_of_day(date), calendar::start_of_day(next));
    Ok(Json(DayView { date, appointments }))
}

#[utoipa::path(
    get,
    path = "/api/appointments/calendar/week",
    params(CalendarParams),
    responses(
        (status = 200, description = "Seven days from Sunday", body = WeekView),
        (status = 400, description = "Offset leaves the supported date range", body = ErrorBody)
    )
)]
pub async fn calendar_week(
    State(state): State<AppState>,
    Query(params): Query<CalendarParams>,
) -> ApiResult<Json<WeekView>> {
    let (anchor, start, end, after) = calendar::shift_week(params.anchor(), params.offset())
        .and_then(|anchor| {
            let (start, end) = calendar::week_range(anchor)?;
            Some((anchor, start, end, end.succ_opt()?))
        })
        .ok_or_else(|| out_of_range("week"))?;
    let items = state
        .appointments
        .between(calendar::start_of_day(start), calendar::start_of_day(after));
    let days: Vec<DayCell<AppointmentWithPatient>> = calendar::week_view(anchor, &items);
    Ok(Json(WeekView { start, end, days }))
}

#[utoipa::path(
    get,
    path = "/api/appointments/calendar/month",
    params(CalendarParams),
    responses(
        (status = 200, description = "Six week grid around a month", body = MonthView),
        (status = 400, description = "Offset leaves the supported date range", body = ErrorBody)
    )
)]
pub async fn calendar_month(
    State(state): State<AppState>,
    Query(params): Query<CalendarParams>,
) -> ApiResult<Json<MonthView>> {
    let (month, start, after) = calendar::shift_month(params.anchor(), params.offset.unwrap_or(0))
        .and_then(|month| {
            let (start, end) = calendar::month_grid_range(month)?;
            Some((month, start, end.succ_opt()?))
        })
        .ok_or_else(|| out_of_range("month"))?;
    let items = state
        .appointments
        .between(calendar::start_of_day(start), calendar::start_of_day(after));
    let cells: Vec<MonthCell<AppointmentWithPatient>> = calendar::month_view(month, &items);
    Ok(Json(MonthView { month, cells }))
}

fn out_of_range(unit: &str) -> PracticeError {
    PracticeError::InvalidInput(format!("{} offset out of range", unit))
}

#[utoipa::path(
    post,
    path = "/api/appointments",
    request_body = AppointmentDraft,
    responses(
        (status = 201, description = "Appointment booked", body = AppointmentWithPatient),
        (status = 400, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn book_appointment(
    State(state): State<AppState>,
    caller: Caller,
    Json(draft): Json<AppointmentDraft>,
) -> ApiResult<(StatusCode, Json<AppointmentWithPatient>)> {
    caller.require(STAFF)?;
    let booked = state.appointments.book(draft)?;
    Ok((StatusCode::CREATED, Json(booked)))
}

#[utoipa::path(
    get,
    path = "/api/appointments/{id}",
    params(("id" = String, Path, description = "Appointment id")),
    responses(
        (status = 200, description = "Appointment", body = AppointmentWithPatient),
        (status = 404, description = "Unknown appointment", body = ErrorBody)
    )
)]
pub async fn get_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AppointmentWithPatient>> {
    Ok(Json(state.appointments.get(record_id(&id)?)?))
}

#[utoipa::path(
    put,
    path = "/api/appointments/{id}",
    params(("id" = String, Path, description = "Appointment id")),
    request_body = AppointmentPatch,
    responses(
        (status = 200, description = "Appointment updated", body = AppointmentWithPatient),
        (status = 404, description = "Unknown appointment", body = ErrorBody)
    )
)]
pub async fn update_appointment(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(patch): Json<AppointmentPatch>,
) -> ApiResult<Json<AppointmentWithPatient>> {
    caller.require(STAFF)?;
    Ok(Json(state.appointments.update(record_id(&id)?, patch)?))
}

#[utoipa::path(
    put,
    path = "/api/appointments/{id}/status",
    params(("id" = String, Path, description = "Appointment id")),
    request_body = StatusReq,
    responses(
        (status = 200, description = "Status changed", body = AppointmentWithPatient),
        (status = 404, description = "Unknown appointment", body = ErrorBody)
    )
)]
pub async fn set_appointment_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<StatusReq>,
) -> ApiResult<Json<AppointmentWithPatient>> {
    caller.require(STAFF)?;
    Ok(Json(state.appointments.set_status(record_id(&id)?, req.status)?))
}

#[utoipa::path(
    delete,
    path = "/api/appointments/{id}",
    params(("id" = String, Path, description = "Appointment id")),
    responses(
        (status = 204, description = "Appointment deleted"),
        (status = 404, description = "Unknown appointment", body = ErrorBody)
    )
)]
pub async fn delete_appointment(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    caller.require(STAFF)?;
    state.appointments.delete(record_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT)
}
