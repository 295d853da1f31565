//! 预约处理器

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{Datelike, NaiveDate};

use super::model::{
    AppointmentFilter, AppointmentListQuery, AppointmentListResponse, AppointmentRequest,
    AppointmentResponse, AppointmentStatus, AppointmentUpdateRequest, AvailabilityCheckRequest,
    AvailabilityCheckResponse, BookingSource, CalendarQuery, CalendarResponse, CompleteRequest,
    FinancialReport, FinancialReportQuery, StatusRequest,
};
use super::service::{BookingClient, NewAppointment};
use crate::app::scheduling::{parse_date, parse_optional_date, parse_time, today};
use crate::app::AppState;
use crate::core::auth::AuthContext;
use crate::core::error::{CoreError, CoreResult};
use crate::core::response::{MessageResponse, DEFAULT_PER_PAGE};

pub(crate) fn parse_status(value: &str) -> CoreResult<AppointmentStatus> {
    AppointmentStatus::parse(value).ok_or_else(|| {
        CoreError::bad_request("Invalid status; expected pending, scheduled, completed, cancelled or no_show")
    })
}

/// 解析日期区间，要求开始不晚于结束
pub(crate) fn date_range(start: NaiveDate, end: NaiveDate) -> CoreResult<(NaiveDate, NaiveDate)> {
    if start > end {
        return Err(CoreError::bad_request("start_date must not be after end_date"));
    }
    Ok((start, end))
}

pub async fn list_appointments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<AppointmentListResponse>, CoreError> {
    let filter = AppointmentFilter {
        start_date: parse_optional_date(&query.start_date)?,
        end_date: parse_optional_date(&query.end_date)?,
        professional_id: query.professional_id,
        client_id: query.client_id,
        service_id: query.service_id,
        status: query
            .status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(parse_status)
            .transpose()?,
    };
    let window = query.page().window(DEFAULT_PER_PAGE);

    let (appointments, total) = state
        .appointments
        .list(auth.tenant()?, &filter, window)
        .await?;
    Ok(Json(AppointmentListResponse {
        appointments,
        pagination: window.pagination(total),
    }))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<AppointmentResponse>, CoreError> {
    let appointment = state.appointments.get_detail(auth.tenant()?, id).await?;
    Ok(Json(AppointmentResponse {
        message: None,
        appointment,
    }))
}

pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<AppointmentRequest>,
) -> Result<(StatusCode, Json<AppointmentResponse>), CoreError> {
    let new = NewAppointment {
        client: BookingClient::Existing(payload.client_id),
        professional_id: payload.professional_id,
        service_id: payload.service_id,
        date: parse_date(&payload.appointment_date)?,
        start: parse_time(&payload.start_time)?,
        notes: payload.notes,
        price: payload.price,
        source: BookingSource::Dashboard,
        confirmation_token: None,
    };

    let appointment = state.appointments.create(auth.tenant()?, new).await?;
    Ok((
        StatusCode::CREATED,
        Json(AppointmentResponse {
            message: Some("Appointment created successfully".to_string()),
            appointment,
        }),
    ))
}

pub async fn update_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(payload): Json<AppointmentUpdateRequest>,
) -> Result<Json<AppointmentResponse>, CoreError> {
    let date = parse_optional_date(&payload.appointment_date)?;
    let start = payload
        .start_time
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .map(parse_time)
        .transpose()?;

    let appointment = state
        .appointments
        .update(auth.tenant()?, id, payload, date, start)
        .await?;
    Ok(Json(AppointmentResponse {
        message: Some("Appointment updated successfully".to_string()),
        appointment,
    }))
}

pub async fn delete_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, CoreError> {
    state.appointments.delete(auth.tenant()?, id).await?;
    Ok(Json(MessageResponse::new("Appointment deleted successfully")))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<AppointmentResponse>, CoreError> {
    let status = parse_status(&payload.status)?;
    let appointment = state
        .appointments
        .set_status(auth.tenant()?, id, status, payload.notes)
        .await?;
    Ok(Json(AppointmentResponse {
        message: Some(format!("Appointment marked as {}", status.as_str())),
        appointment,
    }))
}

pub async fn complete_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(payload): Json<CompleteRequest>,
) -> Result<Json<AppointmentResponse>, CoreError> {
    let appointment = state
        .appointments
        .complete(auth.tenant()?, id, payload)
        .await?;
    Ok(Json(AppointmentResponse {
        message: Some("Appointment completed".to_string()),
        appointment,
    }))
}

pub async fn calendar(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<CalendarResponse>, CoreError> {
    let (start, end) = match (
        parse_optional_date(&query.start_date)?,
        parse_optional_date(&query.end_date)?,
    ) {
        (Some(start), Some(end)) => date_range(start, end)?,
        _ => return Err(CoreError::bad_request("start_date and end_date are required")),
    };

    let events = state
        .appointments
        .calendar(auth.tenant()?, start, end, query.professional_id)
        .await?;
    Ok(Json(CalendarResponse { events }))
}

pub async fn check_availability(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<AvailabilityCheckRequest>,
) -> Result<Json<AvailabilityCheckResponse>, CoreError> {
    let response = state
        .appointments
        .check_availability(
            auth.tenant()?,
            payload.professional_id,
            payload.service_id,
            parse_date(&payload.appointment_date)?,
            parse_time(&payload.start_time)?,
            payload.exclude_appointment_id,
        )
        .await?;
    Ok(Json(response))
}

/// 缺省区间为本月 1 日至今天
pub async fn financial_report(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<FinancialReportQuery>,
) -> Result<Json<FinancialReport>, CoreError> {
    let today = today();
    let start = parse_optional_date(&query.start_date)?
        .unwrap_or_else(|| today.with_day(1).unwrap_or(today));
    let end = parse_optional_date(&query.end_date)?.unwrap_or(today);
    let (start, end) = date_range(start, end)?;

    let report = state
        .appointments
        .financial_report(auth.tenant()?, start, end, query.professional_id, query.service_id)
        .await?;
    Ok(Json(report))
}
