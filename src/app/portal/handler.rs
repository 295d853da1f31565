//! 专业人员门户处理器

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Json, Response},
    Extension,
};
use chrono::Duration;
use tracing::warn;
use validator::Validate;

use super::model::{
    ActivateRequest, BlockDateRequest, BlockedDatesResponse, PeriodStats, PortalAppointmentQuery,
    PortalCancelRequest, PortalClientDetail, PortalClientListResponse, PortalClientQuery,
    PortalDashboard, PortalLoginRequest, PortalMeResponse, PortalSessionResponse, ScheduleQuery,
    ScheduleResponse, StatsQuery,
};
use super::service::month_bounds;
use crate::app::accounts::model::ChangePasswordRequest;
use crate::app::appointments::handler::{date_range, parse_status};
use crate::app::appointments::model::{
    AppointmentFilter, AppointmentListResponse, AppointmentResponse, CompleteRequest,
};
use crate::app::professionals::model::{BlockedDate, WorkingHoursRequest, WorkingHoursResponse};
use crate::app::scheduling::{parse_date, parse_optional_date, today};
use crate::app::AppState;
use crate::core::auth::AuthContext;
use crate::core::error::CoreError;
use crate::core::response::{search_pattern, MessageResponse, DEFAULT_PER_PAGE};
use crate::core::validation::blank_to_none;

/// 缺省查询今天起一周
const DEFAULT_SCHEDULE_DAYS: i64 = 6;

/// 门户守卫：令牌签发后被停用的专业人员或被暂停的商户不能继续访问
pub async fn portal_guard(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, CoreError> {
    let auth = req
        .extensions()
        .get::<AuthContext>()
        .ok_or_else(|| CoreError::unauthorized("Authentication required"))?;
    let company_id = auth.tenant()?;
    let professional_id = auth.subject_id;

    if let Err(e) = state.portal.authorize(company_id, professional_id).await {
        warn!("拒绝门户访问: professional={} {}", professional_id, e);
        return Err(e);
    }
    Ok(next.run(req).await)
}

pub async fn activate(
    State(state): State<AppState>,
    Json(payload): Json<ActivateRequest>,
) -> Result<Json<PortalSessionResponse>, CoreError> {
    payload.validate()?;
    let (professional, access_token) = state
        .portal
        .activate(&payload.token, &payload.password)
        .await?;
    let business_name = state.portal.business_name(professional.company_id).await?;

    Ok(Json(PortalSessionResponse {
        message: "Account activated".to_string(),
        access_token,
        professional,
        business_name,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<PortalLoginRequest>,
) -> Result<Json<PortalSessionResponse>, CoreError> {
    payload.validate()?;
    let (professional, access_token) = state
        .portal
        .login(&payload.email, &payload.password)
        .await?;
    let business_name = state.portal.business_name(professional.company_id).await?;

    Ok(Json(PortalSessionResponse {
        message: "Login successful".to_string(),
        access_token,
        professional,
        business_name,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<PortalMeResponse>, CoreError> {
    let company_id = auth.tenant()?;
    let professional = state.professionals.get(company_id, auth.subject_id).await?;
    let business_name = state.portal.business_name(company_id).await?;
    Ok(Json(PortalMeResponse {
        professional,
        business_name,
    }))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, CoreError> {
    payload.validate()?;
    state
        .portal
        .change_password(
            auth.tenant()?,
            auth.subject_id,
            &payload.current_password,
            &payload.new_password,
        )
        .await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<PortalDashboard>, CoreError> {
    let (stats, today_schedule, upcoming_appointments) = state
        .portal
        .dashboard(auth.tenant()?, auth.subject_id)
        .await?;
    Ok(Json(PortalDashboard {
        stats,
        today_schedule,
        upcoming_appointments,
    }))
}

pub async fn schedule(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<ScheduleResponse>, CoreError> {
    let start = parse_optional_date(&query.start_date)?.unwrap_or_else(today);
    let end = parse_optional_date(&query.end_date)?
        .unwrap_or(start + Duration::days(DEFAULT_SCHEDULE_DAYS));
    let (start_date, end_date) = date_range(start, end)?;

    let appointments = state
        .portal
        .schedule(auth.tenant()?, auth.subject_id, start_date, end_date)
        .await?;
    Ok(Json(ScheduleResponse {
        start_date,
        end_date,
        appointments,
    }))
}

pub async fn list_appointments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PortalAppointmentQuery>,
) -> Result<Json<AppointmentListResponse>, CoreError> {
    let filter = AppointmentFilter {
        start_date: parse_optional_date(&query.start_date)?,
        end_date: parse_optional_date(&query.end_date)?,
        client_id: query.client_id,
        status: query
            .status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(parse_status)
            .transpose()?,
        ..Default::default()
    };
    let window = query.page().window(DEFAULT_PER_PAGE);

    let (appointments, total) = state
        .portal
        .appointments(auth.tenant()?, auth.subject_id, filter, window)
        .await?;
    Ok(Json(AppointmentListResponse {
        appointments,
        pagination: window.pagination(total),
    }))
}

pub async fn list_clients(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PortalClientQuery>,
) -> Result<Json<PortalClientListResponse>, CoreError> {
    let window = query.page().window(DEFAULT_PER_PAGE);
    let (clients, total) = state
        .portal
        .clients(auth.tenant()?, auth.subject_id, search_pattern(&query.search), window)
        .await?;
    Ok(Json(PortalClientListResponse {
        clients,
        pagination: window.pagination(total),
    }))
}

pub async fn get_client(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<PortalClientDetail>, CoreError> {
    let (client, appointments) = state
        .portal
        .client(auth.tenant()?, auth.subject_id, id)
        .await?;
    Ok(Json(PortalClientDetail {
        client,
        appointments,
    }))
}

/// 缺省统计本月
pub async fn stats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<PeriodStats>, CoreError> {
    let (month_start, month_end) = month_bounds(today());
    let start = parse_optional_date(&query.start_date)?.unwrap_or(month_start);
    let end = parse_optional_date(&query.end_date)?.unwrap_or(month_end);
    let (start, end) = date_range(start, end)?;

    let stats = state
        .portal
        .period_stats(auth.tenant()?, auth.subject_id, start, end)
        .await?;
    Ok(Json(stats))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<AppointmentResponse>, CoreError> {
    let appointment = state
        .portal
        .own_appointment(auth.tenant()?, auth.subject_id, id)
        .await?;
    Ok(Json(AppointmentResponse {
        message: None,
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
        .portal
        .complete(auth.tenant()?, auth.subject_id, id, payload)
        .await?;
    Ok(Json(AppointmentResponse {
        message: Some("Appointment completed".to_string()),
        appointment,
    }))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(payload): Json<PortalCancelRequest>,
) -> Result<Json<AppointmentResponse>, CoreError> {
    let appointment = state
        .portal
        .cancel(auth.tenant()?, auth.subject_id, id, payload.reason)
        .await?;
    Ok(Json(AppointmentResponse {
        message: Some("Appointment cancelled".to_string()),
        appointment,
    }))
}

pub async fn get_working_hours(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<WorkingHoursResponse>, CoreError> {
    let rows = state.professionals.working_hours(auth.subject_id).await?;
    Ok(Json(WorkingHoursResponse {
        professional_id: auth.subject_id,
        working_hours: rows.iter().map(|r| r.entry()).collect(),
    }))
}

pub async fn update_working_hours(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<WorkingHoursRequest>,
) -> Result<Json<WorkingHoursResponse>, CoreError> {
    let rows = state
        .professionals
        .replace_working_hours(auth.subject_id, &payload.working_hours)
        .await?;
    Ok(Json(WorkingHoursResponse {
        professional_id: auth.subject_id,
        working_hours: rows.iter().map(|r| r.entry()).collect(),
    }))
}

/// 只列出今天及以后的停诊日期
pub async fn list_blocked_dates(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<BlockedDatesResponse>, CoreError> {
    let blocked_dates = state
        .professionals
        .blocked_dates(auth.subject_id, Some(today()))
        .await?;
    Ok(Json(BlockedDatesResponse { blocked_dates }))
}

pub async fn add_blocked_date(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<BlockDateRequest>,
) -> Result<(StatusCode, Json<BlockedDate>), CoreError> {
    let date = parse_date(&payload.date)?;
    let blocked = state
        .professionals
        .add_blocked_date(auth.subject_id, date, blank_to_none(payload.reason))
        .await?;
    Ok((StatusCode::CREATED, Json(blocked)))
}

pub async fn remove_blocked_date(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, CoreError> {
    state
        .professionals
        .remove_blocked_date(auth.subject_id, id)
        .await?;
    Ok(Json(MessageResponse::new("Date unblocked")))
}
