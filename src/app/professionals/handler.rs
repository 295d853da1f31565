//! 专业人员处理器

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use validator::Validate;

use super::model::{
    InviteResponse, ProfessionalListQuery, ProfessionalListResponse, ProfessionalRequest,
    ProfessionalResponse, ProfessionalServicesResponse, ServiceIdsRequest, WorkingHoursRequest,
    WorkingHoursResponse,
};
use super::service::ListOptions;
use crate::app::AppState;
use crate::core::auth::AuthContext;
use crate::core::error::CoreError;
use crate::core::response::{flag, search_pattern, MessageResponse, DEFAULT_PER_PAGE};

pub async fn list_professionals(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ProfessionalListQuery>,
) -> Result<Json<ProfessionalListResponse>, CoreError> {
    let window = query.page().window(DEFAULT_PER_PAGE);
    let options = ListOptions {
        pattern: search_pattern(&query.search),
        active_only: flag(&query.active_only, false),
        include_services: flag(&query.include_services, false),
        include_stats: flag(&query.include_stats, false),
    };

    let (professionals, total) = state
        .professionals
        .list(auth.tenant()?, &options, window)
        .await?;
    Ok(Json(ProfessionalListResponse {
        professionals,
        pagination: window.pagination(total),
    }))
}

pub async fn get_professional(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<ProfessionalResponse>, CoreError> {
    let professional = state.professionals.get(auth.tenant()?, id).await?;
    Ok(Json(ProfessionalResponse {
        message: None,
        professional: state.professionals.view(professional, true, true).await?,
    }))
}

pub async fn create_professional(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<ProfessionalRequest>,
) -> Result<(StatusCode, Json<ProfessionalResponse>), CoreError> {
    let payload = payload.normalized();
    payload.validate()?;

    let professional = state.professionals.create(auth.tenant()?, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ProfessionalResponse {
            message: Some("Professional created successfully".to_string()),
            professional: state.professionals.view(professional, true, false).await?,
        }),
    ))
}

pub async fn update_professional(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(payload): Json<ProfessionalRequest>,
) -> Result<Json<ProfessionalResponse>, CoreError> {
    let payload = payload.normalized();
    payload.validate()?;

    let professional = state.professionals.update(auth.tenant()?, id, payload).await?;
    Ok(Json(ProfessionalResponse {
        message: Some("Professional updated successfully".to_string()),
        professional: state.professionals.view(professional, true, false).await?,
    }))
}

pub async fn delete_professional(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, CoreError> {
    state.professionals.delete(auth.tenant()?, id).await?;
    Ok(Json(MessageResponse::new("Professional deleted successfully")))
}

pub async fn toggle_professional_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<ProfessionalResponse>, CoreError> {
    let professional = state.professionals.toggle_status(auth.tenant()?, id).await?;
    let message = if professional.active {
        "Professional activated"
    } else {
        "Professional deactivated"
    };
    Ok(Json(ProfessionalResponse {
        message: Some(message.to_string()),
        professional: state.professionals.view(professional, false, false).await?,
    }))
}

pub async fn get_professional_services(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<ProfessionalServicesResponse>, CoreError> {
    state.professionals.get(auth.tenant()?, id).await?;
    Ok(Json(ProfessionalServicesResponse {
        professional_id: id,
        services: state.professionals.services(id).await?,
    }))
}

pub async fn set_professional_services(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(payload): Json<ServiceIdsRequest>,
) -> Result<Json<ProfessionalServicesResponse>, CoreError> {
    let services = state
        .professionals
        .set_services(auth.tenant()?, id, &payload.service_ids)
        .await?;
    Ok(Json(ProfessionalServicesResponse {
        professional_id: id,
        services,
    }))
}

pub async fn get_working_hours(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<WorkingHoursResponse>, CoreError> {
    state.professionals.get(auth.tenant()?, id).await?;
    let rows = state.professionals.working_hours(id).await?;
    Ok(Json(WorkingHoursResponse {
        professional_id: id,
        working_hours: rows.iter().map(|r| r.entry()).collect(),
    }))
}

pub async fn update_working_hours(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(payload): Json<WorkingHoursRequest>,
) -> Result<Json<WorkingHoursResponse>, CoreError> {
    state.professionals.get(auth.tenant()?, id).await?;
    let rows = state
        .professionals
        .replace_working_hours(id, &payload.working_hours)
        .await?;
    Ok(Json(WorkingHoursResponse {
        professional_id: id,
        working_hours: rows.iter().map(|r| r.entry()).collect(),
    }))
}

pub async fn invite_professional(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<InviteResponse>, CoreError> {
    let (activation_token, expires_at) = state.professionals.invite(auth.tenant()?, id).await?;
    Ok(Json(InviteResponse {
        message: "Activation token created".to_string(),
        activation_token,
        expires_at,
    }))
}
