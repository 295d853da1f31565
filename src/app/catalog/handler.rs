//! 服务项目处理器

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use validator::Validate;

use super::model::{
    ProfessionalIdsRequest, ServiceListQuery, ServiceListResponse, ServiceProfessionalsResponse,
    ServiceRequest, ServiceResponse,
};
use super::service::ListOptions;
use crate::app::AppState;
use crate::core::auth::AuthContext;
use crate::core::error::CoreError;
use crate::core::response::{flag, search_pattern, MessageResponse, DEFAULT_PER_PAGE};

pub async fn list_services(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ServiceListQuery>,
) -> Result<Json<ServiceListResponse>, CoreError> {
    let window = query.page().window(DEFAULT_PER_PAGE);
    let options = ListOptions {
        pattern: search_pattern(&query.search),
        active_only: flag(&query.active_only, false),
        professional_id: query.professional_id,
        include_professionals: flag(&query.include_professionals, false),
    };

    let (services, total) = state.catalog.list(auth.tenant()?, &options, window).await?;
    Ok(Json(ServiceListResponse {
        services,
        pagination: window.pagination(total),
    }))
}

pub async fn get_service(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<ServiceResponse>, CoreError> {
    let service = state.catalog.get(auth.tenant()?, id).await?;
    Ok(Json(ServiceResponse {
        message: None,
        service: state.catalog.view(service, true).await?,
    }))
}

pub async fn create_service(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<ServiceRequest>,
) -> Result<(StatusCode, Json<ServiceResponse>), CoreError> {
    let payload = payload.normalized();
    payload.validate()?;

    let service = state.catalog.create(auth.tenant()?, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ServiceResponse {
            message: Some("Service created successfully".to_string()),
            service: state.catalog.view(service, true).await?,
        }),
    ))
}

pub async fn update_service(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(payload): Json<ServiceRequest>,
) -> Result<Json<ServiceResponse>, CoreError> {
    let payload = payload.normalized();
    payload.validate()?;

    let service = state.catalog.update(auth.tenant()?, id, payload).await?;
    Ok(Json(ServiceResponse {
        message: Some("Service updated successfully".to_string()),
        service: state.catalog.view(service, true).await?,
    }))
}

pub async fn delete_service(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, CoreError> {
    state.catalog.delete(auth.tenant()?, id).await?;
    Ok(Json(MessageResponse::new("Service deleted successfully")))
}

pub async fn toggle_service_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<ServiceResponse>, CoreError> {
    let service = state.catalog.toggle_status(auth.tenant()?, id).await?;
    let message = if service.active {
        "Service activated"
    } else {
        "Service deactivated"
    };
    Ok(Json(ServiceResponse {
        message: Some(message.to_string()),
        service: state.catalog.view(service, false).await?,
    }))
}

pub async fn get_service_professionals(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<ServiceProfessionalsResponse>, CoreError> {
    state.catalog.get(auth.tenant()?, id).await?;
    Ok(Json(ServiceProfessionalsResponse {
        service_id: id,
        professionals: state.catalog.professionals(id).await?,
    }))
}

pub async fn set_service_professionals(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(payload): Json<ProfessionalIdsRequest>,
) -> Result<Json<ServiceProfessionalsResponse>, CoreError> {
    let professionals = state
        .catalog
        .set_professionals(auth.tenant()?, id, &payload.professional_ids)
        .await?;
    Ok(Json(ServiceProfessionalsResponse {
        service_id: id,
        professionals,
    }))
}
