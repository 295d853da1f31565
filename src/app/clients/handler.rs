//! 客户处理器

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use validator::Validate;

use super::model::{
    ClientListQuery, ClientListResponse, ClientRequest, ClientResponse, ClientSearchQuery,
    ClientSummary,
};
use crate::app::AppState;
use crate::core::auth::AuthContext;
use crate::core::error::CoreError;
use crate::core::response::{flag, search_pattern, MessageResponse, DEFAULT_PER_PAGE};

pub async fn list_clients(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ClientListQuery>,
) -> Result<Json<ClientListResponse>, CoreError> {
    let window = query.page().window(DEFAULT_PER_PAGE);
    let (clients, total) = state
        .clients
        .list(
            auth.tenant()?,
            search_pattern(&query.search),
            window,
            flag(&query.include_stats, false),
        )
        .await?;

    Ok(Json(ClientListResponse {
        clients,
        pagination: window.pagination(total),
    }))
}

pub async fn search_clients(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ClientSearchQuery>,
) -> Result<Json<Vec<ClientSummary>>, CoreError> {
    let clients = state
        .clients
        .search(auth.tenant()?, search_pattern(&query.q), query.limit.unwrap_or(10))
        .await?;
    Ok(Json(clients))
}

pub async fn get_client(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<ClientResponse>, CoreError> {
    let client = state.clients.get(auth.tenant()?, id).await?;
    Ok(Json(ClientResponse {
        message: None,
        client: state.clients.view(client, true).await?,
    }))
}

pub async fn create_client(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<ClientRequest>,
) -> Result<(StatusCode, Json<ClientResponse>), CoreError> {
    let payload = payload.normalized();
    payload.validate()?;

    let client = state.clients.create(auth.tenant()?, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ClientResponse {
            message: Some("Client created successfully".to_string()),
            client: state.clients.view(client, false).await?,
        }),
    ))
}

pub async fn update_client(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(payload): Json<ClientRequest>,
) -> Result<Json<ClientResponse>, CoreError> {
    let payload = payload.normalized();
    payload.validate()?;

    let client = state.clients.update(auth.tenant()?, id, payload).await?;
    Ok(Json(ClientResponse {
        message: Some("Client updated successfully".to_string()),
        client: state.clients.view(client, false).await?,
    }))
}

pub async fn delete_client(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, CoreError> {
    state.clients.delete(auth.tenant()?, id).await?;
    Ok(Json(MessageResponse::new("Client deleted successfully")))
}
