//! 账号处理器

use axum::{extract::State, http::StatusCode, response::Json, Extension};
use validator::Validate;

use super::model::{
    BusinessResponse, ChangePasswordRequest, LoginRequest, MeResponse, RegisterRequest,
    SessionResponse, UpdateBusinessRequest,
};
use crate::app::AppState;
use crate::core::auth::AuthContext;
use crate::core::error::CoreError;
use crate::core::response::MessageResponse;

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), CoreError> {
    payload.validate()?;

    let registration = state
        .accounts
        .register(
            &payload.business_name,
            &payload.name,
            &payload.email,
            &payload.password,
            payload.phone,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            message: "Account created successfully".to_string(),
            access_token: registration.access_token,
            user: registration.user,
            company: Some(registration.company),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, CoreError> {
    payload.validate()?;

    let (user, access_token) = state.accounts.login(&payload.email, &payload.password).await?;
    let company = match user.company_id {
        Some(id) => Some(state.accounts.get_company(id).await?),
        None => None,
    };

    Ok(Json(SessionResponse {
        message: "Login successful".to_string(),
        access_token,
        user,
        company,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<MeResponse>, CoreError> {
    let user = state.accounts.get_user(auth.subject_id).await?;
    let company = match user.company_id {
        Some(id) => Some(state.accounts.get_company(id).await?),
        None => None,
    };
    Ok(Json(MeResponse { user, company }))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, CoreError> {
    payload.validate()?;
    state
        .accounts
        .change_password(auth.subject_id, &payload.current_password, &payload.new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

pub async fn get_business(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<BusinessResponse>, CoreError> {
    let business = state.accounts.get_company(auth.tenant()?).await?;
    Ok(Json(BusinessResponse { business }))
}

pub async fn update_business(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<UpdateBusinessRequest>,
) -> Result<Json<BusinessResponse>, CoreError> {
    payload.validate()?;
    let business = state.accounts.update_business(auth.tenant()?, payload).await?;
    Ok(Json(BusinessResponse { business }))
}
