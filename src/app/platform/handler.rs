//! 平台管理处理器（超级管理员）

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::Utc;
use validator::Validate;

use super::model::{
    AdminCancelRequest, AdminPlanRequest, AdminSubscriptionResponse, AnalyticsOverview,
    CompanyActionResponse, CompanyDetail, CompanyListQuery, CompanyListResponse,
    CompanyStatusFilter, ExpiringQuery, ExtendRequest, PaymentListQuery, PaymentListResponse,
    PaymentStats, SubscriptionDetailResponse, SubscriptionListQuery, SubscriptionListResponse,
    SuspendRequest,
};
use super::service::DEFAULT_EXPIRING_DAYS;
use crate::app::accounts::model::UpdateBusinessRequest;
use crate::app::subscriptions::handler::parse_plan;
use crate::app::subscriptions::model::{PaymentStatus, SubscriptionStatus};
use crate::app::AppState;
use crate::core::error::CoreError;
use crate::core::response::{search_pattern, DEFAULT_PER_PAGE};
use crate::core::validation::blank_to_none;

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub async fn list_companies(
    State(state): State<AppState>,
    Query(query): Query<CompanyListQuery>,
) -> Result<Json<CompanyListResponse>, CoreError> {
    let status = non_blank(&query.status)
        .map(|s| {
            CompanyStatusFilter::parse(s)
                .ok_or_else(|| CoreError::bad_request(format!("Unknown status filter: {}", s)))
        })
        .transpose()?;
    let window = query.page().window(DEFAULT_PER_PAGE);

    let (companies, total) = state
        .platform
        .list_companies(search_pattern(&query.search), status, window)
        .await?;
    Ok(Json(CompanyListResponse {
        companies,
        pagination: window.pagination(total),
    }))
}

pub async fn get_company(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CompanyDetail>, CoreError> {
    Ok(Json(state.platform.company_detail(id).await?))
}

pub async fn update_company(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateBusinessRequest>,
) -> Result<Json<CompanyActionResponse>, CoreError> {
    payload.validate()?;
    let company = state.platform.update_company(id, payload).await?;
    Ok(Json(CompanyActionResponse {
        message: "Company updated".to_string(),
        company,
    }))
}

pub async fn suspend_company(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<SuspendRequest>,
) -> Result<Json<CompanyActionResponse>, CoreError> {
    let company = state
        .platform
        .suspend(id, blank_to_none(payload.reason))
        .await?;
    Ok(Json(CompanyActionResponse {
        message: "Company suspended".to_string(),
        company,
    }))
}

pub async fn activate_company(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CompanyActionResponse>, CoreError> {
    let company = state.platform.activate(id).await?;
    Ok(Json(CompanyActionResponse {
        message: "Company activated".to_string(),
        company,
    }))
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionListQuery>,
) -> Result<Json<SubscriptionListResponse>, CoreError> {
    let status = non_blank(&query.status)
        .map(|s| {
            SubscriptionStatus::parse(s)
                .ok_or_else(|| CoreError::bad_request(format!("Unknown subscription status: {}", s)))
        })
        .transpose()?;

    let subscriptions = state.platform.list_subscriptions(status).await?;
    Ok(Json(SubscriptionListResponse { subscriptions }))
}

pub async fn expiring_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<ExpiringQuery>,
) -> Result<Json<SubscriptionListResponse>, CoreError> {
    let subscriptions = state
        .platform
        .expiring(query.days.unwrap_or(DEFAULT_EXPIRING_DAYS))
        .await?;
    Ok(Json(SubscriptionListResponse { subscriptions }))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Path(company_id): Path<i64>,
) -> Result<Json<SubscriptionDetailResponse>, CoreError> {
    let (subscription, payments) = state.platform.subscription_detail(company_id).await?;
    Ok(Json(SubscriptionDetailResponse {
        subscription,
        payments,
    }))
}

pub async fn change_plan(
    State(state): State<AppState>,
    Path(company_id): Path<i64>,
    Json(payload): Json<AdminPlanRequest>,
) -> Result<Json<AdminSubscriptionResponse>, CoreError> {
    let plan = parse_plan(&payload.new_plan)?;
    let sub = state.platform.change_plan(company_id, plan).await?;
    Ok(Json(AdminSubscriptionResponse {
        message: format!("Plan changed to {}", plan.as_str()),
        subscription: sub.view(Utc::now()),
    }))
}

pub async fn extend_subscription(
    State(state): State<AppState>,
    Path(company_id): Path<i64>,
    Json(payload): Json<ExtendRequest>,
) -> Result<Json<AdminSubscriptionResponse>, CoreError> {
    let sub = state.platform.extend(company_id, payload.days).await?;
    Ok(Json(AdminSubscriptionResponse {
        message: format!("Subscription extended by {} days", payload.days),
        subscription: sub.view(Utc::now()),
    }))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Path(company_id): Path<i64>,
    Json(payload): Json<AdminCancelRequest>,
) -> Result<Json<AdminSubscriptionResponse>, CoreError> {
    let sub = state
        .platform
        .cancel(company_id, blank_to_none(payload.reason))
        .await?;
    Ok(Json(AdminSubscriptionResponse {
        message: "Subscription canceled".to_string(),
        subscription: sub.view(Utc::now()),
    }))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentListQuery>,
) -> Result<Json<PaymentListResponse>, CoreError> {
    let status = non_blank(&query.status)
        .map(|s| {
            PaymentStatus::parse(s)
                .ok_or_else(|| CoreError::bad_request(format!("Unknown payment status: {}", s)))
        })
        .transpose()?;
    let window = query.page().window(DEFAULT_PER_PAGE);

    let (payments, total) = state
        .platform
        .list_payments(status, query.company_id, window)
        .await?;
    Ok(Json(PaymentListResponse {
        payments,
        pagination: window.pagination(total),
    }))
}

pub async fn payment_stats(
    State(state): State<AppState>,
) -> Result<Json<PaymentStats>, CoreError> {
    Ok(Json(state.platform.payment_stats().await?))
}

pub async fn analytics_overview(
    State(state): State<AppState>,
) -> Result<Json<AnalyticsOverview>, CoreError> {
    Ok(Json(state.platform.overview().await?))
}
