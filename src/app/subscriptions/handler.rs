//! 订阅处理器

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{Json, Response},
    Extension,
};
use chrono::Utc;
use tracing::warn;

use super::model::{
    CheckoutResponse, PlanId, PlanRequest, PlansResponse, PortalResponse, StatusResponse,
    SubscriptionActionResponse, WebhookAck, WebhookEvent, PLANS,
};
use crate::app::AppState;
use crate::core::auth::AuthContext;
use crate::core::error::CoreError;

/// Webhook 共享密钥请求头
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

pub async fn list_plans() -> Json<PlansResponse> {
    Json(PlansResponse { plans: &PLANS })
}

pub async fn status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<StatusResponse>, CoreError> {
    let sub = state.subscriptions.get(auth.tenant()?).await?;
    Ok(Json(StatusResponse {
        subscription: sub.view(Utc::now()),
    }))
}

pub(crate) fn parse_plan(value: &str) -> Result<PlanId, CoreError> {
    PlanId::parse(value).ok_or_else(|| {
        CoreError::bad_request("Invalid plan; expected one of basic, pro, enterprise")
    })
}

pub async fn subscribe(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<PlanRequest>,
) -> Result<Json<CheckoutResponse>, CoreError> {
    let plan = parse_plan(&payload.plan)?;
    let (sub, checkout_url) = state.subscriptions.subscribe(auth.tenant()?, plan).await?;
    Ok(Json(CheckoutResponse {
        message: "Checkout session created".to_string(),
        checkout_url,
        subscription: sub.view(Utc::now()),
    }))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<SubscriptionActionResponse>, CoreError> {
    let sub = state.subscriptions.cancel(auth.tenant()?).await?;
    Ok(Json(SubscriptionActionResponse {
        message: "Subscription will be canceled at the end of the current period".to_string(),
        subscription: sub.view(Utc::now()),
    }))
}

pub async fn reactivate(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<SubscriptionActionResponse>, CoreError> {
    let sub = state.subscriptions.reactivate(auth.tenant()?).await?;
    Ok(Json(SubscriptionActionResponse {
        message: "Subscription reactivated".to_string(),
        subscription: sub.view(Utc::now()),
    }))
}

pub async fn change_plan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<PlanRequest>,
) -> Result<Json<SubscriptionActionResponse>, CoreError> {
    let plan = parse_plan(&payload.plan)?;
    let sub = state.subscriptions.change_plan(auth.tenant()?, plan).await?;
    Ok(Json(SubscriptionActionResponse {
        message: format!("Plan changed to {}", plan.plan().name),
        subscription: sub.view(Utc::now()),
    }))
}

pub async fn portal(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<PortalResponse>, CoreError> {
    Ok(Json(PortalResponse {
        url: state.subscriptions.portal_url(auth.tenant()?),
    }))
}

/// 支付服务商回调；以共享密钥校验来源
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<WebhookEvent>,
) -> Result<Json<WebhookAck>, CoreError> {
    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if provided != Some(state.subscriptions.webhook_secret()) {
        warn!("拒绝签名无效的计费回调: {}", event.id);
        return Err(CoreError::unauthorized("Invalid webhook signature"));
    }

    // 租户必须存在
    state.accounts.get_company(event.company_id).await?;

    let applied = state.subscriptions.apply_webhook(&event).await?;
    Ok(Json(WebhookAck {
        received: true,
        duplicate: !applied,
    }))
}

/// 订阅守卫：租户被暂停返回 403，无有效订阅（且超出宽限期）返回 402
pub async fn subscription_guard(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, CoreError> {
    let company_id = req
        .extensions()
        .get::<AuthContext>()
        .ok_or_else(|| CoreError::unauthorized("Authentication required"))?
        .tenant()?;

    let company = state.accounts.get_company(company_id).await?;
    if company.suspended {
        return Err(CoreError::forbidden("This company account is suspended"));
    }

    let sub = state.subscriptions.get(company_id).await?;
    if !sub.allows_access(Utc::now(), state.subscriptions.grace_days()) {
        return Err(CoreError::PaymentRequired(
            "An active subscription is required to use this feature".to_string(),
        ));
    }

    Ok(next.run(req).await)
}
