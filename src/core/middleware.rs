//! 核心中间件模块

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

use super::auth::{bearer_token, AuthContext, TokenKind, TokenService};
use super::error::CoreError;

/// 请求日志中间件
pub async fn request_logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let user_agent = req
        .headers()
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let response = next.run(req).await;
    let status = response.status();
    let duration = start.elapsed();

    info!(
        "{} {} - {} - {}ms - User-Agent: {:?}",
        method,
        uri,
        status,
        duration.as_millis(),
        user_agent
    );

    response
}

fn authenticate(tokens: &TokenService, req: &Request) -> Result<AuthContext, CoreError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = bearer_token(header).ok_or_else(|| {
        CoreError::unauthorized("Missing bearer token")
    })?;

    tokens.verify(token).map(AuthContext::from).map_err(|e| {
        warn!("拒绝无效令牌: {} {}", req.method(), req.uri().path());
        e
    })
}

/// 后台用户认证中间件
pub async fn require_user(
    State(tokens): State<TokenService>,
    mut req: Request,
    next: Next,
) -> Result<Response, CoreError> {
    let auth = authenticate(&tokens, &req)?;
    if auth.kind != TokenKind::User {
        return Err(CoreError::forbidden("Dashboard access requires a company account"));
    }
    req.extensions_mut().insert(auth);
    Ok(next.run(req).await)
}

/// 专业人员门户认证中间件
pub async fn require_professional(
    State(tokens): State<TokenService>,
    mut req: Request,
    next: Next,
) -> Result<Response, CoreError> {
    let auth = authenticate(&tokens, &req)?;
    if auth.kind != TokenKind::Professional {
        return Err(CoreError::forbidden("Professional portal access only"));
    }
    req.extensions_mut().insert(auth);
    Ok(next.run(req).await)
}

/// 平台超级管理员认证中间件
pub async fn require_superadmin(
    State(tokens): State<TokenService>,
    mut req: Request,
    next: Next,
) -> Result<Response, CoreError> {
    let auth = authenticate(&tokens, &req)?;
    if !auth.is_superadmin() {
        warn!("非超级管理员访问平台接口: subject={}", auth.subject_id);
        return Err(CoreError::forbidden("Super admin access required"));
    }
    req.extensions_mut().insert(auth);
    Ok(next.run(req).await)
}
