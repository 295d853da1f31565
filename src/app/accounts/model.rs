//! 账号与租户数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::validation::{validate_not_blank, validate_phone};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub company_id: Option<i64>,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 对外返回的用户信息（不含密码哈希）
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub company_id: Option<i64>,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            company_id: row.company_id,
            name: row.name,
            email: row.email,
            role: row.role,
            created_at: row.created_at,
        }
    }
}

/// 租户（商户）
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Company {
    pub id: i64,
    pub business_name: String,
    pub slug: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub booking_enabled: bool,
    pub require_confirmation: bool,
    pub suspended: bool,
    pub suspended_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 120, message = "Business name must be between 2 and 120 characters"))]
    pub business_name: String,

    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 6, message = "Password must have at least 6 characters"))]
    pub password: String,

    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email and password are required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Email and password are required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "New password must have at least 6 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBusinessRequest {
    #[validate(length(min = 2, max = 120, message = "Business name must be between 2 and 120 characters"))]
    pub business_name: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    #[validate(url(message = "Invalid logo URL"))]
    pub logo_url: Option<String>,
    pub booking_enabled: Option<bool>,
    pub require_confirmation: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub message: String,
    pub access_token: String,
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<Company>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub company: Option<Company>,
}

#[derive(Debug, Serialize)]
pub struct BusinessResponse {
    pub business: Company,
}
