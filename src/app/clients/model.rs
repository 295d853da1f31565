//! 客户数据模型

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::response::{PageQuery, Pagination};
use crate::core::validation::{blank_to_none, validate_not_blank, validate_phone};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Client {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 客户预约统计
#[derive(Debug, Clone, Serialize)]
pub struct ClientStats {
    pub total_appointments: i64,
    pub last_appointment: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientView {
    #[serde(flatten)]
    pub client: Client,
    #[serde(flatten)]
    pub stats: Option<ClientStats>,
}

/// 自动补全条目
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClientSummary {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ClientRequest {
    #[validate(
        length(min = 1, max = 255, message = "Name is required"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub notes: Option<String>,
}

impl ClientRequest {
    /// 空白的可选字段按未填写处理
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            phone: blank_to_none(self.phone),
            email: blank_to_none(self.email).map(|e| e.to_lowercase()),
            notes: blank_to_none(self.notes),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ClientListQuery {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub include_stats: Option<String>,
}

impl ClientListQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ClientSearchQuery {
    pub q: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ClientListResponse {
    pub clients: Vec<ClientView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct ClientResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub client: ClientView,
}
