//! 服务项目数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::professionals::model::ProfessionalSummary;
use crate::core::response::{PageQuery, Pagination};
use crate::core::validation::{blank_to_none, validate_color, validate_not_blank};

pub const DEFAULT_SERVICE_COLOR: &str = "#10B981";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Service {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    /// 时长（分钟）
    pub duration: i64,
    pub color: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ServiceSummary {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub duration: i64,
    pub color: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceView {
    #[serde(flatten)]
    pub service: Service,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub professionals: Option<Vec<ProfessionalSummary>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ServiceRequest {
    #[validate(
        length(min = 1, max = 255, message = "Name is required"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: f64,
    #[validate(range(min = 1, max = 1440, message = "Duration must be between 1 and 1440 minutes"))]
    pub duration: i64,
    #[validate(custom(function = "validate_color"))]
    pub color: Option<String>,
    pub active: Option<bool>,
    pub professional_ids: Option<Vec<i64>>,
}

impl ServiceRequest {
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            description: blank_to_none(self.description),
            color: blank_to_none(self.color),
            ..self
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServiceListQuery {
    pub search: Option<String>,
    pub active_only: Option<String>,
    pub professional_id: Option<i64>,
    pub include_professionals: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ServiceListQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceListResponse {
    pub services: Vec<ServiceView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct ServiceResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub service: ServiceView,
}

#[derive(Debug, Deserialize)]
pub struct ProfessionalIdsRequest {
    pub professional_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct ServiceProfessionalsResponse {
    pub service_id: i64,
    pub professionals: Vec<ProfessionalSummary>,
}
