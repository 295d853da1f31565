//! 专业人员数据模型

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::catalog::model::ServiceSummary;
use crate::app::scheduling::{format_hhmm, DaySchedule, Interval};
use crate::core::response::{PageQuery, Pagination};
use crate::core::validation::{blank_to_none, validate_color, validate_not_blank, validate_phone};

pub const DEFAULT_PROFESSIONAL_COLOR: &str = "#3B82F6";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Professional {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub role: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub color: String,
    pub active: bool,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Professional {
    /// 是否已激活门户账号
    pub fn portal_enabled(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// 关联列表中使用的精简信息
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProfessionalSummary {
    pub id: i64,
    pub name: String,
    pub role: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProfessionalStats {
    pub total_appointments: i64,
    pub completed_appointments: i64,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfessionalView {
    #[serde(flatten)]
    pub professional: Professional,
    pub portal_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<ServiceSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ProfessionalStats>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProfessionalRequest {
    #[validate(
        length(min = 1, max = 255, message = "Name is required"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    #[validate(
        length(min = 1, max = 100, message = "Role is required"),
        custom(function = "validate_not_blank")
    )]
    pub role: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(custom(function = "validate_color"))]
    pub color: Option<String>,
    pub active: Option<bool>,
    pub service_ids: Option<Vec<i64>>,
}

impl ProfessionalRequest {
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            role: self.role.trim().to_string(),
            phone: blank_to_none(self.phone),
            email: blank_to_none(self.email).map(|e| e.to_lowercase()),
            color: blank_to_none(self.color),
            active: self.active,
            service_ids: self.service_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProfessionalListQuery {
    pub search: Option<String>,
    pub active_only: Option<String>,
    pub include_services: Option<String>,
    pub include_stats: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ProfessionalListQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfessionalListResponse {
    pub professionals: Vec<ProfessionalView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct ProfessionalResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub professional: ProfessionalView,
}

#[derive(Debug, Deserialize)]
pub struct ServiceIdsRequest {
    pub service_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct ProfessionalServicesResponse {
    pub professional_id: i64,
    pub services: Vec<ServiceSummary>,
}

/// 某天的工作时间（对外格式）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHourEntry {
    pub day_of_week: u32,
    pub start_time: String,
    pub end_time: String,
    pub break_start: Option<String>,
    pub break_end: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkingHourRow {
    pub day_of_week: i64,
    pub start_minute: i64,
    pub end_minute: i64,
    pub break_start: Option<i64>,
    pub break_end: Option<i64>,
}

impl WorkingHourRow {
    pub fn entry(&self) -> WorkingHourEntry {
        WorkingHourEntry {
            day_of_week: self.day_of_week as u32,
            start_time: format_hhmm(self.start_minute as u32),
            end_time: format_hhmm(self.end_minute as u32),
            break_start: self.break_start.map(|m| format_hhmm(m as u32)),
            break_end: self.break_end.map(|m| format_hhmm(m as u32)),
        }
    }

    pub fn schedule(&self) -> Option<DaySchedule> {
        let window = Interval::new(self.start_minute as u32, self.end_minute as u32)?;
        let breaks = match (self.break_start, self.break_end) {
            (Some(start), Some(end)) => Interval::new(start as u32, end as u32).into_iter().collect(),
            _ => Vec::new(),
        };
        Some(DaySchedule { window, breaks })
    }
}

#[derive(Debug, Deserialize)]
pub struct WorkingHoursRequest {
    pub working_hours: Vec<WorkingHourEntry>,
}

#[derive(Debug, Serialize)]
pub struct WorkingHoursResponse {
    pub professional_id: i64,
    pub working_hours: Vec<WorkingHourEntry>,
}

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub message: String,
    pub activation_token: String,
    pub expires_at: DateTime<Utc>,
}

/// 整天不可预约的日期
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BlockedDate {
    pub id: i64,
    pub professional_id: i64,
    pub blocked_date: NaiveDate,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}
