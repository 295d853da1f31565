//! 专业人员门户数据模型

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::appointments::model::{AppointmentDetail, RevenueLine};
use crate::app::professionals::model::{BlockedDate, Professional};
use crate::core::response::{PageQuery, Pagination};

#[derive(Debug, Deserialize, Validate)]
pub struct ActivateRequest {
    #[validate(length(min = 1, message = "Activation token is required"))]
    pub token: String,
    #[validate(length(min = 6, message = "Password must have at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PortalLoginRequest {
    #[validate(length(min = 1, message = "Email and password are required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Email and password are required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct PortalSessionResponse {
    pub message: String,
    pub access_token: String,
    pub professional: Professional,
    pub business_name: String,
}

#[derive(Debug, Serialize)]
pub struct PortalMeResponse {
    pub professional: Professional,
    pub business_name: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct PortalStats {
    pub today_appointments: i64,
    pub week_appointments: i64,
    pub month_appointments: i64,
    pub month_completed: i64,
    pub month_cancelled: i64,
    /// 百分比，保留一位小数
    pub completion_rate: f64,
    pub month_revenue: f64,
}

#[derive(Debug, Serialize)]
pub struct PortalDashboard {
    pub stats: PortalStats,
    pub today_schedule: Vec<AppointmentDetail>,
    pub upcoming_appointments: Vec<AppointmentDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub appointments: Vec<AppointmentDetail>,
}

#[derive(Debug, Deserialize)]
pub struct PortalCancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BlockDateRequest {
    pub date: String,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BlockedDatesResponse {
    pub blocked_dates: Vec<BlockedDate>,
}

/// 本人名下的预约列表筛选
#[derive(Debug, Deserialize)]
pub struct PortalAppointmentQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub client_id: Option<i64>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PortalAppointmentQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PortalClientQuery {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PortalClientQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// 与本人有过预约的客户，不含商户内部备注
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PortalClient {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub appointment_count: i64,
    pub last_appointment: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct PortalClientListResponse {
    pub clients: Vec<PortalClient>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct PortalClientDetail {
    pub client: PortalClient,
    pub appointments: Vec<AppointmentDetail>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// 区间统计，收入只计入已完成的预约
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStats {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_appointments: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub no_show: i64,
    /// 百分比，保留一位小数
    pub completion_rate: f64,
    pub revenue: f64,
    pub average_ticket: f64,
    pub by_service: Vec<RevenueLine>,
}
