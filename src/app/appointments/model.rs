//! 预约数据模型

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::app::scheduling::format_hhmm;
use crate::core::response::{PageQuery, Pagination};

/// 预约状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// 公开预约待客户确认
    Pending,
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "pending" => Some(AppointmentStatus::Pending),
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" | "canceled" => Some(AppointmentStatus::Cancelled),
            "no_show" => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }

    /// 是否占用专业人员的时段
    pub fn occupies_slot(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending | AppointmentStatus::Scheduled | AppointmentStatus::Completed
        )
    }

    /// 尚未发生、可以取消的预约
    pub fn is_open(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Scheduled)
    }
}

/// 预约来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingSource {
    /// 后台录入
    Dashboard,
    /// 公开预约页
    Online,
}

impl BookingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingSource::Dashboard => "dashboard",
            BookingSource::Online => "online",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: i64,
    pub company_id: i64,
    pub client_id: i64,
    pub professional_id: i64,
    pub service_id: i64,
    pub appointment_date: NaiveDate,
    pub start_minute: i64,
    pub end_minute: i64,
    pub status: String,
    pub notes: Option<String>,
    pub price: f64,
    pub payment_method: Option<String>,
    pub booking_code: String,
    pub source: String,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentRow {
    pub fn status(&self) -> AppointmentStatus {
        AppointmentStatus::parse(&self.status).unwrap_or(AppointmentStatus::Scheduled)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Appointment {
    pub id: i64,
    pub company_id: i64,
    pub client_id: i64,
    pub professional_id: i64,
    pub service_id: i64,
    pub appointment_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub notes: Option<String>,
    pub price: f64,
    pub payment_method: Option<String>,
    pub booking_code: String,
    pub source: String,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AppointmentRow> for Appointment {
    fn from(row: AppointmentRow) -> Self {
        Self {
            id: row.id,
            company_id: row.company_id,
            client_id: row.client_id,
            professional_id: row.professional_id,
            service_id: row.service_id,
            appointment_date: row.appointment_date,
            start_time: format_hhmm(row.start_minute as u32),
            end_time: format_hhmm(row.end_minute as u32),
            status: row.status,
            notes: row.notes,
            price: row.price,
            payment_method: row.payment_method,
            booking_code: row.booking_code,
            source: row.source,
            cancel_reason: row.cancel_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentDetailRow {
    #[sqlx(flatten)]
    pub appointment: AppointmentRow,
    pub client_name: String,
    pub client_phone: Option<String>,
    pub client_email: Option<String>,
    pub professional_name: String,
    pub professional_color: String,
    pub service_name: String,
    pub service_color: String,
    pub service_duration: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientRef {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfessionalRef {
    pub id: i64,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceRef {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub duration: i64,
}

/// 带客户、专业人员与服务信息的预约
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentDetail {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub client: ClientRef,
    pub professional: ProfessionalRef,
    pub service: ServiceRef,
}

impl From<AppointmentDetailRow> for AppointmentDetail {
    fn from(row: AppointmentDetailRow) -> Self {
        let appointment = row.appointment;
        Self {
            client: ClientRef {
                id: appointment.client_id,
                name: row.client_name,
                phone: row.client_phone,
                email: row.client_email,
            },
            professional: ProfessionalRef {
                id: appointment.professional_id,
                name: row.professional_name,
                color: row.professional_color,
            },
            service: ServiceRef {
                id: appointment.service_id,
                name: row.service_name,
                color: row.service_color,
                duration: row.service_duration,
            },
            appointment: appointment.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AppointmentRequest {
    pub client_id: i64,
    pub professional_id: i64,
    pub service_id: i64,
    pub appointment_date: String,
    pub start_time: String,
    pub notes: Option<String>,
    pub price: Option<f64>,
}

/// 改期/修改；未提供的字段保持不变
#[derive(Debug, Default, Deserialize)]
pub struct AppointmentUpdateRequest {
    pub client_id: Option<i64>,
    pub professional_id: Option<i64>,
    pub service_id: Option<i64>,
    pub appointment_date: Option<String>,
    pub start_time: Option<String>,
    pub notes: Option<String>,
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteRequest {
    pub notes: Option<String>,
    pub custom_price: Option<f64>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityCheckRequest {
    pub professional_id: i64,
    pub service_id: i64,
    pub appointment_date: String,
    pub start_time: String,
    pub exclude_appointment_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityCheckResponse {
    pub available: bool,
    pub end_time: String,
    pub within_working_hours: bool,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentListQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub professional_id: Option<i64>,
    pub client_id: Option<i64>,
    pub service_id: Option<i64>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl AppointmentListQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// 列表过滤条件（已解析）
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub professional_id: Option<i64>,
    pub client_id: Option<i64>,
    pub service_id: Option<i64>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentListResponse {
    pub appointments: Vec<AppointmentDetail>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct AppointmentResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub appointment: AppointmentDetail,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub professional_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CalendarEvent {
    pub id: i64,
    pub title: String,
    pub start: String,
    pub end: String,
    #[serde(rename = "backgroundColor")]
    pub background_color: String,
    #[serde(rename = "borderColor")]
    pub border_color: String,
    pub status: String,
    pub client_name: String,
    pub professional_id: i64,
    pub professional_name: String,
    pub service_name: String,
}

#[derive(Debug, Serialize)]
pub struct CalendarResponse {
    pub events: Vec<CalendarEvent>,
}

#[derive(Debug, Deserialize)]
pub struct FinancialReportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub professional_id: Option<i64>,
    pub service_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueLine {
    pub id: Option<i64>,
    pub name: String,
    pub count: i64,
    pub revenue: f64,
}

#[derive(Debug, Serialize)]
pub struct FinancialReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_appointments: i64,
    pub total_revenue: f64,
    pub average_ticket: f64,
    pub by_professional: Vec<RevenueLine>,
    pub by_service: Vec<RevenueLine>,
    pub by_payment_method: Vec<RevenueLine>,
}
