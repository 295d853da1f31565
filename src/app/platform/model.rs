//! 平台管理数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::accounts::model::Company;
use crate::app::subscriptions::model::{
    PaymentStatus, PlanId, SubscriptionStatus, SubscriptionView,
};
use crate::core::response::{PageQuery, Pagination};

/// 商户列表行（含所有者）
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompanyRow {
    pub id: i64,
    pub business_name: String,
    pub slug: String,
    pub suspended: bool,
    pub suspended_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionBrief {
    pub plan: Option<PlanId>,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformCompany {
    pub id: i64,
    pub business_name: String,
    pub slug: String,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
    pub subscription: SubscriptionBrief,
    pub mrr: f64,
    pub suspended: bool,
    pub suspended_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CompanyListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl CompanyListQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// 列表状态筛选：订阅实际状态，或 `suspended`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyStatusFilter {
    Subscription(SubscriptionStatus),
    Suspended,
}

impl CompanyStatusFilter {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "suspended" => Some(CompanyStatusFilter::Suspended),
            other => SubscriptionStatus::parse(other).map(CompanyStatusFilter::Subscription),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompanyListResponse {
    pub companies: Vec<PlatformCompany>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompanyCounts {
    pub clients: i64,
    pub professionals: i64,
    pub services: i64,
    pub appointments: i64,
}

#[derive(Debug, Serialize)]
pub struct CompanyDetail {
    pub company: Company,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
    pub subscription: SubscriptionView,
    pub mrr: f64,
    pub counts: CompanyCounts,
}

#[derive(Debug, Deserialize)]
pub struct SuspendRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompanyActionResponse {
    pub message: String,
    pub company: Company,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformSubscription {
    pub company_id: i64,
    pub business_name: String,
    pub slug: String,
    pub subscription: SubscriptionView,
    pub mrr: f64,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionListResponse {
    pub subscriptions: Vec<PlatformSubscription>,
}

#[derive(Debug, Deserialize)]
pub struct AdminPlanRequest {
    pub new_plan: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub days: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdminCancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdminSubscriptionResponse {
    pub message: String,
    pub subscription: SubscriptionView,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsOverview {
    pub total_companies: i64,
    pub active_companies: i64,
    pub trial_companies: i64,
    pub past_due_companies: i64,
    pub suspended_companies: i64,
    pub total_mrr: f64,
    pub canceled_this_month: i64,
    /// 百分比，保留一位小数
    pub churn_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionDetailResponse {
    pub subscription: PlatformSubscription,
    pub payments: Vec<Payment>,
}

/// 计费事件表中构成收款的记录
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentRow {
    pub event_id: String,
    pub company_id: i64,
    pub business_name: Option<String>,
    pub event_type: String,
    pub plan: Option<String>,
    pub amount: Option<f64>,
    pub payment_status: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: String,
    pub company_id: i64,
    pub business_name: Option<String>,
    pub event_type: String,
    pub plan: Option<PlanId>,
    pub amount: f64,
    pub status: PaymentStatus,
    pub paid_at: DateTime<Utc>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Self {
            id: row.event_id,
            company_id: row.company_id,
            business_name: row.business_name,
            event_type: row.event_type,
            plan: row.plan.as_deref().and_then(PlanId::parse),
            amount: row.amount.unwrap_or(0.0),
            status: PaymentStatus::parse(&row.payment_status).unwrap_or(PaymentStatus::Failed),
            paid_at: row.received_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentListQuery {
    pub status: Option<String>,
    pub company_id: Option<i64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PaymentListQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentListResponse {
    pub payments: Vec<Payment>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodTotals {
    pub count: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRevenue {
    /// `YYYY-MM`
    pub month: String,
    pub count: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentStats {
    pub total_revenue: f64,
    pub total_payments: i64,
    pub failed_payments: i64,
    pub last_30_days: PeriodTotals,
    /// 最早的月份在前
    pub monthly: Vec<MonthlyRevenue>,
}
