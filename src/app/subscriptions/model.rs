//! 订阅数据模型与状态判定

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 订阅状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// 尚未订阅
    None,
    /// 已发起收银台，等待支付
    Pending,
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(SubscriptionStatus::None),
            "pending" => Some(SubscriptionStatus::Pending),
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            _ => None,
        }
    }

    /// `active` 与 `trialing` 视为有效订阅
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Basic,
    Pro,
    Enterprise,
}

impl PlanId {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::Basic => "basic",
            PlanId::Pro => "pro",
            PlanId::Enterprise => "enterprise",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(PlanId::Basic),
            "pro" => Some(PlanId::Pro),
            "enterprise" => Some(PlanId::Enterprise),
            _ => None,
        }
    }

    pub fn plan(&self) -> &'static Plan {
        match self {
            PlanId::Basic => &PLANS[0],
            PlanId::Pro => &PLANS[1],
            PlanId::Enterprise => &PLANS[2],
        }
    }
}

/// 套餐
#[derive(Debug, Serialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: &'static str,
    /// 月费（BRL）
    pub price: f64,
    pub has_trial: bool,
    pub max_professionals: Option<u32>,
    pub features: &'static [&'static str],
}

pub static PLANS: [Plan; 3] = [
    Plan {
        id: PlanId::Basic,
        name: "Basic",
        price: 29.0,
        has_trial: false,
        max_professionals: Some(1),
        features: &["1 professional", "Online booking page", "Client records"],
    },
    Plan {
        id: PlanId::Pro,
        name: "Pro",
        price: 59.0,
        has_trial: true,
        max_professionals: Some(5),
        features: &["Up to 5 professionals", "Financial report", "Professional portal"],
    },
    Plan {
        id: PlanId::Enterprise,
        name: "Enterprise",
        price: 99.0,
        has_trial: true,
        max_professionals: None,
        features: &["Unlimited professionals", "Priority support", "Everything in Pro"],
    },
];

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionRow {
    pub company_id: i64,
    pub plan: Option<String>,
    pub status: String,
    pub trial_end: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub checkout_session: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// 订阅记录
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub company_id: i64,
    pub plan: Option<PlanId>,
    pub status: SubscriptionStatus,
    pub trial_end: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub checkout_session: Option<String>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            company_id: row.company_id,
            plan: row.plan.as_deref().and_then(PlanId::parse),
            status: SubscriptionStatus::parse(&row.status).unwrap_or(SubscriptionStatus::None),
            trial_end: row.trial_end,
            current_period_end: row.current_period_end,
            cancel_at_period_end: row.cancel_at_period_end,
            canceled_at: row.canceled_at,
            checkout_session: row.checkout_session,
        }
    }
}

impl Subscription {
    pub fn empty(company_id: i64) -> Self {
        Self {
            company_id,
            plan: None,
            status: SubscriptionStatus::None,
            trial_end: None,
            current_period_end: None,
            cancel_at_period_end: false,
            canceled_at: None,
            checkout_session: None,
        }
    }

    /// 在 `now` 时刻的实际状态
    ///
    /// 试用到期转为 `past_due`；计费周期结束时，已申请周期末取消的转为 `canceled`，否则转为 `past_due`。
    pub fn effective_status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        match self.status {
            SubscriptionStatus::Trialing if self.trial_end.map_or(false, |end| end <= now) => {
                if self.cancel_at_period_end {
                    SubscriptionStatus::Canceled
                } else {
                    SubscriptionStatus::PastDue
                }
            }
            SubscriptionStatus::Active
                if self.current_period_end.map_or(false, |end| end <= now) =>
            {
                if self.cancel_at_period_end {
                    SubscriptionStatus::Canceled
                } else {
                    SubscriptionStatus::PastDue
                }
            }
            status => status,
        }
    }

    /// 当前计费（或试用）周期的结束时间
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        match self.status {
            SubscriptionStatus::Trialing => self.trial_end,
            _ => self.current_period_end,
        }
    }

    /// 租户后台是否可用：有效订阅，或欠费但仍在宽限期内
    pub fn allows_access(&self, now: DateTime<Utc>, grace_days: i64) -> bool {
        match self.effective_status(now) {
            SubscriptionStatus::Active | SubscriptionStatus::Trialing => true,
            SubscriptionStatus::PastDue => self
                .period_end()
                .map_or(false, |end| end + Duration::days(grace_days) > now),
            _ => false,
        }
    }

    pub fn trial_days_remaining(&self, now: DateTime<Utc>) -> i64 {
        match (self.effective_status(now), self.trial_end) {
            (SubscriptionStatus::Trialing, Some(end)) if end > now => {
                let seconds = (end - now).num_seconds();
                (seconds + 86_399) / 86_400
            }
            _ => 0,
        }
    }

    /// 月经常性收入（仅计入已付费的有效订阅）
    pub fn mrr(&self, now: DateTime<Utc>) -> f64 {
        match (self.effective_status(now), self.plan) {
            (SubscriptionStatus::Active, Some(plan)) => plan.plan().price,
            _ => 0.0,
        }
    }

    pub fn view(&self, now: DateTime<Utc>) -> SubscriptionView {
        let status = self.effective_status(now);
        SubscriptionView {
            company_id: self.company_id,
            plan: self.plan,
            plan_name: self.plan.map(|p| p.plan().name),
            price: self.plan.map(|p| p.plan().price),
            status,
            trial_end: self.trial_end,
            current_period_end: self.current_period_end,
            cancel_at_period_end: self.cancel_at_period_end,
            canceled_at: self.canceled_at,
            has_active_subscription: status.is_active(),
            is_in_trial: status == SubscriptionStatus::Trialing,
            is_past_due: status == SubscriptionStatus::PastDue,
            is_canceled_but_active: self.cancel_at_period_end && status.is_active(),
            trial_days_remaining: self.trial_days_remaining(now),
        }
    }
}

/// 订阅状态视图，附带派生判定
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    pub company_id: i64,
    pub plan: Option<PlanId>,
    pub plan_name: Option<&'static str>,
    pub price: Option<f64>,
    pub status: SubscriptionStatus,
    pub trial_end: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub has_active_subscription: bool,
    pub is_in_trial: bool,
    pub is_past_due: bool,
    pub is_canceled_but_active: bool,
    pub trial_days_remaining: i64,
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub plan: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub subscription: SubscriptionView,
}

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub plans: &'static [Plan],
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub message: String,
    pub checkout_url: String,
    pub subscription: SubscriptionView,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionActionResponse {
    pub message: String,
    pub subscription: SubscriptionView,
}

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

/// 支付服务商回调事件
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub company_id: i64,
    pub plan: Option<String>,
    /// 实收金额，缺省按套餐月费记账
    pub amount: Option<f64>,
}

/// 回调事件对应的收款结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
}
