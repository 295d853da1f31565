//! 订阅业务服务

use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use super::model::{
    PaymentStatus, PlanId, Subscription, SubscriptionRow, SubscriptionStatus, WebhookEvent,
};
use crate::config::BillingConfig;
use crate::core::error::{CoreError, CoreResult};

/// 计费周期长度
pub const BILLING_PERIOD_DAYS: i64 = 30;

#[derive(Clone)]
pub struct SubscriptionService {
    pool: SqlitePool,
    billing: BillingConfig,
}

impl SubscriptionService {
    pub fn new(pool: SqlitePool, billing: BillingConfig) -> Self {
        Self { pool, billing }
    }

    pub fn grace_days(&self) -> i64 {
        self.billing.grace_days
    }

    pub fn webhook_secret(&self) -> &str {
        &self.billing.webhook_secret
    }

    pub async fn get(&self, company_id: i64) -> CoreResult<Subscription> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions WHERE company_id = ?",
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(Subscription::from)
            .unwrap_or_else(|| Subscription::empty(company_id)))
    }

    pub async fn list_all(&self) -> CoreResult<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions ORDER BY company_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn save(&self, sub: &Subscription) -> CoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::write(&mut *conn, sub).await
    }

    async fn write(conn: &mut SqliteConnection, sub: &Subscription) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO subscriptions
                (company_id, plan, status, trial_end, current_period_end, cancel_at_period_end,
                 canceled_at, checkout_session, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(company_id) DO UPDATE SET
                plan = excluded.plan,
                status = excluded.status,
                trial_end = excluded.trial_end,
                current_period_end = excluded.current_period_end,
                cancel_at_period_end = excluded.cancel_at_period_end,
                canceled_at = excluded.canceled_at,
                checkout_session = excluded.checkout_session,
                updated_at = excluded.updated_at",
        )
        .bind(sub.company_id)
        .bind(sub.plan.map(|p| p.as_str()))
        .bind(sub.status.as_str())
        .bind(sub.trial_end)
        .bind(sub.current_period_end)
        .bind(sub.cancel_at_period_end)
        .bind(sub.canceled_at)
        .bind(sub.checkout_session.as_deref())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// 发起订阅，返回托管收银台地址
    pub async fn subscribe(&self, company_id: i64, plan: PlanId) -> CoreResult<(Subscription, String)> {
        let now = Utc::now();
        let mut sub = self.get(company_id).await?;
        if sub.effective_status(now).is_active() {
            return Err(CoreError::conflict(
                "Company already has an active subscription; use change-plan instead",
            ));
        }

        let session = Uuid::new_v4().simple().to_string();
        sub.plan = Some(plan);
        sub.status = SubscriptionStatus::Pending;
        sub.cancel_at_period_end = false;
        sub.checkout_session = Some(session.clone());
        self.save(&sub).await?;

        info!("商户 {} 发起订阅: plan={}", company_id, plan.as_str());
        let url = format!(
            "{}?session={}&plan={}&company={}",
            self.billing.checkout_base_url,
            session,
            plan.as_str(),
            company_id
        );
        Ok((sub, url))
    }

    /// 周期末取消
    pub async fn cancel(&self, company_id: i64) -> CoreResult<Subscription> {
        let now = Utc::now();
        let mut sub = self.get(company_id).await?;
        if !sub.effective_status(now).is_active() {
            return Err(CoreError::bad_request("No active subscription to cancel"));
        }
        if sub.cancel_at_period_end {
            return Err(CoreError::bad_request("Subscription is already scheduled for cancellation"));
        }

        sub.cancel_at_period_end = true;
        sub.canceled_at = Some(now);
        self.save(&sub).await?;
        info!("商户 {} 申请在周期末取消订阅", company_id);
        Ok(sub)
    }

    pub async fn reactivate(&self, company_id: i64) -> CoreResult<Subscription> {
        let now = Utc::now();
        let mut sub = self.get(company_id).await?;
        if !sub.cancel_at_period_end || !sub.effective_status(now).is_active() {
            return Err(CoreError::bad_request("Subscription is not pending cancellation"));
        }

        sub.cancel_at_period_end = false;
        sub.canceled_at = None;
        self.save(&sub).await?;
        info!("商户 {} 恢复订阅", company_id);
        Ok(sub)
    }

    pub async fn change_plan(&self, company_id: i64, plan: PlanId) -> CoreResult<Subscription> {
        let mut sub = self.get(company_id).await?;
        if !sub.effective_status(Utc::now()).is_active() {
            return Err(CoreError::bad_request("Plan changes require an active subscription"));
        }
        if sub.plan == Some(plan) {
            return Err(CoreError::bad_request("Company is already on this plan"));
        }

        sub.plan = Some(plan);
        self.save(&sub).await?;
        info!("商户 {} 变更套餐: {}", company_id, plan.as_str());
        Ok(sub)
    }

    pub fn portal_url(&self, company_id: i64) -> String {
        format!("{}?company={}", self.billing.portal_base_url, company_id)
    }

    /// 处理支付回调；重复事件返回 `false` 且不产生副作用
    ///
    /// 事件 id 与订阅变更在同一事务中写入，处理失败的事件可以重试。
    pub async fn apply_webhook(&self, event: &WebhookEvent) -> CoreResult<bool> {
        let seen: Option<String> =
            sqlx::query_scalar("SELECT event_id FROM billing_events WHERE event_id = ?")
                .bind(&event.id)
                .fetch_optional(&self.pool)
                .await?;
        if seen.is_some() {
            info!("忽略重复的计费事件: {}", event.id);
            return Ok(false);
        }

        let now = Utc::now();
        let (sub, payment) = self.apply_event(self.get(event.company_id).await?, event, now)?;
        let amount = payment.map(|_| {
            event
                .amount
                .or_else(|| sub.plan.map(|p| p.plan().price))
                .unwrap_or(0.0)
        });

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO billing_events
                (event_id, company_id, event_type, plan, amount, payment_status, received_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id)
        .bind(event.company_id)
        .bind(&event.event_type)
        .bind(sub.plan.map(|p| p.as_str()))
        .bind(amount)
        .bind(payment.map(|p| p.as_str()))
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if inserted == 0 {
            tx.rollback().await?;
            info!("忽略重复的计费事件: {}", event.id);
            return Ok(false);
        }
        Self::write(&mut *tx, &sub).await?;
        tx.commit().await?;

        info!(
            "计费事件 {} ({}) 已应用: 商户 {} -> {}",
            event.id,
            event.event_type,
            event.company_id,
            sub.status.as_str()
        );
        Ok(true)
    }

    /// 计算事件应用后的订阅，以及该事件是否构成一次收款
    fn apply_event(
        &self,
        mut sub: Subscription,
        event: &WebhookEvent,
        now: DateTime<Utc>,
    ) -> CoreResult<(Subscription, Option<PaymentStatus>)> {
        if event.amount.map_or(false, |a| a < 0.0) {
            return Err(CoreError::bad_request("Payment amount cannot be negative"));
        }
        let event_plan = event.plan.as_deref().and_then(PlanId::parse);
        let mut payment = None;

        match event.event_type.as_str() {
            "checkout.completed" => {
                let plan = event_plan
                    .or(sub.plan)
                    .ok_or_else(|| CoreError::bad_request("Checkout event without plan"))?;
                sub.plan = Some(plan);
                sub.checkout_session = None;
                sub.cancel_at_period_end = false;
                sub.canceled_at = None;
                if plan.plan().has_trial && self.billing.trial_days > 0 && sub.trial_end.is_none() {
                    sub.status = SubscriptionStatus::Trialing;
                    sub.trial_end = Some(now + Duration::days(self.billing.trial_days));
                } else {
                    sub.status = SubscriptionStatus::Active;
                    sub.current_period_end = Some(now + Duration::days(BILLING_PERIOD_DAYS));
                    payment = Some(PaymentStatus::Paid);
                }
            }
            "invoice.paid" => {
                sub.status = SubscriptionStatus::Active;
                sub.current_period_end = Some(extend_from(sub.current_period_end, now, BILLING_PERIOD_DAYS));
                payment = Some(PaymentStatus::Paid);
            }
            "invoice.payment_failed" => {
                sub.status = SubscriptionStatus::PastDue;
                payment = Some(PaymentStatus::Failed);
            }
            "subscription.deleted" => {
                sub.status = SubscriptionStatus::Canceled;
                sub.cancel_at_period_end = false;
                sub.canceled_at = Some(now);
            }
            other => {
                return Err(CoreError::bad_request(format!("Unsupported event type: {}", other)));
            }
        }
        Ok((sub, payment))
    }

    /// 平台延长订阅（试用中则延长试用期）
    pub async fn extend(&self, company_id: i64, days: i64) -> CoreResult<Subscription> {
        if !(1..=365).contains(&days) {
            return Err(CoreError::bad_request("Days must be between 1 and 365"));
        }
        let now = Utc::now();
        let mut sub = self.get(company_id).await?;

        if sub.effective_status(now) == SubscriptionStatus::Trialing {
            sub.trial_end = Some(extend_from(sub.trial_end, now, days));
        } else {
            sub.status = SubscriptionStatus::Active;
            sub.current_period_end = Some(extend_from(sub.current_period_end, now, days));
            if sub.plan.is_none() {
                sub.plan = Some(PlanId::Basic);
            }
        }
        self.save(&sub).await?;
        info!("平台为商户 {} 延长订阅 {} 天", company_id, days);
        Ok(sub)
    }

    /// 平台直接变更套餐，不校验状态
    pub async fn admin_change_plan(&self, company_id: i64, plan: PlanId) -> CoreResult<Subscription> {
        let mut sub = self.get(company_id).await?;
        sub.plan = Some(plan);
        self.save(&sub).await?;
        Ok(sub)
    }

    /// 平台立即取消订阅
    pub async fn admin_cancel(&self, company_id: i64) -> CoreResult<Subscription> {
        let mut sub = self.get(company_id).await?;
        sub.status = SubscriptionStatus::Canceled;
        sub.cancel_at_period_end = false;
        sub.canceled_at = Some(Utc::now());
        self.save(&sub).await?;
        Ok(sub)
    }
}

/// 从 `max(current, now)` 起延长若干天
fn extend_from(current: Option<DateTime<Utc>>, now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    current.filter(|end| *end > now).unwrap_or(now) + Duration::days(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_from_future_end() {
        let now = Utc::now();
        let end = now + Duration::days(5);
        assert_eq!(extend_from(Some(end), now, 10), end + Duration::days(10));
    }

    #[test]
    fn test_extend_from_past_end_starts_now() {
        let now = Utc::now();
        let end = now - Duration::days(5);
        assert_eq!(extend_from(Some(end), now, 10), now + Duration::days(10));
        assert_eq!(extend_from(None, now, 1), now + Duration::days(1));
    }
}
