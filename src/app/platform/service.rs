//! 平台管理服务：商户、订阅与经营概览

use chrono::{DateTime, Datelike, Duration, Utc};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use super::model::{
    AnalyticsOverview, CompanyCounts, CompanyDetail, CompanyRow, CompanyStatusFilter,
    MonthlyRevenue, Payment, PaymentRow, PaymentStats, PeriodTotals, PlatformCompany,
    PlatformSubscription, SubscriptionBrief,
};
use crate::app::accounts::model::{Company, UpdateBusinessRequest};
use crate::app::accounts::AccountService;
use crate::app::subscriptions::model::{PaymentStatus, PlanId, Subscription, SubscriptionStatus};
use crate::app::subscriptions::SubscriptionService;
use crate::core::auth::ROLE_ADMIN;
use crate::core::error::{CoreError, CoreResult};
use crate::core::response::PageWindow;

const DEFAULT_SUSPEND_REASON: &str = "Suspended by platform administrator";
pub const DEFAULT_EXPIRING_DAYS: i64 = 7;
pub const MAX_EXPIRING_DAYS: i64 = 90;
const RECENT_PAYMENTS: i64 = 20;
const STATS_MONTHS: usize = 12;

const PAYMENT_SELECT: &str = "SELECT e.event_id, e.company_id, c.business_name, e.event_type, e.plan,
        e.amount, e.payment_status, e.received_at
     FROM billing_events e
     LEFT JOIN companies c ON c.id = e.company_id
     WHERE e.payment_status IS NOT NULL";

const COMPANY_SELECT: &str = "SELECT c.id, c.business_name, c.slug, c.suspended, c.suspended_reason,
        c.created_at, u.name AS owner_name, u.email AS owner_email
     FROM companies c
     LEFT JOIN users u ON u.id = (
         SELECT MIN(id) FROM users WHERE company_id = c.id AND role = ?1)";

#[derive(Clone)]
pub struct PlatformService {
    pool: SqlitePool,
    accounts: AccountService,
    subscriptions: SubscriptionService,
}

impl PlatformService {
    pub fn new(pool: SqlitePool, accounts: AccountService, subscriptions: SubscriptionService) -> Self {
        Self {
            pool,
            accounts,
            subscriptions,
        }
    }

    async fn company_rows(&self, pattern: Option<String>) -> CoreResult<Vec<CompanyRow>> {
        Ok(sqlx::query_as::<_, CompanyRow>(&format!(
            "{} WHERE (?2 IS NULL OR LOWER(c.business_name) LIKE ?2 OR LOWER(c.slug) LIKE ?2
                   OR LOWER(u.email) LIKE ?2)
             ORDER BY c.created_at DESC, c.id DESC",
            COMPANY_SELECT
        ))
        .bind(ROLE_ADMIN)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn subscription_map(&self) -> CoreResult<HashMap<i64, Subscription>> {
        Ok(self
            .subscriptions
            .list_all()
            .await?
            .into_iter()
            .map(|s| (s.company_id, s))
            .collect())
    }

    /// 商户列表；状态筛选基于订阅的实际状态，因此在内存中过滤与分页
    pub async fn list_companies(
        &self,
        pattern: Option<String>,
        status: Option<CompanyStatusFilter>,
        window: PageWindow,
    ) -> CoreResult<(Vec<PlatformCompany>, i64)> {
        let now = Utc::now();
        let rows = self.company_rows(pattern).await?;
        let mut subs = self.subscription_map().await?;

        let companies: Vec<PlatformCompany> = rows
            .into_iter()
            .map(|row| {
                let sub = subs
                    .remove(&row.id)
                    .unwrap_or_else(|| Subscription::empty(row.id));
                platform_company(row, &sub, now)
            })
            .filter(|c| match status {
                None => true,
                Some(CompanyStatusFilter::Suspended) => c.suspended,
                Some(CompanyStatusFilter::Subscription(s)) => c.subscription.status == s,
            })
            .collect();

        let total = companies.len() as i64;
        let page = companies
            .into_iter()
            .skip(window.offset() as usize)
            .take(window.limit() as usize)
            .collect();
        Ok((page, total))
    }

    pub async fn company_detail(&self, company_id: i64) -> CoreResult<CompanyDetail> {
        let company = self.accounts.get_company(company_id).await?;
        let owner: Option<(String, String)> = sqlx::query_as(
            "SELECT name, email FROM users WHERE company_id = ? AND role = ? ORDER BY id LIMIT 1",
        )
        .bind(company_id)
        .bind(ROLE_ADMIN)
        .fetch_optional(&self.pool)
        .await?;

        let counts = self.counts(company_id).await?;
        let sub = self.subscriptions.get(company_id).await?;
        let now = Utc::now();
        let (owner_name, owner_email) = owner.unzip();

        Ok(CompanyDetail {
            company,
            owner_name,
            owner_email,
            subscription: sub.view(now),
            mrr: sub.mrr(now),
            counts,
        })
    }

    async fn counts(&self, company_id: i64) -> CoreResult<CompanyCounts> {
        let (clients, professionals, services, appointments): (i64, i64, i64, i64) =
            sqlx::query_as(
                "SELECT
                    (SELECT COUNT(*) FROM clients WHERE company_id = ?1),
                    (SELECT COUNT(*) FROM professionals WHERE company_id = ?1),
                    (SELECT COUNT(*) FROM services WHERE company_id = ?1),
                    (SELECT COUNT(*) FROM appointments WHERE company_id = ?1)",
            )
            .bind(company_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(CompanyCounts {
            clients,
            professionals,
            services,
            appointments,
        })
    }

    /// 平台修改商户资料
    pub async fn update_company(
        &self,
        company_id: i64,
        req: UpdateBusinessRequest,
    ) -> CoreResult<Company> {
        let company = self.accounts.update_business(company_id, req).await?;
        info!("平台更新商户 {} 资料", company_id);
        Ok(company)
    }

    pub async fn suspend(&self, company_id: i64, reason: Option<String>) -> CoreResult<Company> {
        let reason = reason.unwrap_or_else(|| DEFAULT_SUSPEND_REASON.to_string());
        self.set_suspended(company_id, true, Some(reason.clone())).await?;
        warn!("商户 {} 已被暂停: {}", company_id, reason);
        self.accounts.get_company(company_id).await
    }

    pub async fn activate(&self, company_id: i64) -> CoreResult<Company> {
        self.set_suspended(company_id, false, None).await?;
        info!("商户 {} 已恢复", company_id);
        self.accounts.get_company(company_id).await
    }

    async fn set_suspended(
        &self,
        company_id: i64,
        suspended: bool,
        reason: Option<String>,
    ) -> CoreResult<()> {
        let updated = sqlx::query(
            "UPDATE companies SET suspended = ?, suspended_reason = ?, updated_at = ? WHERE id = ?",
        )
        .bind(suspended)
        .bind(reason)
        .bind(Utc::now())
        .bind(company_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(CoreError::not_found("Company not found"));
        }
        Ok(())
    }

    /// 有订阅记录的商户，可按实际状态筛选
    pub async fn list_subscriptions(
        &self,
        status: Option<SubscriptionStatus>,
    ) -> CoreResult<Vec<PlatformSubscription>> {
        let now = Utc::now();
        let names = self.company_names().await?;

        Ok(self
            .subscriptions
            .list_all()
            .await?
            .into_iter()
            .filter(|s| status.map_or(true, |wanted| s.effective_status(now) == wanted))
            .filter_map(|s| platform_subscription(&names, &s, now))
            .collect())
    }

    /// 在 `days` 天内到期（试用或计费周期）的有效订阅，最早到期的在前
    pub async fn expiring(&self, days: i64) -> CoreResult<Vec<PlatformSubscription>> {
        if !(1..=MAX_EXPIRING_DAYS).contains(&days) {
            return Err(CoreError::bad_request(format!(
                "days must be between 1 and {}",
                MAX_EXPIRING_DAYS
            )));
        }
        let now = Utc::now();
        let horizon = now + Duration::days(days);
        let names = self.company_names().await?;

        let mut subs: Vec<Subscription> = self
            .subscriptions
            .list_all()
            .await?
            .into_iter()
            .filter(|s| s.effective_status(now).is_active())
            .filter(|s| s.period_end().map_or(false, |end| end > now && end <= horizon))
            .collect();
        subs.sort_by_key(|s| s.period_end());

        Ok(subs
            .iter()
            .filter_map(|s| platform_subscription(&names, s, now))
            .collect())
    }

    async fn company_names(&self) -> CoreResult<HashMap<i64, (String, String)>> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, business_name, slug FROM companies")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, slug)| (id, (name, slug)))
            .collect())
    }

    /// 单个商户的订阅与最近的收款记录
    pub async fn subscription_detail(
        &self,
        company_id: i64,
    ) -> CoreResult<(PlatformSubscription, Vec<Payment>)> {
        let company = self.accounts.get_company(company_id).await?;
        let sub = self.subscriptions.get(company_id).await?;
        let now = Utc::now();
        let subscription = PlatformSubscription {
            company_id,
            business_name: company.business_name,
            slug: company.slug,
            subscription: sub.view(now),
            mrr: sub.mrr(now),
        };
        let (payments, _) = self
            .payments(None, Some(company_id), Some((RECENT_PAYMENTS, 0)))
            .await?;
        Ok((subscription, payments))
    }

    /// 收款记录，最新的在前
    pub async fn list_payments(
        &self,
        status: Option<PaymentStatus>,
        company_id: Option<i64>,
        window: PageWindow,
    ) -> CoreResult<(Vec<Payment>, i64)> {
        self.payments(status, company_id, Some((window.limit(), window.offset())))
            .await
    }

    async fn payments(
        &self,
        status: Option<PaymentStatus>,
        company_id: Option<i64>,
        window: Option<(i64, i64)>,
    ) -> CoreResult<(Vec<Payment>, i64)> {
        let status = status.map(|s| s.as_str());
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM billing_events
             WHERE payment_status IS NOT NULL
               AND (?1 IS NULL OR payment_status = ?1)
               AND (?2 IS NULL OR company_id = ?2)",
        )
        .bind(status)
        .bind(company_id)
        .fetch_one(&self.pool)
        .await?;

        let (limit, offset) = window.unwrap_or((-1, 0));
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "{} AND (?1 IS NULL OR e.payment_status = ?1) AND (?2 IS NULL OR e.company_id = ?2)
             ORDER BY e.received_at DESC, e.event_id DESC
             LIMIT ?3 OFFSET ?4",
            PAYMENT_SELECT
        ))
        .bind(status)
        .bind(company_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows.into_iter().map(Payment::from).collect(), total))
    }

    pub async fn payment_stats(&self) -> CoreResult<PaymentStats> {
        let (payments, _) = self.payments(None, None, None).await?;
        Ok(summarize_payments(Utc::now(), &payments))
    }

    pub async fn change_plan(&self, company_id: i64, plan: PlanId) -> CoreResult<Subscription> {
        self.accounts.get_company(company_id).await?;
        let sub = self.subscriptions.admin_change_plan(company_id, plan).await?;
        info!("平台变更商户 {} 套餐为 {}", company_id, plan.as_str());
        Ok(sub)
    }

    pub async fn extend(&self, company_id: i64, days: i64) -> CoreResult<Subscription> {
        self.accounts.get_company(company_id).await?;
        self.subscriptions.extend(company_id, days).await
    }

    pub async fn cancel(&self, company_id: i64, reason: Option<String>) -> CoreResult<Subscription> {
        self.accounts.get_company(company_id).await?;
        let sub = self.subscriptions.admin_cancel(company_id).await?;
        warn!(
            "平台取消商户 {} 的订阅: {}",
            company_id,
            reason.as_deref().unwrap_or("-")
        );
        Ok(sub)
    }

    pub async fn overview(&self) -> CoreResult<AnalyticsOverview> {
        let (total, suspended): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN suspended THEN 1 ELSE 0 END), 0) FROM companies",
        )
        .fetch_one(&self.pool)
        .await?;
        let subs = self.subscriptions.list_all().await?;
        Ok(summarize_overview(Utc::now(), total, suspended, &subs))
    }
}

fn platform_company(row: CompanyRow, sub: &Subscription, now: DateTime<Utc>) -> PlatformCompany {
    PlatformCompany {
        id: row.id,
        business_name: row.business_name,
        slug: row.slug,
        owner_name: row.owner_name,
        owner_email: row.owner_email,
        subscription: SubscriptionBrief {
            plan: sub.plan,
            status: sub.effective_status(now),
        },
        mrr: sub.mrr(now),
        suspended: row.suspended,
        suspended_reason: row.suspended_reason,
        created_at: row.created_at,
    }
}

fn platform_subscription(
    names: &HashMap<i64, (String, String)>,
    sub: &Subscription,
    now: DateTime<Utc>,
) -> Option<PlatformSubscription> {
    let (business_name, slug) = names.get(&sub.company_id)?.clone();
    Some(PlatformSubscription {
        company_id: sub.company_id,
        business_name,
        slug,
        subscription: sub.view(now),
        mrr: sub.mrr(now),
    })
}

/// 平台概览
///
/// 本月取消数按取消时间（懒转换的取消按周期结束时间）计入当月；
/// 流失率 = 本月取消 / (当前有效 + 本月取消)。
pub fn summarize_overview(
    now: DateTime<Utc>,
    total_companies: i64,
    suspended_companies: i64,
    subs: &[Subscription],
) -> AnalyticsOverview {
    let mut overview = AnalyticsOverview {
        total_companies,
        suspended_companies,
        ..Default::default()
    };

    for sub in subs {
        match sub.effective_status(now) {
            SubscriptionStatus::Active => overview.active_companies += 1,
            SubscriptionStatus::Trialing => overview.trial_companies += 1,
            SubscriptionStatus::PastDue => overview.past_due_companies += 1,
            SubscriptionStatus::Canceled => {
                let at = sub.canceled_at.or_else(|| sub.period_end());
                if at.map_or(false, |at| at.year() == now.year() && at.month() == now.month()) {
                    overview.canceled_this_month += 1;
                }
            }
            _ => {}
        }
        overview.total_mrr += sub.mrr(now);
    }

    let base = overview.active_companies + overview.trial_companies + overview.canceled_this_month;
    if base > 0 {
        let rate = overview.canceled_this_month as f64 * 100.0 / base as f64;
        overview.churn_rate = (rate * 10.0).round() / 10.0;
    }
    overview
}

/// 收款统计：只有成功的收款计入收入，按月汇总保留最近 12 个月
pub fn summarize_payments(now: DateTime<Utc>, payments: &[Payment]) -> PaymentStats {
    let mut stats = PaymentStats::default();
    let mut months: BTreeMap<String, (i64, f64)> = BTreeMap::new();
    let since = now - Duration::days(30);

    for payment in payments {
        if payment.status == PaymentStatus::Failed {
            stats.failed_payments += 1;
            continue;
        }
        stats.total_payments += 1;
        stats.total_revenue += payment.amount;
        if payment.paid_at >= since {
            stats.last_30_days.count += 1;
            stats.last_30_days.revenue += payment.amount;
        }
        let month = months
            .entry(payment.paid_at.format("%Y-%m").to_string())
            .or_insert((0, 0.0));
        month.0 += 1;
        month.1 += payment.amount;
    }

    let skip = months.len().saturating_sub(STATS_MONTHS);
    stats.monthly = months
        .into_iter()
        .skip(skip)
        .map(|(month, (count, revenue))| MonthlyRevenue {
            month,
            count,
            revenue,
        })
        .collect();
    stats
}
