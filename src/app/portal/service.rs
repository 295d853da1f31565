//! 专业人员门户服务
//!
//! 门户令牌的 subject 是专业人员 id，所有预约操作都限定在本人名下。

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};

use super::model::{PeriodStats, PortalClient, PortalStats};
use crate::app::accounts::AccountService;
use crate::app::appointments::model::{
    AppointmentDetail, AppointmentFilter, AppointmentStatus, CompleteRequest,
};
use crate::app::appointments::service::summarize;
use crate::app::appointments::AppointmentService;
use crate::app::professionals::model::Professional;
use crate::app::professionals::ProfessionalService;
use crate::app::scheduling::today;
use crate::core::auth::{
    hash_password, verify_password, TokenKind, TokenService, ROLE_PROFESSIONAL,
};
use crate::core::error::{CoreError, CoreResult};
use crate::core::response::PageWindow;

const UPCOMING_DAYS: i64 = 30;
const UPCOMING_LIMIT: usize = 5;

const CLIENT_SELECT: &str = "SELECT c.id, c.name, c.phone, c.email,
        COUNT(a.id) AS appointment_count, MAX(a.appointment_date) AS last_appointment
     FROM clients c
     JOIN appointments a ON a.client_id = c.id
     WHERE c.company_id = ?1 AND a.professional_id = ?2";

#[derive(Clone)]
pub struct PortalService {
    pool: SqlitePool,
    tokens: TokenService,
    accounts: AccountService,
    professionals: ProfessionalService,
    appointments: AppointmentService,
}

impl PortalService {
    pub fn new(
        pool: SqlitePool,
        tokens: TokenService,
        accounts: AccountService,
        professionals: ProfessionalService,
        appointments: AppointmentService,
    ) -> Self {
        Self {
            pool,
            tokens,
            accounts,
            professionals,
            appointments,
        }
    }

    /// 用邀请令牌设置密码并开通门户，令牌一次性有效
    pub async fn activate(&self, token: &str, password: &str) -> CoreResult<(Professional, String)> {
        let row: Option<(i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT professional_id, expires_at FROM activation_tokens WHERE token = ?",
        )
        .bind(token.trim())
        .fetch_optional(&self.pool)
        .await?;

        let Some((professional_id, expires_at)) = row else {
            return Err(CoreError::bad_request("Invalid activation token"));
        };
        if expires_at <= Utc::now() {
            sqlx::query("DELETE FROM activation_tokens WHERE token = ?")
                .bind(token.trim())
                .execute(&self.pool)
                .await?;
            return Err(CoreError::bad_request("Activation token has expired"));
        }

        let professional = self
            .professionals
            .find(professional_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Professional not found"))?;
        let email = professional
            .email
            .clone()
            .ok_or_else(|| CoreError::bad_request("Professional has no email address"))?;

        self.professionals
            .ensure_portal_email_free(&email, professional_id)
            .await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE professionals SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(hash_password(password)?)
            .bind(Utc::now())
            .bind(professional_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM activation_tokens WHERE professional_id = ?")
            .bind(professional_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("专业人员 {} 已开通门户", professional_id);
        let professional = self.professionals.get(professional.company_id, professional_id).await?;
        let access_token = self.issue(&professional)?;
        Ok((professional, access_token))
    }

    pub async fn login(&self, email: &str, password: &str) -> CoreResult<(Professional, String)> {
        let email = email.trim().to_lowercase();
        let found = sqlx::query_as::<_, Professional>(
            "SELECT * FROM professionals WHERE LOWER(email) = ? AND password_hash IS NOT NULL",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        let professional = match found {
            Some(p) if p.password_hash.as_deref().map_or(false, |h| verify_password(password, h)) => p,
            _ => {
                warn!("门户登录失败: {}", email);
                return Err(CoreError::unauthorized("Invalid email or password"));
            }
        };

        self.ensure_access(&professional).await?;
        let access_token = self.issue(&professional)?;
        Ok((professional, access_token))
    }

    /// 停用的专业人员或被暂停的商户不能使用门户
    pub async fn ensure_access(&self, professional: &Professional) -> CoreResult<()> {
        if !professional.active {
            return Err(CoreError::forbidden("This professional account is inactive"));
        }
        let company = self.accounts.get_company(professional.company_id).await?;
        if company.suspended {
            return Err(CoreError::forbidden("This company account is suspended"));
        }
        Ok(())
    }

    /// 校验门户令牌对应的专业人员仍然存在且可用
    pub async fn authorize(&self, company_id: i64, professional_id: i64) -> CoreResult<()> {
        let professional = self
            .professionals
            .find(professional_id)
            .await?
            .filter(|p| p.company_id == company_id && p.portal_enabled())
            .ok_or_else(|| CoreError::unauthorized("Professional account not found"))?;
        self.ensure_access(&professional).await
    }

    fn issue(&self, professional: &Professional) -> CoreResult<String> {
        self.tokens.issue(
            professional.id,
            Some(professional.company_id),
            ROLE_PROFESSIONAL,
            TokenKind::Professional,
        )
    }

    pub async fn change_password(
        &self,
        company_id: i64,
        professional_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> CoreResult<()> {
        let professional = self.professionals.get(company_id, professional_id).await?;
        let valid = professional
            .password_hash
            .as_deref()
            .map_or(false, |h| verify_password(current_password, h));
        if !valid {
            return Err(CoreError::bad_request("Current password is incorrect"));
        }

        sqlx::query("UPDATE professionals SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(hash_password(new_password)?)
            .bind(Utc::now())
            .bind(professional_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn business_name(&self, company_id: i64) -> CoreResult<String> {
        Ok(self.accounts.get_company(company_id).await?.business_name)
    }

    pub async fn dashboard(
        &self,
        company_id: i64,
        professional_id: i64,
    ) -> CoreResult<(PortalStats, Vec<AppointmentDetail>, Vec<AppointmentDetail>)> {
        let today = today();
        let week_start = week_start(today);
        let (month_start, month_end) = month_bounds(today);

        let recent = self
            .appointments
            .list_all(
                company_id,
                &AppointmentFilter {
                    start_date: Some(week_start.min(month_start)),
                    end_date: Some((week_start + Duration::days(6)).max(month_end)),
                    professional_id: Some(professional_id),
                    ..Default::default()
                },
            )
            .await?;
        let stats = portal_stats(today, &recent);

        let today_schedule = recent
            .iter()
            .filter(|d| {
                d.appointment.appointment_date == today
                    && d.appointment.status != AppointmentStatus::Cancelled.as_str()
            })
            .cloned()
            .collect();

        let mut upcoming = self
            .appointments
            .list_all(
                company_id,
                &AppointmentFilter {
                    start_date: Some(today + Duration::days(1)),
                    end_date: Some(today + Duration::days(UPCOMING_DAYS)),
                    professional_id: Some(professional_id),
                    status: Some(AppointmentStatus::Scheduled),
                    ..Default::default()
                },
            )
            .await?;
        upcoming.truncate(UPCOMING_LIMIT);

        Ok((stats, today_schedule, upcoming))
    }

    pub async fn schedule(
        &self,
        company_id: i64,
        professional_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<Vec<AppointmentDetail>> {
        self.appointments
            .list_all(
                company_id,
                &AppointmentFilter {
                    start_date: Some(start),
                    end_date: Some(end),
                    professional_id: Some(professional_id),
                    ..Default::default()
                },
            )
            .await
    }

    /// 本人名下的预约分页列表，最新的在前
    pub async fn appointments(
        &self,
        company_id: i64,
        professional_id: i64,
        filter: AppointmentFilter,
        window: PageWindow,
    ) -> CoreResult<(Vec<AppointmentDetail>, i64)> {
        let filter = AppointmentFilter {
            professional_id: Some(professional_id),
            ..filter
        };
        self.appointments.list(company_id, &filter, window).await
    }

    pub async fn clients(
        &self,
        company_id: i64,
        professional_id: i64,
        pattern: Option<String>,
        window: PageWindow,
    ) -> CoreResult<(Vec<PortalClient>, i64)> {
        let search = "(?3 IS NULL OR LOWER(c.name) LIKE ?3 OR c.phone LIKE ?3 OR LOWER(c.email) LIKE ?3)";
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(DISTINCT c.id) FROM clients c
             JOIN appointments a ON a.client_id = c.id
             WHERE c.company_id = ?1 AND a.professional_id = ?2 AND {}",
            search
        ))
        .bind(company_id)
        .bind(professional_id)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let clients = sqlx::query_as::<_, PortalClient>(&format!(
            "{} AND {} GROUP BY c.id ORDER BY c.name COLLATE NOCASE, c.id LIMIT ?4 OFFSET ?5",
            CLIENT_SELECT, search
        ))
        .bind(company_id)
        .bind(professional_id)
        .bind(&pattern)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok((clients, total))
    }

    /// 客户与本人之间的预约历史；没有往来的客户视为不存在
    pub async fn client(
        &self,
        company_id: i64,
        professional_id: i64,
        client_id: i64,
    ) -> CoreResult<(PortalClient, Vec<AppointmentDetail>)> {
        let client = sqlx::query_as::<_, PortalClient>(&format!(
            "{} AND c.id = ?3 GROUP BY c.id",
            CLIENT_SELECT
        ))
        .bind(company_id)
        .bind(professional_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::not_found("Client not found"))?;

        let mut history = self
            .appointments
            .list_all(
                company_id,
                &AppointmentFilter {
                    professional_id: Some(professional_id),
                    client_id: Some(client_id),
                    ..Default::default()
                },
            )
            .await?;
        history.reverse();
        Ok((client, history))
    }

    pub async fn period_stats(
        &self,
        company_id: i64,
        professional_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<PeriodStats> {
        let rows = self.schedule(company_id, professional_id, start, end).await?;
        Ok(period_stats(start, end, &rows))
    }

    /// 只返回本人名下的预约，其他人的预约视为不存在
    pub async fn own_appointment(
        &self,
        company_id: i64,
        professional_id: i64,
        id: i64,
    ) -> CoreResult<AppointmentDetail> {
        let detail = self.appointments.get_detail(company_id, id).await?;
        if detail.appointment.professional_id != professional_id {
            return Err(CoreError::not_found("Appointment not found"));
        }
        Ok(detail)
    }

    pub async fn complete(
        &self,
        company_id: i64,
        professional_id: i64,
        id: i64,
        req: CompleteRequest,
    ) -> CoreResult<AppointmentDetail> {
        self.own_appointment(company_id, professional_id, id).await?;
        self.appointments.complete(company_id, id, req).await
    }

    pub async fn cancel(
        &self,
        company_id: i64,
        professional_id: i64,
        id: i64,
        reason: Option<String>,
    ) -> CoreResult<AppointmentDetail> {
        self.own_appointment(company_id, professional_id, id).await?;
        self.appointments.cancel(company_id, id, reason).await
    }
}

/// 当周周一
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// 当月第一天与最后一天
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let next_month = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    };
    let last = next_month.map_or(date, |d| d - Duration::days(1));
    (first, last)
}

/// 今日与本周只统计未取消的预约；完成率按本月全部预约计算
pub fn portal_stats(today: NaiveDate, appointments: &[AppointmentDetail]) -> PortalStats {
    let week_start = week_start(today);
    let week_end = week_start + Duration::days(6);
    let (month_start, month_end) = month_bounds(today);
    let cancelled = AppointmentStatus::Cancelled.as_str();
    let completed = AppointmentStatus::Completed.as_str();

    let mut stats = PortalStats::default();
    for detail in appointments {
        let a = &detail.appointment;
        let date = a.appointment_date;
        let active = a.status != cancelled;

        if active && date == today {
            stats.today_appointments += 1;
        }
        if active && date >= week_start && date <= week_end {
            stats.week_appointments += 1;
        }
        if date >= month_start && date <= month_end {
            stats.month_appointments += 1;
            if a.status == completed {
                stats.month_completed += 1;
                stats.month_revenue += a.price;
            } else if a.status == cancelled {
                stats.month_cancelled += 1;
            }
        }
    }

    if stats.month_appointments > 0 {
        let rate = stats.month_completed as f64 * 100.0 / stats.month_appointments as f64;
        stats.completion_rate = (rate * 10.0).round() / 10.0;
    }
    stats
}

/// 区间内本人预约的状态分布与收入
pub fn period_stats(start: NaiveDate, end: NaiveDate, appointments: &[AppointmentDetail]) -> PeriodStats {
    let count = |status: AppointmentStatus| {
        appointments
            .iter()
            .filter(|d| d.appointment.status == status.as_str())
            .count() as i64
    };
    let completed: Vec<AppointmentDetail> = appointments
        .iter()
        .filter(|d| d.appointment.status == AppointmentStatus::Completed.as_str())
        .cloned()
        .collect();
    let report = summarize(start, end, &completed);

    let total_appointments = appointments.len() as i64;
    let completion_rate = if total_appointments > 0 {
        let rate = report.total_appointments as f64 * 100.0 / total_appointments as f64;
        (rate * 10.0).round() / 10.0
    } else {
        0.0
    };

    PeriodStats {
        start_date: start,
        end_date: end,
        total_appointments,
        completed: report.total_appointments,
        cancelled: count(AppointmentStatus::Cancelled),
        no_show: count(AppointmentStatus::NoShow),
        completion_rate,
        revenue: report.total_revenue,
        average_ticket: report.average_ticket,
        by_service: report.by_service,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::appointments::model::{
        Appointment, AppointmentDetail, ClientRef, ProfessionalRef, ServiceRef,
    };

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn detail(day: &str, status: &str, price: f64) -> AppointmentDetail {
        AppointmentDetail {
            appointment: Appointment {
                id: 1,
                company_id: 1,
                client_id: 1,
                professional_id: 1,
                service_id: 1,
                appointment_date: date(day),
                start_time: "09:00".to_string(),
                end_time: "09:30".to_string(),
                status: status.to_string(),
                notes: None,
                price,
                payment_method: None,
                booking_code: "ABCDEFGH".to_string(),
                source: "dashboard".to_string(),
                cancel_reason: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            client: ClientRef {
                id: 1,
                name: "Ana".to_string(),
                phone: None,
                email: None,
            },
            professional: ProfessionalRef {
                id: 1,
                name: "Bia".to_string(),
                color: "#3B82F6".to_string(),
            },
            service: ServiceRef {
                id: 1,
                name: "Corte".to_string(),
                color: "#10B981".to_string(),
                duration: 30,
            },
        }
    }

    #[test]
    fn test_week_and_month_bounds() {
        // 2024-05-15 是周三
        assert_eq!(week_start(date("2024-05-15")), date("2024-05-13"));
        assert_eq!(week_start(date("2024-05-13")), date("2024-05-13"));
        assert_eq!(month_bounds(date("2024-02-10")), (date("2024-02-01"), date("2024-02-29")));
        assert_eq!(month_bounds(date("2024-12-31")), (date("2024-12-01"), date("2024-12-31")));
    }

    #[test]
    fn test_portal_stats() {
        let today = date("2024-05-15");
        let rows = vec![
            detail("2024-05-15", "scheduled", 50.0),
            detail("2024-05-15", "cancelled", 50.0),
            detail("2024-05-14", "completed", 80.0),
            detail("2024-05-02", "completed", 40.0),
            detail("2024-05-20", "no_show", 30.0),
        ];

        let stats = portal_stats(today, &rows);
        assert_eq!(stats.today_appointments, 1);
        assert_eq!(stats.week_appointments, 2);
        assert_eq!(stats.month_appointments, 5);
        assert_eq!(stats.month_completed, 2);
        assert_eq!(stats.month_cancelled, 1);
        assert_eq!(stats.completion_rate, 40.0);
        assert_eq!(stats.month_revenue, 120.0);
    }

    #[test]
    fn test_period_stats() {
        let rows = vec![
            detail("2024-05-02", "completed", 40.0),
            detail("2024-05-03", "completed", 80.0),
            detail("2024-05-04", "cancelled", 50.0),
            detail("2024-05-05", "no_show", 30.0),
            detail("2024-05-06", "scheduled", 50.0),
            detail("2024-05-07", "pending", 50.0),
        ];

        let stats = period_stats(date("2024-05-01"), date("2024-05-31"), &rows);
        assert_eq!(stats.total_appointments, 6);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.no_show, 1);
        assert_eq!(stats.revenue, 120.0);
        assert_eq!(stats.average_ticket, 60.0);
        assert_eq!(stats.completion_rate, 33.3);
        assert_eq!(stats.by_service.len(), 1);
    }

    #[test]
    fn test_empty_month_has_zero_rate() {
        let stats = portal_stats(date("2024-05-15"), &[]);
        assert_eq!(stats, PortalStats::default());
    }
}
