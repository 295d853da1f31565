//! 专业人员业务服务：档案、服务关联、工作时间、停诊日期与门户邀请

use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

use super::model::{
    BlockedDate, Professional, ProfessionalRequest, ProfessionalStats, ProfessionalView,
    WorkingHourEntry, WorkingHourRow, DEFAULT_PROFESSIONAL_COLOR,
};
use crate::app::catalog::model::ServiceSummary;
use crate::app::scheduling::{parse_time, today};
use crate::app::subscriptions::SubscriptionService;
use crate::core::error::{CoreError, CoreResult};
use crate::core::response::PageWindow;

const LIST_FILTER: &str = "company_id = ?1
     AND (?2 IS NULL OR LOWER(name) LIKE ?2 OR LOWER(role) LIKE ?2 OR LOWER(COALESCE(email, '')) LIKE ?2)
     AND (?3 = 0 OR active = 1)";

/// 列表查询选项
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub pattern: Option<String>,
    pub active_only: bool,
    pub include_services: bool,
    pub include_stats: bool,
}

#[derive(Clone)]
pub struct ProfessionalService {
    pool: SqlitePool,
    subscriptions: SubscriptionService,
    activation_ttl: Duration,
}

impl ProfessionalService {
    pub fn new(
        pool: SqlitePool,
        subscriptions: SubscriptionService,
        activation_ttl_hours: i64,
    ) -> Self {
        Self {
            pool,
            subscriptions,
            activation_ttl: Duration::hours(activation_ttl_hours.max(1)),
        }
    }

    pub async fn list(
        &self,
        company_id: i64,
        options: &ListOptions,
        window: PageWindow,
    ) -> CoreResult<(Vec<ProfessionalView>, i64)> {
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM professionals WHERE {}",
            LIST_FILTER
        ))
        .bind(company_id)
        .bind(options.pattern.as_deref())
        .bind(options.active_only)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, Professional>(&format!(
            "SELECT * FROM professionals WHERE {}
             ORDER BY name COLLATE NOCASE, id LIMIT ?4 OFFSET ?5",
            LIST_FILTER
        ))
        .bind(company_id)
        .bind(options.pattern.as_deref())
        .bind(options.active_only)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&self.pool)
        .await?;

        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            views.push(self.view(row, options.include_services, options.include_stats).await?);
        }
        Ok((views, total))
    }

    pub async fn get(&self, company_id: i64, id: i64) -> CoreResult<Professional> {
        sqlx::query_as::<_, Professional>(
            "SELECT * FROM professionals WHERE id = ? AND company_id = ?",
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::not_found("Professional not found"))
    }

    /// 不限租户按 ID 查询，用于门户令牌
    pub async fn find(&self, id: i64) -> CoreResult<Option<Professional>> {
        Ok(
            sqlx::query_as::<_, Professional>("SELECT * FROM professionals WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn view(
        &self,
        professional: Professional,
        include_services: bool,
        include_stats: bool,
    ) -> CoreResult<ProfessionalView> {
        let services = if include_services {
            Some(self.services(professional.id).await?)
        } else {
            None
        };
        let stats = if include_stats {
            Some(self.stats(professional.id).await?)
        } else {
            None
        };
        Ok(ProfessionalView {
            portal_enabled: professional.portal_enabled(),
            professional,
            services,
            stats,
        })
    }

    async fn stats(&self, professional_id: i64) -> CoreResult<ProfessionalStats> {
        let stats = sqlx::query_as::<_, ProfessionalStats>(
            "SELECT COUNT(*) AS total_appointments,
                    COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed_appointments,
                    COALESCE(SUM(CASE WHEN status = 'completed' THEN price ELSE 0.0 END), 0.0) AS total_revenue
             FROM appointments WHERE professional_id = ?",
        )
        .bind(professional_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    pub async fn count_active(&self, company_id: i64) -> CoreResult<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM professionals WHERE company_id = ? AND active = 1",
        )
        .bind(company_id)
        .fetch_one(&self.pool)
        .await?)
    }

    /// 套餐在岗人数上限；每次由停用转为在岗前调用
    pub async fn ensure_capacity(&self, company_id: i64) -> CoreResult<()> {
        let sub = self.subscriptions.get(company_id).await?;
        let Some(max) = sub.plan.and_then(|p| p.plan().max_professionals) else {
            return Ok(());
        };
        if self.count_active(company_id).await? >= i64::from(max) {
            return Err(CoreError::forbidden(format!(
                "Your plan allows at most {} active professional(s)",
                max
            )));
        }
        Ok(())
    }

    /// 已开通门户的账号之间邮箱唯一
    pub async fn ensure_portal_email_free(&self, email: &str, exclude_id: i64) -> CoreResult<()> {
        let taken: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM professionals
             WHERE LOWER(email) = LOWER(?) AND password_hash IS NOT NULL AND id != ?",
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_optional(&self.pool)
        .await?;
        if taken.is_some() {
            return Err(CoreError::conflict(
                "Another professional account already uses this email",
            ));
        }
        Ok(())
    }

    pub async fn create(&self, company_id: i64, req: ProfessionalRequest) -> CoreResult<Professional> {
        if req.active.unwrap_or(true) {
            self.ensure_capacity(company_id).await?;
        }
        if let Some(ids) = &req.service_ids {
            self.ensure_services_belong(company_id, ids).await?;
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            "INSERT INTO professionals
                (company_id, name, role, phone, email, color, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(company_id)
        .bind(&req.name)
        .bind(&req.role)
        .bind(&req.phone)
        .bind(&req.email)
        .bind(req.color.as_deref().unwrap_or(DEFAULT_PROFESSIONAL_COLOR))
        .bind(req.active.unwrap_or(true))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        if let Some(ids) = &req.service_ids {
            for service_id in dedup(ids) {
                sqlx::query("INSERT INTO professional_services (professional_id, service_id) VALUES (?, ?)")
                    .bind(id)
                    .bind(service_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;

        info!("商户 {} 新增专业人员 {} ({})", company_id, id, req.name);
        self.get(company_id, id).await
    }

    pub async fn update(
        &self,
        company_id: i64,
        id: i64,
        req: ProfessionalRequest,
    ) -> CoreResult<Professional> {
        let current = self.get(company_id, id).await?;
        let active = req.active.unwrap_or(current.active);
        if active && !current.active {
            self.ensure_capacity(company_id).await?;
        }
        if let (true, Some(email)) = (current.portal_enabled(), &req.email) {
            self.ensure_portal_email_free(email, id).await?;
        }
        if let Some(ids) = &req.service_ids {
            self.ensure_services_belong(company_id, ids).await?;
        }

        sqlx::query(
            "UPDATE professionals
             SET name = ?, role = ?, phone = ?, email = ?, color = ?, active = ?, updated_at = ?
             WHERE id = ? AND company_id = ?",
        )
        .bind(&req.name)
        .bind(&req.role)
        .bind(&req.phone)
        .bind(&req.email)
        .bind(req.color.as_deref().unwrap_or(&current.color))
        .bind(active)
        .bind(Utc::now())
        .bind(id)
        .bind(company_id)
        .execute(&self.pool)
        .await?;

        if let Some(ids) = &req.service_ids {
            self.replace_services(id, ids).await?;
        }
        self.get(company_id, id).await
    }

    /// 删除专业人员；存在未来的待服务预约或历史预约时拒绝
    pub async fn delete(&self, company_id: i64, id: i64) -> CoreResult<()> {
        self.get(company_id, id).await?;

        let (upcoming, total): (i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(CASE WHEN status IN ('pending', 'scheduled') AND appointment_date >= ? THEN 1 ELSE 0 END), 0),
                    COUNT(*)
             FROM appointments WHERE professional_id = ?",
        )
        .bind(today())
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        if upcoming > 0 {
            return Err(CoreError::bad_request(
                "Cannot delete a professional with upcoming scheduled appointments",
            ));
        }
        if total > 0 {
            return Err(CoreError::bad_request(
                "Professional has appointment history; deactivate instead of deleting",
            ));
        }

        sqlx::query("DELETE FROM professionals WHERE id = ? AND company_id = ?")
            .bind(id)
            .bind(company_id)
            .execute(&self.pool)
            .await?;
        info!("商户 {} 删除专业人员 {}", company_id, id);
        Ok(())
    }

    pub async fn toggle_status(&self, company_id: i64, id: i64) -> CoreResult<Professional> {
        let current = self.get(company_id, id).await?;
        if !current.active {
            self.ensure_capacity(company_id).await?;
        }
        sqlx::query("UPDATE professionals SET active = ?, updated_at = ? WHERE id = ?")
            .bind(!current.active)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.get(company_id, id).await
    }

    pub async fn services(&self, professional_id: i64) -> CoreResult<Vec<ServiceSummary>> {
        Ok(sqlx::query_as::<_, ServiceSummary>(
            "SELECT s.id, s.name, s.price, s.duration, s.color, s.active
             FROM services s
             JOIN professional_services ps ON ps.service_id = s.id
             WHERE ps.professional_id = ?
             ORDER BY s.name COLLATE NOCASE",
        )
        .bind(professional_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn set_services(
        &self,
        company_id: i64,
        id: i64,
        service_ids: &[i64],
    ) -> CoreResult<Vec<ServiceSummary>> {
        self.get(company_id, id).await?;
        self.ensure_services_belong(company_id, service_ids).await?;
        self.replace_services(id, service_ids).await?;
        self.services(id).await
    }

    async fn replace_services(&self, professional_id: i64, service_ids: &[i64]) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM professional_services WHERE professional_id = ?")
            .bind(professional_id)
            .execute(&mut *tx)
            .await?;
        for service_id in dedup(service_ids) {
            sqlx::query("INSERT INTO professional_services (professional_id, service_id) VALUES (?, ?)")
                .bind(professional_id)
                .bind(service_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn ensure_services_belong(&self, company_id: i64, service_ids: &[i64]) -> CoreResult<()> {
        for service_id in dedup(service_ids) {
            let found: Option<i64> =
                sqlx::query_scalar("SELECT id FROM services WHERE id = ? AND company_id = ?")
                    .bind(service_id)
                    .bind(company_id)
                    .fetch_optional(&self.pool)
                    .await?;
            if found.is_none() {
                return Err(CoreError::bad_request(format!("Invalid service id: {}", service_id)));
            }
        }
        Ok(())
    }

    pub async fn working_hours(&self, professional_id: i64) -> CoreResult<Vec<WorkingHourRow>> {
        Ok(sqlx::query_as::<_, WorkingHourRow>(
            "SELECT day_of_week, start_minute, end_minute, break_start, break_end
             FROM working_hours WHERE professional_id = ? ORDER BY day_of_week",
        )
        .bind(professional_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn working_hours_for_day(
        &self,
        professional_id: i64,
        day_of_week: u32,
    ) -> CoreResult<Option<WorkingHourRow>> {
        Ok(sqlx::query_as::<_, WorkingHourRow>(
            "SELECT day_of_week, start_minute, end_minute, break_start, break_end
             FROM working_hours WHERE professional_id = ? AND day_of_week = ?",
        )
        .bind(professional_id)
        .bind(i64::from(day_of_week))
        .fetch_optional(&self.pool)
        .await?)
    }

    /// 整体替换一周的工作时间
    pub async fn replace_working_hours(
        &self,
        professional_id: i64,
        entries: &[WorkingHourEntry],
    ) -> CoreResult<Vec<WorkingHourRow>> {
        let rows = parse_working_hours(entries)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM working_hours WHERE professional_id = ?")
            .bind(professional_id)
            .execute(&mut *tx)
            .await?;
        for row in &rows {
            sqlx::query(
                "INSERT INTO working_hours
                    (professional_id, day_of_week, start_minute, end_minute, break_start, break_end)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(professional_id)
            .bind(row.day_of_week)
            .bind(row.start_minute)
            .bind(row.end_minute)
            .bind(row.break_start)
            .bind(row.break_end)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!("专业人员 {} 更新工作时间: {} 天", professional_id, rows.len());
        Ok(rows)
    }

    pub async fn blocked_dates(
        &self,
        professional_id: i64,
        from: Option<NaiveDate>,
    ) -> CoreResult<Vec<BlockedDate>> {
        Ok(sqlx::query_as::<_, BlockedDate>(
            "SELECT * FROM blocked_dates
             WHERE professional_id = ? AND (? IS NULL OR blocked_date >= ?)
             ORDER BY blocked_date",
        )
        .bind(professional_id)
        .bind(from)
        .bind(from)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn is_blocked(&self, professional_id: i64, date: NaiveDate) -> CoreResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM blocked_dates WHERE professional_id = ? AND blocked_date = ?",
        )
        .bind(professional_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// 新增停诊日期；同一天重复添加返回 409
    pub async fn add_blocked_date(
        &self,
        professional_id: i64,
        date: NaiveDate,
        reason: Option<String>,
    ) -> CoreResult<BlockedDate> {
        if date < today() {
            return Err(CoreError::bad_request("Cannot block a date in the past"));
        }

        let id = sqlx::query(
            "INSERT INTO blocked_dates (professional_id, blocked_date, reason, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(professional_id)
        .bind(date)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(sqlx::query_as::<_, BlockedDate>("SELECT * FROM blocked_dates WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn remove_blocked_date(&self, professional_id: i64, id: i64) -> CoreResult<()> {
        let removed = sqlx::query("DELETE FROM blocked_dates WHERE id = ? AND professional_id = ?")
            .bind(id)
            .bind(professional_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(CoreError::not_found("Blocked date not found"));
        }
        Ok(())
    }

    /// 生成门户激活令牌，旧令牌作废
    pub async fn invite(&self, company_id: i64, id: i64) -> CoreResult<(String, DateTime<Utc>)> {
        let professional = self.get(company_id, id).await?;
        if professional.email.is_none() {
            return Err(CoreError::bad_request(
                "Professional needs an email address before being invited",
            ));
        }

        let token = Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now() + self.activation_ttl;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM activation_tokens WHERE professional_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO activation_tokens (token, professional_id, expires_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(id)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("商户 {} 邀请专业人员 {} 开通门户", company_id, id);
        Ok((token, expires_at))
    }
}

fn dedup(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// 校验并转换工作时间：星期 0..=6 且不重复，开始早于结束，休息时段须在工作时间内
pub fn parse_working_hours(entries: &[WorkingHourEntry]) -> CoreResult<Vec<WorkingHourRow>> {
    let mut days = HashSet::new();
    let mut rows = Vec::with_capacity(entries.len());

    for entry in entries {
        if entry.day_of_week > 6 {
            return Err(CoreError::bad_request("day_of_week must be between 0 and 6"));
        }
        if !days.insert(entry.day_of_week) {
            return Err(CoreError::bad_request(format!(
                "Duplicate working hours for day {}",
                entry.day_of_week
            )));
        }

        let start = parse_time(&entry.start_time)?;
        let end = parse_time(&entry.end_time)?;
        if start >= end {
            return Err(CoreError::bad_request("Start time must be before end time"));
        }

        let break_start = non_empty(&entry.break_start).map(parse_time).transpose()?;
        let break_end = non_empty(&entry.break_end).map(parse_time).transpose()?;
        match (break_start, break_end) {
            (None, None) => {}
            (Some(bs), Some(be)) => {
                if bs >= be || bs < start || be > end {
                    return Err(CoreError::bad_request(
                        "Break must start before it ends and fall within working hours",
                    ));
                }
            }
            _ => {
                return Err(CoreError::bad_request(
                    "Break start and end must be provided together",
                ))
            }
        }

        rows.push(WorkingHourRow {
            day_of_week: i64::from(entry.day_of_week),
            start_minute: i64::from(start),
            end_minute: i64::from(end),
            break_start: break_start.map(i64::from),
            break_end: break_end.map(i64::from),
        });
    }

    rows.sort_by_key(|r| r.day_of_week);
    Ok(rows)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
