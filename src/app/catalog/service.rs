//! 服务项目业务服务

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::info;

use super::model::{Service, ServiceRequest, ServiceView, DEFAULT_SERVICE_COLOR};
use crate::app::professionals::model::ProfessionalSummary;
use crate::app::scheduling::today;
use crate::core::error::{CoreError, CoreResult};
use crate::core::response::PageWindow;

const LIST_FILTER: &str = "company_id = ?1
     AND (?2 IS NULL OR LOWER(name) LIKE ?2 OR LOWER(COALESCE(description, '')) LIKE ?2)
     AND (?3 = 0 OR active = 1)
     AND (?4 IS NULL OR id IN (SELECT service_id FROM professional_services WHERE professional_id = ?4))";

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub pattern: Option<String>,
    pub active_only: bool,
    pub professional_id: Option<i64>,
    pub include_professionals: bool,
}

#[derive(Clone)]
pub struct CatalogService {
    pool: SqlitePool,
}

impl CatalogService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        company_id: i64,
        options: &ListOptions,
        window: PageWindow,
    ) -> CoreResult<(Vec<ServiceView>, i64)> {
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM services WHERE {}", LIST_FILTER))
            .bind(company_id)
            .bind(options.pattern.as_deref())
            .bind(options.active_only)
            .bind(options.professional_id)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, Service>(&format!(
            "SELECT * FROM services WHERE {}
             ORDER BY name COLLATE NOCASE, id LIMIT ?5 OFFSET ?6",
            LIST_FILTER
        ))
        .bind(company_id)
        .bind(options.pattern.as_deref())
        .bind(options.active_only)
        .bind(options.professional_id)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&self.pool)
        .await?;

        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            views.push(self.view(row, options.include_professionals).await?);
        }
        Ok((views, total))
    }

    pub async fn get(&self, company_id: i64, id: i64) -> CoreResult<Service> {
        sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ? AND company_id = ?")
            .bind(id)
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found("Service not found"))
    }

    pub async fn view(&self, service: Service, include_professionals: bool) -> CoreResult<ServiceView> {
        let professionals = if include_professionals {
            Some(self.professionals(service.id).await?)
        } else {
            None
        };
        Ok(ServiceView {
            service,
            professionals,
        })
    }

    pub async fn professionals(&self, service_id: i64) -> CoreResult<Vec<ProfessionalSummary>> {
        Ok(sqlx::query_as::<_, ProfessionalSummary>(
            "SELECT p.id, p.name, p.role, p.color
             FROM professionals p
             JOIN professional_services ps ON ps.professional_id = p.id
             WHERE ps.service_id = ?
             ORDER BY p.name COLLATE NOCASE",
        )
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// 该专业人员是否提供该服务
    pub async fn is_offered_by(&self, service_id: i64, professional_id: i64) -> CoreResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT service_id FROM professional_services WHERE service_id = ? AND professional_id = ?",
        )
        .bind(service_id)
        .bind(professional_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    pub async fn create(&self, company_id: i64, req: ServiceRequest) -> CoreResult<Service> {
        if let Some(ids) = &req.professional_ids {
            self.ensure_professionals_belong(company_id, ids).await?;
        }

        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO services
                (company_id, name, description, price, duration, color, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(company_id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(req.price)
        .bind(req.duration)
        .bind(req.color.as_deref().unwrap_or(DEFAULT_SERVICE_COLOR))
        .bind(req.active.unwrap_or(true))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        if let Some(ids) = &req.professional_ids {
            self.replace_professionals(id, ids).await?;
        }

        info!("商户 {} 新增服务 {} ({})", company_id, id, req.name);
        self.get(company_id, id).await
    }

    pub async fn update(&self, company_id: i64, id: i64, req: ServiceRequest) -> CoreResult<Service> {
        let current = self.get(company_id, id).await?;
        if let Some(ids) = &req.professional_ids {
            self.ensure_professionals_belong(company_id, ids).await?;
        }

        sqlx::query(
            "UPDATE services
             SET name = ?, description = ?, price = ?, duration = ?, color = ?, active = ?, updated_at = ?
             WHERE id = ? AND company_id = ?",
        )
        .bind(&req.name)
        .bind(&req.description)
        .bind(req.price)
        .bind(req.duration)
        .bind(req.color.as_deref().unwrap_or(&current.color))
        .bind(req.active.unwrap_or(current.active))
        .bind(Utc::now())
        .bind(id)
        .bind(company_id)
        .execute(&self.pool)
        .await?;

        if let Some(ids) = &req.professional_ids {
            self.replace_professionals(id, ids).await?;
        }
        self.get(company_id, id).await
    }

    /// 删除服务；存在未来的待服务预约或历史预约时拒绝
    pub async fn delete(&self, company_id: i64, id: i64) -> CoreResult<()> {
        self.get(company_id, id).await?;

        let (upcoming, total): (i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(CASE WHEN status IN ('pending', 'scheduled') AND appointment_date >= ? THEN 1 ELSE 0 END), 0),
                    COUNT(*)
             FROM appointments WHERE service_id = ?",
        )
        .bind(today())
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        if upcoming > 0 {
            return Err(CoreError::bad_request(
                "Cannot delete a service with upcoming scheduled appointments",
            ));
        }
        if total > 0 {
            return Err(CoreError::bad_request(
                "Service has appointment history; deactivate instead of deleting",
            ));
        }

        sqlx::query("DELETE FROM services WHERE id = ? AND company_id = ?")
            .bind(id)
            .bind(company_id)
            .execute(&self.pool)
            .await?;
        info!("商户 {} 删除服务 {}", company_id, id);
        Ok(())
    }

    pub async fn toggle_status(&self, company_id: i64, id: i64) -> CoreResult<Service> {
        let current = self.get(company_id, id).await?;
        sqlx::query("UPDATE services SET active = ?, updated_at = ? WHERE id = ?")
            .bind(!current.active)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.get(company_id, id).await
    }

    pub async fn set_professionals(
        &self,
        company_id: i64,
        id: i64,
        professional_ids: &[i64],
    ) -> CoreResult<Vec<ProfessionalSummary>> {
        self.get(company_id, id).await?;
        self.ensure_professionals_belong(company_id, professional_ids).await?;
        self.replace_professionals(id, professional_ids).await?;
        self.professionals(id).await
    }

    async fn replace_professionals(&self, service_id: i64, professional_ids: &[i64]) -> CoreResult<()> {
        let mut seen = HashSet::new();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM professional_services WHERE service_id = ?")
            .bind(service_id)
            .execute(&mut *tx)
            .await?;
        for professional_id in professional_ids.iter().filter(|id| seen.insert(**id)) {
            sqlx::query("INSERT INTO professional_services (professional_id, service_id) VALUES (?, ?)")
                .bind(professional_id)
                .bind(service_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn ensure_professionals_belong(&self, company_id: i64, ids: &[i64]) -> CoreResult<()> {
        for id in ids {
            let found: Option<i64> =
                sqlx::query_scalar("SELECT id FROM professionals WHERE id = ? AND company_id = ?")
                    .bind(id)
                    .bind(company_id)
                    .fetch_optional(&self.pool)
                    .await?;
            if found.is_none() {
                return Err(CoreError::bad_request(format!("Invalid professional id: {}", id)));
            }
        }
        Ok(())
    }
}
