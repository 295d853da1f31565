//! 后台首页统计
//!
//! 各项指标并发查询；单项失败记为 0 并记录告警，不影响整体响应。

use axum::{extract::State, response::Json, Extension};
use chrono::Duration;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::warn;

use crate::app::scheduling::today;
use crate::app::AppState;
use crate::core::auth::AuthContext;
use crate::core::error::{CoreError, CoreResult};

#[derive(Debug, Default, Serialize)]
pub struct DashboardStats {
    pub total_clients: i64,
    pub total_professionals: i64,
    pub total_services: i64,
    pub total_appointments: i64,
    pub today_appointments: i64,
    pub recent_appointments: i64,
    pub total_revenue: f64,
    pub appointments_by_status: BTreeMap<String, i64>,
}

#[derive(Clone)]
pub struct DashboardService {
    pool: SqlitePool,
}

fn or_default<T: Default>(part: &str, result: CoreResult<T>) -> T {
    result.unwrap_or_else(|e| {
        warn!("首页统计项 {} 查询失败: {}", part, e);
        T::default()
    })
}

impl DashboardService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn count(&self, sql: &str, company_id: i64) -> CoreResult<i64> {
        Ok(sqlx::query_scalar(sql)
            .bind(company_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn count_between(&self, company_id: i64, days_back: i64) -> CoreResult<i64> {
        let today = today();
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM appointments
             WHERE company_id = ? AND appointment_date >= ? AND appointment_date <= ?",
        )
        .bind(company_id)
        .bind(today - Duration::days(days_back))
        .bind(today)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn revenue(&self, company_id: i64) -> CoreResult<f64> {
        Ok(sqlx::query_scalar(
            "SELECT COALESCE(SUM(price), 0.0) FROM appointments
             WHERE company_id = ? AND status = 'completed'",
        )
        .bind(company_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn by_status(&self, company_id: i64) -> CoreResult<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM appointments WHERE company_id = ? GROUP BY status",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn stats(&self, company_id: i64) -> DashboardStats {
        let (clients, professionals, services, appointments, today_count, recent, revenue, by_status) = tokio::join!(
            self.count("SELECT COUNT(*) FROM clients WHERE company_id = ?", company_id),
            self.count(
                "SELECT COUNT(*) FROM professionals WHERE company_id = ? AND active = 1",
                company_id
            ),
            self.count(
                "SELECT COUNT(*) FROM services WHERE company_id = ? AND active = 1",
                company_id
            ),
            self.count("SELECT COUNT(*) FROM appointments WHERE company_id = ?", company_id),
            self.count_between(company_id, 0),
            self.count_between(company_id, 6),
            self.revenue(company_id),
            self.by_status(company_id),
        );

        DashboardStats {
            total_clients: or_default("total_clients", clients),
            total_professionals: or_default("total_professionals", professionals),
            total_services: or_default("total_services", services),
            total_appointments: or_default("total_appointments", appointments),
            today_appointments: or_default("today_appointments", today_count),
            recent_appointments: or_default("recent_appointments", recent),
            total_revenue: or_default("total_revenue", revenue),
            appointments_by_status: or_default("appointments_by_status", by_status),
        }
    }
}

pub async fn dashboard_stats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<DashboardStats>, CoreError> {
    Ok(Json(state.dashboard.stats(auth.tenant()?).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_part_defaults_to_zero() {
        let failed: CoreResult<i64> = Err(CoreError::internal("db down"));
        assert_eq!(or_default("total_clients", failed), 0);
        assert_eq!(or_default("total_clients", Ok(5)), 5);
    }
}
