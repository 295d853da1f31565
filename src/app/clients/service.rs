//! 客户业务服务

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::info;

use super::model::{Client, ClientRequest, ClientStats, ClientSummary, ClientView};
use crate::core::error::{CoreError, CoreResult};
use crate::core::response::PageWindow;
use crate::core::validation::phone_digits;

const SEARCH_FILTER: &str = "(?2 IS NULL OR LOWER(name) LIKE ?2 OR LOWER(COALESCE(phone, '')) LIKE ?2
     OR LOWER(COALESCE(email, '')) LIKE ?2)";

#[derive(Clone)]
pub struct ClientService {
    pool: SqlitePool,
}

impl ClientService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 分页列出客户，按姓名排序
    pub async fn list(
        &self,
        company_id: i64,
        pattern: Option<String>,
        window: PageWindow,
        include_stats: bool,
    ) -> CoreResult<(Vec<ClientView>, i64)> {
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM clients WHERE company_id = ?1 AND {}",
            SEARCH_FILTER
        ))
        .bind(company_id)
        .bind(pattern.as_deref())
        .fetch_one(&self.pool)
        .await?;

        let clients = sqlx::query_as::<_, Client>(&format!(
            "SELECT * FROM clients WHERE company_id = ?1 AND {}
             ORDER BY name COLLATE NOCASE, id LIMIT ?3 OFFSET ?4",
            SEARCH_FILTER
        ))
        .bind(company_id)
        .bind(pattern.as_deref())
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&self.pool)
        .await?;

        let mut views = Vec::with_capacity(clients.len());
        for client in clients {
            views.push(self.view(client, include_stats).await?);
        }
        Ok((views, total))
    }

    /// 自动补全；空搜索词返回空列表
    pub async fn search(
        &self,
        company_id: i64,
        pattern: Option<String>,
        limit: u32,
    ) -> CoreResult<Vec<ClientSummary>> {
        let Some(pattern) = pattern else {
            return Ok(Vec::new());
        };

        let clients = sqlx::query_as::<_, ClientSummary>(&format!(
            "SELECT id, name, phone, email FROM clients WHERE company_id = ?1 AND {}
             ORDER BY name COLLATE NOCASE LIMIT ?3",
            SEARCH_FILTER
        ))
        .bind(company_id)
        .bind(pattern)
        .bind(i64::from(limit.clamp(1, 50)))
        .fetch_all(&self.pool)
        .await?;
        Ok(clients)
    }

    pub async fn get(&self, company_id: i64, id: i64) -> CoreResult<Client> {
        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = ? AND company_id = ?")
            .bind(id)
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found("Client not found"))
    }

    pub async fn view(&self, client: Client, include_stats: bool) -> CoreResult<ClientView> {
        let stats = if include_stats {
            Some(self.stats(client.id).await?)
        } else {
            None
        };
        Ok(ClientView { client, stats })
    }

    async fn stats(&self, client_id: i64) -> CoreResult<ClientStats> {
        let (total_appointments, last): (i64, Option<String>) = sqlx::query_as(
            "SELECT COUNT(*), MAX(appointment_date) FROM appointments WHERE client_id = ?",
        )
        .bind(client_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ClientStats {
            total_appointments,
            last_appointment: last.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        })
    }

    pub async fn create(&self, company_id: i64, req: ClientRequest) -> CoreResult<Client> {
        self.ensure_email_free(company_id, req.email.as_deref(), None).await?;

        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO clients (company_id, name, phone, email, notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(company_id)
        .bind(&req.name)
        .bind(&req.phone)
        .bind(&req.email)
        .bind(&req.notes)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        info!("商户 {} 新增客户 {} ({})", company_id, id, req.name);
        self.get(company_id, id).await
    }

    pub async fn update(&self, company_id: i64, id: i64, req: ClientRequest) -> CoreResult<Client> {
        self.get(company_id, id).await?;
        self.ensure_email_free(company_id, req.email.as_deref(), Some(id)).await?;

        sqlx::query(
            "UPDATE clients SET name = ?, phone = ?, email = ?, notes = ?, updated_at = ?
             WHERE id = ? AND company_id = ?",
        )
        .bind(&req.name)
        .bind(&req.phone)
        .bind(&req.email)
        .bind(&req.notes)
        .bind(Utc::now())
        .bind(id)
        .bind(company_id)
        .execute(&self.pool)
        .await?;

        self.get(company_id, id).await
    }

    /// 删除客户；已有预约记录的客户不可删除
    pub async fn delete(&self, company_id: i64, id: i64) -> CoreResult<()> {
        self.get(company_id, id).await?;

        let appointments: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE client_id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        if appointments > 0 {
            return Err(CoreError::bad_request(
                "Cannot delete a client with appointment history",
            ));
        }

        sqlx::query("DELETE FROM clients WHERE id = ? AND company_id = ?")
            .bind(id)
            .bind(company_id)
            .execute(&self.pool)
            .await?;
        info!("商户 {} 删除客户 {}", company_id, id);
        Ok(())
    }

    /// 按电话号码（仅比较数字）查找客户，找不到则创建
    pub async fn find_or_create_by_phone(
        &self,
        company_id: i64,
        name: &str,
        phone: &str,
        email: Option<String>,
    ) -> CoreResult<Client> {
        let digits = phone_digits(phone);
        let candidates = sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE company_id = ? AND phone IS NOT NULL ORDER BY id",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        if let Some(existing) = candidates
            .into_iter()
            .find(|c| c.phone.as_deref().map(phone_digits).as_deref() == Some(digits.as_str()))
        {
            return Ok(existing);
        }

        // 邮箱已被其他客户占用时不再记录邮箱
        let mut email = email;
        if self.ensure_email_free(company_id, email.as_deref(), None).await.is_err() {
            email = None;
        }

        self.create(
            company_id,
            ClientRequest {
                name: name.trim().to_string(),
                phone: Some(phone.trim().to_string()),
                email,
                notes: None,
            },
        )
        .await
    }

    async fn ensure_email_free(
        &self,
        company_id: i64,
        email: Option<&str>,
        exclude_id: Option<i64>,
    ) -> CoreResult<()> {
        let Some(email) = email else {
            return Ok(());
        };

        let taken: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM clients WHERE company_id = ? AND LOWER(email) = LOWER(?) AND id != ?",
        )
        .bind(company_id)
        .bind(email)
        .bind(exclude_id.unwrap_or(0))
        .fetch_optional(&self.pool)
        .await?;

        if taken.is_some() {
            return Err(CoreError::conflict("A client with this email already exists"));
        }
        Ok(())
    }
}
