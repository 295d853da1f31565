//! 账号业务服务：注册、登录、商户资料

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use super::model::{Company, UpdateBusinessRequest, User, UserRow};
use crate::app::subscriptions::model::SubscriptionStatus;
use crate::core::auth::{
    hash_password, verify_password, TokenKind, TokenService, ROLE_ADMIN, ROLE_SUPERADMIN,
};
use crate::core::error::{CoreError, CoreResult};
use crate::core::validation::blank_to_none;

/// 注册结果
pub struct Registration {
    pub user: User,
    pub company: Company,
    pub access_token: String,
}

#[derive(Clone)]
pub struct AccountService {
    pool: SqlitePool,
    tokens: TokenService,
}

impl AccountService {
    pub fn new(pool: SqlitePool, tokens: TokenService) -> Self {
        Self { pool, tokens }
    }

    /// 注册新商户：同时创建租户、管理员账号和未订阅状态的订阅记录
    pub async fn register(
        &self,
        business_name: &str,
        name: &str,
        email: &str,
        password: &str,
        phone: Option<String>,
    ) -> CoreResult<Registration> {
        let email = email.trim().to_lowercase();
        if self.find_user_by_email(&email).await?.is_some() {
            return Err(CoreError::conflict("Email already in use"));
        }

        let slug = self.unique_slug(&slugify(business_name)).await?;
        let password_hash = hash_password(password)?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let company_id = sqlx::query(
            "INSERT INTO companies (business_name, slug, phone, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(business_name.trim())
        .bind(&slug)
        .bind(blank_to_none(phone))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let user_id = sqlx::query(
            "INSERT INTO users (company_id, name, email, password_hash, role, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(company_id)
        .bind(name.trim())
        .bind(&email)
        .bind(&password_hash)
        .bind(ROLE_ADMIN)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("INSERT INTO subscriptions (company_id, status, updated_at) VALUES (?, ?, ?)")
            .bind(company_id)
            .bind(SubscriptionStatus::None.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!("新商户注册: {} (slug={}, company_id={})", business_name, slug, company_id);

        let user = self.get_user(user_id).await?;
        let company = self.get_company(company_id).await?;
        let access_token = self
            .tokens
            .issue(user.id, user.company_id, &user.role, TokenKind::User)?;

        Ok(Registration {
            user,
            company,
            access_token,
        })
    }

    /// 登录并签发访问令牌
    pub async fn login(&self, email: &str, password: &str) -> CoreResult<(User, String)> {
        let email = email.trim().to_lowercase();
        let row = match self.find_user_by_email(&email).await? {
            Some(row) if verify_password(password, &row.password_hash) => row,
            _ => {
                warn!("登录失败: {}", email);
                return Err(CoreError::unauthorized("Invalid email or password"));
            }
        };

        if let Some(company_id) = row.company_id {
            let company = self.get_company(company_id).await?;
            if company.suspended {
                return Err(CoreError::forbidden("This company account is suspended"));
            }
        }

        let token = self
            .tokens
            .issue(row.id, row.company_id, &row.role, TokenKind::User)?;
        Ok((row.into(), token))
    }

    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> CoreResult<()> {
        let row = self.get_user_row(user_id).await?;
        if !verify_password(current_password, &row.password_hash) {
            return Err(CoreError::bad_request("Current password is incorrect"));
        }

        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(hash_password(new_password)?)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_user(&self, user_id: i64) -> CoreResult<User> {
        self.get_user_row(user_id).await.map(User::from)
    }

    async fn get_user_row(&self, user_id: i64) -> CoreResult<UserRow> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found("User not found"))
    }

    async fn find_user_by_email(&self, email: &str) -> CoreResult<Option<UserRow>> {
        Ok(
            sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn get_company(&self, company_id: i64) -> CoreResult<Company> {
        sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = ?")
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found("Company not found"))
    }

    pub async fn find_company_by_slug(&self, slug: &str) -> CoreResult<Option<Company>> {
        Ok(
            sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE slug = ?")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// 更新商户资料；slug 不可修改
    pub async fn update_business(
        &self,
        company_id: i64,
        req: UpdateBusinessRequest,
    ) -> CoreResult<Company> {
        let current = self.get_company(company_id).await?;

        sqlx::query(
            "UPDATE companies
             SET business_name = ?, phone = ?, address = ?, description = ?, logo_url = ?,
                 booking_enabled = ?, require_confirmation = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(req.business_name.trim())
        .bind(blank_to_none(req.phone))
        .bind(blank_to_none(req.address))
        .bind(blank_to_none(req.description))
        .bind(blank_to_none(req.logo_url))
        .bind(req.booking_enabled.unwrap_or(current.booking_enabled))
        .bind(req.require_confirmation.unwrap_or(current.require_confirmation))
        .bind(Utc::now())
        .bind(company_id)
        .execute(&self.pool)
        .await?;

        self.get_company(company_id).await
    }

    /// 确保平台超级管理员账号存在
    pub async fn ensure_superadmin(&self, email: &str, password: &str) -> CoreResult<()> {
        let email = email.trim().to_lowercase();
        if self.find_user_by_email(&email).await?.is_some() {
            return Ok(());
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (company_id, name, email, password_hash, role, created_at, updated_at)
             VALUES (NULL, ?, ?, ?, ?, ?, ?)",
        )
        .bind("Super Admin")
        .bind(&email)
        .bind(hash_password(password)?)
        .bind(ROLE_SUPERADMIN)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!("已创建平台超级管理员账号: {}", email);
        Ok(())
    }

    async fn unique_slug(&self, base: &str) -> CoreResult<String> {
        let mut candidate = base.to_string();
        let mut suffix = 2;
        while self.find_company_by_slug(&candidate).await?.is_some() {
            candidate = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        Ok(candidate)
    }
}

/// 由商户名生成公开预约地址中的 slug
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().map(fold_accent) {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "business".to_string()
    } else {
        slug
    }
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
        'ç' | 'Ç' => 'c',
        'ñ' | 'Ñ' => 'n',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Barbearia do João"), "barbearia-do-joao");
        assert_eq!(slugify("  Studio  Beleza & Cia!! "), "studio-beleza-cia");
        assert_eq!(slugify("Espaço Çã"), "espaco-ca");
        assert_eq!(slugify("***"), "business");
    }
}
