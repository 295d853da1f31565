//! 认证：访问令牌签发与校验、密码哈希

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{CoreError, CoreResult};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SUPERADMIN: &str = "superadmin";
pub const ROLE_PROFESSIONAL: &str = "professional";

/// 令牌主体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// 后台用户（租户管理员或平台超级管理员）
    User,
    /// 专业人员门户账号
    Professional,
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub company_id: Option<i64>,
    pub role: String,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

/// 已认证请求的会话信息，由认证中间件放入请求扩展
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub subject_id: i64,
    pub company_id: Option<i64>,
    pub role: String,
    pub kind: TokenKind,
}

impl AuthContext {
    /// 当前租户 ID；平台账号没有租户
    pub fn tenant(&self) -> CoreResult<i64> {
        self.company_id
            .ok_or_else(|| CoreError::forbidden("This account is not bound to a company"))
    }

    pub fn is_superadmin(&self) -> bool {
        self.kind == TokenKind::User && self.role == ROLE_SUPERADMIN
    }
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        Self {
            subject_id: claims.sub,
            company_id: claims.company_id,
            role: claims.role,
            kind: claims.kind,
        }
    }
}

struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// 令牌服务
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<TokenKeys>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            keys: Arc::new(TokenKeys {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
            }),
            ttl: Duration::hours(ttl_hours.max(1)),
        }
    }

    pub fn issue(
        &self,
        subject_id: i64,
        company_id: Option<i64>,
        role: &str,
        kind: TokenKind,
    ) -> CoreResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject_id,
            company_id,
            role: role.to_string(),
            kind,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)
            .map_err(|e| CoreError::internal(format!("Failed to issue token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> CoreResult<Claims> {
        decode::<Claims>(token, &self.keys.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| CoreError::unauthorized("Invalid or expired token"))
    }
}

/// 生成 Argon2id 密码哈希（PHC 字符串）
pub fn hash_password(password: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CoreError::internal(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// 生成指定长度的随机大写字母数字码（不含易混淆字符）
pub fn random_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// 从 `Authorization: Bearer <token>` 头中取出令牌
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
