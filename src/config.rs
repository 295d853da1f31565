//! 服务配置
//!
//! 配置来源按优先级从低到高：内置默认值 → TOML 配置文件 → 环境变量（含 `.env`）。

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "agenda.toml";

/// 服务配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP 服务配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 认证配置
    pub auth: AuthConfig,
    /// 计费配置
    pub billing: BillingConfig,
    /// 公开预约配置
    pub booking: BookingConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 平台超级管理员引导账号
    pub superadmin: SuperAdminConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 绑定地址
    pub bind_address: String,
    /// HTTP 服务端口
    pub port: u16,
    /// 请求超时时间（秒）
    pub timeout_seconds: u64,
    /// 允许的跨域来源，空表示任意来源
    pub cors_origins: Vec<String>,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// JWT 签名密钥
    pub jwt_secret: String,
    /// 访问令牌有效期（小时）
    pub token_ttl_hours: i64,
    /// 专业人员激活令牌有效期（小时）
    pub activation_ttl_hours: i64,
}

/// 计费配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// 托管收银台地址
    pub checkout_base_url: String,
    /// 账单门户地址
    pub portal_base_url: String,
    /// Webhook 共享密钥
    pub webhook_secret: String,
    /// 试用期天数
    pub trial_days: i64,
    /// 欠费宽限天数
    pub grace_days: i64,
}

/// 公开预约配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingConfig {
    /// 时段步长（分钟）
    pub slot_step_minutes: u32,
    /// 最多可提前预约的天数
    pub max_days_ahead: i64,
    /// 客户自助取消所需的最少提前小时数
    pub cancel_min_hours: i64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志目录
    pub log_dir: PathBuf,
    /// 日志文件名前缀
    pub file_prefix: String,
    /// 日志级别 (trace, debug, info, warn, error)
    pub level: String,
    /// 是否启用控制台输出
    pub console_output: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperAdminConfig {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            timeout_seconds: 30,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://agenda.db".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-change-me-please".to_string(),
            token_ttl_hours: 24,
            activation_ttl_hours: 72,
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            checkout_base_url: "https://checkout.example.com/session".to_string(),
            portal_base_url: "https://billing.example.com/portal".to_string(),
            webhook_secret: "dev-webhook-secret".to_string(),
            trial_days: 3,
            grace_days: 3,
        }
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            slot_step_minutes: 30,
            max_days_ahead: 60,
            cancel_min_hours: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            file_prefix: "agenda".to_string(),
            level: "info".to_string(),
            console_output: true,
        }
    }
}

impl Config {
    /// 加载配置
    ///
    /// 1. 加载 `.env`（如存在）
    /// 2. 读取 `AGENDA_CONFIG` 指向的文件，默认 `agenda.toml`，不存在时使用默认值
    /// 3. 用环境变量覆盖敏感项
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = std::env::var("AGENDA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("配置文件格式错误: {}", path.display()))?;
        Ok(config)
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 用环境变量覆盖配置项
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(secret) = lookup("WEBHOOK_SECRET") {
            self.billing.webhook_secret = secret;
        }
        if let Some(bind) = lookup("AGENDA_BIND") {
            match bind.rsplit_once(':').map(|(host, port)| (host, port.parse::<u16>())) {
                Some((host, Ok(port))) => {
                    self.server.bind_address = host.to_string();
                    self.server.port = port;
                }
                _ => self.server.bind_address = bind,
            }
        }
        if let Some(email) = lookup("SUPERADMIN_EMAIL") {
            self.superadmin.email = Some(email);
        }
        if let Some(password) = lookup("SUPERADMIN_PASSWORD") {
            self.superadmin.password = Some(password);
        }
        if let Some(level) = lookup("AGENDA_LOG") {
            self.logging.level = level;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 16 {
            bail!("auth.jwt_secret 至少需要 16 个字节");
        }
        if self.server.port == 0 {
            bail!("server.port 不能为 0");
        }
        if self.database.url.is_empty() {
            bail!("database.url 不能为空");
        }
        if !(5..=120).contains(&self.booking.slot_step_minutes) {
            bail!("booking.slot_step_minutes 必须在 5 到 120 之间");
        }
        if self.booking.max_days_ahead < 1 {
            bail!("booking.max_days_ahead 至少为 1");
        }
        if self.billing.trial_days < 0 || self.billing.grace_days < 0 {
            bail!("billing 天数不能为负数");
        }
        Ok(())
    }

    /// 监听地址，如 `0.0.0.0:5000`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    /// 测试用配置：内存数据库，无文件日志
    pub fn for_tests() -> Self {
        let mut config = Self::default();
        config.database.url = "sqlite::memory:".to_string();
        config.database.max_connections = 1;
        config.auth.jwt_secret = "test-secret-0123456789abcdef".to_string();
        config.logging.console_output = false;
        config
    }
}
