//! 数据库基础设施

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Error,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // 内存数据库每个连接都是独立的库，只能使用单连接
        let max_connections = if config.url.contains(":memory:") {
            1
        } else {
            config.max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(8))
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn into_pool(self) -> SqlitePool {
        self.pool
    }

    /// 创建数据库表（幂等）
    pub async fn migrate(&self) -> Result<(), Error> {
        info!("初始化数据库表结构...");
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("数据库表结构就绪");
        Ok(())
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS companies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        business_name TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        phone TEXT,
        address TEXT,
        description TEXT,
        logo_url TEXT,
        booking_enabled BOOLEAN NOT NULL DEFAULT 1,
        require_confirmation BOOLEAN NOT NULL DEFAULT 0,
        suspended BOOLEAN NOT NULL DEFAULT 0,
        suspended_reason TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        company_id INTEGER REFERENCES companies(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subscriptions (
        company_id INTEGER PRIMARY KEY REFERENCES companies(id) ON DELETE CASCADE,
        plan TEXT,
        status TEXT NOT NULL,
        trial_end TEXT,
        current_period_end TEXT,
        cancel_at_period_end BOOLEAN NOT NULL DEFAULT 0,
        canceled_at TEXT,
        checkout_session TEXT,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS billing_events (
        event_id TEXT PRIMARY KEY,
        company_id INTEGER NOT NULL,
        event_type TEXT NOT NULL,
        plan TEXT,
        amount REAL,
        payment_status TEXT,
        received_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS clients (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        company_id INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        phone TEXT,
        email TEXT,
        notes TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_clients_company ON clients(company_id, name)",
    r#"
    CREATE TABLE IF NOT EXISTS professionals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        company_id INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        role TEXT NOT NULL,
        phone TEXT,
        email TEXT,
        color TEXT NOT NULL,
        active BOOLEAN NOT NULL DEFAULT 1,
        password_hash TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS services (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        company_id INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT,
        price REAL NOT NULL,
        duration INTEGER NOT NULL,
        color TEXT NOT NULL,
        active BOOLEAN NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS professional_services (
        professional_id INTEGER NOT NULL REFERENCES professionals(id) ON DELETE CASCADE,
        service_id INTEGER NOT NULL REFERENCES services(id) ON DELETE CASCADE,
        PRIMARY KEY (professional_id, service_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS working_hours (
        professional_id INTEGER NOT NULL REFERENCES professionals(id) ON DELETE CASCADE,
        day_of_week INTEGER NOT NULL,
        start_minute INTEGER NOT NULL,
        end_minute INTEGER NOT NULL,
        break_start INTEGER,
        break_end INTEGER,
        PRIMARY KEY (professional_id, day_of_week)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS blocked_dates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        professional_id INTEGER NOT NULL REFERENCES professionals(id) ON DELETE CASCADE,
        blocked_date TEXT NOT NULL,
        reason TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (professional_id, blocked_date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activation_tokens (
        token TEXT PRIMARY KEY,
        professional_id INTEGER NOT NULL REFERENCES professionals(id) ON DELETE CASCADE,
        expires_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS appointments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        company_id INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
        client_id INTEGER NOT NULL REFERENCES clients(id),
        professional_id INTEGER NOT NULL REFERENCES professionals(id),
        service_id INTEGER NOT NULL REFERENCES services(id),
        appointment_date TEXT NOT NULL,
        start_minute INTEGER NOT NULL,
        end_minute INTEGER NOT NULL,
        status TEXT NOT NULL,
        notes TEXT,
        price REAL NOT NULL,
        payment_method TEXT,
        booking_code TEXT NOT NULL UNIQUE,
        source TEXT NOT NULL,
        cancel_reason TEXT,
        confirmation_token TEXT UNIQUE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_appointments_slot ON appointments(professional_id, appointment_date)",
    "CREATE INDEX IF NOT EXISTS idx_appointments_company ON appointments(company_id, appointment_date)",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 4,
        };
        let db = DatabaseManager::new(&config).await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM companies")
            .fetch_one(db.get_pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }
}
