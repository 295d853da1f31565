//! 基础设施：数据库与日志

pub mod database;
pub mod logger;

pub use database::DatabaseManager;
pub use logger::Logger;
