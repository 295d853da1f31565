//! # agenda
//!
//! 多租户预约排班服务：
//! - 租户后台：客户、专业人员、服务项目、预约与统计
//! - 公开预约：按商户 slug 查询空闲时段并下单
//! - 专业人员门户与平台超级管理
//! - 订阅计费状态与收银台回调

pub mod app;
pub mod config;
pub mod core;
pub mod infrastructure;

pub use app::{build_router, AppState};
pub use config::Config;
pub use crate::core::error::{CoreError, CoreResult};
