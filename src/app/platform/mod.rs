//! 平台管理：超级管理员查看与处置商户、订阅

pub mod handler;
pub mod model;
pub mod service;

pub use service::PlatformService;
