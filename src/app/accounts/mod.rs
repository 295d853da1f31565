//! 账号：商户注册、登录、当前用户与商户资料

pub mod handler;
pub mod model;
pub mod service;

pub use service::AccountService;
