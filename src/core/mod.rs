//! 核心模块：错误、响应、认证与中间件

pub mod auth;
pub mod error;
pub mod middleware;
pub mod response;
pub mod validation;

pub use error::{CoreError, CoreResult};
