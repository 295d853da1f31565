//! 专业人员门户：激活、登录、个人日程与排班维护

pub mod handler;
pub mod model;
pub mod service;

pub use service::PortalService;
