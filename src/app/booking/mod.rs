//! 公开预约：客户通过商户 slug 浏览服务、查询空闲时段、下单与自助取消

pub mod handler;
pub mod model;
pub mod service;

pub use service::BookingService;
