pub mod handler;
pub mod model;
pub mod service;

pub use service::AppointmentService;
