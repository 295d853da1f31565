//! 公开预约数据模型

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::accounts::model::Company;
use crate::app::appointments::model::AppointmentDetail;
use crate::app::availability::{DayAvailability, Slot};
use crate::app::professionals::model::ProfessionalSummary;
use crate::core::validation::{validate_not_blank, validate_phone};

/// 对外公开的商户信息
#[derive(Debug, Clone, Serialize)]
pub struct PublicBusiness {
    pub business_name: String,
    pub slug: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub require_confirmation: bool,
}

impl From<&Company> for PublicBusiness {
    fn from(company: &Company) -> Self {
        Self {
            business_name: company.business_name.clone(),
            slug: company.slug.clone(),
            phone: company.phone.clone(),
            address: company.address.clone(),
            description: company.description.clone(),
            logo_url: company.logo_url.clone(),
            require_confirmation: company.require_confirmation,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PublicService {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub duration: i64,
    pub color: String,
}

#[derive(Debug, Serialize)]
pub struct BusinessResponse {
    pub business: PublicBusiness,
}

#[derive(Debug, Serialize)]
pub struct PublicServicesResponse {
    pub services: Vec<PublicService>,
}

#[derive(Debug, Serialize)]
pub struct PublicProfessionalsResponse {
    pub professionals: Vec<ProfessionalSummary>,
}

#[derive(Debug, Deserialize)]
pub struct ServicesQuery {
    pub professional_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ProfessionalsQuery {
    pub service_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub service_id: i64,
    pub professional_id: i64,
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct MultiDayQuery {
    pub service_id: i64,
    pub professional_id: i64,
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub date: NaiveDate,
    pub professional_id: i64,
    pub professional_name: String,
    pub service_id: i64,
    pub duration: i64,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Serialize)]
pub struct MultiDayResponse {
    pub professional_id: i64,
    pub service_id: i64,
    pub availability: Vec<DayAvailability>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PublicBookingRequest {
    pub service_id: i64,
    pub professional_id: i64,
    pub date: String,
    pub start_time: String,
    #[validate(
        length(min = 1, max = 255, message = "Name is required"),
        custom(function = "validate_not_blank")
    )]
    pub client_name: String,
    #[validate(custom(function = "validate_phone"))]
    pub client_phone: String,
    #[validate(email(message = "Invalid email format"))]
    pub client_email: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingCreatedResponse {
    pub message: String,
    pub booking_code: String,
    /// 商户要求确认时返回，客户凭此令牌确认预约
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_token: Option<String>,
    pub appointment: PublicAppointment,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicAppointmentService {
    pub name: String,
    pub duration: i64,
}

/// 客户通过预约码看到的预约信息
#[derive(Debug, Clone, Serialize)]
pub struct PublicAppointment {
    pub booking_code: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub price: f64,
    pub client_name: String,
    pub professional_name: String,
    pub service: PublicAppointmentService,
    pub business: PublicBusiness,
    pub can_cancel: bool,
}

impl PublicAppointment {
    pub fn new(detail: &AppointmentDetail, business: PublicBusiness, can_cancel: bool) -> Self {
        let a = &detail.appointment;
        Self {
            booking_code: a.booking_code.clone(),
            date: a.appointment_date,
            start_time: a.start_time.clone(),
            end_time: a.end_time.clone(),
            status: a.status.clone(),
            price: a.price,
            client_name: detail.client.name.clone(),
            professional_name: detail.professional.name.clone(),
            service: PublicAppointmentService {
                name: detail.service.name.clone(),
                duration: detail.service.duration,
            },
            business,
            can_cancel,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublicAppointmentResponse {
    pub appointment: PublicAppointment,
}

#[derive(Debug, Deserialize)]
pub struct PublicCancelRequest {
    pub phone: String,
    pub reason: Option<String>,
}
