//! 公开预约服务：按 slug 解析租户，无需登录

use chrono::{Duration, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use super::model::{
    BookingCreatedResponse, PublicAppointment, PublicBookingRequest, PublicBusiness, PublicService,
};
use crate::app::accounts::model::Company;
use crate::app::accounts::AccountService;
use crate::app::appointments::model::{AppointmentDetail, AppointmentStatus, BookingSource};
use crate::app::appointments::service::{BookingClient, NewAppointment};
use crate::app::appointments::AppointmentService;
use crate::app::availability::{AvailabilityService, DayAvailability, Slot};
use crate::app::catalog::model::Service;
use crate::app::catalog::CatalogService;
use crate::app::professionals::model::{Professional, ProfessionalSummary};
use crate::app::professionals::ProfessionalService;
use crate::app::scheduling::{now_local, parse_hhmm, parse_date, parse_time, starts_at, today};
use crate::app::subscriptions::SubscriptionService;
use crate::config::BookingConfig;
use crate::core::error::{CoreError, CoreResult};
use crate::core::validation::{blank_to_none, phone_digits};

pub const DEFAULT_MULTI_DAY: u32 = 14;
pub const MAX_MULTI_DAY: u32 = 31;

#[derive(Clone)]
pub struct BookingService {
    pool: SqlitePool,
    config: BookingConfig,
    accounts: AccountService,
    subscriptions: SubscriptionService,
    professionals: ProfessionalService,
    catalog: CatalogService,
    availability: AvailabilityService,
    appointments: AppointmentService,
}

impl BookingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: SqlitePool,
        config: BookingConfig,
        accounts: AccountService,
        subscriptions: SubscriptionService,
        professionals: ProfessionalService,
        catalog: CatalogService,
        availability: AvailabilityService,
        appointments: AppointmentService,
    ) -> Self {
        Self {
            pool,
            config,
            accounts,
            subscriptions,
            professionals,
            catalog,
            availability,
            appointments,
        }
    }

    /// 解析公开预约的商户；关闭预约、被暂停或无有效订阅的商户视为不存在
    pub async fn resolve_company(&self, slug: &str) -> CoreResult<Company> {
        let not_found = || CoreError::not_found("Business not found");
        let company = self
            .accounts
            .find_company_by_slug(slug.trim())
            .await?
            .ok_or_else(not_found)?;

        if !company.booking_enabled || company.suspended {
            return Err(not_found());
        }
        let sub = self.subscriptions.get(company.id).await?;
        if !sub.allows_access(Utc::now(), self.subscriptions.grace_days()) {
            return Err(not_found());
        }
        Ok(company)
    }

    pub async fn services(
        &self,
        company_id: i64,
        professional_id: Option<i64>,
    ) -> CoreResult<Vec<PublicService>> {
        Ok(sqlx::query_as::<_, PublicService>(
            "SELECT id, name, description, price, duration, color FROM services
             WHERE company_id = ?1 AND active = 1
               AND (?2 IS NULL OR id IN (
                   SELECT ps.service_id FROM professional_services ps
                   JOIN professionals p ON p.id = ps.professional_id
                   WHERE ps.professional_id = ?2 AND p.active = 1))
             ORDER BY name COLLATE NOCASE",
        )
        .bind(company_id)
        .bind(professional_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn professionals(
        &self,
        company_id: i64,
        service_id: Option<i64>,
    ) -> CoreResult<Vec<ProfessionalSummary>> {
        Ok(sqlx::query_as::<_, ProfessionalSummary>(
            "SELECT id, name, role, color FROM professionals
             WHERE company_id = ?1 AND active = 1
               AND (?2 IS NULL OR id IN (
                   SELECT professional_id FROM professional_services WHERE service_id = ?2))
             ORDER BY name COLLATE NOCASE",
        )
        .bind(company_id)
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// 校验专业人员与服务均在岗且存在提供关系
    async fn bookable_pair(
        &self,
        company_id: i64,
        service_id: i64,
        professional_id: i64,
    ) -> CoreResult<(Service, Professional)> {
        let service = self.catalog.get(company_id, service_id).await?;
        let professional = self.professionals.get(company_id, professional_id).await?;
        if !service.active || !professional.active {
            return Err(CoreError::not_found("Service or professional not available"));
        }
        if !self.catalog.is_offered_by(service_id, professional_id).await? {
            return Err(CoreError::bad_request(
                "This professional does not perform the selected service",
            ));
        }
        Ok((service, professional))
    }

    /// 预约日期须在今天到 `max_days_ahead` 天之内
    fn check_booking_window(&self, date: NaiveDate) -> CoreResult<()> {
        let today = today();
        if date < today {
            return Err(CoreError::bad_request("Cannot book a date in the past"));
        }
        if date > today + Duration::days(self.config.max_days_ahead) {
            return Err(CoreError::bad_request(format!(
                "Bookings are limited to {} days ahead",
                self.config.max_days_ahead
            )));
        }
        Ok(())
    }

    pub async fn availability(
        &self,
        company_id: i64,
        service_id: i64,
        professional_id: i64,
        date: NaiveDate,
    ) -> CoreResult<(Service, Professional, Vec<Slot>)> {
        let (service, professional) = self.bookable_pair(company_id, service_id, professional_id).await?;
        self.check_booking_window(date)?;
        let slots = self
            .availability
            .slots(professional_id, service.duration as u32, date)
            .await?;
        Ok((service, professional, slots))
    }

    /// 从今天起若干天的可预约情况，超过可预约范围的日期不返回
    pub async fn multi_day(
        &self,
        company_id: i64,
        service_id: i64,
        professional_id: i64,
        days: Option<u32>,
    ) -> CoreResult<Vec<DayAvailability>> {
        let days = days.unwrap_or(DEFAULT_MULTI_DAY);
        if !(1..=MAX_MULTI_DAY).contains(&days) {
            return Err(CoreError::bad_request(format!(
                "days must be between 1 and {}",
                MAX_MULTI_DAY
            )));
        }
        let (service, _) = self.bookable_pair(company_id, service_id, professional_id).await?;
        let horizon = (self.config.max_days_ahead + 1).max(1);
        let days = i64::from(days).min(horizon) as u32;

        self.availability
            .multi_day(professional_id, service.duration as u32, today(), days)
            .await
    }

    /// 公开预约；商户要求确认时预约为 pending 并返回确认令牌
    pub async fn book(
        &self,
        company: &Company,
        req: PublicBookingRequest,
    ) -> CoreResult<BookingCreatedResponse> {
        let date = parse_date(&req.date)?;
        let start = parse_time(&req.start_time)?;
        self.check_booking_window(date)?;
        self.bookable_pair(company.id, req.service_id, req.professional_id).await?;

        let confirmation_token = company
            .require_confirmation
            .then(|| Uuid::new_v4().simple().to_string());
        let detail = self
            .appointments
            .create(
                company.id,
                NewAppointment {
                    client: BookingClient::ByPhone {
                        name: req.client_name,
                        phone: req.client_phone,
                        email: blank_to_none(req.client_email).map(|e| e.to_lowercase()),
                    },
                    professional_id: req.professional_id,
                    service_id: req.service_id,
                    date,
                    start,
                    notes: req.notes,
                    price: None,
                    source: BookingSource::Online,
                    confirmation_token: confirmation_token.clone(),
                },
            )
            .await?;

        info!(
            "公开预约成功: 商户 {} 预约码 {} 状态 {}",
            company.slug, detail.appointment.booking_code, detail.appointment.status
        );
        let message = if confirmation_token.is_some() {
            "Booking received, awaiting confirmation"
        } else {
            "Booking confirmed"
        };
        Ok(BookingCreatedResponse {
            message: message.to_string(),
            booking_code: detail.appointment.booking_code.clone(),
            confirmation_token,
            appointment: PublicAppointment::new(
                &detail,
                PublicBusiness::from(company),
                self.can_cancel(&detail),
            ),
        })
    }

    /// 客户确认待确认的预约
    pub async fn confirm(&self, token: &str) -> CoreResult<PublicAppointment> {
        let detail = self.appointments.confirm_by_token(token).await?;
        let company = self.accounts.get_company(detail.appointment.company_id).await?;
        Ok(PublicAppointment::new(
            &detail,
            PublicBusiness::from(&company),
            self.can_cancel(&detail),
        ))
    }

    /// 距开始至少 `cancel_min_hours` 小时的待服务预约可由客户取消
    pub fn can_cancel(&self, detail: &AppointmentDetail) -> bool {
        let a = &detail.appointment;
        if !AppointmentStatus::parse(&a.status).is_some_and(|s| s.is_open()) {
            return false;
        }
        let Some(minute) = parse_hhmm(&a.start_time) else {
            return false;
        };
        starts_at(a.appointment_date, minute) - now_local()
            >= Duration::hours(self.config.cancel_min_hours)
    }

    pub async fn lookup(&self, code: &str) -> CoreResult<(AppointmentDetail, PublicAppointment)> {
        let detail = self
            .appointments
            .find_by_code(code)
            .await?
            .ok_or_else(|| CoreError::not_found("Appointment not found"))?;
        let company = self.accounts.get_company(detail.appointment.company_id).await?;
        let public = PublicAppointment::new(&detail, PublicBusiness::from(&company), self.can_cancel(&detail));
        Ok((detail, public))
    }

    /// 客户凭预约码与电话取消预约
    pub async fn cancel(
        &self,
        code: &str,
        phone: &str,
        reason: Option<String>,
    ) -> CoreResult<PublicAppointment> {
        let (detail, _) = self.lookup(code).await?;

        let on_record = detail.client.phone.as_deref().map(phone_digits);
        let provided = phone_digits(phone);
        if provided.is_empty() || on_record.as_deref() != Some(provided.as_str()) {
            warn!("预约码 {} 取消失败: 电话不匹配", detail.appointment.booking_code);
            return Err(CoreError::forbidden("Phone number does not match this booking"));
        }
        if !AppointmentStatus::parse(&detail.appointment.status).is_some_and(|s| s.is_open()) {
            return Err(CoreError::bad_request(
                "Only scheduled or pending appointments can be cancelled",
            ));
        }
        if !self.can_cancel(&detail) {
            return Err(CoreError::bad_request(format!(
                "Appointments can only be cancelled at least {} hours in advance",
                self.config.cancel_min_hours
            )));
        }

        let company_id = detail.appointment.company_id;
        let cancelled = self
            .appointments
            .cancel(company_id, detail.appointment.id, reason)
            .await?;
        let company = self.accounts.get_company(company_id).await?;
        Ok(PublicAppointment::new(&cancelled, PublicBusiness::from(&company), false))
    }
}
