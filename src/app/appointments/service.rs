//! 预约业务服务
//!
//! 创建、改期与恢复占用状态都要在预约锁内完成冲突检查，保证同一进程内不会产生重叠预约。

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::model::{
    AppointmentDetail, AppointmentDetailRow, AppointmentFilter, AppointmentRow, AppointmentStatus,
    AppointmentUpdateRequest, AvailabilityCheckResponse, BookingSource, CalendarEvent,
    CompleteRequest, FinancialReport, RevenueLine,
};
use crate::app::availability::AvailabilityService;
use crate::app::catalog::model::Service;
use crate::app::catalog::CatalogService;
use crate::app::clients::ClientService;
use crate::app::professionals::ProfessionalService;
use crate::app::scheduling::{format_hhmm, Interval};
use crate::core::auth::random_code;
use crate::core::error::{CoreError, CoreResult};
use crate::core::response::PageWindow;
use crate::core::validation::blank_to_none;

const DETAIL_SELECT: &str = "SELECT a.*,
        c.name AS client_name, c.phone AS client_phone, c.email AS client_email,
        p.name AS professional_name, p.color AS professional_color,
        s.name AS service_name, s.color AS service_color, s.duration AS service_duration
     FROM appointments a
     JOIN clients c ON c.id = a.client_id
     JOIN professionals p ON p.id = a.professional_id
     JOIN services s ON s.id = a.service_id";

const DETAIL_FILTER: &str = "a.company_id = ?1
     AND (?2 IS NULL OR a.appointment_date >= ?2)
     AND (?3 IS NULL OR a.appointment_date <= ?3)
     AND (?4 IS NULL OR a.professional_id = ?4)
     AND (?5 IS NULL OR a.client_id = ?5)
     AND (?6 IS NULL OR a.service_id = ?6)
     AND (?7 IS NULL OR a.status = ?7)";

const CANCELLED_COLOR: &str = "#9CA3AF";
const BOOKING_CODE_LEN: usize = 8;

/// 预约的客户来源
#[derive(Debug, Clone)]
pub enum BookingClient {
    /// 后台选择的已有客户
    Existing(i64),
    /// 公开预约按电话查找，找不到时新建
    ByPhone {
        name: String,
        phone: String,
        email: Option<String>,
    },
}

/// 新预约
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub client: BookingClient,
    pub professional_id: i64,
    pub service_id: i64,
    pub date: NaiveDate,
    pub start: u32,
    pub notes: Option<String>,
    pub price: Option<f64>,
    pub source: BookingSource,
    /// 有值时预约以 pending 状态保存，等待客户凭此令牌确认
    pub confirmation_token: Option<String>,
}

#[derive(Clone)]
pub struct AppointmentService {
    pool: SqlitePool,
    clients: ClientService,
    professionals: ProfessionalService,
    catalog: CatalogService,
    availability: AvailabilityService,
    booking_lock: Arc<Mutex<()>>,
}

impl AppointmentService {
    pub fn new(
        pool: SqlitePool,
        clients: ClientService,
        professionals: ProfessionalService,
        catalog: CatalogService,
        availability: AvailabilityService,
    ) -> Self {
        Self {
            pool,
            clients,
            professionals,
            catalog,
            availability,
            booking_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn fetch_details(
        &self,
        company_id: i64,
        filter: &AppointmentFilter,
        window: Option<PageWindow>,
        newest_first: bool,
    ) -> CoreResult<Vec<AppointmentDetail>> {
        let order = if newest_first { "DESC" } else { "ASC" };
        let (limit, offset) = window.map_or((-1, 0), |w| (w.limit(), w.offset()));

        let rows = sqlx::query_as::<_, AppointmentDetailRow>(&format!(
            "{} WHERE {} ORDER BY a.appointment_date {order}, a.start_minute {order}, a.id {order}
             LIMIT ?8 OFFSET ?9",
            DETAIL_SELECT, DETAIL_FILTER
        ))
        .bind(company_id)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.professional_id)
        .bind(filter.client_id)
        .bind(filter.service_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AppointmentDetail::from).collect())
    }

    /// 分页列出预约，最新的在前
    pub async fn list(
        &self,
        company_id: i64,
        filter: &AppointmentFilter,
        window: PageWindow,
    ) -> CoreResult<(Vec<AppointmentDetail>, i64)> {
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM appointments a WHERE {}",
            DETAIL_FILTER
        ))
        .bind(company_id)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.professional_id)
        .bind(filter.client_id)
        .bind(filter.service_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await?;

        let appointments = self.fetch_details(company_id, filter, Some(window), true).await?;
        Ok((appointments, total))
    }

    /// 不分页，按时间先后
    pub async fn list_all(
        &self,
        company_id: i64,
        filter: &AppointmentFilter,
    ) -> CoreResult<Vec<AppointmentDetail>> {
        self.fetch_details(company_id, filter, None, false).await
    }

    pub async fn get_detail(&self, company_id: i64, id: i64) -> CoreResult<AppointmentDetail> {
        sqlx::query_as::<_, AppointmentDetailRow>(&format!(
            "{} WHERE a.id = ? AND a.company_id = ?",
            DETAIL_SELECT
        ))
        .bind(id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?
        .map(AppointmentDetail::from)
        .ok_or_else(|| CoreError::not_found("Appointment not found"))
    }

    pub async fn find_by_code(&self, code: &str) -> CoreResult<Option<AppointmentDetail>> {
        Ok(sqlx::query_as::<_, AppointmentDetailRow>(&format!(
            "{} WHERE a.booking_code = ?",
            DETAIL_SELECT
        ))
        .bind(code.trim().to_uppercase())
        .fetch_optional(&self.pool)
        .await?
        .map(AppointmentDetail::from))
    }

    async fn get_row(&self, company_id: i64, id: i64) -> CoreResult<AppointmentRow> {
        sqlx::query_as::<_, AppointmentRow>(
            "SELECT * FROM appointments WHERE id = ? AND company_id = ?",
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::not_found("Appointment not found"))
    }

    /// 校验专业人员与服务可用，并返回服务与预约时段
    async fn resolve_slot(
        &self,
        company_id: i64,
        professional_id: i64,
        service_id: i64,
        start: u32,
    ) -> CoreResult<(Service, Interval)> {
        let professional = self.professionals.get(company_id, professional_id).await?;
        if !professional.active {
            return Err(CoreError::bad_request("Professional is not active"));
        }
        let service = self.catalog.get(company_id, service_id).await?;
        if !service.active {
            return Err(CoreError::bad_request("Service is not active"));
        }
        if !self.catalog.is_offered_by(service_id, professional_id).await? {
            return Err(CoreError::bad_request(
                "This professional does not perform the selected service",
            ));
        }

        let duration = u32::try_from(service.duration).unwrap_or(0);
        let slot = Interval::starting_at(start, duration)
            .ok_or_else(|| CoreError::bad_request("Appointment must end before midnight"))?;
        Ok((service, slot))
    }

    async fn unique_booking_code(&self) -> CoreResult<String> {
        for _ in 0..5 {
            let code = random_code(BOOKING_CODE_LEN);
            let taken: Option<i64> =
                sqlx::query_scalar("SELECT id FROM appointments WHERE booking_code = ?")
                    .bind(&code)
                    .fetch_optional(&self.pool)
                    .await?;
            if taken.is_none() {
                return Ok(code);
            }
        }
        Err(CoreError::internal("Could not allocate a booking code"))
    }

    pub async fn create(&self, company_id: i64, new: NewAppointment) -> CoreResult<AppointmentDetail> {
        if let BookingClient::Existing(client_id) = &new.client {
            self.clients.get(company_id, *client_id).await?;
        }
        let (service, slot) = self
            .resolve_slot(company_id, new.professional_id, new.service_id, new.start)
            .await?;
        let price = new.price.unwrap_or(service.price);
        if price < 0.0 {
            return Err(CoreError::bad_request("Price cannot be negative"));
        }

        let guard = self.booking_lock.lock().await;
        let free = match new.source {
            BookingSource::Online => {
                self.availability
                    .is_slot_bookable(new.professional_id, new.date, &slot)
                    .await?
            }
            BookingSource::Dashboard => {
                !self
                    .availability
                    .has_conflict(new.professional_id, new.date, &slot, None)
                    .await?
            }
        };
        if !free {
            warn!(
                "预约时段冲突: professional={} {} {}",
                new.professional_id,
                new.date,
                format_hhmm(slot.start)
            );
            return Err(CoreError::conflict("The selected time slot is not available"));
        }

        let code = self.unique_booking_code().await?;
        // 时段确认可用后才登记新客户，冲突的预约不会留下客户记录
        let client_id = match new.client {
            BookingClient::Existing(id) => id,
            BookingClient::ByPhone { name, phone, email } => {
                self.clients
                    .find_or_create_by_phone(company_id, &name, &phone, email)
                    .await?
                    .id
            }
        };
        let status = if new.confirmation_token.is_some() {
            AppointmentStatus::Pending
        } else {
            AppointmentStatus::Scheduled
        };
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO appointments
                (company_id, client_id, professional_id, service_id, appointment_date, start_minute,
                 end_minute, status, notes, price, booking_code, source, confirmation_token,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(company_id)
        .bind(client_id)
        .bind(new.professional_id)
        .bind(new.service_id)
        .bind(new.date)
        .bind(i64::from(slot.start))
        .bind(i64::from(slot.end))
        .bind(status.as_str())
        .bind(blank_to_none(new.notes))
        .bind(price)
        .bind(&code)
        .bind(new.source.as_str())
        .bind(new.confirmation_token.as_deref())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        drop(guard);

        info!(
            "新预约 {} ({}, {}): 商户 {} 专业人员 {} {} {}",
            id,
            code,
            status.as_str(),
            company_id,
            new.professional_id,
            new.date,
            format_hhmm(slot.start)
        );
        self.get_detail(company_id, id).await
    }

    /// 修改或改期
    pub async fn update(
        &self,
        company_id: i64,
        id: i64,
        req: AppointmentUpdateRequest,
        date: Option<NaiveDate>,
        start: Option<u32>,
    ) -> CoreResult<AppointmentDetail> {
        let current = self.get_row(company_id, id).await?;

        let client_id = req.client_id.unwrap_or(current.client_id);
        if client_id != current.client_id {
            self.clients.get(company_id, client_id).await?;
        }
        let professional_id = req.professional_id.unwrap_or(current.professional_id);
        let service_id = req.service_id.unwrap_or(current.service_id);
        let date = date.unwrap_or(current.appointment_date);
        let start = start.unwrap_or(current.start_minute as u32);

        // 只改备注、客户或价格时沿用原时段，不因专业人员或服务停用而拒绝
        let reschedule = professional_id != current.professional_id
            || service_id != current.service_id
            || date != current.appointment_date
            || i64::from(start) != current.start_minute;
        let (new_service_price, slot) = if reschedule {
            let (service, slot) = self
                .resolve_slot(company_id, professional_id, service_id, start)
                .await?;
            (Some(service.price), slot)
        } else {
            let slot = Interval::new(current.start_minute as u32, current.end_minute as u32)
                .ok_or_else(|| CoreError::internal("Stored appointment has an invalid time range"))?;
            (None, slot)
        };
        let price = match (req.price, new_service_price) {
            (Some(price), _) if price < 0.0 => {
                return Err(CoreError::bad_request("Price cannot be negative"))
            }
            (Some(price), _) => price,
            (None, Some(service_price)) if service_id != current.service_id => service_price,
            _ => current.price,
        };
        let notes = match req.notes {
            Some(notes) => blank_to_none(Some(notes)),
            None => current.notes.clone(),
        };

        let guard = self.booking_lock.lock().await;
        if reschedule
            && current.status().occupies_slot()
            && self
                .availability
                .has_conflict(professional_id, date, &slot, Some(id))
                .await?
        {
            return Err(CoreError::conflict("The selected time slot is not available"));
        }

        sqlx::query(
            "UPDATE appointments
             SET client_id = ?, professional_id = ?, service_id = ?, appointment_date = ?,
                 start_minute = ?, end_minute = ?, notes = ?, price = ?, updated_at = ?
             WHERE id = ? AND company_id = ?",
        )
        .bind(client_id)
        .bind(professional_id)
        .bind(service_id)
        .bind(date)
        .bind(i64::from(slot.start))
        .bind(i64::from(slot.end))
        .bind(notes)
        .bind(price)
        .bind(Utc::now())
        .bind(id)
        .bind(company_id)
        .execute(&self.pool)
        .await?;
        drop(guard);

        self.get_detail(company_id, id).await
    }

    pub async fn delete(&self, company_id: i64, id: i64) -> CoreResult<()> {
        self.get_row(company_id, id).await?;
        sqlx::query("DELETE FROM appointments WHERE id = ? AND company_id = ?")
            .bind(id)
            .bind(company_id)
            .execute(&self.pool)
            .await?;
        info!("商户 {} 删除预约 {}", company_id, id);
        Ok(())
    }

    /// 修改状态；从取消/缺席恢复为占用状态时重新检查冲突
    pub async fn set_status(
        &self,
        company_id: i64,
        id: i64,
        status: AppointmentStatus,
        notes: Option<String>,
    ) -> CoreResult<AppointmentDetail> {
        if status == AppointmentStatus::Pending {
            return Err(CoreError::bad_request(
                "Pending status is only set by bookings awaiting client confirmation",
            ));
        }
        let current = self.get_row(company_id, id).await?;

        let guard = self.booking_lock.lock().await;
        if status.occupies_slot() && !current.status().occupies_slot() {
            let slot = Interval::new(current.start_minute as u32, current.end_minute as u32)
                .ok_or_else(|| CoreError::internal("Stored appointment has an invalid time range"))?;
            if self
                .availability
                .has_conflict(current.professional_id, current.appointment_date, &slot, Some(id))
                .await?
            {
                return Err(CoreError::conflict(
                    "The time slot has been taken by another appointment",
                ));
            }
        }

        sqlx::query(
            "UPDATE appointments SET status = ?, notes = COALESCE(?, notes), updated_at = ?
             WHERE id = ? AND company_id = ?",
        )
        .bind(status.as_str())
        .bind(blank_to_none(notes))
        .bind(Utc::now())
        .bind(id)
        .bind(company_id)
        .execute(&self.pool)
        .await?;
        drop(guard);

        info!("预约 {} 状态: {} -> {}", id, current.status, status.as_str());
        self.get_detail(company_id, id).await
    }

    /// 完成服务并记录最终价格与支付方式
    pub async fn complete(
        &self,
        company_id: i64,
        id: i64,
        req: CompleteRequest,
    ) -> CoreResult<AppointmentDetail> {
        let current = self.get_row(company_id, id).await?;
        match current.status() {
            AppointmentStatus::Cancelled => {
                return Err(CoreError::bad_request("Cannot complete a cancelled appointment"))
            }
            AppointmentStatus::NoShow => {
                return Err(CoreError::bad_request("Cannot complete a no-show appointment"))
            }
            _ => {}
        }

        let price = req.custom_price.unwrap_or(current.price);
        if price < 0.0 {
            return Err(CoreError::bad_request("Price cannot be negative"));
        }

        sqlx::query(
            "UPDATE appointments
             SET status = ?, price = ?, payment_method = COALESCE(?, payment_method),
                 notes = COALESCE(?, notes), updated_at = ?
             WHERE id = ? AND company_id = ?",
        )
        .bind(AppointmentStatus::Completed.as_str())
        .bind(price)
        .bind(blank_to_none(req.payment_method))
        .bind(blank_to_none(req.notes))
        .bind(Utc::now())
        .bind(id)
        .bind(company_id)
        .execute(&self.pool)
        .await?;

        info!("预约 {} 已完成, 金额 {:.2}", id, price);
        self.get_detail(company_id, id).await
    }

    /// 取消待服务或待确认的预约
    pub async fn cancel(
        &self,
        company_id: i64,
        id: i64,
        reason: Option<String>,
    ) -> CoreResult<AppointmentDetail> {
        let current = self.get_row(company_id, id).await?;
        if !current.status().is_open() {
            return Err(CoreError::bad_request(
                "Only scheduled or pending appointments can be cancelled",
            ));
        }

        sqlx::query(
            "UPDATE appointments SET status = ?, cancel_reason = ?, updated_at = ?
             WHERE id = ? AND company_id = ?",
        )
        .bind(AppointmentStatus::Cancelled.as_str())
        .bind(blank_to_none(reason))
        .bind(Utc::now())
        .bind(id)
        .bind(company_id)
        .execute(&self.pool)
        .await?;

        info!("预约 {} 已取消", id);
        self.get_detail(company_id, id).await
    }

    /// 客户凭确认令牌确认待确认的公开预约，令牌只能使用一次
    pub async fn confirm_by_token(&self, token: &str) -> CoreResult<AppointmentDetail> {
        let row = sqlx::query_as::<_, AppointmentRow>(
            "SELECT * FROM appointments WHERE confirmation_token = ?",
        )
        .bind(token.trim())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::not_found("Confirmation token not found"))?;
        if row.status() != AppointmentStatus::Pending {
            return Err(CoreError::bad_request("Appointment is not awaiting confirmation"));
        }

        sqlx::query(
            "UPDATE appointments SET status = ?, confirmation_token = NULL, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(AppointmentStatus::Scheduled.as_str())
        .bind(Utc::now())
        .bind(row.id)
        .bind(AppointmentStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        info!("预约 {} ({}) 已由客户确认", row.id, row.booking_code);
        self.get_detail(row.company_id, row.id).await
    }

    pub async fn calendar(
        &self,
        company_id: i64,
        start: NaiveDate,
        end: NaiveDate,
        professional_id: Option<i64>,
    ) -> CoreResult<Vec<CalendarEvent>> {
        let filter = AppointmentFilter {
            start_date: Some(start),
            end_date: Some(end),
            professional_id,
            ..Default::default()
        };
        let appointments = self.list_all(company_id, &filter).await?;
        Ok(appointments.into_iter().map(calendar_event).collect())
    }

    /// 检查时段是否与其他预约冲突，同时给出是否在工作时间内
    pub async fn check_availability(
        &self,
        company_id: i64,
        professional_id: i64,
        service_id: i64,
        date: NaiveDate,
        start: u32,
        exclude_appointment_id: Option<i64>,
    ) -> CoreResult<AvailabilityCheckResponse> {
        let (_, slot) = self
            .resolve_slot(company_id, professional_id, service_id, start)
            .await?;
        let conflict = self
            .availability
            .has_conflict(professional_id, date, &slot, exclude_appointment_id)
            .await?;
        let within_working_hours = self
            .availability
            .day_schedule(professional_id, date)
            .await?
            .map_or(false, |day| {
                day.window.contains(&slot) && !day.breaks.iter().any(|b| b.overlaps(&slot))
            });

        Ok(AvailabilityCheckResponse {
            available: !conflict,
            end_time: format_hhmm(slot.end),
            within_working_hours,
        })
    }

    pub async fn financial_report(
        &self,
        company_id: i64,
        start: NaiveDate,
        end: NaiveDate,
        professional_id: Option<i64>,
        service_id: Option<i64>,
    ) -> CoreResult<FinancialReport> {
        let filter = AppointmentFilter {
            start_date: Some(start),
            end_date: Some(end),
            professional_id,
            service_id,
            status: Some(AppointmentStatus::Completed),
            ..Default::default()
        };
        let completed = self.list_all(company_id, &filter).await?;
        Ok(summarize(start, end, &completed))
    }
}

fn calendar_event(detail: AppointmentDetail) -> CalendarEvent {
    let a = &detail.appointment;
    let color = if a.status == AppointmentStatus::Cancelled.as_str() {
        CANCELLED_COLOR.to_string()
    } else {
        detail.professional.color.clone()
    };
    CalendarEvent {
        id: a.id,
        title: format!("{} - {}", detail.service.name, detail.client.name),
        start: format!("{}T{}:00", a.appointment_date, a.start_time),
        end: format!("{}T{}:00", a.appointment_date, a.end_time),
        background_color: color.clone(),
        border_color: color,
        status: a.status.clone(),
        client_name: detail.client.name.clone(),
        professional_id: detail.professional.id,
        professional_name: detail.professional.name.clone(),
        service_name: detail.service.name.clone(),
    }
}

/// 汇总已完成预约的收入
pub fn summarize(start: NaiveDate, end: NaiveDate, completed: &[AppointmentDetail]) -> FinancialReport {
    fn add(lines: &mut BTreeMap<String, RevenueLine>, key: String, id: Option<i64>, name: &str, price: f64) {
        let line = lines.entry(key).or_insert_with(|| RevenueLine {
            id,
            name: name.to_string(),
            count: 0,
            revenue: 0.0,
        });
        line.count += 1;
        line.revenue += price;
    }

    let mut by_professional = BTreeMap::new();
    let mut by_service = BTreeMap::new();
    let mut by_payment = BTreeMap::new();
    let mut total_revenue = 0.0;

    for detail in completed {
        let price = detail.appointment.price;
        total_revenue += price;
        add(
            &mut by_professional,
            detail.professional.id.to_string(),
            Some(detail.professional.id),
            &detail.professional.name,
            price,
        );
        add(
            &mut by_service,
            detail.service.id.to_string(),
            Some(detail.service.id),
            &detail.service.name,
            price,
        );
        let method = detail
            .appointment
            .payment_method
            .clone()
            .unwrap_or_else(|| "unspecified".to_string());
        add(&mut by_payment, method.clone(), None, &method, price);
    }

    let sorted = |lines: BTreeMap<String, RevenueLine>| {
        let mut lines: Vec<RevenueLine> = lines.into_values().collect();
        lines.sort_by(|a, b| b.revenue.total_cmp(&a.revenue).then_with(|| a.name.cmp(&b.name)));
        lines
    };

    let total_appointments = completed.len() as i64;
    FinancialReport {
        start_date: start,
        end_date: end,
        total_appointments,
        total_revenue,
        average_ticket: if total_appointments > 0 {
            total_revenue / total_appointments as f64
        } else {
            0.0
        },
        by_professional: sorted(by_professional),
        by_service: sorted(by_service),
        by_payment_method: sorted(by_payment),
    }
}
