//! 可预约时段查询
//!
//! 在排班计算之上叠加存储：工作时间、停诊日期与已占用的预约。

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::app::professionals::ProfessionalService;
use crate::app::scheduling::{
    compute_slots, current_minute, day_of_week, format_hhmm, is_bookable, today, DaySchedule,
    Interval, BLOCKING_STATUSES,
};
use crate::core::error::CoreResult;

/// 对外的时段格式
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub start_time: String,
    pub end_time: String,
}

impl From<Interval> for Slot {
    fn from(interval: Interval) -> Self {
        Self {
            start_time: format_hhmm(interval.start),
            end_time: format_hhmm(interval.end),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub available: bool,
    pub slots: Vec<Slot>,
}

#[derive(Clone)]
pub struct AvailabilityService {
    pool: SqlitePool,
    professionals: ProfessionalService,
    step: u32,
}

impl AvailabilityService {
    pub fn new(pool: SqlitePool, professionals: ProfessionalService, step: u32) -> Self {
        Self {
            pool,
            professionals,
            step,
        }
    }

    /// 当天的工作时间；停诊或未排班返回 `None`
    pub async fn day_schedule(
        &self,
        professional_id: i64,
        date: NaiveDate,
    ) -> CoreResult<Option<DaySchedule>> {
        if self.professionals.is_blocked(professional_id, date).await? {
            return Ok(None);
        }
        Ok(self
            .professionals
            .working_hours_for_day(professional_id, day_of_week(date))
            .await?
            .and_then(|row| row.schedule()))
    }

    /// 当天已占用的时段
    pub async fn busy_intervals(
        &self,
        professional_id: i64,
        date: NaiveDate,
        exclude_appointment_id: Option<i64>,
    ) -> CoreResult<Vec<Interval>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT start_minute, end_minute FROM appointments
             WHERE professional_id = ? AND appointment_date = ? AND status IN (?, ?, ?) AND id != ?",
        )
        .bind(professional_id)
        .bind(date)
        .bind(BLOCKING_STATUSES[0])
        .bind(BLOCKING_STATUSES[1])
        .bind(BLOCKING_STATUSES[2])
        .bind(exclude_appointment_id.unwrap_or(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(start, end)| Interval::new(start as u32, end as u32))
            .collect())
    }

    pub async fn has_conflict(
        &self,
        professional_id: i64,
        date: NaiveDate,
        slot: &Interval,
        exclude_appointment_id: Option<i64>,
    ) -> CoreResult<bool> {
        let busy = self
            .busy_intervals(professional_id, date, exclude_appointment_id)
            .await?;
        Ok(busy.iter().any(|b| b.overlaps(slot)))
    }

    /// 时段是否落在工作时间内、避开休息与已有预约，且不早于当前时间
    pub async fn is_slot_bookable(
        &self,
        professional_id: i64,
        date: NaiveDate,
        slot: &Interval,
    ) -> CoreResult<bool> {
        let today = today();
        if date < today || (date == today && slot.start < current_minute()) {
            return Ok(false);
        }
        let Some(day) = self.day_schedule(professional_id, date).await? else {
            return Ok(false);
        };
        let busy = self.busy_intervals(professional_id, date, None).await?;
        Ok(is_bookable(&day, &busy, slot))
    }

    /// 某天可预约的时段
    pub async fn slots(
        &self,
        professional_id: i64,
        duration: u32,
        date: NaiveDate,
    ) -> CoreResult<Vec<Slot>> {
        let today = today();
        if date < today {
            return Ok(Vec::new());
        }
        let Some(day) = self.day_schedule(professional_id, date).await? else {
            return Ok(Vec::new());
        };

        let busy = self.busy_intervals(professional_id, date, None).await?;
        let not_before = if date == today { current_minute() } else { 0 };
        Ok(compute_slots(&day, &busy, duration, self.step, not_before)
            .into_iter()
            .map(Slot::from)
            .collect())
    }

    /// 从 `start` 起连续 `days` 天的可预约情况
    pub async fn multi_day(
        &self,
        professional_id: i64,
        duration: u32,
        start: NaiveDate,
        days: u32,
    ) -> CoreResult<Vec<DayAvailability>> {
        let mut result = Vec::with_capacity(days as usize);
        for offset in 0..i64::from(days) {
            let date = start + Duration::days(offset);
            let slots = self.slots(professional_id, duration, date).await?;
            result.push(DayAvailability {
                date,
                available: !slots.is_empty(),
                slots,
            });
        }
        Ok(result)
    }
}
