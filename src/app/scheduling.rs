//! 排班计算
//!
//! 一天内的时间以"从零点起的分钟数"表示，区间均为左闭右开 `[start, end)`。

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::core::error::{CoreError, CoreResult};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// 会占用时段的预约状态
pub const BLOCKING_STATUSES: [&str; 3] = ["pending", "scheduled", "completed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: u32,
    pub end: u32,
}

impl Interval {
    /// 构造区间；要求 `start < end` 且不跨过午夜
    pub fn new(start: u32, end: u32) -> Option<Self> {
        (start < end && end <= MINUTES_PER_DAY).then_some(Self { start, end })
    }

    pub fn starting_at(start: u32, duration: u32) -> Option<Self> {
        Self::new(start, start.checked_add(duration)?)
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// 某一天的工作时间窗口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySchedule {
    pub window: Interval,
    pub breaks: Vec<Interval>,
}

/// 计算可预约时段
///
/// 候选起点从窗口开始按 `step` 递增；`not_before` 之前的起点跳过（用于当天已过去的时间）。
pub fn compute_slots(
    day: &DaySchedule,
    busy: &[Interval],
    duration: u32,
    step: u32,
    not_before: u32,
) -> Vec<Interval> {
    if duration == 0 || step == 0 {
        return Vec::new();
    }

    let mut slots = Vec::new();
    let mut start = day.window.start;
    while let Some(candidate) = Interval::starting_at(start, duration) {
        if candidate.end > day.window.end {
            break;
        }
        let free = start >= not_before
            && !day.breaks.iter().any(|b| b.overlaps(&candidate))
            && !busy.iter().any(|b| b.overlaps(&candidate));
        if free {
            slots.push(candidate);
        }
        start += step;
    }
    slots
}

/// 判断某个时段在当天排班下是否可预约（不考虑步长对齐）
pub fn is_bookable(day: &DaySchedule, busy: &[Interval], slot: &Interval) -> bool {
    day.window.contains(slot)
        && !day.breaks.iter().any(|b| b.overlaps(slot))
        && !busy.iter().any(|b| b.overlaps(slot))
}

/// 星期几，0 表示周一
pub fn day_of_week(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_monday()
}

/// 服务器本地日期
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// 服务器本地时间（从零点起的分钟数）
pub fn current_minute() -> u32 {
    let now = Local::now();
    now.hour() * 60 + now.minute()
}

pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

/// 某天某分钟对应的本地时刻
pub fn starts_at(date: NaiveDate, minute: u32) -> NaiveDateTime {
    let time = NaiveTime::from_num_seconds_from_midnight_opt(minute.min(MINUTES_PER_DAY - 1) * 60, 0)
        .unwrap_or(NaiveTime::MIN);
    date.and_time(time)
}

/// 解析 `HH:MM`（兼容 `HH:MM:SS`，秒被忽略）
pub fn parse_hhmm(value: &str) -> Option<u32> {
    let mut parts = value.trim().split(':');
    let hours: u32 = parts.next()?.parse().ok()?;
    let minutes: u32 = parts.next()?.parse().ok()?;
    if let Some(seconds) = parts.next() {
        seconds.parse::<u32>().ok().filter(|s| *s < 60)?;
    }
    if parts.next().is_some() || hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

pub fn format_hhmm(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn parse_time(value: &str) -> CoreResult<u32> {
    parse_hhmm(value).ok_or_else(|| CoreError::bad_request("Invalid time format. Use HH:MM"))
}

pub fn parse_date(value: &str) -> CoreResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::bad_request("Invalid date format. Use YYYY-MM-DD"))
}

pub fn parse_optional_date(value: &Option<String>) -> CoreResult<Option<NaiveDate>> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(parse_date)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: &str, end: &str) -> Interval {
        Interval::new(parse_hhmm(start).unwrap(), parse_hhmm(end).unwrap()).unwrap()
    }

    fn workday() -> DaySchedule {
        DaySchedule {
            window: iv("09:00", "12:00"),
            breaks: vec![iv("10:00", "10:30")],
        }
    }

    #[test]
    fn test_overlap_is_half_open() {
        assert!(iv("09:00", "10:00").overlaps(&iv("09:30", "10:30")));
        assert!(!iv("09:00", "10:00").overlaps(&iv("10:00", "11:00")));
        assert!(iv("09:00", "12:00").overlaps(&iv("10:00", "10:15")));
    }

    #[test]
    fn test_interval_rejects_midnight_crossing() {
        assert!(Interval::starting_at(23 * 60 + 30, 60).is_none());
        assert!(Interval::starting_at(23 * 60, 60).is_some());
        assert!(Interval::new(600, 600).is_none());
    }

    #[test]
    fn test_slots_skip_break_and_busy() {
        let busy = [iv("11:00", "11:30")];
        let slots: Vec<String> = compute_slots(&workday(), &busy, 30, 30, 0)
            .into_iter()
            .map(|s| format_hhmm(s.start))
            .collect();
        assert_eq!(slots, vec!["09:00", "09:30", "10:30", "11:30"]);
    }

    #[test]
    fn test_slots_long_service_must_fit_window() {
        let slots = compute_slots(&workday(), &[], 60, 30, 0);
        let starts: Vec<String> = slots.iter().map(|s| format_hhmm(s.start)).collect();
        assert_eq!(starts, vec!["09:00", "10:30", "11:00"]);
        assert!(slots.iter().all(|s| s.end <= parse_hhmm("12:00").unwrap()));
    }

    #[test]
    fn test_slots_respect_not_before() {
        let slots = compute_slots(&workday(), &[], 30, 30, parse_hhmm("11:00").unwrap());
        let starts: Vec<String> = slots.iter().map(|s| format_hhmm(s.start)).collect();
        assert_eq!(starts, vec!["11:00", "11:30"]);
    }

    #[test]
    fn test_is_bookable() {
        let day = workday();
        assert!(is_bookable(&day, &[], &iv("09:15", "09:45")));
        assert!(!is_bookable(&day, &[], &iv("09:45", "10:15")));
        assert!(!is_bookable(&day, &[], &iv("11:45", "12:15")));
    }

    #[test]
    fn test_parse_and_format_time() {
        assert_eq!(parse_hhmm("09:05"), Some(545));
        assert_eq!(parse_hhmm("09:05:00"), Some(545));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("9h"), None);
        assert_eq!(format_hhmm(545), "09:05");
    }

    #[test]
    fn test_starts_at() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(starts_at(day, 9 * 60 + 30).to_string(), "2026-10-19 09:30:00");
    }

    #[test]
    fn test_day_of_week_starts_monday() {
        let monday = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(day_of_week(monday), 0);
        assert_eq!(day_of_week(monday + chrono::Duration::days(6)), 6);
    }

    #[test]
    fn test_parse_date() {
        assert!(parse_date("2026-10-19").is_ok());
        assert!(parse_date("19/10/2026").is_err());
        assert_eq!(parse_optional_date(&Some(String::new())).unwrap(), None);
    }
}
