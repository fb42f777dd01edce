use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::settings::WeekendMode;
use crate::services::timezone;

/// Hours of a calendar day during which the engine may place events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayWindow {
    #[serde(with = "timezone::iso_instant")]
    pub start: DateTime<Utc>,
    #[serde(with = "timezone::iso_instant")]
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn contains(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start >= self.start && end <= self.end
    }
}

/// Local opening and closing hour for `date`.
pub fn window_hours(date: NaiveDate, mode: WeekendMode) -> (u32, u32) {
    match date.weekday() {
        Weekday::Sat | Weekday::Sun => match mode {
            WeekendMode::Relaxed => (9, 19),
            WeekendMode::Active => (7, 22),
        },
        _ => (7, 21),
    }
}

pub fn day_window(date: NaiveDate, zone: Tz, mode: WeekendMode) -> Option<DayWindow> {
    let (start_hour, end_hour) = window_hours(date, mode);
    let start = local_at(date, start_hour, zone)?;
    let end = local_at(date, end_hour, zone)?;
    Some(DayWindow { start, end })
}

pub fn local_at(date: NaiveDate, hour: u32, zone: Tz) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
    timezone::local_to_instant_with_dst_fallback(date.and_time(time), zone)
}

/// Half-open interval overlap: `[a_start, a_end)` and `[b_start, b_end)`.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

pub fn add_minutes(dt: DateTime<Utc>, minutes: i64) -> Option<DateTime<Utc>> {
    dt.checked_add_signed(Duration::minutes(minutes))
}

pub fn clamp_time_to_window(current: DateTime<Utc>, window_start: DateTime<Utc>) -> DateTime<Utc> {
    if current < window_start {
        window_start
    } else {
        current
    }
}

/// First instant at or after `current` that lies a whole number of steps
/// after `origin`.
pub fn align_to_step(
    current: DateTime<Utc>,
    origin: DateTime<Utc>,
    step_minutes: i64,
) -> DateTime<Utc> {
    if current <= origin || step_minutes <= 0 {
        return current.max(origin);
    }
    let step_seconds = step_minutes * 60;
    let elapsed = current.signed_duration_since(origin).num_seconds();
    let steps = (elapsed + step_seconds - 1) / step_seconds;
    origin + Duration::seconds(steps * step_seconds)
}

/// "Today", "Tomorrow", or the full weekday name.
pub fn relative_day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if today.succ_opt() == Some(date) {
        "Tomorrow".to_string()
    } else {
        date.format("%A").to_string()
    }
}

pub fn clock_label(instant: DateTime<Utc>, zone: Tz) -> String {
    timezone::format_in_zone(instant, zone, "%-I:%M %p")
}

pub fn slot_label(instant: DateTime<Utc>, zone: Tz, today: NaiveDate) -> String {
    let day = relative_day_label(timezone::local_date(instant, zone), today);
    format!("{} {}", day, clock_label(instant, zone))
}

pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
