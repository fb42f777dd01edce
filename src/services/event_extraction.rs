//! Best-effort parsing of a chat message into a calendar event.
//!
//! The backend makes the final call on whether a message schedules
//! anything; this only decides whether to attach event metadata.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::models::event::EventInput;
use crate::models::extraction::{DateSource, ExtractedEvent, ExtractionFailure, TimeSource};
use crate::services::event_classifier::classify_text_scored;
use crate::services::timezone;

const DATE_MATCH_CONFIDENCE: f32 = 0.3;
const DATE_DEFAULT_CONFIDENCE: f32 = 0.1;
const TIME_EXPLICIT_CONFIDENCE: f32 = 0.3;
const TIME_OF_DAY_CONFIDENCE: f32 = 0.2;
const CATEGORY_MATCH_CONFIDENCE: f32 = 0.2;
const TITLE_CONFIDENCE: f32 = 0.2;

pub const DEFAULT_TITLE: &str = "Event";

static NEXT_WEEKDAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bnext\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .expect("next weekday pattern")
});

static RELATIVE_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(today|tomorrow|next\s+week)\b").expect("relative day pattern"));

static NUMERIC_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{4}))?\b").expect("numeric date pattern")
});

static MONTH_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\b",
    )
    .expect("month date pattern")
});

static EXPLICIT_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").expect("explicit time pattern")
});

static TIME_OF_DAY_RE: Lazy<Vec<(Regex, u32)>> = Lazy::new(|| {
    [
        ("morning", 9),
        ("afternoon", 14),
        ("evening", 18),
        ("night", 20),
        ("noon", 12),
        ("midnight", 0),
    ]
    .iter()
    .map(|(word, hour)| {
        let pattern = format!(r"(?i)\b{word}\b");
        (Regex::new(&pattern).expect("time of day pattern"), *hour)
    })
    .collect()
});

static STOPWORDS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(i\s+have|schedule|book|appointment|meeting)\b").expect("stopword pattern")
});

static TRAILING_PREPOSITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\b(at|on|for)$").expect("trailing preposition pattern"));

static LEADING_ARTICLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(a|an)\s+").expect("leading article pattern"));

const EVENT_INDICATORS: [&str; 20] = [
    "meeting",
    "appointment",
    "schedule",
    "book",
    "i have",
    "tomorrow",
    "today",
    "next week",
    "next",
    "at",
    "pm",
    "am",
    "doctor",
    "dentist",
    "gym",
    "workout",
    "lunch",
    "dinner",
    "birthday",
    "anniversary",
];

/// Cheap pre-filter for messages that look like scheduling requests. Plain
/// substring matching, so it over-matches ("that" contains "at").
pub fn is_event_message(text: &str) -> bool {
    let lowered = text.to_lowercase();
    EVENT_INDICATORS
        .iter()
        .any(|indicator| lowered.contains(indicator))
}

pub struct EventExtractor {
    timezone: Tz,
}

impl EventExtractor {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn extract(
        &self,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<ExtractedEvent, ExtractionFailure> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ExtractionFailure::EmptyMessage);
        }

        let local_now = now.with_timezone(&self.timezone);
        let today = local_now.date_naive();
        let mut confidence = 0.0f32;

        let (mut date, date_source) = resolve_date(trimmed, today)?;
        confidence += match date_source {
            DateSource::Default => DATE_DEFAULT_CONFIDENCE,
            _ => DATE_MATCH_CONFIDENCE,
        };

        let (time, time_source) = resolve_time(trimmed);
        confidence += match time_source {
            TimeSource::Explicit => TIME_EXPLICIT_CONFIDENCE,
            TimeSource::TimeOfDay => TIME_OF_DAY_CONFIDENCE,
            TimeSource::Default => 0.0,
        };

        if date_source == DateSource::Default && date.and_time(time) < local_now.naive_local() {
            date = shift_days(today, 1)?;
        }

        let (category, category_score) = classify_text_scored(trimmed);
        if category_score > 0 {
            confidence += CATEGORY_MATCH_CONFIDENCE;
        }

        let title = build_title(trimmed);
        if title != DEFAULT_TITLE {
            confidence += TITLE_CONFIDENCE;
        }

        let extracted = ExtractedEvent {
            title,
            date,
            time,
            category,
            confidence: confidence.min(1.0),
            date_source,
            time_source,
        };

        debug!(
            target: "app::extraction",
            title = %extracted.title,
            date = %extracted.date,
            time = %extracted.time,
            category = %extracted.category,
            confidence = extracted.confidence,
            "extracted event from message"
        );

        Ok(extracted)
    }

    /// Converts an extraction into a create payload in this extractor's zone.
    pub fn to_event_input(&self, extracted: &ExtractedEvent) -> Option<EventInput> {
        let start = timezone::local_to_instant_with_dst_fallback(
            extracted.date.and_time(extracted.time),
            self.timezone,
        )?;
        Some(EventInput {
            title: extracted.title.clone(),
            description: None,
            category: extracted.category,
            datetime_utc: start,
            reminder: false,
        })
    }
}

fn shift_days(reference: NaiveDate, offset_days: i64) -> Result<NaiveDate, ExtractionFailure> {
    reference
        .checked_add_signed(Duration::days(offset_days))
        .ok_or(ExtractionFailure::DateOutOfRange {
            reference,
            offset_days,
        })
}

fn resolve_date(text: &str, today: NaiveDate) -> Result<(NaiveDate, DateSource), ExtractionFailure> {
    if let Some(offset) = relative_day_offset(text, today) {
        return Ok((shift_days(today, offset)?, DateSource::RelativeKeyword));
    }

    if let Some(date) = NUMERIC_DATE_RE
        .captures_iter(text)
        .find_map(|caps| numeric_date(&caps, today))
    {
        return Ok((date, DateSource::NumericDate));
    }

    if let Some(date) = MONTH_DATE_RE
        .captures_iter(text)
        .find_map(|caps| month_name_date(&caps, today))
    {
        return Ok((date, DateSource::MonthName));
    }

    Ok((today, DateSource::Default))
}

fn relative_day_offset(text: &str, today: NaiveDate) -> Option<i64> {
    let lowered = text.to_lowercase();
    let keywords: Vec<String> = RELATIVE_DAY_RE
        .captures_iter(&lowered)
        .map(|caps| caps[1].split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();

    for (keyword, offset) in [("today", 0), ("tomorrow", 1), ("next week", 7)] {
        if keywords.iter().any(|found| found == keyword) {
            return Some(offset);
        }
    }

    let caps = NEXT_WEEKDAY_RE.captures(&lowered)?;
    let target = parse_weekday(&caps[1])?;
    let current = today.weekday().num_days_from_monday() as i64;
    let wanted = target.num_days_from_monday() as i64;
    let ahead = (wanted - current).rem_euclid(7);
    Some(if ahead == 0 { 7 } else { ahead })
}

fn parse_weekday(value: &str) -> Option<Weekday> {
    value.parse::<Weekday>().ok()
}

fn numeric_date(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let year: i32 = match caps.get(3) {
        Some(raw) => raw.as_str().parse().ok()?,
        None => today.year(),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_name_date(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let day: u32 = caps[1].parse().ok()?;
    let month = month_number(&caps[2].to_lowercase())?;
    NaiveDate::from_ymd_opt(today.year(), month, day)
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sept" | "sep" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn resolve_time(text: &str) -> (NaiveTime, TimeSource) {
    if let Some(time) = EXPLICIT_TIME_RE
        .captures_iter(text)
        .find_map(|caps| explicit_time(&caps))
    {
        return (time, TimeSource::Explicit);
    }

    for (pattern, hour) in TIME_OF_DAY_RE.iter() {
        if pattern.is_match(text) {
            if let Some(time) = NaiveTime::from_hms_opt(*hour, 0, 0) {
                return (time, TimeSource::TimeOfDay);
            }
        }
    }

    (NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default(), TimeSource::Default)
}

fn explicit_time(caps: &Captures<'_>) -> Option<NaiveTime> {
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(raw) => raw.as_str().parse().ok()?,
        None => 0,
    };
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = caps[3].eq_ignore_ascii_case("pm");
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn build_title(text: &str) -> String {
    let mut working = text.to_string();

    for pattern in [
        &*NEXT_WEEKDAY_RE,
        &*RELATIVE_DAY_RE,
        &*NUMERIC_DATE_RE,
        &*MONTH_DATE_RE,
        &*EXPLICIT_TIME_RE,
    ] {
        working = pattern.replace_all(&working, " ").into_owned();
    }
    for (pattern, _) in TIME_OF_DAY_RE.iter() {
        working = pattern.replace_all(&working, " ").into_owned();
    }
    working = STOPWORDS_RE.replace_all(&working, " ").into_owned();

    let mut title = working.split_whitespace().collect::<Vec<_>>().join(" ");
    loop {
        let stripped = TRAILING_PREPOSITION_RE
            .replace(&title, "")
            .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '!' | '?' | '-'))
            .to_string();
        if stripped == title {
            break;
        }
        title = stripped;
    }
    let title = LEADING_ARTICLE_RE.replace(&title, "").trim().to_string();

    if title.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    capitalize_first(&title)
}

fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
