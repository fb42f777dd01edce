//! Conversions between stored UTC instants and the user's wall clock.
//!
//! Every function here fails closed: malformed input yields `None` or an
//! empty string, never a panic or an error, because the callers sit directly
//! under interactive form fields and list renderers.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone,
    Utc,
};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, warn};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

const TIMEZONE_ENV_VAR: &str = "TZ";
const TIMEZONE_FILE: &str = "/etc/timezone";
const LOCALTIME_LINK: &str = "/etc/localtime";

/// Local wall-clock parts used to populate edit forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalParts {
    pub date: String,
    pub time: String,
}

pub fn parse_timezone(raw: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Tz::from_str(trimmed).ok()
}

/// Best guess at the zone of the machine we run on; `UTC` when nothing
/// usable is configured.
pub fn detect_system_timezone() -> Tz {
    if let Ok(raw) = std::env::var(TIMEZONE_ENV_VAR) {
        if let Some(tz) = parse_timezone(raw.trim_start_matches(':')) {
            return tz;
        }
    }

    if let Ok(raw) = fs::read_to_string(TIMEZONE_FILE) {
        if let Some(tz) = parse_timezone(&raw) {
            return tz;
        }
    }

    if let Ok(target) = fs::read_link(LOCALTIME_LINK) {
        if let Some(tz) = zone_from_zoneinfo_path(&target) {
            return tz;
        }
    }

    debug!(target: "app::timezone", "no system timezone detected, using UTC");
    chrono_tz::UTC
}

fn zone_from_zoneinfo_path(path: &Path) -> Option<Tz> {
    let raw = path.to_string_lossy();
    let (_, name) = raw.split_once("zoneinfo/")?;
    parse_timezone(name)
}

/// Stored preference if it names a real zone, otherwise `fallback`.
pub fn resolve_timezone_or(stored: Option<&str>, fallback: impl FnOnce() -> Tz) -> Tz {
    match stored {
        Some(raw) => match parse_timezone(raw) {
            Some(tz) => tz,
            None => {
                warn!(target: "app::timezone", stored = %raw, "stored timezone invalid, using system zone");
                fallback()
            }
        },
        None => fallback(),
    }
}

pub fn resolve_active_timezone(stored: Option<&str>) -> Tz {
    resolve_timezone_or(stored, detect_system_timezone)
}

pub fn parse_local_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

pub fn parse_local_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .ok()
}

/// Ambiguous wall-clock times (DST fall-back) resolve to the earlier instant.
pub fn local_to_instant(local: NaiveDateTime, zone: Tz) -> Option<DateTime<Utc>> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// Like [`local_to_instant`], retrying once an hour later when the wall
/// clock falls inside a spring-forward gap.
pub fn local_to_instant_with_dst_fallback(local: NaiveDateTime, zone: Tz) -> Option<DateTime<Utc>> {
    local_to_instant(local, zone).or_else(|| {
        let shifted = local.checked_add_signed(Duration::hours(1))?;
        debug!(
            target: "app::timezone",
            zone = %zone.name(),
            requested = %local,
            shifted = %shifted,
            "local time falls in DST gap, retrying one hour later"
        );
        local_to_instant(shifted, zone)
    })
}

pub fn to_absolute(local_date: &str, local_time: &str, zone: Tz) -> Option<DateTime<Utc>> {
    let date = parse_local_date(local_date)?;
    let time = parse_local_time(local_time)?;
    local_to_instant(date.and_time(time), zone)
}

pub fn to_absolute_with_dst_fallback(
    local_date: &str,
    local_time: &str,
    zone: Tz,
) -> Option<DateTime<Utc>> {
    let date = parse_local_date(local_date)?;
    let time = parse_local_time(local_time)?;
    local_to_instant_with_dst_fallback(date.and_time(time), zone)
}

pub fn split_absolute(instant: DateTime<Utc>, zone: Tz) -> LocalParts {
    let local = instant.with_timezone(&zone);
    LocalParts {
        date: local.format(DATE_FORMAT).to_string(),
        time: local.format(TIME_FORMAT).to_string(),
    }
}

pub fn split_absolute_str(raw: &str, zone: Tz) -> Option<LocalParts> {
    parse_instant(raw).map(|instant| split_absolute(instant, zone))
}

/// Formats a stored ISO instant with a strftime `pattern`. Returns an empty
/// string for an unparseable instant or pattern.
pub fn format_absolute(raw: &str, zone: Tz, pattern: &str) -> String {
    match parse_instant(raw) {
        Some(instant) => format_in_zone(instant, zone, pattern),
        None => String::new(),
    }
}

pub fn format_in_zone(instant: DateTime<Utc>, zone: Tz, pattern: &str) -> String {
    if pattern.is_empty() {
        return String::new();
    }

    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        debug!(target: "app::timezone", %pattern, "rejected invalid format pattern");
        return String::new();
    }

    let local = instant.with_timezone(&zone);
    let mut out = String::new();
    if write!(out, "{}", local.format_with_items(items.into_iter())).is_err() {
        return String::new();
    }
    out
}

pub fn now_in_zone(zone: Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(&zone)
}

pub fn local_date(instant: DateTime<Utc>, zone: Tz) -> NaiveDate {
    instant.with_timezone(&zone).date_naive()
}

/// Parses an instant at the API boundary. Offset-less timestamps are taken
/// as UTC, which is how the backend stores them.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// serde adapter storing `DateTime<Utc>` as an ISO-8601 string.
pub mod iso_instant {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_instant(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_instant(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid instant: {raw}")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(instant) => serializer.serialize_str(&super::super::format_instant(*instant)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::super::parse_instant(&raw)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid instant: {raw}"))),
                None => Ok(None),
            }
        }
    }
}
