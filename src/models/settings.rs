use std::fmt;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeekendMode {
    #[default]
    Relaxed,
    Active,
}

impl WeekendMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WeekendMode::Relaxed => "relaxed",
            WeekendMode::Active => "active",
        }
    }
}

impl fmt::Display for WeekendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for WeekendMode {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "relaxed" => Ok(WeekendMode::Relaxed),
            "active" => Ok(WeekendMode::Active),
            other => Err(format!("unsupported weekend mode: {other}")),
        }
    }
}

/// Settings as exposed by the preferences collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserPreferences {
    #[serde(default)]
    pub weekend_mode: WeekendMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PreferencesPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekend_mode: Option<WeekendMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// Everything the scheduling engine needs to know about the user, passed in
/// explicitly on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulingContext {
    pub timezone: Tz,
    pub weekend_mode: WeekendMode,
}

impl SchedulingContext {
    pub fn new(timezone: Tz, weekend_mode: WeekendMode) -> Self {
        Self {
            timezone,
            weekend_mode,
        }
    }
}

/// Tunables of the suggestion engine and slot search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulingConfig {
    /// Duration assumed for every event; the backend does not store one.
    pub assumed_event_minutes: i64,
    pub slot_minutes: i64,
    pub step_minutes: i64,
    pub buffer_minutes: i64,
    pub max_slots: usize,
    pub overbooked_threshold: usize,
    pub overbooked_lookahead_days: i64,
    pub dense_block_min_events: usize,
    pub dense_block_window_minutes: i64,
    pub dense_block_earliest_hour: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            assumed_event_minutes: 60,
            slot_minutes: 60,
            step_minutes: 30,
            buffer_minutes: 15,
            max_slots: 4,
            overbooked_threshold: 6,
            overbooked_lookahead_days: 3,
            dense_block_min_events: 3,
            dense_block_window_minutes: 5 * 60,
            dense_block_earliest_hour: 6,
        }
    }
}
