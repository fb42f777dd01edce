use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::services::timezone::iso_instant;

/// Closed set of event categories. Unknown labels collapse to `Personal`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(from = "String")]
pub enum EventCategory {
    #[default]
    Personal,
    Work,
    Appointments,
    Activities,
    Reminders,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            EventCategory::Personal => "Personal",
            EventCategory::Work => "Work",
            EventCategory::Appointments => "Appointments",
            EventCategory::Activities => "Activities",
            EventCategory::Reminders => "Reminders",
        }
    }

    pub fn from_label(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "work" => EventCategory::Work,
            "appointments" | "appointment" => EventCategory::Appointments,
            "activities" | "activity" => EventCategory::Activities,
            "reminders" | "reminder" => EventCategory::Reminders,
            _ => EventCategory::Personal,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EventCategory {
    fn from(value: String) -> Self {
        EventCategory::from_label(&value)
    }
}

/// A calendar event as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(deserialize_with = "deserialize_event_id")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub category: EventCategory,
    #[serde(with = "iso_instant")]
    pub datetime_utc: DateTime<Utc>,
    #[serde(default)]
    pub reminder: bool,
}

/// Payload for creating an event through the calendar collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventInput {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: EventCategory,
    #[serde(with = "iso_instant")]
    pub datetime_utc: DateTime<Utc>,
    #[serde(default)]
    pub reminder: bool,
}

impl EventInput {
    /// Copy of `event` moved to `start`.
    pub fn moved_from(event: &Event, start: DateTime<Utc>) -> Self {
        Self {
            title: event.title.clone(),
            description: event.description.clone(),
            category: event.category,
            datetime_utc: start,
            reminder: event.reminder,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<EventCategory>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "iso_instant::option"
    )]
    pub datetime_utc: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<bool>,
}

fn deserialize_event_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::String(value) => Ok(value),
        JsonValue::Number(value) => Ok(value.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "unsupported event id: {other}"
        ))),
    }
}
