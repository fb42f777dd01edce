use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::event::EventCategory;

/// Where the resolved date came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    RelativeKeyword,
    NumericDate,
    MonthName,
    Default,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeSource {
    Explicit,
    TimeOfDay,
    Default,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEvent {
    pub title: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub category: EventCategory,
    pub confidence: f32,
    pub date_source: DateSource,
    pub time_source: TimeSource,
}

impl ExtractedEvent {
    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    pub fn time_string(&self) -> String {
        self.time.format("%H:%M").to_string()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExtractionFailure {
    #[error("message is empty")]
    EmptyMessage,
    #[error("date out of range: {offset_days} days from {reference}")]
    DateOutOfRange {
        reference: NaiveDate,
        offset_days: i64,
    },
}
