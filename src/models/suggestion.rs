use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::event::Event;
use crate::services::timezone::iso_instant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Overbooked,
    DenseBlock,
}

impl SuggestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionKind::Overbooked => "overbooked",
            SuggestionKind::DenseBlock => "dense_block",
        }
    }
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a suggestion for dismissal purposes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionKey {
    pub kind: SuggestionKind,
    pub date: NaiveDate,
}

impl SuggestionKey {
    pub fn new(kind: SuggestionKind, date: NaiveDate) -> Self {
        Self { kind, date }
    }
}

impl fmt::Display for SuggestionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.date.format("%Y-%m-%d"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionMode {
    Reschedule,
    UserPick,
}

/// A free 60-minute window offered for a reschedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    #[serde(with = "iso_instant")]
    pub start: DateTime<Utc>,
    #[serde(with = "iso_instant")]
    pub end: DateTime<Utc>,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverbookedSuggestion {
    pub date: NaiveDate,
    pub day_name: String,
    pub event_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_event: Option<Event>,
    pub mode: SuggestionMode,
    pub available_slots: Vec<Slot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DenseBlockSuggestion {
    pub date: NaiveDate,
    pub event_count: usize,
    /// Hours from the first start to the last end, one decimal place.
    pub time_span: f64,
    pub message: String,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Suggestion {
    Overbooked(OverbookedSuggestion),
    DenseBlock(DenseBlockSuggestion),
}

impl Suggestion {
    pub fn kind(&self) -> SuggestionKind {
        match self {
            Suggestion::Overbooked(_) => SuggestionKind::Overbooked,
            Suggestion::DenseBlock(_) => SuggestionKind::DenseBlock,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            Suggestion::Overbooked(inner) => inner.date,
            Suggestion::DenseBlock(inner) => inner.date,
        }
    }

    pub fn key(&self) -> SuggestionKey {
        SuggestionKey::new(self.kind(), self.date())
    }

    pub fn event_count(&self) -> usize {
        match self {
            Suggestion::Overbooked(inner) => inner.event_count,
            Suggestion::DenseBlock(inner) => inner.event_count,
        }
    }

    pub fn as_overbooked(&self) -> Option<&OverbookedSuggestion> {
        match self {
            Suggestion::Overbooked(inner) => Some(inner),
            Suggestion::DenseBlock(_) => None,
        }
    }
}
