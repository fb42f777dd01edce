use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::suggestion::SuggestionKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryEventType {
    Shown,
    Dismissed,
    SlotsViewed,
    ActionTaken,
    ActionFailed,
}

/// One suggestion interaction record sent to the telemetry collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryRecord {
    pub event_type: TelemetryEventType,
    pub suggestion_type: SuggestionKind,
    pub suggestion_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub metadata: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub recorded_at: DateTime<Utc>,
}
