use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::AppResult;
use crate::models::suggestion::SuggestionKey;
use crate::models::telemetry::{TelemetryEventType, TelemetryRecord};

/// Sink for suggestion interaction events. Implementations may fail; the
/// suggestion service logs and drops those failures.
#[async_trait::async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn log(&self, record: &TelemetryRecord) -> AppResult<()>;
}

pub fn record_for(
    event_type: TelemetryEventType,
    key: &SuggestionKey,
    action: Option<&str>,
    metadata: JsonValue,
    latency_ms: Option<u64>,
) -> TelemetryRecord {
    TelemetryRecord {
        event_type,
        suggestion_type: key.kind,
        suggestion_id: key.to_string(),
        action: action.map(|value| value.to_string()),
        metadata,
        latency_ms,
        recorded_at: Utc::now(),
    }
}

#[derive(Debug, Default)]
pub struct NoopTelemetry;

#[async_trait::async_trait]
impl TelemetrySink for NoopTelemetry {
    async fn log(&self, record: &TelemetryRecord) -> AppResult<()> {
        debug!(
            target: "app::telemetry",
            suggestion_id = %record.suggestion_id,
            event_type = ?record.event_type,
            "telemetry disabled, dropping record"
        );
        Ok(())
    }
}

/// Keeps records in memory; used by tests and offline sessions.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    records: Mutex<Vec<TelemetryRecord>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl TelemetrySink for MemoryTelemetry {
    async fn log(&self, record: &TelemetryRecord) -> AppResult<()> {
        if let Ok(mut guard) = self.records.lock() {
            guard.push(record.clone());
        }
        Ok(())
    }
}
