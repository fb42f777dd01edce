use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, RescheduleStage};
use crate::models::event::{Event, EventInput};
use crate::models::settings::{SchedulingConfig, SchedulingContext};
use crate::models::suggestion::{
    OverbookedSuggestion, Slot, Suggestion, SuggestionKey, SuggestionMode,
};
use crate::models::telemetry::{TelemetryEventType, TelemetryRecord};
use crate::services::api_client::CalendarApi;
use crate::services::slot_finder;
use crate::services::suggestion_engine::SuggestionEngine;
use crate::services::telemetry::{record_for, TelemetrySink};

/// Session state around the pure suggestion engine: the last event list,
/// the dismissal set and the reschedule action. Telemetry is sent from
/// background tasks and never delays the caller.
pub struct SuggestionService {
    calendar: Arc<dyn CalendarApi>,
    telemetry: Arc<dyn TelemetrySink>,
    config: SchedulingConfig,
    events: RwLock<Vec<Event>>,
    dismissed: RwLock<HashSet<SuggestionKey>>,
    shown: RwLock<HashSet<SuggestionKey>>,
    pending_telemetry: Mutex<Vec<JoinHandle<()>>>,
}

impl SuggestionService {
    pub fn new(
        calendar: Arc<dyn CalendarApi>,
        telemetry: Arc<dyn TelemetrySink>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            calendar,
            telemetry,
            config,
            events: RwLock::new(Vec::new()),
            dismissed: RwLock::new(HashSet::new()),
            shown: RwLock::new(HashSet::new()),
            pending_telemetry: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    pub fn events(&self) -> Vec<Event> {
        read(&self.events).clone()
    }

    pub fn replace_events(&self, events: Vec<Event>) {
        *write(&self.events) = events;
    }

    pub fn dismissed_keys(&self) -> HashSet<SuggestionKey> {
        read(&self.dismissed).clone()
    }

    /// Waits for telemetry records already handed to background tasks.
    pub async fn flush_telemetry(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut pending = self
                .pending_telemetry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            pending.drain(..).collect()
        };
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(target: "app::telemetry", error = %err, "telemetry task aborted");
            }
        }
    }

    /// Re-lists events from the calendar. A failed call keeps the previous
    /// list and is reported to the caller.
    pub async fn reload_events(&self) -> AppResult<usize> {
        match self.calendar.list_events().await {
            Ok(events) => {
                let count = events.len();
                self.replace_events(events);
                Ok(count)
            }
            Err(err) => {
                warn!(
                    target: "app::suggestions",
                    error = %err,
                    "event list unavailable, keeping previous events"
                );
                Err(err)
            }
        }
    }

    /// Reloads events (stale list on failure), recomputes suggestions and
    /// reports newly shown ones.
    pub async fn refresh(
        &self,
        context: SchedulingContext,
        now: DateTime<Utc>,
    ) -> Vec<Suggestion> {
        let _ = self.reload_events().await;
        let suggestions = self.suggestions(context, now);

        let fresh: Vec<&Suggestion> = {
            let mut shown = write(&self.shown);
            suggestions
                .iter()
                .filter(|suggestion| shown.insert(suggestion.key()))
                .collect()
        };
        for suggestion in fresh {
            self.emit(
                TelemetryEventType::Shown,
                &suggestion.key(),
                None,
                json!({ "eventCount": suggestion.event_count() }),
                None,
            );
        }

        suggestions
    }

    pub fn suggestions(&self, context: SchedulingContext, now: DateTime<Utc>) -> Vec<Suggestion> {
        let events = self.events();
        let dismissed = self.dismissed_keys();
        SuggestionEngine::new(&self.config).compute(&events, now, context, &dismissed)
    }

    pub async fn dismiss(&self, key: SuggestionKey) {
        let inserted = write(&self.dismissed).insert(key);
        if inserted {
            info!(target: "app::suggestions", suggestion = %key, "suggestion dismissed");
            self.emit(TelemetryEventType::Dismissed, &key, None, JsonValue::Null, None);
        }
    }

    pub fn clear_dismissals(&self) {
        write(&self.dismissed).clear();
        write(&self.shown).clear();
    }

    /// Slots for moving an event off an overbooked day. Reschedule mode
    /// returns the precomputed slots for the candidate; any other event
    /// (always the case in user-pick mode) gets a fresh search.
    pub async fn show_slots(
        &self,
        suggestion: &Suggestion,
        event_id: Option<&str>,
        context: SchedulingContext,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Slot>> {
        let overbooked = require_overbooked(suggestion)?;
        let key = suggestion.key();

        let precomputed = overbooked.mode == SuggestionMode::Reschedule
            && match (event_id, overbooked.candidate_event.as_ref()) {
                (None, _) => true,
                (Some(id), Some(candidate)) => candidate.id == id,
                (Some(_), None) => false,
            };

        let slots = if precomputed {
            overbooked.available_slots.clone()
        } else {
            let id = event_id.ok_or_else(|| {
                AppError::validation("pick an event before asking for free slots")
            })?;
            self.lookup_event(id)?;
            let events = self.events();
            slot_finder::find_free_slots(&events, overbooked.date, now, context, &self.config)
        };

        self.emit(
            TelemetryEventType::SlotsViewed,
            &key,
            None,
            json!({
                "mode": overbooked.mode,
                "slotCount": slots.len(),
                "eventId": event_id,
            }),
            None,
        );

        Ok(slots)
    }

    /// Moves an event to `slot`: the replacement is created first, then the
    /// original is deleted. A failed delete removes the replacement again so
    /// the calendar is left as it was. Success dismisses the suggestion and
    /// reloads the event list.
    pub async fn reschedule_to_slot(
        &self,
        suggestion: &Suggestion,
        event_id: Option<&str>,
        slot: &Slot,
    ) -> AppResult<Event> {
        let overbooked = require_overbooked(suggestion)?;
        let key = suggestion.key();
        if slot.end <= slot.start {
            return Err(AppError::validation("slot must end after it starts"));
        }

        let target_id = match (event_id, overbooked.candidate_event.as_ref()) {
            (Some(id), _) => id.to_string(),
            (None, Some(candidate)) => candidate.id.clone(),
            (None, None) => {
                return Err(AppError::validation("no event selected for rescheduling"));
            }
        };
        let original = self.lookup_event(&target_id).or_else(|err| {
            overbooked
                .candidate_event
                .as_ref()
                .filter(|candidate| candidate.id == target_id)
                .cloned()
                .ok_or(err)
        })?;

        let started = Instant::now();
        let input = EventInput::moved_from(&original, slot.start);

        let replacement = match self.calendar.create_event(&input).await {
            Ok(created) => created,
            Err(err) => {
                return Err(self.fail_reschedule(
                    &key,
                    RescheduleStage::CreateReplacement,
                    err,
                    started,
                ));
            }
        };

        if let Err(err) = self.calendar.delete_event(&original.id).await {
            if let Err(rollback) = self.calendar.delete_event(&replacement.id).await {
                warn!(
                    target: "app::suggestions",
                    replacement_id = %replacement.id,
                    error = %rollback,
                    "could not remove replacement event after failed delete"
                );
                let cause = format!("{err}; removing the replacement failed: {rollback}");
                self.emit(
                    TelemetryEventType::ActionFailed,
                    &key,
                    Some("reschedule"),
                    json!({
                        "stage": RescheduleStage::RollbackReplacement.as_str(),
                        "error": cause,
                        "replacementId": replacement.id,
                    }),
                    Some(elapsed_ms(started)),
                );
                // Both copies are on the calendar now.
                write(&self.events).push(replacement.clone());
                return Err(AppError::reschedule_left_replacement(cause, replacement.id));
            }
            return Err(self.fail_reschedule(
                &key,
                RescheduleStage::DeleteOriginal,
                err,
                started,
            ));
        }

        write(&self.dismissed).insert(key);

        let latency_ms = elapsed_ms(started);
        info!(
            target: "app::suggestions",
            suggestion = %key,
            original_id = %original.id,
            replacement_id = %replacement.id,
            latency_ms,
            "event rescheduled"
        );
        self.emit(
            TelemetryEventType::ActionTaken,
            &key,
            Some("reschedule"),
            json!({
                "originalId": original.id,
                "replacementId": replacement.id,
                "slotLabel": slot.label,
            }),
            Some(latency_ms),
        );

        if self.reload_events().await.is_err() {
            let mut events = write(&self.events);
            events.retain(|event| event.id != original.id);
            events.push(replacement.clone());
        }

        Ok(replacement)
    }

    fn lookup_event(&self, id: &str) -> AppResult<Event> {
        self.events()
            .into_iter()
            .find(|event| event.id == id)
            .ok_or_else(AppError::not_found)
    }

    fn fail_reschedule(
        &self,
        key: &SuggestionKey,
        stage: RescheduleStage,
        cause: AppError,
        started: Instant,
    ) -> AppError {
        warn!(
            target: "app::suggestions",
            suggestion = %key,
            stage = stage.as_str(),
            error = %cause,
            "reschedule failed"
        );
        self.emit(
            TelemetryEventType::ActionFailed,
            key,
            Some("reschedule"),
            json!({ "stage": stage.as_str(), "error": cause.to_string() }),
            Some(elapsed_ms(started)),
        );
        AppError::reschedule(stage, cause.to_string())
    }

    fn emit(
        &self,
        event_type: TelemetryEventType,
        key: &SuggestionKey,
        action: Option<&str>,
        metadata: JsonValue,
        latency_ms: Option<u64>,
    ) {
        let record = record_for(event_type, key, action, metadata, latency_ms);
        let Ok(runtime) = Handle::try_current() else {
            debug!(
                target: "app::telemetry",
                suggestion_id = %record.suggestion_id,
                "no async runtime, dropping telemetry"
            );
            return;
        };

        let sink = Arc::clone(&self.telemetry);
        let handle = runtime.spawn(send_telemetry(sink, record));
        let mut pending = self
            .pending_telemetry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.retain(|task| !task.is_finished());
        pending.push(handle);
    }
}

async fn send_telemetry(sink: Arc<dyn TelemetrySink>, record: TelemetryRecord) {
    if let Err(err) = sink.log(&record).await {
        warn!(
            target: "app::telemetry",
            suggestion_id = %record.suggestion_id,
            error = %err,
            "telemetry dropped"
        );
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn require_overbooked(suggestion: &Suggestion) -> AppResult<&OverbookedSuggestion> {
    suggestion.as_overbooked().ok_or_else(|| {
        AppError::validation("only overbooked-day suggestions can move events")
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
