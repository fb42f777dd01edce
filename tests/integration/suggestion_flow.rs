use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use donna_app_lib::error::{ApiErrorCode, AppError, AppResult, RescheduleStage};
use donna_app_lib::models::event::{Event, EventCategory, EventInput, EventPatch};
use donna_app_lib::models::settings::{SchedulingConfig, SchedulingContext, WeekendMode};
use donna_app_lib::models::suggestion::{Suggestion, SuggestionKind, SuggestionMode};
use donna_app_lib::models::telemetry::{TelemetryEventType, TelemetryRecord};
use donna_app_lib::services::api_client::CalendarApi;
use donna_app_lib::services::suggestion_service::SuggestionService;
use donna_app_lib::services::telemetry::{MemoryTelemetry, TelemetrySink};
use donna_app_lib::services::timezone::parse_instant;

#[derive(Default)]
struct FakeCalendar {
    events: Mutex<Vec<Event>>,
    next_id: AtomicUsize,
    fail_list: AtomicBool,
    fail_create: AtomicBool,
    fail_delete_of: Mutex<Option<String>>,
    fail_every_delete: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl FakeCalendar {
    fn with_events(events: Vec<Event>) -> Self {
        Self {
            events: Mutex::new(events),
            ..Self::default()
        }
    }

    fn snapshot(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn unavailable(operation: &str) -> AppError {
        AppError::api(ApiErrorCode::BackendUnavailable, format!("{operation} failed"))
    }
}

#[async_trait::async_trait]
impl CalendarApi for FakeCalendar {
    async fn list_events(&self) -> AppResult<Vec<Event>> {
        self.calls.lock().unwrap().push("list".to_string());
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Self::unavailable("listEvents"));
        }
        Ok(self.snapshot())
    }

    async fn create_event(&self, input: &EventInput) -> AppResult<Event> {
        self.calls.lock().unwrap().push(format!("create:{}", input.title));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Self::unavailable("createEvent"));
        }
        let id = format!("new-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let event = Event {
            id,
            title: input.title.clone(),
            description: input.description.clone(),
            category: input.category,
            datetime_utc: input.datetime_utc,
            reminder: input.reminder,
        };
        self.events.lock().unwrap().push(event.clone());
        Ok(event)
    }

    async fn update_event(&self, id: &str, _patch: &EventPatch) -> AppResult<Event> {
        self.snapshot()
            .into_iter()
            .find(|event| event.id == id)
            .ok_or_else(AppError::not_found)
    }

    async fn delete_event(&self, id: &str) -> AppResult<()> {
        self.calls.lock().unwrap().push(format!("delete:{id}"));
        if self.fail_every_delete.load(Ordering::SeqCst)
            || self.fail_delete_of.lock().unwrap().as_deref() == Some(id)
        {
            return Err(Self::unavailable("deleteEvent"));
        }
        self.events.lock().unwrap().retain(|event| event.id != id);
        Ok(())
    }
}

struct FailingTelemetry;

struct SlowTelemetry {
    delay: Duration,
    inner: MemoryTelemetry,
}

#[async_trait::async_trait]
impl TelemetrySink for SlowTelemetry {
    async fn log(&self, record: &TelemetryRecord) -> AppResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.log(record).await
    }
}

#[async_trait::async_trait]
impl TelemetrySink for FailingTelemetry {
    async fn log(&self, _record: &TelemetryRecord) -> AppResult<()> {
        Err(AppError::api(ApiErrorCode::HttpTimeout, "telemetry timed out"))
    }
}

fn at(raw: &str) -> DateTime<Utc> {
    parse_instant(raw).expect("valid instant")
}

fn event(id: &str, title: &str, category: EventCategory, start: &str) -> Event {
    Event {
        id: id.to_string(),
        title: title.to_string(),
        description: Some(format!("{title} notes go here")),
        category,
        datetime_utc: at(start),
        reminder: false,
    }
}

fn busy_tuesday() -> Vec<Event> {
    vec![
        event("e1", "Design review", EventCategory::Work, "2026-10-20T08:00:00Z"),
        event("e2", "Client call", EventCategory::Work, "2026-10-20T09:30:00Z"),
        event("e3", "Budget sync", EventCategory::Work, "2026-10-20T11:00:00Z"),
        event("e4", "Hiring panel", EventCategory::Work, "2026-10-20T13:00:00Z"),
        event("e5", "Coffee with Ana", EventCategory::Personal, "2026-10-20T15:00:00Z"),
        event("e6", "Team standup", EventCategory::Work, "2026-10-20T17:00:00Z"),
    ]
}

fn context() -> SchedulingContext {
    SchedulingContext::new(chrono_tz::UTC, WeekendMode::Relaxed)
}

fn now() -> DateTime<Utc> {
    at("2026-10-19T07:00:00Z")
}

fn setup(events: Vec<Event>) -> (SuggestionService, Arc<FakeCalendar>, Arc<MemoryTelemetry>) {
    let calendar = Arc::new(FakeCalendar::with_events(events));
    let telemetry = Arc::new(MemoryTelemetry::new());
    let service = SuggestionService::new(
        calendar.clone(),
        telemetry.clone(),
        SchedulingConfig::default(),
    );
    (service, calendar, telemetry)
}

fn count_of(telemetry: &MemoryTelemetry, event_type: TelemetryEventType) -> usize {
    telemetry
        .records()
        .iter()
        .filter(|record| record.event_type == event_type)
        .count()
}

#[tokio::test]
async fn refresh_computes_suggestions_and_reports_them_once() {
    let (service, _calendar, telemetry) = setup(busy_tuesday());

    let suggestions = service.refresh(context(), now()).await;
    assert_eq!(suggestions.len(), 1);
    let overbooked = suggestions[0].as_overbooked().expect("overbooked");
    assert_eq!(overbooked.mode, SuggestionMode::Reschedule);
    assert_eq!(overbooked.date, NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());
    assert_eq!(overbooked.available_slots.len(), 4);

    service.refresh(context(), now()).await;
    service.flush_telemetry().await;
    assert_eq!(count_of(&telemetry, TelemetryEventType::Shown), 1);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_events() {
    let (service, calendar, _telemetry) = setup(busy_tuesday());
    service.refresh(context(), now()).await;

    calendar.fail_list.store(true, Ordering::SeqCst);
    let suggestions = service.refresh(context(), now()).await;
    assert_eq!(suggestions.len(), 1);
    assert_eq!(service.events().len(), 6);
    assert!(service.reload_events().await.is_err());
}

#[tokio::test]
async fn dismissed_suggestions_stay_hidden_until_cleared() {
    let (service, _calendar, telemetry) = setup(busy_tuesday());
    let suggestions = service.refresh(context(), now()).await;
    let key = suggestions[0].key();

    service.dismiss(key).await;
    service.dismiss(key).await;
    assert!(service.suggestions(context(), now()).is_empty());
    assert!(service.refresh(context(), now()).await.is_empty());
    service.flush_telemetry().await;
    assert_eq!(count_of(&telemetry, TelemetryEventType::Dismissed), 1);

    service.clear_dismissals();
    assert_eq!(service.suggestions(context(), now()).len(), 1);
}

#[tokio::test]
async fn reschedule_creates_before_deleting_and_dismisses() {
    let (service, calendar, telemetry) = setup(busy_tuesday());
    let suggestions = service.refresh(context(), now()).await;
    let suggestion = &suggestions[0];
    let slot = suggestion.as_overbooked().unwrap().available_slots[0].clone();
    assert_eq!(slot.label, "Tomorrow 6:30 PM");

    let replacement = service
        .reschedule_to_slot(suggestion, None, &slot)
        .await
        .expect("rescheduled");

    assert_eq!(replacement.title, "Coffee with Ana");
    assert_eq!(replacement.datetime_utc, slot.start);
    assert_eq!(replacement.category, EventCategory::Personal);
    assert_eq!(replacement.description.as_deref(), Some("Coffee with Ana notes go here"));

    let calls = calendar.calls();
    let create = calls.iter().position(|call| call == "create:Coffee with Ana").unwrap();
    let delete = calls.iter().position(|call| call == "delete:e5").unwrap();
    assert!(create < delete);

    let stored = calendar.snapshot();
    assert!(stored.iter().all(|event| event.id != "e5"));
    assert!(stored.iter().any(|event| event.id == replacement.id));
    assert!(service.events().iter().any(|event| event.id == replacement.id));

    assert!(service.suggestions(context(), now()).is_empty());
    service.flush_telemetry().await;
    let taken: Vec<TelemetryRecord> = telemetry
        .records()
        .into_iter()
        .filter(|record| record.event_type == TelemetryEventType::ActionTaken)
        .collect();
    assert_eq!(taken.len(), 1);
    assert_eq!(taken[0].action.as_deref(), Some("reschedule"));
    assert!(taken[0].latency_ms.is_some());
}

#[tokio::test]
async fn failed_create_changes_nothing() {
    let (service, calendar, telemetry) = setup(busy_tuesday());
    let suggestions = service.refresh(context(), now()).await;
    let suggestion = &suggestions[0];
    let slot = suggestion.as_overbooked().unwrap().available_slots[0].clone();

    calendar.fail_create.store(true, Ordering::SeqCst);
    let error = service
        .reschedule_to_slot(suggestion, None, &slot)
        .await
        .expect_err("create fails");

    assert!(matches!(
        error,
        AppError::Reschedule {
            stage: RescheduleStage::CreateReplacement,
            ..
        }
    ));
    assert_eq!(calendar.snapshot(), busy_tuesday());
    assert!(!calendar.calls().iter().any(|call| call.starts_with("delete")));
    assert_eq!(service.suggestions(context(), now()).len(), 1);
    service.flush_telemetry().await;
    assert_eq!(count_of(&telemetry, TelemetryEventType::ActionFailed), 1);
}

#[tokio::test]
async fn failed_delete_removes_the_replacement() {
    let (service, calendar, _telemetry) = setup(busy_tuesday());
    let suggestions = service.refresh(context(), now()).await;
    let suggestion = &suggestions[0];
    let slot = suggestion.as_overbooked().unwrap().available_slots[1].clone();

    *calendar.fail_delete_of.lock().unwrap() = Some("e5".to_string());
    let error = service
        .reschedule_to_slot(suggestion, None, &slot)
        .await
        .expect_err("delete fails");

    assert!(matches!(
        error,
        AppError::Reschedule {
            stage: RescheduleStage::DeleteOriginal,
            ..
        }
    ));
    assert_eq!(calendar.snapshot(), busy_tuesday());
    assert_eq!(service.suggestions(context(), now()).len(), 1);
}

#[tokio::test]
async fn failed_rollback_reports_the_leftover_replacement() {
    let (service, calendar, telemetry) = setup(busy_tuesday());
    let suggestions = service.refresh(context(), now()).await;
    let suggestion = &suggestions[0];
    let slot = suggestion.as_overbooked().unwrap().available_slots[0].clone();

    calendar.fail_every_delete.store(true, Ordering::SeqCst);
    let error = service
        .reschedule_to_slot(suggestion, None, &slot)
        .await
        .expect_err("both deletes fail");

    let replacement_id = match error {
        AppError::Reschedule {
            stage: RescheduleStage::RollbackReplacement,
            replacement_id: Some(id),
            ..
        } => id,
        other => panic!("unexpected error: {other:?}"),
    };
    let stored = calendar.snapshot();
    assert_eq!(stored.len(), 7);
    assert!(stored.iter().any(|event| event.id == "e5"));
    assert!(stored.iter().any(|event| event.id == replacement_id));
    assert!(service.events().iter().any(|event| event.id == replacement_id));
    assert_eq!(service.suggestions(context(), now()).len(), 1);

    service.flush_telemetry().await;
    let failed: Vec<TelemetryRecord> = telemetry
        .records()
        .into_iter()
        .filter(|record| record.event_type == TelemetryEventType::ActionFailed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].metadata["stage"], "rollback_replacement");
    assert_eq!(failed[0].metadata["replacementId"], replacement_id.as_str());
}

#[tokio::test]
async fn user_pick_computes_slots_for_the_chosen_event() {
    let mut events = busy_tuesday();
    events[4].title = "Vendor sync".to_string();
    events[4].category = EventCategory::Work;
    let (service, _calendar, telemetry) = setup(events);

    let suggestions = service.refresh(context(), now()).await;
    let suggestion = &suggestions[0];
    assert_eq!(suggestion.as_overbooked().unwrap().mode, SuggestionMode::UserPick);

    let missing = service.show_slots(suggestion, None, context(), now()).await;
    assert!(matches!(missing, Err(AppError::Validation { .. })));

    let slots = service
        .show_slots(suggestion, Some("e3"), context(), now())
        .await
        .expect("slots");
    assert_eq!(slots.len(), 4);
    assert_eq!(slots[0].label, "Tomorrow 6:30 PM");
    service.flush_telemetry().await;
    assert_eq!(count_of(&telemetry, TelemetryEventType::SlotsViewed), 1);

    let replacement = service
        .reschedule_to_slot(suggestion, Some("e3"), &slots[0])
        .await
        .expect("rescheduled");
    assert_eq!(replacement.title, "Budget sync");
}

#[tokio::test]
async fn dense_blocks_cannot_move_events() {
    let events = vec![
        event("a", "Standup", EventCategory::Work, "2026-10-19T08:00:00Z"),
        event("b", "Design review", EventCategory::Work, "2026-10-19T09:30:00Z"),
        event("c", "Client call", EventCategory::Work, "2026-10-19T11:00:00Z"),
    ];
    let (service, _calendar, _telemetry) = setup(events);
    let suggestions = service.refresh(context(), now()).await;
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].kind(), SuggestionKind::DenseBlock);

    let result = service.show_slots(&suggestions[0], None, context(), now()).await;
    assert!(matches!(result, Err(AppError::Validation { .. })));
    assert!(matches!(suggestions[0], Suggestion::DenseBlock(_)));
}

#[tokio::test]
async fn telemetry_failures_do_not_affect_the_flow() {
    let calendar = Arc::new(FakeCalendar::with_events(busy_tuesday()));
    let service = SuggestionService::new(
        calendar.clone(),
        Arc::new(FailingTelemetry),
        SchedulingConfig::default(),
    );

    let suggestions = service.refresh(context(), now()).await;
    let slot = suggestions[0].as_overbooked().unwrap().available_slots[0].clone();
    service.dismiss(suggestions[0].key()).await;
    service.clear_dismissals();

    service
        .reschedule_to_slot(&suggestions[0], None, &slot)
        .await
        .expect("telemetry errors are swallowed");
}

#[tokio::test]
async fn slow_telemetry_does_not_delay_actions() {
    let calendar = Arc::new(FakeCalendar::with_events(busy_tuesday()));
    let telemetry = Arc::new(SlowTelemetry {
        delay: Duration::from_millis(1500),
        inner: MemoryTelemetry::new(),
    });
    let service = SuggestionService::new(
        calendar.clone(),
        telemetry.clone(),
        SchedulingConfig::default(),
    );

    let started = Instant::now();
    let suggestions = service.refresh(context(), now()).await;
    service.dismiss(suggestions[0].key()).await;
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(telemetry.inner.records().is_empty());

    service.flush_telemetry().await;
    let recorded: Vec<TelemetryEventType> = telemetry
        .inner
        .records()
        .into_iter()
        .map(|record| record.event_type)
        .collect();
    assert_eq!(recorded.len(), 2);
    assert!(recorded.contains(&TelemetryEventType::Shown));
    assert!(recorded.contains(&TelemetryEventType::Dismissed));
}
