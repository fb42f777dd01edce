use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use donna_app_lib::commands::events::{
    chat_extract_event, event_prepare_from_form, event_split_for_form, EventFormPayload,
};
use donna_app_lib::commands::suggestions::{
    suggestion_dismiss, suggestion_reschedule, suggestion_show_slots, suggestions_list,
    ReschedulePayload, ShowSlotsPayload,
};
use donna_app_lib::commands::timezone::{timezone_get, timezone_set, weekend_mode_set};
use donna_app_lib::commands::{AppState, Collaborators};
use donna_app_lib::db::DbPool;
use donna_app_lib::error::{ApiErrorCode, AppError, AppResult};
use donna_app_lib::models::event::{Event, EventCategory, EventInput, EventPatch};
use donna_app_lib::models::settings::{
    PreferencesPatch, SchedulingConfig, UserPreferences, WeekendMode,
};
use donna_app_lib::models::suggestion::Suggestion;
use donna_app_lib::services::api_client::{CalendarApi, PreferencesApi};
use donna_app_lib::services::settings_service::SettingsService;
use donna_app_lib::services::telemetry::NoopTelemetry;
use donna_app_lib::services::timezone::{format_instant, parse_instant};
use tempfile::{tempdir, TempDir};

struct StaticCalendar {
    events: Mutex<Vec<Event>>,
}

#[async_trait::async_trait]
impl CalendarApi for StaticCalendar {
    async fn list_events(&self) -> AppResult<Vec<Event>> {
        Ok(self.events.lock().unwrap().clone())
    }

    async fn create_event(&self, input: &EventInput) -> AppResult<Event> {
        let event = Event {
            id: "moved".to_string(),
            title: input.title.clone(),
            description: input.description.clone(),
            category: input.category,
            datetime_utc: input.datetime_utc,
            reminder: input.reminder,
        };
        self.events.lock().unwrap().push(event.clone());
        Ok(event)
    }

    async fn update_event(&self, _id: &str, _patch: &EventPatch) -> AppResult<Event> {
        Err(AppError::not_found())
    }

    async fn delete_event(&self, id: &str) -> AppResult<()> {
        self.events.lock().unwrap().retain(|event| event.id != id);
        Ok(())
    }
}

struct FakePreferences {
    remote: Mutex<Option<UserPreferences>>,
}

#[async_trait::async_trait]
impl PreferencesApi for FakePreferences {
    async fn get_settings(&self) -> AppResult<UserPreferences> {
        self.remote
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::api(ApiErrorCode::BackendUnavailable, "settings offline"))
    }

    async fn put_settings(&self, patch: &PreferencesPatch) -> AppResult<()> {
        let mut guard = self.remote.lock().unwrap();
        let Some(remote) = guard.as_mut() else {
            return Err(AppError::api(ApiErrorCode::BackendUnavailable, "settings offline"));
        };
        if let Some(mode) = patch.weekend_mode {
            remote.weekend_mode = mode;
        }
        if let Some(zone) = &patch.timezone {
            remote.timezone = Some(zone.clone());
        }
        Ok(())
    }
}

fn at(raw: &str) -> DateTime<Utc> {
    parse_instant(raw).expect("valid instant")
}

fn work(id: &str, title: &str, start: &str) -> Event {
    Event {
        id: id.to_string(),
        title: title.to_string(),
        description: None,
        category: EventCategory::Work,
        datetime_utc: at(start),
        reminder: false,
    }
}

fn saturday_events() -> Vec<Event> {
    vec![
        work("s1", "Design review", "2026-10-17T09:00:00Z"),
        work("s2", "Client call", "2026-10-17T10:30:00Z"),
        work("s3", "Budget sync", "2026-10-17T12:00:00Z"),
        work("s4", "Hiring panel", "2026-10-17T13:30:00Z"),
        Event {
            category: EventCategory::Activities,
            ..work("s5", "Climbing", "2026-10-17T15:00:00Z")
        },
        work("s6", "Team offsite", "2026-10-17T16:30:00Z"),
    ]
}

fn build_state(
    events: Vec<Event>,
    remote: Option<UserPreferences>,
    now: &'static str,
) -> (AppState, Arc<FakePreferences>, TempDir) {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("donna.sqlite")).expect("db pool");
    let settings = SettingsService::with_fallback_zone(pool, chrono_tz::UTC);
    let preferences = Arc::new(FakePreferences {
        remote: Mutex::new(remote),
    });
    let collaborators = Collaborators {
        calendar: Arc::new(StaticCalendar {
            events: Mutex::new(events),
        }),
        preferences: preferences.clone(),
        telemetry: Arc::new(NoopTelemetry),
    };
    let fixed = at(now);
    let state = AppState::with_collaborators(settings, collaborators, SchedulingConfig::default())
        .with_clock(Arc::new(move || fixed));
    (state, preferences, dir)
}

#[tokio::test]
async fn timezone_preference_is_validated_and_persisted() {
    let (state, _prefs, _dir) = build_state(Vec::new(), None, "2026-10-16T12:00:00Z");

    let initial = timezone_get(&state).await.expect("timezone");
    assert_eq!(initial.timezone, "UTC");
    assert!(initial.stored.is_none());

    let updated = timezone_set(&state, "America/New_York".to_string())
        .await
        .expect("set");
    assert_eq!(updated.timezone, "America/New_York");
    assert_eq!(updated.stored.as_deref(), Some("America/New_York"));

    let unchanged = timezone_set(&state, "Atlantis/Capital".to_string())
        .await
        .expect("invalid zones are ignored");
    assert_eq!(unchanged.timezone, "America/New_York");
}

#[tokio::test]
async fn remote_preferences_drive_the_weekend_window() {
    let remote = UserPreferences {
        weekend_mode: WeekendMode::Active,
        timezone: None,
    };
    // Friday evening; the overbooked Saturday is tomorrow.
    let (state, prefs, _dir) = build_state(saturday_events(), Some(remote), "2026-10-16T20:00:00Z");

    let suggestions = suggestions_list(&state).await.expect("suggestions");
    assert_eq!(suggestions.len(), 1);
    let overbooked = suggestions[0].as_overbooked().expect("overbooked");
    assert_eq!(overbooked.candidate_event.as_ref().map(|e| e.id.as_str()), Some("s5"));
    assert_eq!(overbooked.available_slots[0].label, "Tomorrow 7:00 AM");
    assert_eq!(
        state.settings().weekend_mode().expect("weekend mode"),
        WeekendMode::Active
    );

    // Backend offline: the cached weekend mode still applies.
    *prefs.remote.lock().unwrap() = None;
    let cached = suggestions_list(&state).await.expect("suggestions");
    assert_eq!(
        cached[0].as_overbooked().unwrap().available_slots[0].label,
        "Tomorrow 7:00 AM"
    );
}

#[tokio::test]
async fn remote_timezone_overrides_the_local_one() {
    let remote = UserPreferences {
        weekend_mode: WeekendMode::Relaxed,
        timezone: Some("Asia/Tokyo".to_string()),
    };
    let (state, _prefs, _dir) = build_state(Vec::new(), Some(remote), "2026-10-16T12:00:00Z");

    suggestions_list(&state).await.expect("suggestions");
    let info = timezone_get(&state).await.expect("timezone");
    assert_eq!(info.timezone, "Asia/Tokyo");

    // A local choice is pushed back, so the next sync keeps it.
    timezone_set(&state, "Europe/Madrid".to_string())
        .await
        .expect("set");
    suggestions_list(&state).await.expect("suggestions");
    let info = timezone_get(&state).await.expect("timezone");
    assert_eq!(info.timezone, "Europe/Madrid");
}

#[tokio::test]
async fn weekend_mode_changes_reach_the_backend() {
    let (state, prefs, _dir) = build_state(
        saturday_events(),
        Some(UserPreferences::default()),
        "2026-10-16T20:00:00Z",
    );

    let mode = weekend_mode_set(&state, WeekendMode::Active)
        .await
        .expect("weekend mode");
    assert_eq!(mode, WeekendMode::Active);
    assert_eq!(
        prefs.remote.lock().unwrap().as_ref().map(|remote| remote.weekend_mode),
        Some(WeekendMode::Active)
    );

    let suggestions = suggestions_list(&state).await.expect("suggestions");
    assert_eq!(
        suggestions[0].as_overbooked().unwrap().available_slots[0].label,
        "Tomorrow 7:00 AM"
    );
}

#[tokio::test]
async fn commands_drive_a_full_reschedule() {
    let (state, _prefs, _dir) = build_state(
        saturday_events(),
        Some(UserPreferences::default()),
        "2026-10-16T20:00:00Z",
    );

    let suggestions = suggestions_list(&state).await.expect("suggestions");
    let suggestion = suggestions[0].clone();
    let slots = suggestion_show_slots(
        &state,
        ShowSlotsPayload {
            suggestion: suggestion.clone(),
            event_id: None,
        },
    )
    .await
    .expect("slots");
    // Relaxed Saturday closes at 19:00 and is busy until 17:45.
    assert_eq!(slots[0].label, "Tomorrow 6:00 PM");
    assert_eq!(slots[1].label, "Sunday 9:00 AM");

    let moved = suggestion_reschedule(
        &state,
        ReschedulePayload {
            suggestion: suggestion.clone(),
            event_id: None,
            slot: slots[0].clone(),
        },
    )
    .await
    .expect("rescheduled");
    assert_eq!(moved.title, "Climbing");
    assert_eq!(moved.datetime_utc, slots[0].start);

    assert!(suggestions_list(&state).await.expect("suggestions").is_empty());
    state.suggestions().clear_dismissals();
    suggestion_dismiss(&state, suggestion.key()).await.expect("dismissed");
    assert!(suggestions_list(&state).await.expect("suggestions").is_empty());
}

#[tokio::test]
async fn reschedule_errors_surface_as_command_errors() {
    let (state, _prefs, _dir) = build_state(Vec::new(), None, "2026-10-16T20:00:00Z");
    let (other_state, _other_prefs, _other_dir) = build_state(
        saturday_events(),
        Some(UserPreferences::default()),
        "2026-10-16T20:00:00Z",
    );
    let suggestions = suggestions_list(&other_state).await.expect("suggestions");
    let mut suggestion = suggestions[0].clone();
    if let Suggestion::Overbooked(inner) = &mut suggestion {
        inner.candidate_event = None;
    }
    let slot = suggestions[0].as_overbooked().unwrap().available_slots[0].clone();

    let error = suggestion_reschedule(
        &state,
        ReschedulePayload {
            suggestion,
            event_id: None,
            slot,
        },
    )
    .await
    .expect_err("nothing to move");
    assert_eq!(error.code, "VALIDATION_ERROR");
}

#[tokio::test]
async fn form_values_convert_through_the_active_zone() {
    let (state, _prefs, _dir) = build_state(Vec::new(), None, "2026-10-16T12:00:00Z");
    timezone_set(&state, "America/New_York".to_string())
        .await
        .expect("set");

    let input = event_prepare_from_form(
        &state,
        EventFormPayload {
            title: "  Dentist ".to_string(),
            description: Some("   ".to_string()),
            category: Some("appointments".to_string()),
            date: "2026-03-08".to_string(),
            time: "02:30".to_string(),
            reminder: true,
        },
    )
    .await
    .expect("prepared");
    assert_eq!(input.title, "Dentist");
    assert!(input.description.is_none());
    assert_eq!(input.category, EventCategory::Appointments);
    assert_eq!(format_instant(input.datetime_utc), "2026-03-08T07:30:00Z");

    let invalid = event_prepare_from_form(
        &state,
        EventFormPayload {
            title: "Dentist".to_string(),
            description: None,
            category: None,
            date: "03/08/2026".to_string(),
            time: "02:30".to_string(),
            reminder: false,
        },
    )
    .await
    .expect_err("unparseable date");
    assert_eq!(invalid.code, "VALIDATION_ERROR");

    let view = event_split_for_form(&state, work("x", "Standup", "2026-10-16T13:45:00Z"))
        .await
        .expect("split");
    assert_eq!(view.date, "2026-10-16");
    assert_eq!(view.time, "09:45");
    assert_eq!(view.display, "Fri, Oct 16 9:45 AM");
    assert_eq!(view.timezone, "America/New_York");
}

#[tokio::test]
async fn chat_messages_are_extracted_in_the_active_zone() {
    let (state, _prefs, _dir) = build_state(Vec::new(), None, "2026-10-16T14:00:00Z");
    timezone_set(&state, "America/New_York".to_string())
        .await
        .expect("set");

    let result = chat_extract_event(&state, "I have a dentist appointment tomorrow at 3pm".to_string())
        .await
        .expect("extraction");
    assert!(result.is_event_message);
    let extracted = result.extracted.expect("extracted");
    assert_eq!(extracted.title, "Dentist");
    let event = result.event.expect("event payload");
    assert_eq!(format_instant(event.datetime_utc), "2026-10-17T19:00:00Z");

    let empty = chat_extract_event(&state, String::new()).await.expect("no error");
    assert!(!empty.is_event_message);
    assert!(empty.failure.is_some());
}
