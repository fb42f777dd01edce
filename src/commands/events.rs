use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::event::{Event, EventCategory, EventInput};
use crate::models::extraction::{ExtractedEvent, ExtractionFailure};
use crate::services::event_extraction::{is_event_message, EventExtractor};
use crate::services::timezone;

use super::{run_blocking, AppState, CommandResult};

const DISPLAY_PATTERN: &str = "%a, %b %-d %-I:%M %p";

/// Raw values of the event create/edit form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFormPayload {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub reminder: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventFormView {
    pub date: String,
    pub time: String,
    pub display: String,
    pub timezone: String,
}

/// Turns form input in the active zone into a create payload. Times inside a
/// spring-forward gap move one hour later.
pub async fn event_prepare_from_form(
    state: &AppState,
    payload: EventFormPayload,
) -> CommandResult<EventInput> {
    let settings = state.settings();
    let zone = run_blocking(move || settings.active_timezone()).await?;

    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::validation("title must not be empty").into());
    }

    let start = timezone::to_absolute_with_dst_fallback(&payload.date, &payload.time, zone)
        .ok_or_else(|| {
            AppError::validation_with_details(
                "date or time could not be read, please re-enter it",
                serde_json::json!({
                    "date": payload.date,
                    "time": payload.time,
                    "timezone": zone.name(),
                }),
            )
        })?;

    Ok(EventInput {
        title: title.to_string(),
        description: payload
            .description
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        category: payload
            .category
            .as_deref()
            .map(EventCategory::from_label)
            .unwrap_or_default(),
        datetime_utc: start,
        reminder: payload.reminder,
    })
}

pub async fn event_split_for_form(state: &AppState, event: Event) -> CommandResult<EventFormView> {
    let settings = state.settings();
    let zone = run_blocking(move || settings.active_timezone()).await?;
    let parts = timezone::split_absolute(event.datetime_utc, zone);
    Ok(EventFormView {
        date: parts.date,
        time: parts.time,
        display: timezone::format_in_zone(event.datetime_utc, zone, DISPLAY_PATTERN),
        timezone: zone.name().to_string(),
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatExtraction {
    pub is_event_message: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<ExtractedEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ExtractionFailure>,
}

/// Best-effort parse of a chat message. Never fails the chat send; problems
/// come back in `failure`.
pub async fn chat_extract_event(state: &AppState, text: String) -> CommandResult<ChatExtraction> {
    let settings = state.settings();
    let zone = run_blocking(move || settings.active_timezone()).await?;
    let extractor = EventExtractor::new(zone);

    let flagged = is_event_message(&text);
    let result = match extractor.extract(&text, state.now()) {
        Ok(extracted) => {
            let event = extractor.to_event_input(&extracted);
            ChatExtraction {
                is_event_message: flagged,
                extracted: Some(extracted),
                event,
                failure: None,
            }
        }
        Err(failure) => ChatExtraction {
            is_event_message: flagged,
            extracted: None,
            event: None,
            failure: Some(failure),
        },
    };
    Ok(result)
}
