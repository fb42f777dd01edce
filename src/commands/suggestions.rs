use serde::Deserialize;

use crate::models::event::Event;
use crate::models::suggestion::{Slot, Suggestion, SuggestionKey};

use super::{AppState, CommandResult};

/// Reloads events and returns the current suggestions.
pub async fn suggestions_list(state: &AppState) -> CommandResult<Vec<Suggestion>> {
    let context = state.load_context().await?;
    Ok(state.suggestions().refresh(context, state.now()).await)
}

pub async fn suggestion_dismiss(state: &AppState, key: SuggestionKey) -> CommandResult<()> {
    state.suggestions().dismiss(key).await;
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowSlotsPayload {
    pub suggestion: Suggestion,
    #[serde(default)]
    pub event_id: Option<String>,
}

pub async fn suggestion_show_slots(
    state: &AppState,
    payload: ShowSlotsPayload,
) -> CommandResult<Vec<Slot>> {
    let context = state.load_context().await?;
    let slots = state
        .suggestions()
        .show_slots(
            &payload.suggestion,
            payload.event_id.as_deref(),
            context,
            state.now(),
        )
        .await?;
    Ok(slots)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReschedulePayload {
    pub suggestion: Suggestion,
    #[serde(default)]
    pub event_id: Option<String>,
    pub slot: Slot,
}

/// Moves the event and returns the replacement the calendar created.
pub async fn suggestion_reschedule(
    state: &AppState,
    payload: ReschedulePayload,
) -> CommandResult<Event> {
    let replacement = state
        .suggestions()
        .reschedule_to_slot(&payload.suggestion, payload.event_id.as_deref(), &payload.slot)
        .await?;
    Ok(replacement)
}
