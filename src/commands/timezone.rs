use serde::Serialize;
use tracing::warn;

use crate::models::settings::{PreferencesPatch, WeekendMode};
use crate::services::timezone::{detect_system_timezone, parse_timezone};

use super::{run_blocking, AppState, CommandResult};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimezoneInfo {
    pub timezone: String,
    pub stored: Option<String>,
    pub system_timezone: String,
}

pub async fn timezone_get(state: &AppState) -> CommandResult<TimezoneInfo> {
    let settings = state.settings();
    run_blocking(move || {
        let active = settings.active_timezone()?;
        Ok(TimezoneInfo {
            timezone: active.name().to_string(),
            stored: settings.stored_timezone()?,
            system_timezone: detect_system_timezone().name().to_string(),
        })
    })
    .await
}

/// Invalid zone names are ignored; the response shows what stayed active.
/// Valid ones are also pushed to the backend so the next preference sync
/// does not undo them.
pub async fn timezone_set(state: &AppState, zone: String) -> CommandResult<TimezoneInfo> {
    let valid = parse_timezone(&zone);
    let settings = state.settings();
    run_blocking(move || settings.set_active_timezone(&zone).map(|_| ())).await?;

    if let Some(zone) = valid {
        let patch = PreferencesPatch {
            timezone: Some(zone.name().to_string()),
            ..PreferencesPatch::default()
        };
        push_preferences(state, &patch).await;
    }

    timezone_get(state).await
}

pub async fn weekend_mode_set(state: &AppState, mode: WeekendMode) -> CommandResult<WeekendMode> {
    let settings = state.settings();
    run_blocking(move || settings.set_weekend_mode(mode)).await?;

    let patch = PreferencesPatch {
        weekend_mode: Some(mode),
        ..PreferencesPatch::default()
    };
    push_preferences(state, &patch).await;
    Ok(mode)
}

async fn push_preferences(state: &AppState, patch: &PreferencesPatch) {
    if let Err(err) = state.preferences_api().put_settings(patch).await {
        warn!(
            target: "app::settings",
            error = %err,
            "could not sync preferences to backend, keeping local value"
        );
    }
}
