pub mod events;
pub mod suggestions;
pub mod timezone;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tracing::{error, warn};

use crate::db::DbPool;
use crate::error::{AppError, AppResult, RescheduleStage};
use crate::models::settings::{SchedulingConfig, SchedulingContext};
use crate::services::api_client::{ApiClient, ApiConfig, CalendarApi, PreferencesApi};
use crate::services::settings_service::SettingsService;
use crate::services::suggestion_service::SuggestionService;
use crate::services::telemetry::TelemetrySink;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Collaborators the application state is built from.
pub struct Collaborators {
    pub calendar: Arc<dyn CalendarApi>,
    pub preferences: Arc<dyn PreferencesApi>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

#[derive(Clone)]
pub struct AppState {
    settings_service: Arc<SettingsService>,
    suggestion_service: Arc<SuggestionService>,
    preferences: Arc<dyn PreferencesApi>,
    clock: Clock,
}

impl AppState {
    pub fn new(db_pool: DbPool, api_config: &ApiConfig) -> AppResult<Self> {
        let client = Arc::new(ApiClient::try_new(api_config)?);
        let collaborators = Collaborators {
            calendar: client.clone(),
            preferences: client.clone(),
            telemetry: client,
        };
        let settings_service = SettingsService::new(db_pool);
        Ok(Self::with_collaborators(
            settings_service,
            collaborators,
            SchedulingConfig::default(),
        ))
    }

    pub fn with_collaborators(
        settings_service: SettingsService,
        collaborators: Collaborators,
        config: SchedulingConfig,
    ) -> Self {
        let suggestion_service = Arc::new(SuggestionService::new(
            collaborators.calendar,
            collaborators.telemetry,
            config,
        ));

        Self {
            settings_service: Arc::new(settings_service),
            suggestion_service,
            preferences: collaborators.preferences,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the wall clock, mostly so tests can pin "now".
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn settings(&self) -> Arc<SettingsService> {
        Arc::clone(&self.settings_service)
    }

    pub fn suggestions(&self) -> Arc<SuggestionService> {
        Arc::clone(&self.suggestion_service)
    }

    pub fn preferences_api(&self) -> Arc<dyn PreferencesApi> {
        Arc::clone(&self.preferences)
    }

    /// Scheduling context for this call. Remote preferences win when the
    /// backend answers; otherwise the locally stored ones are used.
    pub async fn load_context(&self) -> CommandResult<SchedulingContext> {
        match self.preferences.get_settings().await {
            Ok(remote) => {
                let settings = self.settings();
                run_blocking(move || settings.apply_remote(&remote)).await
            }
            Err(err) => {
                warn!(
                    target: "app::command",
                    error = %err,
                    "preferences unavailable, using local settings"
                );
                let settings = self.settings();
                run_blocking(move || settings.context()).await
            }
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl CommandError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<JsonValue>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Validation { message, details } => {
                CommandError::new("VALIDATION_ERROR", message, details)
            }
            AppError::NotFound => {
                CommandError::new("NOT_FOUND", "the requested item does not exist", None)
            }
            AppError::Conflict { message } => CommandError::new("CONFLICT", message, None),
            AppError::Api {
                code,
                message,
                status,
                details,
            } => {
                let mut merged = JsonMap::new();
                if let Some(existing) = details {
                    match existing {
                        JsonValue::Object(map) => merged.extend(map),
                        value => {
                            merged.insert("info".to_string(), value);
                        }
                    }
                }
                if let Some(status) = status {
                    merged.insert("status".to_string(), JsonValue::from(status));
                }
                let detail_value = if merged.is_empty() {
                    None
                } else {
                    Some(JsonValue::Object(merged))
                };
                CommandError::new(code.as_str(), message, detail_value)
            }
            AppError::Reschedule {
                stage,
                message,
                replacement_id,
            } => {
                warn!(target: "app::command", %stage, %message, "reschedule failed in command");
                match (stage, replacement_id) {
                    (RescheduleStage::RollbackReplacement, replacement_id) => CommandError::new(
                        "RESCHEDULE_INCOMPLETE",
                        "Couldn't move the event, and the new copy could not be removed. \
                         Your calendar may show it twice; check before trying again.",
                        Some(json!({
                            "stage": stage.as_str(),
                            "cause": message,
                            "replacementId": replacement_id,
                        })),
                    ),
                    _ => CommandError::new(
                        "RESCHEDULE_FAILED",
                        "Couldn't move the event. Nothing was changed, please try again.",
                        Some(json!({ "stage": stage.as_str(), "cause": message })),
                    ),
                }
            }
            AppError::Database { message } => {
                error!(target: "app::command", %message, "database error in command");
                CommandError::new("UNKNOWN", message, None)
            }
            AppError::Serialization(error) => {
                error!(target: "app::command", error = %error, "serialization error in command");
                CommandError::new("UNKNOWN", "serialization failed", None)
            }
            AppError::Io(error) => {
                error!(target: "app::command", error = %error, "io error in command");
                CommandError::new("UNKNOWN", "file system access failed", None)
            }
            AppError::Other(message) => {
                error!(target: "app::command", %message, "unexpected error in command");
                CommandError::new("UNKNOWN", message, None)
            }
        }
    }
}

/// Runs SQLite-backed work off the async executor.
pub(crate) async fn run_blocking<T: Send + 'static>(
    task: impl FnOnce() -> Result<T, AppError> + Send + 'static,
) -> CommandResult<T> {
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| CommandError::new("UNKNOWN", format!("background task failed: {err}"), None))?
        .map_err(CommandError::from)
}
