use std::time::{Duration as StdDuration, Instant};

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ApiErrorCode, AppError, AppResult};
use crate::models::event::{Event, EventInput, EventPatch};
use crate::models::settings::{PreferencesPatch, UserPreferences};
use crate::models::telemetry::TelemetryRecord;
use crate::services::telemetry::TelemetrySink;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const TELEMETRY_TIMEOUT_SECS: u64 = 3;
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Calendar collaborator: the only source of truth for events.
#[async_trait::async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_events(&self) -> AppResult<Vec<Event>>;

    async fn create_event(&self, input: &EventInput) -> AppResult<Event>;

    async fn update_event(&self, id: &str, patch: &EventPatch) -> AppResult<Event>;

    async fn delete_event(&self, id: &str) -> AppResult<()>;
}

#[async_trait::async_trait]
pub trait PreferencesApi: Send + Sync {
    async fn get_settings(&self) -> AppResult<UserPreferences>;

    async fn put_settings(&self, patch: &PreferencesPatch) -> AppResult<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub http_timeout: StdDuration,
    pub telemetry_timeout: StdDuration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_token: None,
            http_timeout: StdDuration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            telemetry_timeout: StdDuration::from_secs(TELEMETRY_TIMEOUT_SECS),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("DONNA_API_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_token = std::env::var("DONNA_API_TOKEN")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let http_timeout = std::env::var("DONNA_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(StdDuration::from_secs)
            .unwrap_or_else(|| StdDuration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));

        Self {
            base_url,
            api_token,
            http_timeout,
            ..Self::default()
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum ApiOperation {
    ListEvents,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
    GetSettings,
    PutSettings,
    LogTelemetry,
}

impl ApiOperation {
    fn as_str(self) -> &'static str {
        match self {
            ApiOperation::ListEvents => "listEvents",
            ApiOperation::CreateEvent => "createEvent",
            ApiOperation::UpdateEvent => "updateEvent",
            ApiOperation::DeleteEvent => "deleteEvent",
            ApiOperation::GetSettings => "getSettings",
            ApiOperation::PutSettings => "putSettings",
            ApiOperation::LogTelemetry => "logTelemetry",
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EventListBody {
    Bare(Vec<Event>),
    Wrapped { events: Vec<Event> },
}

/// HTTP client for the Donna backend. Requests are never retried; a failed
/// call is reported to the caller once.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    telemetry_timeout: StdDuration,
}

impl ApiClient {
    pub fn try_new(config: &ApiConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("failed to build backend HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            telemetry_timeout: config.telemetry_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, operation: ApiOperation, builder: RequestBuilder) -> AppResult<Response> {
        let correlation_id = Uuid::new_v4().to_string();
        debug!(
            target: "app::api",
            operation = operation.as_str(),
            correlation_id = %correlation_id,
            "calling backend"
        );

        let start = Instant::now();
        let response = builder
            .header(REQUEST_ID_HEADER, correlation_id.as_str())
            .send()
            .await
            .map_err(|err| error_from_reqwest(err, operation))?;

        let status = response.status();
        let latency_ms = start.elapsed().as_millis();
        if status.is_success() {
            debug!(
                target: "app::api",
                operation = operation.as_str(),
                correlation_id = %correlation_id,
                status = status.as_u16(),
                latency_ms,
                "backend responded"
            );
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            target: "app::api",
            operation = operation.as_str(),
            correlation_id = %correlation_id,
            status = status.as_u16(),
            latency_ms,
            "backend returned non-success status"
        );
        Err(map_http_error_with_body(status, operation.as_str(), &body))
    }

    async fn decode<T: DeserializeOwned>(operation: ApiOperation, response: Response) -> AppResult<T> {
        response.json::<T>().await.map_err(|err| {
            AppError::api_with_details(
                ApiErrorCode::InvalidResponse,
                format!("could not decode {} response", operation.as_str()),
                None,
                Some(json!({ "reason": err.to_string() })),
            )
        })
    }
}

#[async_trait::async_trait]
impl CalendarApi for ApiClient {
    async fn list_events(&self) -> AppResult<Vec<Event>> {
        let operation = ApiOperation::ListEvents;
        let response = self
            .send(operation, self.request(Method::GET, "/api/events"))
            .await?;
        let body: EventListBody = Self::decode(operation, response).await?;
        Ok(match body {
            EventListBody::Bare(events) => events,
            EventListBody::Wrapped { events } => events,
        })
    }

    async fn create_event(&self, input: &EventInput) -> AppResult<Event> {
        let operation = ApiOperation::CreateEvent;
        let response = self
            .send(operation, self.request(Method::POST, "/api/events").json(input))
            .await?;
        Self::decode(operation, response).await
    }

    async fn update_event(&self, id: &str, patch: &EventPatch) -> AppResult<Event> {
        let operation = ApiOperation::UpdateEvent;
        let path = format!("/api/events/{id}");
        let response = self
            .send(operation, self.request(Method::PUT, &path).json(patch))
            .await?;
        Self::decode(operation, response).await
    }

    async fn delete_event(&self, id: &str) -> AppResult<()> {
        let path = format!("/api/events/{id}");
        self.send(ApiOperation::DeleteEvent, self.request(Method::DELETE, &path))
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PreferencesApi for ApiClient {
    async fn get_settings(&self) -> AppResult<UserPreferences> {
        let operation = ApiOperation::GetSettings;
        let response = self
            .send(operation, self.request(Method::GET, "/api/settings"))
            .await?;
        Self::decode(operation, response).await
    }

    async fn put_settings(&self, patch: &PreferencesPatch) -> AppResult<()> {
        self.send(
            ApiOperation::PutSettings,
            self.request(Method::PUT, "/api/settings").json(patch),
        )
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TelemetrySink for ApiClient {
    async fn log(&self, record: &TelemetryRecord) -> AppResult<()> {
        let builder = self
            .request(Method::POST, "/api/telemetry/suggestions")
            .timeout(self.telemetry_timeout)
            .json(record);
        self.send(ApiOperation::LogTelemetry, builder).await?;
        Ok(())
    }
}

pub fn map_http_error(status: StatusCode, operation: &str) -> AppError {
    map_http_error_with_body(status, operation, "")
}

fn map_http_error_with_body(status: StatusCode, operation: &str, body: &str) -> AppError {
    let details = if body.trim().is_empty() {
        Some(json!({ "operation": operation }))
    } else {
        Some(json!({ "operation": operation, "body": body }))
    };
    let code = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiErrorCode::Unauthorized,
        StatusCode::NOT_FOUND => ApiErrorCode::NotFound,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ApiErrorCode::HttpTimeout,
        StatusCode::TOO_MANY_REQUESTS => ApiErrorCode::RateLimited,
        status if status.is_server_error() => ApiErrorCode::BackendUnavailable,
        status if status.is_client_error() => ApiErrorCode::InvalidRequest,
        _ => ApiErrorCode::Unknown,
    };
    AppError::api_with_details(
        code,
        format!("{operation} failed with status {}", status.as_u16()),
        Some(status.as_u16()),
        details,
    )
}

fn error_from_reqwest(err: reqwest::Error, operation: ApiOperation) -> AppError {
    if err.is_timeout() {
        AppError::api(
            ApiErrorCode::HttpTimeout,
            format!("{} timed out", operation.as_str()),
        )
    } else if err.is_connect() {
        AppError::api(
            ApiErrorCode::BackendUnavailable,
            format!("{} could not reach the backend", operation.as_str()),
        )
    } else if let Some(status) = err.status() {
        map_http_error(status, operation.as_str())
    } else {
        AppError::api(
            ApiErrorCode::Unknown,
            format!("{} failed: {err}", operation.as_str()),
        )
    }
}
