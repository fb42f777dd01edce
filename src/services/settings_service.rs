use std::sync::RwLock;

use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::db::repositories::preference_repository::{
    PreferenceRepository, TIMEZONE_KEY, WEEKEND_MODE_KEY,
};
use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::settings::{SchedulingContext, UserPreferences, WeekendMode};
use crate::services::timezone;

#[derive(Debug, Clone, Default, PartialEq)]
struct StoredPreferences {
    timezone: Option<String>,
    weekend_mode: WeekendMode,
}

/// Locally persisted user preferences: the active timezone override and the
/// weekend mode last reported by the backend.
pub struct SettingsService {
    db: DbPool,
    fallback_zone: Option<Tz>,
    cache: RwLock<Option<StoredPreferences>>,
}

impl SettingsService {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            fallback_zone: None,
            cache: RwLock::new(None),
        }
    }

    /// Uses `zone` instead of the detected system zone when nothing valid is
    /// stored.
    pub fn with_fallback_zone(db: DbPool, zone: Tz) -> Self {
        Self {
            fallback_zone: Some(zone),
            ..Self::new(db)
        }
    }

    fn fallback(&self) -> Tz {
        self.fallback_zone
            .unwrap_or_else(timezone::detect_system_timezone)
    }

    fn load(&self) -> AppResult<StoredPreferences> {
        if let Ok(guard) = self.cache.read() {
            if let Some(stored) = guard.as_ref() {
                return Ok(stored.clone());
            }
        }

        let stored = self.db.with_connection(|conn| {
            let timezone = PreferenceRepository::get_value(conn, TIMEZONE_KEY)?;
            let weekend_mode = PreferenceRepository::get_value(conn, WEEKEND_MODE_KEY)?
                .and_then(|raw| WeekendMode::try_from(raw.as_str()).ok())
                .unwrap_or_default();
            Ok(StoredPreferences {
                timezone,
                weekend_mode,
            })
        })?;

        self.store_cache(stored.clone());
        Ok(stored)
    }

    fn store_cache(&self, stored: StoredPreferences) {
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(stored);
        }
    }

    pub fn stored_timezone(&self) -> AppResult<Option<String>> {
        Ok(self.load()?.timezone)
    }

    /// Stored zone when it is a valid IANA name, else the system zone.
    pub fn active_timezone(&self) -> AppResult<Tz> {
        let stored = self.load()?;
        Ok(timezone::resolve_timezone_or(stored.timezone.as_deref(), || {
            self.fallback()
        }))
    }

    /// Persists `raw` when it names a real zone. Invalid names leave the
    /// previous preference untouched; the returned zone is whatever is active
    /// afterwards.
    pub fn set_active_timezone(&self, raw: &str) -> AppResult<Tz> {
        let Some(zone) = timezone::parse_timezone(raw) else {
            warn!(target: "app::settings", requested = %raw, "ignoring invalid timezone");
            return self.active_timezone();
        };

        let name = zone.name().to_string();
        self.db
            .with_connection(|conn| PreferenceRepository::upsert(conn, TIMEZONE_KEY, &name))?;

        let mut stored = self.load()?;
        stored.timezone = Some(name);
        self.store_cache(stored);

        info!(target: "app::settings", timezone = %zone.name(), "active timezone updated");
        Ok(zone)
    }

    pub fn clear_timezone(&self) -> AppResult<Tz> {
        self.db
            .with_connection(|conn| PreferenceRepository::delete(conn, TIMEZONE_KEY))?;

        let mut stored = self.load()?;
        stored.timezone = None;
        self.store_cache(stored);

        debug!(target: "app::settings", "timezone preference cleared");
        self.active_timezone()
    }

    pub fn weekend_mode(&self) -> AppResult<WeekendMode> {
        Ok(self.load()?.weekend_mode)
    }

    pub fn set_weekend_mode(&self, mode: WeekendMode) -> AppResult<()> {
        self.db.with_connection(|conn| {
            PreferenceRepository::upsert(conn, WEEKEND_MODE_KEY, mode.as_str())
        })?;

        let mut stored = self.load()?;
        stored.weekend_mode = mode;
        self.store_cache(stored);
        Ok(())
    }

    /// Folds preferences fetched from the backend into the local store. A
    /// remote timezone only wins when it is valid.
    pub fn apply_remote(&self, remote: &UserPreferences) -> AppResult<SchedulingContext> {
        if let Some(raw) = remote.timezone.as_deref() {
            if !raw.trim().is_empty() {
                self.set_active_timezone(raw)?;
            }
        }
        self.set_weekend_mode(remote.weekend_mode)?;
        self.context()
    }

    pub fn context(&self) -> AppResult<SchedulingContext> {
        Ok(SchedulingContext::new(
            self.active_timezone()?,
            self.weekend_mode()?,
        ))
    }
}
