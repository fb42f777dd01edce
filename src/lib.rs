pub mod commands;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use std::path::Path;

use tracing::info;

use crate::commands::AppState;
use crate::error::AppResult;
use crate::services::api_client::ApiConfig;

const DATABASE_FILE: &str = "donna.sqlite";
const LOG_DIR: &str = "logs";

/// Sets up logging, the local preference store and the backend client under
/// `data_dir`, configured from the environment.
pub fn bootstrap(data_dir: &Path) -> AppResult<AppState> {
    std::fs::create_dir_all(data_dir)?;
    crate::utils::logger::init_logging(&data_dir.join(LOG_DIR))?;

    let pool = crate::db::DbPool::new(data_dir.join(DATABASE_FILE))?;
    let api_config = ApiConfig::from_env();
    info!(
        target: "app::command",
        base_url = %api_config.base_url,
        authenticated = api_config.api_token.is_some(),
        "starting scheduling core"
    );

    AppState::new(pool, &api_config)
}
