pub mod api_client;
pub mod event_classifier;
pub mod event_extraction;
pub mod schedule_utils;
pub mod settings_service;
pub mod slot_finder;
pub mod suggestion_engine;
pub mod suggestion_service;
pub mod telemetry;
pub mod timezone;
