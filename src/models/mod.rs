pub mod event;
pub mod extraction;
pub mod settings;
pub mod suggestion;
pub mod telemetry;
