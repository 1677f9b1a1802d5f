pub mod api;
pub mod config;
mod engine;
mod integrations;

pub use config::Config;
pub use config::LogLevel;
pub use engine::CoverState;
pub use engine::Engine;
pub use engine::LightState;
pub use engine::State;
#[cfg(feature = "integration_dueros")]
pub use integrations::dueros::validate_entries;
