pub mod config;
pub mod settings;

pub use config::{ConfigError, ConfigResult, KeepupConfig, parse_duration};
pub use settings::*;
