//! keepup.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::*;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid duration for `{field}`: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeepupConfig {
    pub prober: Option<ProberConfig>,
    pub shutdown: Option<ShutdownConfig>,
    pub server: Option<ServerConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProberConfig {
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub history_capacity: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
    Abandon,
    Drain,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShutdownConfig {
    pub policy: Option<ShutdownMode>,
    pub grace: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: Option<u16>,
    pub allowed_origins: Option<Vec<String>>,
    pub environment: Option<String>,
}

/// A target registered at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub url: String,
}

impl KeepupConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolve the `[prober]` section, filling defaults and validating ranges.
    pub fn prober_settings(&self) -> ConfigResult<ProberSettings> {
        let defaults = ProberSettings::default();
        let Some(cfg) = &self.prober else {
            return Ok(defaults);
        };

        let interval = match &cfg.interval {
            Some(s) => duration_field("prober.interval", s)?,
            None => defaults.interval,
        };
        let timeout = match &cfg.timeout {
            Some(s) => duration_field("prober.timeout", s)?,
            None => defaults.timeout,
        };
        let history_capacity = cfg.history_capacity.unwrap_or(defaults.history_capacity);
        let max_concurrency = cfg.max_concurrency.unwrap_or(defaults.max_concurrency);

        non_zero("prober.interval", interval.is_zero())?;
        non_zero("prober.timeout", timeout.is_zero())?;
        non_zero("prober.history_capacity", history_capacity == 0)?;
        non_zero("prober.max_concurrency", max_concurrency == 0)?;

        Ok(ProberSettings {
            interval,
            timeout,
            history_capacity,
            max_concurrency,
            user_agent: cfg.user_agent.clone().unwrap_or(defaults.user_agent),
        })
    }

    /// Resolve the `[shutdown]` section. Defaults to draining for 5s.
    pub fn shutdown_policy(&self) -> ConfigResult<ShutdownPolicy> {
        let Some(cfg) = &self.shutdown else {
            return Ok(ShutdownPolicy::default());
        };
        match cfg.policy.unwrap_or(ShutdownMode::Drain) {
            ShutdownMode::Abandon => Ok(ShutdownPolicy::Abandon),
            ShutdownMode::Drain => {
                let grace = match &cfg.grace {
                    Some(s) => duration_field("shutdown.grace", s)?,
                    None => DEFAULT_SHUTDOWN_GRACE,
                };
                Ok(ShutdownPolicy::Drain { grace })
            }
        }
    }

    pub fn server_settings(&self) -> ServerSettings {
        let defaults = ServerSettings::default();
        let Some(cfg) = &self.server else {
            return defaults;
        };
        ServerSettings {
            port: cfg.port.unwrap_or(defaults.port),
            allowed_origins: cfg
                .allowed_origins
                .clone()
                .unwrap_or(defaults.allowed_origins),
            environment: cfg.environment.clone().unwrap_or(defaults.environment),
        }
    }

    /// Scaffold a config with every default spelled out.
    pub fn scaffold() -> Self {
        KeepupConfig {
            prober: Some(ProberConfig {
                interval: Some("30s".to_string()),
                timeout: Some("8s".to_string()),
                history_capacity: Some(DEFAULT_HISTORY_CAPACITY),
                max_concurrency: Some(DEFAULT_MAX_CONCURRENCY),
                user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            }),
            shutdown: Some(ShutdownConfig {
                policy: Some(ShutdownMode::Drain),
                grace: Some("5s".to_string()),
            }),
            server: Some(ServerConfig {
                port: Some(DEFAULT_PORT),
                allowed_origins: Some(vec!["http://localhost:3000".to_string()]),
                environment: Some(DEFAULT_ENVIRONMENT.to_string()),
            }),
            targets: Vec::new(),
        }
    }
}

fn duration_field(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

fn non_zero(field: &'static str, is_zero: bool) -> ConfigResult<()> {
    if is_zero {
        return Err(ConfigError::InvalidValue {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Parse a duration string like "8s", "500ms", "2m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config = KeepupConfig::from_toml_str("").unwrap();
        assert_eq!(config.prober_settings().unwrap(), ProberSettings::default());
        assert_eq!(config.shutdown_policy().unwrap(), ShutdownPolicy::default());
        assert_eq!(config.server_settings(), ServerSettings::default());
        assert!(config.targets.is_empty());
    }

    #[test]
    fn defaults_match_constants() {
        let settings = ProberSettings::default();
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.timeout, Duration::from_secs(8));
        assert_eq!(settings.history_capacity, 10);
        assert_eq!(settings.max_concurrency, 16);
        assert_eq!(
            ShutdownPolicy::default(),
            ShutdownPolicy::Drain {
                grace: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[prober]
interval = "10s"
timeout = "1500ms"
history_capacity = 5
max_concurrency = 4

[shutdown]
policy = "abandon"

[server]
port = 8080
allowed_origins = ["https://keepitup.example"]
environment = "production"

[[targets]]
url = "https://example.com"

[[targets]]
url = "example.org"
"#;
        let config = KeepupConfig::from_toml_str(toml_str).unwrap();
        let prober = config.prober_settings().unwrap();
        assert_eq!(prober.interval, Duration::from_secs(10));
        assert_eq!(prober.timeout, Duration::from_millis(1500));
        assert_eq!(prober.history_capacity, 5);
        assert_eq!(prober.max_concurrency, 4);
        assert_eq!(prober.user_agent, DEFAULT_USER_AGENT);

        assert_eq!(config.shutdown_policy().unwrap(), ShutdownPolicy::Abandon);

        let server = config.server_settings();
        assert_eq!(server.port, 8080);
        assert_eq!(server.allowed_origins, vec!["https://keepitup.example"]);
        assert_eq!(server.environment, "production");

        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.targets[1].url, "example.org");
    }

    #[test]
    fn drain_grace_is_configurable() {
        let config = KeepupConfig::from_toml_str(
            r#"
[shutdown]
policy = "drain"
grace = "2s"
"#,
        )
        .unwrap();
        assert_eq!(
            config.shutdown_policy().unwrap(),
            ShutdownPolicy::Drain {
                grace: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let config = KeepupConfig::from_toml_str(
            r#"
[prober]
timeout = "soon"
"#,
        )
        .unwrap();
        let err = config.prober_settings().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration {
                field: "prober.timeout",
                ..
            }
        ));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = KeepupConfig::from_toml_str(
            r#"
[prober]
history_capacity = 0
"#,
        )
        .unwrap();
        assert!(matches!(
            config.prober_settings(),
            Err(ConfigError::InvalidValue {
                field: "prober.history_capacity",
                ..
            })
        ));
    }

    #[test]
    fn unknown_shutdown_policy_fails_to_parse() {
        let result = KeepupConfig::from_toml_str(
            r#"
[shutdown]
policy = "queue"
"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn scaffold_round_trips_through_toml() {
        let rendered = KeepupConfig::scaffold().to_toml_string().unwrap();
        assert!(rendered.contains("interval = \"30s\""));
        let parsed = KeepupConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.prober_settings().unwrap(), ProberSettings::default());
    }

    #[test]
    fn from_file_reads_and_reports_missing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9000").unwrap();
        let config = KeepupConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server_settings().port, 9000);

        let missing = KeepupConfig::from_file(Path::new("/nonexistent/keepup.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("8s"), Some(Duration::from_secs(8)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("fast"), None);
    }
}
