//! Resolved runtime settings shared across keepup crates.
//!
//! `KeepupConfig` holds what the operator wrote; these types hold what the
//! prober and daemon actually run with.

use std::time::Duration;

/// How often every live target is probed.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(8);

/// Number of `{status, timestamp}` entries kept per target.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Maximum number of probes in flight during one cycle.
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Time an in-flight cycle is given to finish on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub const DEFAULT_PORT: u16 = 5000;

/// Deployment label reported by the service info route.
pub const DEFAULT_ENVIRONMENT: &str = "development";

pub const DEFAULT_USER_AGENT: &str = concat!("keepup/", env!("CARGO_PKG_VERSION"));

/// Prober tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProberSettings {
    /// Period between background cycles.
    pub interval: Duration,
    /// Timeout applied to each individual probe.
    pub timeout: Duration,
    /// Bounded history length per target.
    pub history_capacity: usize,
    /// Concurrency cap for a single cycle.
    pub max_concurrency: usize,
    /// User-Agent header sent with every probe.
    pub user_agent: String,
}

impl Default for ProberSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CHECK_INTERVAL,
            timeout: DEFAULT_PROBE_TIMEOUT,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// What happens to an in-flight cycle when the process shuts down.
///
/// In both cases the periodic timer is stopped first, so no new cycle
/// starts after the shutdown signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Abort the in-flight cycle immediately; pending probes are dropped.
    Abandon,
    /// Wait up to `grace` for the in-flight cycle, then abort it.
    Drain { grace: Duration },
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        ShutdownPolicy::Drain {
            grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// HTTP server settings for the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub port: u16,
    /// Origins allowed by CORS. Empty means no cross-origin access.
    pub allowed_origins: Vec<String>,
    pub environment: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            environment: DEFAULT_ENVIRONMENT.to_string(),
        }
    }
}
