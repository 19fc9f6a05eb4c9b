//! Prober error types.

use std::time::Duration;

use thiserror::Error;

/// Errors returned synchronously by `Prober` operations.
#[derive(Debug, Error)]
pub enum ProberError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub type ProberResult<T> = Result<T, ProberError>;

/// Why a probe reported its target down.
///
/// Never returned to callers; the `Display` text is recorded on the
/// target as its last error.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("timeout of {}ms exceeded", .0.as_millis())]
    Timeout(Duration),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("{0}")]
    Transport(String),
}

impl ProbeError {
    /// Build a transport error from the full source chain, so the message
    /// names the root cause (DNS, refused connection, TLS) and not only
    /// reqwest's outer "error sending request".
    pub fn transport(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            let cause_text = cause.to_string();
            if !message.contains(&cause_text) {
                message.push_str(": ");
                message.push_str(&cause_text);
            }
            source = cause.source();
        }
        ProbeError::Transport(message)
    }
}
