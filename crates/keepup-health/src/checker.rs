//! Reachability probe logic.
//!
//! A probe is a single HTTP GET bounded by a fixed timeout. The target is
//! up iff a 2xx response arrives in time; anything else is down with a
//! readable cause.

use std::time::{Duration, Instant};

use reqwest::{Client, Url};
use tracing::debug;

use keepup_core::ProberSettings;
use keepup_state::ProbeResult;

use crate::error::{ProbeError, ProberError, ProberResult};

/// Validate a user-supplied target URL.
///
/// Input is trimmed, and a bare host like `example.com` is prefixed with
/// `https://`. Only absolute http(s) URLs with a host are accepted. The
/// returned string is the (possibly prefixed) input, not a re-serialized
/// form, so `example.com` becomes `https://example.com`.
pub fn normalize_url(raw: &str) -> ProberResult<String> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| ProberError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    if trimmed.is_empty() {
        return Err(invalid("URL is empty"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&candidate).map_err(|e| invalid(&e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(&format!("unsupported scheme `{other}`"))),
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }

    Ok(candidate)
}

/// HTTP prober shared by every probe in the process.
///
/// Cloning is cheap; the underlying connection pool is shared.
#[derive(Clone)]
pub struct HttpChecker {
    client: Client,
    timeout: Duration,
}

impl HttpChecker {
    pub fn new(settings: &ProberSettings) -> ProberResult<Self> {
        let client = Client::builder().user_agent(&settings.user_agent).build()?;
        Ok(Self {
            client,
            timeout: settings.timeout,
        })
    }

    /// Probe a URL once. Never fails; failures are folded into the result.
    pub async fn probe(&self, url: &str) -> ProbeResult {
        let started = Instant::now();
        match self.check(url).await {
            Ok(()) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                debug!(%url, elapsed_ms, "probe succeeded");
                ProbeResult::up(elapsed_ms)
            }
            Err(e) => {
                debug!(%url, error = %e, "probe failed");
                ProbeResult::down(e.to_string())
            }
        }
    }

    /// The deadline covers the whole exchange: connect, headers and body.
    async fn check(&self, url: &str) -> Result<(), ProbeError> {
        tokio::time::timeout(self.timeout, self.fetch(url))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))?
    }

    async fn fetch(&self, url: &str) -> Result<(), ProbeError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status));
        }

        // Drain without buffering so a stalled body still trips the deadline.
        while response
            .chunk()
            .await
            .map_err(|e| self.request_error(&e))?
            .is_some()
        {}
        Ok(())
    }

    fn request_error(&self, e: &reqwest::Error) -> ProbeError {
        if e.is_timeout() {
            ProbeError::Timeout(self.timeout)
        } else {
            ProbeError::transport(e)
        }
    }
}
