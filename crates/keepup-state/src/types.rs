//! Domain types for monitored targets.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-unique identifier for a target. Assigned at creation, never reused.
pub type TargetId = u64;

// ── Status ────────────────────────────────────────────────────────

/// Reachability of a target as determined by its latest probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Up,
    Down,
    /// Only before the first probe completes.
    Unknown,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Up => "up",
            TargetStatus::Down => "down",
            TargetStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Probe result ──────────────────────────────────────────────────

/// Outcome of a single reachability check.
///
/// `response_time_ms` is set only when the target is up; `error` only
/// when it is down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub status: TargetStatus,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn up(response_time_ms: u64) -> Self {
        Self {
            status: TargetStatus::Up,
            response_time_ms: Some(response_time_ms),
            error: None,
        }
    }

    pub fn down(error: impl Into<String>) -> Self {
        Self {
            status: TargetStatus::Down,
            response_time_ms: None,
            error: Some(error.into()),
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == TargetStatus::Up
    }
}

// ── History ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub status: TargetStatus,
    pub timestamp: DateTime<Utc>,
}

/// Bounded status history, newest first.
///
/// Pushing past capacity silently drops the oldest entry. Timestamps are
/// non-increasing from the front: an entry stamped earlier than the
/// current newest one (wall clock stepped back) is clamped up to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl StatusHistory {
    /// A zero capacity is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, status: TargetStatus, timestamp: DateTime<Utc>) {
        let timestamp = match self.entries.front() {
            Some(newest) if newest.timestamp > timestamp => newest.timestamp,
            _ => timestamp,
        };
        self.entries.push_front(HistoryEntry { status, timestamp });
        self.entries.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn newest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

// ── Target ────────────────────────────────────────────────────────

/// A monitored endpoint and its liveness data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: TargetId,
    /// Normalized absolute http(s) URL.
    pub url: String,
    /// Display rank; ascending order defines the list sequence.
    pub order: i64,
    pub status: TargetStatus,
    pub last_response_time_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub history: StatusHistory,
    pub created_at: DateTime<Utc>,
}

impl Target {
    /// A target that has not been probed yet.
    pub fn new(id: TargetId, url: String, order: i64, history_capacity: usize) -> Self {
        Self {
            id,
            url,
            order,
            status: TargetStatus::Unknown,
            last_response_time_ms: None,
            last_error: None,
            last_checked_at: None,
            history: StatusHistory::with_capacity(history_capacity),
            created_at: Utc::now(),
        }
    }

    /// Fold a probe result into the target. Returns the previous status.
    pub fn record(&mut self, result: &ProbeResult, at: DateTime<Utc>) -> TargetStatus {
        let previous = self.status;
        self.status = result.status;
        self.last_response_time_ms = result.response_time_ms;
        self.last_error = result.error.clone();
        self.history.push(result.status, at);
        // The history may have clamped `at`; keep both views consistent.
        self.last_checked_at = self.history.newest().map(|e| e.timestamp);
        previous
    }
}

/// One `(id, order)` pair of a reorder request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OrderUpdate {
    pub id: TargetId,
    pub order: i64,
}
