//! TargetStore — the live set of monitored targets.
//!
//! Provides typed operations over targets: insert, remove, reorder, list,
//! and folding probe results into a target. All operations are applied
//! atomically under a single lock, so a concurrent `list` never observes
//! a half-applied mutation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use crate::types::*;

/// Status transition produced by applying a probe result to a live target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeApplied {
    pub id: TargetId,
    pub previous: TargetStatus,
    pub current: TargetStatus,
}

impl ProbeApplied {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

struct Inner {
    /// Keyed by id; ids are monotonic so key order is insertion order.
    targets: BTreeMap<TargetId, Target>,
    next_id: TargetId,
}

/// Thread-safe in-memory target collection.
#[derive(Clone)]
pub struct TargetStore {
    inner: Arc<RwLock<Inner>>,
    history_capacity: usize,
}

impl TargetStore {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                targets: BTreeMap::new(),
                next_id: 1,
            })),
            history_capacity,
        }
    }

    /// Insert an unprobed target. Its order is the current target count.
    pub fn insert(&self, url: String) -> Target {
        let mut inner = self.inner.write();
        let target = Self::next_target(&mut inner, url, self.history_capacity);
        inner.targets.insert(target.id, target.clone());
        debug!(target_id = target.id, url = %target.url, "target stored");
        target
    }

    /// Insert a target together with the result of its first probe.
    ///
    /// The probe ran before the lock was taken; id and order are assigned
    /// here so they reflect the set at insertion time.
    pub fn insert_probed(&self, url: String, first: &ProbeResult) -> Target {
        let mut inner = self.inner.write();
        let mut target = Self::next_target(&mut inner, url, self.history_capacity);
        target.record(first, Utc::now());
        inner.targets.insert(target.id, target.clone());
        debug!(target_id = target.id, url = %target.url, status = %target.status, "target stored");
        target
    }

    fn next_target(inner: &mut Inner, url: String, history_capacity: usize) -> Target {
        let id = inner.next_id;
        inner.next_id += 1;
        let order = inner.targets.len() as i64;
        Target::new(id, url, order, history_capacity)
    }

    /// Remove a target. Returns true if it existed.
    pub fn remove(&self, id: TargetId) -> bool {
        let existed = self.inner.write().targets.remove(&id).is_some();
        debug!(target_id = id, existed, "target removed");
        existed
    }

    /// Apply new display orders. Unknown ids are ignored and targets not
    /// named keep their current order. Returns how many targets changed.
    pub fn reorder(&self, updates: &[OrderUpdate]) -> usize {
        let mut inner = self.inner.write();
        let mut applied = 0;
        for update in updates {
            if let Some(target) = inner.targets.get_mut(&update.id) {
                target.order = update.order;
                applied += 1;
            }
        }
        debug!(requested = updates.len(), applied, "targets reordered");
        applied
    }

    /// Snapshot of all targets, ascending by order, ties in insertion order.
    pub fn list(&self) -> Vec<Target> {
        let mut targets: Vec<Target> = self.inner.read().targets.values().cloned().collect();
        // Stable sort over id-ordered input keeps insertion order for ties.
        targets.sort_by_key(|t| t.order);
        targets
    }

    pub fn get(&self, id: TargetId) -> Option<Target> {
        self.inner.read().targets.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().targets.is_empty()
    }

    /// Ids and URLs of every live target, for a probe cycle.
    pub fn probe_set(&self) -> Vec<(TargetId, String)> {
        self.inner
            .read()
            .targets
            .values()
            .map(|t| (t.id, t.url.clone()))
            .collect()
    }

    /// Fold a probe result into a live target, stamped now.
    ///
    /// Returns `None` if the target was removed while its probe was in
    /// flight; the result is discarded in that case.
    pub fn apply_probe(&self, id: TargetId, result: &ProbeResult) -> Option<ProbeApplied> {
        let mut inner = self.inner.write();
        let target = inner.targets.get_mut(&id)?;
        let previous = target.record(result, Utc::now());
        Some(ProbeApplied {
            id,
            previous,
            current: target.status,
        })
    }
}
