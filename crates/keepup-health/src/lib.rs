//! keepup-health — reachability probing for keepup.
//!
//! Provides the HTTP probe, URL validation, and the `Prober`, which owns
//! the target set and drives the periodic check cycle.
//!
//! # Architecture
//!
//! ```text
//! Prober
//!   ├── TargetStore (one lock, never held across a probe)
//!   ├── add/remove/reorder/list  ← external API layer
//!   └── background loop (one timer)
//!       └── run_cycle()  — skipped while a previous cycle is running
//!           ├── JoinSet of probe tasks, Semaphore(max_concurrency)
//!           ├── HttpChecker::probe() → ProbeResult
//!           └── TargetStore::apply_probe() as each probe completes
//! ```
//!
//! # Failure handling
//!
//! A probe never fails: timeouts, transport errors and non-2xx responses
//! all become a `down` result with a readable error string. A probe task
//! that panics is counted and logged; the rest of the cycle carries on.
//!
//! # Shutdown
//!
//! The loop stops its timer as soon as the shutdown signal fires, then
//! settles the in-flight cycle according to `ShutdownPolicy`: `Drain`
//! waits up to the grace period, `Abandon` aborts it at once.

pub mod checker;
pub mod error;
pub mod monitor;

pub use checker::{HttpChecker, normalize_url};
pub use error::{ProbeError, ProberError, ProberResult};
pub use monitor::{CycleReport, Prober};
