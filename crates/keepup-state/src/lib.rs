//! keepup-state — in-memory target state for keepup.
//!
//! Holds the live set of monitored targets together with their most
//! recent probe outcome and a bounded, newest-first status history.
//!
//! # Lifetime
//!
//! The `TargetStore` lives exactly as long as the process: it is created
//! at startup, shared by handle (`Clone` is an `Arc` bump), and dropped
//! at shutdown. Nothing is persisted.
//!
//! # Locking
//!
//! The whole collection sits behind one `RwLock`. Every mutation (insert,
//! remove, reorder, probe result) and every snapshot takes the lock for
//! its own duration only. Callers never hold it across a network probe.

pub mod store;
pub mod types;

pub use store::{ProbeApplied, TargetStore};
pub use types::*;
