//! Decision Lifecycle Pipeline
//!
//! ```text
//! READ ──► STORE_SAMPLE ──► CLASSIFY ──► PROPOSE? ──► STORE_DECISION ──► SLEEP
//!                                                          │
//!                                         (auto-apply) ────┘
//! APPLY (external or policy): FETCH_PENDING ──► APPLY_PARAMETERS ──► MARK_APPLIED
//! ```
//!
//! The sleep between ticks shortens as the quality index drops. A failed tick
//! is logged and retried after a fixed backoff; only startup failures are fatal.

mod apply;
mod cycle;

pub use apply::{apply_latest_pending, ApplyOutcome};
pub use cycle::{poll_interval, CycleError, DecisionCycle, DecisionOutcome, TickReport};
