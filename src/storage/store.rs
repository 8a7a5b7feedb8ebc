//! DecisionStore trait - pluggable persistence for samples and decisions
//!
//! Two append-mostly record sets:
//! - process samples, one per acquisition tick, never deleted
//! - decisions, inserted pending and flipped to applied exactly once
//!
//! Decisions are addressed by their timestamp. The store guarantees no
//! surrogate key, so two decisions created in the same microsecond are
//! indistinguishable and `mark_applied` flips both.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Decision, ProcessSample};

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Aggregate counts reported by the status operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub total_samples: u64,
    pub total_decisions: u64,
    pub pending_decisions: u64,
}

/// Trait for pluggable decision store backends
///
/// Every call is independent: no transaction spans a read and a later write,
/// so check-then-insert sequences built on top are best-effort only.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Verify the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Create the record sets if they do not exist.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    async fn insert_sample(&self, sample: &ProcessSample) -> Result<(), StoreError>;

    /// Insert a decision. It is always stored unapplied and unapproved,
    /// whatever the flags on `decision` say.
    async fn insert_decision(&self, decision: &Decision) -> Result<(), StoreError>;

    /// Most recent unapplied decision by timestamp.
    async fn latest_pending(&self) -> Result<Option<Decision>, StoreError>;

    /// Unapplied decisions, optionally only those newer than `since`.
    async fn count_pending(&self, since: Option<DateTime<Utc>>) -> Result<u64, StoreError>;

    /// Flip the decision(s) with this timestamp to applied and approved.
    /// Returns whether any row matched; a miss is not an error.
    async fn mark_applied(&self, timestamp: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Most recent process sample by timestamp.
    async fn latest_sample(&self) -> Result<Option<ProcessSample>, StoreError>;

    async fn counts(&self) -> Result<StoreCounts, StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}
