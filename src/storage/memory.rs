//! In-memory decision store for tests and simulated deployments
//!
//! Thread-safe via `RwLock`. Not durable: data is lost on restart. Mirrors the
//! relational store's encoding, so fields the database does not persist are
//! dropped on insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::store::{DecisionStore, StoreCounts, StoreError};
use crate::types::{Decision, ProcessSample};

pub struct InMemoryStore {
    samples: RwLock<Vec<ProcessSample>>,
    decisions: RwLock<Vec<Decision>>,
    available: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            samples: RwLock::new(Vec::new()),
            decisions: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: every operation fails while unavailable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Every stored decision, in insertion order.
    pub fn decisions(&self) -> Vec<Decision> {
        self.decisions
            .read()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Every stored sample, in insertion order.
    pub fn samples(&self) -> Vec<ProcessSample> {
        self.samples.read().map(|s| s.clone()).unwrap_or_default()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store offline".to_string()))
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl DecisionStore for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn insert_sample(&self, sample: &ProcessSample) -> Result<(), StoreError> {
        self.check()?;
        self.samples.write().map_err(poisoned)?.push(sample.clone());
        Ok(())
    }

    async fn insert_decision(&self, decision: &Decision) -> Result<(), StoreError> {
        self.check()?;
        let stored = Decision {
            applied: false,
            operator_approved: false,
            analysis: None,
            predicted_hvbgo_flow_reduction: None,
            ..decision.clone()
        };
        self.decisions.write().map_err(poisoned)?.push(stored);
        Ok(())
    }

    async fn latest_pending(&self) -> Result<Option<Decision>, StoreError> {
        self.check()?;
        let decisions = self.decisions.read().map_err(poisoned)?;
        Ok(decisions
            .iter()
            .filter(|d| !d.applied)
            .max_by_key(|d| d.timestamp)
            .cloned())
    }

    async fn count_pending(&self, since: Option<DateTime<Utc>>) -> Result<u64, StoreError> {
        self.check()?;
        let decisions = self.decisions.read().map_err(poisoned)?;
        let n = decisions
            .iter()
            .filter(|d| !d.applied && since.map_or(true, |s| d.timestamp > s))
            .count();
        Ok(n as u64)
    }

    async fn mark_applied(&self, timestamp: DateTime<Utc>) -> Result<bool, StoreError> {
        self.check()?;
        let mut decisions = self.decisions.write().map_err(poisoned)?;
        let mut matched = false;
        for d in decisions.iter_mut().filter(|d| d.timestamp == timestamp) {
            d.applied = true;
            d.operator_approved = true;
            matched = true;
        }
        Ok(matched)
    }

    async fn latest_sample(&self) -> Result<Option<ProcessSample>, StoreError> {
        self.check()?;
        let samples = self.samples.read().map_err(poisoned)?;
        Ok(samples.iter().max_by_key(|s| s.timestamp).cloned())
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        self.check()?;
        let samples = self.samples.read().map_err(poisoned)?.len() as u64;
        let decisions = self.decisions.read().map_err(poisoned)?;
        Ok(StoreCounts {
            total_samples: samples,
            total_decisions: decisions.len() as u64,
            pending_decisions: decisions.iter().filter(|d| !d.applied).count() as u64,
        })
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}
