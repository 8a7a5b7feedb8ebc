//! Decision cycle: READ → STORE_SAMPLE → GATE → PENDING_CHECK → PROPOSE → STORE_DECISION → SLEEP
//!
//! Owns the rate-limit clock and the heuristic's RNG. Field and store calls
//! open their own short-lived connections, so a tick holds nothing between
//! iterations except `last_decision_at`.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::apply::apply_latest_pending;
use crate::acquisition::{Acquisition, FallbackReason, FieldDataReader, FieldEndpoint};
use crate::applier::ParameterApplier;
use crate::config::defaults::{
    POLL_BELOW_TARGET_SECS, POLL_CRITICAL_SECS, POLL_HEALTHY_SECS, POLL_HIGH_SECS,
    URGENCY_CRITICAL_BELOW, URGENCY_HIGH_BELOW,
};
use crate::config::CycleConfig;
use crate::optimizer::DecisionHeuristic;
use crate::storage::{DecisionStore, StoreError};
use crate::types::{ProcessSample, Readings, UrgencyLevel};

/// Tick-level failure. Logged by [`DecisionCycle::run`], followed by a backoff.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// What happened to the decision step of a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    /// The gate refused
    NotWarranted,
    /// The gate passed but an unapplied decision is already recent
    PendingExists { pending: u64 },
    Stored {
        timestamp: DateTime<Utc>,
        confidence: f64,
    },
    /// Stored, then applied by the auto-apply policy
    AutoApplied {
        timestamp: DateTime<Utc>,
        applied_count: usize,
    },
}

/// Summary of one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    /// Set when the reading came from the fallback dataset
    pub fallback: Option<FallbackReason>,
    pub bit_tq: f64,
    pub urgency: UrgencyLevel,
    pub sample_stored: bool,
    pub decision: DecisionOutcome,
    pub next_sleep: Duration,
}

/// Adaptive poll interval: faster the further the quality index sits below target.
pub fn poll_interval(bit_tq: f64, target: f64) -> Duration {
    let secs = if bit_tq < URGENCY_CRITICAL_BELOW {
        POLL_CRITICAL_SECS
    } else if bit_tq < URGENCY_HIGH_BELOW {
        POLL_HIGH_SECS
    } else if bit_tq < target {
        POLL_BELOW_TARGET_SECS
    } else {
        POLL_HEALTHY_SECS
    };
    Duration::from_secs(secs)
}

pub struct DecisionCycle<E: FieldEndpoint, S: DecisionStore + ?Sized> {
    reader: FieldDataReader<E>,
    applier: Arc<ParameterApplier<E>>,
    store: Arc<S>,
    heuristic: DecisionHeuristic,
    config: CycleConfig,
    last_decision_at: Option<DateTime<Utc>>,
    tick_count: u64,
    rng: StdRng,
}

impl<E: FieldEndpoint, S: DecisionStore + ?Sized> DecisionCycle<E, S> {
    pub fn new(
        reader: FieldDataReader<E>,
        applier: Arc<ParameterApplier<E>>,
        store: Arc<S>,
        heuristic: DecisionHeuristic,
        config: CycleConfig,
    ) -> Self {
        Self {
            reader,
            applier,
            store,
            heuristic,
            config,
            last_decision_at: None,
            tick_count: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the entropy-seeded RNG with a deterministic one.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn last_decision_at(&self) -> Option<DateTime<Utc>> {
        self.last_decision_at
    }

    /// Run one full tick.
    pub async fn tick(&mut self) -> Result<TickReport, CycleError> {
        self.tick_count += 1;

        let acquisition = self.reader.read().await;
        let fallback = match &acquisition {
            Acquisition::Fallback { reason, .. } => Some(reason.clone()),
            Acquisition::Live(_) => None,
        };
        let readings = acquisition.into_readings();
        let now = Utc::now();

        let sample = ProcessSample::from_readings(&readings, now);
        let sample_stored = match self.store.insert_sample(&sample).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to store process sample");
                false
            }
        };

        let analysis = self.heuristic.classify(&readings);
        let since_last = self.last_decision_at.map(|at| now - at);
        let decision = if self.heuristic.should_propose(&analysis, since_last) {
            self.propose_and_store(&readings, now).await?
        } else {
            DecisionOutcome::NotWarranted
        };

        Ok(TickReport {
            tick: self.tick_count,
            fallback,
            bit_tq: analysis.current_bit_tq,
            urgency: analysis.urgency_level,
            sample_stored,
            decision,
            next_sleep: poll_interval(analysis.current_bit_tq, self.heuristic.target_bit_tq()),
        })
    }

    /// Pending check, then proposal and insert. The rate-limit clock only
    /// moves once the decision is stored.
    async fn propose_and_store(
        &mut self,
        readings: &Readings,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, CycleError> {
        let window = Duration::from_secs(self.config.pending_window_secs);
        let since = chrono::Duration::from_std(window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window));
        let pending = self.store.count_pending(since).await?;
        if pending > 0 {
            info!(pending, "Pending decision exists, not storing a new one");
            return Ok(DecisionOutcome::PendingExists { pending });
        }

        let proposal = self
            .heuristic
            .propose(readings, self.last_decision_at, now, &mut self.rng);
        let Some(decision) = proposal.decision else {
            return Ok(DecisionOutcome::NotWarranted);
        };

        self.store.insert_decision(&decision).await?;
        self.last_decision_at = proposal.last_decision_at;
        info!(
            timestamp = %decision.timestamp,
            savings_eur_hour = decision.savings_eur_hour,
            confidence = decision.confidence,
            "Decision stored"
        );
        self.maybe_auto_apply(decision.timestamp, decision.confidence)
            .await
    }

    async fn maybe_auto_apply(
        &self,
        timestamp: DateTime<Utc>,
        confidence: f64,
    ) -> Result<DecisionOutcome, CycleError> {
        let stored = DecisionOutcome::Stored {
            timestamp,
            confidence,
        };
        let Some(min_confidence) = self.config.auto_apply_min_confidence else {
            return Ok(stored);
        };
        if confidence < min_confidence {
            return Ok(stored);
        }

        info!(confidence, min_confidence, "Auto-applying decision");
        match apply_latest_pending(&*self.store, &self.applier).await? {
            Some(outcome) if outcome.marked => Ok(DecisionOutcome::AutoApplied {
                timestamp: outcome.decision.timestamp,
                applied_count: outcome.applied_count(),
            }),
            _ => Ok(stored),
        }
    }

    /// Tick until cancelled. A failed tick is logged and followed by the
    /// error backoff; it never ends the loop.
    pub async fn run(mut self, cancel: CancellationToken) {
        let startup = Duration::from_secs(self.config.startup_delay_secs);
        if !startup.is_zero() {
            info!(delay = ?startup, "Waiting for field endpoint before first tick");
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(startup) => {}
            }
        }

        info!(
            endpoint = self.reader.endpoint().endpoint_url(),
            store = self.store.backend_name(),
            "Decision cycle started"
        );

        while !cancel.is_cancelled() {
            let sleep = match self.tick().await {
                Ok(report) => {
                    log_report(&report);
                    report.next_sleep
                }
                Err(e) => {
                    error!(tick = self.tick_count, error = %e, "Tick failed, backing off");
                    Duration::from_secs(self.config.error_backoff_secs)
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(sleep) => {}
            }
        }

        info!(ticks = self.tick_count, "Decision cycle stopped");
    }
}

fn log_report(report: &TickReport) {
    let source = if report.fallback.is_some() { "fallback" } else { "live" };
    match &report.decision {
        DecisionOutcome::NotWarranted => info!(
            tick = report.tick,
            source,
            bit_tq = report.bit_tq,
            urgency = %report.urgency,
            next_sleep = ?report.next_sleep,
            "Tick complete"
        ),
        outcome => info!(
            tick = report.tick,
            source,
            bit_tq = report.bit_tq,
            urgency = %report.urgency,
            decision = ?outcome,
            next_sleep = ?report.next_sleep,
            "Tick complete"
        ),
    }
    if !report.sample_stored {
        warn!(tick = report.tick, "Sample was not persisted this tick");
    }
}
