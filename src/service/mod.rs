//! Decision Service - the operations the REST layer exposes
//!
//! Every operation returns an [`OperationResult`]. Store and field failures
//! are converted into `success = false` with a readable message; nothing here
//! returns `Err`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::acquisition::FieldEndpoint;
use crate::applier::{OperatingMode, ParameterApplier};
use crate::optimizer::DecisionHeuristic;
use crate::pipeline::apply_latest_pending;
use crate::storage::DecisionStore;
use crate::types::{ControlSource, Decision, EconomicImpact, ParameterMap, ProcessSample};

/// Structured result of a facade operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> OperationResult<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// A decision together with its economic projection.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionView {
    #[serde(flatten)]
    pub decision: Decision,
    pub economic_impact: EconomicImpact,
}

impl From<Decision> for DecisionView {
    fn from(decision: Decision) -> Self {
        let economic_impact = decision.economic_impact();
        Self {
            decision,
            economic_impact,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyResult {
    pub decision_timestamp: DateTime<Utc>,
    pub applied_parameters: ParameterMap,
    pub applied_count: usize,
    pub failed_parameters: Vec<String>,
    pub marked_applied: bool,
    pub operating_mode: String,
    pub field_endpoint: String,
    /// Writes went to the in-process simulator, not a plant
    pub simulated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetResult {
    pub applied_parameters: ParameterMap,
    pub applied_count: usize,
    pub operating_mode: String,
    pub field_endpoint: String,
    pub simulated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub total_samples: u64,
    pub total_decisions: u64,
    pub pending_decisions: u64,
    pub latest_bit_tq: Option<f64>,
    pub latest_data_source: Option<ControlSource>,
    pub ai_control_active: bool,
    pub store_backend: &'static str,
    pub checked_at: DateTime<Utc>,
}

/// Facade over the store, applier and heuristic.
pub struct DecisionService<E: FieldEndpoint, S: DecisionStore + ?Sized> {
    store: Arc<S>,
    applier: Arc<ParameterApplier<E>>,
    heuristic: DecisionHeuristic,
}

impl<E: FieldEndpoint, S: DecisionStore + ?Sized> DecisionService<E, S> {
    pub fn new(
        store: Arc<S>,
        applier: Arc<ParameterApplier<E>>,
        heuristic: DecisionHeuristic,
    ) -> Self {
        Self {
            store,
            applier,
            heuristic,
        }
    }

    fn field_label(&self) -> &'static str {
        if self.applier.endpoint().is_simulated() {
            "simulated field"
        } else {
            "field"
        }
    }

    /// Latest pending decision.
    pub async fn latest_decision(&self) -> OperationResult<DecisionView> {
        match self.store.latest_pending().await {
            Ok(Some(decision)) => OperationResult::ok("Pending decision found", decision.into()),
            Ok(None) => match self.store.counts().await {
                Ok(counts) => OperationResult::failure(format!(
                    "No pending decisions (total: {}, pending: {})",
                    counts.total_decisions, counts.pending_decisions
                )),
                Err(e) => store_failure("count decisions", &e),
            },
            Err(e) => store_failure("fetch latest decision", &e),
        }
    }

    /// Apply the latest pending decision and mark it applied.
    pub async fn apply_latest(&self) -> OperationResult<ApplyResult> {
        let outcome = match apply_latest_pending(&*self.store, &self.applier).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return OperationResult::failure("No pending decision to apply"),
            Err(e) => return store_failure("apply latest decision", &e),
        };

        let count = outcome.applied_count();
        let result = ApplyResult {
            decision_timestamp: outcome.decision.timestamp,
            applied_parameters: outcome.report.written.clone(),
            applied_count: count,
            failed_parameters: outcome.report.failed.clone(),
            marked_applied: outcome.marked,
            operating_mode: OperatingMode::Ai.to_string(),
            field_endpoint: self.applier.endpoint().endpoint_url().to_string(),
            simulated: self.applier.endpoint().is_simulated(),
        };

        if count == 0 {
            let reason = outcome
                .report
                .error
                .unwrap_or_else(|| "no matching variables written".to_string());
            return OperationResult {
                success: false,
                message: format!("Failed to apply decision: {reason}"),
                data: Some(result),
            };
        }
        OperationResult::ok(
            format!(
                "Applied {count} parameters to the {}, process switched to AI control",
                self.field_label()
            ),
            result,
        )
    }

    /// Restore the fixed baseline and hand control back to the operator.
    pub async fn reset_to_baseline(&self) -> OperationResult<ResetResult> {
        let baseline = ParameterMap::baseline();
        let report = self.applier.apply(&baseline, OperatingMode::Human).await;
        let count = report.applied_count();
        let result = ResetResult {
            applied_parameters: report.written,
            applied_count: count,
            operating_mode: OperatingMode::Human.to_string(),
            field_endpoint: self.applier.endpoint().endpoint_url().to_string(),
            simulated: self.applier.endpoint().is_simulated(),
        };

        if count == 0 {
            return OperationResult {
                success: false,
                message: "Failed to reset to baseline: no variables written".to_string(),
                data: Some(result),
            };
        }
        info!(applied = count, "Process reset to baseline");
        OperationResult::ok(
            format!(
                "Reset {count} parameters to baseline on the {}, process under human control",
                self.field_label()
            ),
            result,
        )
    }

    /// Synthesize and store a decision from the latest sample, bypassing the gate.
    pub async fn force_generate(&self) -> OperationResult<DecisionView> {
        let sample = match self.store.latest_sample().await {
            Ok(Some(sample)) => sample,
            Ok(None) => return OperationResult::failure("No process data available"),
            Err(e) => return store_failure("fetch latest sample", &e),
        };

        let decision = self
            .heuristic
            .force_propose(&sample.to_readings(), Utc::now());
        if let Err(e) = self.store.insert_decision(&decision).await {
            return store_failure("store forced decision", &e);
        }

        info!(
            timestamp = %decision.timestamp,
            bit_tq = ?sample.bit_tq,
            "Forced decision generated"
        );
        OperationResult::ok("Forced decision generated", decision.into())
    }

    /// Aggregate counts and the latest quality reading.
    pub async fn status(&self) -> OperationResult<StatusReport> {
        let counts = match self.store.counts().await {
            Ok(counts) => counts,
            Err(e) => return store_failure("count records", &e),
        };
        let latest = match self.store.latest_sample().await {
            Ok(latest) => latest,
            Err(e) => return store_failure("fetch latest sample", &e),
        };

        let latest_data_source = latest.as_ref().map(|s| s.data_source);
        OperationResult::ok(
            "Status retrieved",
            StatusReport {
                total_samples: counts.total_samples,
                total_decisions: counts.total_decisions,
                pending_decisions: counts.pending_decisions,
                latest_bit_tq: latest.as_ref().and_then(|s| s.bit_tq),
                latest_data_source,
                ai_control_active: latest_data_source == Some(ControlSource::AiControl),
                store_backend: self.store.backend_name(),
                checked_at: Utc::now(),
            },
        )
    }

    /// Latest stored process sample.
    pub async fn current_process(&self) -> OperationResult<ProcessSample> {
        match self.store.latest_sample().await {
            Ok(Some(sample)) => OperationResult::ok("Current process data", sample),
            Ok(None) => OperationResult::failure("No process data available"),
            Err(e) => store_failure("fetch latest sample", &e),
        }
    }
}

fn store_failure<T>(operation: &str, e: &crate::storage::StoreError) -> OperationResult<T> {
    error!(operation, error = %e, "Store operation failed");
    OperationResult::failure(format!("Failed to {operation}: {e}"))
}
