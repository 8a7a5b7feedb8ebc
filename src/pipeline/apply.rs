//! APPLY path: fetch the latest pending decision, write it, mark it applied
//!
//! Shared by the cycle's auto-apply policy and the service facade.

use tracing::{info, warn};

use crate::acquisition::FieldEndpoint;
use crate::applier::{ApplyReport, OperatingMode, ParameterApplier};
use crate::storage::{DecisionStore, StoreError};
use crate::types::Decision;

/// Result of applying one pending decision.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub decision: Decision,
    pub report: ApplyReport,
    /// Whether `mark_applied` matched a row. Always false when nothing was written.
    pub marked: bool,
}

impl ApplyOutcome {
    pub fn applied_count(&self) -> usize {
        self.report.applied_count()
    }
}

/// FETCH_PENDING → APPLY_PARAMETERS → MARK_APPLIED.
///
/// Returns `Ok(None)` when no decision is pending. A decision none of whose
/// parameters could be written stays pending.
pub async fn apply_latest_pending<E, S>(
    store: &S,
    applier: &ParameterApplier<E>,
) -> Result<Option<ApplyOutcome>, StoreError>
where
    E: FieldEndpoint,
    S: DecisionStore + ?Sized,
{
    let Some(decision) = store.latest_pending().await? else {
        info!("No pending decision to apply");
        return Ok(None);
    };

    let report = applier
        .apply(&decision.parameter_changes, OperatingMode::Ai)
        .await;

    let marked = if report.is_success() {
        let marked = store.mark_applied(decision.timestamp).await?;
        if marked {
            info!(
                timestamp = %decision.timestamp,
                applied = report.applied_count(),
                "Decision marked as applied"
            );
        } else {
            warn!(timestamp = %decision.timestamp, "No decision row matched when marking applied");
        }
        marked
    } else {
        warn!(timestamp = %decision.timestamp, "No parameters written, decision left pending");
        false
    };

    Ok(Some(ApplyOutcome {
        decision,
        report,
        marked,
    }))
}
