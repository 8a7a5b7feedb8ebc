//! Parameter Applier
//!
//! Writes a decision's parameter targets to the field endpoint and switches
//! the operating mode. Individual write failures are logged and skipped; the
//! caller gets a report of what actually landed.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::acquisition::field::{
    close_session, locate_process_node, open_session, FieldEndpoint, FieldError, FieldSession,
    SessionDeadline,
};
use crate::config::defaults::{OPERATOR_MODE_AI, OPERATOR_MODE_HUMAN, PROCESS_NODE_MARKER};
use crate::types::{ParameterMap, OPERATOR_MODE_VARIABLE};

/// Who drives the process after an apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Human,
    Ai,
}

impl OperatingMode {
    /// Value written to the operating-mode variable.
    pub const fn field_value(self) -> f64 {
        match self {
            Self::Human => OPERATOR_MODE_HUMAN,
            Self::Ai => OPERATOR_MODE_AI,
        }
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Human => "human",
            Self::Ai => "ai",
        })
    }
}

/// Outcome of one apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// Variables written successfully, with the value written
    pub written: ParameterMap,
    /// Requested variables the process node does not expose
    pub unmatched: Vec<String>,
    /// Matched variables whose write failed
    pub failed: Vec<String>,
    /// Whether the operating-mode write landed
    pub mode_set: bool,
    /// Session-level failure that prevented any write
    pub error: Option<String>,
}

impl ApplyReport {
    /// Number of parameter writes that succeeded. The mode write is not counted.
    pub fn applied_count(&self) -> usize {
        self.written.len()
    }

    pub fn is_success(&self) -> bool {
        self.applied_count() > 0
    }
}

pub struct ParameterApplier<E: FieldEndpoint> {
    endpoint: Arc<E>,
    timeout: Duration,
}

impl<E: FieldEndpoint> ParameterApplier<E> {
    pub fn new(endpoint: Arc<E>, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Write every parameter the process node exposes, then set the mode.
    ///
    /// Never fails: connection problems yield an empty report with `error`
    /// set. The session is closed on every path.
    pub async fn apply(&self, parameters: &ParameterMap, mode: OperatingMode) -> ApplyReport {
        let deadline = SessionDeadline::start(self.timeout);
        let mut session = match open_session(&*self.endpoint, &deadline).await {
            Ok(session) => session,
            Err(e) => {
                error!(endpoint = self.endpoint.endpoint_url(), error = %e, "Apply failed: cannot connect");
                return ApplyReport {
                    error: Some(e.to_string()),
                    ..ApplyReport::default()
                };
            }
        };

        let mut report = ApplyReport::default();
        let outcome = deadline
            .run(write_parameters(&mut session, parameters, mode, &mut report))
            .await
            .and_then(|r| r);
        close_session(&mut session).await;

        if let Err(e) = outcome {
            error!(error = %e, written = report.applied_count(), "Apply aborted");
            report.error = Some(e.to_string());
        }

        info!(
            requested = parameters.len(),
            written = report.applied_count(),
            failed = report.failed.len(),
            unmatched = report.unmatched.len(),
            mode = %mode,
            mode_set = report.mode_set,
            "Parameters applied"
        );
        report
    }
}

async fn write_parameters<S: FieldSession + ?Sized>(
    session: &mut S,
    parameters: &ParameterMap,
    mode: OperatingMode,
    report: &mut ApplyReport,
) -> Result<(), FieldError> {
    let process = locate_process_node(session, PROCESS_NODE_MARKER).await?;
    let children = session.browse_children(&process).await?;

    for child in &children {
        let name = child.variable_name();
        let Some(value) = parameters.get(name) else {
            continue;
        };
        match session.write_value(child, value).await {
            Ok(()) => {
                info!(variable = name, value, "Parameter written");
                report.written.insert(name, value);
            }
            Err(e) => {
                error!(variable = name, value, error = %e, "Parameter write failed");
                report.failed.push(name.to_string());
            }
        }
    }

    report.unmatched = parameters
        .iter()
        .map(|(name, _)| name)
        .filter(|name| !children.iter().any(|c| c.variable_name() == *name))
        .map(str::to_string)
        .collect();

    match children
        .iter()
        .find(|c| c.variable_name() == OPERATOR_MODE_VARIABLE)
    {
        Some(mode_node) => match session.write_value(mode_node, mode.field_value()).await {
            Ok(()) => report.mode_set = true,
            Err(e) => error!(error = %e, mode = %mode, "Operating mode write failed"),
        },
        None => warn!("Process node exposes no operating-mode variable"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SimulatedRefinery;

    fn applier(sim: &SimulatedRefinery) -> ParameterApplier<SimulatedRefinery> {
        ParameterApplier::new(Arc::new(sim.clone()), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_partial_apply_accounting() {
        let sim = SimulatedRefinery::new();
        sim.hide_variable("pi18213");
        sim.fail_writes_for("li40054");

        let params: ParameterMap = [
            ("fc1065", 130.0),
            ("li40054", 70.0),
            ("fc31007", 88.0),
            ("pi18213", 2.2),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let report = applier(&sim).apply(&params, OperatingMode::Ai).await;
        assert_eq!(report.applied_count(), 2);
        assert_eq!(report.failed, vec!["li40054".to_string()]);
        assert_eq!(report.unmatched, vec!["pi18213".to_string()]);
        assert!(report.mode_set);
        assert_eq!(sim.value("fc1065"), Some(130.0));
        assert_eq!(sim.value("operator_mode"), Some(1.0));
        assert_eq!(sim.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_baseline_reset_sets_human_mode() {
        let sim = SimulatedRefinery::new();
        sim.set_value("operator_mode", 1.0);
        sim.set_value("fc1065", 133.0);

        let report = applier(&sim)
            .apply(&ParameterMap::baseline(), OperatingMode::Human)
            .await;
        assert_eq!(report.applied_count(), 4);
        assert_eq!(sim.value("fc1065"), Some(127.3));
        assert_eq!(sim.value("operator_mode"), Some(0.0));
    }

    #[tokio::test]
    async fn test_unreachable_reports_zero() {
        let sim = SimulatedRefinery::new();
        sim.set_reachable(false);
        let report = applier(&sim)
            .apply(&ParameterMap::baseline(), OperatingMode::Ai)
            .await;
        assert_eq!(report.applied_count(), 0);
        assert!(!report.is_success());
        assert!(report.error.is_some());
        assert!(sim.writes().is_empty());
    }

    #[tokio::test]
    async fn test_one_deadline_covers_connect_and_writes() {
        let sim = SimulatedRefinery::new();
        sim.set_latency(Duration::from_millis(120));
        let applier = ParameterApplier::new(Arc::new(sim.clone()), Duration::from_millis(300));

        let report = applier
            .apply(&ParameterMap::baseline(), OperatingMode::Ai)
            .await;
        assert_eq!(report.applied_count(), 0);
        assert!(report.error.as_deref().unwrap_or_default().contains("timed out"));
        assert!(sim.writes().is_empty());
        assert_eq!(sim.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_missing_process_node_closes_session() {
        let sim = SimulatedRefinery::new();
        sim.rename_process_node("Tank Farm");
        let report = applier(&sim)
            .apply(&ParameterMap::baseline(), OperatingMode::Ai)
            .await;
        assert_eq!(report.applied_count(), 0);
        assert!(report.error.is_some());
        assert_eq!(sim.open_sessions(), 0);
    }
}
