//! In-process simulated refinery endpoint
//!
//! Exposes the same address space as the plant gateway: a `Refinery` object
//! under `Objects` whose children are the process variables. Values drift
//! randomly within their bounds; the quality index responds to the controlled
//! parameters and is pulled toward 52 while the AI mode is active.
//!
//! Fault injection hooks (unreachable endpoint, hidden variables, failing
//! writes, renamed process node, network latency) let tests drive every
//! fallback path.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::field::{FieldEndpoint, FieldError, FieldSession, NodeRef};
use crate::config::defaults::{FIELD_PATH, FIELD_PORT, OPERATOR_MODE_AI, PROCESS_NODE_MARKER};

/// Drift step interval used by [`SimulatedRefinery::spawn_drift`].
pub const DRIFT_INTERVAL: Duration = Duration::from_secs(3);

const SERVER_NODE_ID: &str = "i=2253";
const NAMESPACE: u16 = 1;

#[derive(Debug, Clone, Copy)]
struct SimVariable {
    value: f64,
    min: f64,
    max: f64,
    /// Proportional drift span per step
    variance: f64,
}

impl SimVariable {
    const fn new(value: f64, min: f64, max: f64, variance: f64) -> Self {
        Self {
            value,
            min,
            max,
            variance,
        }
    }
}

#[derive(Debug)]
struct SimState {
    process_node_name: String,
    variables: BTreeMap<String, SimVariable>,
    reachable: bool,
    hidden: HashSet<String>,
    failing_writes: HashSet<String>,
    writes: Vec<(String, f64)>,
    sessions_opened: u64,
    sessions_closed: u64,
    latency: Duration,
}

impl SimState {
    fn new() -> Self {
        let variables = [
            ("bit_tq", SimVariable::new(45.2, 35.0, 65.0, 0.03)),
            ("fc1065", SimVariable::new(127.3, 120.0, 135.0, 0.02)),
            ("li40054", SimVariable::new(68.2, 60.0, 75.0, 0.015)),
            ("fc31007", SimVariable::new(89.1, 85.0, 95.0, 0.025)),
            ("pi18213", SimVariable::new(2.14, 2.0, 2.5, 0.01)),
            ("energy_consumption", SimVariable::new(1250.0, 1000.0, 1500.0, 0.05)),
            ("co2_emissions", SimVariable::new(34.5, 25.0, 45.0, 0.04)),
            ("hvbgo_flow", SimVariable::new(156.8, 140.0, 170.0, 0.03)),
            ("temperature_flash", SimVariable::new(420.0, 400.0, 450.0, 0.02)),
            ("system_status", SimVariable::new(1.0, 0.0, 3.0, 0.0)),
            ("operator_mode", SimVariable::new(0.0, 0.0, 1.0, 0.0)),
            ("last_ai_decision", SimVariable::new(0.0, 0.0, f64::MAX, 0.0)),
        ]
        .into_iter()
        .map(|(name, var)| (name.to_string(), var))
        .collect();

        Self {
            process_node_name: PROCESS_NODE_MARKER.to_string(),
            variables,
            reachable: true,
            hidden: HashSet::new(),
            failing_writes: HashSet::new(),
            writes: Vec::new(),
            sessions_opened: 0,
            sessions_closed: 0,
            latency: Duration::ZERO,
        }
    }

    fn value(&self, name: &str) -> f64 {
        self.variables.get(name).map_or(0.0, |v| v.value)
    }

    fn process_node(&self) -> NodeRef {
        NodeRef {
            node_id: format!("ns={NAMESPACE};s={}", self.process_node_name),
            browse_name: format!("{NAMESPACE}:{}", self.process_node_name),
            display_name: self.process_node_name.clone(),
        }
    }

    fn variable_node(&self, name: &str) -> NodeRef {
        NodeRef {
            node_id: format!("ns={NAMESPACE};s={}.{name}", self.process_node_name),
            browse_name: format!("{NAMESPACE}:{name}"),
            display_name: name.to_string(),
        }
    }

    /// One drift step: random walk, then process coupling.
    fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let ai_mode = (self.value("operator_mode") - OPERATOR_MODE_AI).abs() < f64::EPSILON;

        for var in self.variables.values_mut() {
            if var.variance > 0.0 {
                let change = (rng.gen::<f64>() - 0.5) * 2.0 * var.variance;
                var.value = (var.value * (1.0 + change)).clamp(var.min, var.max);
            }
        }

        let fc1065 = self.value("fc1065");
        let li40054 = self.value("li40054");
        let fc31007 = self.value("fc31007");
        let pi18213 = self.value("pi18213");
        let hvbgo = self.value("hvbgo_flow");

        let coupling = (fc1065 - 127.3) * 0.15
            + (li40054 - 68.2) * 0.12
            + (fc31007 - 89.1) * -0.08
            + (pi18213 - 2.14) * 8.0;
        self.update("bit_tq", |v| {
            let v = v + coupling;
            if ai_mode {
                v + (52.0 - v) * 0.3
            } else {
                v
            }
        });

        self.update("energy_consumption", |v| {
            let v = v + (hvbgo - 156.8) * 2.5;
            if ai_mode {
                v * 0.92
            } else {
                v
            }
        });

        let energy = self.value("energy_consumption");
        let noise = (rng.gen::<f64>() - 0.5) * 2.0;
        self.update("co2_emissions", |_| {
            let v = 34.5 * energy / 1250.0 + noise;
            if ai_mode {
                v * 0.88
            } else {
                v
            }
        });

        if ai_mode {
            self.update("hvbgo_flow", |v| v + (148.5 - v) * 0.2);
        }
    }

    fn update(&mut self, name: &str, f: impl FnOnce(f64) -> f64) {
        if let Some(var) = self.variables.get_mut(name) {
            var.value = f(var.value).clamp(var.min, var.max);
        }
    }
}

/// Simulated field endpoint. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct SimulatedRefinery {
    state: Arc<Mutex<SimState>>,
    url: String,
}

impl Default for SimulatedRefinery {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRefinery {
    pub fn new() -> Self {
        Self::with_host("localhost")
    }

    /// Label the simulator with the host it stands in for.
    pub fn with_host(host: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new())),
            url: format!("sim+opc.tcp://{host}:{FIELD_PORT}{FIELD_PATH}"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // State is plain data; a panic mid-update leaves it usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `connect` fail (or succeed again).
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Stop exposing a variable in browse results.
    pub fn hide_variable(&self, name: &str) {
        self.lock().hidden.insert(name.to_string());
    }

    /// Make every write to `name` fail.
    pub fn fail_writes_for(&self, name: &str) {
        self.lock().failing_writes.insert(name.to_string());
    }

    /// Delay the connect and every browse round-trip by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Rename the process object so the display-name lookup no longer matches.
    pub fn rename_process_node(&self, name: &str) {
        self.lock().process_node_name = name.to_string();
    }

    pub fn set_value(&self, name: &str, value: f64) {
        let mut state = self.lock();
        if let Some(var) = state.variables.get_mut(name) {
            var.value = value;
        }
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.lock().variables.get(name).map(|v| v.value)
    }

    /// Every successful write, in order.
    pub fn writes(&self) -> Vec<(String, f64)> {
        self.lock().writes.clone()
    }

    /// Sessions opened but not yet disconnected.
    pub fn open_sessions(&self) -> u64 {
        let state = self.lock();
        state.sessions_opened - state.sessions_closed
    }

    /// Advance the simulation by one drift step.
    pub fn step<R: Rng + ?Sized>(&self, rng: &mut R) {
        self.lock().step(rng);
    }

    /// Drift the process every [`DRIFT_INTERVAL`] until cancelled.
    pub fn spawn_drift(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let sim = self.clone();
        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut interval = tokio::time::interval(DRIFT_INTERVAL);
            info!(endpoint = %sim.url, "Simulated refinery running");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => sim.step(&mut rng),
                }
            }
            debug!("Simulated refinery stopped");
        })
    }
}

#[async_trait]
impl FieldEndpoint for SimulatedRefinery {
    type Session = SimulatedSession;

    async fn connect(&self) -> Result<Self::Session, FieldError> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        if !state.reachable {
            return Err(FieldError::ConnectionFailed(format!(
                "{}: connection refused",
                self.url
            )));
        }
        state.sessions_opened += 1;
        Ok(SimulatedSession {
            state: Arc::clone(&self.state),
            open: true,
        })
    }

    fn endpoint_url(&self) -> &str {
        &self.url
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Session against a [`SimulatedRefinery`].
#[derive(Debug)]
pub struct SimulatedSession {
    state: Arc<Mutex<SimState>>,
    open: bool,
}

impl SimulatedSession {
    fn lock(&self) -> Result<MutexGuard<'_, SimState>, FieldError> {
        if !self.open {
            return Err(FieldError::SessionClosed);
        }
        Ok(self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    async fn round_trip(&self) -> Result<(), FieldError> {
        let latency = self.lock()?.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    /// Variable name addressed by a node id, if it belongs to the process node.
    fn variable_of<'a>(state: &SimState, node: &'a NodeRef) -> Option<&'a str> {
        let prefix = format!("ns={NAMESPACE};s={}.", state.process_node_name);
        node.node_id
            .strip_prefix(&prefix)
            .filter(|name| state.variables.contains_key(*name) && !state.hidden.contains(*name))
    }
}

#[async_trait]
impl FieldSession for SimulatedSession {
    async fn browse_objects(&mut self) -> Result<Vec<NodeRef>, FieldError> {
        self.round_trip().await?;
        let state = self.lock()?;
        Ok(vec![
            NodeRef {
                node_id: SERVER_NODE_ID.to_string(),
                browse_name: "0:Server".to_string(),
                display_name: "Server".to_string(),
            },
            state.process_node(),
        ])
    }

    async fn browse_children(&mut self, node: &NodeRef) -> Result<Vec<NodeRef>, FieldError> {
        self.round_trip().await?;
        let state = self.lock()?;
        if node.node_id != state.process_node().node_id {
            return Ok(Vec::new());
        }
        Ok(state
            .variables
            .keys()
            .filter(|name| !state.hidden.contains(*name))
            .map(|name| state.variable_node(name))
            .collect())
    }

    async fn read_value(&mut self, node: &NodeRef) -> Result<f64, FieldError> {
        let state = self.lock()?;
        let name = Self::variable_of(&state, node).ok_or_else(|| FieldError::ReadFailed {
            node: node.node_id.clone(),
            message: "BadNodeIdUnknown".to_string(),
        })?;
        Ok(state.value(name))
    }

    async fn write_value(&mut self, node: &NodeRef, value: f64) -> Result<(), FieldError> {
        let mut state = self.lock()?;
        let name = Self::variable_of(&state, node)
            .ok_or_else(|| FieldError::WriteFailed {
                node: node.node_id.clone(),
                message: "BadNodeIdUnknown".to_string(),
            })?
            .to_string();
        if state.failing_writes.contains(&name) {
            return Err(FieldError::WriteFailed {
                node: node.node_id.clone(),
                message: "BadUserAccessDenied".to_string(),
            });
        }
        if let Some(var) = state.variables.get_mut(&name) {
            var.value = value;
        }
        state.writes.push((name, value));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), FieldError> {
        if self.open {
            self.lock()?.sessions_closed += 1;
            self.open = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drift_stays_within_bounds() {
        let sim = SimulatedRefinery::new();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            sim.step(&mut rng);
        }
        let q = sim.value("bit_tq").unwrap();
        assert!((35.0..=65.0).contains(&q));
        let p = sim.value("pi18213").unwrap();
        assert!((2.0..=2.5).contains(&p));
        assert_eq!(sim.value("operator_mode"), Some(0.0));
    }

    #[test]
    fn test_ai_mode_pulls_quality_toward_52() {
        let sim = SimulatedRefinery::new();
        sim.set_value("operator_mode", 1.0);
        sim.set_value("bit_tq", 38.0);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            // Hold the inputs at baseline so only the mode pull acts.
            for (name, v) in [("fc1065", 127.3), ("li40054", 68.2), ("fc31007", 89.1), ("pi18213", 2.14)] {
                sim.set_value(name, v);
            }
            sim.step(&mut rng);
        }
        let q = sim.value("bit_tq").unwrap();
        assert!(q > 45.0, "quality {q} not pulled up");
    }

    #[tokio::test]
    async fn test_session_browse_and_write() {
        let sim = SimulatedRefinery::new();
        let mut session = sim.connect().await.unwrap();
        let objects = session.browse_objects().await.unwrap();
        let process = objects
            .iter()
            .find(|n| n.display_name.contains("Refinery"))
            .unwrap()
            .clone();
        let children = session.browse_children(&process).await.unwrap();
        assert_eq!(children.len(), 12);

        let fc = children.iter().find(|n| n.variable_name() == "fc1065").unwrap();
        session.write_value(fc, 130.0).await.unwrap();
        assert_eq!(session.read_value(fc).await.unwrap(), 130.0);
        assert_eq!(sim.writes(), vec![("fc1065".to_string(), 130.0)]);

        assert_eq!(sim.open_sessions(), 1);
        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();
        assert_eq!(sim.open_sessions(), 0);
        assert!(matches!(
            session.read_value(fc).await,
            Err(FieldError::SessionClosed)
        ));
    }
}
