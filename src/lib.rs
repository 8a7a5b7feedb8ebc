//! Refinery Advisor: BIT-TQ decision lifecycle
//!
//! Reads process variables from a field endpoint, persists each sample,
//! proposes parameter changes when the quality index drifts from target,
//! and writes approved changes back to the field.
//!
//! ## Architecture
//!
//! - **Acquisition**: field session handling with a jittered fallback dataset
//! - **Optimizer**: urgency classification, rate-limit gate and impact prediction
//! - **Storage**: append-only samples and decisions (PostgreSQL or in-memory)
//! - **Applier**: parameter writes and operating-mode switch
//! - **Pipeline**: the periodic decision cycle and the apply flow
//! - **Service / API**: operation facade and its REST surface

pub mod acquisition;
pub mod api;
pub mod applier;
pub mod config;
pub mod optimizer;
pub mod pipeline;
pub mod service;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::AdvisorConfig;

// Re-export commonly used types
pub use types::{
    Analysis, ControlSource, ControlledParameter, Decision, DecisionKind, EconomicImpact,
    ParameterMap, ProcessSample, Readings, UrgencyLevel,
};

// Re-export the field seam and its simulator
pub use acquisition::{
    Acquisition, FallbackReason, FieldDataReader, FieldEndpoint, FieldError, FieldSession,
    SimulatedRefinery,
};

// Re-export decision components
pub use applier::{ApplyReport, OperatingMode, ParameterApplier};
pub use optimizer::{DecisionHeuristic, Proposal};
pub use pipeline::{DecisionCycle, DecisionOutcome, TickReport};
pub use service::{DecisionService, OperationResult};
pub use storage::{DecisionStore, InMemoryStore, PgDecisionStore, StoreError};
