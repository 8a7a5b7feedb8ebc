//! System-wide default constants.
//!
//! Grouped by subsystem. Values marked as configurable are only the starting
//! point for [`AdvisorConfig`](super::AdvisorConfig); everything else is fixed.

// ============================================================================
// Quality Index
// ============================================================================

/// Target quality index (configurable).
pub const QUALITY_TARGET: f64 = 50.0;

/// Quality index assumed when the reading is missing.
pub const DEFAULT_QUALITY_INDEX: f64 = 45.0;

/// Urgency tiers: quality strictly below these is CRITICAL / HIGH / MEDIUM.
/// Below target (but above MEDIUM) is LOW, anything else NORMAL.
pub const URGENCY_CRITICAL_BELOW: f64 = 40.0;
pub const URGENCY_HIGH_BELOW: f64 = 45.0;
pub const URGENCY_MEDIUM_BELOW: f64 = 48.0;

/// Quality outside `[ANOMALY_LOW, ANOMALY_HIGH]` is anomalous.
pub const ANOMALY_LOW: f64 = 40.0;
pub const ANOMALY_HIGH: f64 = 60.0;

/// Quality outside `[SEVERE_ANOMALY_LOW, SEVERE_ANOMALY_HIGH]` is a HIGH severity anomaly.
pub const SEVERE_ANOMALY_LOW: f64 = 35.0;
pub const SEVERE_ANOMALY_HIGH: f64 = 65.0;

/// Energy load (MWh) at which the energy efficiency term reaches 100.
pub const EFFICIENCY_ENERGY_REFERENCE: f64 = 1200.0;

// ============================================================================
// Decision Heuristic
// ============================================================================

/// Minimum time between two gated proposals (seconds, configurable).
pub const DECISION_COOLDOWN_SECS: u64 = 30;

/// After this long without a proposal, any non-NORMAL urgency triggers one
/// (seconds, configurable).
pub const DECISION_CEILING_SECS: u64 = 120;

/// Scale from weighted relative parameter change to quality points.
pub const IMPROVEMENT_SCALE: f64 = 15.0;

/// Prediction noise standard deviation as a fraction of the improvement.
/// Models the unexplained variance of the approximated model (R² = 0.77).
pub const IMPROVEMENT_NOISE_FRACTION: f64 = 0.23;

/// Lower bound on the prediction noise standard deviation.
pub const MIN_IMPROVEMENT_NOISE_STD: f64 = 0.1;

pub const ENERGY_SAVING_PER_POINT: f64 = 0.025;
pub const MAX_ENERGY_SAVING: f64 = 0.12;
pub const CO2_REDUCTION_PER_POINT: f64 = 0.03;
pub const MAX_CO2_REDUCTION: f64 = 0.15;

/// Monthly savings (EUR) for a 5% quality improvement.
pub const MONTHLY_SAVINGS_PER_5PCT: f64 = 27_781.0;

/// Bounds on the improvement factor (multiples of a 5% improvement).
pub const MIN_IMPROVEMENT_FACTOR: f64 = 0.01;
pub const MAX_IMPROVEMENT_FACTOR: f64 = 4.0;

/// Base model confidence (configurable) and its per-decision noise.
pub const BASE_CONFIDENCE: f64 = 0.77;
pub const CONFIDENCE_NOISE_STD: f64 = 0.05;
pub const MIN_CONFIDENCE: f64 = 0.5;
pub const MAX_CONFIDENCE: f64 = 1.0;

/// HVbGO recirculation flow reduction per predicted quality point.
pub const HVBGO_REDUCTION_PER_POINT: f64 = 2.5;

// ============================================================================
// Forced Decisions
// ============================================================================

pub const FORCED_CONFIDENCE: f64 = 0.82;
pub const FORCED_ENERGY_SAVING: f64 = 0.08;
pub const FORCED_CO2_REDUCTION: f64 = 0.12;
pub const FORCED_SAVINGS_EUR_HOUR: f64 = 185.0;
/// Quality the forced decision aims for, and the cap on its prediction.
pub const FORCED_TARGET_BIT_TQ: f64 = 52.0;
pub const FORCED_MAX_PREDICTED_BIT_TQ: f64 = 58.0;
pub const FORCED_MIN_IMPROVEMENT: f64 = 2.0;
/// Quality below which a forced decision is flagged anomalous.
pub const FORCED_ANOMALY_BELOW: f64 = 45.0;

// ============================================================================
// Decision Cycle
// ============================================================================

/// Window in which an unapplied decision blocks a new proposal (seconds, configurable).
pub const PENDING_WINDOW_SECS: u64 = 600;

/// Sleep after a failed tick (seconds, configurable).
pub const TICK_ERROR_BACKOFF_SECS: u64 = 10;

/// Wait for the field endpoint to come up before the first tick (seconds, configurable).
pub const STARTUP_DELAY_SECS: u64 = 20;

/// Adaptive poll intervals by quality band (seconds).
pub const POLL_CRITICAL_SECS: u64 = 10;
pub const POLL_HIGH_SECS: u64 = 15;
pub const POLL_BELOW_TARGET_SECS: u64 = 20;
pub const POLL_HEALTHY_SECS: u64 = 25;

// ============================================================================
// Field Protocol
// ============================================================================

pub const FIELD_PORT: u16 = 4840;
pub const FIELD_PATH: &str = "/refinery";

/// Substring of the display name identifying the process node under Objects.
pub const PROCESS_NODE_MARKER: &str = "Refinery";

/// Per-session timeout (milliseconds). Not configurable per call.
pub const FIELD_SESSION_TIMEOUT_MS: u64 = 10_000;

/// A live read needs strictly more than 5 variables to be trusted.
pub const MIN_LIVE_VARIABLES: usize = 6;

/// Proportional jitter span applied to fallback values.
pub const FALLBACK_QUALITY_VARIANCE: f64 = 0.02;
pub const FALLBACK_VARIANCE: f64 = 0.01;

/// Operating-mode values written to the mode variable.
pub const OPERATOR_MODE_HUMAN: f64 = 0.0;
pub const OPERATOR_MODE_AI: f64 = 1.0;

// ============================================================================
// Relational Store
// ============================================================================

pub const DB_PORT: u16 = 5432;

// ============================================================================
// HTTP
// ============================================================================

pub const HTTP_ADDR: &str = "0.0.0.0:5000";
