//! Field data reader with static-dataset fallback
//!
//! `read()` never fails. When the endpoint is unreachable, the process node is
//! missing, too few variables come back, or the quality index is unusable, the
//! reader substitutes the jittered fallback dataset and reports why.

use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::field::{
    close_session, locate_process_node, open_session, FieldEndpoint, FieldError, FieldSession,
    SessionDeadline,
};
use crate::config::defaults::{
    FALLBACK_QUALITY_VARIANCE, FALLBACK_VARIANCE, MIN_LIVE_VARIABLES, PROCESS_NODE_MARKER,
};
use crate::types::{Readings, QUALITY_INDEX_VARIABLE};

/// Why a read fell back to the static dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    /// Connect, browse or read failed
    Unreachable(String),
    /// The session exceeded its timeout
    Timeout,
    /// No node under Objects matches the process marker
    NodeNotFound,
    /// Fewer recognised variables than required
    InsufficientVariables { found: usize, required: usize },
    /// Quality index missing, non-finite or not positive
    InvalidQuality(Option<f64>),
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable(e) => write!(f, "endpoint unreachable: {e}"),
            Self::Timeout => f.write_str("session timed out"),
            Self::NodeNotFound => f.write_str("process node not found"),
            Self::InsufficientVariables { found, required } => {
                write!(f, "only {found} variables read, need {required}")
            }
            Self::InvalidQuality(Some(v)) => write!(f, "invalid quality index {v}"),
            Self::InvalidQuality(None) => f.write_str("quality index missing"),
        }
    }
}

impl From<FieldError> for FallbackReason {
    fn from(e: FieldError) -> Self {
        match e {
            FieldError::Timeout(_) => Self::Timeout,
            FieldError::NodeNotFound(_) => Self::NodeNotFound,
            other => Self::Unreachable(other.to_string()),
        }
    }
}

/// Outcome of one acquisition.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Live(Readings),
    Fallback {
        readings: Readings,
        reason: FallbackReason,
    },
}

impl Acquisition {
    pub fn readings(&self) -> &Readings {
        match self {
            Self::Live(readings) | Self::Fallback { readings, .. } => readings,
        }
    }

    pub fn into_readings(self) -> Readings {
        match self {
            Self::Live(readings) | Self::Fallback { readings, .. } => readings,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Reads the full process variable set from the field endpoint.
pub struct FieldDataReader<E: FieldEndpoint> {
    endpoint: Arc<E>,
    timeout: Duration,
    /// Set while reads are being served from the fallback dataset
    degraded: AtomicBool,
}

impl<E: FieldEndpoint> FieldDataReader<E> {
    pub fn new(endpoint: Arc<E>, timeout: Duration) -> Self {
        Self {
            endpoint,
            timeout,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &Arc<E> {
        &self.endpoint
    }

    /// Acquire one reading of every process variable. Never fails.
    pub async fn read(&self) -> Acquisition {
        let acquisition = match self.read_live().await {
            Ok(readings) => Acquisition::Live(readings),
            Err(reason) => Acquisition::Fallback {
                readings: jittered_fallback(),
                reason,
            },
        };
        self.note_transition(&acquisition);
        acquisition
    }

    async fn read_live(&self) -> Result<Readings, FallbackReason> {
        let deadline = SessionDeadline::start(self.timeout);
        let mut session = open_session(&*self.endpoint, &deadline).await?;
        let result = deadline
            .run(read_process_variables(&mut session))
            .await
            .and_then(|r| r);
        close_session(&mut session).await;

        let values = result?;
        let (readings, recognised) = Readings::from_variables(&values);
        if recognised < MIN_LIVE_VARIABLES {
            return Err(FallbackReason::InsufficientVariables {
                found: recognised,
                required: MIN_LIVE_VARIABLES,
            });
        }
        match readings.bit_tq {
            Some(q) if q.is_finite() && q > 0.0 => Ok(readings),
            other => Err(FallbackReason::InvalidQuality(other)),
        }
    }

    fn note_transition(&self, acquisition: &Acquisition) {
        let was_degraded = self.degraded.swap(acquisition.is_fallback(), Ordering::Relaxed);
        match acquisition {
            Acquisition::Fallback { reason, .. } if !was_degraded => {
                warn!(
                    endpoint = self.endpoint.endpoint_url(),
                    reason = %reason,
                    "Field read failed, serving fallback dataset"
                );
            }
            Acquisition::Fallback { reason, .. } => {
                debug!(reason = %reason, "Still serving fallback dataset");
            }
            Acquisition::Live(_) if was_degraded => {
                info!(endpoint = self.endpoint.endpoint_url(), "Field endpoint recovered");
            }
            Acquisition::Live(readings) => {
                debug!(bit_tq = ?readings.bit_tq, "Live field read");
            }
        }
    }
}

/// Locate the process node and read every child variable.
///
/// A variable whose read fails is skipped; the caller decides whether enough
/// came back.
pub(crate) async fn read_process_variables<S: FieldSession + ?Sized>(
    session: &mut S,
) -> Result<BTreeMap<String, f64>, FieldError> {
    let process = locate_process_node(session, PROCESS_NODE_MARKER).await?;
    let children = session.browse_children(&process).await?;

    let mut values = BTreeMap::new();
    for child in children {
        match session.read_value(&child).await {
            Ok(value) => {
                values.insert(child.variable_name().to_string(), value);
            }
            Err(e) => {
                debug!(node = %child.node_id, error = %e, "Skipping unreadable variable");
            }
        }
    }
    Ok(values)
}

fn jittered_fallback() -> Readings {
    fallback_readings(&mut rand::thread_rng())
}

/// The fallback dataset with proportional jitter: each continuous value is
/// multiplied by `1 + (u - 0.5) * variance` with `u` uniform in `[0, 1)`.
/// The quality index uses a wider span. Categorical fields are copied as-is.
pub fn fallback_readings<R: Rng + ?Sized>(rng: &mut R) -> Readings {
    let mut readings = Readings::fallback_base();
    for (name, slot) in readings.continuous_fields_mut() {
        let variance = if name == QUALITY_INDEX_VARIABLE {
            FALLBACK_QUALITY_VARIANCE
        } else {
            FALLBACK_VARIANCE
        };
        if let Some(value) = slot.as_mut() {
            *value *= 1.0 + (rng.gen::<f64>() - 0.5) * variance;
        }
    }
    readings
}
