//! Field data acquisition
//!
//! - `field`: session abstraction over the plant field protocol
//! - `reader`: full-variable reads with static-dataset fallback
//! - `simulated`: in-process refinery endpoint for demos and tests

pub mod field;
pub mod reader;
pub mod simulated;

pub use field::{FieldEndpoint, FieldError, FieldSession, NodeRef};
pub use reader::{fallback_readings, Acquisition, FallbackReason, FieldDataReader};
pub use simulated::{SimulatedRefinery, SimulatedSession};
