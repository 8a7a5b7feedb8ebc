//! Advisor Configuration Module
//!
//! ## Loading Order
//!
//! 1. Built-in defaults (`defaults.rs`)
//! 2. `ADVISOR_CONFIG` environment variable (path to TOML file), else
//!    `advisor.toml` in the current working directory
//! 3. Connection environment variables (`OPC_HOST`, `DB_*`, `ADVISOR_HTTP_ADDR`)
//! 4. CLI overrides applied by the binary
//!
//! The loaded [`AdvisorConfig`] is passed explicitly to each component.

mod advisor_config;
pub mod defaults;

pub use advisor_config::*;
