//! Advisor Configuration - connection settings and tunable heuristic values
//!
//! Every section implements `Default` with the values from
//! [`defaults`](super::defaults), so a deployment with no config file and no
//! environment behaves exactly like the built-in constants.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one advisor deployment.
///
/// Load with `AdvisorConfig::load()` which layers:
/// 1. Built-in defaults
/// 2. `$ADVISOR_CONFIG` TOML file, else `./advisor.toml`
/// 3. Environment variables (`OPC_HOST`, `DB_HOST`, `DB_NAME`, `DB_USER`,
///    `DB_PASSWORD`, `ADVISOR_HTTP_ADDR`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvisorConfig {
    #[serde(default)]
    pub field: FieldConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub heuristic: HeuristicConfig,

    #[serde(default)]
    pub cycle: CycleConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl AdvisorConfig {
    /// Load configuration using the standard search order, then apply
    /// environment overrides. Never fails: a broken file is logged and skipped.
    pub fn load() -> Self {
        let mut config = Self::load_file_layer();
        config.apply_env();
        config
    }

    fn load_file_layer() -> Self {
        if let Ok(path) = std::env::var("ADVISOR_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded advisor config from ADVISOR_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from ADVISOR_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "ADVISOR_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("advisor.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded advisor config from ./advisor.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./advisor.toml, using defaults");
                }
            }
        }

        info!("No advisor.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay connection settings from the environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay settings from an arbitrary key lookup (testable without
    /// touching the process environment).
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OPC_HOST") {
            self.field.host = v;
        }
        if let Some(v) = lookup("DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = lookup("DB_NAME") {
            self.database.name = v;
        }
        if let Some(v) = lookup("DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = lookup("DB_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = lookup("ADVISOR_HTTP_ADDR") {
            self.server.http_addr = v;
        }
    }

    /// Reject inconsistent settings. Collects every problem before failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let h = &self.heuristic;

        if !(h.target_bit_tq.is_finite() && h.target_bit_tq > 0.0) {
            errors.push(format!(
                "heuristic.target_bit_tq must be positive (got {})",
                h.target_bit_tq
            ));
        }
        if h.ceiling_secs < h.cooldown_secs {
            errors.push(format!(
                "heuristic.ceiling_secs ({}) must be >= heuristic.cooldown_secs ({})",
                h.ceiling_secs, h.cooldown_secs
            ));
        }
        if !(0.0..=1.0).contains(&h.base_confidence) {
            errors.push(format!(
                "heuristic.base_confidence must be within [0, 1] (got {})",
                h.base_confidence
            ));
        }
        if let Some(min) = self.cycle.auto_apply_min_confidence {
            if !(0.0..=1.0).contains(&min) {
                errors.push(format!(
                    "cycle.auto_apply_min_confidence must be within [0, 1] (got {min})"
                ));
            }
        }
        if self.server.http_addr.trim().is_empty() {
            errors.push("server.http_addr must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

// ============================================================================
// Field Protocol
// ============================================================================

/// Field-protocol endpoint. Port and path are fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(default = "default_field_host")]
    pub host: String,
}

fn default_field_host() -> String {
    "localhost".to_string()
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            host: default_field_host(),
        }
    }
}

impl FieldConfig {
    /// `opc.tcp://<host>:4840/refinery`
    pub fn endpoint_url(&self) -> String {
        format!(
            "opc.tcp://{}:{}{}",
            self.host,
            defaults::FIELD_PORT,
            defaults::FIELD_PATH
        )
    }

    pub const fn session_timeout(&self) -> Duration {
        Duration::from_millis(defaults::FIELD_SESSION_TIMEOUT_MS)
    }
}

// ============================================================================
// Relational Store
// ============================================================================

/// Relational store connection. Port is fixed.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default = "default_db_password")]
    pub password: String,
}

fn default_db_host() -> String {
    "localhost".to_string()
}
fn default_db_name() -> String {
    "refinery_db".to_string()
}
fn default_db_user() -> String {
    "postgres".to_string()
}
fn default_db_password() -> String {
    "password".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            name: default_db_name(),
            user: default_db_user(),
            password: default_db_password(),
        }
    }
}

impl DatabaseConfig {
    pub const fn port(&self) -> u16 {
        defaults::DB_PORT
    }
}

// Keep the password out of logs.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

// ============================================================================
// Decision Heuristic
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicConfig {
    #[serde(default = "default_target")]
    pub target_bit_tq: f64,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_ceiling")]
    pub ceiling_secs: u64,
    #[serde(default = "default_base_confidence")]
    pub base_confidence: f64,
}

fn default_target() -> f64 {
    defaults::QUALITY_TARGET
}

fn default_cooldown() -> u64 {
    defaults::DECISION_COOLDOWN_SECS
}

fn default_ceiling() -> u64 {
    defaults::DECISION_CEILING_SECS
}

fn default_base_confidence() -> f64 {
    defaults::BASE_CONFIDENCE
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            target_bit_tq: default_target(),
            cooldown_secs: default_cooldown(),
            ceiling_secs: default_ceiling(),
            base_confidence: default_base_confidence(),
        }
    }
}

// ============================================================================
// Decision Cycle
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    #[serde(default = "default_pending_window")]
    pub pending_window_secs: u64,
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: u64,
    /// When set, decisions at or above this confidence are applied as soon as
    /// they are stored.
    #[serde(default)]
    pub auto_apply_min_confidence: Option<f64>,
}

fn default_pending_window() -> u64 {
    defaults::PENDING_WINDOW_SECS
}

fn default_error_backoff() -> u64 {
    defaults::TICK_ERROR_BACKOFF_SECS
}

fn default_startup_delay() -> u64 {
    defaults::STARTUP_DELAY_SECS
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            pending_window_secs: default_pending_window(),
            error_backoff_secs: default_error_backoff(),
            startup_delay_secs: default_startup_delay(),
            auto_apply_min_confidence: None,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
}

fn default_http_addr() -> String {
    defaults::HTTP_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}
