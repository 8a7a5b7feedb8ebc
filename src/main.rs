//! Refinery Advisor - BIT-TQ decision lifecycle engine
//!
//! Polls the refinery field endpoint, stores every process sample, proposes
//! parameter changes when the quality index drifts, and serves the decision
//! operations over REST.
//!
//! # Usage
//!
//! ```bash
//! # PostgreSQL store, settings from advisor.toml / environment
//! cargo run --release
//!
//! # Everything in process: simulated refinery, no database
//! cargo run --release -- --field simulated --store memory
//!
//! # Apply confident decisions as soon as they are stored
//! cargo run --release -- --auto-apply 0.8
//! ```
//!
//! # Environment Variables
//!
//! - `OPC_HOST`: field endpoint host (default: localhost)
//! - `ADVISOR_FIELD`: `opcua` or `simulated` (default: opcua)
//! - `DB_HOST`, `DB_NAME`, `DB_USER`, `DB_PASSWORD`: relational store
//! - `ADVISOR_CONFIG`: path to a TOML config file (default: ./advisor.toml)
//! - `ADVISOR_HTTP_ADDR`: REST bind address (default: 0.0.0.0:5000)
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use axum::Router;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use refinery_advisor::acquisition::{FieldDataReader, FieldEndpoint, SimulatedRefinery};
use refinery_advisor::api::create_app;
use refinery_advisor::applier::ParameterApplier;
use refinery_advisor::config::AdvisorConfig;
use refinery_advisor::optimizer::DecisionHeuristic;
use refinery_advisor::pipeline::DecisionCycle;
use refinery_advisor::service::DecisionService;
use refinery_advisor::storage::{DecisionStore, InMemoryStore, PgDecisionStore};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Postgres,
    Memory,
}

/// Where readings come from and parameter writes go.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FieldKind {
    /// OPC UA server at the configured host
    Opcua,
    /// In-process simulated refinery; nothing reaches the plant
    Simulated,
}

#[derive(Parser, Debug)]
#[command(name = "refinery-advisor")]
#[command(about = "BIT-TQ decision lifecycle engine")]
#[command(version)]
struct CliArgs {
    /// Decision store backend
    #[arg(long, value_enum, env = "ADVISOR_STORE", default_value = "postgres")]
    store: StoreKind,

    /// Field endpoint backend
    #[arg(long, value_enum, env = "ADVISOR_FIELD", default_value = "opcua")]
    field: FieldKind,

    /// Path to a TOML config file (overrides ADVISOR_CONFIG / ./advisor.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the REST bind address (default: "0.0.0.0:5000")
    #[arg(short, long)]
    addr: Option<String>,

    /// Seconds to wait for the field endpoint before the first tick
    #[arg(long)]
    startup_delay: Option<u64>,

    /// Apply decisions at or above this confidence as soon as they are stored
    #[arg(long, value_name = "CONFIDENCE")]
    auto_apply: Option<f64>,

    /// Emit logs as JSON lines
    #[arg(long, env = "ADVISOR_LOG_JSON")]
    log_json: bool,
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    DecisionCycle,
    FieldSimulator,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::DecisionCycle => write!(f, "DecisionCycle"),
            TaskName::FieldSimulator => write!(f, "FieldSimulator"),
        }
    }
}

// ============================================================================
// Startup
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &CliArgs) -> Result<AdvisorConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = AdvisorConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env();
            config
        }
        None => AdvisorConfig::load(),
    };

    if let Some(addr) = &args.addr {
        config.server.http_addr = addr.clone();
    }
    if let Some(delay) = args.startup_delay {
        config.cycle.startup_delay_secs = delay;
    }
    if args.auto_apply.is_some() {
        config.cycle.auto_apply_min_confidence = args.auto_apply;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Build the field endpoint. Only the simulator ships with this binary, so
/// asking for the OPC UA server fails instead of silently simulating it.
fn field_endpoint(kind: FieldKind, config: &AdvisorConfig) -> Result<SimulatedRefinery> {
    match kind {
        FieldKind::Opcua => anyhow::bail!(
            "No OPC UA client is built into this binary, {} cannot be reached. \
             Run with --field simulated to drive the in-process refinery instead",
            config.field.endpoint_url()
        ),
        FieldKind::Simulated => {
            let sim = SimulatedRefinery::with_host(&config.field.host);
            warn!(
                endpoint = sim.endpoint_url(),
                "Field is SIMULATED: readings and parameter writes stay in process, nothing reaches the plant"
            );
            Ok(sim)
        }
    }
}

/// Open the configured store and make sure its schema exists.
async fn open_store(kind: StoreKind, config: &AdvisorConfig) -> Result<Arc<dyn DecisionStore>> {
    let store: Arc<dyn DecisionStore> = match kind {
        StoreKind::Postgres => {
            info!(
                host = %config.database.host,
                database = %config.database.name,
                "Connecting to PostgreSQL"
            );
            Arc::new(PgDecisionStore::new(&config.database))
        }
        StoreKind::Memory => Arc::new(InMemoryStore::new()),
    };

    store
        .ping()
        .await
        .with_context(|| format!("{} store is not reachable", store.backend_name()))?;
    store
        .ensure_schema()
        .await
        .context("Failed to create store schema")?;
    Ok(store)
}

// ============================================================================
// Tasks
// ============================================================================

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Spawn the decision cycle task into the JoinSet.
fn spawn_decision_cycle<E: FieldEndpoint>(
    task_set: &mut JoinSet<Result<TaskName>>,
    cycle: DecisionCycle<E, dyn DecisionStore>,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[DecisionCycle] Task starting");
        cycle.run(cancel_token).await;
        Ok(TaskName::DecisionCycle)
    });
}

/// Spawn the simulated field drift into the JoinSet.
fn spawn_field_simulator(
    task_set: &mut JoinSet<Result<TaskName>>,
    sim: &SimulatedRefinery,
    cancel_token: CancellationToken,
) {
    let drift = sim.spawn_drift(cancel_token);
    task_set.spawn(async move {
        drift.await.context("Field simulator task failed")?;
        Ok(TaskName::FieldSimulator)
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let the remaining tasks observe cancellation and finish.
    while let Some(result) = task_set.join_next().await {
        if let Ok(Ok(task_name)) = result {
            info!("Supervisor: task {} stopped", task_name);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let config = load_config(&args)?;

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Refinery Advisor - BIT-TQ decision lifecycle");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        field = ?args.field,
        target_bit_tq = config.heuristic.target_bit_tq,
        auto_apply = ?config.cycle.auto_apply_min_confidence,
        "Configuration loaded"
    );

    let field = field_endpoint(args.field, &config)?;
    let store = open_store(args.store, &config).await?;
    info!(backend = store.backend_name(), "Store ready");

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    let endpoint = Arc::new(field.clone());
    let timeout = config.field.session_timeout();

    let reader = FieldDataReader::new(Arc::clone(&endpoint), timeout);
    let applier = Arc::new(ParameterApplier::new(Arc::clone(&endpoint), timeout));
    let heuristic = DecisionHeuristic::new(&config.heuristic);

    let cycle = DecisionCycle::new(
        reader,
        Arc::clone(&applier),
        Arc::clone(&store),
        heuristic.clone(),
        config.cycle.clone(),
    );
    let service = Arc::new(DecisionService::new(Arc::clone(&store), applier, heuristic));
    let app = create_app(service);

    let listener = tokio::net::TcpListener::bind(&config.server.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.http_addr))?;
    info!(addr = %config.server.http_addr, "REST API listening");

    let mut task_set = JoinSet::new();
    spawn_field_simulator(&mut task_set, &field, cancel_token.clone());
    spawn_decision_cycle(&mut task_set, cycle, cancel_token.clone());
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());

    run_supervisor(&mut task_set, cancel_token).await?;

    info!("Refinery Advisor shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcua_field_refuses_to_start() {
        let config = AdvisorConfig::default();
        let err = field_endpoint(FieldKind::Opcua, &config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("opc.tcp://localhost:4840/refinery"), "{message}");
        assert!(message.contains("--field simulated"), "{message}");
    }

    #[test]
    fn test_simulated_field_is_labelled() {
        let mut config = AdvisorConfig::default();
        config.field.host = "plant-gw".to_string();
        let sim = field_endpoint(FieldKind::Simulated, &config).unwrap();
        assert!(sim.is_simulated());
        assert_eq!(sim.endpoint_url(), "sim+opc.tcp://plant-gw:4840/refinery");
    }

    #[test]
    fn test_field_defaults_to_opcua() {
        let args = CliArgs::parse_from(["refinery-advisor"]);
        assert_eq!(args.field, FieldKind::Opcua);
        let args = CliArgs::parse_from(["refinery-advisor", "--field", "simulated"]);
        assert_eq!(args.field, FieldKind::Simulated);
    }
}
