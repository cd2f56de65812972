//! poolgridd — the poolgrid worker daemon.
//!
//! Owns a local object store and keeps every stored worker reconciled:
//! machine classes deployed, machine groups scaled and rolled, the
//! cluster autoscaler paused while a rollout is in flight, and status
//! published back onto the worker.
//!
//! # Usage
//!
//! ```text
//! poolgridd apply --data-dir /var/lib/poolgrid --file shoot.json
//! poolgridd run --data-dir /var/lib/poolgrid --config poolgrid.toml
//! poolgridd status --data-dir /var/lib/poolgrid
//! ```
//!
//! The store is a single redb file, which allows one process at a time:
//! `apply`, `reconcile` and `status` must run while `run` is stopped.

mod manifest;
mod provider;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use poolgrid_actuator::{Actuator, Controller, cluster_state};
use poolgrid_core::PoolgridConfig;
use poolgrid_state::{ObjectStore, StateStore, Worker, WorkerStatus};

use crate::provider::StaticProvider;

#[derive(Parser)]
#[command(name = "poolgridd", about = "poolgrid worker daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker controller until interrupted.
    Run {
        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/poolgrid")]
        data_dir: PathBuf,

        /// TOML configuration file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Reconcile a single worker once and exit.
    Reconcile {
        #[arg(long, default_value = "/var/lib/poolgrid")]
        data_dir: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Namespace of the worker.
        #[arg(long)]
        namespace: String,

        /// Name of the worker.
        #[arg(long, default_value = "worker")]
        name: String,
    },
    /// Create or update objects from a JSON manifest.
    Apply {
        #[arg(long, default_value = "/var/lib/poolgrid")]
        data_dir: PathBuf,

        /// Manifest file: a JSON array of kind-tagged objects.
        #[arg(long)]
        file: PathBuf,
    },
    /// Print worker status as JSON.
    Status {
        #[arg(long, default_value = "/var/lib/poolgrid")]
        data_dir: PathBuf,

        /// Only show workers in this namespace.
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Print the effective configuration as TOML.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run { data_dir, config } => run(&data_dir, config.as_deref()).await,
        Command::Reconcile {
            data_dir,
            config,
            namespace,
            name,
        } => reconcile_once(&data_dir, config.as_deref(), &namespace, &name).await,
        Command::Apply { data_dir, file } => apply(&data_dir, &file),
        Command::Status {
            data_dir,
            namespace,
        } => status(&data_dir, namespace.as_deref()),
        Command::Config { config } => {
            print!("{}", load_config(config.as_deref())?.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,poolgridd=debug,poolgrid=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PoolgridConfig> {
    match path {
        Some(path) => PoolgridConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(PoolgridConfig::default()),
    }
}

fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    let db_path = data_dir.join("poolgrid.redb");
    let store = StateStore::open(&db_path)
        .with_context(|| format!("failed to open state store {}", db_path.display()))?;
    info!(path = ?db_path, "state store opened");
    Ok(store)
}

async fn run(data_dir: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    info!("poolgrid daemon starting");

    let config = load_config(config)?;
    let store = open_store(data_dir)?;
    let provider = StaticProvider::new(store.clone(), &config.provider.class_kind);
    info!(
        class_kind = %config.provider.class_kind,
        workers = config.controller.max_concurrent_reconciles,
        resync = ?config.controller.resync_interval,
        "controller configured"
    );
    let controller = Controller::new(Actuator::new(store, provider, config));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(controller.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to install CTRL+C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    handle.await.context("controller task panicked")?;
    info!("poolgrid daemon stopped");
    Ok(())
}

async fn reconcile_once(
    data_dir: &Path,
    config: Option<&Path>,
    namespace: &str,
    name: &str,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let store = open_store(data_dir)?;
    let worker: Worker = store
        .get(namespace, name)?
        .with_context(|| format!("worker {namespace}/{name} not found"))?;
    let cluster = cluster_state(&store, namespace)?;

    let provider = StaticProvider::new(store.clone(), &config.provider.class_kind);
    let actuator = Actuator::new(store, provider, config);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let report = actuator.reconcile(&worker, &cluster, &mut shutdown_rx).await?;
    for pool in &report.pools {
        println!(
            "{:<24} {:<10} replicas={} rule={}",
            pool.name,
            format!("{:?}", pool.outcome).to_lowercase(),
            pool.decision.replicas,
            pool.decision.rule
        );
    }
    if report.autoscaler_removed {
        println!("autoscaler removed");
    }
    if !report.garbage.is_empty() {
        println!(
            "collected {} machine groups, {} machine classes, {} secrets",
            report.garbage.machine_groups.len(),
            report.garbage.machine_classes.len(),
            report.garbage.secrets.len()
        );
    }
    Ok(())
}

fn apply(data_dir: &Path, file: &Path) -> anyhow::Result<()> {
    let objects = manifest::load(file)?;
    let store = open_store(data_dir)?;
    for (kind, key, outcome) in manifest::apply_all(&store, objects)? {
        println!("{kind} {key} {outcome}");
    }
    Ok(())
}

#[derive(Serialize)]
struct WorkerSummary<'a> {
    namespace: &'a str,
    name: &'a str,
    generation: i64,
    status: &'a WorkerStatus,
}

fn status(data_dir: &Path, namespace: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let workers: Vec<Worker> = match namespace {
        Some(ns) => store.list(ns)?,
        None => store.list_all()?,
    };
    let summaries: Vec<WorkerSummary<'_>> = workers
        .iter()
        .map(|w| WorkerSummary {
            namespace: &w.meta.namespace,
            name: &w.meta.name,
            generation: w.meta.generation,
            status: &w.status,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}
