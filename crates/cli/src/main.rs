use crate::{commands::Commands, config::SyncConfig, env::EnvManager, error::CliError};
use clap::Parser;
use connectors::{catalog::http::HttpCatalog, store::fs::FsObjectStore};
use std::{process, sync::Arc};
use sync_core::{
    events::EventBus,
    gate::RateGate,
    metrics::Metrics,
    progress::ProgressReport,
    queue::{QueueConfig, SledJobQueue},
    retry::RetryPolicy,
    state::{CheckpointStore, store::DurableStateStore},
};
use sync_processing::output::OutputFiles;
use sync_runtime::{
    error::SyncError,
    supervisor::{Supervisor, SupervisorConfig, SupervisorParams},
};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};

mod commands;
mod config;
mod env;
mod error;
mod shutdown;

#[derive(Parser)]
#[command(name = "conveyor", version, about = "Catalog feed synchronization pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let exit_code = match run_cli().await {
        Ok(()) => 0,
        Err(CliError::ShutdownRequested) => {
            info!("Pipeline shut down gracefully, progress saved");
            shutdown::INTERRUPT_EXIT_CODE
        }
        Err(e) => {
            tracing::error!("Application error: {}", e);
            1
        }
    };

    process::exit(exit_code);
}

async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    shutdown::listen_for_shutdown(cancel.clone());

    match cli.command {
        Commands::Run { env_file } => {
            let env = load_env(env_file.as_deref())?;
            let config = SyncConfig::from_env(&env)?;
            run_sync(config, cancel).await
        }
        Commands::Progress { env_file, json } => {
            let env = load_env(env_file.as_deref())?;
            show_progress(&env, json).await
        }
    }
}

fn load_env(env_file: Option<&str>) -> Result<EnvManager, CliError> {
    let mut env = EnvManager::new();
    if let Some(path) = env_file {
        info!("Loading environment variables from: {}", path);
        env.load_from_file(path)?;
    }
    Ok(env)
}

async fn run_sync(config: SyncConfig, cancel: CancellationToken) -> Result<(), CliError> {
    let bus = EventBus::new();
    let state = Arc::new(DurableStateStore::open(&config.state_dir)?);
    let queue = SledJobQueue::open(
        config.state_dir.join("queue"),
        bus.clone(),
        QueueConfig::default(),
    )?;
    let gate = Arc::new(RateGate::new(
        config.rate_gate(),
        RetryPolicy::for_remote_api(),
    ));
    let catalog = Arc::new(HttpCatalog::new(config.catalog(), gate.clone())?);
    let output = Arc::new(OutputFiles::create(&config.output_dir)?);

    let mut supervisor_config = SupervisorConfig::new(&config.bucket, config.mode);
    supervisor_config.batch_size = config.batch_size;
    supervisor_config.concurrency = config.concurrency;

    let supervisor = Supervisor::new(SupervisorParams {
        store: Arc::new(FsObjectStore::new(&config.store_root)),
        catalog,
        queue,
        state,
        gate,
        bus,
        metrics: Metrics::new(),
        output,
        config: supervisor_config,
    });

    match supervisor.run(cancel).await {
        Ok(report) => {
            let overall = report.overall();
            info!(
                updated = overall.updated,
                skipped = overall.skipped,
                failed = overall.failed,
                "Catalog sync completed"
            );
            Ok(())
        }
        Err(SyncError::ShutdownRequested) => Err(CliError::ShutdownRequested),
        Err(e) => Err(CliError::Sync(e)),
    }
}

async fn show_progress(env: &EnvManager, as_json: bool) -> Result<(), CliError> {
    let state_dir = SyncConfig::state_dir_from(env);
    let store = DurableStateStore::open(&state_dir)?;
    let report = ProgressReport::new(store.read_all().await?);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}
