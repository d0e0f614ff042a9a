//! MOTD Engine - community message-of-the-day selection.
//!
//! This is the main entry point, which:
//! - Loads configuration from TOML
//! - Opens the candidate store (SQLite + attachment directory)
//! - Serves platform events and admin commands as JSON lines on stdin,
//!   writing platform actions as JSON lines on stdout
//! - Copies warnings and errors to the operator log channel, if configured
//! - Runs the daily selection schedule
//! - Handles graceful shutdown

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use motd_engine::admin::AdminConsole;
use motd_engine::candidate::CandidateId;
use motd_engine::config::MotdConfig;
use motd_engine::cycle::{CycleManager, CycleTrigger};
use motd_engine::engine::{MotdEngine, MotdState, SharedState};
use motd_engine::events::EventFilter;
use motd_engine::favorites::FavoriteTracker;
use motd_engine::oplog::OperatorLog;
use motd_engine::schedule::run_schedule;
use motd_engine::scoring::ScoringEngine;
use motd_engine::selector::WinnerSelector;
use motd_engine::store::SqliteCandidateStore;
use motd_engine::wire::{self, JsonLinesSink, Outbound};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const QUEUE_CAPACITY: usize = 256;

/// MOTD Engine - community message-of-the-day selection
#[derive(Parser, Debug)]
#[command(name = "motd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", env = "MOTD_CONFIG")]
    config: Option<PathBuf>,

    /// Run in verbose mode (debug logging)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process events from stdin and run the daily schedule
    Serve,

    /// Run one selection cycle now; the publish line goes to stdout
    RunCycle,

    /// Print the current candidates as JSON lines
    List,

    /// Delete one candidate
    Delete {
        /// Candidate (source message) id
        id: CandidateId,
    },
}

/// Resolve the configuration file from the given path or default locations.
fn config_path(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| {
        let local = PathBuf::from("motd.toml");
        if local.exists() {
            return local;
        }

        if let Some(dirs) = directories::ProjectDirs::from("org", "motd", "motd") {
            let xdg_config = dirs.config_dir().join("motd.toml");
            if xdg_config.exists() {
                return xdg_config;
            }
        }

        local
    })
}

/// Install the stderr logger, plus the operator log channel when configured.
fn init_logging(verbose: bool, operator_log: Option<OperatorLog>) {
    // Logs go to stderr; stdout carries the wire protocol.
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(operator_log)
        .init();
}

/// Open the store and build the shared state.
fn open_state(config: &MotdConfig) -> Result<SharedState> {
    info!(
        "Opening candidate store at {} (attachments in {}, outbox {})",
        config.store.sqlite_path.display(),
        config.store.attachment_dir.display(),
        config.store.outbox_dir.display()
    );
    let store = SqliteCandidateStore::new(&config.store.sqlite_path, &config.store.attachment_dir)
        .context("Failed to open candidate store")?;

    Ok(MotdState::new(
        Box::new(store),
        ScoringEngine::new(config.motd.reactions.clone()),
        FavoriteTracker::new(config.favorites),
    )
    .shared())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = config_path(args.config);
    let config = MotdConfig::load(&config_path).with_context(|| {
        format!("Failed to load configuration from {}", config_path.display())
    })?;

    // Platform actions and operator log lines share one outbound queue.
    let (sink, outbound_rx) = JsonLinesSink::channel(QUEUE_CAPACITY);
    init_logging(
        args.verbose,
        config
            .motd
            .logs_channel
            .map(|channel| OperatorLog::new(&sink, channel)),
    );
    info!("Loaded configuration from {}", config_path.display());

    let state = open_state(&config)?;

    match args.command {
        Command::Serve => {
            serve(config, state, sink, outbound_rx).await?;
            // A pending blocking read on stdin would keep the runtime alive.
            std::process::exit(0);
        }
        Command::RunCycle => run_cycle_once(&config, state, sink, outbound_rx).await,
        Command::List => {
            // stdout is the listing here; operator log lines stay on stderr.
            drop((sink, outbound_rx));
            list(&state).await
        }
        Command::Delete { id } => {
            drop((sink, outbound_rx));
            state
                .lock()
                .await
                .delete_candidate(id)
                .with_context(|| format!("Failed to delete candidate {id}"))?;
            info!("Deleted candidate {id}");
            Ok(())
        }
    }
}

async fn serve(
    config: MotdConfig,
    state: SharedState,
    sink: JsonLinesSink,
    outbound_rx: mpsc::Receiver<Outbound>,
) -> Result<()> {
    let writer = tokio::spawn(wire::write_lines(outbound_rx, tokio::io::stdout()));

    let engine = MotdEngine::new(
        state.clone(),
        Arc::new(sink.clone()),
        EventFilter::from_settings(&config.motd),
        &config.motd.favorite_emoji,
    );
    let cycles = Arc::new(CycleManager::new(
        state.clone(),
        WinnerSelector::from_entropy(),
        Arc::new(sink.clone()),
        config.motd.target_channel,
        config.store.outbox_dir.clone(),
    ));
    let console = Arc::new(AdminConsole::new(
        state,
        cycles.clone(),
        config.admin.confirm_ttl(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_CAPACITY);

    let server = tokio::spawn(wire::serve(inbound_rx, engine, console, sink));

    let schedule = if config.motd.enabled {
        let s = config.motd.schedule;
        info!(
            "Daily cycle at {:02}:{:02}:{:02} UTC",
            s.hour, s.minute, s.second
        );
        Some(tokio::spawn(run_schedule(cycles, s, shutdown_rx.clone())))
    } else {
        warn!("MOTD disabled; events are ignored and no cycle is scheduled");
        drop(cycles);
        None
    };

    let reader = tokio::spawn(wire::read_lines(
        tokio::io::BufReader::new(tokio::io::stdin()),
        inbound_tx,
        shutdown_rx,
    ));

    info!("MOTD engine ready");

    // Wait for input to close, Ctrl+C or SIGTERM
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT (Ctrl+C)"),
            result = wait_reader(reader) => result,
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
            }
            result = wait_reader(reader) => result,
        }
    }

    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    // The reader drops the inbound sender on shutdown, which ends the server.
    if let Err(e) = server.await {
        error!("Event server task failed: {e}");
    }
    if let Some(schedule) = schedule {
        if let Err(e) = schedule.await {
            error!("Schedule task failed: {e}");
        }
    }

    // Every sink clone is gone now, so the writer drains and exits.
    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Output writer failed: {e}"),
        Err(e) => error!("Output writer task failed: {e}"),
    }

    info!("MOTD engine shutdown complete.");
    Ok(())
}

async fn wait_reader(reader: tokio::task::JoinHandle<Result<(), wire::WireError>>) {
    match reader.await {
        Ok(Ok(())) => info!("Input finished"),
        Ok(Err(e)) => error!("Input reader failed: {e}"),
        Err(e) => error!("Input reader task failed: {e}"),
    }
}

async fn run_cycle_once(
    config: &MotdConfig,
    state: SharedState,
    sink: JsonLinesSink,
    outbound_rx: mpsc::Receiver<Outbound>,
) -> Result<()> {
    let writer = tokio::spawn(wire::write_lines(outbound_rx, tokio::io::stdout()));

    let cycles = CycleManager::new(
        state,
        WinnerSelector::from_entropy(),
        Arc::new(sink),
        config.motd.target_channel,
        config.store.outbox_dir.clone(),
    );
    let report = cycles
        .run_cycle(CycleTrigger::Manual)
        .await
        .context("Selection cycle failed")?;
    drop(cycles);

    writer
        .await
        .context("Output writer task failed")?
        .context("Failed to write output")?;
    info!("Cycle report: {}", serde_json::to_string(&report)?);
    Ok(())
}

async fn list(state: &SharedState) -> Result<()> {
    let state = state.lock().await;
    let mut candidates = state.store.list_all().context("Failed to list candidates")?;
    candidates.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));
    for candidate in &candidates {
        println!("{}", serde_json::to_string(candidate)?);
    }
    info!("{} candidate(s)", candidates.len());
    Ok(())
}
