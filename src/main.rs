use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use jfr_metrics::{agent, config};

/// Flight-recorder event stream to Prometheus metrics agent.
#[derive(Parser)]
#[command(name = "jfr-metrics", about)]
struct Cli {
    /// Path to the YAML configuration file. Defaults apply without one.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    /// Overrides `log_level` from the configuration file.
    #[arg(long)]
    log_level: Option<String>,

    /// JSON-lines event file to read, or "-" for stdin.
    /// Overrides `source.path` from the configuration file.
    #[arg(short, long)]
    input: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Some(Command::Version) = &cli.command {
        println!("jfr-metrics {}", version::full());
        return Ok(());
    }

    let mut cfg = match &cli.config {
        Some(path) => config::Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => config::Config::default(),
    };

    if let Some(input) = cli.input {
        cfg.source.path = input;
    }
    if let Some(level) = cli.log_level {
        cfg.log_level = level;
    }
    cfg.validate()?;

    // Initialize tracing. Logs go to stderr; stdin may carry events.
    let filter = EnvFilter::try_new(&cfg.log_level)
        .with_context(|| format!("invalid log level: {}", cfg.log_level))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting jfr-metrics",
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg).await })
}

async fn run(cfg: config::Config) -> Result<()> {
    // Set up signal handling.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    let exit_on_eof = cfg.source.exit_on_eof;

    // Start the agent.
    let mut agent = agent::Agent::new(cfg)?;
    agent.start().await?;

    let source_done = agent.source_done();

    // Wait for a shutdown signal, or the end of the source if requested.
    tokio::select! {
        _ = shutdown_rx => {}
        _ = source_done.cancelled(), if exit_on_eof => {
            tracing::info!("event source finished, shutting down");
        }
    }

    // Graceful shutdown.
    agent.stop().await?;

    tracing::info!("jfr-metrics stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {
                        tracing::info!("received SIGINT, shutting down");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("received SIGTERM, shutting down");
                    }
                }
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
            }
        }
    }

    if let Err(e) = ctrl_c.await {
        tracing::error!(error = %e, "failed to listen for SIGINT");
        std::future::pending::<()>().await;
    }
    tracing::info!("received SIGINT, shutting down");
}
