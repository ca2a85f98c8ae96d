//! Command-line entry point.
//!
//! Runs a search or deep search through the configured agent and prints the
//! JSON response on stdout. Diagnostics go to stderr.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use searcher::error::{ToolFailure, codes};
use searcher::exit_codes;
use searcher::io::agent::CliAgent;
use searcher::io::artifact::sweep_stale_artifacts;
use searcher::io::config::{DEFAULT_CONFIG_PATH, SearcherConfig, load_config, write_config};
use searcher::logging;
use searcher::search::{Searcher, response_json};

#[derive(Parser)]
#[command(
    name = "searcher",
    version,
    about = "Web research through a CLI agent, returned as structured JSON"
)]
struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log agent stderr and progress.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Research a query in a single round.
    Search {
        query: String,
        /// Model for this run, overriding the config.
        #[arg(long)]
        model: Option<String>,
    },
    /// Research a topic over several verification rounds.
    Deep {
        topic: String,
        /// Round budget (clamped to 1..=10).
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Model for this run, overriding the config.
        #[arg(long)]
        model: Option<String>,
    },
    /// Remove correction artifacts left by an earlier run.
    Sweep,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Sweep => cmd_sweep(&cli.config),
        Command::Search { query, model } => {
            let cfg = load_with_overrides(&cli.config, model, cli.verbose)?;
            block_on(async move {
                let searcher = prepare(&cfg);
                emit(&searcher.search(&query).await)
            })
        }
        Command::Deep {
            topic,
            max_iterations,
            model,
        } => {
            let cfg = load_with_overrides(&cli.config, model, cli.verbose)?;
            block_on(async move {
                let searcher = prepare(&cfg);
                emit(&searcher.deep_search(&topic, max_iterations).await)
            })
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &SearcherConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_sweep(config_path: &Path) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let removed = sweep_stale_artifacts(&cfg.work_dir)?;
    println!("{removed}");
    Ok(exit_codes::OK)
}

fn load_with_overrides(
    path: &Path,
    model: Option<String>,
    verbose: bool,
) -> Result<SearcherConfig> {
    let mut cfg = load_config(path)?;
    if model.is_some() {
        cfg.agent.model = model;
    }
    cfg.agent.verbose |= verbose;
    Ok(cfg)
}

fn block_on<F: Future<Output = Result<i32>>>(future: F) -> Result<i32> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?
        .block_on(future)
}

/// Sweep stale artifacts and wire shutdown signals to a fresh agent.
fn prepare(cfg: &SearcherConfig) -> Searcher<CliAgent> {
    if let Err(err) = sweep_stale_artifacts(&cfg.work_dir) {
        warn!(err = %format!("{err:#}"), "startup sweep failed");
    }
    let agent = CliAgent::new(cfg.agent.clone(), cfg.work_dir.clone());
    spawn_shutdown_listener(agent.shutdown_token());
    Searcher::new(agent, cfg)
}

fn emit<T: Serialize>(result: &Result<T, ToolFailure>) -> Result<i32> {
    let value = response_json(result).context("serialize response")?;
    let text = serde_json::to_string_pretty(&value).context("serialize response")?;
    println!("{text}");
    Ok(match result {
        Ok(_) => exit_codes::OK,
        Err(failure) if failure.code == codes::INVALID_REQUEST => exit_codes::INVALID,
        Err(_) => exit_codes::FAILED,
    })
}

fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        warn!("shutdown requested, stopping agent");
        token.cancel();
    });
}

/// Wait for Ctrl-C or SIGTERM.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(err = %err, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(err = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["searcher", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn parse_deep_with_overrides() {
        let cli = Cli::parse_from([
            "searcher",
            "-v",
            "--config",
            "alt.toml",
            "deep",
            "post-quantum tls",
            "--max-iterations",
            "3",
            "--model",
            "opus",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
        let Command::Deep {
            topic,
            max_iterations,
            model,
        } = cli.command
        else {
            panic!("expected deep command");
        };
        assert_eq!(topic, "post-quantum tls");
        assert_eq!(max_iterations, Some(3));
        assert_eq!(model.as_deref(), Some("opus"));
    }

    #[test]
    fn overrides_apply_on_top_of_file() {
        let cfg = load_with_overrides(
            Path::new("target/no-such-dir/config.toml"),
            Some("haiku".to_string()),
            true,
        )
        .expect("config");
        assert_eq!(cfg.agent.model.as_deref(), Some("haiku"));
        assert!(cfg.agent.verbose);
    }
}
