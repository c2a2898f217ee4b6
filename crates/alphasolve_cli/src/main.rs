//! Alpha Solve command-line client.
//!
//! # Responsibility
//! - Verify `alphasolve_core` linkage (`ping`).
//! - Run propagation over a project file with the builtin executor (`propagate`).
//! - Join a sync session as a headless peer (`connect`).

use alphasolve_core::sync::transport::{outbound_channel, run_transport};
use alphasolve_core::{
    builtin_registry, init_logging, propagate_all, propagate_from, BuiltinExecutor, LogConfig,
    LogTarget, Project, SessionConfig, SessionService,
};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use uuid::Uuid;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "alphasolve")]
#[command(about = "Alpha Solve context propagation and sync client", long_about = None)]
#[command(version)]
struct Cli {
    /// trace|debug|info|warn|error
    #[arg(long, global = true, env = "ALPHASOLVE_LOG_LEVEL")]
    log_level: Option<String>,
    /// Absolute directory for rotating log files; stderr when omitted
    #[arg(long, global = true, env = "ALPHASOLVE_LOG_DIR")]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print core health and version
    Ping,
    /// Propagate contexts through a project JSON file and print the result
    Propagate {
        project: PathBuf,
        /// Cell to start from; the first top-level cell when omitted
        #[arg(long)]
        from: Option<Uuid>,
    },
    /// Join a sync session and apply inbound packets until the server closes
    Connect {
        #[arg(long, env = "ALPHASOLVE_SERVER_URL", default_value = alphasolve_core::config::DEFAULT_SERVER_URL)]
        server: String,
        #[arg(long, env = "ALPHASOLVE_DISPLAY_NAME")]
        name: String,
        #[arg(long, env = "ALPHASOLVE_PROJECT_ID")]
        project_id: Uuid,
        #[arg(long, env = "ALPHASOLVE_USER_ID")]
        user_id: Option<String>,
        /// Project JSON to share with peers on join
        #[arg(long)]
        project: Option<PathBuf>,
        #[arg(long, default_value = "5")]
        reconnect_attempts: u32,
        #[arg(long, default_value = "1000")]
        reconnect_delay_ms: u64,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let log = log_config(cli.log_level, cli.log_dir);

    let result = match cli.command {
        Commands::Ping => cmd_ping(),
        Commands::Propagate { project, from } => cmd_propagate(&log, &project, from).await,
        Commands::Connect {
            server,
            name,
            project_id,
            user_id,
            project,
            reconnect_attempts,
            reconnect_delay_ms,
        } => {
            let mut config = SessionConfig::new(name, project_id);
            config.server_url = server;
            if let Some(user_id) = user_id {
                config.user_id = user_id;
            }
            config.reconnect.max_attempts = reconnect_attempts;
            config.reconnect.base_delay = Duration::from_millis(reconnect_delay_ms);
            config.log = log;
            cmd_connect(config, project.as_deref()).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_exit module=cli status=error error={}", err);
            eprintln!("alphasolve: {err}");
            ExitCode::FAILURE
        }
    }
}

fn log_config(level: Option<String>, dir: Option<PathBuf>) -> LogConfig {
    let mut config = LogConfig::default();
    if let Some(level) = level {
        config.level = level;
    }
    if let Some(dir) = dir {
        config.target = LogTarget::Directory(dir);
    }
    config
}

fn cmd_ping() -> CliResult<()> {
    println!("alphasolve_core ping={}", alphasolve_core::ping());
    println!("alphasolve_core version={}", alphasolve_core::core_version());
    Ok(())
}

async fn cmd_propagate(log: &LogConfig, path: &Path, from: Option<Uuid>) -> CliResult<()> {
    init_logging(log)?;
    let mut project = load_project(path)?;
    let registry = builtin_registry()?;
    let executor = BuiltinExecutor::new();

    let report = match from {
        Some(cell_id) => Some(propagate_from(&mut project, cell_id, &registry, &executor).await?),
        None => propagate_all(&mut project, &registry, &executor).await,
    };
    if let Some(report) = report {
        info!(
            "event=cli_propagate module=cli status=ok applied={} passed_through={} failed={}",
            report.applied, report.passed_through, report.failed
        );
    }
    println!("{}", serde_json::to_string_pretty(&project)?);
    Ok(())
}

async fn cmd_connect(config: SessionConfig, project_path: Option<&Path>) -> CliResult<()> {
    config.validate()?;
    init_logging(&config.log)?;

    let shared = project_path.is_some();
    let project = match project_path {
        Some(path) => load_project(path)?,
        None => Project::with_id(config.project_id, "Untitled"),
    };

    let (sink, outbound_rx) = outbound_channel();
    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::unbounded_channel();
    let params = config.connection_params();
    let policy = config.reconnect;
    let transport = tokio::spawn(async move {
        run_transport(&params, policy, inbound_tx, outbound_rx).await
    });

    let mut session = SessionService::new(
        project,
        builtin_registry()?,
        Box::new(BuiltinExecutor::new()),
        sink,
    );
    if shared {
        session.broadcast_snapshot();
    }
    session.run(inbound_rx).await;

    transport.await??;
    Ok(())
}

fn load_project(path: &Path) -> CliResult<Project> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read `{}`: {err}", path.display()))?;
    let project = serde_json::from_str(&raw)
        .map_err(|err| format!("invalid project `{}`: {err}", path.display()))?;
    Ok(project)
}
