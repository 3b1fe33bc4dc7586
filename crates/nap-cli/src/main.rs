use std::process::ExitCode;

use clap::{Parser, Subcommand};
use nap_control::ControlError;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "nap",
    about = "Deploy containers, databases and private networks on a single host",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Debug-level logs on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy and manage applications
    App {
        #[command(subcommand)]
        action: commands::app::AppCommand,
    },
    /// Provision and manage databases
    Db {
        #[command(subcommand)]
        action: commands::db::DbCommand,
    },
    /// Manage private networks
    Vpc {
        #[command(subcommand)]
        action: commands::vpc::VpcCommand,
    },
    /// Global controller configuration
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigCommand,
    },
    /// Inspect the container engine
    Daemon {
        #[command(subcommand)]
        action: commands::daemon::DaemonCommand,
    },
    /// Check the engine, state directory, registries, proxy and locks
    Doctor,
    /// Write a nap.toml scaffold
    Init {
        /// Project directory
        #[arg(default_value = ".")]
        path: String,
        /// App name (default: directory name)
        #[arg(short, long)]
        name: Option<String>,
        /// Overwrite an existing nap.toml
        #[arg(short, long)]
        force: bool,
    },
}

/// Workspace crates whose logs are shown by default.
const LOG_TARGETS: [&str; 8] = [
    "nap",
    "nap_core",
    "nap_state",
    "nap_engine",
    "nap_health",
    "nap_proxy",
    "nap_rollout",
    "nap_control",
];

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() && !verbose => EnvFilter::try_new(directives)?,
        _ => {
            let level = if verbose { "debug" } else { "info" };
            let mut filter = EnvFilter::new("warn");
            for target in LOG_TARGETS {
                filter = filter.add_directive(format!("{target}={level}").parse()?);
            }
            filter
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if std::env::var("NAP_LOG_FORMAT").is_ok_and(|f| f == "json") {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
    Ok(())
}

/// Print `[error] msg` and any remediation hints on stderr.
fn report(err: &anyhow::Error) {
    eprintln!("[error] {err}");
    if let Some(control) = err.downcast_ref::<ControlError>() {
        for hint in control.hints() {
            eprintln!("        {hint}");
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::App { action } => commands::app::run(action).await,
        Commands::Db { action } => commands::db::run(action).await,
        Commands::Vpc { action } => commands::vpc::run(action).await,
        Commands::Config { action } => commands::config::run(action),
        Commands::Daemon { action } => commands::daemon::run(action).await,
        Commands::Doctor => commands::doctor::run().await,
        Commands::Init { path, name, force } => commands::init::run(&path, name.as_deref(), force),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("[error] invalid log filter: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}
