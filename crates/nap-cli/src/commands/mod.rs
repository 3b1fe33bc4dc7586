//! `nap` subcommands.
//!
//! Commands that touch containers build a [`Ctx`] through
//! [`open_context`], which detects the engine first. Registry-only
//! commands (`list`, `config`, `init`) read the state directory directly
//! and work without a running engine.

pub mod app;
pub mod config;
pub mod daemon;
pub mod db;
pub mod doctor;
pub mod init;
pub mod output;
pub mod vpc;

use anyhow::Context as _;
use nap_control::{Context, ControlError};
use nap_core::{GlobalConfig, StateDir};
use nap_engine::{DockerClient, RuntimeInfo, runtime};
use nap_health::HttpProber;
use nap_state::Registries;

pub type Ctx = Context<DockerClient, HttpProber>;

/// Resolve the state directory and create it if needed.
pub fn state_dir() -> anyhow::Result<StateDir> {
    let dir = StateDir::discover().map_err(ControlError::from)?;
    dir.ensure().map_err(ControlError::from)?;
    Ok(dir)
}

pub fn load_config(dir: &StateDir) -> anyhow::Result<GlobalConfig> {
    Ok(GlobalConfig::load(&dir.config_file()).map_err(ControlError::from)?)
}

/// Detect the container engine configured for this host.
pub fn detect_runtime(config: &GlobalConfig) -> anyhow::Result<RuntimeInfo> {
    Ok(runtime::detect(&config.runtime).map_err(ControlError::from)?)
}

/// Open the full command context against the detected engine.
pub fn open_context() -> anyhow::Result<Ctx> {
    let dir = state_dir()?;
    let config = load_config(&dir)?;
    let runtime = detect_runtime(&config)?;
    tracing::debug!(runtime = %runtime.name(), socket = %runtime.socket.display(), "engine detected");
    let socket = runtime.socket.clone();
    let ctx = Context::open(dir, DockerClient::new(runtime), HttpProber, socket)?;
    Ok(ctx)
}

/// Registries alone, for commands that never talk to the engine.
pub fn registries() -> anyhow::Result<Registries> {
    let dir = state_dir()?;
    Registries::open(&dir)
        .map_err(ControlError::from)
        .with_context(|| format!("opening registries under {}", dir.root().display()))
}

/// Progress lines from long-running operations.
pub fn progress(line: &str) {
    println!("  {line}");
}
