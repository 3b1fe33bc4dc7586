//! `nap doctor`: one line per host check.

use std::process::ExitCode;

use anyhow::Context as _;
use nap_control::{Context, ControlError};
use nap_core::{GlobalConfig, StateDir};
use nap_engine::DockerClient;
use nap_health::HttpProber;
use nap_state::{LockManager, Registries};

use super::{detect_runtime, load_config, state_dir};

/// Collects check outcomes and prints them as they come in.
#[derive(Default)]
struct Report {
    failures: usize,
}

impl Report {
    fn check(&mut self, label: &str, outcome: anyhow::Result<String>) {
        match outcome {
            Ok(detail) if detail.is_empty() => println!("[ok]   {label}"),
            Ok(detail) => println!("[ok]   {label}: {detail}"),
            Err(e) => {
                self.failures += 1;
                println!("[fail] {label}: {e}");
            }
        }
    }
}

fn registry_counts(registries: &Registries) -> anyhow::Result<String> {
    let apps = registries.apps.list().map_err(ControlError::from)?.len();
    let dbs = registries.databases.list().map_err(ControlError::from)?.len();
    let vpcs = registries.vpcs.list().map_err(ControlError::from)?.len();
    let backups = registries.volume_backups.list().map_err(ControlError::from)?.len();
    Ok(format!("{apps} apps, {dbs} databases, {vpcs} vpcs, {backups} backups"))
}

fn publishing(config: &GlobalConfig) -> anyhow::Result<String> {
    if !config.publishing.enabled {
        return Ok("disabled".to_string());
    }
    config.validate_publishing().map_err(ControlError::from)?;
    Ok(format!("*.nap.{}", config.publishing.base_domain))
}

/// Create and remove a probe file under the state directory.
fn writable(dir: &StateDir) -> anyhow::Result<String> {
    let probe = dir.root().join(".doctor-probe");
    std::fs::write(&probe, b"ok").with_context(|| format!("writing {}", probe.display()))?;
    std::fs::remove_file(&probe).with_context(|| format!("removing {}", probe.display()))?;
    Ok(dir.root().display().to_string())
}

fn stale_locks(dir: &StateDir) -> anyhow::Result<String> {
    let stale = LockManager::new(dir.locks_dir()).stale_locks().map_err(ControlError::from)?;
    if stale.is_empty() {
        return Ok("none stale".to_string());
    }
    let held: Vec<String> = stale
        .iter()
        .map(|(name, pid)| match pid {
            Some(pid) => format!("{name} (pid {pid})"),
            None => format!("{name} (no pid)"),
        })
        .collect();
    Err(anyhow::anyhow!("abandoned by dead processes: {}", held.join(", ")))
}

pub async fn run() -> anyhow::Result<ExitCode> {
    let mut report = Report::default();
    let dir = state_dir()?;
    let config = match load_config(&dir) {
        Ok(config) => config,
        Err(e) => {
            report.check("config", Err(e));
            GlobalConfig::default()
        }
    };

    let mut client = None;
    match detect_runtime(&config) {
        Ok(runtime) => {
            report.check("engine", Ok(format!("{} at {}", runtime.name(), runtime.socket.display())));
            let docker = DockerClient::new(runtime);
            match docker.ping().await {
                Ok(()) => {
                    report.check("engine reachable", Ok(String::new()));
                    client = Some(docker);
                }
                Err(e) => report.check("engine reachable", Err(ControlError::from(e).into())),
            }
        }
        Err(e) => report.check("engine", Err(e)),
    }

    report.check("state directory", writable(&dir));
    match Registries::open(&dir) {
        Ok(registries) => report.check("registries", registry_counts(&registries)),
        Err(e) => report.check("registries", Err(ControlError::from(e).into())),
    }
    report.check("publishing", publishing(&config));

    if let Some(docker) = client {
        let socket = docker.socket().to_path_buf();
        let ctx = Context::open(dir.clone(), docker, HttpProber, socket)?;
        let running = ctx.proxy().is_running().await.map_err(ControlError::from);
        report.check(
            "proxy",
            match running {
                Ok(true) => Ok("running".to_string()),
                Ok(false) => Err(anyhow::anyhow!("not running; it starts on the next deploy or publish")),
                Err(e) => Err(e.into()),
            },
        );
    }

    report.check("locks", stale_locks(&dir));

    if report.failures > 0 {
        println!();
        println!("{} check(s) failed", report.failures);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
