//! `nap daemon`: the container engine nap talks to.

use std::process::ExitCode;

use clap::Subcommand;
use nap_control::ControlError;
use nap_engine::{DockerClient, RuntimeInfo};

use super::{detect_runtime, load_config, state_dir};

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Show the detected engine and its version
    Status,
    /// Print the command that starts the engine
    Start,
    /// Print the command that stops the engine
    Stop,
}

fn systemctl(runtime: &RuntimeInfo, verb: &str) -> String {
    if runtime.rootless {
        format!("systemctl --user {verb} {}", runtime.service_name())
    } else {
        format!("systemctl {verb} {}", runtime.service_name())
    }
}

pub async fn run(command: DaemonCommand) -> anyhow::Result<ExitCode> {
    let config = load_config(&state_dir()?)?;
    let runtime = detect_runtime(&config)?;
    match command {
        DaemonCommand::Status => {
            println!("Runtime:    {}", runtime.name());
            println!("Socket:     {}", runtime.socket.display());
            let client = DockerClient::new(runtime);
            let version = client.version().await.map_err(ControlError::from)?;
            println!("Version:    {}", version.version);
            println!("API:        {}", version.api_version);
            println!("Platform:   {}/{}", version.os, version.arch);
        }
        DaemonCommand::Start => println!("{}", systemctl(&runtime, "start")),
        DaemonCommand::Stop => println!("{}", systemctl(&runtime, "stop")),
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn rootful_engine_uses_system_units() {
        let runtime = RuntimeInfo::docker(PathBuf::from("/var/run/docker.sock"));
        assert_eq!(systemctl(&runtime, "start"), "systemctl start docker.service");
    }

    #[test]
    fn rootless_engine_uses_user_units() {
        let mut runtime = RuntimeInfo::docker(PathBuf::from("/run/user/1000/docker.sock"));
        runtime.rootless = true;
        assert_eq!(systemctl(&runtime, "stop"), "systemctl --user stop docker.service");
    }
}
