//! Container runtime detection.

use std::fmt;
use std::path::{Path, PathBuf};

use nap_core::config::RuntimeSection;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";
pub const PODMAN_ROOT_SOCKET: &str = "/run/podman/podman.sock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Docker,
    Podman,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Docker => "docker",
            RuntimeKind::Podman => "podman",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub kind: RuntimeKind,
    pub socket: PathBuf,
    pub rootless: bool,
}

impl RuntimeInfo {
    pub fn docker(socket: PathBuf) -> Self {
        Self {
            kind: RuntimeKind::Docker,
            socket,
            rootless: false,
        }
    }

    /// Display name, e.g. `podman (rootless)`.
    pub fn name(&self) -> String {
        if self.rootless {
            format!("{} (rootless)", self.kind)
        } else {
            self.kind.to_string()
        }
    }

    /// Platform service unit that runs the engine.
    pub fn service_name(&self) -> &'static str {
        match self.kind {
            RuntimeKind::Docker => "docker.service",
            RuntimeKind::Podman => "podman.service",
        }
    }
}

/// Everything detection reads from the environment.
#[derive(Debug, Clone, Default)]
pub struct DetectInput {
    pub socket_path: String,
    pub prefer: String,
    pub docker_host: Option<String>,
    pub uid: u32,
}

impl DetectInput {
    pub fn from_env(section: &RuntimeSection) -> Self {
        Self {
            socket_path: section.socket_path.clone(),
            prefer: section.prefer.clone(),
            docker_host: std::env::var("DOCKER_HOST").ok().filter(|h| !h.is_empty()),
            // SAFETY: getuid has no preconditions and cannot fail.
            uid: unsafe { libc::getuid() },
        }
    }
}

/// Detect the runtime from config, `DOCKER_HOST`, and well-known sockets.
pub fn detect(section: &RuntimeSection) -> EngineResult<RuntimeInfo> {
    detect_with(&DetectInput::from_env(section), |p| p.exists())
}

pub fn detect_with(input: &DetectInput, exists: impl Fn(&Path) -> bool) -> EngineResult<RuntimeInfo> {
    let podman_kind = |s: &str| {
        if s.contains("podman") {
            RuntimeKind::Podman
        } else {
            RuntimeKind::Docker
        }
    };

    if !input.socket_path.is_empty() {
        let socket = PathBuf::from(&input.socket_path);
        let kind = match input.prefer.as_str() {
            "podman" => RuntimeKind::Podman,
            "docker" => RuntimeKind::Docker,
            _ => podman_kind(&input.socket_path),
        };
        debug!(socket = %socket.display(), %kind, "using configured engine socket");
        return Ok(RuntimeInfo {
            kind,
            rootless: kind == RuntimeKind::Podman && input.uid != 0,
            socket,
        });
    }

    if let Some(host) = &input.docker_host {
        match host.strip_prefix("unix://") {
            Some(path) => {
                let kind = podman_kind(host);
                debug!(socket = %path, %kind, "using DOCKER_HOST");
                return Ok(RuntimeInfo {
                    kind,
                    socket: PathBuf::from(path),
                    rootless: kind == RuntimeKind::Podman && input.uid != 0,
                });
            }
            None => debug!(%host, "ignoring non-unix DOCKER_HOST"),
        }
    }

    let rootless_podman = PathBuf::from(format!("/run/user/{}/podman/podman.sock", input.uid));
    let mut candidates = vec![(RuntimeKind::Docker, PathBuf::from(DOCKER_SOCKET), false)];
    if input.uid != 0 {
        candidates.push((RuntimeKind::Podman, rootless_podman, true));
    }
    candidates.push((RuntimeKind::Podman, PathBuf::from(PODMAN_ROOT_SOCKET), false));

    if input.prefer == "podman" {
        candidates.sort_by_key(|(kind, _, _)| *kind != RuntimeKind::Podman);
    }

    for (kind, socket, rootless) in &candidates {
        if exists(socket) {
            debug!(socket = %socket.display(), %kind, "detected engine socket");
            return Ok(RuntimeInfo {
                kind: *kind,
                socket: socket.clone(),
                rootless: *rootless,
            });
        }
    }

    let tried = candidates
        .iter()
        .map(|(_, s, _)| s.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(EngineError::NoRuntime { tried })
}
