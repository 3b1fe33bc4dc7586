//! Lifecycle of the `nap-traefik` sidecar.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nap_core::StateDir;
use nap_core::naming::{PROXY_CONTAINER, labels};
use nap_engine::models::{ContainerConfig, EmptyObject, HostConfig, Mount, PortBinding};
use nap_engine::{Engine, Progress, ensure_image};
use tracing::{debug, info};

use crate::error::{ProxyError, ProxyResult};

pub const PROXY_IMAGE: &str = "traefik:v3.5";

/// Host ports published by the proxy: HTTP, HTTPS, dashboard.
pub const PROXY_PORTS: [u16; 3] = [80, 443, 8080];

/// Where the engine socket appears inside the proxy container.
const IN_CONTAINER_SOCKET: &str = "/var/run/docker.sock";

/// What [`Traefik::ensure_running`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStart {
    AlreadyRunning,
    Restarted,
    Created,
}

/// Static proxy configuration: entrypoints, ACME resolver, docker provider.
pub fn render_config(acme_email: &str) -> String {
    format!(
        r#"# Traefik configuration for nap
entryPoints:
  web:
    address: ":80"
    http:
      redirections:
        entryPoint:
          to: websecure
          scheme: https
  websecure:
    address: ":443"

certificatesResolvers:
  letsencrypt:
    acme:
      email: {acme_email}
      storage: /letsencrypt/acme.json
      httpChallenge:
        entryPoint: web

providers:
  docker:
    endpoint: "unix://{IN_CONTAINER_SOCKET}"
    exposedByDefault: false
    watch: true

api:
  dashboard: true
  insecure: true

log:
  level: INFO

accessLog:
  format: common
"#
    )
}

/// Container spec for the proxy.
pub fn proxy_container_config(engine_socket: &Path, config: &Path, letsencrypt: &Path) -> ContainerConfig {
    let bind = |source: &Path, target: &str, read_only: bool| Mount {
        kind: "bind".to_string(),
        source: source.display().to_string(),
        target: target.to_string(),
        read_only,
    };

    let mut exposed = BTreeMap::new();
    let mut bindings = BTreeMap::new();
    for port in PROXY_PORTS {
        let key = format!("{port}/tcp");
        exposed.insert(key.clone(), EmptyObject::default());
        bindings.insert(
            key,
            vec![PortBinding {
                host_ip: "0.0.0.0".to_string(),
                host_port: port.to_string(),
            }],
        );
    }

    let mut container_labels = BTreeMap::new();
    container_labels.insert(labels::MANAGED.to_string(), "true".to_string());
    container_labels.insert(labels::TYPE.to_string(), labels::TYPE_PROXY.to_string());

    ContainerConfig {
        image: PROXY_IMAGE.to_string(),
        labels: container_labels,
        exposed_ports: Some(exposed),
        host_config: HostConfig {
            mounts: vec![
                // The proxy speaks the docker API; podman's socket answers it too.
                bind(engine_socket, IN_CONTAINER_SOCKET, true),
                bind(config, "/etc/traefik/traefik.yml", true),
                bind(letsencrypt, "/letsencrypt", false),
            ],
            port_bindings: Some(bindings),
            ..HostConfig::unless_stopped()
        },
        ..Default::default()
    }
}

/// Handle on the proxy sidecar.
pub struct Traefik<'a, E> {
    engine: &'a E,
    state: &'a StateDir,
    engine_socket: PathBuf,
    acme_email: String,
}

impl<'a, E: Engine> Traefik<'a, E> {
    pub fn new(engine: &'a E, state: &'a StateDir, engine_socket: PathBuf, acme_email: &str) -> Self {
        Self {
            engine,
            state,
            engine_socket,
            acme_email: acme_email.to_string(),
        }
    }

    /// Whether the proxy container exists and is running.
    pub async fn is_running(&self) -> ProxyResult<bool> {
        match self.engine.inspect_container(PROXY_CONTAINER).await {
            Ok(inspect) => Ok(inspect.state.running),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Start the proxy, creating it on first use.
    pub async fn ensure_running(&self, progress: Progress<'_>) -> ProxyResult<ProxyStart> {
        match self.engine.inspect_container(PROXY_CONTAINER).await {
            Ok(inspect) if inspect.state.running => {
                debug!("proxy already running");
                return Ok(ProxyStart::AlreadyRunning);
            }
            Ok(inspect) => {
                progress("starting existing proxy");
                self.engine.start_container(&inspect.id).await?;
                info!("proxy restarted");
                return Ok(ProxyStart::Restarted);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        progress("creating proxy");
        let config_path = self.write_config()?;
        let letsencrypt = self.state.letsencrypt_dir();
        std::fs::create_dir_all(&letsencrypt).map_err(|source| ProxyError::Io {
            path: letsencrypt.clone(),
            source,
        })?;

        ensure_image(self.engine, PROXY_IMAGE, progress).await?;
        let config = proxy_container_config(&self.engine_socket, &config_path, &letsencrypt);
        let id = self.engine.create_container(PROXY_CONTAINER, &config).await?;
        self.engine.start_container(&id).await?;
        info!(image = PROXY_IMAGE, "proxy created");
        progress("proxy dashboard: http://localhost:8080");
        Ok(ProxyStart::Created)
    }

    /// Write `traefik.yml` under the state directory.
    pub fn write_config(&self) -> ProxyResult<PathBuf> {
        let path = self.state.traefik_config();
        nap_core::write_atomic(&path, render_config(&self.acme_email).as_bytes())?;
        Ok(path)
    }

    /// Join the proxy to `network` unless it is already attached.
    ///
    /// Returns whether a connection was made.
    pub async fn connect_to_network(&self, network: &str) -> ProxyResult<bool> {
        let inspect = self.engine.inspect_container(PROXY_CONTAINER).await?;
        if inspect.network_settings.networks.contains_key(network) {
            return Ok(false);
        }
        self.engine.connect_network(network, &inspect.id).await?;
        info!(%network, "proxy joined network");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use nap_engine::fake::{FakeEngine, FakeEvent};

    use super::*;

    fn quiet(_: &str) {}

    #[test]
    fn config_mentions_email_and_resolver() {
        let yml = render_config("ops@example.com");
        assert!(yml.contains("email: ops@example.com"));
        assert!(yml.contains("letsencrypt:"));
        assert!(yml.contains("exposedByDefault: false"));
        assert!(yml.contains("endpoint: \"unix:///var/run/docker.sock\""));
    }

    #[test]
    fn container_spec() {
        let cfg = proxy_container_config(
            Path::new("/run/user/1000/podman/podman.sock"),
            Path::new("/home/u/.nap/traefik.yml"),
            Path::new("/home/u/.nap/letsencrypt"),
        );
        assert_eq!(cfg.labels[labels::TYPE], "traefik");
        let mounts = &cfg.host_config.mounts;
        assert_eq!(mounts[0].source, "/run/user/1000/podman/podman.sock");
        assert!(mounts[0].read_only);
        let ports = cfg.host_config.port_bindings.unwrap();
        assert_eq!(ports["443/tcp"][0].host_port, "443");
        assert_eq!(cfg.host_config.restart_policy.unwrap().name, "unless-stopped");
    }

    #[tokio::test]
    async fn ensure_running_creates_then_noops() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateDir::new(dir.path());
        let engine = FakeEngine::new();
        let traefik = Traefik::new(&engine, &state, "/var/run/docker.sock".into(), "nap@localhost");

        assert!(!traefik.is_running().await.unwrap());
        assert_eq!(traefik.ensure_running(&quiet).await.unwrap(), ProxyStart::Created);
        assert!(state.traefik_config().exists());
        assert!(state.letsencrypt_dir().is_dir());
        assert_eq!(traefik.ensure_running(&quiet).await.unwrap(), ProxyStart::AlreadyRunning);

        engine
            .stop_container(PROXY_CONTAINER, std::time::Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(traefik.ensure_running(&quiet).await.unwrap(), ProxyStart::Restarted);
        assert!(engine.has_image(PROXY_IMAGE));
    }

    #[tokio::test]
    async fn network_join_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateDir::new(dir.path());
        let engine = FakeEngine::new();
        let traefik = Traefik::new(&engine, &state, "/var/run/docker.sock".into(), "nap@localhost");
        traefik.ensure_running(&quiet).await.unwrap();

        assert!(traefik.connect_to_network("primary.nap-vpc-network").await.unwrap());
        assert!(!traefik.connect_to_network("primary.nap-vpc-network").await.unwrap());
        let joins = engine
            .events()
            .into_iter()
            .filter(|e| matches!(e, FakeEvent::Connected { .. }))
            .count();
        assert_eq!(joins, 1);
    }
}
