//! In-memory engine for tests.
//!
//! [`FakeEngine`] keeps containers, networks, volumes and images in shared
//! state and records every mutating call as a [`FakeEvent`], so tests can
//! assert on the order of operations. Clones share state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::engine::{Engine, Progress};
use crate::error::{EngineError, EngineResult};
use crate::models::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    Created(String),
    Started(String),
    Stopped(String),
    Removed(String),
    Connected { network: String, container: String },
    Pulled(String),
    Built(String),
    NetworkCreated(String),
    NetworkRemoved(String),
    VolumeCreated(String),
    VolumeRemoved(String),
    /// Pushed by test probers, not by the engine itself.
    Probed(String),
}

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub config: ContainerConfig,
    pub running: bool,
    pub exit_code: i64,
    /// Network name to assigned address (empty until started).
    pub networks: BTreeMap<String, String>,
}

impl FakeContainer {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.config.labels.get(key).map(String::as_str)
    }

    fn inspect(&self) -> ContainerInspect {
        ContainerInspect {
            id: self.id.clone(),
            name: format!("/{}", self.name),
            image: format!("sha256:{}", self.config.image),
            config: InspectConfig {
                image: self.config.image.clone(),
                env: self.config.env.clone(),
                cmd: self.config.cmd.clone().unwrap_or_default(),
                labels: self.config.labels.clone(),
                exposed_ports: self.config.exposed_ports.clone().unwrap_or_default(),
                tty: false,
            },
            state: ContainerState {
                status: if self.running { "running" } else { "exited" }.to_string(),
                running: self.running,
                exit_code: self.exit_code,
            },
            host_config: self.config.host_config.clone(),
            network_settings: NetworkSettings {
                networks: self
                    .networks
                    .iter()
                    .map(|(net, ip)| {
                        (
                            net.clone(),
                            EndpointSettings {
                                ip_address: ip.clone(),
                                ..Default::default()
                            },
                        )
                    })
                    .collect(),
            },
            mounts: self
                .config
                .host_config
                .mounts
                .iter()
                .map(|m| MountPoint {
                    kind: m.kind.clone(),
                    name: if m.kind == "volume" { m.source.clone() } else { String::new() },
                    source: m.source.clone(),
                    destination: m.target.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    containers: Vec<FakeContainer>,
    networks: Vec<NetworkSummary>,
    volumes: BTreeMap<String, VolumeInfo>,
    images: BTreeSet<String>,
    exposed_ports: BTreeMap<String, Vec<String>>,
    events: Vec<FakeEvent>,
    next_id: u64,
    next_ip: u32,
    fail_create: Vec<String>,
    fail_start: Vec<String>,
    crash_on_start: Vec<String>,
    withhold_ip: Vec<String>,
    fail_pull: Vec<String>,
}

impl FakeState {
    fn find(&self, id_or_name: &str) -> Option<usize> {
        self.containers
            .iter()
            .position(|c| c.id == id_or_name || c.name == id_or_name)
    }

    fn container_mut(&mut self, id_or_name: &str) -> EngineResult<&mut FakeContainer> {
        let idx = self
            .find(id_or_name)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {id_or_name}")))?;
        Ok(&mut self.containers[idx])
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:0>60}", self.next_id)
    }

    fn assign_ip(&mut self) -> String {
        self.next_ip += 1;
        format!("10.89.{}.{}", self.next_ip / 250, self.next_ip % 250 + 2)
    }

    fn network_index(&self, id_or_name: &str) -> Option<usize> {
        self.networks
            .iter()
            .position(|n| n.id == id_or_name || n.name == id_or_name)
    }
}

fn matches_any(patterns: &[String], name: &str) -> bool {
    patterns.iter().any(|p| name.contains(p.as_str()))
}

#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pretend `reference` is already present locally.
    pub fn with_image(self, reference: &str) -> Self {
        self.state().images.insert(reference.to_string());
        self
    }

    /// Record `port` (e.g. `8080/tcp`) as exposed by `reference`.
    pub fn expose_port(&self, reference: &str, port: &str) {
        self.state()
            .exposed_ports
            .entry(reference.to_string())
            .or_default()
            .push(port.to_string());
    }

    // ── Failure knobs (substring match on container name or image) ──

    pub fn fail_create(&self, pattern: &str) {
        self.state().fail_create.push(pattern.to_string());
    }

    pub fn fail_start(&self, pattern: &str) {
        self.state().fail_start.push(pattern.to_string());
    }

    /// Matching containers start, then exit immediately with code 1.
    pub fn crash_on_start(&self, pattern: &str) {
        self.state().crash_on_start.push(pattern.to_string());
    }

    /// Matching containers run but never get an address.
    pub fn withhold_ip(&self, pattern: &str) {
        self.state().withhold_ip.push(pattern.to_string());
    }

    pub fn fail_pull(&self, pattern: &str) {
        self.state().fail_pull.push(pattern.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.fail_create.clear();
        state.fail_start.clear();
        state.crash_on_start.clear();
        state.withhold_ip.clear();
        state.fail_pull.clear();
    }

    // ── Observation ──

    pub fn record(&self, event: FakeEvent) {
        self.state().events.push(event);
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.state().events.clone()
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.state().containers.clone()
    }

    pub fn container(&self, id_or_name: &str) -> Option<FakeContainer> {
        let state = self.state();
        state.find(id_or_name).map(|i| state.containers[i].clone())
    }

    /// Names of running containers, in creation order.
    pub fn running_names(&self) -> Vec<String> {
        self.state()
            .containers
            .iter()
            .filter(|c| c.running)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn name_for_ip(&self, ip: &str) -> Option<String> {
        self.state()
            .containers
            .iter()
            .find(|c| c.networks.values().any(|a| a == ip))
            .map(|c| c.name.clone())
    }

    pub fn network_names(&self) -> Vec<String> {
        self.state().networks.iter().map(|n| n.name.clone()).collect()
    }

    pub fn volume_names(&self) -> Vec<String> {
        self.state().volumes.keys().cloned().collect()
    }

    pub fn has_image(&self, reference: &str) -> bool {
        self.state().images.contains(reference)
    }
}

impl Engine for FakeEngine {
    async fn create_container(&self, name: &str, config: &ContainerConfig) -> EngineResult<String> {
        let mut state = self.state();
        if matches_any(&state.fail_create, name) {
            return Err(EngineError::Api {
                status: 500,
                message: format!("injected create failure for {name}"),
            });
        }
        if state.find(name).is_some() {
            return Err(EngineError::Conflict(format!(
                "container name \"/{name}\" is already in use"
            )));
        }
        let id = state.next_id("c");
        let networks = config
            .networking_config
            .iter()
            .flat_map(|n| n.endpoints_config.keys())
            .map(|net| (net.clone(), String::new()))
            .collect();
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: name.to_string(),
            config: config.clone(),
            running: false,
            exit_code: 0,
            networks,
        });
        state.events.push(FakeEvent::Created(name.to_string()));
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        let mut state = self.state();
        let name = state.container_mut(id)?.name.clone();
        if matches_any(&state.fail_start, &name) {
            return Err(EngineError::Api {
                status: 500,
                message: format!("injected start failure for {name}"),
            });
        }
        let crash = matches_any(&state.crash_on_start, &name);
        let withhold = matches_any(&state.withhold_ip, &name);
        let nets: Vec<String> = state.container_mut(id)?.networks.keys().cloned().collect();
        let mut ips = BTreeMap::new();
        for net in nets {
            let ip = if crash || withhold { String::new() } else { state.assign_ip() };
            ips.insert(net, ip);
        }
        let container = state.container_mut(id)?;
        container.running = !crash;
        container.exit_code = if crash { 1 } else { 0 };
        for (net, ip) in ips {
            if container.networks.get(&net).is_none_or(String::is_empty) {
                container.networks.insert(net, ip);
            }
        }
        state.events.push(FakeEvent::Started(name));
        Ok(())
    }

    async fn stop_container(&self, id: &str, _grace: Duration) -> EngineResult<()> {
        let mut state = self.state();
        let container = state.container_mut(id)?;
        container.running = false;
        let name = container.name.clone();
        state.events.push(FakeEvent::Stopped(name));
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> EngineResult<()> {
        let mut state = self.state();
        let idx = state
            .find(id)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {id}")))?;
        if state.containers[idx].running && !force {
            return Err(EngineError::Conflict(format!(
                "cannot remove running container {id}"
            )));
        }
        let removed = state.containers.remove(idx);
        state.events.push(FakeEvent::Removed(removed.name));
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerInspect> {
        let state = self.state();
        state
            .find(id)
            .map(|i| state.containers[i].inspect())
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {id}")))
    }

    async fn list_containers(
        &self,
        all: bool,
        label_filters: &[String],
    ) -> EngineResult<Vec<ContainerSummary>> {
        let state = self.state();
        let wanted = |c: &FakeContainer| {
            label_filters.iter().all(|f| match f.split_once('=') {
                Some((k, v)) => c.label(k) == Some(v),
                None => c.config.labels.contains_key(f),
            })
        };
        Ok(state
            .containers
            .iter()
            .filter(|c| (all || c.running) && wanted(c))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![format!("/{}", c.name)],
                image: c.config.image.clone(),
                state: if c.running { "running" } else { "exited" }.to_string(),
                status: String::new(),
                labels: c.config.labels.clone(),
                mounts: c.inspect().mounts,
            })
            .collect())
    }

    async fn connect_network(&self, network: &str, container: &str) -> EngineResult<()> {
        let mut state = self.state();
        let running = state.container_mut(container)?.running;
        let ip = if running { state.assign_ip() } else { String::new() };
        let target = state.container_mut(container)?;
        if target.networks.contains_key(network) {
            return Err(EngineError::Api {
                status: 403,
                message: format!("endpoint with name {} already exists in network {network}", target.name),
            });
        }
        target.networks.insert(network.to_string(), ip);
        let name = target.name.clone();
        state.events.push(FakeEvent::Connected {
            network: network.to_string(),
            container: name,
        });
        Ok(())
    }

    async fn create_network(&self, spec: &NetworkCreate) -> EngineResult<String> {
        let mut state = self.state();
        if state.network_index(&spec.name).is_some() {
            return Err(EngineError::Conflict(format!(
                "network with name {} already exists",
                spec.name
            )));
        }
        let id = state.next_id("n");
        state.networks.push(NetworkSummary {
            id: id.clone(),
            name: spec.name.clone(),
            driver: spec.driver.clone(),
            ipam: spec.ipam.clone(),
            labels: spec.labels.clone(),
        });
        state.events.push(FakeEvent::NetworkCreated(spec.name.clone()));
        Ok(id)
    }

    async fn remove_network(&self, id: &str) -> EngineResult<()> {
        let mut state = self.state();
        let idx = state
            .network_index(id)
            .ok_or_else(|| EngineError::NotFound(format!("network {id} not found")))?;
        let removed = state.networks.remove(idx);
        for c in &mut state.containers {
            c.networks.remove(&removed.name);
        }
        state.events.push(FakeEvent::NetworkRemoved(removed.name));
        Ok(())
    }

    async fn list_networks(&self) -> EngineResult<Vec<NetworkSummary>> {
        Ok(self.state().networks.clone())
    }

    async fn create_volume(&self, spec: &VolumeCreate) -> EngineResult<VolumeInfo> {
        let mut state = self.state();
        if let Some(existing) = state.volumes.get(&spec.name) {
            return Ok(existing.clone());
        }
        let info = VolumeInfo {
            name: spec.name.clone(),
            driver: if spec.driver.is_empty() { "local".to_string() } else { spec.driver.clone() },
            mountpoint: format!("/var/lib/containers/storage/volumes/{}/_data", spec.name),
            labels: spec.labels.clone(),
        };
        state.volumes.insert(spec.name.clone(), info.clone());
        state.events.push(FakeEvent::VolumeCreated(spec.name.clone()));
        Ok(info)
    }

    async fn remove_volume(&self, name: &str, force: bool) -> EngineResult<()> {
        let mut state = self.state();
        if !state.volumes.contains_key(name) {
            return Err(EngineError::NotFound(format!("no such volume: {name}")));
        }
        let in_use = state
            .containers
            .iter()
            .any(|c| c.config.host_config.mounts.iter().any(|m| m.source == name));
        if in_use && !force {
            return Err(EngineError::Conflict(format!("volume is in use: {name}")));
        }
        state.volumes.remove(name);
        state.events.push(FakeEvent::VolumeRemoved(name.to_string()));
        Ok(())
    }

    async fn inspect_volume(&self, name: &str) -> EngineResult<VolumeInfo> {
        self.state()
            .volumes
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("no such volume: {name}")))
    }

    async fn inspect_image(&self, reference: &str) -> EngineResult<ImageInspect> {
        let state = self.state();
        if !state.images.contains(reference) {
            return Err(EngineError::NotFound(format!("No such image: {reference}")));
        }
        let exposed_ports = state
            .exposed_ports
            .get(reference)
            .into_iter()
            .flatten()
            .map(|p| (p.clone(), EmptyObject {}))
            .collect();
        Ok(ImageInspect {
            id: format!("sha256:{reference}"),
            repo_tags: vec![reference.to_string()],
            config: ImageConfig { exposed_ports },
        })
    }

    async fn pull_image(&self, reference: &str, progress: Progress<'_>) -> EngineResult<()> {
        {
            let mut state = self.state();
            if matches_any(&state.fail_pull, reference) {
                return Err(EngineError::Stream(format!(
                    "pull failed: manifest for {reference} not found"
                )));
            }
            state.images.insert(reference.to_string());
            state.events.push(FakeEvent::Pulled(reference.to_string()));
        }
        progress(&format!("Downloaded newer image for {reference}"));
        Ok(())
    }

    async fn build_image(
        &self,
        context: Vec<u8>,
        _dockerfile: &str,
        tag: &str,
        progress: Progress<'_>,
    ) -> EngineResult<String> {
        let id = {
            let mut state = self.state();
            state.images.insert(tag.to_string());
            state.events.push(FakeEvent::Built(tag.to_string()));
            state.next_id("sha256:")
        };
        progress(&format!("Sending build context ({} bytes)", context.len()));
        progress(&format!("Successfully tagged {tag}"));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{discard_container, ensure_image};

    fn config(image: &str) -> ContainerConfig {
        ContainerConfig {
            image: image.to_string(),
            ..Default::default()
        }
        .on_network("nap-vpc-primary")
    }

    #[tokio::test]
    async fn lifecycle_is_recorded() {
        let engine = FakeEngine::new();
        let id = engine.create_container("web-1", &config("nginx")).await.unwrap();
        engine.start_container(&id).await.unwrap();

        let inspect = engine.inspect_container("web-1").await.unwrap();
        assert!(inspect.state.running);
        let ip = inspect.ip_on("nap-vpc-primary").unwrap().to_string();
        assert_eq!(engine.name_for_ip(&ip).as_deref(), Some("web-1"));

        assert!(discard_container(&engine, &id, Duration::from_secs(1)).await);
        assert_eq!(
            engine.events(),
            vec![
                FakeEvent::Created("web-1".into()),
                FakeEvent::Started("web-1".into()),
                FakeEvent::Stopped("web-1".into()),
                FakeEvent::Removed("web-1".into()),
            ]
        );
        assert!(discard_container(&engine, &id, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn name_conflicts() {
        let engine = FakeEngine::new();
        engine.create_container("web-1", &config("nginx")).await.unwrap();
        let err = engine.create_container("web-1", &config("nginx")).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn crash_and_withheld_ip() {
        let engine = FakeEngine::new();
        engine.crash_on_start("crashy");
        engine.withhold_ip("slow");

        let id = engine.create_container("crashy-1", &config("x")).await.unwrap();
        engine.start_container(&id).await.unwrap();
        let inspect = engine.inspect_container(&id).await.unwrap();
        assert!(!inspect.state.running);
        assert_eq!(inspect.state.exit_code, 1);

        let id = engine.create_container("slow-1", &config("x")).await.unwrap();
        engine.start_container(&id).await.unwrap();
        let inspect = engine.inspect_container(&id).await.unwrap();
        assert!(inspect.state.running);
        assert_eq!(inspect.ip_on("nap-vpc-primary"), None);
    }

    #[tokio::test]
    async fn label_filters() {
        let engine = FakeEngine::new();
        let mut cfg = config("x");
        cfg.labels.insert("nap.managed".into(), "true".into());
        cfg.labels.insert("nap.app.name".into(), "web".into());
        engine.create_container("web-1", &cfg).await.unwrap();
        engine.create_container("other", &config("x")).await.unwrap();

        let found = engine
            .list_containers(true, &["nap.app.name=web".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].names, vec!["/web-1".to_string()]);
        assert!(engine.list_containers(false, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ensure_image_pulls_once() {
        let engine = FakeEngine::new().with_image("alpine:3");
        let quiet = |_: &str| {};
        ensure_image(&engine, "alpine:3", &quiet).await.unwrap();
        ensure_image(&engine, "nginx:alpine", &quiet).await.unwrap();
        ensure_image(&engine, "nginx:alpine", &quiet).await.unwrap();
        assert_eq!(engine.events(), vec![FakeEvent::Pulled("nginx:alpine".into())]);

        engine.fail_pull("broken");
        assert!(ensure_image(&engine, "broken:1", &quiet).await.is_err());
    }

    #[tokio::test]
    async fn volumes_in_use_need_force() {
        let engine = FakeEngine::new();
        engine
            .create_volume(&VolumeCreate {
                name: "nap-vol-web-data".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let mut cfg = config("x");
        cfg.host_config.mounts.push(Mount {
            kind: "volume".into(),
            source: "nap-vol-web-data".into(),
            target: "/data".into(),
            read_only: false,
        });
        engine.create_container("web-1", &cfg).await.unwrap();

        let err = engine.remove_volume("nap-vol-web-data", false).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
        engine.remove_volume("nap-vol-web-data", true).await.unwrap();
        assert!(engine.volume_names().is_empty());
    }
}
