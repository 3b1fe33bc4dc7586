//! Docker-compatible API wire types.
//!
//! Only the fields the controller reads or writes are modelled; unknown
//! fields in responses are ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type Labels = BTreeMap<String, String>;

/// Placeholder for map values the API represents as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyObject {}

// ── Containers ─────────────────────────────────────────────────────

/// Body of `POST /containers/create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposed_ports: Option<BTreeMap<String, EmptyObject>>,
    #[serde(default)]
    pub host_config: HostConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networking_config: Option<NetworkingConfig>,
}

impl ContainerConfig {
    /// Attach to a single network on create.
    pub fn on_network(mut self, network: &str) -> Self {
        let mut endpoints = BTreeMap::new();
        endpoints.insert(network.to_string(), EndpointSettings::default());
        self.networking_config = Some(NetworkingConfig {
            endpoints_config: endpoints,
        });
        self
    }

    /// Network the container joins on create, if any.
    pub fn network(&self) -> Option<&str> {
        self.networking_config
            .as_ref()
            .and_then(|n| n.endpoints_config.keys().next())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
    /// Bytes; 0 means unlimited.
    #[serde(default)]
    pub memory: i64,
    #[serde(default)]
    pub nano_cpus: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mounts: Vec<Mount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_bindings: Option<BTreeMap<String, Vec<PortBinding>>>,
}

impl HostConfig {
    pub fn unless_stopped() -> Self {
        Self {
            restart_policy: Some(RestartPolicy {
                name: "unless-stopped".to_string(),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Mount {
    /// "volume" or "bind".
    #[serde(rename = "Type")]
    pub kind: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(rename = "HostIp")]
    pub host_ip: String,
    pub host_port: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkingConfig {
    pub endpoints_config: BTreeMap<String, EndpointSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSettings {
    #[serde(rename = "Aliases", default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    #[serde(rename = "NetworkID", default, skip_serializing_if = "String::is_empty")]
    pub network_id: String,
    #[serde(rename = "IPAddress", default, skip_serializing_if = "String::is_empty")]
    pub ip_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateResponse {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
}

/// Response of `GET /containers/{id}/json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    pub id: String,
    /// Leading `/` included, as the engine reports it.
    #[serde(default)]
    pub name: String,
    /// Image id the container was created from.
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub config: InspectConfig,
    #[serde(default)]
    pub state: ContainerState,
    #[serde(default)]
    pub host_config: HostConfig,
    #[serde(default)]
    pub network_settings: NetworkSettings,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mounts: Vec<MountPoint>,
}

impl ContainerInspect {
    /// Name without the engine's leading slash.
    pub fn short_name(&self) -> &str {
        self.name.trim_start_matches('/')
    }

    /// IPv4 address on `network`, if attached and assigned.
    pub fn ip_on(&self, network: &str) -> Option<&str> {
        self.network_settings
            .networks
            .get(network)
            .map(|e| e.ip_address.as_str())
            .filter(|ip| !ip.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectConfig {
    /// Image reference the container was created with.
    #[serde(default)]
    pub image: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub env: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cmd: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Labels,
    #[serde(default, deserialize_with = "null_as_default")]
    pub exposed_ports: BTreeMap<String, EmptyObject>,
    #[serde(default)]
    pub tty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    /// "created", "running", "exited", ...
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub exit_code: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSettings {
    #[serde(default, deserialize_with = "null_as_default")]
    pub networks: BTreeMap<String, EndpointSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountPoint {
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub destination: String,
}

/// Entry of `GET /containers/json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Labels,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mounts: Vec<MountPoint>,
}

// ── Networks ───────────────────────────────────────────────────────

/// Body of `POST /networks/create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkCreate {
    pub name: String,
    pub driver: String,
    #[serde(rename = "IPAM")]
    pub ipam: Ipam,
    pub labels: Labels,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipam {
    #[serde(rename = "Config", default, deserialize_with = "null_as_default")]
    pub config: Vec<IpamConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpamConfig {
    #[serde(rename = "Subnet", default, skip_serializing_if = "String::is_empty")]
    pub subnet: String,
    #[serde(rename = "Gateway", default, skip_serializing_if = "String::is_empty")]
    pub gateway: String,
}

/// Entry of `GET /networks`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub driver: String,
    #[serde(rename = "IPAM", default)]
    pub ipam: Ipam,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Labels,
}

// ── Volumes ────────────────────────────────────────────────────────

/// Body of `POST /volumes/create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeCreate {
    pub name: String,
    pub driver: String,
    pub labels: Labels,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeInfo {
    pub name: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub mountpoint: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Labels,
}

// ── Images, exec, system ───────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageInspect {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub repo_tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: ImageConfig,
}

impl ImageInspect {
    /// The image's port when it exposes exactly one TCP port.
    pub fn single_exposed_port(&self) -> Option<u16> {
        let mut tcp = self
            .config
            .exposed_ports
            .keys()
            .filter_map(|p| match p.split_once('/') {
                Some((port, "tcp")) => port.parse().ok(),
                Some(_) => None,
                None => p.parse().ok(),
            });
        match (tcp.next(), tcp.next()) {
            (Some(port), None) => Some(port),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub exposed_ports: BTreeMap<String, EmptyObject>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecCreate {
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecInspect {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub exit_code: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
}

/// `{"message": "..."}` error body.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_body_uses_engine_field_names() {
        let mut config = ContainerConfig {
            image: "nginx:alpine".into(),
            env: vec!["A=1".into()],
            host_config: HostConfig::unless_stopped(),
            ..Default::default()
        }
        .on_network("primary.nap-vpc-network");
        config.host_config.memory = 256 * 1024 * 1024;
        config.host_config.nano_cpus = 500_000_000;

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["Image"], "nginx:alpine");
        assert_eq!(json["HostConfig"]["RestartPolicy"]["Name"], "unless-stopped");
        assert_eq!(json["HostConfig"]["Memory"], 268_435_456);
        assert_eq!(json["HostConfig"]["NanoCpus"], 500_000_000);
        assert!(json["NetworkingConfig"]["EndpointsConfig"]["primary.nap-vpc-network"].is_object());
        assert!(json.get("Cmd").is_none());
    }

    #[test]
    fn inspect_tolerates_nulls() {
        let raw = r#"{
            "Id": "abc",
            "Name": "/nap-app-web-1",
            "Image": "sha256:1",
            "Config": {"Image": "web:1", "Env": null, "Labels": {"nap.managed": "true"}},
            "State": {"Status": "running", "Running": true, "ExitCode": 0},
            "HostConfig": {"Mounts": null, "Memory": 0, "NanoCpus": 0},
            "NetworkSettings": {"Networks": {"primary.nap-vpc-network": {"IPAddress": "172.20.0.5"}}},
            "Mounts": null
        }"#;
        let inspect: ContainerInspect = serde_json::from_str(raw).unwrap();
        assert_eq!(inspect.short_name(), "nap-app-web-1");
        assert_eq!(inspect.ip_on("primary.nap-vpc-network"), Some("172.20.0.5"));
        assert_eq!(inspect.ip_on("other"), None);
        assert!(inspect.config.env.is_empty());
    }

    #[test]
    fn image_port_needs_exactly_one_tcp_port() {
        let one: ImageInspect =
            serde_json::from_str(r#"{"Id":"sha256:a","Config":{"ExposedPorts":{"8080/tcp":{},"53/udp":{}}}}"#).unwrap();
        assert_eq!(one.single_exposed_port(), Some(8080));

        let two: ImageInspect =
            serde_json::from_str(r#"{"Id":"sha256:b","Config":{"ExposedPorts":{"80/tcp":{},"443/tcp":{}}}}"#).unwrap();
        assert_eq!(two.single_exposed_port(), None);

        let bare: ImageInspect = serde_json::from_str(r#"{"Id":"sha256:c","Config":null}"#).unwrap();
        assert_eq!(bare.single_exposed_port(), None);
    }

    #[test]
    fn network_summary_reads_ipam() {
        let raw = r#"{"Id":"n1","Name":"bridge","IPAM":{"Config":[{"Subnet":"172.17.0.0/16"}]},"Labels":null}"#;
        let net: NetworkSummary = serde_json::from_str(raw).unwrap();
        assert_eq!(net.ipam.config[0].subnet, "172.17.0.0/16");
    }
}
