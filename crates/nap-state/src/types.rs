//! Persisted entities.
//!
//! Field names follow the on-disk JSON layout of the registry files. List
//! and map fields accept `null` (older files wrote nil slices that way) and
//! deserialize it as empty.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use nap_core::naming;
use nap_core::{Color, StrategyKind};

/// Sorted environment map; sorting keeps registry output canonical.
pub type EnvMap = BTreeMap<String, String>;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Application ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    #[default]
    Deploying,
    Running,
    Stopped,
    Failed,
    Scaling,
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppStatus::Deploying => "deploying",
            AppStatus::Running => "running",
            AppStatus::Stopped => "stopped",
            AppStatus::Failed => "failed",
            AppStatus::Scaling => "scaling",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    #[default]
    Dockerfile,
    Nixpacks,
    Paketo,
    /// Deployed from a prebuilt image reference.
    Image,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    pub vpc: String,
    #[serde(default)]
    pub status: AppStatus,
    pub instances: u32,
    #[serde(default)]
    pub build_type: BuildType,
    #[serde(default)]
    pub buildpack: String,
    #[serde(default)]
    pub dockerfile_path: String,

    /// Container ids in instance order; position `i` is instance `i + 1`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub container_ids: Vec<String>,
    /// Last deployed image reference.
    #[serde(default)]
    pub image_id: String,

    /// MB per instance.
    pub memory: u32,
    /// Cores per instance.
    pub cpu: f64,
    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub internal_hostname: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub published_url: String,
    #[serde(default)]
    pub published_domain: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub custom_domains: Vec<String>,
    #[serde(default)]
    pub published_port: u16,
    #[serde(default)]
    pub ssl_enabled: bool,
    #[serde(default)]
    pub ssl_cert_issuer: String,
    #[serde(default)]
    pub ssl_cert_expiry: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub linked_databases: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,

    #[serde(default)]
    pub health_check_path: String,
    #[serde(default)]
    pub health_check_interval: u32,
    #[serde(default)]
    pub health_check_timeout: u32,

    #[serde(default, deserialize_with = "null_as_default")]
    pub env_vars: EnvMap,

    #[serde(default)]
    pub deployment_strategy: StrategyKind,
    #[serde(default)]
    pub deployment_config: DeploymentConfig,
    #[serde(default)]
    pub deployment_state: DeploymentState,
    #[serde(default, deserialize_with = "null_as_default")]
    pub deployment_history: Vec<DeploymentRecord>,

    #[serde(default)]
    pub source_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_deployed_at: Option<DateTime<Utc>>,
}

impl Application {
    /// A fresh app record with controller defaults; not yet deployed.
    pub fn new(id: String, name: &str, vpc: &str, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.to_string(),
            vpc: vpc.to_string(),
            status: AppStatus::Deploying,
            instances: 1,
            build_type: BuildType::Dockerfile,
            buildpack: String::new(),
            dockerfile_path: String::new(),
            container_ids: Vec::new(),
            image_id: String::new(),
            memory: 512,
            cpu: 0.5,
            port: 0,
            internal_hostname: naming::app_hostname(name),
            published: false,
            published_url: naming::local_url(name),
            published_domain: String::new(),
            custom_domains: Vec::new(),
            published_port: 0,
            ssl_enabled: false,
            ssl_cert_issuer: String::new(),
            ssl_cert_expiry: String::new(),
            linked_databases: Vec::new(),
            volumes: Vec::new(),
            health_check_path: "/health".to_string(),
            health_check_interval: 10,
            health_check_timeout: 5,
            env_vars: EnvMap::new(),
            deployment_strategy: StrategyKind::Recreate,
            deployment_config: DeploymentConfig::default(),
            deployment_state: DeploymentState::default(),
            deployment_history: Vec::new(),
            source_path: String::new(),
            created_at: now,
            updated_at: now,
            last_deployed_at: None,
        }
    }

    pub fn volume(&self, name: &str) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.name == name)
    }

    pub fn is_linked_to(&self, db: &str) -> bool {
        self.linked_databases.iter().any(|d| d == db)
    }

    /// The single record with status `active`, if any.
    pub fn active_record(&self) -> Option<&DeploymentRecord> {
        self.deployment_history
            .iter()
            .find(|r| r.status == RecordStatus::Active)
    }

    /// Append an `active` record, demoting prior active records to
    /// `superseded`.
    pub fn record_deployment(&mut self, image: &str, now: DateTime<Utc>) {
        self.demote_active(RecordStatus::Superseded);
        self.push_active_record(image, now);
    }

    /// Append an `active` record after a rollback, marking the previously
    /// active record `rolled-back`.
    pub fn record_rollback(&mut self, image: &str, now: DateTime<Utc>) {
        self.demote_active(RecordStatus::RolledBack);
        self.push_active_record(image, now);
    }

    fn demote_active(&mut self, to: RecordStatus) {
        for record in &mut self.deployment_history {
            if record.status == RecordStatus::Active {
                record.status = to;
            }
        }
    }

    fn push_active_record(&mut self, image: &str, now: DateTime<Utc>) {
        self.deployment_history.push(DeploymentRecord {
            id: naming::deployment_record_id(now),
            image_id: image.to_string(),
            strategy: self.deployment_strategy,
            deployed_at: now,
            status: RecordStatus::Active,
        });
    }

    /// Every domain the proxy routes for a published app, primary first.
    pub fn routed_domains(&self) -> Vec<String> {
        let mut domains = Vec::with_capacity(1 + self.custom_domains.len());
        if !self.published_domain.is_empty() {
            domains.push(self.published_domain.clone());
        }
        domains.extend(self.custom_domains.iter().cloned());
        domains
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub max_surge: u32,
    /// Seconds between rolling batches.
    pub rolling_interval: u32,
    /// Seconds each new instance has to pass its health check.
    pub health_timeout: u32,
    #[serde(default)]
    pub auto_confirm: bool,
    #[serde(default)]
    pub confirmation_timeout: u32,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            max_surge: 1,
            rolling_interval: 5,
            health_timeout: 30,
            auto_confirm: false,
            confirmation_timeout: 300,
        }
    }
}

// ── Blue-green state ───────────────────────────────────────────────

/// Blue-green bookkeeping; inert for other strategies.
///
/// On disk `active` is `"blue"`, `"green"`, or `"default"` and `standby` is
/// `"blue"`, `"green"`, or `""`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    #[serde(with = "active_color", default)]
    pub active: Option<Color>,
    #[serde(with = "standby_color", default)]
    pub standby: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blue: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub green: Option<Environment>,
}

impl DeploymentState {
    pub fn environment(&self, color: Color) -> Option<&Environment> {
        match color {
            Color::Blue => self.blue.as_ref(),
            Color::Green => self.green.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, color: Color) -> &mut Option<Environment> {
        match color {
            Color::Blue => &mut self.blue,
            Color::Green => &mut self.green,
        }
    }

    /// Standby color whose environment still holds containers.
    pub fn live_standby(&self) -> Option<(Color, &Environment)> {
        let color = self.standby?;
        self.environment(color)
            .filter(|env| !env.container_ids.is_empty())
            .map(|env| (color, env))
    }
}

mod active_color {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<Color>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.map(|c| c.as_str()).unwrap_or("default"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Color>, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        match raw.as_str() {
            "" | "default" => Ok(None),
            other => other.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

mod standby_color {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<Color>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.map(|c| c.as_str()).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Color>, D::Error> {
        super::active_color::deserialize(d)
    }
}

/// Snapshot of one color's fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default, deserialize_with = "null_as_default")]
    pub container_ids: Vec<String>,
    pub image_id: String,
    pub deployed_at: DateTime<Utc>,
}

// ── Deployment history ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    Active,
    Superseded,
    RolledBack,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordStatus::Active => "active",
            RecordStatus::Superseded => "superseded",
            RecordStatus::RolledBack => "rolled-back",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub image_id: String,
    pub strategy: StrategyKind,
    pub deployed_at: DateTime<Utc>,
    pub status: RecordStatus,
}

// ── Volumes ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeType {
    #[default]
    Volume,
    Bind,
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VolumeType::Volume => "volume",
            VolumeType::Bind => "bind",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub mount_path: String,
    #[serde(rename = "type", default)]
    pub kind: VolumeType,
    /// Host path; only for bind mounts.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub size: String,
    pub created_at: DateTime<Utc>,
}

impl Volume {
    /// Engine-side source of the mount: the derived volume name, or the
    /// operator's host path for binds.
    pub fn mount_source(&self, app: &str) -> String {
        match self.kind {
            VolumeType::Volume => naming::app_volume_name(app, &self.name),
            VolumeType::Bind => self.source.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeBackup {
    pub id: String,
    pub app_name: String,
    pub volume_name: String,
    pub file_path: String,
    pub size: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: String,
}

// ── Databases ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Postgres,
    Valkey,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Postgres => "postgres",
            DbType::Valkey => "valkey",
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DbType {
    type Err = nap_core::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" | "postgresql" | "pg" => Ok(DbType::Postgres),
            "valkey" | "redis" => Ok(DbType::Valkey),
            other => Err(nap_core::CoreError::Validation(format!(
                "unsupported database type '{other}' (must be postgres or valkey)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbStatus {
    #[default]
    Creating,
    Running,
    Stopped,
    Error,
}

impl fmt::Display for DbStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DbStatus::Creating => "creating",
            DbStatus::Running => "running",
            DbStatus::Stopped => "stopped",
            DbStatus::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DbType,
    #[serde(default)]
    pub container_id: String,
    #[serde(default)]
    pub container_name: String,
    #[serde(default)]
    pub volume_name: String,
    /// Engine network name of the owning VPC.
    #[serde(default)]
    pub network: String,
    /// Host port when published, otherwise the internal port.
    #[serde(default)]
    pub port: u16,
    pub internal_port: u16,
    /// Internal hostname on the VPC network.
    #[serde(default)]
    pub host: String,
    pub username: String,
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub connection_string: String,
    pub vpc: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub published_port: u16,
    #[serde(default)]
    pub internal_hostname: String,
    #[serde(default)]
    pub published_connection_string: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub linked_apps: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status: DbStatus,
}

impl Database {
    pub fn is_linked_to(&self, app: &str) -> bool {
        self.linked_apps.iter().any(|a| a == app)
    }
}

// ── VPCs ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vpc {
    pub name: String,
    pub network_id: String,
    pub network_name: String,
    /// `172.X.0.0/16`
    pub subnet: String,
    pub created_at: DateTime<Utc>,
    /// Attached database ids.
    #[serde(default, deserialize_with = "null_as_default")]
    pub databases: Vec<String>,
    /// Attached app ids.
    #[serde(default, deserialize_with = "null_as_default")]
    pub apps: Vec<String>,
}

impl Vpc {
    pub fn is_empty(&self) -> bool {
        self.databases.is_empty() && self.apps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-02T03:04:05.123456789Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn new_app_defaults() {
        let app = Application::new("app-0011223344556677".into(), "web", "primary", now());
        assert_eq!(app.internal_hostname, "nap-app-web");
        assert_eq!(app.published_url, "http://web.nap.local");
        assert_eq!(app.deployment_state.active, None);
        assert_eq!(app.deployment_config.confirmation_timeout, 300);
    }

    #[test]
    fn at_most_one_active_record() {
        let mut app = Application::new("app-1".into(), "web", "primary", now());
        app.record_deployment("img:1", now());
        app.record_deployment("img:2", now());
        app.record_rollback("img:1", now());

        let active: Vec<_> = app
            .deployment_history
            .iter()
            .filter(|r| r.status == RecordStatus::Active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].image_id, "img:1");
        assert_eq!(app.deployment_history[0].status, RecordStatus::Superseded);
        assert_eq!(app.deployment_history[1].status, RecordStatus::RolledBack);
    }

    #[test]
    fn deployment_state_wire_format() {
        let state = DeploymentState {
            active: Some(Color::Green),
            standby: None,
            blue: None,
            green: Some(Environment {
                container_ids: vec!["c1".into()],
                image_id: "img".into(),
                deployed_at: now(),
            }),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["active"], "green");
        assert_eq!(json["standby"], "");
        assert!(json.get("blue").is_none());
        assert_eq!(json["green"]["deployed_at"], "2026-01-02T03:04:05.123456789Z");

        let empty: DeploymentState =
            serde_json::from_str(r#"{"active":"default","standby":""}"#).unwrap();
        assert_eq!(empty.active, None);
        assert_eq!(empty.standby, None);
    }

    #[test]
    fn null_lists_deserialize_as_empty() {
        let json = r#"{
            "name": "primary",
            "network_id": "abc",
            "network_name": "primary.nap-vpc-network",
            "subnet": "172.20.0.0/16",
            "created_at": "2026-01-02T03:04:05Z",
            "databases": null,
            "apps": null
        }"#;
        let vpc: Vpc = serde_json::from_str(json).unwrap();
        assert!(vpc.is_empty());
    }

    #[test]
    fn volume_sources() {
        let mut vol = Volume {
            name: "data".into(),
            mount_path: "/data".into(),
            kind: VolumeType::Volume,
            source: String::new(),
            read_only: false,
            size: String::new(),
            created_at: now(),
        };
        assert_eq!(vol.mount_source("web"), "nap-vol-web-data");
        vol.kind = VolumeType::Bind;
        vol.source = "/srv/data".into();
        assert_eq!(vol.mount_source("web"), "/srv/data");

        let json = serde_json::to_value(&vol).unwrap();
        assert_eq!(json["type"], "bind");
        assert!(json.get("read_only").is_none());
    }

    #[test]
    fn routed_domains_primary_first() {
        let mut app = Application::new("app-1".into(), "web", "primary", now());
        app.published_domain = "web.nap.example.com".into();
        app.custom_domains = vec!["www.example.com".into()];
        assert_eq!(
            app.routed_domains(),
            vec!["web.nap.example.com".to_string(), "www.example.com".to_string()]
        );
    }
}
