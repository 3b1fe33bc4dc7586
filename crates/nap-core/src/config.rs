//! Configuration files.
//!
//! - `~/.nap/config.toml` ([`GlobalConfig`]): runtime preference and
//!   publishing settings, written by `nap config setup`.
//! - `nap.toml` ([`ProjectConfig`]): per-source-tree deploy defaults, read by
//!   `nap app deploy` and scaffolded by `nap init`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;
use crate::error::{CoreError, CoreResult};
use crate::types::StrategyKind;
use crate::validation;

/// App port when neither flags, the project file nor the image name one.
pub const DEFAULT_APP_PORT: u16 = 3000;

/// File name of the per-project config.
pub const PROJECT_FILE: &str = "nap.toml";

// ── Global config ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub runtime: RuntimeSection,
    pub publishing: PublishingSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// "docker" or "podman"; empty means auto-detect.
    pub prefer: String,
    pub auto_start: bool,
    /// Explicit engine socket, bypassing detection.
    pub socket_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishingSection {
    pub enabled: bool,
    pub base_domain: String,
    pub email: String,
}

impl GlobalConfig {
    /// Load the config, treating a missing file as defaults.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(CoreError::io(path, e)),
        };
        toml::from_str(&content).map_err(|source| CoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        write_atomic(path, self.to_toml_string()?.as_bytes())
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Publishing must be enabled with a base domain and an ACME email.
    pub fn validate_publishing(&self) -> CoreResult<()> {
        let p = &self.publishing;
        if !p.enabled {
            return Err(CoreError::Validation(
                "publishing is not enabled; run 'nap config setup' first".into(),
            ));
        }
        if p.base_domain.is_empty() {
            return Err(CoreError::Validation("base_domain not configured".into()));
        }
        if p.email.is_empty() {
            return Err(CoreError::Validation("email not configured".into()));
        }
        Ok(())
    }

    /// Email registered with the ACME resolver.
    pub fn acme_email(&self) -> &str {
        if self.publishing.enabled && !self.publishing.email.is_empty() {
            &self.publishing.email
        } else {
            "nap@localhost"
        }
    }
}

// ── Project config (nap.toml) ──────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub app: AppSection,
    pub build: BuildSection,
    pub deploy: DeploySection,
    pub deployment: DeploymentSection,
    pub env: BTreeMap<String, String>,
    /// Volume name → mount path.
    pub volumes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    pub runtime: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    pub dockerfile: Option<String>,
    pub buildpacks: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySection {
    pub instances: Option<u32>,
    /// "512M", "1G", "256".
    pub memory: Option<String>,
    pub cpu: Option<f64>,
    pub port: Option<u16>,
    pub health_check: HealthCheckSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckSection {
    pub path: Option<String>,
    pub interval: Option<u32>,
    pub timeout: Option<u32>,
    pub retries: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentSection {
    pub strategy: Option<String>,
    pub max_surge: Option<u32>,
    pub rolling_interval: Option<u32>,
    pub health_timeout: Option<u32>,
    pub auto_confirm: Option<bool>,
    pub confirmation_timeout: Option<u32>,
}

impl ProjectConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        let config: ProjectConfig = toml::from_str(&content).map_err(|source| CoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `nap.toml` from a source directory if it exists.
    pub fn load_if_exists(dir: &Path) -> CoreResult<Option<Self>> {
        let path = dir.join(PROJECT_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        Self::from_file(&path).map(Some)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.strategy()?;
        self.memory_mb()?;
        if let Some(n) = self.deploy.instances {
            validation::validate_instances(n)?;
        }
        if let Some(cpu) = self.deploy.cpu {
            validation::validate_cpu(cpu)?;
        }
        if let Some(path) = &self.deploy.health_check.path {
            validation::validate_health_path(path)?;
        }
        for name in self.volumes.keys() {
            validation::validate_name("volume", name)?;
        }
        Ok(())
    }

    // Accessors below fold in the project-file defaults.

    pub fn instances(&self) -> u32 {
        self.deploy.instances.unwrap_or(1)
    }

    pub fn memory_mb(&self) -> CoreResult<u32> {
        parse_memory(self.deploy.memory.as_deref().unwrap_or("512M"))
    }

    pub fn cpu(&self) -> f64 {
        self.deploy.cpu.unwrap_or(0.5)
    }

    pub fn port(&self) -> u16 {
        self.deploy.port.unwrap_or(DEFAULT_APP_PORT)
    }

    pub fn health_path(&self) -> String {
        self.deploy
            .health_check
            .path
            .clone()
            .unwrap_or_else(|| "/health".to_string())
    }

    pub fn health_interval(&self) -> u32 {
        self.deploy.health_check.interval.unwrap_or(10)
    }

    pub fn health_timeout(&self) -> u32 {
        self.deploy.health_check.timeout.unwrap_or(5)
    }

    pub fn health_retries(&self) -> u32 {
        self.deploy.health_check.retries.unwrap_or(3)
    }

    pub fn strategy(&self) -> CoreResult<StrategyKind> {
        match &self.deployment.strategy {
            Some(s) => s.parse(),
            None => Ok(StrategyKind::Recreate),
        }
    }

    pub fn max_surge(&self) -> u32 {
        self.deployment.max_surge.unwrap_or(1)
    }

    pub fn rolling_interval(&self) -> u32 {
        self.deployment.rolling_interval.unwrap_or(5)
    }

    pub fn rollout_health_timeout(&self) -> u32 {
        self.deployment.health_timeout.unwrap_or(30)
    }

    pub fn auto_confirm(&self) -> bool {
        self.deployment.auto_confirm.unwrap_or(false)
    }

    pub fn confirmation_timeout(&self) -> u32 {
        self.deployment.confirmation_timeout.unwrap_or(300)
    }

    /// Scaffold the `nap.toml` written by `nap init`.
    pub fn scaffold(name: &str) -> Self {
        ProjectConfig {
            app: AppSection {
                name: Some(name.to_string()),
                runtime: None,
            },
            build: BuildSection {
                dockerfile: Some("Dockerfile".to_string()),
                buildpacks: None,
            },
            deploy: DeploySection {
                instances: Some(1),
                memory: Some("512M".to_string()),
                cpu: Some(0.5),
                port: Some(3000),
                health_check: HealthCheckSection {
                    path: Some("/health".to_string()),
                    interval: Some(10),
                    timeout: Some(5),
                    retries: Some(3),
                },
            },
            deployment: DeploymentSection {
                strategy: Some(StrategyKind::Recreate.to_string()),
                max_surge: Some(1),
                rolling_interval: Some(5),
                health_timeout: Some(30),
                auto_confirm: Some(false),
                confirmation_timeout: Some(300),
            },
            env: BTreeMap::new(),
            volumes: BTreeMap::new(),
        }
    }
}

/// Parse a memory size into MB. Bare numbers are MB; `K`, `M`, `G` (with an
/// optional `B`) scale accordingly.
pub fn parse_memory(input: &str) -> CoreResult<u32> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| CoreError::Validation(format!("invalid memory size '{input}'")))?;

    let mb = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "M" | "MB" => value,
        "G" | "GB" => value * 1024,
        "K" | "KB" => value / 1024,
        _ => {
            return Err(CoreError::Validation(format!(
                "invalid memory unit in '{input}' (use K, M, or G)"
            )));
        }
    };
    let mb = u32::try_from(mb)
        .map_err(|_| CoreError::Validation(format!("memory size '{input}' is too large")))?;
    validation::validate_memory(mb)?;
    Ok(mb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_global_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GlobalConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(cfg, GlobalConfig::default());
        assert_eq!(cfg.acme_email(), "nap@localhost");
    }

    #[test]
    fn global_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = GlobalConfig::default();
        cfg.publishing = PublishingSection {
            enabled: true,
            base_domain: "example.com".into(),
            email: "ops@example.com".into(),
        };
        cfg.save(&path).unwrap();

        let loaded = GlobalConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert!(loaded.validate_publishing().is_ok());
        assert_eq!(loaded.acme_email(), "ops@example.com");
    }

    #[test]
    fn publishing_requires_every_field() {
        let mut cfg = GlobalConfig::default();
        assert!(cfg.validate_publishing().is_err());
        cfg.publishing.enabled = true;
        cfg.publishing.base_domain = "example.com".into();
        let err = cfg.validate_publishing().unwrap_err();
        assert_eq!(err.to_string(), "email not configured");
    }

    #[test]
    fn parse_partial_project() {
        let cfg: ProjectConfig = toml::from_str(
            r#"
[app]
name = "web"

[deploy]
instances = 3
memory = "1G"

[deploy.health_check]
path = "/ready"

[deployment]
strategy = "rolling"

[env]
NODE_ENV = "production"

[volumes]
data = "/var/lib/data"
"#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.instances(), 3);
        assert_eq!(cfg.memory_mb().unwrap(), 1024);
        assert_eq!(cfg.port(), 3000);
        assert_eq!(cfg.health_path(), "/ready");
        assert_eq!(cfg.health_interval(), 10);
        assert_eq!(cfg.strategy().unwrap(), StrategyKind::Rolling);
        assert_eq!(cfg.rollout_health_timeout(), 30);
        assert_eq!(cfg.env["NODE_ENV"], "production");
        assert_eq!(cfg.volumes["data"], "/var/lib/data");
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let cfg: ProjectConfig = toml::from_str("[deployment]\nstrategy = \"canary\"\n").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn memory_units() {
        assert_eq!(parse_memory("512").unwrap(), 512);
        assert_eq!(parse_memory("512M").unwrap(), 512);
        assert_eq!(parse_memory("256mb").unwrap(), 256);
        assert_eq!(parse_memory("2G").unwrap(), 2048);
        assert_eq!(parse_memory("2048KB").unwrap(), 2);
        assert!(parse_memory("lots").is_err());
        assert!(parse_memory("12T").is_err());
        assert!(parse_memory("0").is_err());
    }

    #[test]
    fn scaffold_is_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let rendered = ProjectConfig::scaffold("web").to_toml_string().unwrap();
        std::fs::write(dir.path().join(PROJECT_FILE), &rendered).unwrap();

        let loaded = ProjectConfig::load_if_exists(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.app.name.as_deref(), Some("web"));
        assert_eq!(loaded.strategy().unwrap(), StrategyKind::Recreate);
    }

    #[test]
    fn absent_project_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectConfig::load_if_exists(dir.path()).unwrap().is_none());
    }
}
