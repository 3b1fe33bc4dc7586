//! The deploy pipeline behind `nap app deploy`.
//!
//! Lock, resolve the image, make sure the proxy and VPC exist, merge the
//! request into the app record, run the app's strategy, then commit. A
//! failed deploy of a new app leaves no record; a failed redeploy marks the
//! app `failed` and keeps its previous fleet.

use std::path::PathBuf;

use chrono::Utc;
use nap_core::config::{DEFAULT_APP_PORT, ProjectConfig};
use nap_core::naming::{DEFAULT_VPC, build_tag, new_app_id, vpc_network_name};
use nap_core::validation::{
    validate_cpu, validate_health_path, validate_instances, validate_memory, validate_name,
};
use nap_core::StrategyKind;
use nap_engine::{Engine, Progress, build_context, ensure_image};
use nap_health::Prober;
use nap_proxy::proxy_labels;
use nap_rollout::{DeploymentOptions, Strategy};
use nap_state::{AppStatus, Application, BuildType, INTERACTIVE_LOCK_TIMEOUT, Volume, VolumeType};
use tracing::{info, warn};

use crate::context::{Context, surviving};
use crate::error::{ControlError, ControlResult};
use crate::volumes::ensure_engine_volume;
use crate::vpcs::{attach_app, detach_app, ensure_vpc};

/// Values given explicitly on the command line. `None` means "not given".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploySettings {
    pub vpc: Option<String>,
    pub instances: Option<u32>,
    pub memory_mb: Option<u32>,
    pub cpu: Option<f64>,
    pub port: Option<u16>,
    pub health_path: Option<String>,
    pub strategy: Option<StrategyKind>,
    pub max_surge: Option<u32>,
    pub rolling_interval: Option<u32>,
    pub health_timeout: Option<u32>,
    pub auto_confirm: Option<bool>,
}

impl DeploySettings {
    pub fn validate(&self) -> ControlResult<()> {
        if let Some(vpc) = &self.vpc {
            validate_name("vpc", vpc)?;
        }
        if let Some(n) = self.instances {
            validate_instances(n)?;
        }
        if let Some(mb) = self.memory_mb {
            validate_memory(mb)?;
        }
        if let Some(cpu) = self.cpu {
            validate_cpu(cpu)?;
        }
        if let Some(path) = &self.health_path {
            validate_health_path(path)?;
        }
        if self.max_surge == Some(0) {
            return Err(ControlError::Validation("max-surge must be at least 1".into()));
        }
        Ok(())
    }

    /// Fill every field the flags left out from the project file.
    fn with_project_defaults(&self, project: &ProjectConfig) -> ControlResult<DeploySettings> {
        Ok(DeploySettings {
            vpc: self.vpc.clone(),
            instances: self.instances.or(Some(project.instances())),
            memory_mb: match self.memory_mb {
                Some(mb) => Some(mb),
                None => Some(project.memory_mb()?),
            },
            cpu: self.cpu.or(Some(project.cpu())),
            port: self.port.or(Some(project.port())),
            health_path: self.health_path.clone().or_else(|| Some(project.health_path())),
            strategy: match self.strategy {
                Some(s) => Some(s),
                None => Some(project.strategy()?),
            },
            max_surge: self.max_surge.or(Some(project.max_surge())),
            rolling_interval: self.rolling_interval.or(Some(project.rolling_interval())),
            health_timeout: self.health_timeout.or(Some(project.rollout_health_timeout())),
            auto_confirm: self.auto_confirm.or(Some(project.auto_confirm())),
        })
    }

    /// Overwrite the fields of `app` that are set here.
    fn apply(&self, app: &mut Application) {
        if let Some(vpc) = &self.vpc {
            app.vpc = vpc.clone();
        }
        if let Some(n) = self.instances {
            app.instances = n;
        }
        if let Some(mb) = self.memory_mb {
            app.memory = mb;
        }
        if let Some(cpu) = self.cpu {
            app.cpu = cpu;
        }
        if let Some(port) = self.port {
            app.port = port;
        }
        if let Some(path) = &self.health_path {
            app.health_check_path = path.clone();
        }
        if let Some(strategy) = self.strategy {
            app.deployment_strategy = strategy;
        }
        let cfg = &mut app.deployment_config;
        if let Some(n) = self.max_surge {
            cfg.max_surge = n;
        }
        if let Some(n) = self.rolling_interval {
            cfg.rolling_interval = n;
        }
        if let Some(n) = self.health_timeout {
            cfg.health_timeout = n;
        }
        if let Some(b) = self.auto_confirm {
            cfg.auto_confirm = b;
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub name: String,
    /// Source directory; holds `nap.toml` and the Dockerfile.
    pub source: PathBuf,
    /// Deploy this image instead of building `source`.
    pub image: Option<String>,
    pub settings: DeploySettings,
}

impl DeployRequest {
    pub fn new(name: &str, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            source: source.into(),
            image: None,
            settings: DeploySettings::default(),
        }
    }

    pub fn with_image(mut self, image: &str) -> Self {
        self.image = Some(image.to_string());
        self
    }
}

pub async fn deploy<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    req: &DeployRequest,
    progress: Progress<'_>,
) -> ControlResult<Application> {
    validate_name("app", &req.name)?;
    req.settings.validate()?;
    if !req.source.is_dir() {
        return Err(ControlError::Validation(format!(
            "source path {} is not a directory",
            req.source.display()
        )));
    }
    let project = ProjectConfig::load_if_exists(&req.source)?.unwrap_or_default();
    if let Some(file_name) = &project.app.name {
        if file_name != &req.name {
            warn!(app = %req.name, project = %file_name, "nap.toml names a different app");
        }
    }

    let _lock = ctx.lock_app(&req.name, INTERACTIVE_LOCK_TIMEOUT).await?;
    let existing = ctx.registries.apps.find(&req.name)?;
    let now = Utc::now();

    let mut app = match &existing {
        Some(stored) => {
            let mut app = stored.clone();
            req.settings.apply(&mut app);
            app
        }
        None => {
            let settings = req.settings.with_project_defaults(&project)?;
            let vpc = settings.vpc.as_deref().unwrap_or(DEFAULT_VPC);
            let mut app = Application::new(new_app_id()?, &req.name, vpc, now);
            settings.apply(&mut app);
            app.health_check_interval = project.health_interval();
            app.health_check_timeout = project.health_timeout();
            app.deployment_config.confirmation_timeout = project.confirmation_timeout();
            app
        }
    };
    app.status = AppStatus::Deploying;
    app.source_path = req.source.display().to_string();
    for (key, value) in &project.env {
        app.env_vars.entry(key.clone()).or_insert_with(|| value.clone());
    }

    let image = resolve_image(ctx, req, &project, &mut app, progress).await?;
    if app.port == 0 {
        let inspect = ctx.engine.inspect_image(&image).await?;
        app.port = inspect.single_exposed_port().unwrap_or(DEFAULT_APP_PORT);
        info!(app = %app.name, port = app.port, "app port detected");
    }

    let proxy = ctx.proxy();
    proxy.ensure_running(progress).await?;
    let vpc = ensure_vpc(ctx, &app.vpc).await?;
    proxy.connect_to_network(&vpc_network_name(&vpc.name)).await?;

    for (name, mount_path) in &project.volumes {
        if app.volume(name).is_some() {
            continue;
        }
        let volume = Volume {
            name: name.clone(),
            mount_path: mount_path.clone(),
            kind: VolumeType::Volume,
            source: String::new(),
            read_only: false,
            size: String::new(),
            created_at: now,
        };
        ensure_engine_volume(&ctx.engine, &app, &volume).await?;
        app.volumes.push(volume);
    }

    if let Some(stored) = &existing {
        let mut marked = stored.clone();
        marked.status = AppStatus::Deploying;
        ctx.save_app(&mut marked)?;
    }

    let strategy = Strategy::from_app(&app);
    let opts = DeploymentOptions::for_app(app.clone(), &image, proxy_labels(&app));
    let outcome = ctx.deployer().deploy(&strategy, opts).await;

    match outcome {
        Ok(done) => {
            let mut app = done.app;
            app.status = AppStatus::Running;
            app.image_id = done.image.clone();
            app.last_deployed_at = Some(now);
            app.record_deployment(&done.image, now);
            app.updated_at = Utc::now();

            match &existing {
                Some(stored) => {
                    ctx.registries.apps.update(&app)?;
                    if stored.vpc != app.vpc {
                        detach_app(ctx, &stored.vpc, &app.id).await?;
                    }
                }
                None => ctx.registries.apps.add(app.clone())?,
            }
            attach_app(ctx, &app.vpc, &app.id).await?;
            info!(app = %app.name, image = %done.image, instances = app.container_ids.len(), "deployed");
            Ok(app)
        }
        Err(e) => {
            if let Some(stored) = &existing {
                let mut failed = stored.clone();
                failed.status = AppStatus::Failed;
                failed.container_ids = surviving(&ctx.engine, &stored.container_ids).await;
                if let Err(save) = ctx.save_app(&mut failed) {
                    warn!(app = %failed.name, error = %save, "failed to record deploy failure");
                }
            }
            Err(e.into())
        }
    }
}

/// Pull `--image` or build the source directory; returns the image
/// reference to run.
async fn resolve_image<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    req: &DeployRequest,
    project: &ProjectConfig,
    app: &mut Application,
    progress: Progress<'_>,
) -> ControlResult<String> {
    if let Some(image) = &req.image {
        ensure_image(&ctx.engine, image, progress).await?;
        app.build_type = BuildType::Image;
        return Ok(image.clone());
    }

    let dockerfile = project.build.dockerfile.as_deref().unwrap_or("Dockerfile");
    if !req.source.join(dockerfile).is_file() {
        return Err(ControlError::Validation(format!(
            "no {dockerfile} in {}; add one or deploy a prebuilt image with --image",
            req.source.display()
        )));
    }
    let tag = build_tag(&app.name, Utc::now());
    progress(&format!("building {tag}"));
    let context = build_context(&req.source)?;
    let id = ctx.engine.build_image(context, dockerfile, &tag, progress).await?;
    info!(app = %app.name, tag = %tag, image_id = %id, "image built");
    app.build_type = BuildType::Dockerfile;
    app.dockerfile_path = dockerfile.to_string();
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_win_over_project_file() {
        let project: ProjectConfig = toml::from_str(
            r#"
            [deploy]
            instances = 3
            memory = "1G"
            port = 8080

            [deployment]
            strategy = "rolling"
            "#,
        )
        .unwrap();
        let flags = DeploySettings {
            instances: Some(2),
            ..Default::default()
        };
        let merged = flags.with_project_defaults(&project).unwrap();
        assert_eq!(merged.instances, Some(2));
        assert_eq!(merged.memory_mb, Some(1024));
        assert_eq!(merged.port, Some(8080));
        assert_eq!(merged.strategy, Some(StrategyKind::Rolling));
        assert_eq!(merged.health_path.as_deref(), Some("/health"));
        assert_eq!(merged.rolling_interval, Some(5));
    }

    #[test]
    fn apply_only_touches_given_fields() {
        let mut app = Application::new("app-1".into(), "web", "primary", Utc::now());
        app.port = 9000;
        DeploySettings {
            instances: Some(4),
            strategy: Some(StrategyKind::BlueGreen),
            ..Default::default()
        }
        .apply(&mut app);
        assert_eq!(app.instances, 4);
        assert_eq!(app.port, 9000);
        assert_eq!(app.deployment_strategy, StrategyKind::BlueGreen);
    }

    #[test]
    fn settings_validation() {
        let bad = DeploySettings {
            cpu: Some(0.0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let surge = DeploySettings {
            max_surge: Some(0),
            ..Default::default()
        };
        assert_eq!(surge.validate().unwrap_err().kind(), nap_core::ErrorKind::Validation);
    }
}
