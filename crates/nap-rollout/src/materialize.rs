//! Translation of app records into engine container specs, and in-place
//! container replacement.

use nap_core::naming::{env as nap_env, labels, vpc_network_name};
use nap_core::Color;
use nap_engine::models::{ContainerConfig, ContainerInspect, HostConfig, Labels, Mount};
use nap_engine::{Engine, short_id};
use nap_state::{Application, VolumeType};
use tracing::{debug, info, warn};

use crate::error::{DeployError, DeployResult};
use crate::strategy::{DeploymentOptions, Timing};

const MIB: i64 = 1024 * 1024;
const NANO_CPUS_PER_CORE: f64 = 1e9;

/// Fixed inputs for every container of one app generation.
#[derive(Debug, Clone, Copy)]
pub struct InstanceTemplate<'a> {
    pub app: &'a Application,
    pub vpc: &'a str,
    pub image: &'a str,
    pub proxy_labels: &'a Labels,
    pub memory_mb: u32,
    pub cpu: f64,
}

impl<'a> InstanceTemplate<'a> {
    pub fn from_options(opts: &'a DeploymentOptions) -> Self {
        Self {
            app: &opts.app,
            vpc: &opts.vpc,
            image: &opts.image,
            proxy_labels: &opts.proxy_labels,
            memory_mb: opts.memory_mb,
            cpu: opts.cpu,
        }
    }

    /// The app's current image and resources.
    pub fn for_app(app: &'a Application, proxy_labels: &'a Labels) -> Self {
        Self {
            app,
            vpc: &app.vpc,
            image: &app.image_id,
            proxy_labels,
            memory_mb: app.memory,
            cpu: app.cpu,
        }
    }

    /// Container spec for `instance` (1-based). Dark containers carry no
    /// routing labels.
    pub fn config(&self, instance: usize, color: Option<Color>, routed: bool) -> ContainerConfig {
        let mut container_labels = managed_labels(self.app, self.vpc, instance, color);
        if routed {
            container_labels.extend(self.proxy_labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        ContainerConfig {
            image: self.image.to_string(),
            env: instance_env(self.app, instance),
            labels: container_labels,
            host_config: HostConfig {
                memory: i64::from(self.memory_mb) * MIB,
                nano_cpus: (self.cpu * NANO_CPUS_PER_CORE) as i64,
                mounts: volume_mounts(self.app),
                ..HostConfig::unless_stopped()
            },
            ..Default::default()
        }
        .on_network(&vpc_network_name(self.vpc))
    }
}

/// Operator env plus the injected `NAP_*` metadata, as `KEY=value`.
pub fn instance_env(app: &Application, instance: usize) -> Vec<String> {
    let mut vars = app.env_vars.clone();
    vars.insert(nap_env::APP_ID.to_string(), app.id.clone());
    vars.insert(nap_env::INSTANCE_ID.to_string(), instance.to_string());
    vars.insert(nap_env::REGION.to_string(), nap_env::REGION_VALUE.to_string());
    vars.into_iter().map(|(k, v)| format!("{k}={v}")).collect()
}

pub fn managed_labels(app: &Application, vpc: &str, instance: usize, color: Option<Color>) -> Labels {
    let mut out = Labels::new();
    out.insert(labels::MANAGED.to_string(), "true".to_string());
    out.insert(labels::TYPE.to_string(), labels::TYPE_APP.to_string());
    out.insert(labels::APP_NAME.to_string(), app.name.clone());
    out.insert(labels::APP_ID.to_string(), app.id.clone());
    out.insert(labels::VPC.to_string(), vpc.to_string());
    out.insert(labels::APP_INSTANCE.to_string(), instance.to_string());
    if let Some(color) = color {
        out.insert(labels::APP_COLOR.to_string(), color.to_string());
    }
    out
}

pub fn volume_mounts(app: &Application) -> Vec<Mount> {
    app.volumes
        .iter()
        .map(|v| Mount {
            kind: match v.kind {
                VolumeType::Volume => "volume",
                VolumeType::Bind => "bind",
            }
            .to_string(),
            source: v.mount_source(&app.name),
            target: v.mount_path.clone(),
            read_only: v.read_only,
        })
        .collect()
}

/// Create and start one container; a container that fails to start is
/// removed again.
pub(crate) async fn start_instance<E: Engine>(
    engine: &E,
    name: &str,
    config: &ContainerConfig,
) -> DeployResult<String> {
    let id = engine
        .create_container(name, config)
        .await
        .map_err(|source| DeployError::Instance {
            container: name.to_string(),
            source,
        })?;
    if let Err(source) = engine.start_container(&id).await {
        if let Err(e) = engine.remove_container(&id, true).await {
            warn!(container = %name, error = %e, "failed to remove container that did not start");
        }
        return Err(DeployError::Instance {
            container: name.to_string(),
            source,
        });
    }
    debug!(container = %name, id = %short_id(&id), "instance started");
    Ok(id)
}

/// Instance number from the container's label, else `fallback`.
pub(crate) fn instance_of(inspect: &ContainerInspect, fallback: usize) -> usize {
    inspect
        .config
        .labels
        .get(labels::APP_INSTANCE)
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

pub(crate) fn color_of(inspect: &ContainerInspect) -> Option<Color> {
    inspect
        .config
        .labels
        .get(labels::APP_COLOR)
        .and_then(|v| v.parse().ok())
}

/// Stop and remove `inspect`'s container, then start `config` under the
/// same name.
async fn replace<E: Engine>(
    engine: &E,
    timing: &Timing,
    inspect: &ContainerInspect,
    config: &ContainerConfig,
) -> DeployResult<String> {
    if let Err(e) = engine.stop_container(&inspect.id, timing.stop_grace).await {
        if !e.is_not_found() {
            return Err(e.into());
        }
    }
    match engine.remove_container(&inspect.id, true).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.into()),
    }
    start_instance(engine, inspect.short_name(), config).await
}

/// Rebuild a container from the app record with fresh env, labels and
/// mounts, keeping its name, image, instance number and color.
///
/// Returns the new container id.
pub async fn recreate_container<E: Engine>(
    engine: &E,
    timing: &Timing,
    id: &str,
    template: &InstanceTemplate<'_>,
    fallback_instance: usize,
) -> DeployResult<String> {
    let inspect = engine.inspect_container(id).await?;
    let instance = instance_of(&inspect, fallback_instance);
    let image = if inspect.config.image.is_empty() {
        template.image
    } else {
        inspect.config.image.as_str()
    };
    let config = InstanceTemplate { image, ..*template }.config(instance, color_of(&inspect), true);
    let new_id = replace(engine, timing, &inspect, &config).await?;
    info!(container = %inspect.short_name(), instance, "container recreated");
    Ok(new_id)
}

/// Recreate every container of `app` in place, updating its id list as
/// containers are replaced.
pub async fn recreate_all<E: Engine>(
    engine: &E,
    timing: &Timing,
    app: &mut Application,
    proxy_labels: &Labels,
) -> DeployResult<()> {
    let snapshot = app.clone();
    let template = InstanceTemplate::for_app(&snapshot, proxy_labels);
    for (idx, id) in snapshot.container_ids.iter().enumerate() {
        let new_id = recreate_container(engine, timing, id, &template, idx + 1).await?;
        app.container_ids[idx] = new_id.clone();
        if let Some(color) = app.deployment_state.active {
            if let Some(env) = app.deployment_state.slot_mut(color).as_mut() {
                for slot in env.container_ids.iter_mut().filter(|c| c.as_str() == id.as_str()) {
                    *slot = new_id.clone();
                }
            }
        }
    }
    Ok(())
}

/// Replace a container keeping its image, env and mounts but with a new
/// label set: managed labels for `color` on the app's VPC, plus routing
/// labels if given.
pub async fn relabel_container<E: Engine>(
    engine: &E,
    timing: &Timing,
    id: &str,
    app: &Application,
    color: Color,
    proxy_labels: Option<&Labels>,
    fallback_instance: usize,
) -> DeployResult<String> {
    let inspect = engine.inspect_container(id).await?;
    let instance = instance_of(&inspect, fallback_instance);

    let mut container_labels = managed_labels(app, &app.vpc, instance, Some(color));
    if let Some(routes) = proxy_labels {
        container_labels.extend(routes.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let config = ContainerConfig {
        image: inspect.config.image.clone(),
        env: inspect.config.env.clone(),
        labels: container_labels,
        host_config: HostConfig {
            // Port bindings are never set on app containers.
            port_bindings: None,
            ..inspect.host_config.clone()
        },
        ..Default::default()
    }
    .on_network(&vpc_network_name(&app.vpc));

    replace(engine, timing, &inspect, &config).await
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use nap_engine::fake::FakeEngine;
    use nap_state::Volume;

    use super::*;

    fn app() -> Application {
        let mut app = Application::new("app-42".into(), "web", "primary", Utc::now());
        app.port = 8080;
        app.memory = 256;
        app.cpu = 0.5;
        app.image_id = "web:1".into();
        app.env_vars.insert("GREETING".into(), "hi".into());
        app.volumes.push(Volume {
            name: "data".into(),
            mount_path: "/data".into(),
            kind: VolumeType::Volume,
            source: String::new(),
            read_only: false,
            size: String::new(),
            created_at: Utc::now(),
        });
        app.volumes.push(Volume {
            name: "conf".into(),
            mount_path: "/etc/app".into(),
            kind: VolumeType::Bind,
            source: "/srv/conf".into(),
            read_only: true,
            size: String::new(),
            created_at: Utc::now(),
        });
        app
    }

    fn routes() -> Labels {
        let mut l = Labels::new();
        l.insert("traefik.enable".into(), "true".into());
        l
    }

    #[test]
    fn config_composition() {
        let app = app();
        let routes = routes();
        let cfg = InstanceTemplate::for_app(&app, &routes).config(2, Some(Color::Green), true);

        assert_eq!(cfg.image, "web:1");
        assert_eq!(
            cfg.env,
            vec!["GREETING=hi", "NAP_APP_ID=app-42", "NAP_INSTANCE_ID=2", "NAP_REGION=local"]
        );
        assert_eq!(cfg.labels[labels::APP_INSTANCE], "2");
        assert_eq!(cfg.labels[labels::APP_COLOR], "green");
        assert_eq!(cfg.labels[labels::VPC], "primary");
        assert_eq!(cfg.labels["traefik.enable"], "true");
        assert_eq!(cfg.host_config.memory, 256 * 1024 * 1024);
        assert_eq!(cfg.host_config.nano_cpus, 500_000_000);
        assert_eq!(cfg.network(), Some("primary.nap-vpc-network"));

        let mounts = &cfg.host_config.mounts;
        assert_eq!(mounts[0].kind, "volume");
        assert_eq!(mounts[0].source, "nap-vol-web-data");
        assert_eq!(mounts[1].kind, "bind");
        assert_eq!(mounts[1].source, "/srv/conf");
        assert!(mounts[1].read_only);

        let dark = InstanceTemplate::for_app(&app, &routes).config(1, None, false);
        assert!(!dark.labels.contains_key("traefik.enable"));
        assert!(!dark.labels.contains_key(labels::APP_COLOR));
    }

    #[tokio::test]
    async fn recreate_keeps_name_and_instance() {
        let engine = FakeEngine::new();
        let mut app = app();
        let routes = routes();
        let timing = Timing::default();
        let cfg = InstanceTemplate::for_app(&app, &Labels::new()).config(3, None, true);
        let id = start_instance(&engine, "nap-app-web-3", &cfg).await.unwrap();
        app.container_ids = vec![id.clone()];

        app.env_vars.insert("NEW".into(), "1".into());
        recreate_all(&engine, &timing, &mut app, &routes).await.unwrap();

        assert_ne!(app.container_ids[0], id);
        let c = engine.container("nap-app-web-3").unwrap();
        assert_eq!(c.id, app.container_ids[0]);
        assert_eq!(c.label(labels::APP_INSTANCE), Some("3"));
        assert!(c.config.env.contains(&"NEW=1".to_string()));
        assert_eq!(c.label("traefik.enable"), Some("true"));
        assert!(c.running);
    }

    #[tokio::test]
    async fn relabel_strips_routes() {
        let engine = FakeEngine::new();
        let app = app();
        let routes = routes();
        let cfg = InstanceTemplate::for_app(&app, &routes).config(1, Some(Color::Blue), true);
        let id = start_instance(&engine, "nap-app-web-blue-1", &cfg).await.unwrap();

        let new_id = relabel_container(&engine, &Timing::default(), &id, &app, Color::Blue, None, 1)
            .await
            .unwrap();
        let c = engine.container(&new_id).unwrap();
        assert_eq!(c.name, "nap-app-web-blue-1");
        assert_eq!(c.label("traefik.enable"), None);
        assert_eq!(c.label(labels::APP_COLOR), Some("blue"));
        assert_eq!(c.config.env, cfg.env);
    }

    #[tokio::test]
    async fn failed_start_leaves_nothing_behind() {
        let engine = FakeEngine::new();
        engine.fail_start("web");
        let app = app();
        let cfg = InstanceTemplate::for_app(&app, &Labels::new()).config(1, None, true);
        let err = start_instance(&engine, "nap-app-web-1", &cfg).await.unwrap_err();
        assert!(matches!(err, DeployError::Instance { .. }));
        assert!(engine.containers().is_empty());
    }
}
