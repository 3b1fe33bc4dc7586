//! Persistent storage attached to apps.
//!
//! Volume changes are recorded on the app and take effect the next time
//! its containers are created (deploy or restart).

use chrono::Utc;
use nap_core::naming::{app_volume_name, labels};
use nap_core::validation::validate_name;
use nap_engine::Engine;
use nap_engine::models::{Labels, VolumeCreate, VolumeInfo};
use nap_health::Prober;
use nap_state::{Application, LONG_LOCK_TIMEOUT, Volume, VolumeBackup, VolumeType};
use tracing::info;

use crate::context::Context;
use crate::error::{ControlError, ControlResult};

/// What `app volume add` asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSpec {
    pub name: String,
    pub mount_path: String,
    pub kind: VolumeType,
    /// Host path; required for bind mounts.
    pub source: Option<String>,
    pub read_only: bool,
    pub size: Option<String>,
}

/// Engine-side view of an app volume.
#[derive(Debug, Clone)]
pub struct VolumeReport {
    pub volume: Volume,
    /// Engine volume name, or the host path for binds.
    pub source: String,
    pub engine: Option<VolumeInfo>,
    /// Containers currently mounting it.
    pub mounted_by: usize,
}

/// Create the engine volume backing `volume` unless it is a bind mount.
pub(crate) async fn ensure_engine_volume<E: Engine>(
    engine: &E,
    app: &Application,
    volume: &Volume,
) -> ControlResult<()> {
    if volume.kind == VolumeType::Bind {
        return Ok(());
    }
    let name = app_volume_name(&app.name, &volume.name);
    match engine.inspect_volume(&name).await {
        Ok(existing) => {
            let owner = existing.labels.get(labels::APP_NAME).map(String::as_str);
            let vol = existing.labels.get(labels::VOL_NAME).map(String::as_str);
            if owner != Some(app.name.as_str()) || vol != Some(volume.name.as_str()) {
                return Err(ControlError::Conflict(format!(
                    "engine volume {name} already holds data for {}",
                    owner.unwrap_or("something outside nap")
                )));
            }
            return Ok(());
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.into()),
    }
    let mut vol_labels = Labels::new();
    vol_labels.insert(labels::MANAGED.to_string(), "true".to_string());
    vol_labels.insert(labels::TYPE.to_string(), labels::TYPE_VOLUME.to_string());
    vol_labels.insert(labels::APP_NAME.to_string(), app.name.clone());
    vol_labels.insert(labels::VOL_NAME.to_string(), volume.name.clone());
    engine
        .create_volume(&VolumeCreate {
            name,
            driver: "local".to_string(),
            labels: vol_labels,
        })
        .await?;
    Ok(())
}

pub async fn add_volume<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    app_name: &str,
    spec: VolumeSpec,
) -> ControlResult<Volume> {
    validate_name("volume", &spec.name)?;
    if !spec.mount_path.starts_with('/') {
        return Err(ControlError::Validation(format!(
            "mount path '{}' must be absolute",
            spec.mount_path
        )));
    }
    let source = match (spec.kind, spec.source) {
        (VolumeType::Bind, Some(src)) if src.starts_with('/') => src,
        (VolumeType::Bind, Some(src)) => {
            return Err(ControlError::Validation(format!("bind source '{src}' must be an absolute path")));
        }
        (VolumeType::Bind, None) => {
            return Err(ControlError::Validation("bind mounts require --source".into()));
        }
        (VolumeType::Volume, _) => String::new(),
    };

    let _lock = ctx.lock_app(app_name, LONG_LOCK_TIMEOUT).await?;
    let mut app = ctx.app(app_name)?;
    if app.volume(&spec.name).is_some() {
        return Err(ControlError::Conflict(format!(
            "volume '{}' already attached to {app_name}",
            spec.name
        )));
    }
    if let Some(other) = app.volumes.iter().find(|v| v.mount_path == spec.mount_path) {
        return Err(ControlError::Conflict(format!(
            "{} is already mounted by volume '{}'",
            spec.mount_path, other.name
        )));
    }

    let volume = Volume {
        name: spec.name,
        mount_path: spec.mount_path,
        kind: spec.kind,
        source,
        read_only: spec.read_only,
        size: spec.size.unwrap_or_default(),
        created_at: Utc::now(),
    };
    ensure_engine_volume(&ctx.engine, &app, &volume).await?;
    app.volumes.push(volume.clone());
    ctx.save_app(&mut app)?;
    info!(app = %app_name, volume = %volume.name, mount = %volume.mount_path, "volume attached");
    Ok(volume)
}

/// Detach a volume. The engine volume and its data are removed only with
/// `delete_data`.
pub async fn remove_volume<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    app_name: &str,
    volume_name: &str,
    delete_data: bool,
) -> ControlResult<Volume> {
    let _lock = ctx.lock_app(app_name, LONG_LOCK_TIMEOUT).await?;
    let mut app = ctx.app(app_name)?;
    let Some(idx) = app.volumes.iter().position(|v| v.name == volume_name) else {
        return Err(ControlError::NotFound(format!(
            "volume '{volume_name}' not attached to {app_name}"
        )));
    };

    if delete_data && app.volumes[idx].kind == VolumeType::Volume {
        let engine_name = app_volume_name(app_name, volume_name);
        match ctx.engine.remove_volume(&engine_name, false).await {
            Ok(()) => info!(volume = %engine_name, "volume data deleted"),
            Err(e) if e.is_not_found() => {}
            Err(e) if e.kind() == nap_core::ErrorKind::Conflict => {
                return Err(ControlError::Precondition {
                    message: format!("volume {engine_name} is still mounted by a container"),
                    hints: vec![format!("nap app stop {app_name}")],
                });
            }
            Err(e) => return Err(e.into()),
        }
    }

    let removed = app.volumes.remove(idx);
    ctx.save_app(&mut app)?;
    Ok(removed)
}

pub fn list_volumes<E: Engine, P: Prober>(ctx: &Context<E, P>, app_name: &str) -> ControlResult<Vec<Volume>> {
    Ok(ctx.app(app_name)?.volumes)
}

pub async fn inspect_volume<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    app_name: &str,
    volume_name: &str,
) -> ControlResult<VolumeReport> {
    let app = ctx.app(app_name)?;
    let volume = app
        .volume(volume_name)
        .cloned()
        .ok_or_else(|| ControlError::NotFound(format!("volume '{volume_name}' not attached to {app_name}")))?;
    let source = volume.mount_source(app_name);

    let engine = match volume.kind {
        VolumeType::Volume => match ctx.engine.inspect_volume(&source).await {
            Ok(info) => Some(info),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        },
        VolumeType::Bind => None,
    };

    let filters = [format!("{}={app_name}", labels::APP_NAME)];
    let mounted_by = ctx
        .engine
        .list_containers(true, &filters)
        .await?
        .iter()
        .filter(|c| c.mounts.iter().any(|m| m.name == source || m.source == source))
        .count();

    Ok(VolumeReport {
        volume,
        source,
        engine,
        mounted_by,
    })
}

/// Recorded backups of an app's volumes, optionally for one volume.
pub fn list_backups<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    app_name: &str,
    volume_name: Option<&str>,
) -> ControlResult<Vec<VolumeBackup>> {
    let mut backups: Vec<VolumeBackup> = ctx
        .registries
        .volume_backups
        .list()?
        .into_iter()
        .filter(|b| b.app_name == app_name)
        .filter(|b| volume_name.is_none_or(|v| b.volume_name == v))
        .collect();
    backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(backups)
}
