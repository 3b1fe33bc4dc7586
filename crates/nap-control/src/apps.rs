//! Application lifecycle outside of deploy: status, start/stop, restart,
//! destroy, scaling, environment and rollout transitions.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use nap_core::dotenv;
use nap_engine::models::ContainerState;
use nap_engine::{Engine, discard_container, short_id};
use nap_health::Prober;
use nap_proxy::proxy_labels;
use nap_rollout::{ScaleRequest, confirm, rollback_environment};
use nap_state::{AppStatus, Application, DeploymentRecord, INTERACTIVE_LOCK_TIMEOUT, LONG_LOCK_TIMEOUT};
use tracing::{info, warn};

use crate::context::{Context, surviving};
use crate::error::{ControlError, ControlResult};
use crate::vpcs::{DANGLING, detach_app};

/// Live view of one instance.
#[derive(Debug, Clone)]
pub struct InstanceStatus {
    /// 1-based.
    pub instance: usize,
    pub container_id: String,
    pub name: String,
    /// `None` when the container no longer exists.
    pub state: Option<ContainerState>,
}

#[derive(Debug, Clone)]
pub struct AppReport {
    pub app: Application,
    pub instances: Vec<InstanceStatus>,
}

pub fn list_apps<E: Engine, P: Prober>(ctx: &Context<E, P>) -> ControlResult<Vec<Application>> {
    Ok(ctx.registries.apps.list()?)
}

pub async fn app_status<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str) -> ControlResult<AppReport> {
    let app = ctx.app(name)?;
    let mut instances = Vec::with_capacity(app.container_ids.len());
    for (idx, id) in app.container_ids.iter().enumerate() {
        let (container_name, state) = match ctx.engine.inspect_container(id).await {
            Ok(inspect) => (inspect.short_name().to_string(), Some(inspect.state)),
            Err(e) if e.is_not_found() => (String::new(), None),
            Err(e) => return Err(e.into()),
        };
        instances.push(InstanceStatus {
            instance: idx + 1,
            container_id: id.clone(),
            name: container_name,
            state,
        });
    }
    Ok(AppReport { app, instances })
}

pub async fn stop_app<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str) -> ControlResult<Application> {
    let _lock = ctx.lock_app(name, INTERACTIVE_LOCK_TIMEOUT).await?;
    let mut app = ctx.app(name)?;
    for id in &app.container_ids {
        match ctx.engine.stop_container(id, ctx.timing.stop_grace).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => warn!(app = %name, container = %short_id(id), "container missing"),
            Err(e) => return Err(e.into()),
        }
    }
    app.status = AppStatus::Stopped;
    ctx.save_app(&mut app)?;
    info!(app = %name, instances = app.container_ids.len(), "stopped");
    Ok(app)
}

pub async fn start_app<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str) -> ControlResult<Application> {
    let _lock = ctx.lock_app(name, INTERACTIVE_LOCK_TIMEOUT).await?;
    let mut app = ctx.app(name)?;
    if app.container_ids.is_empty() {
        return Err(ControlError::Precondition {
            message: format!("{name} has no containers"),
            hints: vec![format!("nap app deploy {name}")],
        });
    }
    for id in &app.container_ids {
        ctx.engine.start_container(id).await?;
    }
    app.status = AppStatus::Running;
    ctx.save_app(&mut app)?;
    info!(app = %name, instances = app.container_ids.len(), "started");
    Ok(app)
}

/// Recreate every container with the app's current env, labels and
/// mounts.
pub async fn restart_app<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str) -> ControlResult<Application> {
    let _lock = ctx.lock_app(name, LONG_LOCK_TIMEOUT).await?;
    let mut app = ctx.app(name)?;
    ctx.recreate_and_save(&mut app).await?;
    info!(app = %name, "restarted");
    Ok(app)
}

/// Remove the app's containers and record. Volumes are kept.
pub async fn destroy_app<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str) -> ControlResult<()> {
    let _lock = ctx.lock_app(name, LONG_LOCK_TIMEOUT).await?;
    let app = ctx.app(name)?;

    let mut ids = app.container_ids.clone();
    if let Some((_, standby)) = app.deployment_state.live_standby() {
        ids.extend(standby.container_ids.iter().cloned());
    }
    for id in &ids {
        if !discard_container(&ctx.engine, id, ctx.timing.stop_grace).await {
            warn!(app = %name, container = %short_id(id), "container left behind");
        }
    }

    for db_name in &app.linked_databases {
        let Some(mut db) = ctx.registries.databases.find(db_name)? else {
            continue;
        };
        db.linked_apps.retain(|a| a != name);
        db.updated_at = Utc::now();
        ctx.registries.databases.update(&db)?;
    }
    detach_app(ctx, &app.vpc, &app.id).await?;
    ctx.registries.apps.delete(name)?;
    info!(app = %name, removed = ids.len(), "destroyed");
    Ok(())
}

pub async fn scale_app<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    name: &str,
    request: ScaleRequest,
) -> ControlResult<Application> {
    let _lock = ctx.lock_app(name, LONG_LOCK_TIMEOUT).await?;
    let mut app = ctx.app(name)?;
    let target = request.target(app.instances)?;
    if target == app.instances && app.container_ids.len() == target as usize {
        return Ok(app);
    }

    let previous = app.status;
    app.status = AppStatus::Scaling;
    ctx.save_app(&mut app)?;

    let labels = proxy_labels(&app);
    let result = ctx.deployer().scale(&mut app, target, &labels).await;
    app.status = match result {
        Ok(()) => AppStatus::Running,
        Err(_) => previous,
    };
    ctx.save_app(&mut app)?;
    result?;
    Ok(app)
}

// ── Environment ────────────────────────────────────────────────────

/// Apply `edit` to the app's env under its lock, then recreate the
/// containers. Returns the changed app.
async fn edit_env<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    name: &str,
    edit: impl FnOnce(&mut BTreeMap<String, String>) -> ControlResult<()>,
) -> ControlResult<Application> {
    let _lock = ctx.lock_app(name, LONG_LOCK_TIMEOUT).await?;
    let mut app = ctx.app(name)?;
    edit(&mut app.env_vars)?;
    ctx.save_app(&mut app)?;
    ctx.recreate_and_save(&mut app).await?;
    Ok(app)
}

pub async fn env_set<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    name: &str,
    vars: BTreeMap<String, String>,
) -> ControlResult<Application> {
    for key in vars.keys() {
        dotenv::validate_key(key)?;
    }
    let count = vars.len();
    let app = edit_env(ctx, name, |env| {
        env.extend(vars);
        Ok(())
    })
    .await?;
    info!(app = %name, count, "env updated");
    Ok(app)
}

pub async fn env_unset<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str, keys: &[String]) -> ControlResult<Application> {
    let app = edit_env(ctx, name, |env| {
        if let Some(missing) = keys.iter().find(|k| !env.contains_key(k.as_str())) {
            return Err(ControlError::NotFound(format!("{name} has no env var {missing}")));
        }
        for key in keys {
            env.remove(key);
        }
        Ok(())
    })
    .await?;
    info!(app = %name, count = keys.len(), "env vars removed");
    Ok(app)
}

/// Merge a dotenv file into the app's env.
pub async fn env_import<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str, file: &Path) -> ControlResult<Application> {
    let content = std::fs::read_to_string(file).map_err(|source| nap_core::CoreError::Io {
        path: file.to_path_buf(),
        source,
    })?;
    let vars = dotenv::parse(&content)?;
    env_set(ctx, name, vars).await
}

pub fn env_export<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str) -> ControlResult<String> {
    Ok(dotenv::render(&ctx.app(name)?.env_vars))
}

// ── Linked databases and history ───────────────────────────────────

pub fn linked_databases<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str) -> ControlResult<Vec<String>> {
    let app = ctx.app(name)?;
    let mut names = Vec::with_capacity(app.linked_databases.len());
    for db in &app.linked_databases {
        if ctx.registries.databases.exists(db)? {
            names.push(db.clone());
        } else {
            names.push(format!("{db} {DANGLING}"));
        }
    }
    Ok(names)
}

pub fn deployments<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str) -> ControlResult<Vec<DeploymentRecord>> {
    Ok(ctx.app(name)?.deployment_history)
}

// ── Blue-green transitions and rollback ────────────────────────────

pub async fn confirm_deployment<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str) -> ControlResult<Application> {
    let _lock = ctx.lock_app(name, LONG_LOCK_TIMEOUT).await?;
    let mut app = ctx.app(name)?;
    confirm(&ctx.engine, &ctx.timing, &mut app).await?;
    ctx.save_app(&mut app)?;
    Ok(app)
}

pub async fn rollback_deployment<E: Engine, P: Prober>(ctx: &Context<E, P>, name: &str) -> ControlResult<Application> {
    let _lock = ctx.lock_app(name, LONG_LOCK_TIMEOUT).await?;
    let mut app = ctx.app(name)?;
    let labels = proxy_labels(&app);
    rollback_environment(&ctx.engine, &ctx.timing, &mut app, &labels, Utc::now()).await?;
    app.status = AppStatus::Running;
    ctx.save_app(&mut app)?;
    Ok(app)
}

/// Redeploy the image of history entry `version` (`0` = previous).
pub async fn rollback_version<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    name: &str,
    version: usize,
) -> ControlResult<Application> {
    let _lock = ctx.lock_app(name, LONG_LOCK_TIMEOUT).await?;
    let app = ctx.app(name)?;
    let result = ctx.deployer().rollback_to_version(&app, version, proxy_labels(&app)).await;
    let done = match result {
        Ok(done) => done,
        Err(e) => {
            let mut failed = app;
            failed.status = AppStatus::Failed;
            failed.container_ids = surviving(&ctx.engine, &failed.container_ids).await;
            if let Err(save) = ctx.save_app(&mut failed) {
                warn!(app = %name, error = %save, "failed to record rollback failure");
            }
            return Err(e.into());
        }
    };

    let mut app = done.app;
    app.status = AppStatus::Running;
    app.last_deployed_at = Some(Utc::now());
    ctx.save_app(&mut app)?;
    Ok(app)
}

// ── Instances ──────────────────────────────────────────────────────

/// `(instance, container id)` pairs for one instance or all of them.
pub fn instance_containers<E: Engine, P: Prober>(
    ctx: &Context<E, P>,
    name: &str,
    instance: Option<usize>,
) -> ControlResult<Vec<(usize, String)>> {
    let app = ctx.app(name)?;
    if app.container_ids.is_empty() {
        return Err(ControlError::Precondition {
            message: format!("{name} has no running instances"),
            hints: vec![format!("nap app deploy {name}")],
        });
    }
    match instance {
        None => Ok(app.container_ids.into_iter().enumerate().map(|(i, id)| (i + 1, id)).collect()),
        Some(n) => n
            .checked_sub(1)
            .and_then(|i| app.container_ids.get(i))
            .map(|id| vec![(n, id.clone())])
            .ok_or_else(|| ControlError::NotFound(format!("{name} has no instance {n}"))),
    }
}
