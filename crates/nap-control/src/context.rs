//! Per-command context.
//!
//! Every command builds one [`Context`] at entry and threads it through.
//! Nothing in it outlives the process; durable state lives only in the
//! registry files.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use nap_core::{GlobalConfig, StateDir};
use nap_engine::Engine;
use nap_health::Prober;
use nap_proxy::{Traefik, proxy_labels};
use nap_rollout::{Deployer, Timing, recreate_all};
use nap_state::{AppStatus, Application, INTERACTIVE_LOCK_TIMEOUT, LockGuard, LockManager, Registries};
use tracing::debug;

use crate::error::ControlResult;

pub struct Context<E, P> {
    pub dir: StateDir,
    pub registries: Registries,
    pub locks: LockManager,
    pub config: GlobalConfig,
    pub engine: E,
    pub prober: P,
    /// Host path of the engine socket, mounted into the proxy.
    pub engine_socket: PathBuf,
    pub timing: Timing,
}

impl<E: Engine, P: Prober> Context<E, P> {
    /// Open the state directory, its registries and the global config.
    pub fn open(dir: StateDir, engine: E, prober: P, engine_socket: PathBuf) -> ControlResult<Self> {
        let registries = Registries::open(&dir)?;
        let config = GlobalConfig::load(&dir.config_file())?;
        Ok(Self {
            locks: LockManager::new(dir.locks_dir()),
            dir,
            registries,
            config,
            engine,
            prober,
            engine_socket,
            timing: Timing::default(),
        })
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn deployer(&self) -> Deployer<'_, E, P> {
        Deployer::new(&self.engine, &self.prober).with_timing(self.timing)
    }

    pub fn proxy(&self) -> Traefik<'_, E> {
        Traefik::new(&self.engine, &self.dir, self.engine_socket.clone(), self.config.acme_email())
    }

    /// Take the per-app lock. Must happen before the app record is read.
    pub async fn lock_app(&self, app: &str, timeout: Duration) -> ControlResult<LockGuard> {
        let guard = self.locks.try_lock(app, timeout).await?;
        debug!(%app, "app lock held");
        Ok(guard)
    }

    /// Take the lock guarding `vpc`'s membership lists. App names cannot
    /// contain `.`, so the key never collides with an app lock.
    pub async fn lock_vpc(&self, vpc: &str) -> ControlResult<LockGuard> {
        let guard = self.locks.try_lock(&format!("vpc.{vpc}"), INTERACTIVE_LOCK_TIMEOUT).await?;
        debug!(%vpc, "vpc lock held");
        Ok(guard)
    }

    pub fn app(&self, name: &str) -> ControlResult<Application> {
        Ok(self.registries.apps.get(name)?)
    }

    /// Persist `app`, stamping `updated_at`.
    pub fn save_app(&self, app: &mut Application) -> ControlResult<()> {
        app.updated_at = Utc::now();
        self.registries.apps.update(app)?;
        Ok(())
    }

    /// Recreate every container of `app` in place with its current env,
    /// labels and mounts.
    ///
    /// On failure `app` keeps the ids of every container that still exists,
    /// replaced or not.
    pub async fn recreate_containers(&self, app: &mut Application) -> ControlResult<()> {
        if app.container_ids.is_empty() {
            return Ok(());
        }
        let labels = proxy_labels(app);
        if let Err(e) = recreate_all(&self.engine, &self.timing, app, &labels).await {
            let alive = surviving(&self.engine, &app.container_ids).await;
            if let Some(color) = app.deployment_state.active {
                if let Some(env) = app.deployment_state.slot_mut(color).as_mut() {
                    env.container_ids.retain(|id| alive.contains(id));
                }
            }
            app.container_ids = alive;
            return Err(e.into());
        }
        Ok(())
    }

    /// Recreate `app`'s containers and persist the outcome: `running` on
    /// success, `failed` with the surviving ids otherwise.
    pub async fn recreate_and_save(&self, app: &mut Application) -> ControlResult<()> {
        let result = self.recreate_containers(app).await;
        app.status = if result.is_ok() { AppStatus::Running } else { AppStatus::Failed };
        self.save_app(app)?;
        result
    }
}

/// The ids in `ids` whose containers still exist.
pub(crate) async fn surviving<E: Engine>(engine: &E, ids: &[String]) -> Vec<String> {
    let mut alive = Vec::with_capacity(ids.len());
    for id in ids {
        if engine.inspect_container(id).await.is_ok() {
            alive.push(id.clone());
        }
    }
    alive
}

