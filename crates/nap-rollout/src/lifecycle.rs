//! Post-deploy transitions: blue-green confirm and rollback, and
//! history-based rollback.

use chrono::{DateTime, Utc};
use nap_core::StrategyKind;
use nap_engine::models::Labels;
use nap_engine::{Engine, discard_container, short_id};
use nap_health::Prober;
use nap_state::{Application, DeploymentRecord};
use tracing::{info, warn};

use crate::error::{DeployError, DeployResult};
use crate::materialize::relabel_container;
use crate::strategy::{Deployed, Deployer, DeploymentOptions, Strategy, Timing};

fn require_blue_green(app: &Application, action: &str) -> DeployResult<()> {
    if app.deployment_strategy != StrategyKind::BlueGreen {
        return Err(DeployError::Precondition(format!(
            "cannot {action} {}: deployment strategy is {}, not blue-green",
            app.name, app.deployment_strategy
        )));
    }
    Ok(())
}

/// Destroy the standby color, making the current cut-over permanent.
pub async fn confirm<E: Engine>(engine: &E, timing: &Timing, app: &mut Application) -> DeployResult<()> {
    require_blue_green(app, "confirm")?;
    let Some((color, env)) = app.deployment_state.live_standby() else {
        return Err(DeployError::Precondition(format!(
            "{} has no standby environment to confirm",
            app.name
        )));
    };
    let ids = env.container_ids.clone();

    for id in &ids {
        if !discard_container(engine, id, timing.stop_grace).await {
            warn!(app = %app.name, container = %short_id(id), "standby container not removed");
        }
    }
    *app.deployment_state.slot_mut(color) = None;
    app.deployment_state.standby = None;
    info!(app = %app.name, %color, removed = ids.len(), "deployment confirmed");
    Ok(())
}

/// Swap traffic back to the standby color and destroy the current one.
///
/// Appends a history record for the restored image.
pub async fn rollback_environment<E: Engine>(
    engine: &E,
    timing: &Timing,
    app: &mut Application,
    proxy_labels: &Labels,
    now: DateTime<Utc>,
) -> DeployResult<()> {
    require_blue_green(app, "roll back")?;
    let Some((standby, env)) = app.deployment_state.live_standby() else {
        return Err(DeployError::Precondition(format!(
            "{} has no standby environment to roll back to",
            app.name
        )));
    };
    let env = env.clone();
    let previous = app.deployment_state.active;

    let snapshot = app.clone();
    let mut restored = Vec::with_capacity(env.container_ids.len());
    for (idx, id) in env.container_ids.iter().enumerate() {
        match relabel_container(engine, timing, id, &snapshot, standby, Some(proxy_labels), idx + 1).await {
            Ok(new_id) => restored.push(new_id),
            Err(e) => {
                warn!(app = %app.name, container = %short_id(id), error = %e, "failed to route standby container");
                restored.push(id.clone());
            }
        }
    }

    if let Some(color) = previous {
        if let Some(current) = app.deployment_state.environment(color) {
            for id in &current.container_ids {
                discard_container(engine, id, timing.stop_grace).await;
            }
        }
        *app.deployment_state.slot_mut(color) = None;
    } else {
        for id in &app.container_ids {
            discard_container(engine, id, timing.stop_grace).await;
        }
    }

    let state = &mut app.deployment_state;
    *state.slot_mut(standby) = Some(nap_state::Environment {
        container_ids: restored.clone(),
        ..env
    });
    state.active = Some(standby);
    state.standby = None;

    let image = state
        .environment(standby)
        .map(|e| e.image_id.clone())
        .unwrap_or_default();
    app.container_ids = restored;
    app.image_id = image.clone();
    app.record_rollback(&image, now);
    info!(app = %app.name, active = %standby, image = %image, "rolled back to standby environment");
    Ok(())
}

/// Pick a history record: `0` is the one before the latest, otherwise a
/// 1-based position.
pub fn select_version(app: &Application, version: usize) -> DeployResult<&DeploymentRecord> {
    let history = &app.deployment_history;
    let record = match version {
        0 => history.len().checked_sub(2).and_then(|i| history.get(i)),
        k => history.get(k - 1),
    };
    record.ok_or_else(|| match version {
        0 => DeployError::NotFound(format!("{} has no previous deployment", app.name)),
        k => DeployError::NotFound(format!(
            "deployment version {k} not found for {} ({} recorded)",
            app.name,
            history.len()
        )),
    })
}

impl<E: Engine, P: Prober> Deployer<'_, E, P> {
    /// Redeploy the image of a past deployment through the app's current
    /// strategy and record it as a rollback.
    pub async fn rollback_to_version(
        &self,
        app: &Application,
        version: usize,
        proxy_labels: Labels,
    ) -> DeployResult<Deployed> {
        let image = select_version(app, version)?.image_id.clone();
        match self.engine.inspect_image(&image).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                return Err(DeployError::Precondition(format!(
                    "image {image} for version {version} is no longer available"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        info!(app = %app.name, version, image = %image, "rolling back to recorded version");
        let strategy = Strategy::from_app(app);
        let opts = DeploymentOptions::for_app(app.clone(), &image, proxy_labels);
        let mut done = self.deploy(&strategy, opts).await?;
        done.app.image_id = image.clone();
        done.app.record_rollback(&image, Utc::now());
        Ok(done)
    }
}
