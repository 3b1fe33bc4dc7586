//! Changing the instance count of a running app without a redeploy.

use nap_core::naming::{app_color_container_name, app_container_name, vpc_network_name};
use nap_core::validation::validate_instances;
use nap_engine::models::Labels;
use nap_engine::{Engine, short_id};
use nap_health::{HealthTarget, Prober, wait_for_healthy};
use nap_state::Application;
use tracing::{info, warn};

use crate::error::{DeployError, DeployResult};
use crate::materialize::{InstanceTemplate, start_instance};
use crate::strategy::{DEFAULT_HEALTH_TIMEOUT, Deployer};

/// How the operator asked to scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleRequest {
    Instances(u32),
    Add(u32),
    Remove(u32),
}

impl ScaleRequest {
    /// The instance count this request leads to from `current`.
    pub fn target(self, current: u32) -> DeployResult<u32> {
        let target = match self {
            ScaleRequest::Instances(n) => n,
            ScaleRequest::Add(n) => current.saturating_add(n),
            ScaleRequest::Remove(n) if n >= current => {
                return Err(DeployError::Validation(format!(
                    "cannot scale below 1 (currently {current} instances)"
                )));
            }
            ScaleRequest::Remove(n) => current - n,
        };
        validate_instances(target)?;
        Ok(target)
    }
}

impl<E: Engine, P: Prober> Deployer<'_, E, P> {
    /// Start or remove instances so the app runs `target` of them.
    ///
    /// New instances use the app's current image and are health-gated when
    /// its strategy relies on health checks. For blue-green apps only the
    /// active color is scaled.
    pub async fn scale(&self, app: &mut Application, target: u32, proxy_labels: &Labels) -> DeployResult<()> {
        if app.image_id.is_empty() {
            return Err(DeployError::Precondition(format!("{} has not been deployed yet", app.name)));
        }
        let current = app.container_ids.len();
        let wanted = target as usize;
        let color = app.deployment_state.active;

        if wanted > current {
            let snapshot = app.clone();
            let template = InstanceTemplate::for_app(&snapshot, proxy_labels);
            let gated = snapshot.deployment_strategy.needs_health_check() && !snapshot.health_check_path.is_empty();
            let network = vpc_network_name(&snapshot.vpc);
            let gate = self.timing.gate(match snapshot.deployment_config.health_timeout {
                0 => DEFAULT_HEALTH_TIMEOUT,
                secs => std::time::Duration::from_secs(u64::from(secs)),
            });

            let mut added = Vec::with_capacity(wanted - current);
            for instance in current + 1..=wanted {
                let name = match color {
                    Some(color) => app_color_container_name(&app.name, color, instance),
                    None => app_container_name(&app.name, instance),
                };
                // A leftover container under this name is not part of the fleet.
                if let Err(e) = self.clear_leftover(&name, app).await {
                    self.cleanup(&added).await;
                    return Err(e);
                }

                let id = match start_instance(self.engine, &name, &template.config(instance, color, true)).await {
                    Ok(id) => id,
                    Err(e) => {
                        self.cleanup(&added).await;
                        return Err(e);
                    }
                };
                added.push(id.clone());

                if gated {
                    let target = HealthTarget {
                        container: &id,
                        network: &network,
                        port: snapshot.port,
                        path: &snapshot.health_check_path,
                    };
                    if let Err(source) = wait_for_healthy(self.engine, self.prober, &target, &gate).await {
                        self.cleanup(&added).await;
                        return Err(DeployError::Health { container: name, source });
                    }
                }
            }
            app.container_ids.extend(added);
        } else {
            for id in app.container_ids.split_off(wanted) {
                if !self.discard(&id).await {
                    warn!(app = %app.name, container = %short_id(&id), "surplus instance not removed");
                }
            }
        }

        if let Some(color) = color {
            if let Some(env) = app.deployment_state.slot_mut(color).as_mut() {
                env.container_ids = app.container_ids.clone();
            }
        }
        info!(app = %app.name, from = current, to = wanted, "scaled");
        app.instances = target;
        Ok(())
    }
}
