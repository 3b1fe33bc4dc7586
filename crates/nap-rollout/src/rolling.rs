//! Rolling: replace the fleet in health-gated batches.
//!
//! Old and new instances overlap by at most `max_surge` at a time. A batch
//! that fails its health gate aborts the rollout: every new container from
//! this pass is removed and the old containers not yet rolled keep serving.

use chrono::Utc;
use nap_core::naming::{app_container_name, app_rolling_container_name, vpc_network_name};
use nap_engine::{Engine, short_id};
use nap_health::{HealthTarget, Prober, wait_for_healthy};
use tracing::{debug, info, warn};

use crate::error::{DeployError, DeployResult};
use crate::materialize::{InstanceTemplate, start_instance};
use crate::strategy::{Deployed, Deployer, DeploymentOptions, RollingConfig};

/// Number of batches needed to roll `instances` with `max_surge` per batch.
pub fn batch_count(instances: usize, max_surge: usize) -> usize {
    instances.div_ceil(max_surge.max(1))
}

impl<E: Engine, P: Prober> Deployer<'_, E, P> {
    pub(crate) async fn rolling(&self, cfg: &RollingConfig, opts: DeploymentOptions) -> DeployResult<Deployed> {
        let name = opts.app.name.clone();
        let instances = opts.app.instances as usize;
        let surge = cfg.max_surge.max(1) as usize;
        let old = opts.app.container_ids.clone();
        let batches = batch_count(instances, surge);

        let stamp = if old.is_empty() {
            for instance in 1..=instances {
                self.clear_leftover(&app_container_name(&name, instance), &opts.app).await?;
            }
            None
        } else {
            Some(self.unused_stamp(&old).await)
        };

        let network = vpc_network_name(&opts.vpc);
        let gate = self.timing.gate(cfg.health_timeout);
        let template = InstanceTemplate::from_options(&opts);
        let mut created: Vec<String> = Vec::with_capacity(instances);

        let mut i = 0;
        let mut batch = 0;
        while i < instances {
            let b = surge.min(instances - i);
            batch += 1;
            info!(app = %name, batch, batches, size = b, "rolling batch");

            let mut fresh = Vec::with_capacity(b);
            for instance in i + 1..=i + b {
                let container = match stamp {
                    Some(stamp) => app_rolling_container_name(&name, instance, stamp),
                    None => app_container_name(&name, instance),
                };
                let config = template.config(instance, None, true);
                match start_instance(self.engine, &container, &config).await {
                    Ok(id) => {
                        created.push(id.clone());
                        fresh.push((container, id));
                    }
                    Err(e) => {
                        self.cleanup(&created).await;
                        return Err(e);
                    }
                }
            }

            for (container, id) in &fresh {
                let target = HealthTarget {
                    container: id,
                    network: &network,
                    port: opts.app.port,
                    path: &opts.app.health_check_path,
                };
                if let Err(source) = wait_for_healthy(self.engine, self.prober, &target, &gate).await {
                    warn!(app = %name, container = %container, error = %source, "health gate failed, rolling back this pass");
                    self.cleanup(&created).await;
                    return Err(DeployError::Health {
                        container: container.clone(),
                        source,
                    });
                }
            }

            for id in old.iter().skip(i).take(b) {
                if self.discard(id).await {
                    debug!(app = %name, container = %short_id(id), "old instance removed");
                } else {
                    warn!(app = %name, container = %short_id(id), "old instance not removed");
                }
            }

            i += b;
            if i < instances && !cfg.interval.is_zero() {
                tokio::time::sleep(cfg.interval).await;
            }
        }

        // Scaled down in the same deploy: drop the surplus old instances.
        for id in old.iter().skip(instances) {
            self.discard(id).await;
        }

        let mut app = opts.app;
        app.container_ids = created;
        Ok(Deployed { image: opts.image, app })
    }

    /// Timestamp suffix that no current container name already ends with.
    async fn unused_stamp(&self, old: &[String]) -> i64 {
        let mut names = Vec::with_capacity(old.len());
        for id in old {
            if let Ok(inspect) = self.engine.inspect_container(id).await {
                names.push(inspect.short_name().to_string());
            }
        }
        let mut stamp = Utc::now().timestamp();
        while names.iter().any(|n| n.ends_with(&format!("-{stamp}"))) {
            stamp += 1;
        }
        stamp
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use nap_core::StrategyKind;
    use nap_engine::fake::{FakeEngine, FakeEvent};
    use nap_engine::models::Labels;
    use nap_health::fake::ScriptedProber;
    use nap_state::Application;

    use crate::strategy::{DEFAULT_HEALTH_TIMEOUT, Strategy};

    use super::*;

    fn app(instances: u32) -> Application {
        let mut app = Application::new("app-1".into(), "web", "primary", Utc::now());
        app.instances = instances;
        app.port = 8080;
        app.health_check_path = "/".into();
        app.deployment_strategy = StrategyKind::Rolling;
        app
    }

    fn rolling(surge: u32, interval: u64) -> Strategy {
        Strategy::Rolling(RollingConfig {
            max_surge: surge,
            interval: Duration::from_secs(interval),
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        })
    }

    async fn seeded(engine: &FakeEngine, prober: &ScriptedProber, instances: u32) -> Application {
        let deployer = Deployer::new(engine, prober);
        let opts = DeploymentOptions::for_app(app(instances), "web:1", Labels::new());
        let done = deployer.deploy(&Strategy::Recreate, opts).await.unwrap();
        engine.clear_events();
        done.app
    }

    #[test]
    fn batches() {
        assert_eq!(batch_count(2, 1), 2);
        assert_eq!(batch_count(5, 2), 3);
        assert_eq!(batch_count(3, 10), 1);
        assert_eq!(batch_count(3, 0), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn batches_alternate_create_probe_remove() {
        let engine = FakeEngine::new();
        let prober = ScriptedProber::new(&engine);
        let current = seeded(&engine, &prober, 2).await;
        let deployer = Deployer::new(&engine, &prober);

        let started = tokio::time::Instant::now();
        let opts = DeploymentOptions::for_app(current, "web:2", Labels::new());
        let done = deployer.deploy(&rolling(1, 5), opts).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));

        let milestones: Vec<String> = engine
            .events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Created(n) => Some(format!("create {}", n.rsplitn(2, '-').last().unwrap_or(&n))),
                FakeEvent::Probed(n) => Some(format!("probe {}", n.rsplitn(2, '-').last().unwrap_or(&n))),
                FakeEvent::Removed(n) => Some(format!("remove {n}")),
                _ => None,
            })
            .collect();
        assert_eq!(
            milestones,
            vec![
                "create nap-app-web-1",
                "probe nap-app-web-1",
                "remove nap-app-web-1",
                "create nap-app-web-2",
                "probe nap-app-web-2",
                "remove nap-app-web-2",
            ]
        );

        assert_eq!(done.app.container_ids.len(), 2);
        let containers = engine.containers();
        assert_eq!(containers.len(), 2);
        assert!(containers.iter().all(|c| c.config.image == "web:2" && c.running));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_gate_keeps_unrolled_instances() {
        let engine = FakeEngine::new();
        let prober = ScriptedProber::new(&engine);
        let current = seeded(&engine, &prober, 3).await;
        let deployer = Deployer::new(&engine, &prober);

        // Instance 2 of the new generation never turns healthy.
        prober.mark_unhealthy("web-2-");
        let opts = DeploymentOptions::for_app(current.clone(), "web:2", Labels::new());
        let err = deployer.deploy(&rolling(1, 0), opts).await.unwrap_err();
        assert!(matches!(err, DeployError::Health { .. }), "{err}");
        assert_eq!(err.kind(), nap_core::ErrorKind::HealthTimeout);

        let names: Vec<String> = engine.containers().into_iter().map(|c| c.name).collect();
        // Instance 1 was rolled before the failure; 2 and 3 are untouched.
        assert_eq!(names, vec!["nap-app-web-2", "nap-app-web-3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn surge_replaces_several_at_once() {
        let engine = FakeEngine::new();
        let prober = ScriptedProber::new(&engine);
        let current = seeded(&engine, &prober, 3).await;
        let deployer = Deployer::new(&engine, &prober);

        let opts = DeploymentOptions::for_app(current, "web:2", Labels::new());
        deployer.deploy(&rolling(2, 0), opts).await.unwrap();

        let events = engine.events();
        let creates_before_first_removal = events
            .iter()
            .take_while(|e| !matches!(e, FakeEvent::Removed(_)))
            .filter(|e| matches!(e, FakeEvent::Created(_)))
            .count();
        assert_eq!(creates_before_first_removal, 2);
        assert_eq!(engine.containers().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn first_rollout_uses_plain_names() {
        let engine = FakeEngine::new();
        let prober = ScriptedProber::new(&engine);
        let deployer = Deployer::new(&engine, &prober);

        let opts = DeploymentOptions::for_app(app(2), "web:1", Labels::new());
        deployer.deploy(&rolling(1, 5), opts).await.unwrap();
        assert_eq!(engine.running_names(), vec!["nap-app-web-1", "nap-app-web-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_rollouts_do_not_collide() {
        let engine = FakeEngine::new();
        let prober = ScriptedProber::new(&engine);
        let mut current = seeded(&engine, &prober, 2).await;
        let deployer = Deployer::new(&engine, &prober);

        for image in ["web:2", "web:3", "web:4"] {
            let opts = DeploymentOptions::for_app(current, image, Labels::new());
            current = deployer.deploy(&rolling(1, 0), opts).await.unwrap().app;
        }
        assert_eq!(engine.containers().len(), 2);
        assert!(engine.containers().iter().all(|c| c.config.image == "web:4"));
    }
}
