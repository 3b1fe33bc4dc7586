//! Blue-green: stage a dark fleet in the idle color, then cut traffic over
//! by relabeling.

use chrono::Utc;
use nap_core::Color;
use nap_core::naming::{app_color_container_name, vpc_network_name};
use nap_engine::{Engine, short_id};
use nap_health::{HealthTarget, Prober, wait_for_healthy};
use nap_state::Environment;
use tracing::{info, warn};

use crate::error::{DeployError, DeployResult};
use crate::materialize::{InstanceTemplate, relabel_container, start_instance};
use crate::strategy::{BlueGreenConfig, Deployed, Deployer, DeploymentOptions};

impl<E: Engine, P: Prober> Deployer<'_, E, P> {
    pub(crate) async fn blue_green(&self, cfg: &BlueGreenConfig, opts: DeploymentOptions) -> DeployResult<Deployed> {
        let name = opts.app.name.clone();
        let instances = opts.app.instances as usize;
        let state = &opts.app.deployment_state;

        // An app arriving from another strategy is treated as blue.
        let old_color = state.active.unwrap_or(Color::Blue);
        let new_color = old_color.opposite();
        let old_env = match state.active {
            Some(color) => state.environment(color).cloned(),
            None if opts.app.container_ids.is_empty() => None,
            None => Some(Environment {
                container_ids: opts.app.container_ids.clone(),
                image_id: opts.app.image_id.clone(),
                deployed_at: opts.app.last_deployed_at.unwrap_or(opts.app.updated_at),
            }),
        };

        if let Some((standby, env)) = state.live_standby() {
            if standby == new_color {
                warn!(app = %name, color = %standby, "replacing unconfirmed standby environment");
                for id in &env.container_ids {
                    self.discard(id).await;
                }
            }
        }
        for instance in 1..=instances {
            self.clear_leftover(&app_color_container_name(&name, new_color, instance), &opts.app)
                .await?;
        }

        info!(app = %name, from = %old_color, to = %new_color, "staging dark environment");
        let template = InstanceTemplate::from_options(&opts);
        let mut created: Vec<String> = Vec::with_capacity(instances);
        for instance in 1..=instances {
            let container = app_color_container_name(&name, new_color, instance);
            let config = template.config(instance, Some(new_color), false);
            match start_instance(self.engine, &container, &config).await {
                Ok(id) => created.push(id),
                Err(e) => {
                    self.cleanup(&created).await;
                    return Err(e);
                }
            }
        }

        let network = vpc_network_name(&opts.vpc);
        let gate = self.timing.gate(cfg.health_timeout);
        for (idx, id) in created.iter().enumerate() {
            let target = HealthTarget {
                container: id,
                network: &network,
                port: opts.app.port,
                path: &opts.app.health_check_path,
            };
            if let Err(source) = wait_for_healthy(self.engine, self.prober, &target, &gate).await {
                self.cleanup(&created).await;
                return Err(DeployError::Health {
                    container: app_color_container_name(&name, new_color, idx + 1),
                    source,
                });
            }
        }

        // Cut-over: route the new color first, then strip the old one.
        let mut app = opts.app.clone();
        let mut live = Vec::with_capacity(created.len());
        for (idx, id) in created.iter().enumerate() {
            match relabel_container(self.engine, &self.timing, id, &app, new_color, Some(&opts.proxy_labels), idx + 1)
                .await
            {
                Ok(new_id) => live.push(new_id),
                Err(e) => {
                    warn!(app = %name, container = %short_id(id), error = %e, "failed to route new container");
                    live.push(id.clone());
                }
            }
        }
        info!(app = %name, color = %new_color, instances = live.len(), "traffic switched");

        let mut standby = old_env.filter(|env| !env.container_ids.is_empty());
        if let Some(env) = standby.as_mut() {
            if !cfg.auto_confirm {
                let mut kept = Vec::with_capacity(env.container_ids.len());
                for (idx, id) in env.container_ids.iter().enumerate() {
                    match relabel_container(self.engine, &self.timing, id, &app, old_color, None, idx + 1).await {
                        Ok(new_id) => kept.push(new_id),
                        Err(e) => {
                            warn!(app = %name, container = %short_id(id), error = %e, "failed to unroute old container");
                            kept.push(id.clone());
                        }
                    }
                }
                env.container_ids = kept;
            }
        }

        let now = Utc::now();
        let bg = &mut app.deployment_state;
        *bg.slot_mut(new_color) = Some(Environment {
            container_ids: live.clone(),
            image_id: opts.image.clone(),
            deployed_at: now,
        });
        bg.active = Some(new_color);
        bg.standby = None;
        *bg.slot_mut(old_color) = None;

        match standby {
            Some(env) if cfg.auto_confirm => {
                for id in &env.container_ids {
                    self.discard(id).await;
                }
                info!(app = %name, color = %old_color, "old environment removed (auto-confirm)");
            }
            Some(env) => {
                *bg.slot_mut(old_color) = Some(env);
                bg.standby = Some(old_color);
            }
            None => {}
        }

        app.container_ids = live;
        Ok(Deployed { image: opts.image, app })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use nap_core::StrategyKind;
    use nap_core::naming::labels;
    use nap_engine::fake::FakeEngine;
    use nap_engine::models::Labels;
    use nap_health::fake::ScriptedProber;
    use nap_state::Application;

    use crate::strategy::{DEFAULT_HEALTH_TIMEOUT, Strategy};

    use super::*;

    const ROUTE: &str = "traefik.http.routers.web.rule";

    fn routes() -> Labels {
        let mut l = Labels::new();
        l.insert(ROUTE.into(), "Host(`web.nap.local`)".into());
        l
    }

    fn blue_green(auto_confirm: bool) -> Strategy {
        Strategy::BlueGreen(BlueGreenConfig {
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            auto_confirm,
        })
    }

    async fn seeded(engine: &FakeEngine, prober: &ScriptedProber) -> Application {
        let mut app = Application::new("app-1".into(), "web", "primary", Utc::now());
        app.instances = 2;
        app.port = 8080;
        app.health_check_path = "/".into();
        app.image_id = "web:1".into();
        let opts = DeploymentOptions::for_app(app, "web:1", routes());
        let mut done = Deployer::new(engine, prober)
            .deploy(&Strategy::Recreate, opts)
            .await
            .unwrap();
        done.app.deployment_strategy = StrategyKind::BlueGreen;
        done.app
    }

    #[tokio::test(start_paused = true)]
    async fn first_cutover_keeps_old_fleet_as_blue_standby() {
        let engine = FakeEngine::new();
        let prober = ScriptedProber::new(&engine);
        let current = seeded(&engine, &prober).await;
        let deployer = Deployer::new(&engine, &prober);

        let opts = DeploymentOptions::for_app(current, "web:2", routes());
        let done = deployer.deploy(&blue_green(false), opts).await.unwrap();
        let bg = &done.app.deployment_state;

        assert_eq!(bg.active, Some(Color::Green));
        assert_eq!(bg.standby, Some(Color::Blue));
        assert_eq!(engine.containers().len(), 4);
        assert_eq!(done.app.container_ids, bg.green.as_ref().unwrap().container_ids);
        assert_eq!(bg.blue.as_ref().unwrap().container_ids.len(), 2);

        let green = engine.container("nap-app-web-green-1").unwrap();
        assert_eq!(green.label(ROUTE), Some("Host(`web.nap.local`)"));
        assert_eq!(green.label(labels::APP_COLOR), Some("green"));
        assert!(done.app.container_ids.contains(&green.id));

        let old = engine.container("nap-app-web-1").unwrap();
        assert_eq!(old.label(ROUTE), None);
        assert_eq!(old.label(labels::APP_COLOR), Some("blue"));
        assert_eq!(old.config.image, "web:1");
        assert!(old.running);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_confirm_removes_old_color() {
        let engine = FakeEngine::new();
        let prober = ScriptedProber::new(&engine);
        let current = seeded(&engine, &prober).await;
        let deployer = Deployer::new(&engine, &prober);

        let opts = DeploymentOptions::for_app(current, "web:2", routes());
        let done = deployer.deploy(&blue_green(true), opts).await.unwrap();

        assert_eq!(done.app.deployment_state.standby, None);
        assert_eq!(done.app.deployment_state.blue, None);
        assert_eq!(engine.running_names(), vec!["nap-app-web-green-1", "nap-app-web-green-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_dark_fleet_leaves_live_fleet_alone() {
        let engine = FakeEngine::new();
        let prober = ScriptedProber::new(&engine);
        let current = seeded(&engine, &prober).await;
        let deployer = Deployer::new(&engine, &prober);
        prober.mark_unhealthy("green-2");

        let opts = DeploymentOptions::for_app(current.clone(), "web:2", routes());
        let err = deployer.deploy(&blue_green(false), opts).await.unwrap_err();
        assert!(err.to_string().contains("nap-app-web-green-2"), "{err}");

        assert_eq!(engine.running_names(), vec!["nap-app-web-1", "nap-app-web-2"]);
        let old = engine.container("nap-app-web-1").unwrap();
        assert_eq!(old.id, current.container_ids[0]);
        assert_eq!(old.label(ROUTE), Some("Host(`web.nap.local`)"));
    }

    #[tokio::test(start_paused = true)]
    async fn colors_alternate_and_stale_standby_is_replaced() {
        let engine = FakeEngine::new();
        let prober = ScriptedProber::new(&engine);
        let current = seeded(&engine, &prober).await;
        let deployer = Deployer::new(&engine, &prober);

        let first = deployer
            .deploy(&blue_green(false), DeploymentOptions::for_app(current, "web:2", routes()))
            .await
            .unwrap();
        // Second deploy without confirming: blue standby is replaced by the new blue fleet.
        let second = deployer
            .deploy(&blue_green(false), DeploymentOptions::for_app(first.app, "web:3", routes()))
            .await
            .unwrap();
        let bg = &second.app.deployment_state;
        assert_eq!(bg.active, Some(Color::Blue));
        assert_eq!(bg.standby, Some(Color::Green));
        assert_eq!(bg.blue.as_ref().unwrap().image_id, "web:3");

        let mut names = engine.running_names();
        names.sort();
        assert_eq!(
            names,
            vec![
                "nap-app-web-blue-1",
                "nap-app-web-blue-2",
                "nap-app-web-green-1",
                "nap-app-web-green-2",
            ]
        );
    }
}
