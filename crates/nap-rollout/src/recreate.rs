//! Recreate: stop the old fleet, then start the new one.

use nap_core::naming::app_container_name;
use nap_engine::Engine;
use nap_health::Prober;
use tracing::{info, warn};

use crate::error::DeployResult;
use crate::materialize::{InstanceTemplate, start_instance};
use crate::strategy::{Deployed, Deployer, DeploymentOptions};

impl<E: Engine, P: Prober> Deployer<'_, E, P> {
    pub(crate) async fn recreate(&self, opts: DeploymentOptions) -> DeployResult<Deployed> {
        let name = opts.app.name.clone();
        let instances = opts.app.instances as usize;

        for id in &opts.app.container_ids {
            if !self.discard(id).await {
                warn!(app = %name, container = %nap_engine::short_id(id), "old container not removed");
            }
        }
        // Untracked leftovers from an interrupted deploy would collide by name.
        for instance in 1..=instances {
            self.clear_leftover(&app_container_name(&name, instance), &opts.app).await?;
        }

        let template = InstanceTemplate::from_options(&opts);
        let mut created = Vec::with_capacity(instances);
        for instance in 1..=instances {
            let container = app_container_name(&name, instance);
            let config = template.config(instance, None, true);
            match start_instance(self.engine, &container, &config).await {
                Ok(id) => {
                    info!(app = %name, instance, total = instances, "instance started");
                    created.push(id);
                }
                Err(e) => {
                    self.cleanup(&created).await;
                    return Err(e);
                }
            }
        }

        tokio::time::sleep(self.timing.settle).await;

        let mut app = opts.app;
        app.container_ids = created;
        Ok(Deployed { image: opts.image, app })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use nap_core::naming::labels;
    use nap_core::StrategyKind;
    use nap_engine::fake::{FakeEngine, FakeEvent};
    use nap_engine::models::Labels;
    use nap_health::fake::ScriptedProber;
    use nap_state::Application;

    use crate::strategy::Strategy;

    use super::*;

    fn options(instances: u32) -> DeploymentOptions {
        let mut app = Application::new("app-1".into(), "web", "primary", Utc::now());
        app.instances = instances;
        app.port = 8080;
        app.deployment_strategy = StrategyKind::Recreate;
        let mut routes = Labels::new();
        routes.insert("traefik.http.routers.web.rule".into(), "Host(`web.nap.local`)".into());
        DeploymentOptions::for_app(app, "web:1", routes)
    }

    #[tokio::test(start_paused = true)]
    async fn replaces_the_whole_fleet() {
        let engine = FakeEngine::new();
        let prober = ScriptedProber::new(&engine);
        let deployer = Deployer::new(&engine, &prober);

        let first = deployer.deploy(&Strategy::Recreate, options(2)).await.unwrap();
        assert_eq!(first.app.container_ids.len(), 2);
        assert_eq!(engine.running_names(), vec!["nap-app-web-1", "nap-app-web-2"]);
        let c = engine.container("nap-app-web-1").unwrap();
        assert_eq!(c.label(labels::APP_ID), Some("app-1"));
        assert_eq!(c.label("traefik.http.routers.web.rule"), Some("Host(`web.nap.local`)"));

        let mut again = options(2);
        again.app = first.app.clone();
        again.image = "web:2".into();
        engine.clear_events();
        let second = deployer.deploy(&Strategy::Recreate, again).await.unwrap();

        assert_eq!(second.image, "web:2");
        assert_eq!(engine.containers().len(), 2);
        assert!(engine.containers().iter().all(|c| c.config.image == "web:2"));
        let events = engine.events();
        let last_removal = events.iter().rposition(|e| matches!(e, FakeEvent::Removed(_))).unwrap();
        let first_create = events.iter().position(|e| matches!(e, FakeEvent::Created(_))).unwrap();
        assert!(last_removal < first_create, "{events:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_instance_cleans_up_pass() {
        let engine = FakeEngine::new();
        let prober = ScriptedProber::new(&engine);
        let deployer = Deployer::new(&engine, &prober);
        engine.fail_create("web-3");

        let err = deployer.deploy(&Strategy::Recreate, options(3)).await.unwrap_err();
        assert!(err.to_string().contains("nap-app-web-3"), "{err}");
        assert!(engine.containers().is_empty());
    }

    fn labelled(app_name: &str, app_id: &str) -> nap_engine::models::ContainerConfig {
        let mut config = nap_engine::models::ContainerConfig {
            image: "old:1".into(),
            ..Default::default()
        };
        config.labels.insert(labels::APP_NAME.into(), app_name.into());
        config.labels.insert(labels::APP_ID.into(), app_id.into());
        config
    }

    #[tokio::test(start_paused = true)]
    async fn leftovers_are_replaced_only_when_they_belong_to_the_app() {
        let engine = FakeEngine::new();
        let prober = ScriptedProber::new(&engine);
        let deployer = Deployer::new(&engine, &prober);

        // Same app name, id from a record that was never saved.
        let orphan = engine.create_container("nap-app-web-1", &labelled("web", "app-lost")).await.unwrap();
        let done = deployer.deploy(&Strategy::Recreate, options(1)).await.unwrap();
        assert!(engine.container(&orphan).is_none());
        assert_eq!(engine.container("nap-app-web-1").unwrap().id, done.app.container_ids[0]);

        let engine = FakeEngine::new();
        let prober = ScriptedProber::new(&engine);
        let deployer = Deployer::new(&engine, &prober);
        let foreign = engine.create_container("nap-app-web-1", &labelled("other", "app-9")).await.unwrap();
        let err = deployer.deploy(&Strategy::Recreate, options(1)).await.unwrap_err();
        assert_eq!(err.kind(), nap_core::ErrorKind::Conflict);
        assert!(engine.container(&foreign).is_some());
    }
}
