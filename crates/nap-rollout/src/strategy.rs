//! Deployment strategies and the deployer that runs them.

use std::time::Duration;

use nap_core::StrategyKind;
use nap_core::naming::labels;
use nap_engine::models::Labels;
use nap_engine::{Engine, discard_container};
use nap_health::Prober;
use nap_state::{Application, DeploymentConfig, DeploymentState};
use tracing::{info, warn};

use crate::error::{DeployError, DeployResult};

/// Per-instance health budget used when the config says 0.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(30);

/// How to move an app's fleet onto a new image.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Stop everything, then start the new fleet. Brief downtime.
    Recreate,
    /// Replace instances in batches behind health gates.
    Rolling(RollingConfig),
    /// Stage a full dark fleet, then flip traffic by relabeling.
    BlueGreen(BlueGreenConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingConfig {
    /// New instances started per batch.
    pub max_surge: u32,
    /// Pause between batches; zero means none.
    pub interval: Duration,
    /// Budget for each new instance to pass its health check.
    pub health_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlueGreenConfig {
    pub health_timeout: Duration,
    /// Destroy the old color right after cut-over.
    pub auto_confirm: bool,
}

fn health_timeout(config: &DeploymentConfig) -> Duration {
    match config.health_timeout {
        0 => DEFAULT_HEALTH_TIMEOUT,
        secs => Duration::from_secs(u64::from(secs)),
    }
}

impl Strategy {
    /// The strategy an app is configured for.
    pub fn from_app(app: &Application) -> Self {
        let config = &app.deployment_config;
        match app.deployment_strategy {
            StrategyKind::Recreate => Strategy::Recreate,
            StrategyKind::Rolling => Strategy::Rolling(RollingConfig {
                max_surge: config.max_surge,
                interval: Duration::from_secs(u64::from(config.rolling_interval)),
                health_timeout: health_timeout(config),
            }),
            StrategyKind::BlueGreen => Strategy::BlueGreen(BlueGreenConfig {
                health_timeout: health_timeout(config),
                auto_confirm: config.auto_confirm,
            }),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Recreate => StrategyKind::Recreate,
            Strategy::Rolling(_) => StrategyKind::Rolling,
            Strategy::BlueGreen(_) => StrategyKind::BlueGreen,
        }
    }

    pub fn validate(&self, opts: &DeploymentOptions) -> DeployResult<()> {
        if opts.image.trim().is_empty() {
            return Err(DeployError::Validation("image reference is required".into()));
        }
        if opts.app.instances == 0 {
            return Err(DeployError::Validation("instances must be at least 1".into()));
        }
        if self.kind().needs_health_check() && opts.app.health_check_path.is_empty() {
            return Err(DeployError::Validation(format!(
                "{} deployment requires a health check path",
                self.kind()
            )));
        }
        if let Strategy::Rolling(cfg) = self {
            if cfg.max_surge < 1 {
                return Err(DeployError::Validation("max_surge must be at least 1".into()));
            }
        }
        Ok(())
    }
}

/// Everything a strategy needs to materialize the new fleet.
#[derive(Debug, Clone)]
pub struct DeploymentOptions {
    /// Snapshot of the app, including its current containers.
    pub app: Application,
    pub image: String,
    pub vpc: String,
    /// Routing labels for the app's containers.
    pub proxy_labels: Labels,
    pub memory_mb: u32,
    pub cpu: f64,
}

impl DeploymentOptions {
    /// Options that redeploy `image` with the app's stored resources.
    pub fn for_app(app: Application, image: &str, proxy_labels: Labels) -> Self {
        Self {
            image: image.to_string(),
            vpc: app.vpc.clone(),
            memory_mb: app.memory,
            cpu: app.cpu,
            proxy_labels,
            app,
        }
    }
}

/// Outcome of a successful deploy.
///
/// `app` carries the new container ids and blue-green state; status and
/// history are left to the caller.
#[derive(Debug, Clone)]
pub struct Deployed {
    pub image: String,
    pub app: Application,
}

/// Fixed delays used by the strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Pause after a recreate so the proxy can discover the new fleet.
    pub settle: Duration,
    pub probe_tick: Duration,
    pub probe_attempt: Duration,
    /// Grace period on stop before the engine kills a container.
    pub stop_grace: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(2),
            probe_tick: nap_health::GateConfig::DEFAULT_TICK,
            probe_attempt: nap_health::GateConfig::DEFAULT_ATTEMPT_TIMEOUT,
            stop_grace: nap_engine::timeouts::STOP_GRACE,
        }
    }
}

impl Timing {
    pub(crate) fn gate(&self, deadline: Duration) -> nap_health::GateConfig {
        nap_health::GateConfig {
            tick: self.probe_tick,
            attempt_timeout: self.probe_attempt,
            deadline,
        }
    }
}

/// Runs strategies against an engine, gating on `prober`.
pub struct Deployer<'a, E, P> {
    pub(crate) engine: &'a E,
    pub(crate) prober: &'a P,
    pub(crate) timing: Timing,
}

impl<'a, E: Engine, P: Prober> Deployer<'a, E, P> {
    pub fn new(engine: &'a E, prober: &'a P) -> Self {
        Self {
            engine,
            prober,
            timing: Timing::default(),
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn engine(&self) -> &'a E {
        self.engine
    }

    /// Validate, then move the fleet onto `opts.image`.
    ///
    /// On failure every container created by this pass is removed and the
    /// app's previous containers are left as they were.
    pub async fn deploy(&self, strategy: &Strategy, mut opts: DeploymentOptions) -> DeployResult<Deployed> {
        strategy.validate(&opts)?;
        info!(
            app = %opts.app.name,
            strategy = %strategy.kind(),
            instances = opts.app.instances,
            image = %opts.image,
            "deploying"
        );

        opts.app.vpc = opts.vpc.clone();
        if !matches!(strategy, Strategy::BlueGreen(_)) {
            self.retire_blue_green(&mut opts.app).await;
        }

        match strategy {
            Strategy::Recreate => self.recreate(opts).await,
            Strategy::Rolling(cfg) => self.rolling(cfg, opts).await,
            Strategy::BlueGreen(cfg) => self.blue_green(cfg, opts).await,
        }
    }

    /// Drop a leftover standby fleet when an app leaves blue-green.
    async fn retire_blue_green(&self, app: &mut Application) {
        if let Some((color, env)) = app.deployment_state.live_standby() {
            warn!(app = %app.name, %color, "removing standby environment left by blue-green");
            for id in env.container_ids.clone() {
                self.discard(&id).await;
            }
        }
        if app.deployment_state != DeploymentState::default() {
            app.deployment_state = DeploymentState::default();
        }
    }

    pub(crate) async fn discard(&self, id: &str) -> bool {
        discard_container(self.engine, id, self.timing.stop_grace).await
    }

    /// Remove an untracked container holding one of `app`'s names. A
    /// container under that name labelled for any other app is left alone.
    pub(crate) async fn clear_leftover(&self, name: &str, app: &Application) -> DeployResult<()> {
        let inspect = match self.engine.inspect_container(name).await {
            Ok(inspect) => inspect,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        // A first deploy that died before saving its record left no id to
        // match, so the app name also claims the container.
        let found = &inspect.config.labels;
        let claimed = found.get(labels::APP_ID) == Some(&app.id) || found.get(labels::APP_NAME) == Some(&app.name);
        if !claimed {
            return Err(DeployError::Conflict(format!(
                "container name {name} is already used by a container outside this app"
            )));
        }
        warn!(container = %name, "removing leftover container");
        self.discard(&inspect.id).await;
        Ok(())
    }

    /// Force-remove containers created by a failed pass.
    pub(crate) async fn cleanup(&self, ids: &[String]) {
        for id in ids {
            if let Err(e) = self.engine.remove_container(id, true).await {
                if !e.is_not_found() {
                    warn!(container = %nap_engine::short_id(id), error = %e, "cleanup failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn app(kind: StrategyKind) -> Application {
        let mut app = Application::new("app-1".into(), "web", "primary", Utc::now());
        app.deployment_strategy = kind;
        app
    }

    #[test]
    fn from_app_reads_config() {
        let mut a = app(StrategyKind::Rolling);
        a.deployment_config.max_surge = 2;
        a.deployment_config.health_timeout = 0;
        assert_eq!(
            Strategy::from_app(&a),
            Strategy::Rolling(RollingConfig {
                max_surge: 2,
                interval: Duration::from_secs(5),
                health_timeout: DEFAULT_HEALTH_TIMEOUT,
            })
        );
        assert_eq!(Strategy::from_app(&app(StrategyKind::Recreate)), Strategy::Recreate);
    }

    #[test]
    fn validation() {
        let mut opts = DeploymentOptions::for_app(app(StrategyKind::Rolling), "web:2", Labels::new());
        let strategy = Strategy::from_app(&opts.app);
        strategy.validate(&opts).unwrap();

        opts.app.health_check_path.clear();
        let err = strategy.validate(&opts).unwrap_err();
        assert!(err.to_string().contains("health check"), "{err}");
        Strategy::Recreate.validate(&opts).unwrap();

        opts.image = " ".into();
        assert!(Strategy::Recreate.validate(&opts).is_err());

        let zero_surge = Strategy::Rolling(RollingConfig {
            max_surge: 0,
            interval: Duration::ZERO,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        });
        opts.image = "web:2".into();
        opts.app.health_check_path = "/".into();
        assert!(zero_surge.validate(&opts).is_err());
    }
}
