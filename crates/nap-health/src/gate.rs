//! Health gating of freshly started containers.
//!
//! A gate polls one container until it answers its health endpoint on the
//! VPC network or the deadline passes. Each tick inspects the container
//! first: a container that has exited fails the gate at once, and one
//! without an address yet is retried on the next tick.

use std::time::Duration;

use nap_engine::{Engine, short_id};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::checker::Prober;
use crate::error::{HealthError, HealthResult};

/// Timing of a health gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    /// Delay between probe rounds.
    pub tick: Duration,
    /// Timeout of a single HTTP attempt.
    pub attempt_timeout: Duration,
    /// Total budget for the container to become healthy.
    pub deadline: Duration,
}

impl GateConfig {
    pub const DEFAULT_TICK: Duration = Duration::from_secs(2);
    pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3);

    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            tick: Self::DEFAULT_TICK,
            attempt_timeout: Self::DEFAULT_ATTEMPT_TIMEOUT,
            deadline,
        }
    }
}

/// What to probe.
#[derive(Debug, Clone, Copy)]
pub struct HealthTarget<'a> {
    /// Container id or name.
    pub container: &'a str,
    /// Network whose address is probed.
    pub network: &'a str,
    pub port: u16,
    pub path: &'a str,
}

/// Wait until `target` is healthy.
pub async fn wait_for_healthy<E: Engine, P: Prober>(
    engine: &E,
    prober: &P,
    target: &HealthTarget<'_>,
    config: &GateConfig,
) -> HealthResult<()> {
    let started = Instant::now();
    let deadline = started + config.deadline;
    let mut attempts = 0u32;

    loop {
        let inspect = engine.inspect_container(target.container).await?;
        if !inspect.state.running {
            return Err(HealthError::Exited {
                container: inspect.short_name().to_string(),
                exit_code: inspect.state.exit_code,
            });
        }

        match inspect.ip_on(target.network) {
            Some(ip) => {
                attempts += 1;
                let address = format!("{ip}:{}", target.port);
                let result = prober.probe(&address, target.path, config.attempt_timeout).await;
                if result.is_healthy() {
                    info!(
                        container = %short_id(&inspect.id),
                        attempts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "container healthy"
                    );
                    return Ok(());
                }
                debug!(container = %short_id(&inspect.id), %address, ?result, "health probe not ready");
            }
            None => {
                debug!(container = %short_id(&inspect.id), network = %target.network, "no address yet");
            }
        }

        if Instant::now() >= deadline {
            return Err(HealthError::Timeout {
                container: inspect.short_name().to_string(),
                after: config.deadline,
            });
        }
        tokio::time::sleep(config.tick.min(deadline.saturating_duration_since(Instant::now()))).await;
    }
}
