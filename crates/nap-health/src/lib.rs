//! nap-health: HTTP health probes and health gates.
//!
//! Deployment strategies gate every new container on its health endpoint
//! before shifting traffic to it.
//!
//! # Architecture
//!
//! ```text
//! wait_for_healthy ──inspect──▶ Engine        (exited? address yet?)
//!        │
//!        └──probe──▶ Prober ──▶ HttpProber    GET http://{ip}:{port}{path}
//!                           └─▶ ScriptedProber (feature "fake")
//! ```

pub mod checker;
pub mod error;
#[cfg(feature = "fake")]
pub mod fake;
pub mod gate;

pub use checker::{HttpProber, ProbeResult, Prober, http_probe};
pub use error::{HealthError, HealthResult};
pub use gate::{GateConfig, HealthTarget, wait_for_healthy};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use nap_engine::Engine;
    use nap_engine::fake::FakeEngine;
    use nap_engine::models::ContainerConfig;

    use super::*;

    const NET: &str = "nap-vpc-primary";

    /// Always healthy once the container has an address.
    struct AlwaysHealthy;

    impl Prober for AlwaysHealthy {
        async fn probe(&self, _: &str, _: &str, _: Duration) -> ProbeResult {
            ProbeResult::Healthy
        }
    }

    struct NeverHealthy;

    impl Prober for NeverHealthy {
        async fn probe(&self, _: &str, _: &str, _: Duration) -> ProbeResult {
            ProbeResult::Unhealthy
        }
    }

    async fn started(engine: &FakeEngine, name: &str) -> String {
        let config = ContainerConfig {
            image: "app:1".into(),
            ..Default::default()
        }
        .on_network(NET);
        let id = engine.create_container(name, &config).await.unwrap();
        engine.start_container(&id).await.unwrap();
        id
    }

    fn target(container: &str) -> HealthTarget<'_> {
        HealthTarget {
            container,
            network: NET,
            port: 3000,
            path: "/health",
        }
    }

    fn fast(deadline_ms: u64) -> GateConfig {
        GateConfig {
            tick: Duration::from_millis(5),
            attempt_timeout: Duration::from_millis(50),
            deadline: Duration::from_millis(deadline_ms),
        }
    }

    #[tokio::test]
    async fn healthy_container_passes() {
        let engine = FakeEngine::new();
        let id = started(&engine, "web-1").await;
        wait_for_healthy(&engine, &AlwaysHealthy, &target(&id), &fast(200))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn exited_container_fails_immediately() {
        let engine = FakeEngine::new();
        engine.crash_on_start("web");
        let id = started(&engine, "web-1").await;
        let err = wait_for_healthy(&engine, &AlwaysHealthy, &target(&id), &fast(10_000))
            .await
            .unwrap_err();
        assert!(matches!(err, HealthError::Exited { exit_code: 1, .. }), "{err}");
        assert_eq!(err.kind(), nap_core::ErrorKind::HealthTimeout);
    }

    #[tokio::test]
    async fn unhealthy_container_times_out() {
        let engine = FakeEngine::new();
        let id = started(&engine, "web-1").await;
        let err = wait_for_healthy(&engine, &NeverHealthy, &target(&id), &fast(30))
            .await
            .unwrap_err();
        assert!(matches!(err, HealthError::Timeout { .. }), "{err}");
    }

    #[tokio::test]
    async fn missing_address_times_out() {
        let engine = FakeEngine::new();
        engine.withhold_ip("web");
        let id = started(&engine, "web-1").await;
        let err = wait_for_healthy(&engine, &AlwaysHealthy, &target(&id), &fast(30))
            .await
            .unwrap_err();
        assert!(matches!(err, HealthError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_container_is_engine_error() {
        let engine = FakeEngine::new();
        let err = wait_for_healthy(&engine, &AlwaysHealthy, &target("ghost"), &fast(30))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), nap_core::ErrorKind::NotFound);
    }

    #[cfg(feature = "fake")]
    #[tokio::test]
    async fn scripted_prober_records_probes() {
        use nap_engine::fake::FakeEvent;

        let engine = FakeEngine::new();
        let prober = fake::ScriptedProber::new(&engine);
        prober.mark_unhealthy("bad");
        let good = started(&engine, "good-1").await;
        let bad = started(&engine, "bad-1").await;

        wait_for_healthy(&engine, &prober, &target(&good), &fast(100)).await.unwrap();
        assert!(wait_for_healthy(&engine, &prober, &target(&bad), &fast(20)).await.is_err());
        assert!(engine.events().contains(&FakeEvent::Probed("good-1".into())));
        assert!(engine.events().contains(&FakeEvent::Probed("bad-1".into())));
    }
}
