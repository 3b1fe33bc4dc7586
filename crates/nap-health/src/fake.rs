//! Scripted prober over [`FakeEngine`](nap_engine::fake::FakeEngine).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use nap_engine::fake::{FakeEngine, FakeEvent};

use crate::checker::{ProbeResult, Prober};

/// Resolves probed addresses back to container names through the fake
/// engine and answers according to a script.
///
/// Every probe is recorded as [`FakeEvent::Probed`] in the engine's event
/// log. Containers whose name contains an unhealthy pattern always answer
/// `Unhealthy`; everything else is `Healthy`.
#[derive(Debug, Clone)]
pub struct ScriptedProber {
    engine: FakeEngine,
    unhealthy: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProber {
    pub fn new(engine: &FakeEngine) -> Self {
        Self {
            engine: engine.clone(),
            unhealthy: Arc::default(),
        }
    }

    pub fn mark_unhealthy(&self, pattern: &str) {
        self.patterns().push(pattern.to_string());
    }

    pub fn clear(&self) {
        self.patterns().clear();
    }

    fn patterns(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.unhealthy.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Prober for ScriptedProber {
    async fn probe(&self, address: &str, _path: &str, _timeout: Duration) -> ProbeResult {
        let ip = address.rsplit_once(':').map_or(address, |(ip, _)| ip);
        let Some(name) = self.engine.name_for_ip(ip) else {
            return ProbeResult::Failed;
        };
        self.engine.record(FakeEvent::Probed(name.clone()));
        if self.patterns().iter().any(|p| name.contains(p.as_str())) {
            ProbeResult::Unhealthy
        } else {
            ProbeResult::Healthy
        }
    }
}
