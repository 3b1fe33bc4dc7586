//! Deadlines for engine RPCs.

use std::time::Duration;

pub const IMAGE_PULL: Duration = Duration::from_secs(10 * 60);
pub const IMAGE_BUILD: Duration = Duration::from_secs(15 * 60);
pub const CONTAINER_OP: Duration = Duration::from_secs(30);
pub const NETWORK_OP: Duration = Duration::from_secs(30);
/// Aggregate budget for health-check RPCs during one gate.
pub const HEALTH_CHECK: Duration = Duration::from_secs(2 * 60);
/// Grace period given to a container on stop before it is killed.
pub const STOP_GRACE: Duration = Duration::from_secs(10);
