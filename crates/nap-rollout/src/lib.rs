//! nap-rollout: moving an app's fleet onto a new image.
//!
//! A [`Deployer`] runs one of three strategies against an [`Engine`]
//! and gates new containers through a [`Prober`]:
//!
//! - **recreate**: stop everything, start N new instances, settle.
//! - **rolling**: replace instances `max_surge` at a time, each batch
//!   health-gated before the matching old instances are removed.
//! - **blue-green**: stage a dark fleet in the idle color, health-gate
//!   it, then relabel both colors to move traffic.
//!
//! Every strategy removes the containers it created when it fails, so
//! the app keeps its previous fleet.
//!
//! # Architecture
//!
//! ```text
//! Strategy::from_app ──▶ Deployer::deploy ──┬─ recreate
//!                                           ├─ rolling ────┐
//!                                           └─ blue_green ─┤ wait_for_healthy
//!                                                          ▼
//!                   materialize (labels, env, mounts) ──▶ Engine
//!
//! lifecycle: confirm / rollback_environment / rollback_to_version
//! scale:     ScaleRequest ──▶ Deployer::scale
//! ```
//!
//! [`Engine`]: nap_engine::Engine
//! [`Prober`]: nap_health::Prober

mod bluegreen;
pub mod error;
pub mod lifecycle;
pub mod materialize;
mod recreate;
pub mod rolling;
pub mod scale;
pub mod strategy;

pub use error::{DeployError, DeployResult};
pub use lifecycle::{confirm, rollback_environment, select_version};
pub use materialize::{InstanceTemplate, recreate_all, recreate_container, relabel_container};
pub use scale::ScaleRequest;
pub use strategy::{
    BlueGreenConfig, DEFAULT_HEALTH_TIMEOUT, Deployed, Deployer, DeploymentOptions, RollingConfig, Strategy,
    Timing,
};
