//! nap-control: command handlers behind the `nap` CLI.
//!
//! Each handler takes a [`Context`] built once per invocation, so every
//! command sees the same state directory, registries, lock manager and
//! engine. Handlers that mutate an app take its advisory lock before the
//! app record is read.
//!
//! - Deploy pipeline: build or pull, proxy, VPC, strategy, commit
//! - App lifecycle, scaling, env, blue-green confirm/rollback
//! - Publishing and custom domains
//! - App volumes
//! - App to database linkage
//! - Database provisioning and host publishing
//! - VPC management
//!
//! # Architecture
//!
//! ```text
//! Context
//!   ├── StateDir + Registries (apps, databases, vpcs, volume backups)
//!   ├── LockManager (per-app pid locks)
//!   ├── Engine (Docker-compatible API, or FakeEngine in tests)
//!   ├── Prober (health gate)
//!   └── Deployer / Traefik built on demand
//! ```

pub mod apps;
pub mod context;
pub mod databases;
pub mod deploy;
pub mod error;
pub mod link;
pub mod publish;
pub mod volumes;
pub mod vpcs;

pub use apps::{AppReport, InstanceStatus};
pub use context::Context;
pub use databases::{CreateDatabase, DatabaseReport};
pub use deploy::{DeployRequest, DeploySettings, deploy};
pub use error::{ControlError, ControlResult};
pub use link::{link, link_env, unlink};
pub use volumes::{VolumeReport, VolumeSpec};
pub use vpcs::{DANGLING, VpcDetails};
