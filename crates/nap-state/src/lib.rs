//! nap-state: durable controller state.
//!
//! Each entity kind (applications, databases, VPCs, volume backups) lives
//! in its own pretty-printed JSON file under `~/.nap/`. Deployment history
//! is stored inline on each application record.
//!
//! # Architecture
//!
//! ```text
//! Registries
//!   ├── Registry<Application>   apps.json
//!   ├── Registry<Database>      databases.json
//!   ├── Registry<Vpc>           vpcs.json
//!   └── Registry<VolumeBackup>  volume-backups/volume-registry.json
//! LockManager                   locks/{app}.lock (pid inside)
//! ```
//!
//! Commands take the per-app lock *before* reading a registry snapshot, so
//! all effects of a command are ordered after every previously committed
//! command against the same app.

pub mod error;
pub mod lock;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use lock::{INTERACTIVE_LOCK_TIMEOUT, LONG_LOCK_TIMEOUT, LockGuard, LockManager};
pub use store::{Record, Registries, Registry};
pub use types::*;
