//! nap-core: shared vocabulary for the nap controller.
//!
//! Everything here is free of I/O against the container engine: the error
//! taxonomy every crate maps onto, the naming and labelling rules that keep
//! engine objects in the `nap` namespace, input validation limits, and the
//! two TOML configuration files (`~/.nap/config.toml` and `nap.toml`).

pub mod atomic;
pub mod config;
pub mod dotenv;
pub mod error;
pub mod naming;
pub mod paths;
pub mod types;
pub mod validation;

pub use atomic::write_atomic;
pub use config::{GlobalConfig, ProjectConfig};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use paths::StateDir;
pub use types::*;
