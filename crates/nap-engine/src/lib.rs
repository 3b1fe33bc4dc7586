//! nap-engine: container engine adapter.
//!
//! Speaks the Docker-compatible HTTP API over a local unix socket, which
//! both Docker and Podman expose.
//!
//! # Architecture
//!
//! ```text
//! runtime::detect ──▶ RuntimeInfo ──▶ DockerClient ──(hyper/http1)──▶ engine.sock
//!                                        │
//!                                        ├── pull   JSON-lines progress
//!                                        ├── build  tar context + JSON-lines
//!                                        └── logs   8-byte frame demux
//! Engine trait ◀── DockerClient
//!              ◀── FakeEngine (feature "fake")
//! ```

pub mod build;
pub mod client;
pub mod engine;
pub mod error;
#[cfg(feature = "fake")]
pub mod fake;
pub mod logs;
pub mod models;
pub mod pull;
pub mod runtime;
pub mod timeouts;
pub mod vpc;

pub use build::build_context;
pub use client::{DockerClient, LogOptions};
pub use engine::{Engine, Progress, discard_container, ensure_image, short_id};
pub use error::{EngineError, EngineResult};
pub use logs::{ExecOutput, StreamKind};
pub use runtime::{RuntimeInfo, RuntimeKind};
