//! nap-proxy: edge proxy integration.
//!
//! The proxy is a Traefik sidecar (`nap-traefik`) that discovers app
//! containers through the engine socket and routes by container labels.
//! This crate owns both halves: the sidecar's lifecycle and the labels
//! written onto app containers.
//!
//! # Architecture
//!
//! ```text
//! Traefik::ensure_running ──▶ traefik.yml + letsencrypt/ ──▶ nap-traefik :80 :443 :8080
//! Traefik::connect_to_network ──▶ joins each VPC network that carries apps
//! proxy_labels(app) ──▶ traefik.* labels on every app container
//! ```

pub mod error;
pub mod labels;
pub mod traefik;

pub use error::{ProxyError, ProxyResult};
pub use labels::{host_rule, proxy_labels};
pub use traefik::{PROXY_IMAGE, ProxyStart, Traefik, render_config};
