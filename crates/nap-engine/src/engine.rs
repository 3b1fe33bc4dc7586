//! The engine boundary.
//!
//! Every container, network, volume, and image operation the controller
//! performs goes through [`Engine`]. [`crate::DockerClient`] implements it
//! against a real socket; the `fake` feature provides an in-memory
//! implementation for tests.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::EngineResult;
use crate::models::*;

/// Progress sink for pulls and builds; receives one human-readable line at
/// a time.
pub type Progress<'a> = &'a (dyn Fn(&str) + Send + Sync);

pub trait Engine: Send + Sync {
    /// Create a container and return its id.
    fn create_container(
        &self,
        name: &str,
        config: &ContainerConfig,
    ) -> impl Future<Output = EngineResult<String>> + Send;

    fn start_container(&self, id: &str) -> impl Future<Output = EngineResult<()>> + Send;

    /// Stop with a grace period before the engine kills the container.
    fn stop_container(
        &self,
        id: &str,
        grace: Duration,
    ) -> impl Future<Output = EngineResult<()>> + Send;

    fn remove_container(
        &self,
        id: &str,
        force: bool,
    ) -> impl Future<Output = EngineResult<()>> + Send;

    fn inspect_container(
        &self,
        id: &str,
    ) -> impl Future<Output = EngineResult<ContainerInspect>> + Send;

    /// List containers whose labels match every `key=value` filter.
    fn list_containers(
        &self,
        all: bool,
        label_filters: &[String],
    ) -> impl Future<Output = EngineResult<Vec<ContainerSummary>>> + Send;

    fn connect_network(
        &self,
        network: &str,
        container: &str,
    ) -> impl Future<Output = EngineResult<()>> + Send;

    /// Create a network and return its id.
    fn create_network(
        &self,
        spec: &NetworkCreate,
    ) -> impl Future<Output = EngineResult<String>> + Send;

    fn remove_network(&self, id: &str) -> impl Future<Output = EngineResult<()>> + Send;

    fn list_networks(&self) -> impl Future<Output = EngineResult<Vec<NetworkSummary>>> + Send;

    fn create_volume(
        &self,
        spec: &VolumeCreate,
    ) -> impl Future<Output = EngineResult<VolumeInfo>> + Send;

    fn remove_volume(
        &self,
        name: &str,
        force: bool,
    ) -> impl Future<Output = EngineResult<()>> + Send;

    fn inspect_volume(&self, name: &str)
    -> impl Future<Output = EngineResult<VolumeInfo>> + Send;

    fn inspect_image(
        &self,
        reference: &str,
    ) -> impl Future<Output = EngineResult<ImageInspect>> + Send;

    /// Pull an image, reporting status transitions through `progress`.
    fn pull_image(
        &self,
        reference: &str,
        progress: Progress<'_>,
    ) -> impl Future<Output = EngineResult<()>> + Send;

    /// Build an image from a tar build context; returns the image id.
    fn build_image(
        &self,
        context: Vec<u8>,
        dockerfile: &str,
        tag: &str,
        progress: Progress<'_>,
    ) -> impl Future<Output = EngineResult<String>> + Send;
}

/// Pull `reference` unless the engine already has it.
pub async fn ensure_image<E: Engine>(
    engine: &E,
    reference: &str,
    progress: Progress<'_>,
) -> EngineResult<()> {
    match engine.inspect_image(reference).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => {
            info!(image = %reference, "pulling image");
            progress(&format!("pulling {reference}"));
            engine.pull_image(reference, progress).await
        }
        Err(e) => Err(e),
    }
}

/// Stop then force-remove a container, logging instead of failing.
///
/// Returns whether the container is gone.
pub async fn discard_container<E: Engine>(engine: &E, id: &str, grace: Duration) -> bool {
    if let Err(e) = engine.stop_container(id, grace).await {
        if !e.is_not_found() {
            warn!(container = %short_id(id), error = %e, "failed to stop container");
        }
    }
    match engine.remove_container(id, true).await {
        Ok(()) => true,
        Err(e) if e.is_not_found() => true,
        Err(e) => {
            warn!(container = %short_id(id), error = %e, "failed to remove container");
            false
        }
    }
}

/// First 12 characters of a container id, as the engine CLI prints them.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }
}
