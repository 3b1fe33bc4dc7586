//! Docker-compatible HTTP client over the engine's unix socket.
//!
//! Each request opens its own connection: the controller issues a handful
//! of calls per command and streaming endpoints (pull, build, logs) hold
//! their connection for the life of the body.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::UnixStream;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::engine::{Engine, Progress, short_id};
use crate::error::{EngineError, EngineResult};
use crate::logs::{Demuxer, ExecOutput, StreamKind};
use crate::models::*;
use crate::pull::{BuildEvent, JsonLines, PullEvent, PullTracker};
use crate::runtime::RuntimeInfo;
use crate::timeouts;

/// Oldest API version the controller speaks.
pub const MIN_API_VERSION: (u32, u32) = (1, 40);
/// Newest API version the controller speaks.
pub const MAX_API_VERSION: (u32, u32) = (1, 43);

/// Pick the request version for a server advertising `server`.
///
/// Unparseable versions fall back to the minimum.
pub fn negotiate_version(server: &str) -> String {
    let parsed = server.trim().split_once('.').and_then(|(major, minor)| {
        Some((major.parse::<u32>().ok()?, minor.parse::<u32>().ok()?))
    });
    let version = parsed
        .unwrap_or(MIN_API_VERSION)
        .clamp(MIN_API_VERSION, MAX_API_VERSION);
    format!("{}.{}", version.0, version.1)
}

/// Options for [`DockerClient::logs`].
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub follow: bool,
    /// Lines from the end; `None` means all.
    pub tail: Option<u32>,
}

pub struct DockerClient {
    runtime: RuntimeInfo,
    api_version: OnceCell<String>,
}

impl DockerClient {
    pub fn new(runtime: RuntimeInfo) -> Self {
        Self {
            runtime,
            api_version: OnceCell::new(),
        }
    }

    pub fn runtime(&self) -> &RuntimeInfo {
        &self.runtime
    }

    pub fn socket(&self) -> &Path {
        &self.runtime.socket
    }

    // ── Transport ──────────────────────────────────────────────────

    async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> EngineResult<Response<Incoming>> {
        let stream = UnixStream::connect(&self.runtime.socket)
            .await
            .map_err(|source| EngineError::Connect {
                socket: self.runtime.socket.clone(),
                source,
            })?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "engine connection closed with error");
            }
        });

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(HOST, "docker")
            .header(USER_AGENT, concat!("nap/", env!("CARGO_PKG_VERSION")));
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        let req = builder.body(Full::new(body))?;

        debug!(%method, %uri, "engine request");
        Ok(sender.send_request(req).await?)
    }

    /// Negotiated API version, fetched once per client.
    pub async fn api_version(&self) -> EngineResult<&str> {
        let version = self
            .api_version
            .get_or_try_init(|| async {
                let resp = self.send_raw(Method::GET, "/version", None, Bytes::new()).await?;
                let info: VersionInfo = read_json(check_status(resp).await?).await?;
                let version = negotiate_version(&info.api_version);
                debug!(server = %info.api_version, using = %version, "negotiated engine api version");
                Ok::<_, EngineError>(version)
            })
            .await?;
        Ok(version.as_str())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> EngineResult<Response<Incoming>> {
        let uri = format!("/v{}{path}", self.api_version().await?);
        let resp = self.send_raw(method, &uri, content_type, body).await?;
        check_status(resp).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> EngineResult<T> {
        read_json(self.request(Method::GET, path, None, Bytes::new()).await?).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> EngineResult<T> {
        let body = Bytes::from(serde_json::to_vec(body)?);
        let resp = self
            .request(Method::POST, path, Some("application/json"), body)
            .await?;
        read_json(resp).await
    }

    /// Send a request whose response body carries nothing we need.
    async fn call(&self, method: Method, path: &str, body: Option<Bytes>) -> EngineResult<()> {
        let content_type = body.as_ref().map(|_| "application/json");
        let resp = self
            .request(method, path, content_type, body.unwrap_or_default())
            .await?;
        resp.into_body().collect().await?;
        Ok(())
    }

    // ── Inherent operations ────────────────────────────────────────

    pub async fn ping(&self) -> EngineResult<()> {
        let resp = self.send_raw(Method::GET, "/_ping", None, Bytes::new()).await?;
        check_status(resp).await?.into_body().collect().await?;
        Ok(())
    }

    pub async fn version(&self) -> EngineResult<VersionInfo> {
        let resp = self.send_raw(Method::GET, "/version", None, Bytes::new()).await?;
        read_json(check_status(resp).await?).await
    }

    /// Stream a container's output to `sink`, one chunk at a time.
    pub async fn logs(
        &self,
        id: &str,
        options: &LogOptions,
        sink: &mut (dyn FnMut(StreamKind, &[u8]) + Send),
    ) -> EngineResult<()> {
        let tty = self.inspect_container(id).await?.config.tty;
        let tail = options
            .tail
            .map_or_else(|| "all".to_string(), |n| n.to_string());
        let path = format!(
            "/containers/{id}/logs?stdout=1&stderr=1&follow={}&tail={tail}",
            u8::from(options.follow)
        );
        let mut body = self.request(Method::GET, &path, None, Bytes::new()).await?.into_body();
        let mut demux = Demuxer::default();
        while let Some(frame) = body.frame().await {
            let Ok(chunk) = frame?.into_data() else {
                continue;
            };
            if tty {
                sink(StreamKind::Stdout, &chunk);
            } else {
                for (kind, payload) in demux.push(&chunk) {
                    sink(kind, &payload);
                }
            }
        }
        Ok(())
    }

    /// Run a command in a running container and collect its output.
    pub async fn exec(&self, id: &str, cmd: &[String], env: &[String]) -> EngineResult<ExecOutput> {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "PascalCase")]
        struct ExecCreated {
            id: String,
        }

        let spec = ExecCreate {
            cmd: cmd.to_vec(),
            env: env.to_vec(),
            attach_stdout: true,
            attach_stderr: true,
            tty: false,
        };
        let created: ExecCreated = self
            .post_json(&format!("/containers/{id}/exec"), &spec)
            .await?;
        debug!(container = %short_id(id), exec = %short_id(&created.id), "exec created");

        let start = Bytes::from_static(br#"{"Detach":false,"Tty":false}"#);
        let resp = self
            .request(
                Method::POST,
                &format!("/exec/{}/start", created.id),
                Some("application/json"),
                start,
            )
            .await?;

        let mut output = ExecOutput::default();
        let mut demux = Demuxer::default();
        let mut body = resp.into_body();
        while let Some(frame) = body.frame().await {
            let Ok(chunk) = frame?.into_data() else {
                continue;
            };
            for (kind, payload) in demux.push(&chunk) {
                match kind {
                    StreamKind::Stderr => output.stderr.extend_from_slice(&payload),
                    _ => output.stdout.extend_from_slice(&payload),
                }
            }
        }

        let inspect: ExecInspect = self.get_json(&format!("/exec/{}/json", created.id)).await?;
        output.exit_code = inspect.exit_code;
        Ok(output)
    }

    /// Feed newline-delimited JSON events from a streaming response to `handle`.
    async fn stream_events<T: DeserializeOwned>(
        resp: Response<Incoming>,
        mut handle: impl FnMut(T) -> EngineResult<()>,
    ) -> EngineResult<()> {
        let mut lines = JsonLines::default();
        let mut body = resp.into_body();
        while let Some(frame) = body.frame().await {
            let Ok(chunk) = frame?.into_data() else {
                continue;
            };
            for line in lines.push(&chunk) {
                handle(serde_json::from_slice(&line)?)?;
            }
        }
        if let Some(line) = lines.finish() {
            handle(serde_json::from_slice(&line)?)?;
        }
        Ok(())
    }
}

async fn check_status(resp: Response<Incoming>) -> EngineResult<Response<Incoming>> {
    let status = resp.status();
    if status.is_success() || status == StatusCode::NOT_MODIFIED {
        return Ok(resp);
    }
    let body = resp.into_body().collect().await?.to_bytes();
    let message = serde_json::from_slice::<ErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(&body).trim().to_string());
    Err(match status {
        StatusCode::NOT_FOUND => EngineError::NotFound(message),
        StatusCode::CONFLICT => EngineError::Conflict(message),
        _ => EngineError::Api {
            status: status.as_u16(),
            message,
        },
    })
}

async fn read_json<T: DeserializeOwned>(resp: Response<Incoming>) -> EngineResult<T> {
    let body = resp.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&body)?)
}

/// Bound an engine call by `after`.
async fn bounded<T>(
    op: &'static str,
    after: Duration,
    fut: impl Future<Output = EngineResult<T>>,
) -> EngineResult<T> {
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| EngineError::Timeout { op, after })?
}

/// Percent-encode a query value.
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

impl Engine for DockerClient {
    async fn create_container(&self, name: &str, config: &ContainerConfig) -> EngineResult<String> {
        let path = format!("/containers/create?name={}", encode_query(name));
        let created: CreateResponse = bounded(
            "create container",
            timeouts::CONTAINER_OP,
            self.post_json(&path, config),
        )
        .await?;
        for warning in &created.warnings {
            tracing::warn!(container = %name, %warning, "engine warning on create");
        }
        debug!(container = %name, id = %short_id(&created.id), "container created");
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        bounded(
            "start container",
            timeouts::CONTAINER_OP,
            self.call(Method::POST, &format!("/containers/{id}/start"), None),
        )
        .await
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> EngineResult<()> {
        let path = format!("/containers/{id}/stop?t={}", grace.as_secs());
        bounded(
            "stop container",
            timeouts::CONTAINER_OP + grace,
            self.call(Method::POST, &path, None),
        )
        .await
    }

    async fn remove_container(&self, id: &str, force: bool) -> EngineResult<()> {
        let path = format!("/containers/{id}?force={force}&v=false");
        bounded(
            "remove container",
            timeouts::CONTAINER_OP,
            self.call(Method::DELETE, &path, None),
        )
        .await
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerInspect> {
        bounded(
            "inspect container",
            timeouts::CONTAINER_OP,
            self.get_json(&format!("/containers/{id}/json")),
        )
        .await
    }

    async fn list_containers(
        &self,
        all: bool,
        label_filters: &[String],
    ) -> EngineResult<Vec<ContainerSummary>> {
        let mut path = format!("/containers/json?all={}", u8::from(all));
        if !label_filters.is_empty() {
            let filters = serde_json::json!({ "label": label_filters });
            path.push_str("&filters=");
            path.push_str(&encode_query(&filters.to_string()));
        }
        bounded("list containers", timeouts::CONTAINER_OP, self.get_json(&path)).await
    }

    async fn connect_network(&self, network: &str, container: &str) -> EngineResult<()> {
        let body = serde_json::to_vec(&serde_json::json!({ "Container": container }))?;
        bounded(
            "connect network",
            timeouts::NETWORK_OP,
            self.call(
                Method::POST,
                &format!("/networks/{network}/connect"),
                Some(Bytes::from(body)),
            ),
        )
        .await
    }

    async fn create_network(&self, spec: &NetworkCreate) -> EngineResult<String> {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "PascalCase")]
        struct NetworkCreated {
            id: String,
        }
        let created: NetworkCreated = bounded(
            "create network",
            timeouts::NETWORK_OP,
            self.post_json("/networks/create", spec),
        )
        .await?;
        Ok(created.id)
    }

    async fn remove_network(&self, id: &str) -> EngineResult<()> {
        bounded(
            "remove network",
            timeouts::NETWORK_OP,
            self.call(Method::DELETE, &format!("/networks/{id}"), None),
        )
        .await
    }

    async fn list_networks(&self) -> EngineResult<Vec<NetworkSummary>> {
        bounded("list networks", timeouts::NETWORK_OP, self.get_json("/networks")).await
    }

    async fn create_volume(&self, spec: &VolumeCreate) -> EngineResult<VolumeInfo> {
        bounded(
            "create volume",
            timeouts::CONTAINER_OP,
            self.post_json("/volumes/create", spec),
        )
        .await
    }

    async fn remove_volume(&self, name: &str, force: bool) -> EngineResult<()> {
        bounded(
            "remove volume",
            timeouts::CONTAINER_OP,
            self.call(Method::DELETE, &format!("/volumes/{name}?force={force}"), None),
        )
        .await
    }

    async fn inspect_volume(&self, name: &str) -> EngineResult<VolumeInfo> {
        bounded(
            "inspect volume",
            timeouts::CONTAINER_OP,
            self.get_json(&format!("/volumes/{name}")),
        )
        .await
    }

    async fn inspect_image(&self, reference: &str) -> EngineResult<ImageInspect> {
        bounded(
            "inspect image",
            timeouts::CONTAINER_OP,
            self.get_json(&format!("/images/{reference}/json")),
        )
        .await
    }

    async fn pull_image(&self, reference: &str, progress: Progress<'_>) -> EngineResult<()> {
        let (image, tag) = split_reference(reference);
        let path = format!(
            "/images/create?fromImage={}&tag={}",
            encode_query(image),
            encode_query(tag)
        );
        bounded("image pull", timeouts::IMAGE_PULL, async {
            let resp = self.request(Method::POST, &path, None, Bytes::new()).await?;
            let mut tracker = PullTracker::default();
            Self::stream_events(resp, |event: PullEvent| {
                if let Some(line) = tracker.observe(&event)? {
                    progress(&line);
                }
                Ok(())
            })
            .await?;
            let (current, total) = tracker.bytes();
            debug!(image = %reference, layers = tracker.layer_count(), current, total, "pull finished");
            Ok(())
        })
        .await
    }

    async fn build_image(
        &self,
        context: Vec<u8>,
        dockerfile: &str,
        tag: &str,
        progress: Progress<'_>,
    ) -> EngineResult<String> {
        let path = format!(
            "/build?t={}&dockerfile={}&rm=true",
            encode_query(tag),
            encode_query(dockerfile)
        );
        bounded("image build", timeouts::IMAGE_BUILD, async {
            let resp = self
                .request(Method::POST, &path, Some("application/x-tar"), Bytes::from(context))
                .await?;
            let mut image_id = String::new();
            Self::stream_events(resp, |event: BuildEvent| {
                if !event.error.is_empty() {
                    return Err(EngineError::Stream(format!("build failed: {}", event.error)));
                }
                if let Some(aux) = event.aux {
                    if !aux.id.is_empty() {
                        image_id = aux.id;
                    }
                }
                for line in event.stream.lines().filter(|l| !l.trim().is_empty()) {
                    progress(line);
                }
                Ok(())
            })
            .await?;
            if image_id.is_empty() {
                image_id = tag.to_string();
            }
            Ok(image_id)
        })
        .await
    }
}

/// Split `repo[:tag]` into repository and tag, defaulting to `latest`.
///
/// A colon inside a registry host (`host:5000/repo`) is not a tag separator.
pub fn split_reference(reference: &str) -> (&str, &str) {
    if reference.contains('@') {
        return (reference, "");
    }
    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (reference, "latest"),
    }
}

impl std::fmt::Debug for DockerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerClient")
            .field("runtime", &self.runtime.kind)
            .field("socket", &self.runtime.socket)
            .finish()
    }
}

/// Convenience for callers that only have a socket path.
impl From<PathBuf> for DockerClient {
    fn from(socket: PathBuf) -> Self {
        Self::new(RuntimeInfo::docker(socket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_clamped() {
        assert_eq!(negotiate_version("1.45"), "1.43");
        assert_eq!(negotiate_version("1.41"), "1.41");
        assert_eq!(negotiate_version("1.24"), "1.40");
        assert_eq!(negotiate_version("garbage"), "1.40");
    }

    #[test]
    fn references_split_on_tag() {
        assert_eq!(split_reference("nginx:alpine"), ("nginx", "alpine"));
        assert_eq!(split_reference("nginx"), ("nginx", "latest"));
        assert_eq!(
            split_reference("registry.local:5000/team/app"),
            ("registry.local:5000/team/app", "latest")
        );
        assert_eq!(
            split_reference("registry.local:5000/team/app:v2"),
            ("registry.local:5000/team/app", "v2")
        );
    }

    #[test]
    fn query_values_are_encoded() {
        assert_eq!(encode_query("nap-web:1700000000"), "nap-web%3A1700000000");
        assert_eq!(
            encode_query(r#"{"label":["nap.managed=true"]}"#),
            "%7B%22label%22%3A%5B%22nap.managed%3Dtrue%22%5D%7D"
        );
    }

    #[tokio::test]
    async fn missing_socket_is_a_connect_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = DockerClient::from(dir.path().join("absent.sock"));
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, EngineError::Connect { .. }));
    }
}
