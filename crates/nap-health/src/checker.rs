//! HTTP health probes.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The health endpoint answered 2xx or 3xx.
    Healthy,
    /// The health endpoint answered with any other status.
    Unhealthy,
    /// The probe could not be executed (connection error or timeout).
    Failed,
}

impl ProbeResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeResult::Healthy)
    }
}

/// Issues one health probe against `address` (`ip:port`).
pub trait Prober: Send + Sync {
    fn probe(
        &self,
        address: &str,
        path: &str,
        timeout: Duration,
    ) -> impl Future<Output = ProbeResult> + Send;
}

/// Probes over plain HTTP/1.1.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpProber;

impl Prober for HttpProber {
    async fn probe(&self, address: &str, path: &str, timeout: Duration) -> ProbeResult {
        http_probe(address, path, timeout).await
    }
}

/// Whether a status code counts as healthy.
pub fn is_healthy_status(status: u16) -> bool {
    (200..400).contains(&status)
}

/// Perform an HTTP health probe against an endpoint.
///
/// Returns `Healthy` for 2xx and 3xx, `Unhealthy` otherwise, or `Failed`
/// if the connection fails or times out.
pub async fn http_probe(address: &str, path: &str, timeout: Duration) -> ProbeResult {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "health probe connection failed");
                return ProbeResult::Failed;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "health probe handshake failed");
                return ProbeResult::Failed;
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", address)
            .header("user-agent", concat!("nap-health/", env!("CARGO_PKG_VERSION")))
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %uri, "invalid health probe request");
                return ProbeResult::Failed;
            }
        };

        match sender.send_request(req).await {
            Ok(resp) if is_healthy_status(resp.status().as_u16()) => ProbeResult::Healthy,
            Ok(resp) => {
                debug!(status = %resp.status(), %uri, "health probe unhealthy status");
                ProbeResult::Unhealthy
            }
            Err(e) => {
                debug!(error = %e, %uri, "health probe request failed");
                ProbeResult::Failed
            }
        }
    })
    .await;

    match result {
        Ok(probe) => probe,
        Err(_) => {
            debug!(%uri, "health probe timed out");
            ProbeResult::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// One-shot server answering every connection with `status`.
    async fn serve(status: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = sock.read(&mut buf).await;
                let resp = format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = sock.write_all(resp.as_bytes()).await;
            }
        });
        addr
    }

    #[test]
    fn status_classes() {
        assert!(is_healthy_status(200));
        assert!(is_healthy_status(302));
        assert!(is_healthy_status(399));
        assert!(!is_healthy_status(199));
        assert!(!is_healthy_status(404));
        assert!(!is_healthy_status(503));
    }

    #[tokio::test]
    async fn probe_ok() {
        let addr = serve("200 OK").await;
        assert_eq!(http_probe(&addr, "/health", Duration::from_secs(3)).await, ProbeResult::Healthy);
    }

    #[tokio::test]
    async fn probe_redirect_is_healthy() {
        let addr = serve("301 Moved Permanently").await;
        assert_eq!(HttpProber.probe(&addr, "/", Duration::from_secs(3)).await, ProbeResult::Healthy);
    }

    #[tokio::test]
    async fn probe_server_error() {
        let addr = serve("503 Service Unavailable").await;
        assert_eq!(http_probe(&addr, "/health", Duration::from_secs(3)).await, ProbeResult::Unhealthy);
    }

    #[tokio::test]
    async fn probe_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        assert_eq!(http_probe(&addr, "/health", Duration::from_secs(1)).await, ProbeResult::Failed);
    }
}
