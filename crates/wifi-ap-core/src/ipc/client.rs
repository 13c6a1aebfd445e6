//! IPC client: connects to the daemon over a Unix domain socket.
//!
//! Provides typed calls for the CLI. Uses `hyper` for HTTP/1.1 over the
//! Unix socket. Error envelopes from the daemon surface as
//! [`IpcClientError::Daemon`] carrying the daemon's message verbatim.

use std::path::PathBuf;

use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tokio::net::UnixStream;
use tracing::debug;

use wifi_ap_config::ConfigMap;

use super::types::*;

/// Errors from the IPC client.
#[derive(Debug, thiserror::Error)]
pub enum IpcClientError {
    #[error("failed to connect to daemon socket at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("daemon is not running (socket not found at {0})")]
    NotRunning(PathBuf),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("{0}")]
    Daemon(String),
}

/// Client for the wifi-ap control socket.
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    /// Create a new IPC client targeting the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Check if the daemon socket exists (daemon is likely running).
    pub fn daemon_available(&self) -> bool {
        self.socket_path.exists()
    }

    /// Send an HTTP request over the Unix socket and return the response body.
    async fn request(
        &self,
        method: hyper::Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, IpcClientError> {
        if !self.daemon_available() {
            return Err(IpcClientError::NotRunning(self.socket_path.clone()));
        }

        let stream =
            UnixStream::connect(&self.socket_path)
                .await
                .map_err(|e| IpcClientError::Connect {
                    path: self.socket_path.clone(),
                    source: e,
                })?;

        let io = TokioIo::new(stream);

        let (mut sender, conn) =
            hyper::client::conn::http1::handshake::<_, http_body_util::Full<Bytes>>(io)
                .await
                .map_err(|e| IpcClientError::Request(format!("HTTP handshake failed: {e}")))?;

        // Drive the connection in the background
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::warn!(error = %e, "IPC connection error");
            }
        });

        debug!(%method, path, "IPC request");

        let mut builder = hyper::Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }

        let req = builder
            .body(http_body_util::Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| IpcClientError::Request(format!("failed to build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| IpcClientError::Request(format!("request failed: {e}")))?;

        let status = resp.status();

        let resp_body = http_body_util::BodyExt::collect(resp.into_body())
            .await
            .map_err(|e| IpcClientError::Request(format!("failed to read response body: {e}")))?
            .to_bytes();

        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_slice::<Envelope<ErrorResult>>(&resp_body) {
                return Err(IpcClientError::Daemon(envelope.result.message));
            }
            return Err(IpcClientError::Request(format!(
                "unexpected status: {status}"
            )));
        }

        Ok(resp_body)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, IpcClientError> {
        let body = self.request(hyper::Method::GET, path, None).await?;
        parse_result(path, &body)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &impl serde::Serialize,
    ) -> Result<T, IpcClientError> {
        let bytes = serde_json::to_vec(payload)
            .map_err(|e| IpcClientError::Parse(format!("failed to serialize request: {e}")))?;
        let body = self.request(hyper::Method::POST, path, Some(bytes)).await?;
        parse_result(path, &body)
    }

    // ── Typed API methods ──────────────────────────────────────────────

    /// The merged configuration.
    pub async fn configuration(&self) -> Result<ConfigMap, IpcClientError> {
        self.get(CONFIGURATION_PATH).await
    }

    /// Write `items` to the data layer; the daemon restarts the access point.
    pub async fn set_configuration(&self, items: &ConfigMap) -> Result<(), IpcClientError> {
        let _: EmptyResult = self.post(CONFIGURATION_PATH, items).await?;
        Ok(())
    }

    /// Access point status.
    pub async fn status(&self) -> Result<StatusResult, IpcClientError> {
        self.get(STATUS_PATH).await
    }

    /// Restart the access point.
    pub async fn restart_ap(&self) -> Result<(), IpcClientError> {
        let _: EmptyResult = self.post(STATUS_PATH, &StatusAction::restart_ap()).await?;
        Ok(())
    }
}

/// Unwrap the `result` of a success envelope.
fn parse_result<T: DeserializeOwned>(path: &str, body: &[u8]) -> Result<T, IpcClientError> {
    let envelope: Envelope<serde_json::Value> = serde_json::from_slice(body)
        .map_err(|e| IpcClientError::Parse(format!("{path}: {e}")))?;
    if envelope.is_error() {
        let error: ErrorResult = serde_json::from_value(envelope.result)
            .map_err(|e| IpcClientError::Parse(format!("{path}: {e}")))?;
        return Err(IpcClientError::Daemon(error.message));
    }
    serde_json::from_value(envelope.result).map_err(|e| IpcClientError::Parse(format!("{path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = IpcClient::new("/tmp/test-wifi-ap-control.sock");
        assert!(!client.daemon_available());
    }

    #[tokio::test]
    async fn test_client_not_running_error() {
        let client = IpcClient::new("/tmp/nonexistent-wifi-ap-control.sock");
        let result = client.status().await;
        assert!(matches!(result, Err(IpcClientError::NotRunning(_))));
    }

    #[test]
    fn test_parse_result_surfaces_error_message() {
        let body = br#"{"result":{"message":"Invalid key \"foo\"","kind":"internal-error"},"status":"Internal Server Error","status-code":500,"type":"error"}"#;
        let err = parse_result::<EmptyResult>("/v1/configuration", body).unwrap_err();
        assert_eq!(err.to_string(), "Invalid key \"foo\"");
    }

    #[test]
    fn test_parse_result_unwraps_sync() {
        let body = br#"{"result":{"ap.active":true},"status":"OK","status-code":200,"type":"sync"}"#;
        let status: StatusResult = parse_result("/v1/status", body).unwrap();
        assert!(status.ap_active);
    }
}
