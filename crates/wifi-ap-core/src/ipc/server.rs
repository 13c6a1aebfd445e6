//! IPC server: axum HTTP router over a Unix domain socket.
//!
//! Routes:
//!
//! | Method | Path | Result |
//! |--------|------|--------|
//! | GET | `/v1/configuration` | merged configuration map |
//! | POST | `/v1/configuration` | `{}` after write + restart |
//! | GET | `/v1/status` | `{"ap.active": bool}` |
//! | POST | `/v1/status` | `{}` after running the action |
//!
//! Any other method on these paths answers with the error envelope.

use std::path::Path;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use wifi_ap_config::ConfigMap;

use super::types::*;
use crate::daemon::ShutdownSignal;
use crate::service::{ControlService, ServiceError};

type ApiResult<T> = Result<Json<Envelope<T>>, ServiceError>;

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match std::error::Error::source(&self) {
            Some(cause) => warn!(error = %self, cause = %cause, "Request failed"),
            None => warn!(error = %self, "Request failed"),
        }
        let code = StatusCode::INTERNAL_SERVER_ERROR;
        (code, Json(Envelope::error(code, self.to_string()))).into_response()
    }
}

/// Build the axum router with all API routes.
pub fn router(service: Arc<ControlService>) -> axum::Router {
    axum::Router::new()
        .route(
            CONFIGURATION_PATH,
            get(handle_get_configuration)
                .post(handle_post_configuration)
                .fallback(handle_invalid_method),
        )
        .route(
            STATUS_PATH,
            get(handle_get_status)
                .post(handle_post_status)
                .fallback(handle_invalid_method),
        )
        .with_state(service)
}

/// Bind the control socket.
///
/// A stale socket file left by a previous run is removed first and the
/// parent directory is created if needed.
pub fn bind(socket_path: &Path) -> Result<UnixListener, std::io::Error> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    info!(path = %socket_path.display(), "Control socket listening");
    Ok(listener)
}

/// Serve the API on `listener` until a shutdown signal arrives.
///
/// Returns once in-flight requests have drained. The socket file is left
/// for the caller to remove.
pub async fn serve(
    listener: UnixListener,
    service: Arc<ControlService>,
    mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Control socket shutting down");
        })
        .await
}

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_get_configuration(
    State(service): State<Arc<ControlService>>,
) -> ApiResult<ConfigMap> {
    let config = service.configuration().await?;
    Ok(Json(Envelope::sync(config)))
}

async fn handle_post_configuration(
    State(service): State<Arc<ControlService>>,
    body: Bytes,
) -> ApiResult<EmptyResult> {
    service.update_configuration(&body).await?;
    Ok(Json(Envelope::sync(EmptyResult::default())))
}

async fn handle_get_status(State(service): State<Arc<ControlService>>) -> ApiResult<StatusResult> {
    Ok(Json(Envelope::sync(service.status())))
}

async fn handle_post_status(
    State(service): State<Arc<ControlService>>,
    body: Bytes,
) -> ApiResult<EmptyResult> {
    info!("Status action requested via API");
    service.apply_action(&body).await?;
    Ok(Json(Envelope::sync(EmptyResult::default())))
}

async fn handle_invalid_method() -> ServiceError {
    ServiceError::InvalidMethod
}
