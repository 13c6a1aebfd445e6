//! Core daemon process: startup, shutdown, and the serving loop.
//!
//! Startup order:
//!
//! 1. load the whitelist from the default layer
//! 2. start the access point
//! 3. bind the control socket and serve
//!
//! On SIGINT, SIGTERM, or [`Daemon::shutdown`] the server stops accepting,
//! drains in-flight requests, then the access point is stopped and the
//! socket file removed.

use std::sync::{Arc, Mutex};

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;
use tracing::{info, warn};

use wifi_ap_config::{AppConfig, ConfigStore, Whitelist};

use crate::ipc::server;
use crate::service::ControlService;
use crate::supervisor::{ProcessSpec, Supervisor, SupervisorError};

/// Shutdown signal sent via broadcast channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal;

/// The wifi-ap control daemon.
pub struct Daemon {
    config: AppConfig,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    /// Subscribed at construction so a shutdown requested before or during
    /// startup is still seen by the first `run`.
    shutdown_rx: Mutex<Option<broadcast::Receiver<ShutdownSignal>>>,
}

impl Daemon {
    /// Create a new daemon instance with the given configuration.
    pub fn new(config: AppConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        Self {
            config,
            shutdown_tx,
            shutdown_rx: Mutex::new(Some(shutdown_rx)),
        }
    }

    /// Run the daemon until a shutdown signal is received.
    pub async fn run(&self) -> Result<(), DaemonError> {
        let shutdown_rx = self.shutdown_receiver();
        let layers = self.config.layers();
        let socket_path = self.config.socket_path();
        info!(
            data_dir = %self.config.paths.data_dir,
            socket = %socket_path.display(),
            "wifi-ap daemon starting"
        );

        let whitelist = match Whitelist::load(layers.default_layer()).await {
            Ok(whitelist) => whitelist,
            Err(e) => {
                warn!(error = %e, "No whitelist available, configuration writes will be refused");
                Whitelist::empty()
            }
        };

        let spec =
            ProcessSpec::new(self.config.ap_program()).with_args(self.config.daemon.ap_args.clone());
        let supervisor = Arc::new(Supervisor::new(spec));
        supervisor.start().await?;

        let service = Arc::new(ControlService::new(
            ConfigStore::new(layers),
            whitelist,
            Arc::clone(&supervisor),
        ));

        let signals = tokio::spawn(forward_signals(self.shutdown_tx.clone()));

        let served = match server::bind(&socket_path) {
            Ok(listener) => server::serve(listener, service, shutdown_rx).await,
            Err(e) => Err(e),
        };
        signals.abort();

        let stopped = supervisor.stop().await;
        if let Err(e) = std::fs::remove_file(&socket_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %socket_path.display(), error = %e, "Failed to remove control socket");
        }

        served?;
        stopped?;
        info!("Daemon stopped");
        Ok(())
    }

    fn shutdown_receiver(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.shutdown_rx
            .lock()
            .ok()
            .and_then(|mut rx| rx.take())
            .unwrap_or_else(|| self.shutdown_tx.subscribe())
    }

    /// Request a graceful shutdown of the daemon.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(ShutdownSignal);
    }

    /// Get a reference to the daemon's configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Turn SIGINT/SIGTERM into a broadcast shutdown.
async fn forward_signals(shutdown_tx: broadcast::Sender<ShutdownSignal>) {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            let _ = shutdown_tx.send(ShutdownSignal);
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => warn!("Ctrl-C received, initiating graceful shutdown"),
        _ = terminate.recv() => info!("SIGTERM received, initiating graceful shutdown"),
    }
    let _ = shutdown_tx.send(ShutdownSignal);
}

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("failed to start access point: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
