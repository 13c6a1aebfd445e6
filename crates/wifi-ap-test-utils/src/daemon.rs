//! Daemon test helpers.
//!
//! [`TestDaemon`] runs a real [`Daemon`] on a [`TestLayout`] and hands out
//! a client connected to its socket.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use wifi_ap_core::ipc::IpcClient;
use wifi_ap_core::{Daemon, DaemonError};

use crate::config::TestLayout;
use crate::tracing_setup::init_test_tracing;

/// A daemon running in a background task for the length of a test.
pub struct TestDaemon {
    pub layout: TestLayout,
    daemon: Arc<Daemon>,
    task: JoinHandle<Result<(), DaemonError>>,
}

impl TestDaemon {
    /// Start a daemon on `layout` and wait until its socket accepts
    /// connections.
    pub async fn start(layout: TestLayout) -> Self {
        init_test_tracing();
        let daemon = Arc::new(Daemon::new(layout.app_config()));
        let runner = Arc::clone(&daemon);
        let task = tokio::spawn(async move { runner.run().await });

        let socket = layout.socket_path();
        let mut listening = false;
        for _ in 0..250 {
            if UnixStream::connect(&socket).await.is_ok() {
                listening = true;
                break;
            }
            if task.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(listening, "daemon never listened on {}", socket.display());

        Self {
            layout,
            daemon,
            task,
        }
    }

    /// A client for this daemon's socket.
    pub fn client(&self) -> IpcClient {
        IpcClient::new(self.layout.socket_path())
    }

    /// Shut the daemon down and return the result of its run.
    pub async fn stop(self) -> (TestLayout, Result<(), DaemonError>) {
        self.daemon.shutdown();
        let result = self.task.await.expect("daemon task panicked");
        (self.layout, result)
    }
}
