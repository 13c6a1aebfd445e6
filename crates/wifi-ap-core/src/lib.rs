#![deny(unsafe_code)]

//! wifi-ap core daemon runtime.
//!
//! Supervises the access-point program and serves the control API that the
//! CLI talks to. Configuration storage lives in `wifi-ap-config`; this crate
//! wires it to the process supervisor and the HTTP transport.

/// Daemon startup, serving, and shutdown ordering.
pub mod daemon;
/// HTTP/JSON control API over a Unix domain socket.
pub mod ipc;
/// Operations behind the control API.
pub mod service;
/// Single-child process supervisor.
pub mod supervisor;

pub use daemon::{Daemon, DaemonError, ShutdownSignal};
pub use service::{ControlService, ServiceError};
pub use supervisor::{ProcessSpec, ProcessState, Supervisor, SupervisorError};
