//! Daemon IPC: Unix domain socket transport for the control API.
//!
//! The daemon exposes an HTTP/JSON API over a Unix socket. The CLI connects
//! as a client to read and write configuration and to query or restart the
//! access point.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐         Unix socket        ┌──────────────┐
//! │   CLI    │───────────────────────────▶│  IPC Server  │
//! │          │  HTTP/1.1 + JSON           │  (axum)      │
//! └──────────┘                            └──────┬───────┘
//!                                                │
//!                                         ┌──────▼───────┐
//!                                         │   Control    │
//!                                         │   Service    │
//!                                         └──────────────┘
//! ```

pub mod client;
pub mod server;
pub mod types;

pub use client::{IpcClient, IpcClientError};
pub use types::*;
