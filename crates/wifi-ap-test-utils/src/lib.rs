#![deny(unsafe_code)]

//! Shared test utilities for the wifi-ap workspace.
//!
//! Provides throwaway install/data/user directory layouts, a running daemon
//! harness, and tracing helpers so that individual crate tests stay concise
//! and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! wifi-ap-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod tracing_setup;

pub use config::{TestLayout, TestLayoutBuilder};
pub use daemon::TestDaemon;
