//! Server-side components of `redraw-server`.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration and validation.
//! - [`service`] - HTTP handlers and the upload coordinator.
//! - [`telemetry`] - `tracing` subscriber initialization.

pub mod config;
pub mod service;
pub mod telemetry;
