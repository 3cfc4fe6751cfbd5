//! Upload service: request handling and pipeline coordination.
//!
//! ## Structure
//!
//! - [`handler`] - axum routes, multipart validation and error mapping.
//! - [`coordinator`] - the locked stage → generate → watch → claim pipeline.

pub mod coordinator;
pub mod handler;
