#![doc = include_str!("../README.md")]

pub mod claim;
pub mod error;
pub mod generation;
pub mod naming;
pub mod retry;
pub mod watcher;

pub use error::{Error, Result};
pub use generation::{CommandGenerator, GenerationError, GenerationRequest, ImageGenerator};
pub use naming::Token;
pub use retry::RetryPolicy;
