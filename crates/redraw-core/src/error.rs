//! Error types for the upload-to-result pipeline.
//!
//! This module defines the central `Error` enum, which captures every failure
//! a single upload can end in. The server crate maps each variant onto an HTTP
//! status, so the `Display` text of a variant is what clients see.
//!
//! ## Error Cases
//! - `MissingImage`, `MissingPrompt`, `EmptyFilename`, `InvalidUpload`: the
//!   client request was malformed.
//! - `Timeout`: the generator never produced a readable output in time.
//! - `ClaimBusy`: the output stayed locked through every rename attempt.
//! - `Io`: any other filesystem failure inside the critical section.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for a single upload.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The multipart body has no `image` file part.
    #[error("No image part in the request")]
    MissingImage,

    /// The multipart body has no `prompt` part, or it is blank.
    #[error("No prompt provided")]
    MissingPrompt,

    /// The `image` part was sent with an empty filename.
    #[error("No selected image")]
    EmptyFilename,

    /// The multipart body could not be parsed.
    #[error("Invalid upload: {reason}")]
    InvalidUpload { reason: String },

    /// The pending output did not become readable before the watcher gave up.
    #[error("Processing timed out. Edited image not found.")]
    Timeout,

    /// Every rename attempt hit a sharing or permission conflict.
    #[error("File is in use and cannot be renamed after several retries.")]
    ClaimBusy { attempts: u32 },

    /// Any other filesystem failure.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for errors caused by the request itself rather than by
    /// the pipeline.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingImage | Self::MissingPrompt | Self::EmptyFilename | Self::InvalidUpload { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_match_wire_contract() {
        assert_eq!(Error::MissingImage.to_string(), "No image part in the request");
        assert_eq!(Error::MissingPrompt.to_string(), "No prompt provided");
        assert_eq!(Error::EmptyFilename.to_string(), "No selected image");
    }

    #[test]
    fn timeout_and_busy_are_distinct_server_errors() {
        let timeout = Error::Timeout;
        let busy = Error::ClaimBusy { attempts: 5 };
        assert_ne!(timeout.to_string(), busy.to_string());
        assert!(!timeout.is_client_error());
        assert!(!busy.is_client_error());
    }

    #[test]
    fn io_error_keeps_raw_message() {
        let err = Error::from(std::io::Error::other("disk on fire"));
        assert_eq!(err.to_string(), "disk on fire");
        assert!(!err.is_client_error());
    }
}
