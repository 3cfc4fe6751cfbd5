//! Boundary to the external image-generation service.
//!
//! The generator is a black box: it is handed an output directory, a prompt,
//! the staged input image and a seed, and is expected to eventually write a
//! single fixed-name file into the output directory. Returning from
//! [`ImageGenerator::generate`] does **not** mean that file is complete; the
//! completion watcher decides that.
//!
//! Failures never cross this boundary. [`invoke`] logs them and returns, and
//! the missing output later surfaces as a timeout.

use core::time::Duration;
use futures::future::BoxFuture;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// Everything one generation needs. Lives for a single invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    pub output_dir: PathBuf,
    pub prompt: String,
    pub input_image: PathBuf,
    pub seed: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum GenerationError {
    /// The generator process could not be started.
    #[error("failed to launch generator {program:?}: {source}")]
    Spawn { program: OsString, source: io::Error },

    /// The generator ran but reported failure.
    #[error("generator exited with {0}")]
    Exit(ExitStatus),

    /// The generator was killed after running past its time limit.
    #[error("generator did not finish within {0:?}")]
    TimedOut(Duration),

    /// Failure reported by a generator that is not an external program.
    ///
    /// [`ImageGenerator`] is public so an embedder can plug in an in-process
    /// or remote backend; this is how such a backend reports failure.
    #[error("{0}")]
    Other(String),
}

/// An out-of-process image generator.
pub trait ImageGenerator: Send + Sync {
    /// Runs one generation. Synchronous from the caller's point of view, but
    /// the output file may still be in flight when this resolves.
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<(), GenerationError>>;
}

/// Runs an external program once per request.
///
/// The program is invoked as
/// `<program> [args...] <output_dir> <prompt> <input_image> <seed>`
/// and is considered successful when it exits with status zero.
#[derive(Clone, Debug)]
pub struct CommandGenerator {
    program: OsString,
    args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Leading arguments placed before the per-request ones.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Kill the child if it runs longer than `timeout`.
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, request: &GenerationRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&request.output_dir)
            .arg(&request.prompt)
            .arg(&request.input_image)
            .arg(request.seed.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, request: &GenerationRequest) -> Result<(), GenerationError> {
        let mut cmd = self.command(request);
        let status = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.status())
                .await
                .map_err(|_| GenerationError::TimedOut(limit))?,
            None => cmd.status().await,
        }
        .map_err(|source| GenerationError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(GenerationError::Exit(status))
        }
    }
}

impl ImageGenerator for CommandGenerator {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<(), GenerationError>> {
        Box::pin(self.run(request))
    }
}

/// Calls `generator` and swallows any failure after logging it.
#[tracing::instrument(skip_all, fields(seed = request.seed))]
pub async fn invoke(generator: &dyn ImageGenerator, request: &GenerationRequest) {
    tracing::info!(
        "Generating into {} from {} with prompt {:?}",
        request.output_dir.display(),
        request.input_image.display(),
        request.prompt
    );
    match generator.generate(request).await {
        Ok(()) => tracing::debug!("Generator returned"),
        Err(e) => tracing::error!("An error occurred in the generator: {e}"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn request(output_dir: PathBuf) -> GenerationRequest {
        GenerationRequest {
            input_image: output_dir.join("Temp_x.png"),
            output_dir,
            prompt: "a red fox, lineart".to_string(),
            seed: 123_456_789_012_345,
        }
    }

    fn shell(script: &str) -> CommandGenerator {
        CommandGenerator::new("sh").with_args(["-c", script, "generator"])
    }

    #[tokio::test]
    async fn passes_request_as_positional_arguments() {
        let dir = tempdir().unwrap();
        let req = request(dir.path().to_path_buf());
        let generator = shell(r#"printf '%s|%s|%s' "$2" "$3" "$4" > "$1/image.png""#);

        generator.generate(&req).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("image.png")).unwrap();
        assert_eq!(
            written,
            format!(
                "a red fox, lineart|{}|123456789012345",
                req.input_image.display()
            )
        );
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let dir = tempdir().unwrap();
        let err = shell("exit 3")
            .generate(&request(dir.path().to_path_buf()))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Exit(status) if status.code() == Some(3)));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let dir = tempdir().unwrap();
        let err = CommandGenerator::new("/nonexistent/redraw-generator")
            .generate(&request(dir.path().to_path_buf()))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Spawn { .. }));
    }

    #[tokio::test]
    async fn slow_generator_is_killed() {
        let dir = tempdir().unwrap();
        let err = shell("sleep 5")
            .with_timeout(Some(Duration::from_millis(100)))
            .generate(&request(dir.path().to_path_buf()))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::TimedOut(_)));
    }

    #[tokio::test]
    async fn invoke_swallows_failures() {
        let dir = tempdir().unwrap();
        invoke(&shell("exit 1"), &request(dir.path().to_path_buf())).await;
        assert!(!dir.path().join("image.png").exists());
    }
}
