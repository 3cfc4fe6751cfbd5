//! Upload pipeline under a single global lock.
//!
//! The generator always writes to the same pending path, so two generations
//! running side by side would overwrite each other's result. [`Coordinator`]
//! therefore serializes staging, generation, watching, claiming and cleanup
//! behind one mutex. Requests queue in arrival order and the service runs one
//! generation at a time.
//!
//! Worst-case lock hold time is bounded by the generator's own runtime plus
//! the watcher timeout plus `attempts x delay` of the claim.

use crate::server::config::ServerConfig;
use axum::body::Bytes;
use futures::future::BoxFuture;
use redraw_core::{
    Error, GenerationRequest, ImageGenerator, Result, RetryPolicy, Token, claim, generation, naming,
    watcher,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Rename used to claim the pending output.
pub type Renamer = Arc<dyn Fn(PathBuf, PathBuf) -> BoxFuture<'static, io::Result<()>> + Send + Sync>;

fn fs_rename(from: PathBuf, to: PathBuf) -> BoxFuture<'static, io::Result<()>> {
    Box::pin(tokio::fs::rename(from, to))
}

/// A validated upload, ready to be staged.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub prompt: String,
    pub image: Bytes,
}

pub struct Coordinator {
    input_dir: PathBuf,
    output_dir: PathBuf,
    pending_path: PathBuf,
    generator: Arc<dyn ImageGenerator>,
    poll_interval: Duration,
    wait_timeout: Duration,
    claim_policy: RetryPolicy,
    rename: Renamer,
    lock: Mutex<()>,
}

impl Coordinator {
    pub fn new(config: &ServerConfig, generator: Arc<dyn ImageGenerator>) -> Self {
        Self {
            input_dir: config.input_dir.clone(),
            output_dir: config.output_dir.clone(),
            pending_path: config.output_dir.join(&config.pending_name),
            generator,
            poll_interval: config.poll_interval,
            wait_timeout: config.wait_timeout,
            claim_policy: config.claim_policy,
            rename: Arc::new(fs_rename),
            lock: Mutex::new(()),
        }
    }

    /// Replaces the rename used for claims.
    #[cfg(test)]
    pub fn with_renamer(mut self, rename: Renamer) -> Self {
        self.rename = rename;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn pending_path(&self) -> &Path {
        &self.pending_path
    }

    /// Creates the input and output areas and quarantines a pending output
    /// left over from a previous run.
    pub async fn prepare(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.input_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;

        if let Err(e) = self.quarantine_stale().await {
            tracing::warn!("Could not quarantine stale pending output: {e}");
        }
        Ok(())
    }

    /// Runs one upload through the pipeline and returns the published name.
    ///
    /// The staged input is removed on every path; failure to remove it is
    /// logged and otherwise ignored.
    #[tracing::instrument(name = "upload", skip_all, fields(token = tracing::field::Empty))]
    pub async fn process(&self, upload: Upload) -> Result<String> {
        let _guard = self.lock.lock().await;

        let token = Token::random();
        tracing::Span::current().record("token", tracing::field::display(&token));

        let staged = self.input_dir.join(token.staged_name(&upload.filename));
        let res = self.run(token, &staged, upload).await;

        match tokio::fs::remove_file(&staged).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove staged input {}: {e}", staged.display()),
        }

        res
    }

    async fn run(&self, token: Token, staged: &Path, upload: Upload) -> Result<String> {
        tokio::fs::write(staged, &upload.image).await?;

        self.quarantine_stale().await?;

        let request = GenerationRequest {
            output_dir: self.output_dir.clone(),
            prompt: upload.prompt,
            input_image: staged.to_path_buf(),
            seed: naming::random_seed(),
        };
        generation::invoke(self.generator.as_ref(), &request).await;

        if !watcher::wait_for_file(&self.pending_path, self.wait_timeout, self.poll_interval).await
        {
            tracing::error!(
                "No output at {} after {:?}",
                self.pending_path.display(),
                self.wait_timeout
            );
            return Err(Error::Timeout);
        }

        let published = token.published_name();
        self.claim_to(&self.output_dir.join(&published)).await?;

        tracing::info!("Published {published}");
        Ok(published)
    }

    /// Moves a pending output that nobody is waiting for out of the way.
    async fn quarantine_stale(&self) -> Result<()> {
        if !tokio::fs::try_exists(&self.pending_path).await? {
            return Ok(());
        }

        let target = self.output_dir.join(Token::random().quarantine_name());
        tracing::warn!(
            "Found stale pending output, moving it to {}",
            target.display()
        );
        self.claim_to(&target).await
    }

    async fn claim_to(&self, dst: &Path) -> Result<()> {
        claim::claim_with(&self.pending_path, dst, &self.claim_policy, |from, to| {
            (self.rename)(from.to_path_buf(), to.to_path_buf())
        })
        .await
    }
}
