//! Completion watcher for the pending output.
//!
//! The generator runs in another process and gives no completion signal, so
//! the only evidence that it finished is the output file itself. A file that
//! merely exists may still be half-written or held exclusively by the writer;
//! the watcher therefore only reports ready once the file can also be opened
//! for reading.

use crate::retry::{Attempt, RetryPolicy, retry};
use core::time::Duration;
use std::io;
use std::path::Path;
use tokio::fs::File;

/// Default interval between readiness probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default upper bound on how long to wait for the output.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Polls `path` until it is readable or `timeout` elapses.
///
/// Returns `true` once the file exists and opens for reading, `false` on
/// timeout. Never fails: every I/O error on a probe counts as "not ready yet".
#[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn wait_for_file(path: &Path, timeout: Duration, poll_interval: Duration) -> bool {
    let policy = RetryPolicy::deadline(timeout, poll_interval);
    let res = retry(&policy, |attempt| async move {
        match probe(path).await {
            Ok(()) => Attempt::Done(attempt),
            Err(e) => Attempt::<u32, io::Error>::Retry(e),
        }
    })
    .await;

    match res {
        Ok(attempts) => {
            tracing::debug!(attempts, "Pending output is readable");
            true
        }
        Err(e) => {
            tracing::debug!("Pending output never became readable: {e}");
            false
        }
    }
}

/// One readiness probe: the path must be a regular file that opens for reading.
async fn probe(path: &Path) -> io::Result<()> {
    let file = File::open(path).await?;
    let meta = file.metadata().await?;
    if meta.is_file() {
        Ok(())
    } else {
        Err(io::Error::other("pending output is not a regular file"))
    }
}
