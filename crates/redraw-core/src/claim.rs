//! Artifact claim: take ownership of the pending output by renaming it.
//!
//! A readable file is not necessarily a released file. On some platforms the
//! writer keeps a handle open for a moment after the watcher's probe succeeds,
//! and the rename fails with a sharing violation. Those conflicts are retried
//! with a fixed delay; every other failure aborts the claim at once.
//!
//! A rename either happens completely or not at all, so a failed claim leaves
//! the pending output exactly where it was.

use crate::{
    Error, Result,
    retry::{Attempt, RetryError, RetryPolicy, retry},
};
use core::future::Future;
use core::time::Duration;
use std::io;
use std::path::Path;

/// Default number of rename attempts.
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Default delay between rename attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

// Windows ERROR_SHARING_VIOLATION and ERROR_LOCK_VIOLATION.
#[cfg(windows)]
const SHARING_VIOLATIONS: [i32; 2] = [32, 33];

/// Returns `true` if a rename failure means "someone still holds the file".
pub fn is_transient(err: &io::Error) -> bool {
    #[cfg(windows)]
    {
        if err
            .raw_os_error()
            .is_some_and(|code| SHARING_VIOLATIONS.contains(&code))
        {
            return true;
        }
    }

    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy
    )
}

/// Renames `src` to `dst`, retrying transient conflicts under `policy`.
///
/// # Errors
///
/// - [`Error::ClaimBusy`] if every attempt hit a transient conflict.
/// - [`Error::Io`] on the first non-transient failure.
pub async fn claim(src: &Path, dst: &Path, policy: &RetryPolicy) -> Result<()> {
    claim_with(src, dst, policy, |from, to| tokio::fs::rename(from, to)).await
}

/// [`claim`] with a caller-supplied rename operation.
pub async fn claim_with<'a, F, Fut>(
    src: &'a Path,
    dst: &'a Path,
    policy: &RetryPolicy,
    mut rename: F,
) -> Result<()>
where
    F: FnMut(&'a Path, &'a Path) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let res = retry(policy, |attempt| {
        let fut = rename(src, dst);
        async move {
            match fut.await {
                Ok(()) => Attempt::Done(()),
                Err(e) if is_transient(&e) => {
                    tracing::warn!(
                        attempt,
                        "Rename of {} failed with a sharing conflict: {e}",
                        src.display()
                    );
                    Attempt::Retry(e)
                }
                Err(e) => Attempt::Fail(e),
            }
        }
    })
    .await;

    match res {
        Ok(()) => Ok(()),
        Err(RetryError::Exhausted { attempts, last }) => {
            tracing::error!(attempts, "Giving up on claiming {}: {last}", src.display());
            Err(Error::ClaimBusy { attempts })
        }
        Err(RetryError::Fatal(e)) => {
            tracing::error!("Unexpected error while claiming {}: {e}", src.display());
            Err(Error::Io(e))
        }
    }
}
