//! Probing whether another process still holds a file.
//!
//! A probe opens the file read-write (exclusively on Windows), takes a
//! non-blocking exclusive advisory lock and immediately lets go of both. It
//! only certifies that the file *could* be taken right now; nothing is
//! reserved, so a program re-opening the file afterwards is handled by the
//! caller's retries.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Polls a file until nobody else holds it.
#[derive(Debug, Clone)]
pub struct LockProber {
    poll_interval: Duration,
    cancel: Option<CancellationToken>,
}

impl LockProber {
    /// Creates a prober that re-checks every `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            cancel: None,
        }
    }

    /// Makes [`wait_until_released`](Self::wait_until_released) give up as
    /// soon as `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Returns true if `path` could be opened for exclusive read-write access.
    ///
    /// The file is closed again before this returns.
    pub fn try_acquire_exclusive(path: &Path) -> bool {
        match open_exclusive(path).and_then(|file| {
            file.try_lock_exclusive()?;
            file.unlock()
        }) {
            Ok(()) => true,
            Err(e) => {
                trace!(error = %e, "Exclusive probe of {:?} failed", path);
                false
            }
        }
    }

    /// Probes `path` until it is free or `timeout` has elapsed.
    ///
    /// Returns false no earlier than `timeout` after the call, unless the file
    /// has disappeared or the prober was cancelled, in which case it returns
    /// false straight away.
    pub fn wait_until_released(&self, path: &Path, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            if Self::try_acquire_exclusive(path) {
                debug!(attempts, "File {:?} released", path);
                return true;
            }
            if !path.exists() {
                debug!("File {:?} disappeared while waiting for release", path);
                return false;
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(attempts, "Timed out waiting for {:?} to be released", path);
                return false;
            }
            if !self.pause(self.poll_interval.min(deadline - now)) {
                return false;
            }
        }
    }

    // Sleeps in short slices; false means the wait was cancelled.
    fn pause(&self, duration: Duration) -> bool {
        match &self.cancel {
            None => {
                thread::sleep(duration);
                true
            }
            Some(token) => crate::watch::pause(token, duration),
        }
    }
}

fn open_exclusive(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true);
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        options.share_mode(0);
    }
    options.open(path)
}
