//! Modification-quiescence watching.

use super::{SessionEnd, WatchContext};
use crate::audit::{EventKind, Outcome};
use std::fs;
use std::io;
use std::time::{Instant, SystemTime};
use tracing::debug;

/// Ends the session once the file has been edited, left alone for the
/// quiescence period, and released.
///
/// A file that is never modified never ends the session this way; the
/// foreground existence check and cancellation cover that case.
#[derive(Debug, Clone)]
pub struct ModificationWatcher {
    baseline: SystemTime,
}

impl ModificationWatcher {
    /// `baseline` is the working file's mtime recorded before launch.
    pub fn new(baseline: SystemTime) -> Self {
        ModificationWatcher { baseline }
    }

    pub fn watch(mut self, ctx: &WatchContext) -> SessionEnd {
        let timings = &ctx.timings;
        let prober = ctx.prober();
        let mut quiet_since: Option<Instant> = None;

        debug!("Watching {:?} for modifications", ctx.working);
        loop {
            if ctx.is_cancelled() {
                return SessionEnd::Cancelled;
            }

            match fs::metadata(&ctx.working).and_then(|meta| meta.modified()) {
                Ok(modified) => {
                    if modified > self.baseline + timings.modification_tolerance {
                        debug!("Modification detected on {:?}", ctx.working);
                        self.baseline = modified;
                        quiet_since = Some(Instant::now());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Working file {:?} is gone", ctx.working);
                    return SessionEnd::WorkingPathGone;
                }
                Err(e) => {
                    ctx.audit.record(
                        EventKind::WatchError,
                        Outcome::Retry,
                        format!("{}: {}", ctx.working.display(), e),
                    );
                    if !ctx.pause(timings.watch_error_backoff) {
                        return SessionEnd::Cancelled;
                    }
                    continue;
                }
            }

            if let Some(since) = quiet_since {
                if since.elapsed() >= timings.quiescence {
                    debug!("No changes for {:?}; waiting for release", timings.quiescence);
                    if prober.wait_until_released(&ctx.working, timings.quiescence_release_timeout)
                    {
                        return SessionEnd::Quiescent;
                    }
                    if ctx.is_cancelled() {
                        return SessionEnd::Cancelled;
                    }
                    if !ctx.working.exists() {
                        return SessionEnd::WorkingPathGone;
                    }
                    quiet_since = Some(Instant::now());
                }
            }

            if !ctx.pause(timings.modification_poll) {
                return SessionEnd::Cancelled;
            }
        }
    }
}
