//! Process-exit watching.

use super::{ModificationWatcher, SessionEnd, WatchContext};
use crate::audit::{EventKind, Outcome};
use crate::errors::LockError;
use crate::launcher::ProcessHandle;
use std::time::SystemTime;
use tracing::debug;

/// Ends the session when the editor process exits and lets go of the file.
///
/// If the file stays held past the release timeout, or the handle cannot be
/// polled, watching continues with a [`ModificationWatcher`] started from the
/// same pre-launch baseline.
pub struct ProcessWatcher {
    handle: Box<dyn ProcessHandle>,
    baseline: SystemTime,
}

impl ProcessWatcher {
    pub fn new(handle: Box<dyn ProcessHandle>, baseline: SystemTime) -> Self {
        ProcessWatcher { handle, baseline }
    }

    pub fn watch(mut self, ctx: &WatchContext) -> SessionEnd {
        let timings = &ctx.timings;
        let pid = self.handle.id();
        debug!(?pid, "Watching editor process for {:?}", ctx.working);

        loop {
            if ctx.is_cancelled() {
                return SessionEnd::Cancelled;
            }
            match self.handle.has_exited() {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    ctx.audit.record(
                        EventKind::WatcherHandoff,
                        Outcome::Failure,
                        format!("Cannot poll editor process {:?}: {}", pid, e),
                    );
                    return self.hand_off(ctx);
                }
            }
            if !ctx.working.exists() {
                return SessionEnd::WorkingPathGone;
            }
            if !ctx.pause(timings.process_poll) {
                return SessionEnd::Cancelled;
            }
        }

        ctx.audit.record(
            EventKind::ProcessExited,
            Outcome::Success,
            format!("pid {:?}", pid),
        );

        if !ctx.pause(timings.settle_delay) {
            return SessionEnd::Cancelled;
        }
        if !ctx.working.exists() {
            return SessionEnd::WorkingPathGone;
        }

        if ctx
            .prober()
            .wait_until_released(&ctx.working, timings.process_release_timeout)
        {
            return SessionEnd::Released;
        }
        if ctx.is_cancelled() {
            return SessionEnd::Cancelled;
        }
        if !ctx.working.exists() {
            return SessionEnd::WorkingPathGone;
        }

        let timeout = LockError::Timeout {
            path: ctx.working.clone(),
            waited: timings.process_release_timeout,
        };
        ctx.audit
            .record(EventKind::WatcherHandoff, Outcome::Failure, timeout.to_string());
        self.hand_off(ctx)
    }

    fn hand_off(self, ctx: &WatchContext) -> SessionEnd {
        let baseline = self.baseline;
        // Reap the editor now; modification watching may run for a long time.
        drop(self);
        ModificationWatcher::new(baseline).watch(ctx)
    }
}

impl Drop for ProcessWatcher {
    fn drop(&mut self) {
        // One last poll collects an editor that has exited but not been waited on.
        match self.handle.has_exited() {
            Ok(exited) => debug!(pid = ?self.handle.id(), exited, "Released editor handle"),
            Err(e) => debug!(error = %e, "Final poll of editor handle failed"),
        }
    }
}
