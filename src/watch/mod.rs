//! Deciding when an editing session is over.
//!
//! Two strategies exist. When the opener handed back a live process, the
//! [`ProcessWatcher`] waits for that process to exit and for the file to be
//! released. Otherwise, or when the process route times out, the
//! [`ModificationWatcher`] waits for the file to stop changing and then for
//! it to be released.
//!
//! Watchers are blocking and run on a blocking thread. They observe a
//! [`CancellationToken`] between polls and return [`SessionEnd::Cancelled`]
//! promptly once it fires.

pub mod modification;
pub mod process;

pub use self::modification::ModificationWatcher;
pub use self::process::ProcessWatcher;

use crate::audit::Audit;
use crate::config::Timings;
use crate::constants::CANCEL_CHECK_INTERVAL;
use crate::launcher::ProcessHandle;
use crate::lock::LockProber;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;

/// Why a watcher stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The file was released after the editor went away.
    Released,
    /// The file stopped changing and was released.
    Quiescent,
    /// The working file disappeared.
    WorkingPathGone,
    /// The run was cancelled.
    Cancelled,
}

/// What a watcher needs to observe one working file.
#[derive(Debug, Clone)]
pub struct WatchContext {
    pub working: PathBuf,
    pub timings: Timings,
    pub audit: Audit,
    pub token: CancellationToken,
}

impl WatchContext {
    /// A lock prober wired to this context's poll interval and token.
    pub fn prober(&self) -> LockProber {
        LockProber::new(self.timings.lock_poll).with_cancellation(self.token.clone())
    }

    /// Sleeps for `duration`; false if cancelled meanwhile.
    pub fn pause(&self, duration: Duration) -> bool {
        pause(&self.token, duration)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// The watcher picked for a run.
pub enum WatchStrategy {
    Process(ProcessWatcher),
    Modification(ModificationWatcher),
}

impl WatchStrategy {
    /// Process watching when a handle is available, modification watching otherwise.
    pub fn select(handle: Option<Box<dyn ProcessHandle>>, baseline: SystemTime) -> Self {
        match handle {
            Some(handle) => WatchStrategy::Process(ProcessWatcher::new(handle, baseline)),
            None => WatchStrategy::Modification(ModificationWatcher::new(baseline)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WatchStrategy::Process(_) => "process",
            WatchStrategy::Modification(_) => "modification",
        }
    }

    /// Blocks until the session ends.
    pub fn watch(self, ctx: &WatchContext) -> SessionEnd {
        match self {
            WatchStrategy::Process(watcher) => watcher.watch(ctx),
            WatchStrategy::Modification(watcher) => watcher.watch(ctx),
        }
    }
}

/// Sleeps for `duration` in short slices, returning false as soon as `token`
/// is cancelled.
pub fn pause(token: &CancellationToken, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if token.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(CANCEL_CHECK_INTERVAL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_sleeps_full_duration() {
        let token = CancellationToken::new();
        let start = Instant::now();
        assert!(pause(&token, Duration::from_millis(150)));
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_pause_stops_on_cancel() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let start = Instant::now();
        assert!(!pause(&token, Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn test_select_by_handle_presence() {
        let strategy = WatchStrategy::select(None, SystemTime::now());
        assert_eq!(strategy.name(), "modification");
    }
}
