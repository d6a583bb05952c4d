//! The decrypt → launch → watch → re-encrypt lifecycle.
//!
//! A run moves through [`RunState`]s:
//!
//! ```text
//! Idle → Staged → Decrypted → Editing → Finalizing → Committed | RolledBack | Failed
//! ```
//!
//! Staging renames the artifact to its journal, so at every point outside a
//! rename the ciphertext lives in exactly one of the two. Any failure puts the
//! journal back over the artifact if the artifact is missing.
//!
//! # Module Structure
//!
//! - `paths`: Artifact, working and journal path derivation
//! - `finalize`: Re-encryption with rollback, and cleanup
//! - `recovery`: Restoring artifacts after an interrupted run

pub mod finalize;
pub mod paths;
pub mod recovery;

pub use self::finalize::{CommitSummary, FinalizeOutcome, Finalizer};
pub use self::paths::{occupied, RunPaths};
pub use self::recovery::{recover, RecoveryAction, RecoveryOutcome};

use crate::audit::{Audit, EventKind, Outcome};
use crate::config::Timings;
use crate::constants::{TRACING_ROOT_SPAN_NAME, TRACING_SERVICE_NAME};
use crate::crypto::{CipherCodec, DecryptOutcome};
use crate::errors::{AppError, AppResult, ConflictingPath};
use crate::launcher::Launcher;
use crate::watch::{SessionEnd, WatchContext, WatchStrategy};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Lifecycle states of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Staged,
    Decrypted,
    Editing,
    Finalizing,
    Committed,
    RolledBack,
    Failed,
}

/// Why a run did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The artifact does not exist.
    Missing,
    /// The artifact path is not a regular file.
    NotAFile,
    /// The file name lacks the encrypted suffix.
    NotEncrypted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Missing => write!(f, "file does not exist"),
            SkipReason::NotAFile => write!(f, "not a regular file"),
            SkipReason::NotEncrypted => write!(f, "not an encrypted artifact"),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// Nothing on disk was touched.
    Skipped { artifact: PathBuf, reason: SkipReason },
    /// The session ran and was finalized.
    Finished {
        end: SessionEnd,
        outcome: FinalizeOutcome,
    },
}

impl RunReport {
    /// Final state of the run.
    ///
    /// A session whose working file vanished before finalization ends with
    /// the original ciphertext put back, which is a rollback.
    pub fn state(&self) -> RunState {
        match self {
            RunReport::Skipped { .. } => RunState::Idle,
            RunReport::Finished {
                outcome: FinalizeOutcome::AlreadyFinalized,
                ..
            } => RunState::RolledBack,
            RunReport::Finished { .. } => RunState::Committed,
        }
    }
}

struct Session {
    strategy: WatchStrategy,
    baseline_digest: Option<blake3::Hash>,
}

/// Drives one artifact through the lifecycle.
#[derive(Clone)]
pub struct Controller {
    codec: CipherCodec,
    launcher: Arc<dyn Launcher>,
    timings: Timings,
    audit: Audit,
}

impl Controller {
    pub fn new(
        codec: CipherCodec,
        launcher: Arc<dyn Launcher>,
        timings: Timings,
        audit: Audit,
    ) -> Self {
        Controller {
            codec,
            launcher,
            timings,
            audit,
        }
    }

    /// Decrypts `artifact`, opens it, waits for the session to end and
    /// re-encrypts it.
    ///
    /// Cancelling `cancel` ends the session early; finalization still runs to
    /// completion before this returns.
    ///
    /// # Errors
    ///
    /// - `AppError::PreconditionConflict` when a working or journal file
    ///   already exists; nothing is changed.
    /// - `AppError::RolledBack` when re-encryption failed and the original
    ///   ciphertext was restored.
    /// - Any I/O or cipher error from staging or decryption, after the
    ///   artifact has been restored.
    pub async fn run(&self, artifact: &Path, cancel: CancellationToken) -> AppResult<RunReport> {
        let span = info_span!(
            TRACING_ROOT_SPAN_NAME,
            service = TRACING_SERVICE_NAME,
            run_id = %self.audit.run_id(),
            artifact = %artifact.display()
        );
        self.run_session(artifact, cancel).instrument(span).await
    }

    async fn run_session(&self, artifact: &Path, cancel: CancellationToken) -> AppResult<RunReport> {
        let paths = match RunPaths::from_artifact(artifact) {
            Ok(paths) => paths,
            Err(AppError::NotEncrypted(_)) => {
                return Ok(self.skip(artifact, SkipReason::NotEncrypted))
            }
            Err(e) => return Err(e),
        };
        match fs::metadata(&paths.artifact) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(self.skip(artifact, SkipReason::NotAFile)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(self.skip(artifact, SkipReason::Missing))
            }
            Err(e) => return Err(e.into()),
        }
        self.check_conflicts(&paths)?;

        let opened = {
            let this = self.clone();
            let paths = paths.clone();
            tokio::task::spawn_blocking(move || this.open_session(&paths)).await
        };
        let session = match opened {
            Ok(session) => session?,
            Err(e) => {
                self.abort_open(&paths);
                return Err(task_failed(e));
            }
        };

        let watch_token = cancel.child_token();
        let ctx = WatchContext {
            working: paths.working.clone(),
            timings: self.timings.clone(),
            audit: self.audit.clone(),
            token: watch_token.clone(),
        };
        let strategy = session.strategy;
        self.audit
            .record(EventKind::WatcherStarted, Outcome::Success, strategy.name());

        let (sender, receiver) = oneshot::channel();
        tokio::task::spawn_blocking(move || {
            let _ = sender.send(strategy.watch(&ctx));
        });
        self.enter(RunState::Editing);

        let end = self
            .await_session_end(&paths.working, receiver, &cancel)
            .await;
        // The watcher must not probe the file while it is re-encrypted.
        watch_token.cancel();
        self.audit
            .record(EventKind::SessionEnded, Outcome::Success, format!("{:?}", end));

        self.enter(RunState::Finalizing);
        let finalizer = Finalizer::new(
            paths.clone(),
            self.codec.clone(),
            self.timings.clone(),
            self.audit.clone(),
        )
        .with_baseline_digest(session.baseline_digest);
        let result = match tokio::task::spawn_blocking(move || finalizer.finalize()).await {
            Ok(result) => result,
            Err(e) => Err(task_failed(e)),
        };

        match result {
            Ok(outcome) => {
                let report = RunReport::Finished { end, outcome };
                self.enter(report.state());
                Ok(report)
            }
            Err(e) => {
                restore_journal(&paths, &self.audit);
                if matches!(e, AppError::RolledBack { .. }) {
                    self.enter(RunState::RolledBack);
                } else {
                    self.audit
                        .record(EventKind::Fault, Outcome::Failure, e.to_string());
                    self.enter(RunState::Failed);
                }
                Err(e)
            }
        }
    }

    fn skip(&self, artifact: &Path, reason: SkipReason) -> RunReport {
        warn!("Skipping {:?}: {}", artifact, reason);
        RunReport::Skipped {
            artifact: artifact.to_path_buf(),
            reason,
        }
    }

    fn enter(&self, state: RunState) {
        info!(?state, "Run state changed");
    }

    fn check_conflicts(&self, paths: &RunPaths) -> AppResult<()> {
        let conflict = if occupied(&paths.working) {
            Some((ConflictingPath::Working, &paths.working))
        } else if occupied(&paths.journal) {
            Some((ConflictingPath::Journal, &paths.journal))
        } else {
            None
        };

        match conflict {
            Some((conflict, path)) => {
                let error = AppError::PreconditionConflict {
                    artifact: paths.artifact.clone(),
                    path: path.clone(),
                    conflict,
                };
                self.audit
                    .record(EventKind::Conflict, Outcome::Failure, error.to_string());
                Err(error)
            }
            None => Ok(()),
        }
    }

    // Stage, decrypt and launch. Runs on a blocking thread.
    fn open_session(&self, paths: &RunPaths) -> AppResult<Session> {
        fs::rename(&paths.artifact, &paths.journal)?;
        self.audit.record(
            EventKind::Staged,
            Outcome::Success,
            paths.journal.display().to_string(),
        );
        self.enter(RunState::Staged);

        match self.decrypt_and_launch(paths) {
            Ok(session) => Ok(session),
            Err(e) => {
                self.audit
                    .record(EventKind::Fault, Outcome::Failure, e.to_string());
                self.abort_open(paths);
                self.enter(RunState::Failed);
                Err(e)
            }
        }
    }

    fn decrypt_and_launch(&self, paths: &RunPaths) -> AppResult<Session> {
        match self.codec.decrypt_file(&paths.journal, &paths.working)? {
            DecryptOutcome::Decrypted => self.audit.record(
                EventKind::Decrypted,
                Outcome::Success,
                paths.working.display().to_string(),
            ),
            DecryptOutcome::CopiedVerbatim => self.audit.record(
                EventKind::DecryptFallback,
                Outcome::Success,
                format!(
                    "{} is not ciphertext; opened its bytes unchanged",
                    paths.journal.display()
                ),
            ),
        }
        self.enter(RunState::Decrypted);

        clear_readonly(&paths.working)?;
        let baseline = fs::metadata(&paths.working)?.modified()?;
        let baseline_digest = digest(&paths.working).ok();

        let handle = match self.launcher.launch(&paths.working) {
            Ok(handle) => {
                self.audit.record(
                    EventKind::Launched,
                    Outcome::Success,
                    format!("{} (pid {:?})", paths.working.display(), handle.id()),
                );
                Some(handle)
            }
            Err(e) => {
                self.audit
                    .record(EventKind::LaunchFailed, Outcome::Failure, e.to_string());
                None
            }
        };

        Ok(Session {
            strategy: WatchStrategy::select(handle, baseline),
            baseline_digest,
        })
    }

    // Undo a partially opened session.
    fn abort_open(&self, paths: &RunPaths) {
        if paths.working.exists() {
            let _ = clear_readonly(&paths.working);
            if let Err(e) = fs::remove_file(&paths.working) {
                warn!(error = %e, "Could not remove partial working file {:?}", paths.working);
            }
        }
        restore_journal(paths, &self.audit);
    }

    async fn await_session_end(
        &self,
        working: &Path,
        mut receiver: oneshot::Receiver<SessionEnd>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let period = self.timings.foreground_poll.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut watcher_lost = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.audit.record(EventKind::Cancelled, Outcome::Success, "finalizing now");
                    return SessionEnd::Cancelled;
                }
                end = &mut receiver, if !watcher_lost => match end {
                    Ok(end) => return end,
                    Err(_) => {
                        watcher_lost = true;
                        self.audit.record(
                            EventKind::WatchError,
                            Outcome::Failure,
                            "Watcher stopped without a result; waiting for cancellation or removal",
                        );
                    }
                },
                _ = ticker.tick() => {
                    if !working.exists() {
                        debug!("Working file {:?} disappeared", working);
                        return SessionEnd::WorkingPathGone;
                    }
                }
            }
        }
    }
}

/// Renames the journal back to the artifact when the artifact is missing.
///
/// Returns true if a rename happened.
pub(crate) fn restore_journal(paths: &RunPaths, audit: &Audit) -> bool {
    if !occupied(&paths.journal) || occupied(&paths.artifact) {
        return false;
    }
    match fs::rename(&paths.journal, &paths.artifact) {
        Ok(()) => {
            audit.record(
                EventKind::JournalRestored,
                Outcome::Success,
                paths.artifact.display().to_string(),
            );
            true
        }
        Err(e) => {
            audit.record(
                EventKind::JournalRestored,
                Outcome::Failure,
                format!(
                    "{} -> {}: {}",
                    paths.journal.display(),
                    paths.artifact.display(),
                    e
                ),
            );
            false
        }
    }
}

pub(crate) fn clear_readonly(path: &Path) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = permissions.mode();
        if mode & 0o200 != 0 {
            return Ok(());
        }
        permissions.set_mode(mode | 0o200);
    }
    #[cfg(not(unix))]
    {
        if !permissions.readonly() {
            return Ok(());
        }
        permissions.set_readonly(false);
    }
    fs::set_permissions(path, permissions)
}

pub(crate) fn digest(path: &Path) -> io::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(File::open(path)?)?;
    Ok(hasher.finalize())
}

fn task_failed(error: tokio::task::JoinError) -> AppError {
    AppError::Unexpected(format!("Background task failed: {}", error))
}
