//! Re-encryption and cleanup at the end of a session.

use super::{clear_readonly, digest, restore_journal, RunPaths};
use crate::audit::{Audit, EventKind, Outcome};
use crate::config::Timings;
use crate::crypto::CipherCodec;
use crate::errors::{AppError, AppResult};
use std::fs;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, info};

/// What finalization did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The artifact holds the re-encrypted working file.
    Committed(CommitSummary),
    /// Finalization already ran, or there was no working file to commit.
    AlreadyFinalized,
}

/// Details of a committed finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    /// Whether the plaintext changed during the session, if known.
    pub content_changed: Option<bool>,
    pub working_deleted: bool,
    pub journal_deleted: bool,
}

/// Commits a session exactly once.
#[derive(Debug)]
pub struct Finalizer {
    paths: RunPaths,
    codec: CipherCodec,
    timings: Timings,
    audit: Audit,
    baseline_digest: Option<blake3::Hash>,
    started: AtomicBool,
}

impl Finalizer {
    pub fn new(paths: RunPaths, codec: CipherCodec, timings: Timings, audit: Audit) -> Self {
        Finalizer {
            paths,
            codec,
            timings,
            audit,
            baseline_digest: None,
            started: AtomicBool::new(false),
        }
    }

    /// Digest of the working file right after decryption.
    pub fn with_baseline_digest(mut self, digest: Option<blake3::Hash>) -> Self {
        self.baseline_digest = digest;
        self
    }

    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    /// Re-encrypts the working file into the artifact and cleans up.
    ///
    /// Only the first call does anything. A missing working file is a no-op,
    /// apart from putting the journal back if the artifact is also missing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::RolledBack` when every re-encryption attempt failed;
    /// the journal is then back in place as the artifact and the plaintext is
    /// left for manual recovery. Other errors pass through the journal
    /// safeguard before being returned.
    pub fn finalize(&self) -> AppResult<FinalizeOutcome> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Finalization already ran for {:?}", self.paths.artifact);
            return Ok(FinalizeOutcome::AlreadyFinalized);
        }

        if !self.paths.working.exists() {
            debug!("Working file {:?} is already gone", self.paths.working);
            restore_journal(&self.paths, &self.audit);
            return Ok(FinalizeOutcome::AlreadyFinalized);
        }

        match self.commit() {
            Ok(summary) => Ok(FinalizeOutcome::Committed(summary)),
            Err(e) => {
                restore_journal(&self.paths, &self.audit);
                Err(e)
            }
        }
    }

    fn commit(&self) -> AppResult<CommitSummary> {
        let content_changed = match (self.baseline_digest, digest(&self.paths.working)) {
            (Some(before), Ok(after)) => Some(before != after),
            _ => None,
        };

        self.reencrypt()?;

        let working_deleted = match self.remove_working() {
            Ok(()) => {
                self.audit.record(
                    EventKind::WorkingDeleted,
                    Outcome::Success,
                    self.paths.working.display().to_string(),
                );
                true
            }
            Err(e) => {
                self.audit
                    .record(EventKind::WorkingDeleteFailed, Outcome::Failure, e.to_string());
                false
            }
        };

        let journal_deleted = match fs::remove_file(&self.paths.journal) {
            Ok(()) => {
                self.audit.record(
                    EventKind::JournalDeleted,
                    Outcome::Success,
                    self.paths.journal.display().to_string(),
                );
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                self.audit.record(
                    EventKind::JournalDeleteFailed,
                    Outcome::Failure,
                    format!("{}: {}", self.paths.journal.display(), e),
                );
                false
            }
        };

        let changed = match content_changed {
            Some(true) => "changed",
            Some(false) => "unchanged",
            None => "unknown",
        };
        self.audit.record(
            EventKind::Committed,
            Outcome::Success,
            format!("{} ({})", self.paths.artifact.display(), changed),
        );
        info!(content = changed, "Committed {:?}", self.paths.artifact);

        Ok(CommitSummary {
            content_changed,
            working_deleted,
            journal_deleted,
        })
    }

    fn reencrypt(&self) -> AppResult<()> {
        let attempts = self.timings.encrypt_attempts;
        for attempt in 1..=attempts {
            match self
                .codec
                .encrypt_file(&self.paths.working, &self.paths.artifact)
            {
                Ok(bytes) => {
                    self.audit.record(
                        EventKind::Reencrypted,
                        Outcome::Success,
                        format!("{} ({} bytes)", self.paths.artifact.display(), bytes),
                    );
                    return Ok(());
                }
                Err(e) => {
                    let outcome = if attempt < attempts {
                        Outcome::Retry
                    } else {
                        Outcome::Failure
                    };
                    self.audit.record(
                        EventKind::ReencryptFailed,
                        outcome,
                        format!("attempt {}/{}: {}", attempt, attempts, e),
                    );
                    if attempt < attempts {
                        thread::sleep(self.timings.encrypt_backoff);
                    }
                }
            }
        }

        // The artifact may hold a partial write; the journal replaces it.
        if self.paths.journal.exists() {
            fs::rename(&self.paths.journal, &self.paths.artifact)?;
            self.audit.record(
                EventKind::JournalRestored,
                Outcome::Success,
                self.paths.artifact.display().to_string(),
            );
        }
        Err(AppError::RolledBack {
            working: self.paths.working.clone(),
            attempts,
        })
    }

    fn remove_working(&self) -> AppResult<()> {
        let path = &self.paths.working;
        let attempts = self.timings.delete_attempts;
        let mut last_error = None;

        for attempt in 1..=attempts {
            if let Err(e) = clear_readonly(path) {
                debug!(error = %e, "Could not clear read-only flag on {:?}", path);
            }
            match fs::remove_file(path) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    debug!(attempt, error = %e, "Failed to delete {:?}", path);
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                thread::sleep(self.timings.delete_backoff);
            }
        }

        Err(AppError::Delete {
            path: path.clone(),
            attempts,
            source: last_error.unwrap_or_else(|| io::Error::other("no deletion attempted")),
        })
    }
}
