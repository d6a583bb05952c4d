//! Restoring artifacts after an interrupted session.
//!
//! A run killed between staging and finalization leaves the ciphertext in the
//! journal. Recovery puts it back where the artifact belongs. It never deletes
//! a working file: the plaintext may hold edits that were not re-encrypted.

use super::{occupied, RunPaths};
use crate::audit::{Audit, EventKind, Outcome};
use crate::errors::AppResult;
use std::fs;
use std::path::Path;
use tracing::warn;

/// What the recovery pass found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// The journal was renamed back to the artifact.
    Restored,
    /// Both journal and artifact exist; nothing was touched.
    Conflict,
    /// Only the artifact exists.
    Clean,
    /// Neither exists.
    Missing,
}

/// Result of [`recover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub action: RecoveryAction,
    /// A decrypted working file is still on disk.
    pub working_left_behind: bool,
}

/// Restores `artifact` from its journal if an earlier run was interrupted.
///
/// # Errors
///
/// Returns `AppError::NotEncrypted` for a path without the encrypted suffix,
/// and `AppError::Io` if the rename fails.
pub fn recover(artifact: &Path, audit: &Audit) -> AppResult<RecoveryOutcome> {
    let paths = RunPaths::from_artifact(artifact)?;

    let action = match (occupied(&paths.journal), occupied(&paths.artifact)) {
        (true, false) => {
            fs::rename(&paths.journal, &paths.artifact)?;
            audit.record(
                EventKind::JournalRestored,
                Outcome::Success,
                paths.artifact.display().to_string(),
            );
            RecoveryAction::Restored
        }
        (true, true) => {
            audit.record(
                EventKind::Conflict,
                Outcome::Failure,
                format!(
                    "Both {} and {} exist; compare them and remove the stale one",
                    paths.artifact.display(),
                    paths.journal.display()
                ),
            );
            RecoveryAction::Conflict
        }
        (false, true) => RecoveryAction::Clean,
        (false, false) => RecoveryAction::Missing,
    };

    let working_left_behind = occupied(&paths.working);
    if working_left_behind {
        warn!(
            "Decrypted file {:?} is still on disk; review it and delete it when done",
            paths.working
        );
    }

    audit.record(
        EventKind::Recovery,
        Outcome::Success,
        format!("{}: {:?}", paths.artifact.display(), action),
    );
    Ok(RecoveryOutcome {
        action,
        working_left_behind,
    })
}
