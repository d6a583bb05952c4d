//! The three paths a run works with.

use crate::constants::{ENCRYPTED_SUFFIX, JOURNAL_PREFIX, JOURNAL_SUFFIX};
use crate::errors::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Artifact, working file and journal of one run, all in the same directory.
///
/// For `report.pdf.enc` these are `report.pdf.enc`, `report.pdf` and
/// `~report.pdf.enc.bak`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    /// The encrypted file the run was started for.
    pub artifact: PathBuf,
    /// Decrypted plaintext the user edits.
    pub working: PathBuf,
    /// The artifact's ciphertext, parked while the session runs.
    pub journal: PathBuf,
}

impl RunPaths {
    /// Derives the working and journal paths from `artifact`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotEncrypted` when the file name does not end in
    /// `.enc` (any case), is nothing but the suffix, or is not valid UTF-8.
    pub fn from_artifact(artifact: &Path) -> AppResult<Self> {
        let not_encrypted = || AppError::NotEncrypted(artifact.to_path_buf());

        let file_name = artifact
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(not_encrypted)?;
        if !has_encrypted_suffix(file_name) {
            return Err(not_encrypted());
        }

        let working_name = &file_name[..file_name.len() - ENCRYPTED_SUFFIX.len()];
        if working_name.is_empty() {
            return Err(not_encrypted());
        }

        let dir = artifact.parent().unwrap_or_else(|| Path::new(""));
        Ok(RunPaths {
            artifact: artifact.to_path_buf(),
            working: dir.join(working_name),
            journal: dir.join(format!("{}{}{}", JOURNAL_PREFIX, file_name, JOURNAL_SUFFIX)),
        })
    }
}

/// Whether anything, including a dangling symlink, sits at `path`.
pub fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Whether `file_name` ends in the encrypted suffix, ignoring ASCII case.
pub fn has_encrypted_suffix(file_name: &str) -> bool {
    let name = file_name.as_bytes();
    let suffix = ENCRYPTED_SUFFIX.as_bytes();
    name.len() >= suffix.len() && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}
