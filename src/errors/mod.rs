//! Error handling utilities for the encedit application.
//!
//! This module provides the central error type `AppError` which represents all
//! possible error conditions that might occur in the application, as well as the
//! convenience type alias `AppResult` for functions that can return these errors.
//! Component errors (`CryptoError`, `LockError`, `LaunchError`) nest into it.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Represents specific error cases that can occur when handing a file to the
/// host's default program.
///
/// None of these abort a run: the launcher turns them into "no process handle"
/// and the controller falls back to modification watching.
///
/// # Examples
///
/// ```
/// use encedit::errors::LaunchError;
/// use std::io::{self, ErrorKind};
///
/// let io_error = io::Error::new(ErrorKind::NotFound, "command not found");
/// let error = LaunchError::CommandNotFound {
///     command: "xdg-open".to_string(),
///     source: io_error,
/// };
///
/// assert!(format!("{}", error).contains("not found"));
/// assert!(format!("{}", error).contains("xdg-open"));
/// ```
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Error when the opener command cannot be found.
    #[error("Opener command '{command}' not found: {source}. Please check that it is installed and available in your PATH, or set ENCEDIT_OPENER.")]
    CommandNotFound {
        /// The opener command that was not found
        command: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Error when permission is denied to execute the opener command.
    #[error("Permission denied when trying to execute opener '{command}': {source}. Please check file permissions or try running with appropriate access rights.")]
    PermissionDenied {
        /// The opener command that had permission denied
        command: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Error when the opener command fails to execute due to other I/O errors.
    #[error("Failed to execute opener '{command}': {source}. Please check system resources or the opener installation.")]
    ExecutionFailed {
        /// The opener command that failed to execute
        command: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The spawned process exited before the launch grace period ended.
    #[error("Opener '{command}' exited immediately with status {status}. The file may have been handed to an already running program.")]
    ExitedImmediately {
        /// The opener command
        command: String,
        /// The exit status, rendered for display
        status: String,
    },
}

/// Represents errors that can occur while probing a working file for release.
///
/// # Examples
///
/// ```
/// use encedit::errors::LockError;
/// use std::path::PathBuf;
/// use std::time::Duration;
///
/// let error = LockError::Timeout {
///     path: PathBuf::from("/tmp/report.pdf"),
///     waited: Duration::from_secs(300),
/// };
///
/// assert!(format!("{}", error).contains("still in use"));
/// assert!(format!("{}", error).contains("300"));
/// ```
#[derive(Debug, Error)]
pub enum LockError {
    /// The file stayed open in another process for the whole timeout.
    #[error("File is still in use by another process after {}s: {path}. Watching for modifications instead.", waited.as_secs())]
    Timeout {
        /// The path that stayed locked
        path: PathBuf,
        /// How long the prober waited
        waited: Duration,
    },
}

/// Represents specific error cases that can occur during cipher operations.
///
/// Only the format variants are eligible for the decryption copy fallback;
/// I/O errors always propagate.
///
/// # Examples
///
/// ```
/// use encedit::errors::CryptoError;
///
/// let error = CryptoError::InvalidLength { len: 17 };
/// assert!(error.is_format_error());
/// assert!(format!("{}", error).contains("17"));
/// ```
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Ciphertext length is not a positive multiple of the block size.
    #[error("Ciphertext length {len} is not a positive multiple of the cipher block size")]
    InvalidLength {
        /// Number of bytes read from the source
        len: u64,
    },

    /// The final block does not carry valid PKCS#7 padding.
    #[error("Ciphertext padding is invalid; the input was not produced with this key")]
    InvalidPadding,

    /// Reading or writing one of the streams failed.
    #[error("Cipher stream I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl CryptoError {
    /// Returns true when the input does not look like output of this cipher.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            CryptoError::InvalidLength { .. } | CryptoError::InvalidPadding
        )
    }
}

/// Represents errors from the remote event reporter.
///
/// Reporting is best-effort, so these only ever reach the debug log.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The endpoint could not be reached or timed out.
    #[error("Report endpoint unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("Report endpoint rejected the event: HTTP {0}")]
    Rejected(u16),

    /// The delivery thread is gone.
    #[error("Report queue is closed")]
    Closed,
}

/// Which pre-existing path blocked a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictingPath {
    /// The decrypted working file already exists.
    Working,
    /// A journal (backup) file from an earlier run already exists.
    Journal,
}

impl std::fmt::Display for ConflictingPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictingPath::Working => write!(f, "working file"),
            ConflictingPath::Journal => write!(f, "journal file"),
        }
    }
}

/// Coarse classification of every `AppError`, used for audit records and exit
/// handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A working or journal path existed before the run started.
    PreconditionConflict,
    /// The artifact path is not an encrypted artifact.
    NotEncrypted,
    /// The file could not be handed to its default program.
    LaunchFailure,
    /// A file stayed locked past its timeout.
    LockTimeout,
    /// Encryption or decryption failed.
    CipherFailure,
    /// A cleanup deletion failed.
    DeleteFailure,
    /// Configuration could not be loaded.
    Config,
    /// Anything else.
    UnexpectedFault,
}

/// Represents all possible errors that can occur in the encedit application.
///
/// # Examples
///
/// Creating a configuration error:
/// ```
/// use encedit::errors::AppError;
///
/// let error = AppError::Config("Opener command cannot be empty".to_string());
/// assert_eq!(format!("{}", error), "Configuration error: Opener command cannot be empty");
/// ```
///
/// Converting from an IO error:
/// ```
/// use encedit::errors::{AppError, ErrorKind};
/// use std::io;
///
/// let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
/// let app_error: AppError = io_error.into();
/// assert_eq!(app_error.kind(), ErrorKind::UnexpectedFault);
/// ```
#[derive(Debug, Error)]
pub enum AppError {
    /// Errors related to configuration loading or validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input/output errors from filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A leftover working or journal file blocks the run. Nothing was changed.
    #[error("Cannot open {artifact}: a {conflict} already exists at {path}. Finish or recover the earlier session first (encedit --recover).")]
    PreconditionConflict {
        /// The artifact the run was started for
        artifact: PathBuf,
        /// The conflicting path
        path: PathBuf,
        /// Which of the derived paths conflicts
        conflict: ConflictingPath,
    },

    /// The path does not carry the encrypted suffix.
    #[error("Not an encrypted artifact: {0}")]
    NotEncrypted(PathBuf),

    /// Errors when handing the file to its default program.
    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    /// Errors related to file locking.
    #[error("File locking error: {0}")]
    Lock(#[from] LockError),

    /// Errors related to cipher operations.
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    /// Errors from the remote event reporter.
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// The working file could not be removed after re-encryption.
    #[error("Failed to delete {path} after {attempts} attempts: {source}")]
    Delete {
        /// The path that could not be removed
        path: PathBuf,
        /// Number of attempts made
        attempts: u32,
        /// The last deletion error
        #[source]
        source: io::Error,
    },

    /// Re-encryption failed on every attempt and the original ciphertext was restored.
    #[error("Re-encryption of {working} failed after {attempts} attempts; the original artifact was restored and the plaintext was left in place for manual recovery")]
    RolledBack {
        /// The plaintext file left behind
        working: PathBuf,
        /// Number of attempts made
        attempts: u32,
    },

    /// Catch-all for faults that do not fit any other category.
    #[error("Unexpected fault: {0}")]
    Unexpected(String),
}

impl AppError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Config(_) => ErrorKind::Config,
            AppError::PreconditionConflict { .. } => ErrorKind::PreconditionConflict,
            AppError::NotEncrypted(_) => ErrorKind::NotEncrypted,
            AppError::Launch(_) => ErrorKind::LaunchFailure,
            AppError::Lock(_) => ErrorKind::LockTimeout,
            AppError::Crypto(_) | AppError::RolledBack { .. } => ErrorKind::CipherFailure,
            AppError::Delete { .. } => ErrorKind::DeleteFailure,
            AppError::Io(_) | AppError::Report(_) | AppError::Unexpected(_) => {
                ErrorKind::UnexpectedFault
            }
        }
    }
}

/// A type alias for `Result<T, AppError>` to simplify function signatures.
pub type AppResult<T> = Result<T, AppError>;
