//! Constants used throughout the application.
//!
//! This module contains all constants used in the encedit application, organized
//! into logical groups. Having constants centralized makes them easier to find,
//! modify, and reference consistently.

use std::time::Duration;

// Application Metadata
/// The name of the application.
pub const APP_NAME: &str = "encedit";
/// The description of the application used in CLI help text.
pub const APP_DESCRIPTION: &str =
    "Opens an encrypted file in its default program and re-encrypts it when editing ends";

// CLI Arguments & Defaults
/// Log format identifier for plain text.
pub const LOG_FORMAT_TEXT: &str = "text";
/// Log format identifier for JSON.
pub const LOG_FORMAT_JSON: &str = "json";
/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Configuration Keys & Environment Variables
/// Environment variable overriding the host's file-association opener.
pub const ENV_VAR_OPENER: &str = "ENCEDIT_OPENER";
/// Environment variable for the append-only event log location.
pub const ENV_VAR_LOG_FILE: &str = "ENCEDIT_LOG_FILE";
/// Environment variable for the remote reporting endpoint.
pub const ENV_VAR_REPORT_URL: &str = "ENCEDIT_REPORT_URL";
/// Environment variable for the per-installation identifier file.
pub const ENV_VAR_AGENT_ID_FILE: &str = "ENCEDIT_AGENT_ID_FILE";
/// Default event log path (expanded with `shellexpand`).
pub const DEFAULT_LOG_FILE: &str = "~/.encedit/log.txt";
/// Default identifier file path (expanded with `shellexpand`).
pub const DEFAULT_AGENT_ID_FILE: &str = "~/.encedit/AgentID.id";
/// Identifier reported when no identifier file is available.
pub const UNKNOWN_AGENT_ID: &str = "UnknownAgent";

// Validation
/// Characters forbidden in opener commands for security reasons.
pub const OPENER_FORBIDDEN_CHARS: &[char] =
    &['|', '&', ';', '$', '(', ')', '`', '\\', '<', '>', '\'', '"'];
/// Placeholder string for redacted information in debug output.
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

// File System Layout
/// Suffix marking an encrypted artifact (matched case-insensitively).
pub const ENCRYPTED_SUFFIX: &str = ".enc";
/// Prefix of the journal (backup) file name.
pub const JOURNAL_PREFIX: &str = "~";
/// Suffix of the journal (backup) file name.
pub const JOURNAL_SUFFIX: &str = ".bak";
/// Extensions whose plaintext goes through UTF-8 normalization on decrypt.
pub const TEXT_EXTENSIONS: &[&str] = &["txt"];

// Cipher Parameters
/// AES block size in bytes.
pub const CIPHER_BLOCK_SIZE: usize = 16;
/// Buffer size used when streaming through the cipher.
pub const CIPHER_CHUNK_SIZE: usize = 64 * 1024;
/// Deployment key shared with the encrypting counterpart (32 bytes).
pub const DEFAULT_CIPHER_KEY: &[u8; 32] = b"0123456789abcdef0123456789abcdef";
/// Deployment IV shared with the encrypting counterpart (16 bytes).
pub const DEFAULT_CIPHER_IV: &[u8; 16] = b"abcdef9876543210";

// Lifecycle Timings
/// Grace period after spawning the opener before deciding it exited immediately.
pub const LAUNCH_GRACE: Duration = Duration::from_millis(500);
/// Interval between process-exit checks.
pub const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Delay after the editor process exits before probing the file.
pub const SETTLE_DELAY: Duration = Duration::from_secs(3);
/// How long the process watcher waits for the file to be released.
pub const PROCESS_RELEASE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Interval between exclusive-open probes.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Interval between modification-time checks.
pub const MODIFICATION_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Modification times must advance by more than this to count as an edit.
pub const MODIFICATION_TOLERANCE: Duration = Duration::from_secs(1);
/// Quiet period after the last edit before the session is considered over.
pub const QUIESCENCE_THRESHOLD: Duration = Duration::from_secs(2 * 60);
/// How long the modification watcher waits for the file to be released.
pub const QUIESCENCE_RELEASE_TIMEOUT: Duration = Duration::from_secs(3 * 60);
/// Back-off after an unexpected error inside the modification watcher.
pub const WATCH_ERROR_BACKOFF: Duration = Duration::from_secs(10);
/// Interval at which the foreground loop checks that the working file still exists.
pub const FOREGROUND_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Number of re-encryption attempts before rolling back.
pub const ENCRYPT_ATTEMPTS: u32 = 3;
/// Back-off between re-encryption attempts.
pub const ENCRYPT_BACKOFF: Duration = Duration::from_secs(2);
/// Number of attempts to delete the working file.
pub const DELETE_ATTEMPTS: u32 = 10;
/// Back-off between working-file deletion attempts.
pub const DELETE_BACKOFF: Duration = Duration::from_secs(2);
/// Upper bound on runtime shutdown once the run has finished.
pub const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// Reporting
/// Timeout applied to each remote report request.
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(5);
/// How long shutdown waits for queued reports to drain.
pub const REPORT_DRAIN_TIMEOUT: Duration = Duration::from_secs(3);
/// Slice length for cancellable sleeps.
pub const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(100);
/// Timestamp format used in event log lines and reports.
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Logging Configuration
/// Service name used in tracing spans and structured logs.
pub const TRACING_SERVICE_NAME: &str = "encedit";
/// Name for the root tracing span covering one lifecycle run.
pub const TRACING_ROOT_SPAN_NAME: &str = "run";
