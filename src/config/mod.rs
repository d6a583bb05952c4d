//! Configuration management for the encedit application.
//!
//! This module handles loading and validating configuration settings from environment
//! variables, with sensible defaults. Timings and cipher parameters are not read from
//! the environment: they are deployment constants shared with the encrypting
//! counterpart, carried here so tests and embedders can inject their own.
//!
//! # Environment Variables
//!
//! - `ENCEDIT_OPENER`: Command used instead of the host's file association
//! - `ENCEDIT_LOG_FILE`: Append-only event log (defaults to ~/.encedit/log.txt)
//! - `ENCEDIT_REPORT_URL`: Remote reporting endpoint (reporting is off when unset)
//! - `ENCEDIT_AGENT_ID_FILE`: Per-installation identifier file (defaults to ~/.encedit/AgentID.id)

use crate::constants::{
    DEFAULT_AGENT_ID_FILE, DEFAULT_LOG_FILE, DELETE_ATTEMPTS, DELETE_BACKOFF, ENCRYPT_ATTEMPTS,
    ENCRYPT_BACKOFF, ENV_VAR_AGENT_ID_FILE, ENV_VAR_LOG_FILE, ENV_VAR_OPENER,
    ENV_VAR_REPORT_URL, FOREGROUND_POLL_INTERVAL, LAUNCH_GRACE, LOCK_POLL_INTERVAL,
    MODIFICATION_POLL_INTERVAL, MODIFICATION_TOLERANCE, OPENER_FORBIDDEN_CHARS,
    PROCESS_POLL_INTERVAL, PROCESS_RELEASE_TIMEOUT, QUIESCENCE_RELEASE_TIMEOUT,
    QUIESCENCE_THRESHOLD, REDACTED_PLACEHOLDER, SETTLE_DELAY, WATCH_ERROR_BACKOFF,
};
use crate::crypto::CipherKey;
use crate::errors::{AppError, AppResult};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Every delay, timeout and retry count used by a lifecycle run.
///
/// `Default` gives the production values from [`crate::constants`]. Tests
/// shrink them to milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Wait after spawning the opener before treating an exit as immediate.
    pub launch_grace: Duration,
    /// Interval between process-exit checks.
    pub process_poll: Duration,
    /// Delay between editor exit and the first release probe.
    pub settle_delay: Duration,
    /// Release timeout used by the process watcher before handing off.
    pub process_release_timeout: Duration,
    /// Interval between exclusive-open probes.
    pub lock_poll: Duration,
    /// Interval between modification-time checks.
    pub modification_poll: Duration,
    /// Minimum mtime advance that counts as an edit.
    pub modification_tolerance: Duration,
    /// Quiet period after the last edit that ends a session.
    pub quiescence: Duration,
    /// Release timeout used by the modification watcher.
    pub quiescence_release_timeout: Duration,
    /// Back-off after an unexpected watcher error.
    pub watch_error_backoff: Duration,
    /// Interval of the foreground existence check.
    pub foreground_poll: Duration,
    /// Re-encryption attempts before rolling back.
    pub encrypt_attempts: u32,
    /// Back-off between re-encryption attempts.
    pub encrypt_backoff: Duration,
    /// Working-file deletion attempts.
    pub delete_attempts: u32,
    /// Back-off between deletion attempts.
    pub delete_backoff: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            launch_grace: LAUNCH_GRACE,
            process_poll: PROCESS_POLL_INTERVAL,
            settle_delay: SETTLE_DELAY,
            process_release_timeout: PROCESS_RELEASE_TIMEOUT,
            lock_poll: LOCK_POLL_INTERVAL,
            modification_poll: MODIFICATION_POLL_INTERVAL,
            modification_tolerance: MODIFICATION_TOLERANCE,
            quiescence: QUIESCENCE_THRESHOLD,
            quiescence_release_timeout: QUIESCENCE_RELEASE_TIMEOUT,
            watch_error_backoff: WATCH_ERROR_BACKOFF,
            foreground_poll: FOREGROUND_POLL_INTERVAL,
            encrypt_attempts: ENCRYPT_ATTEMPTS,
            encrypt_backoff: ENCRYPT_BACKOFF,
            delete_attempts: DELETE_ATTEMPTS,
            delete_backoff: DELETE_BACKOFF,
        }
    }
}

/// Configuration for the encedit application.
///
/// # Examples
///
/// Creating a configuration manually:
/// ```
/// use encedit::Config;
/// use std::path::PathBuf;
///
/// let config = Config {
///     opener: Some("xdg-open".to_string()),
///     log_file: PathBuf::from("/var/log/encedit.log"),
///     report_url: None,
///     agent_id_file: PathBuf::from("/etc/encedit/AgentID.id"),
///     ..Config::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct Config {
    /// Opener command overriding the host's file association.
    ///
    /// Loaded from `ENCEDIT_OPENER`. `None` means the platform default
    /// (`xdg-open`, `open` or `cmd /C start`).
    pub opener: Option<String>,

    /// Append-only event log location.
    pub log_file: PathBuf,

    /// Endpoint receiving best-effort event reports, if any.
    pub report_url: Option<String>,

    /// File holding the per-installation identifier.
    pub agent_id_file: PathBuf,

    /// Delays and retry counts.
    pub timings: Timings,

    /// Key material injected into the codec.
    pub cipher: CipherKey,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("opener", &self.opener)
            .field("log_file", &self.log_file)
            .field(
                "report_url",
                &self.report_url.as_ref().map(|_| REDACTED_PLACEHOLDER),
            )
            .field("agent_id_file", &self.agent_id_file)
            .field("timings", &self.timings)
            .field("cipher", &self.cipher)
            .finish()
    }
}

impl Default for Config {
    /// Creates a new Config with default values and unexpanded default paths.
    fn default() -> Self {
        Config {
            opener: None,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            report_url: None,
            agent_id_file: PathBuf::from(DEFAULT_AGENT_ID_FILE),
            timings: Timings::default(),
            cipher: CipherKey::default(),
        }
    }
}

impl Config {
    /// Validates an opener command string for security.
    ///
    /// This function checks that the opener command:
    /// - Is not empty
    /// - Contains no shell metacharacters
    /// - Contains no spaces
    fn validate_opener_command(opener_cmd: &str) -> AppResult<&str> {
        if opener_cmd.is_empty() {
            return Err(AppError::Config(
                "Opener command cannot be empty".to_string(),
            ));
        }

        if opener_cmd.contains(' ') {
            return Err(AppError::Config(
                "Opener command cannot contain spaces. Use a wrapper script for openers requiring arguments".to_string(),
            ));
        }

        for &ch in OPENER_FORBIDDEN_CHARS.iter() {
            if opener_cmd.contains(ch) {
                return Err(AppError::Config(format!(
                    "Opener command cannot contain shell metacharacters: '{}'. Use a wrapper script instead",
                    ch
                )));
            }
        }

        Ok(opener_cmd)
    }

    fn expand_path(raw: &str) -> AppResult<PathBuf> {
        let expanded = shellexpand::full(raw)
            .map_err(|e| AppError::Config(format!("Failed to expand path '{}': {}", raw, e)))?;
        Ok(PathBuf::from(expanded.into_owned()))
    }

    /// Loads configuration from environment variables with sensible defaults.
    ///
    /// Paths are expanded with `shellexpand`, so `~` and `$VARS` work.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if:
    /// - A path fails to expand
    /// - The opener command fails validation (empty, contains spaces or shell metacharacters)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use encedit::Config;
    ///
    /// match Config::load() {
    ///     Ok(config) => println!("Event log: {}", config.log_file.display()),
    ///     Err(err) => eprintln!("Failed to load config: {}", err),
    /// }
    /// ```
    pub fn load() -> AppResult<Self> {
        let opener = match env::var(ENV_VAR_OPENER) {
            Ok(raw) => Some(Config::validate_opener_command(&raw)?.to_string()),
            Err(_) => None,
        };

        let log_file = Config::expand_path(
            &env::var(ENV_VAR_LOG_FILE).unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string()),
        )?;

        let agent_id_file = Config::expand_path(
            &env::var(ENV_VAR_AGENT_ID_FILE).unwrap_or_else(|_| DEFAULT_AGENT_ID_FILE.to_string()),
        )?;

        let report_url = env::var(ENV_VAR_REPORT_URL)
            .ok()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        Ok(Config {
            opener,
            log_file,
            report_url,
            agent_id_file,
            ..Config::default()
        })
    }

    /// Validates that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when the opener is invalid, the event log
    /// path is empty, the report URL is not http(s), or a retry count is zero.
    pub fn validate(&self) -> AppResult<()> {
        if let Some(opener) = &self.opener {
            Config::validate_opener_command(opener)?;
        }

        if self.log_file.as_os_str().is_empty() {
            return Err(AppError::Config("Event log path is empty".to_string()));
        }

        if let Some(url) = &self.report_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(AppError::Config(format!(
                    "Report URL must start with http:// or https://: {}",
                    url
                )));
            }
        }

        if self.timings.encrypt_attempts == 0 || self.timings.delete_attempts == 0 {
            return Err(AppError::Config(
                "Retry counts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            ENV_VAR_OPENER,
            ENV_VAR_LOG_FILE,
            ENV_VAR_REPORT_URL,
            ENV_VAR_AGENT_ID_FILE,
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_debug_impl_redacts_sensitive_info() {
        let config = Config {
            report_url: Some("https://reports.example.com/api?token=abc".to_string()),
            ..Config::default()
        };
        let debug_output = format!("{:?}", config);

        assert!(!debug_output.contains("token=abc"));
        assert!(!debug_output.contains("0123456789abcdef"));
        assert!(debug_output.contains(REDACTED_PLACEHOLDER));
    }

    #[test]
    fn test_validate_opener_command() {
        assert!(Config::validate_opener_command("xdg-open").is_ok());
        assert!(Config::validate_opener_command("/usr/bin/open").is_ok());
        assert!(Config::validate_opener_command("").is_err());
        assert!(Config::validate_opener_command("code --wait").is_err());
        for bad in ["vim|cat", "a;b", "$(x)", "`x`", "a>b", "a&b"] {
            assert!(
                Config::validate_opener_command(bad).is_err(),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_validate_rejects_bad_report_url() {
        let config = Config {
            report_url: Some("ftp://example.com".to_string()),
            ..Config::default()
        };
        match config.validate() {
            Err(AppError::Config(msg)) => assert!(msg.contains("http")),
            other => panic!("Expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let config = Config {
            timings: Timings {
                encrypt_attempts: 0,
                ..Timings::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_defaults() {
        clear_env();
        env::set_var("HOME", "/home/tester");

        let config = Config::load().expect("load with defaults");
        assert_eq!(config.opener, None);
        assert_eq!(config.report_url, None);
        assert_eq!(config.log_file, PathBuf::from("/home/tester/.encedit/log.txt"));
        assert_eq!(
            config.agent_id_file,
            PathBuf::from("/home/tester/.encedit/AgentID.id")
        );
        assert_eq!(config.timings, Timings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        clear_env();
        env::set_var(ENV_VAR_OPENER, "mousepad");
        env::set_var(ENV_VAR_LOG_FILE, "/tmp/encedit-test/events.log");
        env::set_var(ENV_VAR_REPORT_URL, " http://127.0.0.1:9/report ");
        env::set_var(ENV_VAR_AGENT_ID_FILE, "/tmp/encedit-test/id");

        let config = Config::load().expect("load from env");
        assert_eq!(config.opener.as_deref(), Some("mousepad"));
        assert_eq!(config.log_file, PathBuf::from("/tmp/encedit-test/events.log"));
        assert_eq!(config.report_url.as_deref(), Some("http://127.0.0.1:9/report"));
        assert_eq!(config.agent_id_file, PathBuf::from("/tmp/encedit-test/id"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_rejects_unsafe_opener() {
        clear_env();
        env::set_var(ENV_VAR_OPENER, "open; rm -rf /");

        let result = Config::load();
        assert!(matches!(result, Err(AppError::Config(_))));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_blank_report_url_disables_reporting() {
        clear_env();
        env::set_var(ENV_VAR_REPORT_URL, "   ");

        let config = Config::load().expect("load");
        assert_eq!(config.report_url, None);

        clear_env();
    }
}
