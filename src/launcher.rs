//! Launcher abstraction for handing a working file to its default program.
//!
//! This module provides an abstraction for opening files in whatever program
//! the host associates with them, allowing the lifecycle to be tested by
//! mocking the launcher.
//!
//! A launch either yields a live [`ProcessHandle`] to watch, or a
//! [`LaunchError`]. The error is not fatal: it only means the caller has no
//! process to watch and must fall back to modification watching. That is the
//! normal case on hosts where the opener forwards the file to an already
//! running program and exits.

use crate::errors::LaunchError;
use std::io;
use std::path::Path;
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// A running program that has the working file open.
pub trait ProcessHandle: Send {
    /// OS process id, if known.
    fn id(&self) -> Option<u32>;

    /// Polls without blocking.
    fn has_exited(&mut self) -> io::Result<bool>;
}

impl ProcessHandle for Child {
    fn id(&self) -> Option<u32> {
        Some(Child::id(self))
    }

    fn has_exited(&mut self) -> io::Result<bool> {
        Ok(self.try_wait()?.is_some())
    }
}

/// Trait defining the interface for a launcher component.
///
/// # Examples
///
/// ```
/// use encedit::errors::LaunchError;
/// use encedit::launcher::{Launcher, ProcessHandle};
/// use std::path::Path;
///
/// struct NoOpener;
///
/// impl Launcher for NoOpener {
///     fn launch(&self, path: &Path) -> Result<Box<dyn ProcessHandle>, LaunchError> {
///         Err(LaunchError::ExitedImmediately {
///             command: "none".to_string(),
///             status: format!("nothing opened {}", path.display()),
///         })
///     }
/// }
///
/// assert!(NoOpener.launch(Path::new("report.pdf")).is_err());
/// ```
pub trait Launcher: Send + Sync {
    /// Opens `path` in its associated program.
    ///
    /// # Errors
    ///
    /// Returns a `LaunchError` when no process handle can be produced. Callers
    /// treat this as "nothing to watch", not as a failed run.
    fn launch(&self, path: &Path) -> Result<Box<dyn ProcessHandle>, LaunchError>;
}

/// An implementation of the Launcher trait that uses the host's association
/// command, or an override opener.
///
/// # Examples
///
/// ```no_run
/// use encedit::launcher::{Launcher, SystemLauncher};
/// use std::path::Path;
/// use std::time::Duration;
///
/// let launcher = SystemLauncher::new(None, Duration::from_millis(500));
/// match launcher.launch(Path::new("report.pdf")) {
///     Ok(handle) => println!("Opened, pid {:?}", handle.id()),
///     Err(e) => println!("Nothing to watch: {}", e),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SystemLauncher {
    opener: Option<String>,
    grace: Duration,
}

impl SystemLauncher {
    /// `opener` overrides the host association; `grace` is how long a process
    /// must stay alive to count as launched.
    pub fn new(opener: Option<String>, grace: Duration) -> Self {
        SystemLauncher { opener, grace }
    }

    fn command_for(&self, path: &Path) -> (String, Command) {
        if let Some(opener) = &self.opener {
            let mut command = Command::new(opener);
            command.arg(path);
            return (opener.clone(), command);
        }
        default_command(path)
    }
}

#[cfg(windows)]
fn default_command(path: &Path) -> (String, Command) {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", ""]).arg(path);
    ("cmd".to_string(), command)
}

#[cfg(target_os = "macos")]
fn default_command(path: &Path) -> (String, Command) {
    let mut command = Command::new("open");
    command.arg(path);
    ("open".to_string(), command)
}

#[cfg(all(not(windows), not(target_os = "macos")))]
fn default_command(path: &Path) -> (String, Command) {
    let mut command = Command::new("xdg-open");
    command.arg(path);
    ("xdg-open".to_string(), command)
}

impl Launcher for SystemLauncher {
    /// Spawns the opener and waits out the grace period.
    ///
    /// # Errors
    ///
    /// Returns a `LaunchError` if:
    /// - The opener command is not found
    /// - Permission is denied executing it
    /// - Spawning fails for another reason
    /// - The process exits before the grace period ends
    fn launch(&self, path: &Path) -> Result<Box<dyn ProcessHandle>, LaunchError> {
        let (name, mut command) = self.command_for(path);
        debug!("Launching {:?} with '{}'", path, name);

        let mut child = command.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LaunchError::CommandNotFound {
                command: name.clone(),
                source: e,
            },
            io::ErrorKind::PermissionDenied => LaunchError::PermissionDenied {
                command: name.clone(),
                source: e,
            },
            _ => LaunchError::ExecutionFailed {
                command: name.clone(),
                source: e,
            },
        })?;

        let deadline = Instant::now() + self.grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Err(LaunchError::ExitedImmediately {
                        command: name,
                        status: status.to_string(),
                    })
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(LaunchError::ExecutionFailed {
                        command: name,
                        source: e,
                    })
                }
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(25).min(deadline - now));
        }

        debug!(pid = child.id(), "Opener '{}' is running", name);
        Ok(Box::new(child))
    }
}
