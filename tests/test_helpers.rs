#![allow(dead_code)]

use assert_cmd::Command;
use encedit::crypto::{CipherCodec, CipherKey, PayloadKind};
use encedit::errors::LaunchError;
use encedit::launcher::{Launcher, ProcessHandle};
use encedit::Timings;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Creates a `Command` for the `encedit` binary with a clean, non-interactive
/// environment rooted at `home`.
pub fn base_encedit_command(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("encedit").expect("encedit binary not built");
    cmd.env_clear();
    if let Ok(path) = std::env::var("PATH") {
        cmd.env("PATH", path);
    }
    cmd.env("HOME", home)
        .env("ENCEDIT_LOG_FILE", home.join("events.log"))
        .env("ENCEDIT_AGENT_ID_FILE", home.join("AgentID.id"))
        .env("ENCEDIT_OPENER", "true");
    cmd
}

/// Millisecond-scale timings for lifecycle tests.
pub fn fast_timings() -> Timings {
    Timings {
        launch_grace: Duration::from_millis(10),
        process_poll: Duration::from_millis(10),
        settle_delay: Duration::from_millis(10),
        process_release_timeout: Duration::from_millis(300),
        lock_poll: Duration::from_millis(10),
        modification_poll: Duration::from_millis(20),
        modification_tolerance: Duration::from_millis(0),
        quiescence: Duration::from_millis(150),
        quiescence_release_timeout: Duration::from_millis(300),
        watch_error_backoff: Duration::from_millis(20),
        foreground_poll: Duration::from_millis(20),
        encrypt_attempts: 3,
        encrypt_backoff: Duration::from_millis(5),
        delete_attempts: 3,
        delete_backoff: Duration::from_millis(5),
    }
}

pub fn codec() -> CipherCodec {
    CipherCodec::new(CipherKey::default())
}

/// Writes `plaintext` encrypted with the default key to `path`.
pub fn write_artifact(path: &Path, plaintext: &[u8]) {
    let mut ciphertext = Vec::new();
    codec()
        .encrypt(plaintext, &mut ciphertext)
        .expect("encrypt fixture");
    fs::write(path, ciphertext).expect("write fixture");
}

/// Decrypts the artifact at `path` strictly.
pub fn read_artifact(path: &Path) -> Vec<u8> {
    let ciphertext = fs::read(path).expect("read artifact");
    let mut plaintext = Vec::new();
    codec()
        .decrypt_strict(&ciphertext[..], &mut plaintext, PayloadKind::Binary)
        .expect("artifact is not valid ciphertext");
    plaintext
}

/// What the scripted editor does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Writes the bytes to the working file, then exits.
    EditThenExit(Vec<u8>),
    /// Never exits.
    StayOpen,
    /// No process is produced.
    FailToLaunch,
}

/// Launcher whose "editor" follows a [`Script`] instead of running a program.
pub struct ScriptedLauncher {
    pub script: Script,
}

impl ScriptedLauncher {
    pub fn new(script: Script) -> Self {
        ScriptedLauncher { script }
    }
}

impl Launcher for ScriptedLauncher {
    fn launch(&self, path: &Path) -> Result<Box<dyn ProcessHandle>, LaunchError> {
        match &self.script {
            Script::FailToLaunch => Err(LaunchError::ExitedImmediately {
                command: "scripted".to_string(),
                status: "exit status: 0".to_string(),
            }),
            Script::EditThenExit(edit) => Ok(Box::new(ScriptedProcess {
                working: path.to_path_buf(),
                edit: Some(edit.clone()),
                polls: 0,
                exits: true,
            })),
            Script::StayOpen => Ok(Box::new(ScriptedProcess {
                working: path.to_path_buf(),
                edit: None,
                polls: 0,
                exits: false,
            })),
        }
    }
}

struct ScriptedProcess {
    working: PathBuf,
    edit: Option<Vec<u8>>,
    polls: u32,
    exits: bool,
}

impl ProcessHandle for ScriptedProcess {
    fn id(&self) -> Option<u32> {
        Some(1)
    }

    fn has_exited(&mut self) -> io::Result<bool> {
        self.polls += 1;
        if self.polls == 2 {
            if let Some(edit) = self.edit.take() {
                fs::write(&self.working, edit)?;
            }
        }
        Ok(self.exits && self.polls >= 4)
    }
}
