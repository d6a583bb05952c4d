//! Append-only event log on disk.
//!
//! Each event becomes one line. The text format is pipe separated,
//! `[time] agent|event|time|outcome|detail`; the JSON format writes one
//! serialized [`AuditEvent`] per line.

use super::{AuditEvent, AuditSink};
use crate::errors::{AppError, AppResult};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Line format of the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventLogFormat {
    #[default]
    Text,
    Json,
}

/// Appends events to a file, creating it and its directory on first use.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
    format: EventLogFormat,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, format: EventLogFormat) -> Self {
        EventLog {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(&self, event: &AuditEvent) -> AppResult<String> {
        match self.format {
            EventLogFormat::Text => {
                let time = event.formatted_time();
                let detail = event.detail.replace(['\r', '\n'], " ");
                Ok(format!(
                    "[{}] {}|{}|{}|{}|{}\n",
                    time,
                    event.agent_id,
                    event.kind.as_str(),
                    time,
                    event.outcome.as_str(),
                    detail
                ))
            }
            EventLogFormat::Json => {
                let mut line = serde_json::to_string(event).map_err(|e| {
                    AppError::Unexpected(format!("Failed to serialize audit event: {}", e))
                })?;
                line.push('\n');
                Ok(line)
            }
        }
    }
}

impl AuditSink for EventLog {
    fn record(&self, event: &AuditEvent) -> AppResult<()> {
        let line = self.render(event)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // One write per line so concurrent appenders do not interleave.
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}
