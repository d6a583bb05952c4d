//! Audit trail for lifecycle runs.
//!
//! Every lifecycle step is recorded as an [`AuditEvent`] and fanned out to the
//! configured [`AuditSink`]s: the append-only event log, the optional remote
//! reporter, and in tests an in-memory collector. Each event is also emitted as
//! a `tracing` event so it shows up in the process log.
//!
//! Sinks are best-effort. A sink that fails is logged at debug level and
//! otherwise ignored; recording never fails the caller.

pub mod agent;
pub mod event_log;
pub mod report;

pub use self::agent::load_agent_id;
pub use self::event_log::{EventLog, EventLogFormat};
pub use self::report::HttpReporter;

use crate::constants::EVENT_TIME_FORMAT;
use crate::errors::AppResult;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The artifact was renamed to its journal.
    Staged,
    /// The journal was decrypted into the working file.
    Decrypted,
    /// The journal was not ciphertext and was copied verbatim.
    DecryptFallback,
    /// The default program was started.
    Launched,
    /// No process handle could be obtained.
    LaunchFailed,
    /// A watcher began observing the working file.
    WatcherStarted,
    /// The editor process exited.
    ProcessExited,
    /// The process watcher handed over to the modification watcher.
    WatcherHandoff,
    /// A watcher hit an unexpected error and backed off.
    WatchError,
    /// The watcher decided the editing session is over.
    SessionEnded,
    /// The run was cancelled by a signal.
    Cancelled,
    /// The working file was encrypted back into the artifact.
    Reencrypted,
    /// A re-encryption attempt failed.
    ReencryptFailed,
    /// The working file was removed.
    WorkingDeleted,
    /// The working file could not be removed.
    WorkingDeleteFailed,
    /// The journal was removed.
    JournalDeleted,
    /// The journal could not be removed.
    JournalDeleteFailed,
    /// The journal was renamed back over the artifact.
    JournalRestored,
    /// The run finished with the artifact back in place.
    Committed,
    /// A leftover working or journal file blocked the run.
    Conflict,
    /// An unexpected fault aborted a step.
    Fault,
    /// A recovery pass inspected an artifact.
    Recovery,
}

impl EventKind {
    /// Stable identifier used in log lines and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Staged => "staged",
            EventKind::Decrypted => "decrypted",
            EventKind::DecryptFallback => "decrypt_fallback",
            EventKind::Launched => "launched",
            EventKind::LaunchFailed => "launch_failed",
            EventKind::WatcherStarted => "watcher_started",
            EventKind::ProcessExited => "process_exited",
            EventKind::WatcherHandoff => "watcher_handoff",
            EventKind::WatchError => "watch_error",
            EventKind::SessionEnded => "session_ended",
            EventKind::Cancelled => "cancelled",
            EventKind::Reencrypted => "reencrypted",
            EventKind::ReencryptFailed => "reencrypt_failed",
            EventKind::WorkingDeleted => "working_deleted",
            EventKind::WorkingDeleteFailed => "working_delete_failed",
            EventKind::JournalDeleted => "journal_deleted",
            EventKind::JournalDeleteFailed => "journal_delete_failed",
            EventKind::JournalRestored => "journal_restored",
            EventKind::Committed => "committed",
            EventKind::Conflict => "conflict",
            EventKind::Fault => "fault",
            EventKind::Recovery => "recovery",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How it went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// A failed attempt that will be retried.
    Retry,
    Failure,
}

impl Outcome {
    /// Stable identifier used in log lines and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Retry => "retry",
            Outcome::Failure => "failure",
        }
    }
}

/// One recorded lifecycle step.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Identifier shared by every event of one run.
    pub run_id: Uuid,
    /// Per-installation identifier.
    pub agent_id: String,
    pub kind: EventKind,
    pub outcome: Outcome,
    /// Free-form detail, usually the affected path or an error message.
    pub detail: String,
    pub timestamp: DateTime<Local>,
}

impl AuditEvent {
    /// Timestamp rendered the way log lines and reports expect it.
    pub fn formatted_time(&self) -> String {
        self.timestamp.format(EVENT_TIME_FORMAT).to_string()
    }
}

/// A destination for audit events.
///
/// Implementations must not block for long: they are called inline from the
/// lifecycle.
pub trait AuditSink: Send + Sync {
    /// Persists or forwards one event.
    fn record(&self, event: &AuditEvent) -> AppResult<()>;
}

impl<S: AuditSink + ?Sized> AuditSink for Arc<S> {
    fn record(&self, event: &AuditEvent) -> AppResult<()> {
        (**self).record(event)
    }
}

struct AuditInner {
    run_id: Uuid,
    agent_id: String,
    sinks: Vec<Box<dyn AuditSink>>,
}

/// Cheaply cloneable handle that stamps and fans out events for one run.
#[derive(Clone)]
pub struct Audit {
    inner: Arc<AuditInner>,
}

impl fmt::Debug for Audit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Audit")
            .field("run_id", &self.inner.run_id)
            .field("agent_id", &self.inner.agent_id)
            .field("sinks", &self.inner.sinks.len())
            .finish()
    }
}

impl Audit {
    /// Creates a handle with a fresh run id and the given sinks.
    pub fn new(agent_id: impl Into<String>, sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Audit {
            inner: Arc::new(AuditInner {
                run_id: Uuid::new_v4(),
                agent_id: agent_id.into(),
                sinks,
            }),
        }
    }

    /// A handle that only emits tracing events.
    pub fn tracing_only(agent_id: impl Into<String>) -> Self {
        Audit::new(agent_id, Vec::new())
    }

    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    pub fn agent_id(&self) -> &str {
        &self.inner.agent_id
    }

    /// Records one event on every sink.
    pub fn record(&self, kind: EventKind, outcome: Outcome, detail: impl Into<String>) {
        let event = AuditEvent {
            run_id: self.inner.run_id,
            agent_id: self.inner.agent_id.clone(),
            kind,
            outcome,
            detail: detail.into(),
            timestamp: Local::now(),
        };

        match (outcome, kind) {
            (Outcome::Success, EventKind::DecryptFallback) => {
                warn!(event = %kind, outcome = "success", "{}", event.detail)
            }
            (Outcome::Success, _) => info!(event = %kind, outcome = "success", "{}", event.detail),
            (Outcome::Retry, _) => warn!(event = %kind, outcome = "retry", "{}", event.detail),
            (Outcome::Failure, EventKind::Fault | EventKind::ReencryptFailed) => {
                error!(event = %kind, outcome = "failure", "{}", event.detail)
            }
            (Outcome::Failure, _) => warn!(event = %kind, outcome = "failure", "{}", event.detail),
        }

        for sink in &self.inner.sinks {
            if let Err(e) = sink.record(&event) {
                debug!(error = %e, event = %kind, "Audit sink rejected event");
            }
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Kinds recorded so far, in order.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|event| event.kind).collect()
    }

    /// Whether an event of `kind` with `outcome` was recorded.
    pub fn contains(&self, kind: EventKind, outcome: Outcome) -> bool {
        self.events()
            .iter()
            .any(|event| event.kind == kind && event.outcome == outcome)
    }
}

impl AuditSink for MemorySink {
    fn record(&self, event: &AuditEvent) -> AppResult<()> {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
        Ok(())
    }
}
