//! Best-effort remote reporting of audit events.
//!
//! Events are queued to a dedicated delivery thread that owns a blocking
//! `reqwest` client, so a slow or dead endpoint never stalls the lifecycle.
//! Each event becomes one GET request carrying the event fields as query
//! parameters. Failures are logged at debug level and dropped.

use super::{AuditEvent, AuditSink};
use crate::constants::{REPORT_DRAIN_TIMEOUT, REPORT_TIMEOUT};
use crate::errors::{AppResult, ReportError};
use reqwest::blocking::Client;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// Sends audit events to an HTTP endpoint from a background thread.
pub struct HttpReporter {
    sender: Mutex<Option<Sender<AuditEvent>>>,
    worker: Option<JoinHandle<()>>,
    drain_timeout: Duration,
}

impl HttpReporter {
    /// Starts the delivery thread for `url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the thread cannot be spawned.
    pub fn new(url: impl Into<String>) -> AppResult<Self> {
        let url = url.into();
        let (sender, receiver) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("encedit-report".to_string())
            .spawn(move || deliver_all(&url, receiver))?;

        Ok(HttpReporter {
            sender: Mutex::new(Some(sender)),
            worker: Some(worker),
            drain_timeout: REPORT_DRAIN_TIMEOUT,
        })
    }

    /// Bounds how long dropping the reporter waits for queued events.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }
}

impl AuditSink for HttpReporter {
    fn record(&self, event: &AuditEvent) -> AppResult<()> {
        let guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(sender) => sender
                .send(event.clone())
                .map_err(|_| ReportError::Closed.into()),
            None => Err(ReportError::Closed.into()),
        }
    }
}

impl Drop for HttpReporter {
    fn drop(&mut self) {
        // Closing the channel lets the worker finish once the queue is empty.
        match self.sender.get_mut() {
            Ok(sender) => drop(sender.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }

        if let Some(worker) = self.worker.take() {
            let deadline = Instant::now() + self.drain_timeout;
            while !worker.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(20));
            }
            if worker.is_finished() {
                let _ = worker.join();
            } else {
                debug!("Abandoning undelivered reports after {:?}", self.drain_timeout);
            }
        }
    }
}

fn deliver_all(url: &str, receiver: Receiver<AuditEvent>) {
    let client = match Client::builder().timeout(REPORT_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            debug!(error = %e, "Failed to build report client; reporting disabled");
            return;
        }
    };

    for event in receiver {
        if let Err(e) = deliver(&client, url, &event) {
            debug!(error = %e, event = %event.kind, "Failed to deliver report");
        }
    }
}

/// Sends one event synchronously.
///
/// # Errors
///
/// Returns `ReportError::Unreachable` on transport failure and
/// `ReportError::Rejected` on a non-success status.
pub fn deliver(client: &Client, url: &str, event: &AuditEvent) -> Result<(), ReportError> {
    let run_id = event.run_id.to_string();
    let time = event.formatted_time();

    let response = client
        .get(url)
        .query(&[
            ("agent", event.agent_id.as_str()),
            ("run", run_id.as_str()),
            ("event", event.kind.as_str()),
            ("outcome", event.outcome.as_str()),
            ("time", time.as_str()),
            ("detail", event.detail.as_str()),
        ])
        .send()?;

    if !response.status().is_success() {
        return Err(ReportError::Rejected(response.status().as_u16()));
    }
    Ok(())
}
