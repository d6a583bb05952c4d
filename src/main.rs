/*!
# encedit - Transparent editing of encrypted files

This file contains the main application flow, coordinating the various components
to implement one edit session.

## Usage

```text
encedit [OPTIONS] [ARTIFACT]

Arguments:
  [ARTIFACT]  Encrypted file to open (for example report.pdf.enc)

Options:
      --recover                 Put back the backup left by an interrupted session
  -v, --verbose                 Print verbose output
      --log-format <LOG_FORMAT> Log output format [default: text] [possible values: text, json]
  -h, --help                    Print help information
  -V, --version                 Print version information
```

## Configuration

The application can be configured with the following environment variables:
- `ENCEDIT_OPENER`: Program used instead of the host's file association
- `ENCEDIT_LOG_FILE`: Event log location (defaults to "~/.encedit/log.txt")
- `ENCEDIT_REPORT_URL`: Endpoint receiving event reports (off when unset)
- `ENCEDIT_AGENT_ID_FILE`: Identifier file (defaults to "~/.encedit/AgentID.id")
- `RUST_LOG`: Overrides the log filter
*/

use clap::Parser;
use encedit::audit::{load_agent_id, Audit, AuditSink, EventLog, EventLogFormat, HttpReporter};
use encedit::cli::CliArgs;
use encedit::config::Config;
use encedit::constants::{APP_NAME, DEFAULT_LOG_LEVEL, RUNTIME_SHUTDOWN_TIMEOUT};
use encedit::crypto::CipherCodec;
use encedit::errors::{AppError, AppResult};
use encedit::launcher::SystemLauncher;
use encedit::lifecycle::{recover, Controller, RunReport};
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// The main entry point for the encedit application.
///
/// This function coordinates the overall application flow:
/// 1. Parses command-line arguments and initializes logging
/// 2. Loads and validates configuration
/// 3. Builds the audit trail (event log and optional remote reporting)
/// 4. Runs either the recovery pass or an edit session
///
/// # Errors
///
/// Any returned error makes the process exit with status 1, including
/// precondition conflicts and rolled-back sessions.
fn main() -> AppResult<()> {
    let args = CliArgs::parse();
    init_tracing(&args)?;
    debug!("CLI arguments: {:?}", args);

    let Some(artifact) = args.artifact.clone() else {
        debug!("No file given; nothing to do");
        return Ok(());
    };

    let config = Config::load()?;
    config.validate()?;
    debug!("Configuration: {:?}", config);

    let audit = build_audit(&config, args.json_logs())?;

    if args.recover {
        let outcome = recover(&artifact, &audit)?;
        info!(
            action = ?outcome.action,
            working_left_behind = outcome.working_left_behind,
            "Recovery finished for {:?}",
            artifact
        );
        return Ok(());
    }

    let controller = Controller::new(
        CipherCodec::new(config.cipher.clone()),
        Arc::new(SystemLauncher::new(
            config.opener.clone(),
            config.timings.launch_grace,
        )),
        config.timings.clone(),
        audit,
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let cancel = CancellationToken::new();
    let result = runtime.block_on(async {
        tokio::spawn(cancel_on_signal(cancel.clone()));
        controller.run(&artifact, cancel).await
    });
    // A watcher still sleeping on a blocking thread must not keep us alive.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    match result? {
        RunReport::Skipped { artifact, reason } => {
            warn!("Nothing done for {:?}: {}", artifact, reason);
        }
        RunReport::Finished { end, outcome } => {
            info!(?end, ?outcome, "Session finished for {:?}", artifact);
        }
    }
    Ok(())
}

fn init_tracing(args: &CliArgs) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if args.verbose { "debug" } else { DEFAULT_LOG_LEVEL };
        EnvFilter::new(format!("{}={}", APP_NAME, level))
    });

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if args.json_logs() {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(io::stderr))
            .try_init()
    };
    installed.map_err(|e| AppError::Config(format!("Failed to initialise logging: {}", e)))
}

fn build_audit(config: &Config, json: bool) -> AppResult<Audit> {
    let format = if json {
        EventLogFormat::Json
    } else {
        EventLogFormat::Text
    };
    let mut sinks: Vec<Box<dyn AuditSink>> =
        vec![Box::new(EventLog::new(config.log_file.clone(), format))];
    if let Some(url) = &config.report_url {
        sinks.push(Box::new(HttpReporter::new(url.clone())?));
    }

    Ok(Audit::new(load_agent_id(&config.agent_id_file), sinks))
}

async fn cancel_on_signal(cancel: CancellationToken) {
    if let Err(e) = wait_for_signal().await {
        debug!(error = %e, "Signal handling unavailable");
        return;
    }
    warn!("Interrupted; re-encrypting before exit");
    cancel.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
