mod test_helpers;

use encedit::audit::{Audit, EventKind, MemorySink, Outcome};
use encedit::errors::{AppError, ConflictingPath};
use encedit::lifecycle::{
    recover, CommitSummary, Controller, FinalizeOutcome, RecoveryAction, RunPaths, RunReport,
    RunState, SkipReason,
};
use encedit::watch::SessionEnd;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;
use test_helpers::{codec, fast_timings, read_artifact, write_artifact, Script, ScriptedLauncher};
use tokio_util::sync::CancellationToken;

fn controller(script: Script) -> (Controller, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let audit = Audit::new("test-agent", vec![Box::new(sink.clone())]);
    let controller = Controller::new(
        codec(),
        Arc::new(ScriptedLauncher::new(script)),
        fast_timings(),
        audit,
    );
    (controller, sink)
}

fn assert_clean(paths: &RunPaths) {
    assert!(paths.artifact.is_file(), "artifact missing");
    assert!(!paths.working.exists(), "plaintext left behind");
    assert!(!paths.journal.exists(), "journal left behind");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_report_pdf_session_round_trip() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("report.pdf.enc");
    write_artifact(&artifact, b"%PDF-1.7 draft");
    let paths = RunPaths::from_artifact(&artifact).unwrap();

    let (controller, sink) = controller(Script::EditThenExit(b"%PDF-1.7 final".to_vec()));
    let report = controller
        .run(&artifact, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        report,
        RunReport::Finished {
            end: SessionEnd::Released,
            outcome: FinalizeOutcome::Committed(CommitSummary {
                content_changed: Some(true),
                working_deleted: true,
                journal_deleted: true,
            }),
        }
    );
    assert_clean(&paths);
    assert_eq!(read_artifact(&artifact), b"%PDF-1.7 final");

    let kinds = sink.kinds();
    let staged = kinds.iter().position(|k| *k == EventKind::Staged).unwrap();
    let committed = kinds.iter().position(|k| *k == EventKind::Committed).unwrap();
    assert!(staged < committed);
    assert!(sink.contains(EventKind::Launched, Outcome::Success));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_launch_failure_falls_back_to_modification_watching() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("notes.txt.enc");
    write_artifact(&artifact, b"first draft\r\n");
    let paths = RunPaths::from_artifact(&artifact).unwrap();

    let (controller, sink) = controller(Script::FailToLaunch);
    let working = paths.working.clone();
    let editor = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        fs::write(&working, "second draft\r\n").unwrap();
    });

    let report = controller
        .run(&artifact, CancellationToken::new())
        .await
        .unwrap();
    editor.join().unwrap();

    match report {
        RunReport::Finished { end, outcome } => {
            assert_eq!(end, SessionEnd::Quiescent);
            assert!(matches!(outcome, FinalizeOutcome::Committed(_)));
        }
        other => panic!("Expected a finished session, got {:?}", other),
    }
    assert_clean(&paths);
    // The editor dropped the BOM; the next decrypt adds it back.
    assert_eq!(read_artifact(&artifact), b"second draft\r\n");
    assert!(sink.contains(EventKind::LaunchFailed, Outcome::Failure));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancellation_finalizes_immediately() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("model.xlsx.enc");
    write_artifact(&artifact, b"cells");
    let paths = RunPaths::from_artifact(&artifact).unwrap();

    let (controller, sink) = controller(Script::StayOpen);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let report = controller.run(&artifact, cancel).await.unwrap();

    match report {
        RunReport::Finished { end, outcome } => {
            assert_eq!(end, SessionEnd::Cancelled);
            assert!(matches!(outcome, FinalizeOutcome::Committed(_)));
        }
        other => panic!("Expected a finished session, got {:?}", other),
    }
    assert_clean(&paths);
    assert_eq!(read_artifact(&artifact), b"cells");
    assert!(sink.contains(EventKind::Cancelled, Outcome::Success));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deleted_working_file_restores_artifact() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("scan.png.enc");
    write_artifact(&artifact, b"pixels");
    let original = fs::read(&artifact).unwrap();
    let paths = RunPaths::from_artifact(&artifact).unwrap();

    let (controller, _sink) = controller(Script::StayOpen);
    let working = paths.working.clone();
    let remover = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        fs::remove_file(&working).unwrap();
    });

    let report = controller
        .run(&artifact, CancellationToken::new())
        .await
        .unwrap();
    remover.join().unwrap();

    assert_eq!(
        report,
        RunReport::Finished {
            end: SessionEnd::WorkingPathGone,
            outcome: FinalizeOutcome::AlreadyFinalized,
        }
    );
    assert_eq!(report.state(), RunState::RolledBack);
    assert_clean(&paths);
    assert_eq!(fs::read(&artifact).unwrap(), original);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ciphertext_lives_only_in_journal_while_editing() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("ledger.csv.enc");
    write_artifact(&artifact, b"date,amount\n2026-10-01,12\n");
    let original = fs::read(&artifact).unwrap();
    let paths = RunPaths::from_artifact(&artifact).unwrap();

    let (controller, _sink) = controller(Script::StayOpen);
    let cancel = CancellationToken::new();
    let observer = {
        let paths = paths.clone();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            let deadline = Instant::now() + Duration::from_secs(5);
            while fs::read(&paths.working).ok().as_deref()
                != Some(&b"date,amount\n2026-10-01,12\n"[..])
            {
                assert!(Instant::now() < deadline, "session never reached editing");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            let during = (
                paths.artifact.exists(),
                fs::read(&paths.journal).ok(),
                fs::read(&paths.working).ok(),
            );
            trigger.cancel();
            during
        })
    };

    let report = controller.run(&artifact, cancel).await.unwrap();
    let (artifact_present, journal, working) = observer.await.unwrap();

    assert!(!artifact_present, "artifact still present during the session");
    assert_eq!(journal, Some(original));
    assert_eq!(working.as_deref(), Some(&b"date,amount\n2026-10-01,12\n"[..]));

    assert_eq!(report.state(), RunState::Committed);
    assert_clean(&paths);
    assert_eq!(read_artifact(&artifact), b"date,amount\n2026-10-01,12\n");
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_dangling_symlink_at_working_path_is_a_conflict() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("secret.pdf.enc");
    write_artifact(&artifact, b"TOP SECRET");
    let original = fs::read(&artifact).unwrap();
    let paths = RunPaths::from_artifact(&artifact).unwrap();
    let target = dir.path().join("elsewhere.bin");
    std::os::unix::fs::symlink(&target, &paths.working).unwrap();

    let (controller, sink) = controller(Script::StayOpen);
    let result = controller.run(&artifact, CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(AppError::PreconditionConflict {
            conflict: ConflictingPath::Working,
            ..
        })
    ));
    assert!(!target.exists(), "plaintext written through the link");
    assert_eq!(fs::read(&artifact).unwrap(), original);
    assert!(!paths.journal.exists());
    assert!(!sink.kinds().contains(&EventKind::Staged));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_dangling_symlink_at_journal_path_is_a_conflict() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("secret.pdf.enc");
    write_artifact(&artifact, b"TOP SECRET");
    let paths = RunPaths::from_artifact(&artifact).unwrap();
    std::os::unix::fs::symlink(dir.path().join("nowhere"), &paths.journal).unwrap();

    let (controller, _sink) = controller(Script::StayOpen);
    let result = controller.run(&artifact, CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(AppError::PreconditionConflict {
            conflict: ConflictingPath::Journal,
            ..
        })
    ));
    assert!(artifact.is_file());
    assert!(!paths.working.exists());
    assert!(fs::symlink_metadata(&paths.journal).unwrap().file_type().is_symlink());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_existing_working_file_aborts_without_changes() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("report.pdf.enc");
    write_artifact(&artifact, b"cipher me");
    let original = fs::read(&artifact).unwrap();
    let paths = RunPaths::from_artifact(&artifact).unwrap();
    fs::write(&paths.working, b"unsaved edits").unwrap();

    let (controller, sink) = controller(Script::StayOpen);
    let result = controller.run(&artifact, CancellationToken::new()).await;

    match result {
        Err(AppError::PreconditionConflict { conflict, path, .. }) => {
            assert_eq!(conflict, ConflictingPath::Working);
            assert_eq!(path, paths.working);
        }
        other => panic!("Expected a precondition conflict, got {:?}", other),
    }
    assert_eq!(fs::read(&artifact).unwrap(), original);
    assert_eq!(fs::read(&paths.working).unwrap(), b"unsaved edits");
    assert!(!paths.journal.exists());
    assert!(sink.contains(EventKind::Conflict, Outcome::Failure));
    assert!(!sink.kinds().contains(&EventKind::Staged));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_existing_journal_aborts_without_changes() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("report.pdf.enc");
    write_artifact(&artifact, b"cipher me");
    let paths = RunPaths::from_artifact(&artifact).unwrap();
    fs::write(&paths.journal, b"older ciphertext").unwrap();

    let (controller, _sink) = controller(Script::StayOpen);
    let result = controller.run(&artifact, CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(AppError::PreconditionConflict {
            conflict: ConflictingPath::Journal,
            ..
        })
    ));
    assert_eq!(fs::read(&paths.journal).unwrap(), b"older ciphertext");
    assert!(!paths.working.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_and_unsuffixed_files_are_skipped() {
    let dir = tempdir().unwrap();
    let (controller, sink) = controller(Script::StayOpen);

    let missing = dir.path().join("gone.pdf.enc");
    let report = controller
        .run(&missing, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        report,
        RunReport::Skipped {
            artifact: missing.clone(),
            reason: SkipReason::Missing,
        }
    );

    let plain = dir.path().join("report.pdf");
    fs::write(&plain, b"not encrypted").unwrap();
    let report = controller
        .run(&plain, CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(
        report,
        RunReport::Skipped {
            reason: SkipReason::NotEncrypted,
            ..
        }
    ));
    assert_eq!(fs::read(&plain).unwrap(), b"not encrypted");
    assert!(sink.events().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_plaintext_artifact_is_opened_and_encrypted() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("memo.doc.enc");
    // 21 bytes cannot be ciphertext.
    fs::write(&artifact, b"never encrypted memo.").unwrap();
    let paths = RunPaths::from_artifact(&artifact).unwrap();

    let (controller, sink) = controller(Script::EditThenExit(b"edited memo".to_vec()));
    controller
        .run(&artifact, CancellationToken::new())
        .await
        .unwrap();

    assert_clean(&paths);
    assert_eq!(read_artifact(&artifact), b"edited memo");
    assert!(sink.contains(EventKind::DecryptFallback, Outcome::Success));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_reencryption_rolls_back() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("report.pdf.enc");
    write_artifact(&artifact, b"original");
    let original = fs::read(&artifact).unwrap();
    let paths = RunPaths::from_artifact(&artifact).unwrap();

    let (controller, sink) = controller(Script::StayOpen);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let working = paths.working.clone();
    let saboteur = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        // A directory cannot be read back as plaintext.
        fs::remove_file(&working).unwrap();
        fs::create_dir(&working).unwrap();
        thread::sleep(Duration::from_millis(50));
        trigger.cancel();
    });

    let result = controller.run(&artifact, cancel).await;
    saboteur.join().unwrap();

    assert!(matches!(result, Err(AppError::RolledBack { attempts: 3, .. })));
    assert_eq!(fs::read(&artifact).unwrap(), original);
    assert!(!paths.journal.exists());
    assert!(paths.working.exists());
    assert!(sink.contains(EventKind::JournalRestored, Outcome::Success));
}

#[test]
fn test_recovery_after_interrupted_run() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("report.pdf.enc");
    write_artifact(&artifact, b"precious");
    let paths = RunPaths::from_artifact(&artifact).unwrap();

    // Simulate a crash after staging: journal present, artifact gone.
    fs::rename(&paths.artifact, &paths.journal).unwrap();

    let outcome = recover(&artifact, &Audit::tracing_only("test")).unwrap();
    assert_eq!(outcome.action, RecoveryAction::Restored);
    assert!(!outcome.working_left_behind);
    assert!(!paths.journal.exists());
    assert_eq!(read_artifact(Path::new(&artifact)), b"precious");
}
