use merge_watch::contract::{MockMerger, MockNotifier, Notification};
use merge_watch::finalize::{FinalizeOutcome, Finalizer};
use merge_watch::registry::{ClientSpec, ConversionKind, ExpectedFile};
use merge_watch::tracker::ClientProgress;
use std::sync::Arc;
use tempfile::tempdir;

fn client_6840() -> ClientSpec {
    ClientSpec::new(
        "6840",
        "Gemeinde Beispiel",
        2025.to_string(),
        vec![
            ExpectedFile::new("6840_Budget.xlsx", ConversionKind::Spreadsheet),
            ExpectedFile::new("6840_Entwurf.docx", ConversionKind::WordDocument),
        ],
        vec!["6840_Entwurf.pdf".into(), "6840_Budget.pdf".into()],
    )
    .unwrap()
}

fn complete_progress() -> ClientProgress {
    let mut progress = ClientProgress::new("6840");
    progress.record("6840_Budget.pdf");
    progress.record("6840_Entwurf.pdf");
    progress
}

#[tokio::test]
async fn delivers_artifact_with_notification() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("6840_Haushalt_2025.pdf");

    let mut merger = MockMerger::new();
    let (inputs_dir, out) = (dir.path().to_path_buf(), artifact.clone());
    merger
        .expect_merge()
        .times(1)
        .withf(move |inputs, output| {
            inputs == [inputs_dir.join("6840_Entwurf.pdf"), inputs_dir.join("6840_Budget.pdf")]
                && output == out.as_path()
        })
        .returning(|_, _| Ok(()));

    let mut notifier = MockNotifier::new();
    let attached = artifact.clone();
    notifier
        .expect_notify()
        .times(1)
        .withf(move |n: &Notification| {
            n.subject == "Mandant 6840: Haushaltsentwurf fertig"
                && n.body.contains("Gemeinde Beispiel")
                && n.body.contains("6840_Haushalt_2025.pdf")
                && n.attachments == vec![attached.clone()]
        })
        .returning(|_| Ok(()));

    let finalizer = Finalizer::new(Arc::new(merger), Arc::new(notifier), dir.path(), "kasse@example.org");
    let outcome = finalizer.finalize(&client_6840(), &complete_progress()).await;
    assert_eq!(outcome, FinalizeOutcome::Delivered { artifact });
}

#[tokio::test]
async fn merge_failure_skips_notification() {
    let dir = tempdir().unwrap();
    let mut merger = MockMerger::new();
    merger
        .expect_merge()
        .returning(|_, _| Err("input 6840_Budget.pdf is truncated".into()));
    let mut notifier = MockNotifier::new();
    notifier.expect_notify().never();

    let finalizer = Finalizer::new(Arc::new(merger), Arc::new(notifier), dir.path(), "kasse@example.org");
    let outcome = finalizer.finalize(&client_6840(), &complete_progress()).await;
    assert_eq!(
        outcome,
        FinalizeOutcome::MergeFailed {
            reason: "input 6840_Budget.pdf is truncated".into()
        }
    );
}

#[tokio::test]
async fn notification_failure_keeps_the_artifact_path() {
    let dir = tempdir().unwrap();
    let mut merger = MockMerger::new();
    merger.expect_merge().returning(|_, _| Ok(()));
    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .times(1)
        .returning(|_| Err("relay refused connection".into()));

    let finalizer = Finalizer::new(Arc::new(merger), Arc::new(notifier), dir.path(), "kasse@example.org");
    let outcome = finalizer.finalize(&client_6840(), &complete_progress()).await;
    assert_eq!(
        outcome,
        FinalizeOutcome::NotificationFailed {
            artifact: dir.path().join("6840_Haushalt_2025.pdf"),
            reason: "relay refused connection".into(),
        }
    );
}

#[tokio::test]
async fn incomplete_progress_is_not_merged() {
    let dir = tempdir().unwrap();
    let mut merger = MockMerger::new();
    merger.expect_merge().never();
    let mut notifier = MockNotifier::new();
    notifier.expect_notify().never();

    let mut progress = ClientProgress::new("6840");
    progress.record("6840_Budget.pdf");

    let finalizer = Finalizer::new(Arc::new(merger), Arc::new(notifier), dir.path(), "kasse@example.org");
    let outcome = finalizer.finalize(&client_6840(), &progress).await;
    assert_eq!(
        outcome,
        FinalizeOutcome::Incomplete {
            missing: vec!["6840_Entwurf.pdf".into()]
        }
    );
}

#[test]
fn progress_from_directory_sees_existing_canonical_files() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("6840_Budget.pdf"), b"%PDF").unwrap();
    std::fs::write(dir.path().join("6840_Budget.xlsx"), b"source").unwrap();

    let spec = client_6840();
    let progress = ClientProgress::from_directory(&spec, dir.path());
    assert_eq!(progress.completed().len(), 1);
    assert!(!progress.is_complete(&spec));
    assert_eq!(progress.missing(&spec), vec!["6840_Entwurf.pdf".to_string()]);

    std::fs::write(dir.path().join("6840_Entwurf.pdf"), b"%PDF").unwrap();
    assert!(ClientProgress::from_directory(&spec, dir.path()).is_complete(&spec));
}
