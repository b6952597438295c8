use merge_watch::config::Settings;
use merge_watch::converters::ConverterBackend;
use merge_watch::event_source::{FileArrivalEvent, Noise};
use merge_watch::load_config::WatchConfig;
use merge_watch::registry::{ClientRegistry, ClientSpec, ConversionKind, ExpectedFile};
use merge_watch::service::{build_tracker, test_notification};
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

fn config(watch_folder: &Path) -> WatchConfig {
    let client = ClientSpec::new(
        "6840",
        "Gemeinde Beispiel",
        "2025",
        vec![ExpectedFile::new("6840_Budget.xlsx", ConversionKind::Spreadsheet)],
        vec!["6840_Budget.pdf".into()],
    )
    .unwrap();
    WatchConfig {
        settings: Settings {
            watch_folder: watch_folder.to_path_buf(),
            recipient: "kasse@example.org".into(),
            sender: "watch@example.org".into(),
            smtp: None,
            draft_dir: watch_folder.join("outbox"),
            temp_suffix: ".part".into(),
            convert_timeout: Duration::from_secs(30),
            converter: ConverterBackend::Placeholder,
            soffice_bin: "soffice".into(),
        },
        registry: ClientRegistry::new(vec![client]).unwrap(),
    }
}

#[test]
fn tracker_filter_follows_the_settings() {
    let dir = tempdir().unwrap();
    let tracker = build_tracker(&config(dir.path())).expect("tracker builds");
    let filter = tracker.filter();

    assert_eq!(
        filter.classify(&FileArrivalEvent::file(dir.path().join("6840_Budget.xlsx.part"))),
        Some(Noise::TempFile)
    );
    // `.tmp` is only noise when configured as the suffix.
    assert_eq!(filter.classify(&FileArrivalEvent::file(dir.path().join("6840_Budget.tmp"))), None);
    assert_eq!(
        filter.classify(&FileArrivalEvent::file(dir.path().join("6840_Haushalt_2025.pdf"))),
        Some(Noise::OwnArtifact)
    );
}

#[test]
fn test_notification_goes_to_the_recipient_without_attachments() {
    let dir = tempdir().unwrap();
    let notification = test_notification(&config(dir.path()).settings);
    assert_eq!(notification.subject, "[Test] merge-watch");
    assert_eq!(notification.recipient, "kasse@example.org");
    assert!(notification.attachments.is_empty());
}
