use merge_watch::config::Settings;
use merge_watch::converters::ConverterBackend;
use merge_watch::error::ConfigError;
use merge_watch::load_config::{load_clients, load_config};
use merge_watch::registry::ConversionKind;
use serial_test::serial;
use std::collections::HashMap;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::{tempdir, Builder, NamedTempFile};

const CLIENTS_JSON: &str = r#"
{
  "6840": {
    "name": "Gemeinde Beispiel",
    "year": 2025,
    "files": [
      { "pattern": "6840_Budget.xlsx", "convert": "xlsx" },
      { "pattern": "6840_Entwurf.docx", "convert": "docx" }
    ],
    "merge_order": ["6840_Entwurf.pdf", "6840_Budget.pdf"]
  },
  "1000": {
    "name": "Markt Eins",
    "year": "2026",
    "files": [
      { "pattern": "1000_Plan.docx", "convert": "word-document" }
    ],
    "merge_order": ["1000_Plan.pdf"]
  }
}
"#;

fn json_file(content: &str) -> NamedTempFile {
    let file = Builder::new().suffix(".json").tempfile().expect("temp file");
    write(file.path(), content).unwrap();
    file
}

#[test]
fn json_clients_keep_declaration_order() {
    let file = json_file(CLIENTS_JSON);
    let registry = load_clients(file.path()).expect("config should load");

    let ids: Vec<&str> = registry.clients().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["6840", "1000"]);

    let budget = &registry.clients()[0];
    assert_eq!(budget.display_name, "Gemeinde Beispiel");
    assert_eq!(budget.year, "2025");
    assert_eq!(budget.expected_files[0].kind, ConversionKind::Spreadsheet);
    assert_eq!(budget.expected_files[1].kind, ConversionKind::WordDocument);
    assert_eq!(budget.artifact_name(), "6840_Haushalt_2025.pdf");

    let plan = registry.get("1000").unwrap();
    assert_eq!(plan.year, "2026");
    assert_eq!(plan.expected_files[0].kind, ConversionKind::WordDocument);
}

#[test]
fn yaml_clients_are_supported() {
    let file = Builder::new().suffix(".yaml").tempfile().unwrap();
    write(
        file.path(),
        r#"
"2000":
  name: Stadt Zwei
  year: 2025
  files:
    - pattern: 2000_Budget.xlsx
      convert: spreadsheet
    - pattern: 2000_Entwurf.docx
      convert: docx
  merge_order:
    - 2000_Entwurf.pdf
    - 2000_Budget.pdf
"#,
    )
    .unwrap();

    let registry = load_clients(file.path()).expect("yaml config should load");
    let client = registry.get("2000").unwrap();
    assert_eq!(client.merge_order, vec!["2000_Entwurf.pdf", "2000_Budget.pdf"]);
    assert_eq!(client.expected_files[0].kind, ConversionKind::Spreadsheet);
}

#[test]
fn unknown_conversion_kind_fails_to_load() {
    let file = json_file(
        r#"{ "1": { "name": "x", "year": 2025,
              "files": [ { "pattern": "a.pptx", "convert": "pptx" } ],
              "merge_order": ["a.pdf"] } }"#,
    );
    let err = load_clients(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Json(_)), "{err}");
}

#[test]
fn missing_merge_order_entry_fails_to_load() {
    let file = json_file(
        r#"{ "1": { "name": "x", "year": 2025,
              "files": [ { "pattern": "a.docx", "convert": "docx" },
                         { "pattern": "b.xlsx", "convert": "xlsx" } ],
              "merge_order": ["a.pdf"] } }"#,
    );
    let err = load_clients(file.path()).unwrap_err();
    assert!(
        matches!(&err, ConfigError::InvalidClient { client_id, .. } if client_id == "1"),
        "{err}"
    );
}

#[test]
fn duplicate_client_ids_fail_to_load() {
    let file = json_file(
        r#"{ "1": { "name": "x", "year": 2025, "files": [ { "pattern": "a.docx", "convert": "docx" } ], "merge_order": ["a.pdf"] },
             "1": { "name": "y", "year": 2025, "files": [ { "pattern": "b.docx", "convert": "docx" } ], "merge_order": ["b.pdf"] } }"#,
    );
    assert!(matches!(load_clients(file.path()), Err(ConfigError::DuplicateClient(id)) if id == "1"));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = load_clients(dir.path().join("config_clients.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn settings_defaults() {
    let dir = tempdir().unwrap();
    let vars: HashMap<&str, String> = HashMap::from([
        ("WATCH_FOLDER", dir.path().display().to_string()),
        ("EMAIL_TO", "kasse@example.org".to_string()),
        ("SMTP_PORT", "587".to_string()),
    ]);
    let settings = Settings::from_vars(|k| vars.get(k).cloned()).expect("settings");

    assert_eq!(settings.watch_folder, dir.path());
    assert_eq!(settings.sender, "kasse@example.org");
    assert!(settings.smtp.is_none(), "SMTP_PORT alone does not enable SMTP");
    assert_eq!(settings.draft_dir, dir.path().join("outbox"));
    assert_eq!(settings.temp_suffix, ".tmp");
    assert_eq!(settings.convert_timeout, Duration::from_secs(300));
    assert_eq!(settings.converter, ConverterBackend::Office);
    assert_eq!(settings.soffice_bin, PathBuf::from("soffice"));
}

#[test]
fn settings_with_smtp_and_overrides() {
    let dir = tempdir().unwrap();
    let vars: HashMap<&str, String> = HashMap::from([
        ("WATCH_FOLDER", dir.path().display().to_string()),
        ("EMAIL_TO", "kasse@example.org".to_string()),
        ("EMAIL_FROM", "watch@example.org".to_string()),
        ("SMTP_SERVER", "smtp.example.org".to_string()),
        ("SMTP_PORT", "0".to_string()),
        ("EMAIL_USER", "watch".to_string()),
        ("EMAIL_PASS", "secret".to_string()),
        ("CONVERT_TIMEOUT_SECS", "45".to_string()),
        ("CONVERTER", "placeholder".to_string()),
        ("TEMP_SUFFIX", ".part".to_string()),
    ]);
    let settings = Settings::from_vars(|k| vars.get(k).cloned()).expect("settings");

    let smtp = settings.smtp.as_ref().expect("smtp configured");
    assert_eq!(smtp.server, "smtp.example.org");
    assert_eq!(smtp.port, None);
    assert_eq!(smtp.username.as_deref(), Some("watch"));
    assert!(!format!("{smtp:?}").contains("secret"));
    assert_eq!(settings.sender, "watch@example.org");
    assert_eq!(settings.convert_timeout, Duration::from_secs(45));
    assert_eq!(settings.converter, ConverterBackend::Placeholder);
    assert_eq!(settings.temp_suffix, ".part");
}

#[test]
fn settings_reject_bad_values() {
    let dir = tempdir().unwrap();
    let base = |extra: (&'static str, &str)| {
        let mut vars: HashMap<&str, String> = HashMap::from([
            ("WATCH_FOLDER", dir.path().display().to_string()),
            ("EMAIL_TO", "kasse@example.org".to_string()),
        ]);
        vars.insert(extra.0, extra.1.to_string());
        Settings::from_vars(|k| vars.get(k).cloned())
    };

    assert!(matches!(
        base(("CONVERT_TIMEOUT_SECS", "0")),
        Err(ConfigError::InvalidVar { name: "CONVERT_TIMEOUT_SECS", .. })
    ));
    assert!(matches!(
        base(("CONVERTER", "word")),
        Err(ConfigError::InvalidVar { name: "CONVERTER", .. })
    ));
    assert!(matches!(
        base(("SMTP_SERVER", "smtp.example.org")).map(|s| s.smtp.is_some()),
        Ok(true)
    ));

    let missing = Settings::from_vars(|k| (k == "EMAIL_TO").then(|| "a@b.c".to_string()));
    assert!(matches!(missing, Err(ConfigError::MissingVar("WATCH_FOLDER"))));

    let gone = dir.path().join("does-not-exist");
    let no_dir = Settings::from_vars(|k| match k {
        "WATCH_FOLDER" => Some(gone.display().to_string()),
        "EMAIL_TO" => Some("a@b.c".to_string()),
        _ => None,
    });
    assert!(matches!(no_dir, Err(ConfigError::WatchFolder(_))));
}

#[test]
#[serial]
fn load_config_reads_environment() {
    let dir = tempdir().unwrap();
    let file = json_file(CLIENTS_JSON);

    env::set_var("WATCH_FOLDER", dir.path());
    env::set_var("EMAIL_TO", "kasse@example.org");
    env::remove_var("SMTP_SERVER");

    let config = load_config(file.path()).expect("config should load");
    assert_eq!(config.settings.watch_folder, dir.path());
    assert_eq!(config.registry.clients().len(), 2);

    env::remove_var("EMAIL_TO");
    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::MissingVar("EMAIL_TO")));

    env::remove_var("WATCH_FOLDER");
}
