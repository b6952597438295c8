/// `load_config` module: reads the client configuration file and the
/// environment settings and turns both into the validated [`WatchConfig`].
///
/// This is the only place where untrusted configuration is parsed. The file
/// is a mapping keyed by client id, in JSON (`config_clients.json`) or YAML
/// (`.yaml` / `.yml`):
///
/// ```text
/// {
///   "6840": {
///     "name": "Gemeinde Beispiel",
///     "year": 2025,
///     "files": [
///       { "pattern": "6840_Budget.xlsx",  "convert": "xlsx" },
///       { "pattern": "6840_Entwurf.docx", "convert": "docx" }
///     ],
///     "merge_order": ["6840_Entwurf.pdf", "6840_Budget.pdf"]
///   }
/// }
/// ```
///
/// Declaration order is kept: it decides which client receives a file
/// name configured more than once.
///
/// # Errors
/// Every problem is a [`ConfigError`] and is fatal before watching starts.
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{error, info};

use crate::config::Settings;
use crate::error::ConfigError;
use crate::registry::{ClientRegistry, ClientSpec, ConversionKind, ExpectedFile};

pub const DEFAULT_CLIENTS_FILE: &str = "config_clients.json";

/// Everything the watch needs, validated.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub settings: Settings,
    pub registry: ClientRegistry,
}

#[derive(Debug, Deserialize)]
struct RawClient {
    name: String,
    year: RawYear,
    files: Vec<RawFile>,
    merge_order: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawYear {
    Number(u64),
    Text(String),
}

impl RawYear {
    fn into_string(self) -> String {
        match self {
            RawYear::Number(n) => n.to_string(),
            RawYear::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFile {
    pattern: String,
    convert: ConversionKind,
}

/// The top-level mapping, entries in document order.
struct ClientEntries(Vec<(String, RawClient)>);

impl<'de> Deserialize<'de> for ClientEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = ClientEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping from client id to client definition")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((id, client)) = map.next_entry::<String, RawClient>()? {
                    entries.push((id, client));
                }
                Ok(ClientEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("yaml" | "yml")
    )
}

/// Parses and validates the client configuration file.
pub fn load_clients<P: AsRef<Path>>(path: P) -> Result<ClientRegistry, ConfigError> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading client configuration");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read client configuration");
        ConfigError::Io {
            path: path_ref.to_path_buf(),
            source: e,
        }
    })?;

    let ClientEntries(entries) = if is_yaml(path_ref) {
        serde_yaml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };
    info!(config_path = ?path_ref, clients = entries.len(), "Parsed client configuration");

    let clients = entries
        .into_iter()
        .map(|(id, raw)| {
            let files = raw
                .files
                .into_iter()
                .map(|f| ExpectedFile::new(f.pattern, f.convert))
                .collect();
            ClientSpec::new(id, raw.name, raw.year.into_string(), files, raw.merge_order)
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            error!(error = %e, "Invalid client configuration");
            e
        })?;

    ClientRegistry::new(clients)
}

/// Loads settings from the environment and clients from `clients_path`.
pub fn load_config<P: AsRef<Path>>(clients_path: P) -> Result<WatchConfig, ConfigError> {
    let settings = Settings::from_env().map_err(|e| {
        error!(error = %e, "Invalid environment settings");
        e
    })?;
    let registry = load_clients(clients_path)?;
    settings.trace_loaded();
    registry.trace_loaded();
    Ok(WatchConfig { settings, registry })
}
