//! Client registry: the validated, immutable set of clients and the files
//! each of them is expected to deliver.
//!
//! The registry is built once at start-up and only read afterwards. Lookup
//! order is the order in which clients were declared in the configuration,
//! and inside a client the order of its `files` list; [`ClientRegistry::match_file`]
//! returns the first exact match in that order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

use crate::error::ConfigError;

/// Extension of every canonical (converted) file and of the merged artifact.
pub const CANONICAL_EXTENSION: &str = "pdf";

/// The closed set of supported conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversionKind {
    #[serde(rename = "docx", alias = "word-document")]
    WordDocument,
    #[serde(rename = "xlsx", alias = "spreadsheet")]
    Spreadsheet,
}

impl fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionKind::WordDocument => f.write_str("word-document"),
            ConversionKind::Spreadsheet => f.write_str("spreadsheet"),
        }
    }
}

/// Canonical file name for a source pattern: same stem, `.pdf` extension.
pub fn canonical_name(pattern: &str) -> String {
    let stem = Path::new(pattern)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(pattern);
    format!("{stem}.{CANONICAL_EXTENSION}")
}

/// One deliverable of a client: the exact source file name and how to convert it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFile {
    pub pattern: String,
    pub kind: ConversionKind,
    canonical: String,
}

impl ExpectedFile {
    pub fn new(pattern: impl Into<String>, kind: ConversionKind) -> Self {
        let pattern = pattern.into();
        let canonical = canonical_name(&pattern);
        Self {
            pattern,
            kind,
            canonical,
        }
    }

    pub fn canonical_name(&self) -> &str {
        &self.canonical
    }
}

/// A tenant's expected deliverable set, merge order and artifact naming.
#[derive(Debug, Clone)]
pub struct ClientSpec {
    pub id: String,
    pub display_name: String,
    pub year: String,
    pub expected_files: Vec<ExpectedFile>,
    pub merge_order: Vec<String>,
}

impl ClientSpec {
    /// Builds a client and checks that `merge_order` is a permutation of the
    /// canonical names of `expected_files`.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        year: impl Into<String>,
        expected_files: Vec<ExpectedFile>,
        merge_order: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let spec = Self {
            id: id.into(),
            display_name: display_name.into(),
            year: year.into(),
            expected_files,
            merge_order,
        };
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let id = self.id.as_str();
        if id.trim().is_empty() {
            return Err(ConfigError::invalid_client(id, "client id is empty"));
        }
        if self.expected_files.is_empty() {
            return Err(ConfigError::invalid_client(id, "no files configured"));
        }

        let mut patterns = BTreeSet::new();
        let mut canonicals = BTreeSet::new();
        for file in &self.expected_files {
            if file.pattern.is_empty() {
                return Err(ConfigError::invalid_client(id, "empty file pattern"));
            }
            if file.pattern.contains(['/', '\\']) {
                return Err(ConfigError::invalid_client(
                    id,
                    format!("pattern {:?} must be a bare file name", file.pattern),
                ));
            }
            if !patterns.insert(file.pattern.as_str()) {
                return Err(ConfigError::invalid_client(
                    id,
                    format!("pattern {:?} is listed twice", file.pattern),
                ));
            }
            if !canonicals.insert(file.canonical_name()) {
                return Err(ConfigError::invalid_client(
                    id,
                    format!(
                        "two files convert to the same canonical name {:?}",
                        file.canonical_name()
                    ),
                ));
            }
        }

        if self.merge_order.len() != self.expected_files.len() {
            return Err(ConfigError::invalid_client(
                id,
                format!(
                    "merge_order has {} entries but {} files are configured",
                    self.merge_order.len(),
                    self.expected_files.len()
                ),
            ));
        }
        let mut ordered = BTreeSet::new();
        for name in &self.merge_order {
            if !canonicals.contains(name.as_str()) {
                return Err(ConfigError::invalid_client(
                    id,
                    format!("merge_order entry {name:?} is not produced by any configured file"),
                ));
            }
            if !ordered.insert(name.as_str()) {
                return Err(ConfigError::invalid_client(
                    id,
                    format!("merge_order entry {name:?} is listed twice"),
                ));
            }
        }
        Ok(())
    }

    /// The full set of canonical names this client must produce to be complete.
    pub fn expected_canonical(&self) -> BTreeSet<String> {
        self.expected_files
            .iter()
            .map(|f| f.canonical_name().to_string())
            .collect()
    }

    /// File name of the merged artifact, e.g. `6840_Haushalt_2025.pdf`.
    pub fn artifact_name(&self) -> String {
        format!("{}_Haushalt_{}.{CANONICAL_EXTENSION}", self.id, self.year)
    }
}

/// All configured clients in declaration order.
#[derive(Debug, Clone)]
pub struct ClientRegistry {
    clients: Vec<ClientSpec>,
}

impl ClientRegistry {
    /// Rejects duplicate ids. A source name configured by more than one
    /// client is accepted with a warning; the first declared client wins.
    pub fn new(clients: Vec<ClientSpec>) -> Result<Self, ConfigError> {
        if clients.is_empty() {
            return Err(ConfigError::NoClients);
        }

        let mut owners: HashMap<&str, &str> = HashMap::new();
        let mut ids = BTreeSet::new();
        for client in &clients {
            if !ids.insert(client.id.as_str()) {
                return Err(ConfigError::DuplicateClient(client.id.clone()));
            }
            for file in &client.expected_files {
                match owners.get(file.pattern.as_str()) {
                    Some(owner) => warn!(
                        pattern = %file.pattern,
                        winner = %owner,
                        shadowed = %client.id,
                        "Source file name configured for several clients; the first declared client receives it"
                    ),
                    None => {
                        owners.insert(file.pattern.as_str(), client.id.as_str());
                    }
                }
            }
        }

        Ok(Self { clients })
    }

    pub fn clients(&self) -> &[ClientSpec] {
        &self.clients
    }

    pub fn get(&self, client_id: &str) -> Option<&ClientSpec> {
        self.clients.iter().find(|c| c.id == client_id)
    }

    /// First client/file pair whose pattern equals `file_name` exactly.
    pub fn match_file(&self, file_name: &str) -> Option<(&ClientSpec, &ExpectedFile)> {
        self.clients.iter().find_map(|client| {
            client
                .expected_files
                .iter()
                .find(|f| f.pattern == file_name)
                .map(|f| (client, f))
        })
    }

    /// Names of every client's merged artifact.
    pub fn artifact_names(&self) -> impl Iterator<Item = String> + '_ {
        self.clients.iter().map(ClientSpec::artifact_name)
    }

    pub fn trace_loaded(&self) {
        info!(clients = self.clients.len(), "Loaded client registry");
        for client in &self.clients {
            info!(
                client_id = %client.id,
                name = %client.display_name,
                files = client.expected_files.len(),
                artifact = %client.artifact_name(),
                "Loaded client"
            );
        }
    }
}
