//! Error taxonomy for start-up and watching.
//!
//! Collaborator faults (conversion, merge, notification) never surface as
//! these errors at run time: the gateways turn them into outcome values. Only
//! configuration problems and watcher failures are fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Problems found while loading settings or the client configuration.
/// Any of these stops the process before the watch starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON client config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse YAML client config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("environment variable {name} has an invalid value {value:?}: {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("watch folder does not exist or is not a directory: {0}")]
    WatchFolder(PathBuf),

    #[error("client {client_id}: {reason}")]
    InvalidClient { client_id: String, reason: String },

    #[error("client {0} is configured more than once")]
    DuplicateClient(String),

    #[error("no clients configured")]
    NoClients,

    #[error("unknown client {0}")]
    UnknownClient(String),
}

impl ConfigError {
    pub(crate) fn invalid_client(client_id: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidClient {
            client_id: client_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures of the file-system watch itself.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("failed to build notifier: {0}")]
    Notifier(String),
}

/// Failures while concatenating PDF documents.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("nothing to merge")]
    NoInputs,

    #[error("{path}: {source}")]
    Pdf {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("{0}: document has no page tree")]
    MissingPageTree(PathBuf),

    #[error("failed to write merged document: {0}")]
    Write(#[from] std::io::Error),
}
