//! # contract: interfaces to the external collaborators
//!
//! The completion tracker never talks to an office suite, a PDF library or a
//! mail server directly. It goes through the three traits below, which lets
//! the binary plug in real implementations (see [`crate::converters`],
//! [`crate::merge`], [`crate::mail`]) and lets tests plug in `mockall` mocks.
//!
//! Every method reports failure as a [`BoxError`]. The gateways that call
//! these traits turn those errors into outcome values, so a failing
//! collaborator can never stop the watch loop.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::registry::ConversionKind;

/// Error type at the collaborator boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Turns one source document into a single canonical PDF.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert `input` into a PDF written at exactly `output`.
    async fn convert(
        &self,
        kind: ConversionKind,
        input: &Path,
        output: &Path,
    ) -> Result<(), BoxError>;
}

/// Concatenates PDFs, in the given order, into one document.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Merger: Send + Sync {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), BoxError>;
}

/// A message to deliver once a client's artifact exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    /// One or more addresses separated by `;`.
    pub recipient: String,
    pub attachments: Vec<PathBuf>,
}

/// Dispatches a [`Notification`] (mail, draft, ...).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), BoxError>;
}
