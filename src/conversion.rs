//! Conversion gateway: runs one conversion for one matched arrival and
//! reports the result as a value.
//!
//! The canonical output always lands in the gateway's output directory under
//! [`ExpectedFile::canonical_name`]. Errors, panics and timeouts of the
//! converter all come back as [`ConversionResult::Failed`]. Nothing is
//! retried here; a retry is the operator dropping the source file again.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::contract::Converter;
use crate::registry::ExpectedFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionResult {
    Converted {
        canonical_name: String,
        canonical_path: PathBuf,
    },
    Failed {
        reason: String,
    },
}

impl ConversionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionResult::Converted { .. })
    }
}

pub struct ConversionGateway {
    converter: Arc<dyn Converter>,
    output_dir: PathBuf,
    timeout: Duration,
}

impl ConversionGateway {
    pub fn new(converter: Arc<dyn Converter>, output_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            converter,
            output_dir: output_dir.into(),
            timeout,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn convert(&self, source: &Path, expected: &ExpectedFile) -> ConversionResult {
        let canonical_name = expected.canonical_name().to_string();
        let canonical_path = self.output_dir.join(&canonical_name);
        let kind = expected.kind;
        debug!(
            source = %source.display(),
            output = %canonical_path.display(),
            %kind,
            "Starting conversion"
        );

        // Own task so a panicking converter is reported instead of unwinding into the tracker.
        let converter = Arc::clone(&self.converter);
        let input = source.to_path_buf();
        let output = canonical_path.clone();
        let mut task = tokio::spawn(async move {
            converter
                .convert(kind, &input, &output)
                .await
                .map_err(|e| e.to_string())
        });

        let reason = match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(Ok(()))) => {
                info!(
                    source = %source.display(),
                    canonical = %canonical_name,
                    "Conversion succeeded"
                );
                return ConversionResult::Converted {
                    canonical_name,
                    canonical_path,
                };
            }
            Ok(Ok(Err(e))) => e,
            Ok(Err(join_error)) => format!("converter aborted: {join_error}"),
            Err(_) => {
                task.abort();
                format!("conversion timed out after {}s", self.timeout.as_secs_f64())
            }
        };

        error!(
            source = %source.display(),
            %kind,
            reason = %reason,
            "Conversion failed"
        );
        ConversionResult::Failed { reason }
    }
}
