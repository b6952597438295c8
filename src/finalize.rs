//! Finalization pipeline: merge a completed client's canonical files in its
//! configured order, then send the artifact to the recipient.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::contract::{Merger, Notification, Notifier};
use crate::registry::ClientSpec;
use crate::tracker::ClientProgress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Artifact written and notification dispatched.
    Delivered { artifact: PathBuf },
    /// Some canonical files are not there yet; nothing was merged.
    Incomplete { missing: Vec<String> },
    /// The merge collaborator failed; no artifact, no notification.
    MergeFailed { reason: String },
    /// The artifact exists but the recipient was not informed.
    NotificationFailed { artifact: PathBuf, reason: String },
}

pub struct Finalizer {
    merger: Arc<dyn Merger>,
    notifier: Arc<dyn Notifier>,
    output_dir: PathBuf,
    recipient: String,
}

impl Finalizer {
    pub fn new(
        merger: Arc<dyn Merger>,
        notifier: Arc<dyn Notifier>,
        output_dir: impl Into<PathBuf>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            merger,
            notifier,
            output_dir: output_dir.into(),
            recipient: recipient.into(),
        }
    }

    /// Canonical paths in merge order.
    pub fn merge_inputs(&self, spec: &ClientSpec) -> Vec<PathBuf> {
        spec.merge_order
            .iter()
            .map(|name| self.output_dir.join(name))
            .collect()
    }

    pub fn artifact_path(&self, spec: &ClientSpec) -> PathBuf {
        self.output_dir.join(spec.artifact_name())
    }

    pub fn notification_for(&self, spec: &ClientSpec, artifact: &std::path::Path) -> Notification {
        let artifact_name = spec.artifact_name();
        Notification {
            subject: format!("Mandant {}: Haushaltsentwurf fertig", spec.id),
            body: format!(
                "Der Haushaltsentwurf für {} wurde erstellt:\n{}",
                spec.display_name, artifact_name
            ),
            recipient: self.recipient.clone(),
            attachments: vec![artifact.to_path_buf()],
        }
    }

    pub async fn finalize(&self, spec: &ClientSpec, progress: &ClientProgress) -> FinalizeOutcome {
        let client_id = spec.id.as_str();
        let missing = progress.missing(spec);
        if !missing.is_empty() {
            error!(%client_id, ?missing, "Refusing to merge an incomplete client");
            return FinalizeOutcome::Incomplete { missing };
        }

        let inputs = self.merge_inputs(spec);
        let artifact = self.artifact_path(spec);
        if let Err(e) = self.merger.merge(&inputs, &artifact).await {
            let reason = e.to_string();
            error!(%client_id, artifact = %artifact.display(), reason = %reason, "Merge failed; notification skipped");
            return FinalizeOutcome::MergeFailed { reason };
        }
        info!(%client_id, artifact = %artifact.display(), "Merged");

        let notification = self.notification_for(spec, &artifact);
        if let Err(e) = self.notifier.notify(&notification).await {
            let reason = e.to_string();
            error!(%client_id, artifact = %artifact.display(), reason = %reason, "Notification failed");
            return FinalizeOutcome::NotificationFailed { artifact, reason };
        }
        info!(%client_id, recipient = %self.recipient, "Notification sent");
        FinalizeOutcome::Delivered { artifact }
    }
}
