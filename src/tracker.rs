//! Completion tracker: matches arrivals to clients, drives their conversion,
//! records per-client progress and triggers finalization exactly once per
//! completed client.
//!
//! # Concurrency
//! [`CompletionTracker::handle_arrival`] may run for many arrivals at once.
//! The progress map sits behind one mutex, which is held only to read a
//! client's state before converting and to commit a conversion result
//! together with the completeness check. Conversion and finalization run
//! outside the lock. Because a client is marked finalized inside the same
//! critical section that observes it complete, two arrivals racing for a
//! client's last files can never both finalize it, and never both miss it.
//!
//! A canonical file is claimed while its conversion runs: a second arrival
//! for the same file is dropped instead of converting onto the same output.
//! A complete client is only finalized once none of its conversions are in
//! flight, so the merge never reads a canonical file that is being rewritten.
//! Whichever conversion ends last (successful or not) finalizes.
//!
//! # Completeness
//! Re-derived on every commit by comparing the recorded canonical names
//! with the client's full expected set, so re-delivered names are harmless.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::conversion::{ConversionGateway, ConversionResult};
use crate::event_source::{EventFilter, FileArrivalEvent};
use crate::finalize::{FinalizeOutcome, Finalizer};
use crate::registry::{ClientRegistry, ClientSpec};

/// Run-time state of one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProgress {
    client_id: String,
    completed: BTreeSet<String>,
    converting: BTreeSet<String>,
    finalized: bool,
}

impl ClientProgress {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            completed: BTreeSet::new(),
            converting: BTreeSet::new(),
            finalized: false,
        }
    }

    /// Progress as found on disk: every expected canonical file already
    /// present in `dir` counts as completed.
    pub fn from_directory(spec: &ClientSpec, dir: &Path) -> Self {
        let mut progress = Self::new(spec.id.clone());
        for name in spec.expected_canonical() {
            if dir.join(&name).is_file() {
                progress.completed.insert(name);
            }
        }
        progress
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn completed(&self) -> &BTreeSet<String> {
        &self.completed
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Canonical names whose conversion is running right now.
    pub fn converting(&self) -> &BTreeSet<String> {
        &self.converting
    }

    /// Records a canonical name; returns false if it was already recorded.
    pub fn record(&mut self, canonical_name: impl Into<String>) -> bool {
        self.completed.insert(canonical_name.into())
    }

    /// Set equality against the full expected set. A finalized record has
    /// been emptied and is never complete again.
    pub fn is_complete(&self, spec: &ClientSpec) -> bool {
        !self.finalized && self.completed == spec.expected_canonical()
    }

    /// Canonical names still missing, in merge order.
    pub fn missing(&self, spec: &ClientSpec) -> Vec<String> {
        spec.merge_order
            .iter()
            .filter(|name| !self.completed.contains(name.as_str()))
            .cloned()
            .collect()
    }

    fn ready_to_finalize(&self, spec: &ClientSpec) -> bool {
        self.converting.is_empty() && self.is_complete(spec)
    }

    fn mark_finalized(&mut self) {
        self.completed.clear();
        self.finalized = true;
    }
}

/// What one arrival led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrivalOutcome {
    /// Filtered as noise.
    Ignored,
    /// No client expects this file name.
    Unmatched,
    /// The matching client was already finalized; nothing was converted.
    AlreadyFinalized { client_id: String },
    /// The same file is being converted for another arrival; nothing was converted.
    AlreadyConverting { client_id: String, canonical_name: String },
    /// The conversion failed; progress is unchanged.
    ConversionFailed { client_id: String, reason: String },
    /// Converted and recorded; the client is still incomplete, or another of
    /// its conversions is still running and will finalize it.
    Recorded { client_id: String, canonical_name: String },
    /// Converted, recorded and the client was finalized by this arrival.
    Finalized { client_id: String, outcome: FinalizeOutcome },
}

pub struct CompletionTracker {
    registry: Arc<ClientRegistry>,
    filter: EventFilter,
    gateway: ConversionGateway,
    finalizer: Finalizer,
    progress: Mutex<HashMap<String, ClientProgress>>,
}

impl CompletionTracker {
    pub fn new(
        registry: Arc<ClientRegistry>,
        filter: EventFilter,
        gateway: ConversionGateway,
        finalizer: Finalizer,
    ) -> Self {
        let progress = registry
            .clients()
            .iter()
            .map(|c| (c.id.clone(), ClientProgress::new(c.id.clone())))
            .collect();
        Self {
            registry,
            filter,
            gateway,
            finalizer,
            progress: Mutex::new(progress),
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// The exclusion rules arrivals are checked against; the event source
    /// shares them.
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Snapshot of one client's progress.
    pub async fn progress(&self, client_id: &str) -> Option<ClientProgress> {
        self.progress.lock().await.get(client_id).cloned()
    }

    pub async fn handle_arrival(&self, event: FileArrivalEvent) -> ArrivalOutcome {
        if !self.filter.admits(&event) {
            return ArrivalOutcome::Ignored;
        }
        let Some(file_name) = event.file_name() else {
            return ArrivalOutcome::Ignored;
        };
        info!(file = %file_name, "New file detected");

        let Some((spec, expected)) = self.registry.match_file(file_name) else {
            debug!(file = %file_name, "No client expects this file");
            return ArrivalOutcome::Unmatched;
        };
        let client_id = spec.id.clone();
        debug!(%client_id, pattern = %expected.pattern, kind = %expected.kind, "Matched client file");

        let claimed = expected.canonical_name().to_string();
        {
            let mut progress = self.progress.lock().await;
            let entry = Self::entry(&mut progress, &client_id);
            if entry.is_finalized() {
                warn!(%client_id, file = %file_name, "Client already finalized; ignoring arrival");
                return ArrivalOutcome::AlreadyFinalized { client_id };
            }
            if !entry.converting.insert(claimed.clone()) {
                info!(%client_id, file = %file_name, canonical = %claimed, "Same file is already converting; ignoring arrival");
                return ArrivalOutcome::AlreadyConverting {
                    client_id,
                    canonical_name: claimed,
                };
            }
        }

        let result = self.gateway.convert(&event.path, expected).await;

        let snapshot = {
            let mut progress = self.progress.lock().await;
            let entry = Self::entry(&mut progress, &client_id);
            entry.converting.remove(&claimed);
            let pending = match result {
                ConversionResult::Converted { canonical_name, .. } => {
                    info!(%client_id, source = %file_name, canonical = %canonical_name, "Converted");
                    entry.record(canonical_name.clone());
                    ArrivalOutcome::Recorded {
                        client_id: client_id.clone(),
                        canonical_name,
                    }
                }
                ConversionResult::Failed { reason } => {
                    error!(%client_id, file = %file_name, reason = %reason, "Conversion failed; progress unchanged");
                    ArrivalOutcome::ConversionFailed {
                        client_id: client_id.clone(),
                        reason,
                    }
                }
            };
            if !entry.ready_to_finalize(spec) {
                debug!(
                    %client_id,
                    completed = entry.completed().len(),
                    expected = spec.expected_files.len(),
                    converting = entry.converting().len(),
                    "Client not ready to finalize"
                );
                return pending;
            }
            let snapshot = entry.clone();
            entry.mark_finalized();
            snapshot
        };

        info!(%client_id, "Client complete; merging and notifying");
        let outcome = self.finalizer.finalize(spec, &snapshot).await;
        ArrivalOutcome::Finalized { client_id, outcome }
    }

    fn entry<'a>(progress: &'a mut HashMap<String, ClientProgress>, client_id: &str) -> &'a mut ClientProgress {
        progress
            .entry(client_id.to_string())
            .or_insert_with(|| ClientProgress::new(client_id))
    }
}
