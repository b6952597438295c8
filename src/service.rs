//! Long-running watch: wires the collaborators chosen by the settings into a
//! [`CompletionTracker`] and feeds it arrivals until shutdown.
//!
//! The loop never stops on its own after a client completes; it serves every
//! configured client for as long as the process runs. Each arrival is
//! handled on its own task so a slow conversion for one client does not hold
//! up the others.

use lettre::message::Mailbox;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, Instrument};

use crate::config::Settings;
use crate::contract::{Converter, Notification, Notifier};
use crate::conversion::ConversionGateway;
use crate::converters::{ConverterBackend, OfficeConverter, PlaceholderConverter};
use crate::error::WatchError;
use crate::event_source::{EventFilter, EventSource, FileArrivalEvent};
use crate::finalize::Finalizer;
use crate::load_config::WatchConfig;
use crate::mail::{DraftNotifier, SmtpNotifier};
use crate::merge::PdfMerger;
use crate::tracker::{ArrivalOutcome, CompletionTracker};

/// Counts of what the loop saw, reported at shutdown.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchSummary {
    pub arrivals: usize,
    pub ignored: usize,
    pub unmatched: usize,
    pub conversion_failures: usize,
    pub recorded: usize,
    pub finalized: usize,
}

impl WatchSummary {
    fn count(&mut self, outcome: &ArrivalOutcome) {
        match outcome {
            ArrivalOutcome::Ignored
            | ArrivalOutcome::AlreadyFinalized { .. }
            | ArrivalOutcome::AlreadyConverting { .. } => self.ignored += 1,
            ArrivalOutcome::Unmatched => self.unmatched += 1,
            ArrivalOutcome::ConversionFailed { .. } => self.conversion_failures += 1,
            ArrivalOutcome::Recorded { .. } => self.recorded += 1,
            ArrivalOutcome::Finalized { .. } => self.finalized += 1,
        }
    }
}

/// SMTP when a server is configured, mail drafts otherwise.
pub fn build_notifier(settings: &Settings) -> Result<Arc<dyn Notifier>, WatchError> {
    let from = settings
        .sender
        .parse::<Mailbox>()
        .map_err(|e| WatchError::Notifier(format!("invalid sender {:?}: {e}", settings.sender)))?;
    let notifier: Arc<dyn Notifier> = match &settings.smtp {
        Some(smtp) => {
            info!(server = %smtp.server, "Notifications go out via SMTP");
            Arc::new(SmtpNotifier::new(smtp, from).map_err(|e| WatchError::Notifier(e.to_string()))?)
        }
        None => {
            info!(dir = %settings.draft_dir.display(), "No SMTP server configured; writing mail drafts");
            Arc::new(DraftNotifier::new(&settings.draft_dir, from))
        }
    };
    Ok(notifier)
}

/// A mail without attachments to `EMAIL_TO`, for checking the delivery
/// settings before any client completes.
pub fn test_notification(settings: &Settings) -> Notification {
    Notification {
        subject: "[Test] merge-watch".to_string(),
        body: format!(
            "Testnachricht von merge-watch.\nWenn diese Nachricht ankommt, funktioniert der Versand an {}.",
            settings.recipient
        ),
        recipient: settings.recipient.clone(),
        attachments: Vec::new(),
    }
}

pub fn build_finalizer(config: &WatchConfig) -> Result<Finalizer, WatchError> {
    Ok(Finalizer::new(
        Arc::new(PdfMerger),
        build_notifier(&config.settings)?,
        &config.settings.watch_folder,
        &config.settings.recipient,
    ))
}

/// The tracker with the production collaborators.
pub fn build_tracker(config: &WatchConfig) -> Result<Arc<CompletionTracker>, WatchError> {
    let settings = &config.settings;
    let converter: Arc<dyn Converter> = match settings.converter {
        ConverterBackend::Office => Arc::new(OfficeConverter::new(&settings.soffice_bin)),
        ConverterBackend::Placeholder => Arc::new(PlaceholderConverter),
    };
    let gateway = ConversionGateway::new(converter, &settings.watch_folder, settings.convert_timeout);
    let registry = Arc::new(config.registry.clone());
    let filter = EventFilter::new(&registry, &settings.temp_suffix);
    Ok(Arc::new(CompletionTracker::new(
        registry,
        filter,
        gateway,
        build_finalizer(config)?,
    )))
}

/// Hands every arrival to the tracker until `shutdown` resolves or the
/// channel closes, then waits for arrivals still in flight.
pub async fn process_arrivals<S>(
    tracker: Arc<CompletionTracker>,
    mut arrivals: UnboundedReceiver<FileArrivalEvent>,
    shutdown: S,
) -> WatchSummary
where
    S: Future<Output = ()>,
{
    let mut summary = WatchSummary::default();
    let mut in_flight = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                record(&mut summary, done);
            }
            arrival = arrivals.recv() => {
                let Some(arrival) = arrival else {
                    info!("Arrival stream closed");
                    break;
                };
                summary.arrivals += 1;
                let tracker = Arc::clone(&tracker);
                let span = info_span!(
                    "arrival",
                    id = %uuid::Uuid::new_v4(),
                    file = %arrival.path.display()
                );
                in_flight.spawn(async move { tracker.handle_arrival(arrival).await }.instrument(span));
            }
        }
    }

    while let Some(done) = in_flight.join_next().await {
        record(&mut summary, done);
    }
    summary
}

fn record(summary: &mut WatchSummary, done: Result<ArrivalOutcome, tokio::task::JoinError>) {
    match done {
        Ok(outcome) => summary.count(&outcome),
        Err(e) => error!(error = %e, "Arrival task aborted"),
    }
}

/// Watches the configured folder until `shutdown` resolves.
pub async fn watch<S>(config: &WatchConfig, shutdown: S) -> Result<WatchSummary, WatchError>
where
    S: Future<Output = ()>,
{
    let tracker = build_tracker(config)?;
    let (source, arrivals) = EventSource::watch(&config.settings.watch_folder, tracker.filter().clone())?;
    let summary = process_arrivals(tracker, arrivals, shutdown).await;
    info!(root = %source.root().display(), ?summary, "Stopped watching");
    Ok(summary)
}
