//! Event source adapter: turns raw watcher notifications on the watch root
//! into [`FileArrivalEvent`]s and drops the noise before anyone sees it.
//!
//! Noise is anything that can never be a deliverable:
//! directories, office lock files (`~$...`), temporary files (configurable
//! suffix, `.tmp` by default) and the merged artifacts this process writes
//! itself.

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, error, info};

use crate::error::WatchError;
use crate::registry::ClientRegistry;

/// Prefix office editors use for the lock file next to an open document.
pub const LOCK_FILE_PREFIX: &str = "~$";

/// A file that appeared in the watch root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArrivalEvent {
    pub path: PathBuf,
    pub is_directory: bool,
}

impl FileArrivalEvent {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Why an arrival was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Noise {
    Directory,
    Unnamed,
    LockFile,
    TempFile,
    OwnArtifact,
}

/// Static exclusion rules, derived once from the registry.
#[derive(Debug, Clone)]
pub struct EventFilter {
    temp_suffix: String,
    artifact_names: HashSet<String>,
}

impl EventFilter {
    pub fn new(registry: &ClientRegistry, temp_suffix: &str) -> Self {
        Self {
            temp_suffix: temp_suffix.to_lowercase(),
            artifact_names: registry.artifact_names().collect(),
        }
    }

    /// `None` when the event is a candidate deliverable.
    pub fn classify(&self, event: &FileArrivalEvent) -> Option<Noise> {
        if event.is_directory {
            return Some(Noise::Directory);
        }
        let Some(name) = event.file_name() else {
            return Some(Noise::Unnamed);
        };
        if name.starts_with(LOCK_FILE_PREFIX) {
            return Some(Noise::LockFile);
        }
        if !self.temp_suffix.is_empty() && name.to_lowercase().ends_with(&self.temp_suffix) {
            return Some(Noise::TempFile);
        }
        if self.artifact_names.contains(name) {
            return Some(Noise::OwnArtifact);
        }
        None
    }

    pub fn admits(&self, event: &FileArrivalEvent) -> bool {
        match self.classify(event) {
            None => true,
            Some(noise) => {
                debug!(path = %event.path.display(), ?noise, "Ignoring event");
                false
            }
        }
    }
}

/// Arrivals carried by one watcher event. Creations count, and so do renames
/// into the folder, since editors that save atomically rename a temp file
/// onto the final name.
///
/// Only the `To` half of a rename is used. Backends that also report the
/// paired `Both` event (inotify does) would otherwise deliver one move twice.
pub fn arrivals_from(event: &Event) -> Vec<FileArrivalEvent> {
    match &event.kind {
        EventKind::Create(kind) => event
            .paths
            .iter()
            .map(|path| FileArrivalEvent {
                path: path.clone(),
                is_directory: match kind {
                    CreateKind::Folder => true,
                    CreateKind::File => false,
                    _ => path.is_dir(),
                },
            })
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .iter()
            .map(|path| FileArrivalEvent {
                path: path.clone(),
                is_directory: path.is_dir(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Keeps the platform watcher alive; dropping it stops the stream.
pub struct EventSource {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl EventSource {
    /// Watches `root` non-recursively. Filtered arrivals are delivered on the
    /// returned channel, one at a time, in the order the platform reports them.
    pub fn watch(
        root: &Path,
        filter: EventFilter,
    ) -> Result<(Self, UnboundedReceiver<FileArrivalEvent>), WatchError> {
        let (tx, rx) = unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for arrival in arrivals_from(&event) {
                        if filter.admits(&arrival) && tx.send(arrival).is_err() {
                            debug!("Arrival receiver dropped");
                            return;
                        }
                    }
                }
                Err(e) => error!(error = %e, "File watcher reported an error"),
            },
            Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::NonRecursive)?;
        info!(root = %root.display(), "Watching folder");
        Ok((
            Self {
                _watcher: watcher,
                root: root.to_path_buf(),
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ClientSpec, ConversionKind, ExpectedFile};

    fn filter() -> EventFilter {
        let client = ClientSpec::new(
            "6840",
            "Gemeinde Beispiel",
            "2025",
            vec![ExpectedFile::new("6840_Budget.xlsx", ConversionKind::Spreadsheet)],
            vec!["6840_Budget.pdf".into()],
        )
        .unwrap();
        EventFilter::new(&ClientRegistry::new(vec![client]).unwrap(), ".tmp")
    }

    #[test]
    fn deliverables_pass() {
        assert_eq!(filter().classify(&FileArrivalEvent::file("/w/6840_Budget.xlsx")), None);
        assert_eq!(filter().classify(&FileArrivalEvent::file("/w/unrelated.txt")), None);
    }

    #[test]
    fn noise_is_classified() {
        let f = filter();
        assert_eq!(
            f.classify(&FileArrivalEvent::file("/w/~$6840_Budget.xlsx")),
            Some(Noise::LockFile)
        );
        assert_eq!(f.classify(&FileArrivalEvent::file("/w/ABC123.TMP")), Some(Noise::TempFile));
        assert_eq!(
            f.classify(&FileArrivalEvent::file("/w/6840_Haushalt_2025.pdf")),
            Some(Noise::OwnArtifact)
        );
        assert_eq!(
            f.classify(&FileArrivalEvent {
                path: "/w/6840_Budget.xlsx".into(),
                is_directory: true,
            }),
            Some(Noise::Directory)
        );
        assert_eq!(f.classify(&FileArrivalEvent::file("/")), Some(Noise::Unnamed));
    }

    #[test]
    fn create_and_rename_events_become_arrivals() {
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path("/w/a.docx".into());
        assert_eq!(arrivals_from(&created), vec![FileArrivalEvent::file("/w/a.docx")]);

        let folder = Event::new(EventKind::Create(CreateKind::Folder)).add_path("/w/sub".into());
        assert!(arrivals_from(&folder)[0].is_directory);

        let moved_in = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To))).add_path("/w/a.docx".into());
        assert_eq!(arrivals_from(&moved_in), vec![FileArrivalEvent::file("/w/a.docx")]);

        // The paired event for the same move carries no second arrival.
        let paired = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/w/a.docx.tmp".into())
            .add_path("/w/a.docx".into());
        assert!(arrivals_from(&paired).is_empty());

        let moved_out = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From))).add_path("/w/a.docx".into());
        assert!(arrivals_from(&moved_out).is_empty());

        let removed = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path("/w/a.docx".into());
        assert!(arrivals_from(&removed).is_empty());
    }
}
