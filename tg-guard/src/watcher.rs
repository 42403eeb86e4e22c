//! File-system event source backed by `notify`

use std::path::PathBuf;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

/// A single changed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("Failed to create file watcher: {0}")]
    Watcher(#[from] notify::Error),

    #[error("Cannot watch {path:?}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("None of the watch paths exist: {paths:?}")]
    NothingToWatch { paths: Vec<PathBuf> },
}

/// Recursive watcher over a set of directories.
///
/// Events are delivered on notify's own thread and pushed into an
/// unbounded queue, so event intake never waits on the guard loop. Dropping
/// the watcher closes the queue.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl FsWatcher {
    pub fn start(paths: &[PathBuf]) -> Result<(Self, UnboundedReceiver<FileEvent>), GuardError> {
        let (tx, rx) = unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => forward(event, &tx),
                Err(err) => warn!("File watcher error: {}", err),
            },
            Config::default(),
        )?;

        let mut watched = Vec::new();
        for path in paths {
            if !path.exists() {
                warn!("Not watching {}: path does not exist", path.display());
                continue;
            }
            watcher
                .watch(path, RecursiveMode::Recursive)
                .map_err(|source| GuardError::Watch {
                    path: path.clone(),
                    source,
                })?;
            debug!("Watching {}", path.display());
            watched.push(path.clone());
        }

        if watched.is_empty() {
            return Err(GuardError::NothingToWatch {
                paths: paths.to_vec(),
            });
        }

        Ok((
            Self {
                _watcher: watcher,
                watched,
            },
            rx,
        ))
    }

    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }
}

fn forward(event: Event, tx: &UnboundedSender<FileEvent>) {
    if !is_change(&event.kind) {
        return;
    }
    for path in event.paths {
        // The receiver is gone once the guard loop has exited.
        if tx.send(FileEvent { path }).is_err() {
            return;
        }
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_only_changes_are_forwarded() {
        let (tx, mut rx) = unbounded_channel();
        forward(
            Event::new(EventKind::Access(AccessKind::Any)).add_path(PathBuf::from("src/a.c")),
            &tx,
        );
        forward(
            Event::new(EventKind::Modify(ModifyKind::Any))
                .add_path(PathBuf::from("src/a.c"))
                .add_path(PathBuf::from("src/b.c")),
            &tx,
        );
        forward(
            Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("src/c.c")),
            &tx,
        );
        drop(tx);

        let mut paths = Vec::new();
        while let Ok(event) = rx.try_recv() {
            paths.push(event.path);
        }
        assert_eq!(
            paths,
            vec![PathBuf::from("src/a.c"), PathBuf::from("src/b.c"), PathBuf::from("src/c.c")]
        );
    }

    #[test]
    fn test_missing_paths_are_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = FsWatcher::start(&[temp_dir.path().join("missing")]);
        assert!(matches!(result, Err(GuardError::NothingToWatch { .. })));
    }

    #[tokio::test]
    async fn test_real_file_change_is_delivered() {
        let temp_dir = TempDir::new().unwrap();
        let (watcher, mut rx) = FsWatcher::start(&[temp_dir.path().to_path_buf()]).unwrap();
        assert_eq!(watcher.watched(), &[temp_dir.path().to_path_buf()]);

        std::fs::write(temp_dir.path().join("test_new.c"), "int main(void){return 0;}").unwrap();
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no file event within timeout")
            .expect("watcher closed");
        assert_eq!(event.path.file_name().unwrap(), "test_new.c");
    }
}
