use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use notify::event::{EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;

use crate::workspace::{Workspace, WorkspaceError};

/// 監控檔案變更時可能回傳的錯誤。 / Error type for file monitoring operations.
#[derive(Debug, Error)]
pub enum FileMonitorError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
    #[error("monitor channel disconnected")]
    ChannelDisconnected,
}

/// 監控到的事件種類。 / Classifies observed file system changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMonitorEventKind {
    Modified,
    Removed,
    Created,
    Renamed { from: PathBuf, to: PathBuf },
    Other,
}

/// 檔案事件的詳細資料。 / File event payload with resolved path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileMonitorEventKind,
}

/// 以 `notify` 遞迴監看專案目錄。 / Recursive `notify` watcher over project directories.
pub struct FileMonitor {
    watcher: RecommendedWatcher,
    rx: Receiver<FileEvent>,
}

impl FileMonitor {
    pub fn new() -> Result<Self, FileMonitorError> {
        let (tx, rx) = mpsc::channel();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if let Some(mapped) = map_event(event) {
                        let _ = tx.send(mapped);
                    }
                }
                Err(err) => tracing::warn!(error = %err, "file watcher error"),
            },
            Config::default(),
        )?;

        Ok(Self { watcher, rx })
    }

    /// 遞迴監看指定目錄。 / Starts watching `path` and everything below it.
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<(), FileMonitorError> {
        self.watcher
            .watch(path.as_ref(), RecursiveMode::Recursive)
            .map_err(FileMonitorError::from)
    }

    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> Result<(), FileMonitorError> {
        self.watcher
            .unwatch(path.as_ref())
            .map_err(FileMonitorError::from)
    }

    pub fn try_next(&self) -> Option<FileEvent> {
        self.rx.try_recv().ok()
    }

    /// 在期限內等待事件，逾時回傳 `None`。 / Waits for an event until the timeout, returning `None` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<FileEvent>, FileMonitorError> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(FileMonitorError::ChannelDisconnected),
        }
    }
}

fn map_event(event: notify::Event) -> Option<FileEvent> {
    let primary = event.paths.first()?.clone();
    let kind = match event.kind {
        EventKind::Modify(ModifyKind::Name(_)) if event.paths.len() >= 2 => {
            FileMonitorEventKind::Renamed {
                from: primary.clone(),
                to: event.paths[1].clone(),
            }
        }
        // Half of a rename whose other side is outside the watched tree.
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => FileMonitorEventKind::Removed,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FileMonitorEventKind::Created,
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Metadata(_))
        | EventKind::Modify(ModifyKind::Any) => FileMonitorEventKind::Modified,
        EventKind::Create(_) => FileMonitorEventKind::Created,
        EventKind::Remove(RemoveKind::File)
        | EventKind::Remove(RemoveKind::Folder)
        | EventKind::Remove(RemoveKind::Any) => FileMonitorEventKind::Removed,
        _ => FileMonitorEventKind::Other,
    };

    let path = match &kind {
        FileMonitorEventKind::Renamed { to, .. } => to.clone(),
        _ => primary,
    };
    Some(FileEvent { path, kind })
}

/// Turns a disk event into workspace mutations, which in turn emit the
/// matching change events. Returns whether the workspace changed.
/// 將檔案系統事件轉換為工作區變更。
pub fn apply_file_event(workspace: &Workspace, event: &FileEvent) -> Result<bool, WorkspaceError> {
    let path = event.path.to_string_lossy();
    let changed = match &event.kind {
        FileMonitorEventKind::Renamed { from, to } => {
            workspace.rename_path(&from.to_string_lossy(), &to.to_string_lossy())?
        }
        FileMonitorEventKind::Created => workspace.add_path(&path, event.path.is_dir())?,
        FileMonitorEventKind::Removed => workspace.remove_path(&path)?,
        FileMonitorEventKind::Modified | FileMonitorEventKind::Other => false,
    };
    if changed {
        tracing::debug!(path = %path, kind = ?event.kind, "file event applied");
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ProjectNodeDraft;
    use std::fs;
    use std::thread;
    use tabcaption_core::Document;
    use tempfile::tempdir;

    fn rename_event(from: &str, to: &str) -> FileEvent {
        FileEvent {
            path: PathBuf::from(to),
            kind: FileMonitorEventKind::Renamed {
                from: PathBuf::from(from),
                to: PathBuf::from(to),
            },
        }
    }

    #[test]
    fn map_event_recognises_full_renames() {
        let event = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/w/a.rs"))
            .add_path(PathBuf::from("/w/b.rs"));
        let mapped = map_event(event).unwrap();
        assert_eq!(mapped, rename_event("/w/a.rs", "/w/b.rs"));

        let half = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(PathBuf::from("/w/a.rs"));
        assert_eq!(map_event(half).unwrap().kind, FileMonitorEventKind::Removed);
    }

    #[test]
    fn apply_rename_follows_the_open_document() {
        let workspace = Workspace::new();
        let project = workspace.add_project_at("w", Some("/w".into()), false);
        let root = workspace.project_root(project).unwrap();
        workspace
            .add_node(project, root, ProjectNodeDraft::folder("a").with_path("/w/a"))
            .unwrap();
        workspace.add_path("/w/a/f.rs", false).unwrap();
        let document = workspace.open_document("/w/a/f.rs");

        assert!(apply_file_event(&workspace, &rename_event("/w/a/f.rs", "/w/a/g.rs")).unwrap());
        assert_eq!(document.path(), "/w/a/g.rs");

        let modified = FileEvent {
            path: PathBuf::from("/w/a/g.rs"),
            kind: FileMonitorEventKind::Modified,
        };
        assert!(!apply_file_event(&workspace, &modified).unwrap());
    }

    #[test]
    fn apply_remove_drops_the_node() {
        let workspace = Workspace::new();
        let project = workspace.add_project_at("w", Some("/w".into()), false);
        workspace.add_path("/w/f.rs", false).unwrap();
        assert!(workspace.find_file("/w/f.rs").is_some());

        let removed = FileEvent {
            path: PathBuf::from("/w/f.rs"),
            kind: FileMonitorEventKind::Removed,
        };
        assert!(apply_file_event(&workspace, &removed).unwrap());
        assert!(workspace.find_file("/w/f.rs").is_none());

        let root = FileEvent {
            path: PathBuf::from("/w"),
            kind: FileMonitorEventKind::Removed,
        };
        assert!(!apply_file_event(&workspace, &root).unwrap());
        assert!(workspace.project_root(project).is_ok());
    }

    #[test]
    fn detect_file_creation() {
        let dir = tempdir().unwrap();
        let mut monitor = FileMonitor::new().unwrap();
        monitor.watch(dir.path()).unwrap();

        // 等待 watcher 啟動。 / Allow watcher to settle.
        thread::sleep(Duration::from_millis(100));

        let file_path = dir.path().join("watch.txt");
        fs::write(&file_path, "initial").unwrap();
        let event = monitor
            .recv_timeout(Duration::from_secs(2))
            .unwrap()
            .expect("expected an event");

        assert_eq!(event.path.file_name(), file_path.file_name());
        assert!(matches!(
            event.kind,
            FileMonitorEventKind::Created
                | FileMonitorEventKind::Modified
                | FileMonitorEventKind::Other
        ));
    }
}
