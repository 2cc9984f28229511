//! Reference host environment for the caption engine: projects, project
//! trees, open documents, persistence and disk watching.
//! 標題引擎的參考宿主環境：專案、專案樹、已開啟文件、儲存與檔案監看。

mod util;

pub mod document;
pub mod file_monitor;
pub mod scan;
pub mod store;
pub mod tree;
pub mod workspace;

pub use document::{CaptionUpdate, NodeItem, ProjectHandle, WorkspaceDocument};
pub use file_monitor::{
    apply_file_event, FileEvent, FileMonitor, FileMonitorError, FileMonitorEventKind,
};
pub use scan::{scan_directory, ScanError};
pub use store::{
    ItemSnapshot, ProjectSnapshot, WorkspaceSnapshot, WorkspaceStore, WorkspaceStoreError,
    SNAPSHOT_VERSION,
};
pub use tree::{
    ProjectNode, ProjectNodeDraft, ProjectNodeId, ProjectNodeKind, ProjectTree, ProjectTreeDiff,
    ProjectTreeError,
};
pub use workspace::{ProjectId, ProjectInfo, Workspace, WorkspaceError};
