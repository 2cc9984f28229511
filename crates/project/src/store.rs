use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tree::{
    ProjectNode, ProjectNodeDraft, ProjectNodeId, ProjectNodeKind, ProjectTree, ProjectTreeError,
};
use crate::util::{leaf_name, write_atomic};

pub const SNAPSHOT_VERSION: u32 = 1;

fn current_version() -> u32 {
    SNAPSHOT_VERSION
}

/// Serializable description of a workspace: projects plus open documents.
/// 工作區的可序列化描述：專案與已開啟的文件。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceSnapshot {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub projects: Vec<ProjectSnapshot>,
    /// Paths of open documents, in opening order.
    #[serde(default)]
    pub open: Vec<String>,
}

impl Default for WorkspaceSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            projects: Vec::new(),
            open: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectSnapshot {
    pub name: String,
    #[serde(default)]
    pub builtin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemSnapshot>,
}

/// A folder or file inside a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ItemSnapshot {
    Folder {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default)]
        items: Vec<ItemSnapshot>,
    },
    File {
        path: String,
        /// Defaults to the last segment of `path`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl ProjectSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            builtin: false,
            path: None,
            items: Vec::new(),
        }
    }

    /// Builds a fresh tree; node identifiers are newly generated.
    pub fn to_tree(&self) -> Result<ProjectTree, ProjectTreeError> {
        let mut tree = ProjectTree::new(self.name.clone(), self.path.clone());
        let root = tree.root_id();
        for item in &self.items {
            tree = add_item(tree, root, item)?;
        }
        Ok(tree)
    }

    pub fn from_tree(tree: &ProjectTree, builtin: bool) -> Self {
        Self {
            name: tree.root.name.clone(),
            builtin,
            path: tree.root.path().map(str::to_string),
            items: tree.root.children.iter().map(item_from_node).collect(),
        }
    }
}

fn add_item(
    tree: ProjectTree,
    parent: ProjectNodeId,
    item: &ItemSnapshot,
) -> Result<ProjectTree, ProjectTreeError> {
    match item {
        ItemSnapshot::Folder { name, path, items } => {
            let draft = ProjectNodeDraft::new(
                name.clone(),
                ProjectNodeKind::Folder { path: path.clone() },
            );
            let (mut tree, diff) = tree.add_child(parent, draft)?;
            let folder = diff.added[0];
            for child in items {
                tree = add_item(tree, folder, child)?;
            }
            Ok(tree)
        }
        ItemSnapshot::File { path, name } => {
            let name = name.clone().unwrap_or_else(|| leaf_name(path).to_string());
            let (tree, _) = tree.add_child(parent, ProjectNodeDraft::file(name, path.clone()))?;
            Ok(tree)
        }
    }
}

fn item_from_node(node: &ProjectNode) -> ItemSnapshot {
    match &node.kind {
        ProjectNodeKind::File { path } => ItemSnapshot::File {
            path: path.clone(),
            name: (leaf_name(path) != node.name).then(|| node.name.clone()),
        },
        ProjectNodeKind::Folder { path } | ProjectNodeKind::Root { path } => {
            ItemSnapshot::Folder {
                name: node.name.clone(),
                path: path.clone(),
                items: node.children.iter().map(item_from_node).collect(),
            }
        }
    }
}

/// Persists [`WorkspaceSnapshot`]s to disk using JSON + atomic writes.
/// 以 JSON 搭配原子寫入方式儲存工作區快照。
#[derive(Debug)]
pub struct WorkspaceStore {
    path: PathBuf,
}

impl WorkspaceStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads a snapshot, returning `Ok(None)` when the file is absent.
    /// 從磁碟載入快照；若檔案不存在則回傳 `Ok(None)`。
    pub fn load(&self) -> Result<Option<WorkspaceSnapshot>, WorkspaceStoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let snapshot: WorkspaceSnapshot = serde_json::from_str(&contents)
                    .map_err(|err| WorkspaceStoreError::Invalid(err.to_string()))?;
                if snapshot.version > SNAPSHOT_VERSION {
                    return Err(WorkspaceStoreError::UnsupportedVersion(snapshot.version));
                }
                Ok(Some(snapshot))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(WorkspaceStoreError::Io(err)),
        }
    }

    /// Saves the snapshot atomically.
    /// 將快照以原子方式寫入磁碟。
    pub fn save(&self, snapshot: &WorkspaceSnapshot) -> Result<(), WorkspaceStoreError> {
        let payload = serde_json::to_vec_pretty(snapshot)
            .map_err(|err| WorkspaceStoreError::Invalid(err.to_string()))?;
        write_atomic(&self.path, &payload).map_err(WorkspaceStoreError::Io)
    }
}

/// Errors emitted by [`WorkspaceStore`].
/// [`WorkspaceStore`] 可能拋出的錯誤。
#[derive(Debug, Error)]
pub enum WorkspaceStoreError {
    #[error("workspace IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid workspace payload: {0}")]
    Invalid(String),
    #[error("workspace format version {0} is newer than this build understands")]
    UnsupportedVersion(u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            version: SNAPSHOT_VERSION,
            projects: vec![ProjectSnapshot {
                name: "proj".into(),
                builtin: false,
                path: Some("/work/proj".into()),
                items: vec![ItemSnapshot::Folder {
                    name: "docs".into(),
                    path: None,
                    items: vec![ItemSnapshot::File {
                        path: "/work/proj/docs/notes.md".into(),
                        name: None,
                    }],
                }],
            }],
            open: vec!["/work/proj/docs/notes.md".into()],
        }
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path().join("workspace.json"));
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn hand_written_files_use_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("workspace.json");
        fs::write(
            &path,
            r#"{ "projects": [ { "name": "p", "items": [ { "kind": "file", "path": "C:\\p\\main.cpp" } ] } ] }"#,
        )
        .unwrap();

        let snapshot = WorkspaceStore::new(&path).load().unwrap().unwrap();
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        let tree = snapshot.projects[0].to_tree().unwrap();
        let file = tree.find_file_by_path("C:\\p\\main.cpp").unwrap();
        assert_eq!(file.name, "main.cpp");
    }

    #[test]
    fn newer_versions_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("workspace.json");
        fs::write(&path, r#"{ "version": 99 }"#).unwrap();
        assert!(matches!(
            WorkspaceStore::new(&path).load(),
            Err(WorkspaceStoreError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn tree_conversion_preserves_structure() {
        let project = &sample().projects[0];
        let tree = project.to_tree().unwrap();
        assert_eq!(ProjectSnapshot::from_tree(&tree, false), *project);
    }
}
