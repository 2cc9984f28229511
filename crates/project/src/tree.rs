use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier assigned to each node in a project tree.
/// 專案樹中每個節點的唯一識別碼。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectNodeId(u64);

impl ProjectNodeId {
    pub fn new() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ProjectNodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The kind of project node.
/// 專案節點的類型。
///
/// Paths are kept as plain strings so trees describing other platforms
/// (`C:\src\...`) load unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProjectNodeKind {
    /// The project itself. Holds children but is not a folder.
    Root { path: Option<String> },
    Folder { path: Option<String> },
    File { path: String },
}

impl ProjectNodeKind {
    pub fn is_folder(&self) -> bool {
        matches!(self, ProjectNodeKind::Folder { .. })
    }

    pub fn accepts_children(&self) -> bool {
        !matches!(self, ProjectNodeKind::File { .. })
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            ProjectNodeKind::Root { path } | ProjectNodeKind::Folder { path } => path.as_deref(),
            ProjectNodeKind::File { path } => Some(path),
        }
    }

    fn set_path(&mut self, new_path: String) {
        match self {
            ProjectNodeKind::Root { path } | ProjectNodeKind::Folder { path } => {
                *path = Some(new_path)
            }
            ProjectNodeKind::File { path } => *path = new_path,
        }
    }
}

/// Project tree node.
/// 專案樹內部的節點。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectNode {
    pub id: ProjectNodeId,
    pub name: String,
    pub kind: ProjectNodeKind,
    #[serde(default)]
    pub children: Vec<ProjectNode>,
}

impl ProjectNode {
    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, ProjectNodeKind::File { .. })
    }

    pub fn path(&self) -> Option<&str> {
        self.kind.path()
    }

    fn contains(&self, id: ProjectNodeId) -> bool {
        find_recursive(self, id).is_some()
    }
}

/// Helper to construct a new node.
/// 協助建立新節點。
#[derive(Debug, Clone)]
pub struct ProjectNodeDraft {
    pub name: String,
    pub kind: ProjectNodeKind,
}

impl ProjectNodeDraft {
    pub fn new(name: impl Into<String>, kind: ProjectNodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn folder(name: impl Into<String>) -> Self {
        Self::new(name, ProjectNodeKind::Folder { path: None })
    }

    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, ProjectNodeKind::File { path: path.into() })
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.kind.set_path(path.into());
        self
    }

    fn build(self) -> ProjectNode {
        ProjectNode {
            id: ProjectNodeId::new(),
            name: self.name,
            kind: self.kind,
            children: Vec::new(),
        }
    }
}

/// Immutable project tree. Every mutation returns a new revision.
/// 不可變的專案樹；每次變更都會產生新版本。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectTree {
    pub revision: u64,
    pub root: ProjectNode,
}

impl ProjectTree {
    /// Constructs a tree holding only the project root.
    /// 建立僅含專案根節點的空專案樹。
    pub fn new(project_name: impl Into<String>, root_path: Option<String>) -> Self {
        Self {
            revision: 0,
            root: ProjectNode {
                id: ProjectNodeId::new(),
                name: project_name.into(),
                kind: ProjectNodeKind::Root { path: root_path },
                children: Vec::new(),
            },
        }
    }

    pub fn root_id(&self) -> ProjectNodeId {
        self.root.id
    }

    /// Adds a new child node under the specified parent.
    /// 在指定的父節點下方新增子節點。
    pub fn add_child(
        &self,
        parent_id: ProjectNodeId,
        draft: ProjectNodeDraft,
    ) -> Result<(Self, ProjectTreeDiff), ProjectTreeError> {
        let node = draft.build();
        let mut diff = ProjectTreeDiff::default();
        diff.added.push(node.id);
        diff.updated.push(parent_id);

        let mut next = self.clone();
        let parent = find_mut(&mut next.root, parent_id)
            .ok_or(ProjectTreeError::NodeNotFound(parent_id))?;
        if !parent.kind.accepts_children() {
            return Err(ProjectTreeError::InvalidParent(parent_id));
        }
        parent.children.push(node);
        Ok((next.bumped(), diff))
    }

    /// Renames a node. Renaming the root renames the project.
    /// 重新命名節點。
    pub fn rename(
        &self,
        id: ProjectNodeId,
        name: impl Into<String>,
    ) -> Result<(Self, ProjectTreeDiff), ProjectTreeError> {
        let mut next = self.clone();
        let node = find_mut(&mut next.root, id).ok_or(ProjectTreeError::NodeNotFound(id))?;
        node.name = name.into();
        Ok((next.bumped(), ProjectTreeDiff::updated(id)))
    }

    /// Moves a node (and its subtree) under a new parent.
    /// 將節點連同子樹移到新的父節點下。
    pub fn move_node(
        &self,
        id: ProjectNodeId,
        new_parent: ProjectNodeId,
    ) -> Result<(Self, ProjectTreeDiff), ProjectTreeError> {
        if id == self.root.id {
            return Err(ProjectTreeError::RootImmutable);
        }
        let node = self.find(id).ok_or(ProjectTreeError::NodeNotFound(id))?;
        let target = self
            .find(new_parent)
            .ok_or(ProjectTreeError::NodeNotFound(new_parent))?;
        if !target.kind.accepts_children() {
            return Err(ProjectTreeError::InvalidParent(new_parent));
        }
        if node.contains(new_parent) {
            return Err(ProjectTreeError::CyclicMove {
                node: id,
                target: new_parent,
            });
        }
        let old_parent = self
            .parent_of(id)
            .map(|parent| parent.id)
            .ok_or(ProjectTreeError::NodeNotFound(id))?;

        let mut next = self.clone();
        let detached = detach(&mut next.root, id).ok_or(ProjectTreeError::NodeNotFound(id))?;
        let target = find_mut(&mut next.root, new_parent)
            .ok_or(ProjectTreeError::NodeNotFound(new_parent))?;
        target.children.push(detached);

        let diff = ProjectTreeDiff {
            added: Vec::new(),
            removed: Vec::new(),
            updated: vec![old_parent, new_parent, id],
        };
        Ok((next.bumped(), diff))
    }

    /// Removes a node and its subtree.
    /// 移除節點及其子樹。
    pub fn remove(&self, id: ProjectNodeId) -> Result<(Self, ProjectTreeDiff), ProjectTreeError> {
        if id == self.root.id {
            return Err(ProjectTreeError::RootImmutable);
        }
        let mut next = self.clone();
        let removed = detach(&mut next.root, id).ok_or(ProjectTreeError::NodeNotFound(id))?;
        let mut diff = ProjectTreeDiff::default();
        collect_ids(&removed, &mut diff.removed);
        Ok((next.bumped(), diff))
    }

    /// Points a node at a new path on disk, rewriting the paths of every
    /// descendant that lived under the old one.
    pub fn relocate(
        &self,
        id: ProjectNodeId,
        new_path: impl Into<String>,
    ) -> Result<(Self, ProjectTreeDiff), ProjectTreeError> {
        let new_path = new_path.into();
        let mut next = self.clone();
        let node = find_mut(&mut next.root, id).ok_or(ProjectTreeError::NodeNotFound(id))?;
        let old_path = node.kind.path().map(str::to_string);
        node.kind.set_path(new_path.clone());

        let mut diff = ProjectTreeDiff::updated(id);
        if let Some(old_path) = old_path {
            for child in &mut node.children {
                rewrite_prefix(child, &old_path, &new_path, &mut diff.updated);
            }
        }
        Ok((next.bumped(), diff))
    }

    /// Finds a node by identifier.
    /// 依識別碼尋找節點。
    pub fn find(&self, id: ProjectNodeId) -> Option<&ProjectNode> {
        find_recursive(&self.root, id)
    }

    pub fn parent_of(&self, id: ProjectNodeId) -> Option<&ProjectNode> {
        parent_recursive(&self.root, id)
    }

    /// Nodes from the root down to, but excluding, `id`.
    pub fn ancestors(&self, id: ProjectNodeId) -> Option<Vec<&ProjectNode>> {
        let mut chain = Vec::new();
        if ancestors_recursive(&self.root, id, &mut chain) {
            Some(chain)
        } else {
            None
        }
    }

    pub fn find_file_by_path(&self, path: &str) -> Option<&ProjectNode> {
        find_by(&self.root, &|node: &ProjectNode| node.is_file() && node.path() == Some(path))
    }

    /// Root or folder whose on-disk path is `path`.
    pub fn find_container_by_path(&self, path: &str) -> Option<&ProjectNode> {
        find_by(&self.root, &|node: &ProjectNode| {
            node.kind.accepts_children() && node.path() == Some(path)
        })
    }

    /// Every file node, depth first.
    pub fn files(&self) -> Vec<&ProjectNode> {
        let mut files = Vec::new();
        collect_files(&self.root, &mut files);
        files
    }

    /// Highest identifier in use; see [`reserve_node_ids`].
    pub fn max_node_id(&self) -> ProjectNodeId {
        let mut ids = Vec::new();
        collect_ids(&self.root, &mut ids);
        ids.into_iter().max().unwrap_or(self.root.id)
    }

    fn bumped(mut self) -> Self {
        self.revision = self.revision.wrapping_add(1);
        self
    }
}

/// Makes sure freshly generated identifiers never collide with `id`, which
/// may come from a tree loaded from disk.
pub fn reserve_node_ids(id: ProjectNodeId) {
    NEXT_NODE_ID.fetch_max(id.0 + 1, Ordering::Relaxed);
}

fn find_recursive(node: &ProjectNode, id: ProjectNodeId) -> Option<&ProjectNode> {
    find_by(node, &|candidate: &ProjectNode| candidate.id == id)
}

fn find_by<'a>(
    node: &'a ProjectNode,
    predicate: &dyn Fn(&ProjectNode) -> bool,
) -> Option<&'a ProjectNode> {
    if predicate(node) {
        return Some(node);
    }
    node.children
        .iter()
        .find_map(|child| find_by(child, predicate))
}

fn find_mut(node: &mut ProjectNode, id: ProjectNodeId) -> Option<&mut ProjectNode> {
    if node.id == id {
        return Some(node);
    }
    node.children
        .iter_mut()
        .find_map(|child| find_mut(child, id))
}

fn parent_recursive(node: &ProjectNode, id: ProjectNodeId) -> Option<&ProjectNode> {
    if node.children.iter().any(|child| child.id == id) {
        return Some(node);
    }
    node.children
        .iter()
        .find_map(|child| parent_recursive(child, id))
}

fn ancestors_recursive<'a>(
    node: &'a ProjectNode,
    id: ProjectNodeId,
    chain: &mut Vec<&'a ProjectNode>,
) -> bool {
    if node.id == id {
        return true;
    }
    chain.push(node);
    for child in &node.children {
        if ancestors_recursive(child, id, chain) {
            return true;
        }
    }
    chain.pop();
    false
}

fn detach(node: &mut ProjectNode, id: ProjectNodeId) -> Option<ProjectNode> {
    if let Some(index) = node.children.iter().position(|child| child.id == id) {
        return Some(node.children.remove(index));
    }
    node.children
        .iter_mut()
        .find_map(|child| detach(child, id))
}

fn collect_ids(node: &ProjectNode, ids: &mut Vec<ProjectNodeId>) {
    ids.push(node.id);
    for child in &node.children {
        collect_ids(child, ids);
    }
}

fn collect_files<'a>(node: &'a ProjectNode, files: &mut Vec<&'a ProjectNode>) {
    if node.is_file() {
        files.push(node);
    }
    for child in &node.children {
        collect_files(child, files);
    }
}

fn rewrite_prefix(
    node: &mut ProjectNode,
    old_prefix: &str,
    new_prefix: &str,
    updated: &mut Vec<ProjectNodeId>,
) {
    if let Some(rewritten) = node
        .kind
        .path()
        .and_then(|path| replace_path_prefix(path, old_prefix, new_prefix))
    {
        node.kind.set_path(rewritten);
        updated.push(node.id);
    }
    for child in &mut node.children {
        rewrite_prefix(child, old_prefix, new_prefix, updated);
    }
}

/// Replaces `old_prefix` at the start of `path` when it ends on a path
/// separator boundary.
pub fn replace_path_prefix(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    let rest = path.strip_prefix(old_prefix)?;
    if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') {
        Some(format!("{new_prefix}{rest}"))
    } else {
        None
    }
}

/// Captures differences after a tree mutation.
/// 紀錄樹狀結構變動後的差異。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectTreeDiff {
    pub added: Vec<ProjectNodeId>,
    pub removed: Vec<ProjectNodeId>,
    pub updated: Vec<ProjectNodeId>,
}

impl ProjectTreeDiff {
    fn updated(id: ProjectNodeId) -> Self {
        Self {
            updated: vec![id],
            ..Self::default()
        }
    }
}

/// Tree-manipulation errors.
/// 專案樹操作錯誤類型。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectTreeError {
    #[error("node {0} not found")]
    NodeNotFound(ProjectNodeId),
    #[error("node {0} cannot accept children")]
    InvalidParent(ProjectNodeId),
    #[error("node {node} cannot be moved into its own subtree ({target})")]
    CyclicMove {
        node: ProjectNodeId,
        target: ProjectNodeId,
    },
    #[error("the project root cannot be moved or removed")]
    RootImmutable,
}
