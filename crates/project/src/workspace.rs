//! In-memory host environment: projects, their trees and the open documents.
//! 記憶體中的宿主環境：專案、專案樹與已開啟的文件。
//!
//! Every mutation emits at most one [`ChangeEvent`], after the internal lock
//! has been released:
//!
//! | mutation                                   | event               |
//! |--------------------------------------------|---------------------|
//! | add / remove / rename project              | `ContainersChanged` |
//! | add / rename / move / remove folder        | `ContainersChanged` |
//! | rename / move an open file                 | `DocumentChanged`   |
//! | open a document with a display surface     | `DocumentChanged`   |
//! | add / remove a file, close, attach surface | none                |

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tabcaption_core::{
    ChangeEvent, ChangeEventSource, Document, EnumerationError, Listener, Solution, Subscribers,
    Subscription,
};
use thiserror::Error;

use crate::document::{CaptionUpdate, NodeItem, ProjectHandle, WorkspaceDocument};
use crate::store::{ProjectSnapshot, WorkspaceSnapshot};
use crate::tree::{
    replace_path_prefix, reserve_node_ids, ProjectNode, ProjectNodeDraft, ProjectNodeId,
    ProjectNodeKind, ProjectTree, ProjectTreeError,
};
use crate::util::{leaf_name, parent_path, with_leaf_name};

static NEXT_PROJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a project inside a [`Workspace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProjectId(u64);

impl ProjectId {
    fn new() -> Self {
        Self(NEXT_PROJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors raised by workspace mutations.
/// 工作區操作錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkspaceError {
    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),
    #[error("document {0} is not open")]
    DocumentNotOpen(String),
    #[error(transparent)]
    Tree(#[from] ProjectTreeError),
}

/// Summary returned by [`Workspace::projects`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub id: ProjectId,
    pub name: String,
    pub builtin: bool,
    pub root: ProjectNodeId,
}

#[derive(Debug, Clone)]
struct ProjectEntry {
    id: ProjectId,
    builtin: bool,
    tree: ProjectTree,
}

#[derive(Default)]
struct WorkspaceState {
    projects: Vec<ProjectEntry>,
    documents: Vec<Arc<WorkspaceDocument>>,
}

impl WorkspaceState {
    fn project_mut(&mut self, id: ProjectId) -> Result<&mut ProjectEntry, WorkspaceError> {
        self.projects
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(WorkspaceError::ProjectNotFound(id))
    }

    fn project(&self, id: ProjectId) -> Result<&ProjectEntry, WorkspaceError> {
        self.projects
            .iter()
            .find(|entry| entry.id == id)
            .ok_or(WorkspaceError::ProjectNotFound(id))
    }

    fn open_document(&self, path: &str) -> Option<Arc<WorkspaceDocument>> {
        self.documents
            .iter()
            .find(|document| document.path() == path)
            .cloned()
    }

    fn locate_file(&self, path: &str) -> Option<(&ProjectEntry, &ProjectNode)> {
        self.projects.iter().find_map(|entry| {
            entry
                .tree
                .find_file_by_path(path)
                .map(|node| (entry, node))
        })
    }

    fn locate_container(&self, path: &str) -> Option<(ProjectId, ProjectNodeId)> {
        self.projects.iter().find_map(|entry| {
            entry
                .tree
                .find_container_by_path(path)
                .map(|node| (entry.id, node.id))
        })
    }
}

/// Reference host: implements [`Solution`] and [`ChangeEventSource`].
pub struct Workspace {
    this: Weak<Workspace>,
    state: RwLock<WorkspaceState>,
    events: Subscribers<ChangeEvent>,
    captions: Subscribers<CaptionUpdate>,
    failing_enumerations: AtomicUsize,
}

impl Workspace {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            state: RwLock::new(WorkspaceState::default()),
            events: Subscribers::new(),
            captions: Subscribers::new(),
            failing_enumerations: AtomicUsize::new(0),
        })
    }

    /// Rebuilds a workspace, opening every listed document with its display
    /// surface ready.
    pub fn from_snapshot(snapshot: &WorkspaceSnapshot) -> Result<Arc<Self>, WorkspaceError> {
        let workspace = Self::new();
        for project in &snapshot.projects {
            workspace.add_project_tree(project.to_tree()?, project.builtin);
        }
        for path in &snapshot.open {
            workspace.open_document(path.clone());
        }
        Ok(workspace)
    }

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        let state = self.state.read();
        WorkspaceSnapshot {
            projects: state
                .projects
                .iter()
                .map(|entry| ProjectSnapshot::from_tree(&entry.tree, entry.builtin))
                .collect(),
            open: state.documents.iter().map(|document| document.path()).collect(),
            ..WorkspaceSnapshot::default()
        }
    }

    /// Registers a caption listener; see [`CaptionUpdate`].
    pub fn subscribe_captions<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&CaptionUpdate) + Send + Sync + 'static,
    {
        self.captions.subscribe(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.events.len()
    }

    /// Makes the next `count` enumerations fail, the way a host that is still
    /// loading projects would.
    pub fn fail_enumerations(&self, count: usize) {
        self.failing_enumerations.store(count, Ordering::SeqCst);
    }

    // ---- projects ----

    pub fn add_project(&self, name: impl Into<String>, builtin: bool) -> ProjectId {
        self.add_project_at(name, None, builtin)
    }

    pub fn add_project_at(
        &self,
        name: impl Into<String>,
        root_path: Option<String>,
        builtin: bool,
    ) -> ProjectId {
        self.add_project_tree(ProjectTree::new(name, root_path), builtin)
    }

    /// Adds a project with an existing tree, e.g. one loaded from disk.
    pub fn add_project_tree(&self, tree: ProjectTree, builtin: bool) -> ProjectId {
        reserve_node_ids(tree.max_node_id());
        let id = ProjectId::new();
        tracing::debug!(project = %tree.root.name, %id, builtin, "project added");
        self.state.write().projects.push(ProjectEntry { id, builtin, tree });
        self.emit(Some(ChangeEvent::ContainersChanged));
        id
    }

    pub fn remove_project(&self, id: ProjectId) -> Result<(), WorkspaceError> {
        {
            let mut state = self.state.write();
            state.project(id)?;
            state.projects.retain(|entry| entry.id != id);
        }
        tracing::debug!(%id, "project removed");
        self.emit(Some(ChangeEvent::ContainersChanged));
        Ok(())
    }

    pub fn rename_project(
        &self,
        id: ProjectId,
        name: impl Into<String>,
    ) -> Result<(), WorkspaceError> {
        {
            let mut state = self.state.write();
            let entry = state.project_mut(id)?;
            let (tree, _) = entry.tree.rename(entry.tree.root_id(), name)?;
            entry.tree = tree;
        }
        self.emit(Some(ChangeEvent::ContainersChanged));
        Ok(())
    }

    pub fn projects(&self) -> Vec<ProjectInfo> {
        self.state
            .read()
            .projects
            .iter()
            .map(|entry| ProjectInfo {
                id: entry.id,
                name: entry.tree.root.name.clone(),
                builtin: entry.builtin,
                root: entry.tree.root_id(),
            })
            .collect()
    }

    pub fn project_root(&self, id: ProjectId) -> Result<ProjectNodeId, WorkspaceError> {
        Ok(self.state.read().project(id)?.tree.root_id())
    }

    pub fn project_tree(&self, id: ProjectId) -> Result<ProjectTree, WorkspaceError> {
        Ok(self.state.read().project(id)?.tree.clone())
    }

    // ---- tree nodes ----

    pub fn add_folder(
        &self,
        project: ProjectId,
        parent: ProjectNodeId,
        name: impl Into<String>,
    ) -> Result<ProjectNodeId, WorkspaceError> {
        self.add_node(project, parent, ProjectNodeDraft::folder(name))
    }

    /// Adds a file to a project. Opening it is a separate step.
    pub fn add_file(
        &self,
        project: ProjectId,
        parent: ProjectNodeId,
        path: impl Into<String>,
    ) -> Result<ProjectNodeId, WorkspaceError> {
        let path = path.into();
        let name = leaf_name(&path).to_string();
        self.add_node(project, parent, ProjectNodeDraft::file(name, path))
    }

    pub fn add_node(
        &self,
        project: ProjectId,
        parent: ProjectNodeId,
        draft: ProjectNodeDraft,
    ) -> Result<ProjectNodeId, WorkspaceError> {
        let (id, event) = {
            let mut state = self.state.write();
            let entry = state.project_mut(project)?;
            let (tree, diff) = entry.tree.add_child(parent, draft)?;
            entry.tree = tree;
            let id = diff.added[0];
            let event = match file_path(&entry.tree, id) {
                Some(path) => state.open_document(&path).map(document_changed),
                None => Some(ChangeEvent::ContainersChanged),
            };
            (id, event)
        };
        self.emit(event);
        Ok(id)
    }

    /// Renames a node. Renaming a file also renames it on disk, so the open
    /// document (if any) follows.
    pub fn rename_node(
        &self,
        project: ProjectId,
        node: ProjectNodeId,
        name: impl Into<String>,
    ) -> Result<(), WorkspaceError> {
        let name = name.into();
        let event = {
            let mut state = self.state.write();
            let entry = state.project_mut(project)?;
            let (mut tree, _) = entry.tree.rename(node, name.clone())?;
            let renamed_file = match file_path(&tree, node) {
                Some(old_path) => {
                    let new_path = with_leaf_name(&old_path, &name);
                    tree = tree.relocate(node, new_path.clone())?.0;
                    Some((old_path, new_path))
                }
                None => None,
            };
            entry.tree = tree;

            match renamed_file {
                Some((old_path, new_path)) => state.open_document(&old_path).map(|document| {
                    document.set_path(new_path);
                    document_changed(document)
                }),
                None => Some(ChangeEvent::ContainersChanged),
            }
        };
        self.emit(event);
        Ok(())
    }

    pub fn move_node(
        &self,
        project: ProjectId,
        node: ProjectNodeId,
        new_parent: ProjectNodeId,
    ) -> Result<(), WorkspaceError> {
        let event = {
            let mut state = self.state.write();
            let entry = state.project_mut(project)?;
            let (tree, _) = entry.tree.move_node(node, new_parent)?;
            entry.tree = tree;
            match file_path(&entry.tree, node) {
                Some(path) => state.open_document(&path).map(document_changed),
                None => Some(ChangeEvent::ContainersChanged),
            }
        };
        self.emit(event);
        Ok(())
    }

    pub fn remove_node(
        &self,
        project: ProjectId,
        node: ProjectNodeId,
    ) -> Result<(), WorkspaceError> {
        let event = {
            let mut state = self.state.write();
            let entry = state.project_mut(project)?;
            let is_file = entry.tree.find(node).is_some_and(ProjectNode::is_file);
            let (tree, _) = entry.tree.remove(node)?;
            entry.tree = tree;
            (!is_file).then_some(ChangeEvent::ContainersChanged)
        };
        self.emit(event);
        Ok(())
    }

    // ---- on-disk changes ----

    /// Applies a rename or move observed on disk. Returns whether anything in
    /// the workspace referred to `from`.
    pub fn rename_path(&self, from: &str, to: &str) -> Result<bool, WorkspaceError> {
        let event = {
            let mut state = self.state.write();
            if let Some((project, node)) = state.locate_file(from).map(|(e, n)| (e.id, n.id)) {
                rename_file_on_disk(&mut state, project, node, to)?;
                let document = state.open_document(from);
                document.map(|document| {
                    document.set_path(to.to_string());
                    document_changed(document)
                })
            } else if let Some((project, node)) = state.locate_container(from) {
                rename_container_on_disk(&mut state, project, node, from, to)?;
                for document in &state.documents {
                    if let Some(path) = replace_path_prefix(&document.path(), from, to) {
                        document.set_path(path);
                    }
                }
                Some(ChangeEvent::ContainersChanged)
            } else if let Some(document) = state.open_document(from) {
                document.set_path(to.to_string());
                Some(document_changed(document))
            } else {
                return Ok(false);
            }
        };
        tracing::debug!(from, to, "path renamed");
        self.emit(event);
        Ok(true)
    }

    /// Adds a file or folder that appeared on disk under a known folder.
    pub fn add_path(&self, path: &str, is_dir: bool) -> Result<bool, WorkspaceError> {
        let known = {
            let state = self.state.read();
            state.locate_file(path).is_some() || state.locate_container(path).is_some()
        };
        if known {
            return Ok(false);
        }
        let Some((project, parent)) = self.state.read().locate_container(parent_path(path)) else {
            return Ok(false);
        };

        let name = leaf_name(path);
        let draft = if is_dir {
            ProjectNodeDraft::folder(name).with_path(path)
        } else {
            ProjectNodeDraft::file(name, path)
        };
        self.add_node(project, parent, draft)?;
        Ok(true)
    }

    /// Removes the file or folder at `path` from its project.
    pub fn remove_path(&self, path: &str) -> Result<bool, WorkspaceError> {
        let target = {
            let state = self.state.read();
            state
                .locate_file(path)
                .map(|(entry, node)| (entry.id, node.id))
                .or_else(|| state.locate_container(path))
        };
        let Some((project, node)) = target else {
            return Ok(false);
        };
        if self.project_root(project)? == node {
            return Ok(false);
        }
        self.remove_node(project, node)?;
        Ok(true)
    }

    /// Location of the file node for `path`, if any project has one.
    pub fn find_file(&self, path: &str) -> Option<(ProjectId, ProjectNodeId)> {
        self.state
            .read()
            .locate_file(path)
            .map(|(entry, node)| (entry.id, node.id))
    }

    pub fn find_container(&self, path: &str) -> Option<(ProjectId, ProjectNodeId)> {
        self.state.read().locate_container(path)
    }

    // ---- documents ----

    /// Opens a document whose display surface is ready.
    pub fn open_document(&self, path: impl Into<String>) -> Arc<WorkspaceDocument> {
        let document = self.open(path.into(), true);
        self.emit(Some(document_changed(Arc::clone(&document))));
        document
    }

    /// Opens a document before its display surface exists. Hosts do not
    /// announce the surface later, so nothing is emitted here or in
    /// [`Workspace::attach_surface`].
    pub fn open_document_pending(&self, path: impl Into<String>) -> Arc<WorkspaceDocument> {
        self.open(path.into(), false)
    }

    pub fn attach_surface(&self, path: &str) -> Result<(), WorkspaceError> {
        let document = self
            .document(path)
            .ok_or_else(|| WorkspaceError::DocumentNotOpen(path.to_string()))?;
        document.attach_surface();
        Ok(())
    }

    pub fn close_document(&self, path: &str) -> Result<(), WorkspaceError> {
        let mut state = self.state.write();
        let index = state
            .documents
            .iter()
            .position(|document| document.path() == path)
            .ok_or_else(|| WorkspaceError::DocumentNotOpen(path.to_string()))?;
        let document = state.documents.remove(index);
        document.close();
        Ok(())
    }

    pub fn document(&self, path: &str) -> Option<Arc<WorkspaceDocument>> {
        self.state.read().open_document(path)
    }

    pub fn open_documents(&self) -> Vec<Arc<WorkspaceDocument>> {
        self.state.read().documents.clone()
    }

    pub fn caption_of(&self, path: &str) -> Option<String> {
        self.document(path).and_then(|document| document.caption())
    }

    fn open(&self, path: String, surface: bool) -> Arc<WorkspaceDocument> {
        let mut state = self.state.write();
        if let Some(existing) = state.open_document(&path) {
            if surface {
                existing.attach_surface();
            }
            return existing;
        }
        let document = Arc::new(WorkspaceDocument::new(
            self.this.clone(),
            path,
            surface,
            self.captions.clone(),
        ));
        state.documents.push(Arc::clone(&document));
        document
    }

    // ---- port lookups ----

    pub(crate) fn project_for_path(&self, path: &str) -> Option<Arc<ProjectHandle>> {
        let state = self.state.read();
        let (entry, _) = state.locate_file(path)?;
        Some(Arc::new(ProjectHandle {
            name: entry.tree.root.name.clone(),
            builtin: entry.builtin,
        }))
    }

    pub(crate) fn tree_item_for_path(&self, path: &str) -> Option<Arc<NodeItem>> {
        let state = self.state.read();
        let (entry, node) = state.locate_file(path)?;
        let chain = entry.tree.ancestors(node.id)?;

        let mut parent: Option<Arc<NodeItem>> = None;
        for ancestor in chain.into_iter().chain(std::iter::once(node)) {
            parent = Some(Arc::new(NodeItem {
                name: ancestor.name.clone(),
                folder: ancestor.is_folder(),
                parent,
            }));
        }
        parent
    }

    fn emit(&self, event: Option<ChangeEvent>) {
        if let Some(event) = event {
            tracing::trace!(?event, "workspace event");
            self.events.emit(&event);
        }
    }
}

fn document_changed(document: Arc<WorkspaceDocument>) -> ChangeEvent {
    ChangeEvent::DocumentChanged(document)
}

fn file_path(tree: &ProjectTree, id: ProjectNodeId) -> Option<String> {
    match tree.find(id).map(|node| &node.kind) {
        Some(ProjectNodeKind::File { path }) => Some(path.clone()),
        _ => None,
    }
}

fn rename_file_on_disk(
    state: &mut WorkspaceState,
    project: ProjectId,
    node: ProjectNodeId,
    to: &str,
) -> Result<(), WorkspaceError> {
    let entry = state.project_mut(project)?;
    let (mut tree, _) = entry.tree.relocate(node, to)?;
    tree = tree.rename(node, leaf_name(to))?.0;

    let current_parent = tree.parent_of(node).map(|parent| parent.id);
    let target = tree
        .find_container_by_path(parent_path(to))
        .map(|container| container.id);
    tree = match target {
        Some(target) if Some(target) != current_parent => tree.move_node(node, target)?.0,
        Some(_) => tree,
        None => tree.remove(node)?.0,
    };
    entry.tree = tree;
    Ok(())
}

fn rename_container_on_disk(
    state: &mut WorkspaceState,
    project: ProjectId,
    node: ProjectNodeId,
    from: &str,
    to: &str,
) -> Result<(), WorkspaceError> {
    let entry = state.project_mut(project)?;
    let (mut tree, _) = entry.tree.relocate(node, to)?;
    if node == tree.root_id() {
        entry.tree = tree;
        return Ok(());
    }
    if leaf_name(from) != leaf_name(to) {
        tree = tree.rename(node, leaf_name(to))?.0;
    }
    let current_parent = tree.parent_of(node).map(|parent| parent.id);
    let target = tree
        .find_container_by_path(parent_path(to))
        .map(|container| container.id);
    tree = match target {
        Some(target) if Some(target) != current_parent => tree.move_node(node, target)?.0,
        Some(_) => tree,
        None => tree.remove(node)?.0,
    };
    entry.tree = tree;
    Ok(())
}

impl Solution for Workspace {
    fn documents(&self) -> Result<Vec<Arc<dyn Document>>, EnumerationError> {
        let failing = self
            .failing_enumerations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if failing {
            return Err(EnumerationError::new("projects are still loading"));
        }

        Ok(self
            .state
            .read()
            .documents
            .iter()
            .map(|document| Arc::clone(document) as Arc<dyn Document>)
            .collect())
    }

    fn has_single_project(&self) -> bool {
        self.state
            .read()
            .projects
            .iter()
            .filter(|entry| !entry.builtin)
            .count()
            == 1
    }
}

impl ChangeEventSource for Workspace {
    fn subscribe(&self, listener: Listener<ChangeEvent>) -> Subscription {
        self.events.subscribe_boxed(listener)
    }
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Workspace")
            .field("projects", &state.projects.len())
            .field("documents", &state.documents.len())
            .field("listeners", &self.events.len())
            .finish()
    }
}
