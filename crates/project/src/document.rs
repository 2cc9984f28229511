//! Port implementations handed to the caption engine.
//! 提供給標題引擎使用的文件、專案與樹節點實作。

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tabcaption_core::{
    split_path, CaptionError, Document, Project, Subscribers, TreeItem,
};

use crate::workspace::Workspace;

/// Emitted whenever a document's visible caption changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionUpdate {
    pub path: String,
    pub caption: String,
}

#[derive(Debug)]
struct DocumentState {
    path: String,
    caption: Option<String>,
    surface: bool,
    open: bool,
}

/// An open document of a [`Workspace`]. Its project and tree position are
/// looked up by path on every call, so moves and renames are always seen.
pub struct WorkspaceDocument {
    workspace: Weak<Workspace>,
    state: Mutex<DocumentState>,
    captions: Subscribers<CaptionUpdate>,
}

impl WorkspaceDocument {
    pub(crate) fn new(
        workspace: Weak<Workspace>,
        path: String,
        surface: bool,
        captions: Subscribers<CaptionUpdate>,
    ) -> Self {
        Self {
            workspace,
            state: Mutex::new(DocumentState {
                path,
                caption: None,
                surface,
                open: true,
            }),
            captions,
        }
    }

    /// Caption currently shown, if one was ever applied.
    pub fn caption(&self) -> Option<String> {
        self.state.lock().caption.clone()
    }

    pub fn has_surface(&self) -> bool {
        self.state.lock().surface
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub(crate) fn attach_surface(&self) {
        self.state.lock().surface = true;
    }

    pub(crate) fn close(&self) {
        self.state.lock().open = false;
    }

    pub(crate) fn set_path(&self, path: String) {
        self.state.lock().path = path;
    }

    fn show(&self, caption: String) {
        let update = {
            let mut state = self.state.lock();
            if state.caption.as_deref() == Some(caption.as_str()) {
                None
            } else {
                state.caption = Some(caption.clone());
                Some(CaptionUpdate {
                    path: state.path.clone(),
                    caption,
                })
            }
        };
        if let Some(update) = update {
            self.captions.emit(&update);
        }
    }
}

impl Document for WorkspaceDocument {
    fn path(&self) -> String {
        self.state.lock().path.clone()
    }

    fn name(&self) -> String {
        let path = self.path();
        split_path(&path)
            .last()
            .map(|name| name.to_string())
            .unwrap_or_default()
    }

    fn project(&self) -> Option<Arc<dyn Project>> {
        let path = self.path();
        let workspace = self.workspace.upgrade()?;
        workspace
            .project_for_path(&path)
            .map(|project| project as Arc<dyn Project>)
    }

    fn tree_item(&self) -> Option<Arc<dyn TreeItem>> {
        let path = self.path();
        let workspace = self.workspace.upgrade()?;
        workspace
            .tree_item_for_path(&path)
            .map(|item| item as Arc<dyn TreeItem>)
    }

    fn set_caption(&self, caption: &str) -> Result<(), CaptionError> {
        {
            let state = self.state.lock();
            if !state.open {
                return Err(CaptionError::Closed {
                    path: state.path.clone(),
                });
            }
            if !state.surface {
                return Err(CaptionError::SurfaceUnavailable {
                    path: state.path.clone(),
                });
            }
        }
        self.show(caption.to_string());
        Ok(())
    }

    fn reset_caption(&self) {
        let ready = {
            let state = self.state.lock();
            state.open && state.surface
        };
        if ready {
            self.show(self.name());
        }
    }
}

impl std::fmt::Debug for WorkspaceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("WorkspaceDocument")
            .field("path", &state.path)
            .field("caption", &state.caption)
            .field("surface", &state.surface)
            .field("open", &state.open)
            .finish()
    }
}

/// Snapshot of a project's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectHandle {
    pub name: String,
    pub builtin: bool,
}

impl Project for ProjectHandle {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_builtin(&self) -> bool {
        self.builtin
    }
}

/// Snapshot of one node and its ancestry.
#[derive(Debug)]
pub struct NodeItem {
    pub name: String,
    pub folder: bool,
    pub parent: Option<Arc<NodeItem>>,
}

impl TreeItem for NodeItem {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn parent(&self) -> Option<Arc<dyn TreeItem>> {
        self.parent
            .as_ref()
            .map(|parent| Arc::clone(parent) as Arc<dyn TreeItem>)
    }

    fn is_folder(&self) -> bool {
        self.folder
    }

    fn debug_name(&self) -> String {
        let kind = if self.folder { "folder" } else { "node" };
        format!("{kind} '{}'", self.name)
    }
}
