//! Capability interfaces the caption engine consumes from its host.
//! 由宿主環境提供、供標題引擎使用的介面。

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised when a caption cannot be applied to a document.
/// 無法套用標題時回傳的錯誤。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptionError {
    /// The document is open but its display surface does not exist yet.
    #[error("document {path} has no display surface yet")]
    SurfaceUnavailable { path: String },
    /// The document was closed before the caption could be applied.
    #[error("document {path} is no longer open")]
    Closed { path: String },
}

/// Errors raised while enumerating the open documents of a solution.
/// 列舉已開啟文件時的錯誤。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to enumerate open documents: {reason}")]
pub struct EnumerationError {
    pub reason: String,
}

impl EnumerationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A project owning documents, such as a regular project or a synthetic
/// container like "Miscellaneous Files".
pub trait Project: Send + Sync {
    fn name(&self) -> String;

    /// Whether this is a synthetic container that should stay out of
    /// captions by default.
    fn is_builtin(&self) -> bool;
}

/// A node in a project tree. The root has no parent.
pub trait TreeItem: Send + Sync {
    fn name(&self) -> String;

    /// Parent node; `None` at the project root.
    fn parent(&self) -> Option<Arc<dyn TreeItem>>;

    /// Whether the node is a folder. Roots never report `true`.
    fn is_folder(&self) -> bool;

    /// Name used in log lines.
    fn debug_name(&self) -> String {
        self.name()
    }
}

/// An open document. Identity is the full path.
pub trait Document: Send + Sync {
    fn path(&self) -> String;

    /// Leaf label, used as the caption when the engine is disabled.
    fn name(&self) -> String;

    fn project(&self) -> Option<Arc<dyn Project>>;

    /// Position in the project tree, absent until the host materializes it.
    fn tree_item(&self) -> Option<Arc<dyn TreeItem>>;

    fn set_caption(&self, caption: &str) -> Result<(), CaptionError>;

    /// Restores the caption to [`Document::name`]. Failures are ignored.
    fn reset_caption(&self);
}

/// The set of loaded projects and open documents.
pub trait Solution: Send + Sync {
    /// Snapshot of every open document at call time.
    fn documents(&self) -> Result<Vec<Arc<dyn Document>>, EnumerationError>;

    /// Whether exactly one non-built-in project is loaded.
    fn has_single_project(&self) -> bool;
}

impl fmt::Debug for dyn Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("path", &self.path())
            .finish()
    }
}
