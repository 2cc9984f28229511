//! In-crate doubles for the environment ports.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::events::{ChangeEvent, ChangeEventSource, Listener, Subscribers, Subscription};
use crate::ports::{CaptionError, Document, EnumerationError, Project, Solution, TreeItem};

pub struct TestProject {
    name: String,
    builtin: bool,
}

impl TestProject {
    pub fn new(name: &str, builtin: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            builtin,
        })
    }
}

impl Project for TestProject {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_builtin(&self) -> bool {
        self.builtin
    }
}

pub struct TestTreeItem {
    name: String,
    parent: Option<Arc<TestTreeItem>>,
    folder: bool,
}

impl TestTreeItem {
    pub fn root(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            parent: None,
            folder: false,
        })
    }

    pub fn folder(name: &str, parent: &Arc<TestTreeItem>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            parent: Some(Arc::clone(parent)),
            folder: true,
        })
    }

    pub fn file(name: &str, parent: &Arc<TestTreeItem>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            parent: Some(Arc::clone(parent)),
            folder: false,
        })
    }
}

impl TreeItem for TestTreeItem {
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
}

pub struct TestDocument {
    path: String,
    project: Option<Arc<dyn Project>>,
    tree_item: Option<Arc<dyn TreeItem>>,
    caption: Mutex<Option<String>>,
    failing: Mutex<bool>,
    attempts: AtomicUsize,
}

impl TestDocument {
    pub fn at(path: &str) -> Self {
        Self {
            path: path.to_string(),
            project: None,
            tree_item: None,
            caption: Mutex::new(None),
            failing: Mutex::new(false),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn with_project(mut self, project: Arc<TestProject>) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_tree_item(mut self, item: Arc<TestTreeItem>) -> Self {
        self.tree_item = Some(item);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn caption(&self) -> Option<String> {
        self.caption.lock().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Document for TestDocument {
    fn path(&self) -> String {
        self.path.clone()
    }

    fn name(&self) -> String {
        crate::variables::split_path(&self.path)
            .last()
            .map(|name| name.to_string())
            .unwrap_or_default()
    }

    fn project(&self) -> Option<Arc<dyn Project>> {
        self.project.clone()
    }

    fn tree_item(&self) -> Option<Arc<dyn TreeItem>> {
        self.tree_item.clone()
    }

    fn set_caption(&self, caption: &str) -> Result<(), CaptionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock() {
            return Err(CaptionError::SurfaceUnavailable {
                path: self.path.clone(),
            });
        }
        *self.caption.lock() = Some(caption.to_string());
        Ok(())
    }

    fn reset_caption(&self) {
        *self.caption.lock() = Some(self.name());
    }
}

#[derive(Default)]
pub struct TestSolution {
    single_project: bool,
    documents: Mutex<Vec<Arc<TestDocument>>>,
    failing_enumerations: AtomicUsize,
    enumerations: AtomicUsize,
    enumerated_at: Mutex<Vec<Instant>>,
    events: Subscribers<ChangeEvent>,
}

impl TestSolution {
    pub fn new(single_project: bool) -> Self {
        Self {
            single_project,
            ..Self::default()
        }
    }

    pub fn open(&self, document: Arc<TestDocument>) {
        self.documents.lock().push(document);
    }

    pub fn fail_enumerations(&self, count: usize) {
        self.failing_enumerations.store(count, Ordering::SeqCst);
    }

    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    /// When each call to `documents` happened, oldest first.
    pub fn enumeration_times(&self) -> Vec<Instant> {
        self.enumerated_at.lock().clone()
    }

    pub fn listeners(&self) -> usize {
        self.events.len()
    }

    pub fn fire(&self, event: ChangeEvent) {
        self.events.emit(&event);
    }
}

impl Solution for TestSolution {
    fn documents(&self) -> Result<Vec<Arc<dyn Document>>, EnumerationError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        self.enumerated_at.lock().push(Instant::now());
        let remaining = self.failing_enumerations.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_enumerations
                .store(remaining - 1, Ordering::SeqCst);
            return Err(EnumerationError::new("host is still loading projects"));
        }
        Ok(self
            .documents
            .lock()
            .iter()
            .map(|document| Arc::clone(document) as Arc<dyn Document>)
            .collect())
    }

    fn has_single_project(&self) -> bool {
        self.single_project
    }
}

impl ChangeEventSource for TestSolution {
    fn subscribe(&self, listener: Listener<ChangeEvent>) -> Subscription {
        self.events.subscribe_boxed(listener)
    }
}
