//! Change notifications and the subscription registry that delivers them.
//! 變更通知與訂閱登錄表。

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::ports::Document;

/// Callback registered with a [`Subscribers`] list.
pub type Listener<E> = Box<dyn Fn(&E) + Send + Sync>;

/// Notifications fired by the host environment.
/// 宿主環境發出的變更事件。
#[derive(Clone)]
pub enum ChangeEvent {
    /// A document was opened, renamed or moved.
    DocumentChanged(Arc<dyn Document>),
    /// A project or folder was added, removed or renamed. Consumers re-scan.
    ContainersChanged,
}

impl fmt::Debug for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::DocumentChanged(document) => f
                .debug_tuple("DocumentChanged")
                .field(&document.path())
                .finish(),
            ChangeEvent::ContainersChanged => f.write_str("ContainersChanged"),
        }
    }
}

/// Anything that can report [`ChangeEvent`]s.
pub trait ChangeEventSource: Send + Sync {
    /// Registers a listener; dropping the returned handle unregisters it.
    fn subscribe(&self, listener: Listener<ChangeEvent>) -> Subscription;
}

struct SubscriberList<E> {
    next_id: u64,
    entries: Vec<(u64, Arc<dyn Fn(&E) + Send + Sync>)>,
}

/// Observer registry. Cloning shares the same list.
pub struct Subscribers<E> {
    inner: Arc<Mutex<SubscriberList<E>>>,
}

impl<E> Clone for Subscribers<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for Subscribers<E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SubscriberList {
                next_id: 1,
                entries: Vec::new(),
            })),
        }
    }
}

impl<E: 'static> Subscribers<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe_boxed(Box::new(listener))
    }

    pub fn subscribe_boxed(&self, listener: Listener<E>) -> Subscription {
        let id = {
            let mut list = self.inner.lock();
            let id = list.next_id;
            list.next_id += 1;
            list.entries.push((id, Arc::from(listener)));
            id
        };

        let weak: Weak<Mutex<SubscriberList<E>>> = Arc::downgrade(&self.inner);
        Subscription {
            id,
            detach: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().entries.retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    /// Calls every listener with `event`. The lock is released before the
    /// callbacks run, so a listener may subscribe or unsubscribe.
    pub fn emit(&self, event: &E) {
        let listeners: Vec<_> = self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to a registered listener. Dropping it unsubscribes.
/// 訂閱控制代碼；釋放時自動取消訂閱。
pub struct Subscription {
    id: u64,
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("attached", &self.detach.is_some())
            .finish()
    }
}
