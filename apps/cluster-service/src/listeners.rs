//! Observer registration with explicit deregistration handles.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

struct Slots<T: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Arc<T>)>,
}

/// A set of listeners notified in registration order.
///
/// Notification works on a snapshot, so a listener may register or cancel
/// other listeners (or itself) while being called.
pub struct ListenerRegistry<T: ?Sized> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T: ?Sized + Send + Sync + 'static> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Adds `listener`. It stays registered until the returned handle is
    /// cancelled or dropped.
    #[must_use = "dropping the handle deregisters the listener"]
    pub fn register(&self, listener: Arc<T>) -> ListenerHandle {
        let id = {
            let mut slots = self.slots.lock();
            let id = slots.next_id;
            slots.next_id += 1;
            slots.entries.push((id, listener));
            id
        };
        let slots: Weak<Mutex<Slots<T>>> = Arc::downgrade(&self.slots);
        ListenerHandle {
            deregister: Some(Box::new(move || {
                if let Some(slots) = slots.upgrade() {
                    slots.lock().entries.retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every listener. Outstanding handles become no-ops. Returns how
    /// many were removed.
    pub fn clear(&self) -> usize {
        std::mem::take(&mut self.slots.lock().entries).len()
    }

    /// Calls `notify` for every listener registered at the time of the call.
    /// Returns how many were notified.
    pub fn notify(&self, mut notify: impl FnMut(&T)) -> usize {
        let snapshot: Vec<Arc<T>> = self
            .slots
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in &snapshot {
            notify(listener);
        }
        snapshot.len()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a listener registered. Dropping it, or calling [`cancel`], removes
/// the listener.
///
/// [`cancel`]: ListenerHandle::cancel
pub struct ListenerHandle {
    deregister: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ListenerHandle {
    pub fn cancel(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(deregister) = self.deregister.take() {
            deregister();
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("active", &self.deregister.is_some())
            .finish()
    }
}
