#![forbid(unsafe_code)]

//! Push-style named-event emitters.
//!
//! [`Emitter`] is the capability the events source needs from the outside
//! world: add and remove a listener under a name. [`EventHub`] is an
//! in-memory implementation for hosts that have no emitter of their own.

use std::cell::RefCell;
use std::fmt;

use ahash::AHashMap;
use narly_core::Listener;

/// Add/remove listeners by event name. Removal is by listener identity.
pub trait Emitter<T> {
    /// Start calling `listener` for every `name` event.
    fn add_listener(&self, name: &str, listener: Listener<T>);
    /// Stop calling the most recently added listener identical to `listener`.
    fn remove_listener(&self, name: &str, listener: &Listener<T>);
}

/// In-memory named-event emitter.
pub struct EventHub<T> {
    listeners: RefCell<AHashMap<String, Vec<Listener<T>>>>,
}

impl<T> EventHub<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(AHashMap::new()),
        }
    }

    /// Call every listener registered under `name`, in registration order.
    /// Returns how many were called.
    ///
    /// Listeners added or removed by a listener take effect from the next
    /// `emit`.
    pub fn emit(&self, name: &str, payload: &T) -> usize {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_default();
        for listener in &snapshot {
            listener.call(payload);
        }
        snapshot.len()
    }

    /// Listeners currently registered under `name`.
    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.borrow().get(name).map_or(0, Vec::len)
    }
}

impl<T> Default for EventHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Emitter<T> for EventHub<T> {
    fn add_listener(&self, name: &str, listener: Listener<T>) {
        self.listeners
            .borrow_mut()
            .entry(name.to_owned())
            .or_default()
            .push(listener);
    }

    fn remove_listener(&self, name: &str, listener: &Listener<T>) {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(list) = listeners.get_mut(name) {
            if let Some(pos) = list.iter().rposition(|l| l.same(listener)) {
                list.remove(pos);
            }
            if list.is_empty() {
                listeners.remove(name);
            }
        }
    }
}

impl<T> fmt::Debug for EventHub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.borrow();
        let mut names: Vec<(&str, usize)> = listeners
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        names.sort_unstable();
        f.debug_struct("EventHub").field("listeners", &names).finish()
    }
}
