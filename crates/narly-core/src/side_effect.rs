#![forbid(unsafe_code)]

//! Side effects: terminal bridges from graph nodes to plain callbacks.
//!
//! A [`SideEffect`] wraps one [`Listener`] and reacts only to the event
//! kind(s) it was registered for. Bridges are the only consumers with no
//! outgoing consumers of their own.
//!
//! # Identity
//!
//! Closures have no identity in Rust, so callbacks are wrapped in a
//! [`Listener`], a cheaply cloneable `Rc` handle. Two listeners are the
//! same iff they were cloned from one another. `off` uses that identity to
//! find the registration to remove.
//!
//! # Multiplicity
//!
//! Registering the same listener for the same kind twice creates two
//! independent bridges. `off` removes one of them, most recently added
//! first.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::event::{Delivery, Event, NodeId, Selector};
use crate::node::Sink;

/// A shared callback with pointer identity.
pub struct Listener<A> {
    f: Rc<dyn Fn(&A)>,
}

impl<A> Listener<A> {
    /// Wrap a callback.
    pub fn new(f: impl Fn(&A) + 'static) -> Self {
        Self { f: Rc::new(f) }
    }

    /// Invoke the callback.
    pub fn call(&self, arg: &A) {
        (self.f)(arg);
    }

    /// Whether `other` is a clone of this listener.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.f), Rc::as_ptr(&other.f))
    }
}

impl Listener<()> {
    /// Wrap a callback that takes no payload (for END).
    pub fn unit(f: impl Fn() + 'static) -> Self {
        Self::new(move |_: &()| f())
    }
}

impl<A> Clone for Listener<A> {
    fn clone(&self) -> Self {
        Self {
            f: Rc::clone(&self.f),
        }
    }
}

impl<A> fmt::Debug for Listener<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener")
            .field(&Rc::as_ptr(&self.f).cast::<()>())
            .finish()
    }
}

/// The four side-effect capabilities.
pub enum SideEffect<T, E> {
    /// Called with each VALUE payload.
    OnValue(Listener<T>),
    /// Called with each ERROR payload.
    OnError(Listener<E>),
    /// Called once on END.
    OnEnd(Listener<()>),
    /// Called with every event.
    OnAny(Listener<Event<T, E>>),
}

impl<T, E> SideEffect<T, E> {
    /// The kinds this side effect reacts to.
    #[must_use]
    pub const fn selector(&self) -> Selector {
        match self {
            Self::OnValue(_) => Selector::Value,
            Self::OnError(_) => Selector::Error,
            Self::OnEnd(_) => Selector::End,
            Self::OnAny(_) => Selector::Any,
        }
    }

    /// Same kind and same listener.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::OnValue(a), Self::OnValue(b)) => a.same(b),
            (Self::OnError(a), Self::OnError(b)) => a.same(b),
            (Self::OnEnd(a), Self::OnEnd(b)) => a.same(b),
            (Self::OnAny(a), Self::OnAny(b)) => a.same(b),
            _ => false,
        }
    }

    fn fire(&self, event: &Event<T, E>) {
        match (self, event) {
            (Self::OnValue(l), Event::Value(v)) => l.call(v),
            (Self::OnError(l), Event::Error(e)) => l.call(e),
            (Self::OnEnd(l), Event::End) => l.call(&()),
            (Self::OnAny(l), event) => l.call(event),
            _ => {}
        }
    }
}

impl<T, E> Clone for SideEffect<T, E> {
    fn clone(&self) -> Self {
        match self {
            Self::OnValue(l) => Self::OnValue(l.clone()),
            Self::OnError(l) => Self::OnError(l.clone()),
            Self::OnEnd(l) => Self::OnEnd(l.clone()),
            Self::OnAny(l) => Self::OnAny(l.clone()),
        }
    }
}

impl<T, E> fmt::Debug for SideEffect<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SideEffect").field(&self.selector()).finish()
    }
}

/// The consumer registered on a node on behalf of one side effect.
pub(crate) struct Bridge<T, E> {
    effect: SideEffect<T, E>,
    closed: Cell<bool>,
}

impl<T, E> Bridge<T, E> {
    pub(crate) fn new(effect: SideEffect<T, E>) -> Self {
        Self {
            effect,
            closed: Cell::new(false),
        }
    }

    /// Stop delivering; set when the registration is removed.
    pub(crate) fn close(&self) {
        self.closed.set(true);
    }
}

impl<T, E> Sink<T, E> for Bridge<T, E> {
    fn deliver(&self, event: &Event<T, E>, _delivery: Delivery) {
        if !self.closed.get() {
            self.effect.fire(event);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

/// One entry in a node's side-effect table.
pub(crate) struct Registration<T, E> {
    pub(crate) id: NodeId,
    pub(crate) effect: SideEffect<T, E>,
    pub(crate) bridge: Rc<Bridge<T, E>>,
}

/// RAII guard that removes its side effect when dropped.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Unsubscribe now.
    pub fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.release.is_some())
            .finish()
    }
}
