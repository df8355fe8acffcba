#![forbid(unsafe_code)]

//! The combinator protocol: per-kind handlers between a producer and a
//! derived node.
//!
//! A derived node is built from one or more producers plus a [`Handler`].
//! Each producer reaches the derived node through a link; when the derived
//! node activates, every link registers a relay on its producer, and each
//! event the producer emits runs the matching handler method with an
//! [`Outlet`] that emits into the derived node.
//!
//! Handler state lives once per derived node and is shared by all of that
//! node's consumers and all of its producer links.
//!
//! # Re-entrant delivery
//!
//! An event that reaches a derived node while its handler is still running
//! (a downstream side effect pushing back into a producer, or one producer
//! making a sibling producer emit) is queued and handled after the current
//! call returns, in arrival order.
//!
//! # Replay deduplication
//!
//! A link remembers the last producer version it processed. A replayed
//! event whose version the link has already seen is dropped, so a derived
//! node that is deactivated and reactivated does not count a Property's
//! cached event twice.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::event::{Delivery, Event, NodeId};
use crate::node::{Consumer, Observable, Sink, Variant};

/// Per-kind processing for a derived node.
///
/// `I` is the producer's value type, `T` the derived node's value type.
/// ERROR and END are forwarded unchanged unless overridden.
pub trait Handler<I, T: Clone + 'static, E: Clone + 'static> {
    /// A VALUE arrived from a producer.
    fn value(&mut self, value: &I, out: &Outlet<'_, T, E>);

    /// An ERROR arrived from a producer.
    fn error(&mut self, error: &E, out: &Outlet<'_, T, E>) {
        out.error(error.clone());
    }

    /// A producer ended.
    fn end(&mut self, out: &Outlet<'_, T, E>) {
        out.end();
    }
}

/// Emission handle given to a [`Handler`] for one incoming event.
pub struct Outlet<'a, T, E> {
    node: &'a Observable<T, E>,
    delivery: Delivery,
}

impl<T: Clone + 'static, E: Clone + 'static> Outlet<'_, T, E> {
    /// Emit a VALUE from the derived node.
    pub fn value(&self, value: T) {
        self.node.emit(Event::Value(value));
    }

    /// Emit an ERROR from the derived node.
    pub fn error(&self, error: E) {
        self.node.emit(Event::Error(error));
    }

    /// End the derived node.
    pub fn end(&self) {
        self.node.emit(Event::End);
    }

    /// Emit any event from the derived node.
    pub fn emit(&self, event: Event<T, E>) {
        self.node.emit(event);
    }

    /// The producer that delivered the event being handled.
    #[must_use]
    pub fn provenance(&self) -> NodeId {
        self.delivery.source
    }

    /// Whether the event being handled is a Property replay.
    #[must_use]
    pub fn is_replay(&self) -> bool {
        self.delivery.replay
    }

    /// Whether the derived node has already ended.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.node.is_ended()
    }
}

/// A derived node's fixed connection to one of its producers.
pub(crate) trait Upstream<T, E> {
    fn attach(&self, target: &Observable<T, E>);
    fn detach(&self, target: NodeId);
}

/// A derived node's handler plus the events that arrived while it was busy.
struct Gate<I, E, H> {
    handler: RefCell<H>,
    busy: Cell<bool>,
    pending: RefCell<VecDeque<(Event<I, E>, Delivery)>>,
}

impl<I, E, H> Gate<I, E, H> {
    fn new(handler: H) -> Self {
        Self {
            handler: RefCell::new(handler),
            busy: Cell::new(false),
            pending: RefCell::new(VecDeque::new()),
        }
    }
}

/// Clears the busy flag when the drain loop exits, unwinding included.
struct Busy<'a>(&'a Cell<bool>);

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

struct Link<I, E, H> {
    producer: Observable<I, E>,
    gate: Rc<Gate<I, E, H>>,
    seen: Rc<Cell<Option<u64>>>,
}

impl<I, T, E, H> Upstream<T, E> for Link<I, E, H>
where
    I: Clone + 'static,
    T: Clone + 'static,
    E: Clone + 'static,
    H: Handler<I, T, E> + 'static,
{
    fn attach(&self, target: &Observable<T, E>) {
        let relay: Relay<I, T, E, H> = Relay {
            target: target.clone(),
            gate: Rc::clone(&self.gate),
            seen: Rc::clone(&self.seen),
            _input: PhantomData,
        };
        self.producer.activate(Consumer {
            id: target.id(),
            sink: Rc::new(relay),
        });
    }

    fn detach(&self, target: NodeId) {
        self.producer.deactivate(target);
    }
}

/// The consumer a link registers on its producer while the target is active.
struct Relay<I, T, E, H> {
    target: Observable<T, E>,
    gate: Rc<Gate<I, E, H>>,
    seen: Rc<Cell<Option<u64>>>,
    _input: PhantomData<fn(&I)>,
}

impl<I, T, E, H> Sink<I, E> for Relay<I, T, E, H>
where
    I: Clone + 'static,
    T: Clone + 'static,
    E: Clone + 'static,
    H: Handler<I, T, E>,
{
    fn deliver(&self, event: &Event<I, E>, delivery: Delivery) {
        if self.target.is_ended() {
            return;
        }
        if delivery.replay && self.seen.get().is_some_and(|seen| delivery.version <= seen) {
            return;
        }
        self.seen.set(Some(delivery.version));

        if self.gate.busy.get() {
            self.gate
                .pending
                .borrow_mut()
                .push_back((event.clone(), delivery));
            return;
        }
        self.gate.busy.set(true);
        let _busy = Busy(&self.gate.busy);

        self.handle(event, delivery);
        loop {
            let next = self.gate.pending.borrow_mut().pop_front();
            let Some((event, delivery)) = next else {
                break;
            };
            if self.target.is_ended() {
                self.gate.pending.borrow_mut().clear();
                break;
            }
            self.handle(&event, delivery);
        }
    }

    fn is_closed(&self) -> bool {
        self.target.is_ended()
    }
}

impl<I, T, E, H> Relay<I, T, E, H>
where
    I: Clone + 'static,
    T: Clone + 'static,
    E: Clone + 'static,
    H: Handler<I, T, E>,
{
    fn handle(&self, event: &Event<I, E>, delivery: Delivery) {
        let out = Outlet {
            node: &self.target,
            delivery,
        };
        let mut handler = self.gate.handler.borrow_mut();
        match event {
            Event::Value(v) => handler.value(v, &out),
            Event::Error(e) => handler.error(e, &out),
            Event::End => handler.end(&out),
        }
    }
}

/// Forwards values unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Forward;

impl<T: Clone + 'static, E: Clone + 'static> Handler<T, T, E> for Forward {
    fn value(&mut self, value: &T, out: &Outlet<'_, T, E>) {
        out.value(value.clone());
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Observable<T, E> {
    /// Build a derived node of the same variant with `handler` between this
    /// node and the new one.
    #[must_use]
    pub fn extend<U, H>(&self, handler: H) -> Observable<U, E>
    where
        U: Clone + 'static,
        H: Handler<T, U, E> + 'static,
    {
        self.derive("extend", handler)
    }

    /// Build a derived node fed by several producers through one shared
    /// handler. Producers are activated in the order given;
    /// [`Outlet::provenance`] tells the handler which one delivered.
    #[must_use]
    pub fn from_producers<I, H>(
        variant: Variant,
        label: &'static str,
        producers: &[Observable<I, E>],
        handler: H,
    ) -> Self
    where
        I: Clone + 'static,
        H: Handler<I, T, E> + 'static,
    {
        Self::derived(variant, label, producers, handler, false)
    }

    pub(crate) fn derive<U, H>(&self, label: &'static str, handler: H) -> Observable<U, E>
    where
        U: Clone + 'static,
        H: Handler<T, U, E> + 'static,
    {
        Observable::derived(
            self.variant(),
            label,
            std::slice::from_ref(self),
            handler,
            false,
        )
    }

    pub(crate) fn derived<I, H>(
        variant: Variant,
        label: &'static str,
        producers: &[Observable<I, E>],
        handler: H,
        ended: bool,
    ) -> Self
    where
        I: Clone + 'static,
        H: Handler<I, T, E> + 'static,
    {
        let gate = Rc::new(Gate::new(handler));
        let upstream: Vec<Box<dyn Upstream<T, E>>> = producers
            .iter()
            .map(|producer| {
                Box::new(Link {
                    producer: producer.clone(),
                    gate: Rc::clone(&gate),
                    seen: Rc::new(Cell::new(None)),
                }) as Box<dyn Upstream<T, E>>
            })
            .collect();
        let mut builder = Self::builder(variant).label(label);
        if ended {
            builder = builder.ended();
        }
        builder.build_with(upstream)
    }
}
