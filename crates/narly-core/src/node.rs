#![forbid(unsafe_code)]

//! Observable nodes: demand-driven activation, emission, and side effects.
//!
//! # Design
//!
//! [`Observable<T, E>`] is a cheap `Rc` handle to one graph node. There is a
//! single node representation; the [`Variant`] tag decides whether the node
//! remembers its latest VALUE/ERROR (`Property`) or forwards and forgets
//! (`Stream`). Per-node behavior comes from handler closures held by the
//! node's upstream links (see [`crate::handler`]), and leaf sources attach
//! external resources through [`SourceHooks`].
//!
//! # Invariants
//!
//! 1. `is_active()` is true iff the node has at least one consumer.
//! 2. Producers are activated exactly once per 0→1 transition of the
//!    consumer count and deactivated exactly once per 1→0 transition.
//! 3. The producer list is fixed at construction.
//! 4. At most one END leaves a node; emission after END is a no-op.
//! 5. Activating an ended node delivers one synthetic END to the new
//!    consumer and touches nothing else.
//! 6. Consumers are notified in registration order.
//! 7. A Property's cached event is replayed to each new consumer before any
//!    later event.
//!
//! # Ownership
//!
//! A producer holds its consumers strongly while they are registered, so a
//! derived node stays alive as long as it is reachable from an active
//! source even after the user drops every handle to it. Deactivation (or
//! END) releases those references.
//!
//! # Failure Modes
//!
//! - **Re-entrant delivery into the same derived node** is queued behind the
//!   event being handled (see [`crate::handler`]); a feedback loop that
//!   never stops emitting never returns.
//! - **Cycles**: the graph is not checked for cycles; a cyclic chain
//!   recurses until the stack is exhausted.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::event::{Delivery, Event, NodeId};
use crate::handler::Upstream;
use crate::side_effect::{Bridge, Listener, Registration, SideEffect, Subscription};

/// Whether a node retains its latest state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variant {
    /// Forwards and discards; new consumers see only later events.
    #[default]
    Stream,
    /// Caches the latest VALUE/ERROR and replays it to new consumers.
    Property,
}

/// The receiving side of a registration.
pub(crate) trait Sink<T, E> {
    fn deliver(&self, event: &Event<T, E>, delivery: Delivery);

    /// A closed sink must not stay registered after its replay.
    fn is_closed(&self) -> bool {
        false
    }
}

pub(crate) struct Consumer<T, E> {
    pub(crate) id: NodeId,
    pub(crate) sink: Rc<dyn Sink<T, E>>,
}

impl<T, E> Clone for Consumer<T, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            sink: Rc::clone(&self.sink),
        }
    }
}

/// Lifecycle callbacks for leaf sources that own an external resource.
///
/// All methods default to no-ops. Implementations keep their own state in
/// `Cell`/`RefCell` and must not hold a borrow across a call back into the
/// graph, since `on_activate` may synchronously emit.
pub trait SourceHooks<T, E> {
    /// The node acquired its first consumer.
    fn on_activate(&self, _node: &Observable<T, E>) {}

    /// The node lost its last consumer.
    fn on_deactivate(&self, _node: &Observable<T, E>) {}

    /// The node emitted END.
    fn on_end(&self, _node: &Observable<T, E>) {}
}

type Initializer<T, E> = Box<dyn FnOnce() -> Result<T, E>>;

struct State<T, E> {
    consumers: Vec<Consumer<T, E>>,
    active: bool,
    ended: bool,
    /// Latest VALUE/ERROR (Property only).
    current: Option<Event<T, E>>,
    initializer: Option<Initializer<T, E>>,
    /// Bumped once per emitted VALUE/ERROR and once when the initializer
    /// seeds `current`.
    version: u64,
    side_effects: Vec<Registration<T, E>>,
}

pub(crate) struct Core<T, E> {
    id: NodeId,
    variant: Variant,
    label: &'static str,
    upstream: Vec<Box<dyn Upstream<T, E>>>,
    hooks: Option<Rc<dyn SourceHooks<T, E>>>,
    state: RefCell<State<T, E>>,
}

/// A node in a push-based dataflow graph.
///
/// Cloning an `Observable` creates a new handle to the **same** node.
pub struct Observable<T, E> {
    core: Rc<Core<T, E>>,
}

impl<T, E> Clone for Observable<T, E> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Observable<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.core.state.borrow();
        f.debug_struct("Observable")
            .field("id", &self.core.id.raw())
            .field("label", &self.core.label)
            .field("variant", &self.core.variant)
            .field("active", &st.active)
            .field("ended", &st.ended)
            .field("consumers", &st.consumers.len())
            .field("current", &st.current)
            .field("version", &st.version)
            .finish()
    }
}

/// Builder for root nodes.
pub struct NodeBuilder<T, E> {
    variant: Variant,
    label: &'static str,
    current: Option<Event<T, E>>,
    initializer: Option<Initializer<T, E>>,
    ended: bool,
    hooks: Option<Rc<dyn SourceHooks<T, E>>>,
}

impl<T: Clone + 'static, E: Clone + 'static> NodeBuilder<T, E> {
    fn new(variant: Variant) -> Self {
        Self {
            variant,
            label: match variant {
                Variant::Stream => "stream",
                Variant::Property => "property",
            },
            current: None,
            initializer: None,
            ended: false,
            hooks: None,
        }
    }

    /// Name used in trace output.
    #[must_use]
    pub fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Pre-seed the cached event (Property only; ignored for streams).
    /// Seeding with END marks the node ended instead.
    #[must_use]
    pub fn seed(mut self, event: Event<T, E>) -> Self {
        if event.is_end() {
            self.ended = true;
        } else {
            self.current = Some(event);
        }
        self
    }

    /// Lazy seed computed on first activation if nothing is cached yet.
    #[must_use]
    pub fn initializer(mut self, init: impl FnOnce() -> Result<T, E> + 'static) -> Self {
        self.initializer = Some(Box::new(init));
        self
    }

    /// Construct the node already ended.
    #[must_use]
    pub fn ended(mut self) -> Self {
        self.ended = true;
        self
    }

    /// Attach source lifecycle hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: impl SourceHooks<T, E> + 'static) -> Self {
        self.hooks = Some(Rc::new(hooks));
        self
    }

    /// Build a node with no producers.
    #[must_use]
    pub fn build(self) -> Observable<T, E> {
        self.build_with(Vec::new())
    }

    pub(crate) fn build_with(self, upstream: Vec<Box<dyn Upstream<T, E>>>) -> Observable<T, E> {
        let is_property = self.variant == Variant::Property;
        let current = if is_property { self.current } else { None };
        let version = u64::from(current.is_some());
        Observable {
            core: Rc::new(Core {
                id: NodeId::next(),
                variant: self.variant,
                label: self.label,
                upstream,
                hooks: self.hooks,
                state: RefCell::new(State {
                    consumers: Vec::new(),
                    active: false,
                    ended: self.ended,
                    current,
                    initializer: if is_property { self.initializer } else { None },
                    version,
                    side_effects: Vec::new(),
                }),
            }),
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Observable<T, E> {
    // ── Constructors ─────────────────────────────────────────────────

    /// Start building a root node of the given variant.
    #[must_use]
    pub fn builder(variant: Variant) -> NodeBuilder<T, E> {
        NodeBuilder::new(variant)
    }

    /// A memoryless root node.
    #[must_use]
    pub fn stream() -> Self {
        Self::builder(Variant::Stream).build()
    }

    /// A root Property with nothing cached.
    #[must_use]
    pub fn property() -> Self {
        Self::builder(Variant::Property).build()
    }

    /// A root Property whose first activation runs `init` to seed the cache.
    /// An `Err` is cached as an ERROR event.
    #[must_use]
    pub fn property_with(init: impl FnOnce() -> Result<T, E> + 'static) -> Self {
        Self::builder(Variant::Property).initializer(init).build()
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Unique identifier of this node.
    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.core.id
    }

    /// Name used in trace output.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.core.label
    }

    /// Stream or Property.
    #[must_use]
    pub fn variant(&self) -> Variant {
        self.core.variant
    }

    /// Whether at least one consumer is registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.core.state.borrow().active
    }

    /// Whether END has left this node.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.core.state.borrow().ended
    }

    /// Number of registered consumers (derived nodes and side effects).
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.core.state.borrow().consumers.len()
    }

    /// Number of side-effect registrations.
    #[must_use]
    pub fn side_effect_count(&self) -> usize {
        self.core.state.borrow().side_effects.len()
    }

    /// Emission counter (see [`Delivery::version`]).
    #[must_use]
    pub fn version(&self) -> u64 {
        self.core.state.borrow().version
    }

    /// The cached VALUE/ERROR of a Property. Always `None` for streams.
    #[must_use]
    pub fn current(&self) -> Option<Event<T, E>> {
        self.core.state.borrow().current.clone()
    }

    /// Number of producers this node was built with.
    #[must_use]
    pub fn producer_count(&self) -> usize {
        self.core.upstream.len()
    }

    fn is_registered(&self, id: NodeId) -> bool {
        self.core
            .state
            .borrow()
            .consumers
            .iter()
            .any(|c| c.id == id)
    }

    // ── Activation ───────────────────────────────────────────────────

    pub(crate) fn activate(&self, consumer: Consumer<T, E>) {
        if self.core.variant == Variant::Property {
            self.seed_from_initializer();
            let replay = {
                let st = self.core.state.borrow();
                st.current.clone().map(|event| (event, st.version))
            };
            if let Some((event, version)) = replay {
                tracing::trace!(
                    node = self.core.id.raw(),
                    label = self.core.label,
                    consumer = consumer.id.raw(),
                    "node.replay"
                );
                consumer
                    .sink
                    .deliver(&event, Delivery::replay(self.core.id, version));
                if consumer.sink.is_closed() {
                    return;
                }
            }
        }

        let (first, version) = {
            let mut st = self.core.state.borrow_mut();
            if st.ended {
                (None, st.version)
            } else {
                st.consumers.push(consumer.clone());
                let first = !st.active;
                st.active = true;
                (Some(first), st.version)
            }
        };

        match first {
            None => {
                tracing::trace!(
                    node = self.core.id.raw(),
                    label = self.core.label,
                    "node.activate_ended"
                );
                consumer
                    .sink
                    .deliver(&Event::End, Delivery::fresh(self.core.id, version));
            }
            Some(true) => {
                tracing::trace!(
                    node = self.core.id.raw(),
                    label = self.core.label,
                    producers = self.core.upstream.len(),
                    "node.activate"
                );
                for up in &self.core.upstream {
                    // A producer's replay can end this node mid-loop.
                    if self.is_ended() {
                        break;
                    }
                    up.attach(self);
                }
                if let Some(hooks) = &self.core.hooks
                    && self.is_active()
                {
                    hooks.on_activate(self);
                }
            }
            Some(false) => {}
        }
    }

    fn seed_from_initializer(&self) {
        let init = {
            let mut st = self.core.state.borrow_mut();
            if st.current.is_none() {
                st.initializer.take()
            } else {
                None
            }
        };
        if let Some(init) = init {
            let event = Event::from(init());
            let mut st = self.core.state.borrow_mut();
            if st.current.is_none() {
                st.current = Some(event);
                st.version += 1;
            }
        }
    }

    pub(crate) fn deactivate(&self, id: NodeId) {
        let (removed, released) = {
            let mut st = self.core.state.borrow_mut();
            match st.consumers.iter().position(|c| c.id == id) {
                Some(pos) => {
                    let removed = st.consumers.remove(pos);
                    let released = st.consumers.is_empty() && st.active;
                    if released {
                        st.active = false;
                    }
                    (Some(removed), released)
                }
                None => (None, false),
            }
        };
        if removed.is_none() {
            tracing::trace!(
                node = self.core.id.raw(),
                consumer = id.raw(),
                "node.deactivate_unknown"
            );
            return;
        }
        if released {
            tracing::trace!(
                node = self.core.id.raw(),
                label = self.core.label,
                "node.deactivate"
            );
            for up in &self.core.upstream {
                up.detach(self.core.id);
            }
            if let Some(hooks) = &self.core.hooks {
                hooks.on_deactivate(self);
            }
        }
        drop(removed);
    }

    // ── Emission ─────────────────────────────────────────────────────

    /// Emit an event to every registered consumer, in registration order.
    ///
    /// END marks the node ended, releases its producers and source
    /// resources, notifies consumers, then drops them. Anything emitted
    /// after END is ignored.
    pub fn emit(&self, event: Event<T, E>) {
        let is_end = event.is_end();
        let (targets, delivery) = {
            let mut st = self.core.state.borrow_mut();
            if st.ended {
                return;
            }
            if is_end {
                st.ended = true;
                st.active = false;
            } else {
                st.version += 1;
                if self.core.variant == Variant::Property {
                    st.current = Some(event.clone());
                }
            }
            (st.consumers.clone(), Delivery::fresh(self.core.id, st.version))
        };

        if is_end {
            tracing::debug!(
                node = self.core.id.raw(),
                label = self.core.label,
                consumers = targets.len(),
                "node.end"
            );
            for up in &self.core.upstream {
                up.detach(self.core.id);
            }
            if let Some(hooks) = &self.core.hooks {
                hooks.on_end(self);
            }
        }

        for consumer in &targets {
            // Skip consumers removed by an earlier consumer's reaction.
            if self.is_registered(consumer.id) {
                consumer.sink.deliver(&event, delivery);
            }
        }

        if is_end {
            let drained = {
                let mut st = self.core.state.borrow_mut();
                (
                    std::mem::take(&mut st.side_effects),
                    std::mem::take(&mut st.consumers),
                )
            };
            drop(drained);
        }
    }

    /// Emit a VALUE.
    pub fn emit_value(&self, value: T) {
        self.emit(Event::Value(value));
    }

    /// Emit an ERROR.
    pub fn emit_error(&self, error: E) {
        self.emit(Event::Error(error));
    }

    /// Emit END.
    pub fn end(&self) {
        self.emit(Event::End);
    }

    // ── Side effects ─────────────────────────────────────────────────

    /// Register a side effect and activate the node on its behalf.
    ///
    /// A Property replays its cached event to the new side effect first.
    pub fn on(&self, effect: SideEffect<T, E>) -> &Self {
        let id = NodeId::next();
        let bridge = Rc::new(Bridge::new(effect.clone()));
        self.core
            .state
            .borrow_mut()
            .side_effects
            .push(Registration {
                id,
                effect,
                bridge: Rc::clone(&bridge),
            });
        self.activate(Consumer { id, sink: bridge });
        // Ended nodes and replay-time removals leave nothing registered.
        if !self.is_registered(id) {
            let stale = {
                let mut st = self.core.state.borrow_mut();
                st.side_effects
                    .iter()
                    .position(|r| r.id == id)
                    .map(|pos| st.side_effects.remove(pos))
            };
            drop(stale);
        }
        self
    }

    /// Remove the most recently added registration matching `effect`.
    pub fn off(&self, effect: &SideEffect<T, E>) -> &Self {
        let removed = {
            let mut st = self.core.state.borrow_mut();
            st.side_effects
                .iter()
                .rposition(|r| r.effect.same(effect))
                .map(|pos| st.side_effects.remove(pos))
        };
        match removed {
            Some(registration) => {
                registration.bridge.close();
                self.deactivate(registration.id);
            }
            None => tracing::trace!(
                node = self.core.id.raw(),
                selector = ?effect.selector(),
                "node.off_unknown"
            ),
        }
        self
    }

    /// Register `listener` for VALUE events.
    pub fn on_value(&self, listener: &Listener<T>) -> &Self {
        self.on(SideEffect::OnValue(listener.clone()))
    }

    /// Register `listener` for ERROR events.
    pub fn on_error(&self, listener: &Listener<E>) -> &Self {
        self.on(SideEffect::OnError(listener.clone()))
    }

    /// Register `listener` for END.
    pub fn on_end(&self, listener: &Listener<()>) -> &Self {
        self.on(SideEffect::OnEnd(listener.clone()))
    }

    /// Register `listener` for every event.
    pub fn on_any(&self, listener: &Listener<Event<T, E>>) -> &Self {
        self.on(SideEffect::OnAny(listener.clone()))
    }

    /// Remove one VALUE registration of `listener`.
    pub fn off_value(&self, listener: &Listener<T>) -> &Self {
        self.off(&SideEffect::OnValue(listener.clone()))
    }

    /// Remove one ERROR registration of `listener`.
    pub fn off_error(&self, listener: &Listener<E>) -> &Self {
        self.off(&SideEffect::OnError(listener.clone()))
    }

    /// Remove one END registration of `listener`.
    pub fn off_end(&self, listener: &Listener<()>) -> &Self {
        self.off(&SideEffect::OnEnd(listener.clone()))
    }

    /// Remove one ANY registration of `listener`.
    pub fn off_any(&self, listener: &Listener<Event<T, E>>) -> &Self {
        self.off(&SideEffect::OnAny(listener.clone()))
    }

    /// Register `effect` and return a guard that removes it on drop.
    pub fn subscribe(&self, effect: SideEffect<T, E>) -> Subscription {
        self.on(effect.clone());
        let node = self.clone();
        Subscription::new(move || {
            node.off(&effect);
        })
    }

    /// Observe every event until the returned guard is dropped.
    pub fn observe(&self, f: impl Fn(&Event<T, E>) + 'static) -> Subscription {
        self.subscribe(SideEffect::OnAny(Listener::new(f)))
    }
}
