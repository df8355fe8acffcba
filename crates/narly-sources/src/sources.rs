#![forbid(unsafe_code)]

//! Leaf source nodes adapting external primitives into a graph.
//!
//! Every source is a plain [`Observable`] whose external resource (a timer,
//! an emitter registration, a one-shot callback) is tied to the node's
//! activation through [`SourceHooks`]:
//!
//! | Source     | Variant  | Acquired on 0→1          | Released on 1→0 / END |
//! |------------|----------|--------------------------|-----------------------|
//! | `constant` | Property | nothing (already ended)  | nothing               |
//! | `callback` | Stream   | runs the callback, once  | nothing               |
//! | `timed`    | Stream   | starts a repeating timer | stops the timer       |
//! | `events`   | Stream   | attaches a translator    | detaches it           |
//!
//! Resource hooks are idempotent: a second start without a stop, or a stop
//! with nothing running, does nothing.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use narly_core::{Event, Listener, Observable, SourceHooks, Variant};
use web_time::Duration;

use crate::emitter::Emitter;
use crate::error::{Result, SourceError};
use crate::scheduler::{TimerFacility, TimerHandle};

// ─── Constant ────────────────────────────────────────────────────────────────

/// A Property holding `event` that is ended from the start.
///
/// Every activation receives the cached VALUE/ERROR followed by END. An
/// `Event::End` gives a Property with nothing cached.
#[must_use]
pub fn constant<T: Clone + 'static, E: Clone + 'static>(event: Event<T, E>) -> Observable<T, E> {
    Observable::builder(Variant::Property)
        .label("constant")
        .seed(event)
        .ended()
        .build()
}

// ─── Callback ────────────────────────────────────────────────────────────────

type Pending<T, E> = Box<dyn FnOnce(&Observable<T, E>)>;

struct CallbackHooks<T, E> {
    pending: RefCell<Option<Pending<T, E>>>,
}

impl<T: Clone + 'static, E: Clone + 'static> SourceHooks<T, E> for CallbackHooks<T, E> {
    fn on_activate(&self, node: &Observable<T, E>) {
        let pending = self.pending.borrow_mut().take();
        if let Some(f) = pending {
            tracing::debug!(node = node.id().raw(), label = node.label(), "source.callback");
            f(node);
        }
    }
}

/// A Stream that runs `f` the first time it activates, and never again.
///
/// `f` receives the node and may emit into it right away or keep a clone to
/// emit later.
#[must_use]
pub fn callback<T, E>(f: impl FnOnce(&Observable<T, E>) + 'static) -> Observable<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    callback_labeled("callback", f)
}

pub(crate) fn callback_labeled<T, E>(
    label: &'static str,
    f: impl FnOnce(&Observable<T, E>) + 'static,
) -> Observable<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    Observable::builder(Variant::Stream)
        .label(label)
        .hooks(CallbackHooks {
            pending: RefCell::new(Some(Box::new(f))),
        })
        .build()
}

// ─── Timed ───────────────────────────────────────────────────────────────────

type Tick<T, E> = Rc<RefCell<dyn FnMut(&Observable<T, E>)>>;

struct TimedHooks<S, T, E> {
    facility: S,
    interval: Duration,
    tick: Tick<T, E>,
    handle: Cell<Option<TimerHandle>>,
}

impl<S, T, E> TimedHooks<S, T, E>
where
    S: TimerFacility,
{
    fn release(&self, node: &Observable<T, E>)
    where
        T: Clone + 'static,
        E: Clone + 'static,
    {
        if let Some(handle) = self.handle.take() {
            tracing::debug!(
                node = node.id().raw(),
                label = node.label(),
                timer = handle.raw(),
                "source.timer_stop"
            );
            self.facility.stop(handle);
        }
    }
}

impl<S, T, E> SourceHooks<T, E> for TimedHooks<S, T, E>
where
    S: TimerFacility,
    T: Clone + 'static,
    E: Clone + 'static,
{
    fn on_activate(&self, node: &Observable<T, E>) {
        if self.handle.get().is_some() || node.is_ended() {
            return;
        }
        let target = node.clone();
        let tick = Rc::clone(&self.tick);
        let handle = self.facility.start(
            self.interval,
            Box::new(move || {
                let mut tick = tick.borrow_mut();
                (&mut *tick)(&target);
            }),
        );
        tracing::debug!(
            node = node.id().raw(),
            label = node.label(),
            timer = handle.raw(),
            "source.timer_start"
        );
        self.handle.set(Some(handle));
    }

    fn on_deactivate(&self, node: &Observable<T, E>) {
        self.release(node);
    }

    fn on_end(&self, node: &Observable<T, E>) {
        self.release(node);
    }
}

/// A Stream that owns one repeating timer while active and calls `tick`
/// with the node on every fire.
///
/// The timer starts on activation and stops on deactivation or END;
/// reactivation starts a fresh timer.
///
/// # Errors
///
/// [`SourceError::ZeroInterval`] if `interval` is zero.
pub fn timed<S, T, E>(
    facility: &S,
    interval: Duration,
    tick: impl FnMut(&Observable<T, E>) + 'static,
) -> Result<Observable<T, E>>
where
    S: TimerFacility + Clone + 'static,
    T: Clone + 'static,
    E: Clone + 'static,
{
    timed_labeled(facility, interval, "timed", tick)
}

pub(crate) fn timed_labeled<S, T, E>(
    facility: &S,
    interval: Duration,
    label: &'static str,
    tick: impl FnMut(&Observable<T, E>) + 'static,
) -> Result<Observable<T, E>>
where
    S: TimerFacility + Clone + 'static,
    T: Clone + 'static,
    E: Clone + 'static,
{
    if interval.is_zero() {
        return Err(SourceError::ZeroInterval);
    }
    let tick: Tick<T, E> = Rc::new(RefCell::new(tick));
    Ok(Observable::builder(Variant::Stream)
        .label(label)
        .hooks(TimedHooks {
            facility: facility.clone(),
            interval,
            tick,
            handle: Cell::new(None),
        })
        .build())
}

// ─── Events ──────────────────────────────────────────────────────────────────

struct EventsHooks<M, T> {
    emitter: Rc<M>,
    name: String,
    translator: RefCell<Option<Listener<T>>>,
}

impl<M, T> EventsHooks<M, T>
where
    M: Emitter<T>,
{
    fn detach<E>(&self, node: &Observable<T, E>)
    where
        T: Clone + 'static,
        E: Clone + 'static,
    {
        let translator = self.translator.borrow_mut().take();
        if let Some(translator) = translator {
            tracing::debug!(
                node = node.id().raw(),
                label = node.label(),
                event = self.name.as_str(),
                "source.detach"
            );
            self.emitter.remove_listener(&self.name, &translator);
        }
    }
}

impl<M, T, E> SourceHooks<T, E> for EventsHooks<M, T>
where
    M: Emitter<T>,
    T: Clone + 'static,
    E: Clone + 'static,
{
    fn on_activate(&self, node: &Observable<T, E>) {
        if self.translator.borrow().is_some() || node.is_ended() {
            return;
        }
        let target = node.clone();
        let translator = Listener::new(move |payload: &T| target.emit_value(payload.clone()));
        *self.translator.borrow_mut() = Some(translator.clone());
        tracing::debug!(
            node = node.id().raw(),
            label = node.label(),
            event = self.name.as_str(),
            "source.attach"
        );
        self.emitter.add_listener(&self.name, translator);
    }

    fn on_deactivate(&self, node: &Observable<T, E>) {
        self.detach(node);
    }

    fn on_end(&self, node: &Observable<T, E>) {
        self.detach(node);
    }
}

/// A Stream of the payloads `emitter` delivers under `name`.
///
/// One translator is attached while the node is active and removed when it
/// deactivates or ends.
#[must_use]
pub fn events<M, T, E>(emitter: Rc<M>, name: impl Into<String>) -> Observable<T, E>
where
    M: Emitter<T> + 'static,
    T: Clone + 'static,
    E: Clone + 'static,
{
    Observable::builder(Variant::Stream)
        .label("events")
        .hooks(EventsHooks {
            emitter,
            name: name.into(),
            translator: RefCell::new(None),
        })
        .build()
}
