#![forbid(unsafe_code)]

//! Ready-made source constructors.
//!
//! All of them are lazy: nothing is scheduled or called until the returned
//! node gets its first consumer.

use std::collections::VecDeque;
use std::rc::Rc;

use narly_core::{Event, Observable, Variant};
use web_time::Duration;

use crate::emitter::Emitter;
use crate::error::Result;
use crate::scheduler::TimerFacility;
use crate::sources::{callback_labeled, constant, events, timed_labeled};

/// A Stream that is already ended.
#[must_use]
pub fn never<T: Clone + 'static, E: Clone + 'static>() -> Observable<T, E> {
    Observable::builder(Variant::Stream)
        .label("never")
        .ended()
        .build()
}

/// A constant Property holding `value`.
#[must_use]
pub fn value<T: Clone + 'static, E: Clone + 'static>(value: T) -> Observable<T, E> {
    constant(Event::Value(value))
}

/// A constant Property holding `error`.
#[must_use]
pub fn error<T: Clone + 'static, E: Clone + 'static>(error: E) -> Observable<T, E> {
    constant(Event::Error(error))
}

/// Emit `value` and END once `wait` has passed after activation.
///
/// # Errors
///
/// [`SourceError::ZeroInterval`](crate::SourceError::ZeroInterval) if `wait`
/// is zero.
pub fn later<S, T, E>(facility: &S, wait: Duration, value: T) -> Result<Observable<T, E>>
where
    S: TimerFacility + Clone + 'static,
    T: Clone + 'static,
    E: Clone + 'static,
{
    timed_labeled(facility, wait, "later", move |node: &Observable<T, E>| {
        node.emit_value(value.clone());
        node.end();
    })
}

/// Emit `value` every `period` while active. Never ends.
///
/// # Errors
///
/// [`SourceError::ZeroInterval`](crate::SourceError::ZeroInterval) if
/// `period` is zero.
pub fn interval<S, T, E>(facility: &S, period: Duration, value: T) -> Result<Observable<T, E>>
where
    S: TimerFacility + Clone + 'static,
    T: Clone + 'static,
    E: Clone + 'static,
{
    timed_labeled(facility, period, "interval", move |node: &Observable<T, E>| {
        node.emit_value(value.clone());
    })
}

/// Emit `values` one per `period`, then END in the same tick as the last
/// value. An empty `values` gives [`never`].
///
/// Values already emitted are not repeated after a deactivate/reactivate
/// cycle.
///
/// # Errors
///
/// [`SourceError::ZeroInterval`](crate::SourceError::ZeroInterval) if
/// `period` is zero.
pub fn sequentially<S, T, E>(
    facility: &S,
    period: Duration,
    values: impl IntoIterator<Item = T>,
) -> Result<Observable<T, E>>
where
    S: TimerFacility + Clone + 'static,
    T: Clone + 'static,
    E: Clone + 'static,
{
    let mut queue: VecDeque<T> = values.into_iter().collect();
    if queue.is_empty() {
        return Ok(never());
    }
    timed_labeled(facility, period, "sequentially", move |node: &Observable<T, E>| {
        if let Some(next) = queue.pop_front() {
            node.emit_value(next);
        }
        if queue.is_empty() {
            node.end();
        }
    })
}

/// Emit `poll()` every `period` while active. Never ends.
///
/// # Errors
///
/// [`SourceError::ZeroInterval`](crate::SourceError::ZeroInterval) if
/// `period` is zero.
pub fn from_poll<S, T, E>(
    facility: &S,
    period: Duration,
    mut poll: impl FnMut() -> T + 'static,
) -> Result<Observable<T, E>>
where
    S: TimerFacility + Clone + 'static,
    T: Clone + 'static,
    E: Clone + 'static,
{
    timed_labeled(facility, period, "from_poll", move |node: &Observable<T, E>| {
        node.emit_value(poll());
    })
}

/// Completion handed to a one-shot callback provider.
pub type Done<T> = Box<dyn FnOnce(T)>;

/// Run `provider` on first activation; the value it completes with is
/// emitted followed by END.
///
/// `provider` may call the completion synchronously or keep it and call it
/// later.
#[must_use]
pub fn from_callback<T, E>(provider: impl FnOnce(Done<T>) + 'static) -> Observable<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    callback_labeled("from_callback", move |node: &Observable<T, E>| {
        let target = node.clone();
        provider(Box::new(move |value: T| {
            target.emit_value(value);
            target.end();
        }));
    })
}

/// Run `provider` on first activation; an `Ok` completion is emitted as a
/// VALUE, an `Err` as an ERROR, and either is followed by END.
#[must_use]
pub fn from_node_callback<T, E>(
    provider: impl FnOnce(Done<std::result::Result<T, E>>) + 'static,
) -> Observable<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    callback_labeled("from_node_callback", move |node: &Observable<T, E>| {
        let target = node.clone();
        provider(Box::new(move |result: std::result::Result<T, E>| {
            target.emit(Event::from(result));
            target.end();
        }));
    })
}

/// Payloads `emitter` delivers under `name`, as a Stream.
#[must_use]
pub fn from_events<M, T, E>(emitter: &Rc<M>, name: impl Into<String>) -> Observable<T, E>
where
    M: Emitter<T> + 'static,
    T: Clone + 'static,
    E: Clone + 'static,
{
    events(Rc::clone(emitter), name)
}
