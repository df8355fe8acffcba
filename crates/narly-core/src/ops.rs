#![forbid(unsafe_code)]

//! Combinators.
//!
//! Every combinator returns a new node of the same [`Variant`] as its source
//! with that source as its only producer. Per-node state (counters, the
//! previous value, accumulators) lives in the handler and is shared by all
//! consumers of the derived node, so a second subscriber does not reset a
//! `take` counter or a `scan` accumulator.
//!
//! Unless stated otherwise, ERROR and END pass through unchanged.
//!
//! [`Variant`]: crate::node::Variant

use crate::handler::{Handler, Outlet};
use crate::node::Observable;

// ─── Handlers ────────────────────────────────────────────────────────────────

struct Map<F>(F);

impl<T, U, E, F> Handler<T, U, E> for Map<F>
where
    U: Clone + 'static,
    E: Clone + 'static,
    F: FnMut(&T) -> U,
{
    fn value(&mut self, value: &T, out: &Outlet<'_, U, E>) {
        out.value((self.0)(value));
    }
}

struct TryMap<F>(F);

impl<T, U, E, F> Handler<T, U, E> for TryMap<F>
where
    U: Clone + 'static,
    E: Clone + 'static,
    F: FnMut(&T) -> Result<U, E>,
{
    fn value(&mut self, value: &T, out: &Outlet<'_, U, E>) {
        match (self.0)(value) {
            Ok(v) => out.value(v),
            Err(e) => out.error(e),
        }
    }
}

struct Filter<F>(F);

impl<T, E, F> Handler<T, T, E> for Filter<F>
where
    T: Clone + 'static,
    E: Clone + 'static,
    F: FnMut(&T) -> bool,
{
    fn value(&mut self, value: &T, out: &Outlet<'_, T, E>) {
        if (self.0)(value) {
            out.value(value.clone());
        }
    }
}

/// Starts at `remaining >= 1`; `take(0)` builds an ended node instead.
struct Take {
    remaining: usize,
}

impl<T: Clone + 'static, E: Clone + 'static> Handler<T, T, E> for Take {
    fn value(&mut self, value: &T, out: &Outlet<'_, T, E>) {
        self.remaining -= 1;
        out.value(value.clone());
        if self.remaining == 0 {
            out.end();
        }
    }
}

struct TakeWhile<F>(F);

impl<T, E, F> Handler<T, T, E> for TakeWhile<F>
where
    T: Clone + 'static,
    E: Clone + 'static,
    F: FnMut(&T) -> bool,
{
    fn value(&mut self, value: &T, out: &Outlet<'_, T, E>) {
        if (self.0)(value) {
            out.value(value.clone());
        } else {
            out.end();
        }
    }
}

struct Last<T> {
    latest: Option<T>,
}

impl<T: Clone + 'static, E: Clone + 'static> Handler<T, T, E> for Last<T> {
    fn value(&mut self, value: &T, _out: &Outlet<'_, T, E>) {
        self.latest = Some(value.clone());
    }

    fn end(&mut self, out: &Outlet<'_, T, E>) {
        if let Some(latest) = self.latest.take() {
            out.value(latest);
        }
        out.end();
    }
}

struct Skip {
    remaining: usize,
}

impl<T: Clone + 'static, E: Clone + 'static> Handler<T, T, E> for Skip {
    fn value(&mut self, value: &T, out: &Outlet<'_, T, E>) {
        if self.remaining > 0 {
            self.remaining -= 1;
        } else {
            out.value(value.clone());
        }
    }
}

struct SkipWhile<F> {
    pred: F,
    done: bool,
}

impl<T, E, F> Handler<T, T, E> for SkipWhile<F>
where
    T: Clone + 'static,
    E: Clone + 'static,
    F: FnMut(&T) -> bool,
{
    fn value(&mut self, value: &T, out: &Outlet<'_, T, E>) {
        if !self.done && (self.pred)(value) {
            return;
        }
        self.done = true;
        out.value(value.clone());
    }
}

struct SkipDuplicates<T, F> {
    prev: Option<T>,
    eq: F,
}

impl<T, E, F> Handler<T, T, E> for SkipDuplicates<T, F>
where
    T: Clone + 'static,
    E: Clone + 'static,
    F: FnMut(&T, &T) -> bool,
{
    fn value(&mut self, value: &T, out: &Outlet<'_, T, E>) {
        if let Some(prev) = &self.prev
            && (self.eq)(prev, value)
        {
            return;
        }
        self.prev = Some(value.clone());
        out.value(value.clone());
    }
}

struct Diff<T, F> {
    prev: Option<T>,
    f: F,
}

impl<T, U, E, F> Handler<T, U, E> for Diff<T, F>
where
    T: Clone + 'static,
    U: Clone + 'static,
    E: Clone + 'static,
    F: FnMut(&T, &T) -> U,
{
    fn value(&mut self, value: &T, out: &Outlet<'_, U, E>) {
        let prev = self.prev.replace(value.clone());
        if let Some(prev) = prev {
            out.value((self.f)(&prev, value));
        }
    }
}

struct Scan<U, F> {
    acc: Option<U>,
    f: F,
}

impl<T, U, E, F> Handler<T, U, E> for Scan<U, F>
where
    U: Clone + 'static,
    E: Clone + 'static,
    F: FnMut(&U, &T) -> U,
{
    fn value(&mut self, value: &T, out: &Outlet<'_, U, E>) {
        if let Some(acc) = &self.acc {
            let next = (self.f)(acc, value);
            self.acc = Some(next.clone());
            out.value(next);
        }
    }
}

struct ScanUnseeded<T, F> {
    acc: Option<T>,
    f: F,
}

impl<T, E, F> Handler<T, T, E> for ScanUnseeded<T, F>
where
    T: Clone + 'static,
    E: Clone + 'static,
    F: FnMut(&T, &T) -> T,
{
    fn value(&mut self, value: &T, out: &Outlet<'_, T, E>) {
        match &self.acc {
            Some(acc) => {
                let next = (self.f)(acc, value);
                self.acc = Some(next.clone());
                out.value(next);
            }
            None => self.acc = Some(value.clone()),
        }
    }
}

struct Flatten<F>(F);

impl<T, U, E, F> Handler<T, U, E> for Flatten<F>
where
    T: IntoIterator + Clone,
    U: Clone + 'static,
    E: Clone + 'static,
    F: FnMut(T::Item) -> U,
{
    fn value(&mut self, value: &T, out: &Outlet<'_, U, E>) {
        for item in value.clone() {
            if out.is_ended() {
                break;
            }
            out.value((self.0)(item));
        }
    }
}

// ─── Combinators ─────────────────────────────────────────────────────────────

impl<T: Clone + 'static, E: Clone + 'static> Observable<T, E> {
    /// Transform each VALUE.
    #[must_use]
    pub fn map<U: Clone + 'static>(&self, f: impl FnMut(&T) -> U + 'static) -> Observable<U, E> {
        self.derive("map", Map(f))
    }

    /// Transform each VALUE; an `Err` is emitted as an ERROR.
    ///
    /// This is the explicit way to turn a fallible computation into ERROR
    /// events. Panics inside `f` are not caught.
    #[must_use]
    pub fn try_map<U: Clone + 'static>(
        &self,
        f: impl FnMut(&T) -> Result<U, E> + 'static,
    ) -> Observable<U, E> {
        self.derive("try_map", TryMap(f))
    }

    /// Pass only the VALUEs for which `pred` holds.
    #[must_use]
    pub fn filter(&self, pred: impl FnMut(&T) -> bool + 'static) -> Self {
        self.derive("filter", Filter(pred))
    }

    /// The first `n` VALUEs, then END.
    ///
    /// `take(0)` is created already ended: any consumer receives END with no
    /// values and the source is never activated.
    #[must_use]
    pub fn take(&self, n: usize) -> Self {
        Self::derived(
            self.variant(),
            "take",
            std::slice::from_ref(self),
            Take { remaining: n },
            n == 0,
        )
    }

    /// VALUEs while `pred` holds; the first failing VALUE ends the node
    /// without being emitted.
    #[must_use]
    pub fn take_while(&self, pred: impl FnMut(&T) -> bool + 'static) -> Self {
        self.derive("take_while", TakeWhile(pred))
    }

    /// Nothing until the source ends, then its latest VALUE (if any) and END.
    #[must_use]
    pub fn last(&self) -> Self {
        self.derive("last", Last { latest: None })
    }

    /// Drop the first `n` VALUEs.
    #[must_use]
    pub fn skip(&self, n: usize) -> Self {
        self.derive("skip", Skip { remaining: n })
    }

    /// Drop VALUEs while `pred` holds; from the first failure on, pass
    /// everything.
    #[must_use]
    pub fn skip_while(&self, pred: impl FnMut(&T) -> bool + 'static) -> Self {
        self.derive(
            "skip_while",
            SkipWhile {
                pred,
                done: false,
            },
        )
    }

    /// Drop a VALUE equal to the previously passed one.
    #[must_use]
    pub fn skip_duplicates(&self) -> Self
    where
        T: PartialEq,
    {
        self.skip_duplicates_by(|a: &T, b: &T| a == b)
    }

    /// Drop a VALUE for which `eq(previous, value)` holds.
    #[must_use]
    pub fn skip_duplicates_by(&self, eq: impl FnMut(&T, &T) -> bool + 'static) -> Self {
        self.derive("skip_duplicates", SkipDuplicates { prev: None, eq })
    }

    /// Emit `f(previous, current)` for each VALUE, starting from `seed`.
    #[must_use]
    pub fn diff<U: Clone + 'static>(
        &self,
        seed: T,
        f: impl FnMut(&T, &T) -> U + 'static,
    ) -> Observable<U, E> {
        self.derive(
            "diff",
            Diff {
                prev: Some(seed),
                f,
            },
        )
    }

    /// Like [`diff`](Self::diff) but the first VALUE only seeds `previous`.
    #[must_use]
    pub fn diff_unseeded<U: Clone + 'static>(
        &self,
        f: impl FnMut(&T, &T) -> U + 'static,
    ) -> Observable<U, E> {
        self.derive("diff", Diff { prev: None, f })
    }

    /// Fold each VALUE into an accumulator starting at `seed` and emit every
    /// new accumulator.
    #[must_use]
    pub fn scan<U: Clone + 'static>(
        &self,
        seed: U,
        f: impl FnMut(&U, &T) -> U + 'static,
    ) -> Observable<U, E> {
        self.derive(
            "scan",
            Scan {
                acc: Some(seed),
                f,
            },
        )
    }

    /// Like [`scan`](Self::scan) but the first VALUE becomes the accumulator
    /// without being emitted.
    #[must_use]
    pub fn scan_unseeded(&self, f: impl FnMut(&T, &T) -> T + 'static) -> Self {
        self.derive("scan", ScanUnseeded { acc: None, f })
    }

    /// Emit each element of every VALUE, in order.
    #[must_use]
    pub fn flatten(&self) -> Observable<T::Item, E>
    where
        T: IntoIterator,
        T::Item: Clone + 'static,
    {
        self.flatten_map(|item| item)
    }

    /// Emit `f(element)` for each element of every VALUE, in order.
    #[must_use]
    pub fn flatten_map<U: Clone + 'static>(
        &self,
        f: impl FnMut(T::Item) -> U + 'static,
    ) -> Observable<U, E>
    where
        T: IntoIterator,
    {
        self.derive("flatten", Flatten(f))
    }
}
