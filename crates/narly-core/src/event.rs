#![forbid(unsafe_code)]

//! Event records and the identifiers that travel with them.
//!
//! An [`Event`] is one occurrence flowing through the graph: a value, an
//! error, or the terminal end marker. Every delivery from a producer to a
//! consumer is stamped with a [`Delivery`] carrying provenance, the
//! producer's emission version, and whether the event is a replay of a
//! Property's cached state.

use std::sync::atomic::{AtomicU64, Ordering};

/// The three kinds of event a node can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A data point.
    Value,
    /// A domain error.
    Error,
    /// Terminal marker; nothing follows it.
    End,
}

/// One occurrence in a dataflow graph.
///
/// `End` carries no payload and is terminal: at most one `End` ever leaves
/// a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T, E> {
    /// A data point.
    Value(T),
    /// A domain error.
    Error(E),
    /// End of stream.
    End,
}

impl<T, E> Event<T, E> {
    /// The kind tag of this event.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Value(_) => Kind::Value,
            Self::Error(_) => Kind::Error,
            Self::End => Kind::End,
        }
    }

    /// Whether this is the terminal marker.
    #[must_use]
    pub const fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// The value payload, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The error payload, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&E> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl<T, E> From<Result<T, E>> for Event<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => Self::Value(v),
            Err(e) => Self::Error(e),
        }
    }
}

// ─── Node identity ───────────────────────────────────────────────────────────

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a node or side-effect bridge.
///
/// Consumers are registered and removed by id, so identity never depends on
/// pointer comparison of type-erased handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value (for tracing/logging).
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

// ─── Delivery stamp ──────────────────────────────────────────────────────────

/// Metadata attached to every event handed from a producer to a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// The node that emitted the event.
    pub source: NodeId,
    /// The producer's emission counter at the time of the event. Bumped once
    /// per VALUE/ERROR; a replay carries the version of the cached event.
    pub version: u64,
    /// Whether the event is a Property replaying its cached state to a newly
    /// activating consumer.
    pub replay: bool,
}

impl Delivery {
    pub(crate) const fn fresh(source: NodeId, version: u64) -> Self {
        Self {
            source,
            version,
            replay: false,
        }
    }

    pub(crate) const fn replay(source: NodeId, version: u64) -> Self {
        Self {
            source,
            version,
            replay: true,
        }
    }
}

// ─── Side-effect selector ────────────────────────────────────────────────────

/// Which event kinds a side effect is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    /// VALUE events only.
    Value,
    /// ERROR events only.
    Error,
    /// END only.
    End,
    /// Every kind.
    Any,
}

impl Selector {
    /// Whether events of `kind` are routed to this selector.
    #[must_use]
    pub const fn matches(self, kind: Kind) -> bool {
        matches!(
            (self, kind),
            (Self::Any, _)
                | (Self::Value, Kind::Value)
                | (Self::Error, Kind::Error)
                | (Self::End, Kind::End)
        )
    }
}
