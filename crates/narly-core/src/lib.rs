#![forbid(unsafe_code)]

//! Core: push-based reactive dataflow nodes, side effects, and combinators.
//!
//! A graph is built from [`Observable`] nodes. Nodes are lazy: nothing
//! upstream runs until a side effect (or a derived node that has one) is
//! attached, and everything is released again when the last consumer goes
//! away.
//!
//! ```
//! use narly_core::{Event, Observable};
//!
//! let clicks: Observable<i32, String> = Observable::stream();
//! let total = clicks.scan(0, |acc, v| acc + v);
//! let _sub = total.observe(|event| {
//!     if let Event::Value(v) = event {
//!         assert!(*v > 0);
//!     }
//! });
//! clicks.emit_value(1);
//! clicks.emit_value(2);
//! assert_eq!(total.current(), None); // streams keep nothing
//! ```

pub mod event;
pub mod handler;
pub mod node;
pub mod ops;
pub mod side_effect;

pub use event::{Delivery, Event, Kind, NodeId, Selector};
pub use handler::{Forward, Handler, Outlet};
pub use node::{NodeBuilder, Observable, SourceHooks, Variant};
pub use side_effect::{Listener, SideEffect, Subscription};
