#![forbid(unsafe_code)]

//! Narly public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.
//!
//! ```
//! use narly::prelude::*;
//!
//! let scheduler = Scheduler::lab();
//! let ticks: Observable<u32, ()> = interval(&scheduler, Duration::from_millis(10), 1)?;
//! let first_three = ticks.scan(0u32, |acc, v| acc + v).take(3);
//! let _sub = first_three.observe(|event| {
//!     if let Event::Value(v) = event {
//!         assert!(*v <= 3);
//!     }
//! });
//! scheduler.advance(Duration::from_millis(100))?;
//! assert!(first_three.is_ended());
//! assert_eq!(scheduler.active_timers(), 0);
//! # Ok::<(), SourceError>(())
//! ```

pub use narly_core as core;
#[cfg(feature = "sources")]
pub use narly_sources as sources;

pub mod prelude {
    pub use narly_core::{
        Event, Handler, Kind, Listener, Observable, Outlet, SideEffect, SourceHooks,
        Subscription, Variant,
    };

    #[cfg(feature = "sources")]
    pub use narly_sources::{
        Emitter, EventHub, Scheduler, SchedulerConfig, SourceError, TimerFacility, callback,
        constant, error, events, from_callback, from_events, from_node_callback, from_poll,
        interval, later, never, sequentially, timed, value,
    };

    #[cfg(feature = "sources")]
    pub use narly_sources::Duration;
}
