#![forbid(unsafe_code)]

//! Sources: timers, one-shot callbacks, and push emitters as graph leaves.
//!
//! ```
//! use narly_core::Listener;
//! use narly_sources::{Duration, Scheduler, sequentially};
//!
//! let scheduler = Scheduler::lab();
//! let ticks = sequentially::<_, u32, ()>(&scheduler, Duration::from_millis(10), [1, 2, 3])?;
//! ticks.on_value(&Listener::new(|v: &u32| assert!(*v <= 3)));
//! assert_eq!(scheduler.advance(Duration::from_millis(30))?, 3);
//! assert!(ticks.is_ended());
//! # Ok::<(), narly_sources::SourceError>(())
//! ```

pub mod config;
pub mod constructors;
pub mod emitter;
pub mod error;
pub mod scheduler;
pub mod sources;

pub use config::SchedulerConfig;
pub use constructors::{
    Done, error, from_callback, from_events, from_node_callback, from_poll, interval, later,
    never, sequentially, value,
};
pub use emitter::{Emitter, EventHub};
pub use error::{Result, SourceError};
pub use scheduler::{Scheduler, TimerFacility, TimerHandle};
pub use sources::{callback, constant, events, timed};
pub use web_time::Duration;
