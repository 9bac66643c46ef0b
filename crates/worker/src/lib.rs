//! Request scheduling primitives for the session core.
//!
//! [`RequestScheduler`] serializes background work onto a single worker thread
//! (or runs it inline in [`SchedulerMode::Synchronous`]), with cheap two-level
//! priority through front/back queue insertion selected by [`TaskClass`].

mod class;
mod scheduler;
mod spawn;

pub use class::TaskClass;
pub use scheduler::{Request, RequestScheduler, ScheduleError, SchedulerMode};
pub use spawn::{panic_message, spawn_named_thread};
